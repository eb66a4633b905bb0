//! Parses lexed segments into the template AST (`text`, `output`, `set`,
//! `if/elif/else`, `for/else`, `raw`, `block`/`extends`, `include`).

use super::ast::Node;
use super::lexer::{lex, Segment};
use crate::error::{RecipeError, Result};
use crate::expr::parser::parse as parse_expr;

pub fn parse(src: &str) -> Result<Vec<Node>> {
    let segments = lex(src)?;
    let mut p = Parser {
        segments,
        pos: 0,
    };
    let nodes = p.parse_block(&[])?;
    if p.pos != p.segments.len() {
        return Err(RecipeError::template_syntax(format!(
            "unexpected trailing statement {:?}",
            p.segments[p.pos]
        )));
    }
    Ok(nodes)
}

struct Parser {
    segments: Vec<Segment>,
    pos: usize,
}

/// Keywords that end a block; `parse_block` stops (without consuming)
/// when the next statement's head word is one of these.
impl Parser {
    fn peek(&self) -> Option<&Segment> {
        self.segments.get(self.pos)
    }

    fn parse_block(&mut self, stop_words: &[&str]) -> Result<Vec<Node>> {
        let mut nodes = Vec::new();
        loop {
            match self.peek() {
                None => break,
                Some(Segment::Text(t)) => {
                    nodes.push(Node::Text(t.clone()));
                    self.pos += 1;
                }
                Some(Segment::Comment) => {
                    self.pos += 1;
                }
                Some(Segment::Output(src)) => {
                    let expr = parse_expr(src)?;
                    nodes.push(Node::Output(expr));
                    self.pos += 1;
                }
                Some(Segment::Statement(src)) => {
                    let head = first_word(src);
                    if stop_words.contains(&head.as_str()) {
                        break;
                    }
                    self.parse_statement(src, &mut nodes)?;
                }
            }
        }
        Ok(nodes)
    }

    fn advance_statement(&mut self) -> Result<String> {
        match self.segments.get(self.pos) {
            Some(Segment::Statement(s)) => {
                let s = s.clone();
                self.pos += 1;
                Ok(s)
            }
            other => Err(RecipeError::template_syntax(format!(
                "expected a statement tag, found {other:?}"
            ))),
        }
    }

    fn parse_statement(&mut self, src: &str, nodes: &mut Vec<Node>) -> Result<()> {
        self.pos += 1; // consume the opening tag, already peeked as `src`
        let head = first_word(src);
        let rest = src[head.len()..].trim();
        match head.as_str() {
            "set" => {
                let (name, expr_src) = rest.split_once('=').ok_or_else(|| {
                    RecipeError::template_syntax("malformed `set` statement, expected name = expr")
                })?;
                nodes.push(Node::Set {
                    name: name.trim().to_string(),
                    expr: parse_expr(expr_src.trim())?,
                });
            }
            "if" => {
                let mut branches = vec![(parse_expr(rest)?, Vec::new())];
                let mut else_branch = None;
                loop {
                    branches.last_mut().unwrap().1 = self.parse_block(&["elif", "else", "endif"])?;
                    let tag = self.advance_statement()?;
                    let tag_head = first_word(&tag);
                    let tag_rest = tag[tag_head.len()..].trim();
                    match tag_head.as_str() {
                        "elif" => branches.push((parse_expr(tag_rest)?, Vec::new())),
                        "else" => {
                            else_branch = Some(self.parse_block(&["endif"])?);
                            self.expect_tag("endif")?;
                            break;
                        }
                        "endif" => break,
                        other => {
                            return Err(RecipeError::template_syntax(format!(
                                "unexpected tag {other:?} inside if"
                            )))
                        }
                    }
                }
                nodes.push(Node::If { branches, else_branch });
            }
            "for" => {
                let (targets_src, after) = rest.split_once(" in ").ok_or_else(|| {
                    RecipeError::template_syntax("malformed `for` statement, expected `for x in expr`")
                })?;
                let targets: Vec<String> = targets_src
                    .split(',')
                    .map(|t| t.trim().to_string())
                    .filter(|t| !t.is_empty())
                    .collect();
                let iter = parse_expr(after.trim())?;
                let body = self.parse_block(&["else", "endfor"])?;
                let tag = self.advance_statement()?;
                let tag_head = first_word(&tag);
                let else_branch = match tag_head.as_str() {
                    "else" => {
                        let branch = self.parse_block(&["endfor"])?;
                        self.expect_tag("endfor")?;
                        Some(branch)
                    }
                    "endfor" => None,
                    other => {
                        return Err(RecipeError::template_syntax(format!(
                            "unexpected tag {other:?} inside for"
                        )))
                    }
                };
                nodes.push(Node::For { targets, iter, body, else_branch });
            }
            "raw" => {
                let mut raw = String::new();
                loop {
                    match self.peek() {
                        Some(Segment::Text(t)) => {
                            raw.push_str(t);
                            self.pos += 1;
                        }
                        Some(Segment::Statement(s)) if first_word(s) == "endraw" => {
                            self.pos += 1;
                            break;
                        }
                        Some(Segment::Output(s)) => {
                            raw.push_str("{{ ");
                            raw.push_str(s);
                            raw.push_str(" }}");
                            self.pos += 1;
                        }
                        Some(Segment::Comment) => {
                            self.pos += 1;
                        }
                        Some(Segment::Statement(s)) => {
                            raw.push_str("{% ");
                            raw.push_str(s);
                            raw.push_str(" %}");
                            self.pos += 1;
                        }
                        None => {
                            return Err(RecipeError::template_syntax("unterminated raw block"))
                        }
                    }
                }
                nodes.push(Node::Raw(raw));
            }
            "block" => {
                let name = rest.trim().to_string();
                let body = self.parse_block(&["endblock"])?;
                self.expect_tag("endblock")?;
                nodes.push(Node::Block { name, body });
            }
            "extends" => {
                nodes.push(Node::Extends(unquote(rest)?));
            }
            "include" => {
                nodes.push(Node::Include(unquote(rest)?));
            }
            other => {
                return Err(RecipeError::template_syntax(format!(
                    "unknown statement tag {other:?}"
                )))
            }
        }
        Ok(())
    }

    fn expect_tag(&mut self, word: &str) -> Result<()> {
        let tag = self.advance_statement()?;
        if first_word(&tag) == word {
            Ok(())
        } else {
            Err(RecipeError::template_syntax(format!(
                "expected {{% {word} %}}, found {{% {tag} %}}"
            )))
        }
    }
}

fn first_word(s: &str) -> String {
    s.split_whitespace().next().unwrap_or("").to_string()
}

fn unquote(s: &str) -> Result<String> {
    let s = s.trim();
    if s.len() >= 2 && (s.starts_with('"') && s.ends_with('"') || s.starts_with('\'') && s.ends_with('\'')) {
        Ok(s[1..s.len() - 1].to_string())
    } else {
        Err(RecipeError::template_syntax(format!(
            "expected a quoted path, found {s:?}"
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_if_elif_else() {
        let nodes = parse("{% if a %}A{% elif b %}B{% else %}C{% endif %}").unwrap();
        assert_eq!(nodes.len(), 1);
        match &nodes[0] {
            Node::If { branches, else_branch } => {
                assert_eq!(branches.len(), 2);
                assert!(else_branch.is_some());
            }
            _ => panic!("expected if node"),
        }
    }

    #[test]
    fn parses_for_with_else() {
        let nodes = parse("{% for k, v in items %}{{ k }}{% else %}empty{% endfor %}").unwrap();
        match &nodes[0] {
            Node::For { targets, else_branch, .. } => {
                assert_eq!(targets, &vec!["k".to_string(), "v".to_string()]);
                assert!(else_branch.is_some());
            }
            _ => panic!("expected for node"),
        }
    }

    #[test]
    fn parses_raw_block_literally() {
        let nodes = parse("{% raw %}{{ not-an-expr }}{% endraw %}").unwrap();
        match &nodes[0] {
            Node::Raw(s) => assert_eq!(s, "{{ not-an-expr }}"),
            _ => panic!("expected raw node"),
        }
    }

    #[test]
    fn parses_extends_and_block() {
        let nodes = parse(r#"{% extends "base.txt" %}{% block body %}hi{% endblock %}"#).unwrap();
        assert!(matches!(nodes[0], Node::Extends(_)));
        assert!(matches!(nodes[1], Node::Block { .. }));
    }
}
