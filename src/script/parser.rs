//! Recursive-descent parser over indentation blocks, deferring to the
//! expression parser for everything inside a statement.

use super::ast::Stmt;
use super::lexer::{lines, Line};
use crate::error::{RecipeError, Result};
use crate::expr::parser::parse as parse_expr;

pub fn parse(src: &str) -> Result<Vec<Stmt>> {
    let ls = lines(src);
    if ls.is_empty() {
        return Ok(Vec::new());
    }
    let mut pos = 0;
    let base_indent = ls[0].indent;
    parse_suite(&ls, &mut pos, base_indent)
}

fn parse_suite(ls: &[Line], pos: &mut usize, indent: usize) -> Result<Vec<Stmt>> {
    let mut stmts = Vec::new();
    while *pos < ls.len() && ls[*pos].indent == indent {
        stmts.push(parse_stmt(ls, pos, indent)?);
    }
    Ok(stmts)
}

/// Parses the block nested under a `:`-terminated header line, i.e. the
/// next line must be indented deeper than `header_indent`.
fn parse_nested_block(ls: &[Line], pos: &mut usize, header_indent: usize) -> Result<Vec<Stmt>> {
    if *pos >= ls.len() || ls[*pos].indent <= header_indent {
        return Err(RecipeError::template_syntax("expected an indented block"));
    }
    let body_indent = ls[*pos].indent;
    parse_suite(ls, pos, body_indent)
}

fn parse_stmt(ls: &[Line], pos: &mut usize, indent: usize) -> Result<Stmt> {
    let line = ls[*pos].text.clone();
    *pos += 1;

    if line == "pass" {
        return Ok(Stmt::Pass);
    }

    if let Some(rest) = line.strip_prefix("if ").and_then(|r| r.strip_suffix(':')) {
        let cond = parse_expr(rest.trim())?;
        let body = parse_nested_block(ls, pos, indent)?;
        let mut branches = vec![(cond, body)];
        let mut else_branch = None;
        loop {
            if *pos >= ls.len() || ls[*pos].indent != indent {
                break;
            }
            let head = &ls[*pos].text;
            if let Some(rest) = head.strip_prefix("elif ").and_then(|r| r.strip_suffix(':')) {
                let cond = parse_expr(rest.trim())?;
                *pos += 1;
                let body = parse_nested_block(ls, pos, indent)?;
                branches.push((cond, body));
            } else if head == "else:" {
                *pos += 1;
                else_branch = Some(parse_nested_block(ls, pos, indent)?);
                break;
            } else {
                break;
            }
        }
        return Ok(Stmt::If { branches, else_branch });
    }

    if let Some(rest) = line.strip_prefix("for ").and_then(|r| r.strip_suffix(':')) {
        let (target, iter_src) = rest.split_once(" in ").ok_or_else(|| {
            RecipeError::template_syntax("malformed `for` statement, expected `for x in expr:`")
        })?;
        let iter = parse_expr(iter_src.trim())?;
        let body = parse_nested_block(ls, pos, indent)?;
        return Ok(Stmt::For {
            target: target.trim().to_string(),
            iter,
            body,
        });
    }

    if let Some(eq) = top_level_assign(&line) {
        let name = line[..eq].trim().to_string();
        let expr = parse_expr(line[eq + 1..].trim())?;
        return Ok(Stmt::Assign(name, expr));
    }

    Ok(Stmt::Expr(parse_expr(&line)?))
}

/// Finds a top-level `=` (assignment, not `==`/`!=`/`<=`/`>=`) outside
/// of quotes, brackets, or parens.
fn top_level_assign(line: &str) -> Option<usize> {
    let bytes = line.as_bytes();
    let mut depth = 0i32;
    let mut in_str: Option<u8> = None;
    let mut i = 0;
    while i < bytes.len() {
        let b = bytes[i];
        match in_str {
            Some(q) if b == q => in_str = None,
            Some(_) => {}
            None => match b {
                b'\'' | b'"' => in_str = Some(b),
                b'(' | b'[' | b'{' => depth += 1,
                b')' | b']' | b'}' => depth -= 1,
                b'=' if depth == 0 => {
                    let prev_eq = i > 0 && bytes[i - 1] == b'=';
                    let prev_cmp = i > 0 && matches!(bytes[i - 1], b'!' | b'<' | b'>');
                    let next_eq = bytes.get(i + 1) == Some(&b'=');
                    if !prev_eq && !prev_cmp && !next_eq {
                        return Some(i);
                    }
                }
                _ => {}
            },
        }
        i += 1;
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_call_statement() {
        let stmts = parse("install_packages('curl', 'git')").unwrap();
        assert_eq!(stmts.len(), 1);
        assert!(matches!(stmts[0], Stmt::Expr(_)));
    }

    #[test]
    fn parses_assignment() {
        let stmts = parse("x = 1").unwrap();
        match &stmts[0] {
            Stmt::Assign(name, _) => assert_eq!(name, "x"),
            _ => panic!("expected assignment"),
        }
    }

    #[test]
    fn does_not_confuse_equality_with_assignment() {
        let stmts = parse("if x == 1:\n    pass").unwrap();
        assert!(matches!(stmts[0], Stmt::If { .. }));
    }

    #[test]
    fn parses_if_elif_else_block() {
        let src = "if x == 1:\n    print('one')\nelif x == 2:\n    print('two')\nelse:\n    print('other')";
        let stmts = parse(src).unwrap();
        match &stmts[0] {
            Stmt::If { branches, else_branch } => {
                assert_eq!(branches.len(), 2);
                assert!(else_branch.is_some());
            }
            _ => panic!("expected if"),
        }
    }

    #[test]
    fn parses_for_loop() {
        let stmts = parse("for pkg in packages:\n    install_packages(pkg)").unwrap();
        match &stmts[0] {
            Stmt::For { target, body, .. } => {
                assert_eq!(target, "pkg");
                assert_eq!(body.len(), 1);
            }
            _ => panic!("expected for"),
        }
    }
}
