use super::ast::{CompareOp, Expr};
use super::lexer::{tokenize, Token};
use crate::error::{RecipeError, Result};

pub fn parse(src: &str) -> Result<Expr> {
    let tokens = tokenize(src)?;
    let mut p = Parser { tokens, pos: 0 };
    let expr = p.parse_or()?;
    p.expect(Token::Eof)?;
    Ok(expr)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> &Token {
        &self.tokens[self.pos]
    }

    fn advance(&mut self) -> Token {
        let t = self.tokens[self.pos].clone();
        if self.pos + 1 < self.tokens.len() {
            self.pos += 1;
        }
        t
    }

    fn expect(&mut self, t: Token) -> Result<()> {
        if *self.peek() == t {
            self.advance();
            Ok(())
        } else {
            Err(RecipeError::template_syntax(format!(
                "expected {t:?}, found {:?}",
                self.peek()
            )))
        }
    }

    fn parse_or(&mut self) -> Result<Expr> {
        let mut left = self.parse_and()?;
        while *self.peek() == Token::Or {
            self.advance();
            let right = self.parse_and()?;
            left = Expr::Or(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<Expr> {
        let mut left = self.parse_not()?;
        while *self.peek() == Token::And {
            self.advance();
            let right = self.parse_not()?;
            left = Expr::And(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_not(&mut self) -> Result<Expr> {
        if *self.peek() == Token::Not {
            self.advance();
            // `not in` is handled inside parse_membership; a bare `not`
            // here negates the whole membership/equality expression.
            let inner = self.parse_not()?;
            return Ok(Expr::Not(Box::new(inner)));
        }
        self.parse_membership()
    }

    fn parse_membership(&mut self) -> Result<Expr> {
        let left = self.parse_equality()?;
        if *self.peek() == Token::In {
            self.advance();
            let right = self.parse_equality()?;
            return Ok(Expr::In {
                needle: Box::new(left),
                haystack: Box::new(right),
                negate: false,
            });
        }
        if *self.peek() == Token::Not && self.tokens.get(self.pos + 1) == Some(&Token::In) {
            self.advance(); // not
            self.advance(); // in
            let right = self.parse_equality()?;
            return Ok(Expr::In {
                needle: Box::new(left),
                haystack: Box::new(right),
                negate: true,
            });
        }
        Ok(left)
    }

    fn parse_equality(&mut self) -> Result<Expr> {
        let mut left = self.parse_ordering()?;
        loop {
            let op = match self.peek() {
                Token::Eq => CompareOp::Eq,
                Token::Ne => CompareOp::Ne,
                _ => break,
            };
            self.advance();
            let right = self.parse_ordering()?;
            left = Expr::Compare {
                left: Box::new(left),
                op,
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn parse_ordering(&mut self) -> Result<Expr> {
        let mut left = self.parse_pipe()?;
        loop {
            let op = match self.peek() {
                Token::Lt => CompareOp::Lt,
                Token::Le => CompareOp::Le,
                Token::Gt => CompareOp::Gt,
                Token::Ge => CompareOp::Ge,
                _ => break,
            };
            self.advance();
            let right = self.parse_pipe()?;
            left = Expr::Compare {
                left: Box::new(left),
                op,
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn parse_pipe(&mut self) -> Result<Expr> {
        let mut left = self.parse_postfix()?;
        while *self.peek() == Token::Pipe {
            self.advance();
            let name = match self.advance() {
                Token::Ident(name) => name,
                other => {
                    return Err(RecipeError::template_syntax(format!(
                        "expected filter name, found {other:?}"
                    )))
                }
            };
            let args = if *self.peek() == Token::LParen {
                self.advance();
                let mut args = Vec::new();
                if *self.peek() != Token::RParen {
                    loop {
                        args.push(self.parse_or()?);
                        if *self.peek() == Token::Comma {
                            self.advance();
                        } else {
                            break;
                        }
                    }
                }
                self.expect(Token::RParen)?;
                args
            } else {
                Vec::new()
            };
            left = Expr::Filter {
                value: Box::new(left),
                name,
                args,
            };
        }
        Ok(left)
    }

    fn parse_postfix(&mut self) -> Result<Expr> {
        let mut expr = self.parse_atom()?;
        loop {
            match self.peek() {
                Token::Dot => {
                    self.advance();
                    let name = match self.advance() {
                        Token::Ident(n) => n,
                        other => {
                            return Err(RecipeError::template_syntax(format!(
                                "expected attribute name, found {other:?}"
                            )))
                        }
                    };
                    expr = Expr::Attr {
                        value: Box::new(expr),
                        name,
                    };
                }
                Token::LBracket => {
                    self.advance();
                    let index = self.parse_or()?;
                    self.expect(Token::RBracket)?;
                    expr = Expr::Index {
                        value: Box::new(expr),
                        index: Box::new(index),
                    };
                }
                Token::LParen => {
                    self.advance();
                    let mut args = Vec::new();
                    if *self.peek() != Token::RParen {
                        loop {
                            args.push(self.parse_or()?);
                            if *self.peek() == Token::Comma {
                                self.advance();
                            } else {
                                break;
                            }
                        }
                    }
                    self.expect(Token::RParen)?;
                    expr = Expr::Call {
                        callee: Box::new(expr),
                        args,
                    };
                }
                _ => break,
            }
        }
        Ok(expr)
    }

    fn parse_atom(&mut self) -> Result<Expr> {
        match self.advance() {
            Token::Int(i) => Ok(Expr::Int(i)),
            Token::Float(f) => Ok(Expr::Float(f)),
            Token::Str(s) => Ok(Expr::Str(s)),
            Token::True => Ok(Expr::Bool(true)),
            Token::False => Ok(Expr::Bool(false)),
            Token::None => Ok(Expr::None),
            Token::Ident(name) => Ok(Expr::Ident(name)),
            Token::LParen => {
                // Grouped expr or tuple, treated as list.
                if *self.peek() == Token::RParen {
                    self.advance();
                    return Ok(Expr::List(Vec::new()));
                }
                let first = self.parse_or()?;
                if *self.peek() == Token::Comma {
                    let mut items = vec![first];
                    while *self.peek() == Token::Comma {
                        self.advance();
                        if *self.peek() == Token::RParen {
                            break;
                        }
                        items.push(self.parse_or()?);
                    }
                    self.expect(Token::RParen)?;
                    Ok(Expr::List(items))
                } else {
                    self.expect(Token::RParen)?;
                    Ok(first)
                }
            }
            Token::LBracket => {
                let mut items = Vec::new();
                if *self.peek() != Token::RBracket {
                    loop {
                        items.push(self.parse_or()?);
                        if *self.peek() == Token::Comma {
                            self.advance();
                        } else {
                            break;
                        }
                    }
                }
                self.expect(Token::RBracket)?;
                Ok(Expr::List(items))
            }
            Token::LBrace => {
                let mut entries = Vec::new();
                if *self.peek() != Token::RBrace {
                    loop {
                        let key = match self.advance() {
                            Token::Str(s) => s,
                            other => {
                                return Err(RecipeError::template_syntax(format!(
                                    "dict keys must be quoted strings, found {other:?}"
                                )))
                            }
                        };
                        self.expect(Token::Colon)?;
                        let value = self.parse_or()?;
                        entries.push((key, value));
                        if *self.peek() == Token::Comma {
                            self.advance();
                        } else {
                            break;
                        }
                    }
                }
                self.expect(Token::RBrace)?;
                Ok(Expr::Dict(entries))
            }
            other => Err(RecipeError::template_syntax(format!(
                "unexpected token {other:?} in expression"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_pipe_chain() {
        let expr = parse("self.version.split('.') | map('int') | list").unwrap();
        match expr {
            Expr::Filter { name, .. } => assert_eq!(name, "list"),
            _ => panic!("expected filter at top"),
        }
    }

    #[test]
    fn parses_not_in() {
        let expr = parse("v not in ('5.0.9','5.0.8')").unwrap();
        match expr {
            Expr::In { negate, .. } => assert!(negate),
            _ => panic!("expected negated In"),
        }
    }
}
