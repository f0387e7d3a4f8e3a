//! Parser for the declarative expression grammar.
//!
//! ```text
//! decl  := IDENT '[' NUMBER (',' NUMBER){0,2} ']'
//!        | CTOR ('::' IDENT)? '(' args ')'
//! args  := arg (',' arg)*
//! arg   := term ('*' term)?
//! term  := IDENT | IDENT '[' numbers ']' | NUMBER | '{' args? '}' | call
//! ```
//!
//! Parsing is purely syntactic; name resolution happens when the registry
//! declares the resulting tree.

use super::{Ctor, Expr};
use crate::error::AppError;

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident(String),
    Number(f64),
    Open(char),
    Close(char),
    Comma,
    Star,
    Scope,
}

/// Parse one declaration.
pub fn parse(text: &str) -> Result<Expr, AppError> {
    let tokens = tokenize(text)?;
    let mut parser = Parser {
        text,
        tokens,
        pos: 0,
    };
    let expr = parser.arg()?;
    if parser.pos != parser.tokens.len() {
        return Err(parser.error(format!("unexpected trailing {:?}", parser.tokens[parser.pos])));
    }
    Ok(expr)
}

fn tokenize(text: &str) -> Result<Vec<Token>, AppError> {
    let err = |message: String| AppError::Parse {
        text: text.to_string(),
        message,
    };
    let chars: Vec<char> = text.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        match c {
            c if c.is_whitespace() => i += 1,
            '(' | '[' | '{' => {
                tokens.push(Token::Open(c));
                i += 1;
            }
            ')' | ']' | '}' => {
                tokens.push(Token::Close(c));
                i += 1;
            }
            ',' => {
                tokens.push(Token::Comma);
                i += 1;
            }
            '*' => {
                tokens.push(Token::Star);
                i += 1;
            }
            ':' => {
                if chars.get(i + 1) != Some(&':') {
                    return Err(err(format!("single ':' at offset {i}")));
                }
                tokens.push(Token::Scope);
                i += 2;
            }
            c if c.is_ascii_alphabetic() || c == '_' => {
                let start = i;
                while i < chars.len() && (chars[i].is_ascii_alphanumeric() || chars[i] == '_') {
                    i += 1;
                }
                tokens.push(Token::Ident(chars[start..i].iter().collect()));
            }
            c if c.is_ascii_digit() || c == '.' || c == '-' || c == '+' => {
                let start = i;
                i += 1;
                while i < chars.len() {
                    let d = chars[i];
                    let exponent_sign =
                        (d == '-' || d == '+') && matches!(chars[i - 1], 'e' | 'E');
                    if d.is_ascii_digit() || d == '.' || d == 'e' || d == 'E' || exponent_sign {
                        i += 1;
                    } else {
                        break;
                    }
                }
                let literal: String = chars[start..i].iter().collect();
                let value = literal
                    .parse::<f64>()
                    .map_err(|_| err(format!("bad number '{literal}'")))?;
                tokens.push(Token::Number(value));
            }
            other => return Err(err(format!("unexpected character '{other}' at offset {i}"))),
        }
    }
    Ok(tokens)
}

struct Parser<'a> {
    text: &'a str,
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser<'_> {
    fn error(&self, message: String) -> AppError {
        AppError::Parse {
            text: self.text.to_string(),
            message,
        }
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Result<Token, AppError> {
        let token = self
            .tokens
            .get(self.pos)
            .cloned()
            .ok_or_else(|| self.error("unexpected end of expression".to_string()))?;
        self.pos += 1;
        Ok(token)
    }

    fn expect(&mut self, want: Token) -> Result<(), AppError> {
        let got = self.next()?;
        if got != want {
            return Err(self.error(format!("expected {want:?}, found {got:?}")));
        }
        Ok(())
    }

    fn arg(&mut self) -> Result<Expr, AppError> {
        let term = self.term()?;
        if self.peek() == Some(&Token::Star) {
            self.pos += 1;
            let rhs = self.term()?;
            return Ok(Expr::scaled(term, rhs));
        }
        Ok(term)
    }

    /// Comma-separated arguments up to (and consuming) `close`.
    fn args(&mut self, close: char) -> Result<Vec<Expr>, AppError> {
        let mut out = Vec::new();
        if self.peek() == Some(&Token::Close(close)) {
            self.pos += 1;
            return Ok(out);
        }
        loop {
            out.push(self.arg()?);
            match self.next()? {
                Token::Comma => continue,
                Token::Close(c) if c == close => return Ok(out),
                other => return Err(self.error(format!("expected ',' or '{close}', found {other:?}"))),
            }
        }
    }

    fn term(&mut self) -> Result<Expr, AppError> {
        match self.next()? {
            Token::Number(v) => Ok(Expr::Number(v)),
            Token::Open('{') => Ok(Expr::List(self.args('}')?)),
            Token::Ident(ident) => self.named(ident),
            other => Err(self.error(format!("unexpected {other:?}"))),
        }
    }

    fn named(&mut self, ident: String) -> Result<Expr, AppError> {
        match self.peek() {
            Some(Token::Scope) => {
                let ctor = Ctor::from_name(&ident)
                    .ok_or_else(|| self.error(format!("unknown constructor '{ident}'")))?;
                self.pos += 1;
                let Token::Ident(name) = self.next()? else {
                    return Err(self.error(format!("expected a name after '{ident}::'")));
                };
                self.expect(Token::Open('('))?;
                let args = self.args(')')?;
                Ok(Expr::Call {
                    ctor,
                    name: Some(name),
                    args,
                })
            }
            Some(Token::Open('(')) => {
                let ctor = Ctor::from_name(&ident)
                    .ok_or_else(|| self.error(format!("unknown constructor '{ident}'")))?;
                self.pos += 1;
                let args = self.args(')')?;
                Ok(Expr::Call {
                    ctor,
                    name: None,
                    args,
                })
            }
            Some(Token::Open('[')) => {
                self.pos += 1;
                let mut values = Vec::new();
                loop {
                    match self.next()? {
                        Token::Number(v) => values.push(v),
                        other => return Err(self.error(format!("expected a number, found {other:?}"))),
                    }
                    match self.next()? {
                        Token::Comma => continue,
                        Token::Close(']') => break,
                        other => return Err(self.error(format!("expected ',' or ']', found {other:?}"))),
                    }
                }
                if values.len() > 3 {
                    return Err(self.error(format!("'{ident}' declares {} numbers, at most 3", values.len())));
                }
                Ok(Expr::Var { name: ident, values })
            }
            _ => Ok(Expr::Ref(ident)),
        }
    }
}
