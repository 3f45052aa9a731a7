//! SQON value literals.
//!
//! Records and rule arguments use a relaxed JSON: object keys may be bare
//! identifiers, strings may use single quotes, and trailing commas are
//! allowed. Values are produced as `serde_json::Value`.

use serde_json::{Map, Number, Value};

use crate::error::ParseError;
use crate::lexer::{Spanned, Token};

/// Deepest object / array nesting a value literal may use.
pub const MAX_NESTING: usize = 128;

pub(crate) struct ValueReader<'a> {
    tokens: &'a [Spanned],
    pos: usize,
    depth: usize,
}

impl<'a> ValueReader<'a> {
    pub(crate) fn new(tokens: &'a [Spanned]) -> Self {
        ValueReader {
            tokens,
            pos: 0,
            depth: 0,
        }
    }

    fn cur(&self) -> &Spanned {
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    pub(crate) fn peek(&self) -> &Token {
        &self.cur().token
    }

    fn cur_line(&self) -> u32 {
        self.cur().line
    }

    pub(crate) fn advance(&mut self) -> &Spanned {
        let t = &self.tokens[self.pos.min(self.tokens.len() - 1)];
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        t
    }

    fn err(&self, msg: impl Into<String>) -> ParseError {
        ParseError::at(self.cur_line(), msg)
    }

    pub(crate) fn at_eof(&self) -> bool {
        self.peek() == &Token::Eof
    }

    /// Fail unless every token has been consumed.
    pub(crate) fn expect_eof(&self) -> Result<(), ParseError> {
        if self.at_eof() {
            Ok(())
        } else {
            Err(self.err(format!("unexpected {} after value", describe(self.peek()))))
        }
    }

    pub(crate) fn read_value(&mut self) -> Result<Value, ParseError> {
        match self.peek().clone() {
            Token::LBrace => self.nested(Self::read_object),
            Token::LBracket => self.nested(Self::read_array),
            Token::Str(s) => {
                self.advance();
                Ok(Value::String(s))
            }
            Token::Number(n) => {
                let line = self.cur_line();
                self.advance();
                parse_number(&n).ok_or_else(|| {
                    ParseError::at(line, format!("invalid number literal '{}'", n))
                })
            }
            Token::Word(w) => match w.as_str() {
                "true" => {
                    self.advance();
                    Ok(Value::Bool(true))
                }
                "false" => {
                    self.advance();
                    Ok(Value::Bool(false))
                }
                "null" => {
                    self.advance();
                    Ok(Value::Null)
                }
                _ => Err(self.err(format!("unexpected identifier '{}'", w))),
            },
            other => Err(self.err(format!("expected a value, got {}", describe(&other)))),
        }
    }

    fn nested(
        &mut self,
        read: fn(&mut Self) -> Result<Value, ParseError>,
    ) -> Result<Value, ParseError> {
        if self.depth >= MAX_NESTING {
            return Err(self.err(format!("value nested deeper than {}", MAX_NESTING)));
        }
        self.depth += 1;
        let value = read(self);
        self.depth -= 1;
        value
    }

    fn read_object(&mut self) -> Result<Value, ParseError> {
        self.advance(); // '{'
        let mut map = Map::new();
        loop {
            match self.peek().clone() {
                Token::RBrace => {
                    self.advance();
                    break;
                }
                Token::Word(key) | Token::Str(key) => {
                    let line = self.cur_line();
                    self.advance();
                    if self.peek() != &Token::Colon {
                        return Err(self.err(format!(
                            "expected ':' after key '{}', got {}",
                            key,
                            describe(self.peek())
                        )));
                    }
                    self.advance();
                    let value = self.read_value()?;
                    if map.insert(key.clone(), value).is_some() {
                        return Err(ParseError::at(line, format!("duplicate key '{}'", key)));
                    }
                    match self.peek() {
                        Token::Comma => {
                            self.advance();
                        }
                        Token::RBrace => {}
                        other => {
                            return Err(
                                self.err(format!("expected ',' or '}}', got {}", describe(other)))
                            )
                        }
                    }
                }
                other => {
                    return Err(self.err(format!("expected object key, got {}", describe(&other))))
                }
            }
        }
        Ok(Value::Object(map))
    }

    fn read_array(&mut self) -> Result<Value, ParseError> {
        self.advance(); // '['
        let mut items = Vec::new();
        loop {
            if self.peek() == &Token::RBracket {
                self.advance();
                break;
            }
            items.push(self.read_value()?);
            match self.peek() {
                Token::Comma => {
                    self.advance();
                }
                Token::RBracket => {}
                other => {
                    return Err(self.err(format!("expected ',' or ']', got {}", describe(other))))
                }
            }
        }
        Ok(Value::Array(items))
    }
}

fn parse_number(text: &str) -> Option<Value> {
    if let Ok(i) = text.parse::<i64>() {
        return Some(Value::Number(i.into()));
    }
    if let Ok(u) = text.parse::<u64>() {
        return Some(Value::Number(u.into()));
    }
    text.parse::<f64>()
        .ok()
        .and_then(Number::from_f64)
        .map(Value::Number)
}

pub(crate) fn describe(token: &Token) -> String {
    match token {
        Token::Word(w) => format!("'{}'", w),
        Token::Str(s) => format!("string \"{}\"", s),
        Token::Number(n) => format!("number {}", n),
        Token::LBrace => "'{'".into(),
        Token::RBrace => "'}'".into(),
        Token::LBracket => "'['".into(),
        Token::RBracket => "']'".into(),
        Token::LParen => "'('".into(),
        Token::RParen => "')'".into(),
        Token::Colon => "':'".into(),
        Token::Comma => "','".into(),
        Token::Eof => "end of input".into(),
    }
}

/// Parse a complete value from already-lexed tokens.
pub fn parse_tokens(tokens: &[Spanned]) -> Result<Value, ParseError> {
    let mut reader = ValueReader::new(tokens);
    let value = reader.read_value()?;
    reader.expect_eof()?;
    Ok(value)
}

/// Lex and parse one value literal sitting on a single line.
pub fn parse_value(src: &str, line: u32) -> Result<Value, ParseError> {
    let tokens = crate::lexer::lex(src, line)?;
    parse_tokens(&tokens)
}
