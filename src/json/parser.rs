//! JSON parser with strict validation.
//!
//! Recursive descent over the lexer's tokens. Rejects duplicate property
//! names, trailing data, non-finite numbers and documents whose root is not
//! an object or an array. Resource limits come from [`Limits`].

use super::lexer::{Lexer, Token};
use super::limits::Limits;
use super::types::{JsonNumber, JsonObject, JsonValue};
use crate::error::{ErrorCode, JcsResult};

/// JSON parser with strict validation.
pub struct Parser<'a> {
    lexer: Lexer<'a>,
    current: Token,
    limits: Limits,
    depth: u64,
}

impl<'a> Parser<'a> {
    /// Create a new parser for the given input.
    pub fn new(input: &'a [u8], limits: Limits) -> JcsResult<Self> {
        let mut lexer = Lexer::new(input, limits)?;
        let current = lexer.next_token()?;
        Ok(Self {
            lexer,
            current,
            limits,
            depth: 0,
        })
    }

    /// Parse a complete document. The root must be an object or an array.
    pub fn parse(&mut self) -> JcsResult<JsonValue> {
        if !matches!(self.current, Token::LeftBrace | Token::LeftBracket) {
            return Err(ErrorCode::E102_InvalidRoot);
        }
        let value = self.parse_value()?;

        if self.current != Token::Eof {
            return Err(self.invalid());
        }

        Ok(value)
    }

    fn invalid(&self) -> ErrorCode {
        ErrorCode::E100_InvalidJSON(self.lexer.position())
    }

    fn advance(&mut self) -> JcsResult<()> {
        self.current = self.lexer.next_token()?;
        Ok(())
    }

    fn parse_value(&mut self) -> JcsResult<JsonValue> {
        let value = match &self.current {
            Token::Null => JsonValue::Null,
            Token::True => JsonValue::Bool(true),
            Token::False => JsonValue::Bool(false),
            Token::String(s) => JsonValue::String(s.clone()),
            Token::Number(s) => JsonValue::Number(JsonNumber::from_lexical(s)?),
            Token::LeftBrace => return self.parse_object(),
            Token::LeftBracket => return self.parse_array(),
            _ => return Err(self.invalid()),
        };
        self.advance()?;
        Ok(value)
    }

    fn enter(&mut self) -> JcsResult<()> {
        self.depth += 1;
        if self.depth > self.limits.max_nesting_depth {
            return Err(ErrorCode::E111_NestingTooDeep(
                self.depth,
                self.limits.max_nesting_depth,
            ));
        }
        Ok(())
    }

    fn parse_object(&mut self) -> JcsResult<JsonValue> {
        self.enter()?;
        self.advance()?;

        let mut object = JsonObject::new();

        if self.current == Token::RightBrace {
            self.advance()?;
            self.depth -= 1;
            return Ok(JsonValue::Object(object));
        }

        loop {
            let name = match &self.current {
                Token::String(s) => s.clone(),
                _ => return Err(self.invalid()),
            };
            self.advance()?;

            if object.contains(&name) {
                return Err(ErrorCode::E101_DuplicateKey(name));
            }

            if self.current != Token::Colon {
                return Err(self.invalid());
            }
            self.advance()?;

            let value = self.parse_value()?;
            object.set(name, value);

            if object.len() as u64 > self.limits.max_object_fields {
                return Err(ErrorCode::E113_TooManyFields(
                    object.len() as u64,
                    self.limits.max_object_fields,
                ));
            }

            match &self.current {
                Token::Comma => {
                    self.advance()?;
                    if self.current == Token::RightBrace {
                        return Err(self.invalid());
                    }
                }
                Token::RightBrace => {
                    self.advance()?;
                    break;
                }
                _ => return Err(self.invalid()),
            }
        }

        self.depth -= 1;
        Ok(JsonValue::Object(object))
    }

    fn parse_array(&mut self) -> JcsResult<JsonValue> {
        self.enter()?;
        self.advance()?;

        let mut arr = Vec::new();

        if self.current == Token::RightBracket {
            self.advance()?;
            self.depth -= 1;
            return Ok(JsonValue::Array(arr));
        }

        loop {
            arr.push(self.parse_value()?);

            if arr.len() as u64 > self.limits.max_array_length {
                return Err(ErrorCode::E114_ArrayTooLong(
                    arr.len() as u64,
                    self.limits.max_array_length,
                ));
            }

            match &self.current {
                Token::Comma => {
                    self.advance()?;
                    if self.current == Token::RightBracket {
                        return Err(self.invalid());
                    }
                }
                Token::RightBracket => {
                    self.advance()?;
                    break;
                }
                _ => return Err(self.invalid()),
            }
        }

        self.depth -= 1;
        Ok(JsonValue::Array(arr))
    }
}

/// Parse a JSON document with strict limits.
pub fn parse(input: &[u8]) -> JcsResult<JsonValue> {
    parse_with_limits(input, Limits::strict())
}

/// Parse a JSON document with custom limits.
pub fn parse_with_limits(input: &[u8], limits: Limits) -> JcsResult<JsonValue> {
    let mut parser = Parser::new(input, limits)?;
    parser.parse()
}

/// Parse a document whose root must be an object.
pub fn parse_object(input: &[u8]) -> JcsResult<JsonObject> {
    match parse(input)? {
        JsonValue::Object(o) => Ok(o),
        _ => Err(ErrorCode::E102_InvalidRoot),
    }
}
