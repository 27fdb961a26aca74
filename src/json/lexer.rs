//! JSON lexer/tokenizer.
//!
//! Converts raw JSON input bytes into a stream of tokens for the parser.
//! Handles UTF-8 validation, escape sequences and surrogate pairing. Number
//! literals are passed through as text and validated by the parser.

use super::limits::Limits;
use crate::error::{ErrorCode, JcsResult};

/// Token types produced by the lexer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    /// Left brace `{`
    LeftBrace,
    /// Right brace `}`
    RightBrace,
    /// Left bracket `[`
    LeftBracket,
    /// Right bracket `]`
    RightBracket,
    /// Colon `:`
    Colon,
    /// Comma `,`
    Comma,
    /// Null literal
    Null,
    /// True literal
    True,
    /// False literal
    False,
    /// String value (unescaped)
    String(String),
    /// Number value (raw literal text)
    Number(String),
    /// End of input
    Eof,
}

/// JSON lexer that tokenizes input.
pub struct Lexer<'a> {
    input: &'a [u8],
    pos: usize,
    limits: Limits,
}

impl<'a> Lexer<'a> {
    /// Create a new lexer for the given input.
    pub fn new(input: &'a [u8], limits: Limits) -> JcsResult<Self> {
        if input.len() as u64 > limits.max_input_size {
            return Err(ErrorCode::E110_InputTooLarge(
                input.len() as u64,
                limits.max_input_size,
            ));
        }

        if std::str::from_utf8(input).is_err() {
            return Err(ErrorCode::E105_InvalidUTF8);
        }

        Ok(Self {
            input,
            pos: 0,
            limits,
        })
    }

    /// Get the current position in the input.
    pub fn position(&self) -> usize {
        self.pos
    }

    fn peek(&self) -> Option<u8> {
        self.input.get(self.pos).copied()
    }

    fn advance(&mut self) -> Option<u8> {
        let b = self.input.get(self.pos).copied();
        if b.is_some() {
            self.pos += 1;
        }
        b
    }

    fn invalid(&self) -> ErrorCode {
        ErrorCode::E100_InvalidJSON(self.pos)
    }

    fn skip_whitespace(&mut self) {
        while let Some(b' ' | b'\t' | b'\n' | b'\r') = self.peek() {
            self.pos += 1;
        }
    }

    /// Read the next token from the input.
    pub fn next_token(&mut self) -> JcsResult<Token> {
        self.skip_whitespace();

        let token = match self.peek() {
            None => return Ok(Token::Eof),
            Some(b'{') => Token::LeftBrace,
            Some(b'}') => Token::RightBrace,
            Some(b'[') => Token::LeftBracket,
            Some(b']') => Token::RightBracket,
            Some(b':') => Token::Colon,
            Some(b',') => Token::Comma,
            Some(b'"') => return self.read_string(),
            Some(b'-' | b'0'..=b'9') => return Ok(self.read_number()),
            Some(b't') => return self.read_literal(b"true", Token::True),
            Some(b'f') => return self.read_literal(b"false", Token::False),
            Some(b'n') => return self.read_literal(b"null", Token::Null),
            Some(_) => return Err(self.invalid()),
        };
        self.pos += 1;
        Ok(token)
    }

    /// Read a string token, handling escape sequences.
    fn read_string(&mut self) -> JcsResult<Token> {
        // Opening quote
        self.advance();

        let mut result = String::new();
        loop {
            match self.peek() {
                None => return Err(self.invalid()),
                Some(b'"') => {
                    self.pos += 1;
                    break;
                }
                Some(b'\\') => {
                    self.pos += 1;
                    let ch = self.read_escape_sequence()?;
                    result.push(ch);
                }
                Some(b) if b < 0x20 => return Err(self.invalid()),
                Some(b) if b < 0x80 => {
                    self.pos += 1;
                    result.push(b as char);
                }
                Some(_) => {
                    let ch = self.read_utf8_char()?;
                    result.push(ch);
                }
            }

            if result.len() as u64 > self.limits.max_string_length {
                return Err(ErrorCode::E112_StringTooLong(
                    result.len() as u64,
                    self.limits.max_string_length,
                ));
            }
        }

        Ok(Token::String(result))
    }

    /// Decode one multi-byte UTF-8 character. The input was validated up
    /// front, so this only has to find the sequence boundary.
    fn read_utf8_char(&mut self) -> JcsResult<char> {
        let lead = self.peek().ok_or(ErrorCode::E105_InvalidUTF8)?;
        let len = match lead {
            0xC0..=0xDF => 2,
            0xE0..=0xEF => 3,
            0xF0..=0xF7 => 4,
            _ => return Err(ErrorCode::E105_InvalidUTF8),
        };
        let end = self.pos + len;
        let bytes = self
            .input
            .get(self.pos..end)
            .ok_or(ErrorCode::E105_InvalidUTF8)?;
        let ch = std::str::from_utf8(bytes)
            .ok()
            .and_then(|s| s.chars().next())
            .ok_or(ErrorCode::E105_InvalidUTF8)?;
        self.pos = end;
        Ok(ch)
    }

    /// Read an escape sequence after a backslash.
    fn read_escape_sequence(&mut self) -> JcsResult<char> {
        let start = self.pos;
        match self.advance() {
            Some(b'"') => Ok('"'),
            Some(b'\\') => Ok('\\'),
            Some(b'/') => Ok('/'),
            Some(b'b') => Ok('\x08'),
            Some(b'f') => Ok('\x0C'),
            Some(b'n') => Ok('\n'),
            Some(b'r') => Ok('\r'),
            Some(b't') => Ok('\t'),
            Some(b'u') => self.read_unicode_escape(),
            _ => Err(ErrorCode::E103_MalformedEscape(start)),
        }
    }

    /// Read a \uXXXX escape, combining surrogate pairs.
    fn read_unicode_escape(&mut self) -> JcsResult<char> {
        let unit = self.read_hex4()?;

        if (0xD800..=0xDBFF).contains(&unit) {
            if self.advance() != Some(b'\\') || self.advance() != Some(b'u') {
                return Err(ErrorCode::E105_InvalidUTF8);
            }
            let low = self.read_hex4()?;
            if !(0xDC00..=0xDFFF).contains(&low) {
                return Err(ErrorCode::E105_InvalidUTF8);
            }
            let combined = 0x10000 + ((unit as u32 - 0xD800) << 10) + (low as u32 - 0xDC00);
            return char::from_u32(combined).ok_or(ErrorCode::E105_InvalidUTF8);
        }

        if (0xDC00..=0xDFFF).contains(&unit) {
            return Err(ErrorCode::E105_InvalidUTF8);
        }

        char::from_u32(unit as u32).ok_or(ErrorCode::E105_InvalidUTF8)
    }

    /// Read 4 hex digits and return the value.
    fn read_hex4(&mut self) -> JcsResult<u16> {
        let start = self.pos;
        let mut value: u16 = 0;
        for _ in 0..4 {
            let digit = match self.advance() {
                Some(b @ b'0'..=b'9') => b - b'0',
                Some(b @ b'a'..=b'f') => b - b'a' + 10,
                Some(b @ b'A'..=b'F') => b - b'A' + 10,
                _ => return Err(ErrorCode::E103_MalformedEscape(start)),
            };
            value = (value << 4) | digit as u16;
        }
        Ok(value)
    }

    /// Collect the characters that can belong to a number literal.
    fn read_number(&mut self) -> Token {
        let start = self.pos;
        while let Some(b'0'..=b'9' | b'-' | b'+' | b'.' | b'e' | b'E') = self.peek() {
            self.pos += 1;
        }
        // The slice is ASCII by construction
        let text = String::from_utf8_lossy(&self.input[start..self.pos]).into_owned();
        Token::Number(text)
    }

    fn read_literal(&mut self, expected: &[u8], token: Token) -> JcsResult<Token> {
        for &b in expected {
            if self.advance() != Some(b) {
                return Err(self.invalid());
            }
        }
        Ok(token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lex(input: &str) -> JcsResult<Vec<Token>> {
        let mut lexer = Lexer::new(input.as_bytes(), Limits::lenient())?;
        let mut tokens = Vec::new();
        loop {
            let token = lexer.next_token()?;
            if token == Token::Eof {
                break;
            }
            tokens.push(token);
        }
        Ok(tokens)
    }

    #[test]
    fn test_structural_tokens() {
        let tokens = lex("{}[],:").unwrap();
        assert_eq!(
            tokens,
            vec![
                Token::LeftBrace,
                Token::RightBrace,
                Token::LeftBracket,
                Token::RightBracket,
                Token::Comma,
                Token::Colon,
            ]
        );
    }

    #[test]
    fn test_literals() {
        let tokens = lex("null true false").unwrap();
        assert_eq!(tokens, vec![Token::Null, Token::True, Token::False]);
        assert!(lex("nul").is_err());
    }

    #[test]
    fn test_string_escapes() {
        let tokens = lex(r#""a\nb\tc\/A""#).unwrap();
        assert_eq!(tokens, vec![Token::String("a\nb\tc/A".to_string())]);
    }

    #[test]
    fn test_surrogate_pair() {
        let tokens = lex(r#""\uD83D\uDE00""#).unwrap();
        assert_eq!(tokens, vec![Token::String("\u{1F600}".to_string())]);
        assert!(matches!(lex(r#""\uD800""#), Err(ErrorCode::E105_InvalidUTF8)));
        assert!(matches!(lex(r#""\uDC00""#), Err(ErrorCode::E105_InvalidUTF8)));
    }

    #[test]
    fn test_raw_unicode() {
        let tokens = lex("\"\u{00e5}\u{20ac}\u{1F600}\"").unwrap();
        assert_eq!(
            tokens,
            vec![Token::String("\u{00e5}\u{20ac}\u{1F600}".to_string())]
        );
    }

    #[test]
    fn test_malformed_escape() {
        assert!(matches!(lex(r#""\x""#), Err(ErrorCode::E103_MalformedEscape(_))));
        assert!(matches!(lex(r#""\u12G4""#), Err(ErrorCode::E103_MalformedEscape(_))));
    }

    #[test]
    fn test_control_character_rejected() {
        assert!(lex("\"a\u{0001}b\"").is_err());
    }

    #[test]
    fn test_number_text() {
        let tokens = lex("42 -1.5e+3 0").unwrap();
        assert_eq!(
            tokens,
            vec![
                Token::Number("42".to_string()),
                Token::Number("-1.5e+3".to_string()),
                Token::Number("0".to_string()),
            ]
        );
    }

    #[test]
    fn test_invalid_utf8() {
        let invalid = vec![b'"', 0xFF, 0xFE, b'"'];
        assert!(matches!(
            Lexer::new(&invalid, Limits::strict()),
            Err(ErrorCode::E105_InvalidUTF8)
        ));
    }

    #[test]
    fn test_input_too_large() {
        let mut limits = Limits::strict();
        limits.max_input_size = 10;
        let result = Lexer::new(b"this is more than 10 bytes", limits);
        assert!(matches!(result, Err(ErrorCode::E110_InputTooLarge(26, 10))));
    }
}
