//! Lexer (tokenizer) for the system description language.

use crate::error::{AlgebraError, Result};

/// A token produced by the lexer.
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    /// The kind of token
    pub kind: TokenKind,
    /// The token's text
    pub text: String,
    /// Line number (1-indexed)
    pub line: usize,
    /// Column number (1-indexed)
    pub column: usize,
}

/// Token types in the description language.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    /// An identifier (quantity, component, node or function name)
    Identifier,
    /// An unsigned number, possibly with an SI suffix
    Number,
    /// A directive (starts with '.')
    Directive,
    OpenParen,
    CloseParen,
    Comma,
    /// '='
    Equals,
    Plus,
    Minus,
    Star,
    Slash,
    Caret,
    /// '!'
    Bang,
    /// '=='
    EqualEqual,
    /// '!='
    NotEqual,
    Less,
    LessEqual,
    Greater,
    GreaterEqual,
    /// Newline
    Newline,
    /// End of file
    Eof,
}

/// Lexer for tokenizing description input.
pub struct Lexer<'a> {
    chars: std::iter::Peekable<std::str::CharIndices<'a>>,
    line: usize,
    column: usize,
}

impl<'a> Lexer<'a> {
    /// Create a new lexer for the given input.
    pub fn new(input: &'a str) -> Self {
        Self {
            chars: input.char_indices().peekable(),
            line: 1,
            column: 1,
        }
    }

    /// Get the next token.
    pub fn next_token(&mut self) -> Result<Token> {
        self.skip_whitespace_and_comments();

        let ch = match self.chars.peek() {
            Some(&(_, ch)) => ch,
            None => return Ok(self.token(TokenKind::Eof, String::new(), self.line, self.column)),
        };

        let start_line = self.line;
        let start_column = self.column;

        let kind = match ch {
            '\n' => TokenKind::Newline,
            '(' => TokenKind::OpenParen,
            ')' => TokenKind::CloseParen,
            ',' => TokenKind::Comma,
            '+' => TokenKind::Plus,
            '-' => TokenKind::Minus,
            '*' => TokenKind::Star,
            '/' => TokenKind::Slash,
            '^' => TokenKind::Caret,
            '=' | '!' | '<' | '>' => {
                self.advance();
                let followed_by_eq = matches!(self.chars.peek(), Some(&(_, '=')));
                if followed_by_eq {
                    self.advance();
                }
                let (kind, text) = match (ch, followed_by_eq) {
                    ('=', false) => (TokenKind::Equals, "="),
                    ('=', true) => (TokenKind::EqualEqual, "=="),
                    ('!', false) => (TokenKind::Bang, "!"),
                    ('!', true) => (TokenKind::NotEqual, "!="),
                    ('<', false) => (TokenKind::Less, "<"),
                    ('<', true) => (TokenKind::LessEqual, "<="),
                    ('>', false) => (TokenKind::Greater, ">"),
                    (_, _) => (TokenKind::GreaterEqual, ">="),
                };
                return Ok(self.token(kind, text.to_string(), start_line, start_column));
            }
            '.' => {
                self.advance();
                let text = self.read_identifier();
                if text.is_empty() {
                    return Err(AlgebraError::lexer(
                        start_line,
                        start_column,
                        "expected a directive name after '.'",
                    ));
                }
                return Ok(self.token(
                    TokenKind::Directive,
                    format!(".{}", text),
                    start_line,
                    start_column,
                ));
            }
            '0'..='9' => {
                let text = self.read_number();
                return Ok(self.token(TokenKind::Number, text, start_line, start_column));
            }
            _ if ch.is_alphabetic() || ch == '_' => {
                let text = self.read_identifier();
                return Ok(self.token(TokenKind::Identifier, text, start_line, start_column));
            }
            _ => {
                return Err(AlgebraError::lexer(
                    start_line,
                    start_column,
                    format!("unexpected character '{}'", ch),
                ));
            }
        };

        self.advance();
        Ok(self.token(kind, ch.to_string(), start_line, start_column))
    }

    fn token(&self, kind: TokenKind, text: String, line: usize, column: usize) -> Token {
        Token {
            kind,
            text,
            line,
            column,
        }
    }

    fn advance(&mut self) -> Option<char> {
        let (_, ch) = self.chars.next()?;
        if ch == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(ch)
    }

    fn skip_whitespace_and_comments(&mut self) {
        while let Some(&(_, ch)) = self.chars.peek() {
            if ch == ' ' || ch == '\t' || ch == '\r' {
                self.advance();
            } else if ch == '#' || ch == ';' {
                // Skip comment until end of line
                while let Some(&(_, c)) = self.chars.peek() {
                    if c == '\n' {
                        break;
                    }
                    self.advance();
                }
            } else {
                break;
            }
        }
    }

    fn read_identifier(&mut self) -> String {
        let mut text = String::new();
        while let Some(&(_, ch)) = self.chars.peek() {
            if ch.is_alphanumeric() || ch == '_' {
                text.push(ch);
                self.advance();
            } else {
                break;
            }
        }
        text
    }

    fn read_digits(&mut self, text: &mut String) {
        while let Some(&(_, ch)) = self.chars.peek() {
            if ch.is_ascii_digit() {
                text.push(ch);
                self.advance();
            } else {
                break;
            }
        }
    }

    fn read_number(&mut self) -> String {
        let mut text = String::new();

        // Integer part
        self.read_digits(&mut text);

        // Decimal part
        if let Some(&(_, '.')) = self.chars.peek() {
            text.push('.');
            self.advance();
            self.read_digits(&mut text);
        }

        // Exponent part
        if let Some(&(_, ch)) = self.chars.peek() {
            if ch == 'e' || ch == 'E' {
                text.push(ch);
                self.advance();
                if let Some(&(_, sign)) = self.chars.peek() {
                    if sign == '-' || sign == '+' {
                        text.push(sign);
                        self.advance();
                    }
                }
                self.read_digits(&mut text);
            }
        }

        // Unit suffix (p, n, u, m, k, M, G)
        if let Some(&(_, ch)) = self.chars.peek() {
            if matches!(ch, 'p' | 'n' | 'u' | 'µ' | 'm' | 'k' | 'K' | 'M' | 'G') {
                text.push(ch);
                self.advance();
            }
        }

        text
    }
}

/// Parse a number string with optional unit suffix.
pub fn parse_value(text: &str) -> Option<f64> {
    let text = text.trim();
    let last = text.chars().last()?;

    let multiplier = match last {
        'p' => 1e-12,
        'n' => 1e-9,
        'u' | 'µ' => 1e-6,
        'm' => 1e-3,
        'k' | 'K' => 1e3,
        'M' => 1e6,
        'G' => 1e9,
        _ => 1.0,
    };
    let digits = if multiplier != 1.0 {
        &text[..text.len() - last.len_utf8()]
    } else {
        text
    };

    digits.parse::<f64>().ok().map(|v| v * multiplier)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn kinds(input: &str) -> Vec<TokenKind> {
        let mut lexer = Lexer::new(input);
        let mut out = Vec::new();
        loop {
            let tok = lexer.next_token().unwrap();
            out.push(tok.kind);
            if tok.kind == TokenKind::Eof {
                return out;
            }
        }
    }

    #[test]
    fn test_parse_value() {
        assert_relative_eq!(parse_value("10k").unwrap(), 10_000.0);
        assert_relative_eq!(parse_value("100n").unwrap(), 100e-9);
        assert_relative_eq!(parse_value("4.7u").unwrap(), 4.7e-6);
        assert_relative_eq!(parse_value("1M").unwrap(), 1_000_000.0);
        assert_relative_eq!(parse_value("2.2").unwrap(), 2.2);
        assert_relative_eq!(parse_value("1e-9").unwrap(), 1e-9);
        assert!(parse_value("").is_none());
        assert!(parse_value("k").is_none());
    }

    #[test]
    fn test_lexer_basic() {
        let input = "R1 in out 10k";
        let mut lexer = Lexer::new(input);

        let tok = lexer.next_token().unwrap();
        assert_eq!(tok.kind, TokenKind::Identifier);
        assert_eq!(tok.text, "R1");

        let tok = lexer.next_token().unwrap();
        assert_eq!(tok.kind, TokenKind::Identifier);
        assert_eq!(tok.text, "in");

        lexer.next_token().unwrap();
        let tok = lexer.next_token().unwrap();
        assert_eq!(tok.kind, TokenKind::Number);
        assert_eq!(tok.text, "10k");
        assert_eq!(tok.column, 11);
    }

    #[test]
    fn test_lexer_directive() {
        let mut lexer = Lexer::new(".history vin vin_prev");
        let tok = lexer.next_token().unwrap();
        assert_eq!(tok.kind, TokenKind::Directive);
        assert_eq!(tok.text, ".history");
    }

    #[test]
    fn test_lexer_operators() {
        use TokenKind::*;
        assert_eq!(
            kinds("y = -a*b^2 <= c != d # done"),
            vec![
                Identifier, Equals, Minus, Identifier, Star, Identifier, Caret, Number, LessEqual,
                Identifier, NotEqual, Identifier, Eof
            ]
        );
        assert_eq!(kinds("f(a, 1e-3)\n"), vec![
            Identifier, OpenParen, Identifier, Comma, Number, CloseParen, Newline, Eof
        ]);
    }

    #[test]
    fn test_lexer_error_position() {
        let mut lexer = Lexer::new("x = 1\ny = $");
        let err = loop {
            match lexer.next_token() {
                Ok(tok) if tok.kind == TokenKind::Eof => panic!("expected an error"),
                Ok(_) => continue,
                Err(e) => break e,
            }
        };
        assert!(matches!(err, AlgebraError::LexerError { line: 2, column: 5, .. }));
    }
}
