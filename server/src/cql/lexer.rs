//! Tokenizer for the statement language.
//!
//! String literals are single-quoted with `''` escaping a quote. Their content
//! is taken verbatim: no trimming, no escape sequences beyond `''`, and any
//! character including NUL is allowed.

use crate::cql::ParseError;

/// A lexical token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    /// Unquoted identifier or keyword, as written.
    Identifier(String),
    /// Double-quoted identifier, case preserved.
    QuotedIdentifier(String),
    /// Single-quoted string literal, unescaped.
    String(String),
    /// Hex blob literal digits, without the `0x` prefix.
    Hex(String),
    /// Integer or decimal literal, as written.
    Number(String),
    QuestionMark,
    LeftParen,
    RightParen,
    LeftBrace,
    RightBrace,
    Comma,
    Dot,
    Semicolon,
    Equals,
    Star,
    Colon,
}

impl Token {
    /// Whether this token is the keyword `keyword` (case-insensitive).
    #[must_use]
    pub fn is_keyword(&self, keyword: &str) -> bool {
        matches!(self, Self::Identifier(s) if s.eq_ignore_ascii_case(keyword))
    }
}

/// Split a statement into tokens.
pub fn tokenize(source: &str) -> Result<Vec<Token>, ParseError> {
    let mut tokens = Vec::new();
    let mut chars = source.char_indices().peekable();

    while let Some(&(start, c)) = chars.peek() {
        match c {
            c if c.is_whitespace() => {
                chars.next();
            }
            '\'' => {
                chars.next();
                let mut literal = String::new();
                loop {
                    match chars.next() {
                        Some((_, '\'')) => {
                            if matches!(chars.peek(), Some((_, '\''))) {
                                chars.next();
                                literal.push('\'');
                            } else {
                                break;
                            }
                        }
                        Some((_, ch)) => literal.push(ch),
                        None => {
                            return Err(ParseError::Syntax(format!(
                                "unterminated string literal starting at offset {start}"
                            )));
                        }
                    }
                }
                tokens.push(Token::String(literal));
            }
            '"' => {
                chars.next();
                let mut name = String::new();
                loop {
                    match chars.next() {
                        Some((_, '"')) => {
                            if matches!(chars.peek(), Some((_, '"'))) {
                                chars.next();
                                name.push('"');
                            } else {
                                break;
                            }
                        }
                        Some((_, ch)) => name.push(ch),
                        None => {
                            return Err(ParseError::Syntax(format!(
                                "unterminated quoted identifier starting at offset {start}"
                            )));
                        }
                    }
                }
                tokens.push(Token::QuotedIdentifier(name));
            }
            '0'..='9' | '-' => {
                chars.next();
                let is_hex_prefix = c == '0' && matches!(chars.peek(), Some((_, 'x' | 'X')));
                if is_hex_prefix {
                    chars.next();
                    let mut digits = String::new();
                    while let Some(&(_, d)) = chars.peek() {
                        if !d.is_ascii_alphanumeric() {
                            break;
                        }
                        digits.push(d);
                        chars.next();
                    }
                    tokens.push(Token::Hex(digits));
                } else {
                    let mut number = String::from(c);
                    while let Some(&(_, d)) = chars.peek() {
                        if !(d.is_ascii_digit() || d == '.') {
                            break;
                        }
                        number.push(d);
                        chars.next();
                    }
                    if number == "-" {
                        return Err(ParseError::Syntax(format!(
                            "unexpected character '-' at offset {start}"
                        )));
                    }
                    tokens.push(Token::Number(number));
                }
            }
            c if c.is_alphabetic() || c == '_' => {
                let mut ident = String::new();
                while let Some(&(_, d)) = chars.peek() {
                    if !(d.is_alphanumeric() || d == '_') {
                        break;
                    }
                    ident.push(d);
                    chars.next();
                }
                tokens.push(Token::Identifier(ident));
            }
            _ => {
                let token = match c {
                    '?' => Token::QuestionMark,
                    '(' => Token::LeftParen,
                    ')' => Token::RightParen,
                    '{' => Token::LeftBrace,
                    '}' => Token::RightBrace,
                    ',' => Token::Comma,
                    '.' => Token::Dot,
                    ';' => Token::Semicolon,
                    '=' => Token::Equals,
                    '*' => Token::Star,
                    ':' => Token::Colon,
                    other => {
                        return Err(ParseError::Syntax(format!(
                            "unexpected character '{other}' at offset {start}"
                        )));
                    }
                };
                chars.next();
                tokens.push(token);
            }
        }
    }

    Ok(tokens)
}
