//! Tokenizer for band math expressions.

use crate::core::error::{ExpressionError, ExpressionResult};

/// A lexical token with its byte offset in the source.
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub position: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    Integer(i64),
    Float(f64),
    Identifier(String),
    Plus,
    Minus,
    Star,
    Slash,
    Caret,
    Bang,
    Less,
    LessEqual,
    Greater,
    GreaterEqual,
    EqualEqual,
    BangEqual,
    AndAnd,
    OrOr,
    Question,
    Colon,
    Comma,
    Semicolon,
    LeftParen,
    RightParen,
    LeftBrace,
    RightBrace,
    End,
}

impl TokenKind {
    /// Short description for parse errors.
    pub fn describe(&self) -> String {
        match self {
            TokenKind::Integer(i) => i.to_string(),
            TokenKind::Float(f) => f.to_string(),
            TokenKind::Identifier(name) => format!("'{}'", name),
            TokenKind::End => "end of expression".to_string(),
            other => format!("'{}'", other.symbol()),
        }
    }

    fn symbol(&self) -> &'static str {
        match self {
            TokenKind::Plus => "+",
            TokenKind::Minus => "-",
            TokenKind::Star => "*",
            TokenKind::Slash => "/",
            TokenKind::Caret => "^",
            TokenKind::Bang => "!",
            TokenKind::Less => "<",
            TokenKind::LessEqual => "<=",
            TokenKind::Greater => ">",
            TokenKind::GreaterEqual => ">=",
            TokenKind::EqualEqual => "==",
            TokenKind::BangEqual => "!=",
            TokenKind::AndAnd => "&&",
            TokenKind::OrOr => "||",
            TokenKind::Question => "?",
            TokenKind::Colon => ":",
            TokenKind::Comma => ",",
            TokenKind::Semicolon => ";",
            TokenKind::LeftParen => "(",
            TokenKind::RightParen => ")",
            TokenKind::LeftBrace => "{",
            TokenKind::RightBrace => "}",
            _ => "",
        }
    }
}

/// Split `source` into tokens. The last token is always [`TokenKind::End`].
pub fn tokenize(source: &str) -> ExpressionResult<Vec<Token>> {
    let bytes = source.as_bytes();
    let mut tokens = Vec::new();
    let mut pos = 0;

    while pos < bytes.len() {
        let c = bytes[pos];
        if c.is_ascii_whitespace() {
            pos += 1;
            continue;
        }

        let start = pos;
        let kind = if c.is_ascii_digit() || (c == b'.' && bytes.get(pos + 1).is_some_and(u8::is_ascii_digit)) {
            let (kind, end) = scan_number(source, pos)?;
            pos = end;
            kind
        } else if c.is_ascii_alphabetic() || c == b'_' {
            while pos < bytes.len() && (bytes[pos].is_ascii_alphanumeric() || bytes[pos] == b'_') {
                pos += 1;
            }
            TokenKind::Identifier(source[start..pos].to_string())
        } else {
            let next = bytes.get(pos + 1).copied();
            let (kind, width) = match (c, next) {
                (b'<', Some(b'=')) => (TokenKind::LessEqual, 2),
                (b'>', Some(b'=')) => (TokenKind::GreaterEqual, 2),
                (b'=', Some(b'=')) => (TokenKind::EqualEqual, 2),
                (b'!', Some(b'=')) => (TokenKind::BangEqual, 2),
                (b'&', Some(b'&')) => (TokenKind::AndAnd, 2),
                (b'|', Some(b'|')) => (TokenKind::OrOr, 2),
                (b'+', _) => (TokenKind::Plus, 1),
                (b'-', _) => (TokenKind::Minus, 1),
                (b'*', _) => (TokenKind::Star, 1),
                (b'/', _) => (TokenKind::Slash, 1),
                (b'^', _) => (TokenKind::Caret, 1),
                (b'!', _) => (TokenKind::Bang, 1),
                (b'<', _) => (TokenKind::Less, 1),
                (b'>', _) => (TokenKind::Greater, 1),
                (b'?', _) => (TokenKind::Question, 1),
                (b':', _) => (TokenKind::Colon, 1),
                (b',', _) => (TokenKind::Comma, 1),
                (b';', _) => (TokenKind::Semicolon, 1),
                (b'(', _) => (TokenKind::LeftParen, 1),
                (b')', _) => (TokenKind::RightParen, 1),
                (b'{', _) => (TokenKind::LeftBrace, 1),
                (b'}', _) => (TokenKind::RightBrace, 1),
                _ => {
                    let ch = source[pos..].chars().next().unwrap_or('?');
                    return Err(ExpressionError::Parse {
                        position: pos,
                        message: format!("unexpected character '{}'", ch),
                    });
                }
            };
            pos += width;
            kind
        };
        tokens.push(Token { kind, position: start });
    }

    tokens.push(Token {
        kind: TokenKind::End,
        position: bytes.len(),
    });
    Ok(tokens)
}

fn scan_number(source: &str, start: usize) -> ExpressionResult<(TokenKind, usize)> {
    let bytes = source.as_bytes();
    let mut pos = start;
    let mut is_float = false;

    while pos < bytes.len() && bytes[pos].is_ascii_digit() {
        pos += 1;
    }
    if pos < bytes.len() && bytes[pos] == b'.' {
        is_float = true;
        pos += 1;
        while pos < bytes.len() && bytes[pos].is_ascii_digit() {
            pos += 1;
        }
    }
    if pos < bytes.len() && (bytes[pos] == b'e' || bytes[pos] == b'E') {
        let mut look = pos + 1;
        if look < bytes.len() && (bytes[look] == b'+' || bytes[look] == b'-') {
            look += 1;
        }
        if look < bytes.len() && bytes[look].is_ascii_digit() {
            is_float = true;
            pos = look;
            while pos < bytes.len() && bytes[pos].is_ascii_digit() {
                pos += 1;
            }
        }
    }

    let text = &source[start..pos];
    let invalid = || ExpressionError::Parse {
        position: start,
        message: format!("invalid number '{}'", text),
    };
    let kind = if is_float {
        TokenKind::Float(text.parse().map_err(|_| invalid())?)
    } else {
        // Integers too large for i64 fall back to float
        match text.parse::<i64>() {
            Ok(i) => TokenKind::Integer(i),
            Err(_) => TokenKind::Float(text.parse().map_err(|_| invalid())?),
        }
    };
    Ok((kind, pos))
}
