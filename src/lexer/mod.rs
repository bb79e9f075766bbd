//! Lexer for the Pascal subset.
//!
//! Scans a source string into a stream of [`Token`]s. Keywords are
//! matched case-insensitively; identifiers keep their original casing.
//! Comments (`{ ... }` and `(* ... *)`) and whitespace are discarded.

mod token;

use std::iter::Peekable;
use std::str::Chars;

pub use token::{keyword, Token, TokenKind};

use crate::error::LexError;

pub struct Lexer<'a> {
    chars: Peekable<Chars<'a>>,
    line: usize,
}

impl<'a> Lexer<'a> {
    pub fn new(source: &'a str) -> Self {
        let source = source.strip_prefix('\u{feff}').unwrap_or(source);
        Self {
            chars: source.chars().peekable(),
            line: 1,
        }
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.chars.next();
        if c == Some('\n') {
            self.line += 1;
        }
        c
    }

    fn peek(&mut self) -> Option<char> {
        self.chars.peek().copied()
    }

    fn peek2(&mut self) -> Option<char> {
        let mut clone = self.chars.clone();
        clone.next();
        clone.next()
    }

    fn skip_trivia(&mut self) -> Result<(), LexError> {
        loop {
            match self.peek() {
                Some(' ') | Some('\t') | Some('\r') | Some('\n') => {
                    self.bump();
                }
                Some('{') => {
                    self.bump();
                    loop {
                        match self.bump() {
                            Some('}') => break,
                            Some(_) => {}
                            None => {
                                return Err(LexError {
                                    message: "unterminated '{' comment".to_string(),
                                    line: self.line,
                                })
                            }
                        }
                    }
                }
                Some('(') if self.peek2() == Some('*') => {
                    self.bump();
                    self.bump();
                    loop {
                        if self.peek() == Some('*') {
                            self.bump();
                            if self.peek() == Some(')') {
                                self.bump();
                                break;
                            }
                        } else if self.bump().is_none() {
                            return Err(LexError {
                                message: "unterminated '(*' comment".to_string(),
                                line: self.line,
                            });
                        }
                    }
                }
                _ => return Ok(()),
            }
        }
    }

    /// Scans and returns the next token, or an end-of-input token.
    pub fn next_token(&mut self) -> Result<Token, LexError> {
        self.skip_trivia()?;
        let line = self.line;

        let c = match self.peek() {
            Some(c) => c,
            None => return Ok(Token::new(TokenKind::Eof, line)),
        };

        if c.is_ascii_digit() {
            return self.lex_number(line);
        }
        if c.is_ascii_alphabetic() || c == '_' {
            return Ok(self.lex_ident(line));
        }
        if c == '\'' {
            return self.lex_string(line);
        }

        self.lex_punct(line)
    }

    fn lex_ident(&mut self, line: usize) -> Token {
        let mut ident = String::new();
        while let Some(c) = self.peek() {
            if c.is_ascii_alphanumeric() || c == '_' {
                ident.push(c);
                self.bump();
            } else {
                break;
            }
        }
        let kind = keyword(&ident.to_lowercase()).unwrap_or(TokenKind::Ident(ident));
        Token::new(kind, line)
    }

    fn lex_number(&mut self, line: usize) -> Result<Token, LexError> {
        let mut text = String::new();
        while let Some(c) = self.peek() {
            if c.is_ascii_digit() {
                text.push(c);
                self.bump();
            } else {
                break;
            }
        }

        let mut is_real = false;

        // A '.' only starts a fractional part if it is not the first half
        // of a '..' range token and is followed by a digit.
        if self.peek() == Some('.') && self.peek2().map(|c| c.is_ascii_digit()) == Some(true) {
            is_real = true;
            text.push('.');
            self.bump();
            while let Some(c) = self.peek() {
                if c.is_ascii_digit() {
                    text.push(c);
                    self.bump();
                } else {
                    break;
                }
            }
        }

        if matches!(self.peek(), Some('e') | Some('E')) {
            let mut clone = self.chars.clone();
            clone.next();
            let mut lookahead = clone.clone();
            let sign = matches!(lookahead.peek(), Some('+') | Some('-'));
            if sign {
                lookahead.next();
            }
            if lookahead.peek().map(|c| c.is_ascii_digit()) == Some(true) {
                is_real = true;
                text.push(self.bump().expect("peek() confirmed a char is here"));
                if matches!(self.peek(), Some('+') | Some('-')) {
                    text.push(self.bump().expect("peek() confirmed a char is here"));
                }
                while let Some(c) = self.peek() {
                    if c.is_ascii_digit() {
                        text.push(c);
                        self.bump();
                    } else {
                        break;
                    }
                }
            }
        }

        if is_real {
            let value: f64 = text.parse().map_err(|_| LexError {
                message: format!("invalid real literal '{text}'"),
                line,
            })?;
            Ok(Token::new(TokenKind::RealLiteral(value), line))
        } else {
            let value: i64 = text.parse().map_err(|_| LexError {
                message: format!("invalid integer literal '{text}'"),
                line,
            })?;
            Ok(Token::new(TokenKind::IntLiteral(value), line))
        }
    }

    fn lex_string(&mut self, line: usize) -> Result<Token, LexError> {
        self.bump(); // opening quote
        let mut value = String::new();
        loop {
            match self.bump() {
                Some('\'') => {
                    if self.peek() == Some('\'') {
                        self.bump();
                        value.push('\'');
                    } else {
                        break;
                    }
                }
                Some('\n') | None => {
                    return Err(LexError {
                        message: "unterminated string literal".to_string(),
                        line,
                    })
                }
                Some(c) => value.push(c),
            }
        }
        Ok(Token::new(TokenKind::StringLiteral(value), line))
    }

    fn lex_punct(&mut self, line: usize) -> Result<Token, LexError> {
        let c = self.bump().expect("next_token only calls lex_punct when peek() found a char");
        use TokenKind::*;
        let kind = match c {
            '+' => Plus,
            '-' => Minus,
            '*' => Star,
            '/' => Slash,
            '(' => LParen,
            ')' => RParen,
            '[' => LBracket,
            ']' => RBracket,
            ',' => Comma,
            ';' => Semicolon,
            ':' => {
                if self.peek() == Some('=') {
                    self.bump();
                    Assign
                } else {
                    Colon
                }
            }
            '=' => Eq,
            '<' => match self.peek() {
                Some('=') => {
                    self.bump();
                    LessEq
                }
                Some('>') => {
                    self.bump();
                    NotEq
                }
                _ => Less,
            },
            '>' => {
                if self.peek() == Some('=') {
                    self.bump();
                    GreaterEq
                } else {
                    Greater
                }
            }
            '.' => {
                if self.peek() == Some('.') {
                    self.bump();
                    DotDot
                } else {
                    Dot
                }
            }
            other => {
                return Err(LexError {
                    message: format!("unrecognized character '{other}'"),
                    line,
                })
            }
        };
        Ok(Token::new(kind, line))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokens(src: &str) -> Vec<TokenKind> {
        let mut lexer = Lexer::new(src);
        let mut out = vec![];
        loop {
            let tok = lexer.next_token().unwrap();
            if tok.kind == TokenKind::Eof {
                break;
            }
            out.push(tok.kind);
        }
        out
    }

    #[test]
    fn keywords_are_case_insensitive() {
        assert_eq!(tokens("PROGRAM Program program"), vec![
            TokenKind::Program,
            TokenKind::Program,
            TokenKind::Program
        ]);
    }

    #[test]
    fn identifiers_preserve_case() {
        assert_eq!(
            tokens("MyVar"),
            vec![TokenKind::Ident("MyVar".to_string())]
        );
    }

    #[test]
    fn range_vs_real_literal() {
        assert_eq!(tokens("1..3"), vec![
            TokenKind::IntLiteral(1),
            TokenKind::DotDot,
            TokenKind::IntLiteral(3)
        ]);
        assert_eq!(tokens("1.5"), vec![TokenKind::RealLiteral(1.5)]);
    }

    #[test]
    fn string_escape_doubling() {
        assert_eq!(
            tokens("'it''s'"),
            vec![TokenKind::StringLiteral("it's".to_string())]
        );
    }

    #[test]
    fn comments_are_skipped() {
        assert_eq!(
            tokens("{ a comment\nspanning lines } (* another *) begin"),
            vec![TokenKind::Begin]
        );
    }

    #[test]
    fn multi_char_punctuation() {
        assert_eq!(tokens(":= <= >= <>"), vec![
            TokenKind::Assign,
            TokenKind::LessEq,
            TokenKind::GreaterEq,
            TokenKind::NotEq
        ]);
    }

    #[test]
    fn unrecognized_character_errors_with_line() {
        let mut lexer = Lexer::new("begin\n@ end");
        lexer.next_token().unwrap();
        let err = lexer.next_token().unwrap_err();
        assert_eq!(err.line, 2);
    }
}
