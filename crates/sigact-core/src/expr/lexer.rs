// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 MuVeraAI Corporation

//! Tokenizer for policy expressions.

use std::iter::Peekable;
use std::str::CharIndices;

use crate::error::CompileError;

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Token {
    Int(i64),
    Float(f64),
    Str(String),
    Ident(String),

    // Keywords
    True,
    False,
    Nil,
    And,
    Or,
    Not,
    In,
    Contains,
    StartsWith,
    EndsWith,

    // Punctuation
    LParen,
    RParen,
    LBracket,
    RBracket,
    Comma,
    Dot,
    Question,
    Colon,

    // Operators
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Bang,
    AndAnd,
    OrOr,
    EqEq,
    BangEq,
    Lt,
    Le,
    Gt,
    Ge,
}

impl Token {
    /// Source spelling of keyword tokens, so keywords can still be used as
    /// member names (`signal.in`).
    pub(crate) fn keyword_text(&self) -> Option<&'static str> {
        Some(match self {
            Token::True => "true",
            Token::False => "false",
            Token::Nil => "nil",
            Token::And => "and",
            Token::Or => "or",
            Token::Not => "not",
            Token::In => "in",
            Token::Contains => "contains",
            Token::StartsWith => "startsWith",
            Token::EndsWith => "endsWith",
            _ => return None,
        })
    }
}

/// A token and the byte offset where it starts.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Spanned {
    pub token: Token,
    pub offset: usize,
}

pub(crate) fn tokenize(source: &str) -> Result<Vec<Spanned>, CompileError> {
    let mut lexer = Lexer {
        source,
        chars: source.char_indices().peekable(),
    };
    let mut tokens = Vec::new();
    while let Some(spanned) = lexer.next_token()? {
        tokens.push(spanned);
    }
    Ok(tokens)
}

struct Lexer<'a> {
    source: &'a str,
    chars: Peekable<CharIndices<'a>>,
}

impl<'a> Lexer<'a> {
    fn next_token(&mut self) -> Result<Option<Spanned>, CompileError> {
        while self.chars.next_if(|(_, c)| c.is_whitespace()).is_some() {}

        let Some((offset, c)) = self.chars.next() else {
            return Ok(None);
        };

        let token = match c {
            '(' => Token::LParen,
            ')' => Token::RParen,
            '[' => Token::LBracket,
            ']' => Token::RBracket,
            ',' => Token::Comma,
            '.' => Token::Dot,
            '?' => Token::Question,
            ':' => Token::Colon,
            '+' => Token::Plus,
            '-' => Token::Minus,
            '*' => Token::Star,
            '/' => Token::Slash,
            '%' => Token::Percent,
            '!' if self.eat('=') => Token::BangEq,
            '!' => Token::Bang,
            '<' if self.eat('=') => Token::Le,
            '<' => Token::Lt,
            '>' if self.eat('=') => Token::Ge,
            '>' => Token::Gt,
            '=' if self.eat('=') => Token::EqEq,
            '&' if self.eat('&') => Token::AndAnd,
            '|' if self.eat('|') => Token::OrOr,
            '"' | '\'' => self.string(offset, c)?,
            c if c.is_ascii_digit() => self.number(offset)?,
            c if c.is_alphabetic() || c == '_' => self.word(offset),
            other => {
                return Err(CompileError::Syntax {
                    offset,
                    message: format!("unexpected character `{other}`"),
                })
            }
        };

        Ok(Some(Spanned { token, offset }))
    }

    fn eat(&mut self, expected: char) -> bool {
        self.chars.next_if(|&(_, c)| c == expected).is_some()
    }

    /// Byte offset of the next unread character.
    fn position(&mut self) -> usize {
        self.chars
            .peek()
            .map_or(self.source.len(), |&(offset, _)| offset)
    }

    fn string(&mut self, start: usize, quote: char) -> Result<Token, CompileError> {
        let mut text = String::new();
        loop {
            let Some((offset, c)) = self.chars.next() else {
                return Err(CompileError::UnexpectedEnd(format!(
                    "unterminated string starting at offset {start}"
                )));
            };
            match c {
                c if c == quote => return Ok(Token::Str(text)),
                '\\' => match self.chars.next() {
                    Some((_, 'n')) => text.push('\n'),
                    Some((_, 't')) => text.push('\t'),
                    Some((_, 'r')) => text.push('\r'),
                    Some((_, '\\')) => text.push('\\'),
                    Some((_, '"')) => text.push('"'),
                    Some((_, '\'')) => text.push('\''),
                    Some((_, other)) => {
                        return Err(CompileError::Syntax {
                            offset,
                            message: format!("unknown escape `\\{other}`"),
                        })
                    }
                    None => {
                        return Err(CompileError::UnexpectedEnd(format!(
                            "unterminated string starting at offset {start}"
                        )))
                    }
                },
                c => text.push(c),
            }
        }
    }

    fn number(&mut self, start: usize) -> Result<Token, CompileError> {
        while self.chars.next_if(|(_, c)| c.is_ascii_digit()).is_some() {}

        let mut is_float = false;

        // A fraction needs a digit after the dot; `1.foo` is not a number.
        let mut lookahead = self.chars.clone();
        if let (Some((_, '.')), Some((_, d))) = (lookahead.next(), lookahead.next()) {
            if d.is_ascii_digit() {
                is_float = true;
                self.chars.next();
                while self.chars.next_if(|(_, c)| c.is_ascii_digit()).is_some() {}
            }
        }

        if self.chars.next_if(|&(_, c)| c == 'e' || c == 'E').is_some() {
            is_float = true;
            self.chars.next_if(|&(_, c)| c == '+' || c == '-');
            if self.chars.next_if(|(_, c)| c.is_ascii_digit()).is_none() {
                return Err(CompileError::Syntax {
                    offset: start,
                    message: "exponent without digits".into(),
                });
            }
            while self.chars.next_if(|(_, c)| c.is_ascii_digit()).is_some() {}
        }

        let end = self.position();
        let text = &self.source[start..end];
        let invalid = |reason: String| CompileError::Syntax {
            offset: start,
            message: format!("invalid number `{text}`: {reason}"),
        };

        if is_float {
            match text.parse::<f64>() {
                Ok(value) if value.is_finite() => Ok(Token::Float(value)),
                Ok(_) => Err(invalid("out of range".into())),
                Err(error) => Err(invalid(error.to_string())),
            }
        } else {
            text.parse::<i64>()
                .map(Token::Int)
                .map_err(|error| invalid(error.to_string()))
        }
    }

    fn word(&mut self, start: usize) -> Token {
        while self
            .chars
            .next_if(|&(_, c)| c.is_alphanumeric() || c == '_')
            .is_some()
        {}
        let end = self.position();

        match &self.source[start..end] {
            "true" => Token::True,
            "false" => Token::False,
            "nil" | "null" => Token::Nil,
            "and" => Token::And,
            "or" => Token::Or,
            "not" => Token::Not,
            "in" => Token::In,
            "contains" => Token::Contains,
            "startsWith" => Token::StartsWith,
            "endsWith" => Token::EndsWith,
            ident => Token::Ident(ident.to_owned()),
        }
    }
}
