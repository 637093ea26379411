//! Query string parsing.
//!
//! ```text
//! query    := or_expr EOF
//! or_expr  := and_expr (OR and_expr)*
//! and_expr := primary ((AND)? primary)*
//! primary  := WORD | "PHRASE" | '(' or_expr ')'
//! ```
//!
//! `AND`/`OR` are case-insensitive keywords; adjacent terms are implicitly AND-ed.
//! Nesting is limited to [`MAX_DEPTH`] groups and [`MAX_CLAUSES`] leaves, which also bounds
//! the depth of the resulting tree.
//! Positions in errors are 0-based character offsets into the query string.

use crate::error::{LexisError, Result};
use std::fmt;

/// Deepest parenthesis nesting accepted.
pub const MAX_DEPTH: usize = 256;
/// Most term/phrase clauses accepted in one query.
pub const MAX_CLAUSES: usize = 1024;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Query {
    Term(String),
    And(Box<Query>, Box<Query>),
    Or(Box<Query>, Box<Query>),
    Phrase(Vec<String>),
}

impl Query {
    /// Raw leaf terms in query order (phrase words included).
    pub fn terms(&self) -> Vec<&str> {
        let mut out = Vec::new();
        self.collect_terms(&mut out);
        out
    }

    fn collect_terms<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            Query::Term(t) => out.push(t),
            Query::Phrase(words) => out.extend(words.iter().map(String::as_str)),
            Query::And(l, r) | Query::Or(l, r) => {
                l.collect_terms(out);
                r.collect_terms(out);
            }
        }
    }
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Query::Term(t) => write!(f, "{t}"),
            Query::Phrase(words) => write!(f, "\"{}\"", words.join(" ")),
            Query::And(l, r) => write!(f, "({l} AND {r})"),
            Query::Or(l, r) => write!(f, "({l} OR {r})"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Word(String),
    Phrase(Vec<String>),
    And,
    Or,
    LeftParen,
    RightParen,
    Eof,
}

#[derive(Debug, Clone)]
struct Spanned {
    token: Token,
    position: usize,
    text: String,
}

struct Lexer {
    input: Vec<char>,
    position: usize,
}

impl Lexer {
    fn new(input: &str) -> Self {
        Self { input: input.chars().collect(), position: 0 }
    }

    fn tokenize(mut self) -> Result<Vec<Spanned>> {
        let mut tokens = Vec::new();
        loop {
            let tok = self.next_token()?;
            let done = tok.token == Token::Eof;
            tokens.push(tok);
            if done {
                return Ok(tokens);
            }
        }
    }

    fn next_token(&mut self) -> Result<Spanned> {
        while self.position < self.input.len() && self.input[self.position].is_whitespace() {
            self.position += 1;
        }
        let start = self.position;
        let Some(&ch) = self.input.get(start) else {
            return Ok(Spanned { token: Token::Eof, position: start, text: String::new() });
        };
        match ch {
            '(' | ')' => {
                self.position += 1;
                let token = if ch == '(' { Token::LeftParen } else { Token::RightParen };
                Ok(Spanned { token, position: start, text: ch.to_string() })
            }
            '"' => self.read_phrase(start),
            _ => {
                while self.position < self.input.len() && !is_delimiter(self.input[self.position]) {
                    self.position += 1;
                }
                let text: String = self.input[start..self.position].iter().collect();
                let token = if text.eq_ignore_ascii_case("and") {
                    Token::And
                } else if text.eq_ignore_ascii_case("or") {
                    Token::Or
                } else {
                    Token::Word(text.clone())
                };
                Ok(Spanned { token, position: start, text })
            }
        }
    }

    fn read_phrase(&mut self, start: usize) -> Result<Spanned> {
        let close = self.input[start + 1..].iter().position(|&c| c == '"').map(|i| start + 1 + i);
        let Some(close) = close else {
            let fragment: String = self.input[start..].iter().collect();
            return Err(LexisError::syntax("unterminated phrase", fragment, start));
        };
        self.position = close + 1;
        let text: String = self.input[start..=close].iter().collect();
        let inner: String = self.input[start + 1..close].iter().collect();
        let words: Vec<String> = inner.split_whitespace().map(str::to_string).collect();
        if words.is_empty() {
            return Err(LexisError::syntax("empty phrase", text, start));
        }
        Ok(Spanned { token: Token::Phrase(words), position: start, text })
    }
}

fn is_delimiter(c: char) -> bool {
    c.is_whitespace() || matches!(c, '"' | '(' | ')')
}

struct Parser {
    tokens: Vec<Spanned>,
    cursor: usize,
    depth: usize,
    clauses: usize,
}

impl Parser {
    fn current(&self) -> &Spanned { &self.tokens[self.cursor] }

    fn advance(&mut self) -> Spanned {
        let tok = self.tokens[self.cursor].clone();
        if tok.token != Token::Eof {
            self.cursor += 1;
        }
        tok
    }

    fn starts_primary(&self) -> bool {
        matches!(self.current().token, Token::Word(_) | Token::Phrase(_) | Token::LeftParen)
    }

    fn parse_or(&mut self) -> Result<Query> {
        let mut left = self.parse_and()?;
        while self.current().token == Token::Or {
            let op = self.advance();
            if !self.starts_primary() {
                return Err(LexisError::syntax("dangling operator", op.text, op.position));
            }
            let right = self.parse_and()?;
            left = Query::Or(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<Query> {
        let mut left = self.parse_primary()?;
        loop {
            if self.current().token == Token::And {
                let op = self.advance();
                if !self.starts_primary() {
                    return Err(LexisError::syntax("dangling operator", op.text, op.position));
                }
            } else if !self.starts_primary() {
                return Ok(left);
            }
            let right = self.parse_primary()?;
            left = Query::And(Box::new(left), Box::new(right));
        }
    }

    fn count_clause(&mut self, tok: &Spanned) -> Result<()> {
        self.clauses += 1;
        if self.clauses > MAX_CLAUSES {
            return Err(LexisError::syntax("too many clauses", tok.text.clone(), tok.position));
        }
        Ok(())
    }

    fn parse_primary(&mut self) -> Result<Query> {
        let tok = self.advance();
        if matches!(tok.token, Token::Word(_) | Token::Phrase(_)) {
            self.count_clause(&tok)?;
        }
        match tok.token {
            Token::Word(w) => Ok(Query::Term(w)),
            Token::Phrase(words) => Ok(Query::Phrase(words)),
            Token::LeftParen => {
                if self.current().token == Token::RightParen {
                    return Err(LexisError::syntax("empty group", "()", tok.position));
                }
                if self.depth == MAX_DEPTH {
                    return Err(LexisError::syntax("query nested too deeply", tok.text, tok.position));
                }
                self.depth += 1;
                let inner = self.parse_or()?;
                self.depth -= 1;
                if self.current().token != Token::RightParen {
                    return Err(LexisError::syntax("unbalanced parenthesis", tok.text, tok.position));
                }
                self.advance();
                Ok(inner)
            }
            Token::And | Token::Or => Err(LexisError::syntax("dangling operator", tok.text, tok.position)),
            Token::RightParen => Err(LexisError::syntax("unbalanced parenthesis", tok.text, tok.position)),
            Token::Eof => Err(LexisError::syntax("unexpected end of query", "", tok.position)),
        }
    }
}

/// Parse a query string. Blank input is `EmptyQuery`; malformed input is `QuerySyntax`.
pub fn parse(input: &str) -> Result<Query> {
    if input.trim().is_empty() {
        return Err(LexisError::EmptyQuery);
    }
    let tokens = Lexer::new(input).tokenize()?;
    let mut parser = Parser { tokens, cursor: 0, depth: 0, clauses: 0 };
    let query = parser.parse_or()?;
    let rest = parser.current().clone();
    match rest.token {
        Token::Eof => Ok(query),
        Token::RightParen => Err(LexisError::syntax("unbalanced parenthesis", rest.text, rest.position)),
        _ => Err(LexisError::syntax("unexpected token", rest.text, rest.position)),
    }
}
