//! Token front end for raw SQL text.
//!
//! Tokenizing is done by `sqlparser` with the SQLite dialect, in no-unescape
//! mode so every token prints back exactly as written (`'it''s'` stays
//! `'it''s'`). Whitespace and comments are dropped; the parser only needs
//! the significant tokens and where they start.

use sqlparser::dialect::SQLiteDialect;
use sqlparser::keywords::Keyword;
use sqlparser::tokenizer::{Location, Token, TokenWithSpan, Tokenizer};

use super::{MalformedSqlError, SqlResult};

/// A significant token and the position it starts at.
#[derive(Debug, Clone, PartialEq)]
pub struct SqlToken {
    pub token: Token,
    pub location: Location,
}

impl SqlToken {
    /// True for an unquoted word that is `keyword`.
    pub fn is_keyword(&self, keyword: Keyword) -> bool {
        matches!(&self.token, Token::Word(w) if w.keyword == keyword)
    }

    pub fn is_any_keyword(&self, keywords: &[Keyword]) -> bool {
        matches!(&self.token, Token::Word(w) if keywords.contains(&w.keyword))
    }

    /// Case-insensitive match on an unquoted word that the tokenizer does not
    /// know as a keyword.
    pub fn is_word(&self, word: &str) -> bool {
        matches!(&self.token, Token::Word(w) if w.quote_style.is_none() && w.value.eq_ignore_ascii_case(word))
    }

    /// Identifier or string content with the quotes removed.
    pub fn unquoted(&self) -> String {
        match &self.token {
            Token::Word(w) => w.value.clone(),
            Token::SingleQuotedString(s) => s.clone(),
            other => other.to_string(),
        }
    }

    /// Source spelling of the token.
    pub fn text(&self) -> String {
        self.token.to_string()
    }
}

/// Keywords after which `(` keeps a separating space when reassembling text.
const SPACED_BEFORE_PAREN: &[Keyword] = &[
    Keyword::AND,
    Keyword::OR,
    Keyword::NOT,
    Keyword::IN,
    Keyword::AS,
    Keyword::BETWEEN,
    Keyword::EXISTS,
    Keyword::ON,
    Keyword::WHEN,
    Keyword::THEN,
    Keyword::ELSE,
    Keyword::SELECT,
    Keyword::FROM,
    Keyword::WHERE,
    Keyword::IS,
    Keyword::LIKE,
    Keyword::OVER,
    Keyword::BY,
    Keyword::CASE,
    Keyword::UNION,
    Keyword::ALL,
];

/// Split SQL text into significant tokens.
pub fn tokenize(sql: &str) -> SqlResult<Vec<SqlToken>> {
    let dialect = SQLiteDialect {};
    let tokens = Tokenizer::new(&dialect, sql)
        .with_unescape(false)
        .tokenize_with_location()
        .map_err(|e| MalformedSqlError::Tokenize(e.to_string()))?;

    let mut out = Vec::with_capacity(tokens.len());
    for TokenWithSpan { token, span } in tokens {
        match token {
            Token::Whitespace(_) | Token::EOF => {}
            Token::Char(ch) => {
                return Err(MalformedSqlError::UnexpectedCharacter {
                    ch,
                    line: span.start.line,
                    column: span.start.column,
                })
            }
            token => out.push(SqlToken {
                token,
                location: span.start,
            }),
        }
    }
    Ok(out)
}

/// Reassemble tokens into compact SQL text.
///
/// Commas and closing parentheses attach to the left, function-call
/// parentheses attach to their name, everything else is space separated.
pub fn join_tokens(tokens: &[SqlToken]) -> String {
    let mut out = String::new();
    for (i, tok) in tokens.iter().enumerate() {
        if i > 0 && needs_space(&tokens[i - 1].token, &tok.token) {
            out.push(' ');
        }
        out.push_str(&tok.text());
    }
    out
}

fn needs_space(prev: &Token, cur: &Token) -> bool {
    match (prev, cur) {
        (Token::LParen | Token::Period, _) => false,
        (_, Token::Comma | Token::RParen | Token::Period) => false,
        (Token::Word(w), Token::LParen) => SPACED_BEFORE_PAREN.contains(&w.keyword),
        _ => true,
    }
}
