//! SQL output tokens.
//!
//! Rendering goes through a `TokenStream` so layout (spaces, newlines,
//! parentheses) is decided in one place.

/// An output token.
#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    // === Keywords ===
    Select,
    Distinct,
    From,
    Where,
    And,
    Not,
    Between,
    As,
    GroupBy,
    Having,
    OrderBy,
    Limit,
    Offset,
    Union,
    UnionAll,
    Asc,
    Desc,

    // === Punctuation ===
    Comma,
    LParen,
    RParen,

    // === Verbatim text (expressions, identifiers, numbers) ===
    Text(String),

    // === Whitespace ===
    Space,
    Newline,
}

impl Token {
    /// Serialize this token to its SQL spelling.
    pub fn serialize(&self) -> &str {
        match self {
            Token::Select => "SELECT",
            Token::Distinct => "DISTINCT",
            Token::From => "FROM",
            Token::Where => "WHERE",
            Token::And => "AND",
            Token::Not => "NOT",
            Token::Between => "BETWEEN",
            Token::As => "AS",
            Token::GroupBy => "GROUP BY",
            Token::Having => "HAVING",
            Token::OrderBy => "ORDER BY",
            Token::Limit => "LIMIT",
            Token::Offset => "OFFSET",
            Token::Union => "UNION",
            Token::UnionAll => "UNION ALL",
            Token::Asc => "ASC",
            Token::Desc => "DESC",
            Token::Comma => ",",
            Token::LParen => "(",
            Token::RParen => ")",
            Token::Text(s) => s,
            Token::Space => " ",
            Token::Newline => "\n",
        }
    }
}

/// A stream of tokens that serializes to SQL.
#[derive(Debug, Clone, Default)]
pub struct TokenStream {
    tokens: Vec<Token>,
}

impl TokenStream {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, token: Token) -> &mut Self {
        self.tokens.push(token);
        self
    }

    /// Push verbatim text.
    pub fn text(&mut self, s: impl Into<String>) -> &mut Self {
        self.push(Token::Text(s.into()))
    }

    /// Push items separated by `, `.
    pub fn comma_separated<T>(
        &mut self,
        items: &[T],
        mut each: impl FnMut(&mut Self, &T),
    ) -> &mut Self {
        for (i, item) in items.iter().enumerate() {
            if i > 0 {
                self.comma().space();
            }
            each(self, item);
        }
        self
    }

    /// Append another token stream.
    pub fn append(&mut self, other: &TokenStream) -> &mut Self {
        self.tokens.extend(other.tokens.iter().cloned());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    /// Serialize all tokens to a SQL string.
    pub fn serialize(&self) -> String {
        self.tokens.iter().map(Token::serialize).collect()
    }

    pub fn space(&mut self) -> &mut Self {
        self.push(Token::Space)
    }
    pub fn newline(&mut self) -> &mut Self {
        self.push(Token::Newline)
    }
    pub fn comma(&mut self) -> &mut Self {
        self.push(Token::Comma)
    }
    pub fn lparen(&mut self) -> &mut Self {
        self.push(Token::LParen)
    }
    pub fn rparen(&mut self) -> &mut Self {
        self.push(Token::RParen)
    }
}
