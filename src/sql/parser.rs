//! SQL text → `SqlStatement`.
//!
//! The parser splits on structure only: set operators and clause keywords at
//! parenthesis depth zero, commas for lists, `AND` for WHERE conjuncts.
//! Expressions inside those boundaries are kept as text.
//!
//! Placement of ORDER BY / LIMIT follows how the text reads:
//!
//! ```text
//! SELECT .. ORDER BY x UNION ALL SELECT ..            arm 0 owns ORDER BY (a defect)
//! SELECT .. UNION ALL SELECT .. ORDER BY x            statement owns ORDER BY
//! (SELECT .. LIMIT 5) UNION ALL (SELECT ..) LIMIT 9   arm 0 owns LIMIT 5, statement owns LIMIT 9
//! ```

use sqlparser::keywords::Keyword;
use sqlparser::tokenizer::{Location, Token};

use super::lexer::{join_tokens, tokenize, SqlToken};
use super::statement::{
    Expr, Limit, OrderBy, OrderItem, Predicate, SelectBlock, SelectItem, SetOperator, SortDir,
    SqlStatement,
};
use super::{MalformedSqlError, SqlResult};

/// Keywords that never serve as a bare column alias.
const RESERVED: &[Keyword] = &[
    Keyword::END,
    Keyword::NULL,
    Keyword::TRUE,
    Keyword::FALSE,
    Keyword::AND,
    Keyword::OR,
    Keyword::NOT,
    Keyword::IS,
    Keyword::IN,
    Keyword::LIKE,
    Keyword::THEN,
    Keyword::ELSE,
    Keyword::WHEN,
    Keyword::CASE,
    Keyword::ASC,
    Keyword::DESC,
    Keyword::BETWEEN,
    Keyword::AS,
    Keyword::DISTINCT,
];

/// Result of parsing, with notes about tolerated damage.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedSql {
    pub statement: SqlStatement,
    /// Unmatched `)` tokens dropped from the end of the text.
    pub stray_closing_parens: usize,
}

/// Parse SQL text into a statement.
pub fn parse(sql: &str) -> SqlResult<SqlStatement> {
    parse_sql(sql).map(|parsed| parsed.statement)
}

/// Parse SQL text, reporting tolerated damage alongside the statement.
///
/// Tolerated: surrounding code fences, trailing semicolons and whitespace,
/// unmatched closing parentheses at the very end.
pub fn parse_sql(sql: &str) -> SqlResult<ParsedSql> {
    let cleaned = strip_code_fences(sql);
    let mut tokens = tokenize(cleaned)?;

    while tokens.last().is_some_and(|t| t.token == Token::SemiColon) {
        tokens.pop();
    }
    if tokens.iter().any(|t| t.token == Token::SemiColon) {
        return Err(MalformedSqlError::MultipleStatements);
    }

    let stray_closing_parens = drop_stray_closers(&mut tokens)?;
    if tokens.is_empty() {
        return Err(MalformedSqlError::Empty);
    }

    let statement = parse_statement(&tokens)?;
    Ok(ParsedSql {
        statement,
        stray_closing_parens,
    })
}

fn strip_code_fences(sql: &str) -> &str {
    let mut s = sql.trim();
    if let Some(rest) = s.strip_prefix("```") {
        s = rest
            .strip_prefix("sql")
            .or_else(|| rest.strip_prefix("SQL"))
            .unwrap_or(rest);
    }
    if let Some(rest) = s.strip_suffix("```") {
        s = rest;
    }
    s.trim()
}

/// Check parenthesis balance. A run of unmatched `)` that ends the text is
/// removed; any other imbalance is an error.
fn drop_stray_closers(tokens: &mut Vec<SqlToken>) -> SqlResult<usize> {
    let mut open: Vec<Location> = Vec::new();
    let mut stray_at = None;

    for (i, tok) in tokens.iter().enumerate() {
        match tok.token {
            Token::LParen => open.push(tok.location),
            Token::RParen => {
                if open.pop().is_none() {
                    stray_at = Some(i);
                    break;
                }
            }
            _ => {}
        }
    }

    if let Some(i) = stray_at {
        if tokens[i..].iter().all(|t| t.token == Token::RParen) {
            let stray = tokens.len() - i;
            tokens.truncate(i);
            return Ok(stray);
        }
        return Err(unbalanced(tokens[i].location));
    }

    match open.last() {
        Some(&location) => Err(unbalanced(location)),
        None => Ok(0),
    }
}

fn unbalanced(location: Location) -> MalformedSqlError {
    MalformedSqlError::UnbalancedParens {
        line: location.line,
        column: location.column,
    }
}

// ============================================================================
// Structure helpers
// ============================================================================

/// Indices of non-parenthesis tokens sitting at depth zero.
fn depth_zero(tokens: &[SqlToken]) -> Vec<usize> {
    let mut depth = 0i32;
    let mut out = Vec::new();
    for (i, tok) in tokens.iter().enumerate() {
        match tok.token {
            Token::LParen => depth += 1,
            Token::RParen => depth -= 1,
            _ if depth == 0 => out.push(i),
            _ => {}
        }
    }
    out
}

fn split_top_level(tokens: &[SqlToken], is_separator: impl Fn(&SqlToken) -> bool) -> Vec<&[SqlToken]> {
    let mut parts = Vec::new();
    let mut start = 0;
    for i in depth_zero(tokens) {
        if is_separator(&tokens[i]) {
            parts.push(&tokens[start..i]);
            start = i + 1;
        }
    }
    parts.push(&tokens[start..]);
    parts
}

fn split_commas(tokens: &[SqlToken]) -> Vec<&[SqlToken]> {
    split_top_level(tokens, |t| t.token == Token::Comma)
}

fn matching_paren(tokens: &[SqlToken], open: usize) -> Option<usize> {
    let mut depth = 0i32;
    for (i, tok) in tokens.iter().enumerate().skip(open) {
        match tok.token {
            Token::LParen => depth += 1,
            Token::RParen => {
                depth -= 1;
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
    }
    None
}

fn expr(tokens: &[SqlToken]) -> Expr {
    Expr::new(join_tokens(tokens))
}

fn unexpected(tok: &SqlToken) -> MalformedSqlError {
    MalformedSqlError::UnexpectedToken {
        token: tok.text(),
        line: tok.location.line,
        column: tok.location.column,
    }
}

// ============================================================================
// Statement level
// ============================================================================

fn parse_statement(tokens: &[SqlToken]) -> SqlResult<SqlStatement> {
    if tokens[0].is_keyword(Keyword::WITH) {
        return Err(MalformedSqlError::Unsupported(
            "WITH (common table expressions)".into(),
        ));
    }

    let (arms, set_operator) = split_arms(tokens)?;
    let last = arms.len() - 1;
    let mut statement = SqlStatement {
        selects: Vec::with_capacity(arms.len()),
        set_operator,
        trailing_order_by: None,
        trailing_limit: None,
    };

    for (i, arm) in arms.into_iter().enumerate() {
        if arm[0].token == Token::LParen {
            let close = matching_paren(arm, 0).ok_or_else(|| unbalanced(arm[0].location))?;
            let block = parse_block(&arm[1..close], i)?;
            let tail = &arm[close + 1..];
            if !tail.is_empty() {
                if i != last {
                    return Err(unexpected(&tail[0]));
                }
                let (order_by, limit) = parse_tail(tail)?;
                statement.trailing_order_by = order_by;
                statement.trailing_limit = limit;
            }
            statement.selects.push(block);
        } else {
            let mut block = parse_block(arm, i)?;
            if i == last {
                statement.trailing_order_by = block.order_by.take();
                statement.trailing_limit = block.limit.take();
            }
            statement.selects.push(block);
        }
    }

    // A lone parenthesized SELECT: its clauses are the statement's.
    if let [only] = statement.selects.as_mut_slice() {
        if statement.trailing_order_by.is_none() {
            statement.trailing_order_by = only.order_by.take();
        }
        if statement.trailing_limit.is_none() {
            statement.trailing_limit = only.limit.take();
        }
    }

    Ok(statement)
}

fn split_arms(tokens: &[SqlToken]) -> SqlResult<(Vec<&[SqlToken]>, SetOperator)> {
    let mut arms = Vec::new();
    let mut operator = SetOperator::None;
    let mut start = 0;

    for i in depth_zero(tokens) {
        if i < start {
            continue;
        }
        let tok = &tokens[i];
        if tok.is_any_keyword(&[Keyword::INTERSECT, Keyword::EXCEPT]) || tok.is_word("MINUS") {
            return Err(MalformedSqlError::UnsupportedSetOperator(
                tok.text().to_uppercase(),
            ));
        }
        if tok.is_keyword(Keyword::UNION) {
            let all = tokens.get(i + 1).is_some_and(|n| n.is_keyword(Keyword::ALL));
            let this = if all {
                SetOperator::UnionAll
            } else {
                SetOperator::Union
            };
            if operator != SetOperator::None && operator != this {
                return Err(MalformedSqlError::MixedSetOperators);
            }
            operator = this;
            arms.push(&tokens[start..i]);
            start = i + if all { 2 } else { 1 };
        }
    }
    arms.push(&tokens[start..]);

    if arms.iter().any(|arm| arm.is_empty()) {
        return Err(MalformedSqlError::EmptyClause { clause: "UNION arm" });
    }
    Ok((arms, operator))
}

// ============================================================================
// Clause level
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Clause {
    From,
    Where,
    GroupBy,
    Having,
    OrderBy,
    Limit,
}

impl Clause {
    fn name(&self) -> &'static str {
        match self {
            Clause::From => "FROM",
            Clause::Where => "WHERE",
            Clause::GroupBy => "GROUP BY",
            Clause::Having => "HAVING",
            Clause::OrderBy => "ORDER BY",
            Clause::Limit => "LIMIT",
        }
    }
}

/// A clause keyword and the extent of its body.
#[derive(Debug, Clone, Copy)]
struct ClauseSpan {
    clause: Clause,
    keyword_at: usize,
    body: (usize, usize),
}

/// Locate depth-zero clause keywords, in order, with their bodies.
fn find_clauses(tokens: &[SqlToken]) -> SqlResult<Vec<ClauseSpan>> {
    let positions = depth_zero(tokens);
    let mut found: Vec<(Clause, usize, usize)> = Vec::new();
    let mut skip_until = 0;

    for i in positions {
        if i < skip_until {
            continue;
        }
        let tok = &tokens[i];
        let next_is_by = tokens.get(i + 1).is_some_and(|n| n.is_keyword(Keyword::BY));
        let keyword = match &tok.token {
            Token::Word(w) => w.keyword,
            _ => continue,
        };
        let hit = match keyword {
            Keyword::FROM => Some((Clause::From, 1)),
            Keyword::WHERE => Some((Clause::Where, 1)),
            Keyword::GROUP if next_is_by => Some((Clause::GroupBy, 2)),
            Keyword::HAVING => Some((Clause::Having, 1)),
            Keyword::ORDER if next_is_by => Some((Clause::OrderBy, 2)),
            Keyword::LIMIT => Some((Clause::Limit, 1)),
            _ => None,
        };
        if let Some((clause, width)) = hit {
            if let Some((prev, _, _)) = found.last() {
                if *prev >= clause {
                    return Err(MalformedSqlError::ClauseOutOfOrder {
                        clause: clause.name(),
                    });
                }
            }
            found.push((clause, i, i + width));
            skip_until = i + width;
        }
    }

    let mut spans = Vec::with_capacity(found.len());
    for (idx, &(clause, keyword_at, body_start)) in found.iter().enumerate() {
        let body_end = found
            .get(idx + 1)
            .map(|&(_, next_at, _)| next_at)
            .unwrap_or(tokens.len());
        if body_start >= body_end {
            return Err(MalformedSqlError::EmptyClause {
                clause: clause.name(),
            });
        }
        spans.push(ClauseSpan {
            clause,
            keyword_at,
            body: (body_start, body_end),
        });
    }
    Ok(spans)
}

fn section<'t>(tokens: &'t [SqlToken], spans: &[ClauseSpan], clause: Clause) -> Option<&'t [SqlToken]> {
    spans
        .iter()
        .find(|s| s.clause == clause)
        .map(|s| &tokens[s.body.0..s.body.1])
}

fn parse_block(tokens: &[SqlToken], arm: usize) -> SqlResult<SelectBlock> {
    let first = tokens
        .first()
        .ok_or(MalformedSqlError::EmptyClause { clause: "SELECT" })?;
    if first.is_keyword(Keyword::WITH) {
        return Err(MalformedSqlError::Unsupported(
            "WITH (common table expressions)".into(),
        ));
    }
    if !first.is_keyword(Keyword::SELECT) {
        return Err(MalformedSqlError::NotASelect(first.text()));
    }

    let mut start = 1;
    let mut distinct = false;
    if let Some(tok) = tokens.get(1) {
        if tok.is_keyword(Keyword::DISTINCT) {
            distinct = true;
            start = 2;
        } else if tok.is_keyword(Keyword::ALL) {
            start = 2;
        }
    }

    let body = &tokens[start..];
    let spans = find_clauses(body)?;
    let projection_end = spans.first().map(|s| s.keyword_at).unwrap_or(body.len());
    let clause_body = |clause: Clause| section(body, &spans, clause);

    let projection = parse_projection(&body[..projection_end])?;

    let from_tokens = clause_body(Clause::From).ok_or(MalformedSqlError::MissingFrom { arm })?;
    let source_table = parse_source_table(from_tokens)?;

    let where_clause = match clause_body(Clause::Where) {
        Some(tokens) => parse_predicates(tokens)?,
        None => Vec::new(),
    };

    let group_by = match clause_body(Clause::GroupBy) {
        Some(tokens) => parse_expr_list(tokens, "GROUP BY")?,
        None => Vec::new(),
    };

    let order_by = clause_body(Clause::OrderBy).map(parse_order_by).transpose()?;
    let limit = clause_body(Clause::Limit).map(parse_limit).transpose()?;

    Ok(SelectBlock {
        distinct,
        projection,
        from: expr(from_tokens),
        source_table,
        where_clause,
        group_by,
        having: clause_body(Clause::Having).map(expr),
        order_by,
        limit,
    })
}

/// ORDER BY / LIMIT following a parenthesized final arm.
fn parse_tail(tokens: &[SqlToken]) -> SqlResult<(Option<OrderBy>, Option<Limit>)> {
    let spans = find_clauses(tokens)?;
    match spans.first() {
        Some(span) if span.keyword_at == 0 => {}
        _ => return Err(unexpected(&tokens[0])),
    }

    let mut order_by = None;
    let mut limit = None;
    for span in spans {
        let body = &tokens[span.body.0..span.body.1];
        match span.clause {
            Clause::OrderBy => order_by = Some(parse_order_by(body)?),
            Clause::Limit => limit = Some(parse_limit(body)?),
            _ => return Err(unexpected(&tokens[span.keyword_at])),
        }
    }
    Ok((order_by, limit))
}

fn parse_projection(tokens: &[SqlToken]) -> SqlResult<Vec<SelectItem>> {
    if tokens.is_empty() {
        return Err(MalformedSqlError::EmptyClause { clause: "SELECT" });
    }
    split_commas(tokens)
        .into_iter()
        .map(|item| {
            if item.is_empty() {
                Err(MalformedSqlError::EmptyClause { clause: "SELECT" })
            } else {
                Ok(parse_select_item(item))
            }
        })
        .collect()
}

fn parse_select_item(item: &[SqlToken]) -> SelectItem {
    let n = item.len();
    if n >= 3
        && item[n - 2].is_keyword(Keyword::AS)
        && matches!(item[n - 1].token, Token::Word(_) | Token::SingleQuotedString(_))
    {
        return SelectItem::aliased(expr(&item[..n - 2]), item[n - 1].unquoted());
    }
    if n >= 2 && is_bare_alias(&item[n - 2], &item[n - 1]) {
        return SelectItem::aliased(expr(&item[..n - 1]), item[n - 1].unquoted());
    }
    SelectItem::new(expr(item))
}

fn is_bare_alias(prev: &SqlToken, last: &SqlToken) -> bool {
    let last_ok = matches!(&last.token, Token::Word(w) if !RESERVED.contains(&w.keyword));
    let prev_ok = match &prev.token {
        Token::Word(w) => !RESERVED.contains(&w.keyword) || w.keyword == Keyword::END,
        Token::RParen | Token::SingleQuotedString(_) | Token::Number(..) => true,
        _ => false,
    };
    last_ok && prev_ok
}

fn parse_source_table(tokens: &[SqlToken]) -> SqlResult<String> {
    let first = &tokens[0];
    match first.token {
        Token::LParen => Err(MalformedSqlError::Unsupported(
            "derived table in FROM".into(),
        )),
        Token::Word(_) => {
            // schema.table
            if tokens.get(1).is_some_and(|t| t.token == Token::Period) {
                if let Some(name) = tokens.get(2) {
                    return Ok(name.unquoted());
                }
            }
            Ok(first.unquoted())
        }
        _ => Err(unexpected(first)),
    }
}

/// Split a WHERE body into top-level conjuncts.
///
/// A top-level OR makes the whole clause one opaque condition; splitting it
/// on AND would change its meaning.
fn parse_predicates(tokens: &[SqlToken]) -> SqlResult<Vec<Predicate>> {
    let positions = depth_zero(tokens);
    if positions.iter().any(|&i| tokens[i].is_keyword(Keyword::OR)) {
        return Ok(vec![Predicate::Condition(expr(tokens))]);
    }

    let mut parts = Vec::new();
    let mut start = 0;
    let mut in_between = false;
    for i in positions {
        let tok = &tokens[i];
        if tok.is_keyword(Keyword::BETWEEN) {
            in_between = true;
        } else if tok.is_keyword(Keyword::AND) {
            if in_between {
                in_between = false;
            } else {
                parts.push(&tokens[start..i]);
                start = i + 1;
            }
        }
    }
    parts.push(&tokens[start..]);

    parts.into_iter().map(parse_predicate).collect()
}

fn parse_predicate(tokens: &[SqlToken]) -> SqlResult<Predicate> {
    if tokens.is_empty() {
        return Err(MalformedSqlError::EmptyClause { clause: "WHERE" });
    }

    let positions = depth_zero(tokens);
    let Some(&between) = positions
        .iter()
        .find(|&&i| tokens[i].is_keyword(Keyword::BETWEEN))
    else {
        return Ok(Predicate::Condition(expr(tokens)));
    };
    let negated = between > 0 && tokens[between - 1].is_keyword(Keyword::NOT);
    let expr_end = if negated { between - 1 } else { between };
    let and = positions
        .iter()
        .copied()
        .find(|&i| i > between && tokens[i].is_keyword(Keyword::AND));

    match and {
        Some(and) if expr_end > 0 && and > between + 1 && and + 1 < tokens.len() => {
            Ok(Predicate::Between {
                expr: expr(&tokens[..expr_end]),
                low: expr(&tokens[between + 1..and]),
                high: expr(&tokens[and + 1..]),
                negated,
            })
        }
        _ => Ok(Predicate::Condition(expr(tokens))),
    }
}

fn parse_expr_list(tokens: &[SqlToken], clause: &'static str) -> SqlResult<Vec<Expr>> {
    split_commas(tokens)
        .into_iter()
        .map(|part| {
            if part.is_empty() {
                Err(MalformedSqlError::EmptyClause { clause })
            } else {
                Ok(expr(part))
            }
        })
        .collect()
}

fn parse_order_by(tokens: &[SqlToken]) -> SqlResult<OrderBy> {
    let mut items = Vec::new();
    for part in split_commas(tokens) {
        let (body, dir) = match part.last() {
            Some(t) if t.is_keyword(Keyword::ASC) => (&part[..part.len() - 1], Some(SortDir::Asc)),
            Some(t) if t.is_keyword(Keyword::DESC) => (&part[..part.len() - 1], Some(SortDir::Desc)),
            _ => (part, None),
        };
        if body.is_empty() {
            return Err(MalformedSqlError::EmptyClause { clause: "ORDER BY" });
        }
        items.push(OrderItem::new(expr(body), dir));
    }
    Ok(OrderBy::new(items))
}

fn parse_limit(tokens: &[SqlToken]) -> SqlResult<Limit> {
    let number = |tok: &SqlToken| -> Option<u64> {
        match &tok.token {
            Token::Number(n, _) => n.parse().ok(),
            _ => None,
        }
    };
    let invalid = || MalformedSqlError::InvalidLimit(join_tokens(tokens));

    match tokens {
        [count] => Ok(Limit::new(number(count).ok_or_else(invalid)?)),
        [count, kw, offset] if kw.is_keyword(Keyword::OFFSET) => Ok(Limit {
            count: number(count).ok_or_else(invalid)?,
            offset: Some(number(offset).ok_or_else(invalid)?),
        }),
        [offset, comma, count] if comma.token == Token::Comma => Ok(Limit {
            count: number(count).ok_or_else(invalid)?,
            offset: Some(number(offset).ok_or_else(invalid)?),
        }),
        _ => Err(invalid()),
    }
}
