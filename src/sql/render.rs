//! `SqlStatement` → SQL text.
//!
//! Layout: one clause per line, arms separated by the set operator on its own
//! line. An arm that still carries its own ORDER BY or LIMIT inside a set
//! operation is wrapped in parentheses so the text keeps the model's meaning.

use super::statement::{Limit, OrderBy, Predicate, SelectBlock, SelectItem, SqlStatement};
use super::token::{Token, TokenStream};

/// Render a statement to SQL text.
pub fn render(statement: &SqlStatement) -> String {
    let mut ts = TokenStream::new();
    let multi = statement.selects.len() > 1;
    let operator = match statement.set_operator.keyword() {
        Some("UNION") => Token::Union,
        _ => Token::UnionAll,
    };

    for (i, block) in statement.selects.iter().enumerate() {
        if i > 0 {
            ts.newline().push(operator.clone()).newline();
        }
        let wrap = multi && block.has_arm_clauses();
        if wrap {
            ts.lparen();
        }
        ts.append(&block_tokens(block));
        if wrap {
            ts.rparen();
        }
    }

    if let Some(order_by) = &statement.trailing_order_by {
        ts.newline();
        order_by_tokens(&mut ts, order_by);
    }
    if let Some(limit) = &statement.trailing_limit {
        ts.newline();
        limit_tokens(&mut ts, limit);
    }

    ts.serialize()
}

fn block_tokens(block: &SelectBlock) -> TokenStream {
    let mut ts = TokenStream::new();

    ts.push(Token::Select).space();
    if block.distinct {
        ts.push(Token::Distinct).space();
    }
    ts.comma_separated(&block.projection, select_item_tokens);

    ts.newline().push(Token::From).space().text(block.from.text());

    if !block.where_clause.is_empty() {
        let wrap_or = block.where_clause.len() > 1;
        ts.newline().push(Token::Where).space();
        for (i, predicate) in block.where_clause.iter().enumerate() {
            if i > 0 {
                ts.space().push(Token::And).space();
            }
            predicate_tokens(&mut ts, predicate, wrap_or);
        }
    }

    if !block.group_by.is_empty() {
        ts.newline().push(Token::GroupBy).space();
        ts.comma_separated(&block.group_by, |ts, e| {
            ts.text(e.text());
        });
    }

    if let Some(having) = &block.having {
        ts.newline().push(Token::Having).space().text(having.text());
    }

    if let Some(order_by) = &block.order_by {
        ts.newline();
        order_by_tokens(&mut ts, order_by);
    }
    if let Some(limit) = &block.limit {
        ts.newline();
        limit_tokens(&mut ts, limit);
    }

    ts
}

fn select_item_tokens(ts: &mut TokenStream, item: &SelectItem) {
    ts.text(item.expr.text());
    if let Some(alias) = &item.alias {
        ts.space().push(Token::As).space().text(alias.as_str());
    }
}

fn predicate_tokens(ts: &mut TokenStream, predicate: &Predicate, wrap_or: bool) {
    match predicate {
        Predicate::Between {
            expr,
            low,
            high,
            negated,
        } => {
            ts.text(expr.text()).space();
            if *negated {
                ts.push(Token::Not).space();
            }
            ts.push(Token::Between)
                .space()
                .text(low.text())
                .space()
                .push(Token::And)
                .space()
                .text(high.text());
        }
        Predicate::Condition(expr) => {
            // A disjunction joined with other conjuncts needs its own parentheses.
            let needs_parens = wrap_or && expr.normalized().contains(" or ");
            if needs_parens {
                ts.lparen().text(expr.text()).rparen();
            } else {
                ts.text(expr.text());
            }
        }
    }
}

fn order_by_tokens(ts: &mut TokenStream, order_by: &OrderBy) {
    ts.push(Token::OrderBy).space();
    ts.comma_separated(&order_by.items, |ts, item| {
        ts.text(item.expr.text());
        if let Some(dir) = item.dir {
            ts.space().text(dir.keyword());
        }
    });
}

fn limit_tokens(ts: &mut TokenStream, limit: &Limit) {
    ts.push(Token::Limit).space().text(limit.count.to_string());
    if let Some(offset) = limit.offset {
        ts.space().push(Token::Offset).space().text(offset.to_string());
    }
}
