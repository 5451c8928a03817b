//! GROUP BY / projection consistency.
//!
//! A grouped expression missing from the SELECT list is inserted where the
//! grouping order puts it: right after the previously grouped expression,
//! otherwise in front of the first aggregate.

use super::Warning;
use crate::sql::{Expr, SelectBlock, SelectItem, SqlStatement};

pub(crate) fn add_group_columns(statement: &mut SqlStatement, warnings: &mut Vec<Warning>) {
    for (arm, block) in statement.selects.iter_mut().enumerate() {
        for column in fix_block(block) {
            warnings.push(Warning::GroupColumnAdded { arm, column });
        }
    }
}

/// Repair one arm, returning the text of every inserted expression.
fn fix_block(block: &mut SelectBlock) -> Vec<String> {
    // `SELECT *` already carries every column.
    if block.projection.iter().any(|item| item.expr.is_star()) {
        return Vec::new();
    }

    let mut added = Vec::new();
    for (i, group) in block.group_by.iter().enumerate() {
        if group.as_position().is_some() || is_projected(&block.projection, group) {
            continue;
        }
        let at = insertion_point(&block.projection, &block.group_by[..i]);
        block.projection.insert(at, SelectItem::new(group.clone()));
        added.push(group.text().to_string());
    }
    added
}

fn is_projected(projection: &[SelectItem], expr: &Expr) -> bool {
    projection.iter().any(|item| item.produces(expr))
}

fn insertion_point(projection: &[SelectItem], earlier_groups: &[Expr]) -> usize {
    if let Some(previous) = earlier_groups.last() {
        if let Some(pos) = projection.iter().position(|item| item.produces(previous)) {
            return pos + 1;
        }
    }
    projection
        .iter()
        .position(|item| item.expr.contains_aggregate())
        .unwrap_or(projection.len().min(earlier_groups.len()))
}
