//! ORDER BY / LIMIT placement around set operations.
//!
//! Ordering and limiting apply to the combined rows of a UNION, never to a
//! single arm. Arm-level clauses on any arm but the last move to the
//! statement: the first one found is kept, later ones and those shadowed by an
//! existing statement clause are dropped. A parenthesized last arm keeps its
//! own clauses.

use super::Warning;
use crate::sql::{Expr, OrderBy, OrderItem, SelectBlock, SqlStatement};

pub(crate) fn hoist_arm_clauses(statement: &mut SqlStatement, warnings: &mut Vec<Warning>) {
    if !statement.is_set_operation() {
        return;
    }

    let last = statement.selects.len().saturating_sub(1);
    for arm in 0..last {
        if let Some(order_by) = statement.selects[arm].order_by.take() {
            if statement.trailing_order_by.is_none() {
                let order_by = output_names(order_by, &statement.selects[arm], &statement.selects[0]);
                statement.trailing_order_by = Some(order_by);
                warnings.push(Warning::ArmClauseHoisted {
                    arm,
                    clause: "ORDER BY",
                });
            } else {
                warnings.push(Warning::ArmClauseDropped {
                    arm,
                    clause: "ORDER BY",
                });
            }
        }

        if let Some(limit) = statement.selects[arm].limit.take() {
            if statement.trailing_limit.is_none() {
                statement.trailing_limit = Some(limit);
                warnings.push(Warning::ArmClauseHoisted {
                    arm,
                    clause: "LIMIT",
                });
            } else {
                warnings.push(Warning::ArmClauseDropped {
                    arm,
                    clause: "LIMIT",
                });
            }
        }
    }
}

/// Rewrite ORDER BY terms to the result column names of the combined
/// statement, which take their names from the first arm.
///
/// `ORDER BY SUM(billedcost)` inside an arm becomes `ORDER BY total_cost`
/// when that arm projects `SUM(billedcost) AS total_cost`.
fn output_names(order_by: OrderBy, arm: &SelectBlock, first: &SelectBlock) -> OrderBy {
    let items = order_by
        .items
        .into_iter()
        .map(|item| {
            let position = item
                .expr
                .as_position()
                .map(|p| p.saturating_sub(1))
                .or_else(|| arm.projection.iter().position(|p| p.produces(&item.expr)));
            let name = position
                .and_then(|i| first.projection.get(i))
                .and_then(|p| p.output_name());
            match name {
                Some(name) if item.expr.as_position().is_none() => {
                    OrderItem::new(Expr::new(name), item.dir)
                }
                _ => item,
            }
        })
        .collect();
    OrderBy::new(items)
}
