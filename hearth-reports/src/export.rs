use std::io::Write;

use hearth_core::{Expense, Roster};
use serde::Serialize;

use crate::ReportError;

#[derive(Serialize)]
struct ExpenseRow<'a> {
    date: String,
    item: &'a str,
    category: &'a str,
    cost: String,
    buyer: String,
    shared_with: String,
    split_amount: String,
}

/// Write an expense log as CSV, one row per expense with member display names.
pub fn write_expense_csv<W: Write>(
    writer: W,
    roster: &Roster,
    expenses: &[Expense],
) -> Result<usize, ReportError> {
    let mut writer = csv::Writer::from_writer(writer);
    for expense in expenses {
        let split = expense
            .split_amount
            .or_else(|| expense.computed_split())
            .map(|split| split.round_dp(2).to_string())
            .unwrap_or_default();
        writer.serialize(ExpenseRow {
            date: expense.date.format("%Y-%m-%d").to_string(),
            item: &expense.item_name,
            category: expense.category.as_str(),
            cost: expense.cost.round_dp(2).to_string(),
            buyer: roster.display_name(&expense.buyer),
            shared_with: expense
                .shared_with
                .iter()
                .map(|member| roster.display_name(member))
                .collect::<Vec<_>>()
                .join("; "),
            split_amount: split,
        })?;
    }
    writer.flush()?;
    Ok(expenses.len())
}
