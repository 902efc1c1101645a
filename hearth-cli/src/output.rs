use anyhow::Result;
use hearth_core::{Contribution, Expense, MemberBalance, Roster};
use hearth_ledger::ClampedField;
use hearth_reports::{GymSummary, Report};
use serde::Serialize;

pub fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

pub fn warn_clamped(clamped: &[ClampedField], roster: &Roster) {
    for field in clamped {
        eprintln!(
            "warning: {} {} was floored at zero ({:.2} short)",
            roster.display_name(&field.member),
            field.field,
            field.shortfall
        );
    }
}

fn shared_names(expense: &Expense, roster: &Roster) -> String {
    expense
        .shared_with
        .iter()
        .map(|id| roster.display_name(id))
        .collect::<Vec<_>>()
        .join(", ")
}

pub fn print_expenses(expenses: &[Expense], roster: &Roster) {
    if expenses.is_empty() {
        println!("no expenses recorded");
        return;
    }
    println!(
        "{:<36}  {:<10}  {:<20}  {:<9}  {:>10}  {:<10}  SHARED WITH",
        "ID", "DATE", "ITEM", "CATEGORY", "COST", "BUYER"
    );
    for expense in expenses {
        println!(
            "{:<36}  {:<10}  {:<20}  {:<9}  {:>10.2}  {:<10}  {}",
            expense.id,
            expense.date,
            expense.item_name,
            expense.category,
            expense.cost,
            roster.display_name(&expense.buyer),
            shared_names(expense, roster)
        );
    }
}

pub fn print_balances(rows: &[MemberBalance]) {
    println!(
        "{:<12}  {:>12}  {:>12}  {:>12}",
        "MEMBER", "DEPOSITED", "PAID", "BALANCE"
    );
    for row in rows {
        println!(
            "{:<12}  {:>12.2}  {:>12.2}  {:>12.2}",
            row.name, row.total_deposited, row.total_paid, row.current_balance
        );
    }
}

pub fn print_gym_summary(summary: &GymSummary, roster: &Roster) {
    println!(
        "gym spend {:.2} across {} expenses",
        summary.total_spent, summary.expense_count
    );
    println!(
        "{:<12}  {:>12}  {:>12}  {:>12}",
        "MEMBER", "GYM IN", "GYM PAID", "GYM BALANCE"
    );
    for row in &summary.balances {
        println!(
            "{:<12}  {:>12.2}  {:>12.2}  {:>12.2}",
            row.name, row.total_gym_deposited, row.total_gym_paid, row.current_gym_balance
        );
    }
    if !summary.recent.is_empty() {
        println!("\nrecent gym expenses:");
        for expense in &summary.recent {
            println!(
                "  {}  {:<20}  {:>10.2}  bought by {}",
                expense.date,
                expense.item_name,
                expense.cost,
                roster.display_name(&expense.buyer)
            );
        }
    }
}

pub fn print_contributions(entries: &[Contribution]) {
    if entries.is_empty() {
        println!("no contributions recorded");
        return;
    }
    for entry in entries {
        println!(
            "{}  {:>10.2}  {}  [{}]",
            entry.date.format("%Y-%m-%d %H:%M"),
            entry.amount,
            entry.description,
            entry.tags.join(", ")
        );
    }
}

pub fn print_report(report: &Report, roster: &Roster) {
    let range = match (report.range.start, report.range.end) {
        (None, None) => "all time".to_string(),
        (start, end) => format!(
            "{} to {}",
            start.map_or_else(|| "start".to_string(), |d| d.to_string()),
            end.map_or_else(|| "end".to_string(), |d| d.to_string())
        ),
    };
    println!("household report ({range})");
    println!("total spent:          {:.2}", report.total_spent);
    println!("total contributions:  {:.2}", report.total_contributions);

    println!("\nmonthly breakdown:");
    if report.monthly.is_empty() {
        println!("  no expenses in range");
    }
    for month in &report.monthly {
        let name = |id: &Option<hearth_core::MemberId>| {
            id.as_ref()
                .map(|id| roster.display_name(id))
                .unwrap_or_else(|| "n/a".to_string())
        };
        println!(
            "  {:<16} {:>10.2}  top spender {:<10} most shared {}",
            month.label(),
            month.total,
            name(&month.top_spender),
            name(&month.most_shared_with)
        );
    }

    println!("\nby category:");
    for category in &report.categories {
        println!(
            "  {:<10} {:>10.2}  ({} expenses)",
            category.category, category.total, category.expense_count
        );
    }

    println!("\nbalances:");
    for row in &report.balances {
        println!("  {:<12} {:>10.2}", row.name, row.current_balance);
    }

    println!("\ncontributions:");
    for summary in &report.contributions {
        println!(
            "  {:<12} {:>10.2}  ({} entries)",
            summary.name,
            summary.total,
            summary.entries.len()
        );
    }

    println!("\nexpense log:");
    print_expenses(&report.expenses, roster);
}
