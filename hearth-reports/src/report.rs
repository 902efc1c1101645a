use chrono::{DateTime, Datelike, NaiveDate, Utc};
use hearth_core::{Category, Contribution, Expense, MemberBalance, MemberId, Roster};
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::debug;

use crate::ReportError;

/// Inclusive date window; either bound may be open.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ReportRange {
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
}

impl ReportRange {
    pub fn new(start: Option<NaiveDate>, end: Option<NaiveDate>) -> Result<Self, ReportError> {
        if let (Some(start), Some(end)) = (start, end) {
            if start > end {
                return Err(ReportError::InvalidRange { start, end });
            }
        }
        Ok(Self { start, end })
    }

    /// Unbounded range.
    pub fn all_time() -> Self {
        Self::default()
    }

    pub fn is_all_time(&self) -> bool {
        self.start.is_none() && self.end.is_none()
    }

    pub fn contains_date(&self, date: NaiveDate) -> bool {
        self.start.map_or(true, |start| date >= start) && self.end.map_or(true, |end| date <= end)
    }

    /// Timestamps match when their UTC calendar day falls inside the range.
    pub fn contains_time(&self, timestamp: DateTime<Utc>) -> bool {
        self.contains_date(timestamp.date_naive())
    }
}

/// Spend within one calendar month.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct MonthlyBreakdown {
    pub year: i32,
    pub month: u32,
    pub total: Decimal,
    pub expense_count: usize,
    /// Member who fronted the most money this month.
    pub top_spender: Option<MemberId>,
    /// Member who appeared in the most `shared_with` lists this month.
    pub most_shared_with: Option<MemberId>,
}

impl MonthlyBreakdown {
    /// Human label such as `March 2024`.
    pub fn label(&self) -> String {
        NaiveDate::from_ymd_opt(self.year, self.month, 1)
            .map(|date| date.format("%B %Y").to_string())
            .unwrap_or_else(|| format!("{}-{:02}", self.year, self.month))
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct CategoryTotal {
    pub category: Category,
    pub total: Decimal,
    pub expense_count: usize,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct MemberContributionSummary {
    pub member: MemberId,
    pub name: String,
    pub total: Decimal,
    /// Oldest first.
    pub entries: Vec<Contribution>,
}

/// Household report over a date range.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Report {
    pub range: ReportRange,
    pub total_spent: Decimal,
    pub total_contributions: Decimal,
    /// Newest month first.
    pub monthly: Vec<MonthlyBreakdown>,
    pub categories: Vec<CategoryTotal>,
    pub contributions: Vec<MemberContributionSummary>,
    pub balances: Vec<MemberBalance>,
    /// Newest first.
    pub expenses: Vec<Expense>,
}

impl Report {
    /// Fold expense and contribution snapshots into a report. Entries outside
    /// `range` are ignored, so callers may pass unfiltered collections.
    pub fn generate(
        roster: &Roster,
        range: ReportRange,
        expenses: &[Expense],
        contributions: &[Contribution],
        balances: Vec<MemberBalance>,
    ) -> Self {
        let mut expenses: Vec<Expense> = expenses
            .iter()
            .filter(|expense| range.contains_date(expense.date))
            .cloned()
            .collect();
        // Stable: equal dates keep the caller's (store) order.
        expenses.sort_by(|a, b| b.date.cmp(&a.date));

        let mut contributions: Vec<Contribution> = contributions
            .iter()
            .filter(|entry| range.contains_time(entry.date))
            .cloned()
            .collect();
        contributions.sort_by(|a, b| a.date.cmp(&b.date));

        let total_spent = total(expenses.iter().map(|expense| expense.cost));
        let total_contributions = total(contributions.iter().map(|entry| entry.amount));
        let report = Self {
            range,
            total_spent,
            total_contributions,
            monthly: monthly_breakdown(&expenses),
            categories: category_split(&expenses),
            contributions: contribution_summaries(roster, &contributions),
            balances,
            expenses,
        };
        debug!(
            expenses = report.expenses.len(),
            months = report.monthly.len(),
            total_spent = %report.total_spent,
            "report generated"
        );
        report
    }
}

/// Sum of money amounts, pinned at the representable maximum instead of
/// overflowing on corrupt stored values.
fn total(amounts: impl IntoIterator<Item = Decimal>) -> Decimal {
    amounts
        .into_iter()
        .fold(Decimal::ZERO, |acc, amount| acc.saturating_add(amount))
}

trait Accumulate: Copy + PartialOrd {
    fn accumulate(self, other: Self) -> Self;
}

impl Accumulate for Decimal {
    fn accumulate(self, other: Self) -> Self {
        self.saturating_add(other)
    }
}

impl Accumulate for u32 {
    fn accumulate(self, other: Self) -> Self {
        self.saturating_add(other)
    }
}

/// Running tally keyed by first appearance, so ties resolve to the earliest key.
struct Tally<V> {
    entries: Vec<(MemberId, V)>,
}

impl<V: Accumulate> Tally<V> {
    fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    fn add(&mut self, key: &MemberId, value: V) {
        match self.entries.iter_mut().find(|(existing, _)| existing == key) {
            Some((_, total)) => *total = total.accumulate(value),
            None => self.entries.push((key.clone(), value)),
        }
    }

    fn leader(&self) -> Option<MemberId> {
        let mut best: Option<&(MemberId, V)> = None;
        for entry in &self.entries {
            if best.map_or(true, |(_, value)| entry.1 > *value) {
                best = Some(entry);
            }
        }
        best.map(|(key, _)| key.clone())
    }
}

struct MonthAccumulator {
    year: i32,
    month: u32,
    total: Decimal,
    expense_count: usize,
    spenders: Tally<Decimal>,
    shared: Tally<u32>,
}

fn monthly_breakdown(expenses: &[Expense]) -> Vec<MonthlyBreakdown> {
    let mut months: Vec<MonthAccumulator> = Vec::new();
    for expense in expenses {
        let (year, month) = (expense.date.year(), expense.date.month());
        let index = match months
            .iter()
            .position(|acc| acc.year == year && acc.month == month)
        {
            Some(index) => index,
            None => {
                months.push(MonthAccumulator {
                    year,
                    month,
                    total: Decimal::ZERO,
                    expense_count: 0,
                    spenders: Tally::new(),
                    shared: Tally::new(),
                });
                months.len() - 1
            }
        };
        let acc = &mut months[index];
        acc.total = acc.total.saturating_add(expense.cost);
        acc.expense_count += 1;
        acc.spenders.add(&expense.buyer, expense.cost);
        for member in &expense.shared_with {
            acc.shared.add(member, 1);
        }
    }
    let mut breakdown: Vec<MonthlyBreakdown> = months
        .into_iter()
        .map(|acc| MonthlyBreakdown {
            year: acc.year,
            month: acc.month,
            total: acc.total,
            expense_count: acc.expense_count,
            top_spender: acc.spenders.leader(),
            most_shared_with: acc.shared.leader(),
        })
        .collect();
    breakdown.sort_by(|a, b| (b.year, b.month).cmp(&(a.year, a.month)));
    breakdown
}

fn category_split(expenses: &[Expense]) -> Vec<CategoryTotal> {
    Category::ALL
        .iter()
        .filter_map(|category| {
            let matching: Vec<&Expense> = expenses
                .iter()
                .filter(|expense| expense.category == *category)
                .collect();
            if matching.is_empty() {
                return None;
            }
            Some(CategoryTotal {
                category: *category,
                total: total(matching.iter().map(|expense| expense.cost)),
                expense_count: matching.len(),
            })
        })
        .collect()
}

fn contribution_summaries(
    roster: &Roster,
    contributions: &[Contribution],
) -> Vec<MemberContributionSummary> {
    roster
        .members()
        .iter()
        .map(|member| {
            let entries: Vec<Contribution> = contributions
                .iter()
                .filter(|entry| entry.member == member.id)
                .cloned()
                .collect();
            MemberContributionSummary {
                member: member.id.clone(),
                name: member.name.clone(),
                total: total(entries.iter().map(|entry| entry.amount)),
                entries,
            }
        })
        .collect()
}

/// Snapshot backing the gym dashboard.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct GymSummary {
    pub total_spent: Decimal,
    pub expense_count: usize,
    pub balances: Vec<MemberBalance>,
    /// Newest first, truncated to the requested length.
    pub recent: Vec<Expense>,
}

impl GymSummary {
    pub fn build(
        expenses: &[Expense],
        gym_balances: Vec<MemberBalance>,
        recent_limit: usize,
    ) -> Self {
        let mut gym: Vec<Expense> = expenses
            .iter()
            .filter(|expense| expense.category.is_gym())
            .cloned()
            .collect();
        gym.sort_by(|a, b| b.date.cmp(&a.date));
        let total_spent = total(gym.iter().map(|expense| expense.cost));
        let expense_count = gym.len();
        gym.truncate(recent_limit);
        Self {
            total_spent,
            expense_count,
            balances: gym_balances,
            recent: gym,
        }
    }
}
