use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::validation::approx_eq;
use crate::{ExpenseId, MemberId, Roster, ValidationError};

/// Fixed set of expense categories. `Gym` routes the expense into the gym pool.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Category {
    #[default]
    Food,
    Cleaning,
    Transport,
    Utilities,
    Rent,
    Other,
    #[serde(rename = "GYM")]
    Gym,
}

impl Category {
    pub const ALL: [Category; 7] = [
        Category::Food,
        Category::Cleaning,
        Category::Transport,
        Category::Utilities,
        Category::Rent,
        Category::Other,
        Category::Gym,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Category::Food => "Food",
            Category::Cleaning => "Cleaning",
            Category::Transport => "Transport",
            Category::Utilities => "Utilities",
            Category::Rent => "Rent",
            Category::Other => "Other",
            Category::Gym => "GYM",
        }
    }

    pub fn is_gym(self) -> bool {
        matches!(self, Category::Gym)
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for Category {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        Category::ALL
            .into_iter()
            .find(|category| category.as_str().eq_ignore_ascii_case(trimmed))
            .ok_or_else(|| ValidationError::UnknownCategory(s.to_string()))
    }
}

/// Persisted expense record, the source of truth for re-deriving its impact.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Expense {
    pub id: ExpenseId,
    pub item_name: String,
    pub category: Category,
    pub cost: Decimal,
    pub date: NaiveDate,
    pub buyer: MemberId,
    pub shared_with: Vec<MemberId>,
    /// Denormalized `cost / shared_with.len()`; `None` when absent or unreadable.
    pub split_amount: Option<Decimal>,
    pub is_gym_expense: bool,
}

impl Expense {
    /// Split derived from cost and participants, ignoring the stored value.
    pub fn computed_split(&self) -> Option<Decimal> {
        split_of(self.cost, self.shared_with.len())
    }

    /// Whether the stored split agrees with `cost / participants`. A split too
    /// large to multiply back out counts as inconsistent.
    pub fn stored_split_is_consistent(&self) -> bool {
        self.split_amount
            .and_then(|split| split.checked_mul(Decimal::from(self.shared_with.len() as u64)))
            .is_some_and(|total| approx_eq(total, self.cost))
    }

    pub fn involves(&self, member: &MemberId) -> bool {
        &self.buyer == member || self.shared_with.contains(member)
    }
}

/// User supplied fields for creating or editing an expense.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpenseDraft {
    pub item_name: String,
    pub category: Category,
    pub cost: Decimal,
    pub date: NaiveDate,
    pub buyer: MemberId,
    pub shared_with: Vec<MemberId>,
}

impl ExpenseDraft {
    pub fn new(
        item_name: impl Into<String>,
        category: Category,
        cost: Decimal,
        date: NaiveDate,
        buyer: impl Into<MemberId>,
        shared_with: impl IntoIterator<Item = MemberId>,
    ) -> Self {
        Self {
            item_name: item_name.into(),
            category,
            cost,
            date,
            buyer: buyer.into(),
            shared_with: shared_with.into_iter().collect(),
        }
    }

    /// Check the draft against the household roster.
    pub fn validate(&self, roster: &Roster) -> Result<(), ValidationError> {
        if self.item_name.trim().is_empty() {
            return Err(ValidationError::EmptyItemName);
        }
        if self.cost <= Decimal::ZERO {
            return Err(ValidationError::NonPositiveCost(self.cost));
        }
        if self.shared_with.is_empty() {
            return Err(ValidationError::EmptySharedWith);
        }
        if !roster.contains(&self.buyer) {
            return Err(ValidationError::UnknownMember(self.buyer.clone()));
        }
        for (idx, member) in self.shared_with.iter().enumerate() {
            if !roster.contains(member) {
                return Err(ValidationError::UnknownMember(member.clone()));
            }
            if self.shared_with[..idx].contains(member) {
                return Err(ValidationError::DuplicateParticipant(member.clone()));
            }
        }
        if self.category.is_gym() {
            let outsider = std::iter::once(&self.buyer)
                .chain(self.shared_with.iter())
                .find(|member| !roster.is_gym_eligible(member));
            if let Some(member) = outsider {
                return Err(ValidationError::NotGymEligible(member.clone()));
            }
        }
        Ok(())
    }

    /// Validate and materialize the record stored under `id`.
    pub fn into_expense(self, id: ExpenseId, roster: &Roster) -> Result<Expense, ValidationError> {
        self.validate(roster)?;
        let split_amount = split_of(self.cost, self.shared_with.len());
        Ok(Expense {
            id,
            item_name: self.item_name.trim().to_string(),
            is_gym_expense: self.category.is_gym(),
            category: self.category,
            cost: self.cost,
            date: self.date,
            buyer: self.buyer,
            shared_with: self.shared_with,
            split_amount,
        })
    }
}

/// `cost / participants`, or `None` when nobody shares the cost.
pub fn split_of(cost: Decimal, participants: usize) -> Option<Decimal> {
    if participants == 0 {
        return None;
    }
    cost.checked_div(Decimal::from(participants as u64))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 5, 12).unwrap()
    }

    fn ids(raw: &[&str]) -> Vec<MemberId> {
        raw.iter().map(|id| MemberId::from(*id)).collect()
    }

    #[test]
    fn category_parsing_is_case_insensitive() {
        assert_eq!("gym".parse::<Category>().unwrap(), Category::Gym);
        assert_eq!("Utilities".parse::<Category>().unwrap(), Category::Utilities);
        assert!("Snacks".parse::<Category>().is_err());
        assert_eq!(serde_json::to_string(&Category::Gym).unwrap(), "\"GYM\"");
    }

    #[test]
    fn materializes_split_and_gym_flag() {
        let roster = Roster::household_default();
        let draft = ExpenseDraft::new(
            "Membership",
            Category::Gym,
            dec!(200),
            date(),
            "karthik",
            ids(&["karthik", "shiva"]),
        );
        let expense = draft.into_expense(ExpenseId::generate(), &roster).unwrap();
        assert_eq!(expense.split_amount, Some(dec!(100)));
        assert!(expense.is_gym_expense);
        assert!(expense.stored_split_is_consistent());
    }

    #[test]
    fn unrepresentable_stored_split_is_inconsistent() {
        let roster = Roster::household_default();
        let mut expense = ExpenseDraft::new(
            "Groceries",
            Category::Food,
            dec!(300),
            date(),
            "anudeep",
            ids(&["anudeep", "mahesh"]),
        )
        .into_expense(ExpenseId::generate(), &roster)
        .unwrap();
        expense.split_amount = Some(Decimal::MAX);
        assert!(!expense.stored_split_is_consistent());
        expense.split_amount = None;
        assert!(!expense.stored_split_is_consistent());
        expense.split_amount = Some(dec!(150));
        assert!(expense.stored_split_is_consistent());
    }

    #[test]
    fn uneven_split_sums_back_to_cost() {
        let split = split_of(dec!(100), 3).unwrap();
        assert!(approx_eq(split * dec!(3), dec!(100)));
        assert_eq!(split_of(dec!(100), 0), None);
    }

    #[test]
    fn rejects_invalid_drafts() {
        let roster = Roster::household_default();
        let base = ExpenseDraft::new(
            "Groceries",
            Category::Food,
            dec!(300),
            date(),
            "anudeep",
            ids(&["anudeep", "mahesh"]),
        );

        let mut zero = base.clone();
        zero.cost = Decimal::ZERO;
        assert_eq!(
            zero.validate(&roster),
            Err(ValidationError::NonPositiveCost(Decimal::ZERO))
        );

        let mut empty = base.clone();
        empty.shared_with.clear();
        assert_eq!(empty.validate(&roster), Err(ValidationError::EmptySharedWith));

        let mut dup = base.clone();
        dup.shared_with = ids(&["mahesh", "mahesh"]);
        assert_eq!(
            dup.validate(&roster),
            Err(ValidationError::DuplicateParticipant(MemberId::from("mahesh")))
        );

        let mut stranger = base.clone();
        stranger.buyer = MemberId::from("stranger");
        assert!(matches!(
            stranger.validate(&roster),
            Err(ValidationError::UnknownMember(_))
        ));

        let mut gym = base.clone();
        gym.category = Category::Gym;
        assert_eq!(
            gym.validate(&roster),
            Err(ValidationError::NotGymEligible(MemberId::from("anudeep")))
        );

        let mut unnamed = base;
        unnamed.item_name = "   ".into();
        assert_eq!(unnamed.validate(&roster), Err(ValidationError::EmptyItemName));
    }
}
