//! Domain types shared by every Hearth crate: members, expenses, contributions and
//! the per-member aggregates the ledger keeps in sync with them.

mod contribution;
mod expense;
mod ids;
mod member;
mod roster;
pub mod validation;

pub use contribution::{Contribution, ContributionDraft, GYM_TAG};
pub use expense::{split_of, Category, Expense, ExpenseDraft};
pub use ids::{ContributionId, ExpenseId, MemberId};
pub use member::{AggregateField, MemberAggregate, MemberBalance};
pub use roster::{Roster, RosterMember};
pub use validation::{parse_amount, parse_positive_amount, ValidationError, SPLIT_TOLERANCE};
