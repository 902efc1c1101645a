//! Balance ledger for the Hearth household tracker.
//!
//! [`LedgerEngine`] is the only writer of member aggregates, expense records and
//! contributions. Every operation applies its aggregate deltas and its record
//! change inside one [`StoreTransaction`], so a failed call leaves all three
//! collections exactly as they were.

mod engine;
mod error;
mod impact;
mod memory;
mod query;
mod sqlite;
mod store;

pub use engine::{ExpenseEdit, ExpenseRemoval, LedgerEngine, LedgerReader};
pub use error::{LedgerError, LedgerResult};
pub use impact::{
    apply_contribution, apply_expense_impact, ensure_member, reverse_expense_impact,
    ClampedField, ExpenseImpact, ImpactOutcome,
};
pub use memory::MemoryLedgerStore;
pub use query::{ContributionQuery, ExpenseQuery};
pub use sqlite::SqliteLedgerStore;
pub use store::{LedgerStore, StoreTransaction, WriteGrant};
