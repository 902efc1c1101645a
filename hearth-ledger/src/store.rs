use hearth_core::{Contribution, Expense, ExpenseId, MemberAggregate, MemberId};

use crate::{ContributionQuery, ExpenseQuery, LedgerResult};

/// Capability required to open a write transaction.
///
/// Only this crate can mint one, which keeps every aggregate mutation behind the
/// ledger engine.
#[derive(Debug)]
pub struct WriteGrant(());

impl WriteGrant {
    pub(crate) fn new() -> Self {
        Self(())
    }
}

/// Abstraction over the document collections backing the ledger.
pub trait LedgerStore: Send + Sync {
    /// Point read of a member aggregate.
    fn member(&self, id: &MemberId) -> LedgerResult<Option<MemberAggregate>>;

    /// Every stored member aggregate, ordered by id.
    fn members(&self) -> LedgerResult<Vec<MemberAggregate>>;

    /// Point read of an expense record.
    fn expense(&self, id: &ExpenseId) -> LedgerResult<Option<Expense>>;

    /// Expenses matching the query, newest first.
    fn expenses(&self, query: &ExpenseQuery) -> LedgerResult<Vec<Expense>>;

    /// Contributions matching the query, oldest first.
    fn contributions(&self, query: &ContributionQuery) -> LedgerResult<Vec<Contribution>>;

    /// Open a transaction; nothing written through it is visible until commit.
    fn begin(&self, grant: WriteGrant) -> LedgerResult<Box<dyn StoreTransaction + '_>>;
}

/// Read-modify-write unit of work. Dropping without commit discards all writes.
pub trait StoreTransaction {
    fn member(&mut self, id: &MemberId) -> LedgerResult<Option<MemberAggregate>>;

    /// Insert or replace a member aggregate.
    fn put_member(&mut self, member: &MemberAggregate) -> LedgerResult<()>;

    fn expense(&mut self, id: &ExpenseId) -> LedgerResult<Option<Expense>>;

    /// Insert or overwrite an expense record under its id.
    fn put_expense(&mut self, expense: &Expense) -> LedgerResult<()>;

    /// Remove an expense record, returning whether it existed.
    fn delete_expense(&mut self, id: &ExpenseId) -> LedgerResult<bool>;

    fn append_contribution(&mut self, contribution: &Contribution) -> LedgerResult<()>;

    fn commit(self: Box<Self>) -> LedgerResult<()>;
}
