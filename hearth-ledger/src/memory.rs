use std::collections::BTreeMap;

use hearth_core::{Contribution, Expense, ExpenseId, MemberAggregate, MemberId};
use parking_lot::{Mutex, MutexGuard};

use crate::store::{LedgerStore, StoreTransaction, WriteGrant};
use crate::{ContributionQuery, ExpenseQuery, LedgerResult};

#[derive(Clone, Debug, Default)]
struct Collections {
    members: BTreeMap<MemberId, MemberAggregate>,
    /// Insertion ordered; overwrites keep their slot.
    expenses: Vec<Expense>,
    contributions: Vec<Contribution>,
}

/// Process-local store used by tests and ephemeral sessions.
#[derive(Debug, Default)]
pub struct MemoryLedgerStore {
    state: Mutex<Collections>,
}

impl MemoryLedgerStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl LedgerStore for MemoryLedgerStore {
    fn member(&self, id: &MemberId) -> LedgerResult<Option<MemberAggregate>> {
        Ok(self.state.lock().members.get(id).cloned())
    }

    fn members(&self) -> LedgerResult<Vec<MemberAggregate>> {
        Ok(self.state.lock().members.values().cloned().collect())
    }

    fn expense(&self, id: &ExpenseId) -> LedgerResult<Option<Expense>> {
        Ok(self
            .state
            .lock()
            .expenses
            .iter()
            .find(|expense| &expense.id == id)
            .cloned())
    }

    fn expenses(&self, query: &ExpenseQuery) -> LedgerResult<Vec<Expense>> {
        let state = self.state.lock();
        let mut matched: Vec<Expense> = state
            .expenses
            .iter()
            .rev()
            .filter(|expense| query.matches(expense))
            .cloned()
            .collect();
        matched.sort_by(|a, b| b.date.cmp(&a.date));
        if let Some(limit) = query.limit {
            matched.truncate(limit);
        }
        Ok(matched)
    }

    fn contributions(&self, query: &ContributionQuery) -> LedgerResult<Vec<Contribution>> {
        let state = self.state.lock();
        let mut matched: Vec<Contribution> = state
            .contributions
            .iter()
            .filter(|entry| query.matches(entry))
            .cloned()
            .collect();
        matched.sort_by(|a, b| a.date.cmp(&b.date));
        if let Some(limit) = query.limit {
            matched.truncate(limit);
        }
        Ok(matched)
    }

    fn begin(&self, _grant: WriteGrant) -> LedgerResult<Box<dyn StoreTransaction + '_>> {
        let guard = self.state.lock();
        let working = guard.clone();
        Ok(Box::new(MemoryTransaction { guard, working }))
    }
}

/// Holds the store lock for its lifetime and swaps the working copy in on commit.
struct MemoryTransaction<'a> {
    guard: MutexGuard<'a, Collections>,
    working: Collections,
}

impl StoreTransaction for MemoryTransaction<'_> {
    fn member(&mut self, id: &MemberId) -> LedgerResult<Option<MemberAggregate>> {
        Ok(self.working.members.get(id).cloned())
    }

    fn put_member(&mut self, member: &MemberAggregate) -> LedgerResult<()> {
        self.working
            .members
            .insert(member.id.clone(), member.clone());
        Ok(())
    }

    fn expense(&mut self, id: &ExpenseId) -> LedgerResult<Option<Expense>> {
        Ok(self
            .working
            .expenses
            .iter()
            .find(|expense| &expense.id == id)
            .cloned())
    }

    fn put_expense(&mut self, expense: &Expense) -> LedgerResult<()> {
        match self
            .working
            .expenses
            .iter_mut()
            .find(|existing| existing.id == expense.id)
        {
            Some(slot) => *slot = expense.clone(),
            None => self.working.expenses.push(expense.clone()),
        }
        Ok(())
    }

    fn delete_expense(&mut self, id: &ExpenseId) -> LedgerResult<bool> {
        let before = self.working.expenses.len();
        self.working.expenses.retain(|expense| &expense.id != id);
        Ok(self.working.expenses.len() != before)
    }

    fn append_contribution(&mut self, contribution: &Contribution) -> LedgerResult<()> {
        self.working.contributions.push(contribution.clone());
        Ok(())
    }

    fn commit(self: Box<Self>) -> LedgerResult<()> {
        let MemoryTransaction { mut guard, working } = *self;
        *guard = working;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use hearth_core::Category;
    use rust_decimal_macros::dec;

    fn expense(day: u32) -> Expense {
        Expense {
            id: ExpenseId::generate(),
            item_name: format!("item-{day}"),
            category: Category::Food,
            cost: dec!(10),
            date: NaiveDate::from_ymd_opt(2024, 3, day).unwrap(),
            buyer: "anudeep".into(),
            shared_with: vec!["anudeep".into()],
            split_amount: Some(dec!(10)),
            is_gym_expense: false,
        }
    }

    #[test]
    fn uncommitted_writes_are_discarded() {
        let store = MemoryLedgerStore::new();
        {
            let mut tx = store.begin(WriteGrant::new()).unwrap();
            tx.put_member(&MemberAggregate::zeroed("a".into(), "A"))
                .unwrap();
        }
        assert!(store.member(&"a".into()).unwrap().is_none());

        let mut tx = store.begin(WriteGrant::new()).unwrap();
        tx.put_member(&MemberAggregate::zeroed("a".into(), "A"))
            .unwrap();
        tx.commit().unwrap();
        assert!(store.member(&"a".into()).unwrap().is_some());
    }

    #[test]
    fn expenses_come_back_newest_first() {
        let store = MemoryLedgerStore::new();
        let mut tx = store.begin(WriteGrant::new()).unwrap();
        for day in [3, 1, 2] {
            tx.put_expense(&expense(day)).unwrap();
        }
        tx.commit().unwrap();
        let days: Vec<u32> = store
            .expenses(&ExpenseQuery::default())
            .unwrap()
            .iter()
            .map(|e| chrono::Datelike::day(&e.date))
            .collect();
        assert_eq!(days, vec![3, 2, 1]);
    }
}
