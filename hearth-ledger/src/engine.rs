use std::sync::Arc;

use chrono::Utc;
use hearth_core::{
    AggregateField, Contribution, ContributionDraft, ContributionId, Expense, ExpenseDraft,
    ExpenseId, MemberAggregate, MemberBalance, MemberId, Roster, ValidationError, GYM_TAG,
};
use hearth_events::{EventBus, EventFilter, EventStream, LedgerEvent};
use rust_decimal::Decimal;
use tracing::{debug, info};

use crate::impact::{
    apply_contribution, apply_expense_impact, ensure_member, reverse_expense_impact,
    ClampedField, ExpenseImpact, ImpactOutcome,
};
use crate::store::{LedgerStore, StoreTransaction, WriteGrant};
use crate::{ContributionQuery, ExpenseQuery, LedgerError, LedgerResult};

/// Result of a successful expense edit.
#[derive(Clone, Debug)]
pub struct ExpenseEdit {
    pub previous: Expense,
    pub current: Expense,
    pub clamped: Vec<ClampedField>,
}

/// Result of a successful expense deletion.
#[derive(Clone, Debug)]
pub struct ExpenseRemoval {
    pub expense: Expense,
    pub clamped: Vec<ClampedField>,
}

/// Sole writer of member aggregates, expenses and contributions.
///
/// Each operation runs in one store transaction and publishes its events only
/// after the commit succeeds.
pub struct LedgerEngine {
    store: Arc<dyn LedgerStore>,
    roster: Roster,
    events: Arc<EventBus>,
}

impl LedgerEngine {
    pub fn new(store: Arc<dyn LedgerStore>, roster: Roster) -> Self {
        Self {
            store,
            roster,
            events: Arc::new(EventBus::default()),
        }
    }

    pub fn with_event_bus(mut self, events: Arc<EventBus>) -> Self {
        self.events = events;
        self
    }

    pub fn roster(&self) -> &Roster {
        &self.roster
    }

    /// Read-only handle for views and reports.
    pub fn reader(&self) -> LedgerReader {
        LedgerReader {
            store: self.store.clone(),
            roster: self.roster.clone(),
        }
    }

    pub fn subscribe(&self, filter: EventFilter) -> EventStream {
        self.events.subscribe_filtered(filter)
    }

    /// Current balances plus a stream of subsequent member updates.
    pub fn watch_members(&self) -> LedgerResult<(Vec<MemberBalance>, EventStream)> {
        let stream = self.subscribe(EventFilter::Members);
        let snapshot = self.reader().balances()?;
        Ok((snapshot, stream))
    }

    /// Matching expenses plus a stream of subsequent expense changes.
    pub fn watch_expenses(&self, query: ExpenseQuery) -> LedgerResult<(Vec<Expense>, EventStream)> {
        let stream = self.subscribe(EventFilter::Expenses {
            gym_only: query.gym_only,
        });
        let snapshot = self.store.expenses(&query)?;
        Ok((snapshot, stream))
    }

    /// Create any missing roster aggregates and refresh display names.
    pub fn ensure_roster(&self) -> LedgerResult<Vec<MemberAggregate>> {
        let roster = self.roster.clone();
        self.transact("ensure_roster", move |tx| {
            let mut members = Vec::with_capacity(roster.len());
            let mut events = Vec::new();
            for entry in roster.members() {
                let existing = tx.member(&entry.id)?;
                let needs_write = existing
                    .as_ref()
                    .map_or(true, |member| member.name != entry.name);
                let mut member = existing
                    .unwrap_or_else(|| MemberAggregate::zeroed(entry.id.clone(), entry.name.clone()));
                if needs_write {
                    debug!(member = %entry.id, "initializing member aggregate");
                    member.name = entry.name.clone();
                    tx.put_member(&member)?;
                    events.push(LedgerEvent::member(member.clone()));
                }
                members.push(member);
            }
            Ok((members, events))
        })
    }

    /// Record a new expense and charge its participants.
    pub fn add_expense(&self, draft: ExpenseDraft) -> LedgerResult<Expense> {
        let expense = draft.into_expense(ExpenseId::generate(), &self.roster)?;
        let roster = &self.roster;
        let stored = self.transact("add_expense", |tx| {
            let impact = ExpenseImpact::from_record(&expense);
            let outcome = apply_expense_impact(tx, roster, &impact)?;
            tx.put_expense(&expense)?;
            let mut events = member_events(tx, &outcome)?;
            events.push(LedgerEvent::expense_recorded(expense.clone()));
            Ok((expense.clone(), events))
        })?;
        info!(
            expense = %stored.id,
            category = %stored.category,
            cost = %stored.cost,
            participants = stored.shared_with.len(),
            "expense recorded"
        );
        Ok(stored)
    }

    /// Replace an expense: undo the old record's impact, apply the new one and
    /// overwrite the record, all or nothing.
    pub fn edit_expense(&self, id: ExpenseId, draft: ExpenseDraft) -> LedgerResult<ExpenseEdit> {
        let current = draft.into_expense(id, &self.roster)?;
        let roster = &self.roster;
        let edit = self.transact("edit_expense", |tx| {
            let previous = tx
                .expense(&id)?
                .ok_or_else(|| LedgerError::not_found("expense", id))?;
            let mut outcome = reverse_expense_impact(tx, &ExpenseImpact::from_record(&previous))?;
            outcome.merge(apply_expense_impact(
                tx,
                roster,
                &ExpenseImpact::from_record(&current),
            )?);
            tx.put_expense(&current)?;
            let mut events = member_events(tx, &outcome)?;
            events.push(LedgerEvent::expense_updated(current.clone()));
            Ok((
                ExpenseEdit {
                    previous,
                    current: current.clone(),
                    clamped: outcome.clamped,
                },
                events,
            ))
        })?;
        info!(
            expense = %id,
            previous_cost = %edit.previous.cost,
            cost = %edit.current.cost,
            clamped = edit.clamped.len(),
            "expense updated"
        );
        Ok(edit)
    }

    /// Remove an expense and refund its impact.
    pub fn delete_expense(&self, id: ExpenseId) -> LedgerResult<ExpenseRemoval> {
        let removal = self.transact("delete_expense", |tx| {
            let expense = tx
                .expense(&id)?
                .ok_or_else(|| LedgerError::not_found("expense", id))?;
            let outcome = reverse_expense_impact(tx, &ExpenseImpact::from_record(&expense))?;
            if !tx.delete_expense(&id)? {
                return Err(LedgerError::InvalidState(format!(
                    "expense {id} vanished during delete"
                )));
            }
            let mut events = member_events(tx, &outcome)?;
            events.push(LedgerEvent::expense_deleted(expense.clone()));
            Ok((
                ExpenseRemoval {
                    expense,
                    clamped: outcome.clamped,
                },
                events,
            ))
        })?;
        info!(
            expense = %id,
            cost = %removal.expense.cost,
            clamped = removal.clamped.len(),
            "expense deleted"
        );
        Ok(removal)
    }

    /// Append a contribution and credit the member's general or gym deposit.
    pub fn record_contribution(&self, draft: ContributionDraft) -> LedgerResult<Contribution> {
        let contribution =
            draft.into_contribution(ContributionId::generate(), Utc::now(), &self.roster)?;
        let roster = &self.roster;
        let stored = self.transact("record_contribution", |tx| {
            let outcome = apply_contribution(tx, roster, &contribution)?;
            tx.append_contribution(&contribution)?;
            let mut events = member_events(tx, &outcome)?;
            events.push(LedgerEvent::contribution(contribution.clone()));
            Ok((contribution.clone(), events))
        })?;
        info!(
            member = %stored.member,
            amount = %stored.amount,
            gym = stored.is_gym(),
            "contribution recorded"
        );
        Ok(stored)
    }

    /// Administrative override of a single total. Bypasses the contribution log.
    pub fn set_aggregate_field(
        &self,
        member: &MemberId,
        field: AggregateField,
        value: Decimal,
    ) -> LedgerResult<MemberAggregate> {
        if value < Decimal::ZERO {
            return Err(ValidationError::NegativeValue(value).into());
        }
        if !self.roster.contains(member) {
            return Err(ValidationError::UnknownMember(member.clone()).into());
        }
        let roster = &self.roster;
        let (previous, updated) = self.transact("set_aggregate_field", |tx| {
            let mut aggregate = ensure_member(tx, roster, member)?;
            let previous = aggregate.get(field);
            aggregate.set(field, value);
            tx.put_member(&aggregate)?;
            Ok((
                (previous, aggregate.clone()),
                vec![LedgerEvent::member(aggregate)],
            ))
        })?;
        info!(
            member = %member,
            field = %field,
            previous = %previous,
            value = %value,
            "administrative balance override applied"
        );
        Ok(updated)
    }

    fn transact<T>(
        &self,
        operation: &'static str,
        body: impl FnOnce(&mut dyn StoreTransaction) -> LedgerResult<(T, Vec<LedgerEvent>)>,
    ) -> LedgerResult<T> {
        let (value, events) = {
            let mut tx = self.store.begin(WriteGrant::new())?;
            let result = body(tx.as_mut())?;
            tx.commit()?;
            result
        };
        debug!(operation, events = events.len(), "ledger transaction committed");
        for event in events {
            self.events.publish(event);
        }
        Ok(value)
    }
}

fn member_events(
    tx: &mut dyn StoreTransaction,
    outcome: &ImpactOutcome,
) -> LedgerResult<Vec<LedgerEvent>> {
    let mut events = Vec::with_capacity(outcome.touched.len());
    for id in &outcome.touched {
        if let Some(member) = tx.member(id)? {
            events.push(LedgerEvent::member(member));
        }
    }
    Ok(events)
}

/// Read-only view over the ledger collections.
#[derive(Clone)]
pub struct LedgerReader {
    store: Arc<dyn LedgerStore>,
    roster: Roster,
}

impl LedgerReader {
    pub fn roster(&self) -> &Roster {
        &self.roster
    }

    pub fn member(&self, id: &MemberId) -> LedgerResult<Option<MemberAggregate>> {
        self.store.member(id)
    }

    pub fn members(&self) -> LedgerResult<Vec<MemberAggregate>> {
        self.store.members()
    }

    /// One row per roster member in roster order; members never touched read as zero.
    pub fn balances(&self) -> LedgerResult<Vec<MemberBalance>> {
        let stored = self.store.members()?;
        Ok(self
            .roster
            .members()
            .iter()
            .map(|entry| {
                stored
                    .iter()
                    .find(|member| member.id == entry.id)
                    .map(MemberBalance::from)
                    .unwrap_or_else(|| {
                        MemberBalance::from(&MemberAggregate::zeroed(
                            entry.id.clone(),
                            entry.name.clone(),
                        ))
                    })
            })
            .collect())
    }

    /// Balances restricted to the gym pool.
    pub fn gym_balances(&self) -> LedgerResult<Vec<MemberBalance>> {
        Ok(self
            .balances()?
            .into_iter()
            .filter(|row| self.roster.is_gym_eligible(&row.id))
            .collect())
    }

    pub fn expense(&self, id: &ExpenseId) -> LedgerResult<Option<Expense>> {
        self.store.expense(id)
    }

    pub fn expenses(&self, query: &ExpenseQuery) -> LedgerResult<Vec<Expense>> {
        self.store.expenses(query)
    }

    pub fn contributions(&self, query: &ContributionQuery) -> LedgerResult<Vec<Contribution>> {
        self.store.contributions(query)
    }

    pub fn contribution_history(&self, member: &MemberId) -> LedgerResult<Vec<Contribution>> {
        self.store
            .contributions(&ContributionQuery::default().with_member(member.clone()))
    }

    pub fn gym_contribution_history(&self, member: &MemberId) -> LedgerResult<Vec<Contribution>> {
        self.store.contributions(
            &ContributionQuery::default()
                .with_member(member.clone())
                .with_tag(GYM_TAG),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{MemoryLedgerStore, SqliteLedgerStore};
    use chrono::NaiveDate;
    use hearth_core::{Category, SPLIT_TOLERANCE};
    use rust_decimal_macros::dec;

    fn setup() -> (Arc<MemoryLedgerStore>, LedgerEngine) {
        let store = Arc::new(MemoryLedgerStore::new());
        let engine = LedgerEngine::new(store.clone(), Roster::household_default());
        engine.ensure_roster().unwrap();
        (store, engine)
    }

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 5, d).unwrap()
    }

    fn ids(names: &[&str]) -> Vec<MemberId> {
        names.iter().map(|name| MemberId::from(*name)).collect()
    }

    fn draft(category: Category, cost: Decimal, buyer: &str, shared: &[&str]) -> ExpenseDraft {
        ExpenseDraft::new("Groceries", category, cost, day(1), buyer, ids(shared))
    }

    fn member(engine: &LedgerEngine, id: &str) -> MemberAggregate {
        engine.reader().member(&id.into()).unwrap().unwrap()
    }

    fn totals(engine: &LedgerEngine) -> Vec<MemberAggregate> {
        engine.reader().members().unwrap()
    }

    #[test]
    fn ensure_roster_creates_zeroed_members_once() {
        let (_, engine) = setup();
        let members = totals(&engine);
        assert_eq!(members.len(), 5);
        assert!(members.iter().all(|m| m.current_balance().is_zero()));
        let mut stream = engine.subscribe(EventFilter::Members);
        engine.ensure_roster().unwrap();
        assert!(stream.try_next().is_none());
    }

    #[test]
    fn general_expense_charges_participants_but_not_buyer_deposit() {
        let (_, engine) = setup();
        let expense = engine
            .add_expense(draft(Category::Food, dec!(300), "anudeep", &["anudeep", "mahesh"]))
            .unwrap();
        assert_eq!(expense.split_amount, Some(dec!(150)));
        assert!(!expense.is_gym_expense);

        let anudeep = member(&engine, "anudeep");
        assert_eq!(anudeep.total_paid, dec!(150));
        assert_eq!(anudeep.total_deposited, Decimal::ZERO);
        assert_eq!(member(&engine, "mahesh").total_paid, dec!(150));
        assert_eq!(member(&engine, "rohith").total_paid, Decimal::ZERO);
    }

    #[test]
    fn three_way_split_sums_back_to_cost() {
        let (_, engine) = setup();
        let expense = engine
            .add_expense(draft(
                Category::Utilities,
                dec!(100),
                "rohith",
                &["anudeep", "mahesh", "rohith"],
            ))
            .unwrap();
        let split = expense.split_amount.unwrap();
        assert!((split * dec!(3) - dec!(100)).abs() <= SPLIT_TOLERANCE);
        let paid: Decimal = totals(&engine).iter().map(|m| m.total_paid).sum();
        assert!((paid - dec!(100)).abs() <= SPLIT_TOLERANCE);
    }

    #[test]
    fn gym_expense_credits_buyer_pool_and_leaves_general_totals() {
        let (_, engine) = setup();
        engine
            .add_expense(draft(Category::Gym, dec!(200), "karthik", &["karthik", "shiva"]))
            .unwrap();
        let karthik = member(&engine, "karthik");
        let shiva = member(&engine, "shiva");
        assert_eq!(karthik.total_gym_paid, dec!(100));
        assert_eq!(karthik.total_gym_deposited, dec!(200));
        assert_eq!(karthik.current_gym_balance(), dec!(100));
        assert_eq!(shiva.total_gym_paid, dec!(100));
        assert_eq!(shiva.current_gym_balance(), dec!(-100));
        for m in totals(&engine) {
            assert!(m.total_paid.is_zero());
            assert!(m.total_deposited.is_zero());
        }
    }

    #[test]
    fn gym_expense_rejects_ineligible_participants() {
        let (_, engine) = setup();
        let before = totals(&engine);
        let err = engine
            .add_expense(draft(Category::Gym, dec!(200), "karthik", &["karthik", "mahesh"]))
            .unwrap_err();
        assert!(matches!(
            err,
            LedgerError::Validation(ValidationError::NotGymEligible(_))
        ));
        assert_eq!(totals(&engine), before);
        assert!(engine.reader().expenses(&ExpenseQuery::default()).unwrap().is_empty());
    }

    #[test]
    fn delete_restores_prior_totals() {
        let (_, engine) = setup();
        engine
            .record_contribution(ContributionDraft::manual("anudeep", dec!(500), engine.roster()))
            .unwrap();
        let before = totals(&engine);
        let general = engine
            .add_expense(draft(Category::Rent, dec!(90), "mahesh", &["anudeep", "mahesh", "shiva"]))
            .unwrap();
        let gym = engine
            .add_expense(draft(Category::Gym, dec!(60), "shiva", &["karthik", "shiva"]))
            .unwrap();

        let removed = engine.delete_expense(gym.id).unwrap();
        assert!(removed.clamped.is_empty());
        engine.delete_expense(general.id).unwrap();

        assert_eq!(totals(&engine), before);
        assert!(engine.reader().expense(&general.id).unwrap().is_none());
    }

    #[test]
    fn edit_moves_charges_between_participants() {
        let (_, engine) = setup();
        let original = engine
            .add_expense(draft(Category::Food, dec!(300), "anudeep", &["anudeep", "mahesh"]))
            .unwrap();
        let edit = engine
            .edit_expense(
                original.id,
                draft(Category::Food, dec!(450), "anudeep", &["anudeep", "mahesh", "rohith"]),
            )
            .unwrap();

        assert_eq!(edit.previous, original);
        assert_eq!(edit.current.id, original.id);
        assert_eq!(edit.current.split_amount, Some(dec!(150)));
        assert!(edit.clamped.is_empty());
        assert_eq!(member(&engine, "anudeep").total_paid, dec!(150));
        assert_eq!(member(&engine, "mahesh").total_paid, dec!(150));
        assert_eq!(member(&engine, "rohith").total_paid, dec!(150));
        assert_eq!(member(&engine, "anudeep").total_deposited, Decimal::ZERO);

        let stored = engine.reader().expense(&original.id).unwrap().unwrap();
        assert_eq!(stored.cost, dec!(450));
        assert_eq!(engine.reader().expenses(&ExpenseQuery::default()).unwrap().len(), 1);
    }

    #[test]
    fn edit_across_pools_moves_the_impact() {
        let (_, engine) = setup();
        let original = engine
            .add_expense(draft(Category::Gym, dec!(80), "karthik", &["karthik", "shiva"]))
            .unwrap();
        engine
            .edit_expense(
                original.id,
                draft(Category::Food, dec!(80), "karthik", &["karthik", "shiva"]),
            )
            .unwrap();
        let karthik = member(&engine, "karthik");
        assert!(karthik.total_gym_paid.is_zero());
        assert!(karthik.total_gym_deposited.is_zero());
        assert_eq!(karthik.total_paid, dec!(40));
        assert!(!engine.reader().expense(&original.id).unwrap().unwrap().is_gym_expense);
    }

    #[test]
    fn missing_expense_is_not_found_and_changes_nothing() {
        let (_, engine) = setup();
        engine
            .add_expense(draft(Category::Food, dec!(30), "anudeep", &["anudeep"]))
            .unwrap();
        let before = totals(&engine);
        let missing = ExpenseId::generate();

        let err = engine.delete_expense(missing).unwrap_err();
        assert!(matches!(err, LedgerError::NotFound { entity: "expense", .. }));
        let err = engine
            .edit_expense(missing, draft(Category::Food, dec!(10), "anudeep", &["anudeep"]))
            .unwrap_err();
        assert!(err.is_rejection());
        assert_eq!(totals(&engine), before);
    }

    #[test]
    fn invalid_edit_leaves_record_and_totals_untouched() {
        let (_, engine) = setup();
        let original = engine
            .add_expense(draft(Category::Food, dec!(30), "anudeep", &["anudeep"]))
            .unwrap();
        let before = totals(&engine);
        let err = engine
            .edit_expense(original.id, draft(Category::Food, dec!(-5), "anudeep", &["anudeep"]))
            .unwrap_err();
        assert!(matches!(
            err,
            LedgerError::Validation(ValidationError::NonPositiveCost(_))
        ));
        let err = engine
            .edit_expense(original.id, draft(Category::Food, dec!(5), "anudeep", &[]))
            .unwrap_err();
        assert!(matches!(
            err,
            LedgerError::Validation(ValidationError::EmptySharedWith)
        ));
        assert_eq!(totals(&engine), before);
        assert_eq!(engine.reader().expense(&original.id).unwrap().unwrap(), original);
    }

    #[test]
    fn reversal_clamps_drifted_totals_at_zero() {
        let (_, engine) = setup();
        let expense = engine
            .add_expense(draft(Category::Food, dec!(100), "anudeep", &["anudeep", "mahesh"]))
            .unwrap();
        engine
            .set_aggregate_field(&"anudeep".into(), AggregateField::Paid, dec!(20))
            .unwrap();

        let removal = engine.delete_expense(expense.id).unwrap();
        assert_eq!(
            removal.clamped,
            vec![ClampedField {
                member: "anudeep".into(),
                field: AggregateField::Paid,
                shortfall: dec!(30),
            }]
        );
        assert!(member(&engine, "anudeep").total_paid.is_zero());
        assert!(member(&engine, "mahesh").total_paid.is_zero());
    }

    #[test]
    fn legacy_record_without_split_reverses_recomputed_share() {
        let (store, engine) = setup();
        engine
            .set_aggregate_field(&"anudeep".into(), AggregateField::Paid, dec!(150))
            .unwrap();
        engine
            .set_aggregate_field(&"mahesh".into(), AggregateField::Paid, dec!(150))
            .unwrap();
        let legacy = Expense {
            id: ExpenseId::generate(),
            item_name: "Old rent".into(),
            category: Category::Rent,
            cost: dec!(300),
            date: day(2),
            buyer: "anudeep".into(),
            shared_with: ids(&["anudeep", "mahesh"]),
            split_amount: None,
            is_gym_expense: false,
        };
        let mut tx = store.begin(WriteGrant::new()).unwrap();
        tx.put_expense(&legacy).unwrap();
        tx.commit().unwrap();

        let removal = engine.delete_expense(legacy.id).unwrap();
        assert!(removal.clamped.is_empty());
        assert!(member(&engine, "anudeep").total_paid.is_zero());
        assert!(member(&engine, "mahesh").total_paid.is_zero());
    }

    #[test]
    fn garbled_huge_split_is_recomputed_on_delete() {
        let (store, engine) = setup();
        engine
            .set_aggregate_field(&"anudeep".into(), AggregateField::Paid, dec!(150))
            .unwrap();
        engine
            .set_aggregate_field(&"mahesh".into(), AggregateField::Paid, dec!(200))
            .unwrap();
        let garbled = Expense {
            id: ExpenseId::generate(),
            item_name: "Groceries".into(),
            category: Category::Food,
            cost: dec!(300),
            date: day(3),
            buyer: "anudeep".into(),
            shared_with: ids(&["anudeep", "mahesh"]),
            split_amount: Some(Decimal::MAX),
            is_gym_expense: false,
        };
        let mut tx = store.begin(WriteGrant::new()).unwrap();
        tx.put_expense(&garbled).unwrap();
        tx.commit().unwrap();

        let removal = engine.delete_expense(garbled.id).unwrap();
        assert!(removal.clamped.is_empty());
        assert!(member(&engine, "anudeep").total_paid.is_zero());
        assert_eq!(member(&engine, "mahesh").total_paid, dec!(50));
        assert!(engine.reader().expense(&garbled.id).unwrap().is_none());
    }

    #[test]
    fn contribution_that_would_overflow_a_total_is_rejected() {
        let (_, engine) = setup();
        engine
            .record_contribution(ContributionDraft::manual("mahesh", Decimal::MAX, engine.roster()))
            .unwrap();
        let mut stream = engine.subscribe(EventFilter::Members);

        let err = engine
            .record_contribution(ContributionDraft::manual("mahesh", dec!(1), engine.roster()))
            .unwrap_err();
        assert!(matches!(
            err,
            LedgerError::Validation(ValidationError::TotalOverflow {
                field: AggregateField::Deposited,
                ..
            })
        ));
        assert!(err.is_rejection());
        assert_eq!(member(&engine, "mahesh").total_deposited, Decimal::MAX);
        assert_eq!(
            engine
                .reader()
                .contribution_history(&"mahesh".into())
                .unwrap()
                .len(),
            1
        );
        assert!(stream.try_next().is_none());
    }

    #[test]
    fn manual_top_up_raises_balance_and_logs_contribution() {
        let (_, engine) = setup();
        let contribution = engine
            .record_contribution(ContributionDraft::manual("mahesh", dec!(1000), engine.roster()))
            .unwrap();
        assert_eq!(contribution.description, "Manual contribution by Mahesh");
        assert!(contribution.has_tag("top-up"));

        let mahesh = member(&engine, "mahesh");
        assert_eq!(mahesh.total_deposited, dec!(1000));
        assert_eq!(mahesh.current_balance(), dec!(1000));
        assert!(mahesh.total_gym_deposited.is_zero());

        let history = engine.reader().contribution_history(&"mahesh".into()).unwrap();
        assert_eq!(history, vec![contribution]);
        assert!(engine
            .reader()
            .gym_contribution_history(&"mahesh".into())
            .unwrap()
            .is_empty());
    }

    #[test]
    fn gym_contribution_requires_eligibility() {
        let (_, engine) = setup();
        engine
            .record_contribution(ContributionDraft::gym("shiva", dec!(250), engine.roster()))
            .unwrap();
        assert_eq!(member(&engine, "shiva").total_gym_deposited, dec!(250));
        assert_eq!(
            engine
                .reader()
                .gym_contribution_history(&"shiva".into())
                .unwrap()
                .len(),
            1
        );

        let err = engine
            .record_contribution(ContributionDraft::gym("rohith", dec!(10), engine.roster()))
            .unwrap_err();
        assert!(matches!(
            err,
            LedgerError::Validation(ValidationError::NotGymEligible(_))
        ));
        let err = engine
            .record_contribution(ContributionDraft::manual("rohith", dec!(0), engine.roster()))
            .unwrap_err();
        assert!(err.is_rejection());
        assert!(member(&engine, "rohith").total_deposited.is_zero());
    }

    #[test]
    fn override_rejects_negative_values_and_unknown_members() {
        let (_, engine) = setup();
        assert!(engine
            .set_aggregate_field(&"anudeep".into(), AggregateField::Deposited, dec!(-1))
            .is_err());
        assert!(engine
            .set_aggregate_field(&"ghost".into(), AggregateField::Deposited, dec!(1))
            .is_err());
        let updated = engine
            .set_aggregate_field(&"karthik".into(), AggregateField::GymDeposited, dec!(75))
            .unwrap();
        assert_eq!(updated.total_gym_deposited, dec!(75));
        assert!(engine
            .reader()
            .contributions(&ContributionQuery::default())
            .unwrap()
            .is_empty());
    }

    #[test]
    fn totals_track_the_surviving_history() {
        let (_, engine) = setup();
        let roster = engine.roster().clone();
        engine
            .record_contribution(ContributionDraft::manual("anudeep", dec!(400), &roster))
            .unwrap();
        engine
            .record_contribution(ContributionDraft::gym("karthik", dec!(120), &roster))
            .unwrap();
        let a = engine
            .add_expense(draft(Category::Food, dec!(100), "anudeep", &["anudeep", "mahesh", "rohith"]))
            .unwrap();
        let b = engine
            .add_expense(draft(Category::Cleaning, dec!(45), "rohith", &["rohith", "shiva"]))
            .unwrap();
        let g = engine
            .add_expense(draft(Category::Gym, dec!(90), "shiva", &["karthik", "shiva"]))
            .unwrap();
        engine
            .edit_expense(b.id, draft(Category::Cleaning, dec!(60), "rohith", &["rohith"]))
            .unwrap();
        engine.delete_expense(a.id).unwrap();

        let members = totals(&engine);
        let sum = |field: AggregateField| -> Decimal { members.iter().map(|m| m.get(field)).sum() };
        assert!((sum(AggregateField::Paid) - dec!(60)).abs() <= SPLIT_TOLERANCE);
        assert_eq!(sum(AggregateField::Deposited), dec!(400));
        assert_eq!(sum(AggregateField::GymPaid), g.cost);
        assert_eq!(sum(AggregateField::GymDeposited), dec!(120) + g.cost);
    }

    #[test]
    fn balances_follow_roster_order_with_gym_subset() {
        let store = Arc::new(MemoryLedgerStore::new());
        let engine = LedgerEngine::new(store, Roster::household_default());
        engine
            .record_contribution(ContributionDraft::manual("shiva", dec!(10), engine.roster()))
            .unwrap();
        let rows = engine.reader().balances().unwrap();
        let order: Vec<&str> = rows.iter().map(|row| row.id.as_str()).collect();
        assert_eq!(order, vec!["anudeep", "karthik", "mahesh", "rohith", "shiva"]);
        assert_eq!(rows[4].current_balance, dec!(10));
        assert!(rows[0].current_balance.is_zero());

        let gym: Vec<MemberId> = engine
            .reader()
            .gym_balances()
            .unwrap()
            .into_iter()
            .map(|row| row.id)
            .collect();
        assert_eq!(gym, ids(&["karthik", "shiva"]));
    }

    #[test]
    fn events_carry_post_commit_state() {
        let (_, engine) = setup();
        let mut members = engine.subscribe(EventFilter::Members);
        let mut gym = engine.subscribe(EventFilter::gym_expenses());

        engine
            .add_expense(draft(Category::Food, dec!(20), "anudeep", &["anudeep"]))
            .unwrap();
        let recorded = engine
            .add_expense(draft(Category::Gym, dec!(200), "karthik", &["karthik", "shiva"]))
            .unwrap();

        match gym.try_next() {
            Some(LedgerEvent::ExpenseRecorded(event)) => assert_eq!(event.expense, recorded),
            other => panic!("unexpected event {other:?}"),
        }
        assert!(gym.try_next().is_none());

        let mut updates = Vec::new();
        while let Some(LedgerEvent::MemberUpdated(event)) = members.try_next() {
            updates.push(event.member);
        }
        let karthik = updates
            .iter()
            .rev()
            .find(|m| m.id.as_str() == "karthik")
            .unwrap();
        assert_eq!(karthik.total_gym_deposited, dec!(200));
        assert_eq!(karthik.total_gym_paid, dec!(100));
    }

    #[test]
    fn failed_operations_publish_nothing() {
        let (_, engine) = setup();
        let mut stream = engine.subscribe(EventFilter::All);
        let _ = engine.delete_expense(ExpenseId::generate());
        let _ = engine.add_expense(draft(Category::Food, dec!(0), "anudeep", &["anudeep"]));
        assert!(stream.try_next().is_none());
    }

    #[tokio::test]
    async fn watch_members_streams_updates_after_snapshot() {
        let (_, engine) = setup();
        let (snapshot, mut stream) = engine.watch_members().unwrap();
        assert_eq!(snapshot.len(), 5);

        engine
            .record_contribution(ContributionDraft::manual("rohith", dec!(42), engine.roster()))
            .unwrap();
        match stream.recv().await.unwrap() {
            LedgerEvent::MemberUpdated(event) => {
                assert_eq!(event.member.id.as_str(), "rohith");
                assert_eq!(event.member.total_deposited, dec!(42));
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn watch_expenses_honours_gym_query() {
        let (_, engine) = setup();
        engine
            .add_expense(draft(Category::Gym, dec!(40), "shiva", &["shiva"]))
            .unwrap();
        engine
            .add_expense(draft(Category::Food, dec!(40), "shiva", &["shiva"]))
            .unwrap();
        let (snapshot, mut stream) = engine.watch_expenses(ExpenseQuery::gym()).unwrap();
        assert_eq!(snapshot.len(), 1);
        let removed = engine.delete_expense(snapshot[0].id).unwrap();
        match stream.try_next() {
            Some(LedgerEvent::ExpenseDeleted(event)) => assert_eq!(event.expense, removed.expense),
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn engine_runs_against_sqlite() {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteLedgerStore::new(dir.path().join("ledger.db"), "household").unwrap();
        let engine = LedgerEngine::new(Arc::new(store), Roster::household_default());
        engine.ensure_roster().unwrap();

        let expense = engine
            .add_expense(draft(Category::Transport, dec!(100), "mahesh", &["anudeep", "mahesh", "rohith"]))
            .unwrap();
        engine
            .edit_expense(
                expense.id,
                draft(Category::Transport, dec!(60), "mahesh", &["anudeep", "mahesh"]),
            )
            .unwrap();
        assert_eq!(member(&engine, "anudeep").total_paid, dec!(30));
        assert!(member(&engine, "rohith").total_paid.is_zero());

        engine.delete_expense(expense.id).unwrap();
        assert!(totals(&engine).iter().all(|m| m.total_paid.is_zero()));
        assert!(engine
            .reader()
            .expenses(&ExpenseQuery::default())
            .unwrap()
            .is_empty());
    }
}
