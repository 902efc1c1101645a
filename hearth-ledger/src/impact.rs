//! Apply and reverse the financial effect of expenses and contributions against
//! member aggregates.
//!
//! These functions operate on an open [`StoreTransaction`]; the engine owns the
//! transaction boundaries. General expenses never credit the buyer: only
//! contributions raise `total_deposited`. Gym expenses count as a deposit into the
//! gym pool for the buyer.

use hearth_core::{
    split_of, AggregateField, Contribution, Expense, MemberAggregate, MemberId, Roster,
    ValidationError,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::store::StoreTransaction;
use crate::LedgerResult;

/// The inputs needed to apply or reverse one expense.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExpenseImpact {
    pub cost: Decimal,
    pub buyer: MemberId,
    pub shared_with: Vec<MemberId>,
    pub split_amount: Decimal,
    pub is_gym_expense: bool,
}

impl ExpenseImpact {
    /// Derive the impact from a stored record without trusting its denormalized
    /// fields: the split is recomputed when absent or inconsistent with the cost,
    /// and the gym flag always follows the category.
    pub fn from_record(expense: &Expense) -> Self {
        let computed = split_of(expense.cost, expense.shared_with.len());
        let split_amount = if expense.stored_split_is_consistent() {
            expense.split_amount.unwrap_or_default()
        } else {
            if expense.shared_with.is_empty() {
                warn!(expense = %expense.id, "expense has no participants; only the buyer side is reversible");
            } else {
                warn!(
                    expense = %expense.id,
                    stored = ?expense.split_amount,
                    recomputed = ?computed,
                    "stored split amount missing or inconsistent; recomputing"
                );
            }
            computed.unwrap_or(Decimal::ZERO)
        };
        let is_gym_expense = expense.category.is_gym();
        if is_gym_expense != expense.is_gym_expense {
            warn!(
                expense = %expense.id,
                category = %expense.category,
                stored_flag = expense.is_gym_expense,
                "stored gym flag disagrees with category; using category"
            );
        }
        Self {
            cost: expense.cost,
            buyer: expense.buyer.clone(),
            shared_with: expense.shared_with.clone(),
            split_amount,
            is_gym_expense,
        }
    }

    fn paid_field(&self) -> AggregateField {
        if self.is_gym_expense {
            AggregateField::GymPaid
        } else {
            AggregateField::Paid
        }
    }
}

/// A reversal that would have driven a total below zero.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClampedField {
    pub member: MemberId,
    pub field: AggregateField,
    /// How far below zero the strict inverse would have gone.
    pub shortfall: Decimal,
}

/// Members written by an impact step plus any zero clamps applied.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ImpactOutcome {
    pub touched: Vec<MemberId>,
    pub clamped: Vec<ClampedField>,
}

impl ImpactOutcome {
    fn touch(&mut self, member: &MemberId) {
        if !self.touched.contains(member) {
            self.touched.push(member.clone());
        }
    }

    pub fn merge(&mut self, other: ImpactOutcome) {
        for member in &other.touched {
            self.touch(member);
        }
        self.clamped.extend(other.clamped);
    }
}

/// Load a member aggregate, synthesizing a zeroed one named from the roster.
pub fn ensure_member(
    tx: &mut dyn StoreTransaction,
    roster: &Roster,
    id: &MemberId,
) -> LedgerResult<MemberAggregate> {
    match tx.member(id)? {
        Some(member) => Ok(member),
        None => {
            debug!(member = %id, "creating member aggregate with zero totals");
            Ok(MemberAggregate::zeroed(id.clone(), roster.display_name(id)))
        }
    }
}

fn credit(
    tx: &mut dyn StoreTransaction,
    roster: &Roster,
    id: &MemberId,
    field: AggregateField,
    amount: Decimal,
    outcome: &mut ImpactOutcome,
) -> LedgerResult<()> {
    let mut member = ensure_member(tx, roster, id)?;
    let total = member
        .get(field)
        .checked_add(amount)
        .ok_or_else(|| ValidationError::TotalOverflow {
            member: id.clone(),
            field,
            amount,
        })?;
    member.set(field, total);
    tx.put_member(&member)?;
    outcome.touch(id);
    Ok(())
}

/// Subtract `amount` from an existing aggregate, flooring at zero.
/// Missing members are skipped: there is nothing to reverse into.
fn debit_clamped(
    tx: &mut dyn StoreTransaction,
    id: &MemberId,
    field: AggregateField,
    amount: Decimal,
    outcome: &mut ImpactOutcome,
) -> LedgerResult<()> {
    let Some(mut member) = tx.member(id)? else {
        debug!(member = %id, field = %field, "skipping reversal for missing member");
        return Ok(());
    };
    let next = member.get(field) - amount;
    if next < Decimal::ZERO {
        let shortfall = -next;
        warn!(
            member = %id,
            field = %field,
            shortfall = %shortfall,
            "reversal clamped at zero; aggregate had drifted below the expense history"
        );
        outcome.clamped.push(ClampedField {
            member: id.clone(),
            field,
            shortfall,
        });
        member.set(field, Decimal::ZERO);
    } else {
        member.set(field, next);
    }
    tx.put_member(&member)?;
    outcome.touch(id);
    Ok(())
}

/// Charge every participant their split and, for gym expenses, credit the buyer's
/// gym deposit with the full cost.
pub fn apply_expense_impact(
    tx: &mut dyn StoreTransaction,
    roster: &Roster,
    impact: &ExpenseImpact,
) -> LedgerResult<ImpactOutcome> {
    let mut outcome = ImpactOutcome::default();
    let field = impact.paid_field();
    for member in &impact.shared_with {
        credit(tx, roster, member, field, impact.split_amount, &mut outcome)?;
    }
    if impact.is_gym_expense {
        credit(
            tx,
            roster,
            &impact.buyer,
            AggregateField::GymDeposited,
            impact.cost,
            &mut outcome,
        )?;
    }
    Ok(outcome)
}

/// Inverse of [`apply_expense_impact`] with every total floored at zero.
pub fn reverse_expense_impact(
    tx: &mut dyn StoreTransaction,
    impact: &ExpenseImpact,
) -> LedgerResult<ImpactOutcome> {
    let mut outcome = ImpactOutcome::default();
    let field = impact.paid_field();
    for member in &impact.shared_with {
        debit_clamped(tx, member, field, impact.split_amount, &mut outcome)?;
    }
    if impact.is_gym_expense {
        debit_clamped(
            tx,
            &impact.buyer,
            AggregateField::GymDeposited,
            impact.cost,
            &mut outcome,
        )?;
    }
    Ok(outcome)
}

/// Credit a contribution to the general or gym deposit, depending on its tags.
pub fn apply_contribution(
    tx: &mut dyn StoreTransaction,
    roster: &Roster,
    contribution: &Contribution,
) -> LedgerResult<ImpactOutcome> {
    let mut outcome = ImpactOutcome::default();
    let field = if contribution.is_gym() {
        AggregateField::GymDeposited
    } else {
        AggregateField::Deposited
    };
    credit(
        tx,
        roster,
        &contribution.member,
        field,
        contribution.amount,
        &mut outcome,
    )?;
    Ok(outcome)
}
