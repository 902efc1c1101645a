use hearth_core::{Contribution, Expense, MemberAggregate, MemberId};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

pub use tokio::sync::broadcast::error::RecvError;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MemberEvent {
    pub member: MemberAggregate,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ExpenseEvent {
    pub expense: Expense,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ContributionEvent {
    pub contribution: Contribution,
}

/// Committed change pushed to live subscribers.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum LedgerEvent {
    MemberUpdated(MemberEvent),
    ExpenseRecorded(ExpenseEvent),
    ExpenseUpdated(ExpenseEvent),
    ExpenseDeleted(ExpenseEvent),
    ContributionRecorded(ContributionEvent),
}

impl LedgerEvent {
    pub fn member(member: MemberAggregate) -> Self {
        Self::MemberUpdated(MemberEvent { member })
    }

    pub fn expense_recorded(expense: Expense) -> Self {
        Self::ExpenseRecorded(ExpenseEvent { expense })
    }

    pub fn expense_updated(expense: Expense) -> Self {
        Self::ExpenseUpdated(ExpenseEvent { expense })
    }

    pub fn expense_deleted(expense: Expense) -> Self {
        Self::ExpenseDeleted(ExpenseEvent { expense })
    }

    pub fn contribution(contribution: Contribution) -> Self {
        Self::ContributionRecorded(ContributionEvent { contribution })
    }
}

/// Predicate narrowing a subscription to one collection.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum EventFilter {
    #[default]
    All,
    Members,
    Expenses {
        gym_only: bool,
    },
    Contributions {
        member: Option<MemberId>,
        tag: Option<String>,
    },
}

impl EventFilter {
    pub fn gym_expenses() -> Self {
        Self::Expenses { gym_only: true }
    }

    pub fn matches(&self, event: &LedgerEvent) -> bool {
        match (self, event) {
            (EventFilter::All, _) => true,
            (EventFilter::Members, LedgerEvent::MemberUpdated(_)) => true,
            (
                EventFilter::Expenses { gym_only },
                LedgerEvent::ExpenseRecorded(ev)
                | LedgerEvent::ExpenseUpdated(ev)
                | LedgerEvent::ExpenseDeleted(ev),
            ) => !gym_only || ev.expense.is_gym_expense,
            (EventFilter::Contributions { member, tag }, LedgerEvent::ContributionRecorded(ev)) => {
                let contribution = &ev.contribution;
                member.as_ref().map_or(true, |id| &contribution.member == id)
                    && tag.as_deref().map_or(true, |t| contribution.has_tag(t))
            }
            _ => false,
        }
    }
}

pub struct EventBus {
    sender: broadcast::Sender<LedgerEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> EventStream {
        self.subscribe_filtered(EventFilter::All)
    }

    pub fn subscribe_filtered(&self, filter: EventFilter) -> EventStream {
        EventStream {
            receiver: self.sender.subscribe(),
            filter,
        }
    }

    pub fn publish(&self, event: LedgerEvent) {
        let _ = self.sender.send(event);
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}

pub struct EventStream {
    receiver: broadcast::Receiver<LedgerEvent>,
    filter: EventFilter,
}

impl EventStream {
    /// Wait for the next event accepted by this stream's filter.
    pub async fn recv(&mut self) -> Result<LedgerEvent, RecvError> {
        loop {
            let event = self.receiver.recv().await?;
            if self.filter.matches(&event) {
                return Ok(event);
            }
        }
    }

    /// Non-blocking variant of [`EventStream::recv`]; `None` once drained.
    pub fn try_next(&mut self) -> Option<LedgerEvent> {
        while let Ok(event) = self.receiver.try_recv() {
            if self.filter.matches(&event) {
                return Some(event);
            }
        }
        None
    }

    pub fn filter(&self) -> &EventFilter {
        &self.filter
    }
}
