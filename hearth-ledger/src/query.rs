use chrono::{DateTime, NaiveDate, Utc};
use hearth_core::{Contribution, Expense, MemberId};

/// Filter describing which expenses to load from storage.
#[derive(Clone, Debug, Default)]
pub struct ExpenseQuery {
    pub gym_only: bool,
    pub member: Option<MemberId>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub limit: Option<usize>,
}

impl ExpenseQuery {
    pub fn gym() -> Self {
        Self {
            gym_only: true,
            ..Self::default()
        }
    }

    pub fn with_member(mut self, member: MemberId) -> Self {
        self.member = Some(member);
        self
    }

    /// Inclusive date range; either end may be open.
    pub fn with_date_range(mut self, start: Option<NaiveDate>, end: Option<NaiveDate>) -> Self {
        self.start_date = start;
        self.end_date = end;
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn matches(&self, expense: &Expense) -> bool {
        if self.gym_only && !expense.is_gym_expense {
            return false;
        }
        if let Some(member) = &self.member {
            if !expense.involves(member) {
                return false;
            }
        }
        if self.start_date.is_some_and(|start| expense.date < start) {
            return false;
        }
        if self.end_date.is_some_and(|end| expense.date > end) {
            return false;
        }
        true
    }
}

/// Filter describing which contribution entries to load.
#[derive(Clone, Debug, Default)]
pub struct ContributionQuery {
    pub member: Option<MemberId>,
    pub tag: Option<String>,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub limit: Option<usize>,
}

impl ContributionQuery {
    pub fn with_member(mut self, member: MemberId) -> Self {
        self.member = Some(member);
        self
    }

    /// Only entries carrying `tag` (case-insensitive), e.g. `GYM`.
    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tag = Some(tag.into());
        self
    }

    pub fn with_time_range(
        mut self,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
    ) -> Self {
        self.start_time = start;
        self.end_time = end;
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn matches(&self, contribution: &Contribution) -> bool {
        if let Some(member) = &self.member {
            if &contribution.member != member {
                return false;
            }
        }
        if let Some(tag) = &self.tag {
            if !contribution.has_tag(tag) {
                return false;
            }
        }
        if self.start_time.is_some_and(|start| contribution.date < start) {
            return false;
        }
        if self.end_time.is_some_and(|end| contribution.date > end) {
            return false;
        }
        true
    }
}
