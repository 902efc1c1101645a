//! Read-side folds over ledger snapshots: household reports, the gym dashboard
//! summary and CSV export. Nothing here writes to the ledger.

mod export;
mod report;

use chrono::NaiveDate;
use thiserror::Error;

pub use export::write_expense_csv;
pub use report::{
    CategoryTotal, GymSummary, MemberContributionSummary, MonthlyBreakdown, Report, ReportRange,
};

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("start date {start} is after end date {end}")]
    InvalidRange { start: NaiveDate, end: NaiveDate },
    #[error("csv export failed: {0}")]
    Csv(#[from] csv::Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}
