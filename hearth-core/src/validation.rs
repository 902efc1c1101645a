use std::str::FromStr;

use rust_decimal::Decimal;
use thiserror::Error;

use crate::{AggregateField, MemberId};

/// Absolute tolerance used when checking `split * participants == cost`.
pub const SPLIT_TOLERANCE: Decimal = Decimal::from_parts(1, 0, 0, false, 9);

/// Input rejected before any ledger state is touched.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("cost must be a positive amount, got {0}")]
    NonPositiveCost(Decimal),
    #[error("expense must be shared with at least one member")]
    EmptySharedWith,
    #[error("member '{0}' appears more than once in the participant list")]
    DuplicateParticipant(MemberId),
    #[error("unknown member '{0}'")]
    UnknownMember(MemberId),
    #[error("member '{0}' is not part of the gym pool")]
    NotGymEligible(MemberId),
    #[error("item name cannot be empty")]
    EmptyItemName,
    #[error("amount must be positive, got {0}")]
    NonPositiveAmount(Decimal),
    #[error("'{0}' is not a valid amount")]
    InvalidAmount(String),
    #[error("balance override must be non-negative, got {0}")]
    NegativeValue(Decimal),
    #[error("unknown aggregate field '{0}'")]
    UnknownField(String),
    #[error("unknown category '{0}'")]
    UnknownCategory(String),
    #[error("adding {amount} to {field} of member '{member}' exceeds the representable range")]
    TotalOverflow {
        member: MemberId,
        field: AggregateField,
        amount: Decimal,
    },
    #[error("member id cannot be empty")]
    EmptyMemberId,
    #[error("roster must contain at least one member")]
    EmptyRoster,
    #[error("roster entry {0} has an empty id")]
    EmptyRosterId(usize),
    #[error("duplicate roster member '{0}'")]
    DuplicateRosterMember(MemberId),
}

/// Parse a user supplied currency amount such as `"1000"` or `"12.50"`.
pub fn parse_amount(raw: &str) -> Result<Decimal, ValidationError> {
    let trimmed = raw.trim();
    Decimal::from_str(trimmed)
        .or_else(|_| Decimal::from_scientific(trimmed))
        .map_err(|_| ValidationError::InvalidAmount(raw.to_string()))
}

/// Parse an amount that must be strictly positive.
pub fn parse_positive_amount(raw: &str) -> Result<Decimal, ValidationError> {
    let amount = parse_amount(raw)?;
    if amount <= Decimal::ZERO {
        return Err(ValidationError::NonPositiveAmount(amount));
    }
    Ok(amount)
}

/// True when two amounts agree within [`SPLIT_TOLERANCE`].
pub fn approx_eq(lhs: Decimal, rhs: Decimal) -> bool {
    lhs.checked_sub(rhs)
        .is_some_and(|diff| diff.abs() <= SPLIT_TOLERANCE)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn tolerance_is_one_billionth() {
        assert_eq!(SPLIT_TOLERANCE, dec!(0.000000001));
        assert!(approx_eq(dec!(100), dec!(99.9999999999)));
        assert!(!approx_eq(dec!(100), dec!(99.99)));
        assert!(!approx_eq(Decimal::MIN, Decimal::MAX));
    }

    #[test]
    fn parses_amounts() {
        assert_eq!(parse_amount(" 12.50 ").unwrap(), dec!(12.50));
        assert_eq!(parse_positive_amount("1000").unwrap(), dec!(1000));
        assert!(matches!(
            parse_amount("abc"),
            Err(ValidationError::InvalidAmount(_))
        ));
        assert!(matches!(
            parse_positive_amount("0"),
            Err(ValidationError::NonPositiveAmount(_))
        ));
        assert!(matches!(
            parse_positive_amount("-5"),
            Err(ValidationError::NonPositiveAmount(_))
        ));
    }
}
