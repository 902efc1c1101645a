use std::fmt;
use std::str::FromStr;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{MemberId, ValidationError};

/// The four running totals stored per member.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberAggregate {
    pub id: MemberId,
    pub name: String,
    pub total_deposited: Decimal,
    pub total_paid: Decimal,
    pub total_gym_deposited: Decimal,
    pub total_gym_paid: Decimal,
}

impl MemberAggregate {
    /// Fresh aggregate with every total at zero.
    pub fn zeroed(id: MemberId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            total_deposited: Decimal::ZERO,
            total_paid: Decimal::ZERO,
            total_gym_deposited: Decimal::ZERO,
            total_gym_paid: Decimal::ZERO,
        }
    }

    pub fn current_balance(&self) -> Decimal {
        self.total_deposited - self.total_paid
    }

    pub fn current_gym_balance(&self) -> Decimal {
        self.total_gym_deposited - self.total_gym_paid
    }

    pub fn get(&self, field: AggregateField) -> Decimal {
        match field {
            AggregateField::Deposited => self.total_deposited,
            AggregateField::Paid => self.total_paid,
            AggregateField::GymDeposited => self.total_gym_deposited,
            AggregateField::GymPaid => self.total_gym_paid,
        }
    }

    pub fn set(&mut self, field: AggregateField, value: Decimal) {
        match field {
            AggregateField::Deposited => self.total_deposited = value,
            AggregateField::Paid => self.total_paid = value,
            AggregateField::GymDeposited => self.total_gym_deposited = value,
            AggregateField::GymPaid => self.total_gym_paid = value,
        }
    }
}

/// Names one of the four stored totals.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AggregateField {
    #[serde(rename = "total_deposited")]
    Deposited,
    #[serde(rename = "total_paid")]
    Paid,
    #[serde(rename = "total_gym_deposited")]
    GymDeposited,
    #[serde(rename = "total_gym_paid")]
    GymPaid,
}

impl AggregateField {
    pub const ALL: [AggregateField; 4] = [
        AggregateField::Deposited,
        AggregateField::Paid,
        AggregateField::GymDeposited,
        AggregateField::GymPaid,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            AggregateField::Deposited => "total_deposited",
            AggregateField::Paid => "total_paid",
            AggregateField::GymDeposited => "total_gym_deposited",
            AggregateField::GymPaid => "total_gym_paid",
        }
    }

    pub fn is_gym(self) -> bool {
        matches!(self, AggregateField::GymDeposited | AggregateField::GymPaid)
    }
}

impl fmt::Display for AggregateField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AggregateField {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized: String = s
            .chars()
            .filter(|c| *c != '_' && *c != '-')
            .flat_map(char::to_lowercase)
            .collect();
        match normalized.as_str() {
            "totaldeposited" | "deposited" => Ok(AggregateField::Deposited),
            "totalpaid" | "paid" => Ok(AggregateField::Paid),
            "totalgymdeposited" | "gymdeposited" => Ok(AggregateField::GymDeposited),
            "totalgympaid" | "gympaid" => Ok(AggregateField::GymPaid),
            _ => Err(ValidationError::UnknownField(s.to_string())),
        }
    }
}

/// Display row combining stored totals with derived balances.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberBalance {
    pub id: MemberId,
    pub name: String,
    pub total_deposited: Decimal,
    pub total_paid: Decimal,
    pub total_gym_deposited: Decimal,
    pub total_gym_paid: Decimal,
    pub current_balance: Decimal,
    pub current_gym_balance: Decimal,
}

impl From<&MemberAggregate> for MemberBalance {
    fn from(aggregate: &MemberAggregate) -> Self {
        Self {
            id: aggregate.id.clone(),
            name: aggregate.name.clone(),
            total_deposited: aggregate.total_deposited,
            total_paid: aggregate.total_paid,
            total_gym_deposited: aggregate.total_gym_deposited,
            total_gym_paid: aggregate.total_gym_paid,
            current_balance: aggregate.current_balance(),
            current_gym_balance: aggregate.current_gym_balance(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn balances_are_derived_from_totals() {
        let mut member = MemberAggregate::zeroed(MemberId::from("karthik"), "Karthik");
        member.set(AggregateField::Deposited, dec!(1000));
        member.set(AggregateField::Paid, dec!(1250.50));
        member.set(AggregateField::GymDeposited, dec!(200));
        member.set(AggregateField::GymPaid, dec!(100));
        assert_eq!(member.current_balance(), dec!(-250.50));
        assert_eq!(member.current_gym_balance(), dec!(100));

        let row = MemberBalance::from(&member);
        assert_eq!(row.current_balance, dec!(-250.50));
        assert_eq!(row.total_gym_paid, dec!(100));
    }

    #[test]
    fn parses_field_names_in_either_casing() {
        assert_eq!(
            "totalGymPaid".parse::<AggregateField>().unwrap(),
            AggregateField::GymPaid
        );
        assert_eq!(
            "total_deposited".parse::<AggregateField>().unwrap(),
            AggregateField::Deposited
        );
        assert_eq!(
            "gym-deposited".parse::<AggregateField>().unwrap(),
            AggregateField::GymDeposited
        );
        assert!("balance".parse::<AggregateField>().is_err());
    }
}
