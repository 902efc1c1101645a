use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{ContributionId, MemberId, Roster, ValidationError};

/// Tag marking a contribution as credited to the gym pool.
pub const GYM_TAG: &str = "GYM";

/// Append-only record of a manual top-up.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contribution {
    pub id: ContributionId,
    pub member: MemberId,
    pub amount: Decimal,
    pub date: DateTime<Utc>,
    pub description: String,
    pub tags: Vec<String>,
}

impl Contribution {
    pub fn is_gym(&self) -> bool {
        has_gym_tag(&self.tags)
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t.eq_ignore_ascii_case(tag))
    }
}

/// Caller supplied fields for a new contribution.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContributionDraft {
    pub member: MemberId,
    pub amount: Decimal,
    pub description: String,
    pub tags: Vec<String>,
}

impl ContributionDraft {
    pub fn new(
        member: impl Into<MemberId>,
        amount: Decimal,
        description: impl Into<String>,
        tags: impl IntoIterator<Item = String>,
    ) -> Self {
        Self {
            member: member.into(),
            amount,
            description: description.into(),
            tags: tags.into_iter().collect(),
        }
    }

    /// General household top-up, tagged `manual`/`top-up`.
    pub fn manual(member: impl Into<MemberId>, amount: Decimal, roster: &Roster) -> Self {
        let member = member.into();
        let description = format!("Manual contribution by {}", roster.display_name(&member));
        Self::new(
            member,
            amount,
            description,
            ["manual".to_string(), "top-up".to_string()],
        )
    }

    /// Gym pool top-up, tagged `GYM`/`contribution`.
    pub fn gym(member: impl Into<MemberId>, amount: Decimal, roster: &Roster) -> Self {
        let member = member.into();
        let description = format!("GYM contribution by {}", roster.display_name(&member));
        Self::new(
            member,
            amount,
            description,
            [GYM_TAG.to_string(), "contribution".to_string()],
        )
    }

    pub fn is_gym(&self) -> bool {
        has_gym_tag(&self.tags)
    }

    pub fn validate(&self, roster: &Roster) -> Result<(), ValidationError> {
        if self.amount <= Decimal::ZERO {
            return Err(ValidationError::NonPositiveAmount(self.amount));
        }
        if !roster.contains(&self.member) {
            return Err(ValidationError::UnknownMember(self.member.clone()));
        }
        if self.is_gym() && !roster.is_gym_eligible(&self.member) {
            return Err(ValidationError::NotGymEligible(self.member.clone()));
        }
        Ok(())
    }

    /// Validate and stamp the entry with an id and timestamp.
    pub fn into_contribution(
        self,
        id: ContributionId,
        date: DateTime<Utc>,
        roster: &Roster,
    ) -> Result<Contribution, ValidationError> {
        self.validate(roster)?;
        Ok(Contribution {
            id,
            member: self.member,
            amount: self.amount,
            date,
            description: self.description,
            tags: self.tags,
        })
    }
}

fn has_gym_tag(tags: &[String]) -> bool {
    tags.iter().any(|tag| tag.eq_ignore_ascii_case(GYM_TAG))
}
