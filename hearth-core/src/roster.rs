use serde::{Deserialize, Serialize};

use crate::{MemberId, ValidationError};

/// A single household member known to the ledger.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RosterMember {
    pub id: MemberId,
    pub name: String,
    #[serde(default)]
    pub gym_eligible: bool,
}

impl RosterMember {
    pub fn new(id: impl Into<MemberId>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            gym_eligible: false,
        }
    }

    pub fn with_gym(mut self) -> Self {
        self.gym_eligible = true;
        self
    }
}

/// Closed, ordered set of members participating in the household ledger.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Roster {
    members: Vec<RosterMember>,
}

impl Roster {
    /// Build a roster, rejecting empty rosters and duplicated ids.
    pub fn new(members: Vec<RosterMember>) -> Result<Self, ValidationError> {
        if members.is_empty() {
            return Err(ValidationError::EmptyRoster);
        }
        for (idx, member) in members.iter().enumerate() {
            if member.id.as_str().trim().is_empty() {
                return Err(ValidationError::EmptyRosterId(idx));
            }
            if members[..idx].iter().any(|other| other.id == member.id) {
                return Err(ValidationError::DuplicateRosterMember(member.id.clone()));
            }
        }
        Ok(Self { members })
    }

    /// The five-person household the ledger was first built for.
    pub fn household_default() -> Self {
        Self {
            members: vec![
                RosterMember::new("anudeep", "Anudeep"),
                RosterMember::new("karthik", "Karthik").with_gym(),
                RosterMember::new("mahesh", "Mahesh"),
                RosterMember::new("rohith", "Rohith"),
                RosterMember::new("shiva", "Shiva").with_gym(),
            ],
        }
    }

    pub fn members(&self) -> &[RosterMember] {
        &self.members
    }

    pub fn gym_members(&self) -> impl Iterator<Item = &RosterMember> {
        self.members.iter().filter(|member| member.gym_eligible)
    }

    pub fn get(&self, id: &MemberId) -> Option<&RosterMember> {
        self.members.iter().find(|member| &member.id == id)
    }

    pub fn contains(&self, id: &MemberId) -> bool {
        self.get(id).is_some()
    }

    pub fn is_gym_eligible(&self, id: &MemberId) -> bool {
        self.get(id).is_some_and(|member| member.gym_eligible)
    }

    /// Display name for a member, falling back to the raw id.
    pub fn display_name(&self, id: &MemberId) -> String {
        self.get(id)
            .map(|member| member.name.clone())
            .unwrap_or_else(|| id.to_string())
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}
