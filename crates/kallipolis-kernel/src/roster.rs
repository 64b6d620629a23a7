//! Role roster: the fixed set of participants for one crisis cycle.

use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::RosterError;

/// Role a participant plays in the society.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Poses crises and judges directives
    God,
    /// Consults citizens, issues directives, allocates salaries
    Ruler,
    /// Protective class (e.g. Warrior)
    Guardian,
    /// Working class with a specialization (e.g. Farmer, Healer)
    Producer,
}

impl Role {
    /// Whether the Ruler may address this role with a routing directive.
    pub fn is_citizen(&self) -> bool {
        matches!(self, Self::Guardian | Self::Producer)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::God => write!(f, "God"),
            Self::Ruler => write!(f, "Ruler"),
            Self::Guardian => write!(f, "Guardian"),
            Self::Producer => write!(f, "Producer"),
        }
    }
}

/// One named participant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Participant {
    pub name: String,
    pub role: Role,
    /// Area of responsibility; producers and guardians carry one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub specialization: Option<String>,
}

impl Participant {
    pub fn new(name: impl Into<String>, role: Role) -> Self {
        Self {
            name: name.into(),
            role,
            specialization: None,
        }
    }

    pub fn with_specialization(mut self, specialization: impl Into<String>) -> Self {
        self.specialization = Some(specialization.into());
        self
    }
}

/// The participants of one cycle: 1 God, 1 Ruler, N guardians, M producers.
///
/// Composition is fixed once built. Citizens keep the order they were
/// given in, which is also the order they are listed to the Ruler.
#[derive(Debug, Clone)]
pub struct Roster {
    god: Participant,
    ruler: Participant,
    citizens: Vec<Participant>,
}

impl Roster {
    /// Build and validate a roster.
    ///
    /// Names must be unique ignoring case and usable after `@` in a
    /// routing directive (letters, digits, `_` or `-`, starting with a letter
    /// and ending with a letter or digit).
    pub fn new(
        god_name: impl Into<String>,
        ruler_name: impl Into<String>,
        citizens: Vec<Participant>,
    ) -> Result<Self, RosterError> {
        let god = Participant::new(god_name, Role::God);
        let ruler = Participant::new(ruler_name, Role::Ruler);

        if citizens.is_empty() {
            return Err(RosterError::NoCitizens);
        }

        let mut seen = HashSet::new();
        for p in std::iter::once(&god)
            .chain(std::iter::once(&ruler))
            .chain(citizens.iter())
        {
            if !is_routable_name(&p.name) {
                return Err(RosterError::InvalidName(p.name.clone()));
            }
            if !seen.insert(p.name.to_lowercase()) {
                return Err(RosterError::DuplicateName(p.name.clone()));
            }
        }

        // Citizens listed with a non-citizen role are normalised to producers
        let citizens = citizens
            .into_iter()
            .map(|mut p| {
                if !p.role.is_citizen() {
                    p.role = Role::Producer;
                }
                p
            })
            .collect();

        Ok(Self {
            god,
            ruler,
            citizens,
        })
    }

    pub fn god(&self) -> &Participant {
        &self.god
    }

    pub fn ruler(&self) -> &Participant {
        &self.ruler
    }

    /// Guardians and producers, in roster order.
    pub fn citizens(&self) -> &[Participant] {
        &self.citizens
    }

    pub fn guardians(&self) -> impl Iterator<Item = &Participant> {
        self.citizens.iter().filter(|p| p.role == Role::Guardian)
    }

    pub fn producers(&self) -> impl Iterator<Item = &Participant> {
        self.citizens.iter().filter(|p| p.role == Role::Producer)
    }

    /// Everyone, God first.
    pub fn all(&self) -> impl Iterator<Item = &Participant> {
        std::iter::once(&self.god)
            .chain(std::iter::once(&self.ruler))
            .chain(self.citizens.iter())
    }

    /// Exact roster identity lookup (case-sensitive).
    pub fn contains(&self, name: &str) -> bool {
        self.all().any(|p| p.name == name)
    }

    /// Resolve a routing target against the consultable citizens.
    ///
    /// Case-insensitive exact match; no prefix or fuzzy matching.
    pub fn resolve_citizen(&self, target: &str) -> Option<&Participant> {
        self.citizens
            .iter()
            .find(|p| p.name.eq_ignore_ascii_case(target))
    }

    /// Resolve a salary recipient: the Ruler or any citizen, ignoring case.
    pub fn resolve_salaried(&self, name: &str) -> Option<&Participant> {
        if self.ruler.name.eq_ignore_ascii_case(name) {
            return Some(&self.ruler);
        }
        self.resolve_citizen(name)
    }
}

fn is_routable_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
        && name.ends_with(|c: char| c.is_ascii_alphanumeric())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_roster() -> Roster {
        Roster::new(
            "God",
            "Philosopher_Ruler",
            vec![
                Participant::new("Warrior", Role::Guardian).with_specialization("protection"),
                Participant::new("Farmer", Role::Producer).with_specialization("agriculture"),
                Participant::new("Healer", Role::Producer).with_specialization("health"),
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_roster_partitions_citizens() {
        let roster = sample_roster();
        assert_eq!(roster.citizens().len(), 3);
        assert_eq!(roster.guardians().count(), 1);
        assert_eq!(roster.producers().count(), 2);
        assert_eq!(roster.all().count(), 5);
        assert_eq!(roster.all().next().unwrap().name, "God");
    }

    #[test]
    fn test_resolve_citizen_is_case_insensitive_exact() {
        let roster = sample_roster();
        assert_eq!(roster.resolve_citizen("healer").unwrap().name, "Healer");
        assert_eq!(roster.resolve_citizen("FARMER").unwrap().name, "Farmer");
        assert!(roster.resolve_citizen("Heal").is_none());
        assert!(roster.resolve_citizen("Healers").is_none());
    }

    #[test]
    fn test_god_and_ruler_are_not_consultable() {
        let roster = sample_roster();
        assert!(roster.resolve_citizen("God").is_none());
        assert!(roster.resolve_citizen("Philosopher_Ruler").is_none());
        assert!(roster.resolve_salaried("philosopher_ruler").is_some());
        assert!(roster.resolve_salaried("God").is_none());
    }

    #[test]
    fn test_roster_rejects_empty_citizenry() {
        assert_eq!(
            Roster::new("God", "Ruler", vec![]).unwrap_err(),
            RosterError::NoCitizens
        );
    }

    #[test]
    fn test_roster_rejects_duplicate_names() {
        let err = Roster::new(
            "God",
            "Ruler",
            vec![
                Participant::new("Farmer", Role::Producer),
                Participant::new("farmer", Role::Producer),
            ],
        )
        .unwrap_err();
        assert_eq!(err, RosterError::DuplicateName("farmer".to_string()));
    }

    #[test]
    fn test_roster_rejects_unroutable_names() {
        let err = Roster::new("God", "Ruler", vec![Participant::new("Town Crier", Role::Producer)])
            .unwrap_err();
        assert!(matches!(err, RosterError::InvalidName(_)));

        let err = Roster::new("God", "Ruler", vec![Participant::new("Farmer_", Role::Producer)])
            .unwrap_err();
        assert_eq!(err, RosterError::InvalidName("Farmer_".to_string()));
    }

    #[test]
    fn test_non_citizen_roles_are_normalised() {
        let roster = Roster::new("God", "Ruler", vec![Participant::new("Scribe", Role::Ruler)])
            .unwrap();
        assert_eq!(roster.citizens()[0].role, Role::Producer);
    }
}
