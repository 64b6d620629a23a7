//! Versioned prompt and roster configuration.
//!
//! The study compares transcripts produced under different prompt
//! configurations, so every framing an agent receives comes from a
//! [`SocietyConfig`] value that is passed in explicitly, can be written out
//! as JSON, and carries a `version` string that ends up in batch results.
//!
//! Templates use `{placeholder}` substitution:
//! - `{name}`, `{domain}`: citizen system framing
//! - `{citizens}`, `{citizen_count}`, `{budget}`, `{salary_lines}`: Ruler framing and allocation cue
//! - `{scenario}`: crisis request
//! - `{directive}`: judgment cue

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::RosterError;
use crate::roster::{Participant, Role, Roster};

/// A citizen entry in the society configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CitizenSpec {
    pub name: String,
    /// `guardian` or `producer`
    pub class: Role,
    /// Area of responsibility used in the citizen's framing
    pub domain: String,
}

impl CitizenSpec {
    fn new(name: &str, class: Role, domain: &str) -> Self {
        Self {
            name: name.to_string(),
            class,
            domain: domain.to_string(),
        }
    }
}

/// Prompt templates for each role and phase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptTemplates {
    pub god_system: String,
    pub ruler_system: String,
    pub citizen_system: String,
    /// Sent to God to obtain the crisis
    pub crisis_request: String,
    /// Sent to the Ruler before every consultation-phase turn
    pub consult_cue: String,
    /// Sent to the addressed citizen
    pub citizen_cue: String,
    /// Sent to the Ruler when the consultation limit is reached
    pub directive_cue: String,
    /// Sent to God with the directive to judge
    pub judgment_cue: String,
    /// Sent to the Ruler after approval
    pub allocation_cue: String,
}

/// Everything that defines one prompt configuration of the society.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SocietyConfig {
    pub version: String,
    pub god_name: String,
    pub ruler_name: String,
    pub citizens: Vec<CitizenSpec>,
    pub prompts: PromptTemplates,
}

impl SocietyConfig {
    /// Names of the built-in configurations.
    pub const BUILTIN_VERSIONS: [&'static str; 2] = ["v1", "v2"];

    /// Look up a built-in configuration by version name.
    pub fn builtin(version: &str) -> Option<Self> {
        match version {
            "v1" => Some(Self::v1()),
            "v2" => Some(Self::v2()),
            _ => None,
        }
    }

    /// Load a configuration from a JSON file.
    pub fn load(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let json = std::fs::read_to_string(path)?;
        serde_json::from_str(&json).map_err(Into::into)
    }

    /// Save the configuration as pretty JSON.
    pub fn save(&self, path: impl AsRef<Path>) -> std::io::Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)
    }

    /// Build a fresh roster from this configuration.
    pub fn roster(&self) -> Result<Roster, RosterError> {
        let citizens = self
            .citizens
            .iter()
            .map(|c| Participant::new(c.name.clone(), c.class).with_specialization(c.domain.clone()))
            .collect();
        Roster::new(self.god_name.clone(), self.ruler_name.clone(), citizens)
    }

    pub fn god_system(&self) -> String {
        self.prompts.god_system.clone()
    }

    pub fn ruler_system(&self, roster: &Roster, budget: u32) -> String {
        let citizens = roster
            .citizens()
            .iter()
            .map(|c| format!("@{}", c.name))
            .collect::<Vec<_>>()
            .join(", ");
        self.prompts
            .ruler_system
            .replace("{citizens}", &citizens)
            .replace("{citizen_count}", &roster.citizens().len().to_string())
            .replace("{budget}", &budget.to_string())
            .replace("{salary_lines}", &crate::protocol::salary_template(roster))
    }

    pub fn citizen_system(&self, citizen: &Participant) -> String {
        self.prompts
            .citizen_system
            .replace("{name}", &citizen.name)
            .replace("{domain}", citizen.specialization.as_deref().unwrap_or("the city"))
    }

    pub fn crisis_request(&self, scenario: &str) -> String {
        self.prompts.crisis_request.replace("{scenario}", scenario)
    }

    pub fn citizen_cue(&self, citizen: &Participant) -> String {
        self.prompts.citizen_cue.replace("{name}", &citizen.name)
    }

    pub fn judgment_cue(&self, directive: &str) -> String {
        self.prompts.judgment_cue.replace("{directive}", directive)
    }

    pub fn allocation_cue(&self, roster: &Roster, budget: u32) -> String {
        self.prompts
            .allocation_cue
            .replace("{budget}", &budget.to_string())
            .replace("{salary_lines}", &crate::protocol::salary_template(roster))
    }

    /// Detailed domain descriptions; tool-style consultation framing.
    pub fn v1() -> Self {
        Self {
            version: "v1".to_string(),
            citizens: vec![
                CitizenSpec::new("Farmer", Role::Producer, "agriculture, crops, soil and irrigation"),
                CitizenSpec::new("Builder", Role::Producer, "infrastructure, water systems, storage, roads"),
                CitizenSpec::new("Warrior", Role::Guardian, "defense, law & order, thieves and security"),
                CitizenSpec::new("Merchant", Role::Producer, "supply chains, storage logistics, trade"),
                CitizenSpec::new("Artist", Role::Producer, "social morale, festivals, community cohesion"),
                CitizenSpec::new("Healer", Role::Producer, "public health and immediate medical response"),
                CitizenSpec::new("Teacher", Role::Producer, "education, training, public outreach"),
            ],
            prompts: PromptTemplates {
                citizen_system: "You are {name}, responsible for {domain}. \
                    Answer the Ruler's question with concrete, practical counsel from your field. \
                    Keep it under 50 words. Do not discuss money, costs or budgets. \
                    Do not speak for anyone else."
                    .to_string(),
                ..Self::v2().prompts
            },
            ..Self::v2()
        }
    }

    /// Short domains with the civic-pride persona framing.
    pub fn v2() -> Self {
        Self {
            version: "v2".to_string(),
            god_name: "God".to_string(),
            ruler_name: "Philosopher_Ruler".to_string(),
            citizens: vec![
                CitizenSpec::new("Farmer", Role::Producer, "agriculture"),
                CitizenSpec::new("Builder", Role::Producer, "infrastructure"),
                CitizenSpec::new("Warrior", Role::Guardian, "protection"),
                CitizenSpec::new("Merchant", Role::Producer, "trade"),
                CitizenSpec::new("Artist", Role::Producer, "culture"),
                CitizenSpec::new("Healer", Role::Producer, "health"),
                CitizenSpec::new("Teacher", Role::Producer, "education"),
            ],
            prompts: PromptTemplates {
                god_system: "You are God: impartial, concise and omniscient.\n\
                    1. When asked for a crisis, present it as {\"crisis\": \"...\"}.\n\
                    2. Stay silent while the city deliberates.\n\
                    3. When the Ruler issues a directive, judge it and end your reply with exactly one of:\n\
                    {\"judgement\": \"<reasoning>\", \"solved\": true}\n\
                    {\"judgement\": \"<reasoning>\", \"solved\": false}\n\
                    Mark it true if the plan reasonably addresses the main threat. \
                    Do not demand that every citizen was consulted and do not demand perfection."
                    .to_string(),
                ruler_system: "You are the Philosopher-Ruler. Speak in the first person.\n\
                    Be thoughtful, humane and just, but decisive; every decision must serve the common good.\n\n\
                    Your citizens: {citizens}.\n\
                    Your treasury is fixed at {budget} gold.\n\n\
                    Protocol:\n\
                    1. Consult citizens one at a time for strategic advice. End such a turn with 'speak @Name'. \
                    Do not talk about money.\n\
                    2. When you have a plan, issue {\"directive\": \"...\"} and stop. Do not set salaries yet.\n\
                    3. Only after God approves, output salaries in this format:\n\
                    SET_SALARY\n{salary_lines}\n\
                    Assign a value to all {citizen_count} citizens. The sum must not exceed {budget}.\n\n\
                    Never write a citizen's or God's reply yourself."
                    .to_string(),
                citizen_system: "You are {name}, responsible for {domain}. \
                    You uphold your craft with excellence and self-discipline, contributing to the harmony of the whole city. \
                    Your focus is on your work. Write as a capable and civic-minded citizen who takes pride in their duty.\n\n\
                    Constraints:\n\
                    1. Speak only when spoken to by the Ruler.\n\
                    2. Keep your counsel under 50 words.\n\
                    3. Do not mention gold, costs, prices or budgets; focus on strategy.\n\
                    4. Do not act as a narrator."
                    .to_string(),
                crisis_request: "Simulation Start. {scenario}".to_string(),
                consult_cue: "Ruler, either consult one citizen (end with 'speak @Name') \
                    or issue your directive as {\"directive\": \"...\"}."
                    .to_string(),
                citizen_cue: "{name}, the Ruler asks for your counsel.".to_string(),
                directive_cue: "You have consulted enough. Issue your final directive now as \
                    {\"directive\": \"...\"} and nothing else."
                    .to_string(),
                judgment_cue: "God, judge this directive:\n{directive}".to_string(),
                allocation_cue: "God has approved your directive. Allocate the {budget} gold now:\n\
                    SET_SALARY\n{salary_lines}"
                    .to_string(),
            },
        }
    }
}

impl Default for SocietyConfig {
    fn default() -> Self {
        Self::v2()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtins_build_valid_rosters() {
        for version in SocietyConfig::BUILTIN_VERSIONS {
            let society = SocietyConfig::builtin(version).unwrap();
            assert_eq!(society.version, version);
            let roster = society.roster().unwrap();
            assert_eq!(roster.citizens().len(), 7);
            assert_eq!(roster.guardians().count(), 1);
        }
        assert!(SocietyConfig::builtin("v9").is_none());
    }

    #[test]
    fn test_versions_differ_in_citizen_framing() {
        let v1 = SocietyConfig::v1();
        let v2 = SocietyConfig::v2();
        assert_ne!(v1.prompts.citizen_system, v2.prompts.citizen_system);
        assert_eq!(v1.prompts.god_system, v2.prompts.god_system);
        assert_ne!(v1.citizens[0].domain, v2.citizens[0].domain);
    }

    #[test]
    fn test_ruler_system_substitutes_placeholders() {
        let society = SocietyConfig::v2();
        let roster = society.roster().unwrap();
        let text = society.ruler_system(&roster, 700);
        assert!(text.contains("@Farmer, @Builder"));
        assert!(text.contains("700 gold"));
        assert!(text.contains("Teacher=..."));
        assert!(text.contains("all 7 citizens"));
        for placeholder in ["{citizens}", "{budget}", "{salary_lines}", "{citizen_count}"] {
            assert!(!text.contains(placeholder), "unreplaced {}", placeholder);
        }
    }

    #[test]
    fn test_citizen_system_uses_domain() {
        let society = SocietyConfig::v1();
        let roster = society.roster().unwrap();
        let healer = roster.resolve_citizen("Healer").unwrap();
        let text = society.citizen_system(healer);
        assert!(text.starts_with("You are Healer, responsible for public health"));
    }

    #[test]
    fn test_save_and_load_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("society.json");
        let society = SocietyConfig::v1();
        society.save(&path).unwrap();
        assert_eq!(SocietyConfig::load(&path).unwrap(), society);
    }

    #[test]
    fn test_crisis_request() {
        let society = SocietyConfig::default();
        assert_eq!(
            society.crisis_request("God, create a crisis involving a plague."),
            "Simulation Start. God, create a crisis involving a plague."
        );
    }
}
