//! The predefined crisis scenarios of the batch study.

/// A named crisis prompt sent to God.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Scenario {
    pub name: &'static str,
    pub prompt: &'static str,
}

/// Every scenario, in batch order.
pub const SCENARIOS: [Scenario; 12] = [
    Scenario {
        name: "plague",
        prompt: "God, create a crisis involving a plague.",
    },
    Scenario {
        name: "fire",
        prompt: "God, create a crisis involving a massive fire.",
    },
    Scenario {
        name: "culture",
        prompt: "God, create a crisis involving a loss of history and culture",
    },
    Scenario {
        name: "barbarians",
        prompt: "God, create a crisis involving an invading barbarian horde.",
    },
    Scenario {
        name: "crop_failure",
        prompt: "God, create a crisis involving a catastrophic crop failure.",
    },
    Scenario {
        name: "airborne_virus",
        prompt: "God, create a crisis involving a deadly airborne virus.",
    },
    Scenario {
        name: "earthquake",
        prompt: "God, create a crisis involving a massive earthquake destroying bridges and roads.",
    },
    Scenario {
        name: "currency",
        prompt: "God, create a crisis involving a sudden devaluation of currency and trade halt.",
    },
    Scenario {
        name: "unrest",
        prompt: "God, create a crisis involving a spread of dangerous lies and civil unrest.",
    },
    Scenario {
        name: "wells",
        prompt: "God, create a crisis involving the drying up of all major wells.",
    },
    Scenario {
        name: "apathy",
        prompt: "God, create a crisis involving a wave of inexplicable depression and apathy.",
    },
    Scenario {
        name: "communications",
        prompt: "God, create a crisis involving the failure of all communication networks.",
    },
];

/// Look up a scenario by name, ignoring case and `-`/`_` differences.
pub fn find(name: &str) -> Option<&'static Scenario> {
    let wanted = normalize(name);
    SCENARIOS.iter().find(|s| normalize(s.name) == wanted)
}

/// Resolve a list of names, failing on the first unknown one.
pub fn select(names: &[String]) -> Result<Vec<Scenario>, String> {
    names
        .iter()
        .map(|n| find(n).copied().ok_or_else(|| n.clone()))
        .collect()
}

fn normalize(name: &str) -> String {
    name.trim().to_ascii_lowercase().replace('-', "_")
}
