//! Parsing adapters between free-text model output and the cycle's typed moves.
//!
//! All string scanning lives here so the state machine only ever sees
//! [`RulerMove`], [`Judgment`] and [`Allocation`].

use std::collections::BTreeMap;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{AllocationParseError, CycleError};
use crate::roster::Roster;

/// Marker the Ruler is asked to put before salary lines.
pub const SALARY_MARKER: &str = "SET_SALARY";

fn routing_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)speak\s+@([A-Za-z](?:[A-Za-z0-9_\-]*[A-Za-z0-9])?)").expect("valid regex"))
}

fn directive_object_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"\{[^{}]*"directive"[^{}]*\}"#).expect("valid regex"))
}

fn directive_field_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#""directive"\s*:\s*"((?:[^"\\]|\\.)*)""#).expect("valid regex")
    })
}

fn solved_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"(?i)"?solved"?\s*:\s*(true|false)"#).expect("valid regex"))
}

fn approve_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)\b(approve|approved|accept|accepted)\b").expect("valid regex"))
}

fn reject_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?i)\b(reject|rejected|deny|denied|decline|declined|unsolved)\b|\bnot\s+(solved|approved|accepted)\b",
        )
        .expect("valid regex")
    })
}

fn negation_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)\b(not|never|no|cannot|refuse|refuses|unable)\b|n['’]t\b")
            .expect("valid regex")
    })
}

fn reason_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#""(?:reason|judgement|judgment)"\s*:\s*"((?:[^"\\]|\\.)*)""#)
            .expect("valid regex")
    })
}

fn salary_pair_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#""?([A-Za-z][A-Za-z0-9_\-]*)"?\s*[=:]\s*(-?\d+)"#).expect("valid regex")
    })
}

/// What the Ruler intends with one consultation-phase message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RulerMove {
    /// Ask this citizen (canonical roster name) for advice
    Consult(String),
    /// Final directive text, ends consultation
    Directive(String),
}

/// Interpret a Ruler message during consultation.
///
/// A `{"directive": ...}` fragment wins over a routing directive in the same
/// message. A routing directive (`speak @Name`) must name a citizen in the
/// roster, otherwise the cycle fails with a routing error. A message with
/// neither is taken as the directive itself.
pub fn parse_ruler_move(text: &str, roster: &Roster) -> Result<RulerMove, CycleError> {
    if let Some(directive) = extract_json_directive(text) {
        return Ok(RulerMove::Directive(directive));
    }

    if let Some(caps) = routing_re().captures(text) {
        let target = &caps[1];
        return match roster.resolve_citizen(target) {
            Some(citizen) => Ok(RulerMove::Consult(citizen.name.clone())),
            None => Err(CycleError::Routing {
                target: target.to_string(),
            }),
        };
    }

    Ok(RulerMove::Directive(text.trim().to_string()))
}

/// Interpret a Ruler message that was explicitly asked for the final directive.
///
/// Routing directives are not honoured here.
pub fn parse_final_directive(text: &str) -> String {
    extract_json_directive(text).unwrap_or_else(|| text.trim().to_string())
}

fn extract_json_directive(text: &str) -> Option<String> {
    if let Some(m) = directive_object_re().find(text) {
        if let Ok(serde_json::Value::Object(obj)) = serde_json::from_str(m.as_str()) {
            if let Some(serde_json::Value::String(d)) = obj.get("directive") {
                let d = d.trim();
                if !d.is_empty() {
                    return Some(d.to_string());
                }
            }
        }
    }

    // Fall back to the bare field when the surrounding object is malformed
    directive_field_re()
        .captures(text)
        .map(|c| unescape(&c[1]))
        .filter(|d| !d.trim().is_empty())
        .map(|d| d.trim().to_string())
}

fn unescape(raw: &str) -> String {
    serde_json::from_str::<String>(&format!("\"{}\"", raw)).unwrap_or_else(|_| raw.to_string())
}

/// Outcome of reading a verdict for explicit approval or rejection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    Approved,
    Rejected,
    /// Both or neither signal found
    Ambiguous,
}

/// God's judgment of a directive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Judgment {
    pub verdict: Verdict,
    /// Reason given by God when one could be extracted
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl Judgment {
    /// Only an explicit approval counts. Ambiguous verdicts are rejections.
    pub fn approved(&self) -> bool {
        self.verdict == Verdict::Approved
    }
}

/// Read a verdict from God's text.
///
/// `"solved": true|false` fragments are consulted first, then approval and
/// rejection keywords. An approval keyword in text that also carries a
/// negation ("do not approve", "cannot accept") reads as a rejection. Fail-closed: anything other than a clean approval is
/// either `Rejected` or `Ambiguous`, and [`Judgment::approved`] is false for both.
pub fn parse_judgment(text: &str) -> Judgment {
    let reason = reason_re()
        .captures(text)
        .map(|c| unescape(&c[1]).trim().to_string())
        .filter(|r| !r.is_empty());

    let mut saw_true = false;
    let mut saw_false = false;
    for caps in solved_re().captures_iter(text) {
        if caps[1].eq_ignore_ascii_case("true") {
            saw_true = true;
        } else {
            saw_false = true;
        }
    }

    // Keyword approval only counts when nothing in the text negates it
    if !saw_true && !saw_false {
        let approves = approve_re().is_match(text);
        let negated = negation_re().is_match(text);
        saw_true = approves && !negated;
        saw_false = reject_re().is_match(text) || (approves && negated);
    }

    let verdict = match (saw_true, saw_false) {
        (true, false) => Verdict::Approved,
        (false, true) => Verdict::Rejected,
        _ => Verdict::Ambiguous,
    };

    Judgment { verdict, reason }
}

/// Salary allocation across the Ruler and the citizens.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Allocation {
    /// Canonical roster name to amount
    pub shares: BTreeMap<String, u32>,
    /// Budget the Ruler was given
    pub budget: u32,
}

impl Allocation {
    pub fn total(&self) -> u64 {
        self.shares.values().map(|v| u64::from(*v)).sum()
    }

    /// Amount above budget, if any.
    ///
    /// Allocations are recorded as given; this is reported, not enforced.
    pub fn overage(&self) -> Option<u64> {
        let total = self.total();
        let budget = u64::from(self.budget);
        (total > budget).then(|| total - budget)
    }

    pub fn is_within_budget(&self) -> bool {
        self.overage().is_none()
    }
}

/// Parse the Ruler's allocation response into per-recipient amounts.
///
/// When the `SET_SALARY` marker is present only the text after it is read.
/// Pairs look like `Name=100` or `"Name": 100`; names are matched to the
/// roster ignoring case, later duplicates win, and unknown names are
/// skipped. Every citizen must receive an amount; the Ruler may.
pub fn parse_allocation(
    text: &str,
    roster: &Roster,
    budget: u32,
) -> Result<Allocation, AllocationParseError> {
    let body = match text.find(SALARY_MARKER) {
        Some(idx) => &text[idx + SALARY_MARKER.len()..],
        None => text,
    };

    let mut shares = BTreeMap::new();
    let mut pairs = 0usize;

    for caps in salary_pair_re().captures_iter(body) {
        pairs += 1;
        let name = &caps[1];
        let raw = &caps[2];

        let Some(recipient) = roster.resolve_salaried(name) else {
            debug!(name = name, "Ignoring allocation entry for unknown recipient");
            continue;
        };
        let canonical = recipient.name.clone();

        let value: i64 = raw.parse().map_err(|_| AllocationParseError::InvalidAmount {
            citizen: canonical.clone(),
            raw: raw.to_string(),
        })?;
        if value < 0 {
            return Err(AllocationParseError::Negative {
                citizen: canonical,
                value,
            });
        }
        let value = u32::try_from(value).map_err(|_| AllocationParseError::InvalidAmount {
            citizen: canonical.clone(),
            raw: raw.to_string(),
        })?;

        shares.insert(canonical, value);
    }

    if pairs == 0 {
        return Err(AllocationParseError::NoEntries);
    }

    let missing: Vec<String> = roster
        .citizens()
        .iter()
        .filter(|c| !shares.contains_key(&c.name))
        .map(|c| c.name.clone())
        .collect();
    if !missing.is_empty() {
        return Err(AllocationParseError::MissingCitizens(missing));
    }

    Ok(Allocation { shares, budget })
}

/// Format the salary lines the Ruler is asked to fill in.
pub fn salary_template(roster: &Roster) -> String {
    roster
        .citizens()
        .iter()
        .map(|c| format!("{}=...", c.name))
        .collect::<Vec<_>>()
        .join("\n")
}
