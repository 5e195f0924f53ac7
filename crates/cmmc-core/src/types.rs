use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Number, Value as JsonValue};
use std::fmt;

/// Internal identifier of a practice.
///
/// Objectives reference practices through this id, never through the
/// human-readable practice code.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PracticeId(String);

impl PracticeId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PracticeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Organization identifier from the assessments table.
///
/// Source files carry either JSON strings or numbers; both are normalised to
/// their textual form.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct OrgId(String);

impl OrgId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OrgId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for OrgId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum RawOrgId {
            Text(String),
            Number(Number),
        }

        Ok(match RawOrgId::deserialize(deserializer)? {
            RawOrgId::Text(text) => OrgId(text),
            RawOrgId::Number(number) => OrgId(number.to_string()),
        })
    }
}

/// A CMMC practice, e.g. `AC.L2-3.1.1 - Authorized Access Control`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Practice {
    /// Opaque unique identifier
    pub id: PracticeId,
    /// Human-readable practice code, display only
    pub practice_id: String,
    pub title: String,
}

impl Practice {
    /// Selector label in the `"<code> - <title>"` form
    pub fn label(&self) -> String {
        format!("{} - {}", self.practice_id, self.title)
    }
}

/// An assessable objective belonging to one practice
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Objective {
    pub objective_code: String,
    pub objective_text: String,
    /// Foreign key to [`Practice::id`]
    pub practice_id: PracticeId,
}

impl Objective {
    pub fn label(&self) -> String {
        format!("{} - {}", self.objective_code, self.objective_text)
    }
}

/// Assessment record; only `org_id` is read, the remaining columns are kept as-is
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Assessment {
    pub org_id: OrgId,
    #[serde(flatten)]
    pub extra: Map<String, JsonValue>,
}
