use std::{collections::BTreeMap, fmt};

use serde::{Deserialize, Serialize};
use serde_json::Number;

use crate::error::RequestError;

/// Raw form values captured at submit time, before any validation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FormInput {
    pub name: Option<String>,
    pub diet_tags: Vec<String>,
    pub goal: String,
}

impl FormInput {
    pub fn new<I, S>(diet_tags: I, goal: impl Into<String>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: None,
            diet_tags: diet_tags.into_iter().map(Into::into).collect(),
            goal: goal.into(),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }
}

/// Identifier of a candidate plan. The service hands out either numbers or
/// strings, and the same value must be echoed back on confirmation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PlanId {
    Number(Number),
    Text(String),
}

impl fmt::Display for PlanId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlanId::Number(n) => write!(f, "{n}"),
            PlanId::Text(s) => f.write_str(s),
        }
    }
}

impl From<i64> for PlanId {
    fn from(value: i64) -> Self {
        PlanId::Number(value.into())
    }
}

impl From<&str> for PlanId {
    fn from(value: &str) -> Self {
        PlanId::Text(value.to_string())
    }
}

impl PlanId {
    /// Parses user-typed ids; anything that reads as a JSON number becomes a
    /// number so it compares equal to ids the service sent as numbers.
    pub fn parse(raw: &str) -> Self {
        let raw = raw.trim();
        match raw.parse::<Number>() {
            Ok(n) => PlanId::Number(n),
            Err(_) => PlanId::Text(raw.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Meals {
    pub breakfast: String,
    pub lunch: String,
    pub dinner: String,
}

/// Daily macro totals in grams. `None` means the service did not report a
/// usable value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MacroBreakdown {
    pub protein: Option<f64>,
    pub carbs: Option<f64>,
    pub fats: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MealMacros {
    pub calories: Option<f64>,
    pub protein: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Macros {
    pub daily: MacroBreakdown,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub per_meal: BTreeMap<String, MealMacros>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MealPlan {
    pub meals: Meals,
    pub macros: Macros,
    pub calories: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanCandidate {
    pub id: PlanId,
    pub name: String,
    pub confidence: Option<f64>,
    pub plan: MealPlan,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum PlanResult {
    Single(MealPlan),
    Choices(Vec<PlanCandidate>),
}

impl PlanResult {
    pub fn candidate(&self, id: &PlanId) -> Option<&PlanCandidate> {
        match self {
            PlanResult::Single(_) => None,
            PlanResult::Choices(candidates) => candidates.iter().find(|c| &c.id == id),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize)]
#[serde(tag = "state", content = "detail", rename_all = "snake_case")]
pub enum SessionState {
    #[default]
    Idle,
    Submitting,
    Succeeded(PlanResult),
    Failed(RequestError),
}

impl SessionState {
    pub fn is_submitting(&self) -> bool {
        matches!(self, SessionState::Submitting)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionState::Succeeded(_) | SessionState::Failed(_))
    }
}
