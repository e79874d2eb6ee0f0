use serde::Serialize;
use shared::{domain::FormInput, error::RequestError};

pub const MISSING_DIET_MESSAGE: &str = "Please select at least one diet preference";
pub const MISSING_GOAL_MESSAGE: &str = "Please choose a goal";
pub const BLANK_NAME_MESSAGE: &str = "Name must not be empty";

/// Wire-ready request. Only [`build`] can produce one, so holding a
/// `PlanRequest` means the form passed validation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlanRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<String>,
    diet: Vec<String>,
    goal: String,
}

impl PlanRequest {
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn diet(&self) -> &[String] {
        &self.diet
    }

    pub fn goal(&self) -> &str {
        &self.goal
    }
}

pub fn build(input: FormInput) -> Result<PlanRequest, RequestError> {
    let mut diet: Vec<String> = Vec::with_capacity(input.diet_tags.len());
    for tag in input.diet_tags {
        let tag = tag.trim();
        if !tag.is_empty() && !diet.iter().any(|seen| seen == tag) {
            diet.push(tag.to_string());
        }
    }
    if diet.is_empty() {
        return Err(RequestError::validation(MISSING_DIET_MESSAGE));
    }

    let goal = input.goal.trim();
    if goal.is_empty() {
        return Err(RequestError::validation(MISSING_GOAL_MESSAGE));
    }

    let name = match input.name {
        Some(name) => {
            let name = name.trim();
            if name.is_empty() {
                return Err(RequestError::validation(BLANK_NAME_MESSAGE));
            }
            Some(name.to_string())
        }
        None => None,
    };

    Ok(PlanRequest {
        name,
        diet,
        goal: goal.to_string(),
    })
}

#[cfg(test)]
#[path = "tests/builder_tests.rs"]
mod tests;
