use std::collections::BTreeMap;

use serde_json::{Map, Value};
use shared::{
    domain::{
        MacroBreakdown, Macros, MealMacros, MealPlan, Meals, PlanCandidate, PlanId, PlanResult,
    },
    error::RequestError,
    protocol::ErrorBody,
};
use tracing::{debug, warn};

use crate::transport::RawResponse;

pub const REJECTED_PLAN_MESSAGE: &str = "Failed to generate plan";

const DAILY_KEYS: &[&str] = &["daily", "total", "totals"];
const PER_MEAL_KEYS: &[&str] = &["perMeal", "per_meal"];
const PROTEIN_KEYS: &[&str] = &["protein"];
const CARBS_KEYS: &[&str] = &["carbs", "carbohydrates"];
const FATS_KEYS: &[&str] = &["fats", "fat"];
const CALORIE_KEYS: &[&str] = &["calories", "totalCalories", "total_calories"];

/// Normalizes every accepted response envelope into a [`PlanResult`].
///
/// Meals and the plan list are required; numeric fields that are missing or
/// unreadable come back as `None` instead of failing the response.
pub fn validate(raw: &RawResponse) -> Result<PlanResult, RequestError> {
    let Some(envelope) = raw.body.as_object() else {
        return Err(RequestError::malformed("response body is not a JSON object"));
    };

    if let Some(success) = envelope.get("success") {
        if !is_truthy(success) {
            let message = serde_json::from_value::<ErrorBody>(raw.body.clone())
                .ok()
                .and_then(|body| body.text())
                .unwrap_or_else(|| REJECTED_PLAN_MESSAGE.to_string());
            return Err(RequestError::malformed(message));
        }
    }

    if let Some(plan) = present(envelope, "plan") {
        return parse_plan(plan)
            .map(PlanResult::Single)
            .map_err(RequestError::malformed);
    }

    if let Some(plans) = present(envelope, "plans") {
        let Some(items) = plans.as_array() else {
            return Err(RequestError::malformed("`plans` is not a list"));
        };
        let candidates = items
            .iter()
            .enumerate()
            .map(|(index, item)| parse_candidate(index, item))
            .collect::<Result<Vec<_>, _>>()
            .map_err(RequestError::malformed)?;
        debug!(count = candidates.len(), "validated plan choices");
        return Ok(PlanResult::Choices(candidates));
    }

    Err(RequestError::malformed(
        "response contains neither a plan nor a list of plans",
    ))
}

fn present<'a>(object: &'a Map<String, Value>, key: &str) -> Option<&'a Value> {
    object.get(key).filter(|v| !v.is_null())
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0 && !f.is_nan()),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

fn parse_plan(value: &Value) -> Result<MealPlan, String> {
    let Some(plan) = value.as_object() else {
        return Err("plan is not an object".to_string());
    };

    Ok(MealPlan {
        meals: parse_meals(plan.get("meals"))?,
        macros: parse_macros(plan.get("macros")),
        calories: first_number(plan, CALORIE_KEYS),
    })
}

fn parse_meals(value: Option<&Value>) -> Result<Meals, String> {
    let Some(meals) = value.and_then(Value::as_object) else {
        return Err("plan is missing its meals".to_string());
    };
    let meal = |key: &str| -> Result<String, String> {
        meals
            .get(key)
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| format!("meals.{key} is missing"))
    };

    Ok(Meals {
        breakfast: meal("breakfast")?,
        lunch: meal("lunch")?,
        dinner: meal("dinner")?,
    })
}

fn parse_macros(value: Option<&Value>) -> Macros {
    let Some(macros) = value.and_then(Value::as_object) else {
        if value.is_some_and(|v| !v.is_null()) {
            warn!("plan macros are not an object; reporting them as unavailable");
        }
        return Macros::default();
    };

    let daily = DAILY_KEYS
        .iter()
        .find_map(|key| macros.get(*key).and_then(Value::as_object))
        .unwrap_or(macros);

    let per_meal = PER_MEAL_KEYS
        .iter()
        .find_map(|key| macros.get(*key).and_then(Value::as_object))
        .map(parse_per_meal)
        .unwrap_or_default();

    Macros {
        daily: parse_breakdown(daily),
        per_meal,
    }
}

fn parse_breakdown(object: &Map<String, Value>) -> MacroBreakdown {
    MacroBreakdown {
        protein: first_number(object, PROTEIN_KEYS),
        carbs: first_number(object, CARBS_KEYS),
        fats: first_number(object, FATS_KEYS),
    }
}

fn parse_per_meal(object: &Map<String, Value>) -> BTreeMap<String, MealMacros> {
    object
        .iter()
        .filter_map(|(meal, value)| {
            let entry = value.as_object()?;
            Some((
                meal.clone(),
                MealMacros {
                    calories: first_number(entry, CALORIE_KEYS),
                    protein: first_number(entry, PROTEIN_KEYS),
                },
            ))
        })
        .collect()
}

fn parse_candidate(index: usize, value: &Value) -> Result<PlanCandidate, String> {
    let Some(candidate) = value.as_object() else {
        return Err(format!("plans[{index}] is not an object"));
    };

    let id = match candidate.get("id") {
        Some(Value::Number(n)) => Some(PlanId::Number(n.clone())),
        Some(Value::String(s)) if !s.trim().is_empty() => Some(PlanId::Text(s.clone())),
        _ => None,
    }
    .ok_or_else(|| format!("plans[{index}] is missing an id"))?;

    let name = candidate
        .get("name")
        .and_then(Value::as_str)
        .filter(|s| !s.trim().is_empty())
        .ok_or_else(|| format!("plans[{index}] is missing a name"))?
        .to_string();

    let confidence = candidate.get("confidence").and_then(numeric);
    let confidence = match confidence {
        Some(c) if (0.0..=1.0).contains(&c) => Some(c),
        Some(c) => {
            warn!(index, confidence = c, "dropping out-of-range plan confidence");
            None
        }
        None => None,
    };

    let plan = parse_plan(value).map_err(|reason| format!("plans[{index}]: {reason}"))?;

    Ok(PlanCandidate {
        id,
        name,
        confidence,
        plan,
    })
}

fn first_number(object: &Map<String, Value>, keys: &[&str]) -> Option<f64> {
    keys.iter().find_map(|key| object.get(*key).and_then(numeric))
}

/// Reads numbers and numeric strings such as `"90"` or `"90g"`.
fn numeric(value: &Value) -> Option<f64> {
    let parsed = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s
            .trim()
            .trim_end_matches(|c: char| c.is_alphabetic())
            .trim()
            .parse::<f64>()
            .ok(),
        _ => None,
    };
    parsed.filter(|f| f.is_finite())
}

#[cfg(test)]
#[path = "tests/validator_tests.rs"]
mod tests;
