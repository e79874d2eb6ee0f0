//! Terminal renderer for session transitions.

use std::{
    fmt::Write as _,
    io::{self, Stderr, Stdout, Write},
    time::{Duration, Instant},
};

use shared::{
    domain::{MealPlan, PlanResult, SessionState},
    error::RequestError,
};

const UNAVAILABLE: &str = "N/A";

struct Banner {
    message: String,
    shown_at: Instant,
}

pub struct TerminalRenderer<O: Write, E: Write> {
    out: O,
    err: E,
    json: bool,
    dismiss_after: Duration,
    banner: Option<Banner>,
}

impl TerminalRenderer<Stdout, Stderr> {
    pub fn stdio(json: bool, dismiss_after: Duration) -> Self {
        Self::new(io::stdout(), io::stderr(), json, dismiss_after)
    }
}

impl<O: Write, E: Write> TerminalRenderer<O, E> {
    pub fn new(out: O, err: E, json: bool, dismiss_after: Duration) -> Self {
        Self {
            out,
            err,
            json,
            dismiss_after,
            banner: None,
        }
    }

    pub fn render(&mut self, state: &SessionState) -> io::Result<()> {
        self.render_at(state, Instant::now())
    }

    pub fn render_at(&mut self, state: &SessionState, now: Instant) -> io::Result<()> {
        self.expire_banner(now);
        match state {
            SessionState::Idle => Ok(()),
            SessionState::Submitting => {
                self.banner = None;
                writeln!(self.err, "Generating your plan...")
            }
            SessionState::Succeeded(result) => {
                if self.json {
                    serde_json::to_writer_pretty(&mut self.out, result)?;
                    writeln!(self.out)
                } else {
                    self.out.write_all(format_result(result).as_bytes())
                }
            }
            SessionState::Failed(error) => self.show_error_at(error, now),
        }
    }

    pub fn show_error(&mut self, error: &RequestError) -> io::Result<()> {
        self.show_error_at(error, Instant::now())
    }

    fn show_error_at(&mut self, error: &RequestError, now: Instant) -> io::Result<()> {
        let message = error.banner_text();
        writeln!(self.err, "! {message}")?;
        self.banner = Some(Banner {
            message,
            shown_at: now,
        });
        Ok(())
    }

    /// The error banner still on screen at `now`, if any.
    pub fn visible_banner(&self, now: Instant) -> Option<&str> {
        self.banner
            .as_ref()
            .filter(|banner| now.duration_since(banner.shown_at) < self.dismiss_after)
            .map(|banner| banner.message.as_str())
    }

    fn expire_banner(&mut self, now: Instant) {
        if self.visible_banner(now).is_none() {
            self.banner = None;
        }
    }

    #[cfg(test)]
    pub fn into_writers(self) -> (O, E) {
        (self.out, self.err)
    }
}

pub fn format_result(result: &PlanResult) -> String {
    match result {
        PlanResult::Single(plan) => format_plan(plan, ""),
        PlanResult::Choices(candidates) if candidates.is_empty() => {
            "No plans matched your preferences.\n".to_string()
        }
        PlanResult::Choices(candidates) => {
            let mut text = String::new();
            for candidate in candidates {
                let _ = write!(text, "[{}] {}", candidate.id, candidate.name);
                if let Some(confidence) = candidate.confidence {
                    let _ = write!(text, " ({:.0}% match)", confidence * 100.0);
                }
                text.push('\n');
                text.push_str(&format_plan(&candidate.plan, "    "));
            }
            text
        }
    }
}

pub fn format_plan(plan: &MealPlan, indent: &str) -> String {
    let mut text = String::new();
    let daily = &plan.macros.daily;
    let rows = [
        ("Breakfast", plan.meals.breakfast.clone()),
        ("Lunch", plan.meals.lunch.clone()),
        ("Dinner", plan.meals.dinner.clone()),
        ("Calories", amount(plan.calories, "")),
        ("Protein", amount(daily.protein, "g")),
        ("Carbs", amount(daily.carbs, "g")),
        ("Fats", amount(daily.fats, "g")),
    ];
    for (label, value) in rows {
        let _ = writeln!(text, "{indent}{:<10} {value}", format!("{label}:"));
    }
    for (meal, macros) in &plan.macros.per_meal {
        let _ = writeln!(
            text,
            "{indent}  {meal}: {} kcal, {} protein",
            amount(macros.calories, ""),
            amount(macros.protein, "g")
        );
    }
    text
}

fn amount(value: Option<f64>, unit: &str) -> String {
    match value {
        Some(v) if v.fract() == 0.0 => format!("{v:.0}{unit}"),
        Some(v) => format!("{v}{unit}"),
        None => UNAVAILABLE.to_string(),
    }
}

#[cfg(test)]
#[path = "tests/render_tests.rs"]
mod tests;
