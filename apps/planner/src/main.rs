use std::{path::PathBuf, process::ExitCode};

use anyhow::{Context, Result};
use clap::Parser;
use plan_client::{PlanSession, SubmitOutcome};
use shared::domain::{FormInput, PlanId, PlanResult, SessionState};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

mod config;
mod render;

use crate::config::load_settings;
use crate::render::TerminalRenderer;

#[derive(Parser, Debug)]
#[command(name = "planner", about = "Request a meal plan from the nutrition service")]
struct Args {
    /// Diet preference; repeat the flag or separate tags with commas.
    #[arg(long, value_delimiter = ',')]
    diet: Vec<String>,
    #[arg(long)]
    goal: Option<String>,
    #[arg(long)]
    name: Option<String>,
    #[arg(long)]
    endpoint: Option<String>,
    #[arg(long)]
    timeout_ms: Option<u64>,
    #[arg(long)]
    config: Option<PathBuf>,
    /// Print the plan as JSON instead of text.
    #[arg(long)]
    json: bool,
    /// Confirm this candidate when the service answers with several plans.
    #[arg(long)]
    select: Option<String>,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();
    let args = Args::parse();

    let mut settings = load_settings(args.config.as_deref())?;
    settings.apply_overrides(args.endpoint.clone(), args.timeout_ms);
    let session = PlanSession::new(settings.client_config()?);
    let mut renderer = TerminalRenderer::stdio(args.json, settings.banner_dismiss());
    let (_subscription, mut states) = session.subscribe_channel();

    let input = FormInput {
        name: args.name,
        diet_tags: args.diet,
        goal: args.goal.unwrap_or_default(),
    };
    if let SubmitOutcome::Started { generation } = session.submit(input) {
        info!(generation, "waiting for plan service");
    }

    let final_state = loop {
        let state = tokio::select! {
            state = states.recv() => state.context("plan session closed unexpectedly")?,
            _ = tokio::signal::ctrl_c() => {
                warn!("interrupted; cancelling plan request");
                session.cancel();
                continue;
            }
        };
        renderer.render(&state)?;
        if state.is_terminal() {
            break state;
        }
    };

    let selection = match (&args.select, &final_state) {
        (Some(raw), SessionState::Succeeded(PlanResult::Choices(_))) => Some(PlanId::parse(raw)),
        (Some(_), _) => {
            warn!("--select ignored: the service did not return plan choices");
            None
        }
        (None, _) => None,
    };

    if let Some(plan_id) = selection {
        match session.confirm_selection(&plan_id).await {
            Ok(_) => renderer.render(&session.state())?,
            Err(err) => {
                renderer.show_error(&err)?;
                return Ok(ExitCode::FAILURE);
            }
        }
    }

    Ok(match final_state {
        SessionState::Failed(_) => ExitCode::FAILURE,
        _ => ExitCode::SUCCESS,
    })
}
