use std::{path::Path, time::Duration};

use anyhow::{bail, Context};
use config::{Config, Environment, File, FileFormat, FileSourceFile};
use plan_client::ClientConfig;
use serde::Deserialize;
use tracing::info;
use url::Url;

pub const DEFAULT_ENDPOINT: &str = "https://nutrition-jetzy-backend.onrender.com/plan";
pub const DEFAULT_TIMEOUT_MS: u64 = 120_000;
pub const DEFAULT_BANNER_DISMISS_MS: u64 = 5_000;
pub const DEFAULT_CONFIG_FILE: &str = "planner.toml";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Settings {
    pub endpoint: String,
    pub timeout_ms: u64,
    pub confirm_endpoint: Option<String>,
    pub banner_dismiss_ms: u64,
}

/// Defaults, then `planner.toml` (or `path`), then `APP__*` variables.
pub fn load_settings(path: Option<&Path>) -> anyhow::Result<Settings> {
    let file = match path {
        Some(path) => File::from(path).required(true),
        None => File::with_name(DEFAULT_CONFIG_FILE).required(false),
    };
    build_settings(file, app_environment())
}

fn app_environment() -> Environment {
    Environment::with_prefix("APP")
        .prefix_separator("__")
        .separator("__")
        .try_parsing(true)
}

fn build_settings(
    file: File<FileSourceFile, FileFormat>,
    environment: Environment,
) -> anyhow::Result<Settings> {
    let settings: Settings = Config::builder()
        .set_default("endpoint", DEFAULT_ENDPOINT)?
        .set_default("timeout_ms", DEFAULT_TIMEOUT_MS)?
        .set_default("banner_dismiss_ms", DEFAULT_BANNER_DISMISS_MS)?
        .add_source(file)
        .add_source(environment)
        .build()
        .context("failed to load planner configuration")?
        .try_deserialize()
        .context("invalid planner configuration")?;

    info!(endpoint = %settings.endpoint, timeout_ms = settings.timeout_ms, "loaded settings");
    Ok(settings)
}

impl Settings {
    pub fn apply_overrides(&mut self, endpoint: Option<String>, timeout_ms: Option<u64>) {
        if let Some(endpoint) = endpoint {
            self.endpoint = endpoint;
        }
        if let Some(timeout_ms) = timeout_ms {
            self.timeout_ms = timeout_ms;
        }
    }

    pub fn banner_dismiss(&self) -> Duration {
        Duration::from_millis(self.banner_dismiss_ms)
    }

    pub fn client_config(&self) -> anyhow::Result<ClientConfig> {
        if self.timeout_ms == 0 {
            bail!("timeout_ms must be greater than zero");
        }

        let endpoint = parse_endpoint("endpoint", &self.endpoint)?;
        let mut config =
            ClientConfig::new(endpoint).with_timeout(Duration::from_millis(self.timeout_ms));

        if let Some(raw) = self
            .confirm_endpoint
            .as_deref()
            .map(str::trim)
            .filter(|raw| !raw.is_empty())
        {
            config = config.with_confirm_endpoint(parse_endpoint("confirm_endpoint", raw)?);
        }

        Ok(config)
    }
}

fn parse_endpoint(key: &str, raw: &str) -> anyhow::Result<Url> {
    let url = Url::parse(raw.trim()).with_context(|| format!("{key} '{raw}' is not a valid URL"))?;
    if !matches!(url.scheme(), "http" | "https") {
        bail!("{key} '{raw}' must use http or https");
    }
    Ok(url)
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;
