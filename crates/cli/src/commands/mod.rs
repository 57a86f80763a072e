pub mod config;
pub mod evaluate;
pub mod rules;
pub mod seed;

use std::fs;
use std::path::Path;

use anyhow::Context;
use serde::Serialize;

use claimly_core::approvals::RuleCatalog;
use claimly_core::config::{AppConfig, LoadOptions};
use claimly_db::DemoDataset;

#[derive(Debug, Clone)]
pub struct CommandResult {
    pub exit_code: u8,
    pub output: String,
}

#[derive(Debug, Serialize)]
struct CommandOutcome {
    command: String,
    status: String,
    error_class: Option<String>,
    message: String,
}

impl CommandResult {
    pub fn success(command: &str, message: impl Into<String>) -> Self {
        let payload = CommandOutcome {
            command: command.to_string(),
            status: "ok".to_string(),
            error_class: None,
            message: message.into(),
        };
        Self { exit_code: 0, output: serialize_payload(payload) }
    }

    pub fn failure(
        command: &str,
        error_class: &str,
        message: impl Into<String>,
        exit_code: u8,
    ) -> Self {
        let payload = CommandOutcome {
            command: command.to_string(),
            status: "error".to_string(),
            error_class: Some(error_class.to_string()),
            message: message.into(),
        };
        Self { exit_code, output: serialize_payload(payload) }
    }
}

/// Failure triple threaded through command bodies: error class, message, exit code.
pub(crate) type Failure = (&'static str, String, u8);

pub(crate) fn load_config(config_path: Option<&Path>) -> Result<AppConfig, Failure> {
    let options = LoadOptions {
        config_path: config_path.map(Path::to_path_buf),
        require_file: config_path.is_some(),
        ..LoadOptions::default()
    };
    AppConfig::load(options)
        .map_err(|error| ("config_validation", format!("configuration issue: {error}"), 2))
}

pub(crate) fn runtime() -> Result<tokio::runtime::Runtime, Failure> {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|error| ("runtime_init", format!("failed to initialize async runtime: {error}"), 3))
}

/// Rules from `approvals.rules_path`, or the demo rules when none is configured.
pub(crate) fn load_catalog(config: &AppConfig) -> Result<RuleCatalog, Failure> {
    read_catalog(config).map_err(|error| ("rule_catalog", format!("{error:#}"), 4))
}

fn read_catalog(config: &AppConfig) -> anyhow::Result<RuleCatalog> {
    let Some(path) = config.approvals.rules_path.as_deref() else {
        return Ok(DemoDataset::catalog()?);
    };

    let raw = fs::read_to_string(path)
        .with_context(|| format!("could not read rules file `{}`", path.display()))?;
    RuleCatalog::from_toml_str(&raw)
        .with_context(|| format!("invalid rules file `{}`", path.display()))
}

fn serialize_payload(payload: CommandOutcome) -> String {
    serde_json::to_string(&payload).unwrap_or_else(|error| {
        format!(
            "{{\"command\":\"unknown\",\"status\":\"error\",\"error_class\":\"serialization\",\"message\":\"{}\"}}",
            error.to_string().replace('\\', "\\\\").replace('"', "\\\"")
        )
    })
}
