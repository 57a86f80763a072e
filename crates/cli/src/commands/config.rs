use std::env;
use std::fs;
use std::path::Path;

use claimly_core::config::resolve_config_path;
use toml::Value;

pub fn run(config_path: Option<&Path>) -> String {
    let config = match super::load_config(config_path) {
        Ok(config) => config,
        Err((_, message, _)) => return format!("config validation failed: {message}"),
    };

    let config_file_path = resolve_config_path(config_path);
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());
    let source = |key_path: &str, env_keys: &[&str]| {
        field_source(key_path, env_keys, config_file_doc.as_ref(), config_file_path.as_deref())
    };

    let rules_path = config
        .approvals
        .rules_path
        .as_deref()
        .map(|path| path.display().to_string())
        .unwrap_or_else(|| "<demo rules>".to_string());

    let lines = [
        "effective config (source precedence: env > file > default):".to_string(),
        render_line(
            "approvals.default_currency",
            config.approvals.default_currency.code(),
            source("approvals.default_currency", &["CLAIMLY_APPROVALS_DEFAULT_CURRENCY"]),
        ),
        render_line(
            "approvals.allow_self_approval",
            &config.approvals.allow_self_approval.to_string(),
            source("approvals.allow_self_approval", &["CLAIMLY_APPROVALS_ALLOW_SELF_APPROVAL"]),
        ),
        render_line(
            "approvals.rules_path",
            &rules_path,
            source("approvals.rules_path", &["CLAIMLY_APPROVALS_RULES_PATH"]),
        ),
        render_line(
            "approvals.categories",
            &config.approvals.categories.join(", "),
            source("approvals.categories", &["CLAIMLY_APPROVALS_CATEGORIES"]),
        ),
        render_line(
            "logging.level",
            &config.logging.level,
            source("logging.level", &["CLAIMLY_LOGGING_LEVEL", "CLAIMLY_LOG_LEVEL"]),
        ),
        render_line(
            "logging.format",
            &format!("{:?}", config.logging.format),
            source("logging.format", &["CLAIMLY_LOGGING_FORMAT", "CLAIMLY_LOG_FORMAT"]),
        ),
    ];

    lines.join("\n")
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let path = path?;
    let raw = fs::read_to_string(path).ok()?;
    raw.parse::<Value>().ok()
}

fn field_source(
    key_path: &str,
    env_keys: &[&str],
    config_file_doc: Option<&Value>,
    config_file_path: Option<&Path>,
) -> String {
    if let Some(env_key) = env_keys.iter().find(|key| env::var_os(key).is_some()) {
        return format!("env ({env_key})");
    }

    if let Some(doc) = config_file_doc {
        if contains_path(doc, key_path) {
            let file_path = config_file_path
                .map(|path| path.display().to_string())
                .unwrap_or_else(|| "config file".to_string());
            return format!("file ({file_path})");
        }
    }

    "default".to_string()
}

fn contains_path(root: &Value, key_path: &str) -> bool {
    let mut current = root;
    for key in key_path.split('.') {
        let Some(next) = current.get(key) else {
            return false;
        };
        current = next;
    }
    true
}

fn render_line(key: &str, value: &str, source: String) -> String {
    format!("- {key} = {value} (source: {source})")
}
