use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::approvals::EvaluatorSettings;
use crate::domain::money::Currency;
use crate::domain::rule::{is_known_category, normalize_category};

/// Categories offered by the expense form.
pub const DEFAULT_CATEGORIES: [&str; 8] = [
    "Food",
    "Travel",
    "Miscellaneous",
    "Office Supplies",
    "Software",
    "Equipment",
    "Training",
    "Marketing",
];

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AppConfig {
    pub approvals: ApprovalsConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ApprovalsConfig {
    pub default_currency: Currency,
    pub allow_self_approval: bool,
    pub rules_path: Option<PathBuf>,
    pub categories: Vec<String>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub log_level: Option<String>,
    pub log_format: Option<LogFormat>,
    pub rules_path: Option<PathBuf>,
    pub allow_self_approval: Option<bool>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("environment variable interpolation failed for `{var}`")]
    MissingEnvInterpolation { var: String },
    #[error("unterminated environment interpolation expression")]
    UnterminatedInterpolation,
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            approvals: ApprovalsConfig {
                default_currency: Currency::Usd,
                allow_self_approval: false,
                rules_path: None,
                categories: DEFAULT_CATEGORIES.iter().map(|category| category.to_string()).collect(),
            },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

impl std::str::FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch);
        } else if options.require_file {
            let expected = options.config_path.unwrap_or_else(|| PathBuf::from("claimly.toml"));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    pub fn evaluator_settings(&self) -> EvaluatorSettings {
        EvaluatorSettings { allow_self_approval: self.approvals.allow_self_approval }
    }

    /// Whether `category` is one of the configured expense categories.
    pub fn is_known_category(&self, category: &str) -> bool {
        is_known_category(&self.approvals.categories, category)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(approvals) = patch.approvals {
            if let Some(default_currency) = approvals.default_currency {
                self.approvals.default_currency = default_currency;
            }
            if let Some(allow_self_approval) = approvals.allow_self_approval {
                self.approvals.allow_self_approval = allow_self_approval;
            }
            if let Some(rules_path) = approvals.rules_path {
                self.approvals.rules_path = Some(rules_path);
            }
            if let Some(categories) = approvals.categories {
                self.approvals.categories = categories;
            }
        }

        if let Some(logging) = patch.logging {
            if let Some(level) = logging.level {
                self.logging.level = level;
            }
            if let Some(format) = logging.format {
                self.logging.format = format;
            }
        }
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(value) = read_env("CLAIMLY_APPROVALS_DEFAULT_CURRENCY") {
            self.approvals.default_currency =
                value.parse().map_err(|_| ConfigError::InvalidEnvOverride {
                    key: "CLAIMLY_APPROVALS_DEFAULT_CURRENCY".to_string(),
                    value: value.clone(),
                })?;
        }
        if let Some(value) = read_env("CLAIMLY_APPROVALS_ALLOW_SELF_APPROVAL") {
            self.approvals.allow_self_approval =
                parse_bool("CLAIMLY_APPROVALS_ALLOW_SELF_APPROVAL", &value)?;
        }
        if let Some(value) = read_env("CLAIMLY_APPROVALS_RULES_PATH") {
            self.approvals.rules_path = Some(PathBuf::from(value));
        }
        if let Some(value) = read_env("CLAIMLY_APPROVALS_CATEGORIES") {
            self.approvals.categories = value
                .split(',')
                .map(str::trim)
                .filter(|category| !category.is_empty())
                .map(str::to_string)
                .collect();
        }

        let log_level =
            read_env("CLAIMLY_LOGGING_LEVEL").or_else(|| read_env("CLAIMLY_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("CLAIMLY_LOGGING_FORMAT").or_else(|| read_env("CLAIMLY_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
        if let Some(log_format) = overrides.log_format {
            self.logging.format = log_format;
        }
        if let Some(rules_path) = overrides.rules_path {
            self.approvals.rules_path = Some(rules_path);
        }
        if let Some(allow_self_approval) = overrides.allow_self_approval {
            self.approvals.allow_self_approval = allow_self_approval;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_approvals(&self.approvals)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

/// Searches `claimly.toml` then `config/claimly.toml` when no explicit path is given.
pub fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("claimly.toml"), PathBuf::from("config/claimly.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;

    let interpolated = interpolate_env_vars(&raw)?;
    toml::from_str::<ConfigPatch>(&interpolated)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

fn interpolate_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut output = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && matches!(chars.peek(), Some('{')) {
            chars.next();
            let mut key = String::new();

            loop {
                match chars.next() {
                    Some('}') => break,
                    Some(next) => key.push(next),
                    None => return Err(ConfigError::UnterminatedInterpolation),
                }
            }

            let value = env::var(&key)
                .map_err(|_| ConfigError::MissingEnvInterpolation { var: key.clone() })?;
            output.push_str(&value);
            continue;
        }

        output.push(ch);
    }

    Ok(output)
}

fn validate_approvals(approvals: &ApprovalsConfig) -> Result<(), ConfigError> {
    if approvals.categories.is_empty() {
        return Err(ConfigError::Validation(
            "approvals.categories must list at least one category".to_string(),
        ));
    }

    let mut seen = std::collections::BTreeSet::new();
    for category in &approvals.categories {
        let key = normalize_category(category);
        if key.is_empty() {
            return Err(ConfigError::Validation(
                "approvals.categories must not contain blank entries".to_string(),
            ));
        }
        if !seen.insert(key) {
            return Err(ConfigError::Validation(format!(
                "approvals.categories lists `{}` more than once",
                category.trim()
            )));
        }
    }

    if let Some(rules_path) = &approvals.rules_path {
        if rules_path.as_os_str().is_empty() {
            return Err(ConfigError::Validation(
                "approvals.rules_path must not be empty when set".to_string(),
            ));
        }
    }

    Ok(())
}

fn validate_logging(logging: &LoggingConfig) -> Result<(), ConfigError> {
    let level = logging.level.trim().to_ascii_lowercase();
    match level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(ConfigError::Validation(
            "logging.level must be one of trace|debug|info|warn|error".to_string(),
        )),
    }
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    value.trim().parse::<bool>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    approvals: Option<ApprovalsPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct ApprovalsPatch {
    default_currency: Option<Currency>,
    allow_self_approval: Option<bool>,
    rules_path: Option<PathBuf>,
    categories: Option<Vec<String>>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}

#[cfg(test)]
mod tests {
    use std::env;
    use std::fs;
    use std::io;
    use std::path::PathBuf;
    use std::sync::{Mutex, OnceLock};

    use tempfile::TempDir;

    use crate::domain::money::Currency;

    use super::{AppConfig, ConfigError, ConfigOverrides, LoadOptions, LogFormat};

    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();

    fn env_lock() -> &'static Mutex<()> {
        ENV_LOCK.get_or_init(|| Mutex::new(()))
    }

    fn clear_vars(vars: &[&str]) {
        for var in vars {
            env::remove_var(var);
        }
    }

    fn ensure(condition: bool, message: &'static str) -> Result<(), String> {
        if condition {
            Ok(())
        } else {
            Err(message.to_string())
        }
    }

    #[test]
    fn defaults_are_valid_without_a_file() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        let config = AppConfig::load(LoadOptions::default())
            .map_err(|err| format!("config load failed: {err}"))?;

        ensure(config.approvals.default_currency == Currency::Usd, "default currency is USD")?;
        ensure(!config.approvals.allow_self_approval, "self approval is off by default")?;
        ensure(config.approvals.categories.len() == 8, "eight default categories")?;
        ensure(config.is_known_category(" travel"), "category lookup ignores case")?;
        ensure(matches!(config.logging.format, LogFormat::Compact), "compact logs by default")
    }

    #[test]
    fn file_load_supports_env_interpolation() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("TEST_CLAIMLY_RULES_DIR", "/etc/claimly");

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = dir.path().join("claimly.toml");
            fs::write(
                &path,
                r#"
[approvals]
rules_path = "${TEST_CLAIMLY_RULES_DIR}/rules.toml"
default_currency = "EUR"
"#,
            )
            .map_err(|err| err.to_string())?;

            let config =
                AppConfig::load(LoadOptions { config_path: Some(path), ..LoadOptions::default() })
                    .map_err(|err| format!("config load failed: {err}"))?;

            ensure(
                config.approvals.rules_path == Some(PathBuf::from("/etc/claimly/rules.toml")),
                "rules path should be interpolated from environment",
            )?;
            ensure(
                config.approvals.default_currency == Currency::Eur,
                "default currency should come from file",
            )?;
            Ok(())
        })();

        clear_vars(&["TEST_CLAIMLY_RULES_DIR"]);
        result
    }

    #[test]
    fn logging_env_aliases_are_supported() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("CLAIMLY_LOG_LEVEL", "warn");
        env::set_var("CLAIMLY_LOG_FORMAT", "pretty");

        let result = (|| -> Result<(), String> {
            let config = AppConfig::load(LoadOptions::default())
                .map_err(|err| format!("config load failed: {err}"))?;

            ensure(config.logging.level == "warn", "warning log level should be set from env var")?;
            ensure(
                matches!(config.logging.format, LogFormat::Pretty),
                "pretty logging format should be set from env var",
            )?;
            Ok(())
        })();

        clear_vars(&["CLAIMLY_LOG_LEVEL", "CLAIMLY_LOG_FORMAT"]);
        result
    }

    #[test]
    fn precedence_defaults_file_env_overrides() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("CLAIMLY_APPROVALS_ALLOW_SELF_APPROVAL", "true");
        env::set_var("CLAIMLY_APPROVALS_CATEGORIES", "Food, Travel");

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = dir.path().join("claimly.toml");
            fs::write(
                &path,
                r#"
[approvals]
allow_self_approval = false
rules_path = "from-file.toml"
categories = ["Food"]

[logging]
level = "warn"
"#,
            )
            .map_err(|err| err.to_string())?;

            let config = AppConfig::load(LoadOptions {
                config_path: Some(path),
                overrides: ConfigOverrides {
                    rules_path: Some(PathBuf::from("from-override.toml")),
                    log_level: Some("debug".to_string()),
                    ..ConfigOverrides::default()
                },
                ..LoadOptions::default()
            })
            .map_err(|err| format!("config load failed: {err}"))?;

            ensure(
                config.approvals.rules_path == Some(PathBuf::from("from-override.toml")),
                "override rules path should win",
            )?;
            ensure(config.logging.level == "debug", "overridden log level should be debug")?;
            ensure(
                config.approvals.allow_self_approval,
                "env self-approval flag should win over file",
            )?;
            ensure(
                config.approvals.categories == vec!["Food".to_string(), "Travel".to_string()],
                "env categories should win over file",
            )?;
            ensure(config.evaluator_settings().allow_self_approval, "settings follow config")?;
            Ok(())
        })();

        clear_vars(&["CLAIMLY_APPROVALS_ALLOW_SELF_APPROVAL", "CLAIMLY_APPROVALS_CATEGORIES"]);
        result
    }

    #[test]
    fn invalid_env_override_is_reported() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("CLAIMLY_APPROVALS_DEFAULT_CURRENCY", "CHF");

        let result = (|| -> Result<(), String> {
            let error = match AppConfig::load(LoadOptions::default()) {
                Ok(_) => return Err("expected invalid currency to fail".to_string()),
                Err(error) => error,
            };
            ensure(
                matches!(
                    error,
                    ConfigError::InvalidEnvOverride { ref key, .. }
                        if key == "CLAIMLY_APPROVALS_DEFAULT_CURRENCY"
                ),
                "error should name the offending variable",
            )
        })();

        clear_vars(&["CLAIMLY_APPROVALS_DEFAULT_CURRENCY"]);
        result
    }

    #[test]
    fn validation_fails_fast_with_actionable_error() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("CLAIMLY_APPROVALS_CATEGORIES", "Food,food");

        let result = (|| -> Result<(), String> {
            let error = match AppConfig::load(LoadOptions::default()) {
                Ok(_) => {
                    return Err("expected validation failure but config load succeeded".to_string())
                }
                Err(error) => error,
            };
            let has_message = matches!(
                error,
                ConfigError::Validation(ref message) if message.contains("approvals.categories")
            );
            ensure(has_message, "validation failure should mention approvals.categories")
        })();

        clear_vars(&["CLAIMLY_APPROVALS_CATEGORIES"]);
        result
    }

    #[test]
    fn missing_required_file_is_an_error() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
        let path = dir.path().join("absent.toml");
        let result = AppConfig::load(LoadOptions {
            config_path: Some(path),
            require_file: true,
            ..LoadOptions::default()
        });

        ensure(
            matches!(result, Err(ConfigError::MissingConfigFile(_))),
            "missing required file should fail",
        )
    }
}
