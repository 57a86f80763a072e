use std::env;
use std::fs;
use std::path::Path;
use std::sync::{Mutex, OnceLock};

use claimly_cli::commands::{config, evaluate, rules, seed};
use serde_json::Value;

const REJECTED_TRAVEL: &str = r#"
[expense]
id = "exp-100"
employee_id = "3"
amount = "600.00"
currency = "USD"
category = "Travel"
description = "Client visit"

[[actions]]
actor = "2"
decision = "reject"
comment = "Over the travel budget"
"#;

const HYBRID_QUORUM: &str = r#"
[[users]]
id = "1"
name = "Sarah Chen"
email = "sarah.chen@company.com"
role = "admin"
currency = "USD"

[[users]]
id = "2"
name = "Michael Rodriguez"
email = "michael.rodriguez@company.com"
role = "manager"
currency = "USD"

[[users]]
id = "3"
name = "Emily Johnson"
email = "emily.johnson@company.com"
role = "employee"
currency = "USD"

[[users]]
id = "6"
name = "Priya Natarajan"
email = "priya.natarajan@company.com"
role = "manager"
currency = "USD"

[[rules]]
id = "rule-3"
name = "Hybrid rule for high-value travel"
type = "hybrid"
threshold = "1000.00"
percentage = 50
approver_id = "1"
category = "Travel"

[expense]
id = "exp-200"
employee_id = "3"
amount = "1200.00"
category = "Travel"

[[actions]]
actor = "2"
decision = "approve"

[[actions]]
actor = "6"
decision = "approve"
"#;

const EMPLOYEE_ACTS: &str = r#"
[expense]
id = "exp-300"
employee_id = "3"
amount = "45.00"
category = "Food"

[[actions]]
actor = "4"
decision = "approve"
"#;

#[test]
fn seed_summarises_pending_expenses() {
    with_env(&[], || {
        let result = seed::run(None);
        assert_eq!(result.exit_code, 0, "expected demo seed success");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "seed");
        assert_eq!(payload["status"], "ok");

        let message = payload["message"].as_str().unwrap_or("");
        assert!(message.starts_with("demo dataset loaded: 5 users, 8 expenses, 3 rules"));
        assert!(message.contains("  - exp-1: pending (rules: default)"));
        assert!(message.contains("  - exp-4: pending (rules: default)"));
        assert!(message.contains("  - exp-7: pending (rules: rule-2)"));
        assert!(message.contains("dashboard: 1 draft, 3 pending, 3 approved, 1 rejected"));
    });
}

#[test]
fn seed_is_idempotent_across_runs() {
    with_env(&[], || {
        let first = parse_payload(&seed::run(None).output);
        let second = parse_payload(&seed::run(None).output);

        assert_eq!(first["status"], "ok");
        assert_eq!(first["message"], second["message"]);
    });
}

#[test]
fn rules_lists_demo_catalog_by_type() {
    with_env(&[], || {
        let result = rules::run(None);
        assert_eq!(result.exit_code, 0);

        let payload = parse_payload(&result.output);
        let message = payload["message"].as_str().unwrap_or("");
        assert!(message.starts_with("3 approval rules:"));
        assert!(message.contains("percentage:\n  - rule-2: Manager approval for expenses above $500"));
        assert!(message.contains("specific:\n  - rule-1: Approval for miscellaneous expenses"));
        assert!(message.contains("hybrid:\n  - rule-3: Hybrid rule for high-value travel"));
    });
}

#[test]
fn rules_reports_invalid_rules_file() {
    let dir = tempfile::tempdir().expect("temp dir");
    let rules_path = write_file(
        dir.path(),
        "rules.toml",
        "[[rules]]\nid = \"rule-9\"\nname = \"Broken quorum\"\ntype = \"percentage\"\nthreshold = \"100.00\"\n",
    );

    with_env(&[("CLAIMLY_APPROVALS_RULES_PATH", rules_path.as_str())], || {
        let result = rules::run(None);
        assert_eq!(result.exit_code, 4, "expected rule catalog failure code");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["status"], "error");
        assert_eq!(payload["error_class"], "rule_catalog");
        assert!(payload["message"].as_str().unwrap_or("").contains("rule-9"));
    });
}

#[test]
fn evaluate_rejects_on_first_quorum_rejection() {
    let dir = tempfile::tempdir().expect("temp dir");
    let scenario = write_file(dir.path(), "scenario.toml", REJECTED_TRAVEL);

    with_env(&[], || {
        let result = evaluate::run(None, Path::new(&scenario));
        assert_eq!(result.exit_code, 0, "unexpected output: {}", result.output);

        let payload = parse_payload(&result.output);
        let message = payload["message"].as_str().unwrap_or("");
        assert!(message.starts_with("expense exp-100 is rejected (rules: rule-2)"));
        assert!(message.contains("  - step 1: 2 reject -> rejected"));
    });
}

#[test]
fn evaluate_approves_hybrid_rule_by_quorum() {
    let dir = tempfile::tempdir().expect("temp dir");
    let scenario = write_file(dir.path(), "scenario.toml", HYBRID_QUORUM);

    with_env(&[], || {
        let result = evaluate::run(None, Path::new(&scenario));
        assert_eq!(result.exit_code, 0, "unexpected output: {}", result.output);

        let payload = parse_payload(&result.output);
        let message = payload["message"].as_str().unwrap_or("");
        assert!(message.starts_with("expense exp-200 is approved (rules: rule-3)"));
        assert!(message.contains("  - step 1: 2 approve -> pending"));
        assert!(message.contains("  - step 2: 6 approve -> approved"));
        assert!(message.contains("  - rule-3 [hybrid]: approved"));
    });
}

#[test]
fn evaluate_maps_unauthorized_actor_to_forbidden() {
    let dir = tempfile::tempdir().expect("temp dir");
    let scenario = write_file(dir.path(), "scenario.toml", EMPLOYEE_ACTS);

    with_env(&[], || {
        let result = evaluate::run(None, Path::new(&scenario));
        assert_eq!(result.exit_code, 5);

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "evaluate");
        assert_eq!(payload["status"], "error");
        assert_eq!(payload["error_class"], "forbidden");
        assert!(payload["message"].as_str().unwrap_or("").starts_with("step 1:"));
    });
}

#[test]
fn evaluate_reports_missing_scenario_file() {
    let dir = tempfile::tempdir().expect("temp dir");

    with_env(&[], || {
        let result = evaluate::run(None, &dir.path().join("missing.toml"));
        assert_eq!(result.exit_code, 4);
        assert_eq!(parse_payload(&result.output)["error_class"], "scenario");
    });
}

#[test]
fn config_attributes_env_sources() {
    with_env(&[("CLAIMLY_APPROVALS_ALLOW_SELF_APPROVAL", "true")], || {
        let output = config::run(None);
        assert!(output.starts_with("effective config"));
        assert!(output.contains(
            "- approvals.allow_self_approval = true (source: env (CLAIMLY_APPROVALS_ALLOW_SELF_APPROVAL))"
        ));
        assert!(output.contains("- logging.level = info (source: default)"));
    });
}

#[test]
fn config_reports_invalid_env_values() {
    with_env(&[("CLAIMLY_APPROVALS_DEFAULT_CURRENCY", "CHF")], || {
        let output = config::run(None);
        assert!(output.starts_with("config validation failed:"));
    });
}

fn parse_payload(output: &str) -> Value {
    serde_json::from_str(output).expect("command output should be valid JSON")
}

fn write_file(dir: &Path, name: &str, contents: &str) -> String {
    let path = dir.join(name);
    fs::write(&path, contents).expect("write fixture file");
    path.display().to_string()
}

fn with_env(vars: &[(&str, &str)], test_fn: impl FnOnce()) {
    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    let _guard =
        ENV_LOCK.get_or_init(|| Mutex::new(())).lock().expect("env mutex should not be poisoned");

    let keys = [
        "CLAIMLY_APPROVALS_DEFAULT_CURRENCY",
        "CLAIMLY_APPROVALS_ALLOW_SELF_APPROVAL",
        "CLAIMLY_APPROVALS_RULES_PATH",
        "CLAIMLY_APPROVALS_CATEGORIES",
        "CLAIMLY_LOGGING_LEVEL",
        "CLAIMLY_LOGGING_FORMAT",
        "CLAIMLY_LOG_LEVEL",
        "CLAIMLY_LOG_FORMAT",
    ];

    let previous_values: Vec<(&str, Option<String>)> =
        keys.iter().map(|key| (*key, env::var(key).ok())).collect();

    for key in &keys {
        env::remove_var(key);
    }
    for (key, value) in vars {
        env::set_var(key, value);
    }

    test_fn();

    for (key, value) in previous_values {
        if let Some(value) = value {
            env::set_var(key, value);
        } else {
            env::remove_var(key);
        }
    }
}
