use std::path::Path;

use claimly_core::approvals::RuleCatalog;
use claimly_core::domain::money::Currency;
use claimly_core::domain::rule::RuleType;

use crate::commands::{CommandResult, Failure};

pub fn run(config_path: Option<&Path>) -> CommandResult {
    match execute(config_path) {
        Ok(message) => CommandResult::success("rules", message),
        Err((error_class, message, exit_code)) => {
            CommandResult::failure("rules", error_class, message, exit_code)
        }
    }
}

fn execute(config_path: Option<&Path>) -> Result<String, Failure> {
    let config = super::load_config(config_path)?;
    let catalog = super::load_catalog(&config)?;
    Ok(render_catalog(&catalog, config.approvals.default_currency))
}

fn render_catalog(catalog: &RuleCatalog, currency: Currency) -> String {
    if catalog.is_empty() {
        return "no approval rules configured; any manager or admin decision settles an expense"
            .to_string();
    }

    let mut lines = vec![format!("{} approval rules:", catalog.len())];
    for rule_type in RuleType::ALL {
        let rules = catalog.by_type(rule_type).collect::<Vec<_>>();
        if rules.is_empty() {
            continue;
        }
        lines.push(format!("{}:", rule_type.as_str()));
        for rule in rules {
            lines.push(format!("  - {}: {} ({})", rule.id, rule.name, rule.describe(currency)));
        }
    }
    lines.join("\n")
}
