use std::fs;
use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;

use claimly_core::approvals::{EvaluationOutcome, RuleCatalog};
use claimly_core::audit::{AuditContext, InMemoryAuditSink};
use claimly_core::config::AppConfig;
use claimly_core::domain::approval::ApprovalDecision;
use claimly_core::domain::expense::{Expense, ExpenseId};
use claimly_core::domain::money::Currency;
use claimly_core::domain::rule::{ApprovalRule, RuleType};
use claimly_core::domain::user::{User, UserId};
use claimly_db::{ApprovalService, DemoDataset, Repositories, ServiceSettings};

use crate::commands::{CommandResult, Failure};

/// A replayable approval scenario: roster, rules, one expense and the actions taken on it.
#[derive(Debug, Deserialize)]
pub struct Scenario {
    #[serde(default)]
    pub users: Option<Vec<User>>,
    #[serde(default)]
    pub rules: Option<Vec<ApprovalRule>>,
    pub expense: ScenarioExpense,
    #[serde(default)]
    pub actions: Vec<ScenarioAction>,
}

#[derive(Debug, Deserialize)]
pub struct ScenarioExpense {
    #[serde(default)]
    pub id: Option<ExpenseId>,
    pub employee_id: UserId,
    pub amount: Decimal,
    #[serde(default)]
    pub currency: Option<Currency>,
    pub category: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub date: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
pub struct ScenarioAction {
    pub actor: UserId,
    pub decision: ApprovalDecision,
    #[serde(default)]
    pub comment: Option<String>,
}

impl Scenario {
    pub fn from_toml_str(raw: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(raw)
    }
}

pub fn run(config_path: Option<&Path>, scenario_path: &Path) -> CommandResult {
    match execute(config_path, scenario_path) {
        Ok(message) => CommandResult::success("evaluate", message),
        Err((error_class, message, exit_code)) => {
            CommandResult::failure("evaluate", error_class, message, exit_code)
        }
    }
}

fn execute(config_path: Option<&Path>, scenario_path: &Path) -> Result<String, Failure> {
    let config = super::load_config(config_path)?;
    let raw = fs::read_to_string(scenario_path).map_err(|error| {
        ("scenario", format!("could not read scenario `{}`: {error}", scenario_path.display()), 4)
    })?;
    let scenario = Scenario::from_toml_str(&raw).map_err(|error| {
        ("scenario", format!("invalid scenario `{}`: {error}", scenario_path.display()), 4)
    })?;

    let catalog = match scenario.rules {
        Some(rules) => RuleCatalog::new(rules)
            .map_err(|error| ("rule_catalog", format!("invalid scenario rules: {error}"), 4))?,
        None => super::load_catalog(&config)?,
    };
    let users = scenario.users.unwrap_or_else(DemoDataset::users);
    let expense = build_expense(&config, scenario.expense)?;

    let runtime = super::runtime()?;
    runtime.block_on(replay(&config, users, catalog, expense, scenario.actions))
}

fn build_expense(config: &AppConfig, input: ScenarioExpense) -> Result<Expense, Failure> {
    if !config.is_known_category(&input.category) {
        return Err((
            "scenario",
            format!("expense category `{}` is not a configured category", input.category),
            4,
        ));
    }

    let expense = Expense::draft(
        input.id.unwrap_or_else(|| ExpenseId("exp-scenario".to_string())),
        input.employee_id,
        input.amount,
        input.currency.unwrap_or(config.approvals.default_currency),
        input.category,
        input.date.unwrap_or_else(Utc::now),
    )
    .map_err(|error| ("scenario", format!("invalid scenario expense: {error}"), 4))?;

    Ok(match input.description {
        Some(description) => expense.with_description(description),
        None => expense,
    })
}

async fn replay(
    config: &AppConfig,
    users: Vec<User>,
    catalog: RuleCatalog,
    expense: Expense,
    actions: Vec<ScenarioAction>,
) -> Result<String, Failure> {
    let storage = |error: claimly_db::RepositoryError| ("storage", error.to_string(), 5u8);
    let repositories = Repositories::in_memory();
    for user in users {
        repositories.users.save(user).await.map_err(storage)?;
    }
    repositories.rules.store(catalog).await.map_err(storage)?;

    let expense_id = expense.id.clone();
    let owner_id = expense.employee_id.clone();
    repositories.expenses.save(expense).await.map_err(storage)?;

    let service = ApprovalService::new(repositories, Arc::new(InMemoryAuditSink::default()))
        .with_settings(ServiceSettings::from_config(config));

    let submit_context = AuditContext::new("evaluate-submit", owner_id.0.clone());
    service
        .submit(&expense_id, &owner_id, &submit_context)
        .await
        .map_err(|error| application_failure(error, "submit", &submit_context))?;

    let mut steps = Vec::with_capacity(actions.len());
    let mut last_outcome = None;
    for (index, action) in actions.into_iter().enumerate() {
        let step = index + 1;
        let context = AuditContext::new(format!("evaluate-step-{step}"), action.actor.0.clone());
        let receipt = service
            .record_action(&expense_id, &action.actor, action.decision, action.comment, &context)
            .await
            .map_err(|error| application_failure(error, &format!("step {step}"), &context))?;
        steps.push(format!(
            "  - step {step}: {} {} -> {}",
            action.actor,
            action.decision.as_str(),
            receipt.outcome.status.as_str()
        ));
        last_outcome = Some(receipt.outcome);
    }

    let outcome = match last_outcome {
        Some(outcome) => outcome,
        None => service
            .evaluate(&expense_id)
            .await
            .map_err(|error| application_failure(error, "evaluate", &submit_context))?,
    };

    Ok(render_outcome(&outcome, &steps))
}

fn application_failure(
    error: claimly_core::errors::ApplicationError,
    stage: &str,
    context: &AuditContext,
) -> Failure {
    let interface = error.into_interface(context.correlation_id.clone());
    (interface.error_class(), format!("{stage}: {interface}"), 5)
}

fn render_outcome(outcome: &EvaluationOutcome, steps: &[String]) -> String {
    let reasons = outcome.reasons.iter().map(|reason| reason.0.as_str()).collect::<Vec<_>>();
    let mut lines = vec![format!(
        "expense {} is {} (rules: {})",
        outcome.expense_id,
        outcome.status.as_str(),
        reasons.join(", ")
    )];
    lines.extend(steps.iter().cloned());
    for evaluation in &outcome.rules {
        let rule_type = evaluation.rule_type.map_or("default", RuleType::as_str);
        lines.push(format!(
            "  - {} [{rule_type}]: {} ({})",
            evaluation.rule_id,
            evaluation.status.as_str(),
            evaluation.detail
        ));
    }
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use claimly_core::domain::approval::ApprovalDecision;
    use claimly_core::domain::money::Currency;

    use super::Scenario;

    #[test]
    fn scenario_parses_with_optional_sections() {
        let scenario = Scenario::from_toml_str(
            r#"
[expense]
employee_id = "3"
amount = "600.00"
category = "Travel"

[[actions]]
actor = "2"
decision = "reject"
comment = "Not in budget"
"#,
        )
        .expect("valid scenario");

        assert!(scenario.users.is_none());
        assert!(scenario.rules.is_none());
        assert_eq!(scenario.expense.currency, None::<Currency>);
        assert_eq!(scenario.actions.len(), 1);
        assert_eq!(scenario.actions[0].decision, ApprovalDecision::Reject);
    }
}
