use std::path::Path;
use std::sync::Arc;

use claimly_core::audit::InMemoryAuditSink;
use claimly_core::domain::expense::ExpenseStatus;
use claimly_db::{ApprovalService, DashboardSummary, DemoDataset, Repositories, ServiceSettings};

use crate::commands::{CommandResult, Failure};

pub fn run(config_path: Option<&Path>) -> CommandResult {
    match execute(config_path) {
        Ok(message) => CommandResult::success("seed", message),
        Err((error_class, message, exit_code)) => {
            CommandResult::failure("seed", error_class, message, exit_code)
        }
    }
}

fn execute(config_path: Option<&Path>) -> Result<String, Failure> {
    let config = super::load_config(config_path)?;
    let catalog = super::load_catalog(&config)?;
    let runtime = super::runtime()?;

    runtime.block_on(async {
        let repositories = Repositories::in_memory();
        let seeded = DemoDataset::load(&repositories)
            .await
            .map_err(|error| ("seed_execution", error.to_string(), 5u8))?;
        repositories
            .rules
            .store(catalog.clone())
            .await
            .map_err(|error| ("seed_execution", error.to_string(), 5u8))?;

        let service = ApprovalService::new(repositories, Arc::new(InMemoryAuditSink::default()))
            .with_settings(ServiceSettings::from_config(&config));

        let mut lines = vec![format!(
            "demo dataset loaded: {} users, {} expenses, {} rules",
            seeded.users,
            seeded.expenses,
            catalog.len()
        )];

        for expense_id in &seeded.pending_expense_ids {
            let outcome = service.evaluate(expense_id).await.map_err(|error| {
                ("evaluation", format!("could not evaluate `{expense_id}`: {error}"), 6u8)
            })?;
            let reasons =
                outcome.reasons.iter().map(|reason| reason.0.as_str()).collect::<Vec<_>>();
            lines.push(format!(
                "  - {expense_id}: {} (rules: {})",
                outcome.status.as_str(),
                reasons.join(", ")
            ));
        }

        let dashboard = service
            .dashboard(None)
            .await
            .map_err(|error| ("seed_execution", error.to_string(), 5u8))?;
        lines.push(render_dashboard(&dashboard));

        Ok::<_, Failure>(lines.join("\n"))
    })
}

fn render_dashboard(dashboard: &DashboardSummary) -> String {
    let counts = [
        ExpenseStatus::Draft,
        ExpenseStatus::Pending,
        ExpenseStatus::Approved,
        ExpenseStatus::Rejected,
    ]
    .into_iter()
    .map(|status| format!("{} {}", dashboard.status(status).count, status.as_str()))
    .collect::<Vec<_>>();
    format!("dashboard: {}", counts.join(", "))
}

#[cfg(test)]
mod tests {
    use claimly_db::DashboardSummary;

    use super::render_dashboard;

    #[test]
    fn dashboard_line_lists_every_status() {
        let mut dashboard = DashboardSummary::default();
        dashboard.pending.count = 3;
        dashboard.approved.count = 2;

        assert_eq!(
            render_dashboard(&dashboard),
            "dashboard: 0 draft, 3 pending, 2 approved, 0 rejected"
        );
    }
}
