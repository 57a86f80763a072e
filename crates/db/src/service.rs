//! Expense approval workflow over the repositories.
//!
//! Every mutation of an expense's approval state runs under a per-expense
//! lock, so concurrent actions on the same expense are applied one at a time
//! while different expenses proceed independently. Evaluation failures leave
//! the stored expense and history untouched.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex as StdMutex, MutexGuard};

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{info, warn};
use uuid::Uuid;

use claimly_core::approvals::{
    EvaluationOutcome, EvaluatorSettings, RuleCatalog, RuleDraft, RuleEvaluator,
};
use claimly_core::audit::{AuditCategory, AuditContext, AuditEvent, AuditOutcome, AuditSink};
use claimly_core::config::{AppConfig, DEFAULT_CATEGORIES};
use claimly_core::domain::approval::{ApprovalDecision, ApprovalHistory};
use claimly_core::domain::expense::{Expense, ExpenseId, ExpenseStatus};
use claimly_core::domain::money::Currency;
use claimly_core::domain::rule::{is_known_category, ApprovalRule, RuleId};
use claimly_core::domain::user::{User, UserId};
use claimly_core::errors::{ApplicationError, DomainError, EvaluationError};

use crate::repositories::{
    ApprovalHistoryRepository, ExpenseRepository, InMemoryApprovalHistoryRepository,
    InMemoryExpenseRepository, InMemoryRuleRepository, InMemoryUserRepository, RuleRepository,
    UserRepository,
};

#[derive(Clone)]
pub struct Repositories {
    pub users: Arc<dyn UserRepository>,
    pub expenses: Arc<dyn ExpenseRepository>,
    pub rules: Arc<dyn RuleRepository>,
    pub histories: Arc<dyn ApprovalHistoryRepository>,
}

impl Repositories {
    pub fn in_memory() -> Self {
        Self {
            users: Arc::new(InMemoryUserRepository::default()),
            expenses: Arc::new(InMemoryExpenseRepository::default()),
            rules: Arc::new(InMemoryRuleRepository::default()),
            histories: Arc::new(InMemoryApprovalHistoryRepository::default()),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ServiceSettings {
    pub evaluator: EvaluatorSettings,
    pub categories: Vec<String>,
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self {
            evaluator: EvaluatorSettings::default(),
            categories: DEFAULT_CATEGORIES.iter().map(|category| category.to_string()).collect(),
        }
    }
}

impl ServiceSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            evaluator: config.evaluator_settings(),
            categories: config.approvals.categories.clone(),
        }
    }

    fn is_known_category(&self, category: &str) -> bool {
        is_known_category(&self.categories, category)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct NewExpense {
    pub amount: Decimal,
    pub currency: Currency,
    pub category: String,
    pub description: Option<String>,
    pub date: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ActionReceipt {
    pub expense: Expense,
    pub history: ApprovalHistory,
    pub outcome: EvaluationOutcome,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct StatusSummary {
    pub count: usize,
    pub totals: BTreeMap<Currency, Decimal>,
}

impl StatusSummary {
    fn add(&mut self, expense: &Expense) {
        self.count += 1;
        *self.totals.entry(expense.currency).or_default() += expense.amount;
    }
}

/// Expense counts and per-currency totals by status.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct DashboardSummary {
    pub total: usize,
    pub draft: StatusSummary,
    pub pending: StatusSummary,
    pub approved: StatusSummary,
    pub rejected: StatusSummary,
}

impl DashboardSummary {
    pub fn status(&self, status: ExpenseStatus) -> &StatusSummary {
        match status {
            ExpenseStatus::Draft => &self.draft,
            ExpenseStatus::Pending => &self.pending,
            ExpenseStatus::Approved => &self.approved,
            ExpenseStatus::Rejected => &self.rejected,
        }
    }

    fn record(&mut self, expense: &Expense) {
        self.total += 1;
        let slot = match expense.status {
            ExpenseStatus::Draft => &mut self.draft,
            ExpenseStatus::Pending => &mut self.pending,
            ExpenseStatus::Approved => &mut self.approved,
            ExpenseStatus::Rejected => &mut self.rejected,
        };
        slot.add(expense);
    }
}

/// One mutex per expense id, created on first use and dropped once no task
/// holds or waits on it.
#[derive(Default)]
struct ExpenseLocks {
    locks: StdMutex<HashMap<ExpenseId, Arc<Mutex<()>>>>,
}

impl ExpenseLocks {
    async fn acquire(&self, expense_id: &ExpenseId) -> ExpenseGuard<'_> {
        let lock = {
            let mut locks = self.table();
            Arc::clone(locks.entry(expense_id.clone()).or_default())
        };
        let guard = lock.lock_owned().await;
        ExpenseGuard { locks: self, expense_id: expense_id.clone(), guard: Some(guard) }
    }

    fn table(&self) -> MutexGuard<'_, HashMap<ExpenseId, Arc<Mutex<()>>>> {
        match self.locks.lock() {
            Ok(locks) => locks,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    #[cfg(test)]
    fn tracked(&self) -> usize {
        self.table().len()
    }
}

struct ExpenseGuard<'a> {
    locks: &'a ExpenseLocks,
    expense_id: ExpenseId,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for ExpenseGuard<'_> {
    fn drop(&mut self) {
        drop(self.guard.take());
        let mut locks = self.locks.table();
        let idle = locks.get(&self.expense_id).is_some_and(|lock| Arc::strong_count(lock) == 1);
        if idle {
            locks.remove(&self.expense_id);
        }
    }
}

pub struct ApprovalService {
    repositories: Repositories,
    audit: Arc<dyn AuditSink>,
    settings: ServiceSettings,
    locks: ExpenseLocks,
    rules_lock: Mutex<()>,
}

impl ApprovalService {
    pub fn new(repositories: Repositories, audit: Arc<dyn AuditSink>) -> Self {
        Self {
            repositories,
            audit,
            settings: ServiceSettings::default(),
            locks: ExpenseLocks::default(),
            rules_lock: Mutex::new(()),
        }
    }

    pub fn with_settings(mut self, settings: ServiceSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn repositories(&self) -> &Repositories {
        &self.repositories
    }

    /// Stores a new draft owned by `owner_id`.
    pub async fn create_draft(
        &self,
        owner_id: &UserId,
        new_expense: NewExpense,
    ) -> Result<Expense, ApplicationError> {
        self.load_user(owner_id).await?;
        if !self.settings.is_known_category(&new_expense.category) {
            return Err(DomainError::InvariantViolation(format!(
                "expense.category `{}` is not a configured category",
                new_expense.category
            ))
            .into());
        }

        let id = ExpenseId(format!("exp-{}", Uuid::new_v4().simple()));
        let mut expense = Expense::draft(
            id,
            owner_id.clone(),
            new_expense.amount,
            new_expense.currency,
            new_expense.category,
            new_expense.date,
        )?;
        expense.description = new_expense.description.filter(|value| !value.trim().is_empty());

        self.repositories.histories.save(ApprovalHistory::new(expense.id.clone())).await?;
        self.repositories.expenses.save(expense.clone()).await?;
        Ok(expense)
    }

    /// Moves a draft to pending; only its owner may submit it.
    pub async fn submit(
        &self,
        expense_id: &ExpenseId,
        actor_id: &UserId,
        context: &AuditContext,
    ) -> Result<Expense, ApplicationError> {
        let _guard = self.locks.acquire(expense_id).await;
        let mut expense = self.load_expense(expense_id).await?;

        if &expense.employee_id != actor_id {
            return Err(EvaluationError::UnauthorizedActor {
                actor_id: actor_id.clone(),
                reason: format!("only the owner can submit expense `{expense_id}`"),
            }
            .into());
        }

        expense.submit()?;
        self.repositories.expenses.save(expense.clone()).await?;

        self.audit.emit(
            AuditEvent::new(
                Some(expense.id.clone()),
                context,
                "expense.submitted",
                AuditCategory::Submission,
                AuditOutcome::Success,
            )
            .with_metadata("amount", expense.amount.to_string())
            .with_metadata("currency", expense.currency.code())
            .with_metadata("category", expense.category.clone()),
        );
        info!(
            event_name = "expense.submitted",
            correlation_id = %context.correlation_id,
            expense_id = %expense.id,
            actor_id = %actor_id,
            "expense submitted for approval"
        );

        Ok(expense)
    }

    /// Records an approver decision and applies the resulting outcome.
    pub async fn record_action(
        &self,
        expense_id: &ExpenseId,
        actor_id: &UserId,
        decision: ApprovalDecision,
        comment: Option<String>,
        context: &AuditContext,
    ) -> Result<ActionReceipt, ApplicationError> {
        let _guard = self.locks.acquire(expense_id).await;

        let mut expense = self.load_expense(expense_id).await?;
        let evaluator = self.evaluator().await?;
        let catalog = self.repositories.rules.load().await?;
        let history = self.load_history(expense_id).await?;
        let acted_at = Utc::now();

        let decided = self
            .resolve_actor(&evaluator, actor_id)
            .and_then(|actor| {
                evaluator.record_action(&expense, &history, actor, decision, comment, acted_at)
            })
            .and_then(|history| {
                let outcome = evaluator.evaluate(&expense, catalog.rules(), &history)?;
                Ok((history, outcome))
            });
        let (history, outcome) = match decided {
            Ok(decided) => decided,
            Err(error) => {
                self.report_failure(&expense.id, actor_id, context, &error);
                return Err(error.into());
            }
        };

        if outcome.is_terminal() {
            let comment = history.action_by(actor_id).and_then(|action| action.comment.clone());
            expense.conclude(outcome.status, actor_id.clone(), comment, acted_at)?;
        }

        self.repositories.histories.save(history.clone()).await?;
        self.repositories.expenses.save(expense.clone()).await?;

        let reasons = join_reasons(&outcome);
        self.audit.emit(
            AuditEvent::new(
                Some(expense.id.clone()),
                context,
                "approval.action_recorded",
                AuditCategory::Approval,
                AuditOutcome::Success,
            )
            .with_metadata("decision", decision.as_str())
            .with_metadata("status", outcome.status.as_str())
            .with_metadata("reasons", reasons.clone()),
        );
        info!(
            event_name = "approval.action_recorded",
            correlation_id = %context.correlation_id,
            expense_id = %expense.id,
            actor_id = %actor_id,
            decision = decision.as_str(),
            status = outcome.status.as_str(),
            "approval action recorded"
        );

        if outcome.is_terminal() {
            let audit_outcome = match outcome.status {
                ExpenseStatus::Rejected => AuditOutcome::Rejected,
                _ => AuditOutcome::Success,
            };
            self.audit.emit(
                AuditEvent::new(
                    Some(expense.id.clone()),
                    context,
                    "approval.expense_decided",
                    AuditCategory::Approval,
                    audit_outcome,
                )
                .with_metadata("status", outcome.status.as_str())
                .with_metadata("reasons", reasons.clone()),
            );
            info!(
                event_name = "approval.expense_decided",
                correlation_id = %context.correlation_id,
                expense_id = %expense.id,
                status = outcome.status.as_str(),
                reasons = %reasons,
                "expense reached a final decision"
            );
        }

        Ok(ActionReceipt { expense, history, outcome })
    }

    /// Evaluates a stored pending expense without changing it.
    pub async fn evaluate(&self, expense_id: &ExpenseId) -> Result<EvaluationOutcome, ApplicationError> {
        let expense = self.load_expense(expense_id).await?;
        let evaluator = self.evaluator().await?;
        let catalog = self.repositories.rules.load().await?;
        let history = self.load_history(expense_id).await?;
        Ok(evaluator.evaluate(&expense, catalog.rules(), &history)?)
    }

    pub async fn history(&self, expense_id: &ExpenseId) -> Result<ApprovalHistory, ApplicationError> {
        self.load_expense(expense_id).await?;
        self.load_history(expense_id).await
    }

    pub async fn rules(&self) -> Result<RuleCatalog, ApplicationError> {
        Ok(self.repositories.rules.load().await?)
    }

    pub async fn create_rule(
        &self,
        actor_id: &UserId,
        draft: RuleDraft,
        context: &AuditContext,
    ) -> Result<ApprovalRule, ApplicationError> {
        let _guard = self.rules_lock.lock().await;
        let actor = self.load_actor(actor_id).await?;
        let mut catalog = self.repositories.rules.load().await?;
        let rule = catalog.create(&actor, draft)?.clone();
        self.repositories.rules.store(catalog).await?;

        self.audit.emit(
            AuditEvent::new(None, context, "rules.created", AuditCategory::Rules, AuditOutcome::Success)
                .with_metadata("rule_id", rule.id.0.clone())
                .with_metadata("type", rule.rule_type.as_str()),
        );
        info!(
            event_name = "rules.created",
            correlation_id = %context.correlation_id,
            rule_id = %rule.id,
            actor_id = %actor_id,
            "approval rule created"
        );
        Ok(rule)
    }

    pub async fn delete_rule(
        &self,
        actor_id: &UserId,
        rule_id: &RuleId,
        context: &AuditContext,
    ) -> Result<ApprovalRule, ApplicationError> {
        let _guard = self.rules_lock.lock().await;
        let actor = self.load_actor(actor_id).await?;
        let mut catalog = self.repositories.rules.load().await?;
        let removed = catalog
            .delete(&actor, rule_id)?
            .ok_or_else(|| ApplicationError::NotFound { entity: "rule", id: rule_id.0.clone() })?;
        self.repositories.rules.store(catalog).await?;

        self.audit.emit(
            AuditEvent::new(None, context, "rules.deleted", AuditCategory::Rules, AuditOutcome::Success)
                .with_metadata("rule_id", removed.id.0.clone()),
        );
        info!(
            event_name = "rules.deleted",
            correlation_id = %context.correlation_id,
            rule_id = %removed.id,
            actor_id = %actor_id,
            "approval rule deleted"
        );
        Ok(removed)
    }

    /// Summarises every expense, or only those owned by `owner`.
    pub async fn dashboard(&self, owner: Option<&UserId>) -> Result<DashboardSummary, ApplicationError> {
        let expenses = self.repositories.expenses.list(owner, None).await?;
        let mut summary = DashboardSummary::default();
        for expense in &expenses {
            summary.record(expense);
        }
        Ok(summary)
    }

    async fn evaluator(&self) -> Result<RuleEvaluator, ApplicationError> {
        let users = self.repositories.users.list().await?;
        Ok(RuleEvaluator::new(users).with_settings(self.settings.evaluator.clone()))
    }

    fn resolve_actor<'e>(
        &self,
        evaluator: &'e RuleEvaluator,
        actor_id: &UserId,
    ) -> Result<&'e User, EvaluationError> {
        evaluator.user(actor_id).ok_or_else(|| unregistered(actor_id))
    }

    async fn load_actor(&self, actor_id: &UserId) -> Result<User, ApplicationError> {
        self.repositories
            .users
            .find_by_id(actor_id)
            .await?
            .ok_or_else(|| unregistered(actor_id).into())
    }

    async fn load_user(&self, user_id: &UserId) -> Result<User, ApplicationError> {
        self.repositories
            .users
            .find_by_id(user_id)
            .await?
            .ok_or_else(|| ApplicationError::NotFound { entity: "user", id: user_id.0.clone() })
    }

    async fn load_expense(&self, expense_id: &ExpenseId) -> Result<Expense, ApplicationError> {
        self.repositories
            .expenses
            .find_by_id(expense_id)
            .await?
            .ok_or_else(|| ApplicationError::NotFound { entity: "expense", id: expense_id.0.clone() })
    }

    async fn load_history(&self, expense_id: &ExpenseId) -> Result<ApprovalHistory, ApplicationError> {
        Ok(self
            .repositories
            .histories
            .find(expense_id)
            .await?
            .unwrap_or_else(|| ApprovalHistory::new(expense_id.clone())))
    }

    fn report_failure(
        &self,
        expense_id: &ExpenseId,
        actor_id: &UserId,
        context: &AuditContext,
        error: &EvaluationError,
    ) {
        let error_kind = match error {
            EvaluationError::Configuration { .. } => "configuration",
            EvaluationError::InvalidTransition { .. } => "invalid_transition",
            EvaluationError::UnauthorizedActor { .. } => "unauthorized_actor",
            EvaluationError::Domain(_) => "domain",
        };
        self.audit.emit(
            AuditEvent::new(
                Some(expense_id.clone()),
                context,
                "approval.evaluation_failed",
                AuditCategory::Approval,
                AuditOutcome::Failed,
            )
            .with_metadata("error_kind", error_kind)
            .with_metadata("error", error.to_string()),
        );
        warn!(
            event_name = "approval.evaluation_failed",
            correlation_id = %context.correlation_id,
            expense_id = %expense_id,
            actor_id = %actor_id,
            error_kind,
            error = %error,
            "approval action rejected"
        );
    }
}

fn unregistered(actor_id: &UserId) -> EvaluationError {
    EvaluationError::UnauthorizedActor {
        actor_id: actor_id.clone(),
        reason: "actor is not a registered user".to_string(),
    }
}

fn join_reasons(outcome: &EvaluationOutcome) -> String {
    outcome.reasons.iter().map(|reason| reason.0.as_str()).collect::<Vec<_>>().join(",")
}
