//! Approval-rule evaluation.
//!
//! A pending expense is matched against the configured [`ApprovalRule`]s and
//! the approver actions recorded so far. Applicable rules combine
//! conjunctively: every rule must approve for the expense to be approved and
//! any rule rejecting rejects the expense. When no rule applies, a single
//! decision from any eligible approver settles the expense.

pub mod catalog;

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::approval::{ApprovalAction, ApprovalDecision, ApprovalHistory};
use crate::domain::expense::{Expense, ExpenseId, ExpenseStatus};
use crate::domain::rule::{ApprovalRule, RuleId, RuleRequirement, RuleType};
use crate::domain::user::{User, UserId};
use crate::errors::{DomainError, EvaluationError};

pub use catalog::{CatalogError, RuleCatalog, RuleDraft};

/// Reason id reported when no configured rule applies to an expense.
pub const DEFAULT_RULE_ID: &str = "default";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleStatus {
    Pending,
    Approved,
    Rejected,
}

impl RuleStatus {
    /// Three-valued OR: approved if either side approves, rejected only if both reject.
    fn or(self, other: Self) -> Self {
        match (self, other) {
            (Self::Approved, _) | (_, Self::Approved) => Self::Approved,
            (Self::Rejected, Self::Rejected) => Self::Rejected,
            _ => Self::Pending,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
        }
    }

    pub fn as_expense_status(self) -> ExpenseStatus {
        match self {
            Self::Pending => ExpenseStatus::Pending,
            Self::Approved => ExpenseStatus::Approved,
            Self::Rejected => ExpenseStatus::Rejected,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleEvaluation {
    pub rule_id: RuleId,
    /// `None` for the implicit single-approver default.
    pub rule_type: Option<RuleType>,
    pub status: RuleStatus,
    pub approvals: usize,
    pub rejections: usize,
    pub eligible_approvers: usize,
    pub detail: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvaluationOutcome {
    pub expense_id: ExpenseId,
    pub status: ExpenseStatus,
    pub reasons: Vec<RuleId>,
    pub rules: Vec<RuleEvaluation>,
}

impl EvaluationOutcome {
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct EvaluatorSettings {
    /// Lets an approver act on an expense they own.
    pub allow_self_approval: bool,
}

/// Evaluates approval rules against the roster of known users.
#[derive(Clone, Debug, Default)]
pub struct RuleEvaluator {
    users: BTreeMap<UserId, User>,
    settings: EvaluatorSettings,
}

impl RuleEvaluator {
    pub fn new(users: impl IntoIterator<Item = User>) -> Self {
        let users = users.into_iter().map(|user| (user.id.clone(), user)).collect();
        Self { users, settings: EvaluatorSettings::default() }
    }

    pub fn with_settings(mut self, settings: EvaluatorSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn settings(&self) -> &EvaluatorSettings {
        &self.settings
    }

    pub fn user(&self, id: &UserId) -> Option<&User> {
        self.users.get(id)
    }

    /// Managers and admins on the roster, minus the owner unless self-approval is enabled.
    pub fn eligible_approvers(&self, expense: &Expense) -> BTreeSet<&UserId> {
        self.users
            .values()
            .filter(|user| user.can_approve())
            .filter(|user| self.settings.allow_self_approval || user.id != expense.employee_id)
            .map(|user| &user.id)
            .collect()
    }

    pub fn authorize(&self, expense: &Expense, actor: &User) -> Result<(), EvaluationError> {
        let unauthorized = |reason: String| EvaluationError::UnauthorizedActor {
            actor_id: actor.id.clone(),
            reason,
        };

        let Some(registered) = self.users.get(&actor.id) else {
            return Err(unauthorized("actor is not a registered user".to_string()));
        };

        if !actor.can_approve() || !registered.can_approve() {
            return Err(unauthorized(format!(
                "role `{}` cannot approve or reject expenses",
                registered.role.as_str()
            )));
        }

        if !self.settings.allow_self_approval && actor.id == expense.employee_id {
            return Err(unauthorized(format!(
                "approvers cannot act on their own expense `{}`",
                expense.id
            )));
        }

        Ok(())
    }

    /// Rules whose category filter and threshold gate admit `expense`.
    ///
    /// Every rule whose category matches is checked for completeness, so a
    /// misconfigured rule fails evaluation instead of being skipped. An
    /// applicable rule whose designated approver can never act on this
    /// expense is misconfigured too.
    pub fn applicable_rules<'r>(
        &self,
        expense: &Expense,
        rules: &'r [ApprovalRule],
    ) -> Result<Vec<(&'r ApprovalRule, RuleRequirement<'r>)>, EvaluationError> {
        let mut applicable = Vec::new();
        for rule in rules.iter().filter(|rule| rule.matches_category(&expense.category)) {
            let requirement = rule.requirement()?;
            let clears_threshold =
                requirement.threshold().map_or(true, |threshold| expense.amount >= threshold);
            if !clears_threshold {
                continue;
            }
            if let Some(approver_id) = requirement.designated_approver() {
                if let Some(reason) = self.designated_approver_issue(expense, approver_id) {
                    return Err(EvaluationError::Configuration { rule_id: rule.id.clone(), reason });
                }
            }
            applicable.push((rule, requirement));
        }
        Ok(applicable)
    }

    fn designated_approver_issue(&self, expense: &Expense, approver_id: &UserId) -> Option<String> {
        let Some(approver) = self.users.get(approver_id) else {
            return Some(format!("designated approver `{approver_id}` is not a registered user"));
        };
        if !approver.can_approve() {
            return Some(format!(
                "designated approver `{approver_id}` has role `{}` and cannot approve",
                approver.role.as_str()
            ));
        }
        if !self.settings.allow_self_approval && approver.id == expense.employee_id {
            return Some(format!(
                "designated approver `{approver_id}` owns expense `{}` and self-approval is disabled",
                expense.id
            ));
        }
        None
    }

    pub fn evaluate(
        &self,
        expense: &Expense,
        rules: &[ApprovalRule],
        history: &ApprovalHistory,
    ) -> Result<EvaluationOutcome, EvaluationError> {
        ensure_pending(expense)?;
        expense.validate()?;
        ensure_history_matches(expense, history)?;

        let eligible = self.eligible_approvers(expense);
        let counted: Vec<&ApprovalAction> = history
            .actions
            .iter()
            .filter(|action| eligible.contains(&action.approver_id))
            .collect();
        let tally = Tally::from_actions(&counted, eligible.len());

        let applicable = self.applicable_rules(expense, rules)?;
        if applicable.is_empty() {
            let evaluation = evaluate_default(&tally)?;
            return Ok(EvaluationOutcome {
                expense_id: expense.id.clone(),
                status: evaluation.status.as_expense_status(),
                reasons: vec![evaluation.rule_id.clone()],
                rules: vec![evaluation],
            });
        }

        let evaluations = applicable
            .into_iter()
            .map(|(rule, requirement)| evaluate_rule(rule, requirement, &counted, &tally))
            .collect::<Result<Vec<_>, _>>()?;

        let status = combine(&evaluations);
        let reasons = evaluations
            .iter()
            .filter(|evaluation| match status {
                RuleStatus::Approved => true,
                other => evaluation.status == other,
            })
            .map(|evaluation| evaluation.rule_id.clone())
            .collect();

        Ok(EvaluationOutcome {
            expense_id: expense.id.clone(),
            status: status.as_expense_status(),
            reasons,
            rules: evaluations,
        })
    }

    /// Returns `history` with `actor`'s decision recorded, replacing any earlier one.
    pub fn record_action(
        &self,
        expense: &Expense,
        history: &ApprovalHistory,
        actor: &User,
        decision: ApprovalDecision,
        comment: Option<String>,
        acted_at: DateTime<Utc>,
    ) -> Result<ApprovalHistory, EvaluationError> {
        ensure_pending(expense)?;
        self.authorize(expense, actor)?;
        ensure_history_matches(expense, history)?;

        let mut updated = history.clone();
        updated.upsert(ApprovalAction {
            approver_id: actor.id.clone(),
            decision,
            comment: comment.filter(|value| !value.trim().is_empty()),
            acted_at,
        });
        Ok(updated)
    }
}

#[derive(Clone, Copy, Debug)]
struct Tally {
    approvals: usize,
    rejections: usize,
    eligible: usize,
}

impl Tally {
    fn from_actions(actions: &[&ApprovalAction], eligible: usize) -> Self {
        let approvals =
            actions.iter().filter(|action| action.decision == ApprovalDecision::Approve).count();
        Self { approvals, rejections: actions.len() - approvals, eligible }
    }

    fn quorum(&self, rule_id: &RuleId, percentage: u8) -> Result<RuleStatus, EvaluationError> {
        if self.rejections > 0 {
            return Ok(RuleStatus::Rejected);
        }
        if percentage == 0 {
            return Ok(RuleStatus::Approved);
        }
        if self.eligible == 0 {
            return Err(EvaluationError::Configuration {
                rule_id: rule_id.clone(),
                reason: "no eligible approvers are available to reach the quorum".to_string(),
            });
        }

        let reached = self.approvals as u64 * 100 >= u64::from(percentage) * self.eligible as u64;
        Ok(if reached { RuleStatus::Approved } else { RuleStatus::Pending })
    }
}

fn ensure_pending(expense: &Expense) -> Result<(), EvaluationError> {
    if expense.status != ExpenseStatus::Pending {
        return Err(EvaluationError::InvalidTransition {
            expense_id: expense.id.clone(),
            status: expense.status,
        });
    }
    Ok(())
}

fn ensure_history_matches(
    expense: &Expense,
    history: &ApprovalHistory,
) -> Result<(), EvaluationError> {
    if history.expense_id != expense.id {
        return Err(DomainError::InvariantViolation(format!(
            "approval history for `{}` cannot be applied to expense `{}`",
            history.expense_id, expense.id
        ))
        .into());
    }
    Ok(())
}

fn evaluate_default(tally: &Tally) -> Result<RuleEvaluation, EvaluationError> {
    let rule_id = RuleId(DEFAULT_RULE_ID.to_string());
    if tally.eligible == 0 {
        return Err(EvaluationError::Configuration {
            rule_id,
            reason: "no eligible approvers are available to decide the expense".to_string(),
        });
    }

    let (status, detail) = if tally.rejections > 0 {
        (RuleStatus::Rejected, "rejected by an approver".to_string())
    } else if tally.approvals > 0 {
        (RuleStatus::Approved, "approved by an approver".to_string())
    } else {
        (RuleStatus::Pending, "awaiting a decision from any manager or admin".to_string())
    };

    Ok(RuleEvaluation {
        rule_id,
        rule_type: None,
        status,
        approvals: tally.approvals,
        rejections: tally.rejections,
        eligible_approvers: tally.eligible,
        detail,
    })
}

fn evaluate_rule(
    rule: &ApprovalRule,
    requirement: RuleRequirement<'_>,
    counted: &[&ApprovalAction],
    tally: &Tally,
) -> Result<RuleEvaluation, EvaluationError> {
    let (status, detail) = match requirement {
        RuleRequirement::Quorum { percentage, .. } => {
            let status = tally.quorum(&rule.id, percentage)?;
            (status, quorum_detail(status, percentage, tally))
        }
        RuleRequirement::Specific { approver_id } => {
            let status = designated_status(counted, approver_id);
            (status, designated_detail(status, approver_id))
        }
        RuleRequirement::Hybrid { percentage, approver_id, .. } => {
            let designated = designated_status(counted, approver_id);
            let quorum = tally.quorum(&rule.id, percentage)?;
            let status = designated.or(quorum);
            let detail = format!(
                "{}; {}",
                designated_detail(designated, approver_id),
                quorum_detail(quorum, percentage, tally)
            );
            (status, detail)
        }
    };

    Ok(RuleEvaluation {
        rule_id: rule.id.clone(),
        rule_type: Some(rule.rule_type),
        status,
        approvals: tally.approvals,
        rejections: tally.rejections,
        eligible_approvers: tally.eligible,
        detail,
    })
}

fn designated_status(counted: &[&ApprovalAction], approver_id: &UserId) -> RuleStatus {
    match counted.iter().find(|action| &action.approver_id == approver_id) {
        Some(action) if action.decision == ApprovalDecision::Approve => RuleStatus::Approved,
        Some(_) => RuleStatus::Rejected,
        None => RuleStatus::Pending,
    }
}

fn designated_detail(status: RuleStatus, approver_id: &UserId) -> String {
    match status {
        RuleStatus::Approved => format!("approved by designated approver {approver_id}"),
        RuleStatus::Rejected => format!("rejected by designated approver {approver_id}"),
        RuleStatus::Pending => format!("awaiting designated approver {approver_id}"),
    }
}

fn quorum_detail(status: RuleStatus, percentage: u8, tally: &Tally) -> String {
    match status {
        RuleStatus::Rejected => format!("{} rejection(s) recorded", tally.rejections),
        _ => format!(
            "{}/{} eligible approvals toward {percentage}% quorum",
            tally.approvals, tally.eligible
        ),
    }
}

fn combine(evaluations: &[RuleEvaluation]) -> RuleStatus {
    if evaluations.iter().any(|evaluation| evaluation.status == RuleStatus::Rejected) {
        RuleStatus::Rejected
    } else if evaluations.iter().all(|evaluation| evaluation.status == RuleStatus::Approved) {
        RuleStatus::Approved
    } else {
        RuleStatus::Pending
    }
}
