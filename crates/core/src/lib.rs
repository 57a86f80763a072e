pub mod approvals;
pub mod audit;
pub mod config;
pub mod domain;
pub mod errors;

pub use approvals::{
    CatalogError, EvaluationOutcome, EvaluatorSettings, RuleCatalog, RuleDraft, RuleEvaluation,
    RuleEvaluator, RuleStatus, DEFAULT_RULE_ID,
};
pub use audit::{AuditCategory, AuditContext, AuditEvent, AuditOutcome, AuditSink};
pub use domain::approval::{ApprovalAction, ApprovalDecision, ApprovalHistory};
pub use domain::expense::{Expense, ExpenseId, ExpenseStatus};
pub use domain::money::{format_amount, Currency};
pub use domain::rule::{ApprovalRule, RuleId, RuleRequirement, RuleType};
pub use domain::user::{Role, User, UserId};
pub use errors::{ApplicationError, DomainError, EvaluationError, InterfaceError};
