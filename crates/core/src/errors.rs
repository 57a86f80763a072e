use thiserror::Error;

use crate::domain::expense::{ExpenseId, ExpenseStatus};
use crate::domain::rule::RuleId;
use crate::domain::user::UserId;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DomainError {
    #[error("invalid expense transition from {from:?} to {to:?}")]
    InvalidExpenseTransition { from: ExpenseStatus, to: ExpenseStatus },
    #[error("domain invariant violation: {0}")]
    InvariantViolation(String),
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum EvaluationError {
    #[error("rule `{rule_id}` is misconfigured: {reason}")]
    Configuration { rule_id: RuleId, reason: String },
    #[error("expense `{expense_id}` is {status:?}; only pending expenses can be evaluated")]
    InvalidTransition { expense_id: ExpenseId, status: ExpenseStatus },
    #[error("actor `{actor_id}` is not authorized: {reason}")]
    UnauthorizedActor { actor_id: UserId, reason: String },
    #[error(transparent)]
    Domain(#[from] DomainError),
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ApplicationError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error(transparent)]
    Evaluation(#[from] EvaluationError),
    #[error("{entity} `{id}` was not found")]
    NotFound { entity: &'static str, id: String },
    #[error("persistence failure: {0}")]
    Persistence(String),
    #[error("configuration failure: {0}")]
    Configuration(String),
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum InterfaceError {
    #[error("bad request: {message}")]
    BadRequest { message: String, correlation_id: String },
    #[error("forbidden: {message}")]
    Forbidden { message: String, correlation_id: String },
    #[error("not found: {message}")]
    NotFound { message: String, correlation_id: String },
    #[error("service unavailable: {message}")]
    ServiceUnavailable { message: String, correlation_id: String },
    #[error("internal error: {message}")]
    Internal { message: String, correlation_id: String },
}

impl InterfaceError {
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::BadRequest { .. } => {
                "The request could not be processed. Check inputs and try again."
            }
            Self::Forbidden { .. } => "You are not allowed to perform this action.",
            Self::NotFound { .. } => "The requested record does not exist.",
            Self::ServiceUnavailable { .. } => {
                "The service is temporarily unavailable. Please retry shortly."
            }
            Self::Internal { .. } => "An unexpected internal error occurred.",
        }
    }

    /// Stable machine-readable class used in CLI payloads.
    pub fn error_class(&self) -> &'static str {
        match self {
            Self::BadRequest { .. } => "bad_request",
            Self::Forbidden { .. } => "forbidden",
            Self::NotFound { .. } => "not_found",
            Self::ServiceUnavailable { .. } => "service_unavailable",
            Self::Internal { .. } => "internal",
        }
    }
}

impl ApplicationError {
    pub fn into_interface(self, correlation_id: impl Into<String>) -> InterfaceError {
        let correlation_id = correlation_id.into();
        let mut mapped = InterfaceError::from(self);
        match &mut mapped {
            InterfaceError::BadRequest { correlation_id: id, .. }
            | InterfaceError::Forbidden { correlation_id: id, .. }
            | InterfaceError::NotFound { correlation_id: id, .. }
            | InterfaceError::ServiceUnavailable { correlation_id: id, .. }
            | InterfaceError::Internal { correlation_id: id, .. } => *id = correlation_id,
        }
        mapped
    }
}

impl From<ApplicationError> for InterfaceError {
    fn from(value: ApplicationError) -> Self {
        let unassigned = || "unassigned".to_owned();
        match value {
            ApplicationError::Domain(error)
            | ApplicationError::Evaluation(EvaluationError::Domain(error)) => {
                Self::BadRequest { message: error.to_string(), correlation_id: unassigned() }
            }
            ApplicationError::Evaluation(error @ EvaluationError::InvalidTransition { .. }) => {
                Self::BadRequest { message: error.to_string(), correlation_id: unassigned() }
            }
            ApplicationError::Evaluation(error @ EvaluationError::UnauthorizedActor { .. }) => {
                Self::Forbidden { message: error.to_string(), correlation_id: unassigned() }
            }
            ApplicationError::Evaluation(error @ EvaluationError::Configuration { .. }) => {
                Self::Internal { message: error.to_string(), correlation_id: unassigned() }
            }
            error @ ApplicationError::NotFound { .. } => {
                Self::NotFound { message: error.to_string(), correlation_id: unassigned() }
            }
            ApplicationError::Persistence(message) => {
                Self::ServiceUnavailable { message, correlation_id: unassigned() }
            }
            ApplicationError::Configuration(message) => {
                Self::Internal { message, correlation_id: unassigned() }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::domain::expense::{ExpenseId, ExpenseStatus};
    use crate::domain::rule::RuleId;
    use crate::domain::user::UserId;
    use crate::errors::{ApplicationError, DomainError, EvaluationError, InterfaceError};

    #[test]
    fn domain_error_maps_to_bad_request_interface_error() {
        let interface = ApplicationError::from(DomainError::InvariantViolation(
            "expense.amount must be >= 0".to_owned(),
        ))
        .into_interface("req-1");

        assert!(matches!(
            interface,
            InterfaceError::BadRequest {
                ref correlation_id,
                ..
            } if correlation_id == "req-1"
        ));
        assert_eq!(
            interface.user_message(),
            "The request could not be processed. Check inputs and try again."
        );
    }

    #[test]
    fn unauthorized_actor_maps_to_forbidden() {
        let interface = ApplicationError::from(EvaluationError::UnauthorizedActor {
            actor_id: UserId("3".to_owned()),
            reason: "role `employee` cannot approve expenses".to_owned(),
        })
        .into_interface("req-2");

        assert!(matches!(interface, InterfaceError::Forbidden { .. }));
        assert_eq!(interface.error_class(), "forbidden");
    }

    #[test]
    fn invalid_transition_maps_to_bad_request() {
        let interface = ApplicationError::from(EvaluationError::InvalidTransition {
            expense_id: ExpenseId("exp-2".to_owned()),
            status: ExpenseStatus::Approved,
        })
        .into_interface("req-3");

        assert!(matches!(interface, InterfaceError::BadRequest { ref message, .. }
            if message.contains("exp-2")));
    }

    #[test]
    fn rule_configuration_error_maps_to_internal() {
        let interface = ApplicationError::from(EvaluationError::Configuration {
            rule_id: RuleId("rule-9".to_owned()),
            reason: "approver_id is required".to_owned(),
        })
        .into_interface("req-4");

        assert!(matches!(interface, InterfaceError::Internal { .. }));
        assert_eq!(interface.user_message(), "An unexpected internal error occurred.");
    }

    #[test]
    fn missing_record_maps_to_not_found() {
        let interface =
            ApplicationError::NotFound { entity: "expense", id: "exp-404".to_owned() }
                .into_interface("req-5");

        assert!(matches!(interface, InterfaceError::NotFound { ref message, .. }
            if message == "expense `exp-404` was not found"));
    }

    #[test]
    fn persistence_error_maps_to_service_unavailable() {
        let interface =
            ApplicationError::Persistence("store lock poisoned".to_owned()).into_interface("req-6");

        assert!(matches!(interface, InterfaceError::ServiceUnavailable { .. }));
        assert_eq!(
            interface.user_message(),
            "The service is temporarily unavailable. Please retry shortly."
        );
    }
}
