use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::money::{validate_amount, Currency};
use crate::domain::user::UserId;
use crate::errors::DomainError;

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ExpenseId(pub String);

impl std::fmt::Display for ExpenseId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExpenseStatus {
    #[default]
    Draft,
    Pending,
    Approved,
    Rejected,
}

impl ExpenseStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Approved | Self::Rejected)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Expense {
    pub id: ExpenseId,
    pub employee_id: UserId,
    pub amount: Decimal,
    pub currency: Currency,
    pub category: String,
    pub description: Option<String>,
    pub date: DateTime<Utc>,
    #[serde(default)]
    pub status: ExpenseStatus,
    #[serde(default)]
    pub receipt_url: Option<String>,
    #[serde(default)]
    pub approver_id: Option<UserId>,
    #[serde(default)]
    pub approver_comment: Option<String>,
    #[serde(default)]
    pub approved_at: Option<DateTime<Utc>>,
}

impl Expense {
    /// Builds a new draft claim after checking the amount invariants.
    pub fn draft(
        id: ExpenseId,
        employee_id: UserId,
        amount: Decimal,
        currency: Currency,
        category: impl Into<String>,
        date: DateTime<Utc>,
    ) -> Result<Self, DomainError> {
        let expense = Self {
            id,
            employee_id,
            amount,
            currency,
            category: category.into(),
            description: None,
            date,
            status: ExpenseStatus::Draft,
            receipt_url: None,
            approver_id: None,
            approver_comment: None,
            approved_at: None,
        };
        expense.validate()?;
        Ok(expense)
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn validate(&self) -> Result<(), DomainError> {
        validate_amount("expense.amount", self.amount)?;
        if self.category.trim().is_empty() {
            return Err(DomainError::InvariantViolation(
                "expense.category must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    pub fn can_transition_to(&self, next: ExpenseStatus) -> bool {
        matches!(
            (self.status, next),
            (ExpenseStatus::Draft, ExpenseStatus::Pending)
                | (ExpenseStatus::Pending, ExpenseStatus::Approved)
                | (ExpenseStatus::Pending, ExpenseStatus::Rejected)
        )
    }

    pub fn transition_to(&mut self, next: ExpenseStatus) -> Result<(), DomainError> {
        if self.can_transition_to(next) {
            self.status = next;
            return Ok(());
        }

        Err(DomainError::InvalidExpenseTransition { from: self.status, to: next })
    }

    pub fn submit(&mut self) -> Result<(), DomainError> {
        self.validate()?;
        self.transition_to(ExpenseStatus::Pending)
    }

    /// Moves a pending expense to its terminal status and stamps the deciding approver.
    pub fn conclude(
        &mut self,
        status: ExpenseStatus,
        approver_id: UserId,
        comment: Option<String>,
        decided_at: DateTime<Utc>,
    ) -> Result<(), DomainError> {
        if !status.is_terminal() {
            return Err(DomainError::InvalidExpenseTransition { from: self.status, to: status });
        }
        self.transition_to(status)?;
        self.approver_id = Some(approver_id);
        self.approver_comment = comment;
        self.approved_at = Some(decided_at);
        Ok(())
    }
}
