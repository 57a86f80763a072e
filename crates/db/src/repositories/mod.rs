use async_trait::async_trait;
use thiserror::Error;

use claimly_core::approvals::RuleCatalog;
use claimly_core::domain::approval::ApprovalHistory;
use claimly_core::domain::expense::{Expense, ExpenseId, ExpenseStatus};
use claimly_core::domain::user::{User, UserId};
use claimly_core::errors::ApplicationError;

pub mod memory;

pub use memory::{
    InMemoryApprovalHistoryRepository, InMemoryExpenseRepository, InMemoryRuleRepository,
    InMemoryUserRepository,
};

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("{entity} conflict on `{key}`")]
    Conflict { entity: &'static str, key: String },
    #[error("decode error: {0}")]
    Decode(String),
}

impl From<RepositoryError> for ApplicationError {
    fn from(value: RepositoryError) -> Self {
        ApplicationError::Persistence(value.to_string())
    }
}

#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn find_by_id(&self, id: &UserId) -> Result<Option<User>, RepositoryError>;
    async fn list(&self) -> Result<Vec<User>, RepositoryError>;
    async fn save(&self, user: User) -> Result<(), RepositoryError>;
}

#[async_trait]
pub trait ExpenseRepository: Send + Sync {
    async fn find_by_id(&self, id: &ExpenseId) -> Result<Option<Expense>, RepositoryError>;
    async fn list(
        &self,
        employee_id: Option<&UserId>,
        status: Option<ExpenseStatus>,
    ) -> Result<Vec<Expense>, RepositoryError>;
    async fn save(&self, expense: Expense) -> Result<(), RepositoryError>;
}

#[async_trait]
pub trait RuleRepository: Send + Sync {
    async fn load(&self) -> Result<RuleCatalog, RepositoryError>;
    async fn store(&self, catalog: RuleCatalog) -> Result<(), RepositoryError>;
}

#[async_trait]
pub trait ApprovalHistoryRepository: Send + Sync {
    async fn find(&self, expense_id: &ExpenseId)
        -> Result<Option<ApprovalHistory>, RepositoryError>;
    async fn save(&self, history: ApprovalHistory) -> Result<(), RepositoryError>;
}
