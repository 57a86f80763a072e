use std::collections::BTreeMap;

use tokio::sync::RwLock;

use claimly_core::approvals::RuleCatalog;
use claimly_core::domain::approval::ApprovalHistory;
use claimly_core::domain::expense::{Expense, ExpenseId, ExpenseStatus};
use claimly_core::domain::user::{User, UserId};

use super::{
    ApprovalHistoryRepository, ExpenseRepository, RepositoryError, RuleRepository,
    UserRepository,
};

#[derive(Default)]
pub struct InMemoryUserRepository {
    users: RwLock<BTreeMap<UserId, User>>,
}

#[async_trait::async_trait]
impl UserRepository for InMemoryUserRepository {
    async fn find_by_id(&self, id: &UserId) -> Result<Option<User>, RepositoryError> {
        let users = self.users.read().await;
        Ok(users.get(id).cloned())
    }

    async fn list(&self) -> Result<Vec<User>, RepositoryError> {
        let users = self.users.read().await;
        Ok(users.values().cloned().collect())
    }

    async fn save(&self, user: User) -> Result<(), RepositoryError> {
        let mut users = self.users.write().await;
        let email = user.email.trim().to_ascii_lowercase();
        let taken = users
            .values()
            .any(|existing| existing.id != user.id && existing.email.trim().to_ascii_lowercase() == email);
        if taken {
            return Err(RepositoryError::Conflict { entity: "user email", key: user.email });
        }
        users.insert(user.id.clone(), user);
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryExpenseRepository {
    expenses: RwLock<BTreeMap<ExpenseId, Expense>>,
}

#[async_trait::async_trait]
impl ExpenseRepository for InMemoryExpenseRepository {
    async fn find_by_id(&self, id: &ExpenseId) -> Result<Option<Expense>, RepositoryError> {
        let expenses = self.expenses.read().await;
        Ok(expenses.get(id).cloned())
    }

    async fn list(
        &self,
        employee_id: Option<&UserId>,
        status: Option<ExpenseStatus>,
    ) -> Result<Vec<Expense>, RepositoryError> {
        let expenses = self.expenses.read().await;
        Ok(expenses
            .values()
            .filter(|expense| employee_id.map_or(true, |owner| &expense.employee_id == owner))
            .filter(|expense| status.map_or(true, |status| expense.status == status))
            .cloned()
            .collect())
    }

    async fn save(&self, expense: Expense) -> Result<(), RepositoryError> {
        let mut expenses = self.expenses.write().await;
        expenses.insert(expense.id.clone(), expense);
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryRuleRepository {
    catalog: RwLock<RuleCatalog>,
}

#[async_trait::async_trait]
impl RuleRepository for InMemoryRuleRepository {
    async fn load(&self) -> Result<RuleCatalog, RepositoryError> {
        let catalog = self.catalog.read().await;
        Ok(catalog.clone())
    }

    async fn store(&self, catalog: RuleCatalog) -> Result<(), RepositoryError> {
        let mut current = self.catalog.write().await;
        *current = catalog;
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryApprovalHistoryRepository {
    histories: RwLock<BTreeMap<ExpenseId, ApprovalHistory>>,
}

#[async_trait::async_trait]
impl ApprovalHistoryRepository for InMemoryApprovalHistoryRepository {
    async fn find(
        &self,
        expense_id: &ExpenseId,
    ) -> Result<Option<ApprovalHistory>, RepositoryError> {
        let histories = self.histories.read().await;
        Ok(histories.get(expense_id).cloned())
    }

    async fn save(&self, history: ApprovalHistory) -> Result<(), RepositoryError> {
        let mut histories = self.histories.write().await;
        histories.insert(history.expense_id.clone(), history);
        Ok(())
    }
}
