use std::str::FromStr;

use chrono::{DateTime, NaiveDateTime, Utc};
use rust_decimal::Decimal;

use claimly_core::approvals::RuleCatalog;
use claimly_core::domain::approval::ApprovalHistory;
use claimly_core::domain::expense::{Expense, ExpenseId, ExpenseStatus};
use claimly_core::domain::money::Currency;
use claimly_core::domain::rule::{ApprovalRule, RuleId, RuleType};
use claimly_core::domain::user::{Role, User, UserId};

use crate::repositories::RepositoryError;
use crate::Repositories;

struct UserSeed {
    id: &'static str,
    name: &'static str,
    email: &'static str,
    role: Role,
    currency: Currency,
}

struct ExpenseSeed {
    id: &'static str,
    employee_id: &'static str,
    amount: &'static str,
    currency: Currency,
    category: &'static str,
    description: &'static str,
    date: &'static str,
    status: ExpenseStatus,
    approver_id: Option<&'static str>,
    approver_comment: Option<&'static str>,
    approved_at: Option<&'static str>,
}

struct RuleSeed {
    id: &'static str,
    name: &'static str,
    rule_type: RuleType,
    threshold: Option<&'static str>,
    percentage: Option<u8>,
    approver_id: Option<&'static str>,
    category: Option<&'static str>,
}

const DEMO_USERS: &[UserSeed] = &[
    UserSeed {
        id: "1",
        name: "Sarah Chen",
        email: "sarah.chen@company.com",
        role: Role::Admin,
        currency: Currency::Usd,
    },
    UserSeed {
        id: "2",
        name: "Michael Rodriguez",
        email: "michael.rodriguez@company.com",
        role: Role::Manager,
        currency: Currency::Usd,
    },
    UserSeed {
        id: "3",
        name: "Emily Johnson",
        email: "emily.johnson@company.com",
        role: Role::Employee,
        currency: Currency::Usd,
    },
    UserSeed {
        id: "4",
        name: "David Park",
        email: "david.park@company.com",
        role: Role::Employee,
        currency: Currency::Eur,
    },
    UserSeed {
        id: "5",
        name: "Lisa Thompson",
        email: "lisa.thompson@company.com",
        role: Role::Employee,
        currency: Currency::Gbp,
    },
];

const DEMO_EXPENSES: &[ExpenseSeed] = &[
    ExpenseSeed {
        id: "exp-1",
        employee_id: "3",
        amount: "245.50",
        currency: Currency::Usd,
        category: "Food",
        description: "Client dinner at Restaurant Le Bernardin",
        date: "2025-01-15T19:30:00",
        status: ExpenseStatus::Pending,
        approver_id: None,
        approver_comment: None,
        approved_at: None,
    },
    ExpenseSeed {
        id: "exp-2",
        employee_id: "3",
        amount: "1250.00",
        currency: Currency::Usd,
        category: "Travel",
        description: "Flight tickets to San Francisco for client meeting",
        date: "2025-01-10T08:00:00",
        status: ExpenseStatus::Approved,
        approver_id: Some("2"),
        approver_comment: Some("Approved for business development trip"),
        approved_at: Some("2025-01-12T10:00:00"),
    },
    ExpenseSeed {
        id: "exp-3",
        employee_id: "4",
        amount: "450.00",
        currency: Currency::Eur,
        category: "Miscellaneous",
        description: "Office supplies and equipment",
        date: "2025-01-08T14:20:00",
        status: ExpenseStatus::Approved,
        approver_id: Some("2"),
        approver_comment: Some("All items approved"),
        approved_at: Some("2025-01-09T09:15:00"),
    },
    ExpenseSeed {
        id: "exp-4",
        employee_id: "4",
        amount: "89.99",
        currency: Currency::Eur,
        category: "Food",
        description: "Team lunch meeting",
        date: "2025-01-20T12:30:00",
        status: ExpenseStatus::Pending,
        approver_id: None,
        approver_comment: None,
        approved_at: None,
    },
    ExpenseSeed {
        id: "exp-5",
        employee_id: "5",
        amount: "320.00",
        currency: Currency::Gbp,
        category: "Travel",
        description: "Taxi to airport and parking fees",
        date: "2025-01-05T06:00:00",
        status: ExpenseStatus::Rejected,
        approver_id: Some("2"),
        approver_comment: Some("Personal travel, not reimbursable"),
        approved_at: Some("2025-01-06T11:00:00"),
    },
    ExpenseSeed {
        id: "exp-6",
        employee_id: "3",
        amount: "75.00",
        currency: Currency::Usd,
        category: "Food",
        description: "Working lunch with vendor",
        date: "2025-01-22T13:00:00",
        status: ExpenseStatus::Draft,
        approver_id: None,
        approver_comment: None,
        approved_at: None,
    },
    ExpenseSeed {
        id: "exp-7",
        employee_id: "5",
        amount: "540.50",
        currency: Currency::Gbp,
        category: "Travel",
        description: "Hotel accommodation for conference",
        date: "2025-01-18T15:00:00",
        status: ExpenseStatus::Pending,
        approver_id: None,
        approver_comment: None,
        approved_at: None,
    },
    ExpenseSeed {
        id: "exp-8",
        employee_id: "4",
        amount: "199.99",
        currency: Currency::Eur,
        category: "Miscellaneous",
        description: "Software subscription renewal",
        date: "2025-01-12T10:00:00",
        status: ExpenseStatus::Approved,
        approver_id: Some("2"),
        approver_comment: Some("Business necessity approved"),
        approved_at: Some("2025-01-13T14:30:00"),
    },
];

const DEMO_RULES: &[RuleSeed] = &[
    RuleSeed {
        id: "rule-1",
        name: "Approval for miscellaneous expenses",
        rule_type: RuleType::Specific,
        threshold: None,
        percentage: None,
        approver_id: Some("2"),
        category: Some("Miscellaneous"),
    },
    RuleSeed {
        id: "rule-2",
        name: "Manager approval for expenses above $500",
        rule_type: RuleType::Percentage,
        threshold: Some("500.00"),
        percentage: Some(100),
        approver_id: None,
        category: None,
    },
    RuleSeed {
        id: "rule-3",
        name: "Hybrid rule for high-value travel",
        rule_type: RuleType::Hybrid,
        threshold: Some("1000.00"),
        percentage: Some(50),
        approver_id: Some("1"),
        category: Some("Travel"),
    },
];

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SeedResult {
    pub users: usize,
    pub expenses: usize,
    pub rules: usize,
    pub pending_expense_ids: Vec<ExpenseId>,
}

/// Deterministic demo data: five users, eight expenses and three approval rules.
pub struct DemoDataset;

impl DemoDataset {
    pub fn users() -> Vec<User> {
        DEMO_USERS
            .iter()
            .map(|seed| User {
                id: UserId(seed.id.to_string()),
                name: seed.name.to_string(),
                email: seed.email.to_string(),
                role: seed.role,
                currency: seed.currency,
            })
            .collect()
    }

    pub fn expenses() -> Result<Vec<Expense>, RepositoryError> {
        DEMO_EXPENSES.iter().map(expense_from_seed).collect()
    }

    pub fn rules() -> Result<Vec<ApprovalRule>, RepositoryError> {
        DEMO_RULES
            .iter()
            .map(|seed| {
                Ok(ApprovalRule {
                    id: RuleId(seed.id.to_string()),
                    name: seed.name.to_string(),
                    rule_type: seed.rule_type,
                    threshold: seed.threshold.map(parse_amount).transpose()?,
                    percentage: seed.percentage,
                    approver_id: seed.approver_id.map(|id| UserId(id.to_string())),
                    category: seed.category.map(str::to_string),
                })
            })
            .collect()
    }

    pub fn catalog() -> Result<RuleCatalog, RepositoryError> {
        RuleCatalog::new(Self::rules()?).map_err(|error| RepositoryError::Decode(error.to_string()))
    }

    /// Loads the dataset into `repositories`; reloading overwrites the same records.
    pub async fn load(repositories: &Repositories) -> Result<SeedResult, RepositoryError> {
        let users = Self::users();
        let expenses = Self::expenses()?;
        let catalog = Self::catalog()?;

        let result = SeedResult {
            users: users.len(),
            expenses: expenses.len(),
            rules: catalog.len(),
            pending_expense_ids: expenses
                .iter()
                .filter(|expense| expense.status == ExpenseStatus::Pending)
                .map(|expense| expense.id.clone())
                .collect(),
        };

        for user in users {
            repositories.users.save(user).await?;
        }
        for expense in expenses {
            repositories.histories.save(ApprovalHistory::new(expense.id.clone())).await?;
            repositories.expenses.save(expense).await?;
        }
        repositories.rules.store(catalog).await?;

        Ok(result)
    }
}

fn expense_from_seed(seed: &ExpenseSeed) -> Result<Expense, RepositoryError> {
    let expense = Expense {
        id: ExpenseId(seed.id.to_string()),
        employee_id: UserId(seed.employee_id.to_string()),
        amount: parse_amount(seed.amount)?,
        currency: seed.currency,
        category: seed.category.to_string(),
        description: Some(seed.description.to_string()),
        date: parse_timestamp(seed.date)?,
        status: seed.status,
        receipt_url: None,
        approver_id: seed.approver_id.map(|id| UserId(id.to_string())),
        approver_comment: seed.approver_comment.map(str::to_string),
        approved_at: seed.approved_at.map(parse_timestamp).transpose()?,
    };
    expense.validate().map_err(|error| RepositoryError::Decode(error.to_string()))?;
    Ok(expense)
}

fn parse_amount(raw: &str) -> Result<Decimal, RepositoryError> {
    Decimal::from_str(raw)
        .map_err(|error| RepositoryError::Decode(format!("invalid amount `{raw}`: {error}")))
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, RepositoryError> {
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S")
        .map(|naive| naive.and_utc())
        .map_err(|error| RepositoryError::Decode(format!("invalid timestamp `{raw}`: {error}")))
}

#[cfg(test)]
mod tests {
    use claimly_core::domain::expense::{ExpenseId, ExpenseStatus};
    use claimly_core::domain::rule::RuleType;

    use crate::Repositories;

    use super::DemoDataset;

    #[test]
    fn dataset_matches_expected_shape() {
        let expenses = DemoDataset::expenses().expect("expenses decode");
        assert_eq!(DemoDataset::users().len(), 5);
        assert_eq!(expenses.len(), 8);
        assert_eq!(
            expenses.iter().filter(|expense| expense.status == ExpenseStatus::Pending).count(),
            3
        );

        let catalog = DemoDataset::catalog().expect("rules are valid");
        assert_eq!(catalog.len(), 3);
        assert_eq!(catalog.by_type(RuleType::Hybrid).count(), 1);
    }

    #[tokio::test]
    async fn load_is_idempotent_across_runs() {
        let repositories = Repositories::in_memory();

        let first = DemoDataset::load(&repositories).await.expect("first load");
        let second = DemoDataset::load(&repositories).await.expect("second load");

        assert_eq!(first, second);
        assert_eq!(
            first.pending_expense_ids,
            vec![
                ExpenseId("exp-1".to_string()),
                ExpenseId("exp-4".to_string()),
                ExpenseId("exp-7".to_string()),
            ]
        );
        let stored = repositories.expenses.list(None, None).await.expect("list");
        assert_eq!(stored.len(), 8);
        let users = repositories.users.list().await.expect("list users");
        assert_eq!(users.len(), 5);
    }
}
