use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::expense::ExpenseId;
use crate::domain::user::UserId;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalDecision {
    Approve,
    Reject,
}

impl ApprovalDecision {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Approve => "approve",
            Self::Reject => "reject",
        }
    }
}

impl std::str::FromStr for ApprovalDecision {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "approve" | "approved" => Ok(Self::Approve),
            "reject" | "rejected" => Ok(Self::Reject),
            other => Err(format!("unsupported decision `{other}` (expected approve|reject)")),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalAction {
    pub approver_id: UserId,
    pub decision: ApprovalDecision,
    pub comment: Option<String>,
    pub acted_at: DateTime<Utc>,
}

/// Approver actions for one expense, at most one per approver, in first-acted order.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalHistory {
    pub expense_id: ExpenseId,
    pub actions: Vec<ApprovalAction>,
}

impl ApprovalHistory {
    pub fn new(expense_id: ExpenseId) -> Self {
        Self { expense_id, actions: Vec::new() }
    }

    /// Inserts `action`, replacing any earlier action by the same approver in place.
    pub fn upsert(&mut self, action: ApprovalAction) {
        match self.actions.iter_mut().find(|existing| existing.approver_id == action.approver_id)
        {
            Some(existing) => *existing = action,
            None => self.actions.push(action),
        }
    }

    pub fn action_by(&self, approver_id: &UserId) -> Option<&ApprovalAction> {
        self.actions.iter().find(|action| &action.approver_id == approver_id)
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    /// Most recent action; ties on `acted_at` resolve to the later entry.
    pub fn latest(&self) -> Option<&ApprovalAction> {
        self.actions.iter().enumerate().max_by_key(|(index, action)| (action.acted_at, *index)).map(
            |(_, action)| action,
        )
    }
}
