use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::money::{format_amount, validate_amount, Currency};
use crate::domain::user::UserId;
use crate::errors::EvaluationError;

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RuleId(pub String);

impl std::fmt::Display for RuleId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleType {
    Percentage,
    Specific,
    Hybrid,
}

impl RuleType {
    pub const ALL: [RuleType; 3] = [RuleType::Percentage, RuleType::Specific, RuleType::Hybrid];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Percentage => "percentage",
            Self::Specific => "specific",
            Self::Hybrid => "hybrid",
        }
    }

    pub fn involves_quorum(self) -> bool {
        matches!(self, Self::Percentage | Self::Hybrid)
    }

    pub fn involves_specific_approver(self) -> bool {
        matches!(self, Self::Specific | Self::Hybrid)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalRule {
    pub id: RuleId,
    pub name: String,
    #[serde(rename = "type")]
    pub rule_type: RuleType,
    #[serde(default)]
    pub threshold: Option<Decimal>,
    #[serde(default)]
    pub percentage: Option<u8>,
    #[serde(default)]
    pub approver_id: Option<UserId>,
    #[serde(default)]
    pub category: Option<String>,
}

/// A rule whose type-specific fields have been checked and unpacked.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RuleRequirement<'a> {
    Quorum { threshold: Decimal, percentage: u8 },
    Specific { approver_id: &'a UserId },
    Hybrid { threshold: Decimal, percentage: u8, approver_id: &'a UserId },
}

impl<'a> RuleRequirement<'a> {
    pub fn threshold(&self) -> Option<Decimal> {
        match self {
            Self::Quorum { threshold, .. } | Self::Hybrid { threshold, .. } => Some(*threshold),
            Self::Specific { .. } => None,
        }
    }

    pub fn designated_approver(&self) -> Option<&'a UserId> {
        match *self {
            Self::Specific { approver_id } | Self::Hybrid { approver_id, .. } => Some(approver_id),
            Self::Quorum { .. } => None,
        }
    }
}

impl ApprovalRule {
    /// A rule with no category filter applies to every category.
    pub fn matches_category(&self, category: &str) -> bool {
        match &self.category {
            None => true,
            Some(filter) => normalize_category(filter) == normalize_category(category),
        }
    }

    pub fn requirement(&self) -> Result<RuleRequirement<'_>, EvaluationError> {
        let quorum = if self.rule_type.involves_quorum() {
            let threshold = self.threshold.ok_or_else(|| self.misconfigured("threshold is required"))?;
            validate_amount("threshold", threshold)
                .map_err(|error| self.misconfigured(error.to_string()))?;
            let percentage =
                self.percentage.ok_or_else(|| self.misconfigured("percentage is required"))?;
            if percentage > 100 {
                return Err(self.misconfigured(format!(
                    "percentage must be in range 0..=100, got {percentage}"
                )));
            }
            Some((threshold, percentage))
        } else {
            None
        };

        let approver_id = if self.rule_type.involves_specific_approver() {
            let approver_id =
                self.approver_id.as_ref().ok_or_else(|| self.misconfigured("approver_id is required"))?;
            if approver_id.0.trim().is_empty() {
                return Err(self.misconfigured("approver_id must not be blank"));
            }
            Some(approver_id)
        } else {
            None
        };

        match (self.rule_type, quorum, approver_id) {
            (RuleType::Percentage, Some((threshold, percentage)), _) => {
                Ok(RuleRequirement::Quorum { threshold, percentage })
            }
            (RuleType::Specific, _, Some(approver_id)) => {
                Ok(RuleRequirement::Specific { approver_id })
            }
            (RuleType::Hybrid, Some((threshold, percentage)), Some(approver_id)) => {
                Ok(RuleRequirement::Hybrid { threshold, percentage, approver_id })
            }
            _ => Err(self.misconfigured("rule fields do not match its type")),
        }
    }

    /// One-line summary used when listing rules.
    pub fn describe(&self, currency: Currency) -> String {
        let scope = match &self.category {
            Some(category) => format!(" in {category}"),
            None => String::new(),
        };
        let threshold = self
            .threshold
            .map(|threshold| format_amount(threshold, currency))
            .unwrap_or_else(|| "<unset>".to_string());
        let percentage =
            self.percentage.map(|value| value.to_string()).unwrap_or_else(|| "?".to_string());
        let approver =
            self.approver_id.as_ref().map(|id| id.0.as_str()).unwrap_or("<unset>").to_string();

        match self.rule_type {
            RuleType::Percentage => {
                format!("{percentage}% approval required for expenses{scope} above {threshold}")
            }
            RuleType::Specific => format!("sign-off by approver {approver} required{scope}"),
            RuleType::Hybrid => format!(
                "{percentage}% approval or sign-off by approver {approver} for expenses{scope} above {threshold}"
            ),
        }
    }

    fn misconfigured(&self, reason: impl Into<String>) -> EvaluationError {
        EvaluationError::Configuration { rule_id: self.id.clone(), reason: reason.into() }
    }
}

pub fn normalize_category(value: &str) -> String {
    value.trim().to_ascii_lowercase()
}

/// Whether `category` appears in `known`, ignoring case and surrounding whitespace.
pub fn is_known_category<S: AsRef<str>>(known: &[S], category: &str) -> bool {
    let key = normalize_category(category);
    known.iter().any(|candidate| normalize_category(candidate.as_ref()) == key)
}
