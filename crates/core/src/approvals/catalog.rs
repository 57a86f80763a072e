use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::rule::{ApprovalRule, RuleId, RuleType};
use crate::domain::user::{User, UserId};
use crate::errors::EvaluationError;

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("could not parse rule catalog: {0}")]
    Parse(#[from] toml::de::Error),
    #[error(transparent)]
    Invalid(#[from] EvaluationError),
}

/// Admin input for a new rule; the catalog assigns an id when none is given.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleDraft {
    #[serde(default)]
    pub id: Option<RuleId>,
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

/// The set of approval rules configured by admins.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleCatalog {
    #[serde(default)]
    rules: Vec<ApprovalRule>,
}

impl RuleCatalog {
    pub fn new(rules: Vec<ApprovalRule>) -> Result<Self, EvaluationError> {
        let mut catalog = Self::default();
        for rule in rules {
            catalog.insert(rule)?;
        }
        Ok(catalog)
    }

    /// Parses `[[rules]]` tables, validating each rule.
    pub fn from_toml_str(raw: &str) -> Result<Self, CatalogError> {
        let parsed: RuleCatalog = toml::from_str(raw)?;
        Ok(Self::new(parsed.rules)?)
    }

    pub fn rules(&self) -> &[ApprovalRule] {
        &self.rules
    }

    pub fn get(&self, id: &RuleId) -> Option<&ApprovalRule> {
        self.rules.iter().find(|rule| &rule.id == id)
    }

    pub fn by_type(&self, rule_type: RuleType) -> impl Iterator<Item = &ApprovalRule> {
        self.rules.iter().filter(move |rule| rule.rule_type == rule_type)
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn create(&mut self, actor: &User, draft: RuleDraft) -> Result<&ApprovalRule, EvaluationError> {
        ensure_admin(actor)?;
        let id = draft.id.unwrap_or_else(|| self.next_id());
        self.insert(ApprovalRule {
            id,
            name: draft.name,
            rule_type: draft.rule_type,
            threshold: draft.threshold,
            percentage: draft.percentage,
            approver_id: draft.approver_id,
            category: draft.category.filter(|category| !category.trim().is_empty()),
        })
    }

    /// Removes a rule; `Ok(None)` when no rule has that id.
    pub fn delete(
        &mut self,
        actor: &User,
        id: &RuleId,
    ) -> Result<Option<ApprovalRule>, EvaluationError> {
        ensure_admin(actor)?;
        let removed = self
            .rules
            .iter()
            .position(|rule| &rule.id == id)
            .map(|index| self.rules.remove(index));
        Ok(removed)
    }

    fn insert(&mut self, rule: ApprovalRule) -> Result<&ApprovalRule, EvaluationError> {
        if rule.name.trim().is_empty() {
            return Err(EvaluationError::Configuration {
                rule_id: rule.id,
                reason: "name must not be empty".to_string(),
            });
        }
        if self.get(&rule.id).is_some() {
            return Err(EvaluationError::Configuration {
                rule_id: rule.id,
                reason: "a rule with this id already exists".to_string(),
            });
        }
        rule.requirement()?;

        self.rules.push(rule);
        let index = self.rules.len() - 1;
        Ok(&self.rules[index])
    }

    fn next_id(&self) -> RuleId {
        let highest = self
            .rules
            .iter()
            .filter_map(|rule| rule.id.0.strip_prefix("rule-"))
            .filter_map(|suffix| suffix.parse::<u64>().ok())
            .max()
            .unwrap_or(0);
        RuleId(format!("rule-{}", highest + 1))
    }
}

fn ensure_admin(actor: &User) -> Result<(), EvaluationError> {
    if actor.role.can_manage_rules() {
        return Ok(());
    }
    Err(EvaluationError::UnauthorizedActor {
        actor_id: actor.id.clone(),
        reason: format!("role `{}` cannot manage approval rules", actor.role.as_str()),
    })
}
