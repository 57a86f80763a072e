use serde::{Deserialize, Serialize};

use crate::domain::money::Currency;

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UserId(pub String);

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Employee,
    Manager,
    Admin,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Employee => "employee",
            Self::Manager => "manager",
            Self::Admin => "admin",
        }
    }

    /// Managers and admins may approve or reject expenses.
    pub fn can_approve(self) -> bool {
        matches!(self, Self::Manager | Self::Admin)
    }

    pub fn can_manage_rules(self) -> bool {
        matches!(self, Self::Admin)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub name: String,
    pub email: String,
    pub role: Role,
    pub currency: Currency,
}

impl User {
    pub fn can_approve(&self) -> bool {
        self.role.can_approve()
    }
}

#[cfg(test)]
mod tests {
    use super::Role;

    #[test]
    fn only_managers_and_admins_approve() {
        assert!(!Role::Employee.can_approve());
        assert!(Role::Manager.can_approve());
        assert!(Role::Admin.can_approve());
        assert!(!Role::Manager.can_manage_rules());
        assert!(Role::Admin.can_manage_rules());
    }
}
