//! User, employee and employee type entities

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::core::entity::Entity;
use crate::core::identity::{EntityId, EntityPrefix};
use crate::core::permissions::PermissionSet;

/// Kind of account; gates which parts of the ERP a user can reach
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum UserType {
    #[default]
    Employee,
    Customer,
    Supplier,
}

impl std::fmt::Display for UserType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UserType::Employee => write!(f, "employee"),
            UserType::Customer => write!(f, "customer"),
            UserType::Supplier => write!(f, "supplier"),
        }
    }
}

impl std::str::FromStr for UserType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "employee" => Ok(UserType::Employee),
            "customer" => Ok(UserType::Customer),
            "supplier" => Ok(UserType::Supplier),
            _ => Err(format!(
                "Invalid user type: {}. Use employee, customer, or supplier",
                s
            )),
        }
    }
}

/// A user account. Users are global; company access comes from permissions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: EntityId,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub user_type: UserType,
    pub active: bool,
    pub created: DateTime<Utc>,
}

impl User {
    pub fn new(email: &str, first_name: String, last_name: String, user_type: UserType) -> Self {
        Self {
            id: EntityId::new(EntityPrefix::User),
            email: email.trim().to_lowercase(),
            first_name,
            last_name,
            user_type,
            active: true,
            created: Utc::now(),
        }
    }

    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
            .trim()
            .to_string()
    }
}

impl Entity for User {
    const PREFIX: EntityPrefix = EntityPrefix::User;
    const TABLE: &'static str = "users";

    fn id(&self) -> &EntityId {
        &self.id
    }

    fn label(&self) -> &str {
        &self.email
    }
}

/// Employee type: a named permission template within a company
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmployeeType {
    pub id: EntityId,
    pub company_id: EntityId,
    pub name: String,
    pub permissions: PermissionSet,
}

impl EmployeeType {
    pub fn new(company_id: EntityId, name: String, permissions: PermissionSet) -> Self {
        Self {
            id: EntityId::new(EntityPrefix::Etyp),
            company_id,
            name,
            permissions,
        }
    }
}

impl Entity for EmployeeType {
    const PREFIX: EntityPrefix = EntityPrefix::Etyp;
    const TABLE: &'static str = "employee_type";

    fn id(&self) -> &EntityId {
        &self.id
    }

    fn label(&self) -> &str {
        &self.name
    }
}

/// Membership of a user in a company as an employee
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Employee {
    pub user_id: EntityId,
    pub company_id: EntityId,
    pub employee_type_id: EntityId,
}
