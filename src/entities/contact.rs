//! Customer and Supplier entities - the trading partners of a company

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::core::entity::Entity;
use crate::core::identity::{EntityId, EntityPrefix};

/// Fields shared by customers and suppliers
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ContactDetails {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tax_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
}

/// A customer that receives quotes and sales orders
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Customer {
    pub id: EntityId,
    pub company_id: EntityId,
    pub name: String,
    #[serde(flatten)]
    pub details: ContactDetails,
    pub active: bool,
    pub created_by: EntityId,
    pub created: DateTime<Utc>,
}

impl Customer {
    pub fn new(
        company_id: EntityId,
        name: String,
        details: ContactDetails,
        created_by: EntityId,
    ) -> Self {
        Self {
            id: EntityId::new(EntityPrefix::Cust),
            company_id,
            name,
            details,
            active: true,
            created_by,
            created: Utc::now(),
        }
    }
}

impl Entity for Customer {
    const PREFIX: EntityPrefix = EntityPrefix::Cust;
    const TABLE: &'static str = "customer";

    fn id(&self) -> &EntityId {
        &self.id
    }

    fn label(&self) -> &str {
        &self.name
    }
}

/// A supplier that receives purchase orders
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Supplier {
    pub id: EntityId,
    pub company_id: EntityId,
    pub name: String,
    #[serde(flatten)]
    pub details: ContactDetails,
    pub active: bool,
    pub created_by: EntityId,
    pub created: DateTime<Utc>,
}

impl Supplier {
    pub fn new(
        company_id: EntityId,
        name: String,
        details: ContactDetails,
        created_by: EntityId,
    ) -> Self {
        Self {
            id: EntityId::new(EntityPrefix::Supp),
            company_id,
            name,
            details,
            active: true,
            created_by,
            created: Utc::now(),
        }
    }
}

impl Entity for Supplier {
    const PREFIX: EntityPrefix = EntityPrefix::Supp;
    const TABLE: &'static str = "supplier";

    fn id(&self) -> &EntityId {
        &self.id
    }

    fn label(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_customer_serializes_flat_details() {
        let customer = Customer::new(
            EntityId::new(EntityPrefix::Comp),
            "Northwind".to_string(),
            ContactDetails {
                email: Some("buyer@northwind.test".to_string()),
                ..Default::default()
            },
            EntityId::new(EntityPrefix::User),
        );

        let json = serde_json::to_value(&customer).unwrap();
        assert_eq!(json["email"], "buyer@northwind.test");
        assert!(json.get("tax_id").is_none());
        assert!(json.get("details").is_none());
    }
}
