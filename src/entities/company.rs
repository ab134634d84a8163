//! Company entity - the tenant every business record belongs to

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::core::entity::Entity;
use crate::core::identity::{EntityId, EntityPrefix};

/// A company (tenant)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Company {
    pub id: EntityId,
    pub name: String,
    /// ISO 4217 currency code used for prices and costs
    pub base_currency: String,
    pub created: DateTime<Utc>,
}

impl Company {
    pub fn new(name: String, base_currency: String) -> Self {
        Self {
            id: EntityId::new(EntityPrefix::Comp),
            name,
            base_currency: base_currency.to_uppercase(),
            created: Utc::now(),
        }
    }
}

impl Entity for Company {
    const PREFIX: EntityPrefix = EntityPrefix::Comp;
    const TABLE: &'static str = "company";

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
    fn test_company_creation_normalizes_currency() {
        let company = Company::new("Acme Fabrication".to_string(), "usd".to_string());
        assert!(company.id.to_string().starts_with("COMP-"));
        assert_eq!(company.base_currency, "USD");
        assert_eq!(company.label(), "Acme Fabrication");
    }
}
