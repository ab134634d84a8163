//! Part entity - the item master for everything bought, made, or sold

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::core::entity::Entity;
use crate::core::identity::{EntityId, EntityPrefix};

/// Whether the part is stocked
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PartType {
    #[default]
    Inventory,
    NonInventory,
    Service,
}

impl PartType {
    /// Only inventory parts carry on-hand quantities
    pub fn is_stocked(&self) -> bool {
        matches!(self, PartType::Inventory)
    }
}

impl std::fmt::Display for PartType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PartType::Inventory => write!(f, "inventory"),
            PartType::NonInventory => write!(f, "non_inventory"),
            PartType::Service => write!(f, "service"),
        }
    }
}

impl std::str::FromStr for PartType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "inventory" => Ok(PartType::Inventory),
            "non_inventory" => Ok(PartType::NonInventory),
            "service" => Ok(PartType::Service),
            _ => Err(format!(
                "Invalid part type: {}. Use inventory, non_inventory, or service",
                s
            )),
        }
    }
}

/// How the part is replenished
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Replenishment {
    #[default]
    Buy,
    Make,
    BuyAndMake,
}

impl std::fmt::Display for Replenishment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Replenishment::Buy => write!(f, "buy"),
            Replenishment::Make => write!(f, "make"),
            Replenishment::BuyAndMake => write!(f, "buy_and_make"),
        }
    }
}

impl std::str::FromStr for Replenishment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "buy" => Ok(Replenishment::Buy),
            "make" => Ok(Replenishment::Make),
            "buy_and_make" => Ok(Replenishment::BuyAndMake),
            _ => Err(format!(
                "Invalid replenishment: {}. Use buy, make, or buy_and_make",
                s
            )),
        }
    }
}

/// A part in the item master
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Part {
    pub id: EntityId,
    pub company_id: EntityId,

    /// Human-readable part number, unique within the company
    pub part_number: String,

    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    pub part_type: PartType,
    pub replenishment: Replenishment,

    /// Unit of measure code (EA, KG, M, ...)
    pub unit_of_measure: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit_cost: Option<f64>,

    pub active: bool,
    pub created_by: EntityId,
    pub created: DateTime<Utc>,
}

impl Part {
    pub fn new(
        company_id: EntityId,
        part_number: String,
        name: String,
        part_type: PartType,
        replenishment: Replenishment,
        created_by: EntityId,
    ) -> Self {
        Self {
            id: EntityId::new(EntityPrefix::Part),
            company_id,
            part_number,
            name,
            description: None,
            part_type,
            replenishment,
            unit_of_measure: "EA".to_string(),
            unit_cost: None,
            active: true,
            created_by,
            created: Utc::now(),
        }
    }
}

impl Entity for Part {
    const PREFIX: EntityPrefix = EntityPrefix::Part;
    const TABLE: &'static str = "part";

    fn id(&self) -> &EntityId {
        &self.id
    }

    fn label(&self) -> &str {
        &self.part_number
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_part_defaults() {
        let part = Part::new(
            EntityId::new(EntityPrefix::Comp),
            "P-1001".to_string(),
            "Bracket".to_string(),
            PartType::Inventory,
            Replenishment::Make,
            EntityId::new(EntityPrefix::User),
        );
        assert_eq!(part.unit_of_measure, "EA");
        assert!(part.active);
        assert_eq!(part.label(), "P-1001");
    }

    #[test]
    fn test_part_type_accepts_dashes() {
        assert_eq!(
            "non-inventory".parse::<PartType>().unwrap(),
            PartType::NonInventory
        );
        assert_eq!(PartType::NonInventory.to_string(), "non_inventory");
        assert!(!PartType::Service.is_stocked());
    }

    #[test]
    fn test_replenishment_serialization() {
        let yaml = serde_yml::to_string(&Replenishment::BuyAndMake).unwrap();
        assert!(yaml.contains("buy_and_make"));
    }
}
