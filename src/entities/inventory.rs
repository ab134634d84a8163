//! Item ledger entries - every stock movement is an immutable ledger row

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::core::entity::Entity;
use crate::core::identity::{EntityId, EntityPrefix};

/// Default stocking location
pub const DEFAULT_LOCATION: &str = "MAIN";

/// Quantities closer than this are equal; absorbs rounding from
/// fractional shipments and receipts
pub const QUANTITY_TOLERANCE: f64 = 1e-9;

/// Reason for a stock movement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryType {
    PositiveAdjustment,
    NegativeAdjustment,
    PurchaseReceipt,
    SalesShipment,
}

impl EntryType {
    /// Entries that take stock out of a location
    pub fn is_outbound(&self) -> bool {
        matches!(self, EntryType::NegativeAdjustment | EntryType::SalesShipment)
    }
}

impl std::fmt::Display for EntryType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EntryType::PositiveAdjustment => write!(f, "positive_adjustment"),
            EntryType::NegativeAdjustment => write!(f, "negative_adjustment"),
            EntryType::PurchaseReceipt => write!(f, "purchase_receipt"),
            EntryType::SalesShipment => write!(f, "sales_shipment"),
        }
    }
}

impl std::str::FromStr for EntryType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "positive_adjustment" => Ok(EntryType::PositiveAdjustment),
            "negative_adjustment" => Ok(EntryType::NegativeAdjustment),
            "purchase_receipt" => Ok(EntryType::PurchaseReceipt),
            "sales_shipment" => Ok(EntryType::SalesShipment),
            _ => Err(format!("Unknown ledger entry type: {}", s)),
        }
    }
}

/// One stock movement. `quantity` is signed: outbound entries are negative.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub id: EntityId,
    pub company_id: EntityId,
    pub part_id: EntityId,
    pub location: String,
    pub entry_type: EntryType,
    pub quantity: f64,

    /// Order number or note the movement came from
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub document_ref: Option<String>,

    pub created_by: EntityId,
    pub created: DateTime<Utc>,
}

impl LedgerEntry {
    /// Build an entry; `quantity` is the unsigned amount moved
    pub fn new(
        company_id: EntityId,
        part_id: EntityId,
        location: &str,
        entry_type: EntryType,
        quantity: f64,
        document_ref: Option<String>,
        created_by: EntityId,
    ) -> Self {
        let signed = if entry_type.is_outbound() {
            -quantity.abs()
        } else {
            quantity.abs()
        };
        Self {
            id: EntityId::new(EntityPrefix::Ledg),
            company_id,
            part_id,
            location: location.to_uppercase(),
            entry_type,
            quantity: signed,
            document_ref,
            created_by,
            created: Utc::now(),
        }
    }
}

impl Entity for LedgerEntry {
    const PREFIX: EntityPrefix = EntityPrefix::Ledg;
    const TABLE: &'static str = "item_ledger";

    fn id(&self) -> &EntityId {
        &self.id
    }

    fn label(&self) -> &str {
        &self.location
    }
}

/// On-hand quantity of a part at one location
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StockLevel {
    pub part_id: EntityId,
    pub location: String,
    pub on_hand: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(entry_type: EntryType, qty: f64) -> LedgerEntry {
        LedgerEntry::new(
            EntityId::new(EntityPrefix::Comp),
            EntityId::new(EntityPrefix::Part),
            "main",
            entry_type,
            qty,
            None,
            EntityId::new(EntityPrefix::User),
        )
    }

    #[test]
    fn test_outbound_entries_are_negative() {
        assert_eq!(entry(EntryType::SalesShipment, 4.0).quantity, -4.0);
        assert_eq!(entry(EntryType::NegativeAdjustment, -2.0).quantity, -2.0);
    }

    #[test]
    fn test_inbound_entries_are_positive() {
        assert_eq!(entry(EntryType::PurchaseReceipt, 5.0).quantity, 5.0);
        assert_eq!(entry(EntryType::PositiveAdjustment, -1.5).quantity, 1.5);
    }

    #[test]
    fn test_location_is_uppercased() {
        assert_eq!(entry(EntryType::PurchaseReceipt, 1.0).location, "MAIN");
    }
}
