//! Purchase order entity

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::core::entity::Entity;
use crate::core::identity::{EntityId, EntityPrefix};
use crate::entities::inventory::QUANTITY_TOLERANCE;

/// Purchase order status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PurchaseOrderStatus {
    #[default]
    Draft,
    ToReceive,
    Completed,
    Cancelled,
}

impl std::fmt::Display for PurchaseOrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PurchaseOrderStatus::Draft => write!(f, "draft"),
            PurchaseOrderStatus::ToReceive => write!(f, "to_receive"),
            PurchaseOrderStatus::Completed => write!(f, "completed"),
            PurchaseOrderStatus::Cancelled => write!(f, "cancelled"),
        }
    }
}

impl std::str::FromStr for PurchaseOrderStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "draft" => Ok(PurchaseOrderStatus::Draft),
            "to_receive" => Ok(PurchaseOrderStatus::ToReceive),
            "completed" => Ok(PurchaseOrderStatus::Completed),
            "cancelled" | "canceled" => Ok(PurchaseOrderStatus::Cancelled),
            _ => Err(format!("Unknown purchase order status: {}", s)),
        }
    }
}

/// A line on a purchase order
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PurchaseOrderLine {
    pub id: EntityId,
    pub purchase_order_id: EntityId,
    pub part_id: EntityId,
    pub description: String,
    pub quantity: f64,
    pub unit_price: f64,
    pub quantity_received: f64,
}

impl PurchaseOrderLine {
    pub fn new(
        purchase_order_id: EntityId,
        part_id: EntityId,
        description: String,
        quantity: f64,
        unit_price: f64,
    ) -> Self {
        Self {
            id: EntityId::new(EntityPrefix::Plin),
            purchase_order_id,
            part_id,
            description,
            quantity,
            unit_price,
            quantity_received: 0.0,
        }
    }

    pub fn outstanding(&self) -> f64 {
        let outstanding = self.quantity - self.quantity_received;
        if outstanding <= QUANTITY_TOLERANCE {
            0.0
        } else {
            outstanding
        }
    }

    /// Record a receipt, landing exactly on `quantity` when it covers
    /// what is outstanding
    pub fn add_received(&mut self, quantity: f64) {
        if quantity >= self.outstanding() - QUANTITY_TOLERANCE {
            self.quantity_received = self.quantity;
        } else {
            self.quantity_received += quantity;
        }
    }
}

/// A purchase order
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PurchaseOrder {
    pub id: EntityId,
    pub company_id: EntityId,

    /// Number issued from the `purchaseOrder` sequence
    pub order_number: String,

    pub supplier_id: EntityId,
    pub status: PurchaseOrderStatus,
    pub order_date: NaiveDate,
    pub created_by: EntityId,
    pub created: DateTime<Utc>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub lines: Vec<PurchaseOrderLine>,
}

impl PurchaseOrder {
    pub fn new(
        company_id: EntityId,
        order_number: String,
        supplier_id: EntityId,
        created_by: EntityId,
    ) -> Self {
        let created = Utc::now();
        Self {
            id: EntityId::new(EntityPrefix::Pord),
            company_id,
            order_number,
            supplier_id,
            status: PurchaseOrderStatus::Draft,
            order_date: created.date_naive(),
            created_by,
            created,
            lines: Vec::new(),
        }
    }

    pub fn total(&self) -> f64 {
        self.lines.iter().map(|l| l.quantity * l.unit_price).sum()
    }

    pub fn fully_received(&self) -> bool {
        !self.lines.is_empty() && self.lines.iter().all(|l| l.outstanding() <= 0.0)
    }

    pub fn anything_received(&self) -> bool {
        self.lines.iter().any(|l| l.quantity_received > 0.0)
    }
}

impl Entity for PurchaseOrder {
    const PREFIX: EntityPrefix = EntityPrefix::Pord;
    const TABLE: &'static str = "purchase_order";

    fn id(&self) -> &EntityId {
        &self.id
    }

    fn label(&self) -> &str {
        &self.order_number
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outstanding_never_negative() {
        let mut line = PurchaseOrderLine::new(
            EntityId::new(EntityPrefix::Pord),
            EntityId::new(EntityPrefix::Part),
            "bar stock".to_string(),
            10.0,
            3.0,
        );
        assert_eq!(line.outstanding(), 10.0);
        line.quantity_received = 12.0;
        assert_eq!(line.outstanding(), 0.0);
    }

    #[test]
    fn test_fractional_receipts_close_line() {
        let mut line = PurchaseOrderLine::new(
            EntityId::new(EntityPrefix::Pord),
            EntityId::new(EntityPrefix::Part),
            "sheet".to_string(),
            0.3,
            8.0,
        );
        line.add_received(0.1);
        line.add_received(0.1);
        assert!(line.outstanding() > 0.0);
        line.add_received(0.1);
        assert_eq!(line.quantity_received, 0.3);
        assert_eq!(line.outstanding(), 0.0);
    }

    #[test]
    fn test_empty_order_is_not_received() {
        let po = PurchaseOrder::new(
            EntityId::new(EntityPrefix::Comp),
            "PO000001".to_string(),
            EntityId::new(EntityPrefix::Supp),
            EntityId::new(EntityPrefix::User),
        );
        assert!(!po.fully_received());
        assert!(!po.anything_received());
        assert_eq!(po.status, PurchaseOrderStatus::Draft);
    }
}
