//! Sales order entity

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::core::entity::Entity;
use crate::core::identity::{EntityId, EntityPrefix};
use crate::entities::inventory::QUANTITY_TOLERANCE;

/// Sales order status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SalesOrderStatus {
    #[default]
    Draft,
    Confirmed,
    InProgress,
    Completed,
    Cancelled,
}

impl SalesOrderStatus {
    /// Orders that can still ship
    pub fn can_ship(&self) -> bool {
        matches!(self, SalesOrderStatus::Confirmed | SalesOrderStatus::InProgress)
    }
}

impl std::fmt::Display for SalesOrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SalesOrderStatus::Draft => write!(f, "draft"),
            SalesOrderStatus::Confirmed => write!(f, "confirmed"),
            SalesOrderStatus::InProgress => write!(f, "in_progress"),
            SalesOrderStatus::Completed => write!(f, "completed"),
            SalesOrderStatus::Cancelled => write!(f, "cancelled"),
        }
    }
}

impl std::str::FromStr for SalesOrderStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "draft" => Ok(SalesOrderStatus::Draft),
            "confirmed" => Ok(SalesOrderStatus::Confirmed),
            "in_progress" => Ok(SalesOrderStatus::InProgress),
            "completed" => Ok(SalesOrderStatus::Completed),
            "cancelled" | "canceled" => Ok(SalesOrderStatus::Cancelled),
            _ => Err(format!("Unknown sales order status: {}", s)),
        }
    }
}

/// A line on a sales order
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SalesOrderLine {
    pub id: EntityId,
    pub sales_order_id: EntityId,
    pub part_id: EntityId,
    pub description: String,
    pub quantity: f64,
    pub unit_price: f64,
    pub quantity_shipped: f64,
}

impl SalesOrderLine {
    pub fn new(
        sales_order_id: EntityId,
        part_id: EntityId,
        description: String,
        quantity: f64,
        unit_price: f64,
    ) -> Self {
        Self {
            id: EntityId::new(EntityPrefix::Slin),
            sales_order_id,
            part_id,
            description,
            quantity,
            unit_price,
            quantity_shipped: 0.0,
        }
    }

    pub fn remaining(&self) -> f64 {
        let remaining = self.quantity - self.quantity_shipped;
        if remaining <= QUANTITY_TOLERANCE {
            0.0
        } else {
            remaining
        }
    }

    /// Record a shipment, landing exactly on `quantity` when it covers
    /// what remains
    pub fn add_shipped(&mut self, quantity: f64) {
        if quantity >= self.remaining() - QUANTITY_TOLERANCE {
            self.quantity_shipped = self.quantity;
        } else {
            self.quantity_shipped += quantity;
        }
    }
}

/// A sales order
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SalesOrder {
    pub id: EntityId,
    pub company_id: EntityId,

    /// Number issued from the `salesOrder` sequence
    pub order_number: String,

    pub customer_id: EntityId,

    /// Quote this order was converted from
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quote_id: Option<EntityId>,

    pub status: SalesOrderStatus,
    pub order_date: NaiveDate,
    pub created_by: EntityId,
    pub created: DateTime<Utc>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub lines: Vec<SalesOrderLine>,
}

impl SalesOrder {
    pub fn new(
        company_id: EntityId,
        order_number: String,
        customer_id: EntityId,
        created_by: EntityId,
    ) -> Self {
        let created = Utc::now();
        Self {
            id: EntityId::new(EntityPrefix::Sord),
            company_id,
            order_number,
            customer_id,
            quote_id: None,
            status: SalesOrderStatus::Draft,
            order_date: created.date_naive(),
            created_by,
            created,
            lines: Vec::new(),
        }
    }

    pub fn total(&self) -> f64 {
        self.lines.iter().map(|l| l.quantity * l.unit_price).sum()
    }

    pub fn fully_shipped(&self) -> bool {
        !self.lines.is_empty() && self.lines.iter().all(|l| l.remaining() <= 0.0)
    }

    pub fn anything_shipped(&self) -> bool {
        self.lines.iter().any(|l| l.quantity_shipped > 0.0)
    }
}

impl Entity for SalesOrder {
    const PREFIX: EntityPrefix = EntityPrefix::Sord;
    const TABLE: &'static str = "sales_order";

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

    fn order_with_lines(shipped: &[(f64, f64)]) -> SalesOrder {
        let mut order = SalesOrder::new(
            EntityId::new(EntityPrefix::Comp),
            "SO000001".to_string(),
            EntityId::new(EntityPrefix::Cust),
            EntityId::new(EntityPrefix::User),
        );
        for (qty, done) in shipped {
            let mut line = SalesOrderLine::new(
                order.id.clone(),
                EntityId::new(EntityPrefix::Part),
                "line".to_string(),
                *qty,
                1.0,
            );
            line.quantity_shipped = *done;
            order.lines.push(line);
        }
        order
    }

    #[test]
    fn test_fully_shipped() {
        assert!(!order_with_lines(&[]).fully_shipped());
        assert!(!order_with_lines(&[(5.0, 5.0), (2.0, 1.0)]).fully_shipped());
        assert!(order_with_lines(&[(5.0, 5.0), (2.0, 2.0)]).fully_shipped());
    }

    #[test]
    fn test_fractional_shipments_complete_line() {
        let mut order = order_with_lines(&[(0.9, 0.0)]);
        order.lines[0].add_shipped(0.7);
        assert!(!order.fully_shipped());
        order.lines[0].add_shipped(0.2);
        assert_eq!(order.lines[0].quantity_shipped, 0.9);
        assert_eq!(order.lines[0].remaining(), 0.0);
        assert!(order.fully_shipped());

        // 0.7 + 0.2 falls just short of 0.9 in f64
        assert!(order_with_lines(&[(0.9, 0.7 + 0.2)]).fully_shipped());
    }

    #[test]
    fn test_anything_shipped() {
        assert!(!order_with_lines(&[(5.0, 0.0)]).anything_shipped());
        assert!(order_with_lines(&[(5.0, 0.0), (1.0, 0.5)]).anything_shipped());
    }

    #[test]
    fn test_status_roundtrip_text() {
        for status in [
            SalesOrderStatus::Draft,
            SalesOrderStatus::Confirmed,
            SalesOrderStatus::InProgress,
            SalesOrderStatus::Completed,
            SalesOrderStatus::Cancelled,
        ] {
            assert_eq!(status.to_string().parse::<SalesOrderStatus>().unwrap(), status);
        }
    }
}
