//! Quote entity - a priced offer to a customer that may become a sales order

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::core::entity::Entity;
use crate::core::identity::{EntityId, EntityPrefix};

/// Quote lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum QuoteStatus {
    #[default]
    Draft,
    Sent,
    Ordered,
    Lost,
    Cancelled,
    Expired,
}

impl QuoteStatus {
    /// Statuses from which a quote can still be converted or edited
    pub fn is_open(&self) -> bool {
        matches!(self, QuoteStatus::Draft | QuoteStatus::Sent)
    }
}

impl std::fmt::Display for QuoteStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            QuoteStatus::Draft => write!(f, "draft"),
            QuoteStatus::Sent => write!(f, "sent"),
            QuoteStatus::Ordered => write!(f, "ordered"),
            QuoteStatus::Lost => write!(f, "lost"),
            QuoteStatus::Cancelled => write!(f, "cancelled"),
            QuoteStatus::Expired => write!(f, "expired"),
        }
    }
}

impl std::str::FromStr for QuoteStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "draft" => Ok(QuoteStatus::Draft),
            "sent" => Ok(QuoteStatus::Sent),
            "ordered" => Ok(QuoteStatus::Ordered),
            "lost" => Ok(QuoteStatus::Lost),
            "cancelled" | "canceled" => Ok(QuoteStatus::Cancelled),
            "expired" => Ok(QuoteStatus::Expired),
            _ => Err(format!("Unknown quote status: {}", s)),
        }
    }
}

/// A priced line on a quote
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuoteLine {
    pub id: EntityId,
    pub quote_id: EntityId,
    pub part_id: EntityId,
    pub description: String,
    pub quantity: f64,
    pub unit_price: f64,
}

impl QuoteLine {
    pub fn new(
        quote_id: EntityId,
        part_id: EntityId,
        description: String,
        quantity: f64,
        unit_price: f64,
    ) -> Self {
        Self {
            id: EntityId::new(EntityPrefix::Qlin),
            quote_id,
            part_id,
            description,
            quantity,
            unit_price,
        }
    }

    pub fn extended_price(&self) -> f64 {
        self.quantity * self.unit_price
    }
}

/// A sales quote
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Quote {
    pub id: EntityId,
    pub company_id: EntityId,

    /// Number issued from the `quote` sequence
    pub quote_number: String,

    pub customer_id: EntityId,
    pub name: String,
    pub status: QuoteStatus,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiration_date: Option<NaiveDate>,

    /// Set once the quote has been converted
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sales_order_id: Option<EntityId>,

    pub created_by: EntityId,
    pub created: DateTime<Utc>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub lines: Vec<QuoteLine>,
}

impl Quote {
    pub fn new(
        company_id: EntityId,
        quote_number: String,
        customer_id: EntityId,
        name: String,
        expiration_date: Option<NaiveDate>,
        created_by: EntityId,
    ) -> Self {
        Self {
            id: EntityId::new(EntityPrefix::Quot),
            company_id,
            quote_number,
            customer_id,
            name,
            status: QuoteStatus::Draft,
            expiration_date,
            sales_order_id: None,
            created_by,
            created: Utc::now(),
            lines: Vec::new(),
        }
    }

    /// Sum of all extended line prices
    pub fn total(&self) -> f64 {
        self.lines.iter().map(QuoteLine::extended_price).sum()
    }

    /// A sent quote past its expiration date
    pub fn is_overdue(&self, today: NaiveDate) -> bool {
        self.status == QuoteStatus::Sent
            && self.expiration_date.is_some_and(|d| d < today)
    }
}

impl Entity for Quote {
    const PREFIX: EntityPrefix = EntityPrefix::Quot;
    const TABLE: &'static str = "quote";

    fn id(&self) -> &EntityId {
        &self.id
    }

    fn label(&self) -> &str {
        &self.quote_number
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_quote() -> Quote {
        Quote::new(
            EntityId::new(EntityPrefix::Comp),
            "Q000001".to_string(),
            EntityId::new(EntityPrefix::Cust),
            "Brackets".to_string(),
            NaiveDate::from_ymd_opt(2026, 3, 1),
            EntityId::new(EntityPrefix::User),
        )
    }

    #[test]
    fn test_quote_total() {
        let mut quote = sample_quote();
        let part = EntityId::new(EntityPrefix::Part);
        quote.lines.push(QuoteLine::new(quote.id.clone(), part.clone(), "A".into(), 10.0, 2.5));
        quote.lines.push(QuoteLine::new(quote.id.clone(), part, "B".into(), 1.0, 100.0));
        assert_eq!(quote.total(), 125.0);
    }

    #[test]
    fn test_is_overdue_only_for_sent() {
        let mut quote = sample_quote();
        let later = NaiveDate::from_ymd_opt(2026, 4, 1).unwrap();
        assert!(!quote.is_overdue(later));

        quote.status = QuoteStatus::Sent;
        assert!(quote.is_overdue(later));
        assert!(!quote.is_overdue(NaiveDate::from_ymd_opt(2026, 3, 1).unwrap()));
    }

    #[test]
    fn test_open_statuses() {
        assert!(QuoteStatus::Draft.is_open());
        assert!(QuoteStatus::Sent.is_open());
        assert!(!QuoteStatus::Ordered.is_open());
        assert!(!QuoteStatus::Expired.is_open());
    }

    #[test]
    fn test_status_accepts_american_spelling() {
        assert_eq!("canceled".parse::<QuoteStatus>().unwrap(), QuoteStatus::Cancelled);
    }
}
