//! Entity trait - common interface for all ERP record types

use serde::Serialize;

use crate::core::identity::{EntityId, EntityPrefix};

/// Common trait for every stored record type
pub trait Entity: Serialize {
    /// The id prefix (e.g., PART, QUOT)
    const PREFIX: EntityPrefix;

    /// Backing table; also the realtime topic for change events
    const TABLE: &'static str;

    /// Get the record's unique ID
    fn id(&self) -> &EntityId;

    /// Human-facing label (document number, part number, or name)
    fn label(&self) -> &str;
}

/// Parse a stored enum column, reporting bad values as conversion failures
pub fn parse_column<T>(idx: usize, value: String) -> rusqlite::Result<T>
where
    T: std::str::FromStr<Err = String>,
{
    value.parse::<T>().map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(
            idx,
            rusqlite::types::Type::Text,
            Box::new(std::io::Error::new(std::io::ErrorKind::InvalidData, e)),
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::quote::QuoteStatus;

    #[test]
    fn test_parse_column_ok() {
        let status: QuoteStatus = parse_column(0, "sent".to_string()).unwrap();
        assert_eq!(status, QuoteStatus::Sent);
    }

    #[test]
    fn test_parse_column_rejects_unknown() {
        let err = parse_column::<QuoteStatus>(3, "bogus".to_string()).unwrap_err();
        assert!(matches!(
            err,
            rusqlite::Error::FromSqlConversionFailure(3, _, _)
        ));
    }
}
