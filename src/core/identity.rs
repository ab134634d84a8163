//! Record identity using type-prefixed ULIDs

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use ulid::Ulid;

/// Record type prefixes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum EntityPrefix {
    /// Company (tenant)
    Comp,
    /// User account
    User,
    /// Employee type (permission template)
    Etyp,
    /// Customer
    Cust,
    /// Supplier
    Supp,
    /// Part / item master
    Part,
    /// Item ledger entry
    Ledg,
    /// Sales quote
    Quot,
    /// Quote line
    Qlin,
    /// Sales order
    Sord,
    /// Sales order line
    Slin,
    /// Purchase order
    Pord,
    /// Purchase order line
    Plin,
    /// General ledger account
    Acct,
    /// Stored document
    Doc,
    /// Background job
    Job,
}

impl EntityPrefix {
    /// Get the string representation of the prefix
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityPrefix::Comp => "COMP",
            EntityPrefix::User => "USER",
            EntityPrefix::Etyp => "ETYP",
            EntityPrefix::Cust => "CUST",
            EntityPrefix::Supp => "SUPP",
            EntityPrefix::Part => "PART",
            EntityPrefix::Ledg => "LEDG",
            EntityPrefix::Quot => "QUOT",
            EntityPrefix::Qlin => "QLIN",
            EntityPrefix::Sord => "SORD",
            EntityPrefix::Slin => "SLIN",
            EntityPrefix::Pord => "PORD",
            EntityPrefix::Plin => "PLIN",
            EntityPrefix::Acct => "ACCT",
            EntityPrefix::Doc => "DOC",
            EntityPrefix::Job => "JOB",
        }
    }

    /// Get all valid prefixes
    pub fn all() -> &'static [EntityPrefix] {
        &[
            EntityPrefix::Comp,
            EntityPrefix::User,
            EntityPrefix::Etyp,
            EntityPrefix::Cust,
            EntityPrefix::Supp,
            EntityPrefix::Part,
            EntityPrefix::Ledg,
            EntityPrefix::Quot,
            EntityPrefix::Qlin,
            EntityPrefix::Sord,
            EntityPrefix::Slin,
            EntityPrefix::Pord,
            EntityPrefix::Plin,
            EntityPrefix::Acct,
            EntityPrefix::Doc,
            EntityPrefix::Job,
        ]
    }
}

impl fmt::Display for EntityPrefix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for EntityPrefix {
    type Err = IdParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let upper = s.to_uppercase();
        Self::all()
            .iter()
            .copied()
            .find(|p| p.as_str() == upper)
            .ok_or_else(|| IdParseError::InvalidPrefix(s.to_string()))
    }
}

/// A unique record identifier combining a type prefix and ULID
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntityId {
    prefix: EntityPrefix,
    ulid: Ulid,
}

impl PartialOrd for EntityPrefix {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for EntityPrefix {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.as_str().cmp(other.as_str())
    }
}

impl EntityId {
    /// Create a new EntityId with the given prefix
    pub fn new(prefix: EntityPrefix) -> Self {
        Self {
            prefix,
            ulid: Ulid::new(),
        }
    }

    /// Get the record prefix
    pub fn prefix(&self) -> EntityPrefix {
        self.prefix
    }

    /// Get the ULID component
    pub fn ulid(&self) -> Ulid {
        self.ulid
    }

    /// Parse an EntityId from a string
    pub fn parse(s: &str) -> Result<Self, IdParseError> {
        s.parse()
    }

    /// Parse an id and require a specific prefix
    pub fn parse_as(s: &str, expected: EntityPrefix) -> Result<Self, IdParseError> {
        let id: EntityId = s.parse()?;
        if id.prefix != expected {
            return Err(IdParseError::WrongPrefix {
                id: s.to_string(),
                expected,
            });
        }
        Ok(id)
    }

    /// Cheap syntactic check used when a reference may be an id or a
    /// human-readable number
    pub fn looks_like(s: &str, prefix: EntityPrefix) -> bool {
        s.len() > prefix.as_str().len() + 1
            && s.to_uppercase().starts_with(&format!("{}-", prefix.as_str()))
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.prefix, self.ulid)
    }
}

impl FromStr for EntityId {
    type Err = IdParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (prefix_str, ulid_str) = s
            .split_once('-')
            .ok_or_else(|| IdParseError::MissingDelimiter(s.to_string()))?;

        let prefix = prefix_str.parse()?;
        let ulid = Ulid::from_string(ulid_str)
            .map_err(|e| IdParseError::InvalidUlid(ulid_str.to_string(), e.to_string()))?;

        Ok(Self { prefix, ulid })
    }
}

impl Serialize for EntityId {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for EntityId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

impl rusqlite::ToSql for EntityId {
    fn to_sql(&self) -> rusqlite::Result<rusqlite::types::ToSqlOutput<'_>> {
        Ok(rusqlite::types::ToSqlOutput::from(self.to_string()))
    }
}

impl rusqlite::types::FromSql for EntityId {
    fn column_result(value: rusqlite::types::ValueRef<'_>) -> rusqlite::types::FromSqlResult<Self> {
        let s = value.as_str()?;
        s.parse()
            .map_err(|e: IdParseError| rusqlite::types::FromSqlError::Other(Box::new(e)))
    }
}

/// Errors that can occur when parsing record IDs
#[derive(Debug, Error)]
pub enum IdParseError {
    #[error("invalid record prefix: '{0}'")]
    InvalidPrefix(String),

    #[error("missing '-' delimiter in record ID: '{0}'")]
    MissingDelimiter(String),

    #[error("invalid ULID '{0}': {1}")]
    InvalidUlid(String, String),

    #[error("'{id}' is not a {expected} id")]
    WrongPrefix { id: String, expected: EntityPrefix },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entity_id_generation() {
        let id = EntityId::new(EntityPrefix::Part);
        assert!(id.to_string().starts_with("PART-"));
        assert_eq!(id.to_string().len(), 31);
    }

    #[test]
    fn test_entity_id_parsing() {
        let original = EntityId::new(EntityPrefix::Quot);
        let parsed = EntityId::parse(&original.to_string()).unwrap();
        assert_eq!(parsed.prefix(), EntityPrefix::Quot);
        assert_eq!(original, parsed);
    }

    #[test]
    fn test_entity_id_invalid_prefix() {
        let err = EntityId::parse("XXX-01HQ3K4N5M6P7R8S9T0UVWXYZ").unwrap_err();
        assert!(matches!(err, IdParseError::InvalidPrefix(_)));
    }

    #[test]
    fn test_entity_id_missing_delimiter() {
        let err = EntityId::parse("PART01HQ3K4N5M6P7R8S9T0UVWXYZ").unwrap_err();
        assert!(matches!(err, IdParseError::MissingDelimiter(_)));
    }

    #[test]
    fn test_entity_id_invalid_ulid() {
        let err = EntityId::parse("PART-notaulid").unwrap_err();
        assert!(matches!(err, IdParseError::InvalidUlid(_, _)));
    }

    #[test]
    fn test_parse_as_rejects_other_prefix() {
        let id = EntityId::new(EntityPrefix::Cust);
        let err = EntityId::parse_as(&id.to_string(), EntityPrefix::Supp).unwrap_err();
        assert!(matches!(err, IdParseError::WrongPrefix { .. }));
        assert!(EntityId::parse_as(&id.to_string(), EntityPrefix::Cust).is_ok());
    }

    #[test]
    fn test_looks_like() {
        let id = EntityId::new(EntityPrefix::Quot);
        assert!(EntityId::looks_like(&id.to_string(), EntityPrefix::Quot));
        assert!(!EntityId::looks_like("Q000001", EntityPrefix::Quot));
        assert!(!EntityId::looks_like("QUOT-", EntityPrefix::Quot));
    }

    #[test]
    fn test_all_prefixes_parse() {
        for prefix in EntityPrefix::all() {
            let id = EntityId::new(*prefix);
            let parsed = EntityId::parse(&id.to_string()).unwrap();
            assert_eq!(parsed.prefix(), *prefix);
        }
    }
}
