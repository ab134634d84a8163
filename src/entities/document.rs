//! Stored document metadata. File contents live in the workspace storage tree.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::core::entity::Entity;
use crate::core::identity::{EntityId, EntityPrefix};

/// Storage bucket. Public objects can be previewed without a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Bucket {
    #[default]
    Private,
    Public,
}

impl Bucket {
    pub fn as_str(&self) -> &'static str {
        match self {
            Bucket::Private => "private",
            Bucket::Public => "public",
        }
    }
}

impl std::fmt::Display for Bucket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for Bucket {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "private" => Ok(Bucket::Private),
            "public" => Ok(Bucket::Public),
            _ => Err(format!("Unknown bucket: {}. Use private or public", s)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub id: EntityId,
    pub company_id: EntityId,
    pub bucket: Bucket,
    /// Object path relative to `<bucket>/<company>/`
    pub path: String,
    pub name: String,
    pub size: u64,
    pub sha256: String,
    pub uploaded_by: EntityId,
    pub created: DateTime<Utc>,
}

impl Entity for Document {
    const PREFIX: EntityPrefix = EntityPrefix::Doc;
    const TABLE: &'static str = "document";

    fn id(&self) -> &EntityId {
        &self.id
    }

    fn label(&self) -> &str {
        &self.path
    }
}
