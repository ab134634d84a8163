//! SQLite-backed ERP database
//!
//! This module owns the single connection to `.iw/erp.db`:
//! - creates the schema on first open and refuses mismatched versions
//! - runs every mutation inside an IMMEDIATE transaction
//! - records a change event for every row it writes
//!
//! Queries are split by functional area; each file adds an
//! `impl Database` block plus `pub(crate)` helpers that take a plain
//! `&Connection` so multi-step flows can compose them in one transaction.

mod accounts;
mod companies;
mod contacts;
mod documents;
mod inventory;
mod parts;
mod purchasing;
mod sales;
mod schema;
mod users;

pub use contacts::ContactUpdate;
pub use parts::{PartFilter, PartUpdate};
pub use purchasing::PurchaseOrderFilter;
pub use sales::{QuoteFilter, QuoteTransition, SalesOrderFilter, SalesOrderTransition};
pub use users::EmployeeRecord;

pub(crate) use documents::upsert_document;
pub(crate) use inventory::post_entry;
pub(crate) use sales::{expire_overdue, insert_sales_order, load_quote, set_quote_status};
pub(crate) use users::apply_permission_changes;
pub use sales::{QUOTE_SEQUENCE, SALES_ORDER_SEQUENCE};
pub use purchasing::PURCHASE_ORDER_SEQUENCE;
pub use companies::ADMIN_EMPLOYEE_TYPE;

use std::path::Path;

use chrono::{DateTime, NaiveDate, Utc};
use miette::Diagnostic;
use rusqlite::{Connection, Transaction, TransactionBehavior};
use thiserror::Error;

use crate::core::permissions::PermissionError;
use crate::core::workspace::Workspace;

/// Current schema version. There are no migrations: a mismatch is an error.
pub const SCHEMA_VERSION: i32 = 3;

/// The ERP database
pub struct Database {
    conn: Connection,
}

impl Database {
    /// Open (creating if needed) the database of a workspace
    pub fn open(workspace: &Workspace) -> Result<Self, DbError> {
        Self::open_path(&workspace.database_path())
    }

    /// Open a database file directly
    pub fn open_path(path: &Path) -> Result<Self, DbError> {
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        conn.busy_timeout(std::time::Duration::from_secs(5))?;
        Self::prepare(conn)
    }

    /// Private in-memory database, used by tests
    pub fn open_in_memory() -> Result<Self, DbError> {
        Self::prepare(Connection::open_in_memory()?)
    }

    fn prepare(conn: Connection) -> Result<Self, DbError> {
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        let db = Self { conn };
        match db.schema_version()? {
            None => db.init_schema()?,
            Some(v) if v == SCHEMA_VERSION => {}
            Some(found) => {
                return Err(DbError::SchemaMismatch {
                    found,
                    expected: SCHEMA_VERSION,
                })
            }
        }
        Ok(db)
    }

    /// Read-only access to the underlying connection
    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    /// Run `f` inside an IMMEDIATE transaction
    ///
    /// The write lock is taken up front, so two processes cannot interleave
    /// read-modify-write sequences. Any error rolls everything back.
    pub fn write<T, F>(&mut self, f: F) -> Result<T, DbError>
    where
        F: FnOnce(&Transaction<'_>) -> Result<T, DbError>,
    {
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;
        let value = f(&tx)?;
        tx.commit()?;
        Ok(value)
    }
}

/// Pagination window for list queries
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Page {
    pub limit: Option<usize>,
    pub offset: usize,
}

impl Page {
    pub fn new(limit: Option<usize>, offset: usize) -> Self {
        Self { limit, offset }
    }

    /// SQL suffix; SQLite needs a LIMIT before OFFSET
    pub(crate) fn sql(&self) -> String {
        match (self.limit, self.offset) {
            (None, 0) => String::new(),
            (None, offset) => format!(" LIMIT -1 OFFSET {}", offset),
            (Some(limit), offset) => format!(" LIMIT {} OFFSET {}", limit, offset),
        }
    }
}

/// Errors from the data layer
#[derive(Debug, Error, Diagnostic)]
pub enum DbError {
    #[error("database error: {0}")]
    #[diagnostic(code(iw::db::sqlite))]
    Sqlite(#[from] rusqlite::Error),

    #[error("corrupt JSON column: {0}")]
    #[diagnostic(code(iw::db::json))]
    Json(#[from] serde_json::Error),

    #[error("{kind} '{reference}' not found")]
    #[diagnostic(code(iw::db::not_found))]
    NotFound { kind: &'static str, reference: String },

    #[error("{kind} '{key}' already exists")]
    #[diagnostic(code(iw::db::duplicate))]
    Duplicate { kind: &'static str, key: String },

    #[error("{0}")]
    #[diagnostic(code(iw::db::invalid_state))]
    InvalidState(String),

    #[error("insufficient stock of {part} at {location}: {on_hand} on hand, {requested} requested")]
    #[diagnostic(code(iw::db::insufficient_stock))]
    InsufficientStock {
        part: String,
        location: String,
        on_hand: f64,
        requested: f64,
    },

    #[error("no '{table}' sequence configured for this company")]
    #[diagnostic(
        code(iw::db::sequence_not_found),
        help("create it with `iw seq set <table> --prefix ...`")
    )]
    SequenceNotFound { table: String },

    #[error("database schema version {found} does not match this build ({expected})")]
    #[diagnostic(code(iw::db::schema_mismatch))]
    SchemaMismatch { found: i32, expected: i32 },

    #[error(transparent)]
    #[diagnostic(transparent)]
    Permission(#[from] PermissionError),
}

impl DbError {
    pub(crate) fn not_found(kind: &'static str, reference: impl Into<String>) -> Self {
        DbError::NotFound {
            kind,
            reference: reference.into(),
        }
    }

    /// Map a UNIQUE constraint failure to `Duplicate`, pass others through
    pub(crate) fn from_insert(err: rusqlite::Error, kind: &'static str, key: &str) -> Self {
        match &err {
            rusqlite::Error::SqliteFailure(e, _)
                if e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
                    || e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY =>
            {
                DbError::Duplicate {
                    kind,
                    key: key.to_string(),
                }
            }
            _ => DbError::Sqlite(err),
        }
    }
}

/// Turn a missing row into `NotFound`
pub(crate) fn not_found_if_none<T>(
    value: Option<T>,
    kind: &'static str,
    reference: impl Into<String>,
) -> Result<T, DbError> {
    value.ok_or_else(|| DbError::not_found(kind, reference))
}

pub(crate) fn ts(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339()
}

pub(crate) fn parse_ts(idx: usize, s: String) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(&s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
        })
}

pub(crate) fn date(d: &NaiveDate) -> String {
    d.format("%Y-%m-%d").to_string()
}

pub(crate) fn parse_date(idx: usize, s: String) -> rusqlite::Result<NaiveDate> {
    NaiveDate::parse_from_str(&s, "%Y-%m-%d").map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
    })
}

/// Boxed parameter list for dynamically built WHERE clauses
pub(crate) type SqlParams = Vec<Box<dyn rusqlite::ToSql>>;

pub(crate) fn param_refs(params: &SqlParams) -> Vec<&dyn rusqlite::ToSql> {
    params.iter().map(|p| p.as_ref()).collect()
}


#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_open_creates_schema_once() {
        let tmp = tempdir().unwrap();
        let path = tmp.path().join("erp.db");
        {
            let db = Database::open_path(&path).unwrap();
            assert_eq!(db.schema_version().unwrap(), Some(SCHEMA_VERSION));
        }
        let db = Database::open_path(&path).unwrap();
        assert_eq!(db.schema_version().unwrap(), Some(SCHEMA_VERSION));
    }

    #[test]
    fn test_open_refuses_other_schema_version() {
        let tmp = tempdir().unwrap();
        let path = tmp.path().join("erp.db");
        {
            let db = Database::open_path(&path).unwrap();
            db.conn()
                .execute("UPDATE meta SET value = '99' WHERE key = 'schema_version'", [])
                .unwrap();
        }
        let err = Database::open_path(&path).err().unwrap();
        assert!(matches!(err, DbError::SchemaMismatch { found: 99, .. }));
    }

    #[test]
    fn test_write_rolls_back_on_error() {
        let mut db = Database::open_in_memory().unwrap();
        let result: Result<(), DbError> = db.write(|tx| {
            tx.execute(
                "INSERT INTO meta (key, value) VALUES ('scratch', 'x')",
                [],
            )?;
            Err(DbError::InvalidState("boom".to_string()))
        });
        assert!(result.is_err());

        let count: i64 = db
            .conn()
            .query_row("SELECT COUNT(*) FROM meta WHERE key = 'scratch'", [], |r| {
                r.get(0)
            })
            .unwrap();
        assert_eq!(count, 0);
    }

    #[test]
    fn test_page_sql() {
        assert_eq!(Page::default().sql(), "");
        assert_eq!(Page::new(Some(10), 0).sql(), " LIMIT 10 OFFSET 0");
        assert_eq!(Page::new(None, 5).sql(), " LIMIT -1 OFFSET 5");
    }
}
