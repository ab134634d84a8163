//! Per-company document numbering
//!
//! Each company owns one counter per numbered table (`quote`,
//! `salesOrder`, `purchaseOrder`). Issuing a number advances `next` by
//! `step` and formats the new value with the configured prefix, padding and
//! suffix. Prefixes and suffixes may contain date tokens:
//!
//! | Token      | Replaced with        |
//! |------------|----------------------|
//! | `%{yyyy}`  | four-digit year      |
//! | `%{yy}`    | two-digit year       |
//! | `%{mm}`    | two-digit month      |
//! | `%{dd}`    | two-digit day        |

use chrono::{NaiveDate, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use serde::Serialize;

use crate::core::db::{Database, DbError};
use crate::core::identity::EntityId;
use crate::core::realtime::{record_change, Operation};

/// Sequences seeded for every new company: (table, name, prefix)
pub const DEFAULT_SEQUENCES: &[(&str, &str, &str)] = &[
    ("quote", "Quote", "Q"),
    ("salesOrder", "Sales Order", "SO"),
    ("purchaseOrder", "Purchase Order", "PO"),
];

const DEFAULT_SIZE: u32 = 6;

/// A numbering sequence
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Sequence {
    pub company_id: EntityId,
    pub table: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prefix: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suffix: Option<String>,
    /// Last value issued
    pub next: i64,
    /// Zero padding width of the numeric part
    pub size: u32,
    pub step: i64,
}

impl Sequence {
    /// Value the next issue will take; `None` once the counter is exhausted
    pub fn upcoming(&self) -> Option<i64> {
        self.next.checked_add(self.step)
    }

    /// Format `value` the way it would be issued on `today`
    pub fn format(&self, value: i64, today: NaiveDate) -> String {
        let prefix = self
            .prefix
            .as_deref()
            .map(|p| interpolate(p, today))
            .unwrap_or_default();
        let suffix = self
            .suffix
            .as_deref()
            .map(|s| interpolate(s, today))
            .unwrap_or_default();
        format!(
            "{}{:0width$}{}",
            prefix,
            value,
            suffix,
            width = self.size as usize
        )
    }
}

/// Changes applied by `iw seq set`
#[derive(Debug, Clone, Default)]
pub struct SequenceUpdate {
    /// `Some("")` clears the prefix
    pub prefix: Option<String>,
    pub suffix: Option<String>,
    pub next: Option<i64>,
    pub size: Option<u32>,
    pub step: Option<i64>,
}

/// Replace date tokens in a prefix or suffix
pub fn interpolate(template: &str, today: NaiveDate) -> String {
    template
        .replace("%{yyyy}", &today.format("%Y").to_string())
        .replace("%{yy}", &today.format("%y").to_string())
        .replace("%{mm}", &today.format("%m").to_string())
        .replace("%{dd}", &today.format("%d").to_string())
}

fn load(conn: &Connection, company_id: &EntityId, table: &str) -> Result<Sequence, DbError> {
    conn.query_row(
        "SELECT company_id, table_name, name, prefix, suffix, next, size, step
         FROM sequence WHERE company_id = ?1 AND table_name = ?2",
        params![company_id, table],
        |row| {
            Ok(Sequence {
                company_id: row.get(0)?,
                table: row.get(1)?,
                name: row.get(2)?,
                prefix: row.get(3)?,
                suffix: row.get(4)?,
                next: row.get(5)?,
                size: row.get(6)?,
                step: row.get(7)?,
            })
        },
    )
    .optional()?
    .ok_or_else(|| DbError::SequenceNotFound {
        table: table.to_string(),
    })
}

fn store_next(
    conn: &Connection,
    company_id: &EntityId,
    table: &str,
    next: i64,
) -> Result<(), DbError> {
    conn.execute(
        "UPDATE sequence SET next = ?3 WHERE company_id = ?1 AND table_name = ?2",
        params![company_id, table, next],
    )?;
    record_change(conn, company_id, "sequence", Operation::Update, table)?;
    Ok(())
}

/// Issue the next number within the caller's transaction
pub(crate) fn next_sequence_in(
    conn: &Connection,
    company_id: &EntityId,
    table: &str,
) -> Result<String, DbError> {
    let seq = load(conn, company_id, table)?;
    let next = seq.upcoming().ok_or_else(|| {
        DbError::InvalidState(format!(
            "sequence {} is exhausted at {}; reset it with `iw seq set {} --next`",
            table, seq.next, table
        ))
    })?;
    store_next(conn, company_id, table, next)?;
    let number = seq.format(next, Utc::now().date_naive());
    tracing::debug!(table, %number, "issued sequence number");
    Ok(number)
}

/// Insert the default sequences for a new company
pub(crate) fn seed_defaults(conn: &Connection, company_id: &EntityId) -> Result<(), DbError> {
    for (table, name, prefix) in DEFAULT_SEQUENCES {
        conn.execute(
            "INSERT INTO sequence (company_id, table_name, name, prefix, suffix, next, size, step)
             VALUES (?1, ?2, ?3, ?4, NULL, 0, ?5, 1)",
            params![company_id, table, name, prefix, DEFAULT_SIZE],
        )?;
        record_change(conn, company_id, "sequence", Operation::Insert, table)?;
    }
    Ok(())
}

impl Database {
    /// Issue the next number and commit immediately
    ///
    /// Callers that fail to use the number should hand it back with
    /// [`Database::rollback_next_sequence`].
    pub fn get_next_sequence(
        &mut self,
        company_id: &EntityId,
        table: &str,
    ) -> Result<String, DbError> {
        self.write(|tx| next_sequence_in(tx, company_id, table))
    }

    /// Step the counter back once; never goes below zero
    pub fn rollback_next_sequence(
        &mut self,
        company_id: &EntityId,
        table: &str,
    ) -> Result<Sequence, DbError> {
        self.write(|tx| {
            let mut seq = load(tx, company_id, table)?;
            seq.next = (seq.next - seq.step).max(0);
            store_next(tx, company_id, table, seq.next)?;
            tracing::info!(table, next = seq.next, "sequence rolled back");
            Ok(seq)
        })
    }

    pub fn get_sequence(&self, company_id: &EntityId, table: &str) -> Result<Sequence, DbError> {
        load(self.conn(), company_id, table)
    }

    pub fn list_sequences(&self, company_id: &EntityId) -> Result<Vec<Sequence>, DbError> {
        let mut stmt = self.conn().prepare(
            "SELECT table_name FROM sequence WHERE company_id = ?1 ORDER BY table_name",
        )?;
        let tables = stmt
            .query_map(params![company_id], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        tables
            .iter()
            .map(|t| load(self.conn(), company_id, t))
            .collect()
    }

    /// Change a sequence's format or counter, creating it if absent
    pub fn update_sequence(
        &mut self,
        company_id: &EntityId,
        table: &str,
        update: SequenceUpdate,
    ) -> Result<Sequence, DbError> {
        if update.step.is_some_and(|s| s <= 0) {
            return Err(DbError::InvalidState("sequence step must be positive".into()));
        }
        if update.next.is_some_and(|n| n < 0) {
            return Err(DbError::InvalidState("sequence next cannot be negative".into()));
        }

        self.write(|tx| {
            let existing = match load(tx, company_id, table) {
                Ok(seq) => Some(seq),
                Err(DbError::SequenceNotFound { .. }) => None,
                Err(e) => return Err(e),
            };
            let operation = if existing.is_some() {
                Operation::Update
            } else {
                Operation::Insert
            };
            let mut seq = existing.unwrap_or_else(|| Sequence {
                company_id: company_id.clone(),
                table: table.to_string(),
                name: table.to_string(),
                prefix: None,
                suffix: None,
                next: 0,
                size: 0,
                step: 1,
            });

            if let Some(prefix) = update.prefix {
                seq.prefix = (!prefix.is_empty()).then_some(prefix);
            }
            if let Some(suffix) = update.suffix {
                seq.suffix = (!suffix.is_empty()).then_some(suffix);
            }
            if let Some(next) = update.next {
                seq.next = next;
            }
            if let Some(size) = update.size {
                seq.size = size;
            }
            if let Some(step) = update.step {
                seq.step = step;
            }

            tx.execute(
                "INSERT INTO sequence (company_id, table_name, name, prefix, suffix, next, size, step)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                 ON CONFLICT (company_id, table_name) DO UPDATE SET
                   prefix = excluded.prefix, suffix = excluded.suffix, next = excluded.next,
                   size = excluded.size, step = excluded.step",
                params![
                    seq.company_id,
                    seq.table,
                    seq.name,
                    seq.prefix,
                    seq.suffix,
                    seq.next,
                    seq.size,
                    seq.step
                ],
            )?;
            record_change(tx, company_id, "sequence", operation, table)?;
            tracing::info!(table, "sequence updated");
            Ok(seq)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::db::testing::fixture;
    use crate::entities::{User, UserType};

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_interpolate_date_tokens() {
        let today = date(2026, 3, 7);
        assert_eq!(interpolate("SO-%{yyyy}-", today), "SO-2026-");
        assert_eq!(interpolate("%{yy}%{mm}%{dd}", today), "260307");
        assert_eq!(interpolate("PLAIN", today), "PLAIN");
    }

    #[test]
    fn test_format_pads_and_wraps() {
        let seq = Sequence {
            company_id: EntityId::new(crate::core::identity::EntityPrefix::Comp),
            table: "quote".to_string(),
            name: "Quote".to_string(),
            prefix: Some("Q%{yy}-".to_string()),
            suffix: Some("/A".to_string()),
            next: 0,
            size: 5,
            step: 1,
        };
        insta::assert_snapshot!(seq.format(42, date(2026, 1, 15)), @"Q26-00042/A");
    }

    #[test]
    fn test_get_next_sequence_increments() {
        let mut fx = fixture();
        let company = fx.company_id().clone();
        assert_eq!(fx.db.get_next_sequence(&company, "quote").unwrap(), "Q000001");
        assert_eq!(fx.db.get_next_sequence(&company, "quote").unwrap(), "Q000002");
        assert_eq!(
            fx.db.get_next_sequence(&company, "purchaseOrder").unwrap(),
            "PO000001"
        );
    }

    #[test]
    fn test_rollback_returns_the_number() {
        let mut fx = fixture();
        let company = fx.company_id().clone();
        fx.db.get_next_sequence(&company, "salesOrder").unwrap();
        let issued = fx.db.get_next_sequence(&company, "salesOrder").unwrap();

        let seq = fx.db.rollback_next_sequence(&company, "salesOrder").unwrap();
        assert_eq!(seq.next, 1);
        assert_eq!(fx.db.get_next_sequence(&company, "salesOrder").unwrap(), issued);
    }

    #[test]
    fn test_rollback_never_goes_negative() {
        let mut fx = fixture();
        let company = fx.company_id().clone();
        let seq = fx.db.rollback_next_sequence(&company, "quote").unwrap();
        assert_eq!(seq.next, 0);
    }

    #[test]
    fn test_missing_sequence() {
        let mut fx = fixture();
        let company = fx.company_id().clone();
        let err = fx.db.get_next_sequence(&company, "invoice").unwrap_err();
        assert!(matches!(err, DbError::SequenceNotFound { .. }));
    }

    #[test]
    fn test_update_sequence_step_and_prefix() {
        let mut fx = fixture();
        let company = fx.company_id().clone();
        fx.db
            .update_sequence(
                &company,
                "quote",
                SequenceUpdate {
                    prefix: Some("QT".to_string()),
                    step: Some(10),
                    size: Some(3),
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(fx.db.get_next_sequence(&company, "quote").unwrap(), "QT010");
        assert_eq!(fx.db.get_next_sequence(&company, "quote").unwrap(), "QT020");
    }

    #[test]
    fn test_update_creates_missing_sequence() {
        let mut fx = fixture();
        let company = fx.company_id().clone();
        fx.db
            .update_sequence(
                &company,
                "invoice",
                SequenceUpdate {
                    prefix: Some("INV".to_string()),
                    size: Some(4),
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(fx.db.get_next_sequence(&company, "invoice").unwrap(), "INV0001");
        assert_eq!(fx.db.list_sequences(&company).unwrap().len(), 4);
    }

    #[test]
    fn test_exhausted_sequence_refuses_to_issue() {
        let mut fx = fixture();
        let company = fx.company_id().clone();
        fx.db
            .update_sequence(
                &company,
                "quote",
                SequenceUpdate {
                    next: Some(i64::MAX),
                    ..Default::default()
                },
            )
            .unwrap();
        let err = fx.db.get_next_sequence(&company, "quote").unwrap_err();
        assert!(matches!(err, DbError::InvalidState(ref m) if m.contains("exhausted")));
        let seq = fx.db.get_sequence(&company, "quote").unwrap();
        assert_eq!(seq.next, i64::MAX);
        assert_eq!(seq.upcoming(), None);
    }

    #[test]
    fn test_two_connections_never_share_a_number() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("erp.db");
        let company = {
            let mut db = Database::open_path(&path).unwrap();
            let admin = User::new(
                "admin@acme.test",
                "Ada".to_string(),
                "Admin".to_string(),
                UserType::Employee,
            );
            db.create_user(&admin).unwrap();
            db.create_company("Acme Fabrication", "USD", &admin.id).unwrap().id
        };

        let workers: Vec<_> = (0..2)
            .map(|_| {
                let path = path.clone();
                let company = company.clone();
                std::thread::spawn(move || {
                    let mut db = Database::open_path(&path).unwrap();
                    (0..25)
                        .map(|_| db.get_next_sequence(&company, "quote").unwrap())
                        .collect::<Vec<_>>()
                })
            })
            .collect();
        let mut issued: Vec<String> = workers
            .into_iter()
            .flat_map(|w| w.join().unwrap())
            .collect();
        issued.sort();
        issued.dedup();
        assert_eq!(issued.len(), 50);
        assert_eq!(issued.first().map(String::as_str), Some("Q000001"));
        assert_eq!(issued.last().map(String::as_str), Some("Q000050"));
    }

    #[test]
    fn test_update_rejects_zero_step() {
        let mut fx = fixture();
        let company = fx.company_id().clone();
        let err = fx
            .db
            .update_sequence(
                &company,
                "quote",
                SequenceUpdate {
                    step: Some(0),
                    ..Default::default()
                },
            )
            .unwrap_err();
        assert!(matches!(err, DbError::InvalidState(_)));
    }
}
