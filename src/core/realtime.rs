//! Table change notifications
//!
//! Every write made through the data layer appends a row to `change_log`.
//! A [`Subscription`] holds a cursor into that log and returns the events
//! for its topic (a table name, or `*` for every table) and company.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};
use serde::Serialize;

use crate::core::db::{parse_ts, ts, Database, DbError};
use crate::core::identity::EntityId;

/// Topic that matches every table
pub const ALL_TOPICS: &str = "*";

/// Kind of row change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    Insert,
    Update,
    Delete,
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Operation::Insert => write!(f, "insert"),
            Operation::Update => write!(f, "update"),
            Operation::Delete => write!(f, "delete"),
        }
    }
}

impl std::str::FromStr for Operation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "insert" => Ok(Operation::Insert),
            "update" => Ok(Operation::Update),
            "delete" => Ok(Operation::Delete),
            _ => Err(format!("Unknown change operation: {}", s)),
        }
    }
}

/// One row in the change feed
#[derive(Debug, Clone, Serialize)]
pub struct ChangeEvent {
    pub seq: i64,
    pub company_id: String,
    pub table: String,
    pub operation: Operation,
    pub record_id: String,
    pub at: DateTime<Utc>,
}

/// Append a change event. Runs on whatever connection or transaction the
/// caller is writing with, so the event commits (or rolls back) with the row.
pub(crate) fn record_change(
    conn: &Connection,
    company_id: &EntityId,
    table: &str,
    operation: Operation,
    record_id: &str,
) -> Result<(), DbError> {
    conn.execute(
        "INSERT INTO change_log (company_id, table_name, operation, record_id, at)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            company_id,
            table,
            operation.to_string(),
            record_id,
            ts(&Utc::now())
        ],
    )?;
    tracing::debug!(table, %operation, record_id, "change recorded");
    Ok(())
}

/// A cursor over the change feed for one topic and company
#[derive(Debug, Clone)]
pub struct Subscription {
    topic: String,
    company_id: EntityId,
    cursor: i64,
}

impl Subscription {
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Sequence number of the last event delivered
    pub fn cursor(&self) -> i64 {
        self.cursor
    }

    /// Events recorded since the last poll, oldest first
    pub fn poll(&mut self, db: &Database) -> Result<Vec<ChangeEvent>, DbError> {
        let mut sql = String::from(
            "SELECT seq, company_id, table_name, operation, record_id, at
             FROM change_log WHERE seq > ?1 AND company_id = ?2",
        );
        if self.topic != ALL_TOPICS {
            sql.push_str(" AND table_name = ?3");
        }
        sql.push_str(" ORDER BY seq");

        let mut stmt = db.conn().prepare(&sql)?;
        let map = |row: &rusqlite::Row<'_>| -> rusqlite::Result<ChangeEvent> {
            Ok(ChangeEvent {
                seq: row.get(0)?,
                company_id: row.get(1)?,
                table: row.get(2)?,
                operation: crate::core::entity::parse_column(3, row.get(3)?)?,
                record_id: row.get(4)?,
                at: parse_ts(5, row.get(5)?)?,
            })
        };
        let events = if self.topic == ALL_TOPICS {
            stmt.query_map(params![self.cursor, self.company_id], map)?
                .collect::<Result<Vec<_>, _>>()?
        } else {
            stmt.query_map(params![self.cursor, self.company_id, self.topic], map)?
                .collect::<Result<Vec<_>, _>>()?
        };

        if let Some(last) = events.last() {
            self.cursor = last.seq;
        }
        Ok(events)
    }
}

impl Database {
    /// Subscribe to changes on `topic` within a company
    ///
    /// With `from_start` the first poll replays the whole log; otherwise only
    /// events recorded after this call are delivered.
    pub fn subscribe(
        &self,
        topic: &str,
        company_id: &EntityId,
        from_start: bool,
    ) -> Result<Subscription, DbError> {
        let cursor = if from_start {
            0
        } else {
            self.conn()
                .query_row("SELECT COALESCE(MAX(seq), 0) FROM change_log", [], |row| {
                    row.get(0)
                })?
        };
        Ok(Subscription {
            topic: topic.to_string(),
            company_id: company_id.clone(),
            cursor,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::db::testing::fixture;
    use crate::entities::{Part, PartType, Replenishment};

    fn new_part(number: &str, fx: &crate::core::db::testing::Fixture) -> Part {
        Part::new(
            fx.company_id().clone(),
            number.to_string(),
            "Widget".to_string(),
            PartType::Inventory,
            Replenishment::Buy,
            fx.admin.id.clone(),
        )
    }

    #[test]
    fn test_subscription_sees_only_new_events() {
        let mut fx = fixture();
        let mut sub = fx.db.subscribe("part", fx.company_id(), false).unwrap();
        assert!(sub.poll(&fx.db).unwrap().is_empty());

        let part = new_part("P-100", &fx);
        fx.db.create_part(&part).unwrap();

        let events = sub.poll(&fx.db).unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].operation, Operation::Insert);
        assert_eq!(events[0].record_id, part.id.to_string());

        assert!(sub.poll(&fx.db).unwrap().is_empty());
    }

    #[test]
    fn test_topic_filters_tables() {
        let mut fx = fixture();
        let mut parts = fx.db.subscribe("part", fx.company_id(), false).unwrap();
        let mut quotes = fx.db.subscribe("quote", fx.company_id(), false).unwrap();
        let mut all = fx.db.subscribe(ALL_TOPICS, fx.company_id(), false).unwrap();

        let part = new_part("P-200", &fx);
        fx.db.create_part(&part).unwrap();

        assert_eq!(parts.poll(&fx.db).unwrap().len(), 1);
        assert!(quotes.poll(&fx.db).unwrap().is_empty());
        assert_eq!(all.poll(&fx.db).unwrap().len(), 1);
    }

    #[test]
    fn test_from_start_replays_company_setup() {
        let fx = fixture();
        let mut sub = fx.db.subscribe("account", fx.company_id(), true).unwrap();
        let events = sub.poll(&fx.db).unwrap();
        assert_eq!(events.len(), crate::entities::account::default_chart().len());
        assert!(sub.cursor() > 0);
    }

    #[test]
    fn test_other_company_events_are_hidden() {
        let mut fx = fixture();
        let other = fx
            .db
            .create_company("Other Works", "EUR", &fx.admin.id.clone())
            .unwrap();
        let mut sub = fx.db.subscribe("part", &other.id, false).unwrap();

        let part = new_part("P-300", &fx);
        fx.db.create_part(&part).unwrap();
        assert!(sub.poll(&fx.db).unwrap().is_empty());
    }
}
