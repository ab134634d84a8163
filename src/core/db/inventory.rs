//! Stock movements and on-hand quantities
//!
//! On-hand is never stored; it is the sum of the part's ledger entries.

use rusqlite::{params, Connection, Row};

use super::{param_refs, parse_ts, ts, Database, DbError, Page, SqlParams};
use crate::core::entity::{parse_column, Entity};
use crate::core::identity::EntityId;
use crate::core::realtime::{record_change, Operation};
use crate::entities::inventory::QUANTITY_TOLERANCE;
use crate::entities::{EntryType, LedgerEntry, StockLevel};

use super::parts::find_part_in;

const COLUMNS: &str =
    "id, company_id, part_id, location, entry_type, quantity, document_ref, created_by, created";

fn map_entry(row: &Row<'_>) -> rusqlite::Result<LedgerEntry> {
    Ok(LedgerEntry {
        id: row.get(0)?,
        company_id: row.get(1)?,
        part_id: row.get(2)?,
        location: row.get(3)?,
        entry_type: parse_column(4, row.get(4)?)?,
        quantity: row.get(5)?,
        document_ref: row.get(6)?,
        created_by: row.get(7)?,
        created: parse_ts(8, row.get(8)?)?,
    })
}

pub(crate) fn on_hand_at(
    conn: &Connection,
    part_id: &EntityId,
    location: &str,
) -> Result<f64, DbError> {
    Ok(conn.query_row(
        "SELECT COALESCE(SUM(quantity), 0.0) FROM item_ledger WHERE part_id = ?1 AND location = ?2",
        params![part_id, location],
        |row| row.get(0),
    )?)
}

/// Append a ledger entry, refusing movements that would drive the
/// location negative
pub(crate) fn post_entry(conn: &Connection, entry: &LedgerEntry) -> Result<(), DbError> {
    if entry.quantity < 0.0 {
        let on_hand = on_hand_at(conn, &entry.part_id, &entry.location)?;
        if on_hand + entry.quantity < -QUANTITY_TOLERANCE {
            tracing::warn!(
                part = %entry.part_id,
                location = %entry.location,
                on_hand,
                requested = -entry.quantity,
                "stock movement refused"
            );
            return Err(DbError::InsufficientStock {
                part: entry.part_id.to_string(),
                location: entry.location.clone(),
                on_hand,
                requested: -entry.quantity,
            });
        }
    }

    conn.execute(
        &format!("INSERT INTO item_ledger ({COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)"),
        params![
            entry.id,
            entry.company_id,
            entry.part_id,
            entry.location,
            entry.entry_type.to_string(),
            entry.quantity,
            entry.document_ref,
            entry.created_by,
            ts(&entry.created)
        ],
    )?;
    record_change(
        conn,
        &entry.company_id,
        LedgerEntry::TABLE,
        Operation::Insert,
        &entry.id.to_string(),
    )?;
    tracing::info!(
        part = %entry.part_id,
        location = %entry.location,
        quantity = entry.quantity,
        kind = %entry.entry_type,
        "stock posted"
    );
    Ok(())
}

impl Database {
    /// Manual stock adjustment; the sign of `quantity` picks the direction
    pub fn adjust_inventory(
        &mut self,
        company_id: &EntityId,
        part_reference: &str,
        location: &str,
        quantity: f64,
        note: Option<String>,
        user_id: &EntityId,
    ) -> Result<LedgerEntry, DbError> {
        if quantity == 0.0 || !quantity.is_finite() {
            return Err(DbError::InvalidState(
                "adjustment quantity must be a non-zero number".into(),
            ));
        }
        self.write(|tx| {
            let part = find_part_in(tx, company_id, part_reference)?;
            if !part.part_type.is_stocked() {
                return Err(DbError::InvalidState(format!(
                    "{} is a {} part and does not carry stock",
                    part.part_number, part.part_type
                )));
            }
            let entry_type = if quantity > 0.0 {
                EntryType::PositiveAdjustment
            } else {
                EntryType::NegativeAdjustment
            };
            let entry = LedgerEntry::new(
                company_id.clone(),
                part.id,
                location,
                entry_type,
                quantity,
                note,
                user_id.clone(),
            );
            post_entry(tx, &entry)?;
            Ok(entry)
        })
    }

    /// Total on-hand across every location
    pub fn on_hand(&self, part_id: &EntityId) -> Result<f64, DbError> {
        Ok(self.conn().query_row(
            "SELECT COALESCE(SUM(quantity), 0.0) FROM item_ledger WHERE part_id = ?1",
            params![part_id],
            |row| row.get(0),
        )?)
    }

    /// Non-zero on-hand per part and location
    pub fn stock_levels(
        &self,
        company_id: &EntityId,
        part_id: Option<&EntityId>,
    ) -> Result<Vec<StockLevel>, DbError> {
        let mut stmt = self.conn().prepare(
            "SELECT l.part_id, l.location, SUM(l.quantity) AS on_hand
             FROM item_ledger l JOIN part p ON p.id = l.part_id
             WHERE l.company_id = ?1 AND (?2 IS NULL OR l.part_id = ?2)
             GROUP BY l.part_id, l.location
             HAVING ABS(SUM(l.quantity)) > 1e-9
             ORDER BY p.part_number, l.location",
        )?;
        let rows = stmt
            .query_map(params![company_id, part_id], |row| {
                Ok(StockLevel {
                    part_id: row.get(0)?,
                    location: row.get(1)?,
                    on_hand: row.get(2)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Ledger entries, newest first
    pub fn ledger(
        &self,
        company_id: &EntityId,
        part_id: Option<&EntityId>,
        page: Page,
    ) -> Result<Vec<LedgerEntry>, DbError> {
        let mut sql = format!("SELECT {COLUMNS} FROM item_ledger WHERE company_id = ?1");
        let mut args: SqlParams = vec![Box::new(company_id.clone())];
        if let Some(id) = part_id {
            args.push(Box::new(id.clone()));
            sql.push_str(" AND part_id = ?2");
        }
        sql.push_str(" ORDER BY created DESC, id DESC");
        sql.push_str(&page.sql());

        let mut stmt = self.conn().prepare(&sql)?;
        let rows = stmt
            .query_map(param_refs(&args).as_slice(), map_entry)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::db::testing::{fixture, Fixture};
    use crate::entities::{Part, PartType, Replenishment};

    fn stocked_part(fx: &mut Fixture) -> Part {
        let part = Part::new(
            fx.company_id().clone(),
            "BOLT-M8".to_string(),
            "M8 bolt".to_string(),
            PartType::Inventory,
            Replenishment::Buy,
            fx.admin.id.clone(),
        );
        fx.db.create_part(&part).unwrap();
        part
    }

    #[test]
    fn test_adjustments_sum_per_location() {
        let mut fx = fixture();
        let part = stocked_part(&mut fx);
        let company = fx.company_id().clone();
        let user = fx.admin.id.clone();

        fx.db.adjust_inventory(&company, "BOLT-M8", "main", 10.0, None, &user).unwrap();
        fx.db.adjust_inventory(&company, "BOLT-M8", "dock", 4.0, None, &user).unwrap();
        fx.db
            .adjust_inventory(&company, "BOLT-M8", "MAIN", -3.0, Some("scrap".into()), &user)
            .unwrap();

        assert_eq!(fx.db.on_hand(&part.id).unwrap(), 11.0);
        let levels = fx.db.stock_levels(&company, Some(&part.id)).unwrap();
        assert_eq!(levels.len(), 2);
        assert_eq!(levels[0].location, "DOCK");
        assert_eq!(levels[1].on_hand, 7.0);
        assert_eq!(fx.db.ledger(&company, Some(&part.id), Page::default()).unwrap().len(), 3);
    }

    #[test]
    fn test_negative_stock_refused() {
        let mut fx = fixture();
        let part = stocked_part(&mut fx);
        let company = fx.company_id().clone();
        let user = fx.admin.id.clone();
        fx.db.adjust_inventory(&company, "BOLT-M8", "MAIN", 2.0, None, &user).unwrap();

        let err = fx
            .db
            .adjust_inventory(&company, "BOLT-M8", "MAIN", -5.0, None, &user)
            .unwrap_err();
        match err {
            DbError::InsufficientStock { on_hand, requested, .. } => {
                assert_eq!(on_hand, 2.0);
                assert_eq!(requested, 5.0);
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(fx.db.on_hand(&part.id).unwrap(), 2.0);
    }

    #[test]
    fn test_service_parts_carry_no_stock() {
        let mut fx = fixture();
        let company = fx.company_id().clone();
        let user = fx.admin.id.clone();
        let service = Part::new(
            company.clone(),
            "SETUP".to_string(),
            "Machine setup".to_string(),
            PartType::Service,
            Replenishment::Make,
            user.clone(),
        );
        fx.db.create_part(&service).unwrap();
        let err = fx
            .db
            .adjust_inventory(&company, "SETUP", "MAIN", 1.0, None, &user)
            .unwrap_err();
        assert!(matches!(err, DbError::InvalidState(_)));
    }

    #[test]
    fn test_zero_adjustment_refused() {
        let mut fx = fixture();
        stocked_part(&mut fx);
        let company = fx.company_id().clone();
        let user = fx.admin.id.clone();
        assert!(fx
            .db
            .adjust_inventory(&company, "BOLT-M8", "MAIN", 0.0, None, &user)
            .is_err());
    }
}
