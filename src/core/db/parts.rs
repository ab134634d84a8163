//! Item master queries

use rusqlite::{params, Connection, OptionalExtension, Row};

use super::{not_found_if_none, param_refs, parse_ts, ts, Database, DbError, Page, SqlParams};
use crate::core::entity::{parse_column, Entity};
use crate::core::identity::{EntityId, EntityPrefix};
use crate::core::realtime::{record_change, Operation};
use crate::entities::{Part, PartType, Replenishment};

const COLUMNS: &str = "id, company_id, part_number, name, description, part_type, replenishment, \
                       unit_of_measure, unit_cost, active, created_by, created";

/// Filter for part listings
#[derive(Debug, Clone, Default)]
pub struct PartFilter {
    pub part_type: Option<PartType>,
    /// Substring of part number, name or description
    pub search: Option<String>,
    pub include_inactive: bool,
}

/// Field changes for a part; `None` leaves a field alone
#[derive(Debug, Clone, Default)]
pub struct PartUpdate {
    pub name: Option<String>,
    /// `Some("")` clears the description
    pub description: Option<String>,
    pub part_type: Option<PartType>,
    pub replenishment: Option<Replenishment>,
    pub unit_of_measure: Option<String>,
    pub unit_cost: Option<f64>,
}

impl PartUpdate {
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.description.is_none()
            && self.part_type.is_none()
            && self.replenishment.is_none()
            && self.unit_of_measure.is_none()
            && self.unit_cost.is_none()
    }
}

fn map_part(row: &Row<'_>) -> rusqlite::Result<Part> {
    Ok(Part {
        id: row.get(0)?,
        company_id: row.get(1)?,
        part_number: row.get(2)?,
        name: row.get(3)?,
        description: row.get(4)?,
        part_type: parse_column(5, row.get(5)?)?,
        replenishment: parse_column(6, row.get(6)?)?,
        unit_of_measure: row.get(7)?,
        unit_cost: row.get(8)?,
        active: row.get(9)?,
        created_by: row.get(10)?,
        created: parse_ts(11, row.get(11)?)?,
    })
}

/// Resolve a part by id or part number within a company
pub(crate) fn find_part_in(
    conn: &Connection,
    company_id: &EntityId,
    reference: &str,
) -> Result<Part, DbError> {
    let by_id = EntityId::looks_like(reference, EntityPrefix::Part);
    let sql = if by_id {
        format!("SELECT {COLUMNS} FROM part WHERE company_id = ?1 AND id = ?2")
    } else {
        format!("SELECT {COLUMNS} FROM part WHERE company_id = ?1 AND part_number = ?2 COLLATE NOCASE")
    };
    let key = if by_id {
        reference.to_uppercase()
    } else {
        reference.trim().to_string()
    };
    let part = conn
        .query_row(&sql, params![company_id, key], map_part)
        .optional()?;
    not_found_if_none(part, "part", reference)
}

/// Resolve a part for a new document line; inactive parts are refused
pub(crate) fn find_active_part_in(
    conn: &Connection,
    company_id: &EntityId,
    reference: &str,
) -> Result<Part, DbError> {
    let part = find_part_in(conn, company_id, reference)?;
    if !part.active {
        return Err(DbError::InvalidState(format!(
            "part {} is inactive",
            part.part_number
        )));
    }
    Ok(part)
}

fn write_part(conn: &Connection, part: &Part) -> Result<(), DbError> {
    conn.execute(
        "UPDATE part SET name = ?2, description = ?3, part_type = ?4, replenishment = ?5,
                unit_of_measure = ?6, unit_cost = ?7, active = ?8
         WHERE id = ?1",
        params![
            part.id,
            part.name,
            part.description,
            part.part_type.to_string(),
            part.replenishment.to_string(),
            part.unit_of_measure,
            part.unit_cost,
            part.active
        ],
    )?;
    record_change(conn, &part.company_id, Part::TABLE, Operation::Update, &part.id.to_string())
}

impl Database {
    pub fn create_part(&mut self, part: &Part) -> Result<(), DbError> {
        self.write(|tx| {
            tx.execute(
                &format!(
                    "INSERT INTO part ({COLUMNS})
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)"
                ),
                params![
                    part.id,
                    part.company_id,
                    part.part_number,
                    part.name,
                    part.description,
                    part.part_type.to_string(),
                    part.replenishment.to_string(),
                    part.unit_of_measure,
                    part.unit_cost,
                    part.active,
                    part.created_by,
                    ts(&part.created)
                ],
            )
            .map_err(|e| DbError::from_insert(e, "part", &part.part_number))?;
            record_change(tx, &part.company_id, Part::TABLE, Operation::Insert, &part.id.to_string())
        })?;
        tracing::info!(part = %part.part_number, "part created");
        Ok(())
    }

    pub fn find_part(&self, company_id: &EntityId, reference: &str) -> Result<Part, DbError> {
        find_part_in(self.conn(), company_id, reference)
    }

    pub fn list_parts(
        &self,
        company_id: &EntityId,
        filter: &PartFilter,
        page: Page,
    ) -> Result<Vec<Part>, DbError> {
        let mut sql = format!("SELECT {COLUMNS} FROM part WHERE company_id = ?1");
        let mut args: SqlParams = vec![Box::new(company_id.clone())];

        if !filter.include_inactive {
            sql.push_str(" AND active = 1");
        }
        if let Some(t) = filter.part_type {
            args.push(Box::new(t.to_string()));
            sql.push_str(&format!(" AND part_type = ?{}", args.len()));
        }
        if let Some(term) = &filter.search {
            args.push(Box::new(format!("%{}%", term.to_lowercase())));
            sql.push_str(&format!(
                " AND (LOWER(part_number) LIKE ?{n} OR LOWER(name) LIKE ?{n}
                       OR LOWER(COALESCE(description, '')) LIKE ?{n})",
                n = args.len()
            ));
        }
        sql.push_str(" ORDER BY part_number");
        sql.push_str(&page.sql());

        tracing::debug!(%sql, "listing parts");
        let mut stmt = self.conn().prepare(&sql)?;
        let parts = stmt
            .query_map(param_refs(&args).as_slice(), map_part)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(parts)
    }

    pub fn update_part(
        &mut self,
        company_id: &EntityId,
        reference: &str,
        changes: PartUpdate,
    ) -> Result<Part, DbError> {
        if changes.unit_cost.is_some_and(|c| c < 0.0) {
            return Err(DbError::InvalidState("unit cost cannot be negative".into()));
        }
        self.write(|tx| {
            let mut part = find_part_in(tx, company_id, reference)?;
            if let Some(name) = changes.name {
                part.name = name;
            }
            if let Some(desc) = changes.description {
                part.description = (!desc.trim().is_empty()).then_some(desc);
            }
            if let Some(t) = changes.part_type {
                part.part_type = t;
            }
            if let Some(r) = changes.replenishment {
                part.replenishment = r;
            }
            if let Some(uom) = changes.unit_of_measure {
                part.unit_of_measure = uom.to_uppercase();
            }
            if changes.unit_cost.is_some() {
                part.unit_cost = changes.unit_cost;
            }
            write_part(tx, &part)?;
            Ok(part)
        })
    }

    pub fn set_part_active(
        &mut self,
        company_id: &EntityId,
        reference: &str,
        active: bool,
    ) -> Result<Part, DbError> {
        self.write(|tx| {
            let mut part = find_part_in(tx, company_id, reference)?;
            part.active = active;
            write_part(tx, &part)?;
            Ok(part)
        })
    }
}
