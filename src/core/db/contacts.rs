//! Customers and suppliers
//!
//! Both tables share one column layout, so the queries here are written
//! once against the table name and mapped into the right record type.

use rusqlite::{params, Connection, OptionalExtension, Row};

use super::{not_found_if_none, param_refs, parse_ts, ts, Database, DbError, Page, SqlParams};
use crate::core::entity::Entity;
use crate::core::identity::{EntityId, EntityPrefix};
use crate::core::realtime::{record_change, Operation};
use crate::entities::{ContactDetails, Customer, Supplier};

const COLUMNS: &str = "id, company_id, name, tax_id, email, phone, active, created_by, created";

/// Field changes for a customer or supplier; `None` leaves a field alone
/// and `Some("")` clears an optional one
#[derive(Debug, Clone, Default)]
pub struct ContactUpdate {
    pub name: Option<String>,
    pub tax_id: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
}

impl ContactUpdate {
    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.tax_id.is_none() && self.email.is_none() && self.phone.is_none()
    }

    fn apply(self, name: &mut String, details: &mut ContactDetails) {
        fn clearable(value: String) -> Option<String> {
            let value = value.trim().to_string();
            (!value.is_empty()).then_some(value)
        }
        if let Some(n) = self.name {
            *name = n.trim().to_string();
        }
        if let Some(v) = self.tax_id {
            details.tax_id = clearable(v);
        }
        if let Some(v) = self.email {
            details.email = clearable(v);
        }
        if let Some(v) = self.phone {
            details.phone = clearable(v);
        }
    }
}

struct ContactRow {
    id: EntityId,
    company_id: EntityId,
    name: String,
    details: ContactDetails,
    active: bool,
    created_by: EntityId,
    created: chrono::DateTime<chrono::Utc>,
}

fn map_row(row: &Row<'_>) -> rusqlite::Result<ContactRow> {
    Ok(ContactRow {
        id: row.get(0)?,
        company_id: row.get(1)?,
        name: row.get(2)?,
        details: ContactDetails {
            tax_id: row.get(3)?,
            email: row.get(4)?,
            phone: row.get(5)?,
        },
        active: row.get(6)?,
        created_by: row.get(7)?,
        created: parse_ts(8, row.get(8)?)?,
    })
}

impl From<ContactRow> for Customer {
    fn from(r: ContactRow) -> Self {
        Customer {
            id: r.id,
            company_id: r.company_id,
            name: r.name,
            details: r.details,
            active: r.active,
            created_by: r.created_by,
            created: r.created,
        }
    }
}

impl From<ContactRow> for Supplier {
    fn from(r: ContactRow) -> Self {
        Supplier {
            id: r.id,
            company_id: r.company_id,
            name: r.name,
            details: r.details,
            active: r.active,
            created_by: r.created_by,
            created: r.created,
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn insert(
    conn: &Connection,
    table: &'static str,
    id: &EntityId,
    company_id: &EntityId,
    name: &str,
    details: &ContactDetails,
    created_by: &EntityId,
    created: &chrono::DateTime<chrono::Utc>,
) -> Result<(), DbError> {
    conn.execute(
        &format!("INSERT INTO {table} ({COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, 1, ?7, ?8)"),
        params![
            id,
            company_id,
            name,
            details.tax_id,
            details.email,
            details.phone,
            created_by,
            ts(created)
        ],
    )?;
    record_change(conn, company_id, table, Operation::Insert, &id.to_string())
}

fn get(
    conn: &Connection,
    table: &'static str,
    company_id: &EntityId,
    id: &EntityId,
) -> Result<ContactRow, DbError> {
    let row = conn
        .query_row(
            &format!("SELECT {COLUMNS} FROM {table} WHERE company_id = ?1 AND id = ?2"),
            params![company_id, id],
            map_row,
        )
        .optional()?;
    not_found_if_none(row, table, id.to_string())
}

/// Resolve by id, or by exact (case-insensitive) name when unambiguous
fn find(
    conn: &Connection,
    table: &'static str,
    prefix: EntityPrefix,
    company_id: &EntityId,
    reference: &str,
) -> Result<ContactRow, DbError> {
    if EntityId::looks_like(reference, prefix) {
        if let Ok(id) = EntityId::parse(reference) {
            return get(conn, table, company_id, &id);
        }
    }
    let mut stmt = conn.prepare(&format!(
        "SELECT {COLUMNS} FROM {table} WHERE company_id = ?1 AND name = ?2 COLLATE NOCASE LIMIT 2"
    ))?;
    let mut rows = stmt
        .query_map(params![company_id, reference.trim()], map_row)?
        .collect::<Result<Vec<_>, _>>()?;
    match rows.len() {
        0 => Err(DbError::not_found(table, reference)),
        1 => Ok(rows.remove(0)),
        _ => Err(DbError::InvalidState(format!(
            "more than one {table} is named '{reference}'; use the id"
        ))),
    }
}

fn list(
    conn: &Connection,
    table: &'static str,
    company_id: &EntityId,
    search: Option<&str>,
    include_inactive: bool,
    page: Page,
) -> Result<Vec<ContactRow>, DbError> {
    let mut sql = format!("SELECT {COLUMNS} FROM {table} WHERE company_id = ?1");
    let mut args: SqlParams = vec![Box::new(company_id.clone())];
    if !include_inactive {
        sql.push_str(" AND active = 1");
    }
    if let Some(term) = search {
        args.push(Box::new(format!("%{}%", term.to_lowercase())));
        sql.push_str(&format!(
            " AND (LOWER(name) LIKE ?{n} OR LOWER(COALESCE(email, '')) LIKE ?{n})",
            n = args.len()
        ));
    }
    sql.push_str(" ORDER BY name");
    sql.push_str(&page.sql());

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(param_refs(&args).as_slice(), map_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

fn update(
    conn: &Connection,
    table: &'static str,
    row: &ContactRow,
) -> Result<(), DbError> {
    conn.execute(
        &format!(
            "UPDATE {table} SET name = ?2, tax_id = ?3, email = ?4, phone = ?5, active = ?6
             WHERE id = ?1"
        ),
        params![
            row.id,
            row.name,
            row.details.tax_id,
            row.details.email,
            row.details.phone,
            row.active
        ],
    )?;
    record_change(conn, &row.company_id, table, Operation::Update, &row.id.to_string())
}

fn modify(
    db: &mut Database,
    table: &'static str,
    prefix: EntityPrefix,
    company_id: &EntityId,
    reference: &str,
    f: impl FnOnce(&mut ContactRow),
) -> Result<ContactRow, DbError> {
    db.write(|tx| {
        let mut row = find(tx, table, prefix, company_id, reference)?;
        f(&mut row);
        update(tx, table, &row)?;
        Ok(row)
    })
}

impl Database {
    pub fn create_customer(&mut self, c: &Customer) -> Result<(), DbError> {
        self.write(|tx| {
            insert(
                tx,
                Customer::TABLE,
                &c.id,
                &c.company_id,
                &c.name,
                &c.details,
                &c.created_by,
                &c.created,
            )
        })?;
        tracing::info!(customer = %c.id, name = %c.name, "customer created");
        Ok(())
    }

    pub fn find_customer(&self, company_id: &EntityId, reference: &str) -> Result<Customer, DbError> {
        find(self.conn(), Customer::TABLE, EntityPrefix::Cust, company_id, reference).map(Into::into)
    }

    pub fn get_customer(&self, company_id: &EntityId, id: &EntityId) -> Result<Customer, DbError> {
        get(self.conn(), Customer::TABLE, company_id, id).map(Into::into)
    }

    pub fn list_customers(
        &self,
        company_id: &EntityId,
        search: Option<&str>,
        include_inactive: bool,
        page: Page,
    ) -> Result<Vec<Customer>, DbError> {
        Ok(list(self.conn(), Customer::TABLE, company_id, search, include_inactive, page)?
            .into_iter()
            .map(Into::into)
            .collect())
    }

    pub fn update_customer(
        &mut self,
        company_id: &EntityId,
        reference: &str,
        changes: ContactUpdate,
    ) -> Result<Customer, DbError> {
        let row = modify(self, Customer::TABLE, EntityPrefix::Cust, company_id, reference, |r| {
            changes.apply(&mut r.name, &mut r.details)
        })?;
        Ok(row.into())
    }

    pub fn set_customer_active(
        &mut self,
        company_id: &EntityId,
        reference: &str,
        active: bool,
    ) -> Result<Customer, DbError> {
        let row = modify(self, Customer::TABLE, EntityPrefix::Cust, company_id, reference, |r| {
            r.active = active
        })?;
        Ok(row.into())
    }

    pub fn create_supplier(&mut self, s: &Supplier) -> Result<(), DbError> {
        self.write(|tx| {
            insert(
                tx,
                Supplier::TABLE,
                &s.id,
                &s.company_id,
                &s.name,
                &s.details,
                &s.created_by,
                &s.created,
            )
        })?;
        tracing::info!(supplier = %s.id, name = %s.name, "supplier created");
        Ok(())
    }

    pub fn find_supplier(&self, company_id: &EntityId, reference: &str) -> Result<Supplier, DbError> {
        find(self.conn(), Supplier::TABLE, EntityPrefix::Supp, company_id, reference).map(Into::into)
    }

    pub fn get_supplier(&self, company_id: &EntityId, id: &EntityId) -> Result<Supplier, DbError> {
        get(self.conn(), Supplier::TABLE, company_id, id).map(Into::into)
    }

    pub fn list_suppliers(
        &self,
        company_id: &EntityId,
        search: Option<&str>,
        include_inactive: bool,
        page: Page,
    ) -> Result<Vec<Supplier>, DbError> {
        Ok(list(self.conn(), Supplier::TABLE, company_id, search, include_inactive, page)?
            .into_iter()
            .map(Into::into)
            .collect())
    }

    pub fn update_supplier(
        &mut self,
        company_id: &EntityId,
        reference: &str,
        changes: ContactUpdate,
    ) -> Result<Supplier, DbError> {
        let row = modify(self, Supplier::TABLE, EntityPrefix::Supp, company_id, reference, |r| {
            changes.apply(&mut r.name, &mut r.details)
        })?;
        Ok(row.into())
    }

    pub fn set_supplier_active(
        &mut self,
        company_id: &EntityId,
        reference: &str,
        active: bool,
    ) -> Result<Supplier, DbError> {
        let row = modify(self, Supplier::TABLE, EntityPrefix::Supp, company_id, reference, |r| {
            r.active = active
        })?;
        Ok(row.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::db::testing::{fixture, Fixture};

    fn add_customer(fx: &mut Fixture, name: &str) -> Customer {
        let c = Customer::new(
            fx.company_id().clone(),
            name.to_string(),
            ContactDetails {
                email: Some(format!("buyer@{}.test", name.to_lowercase())),
                ..Default::default()
            },
            fx.admin.id.clone(),
        );
        fx.db.create_customer(&c).unwrap();
        c
    }

    #[test]
    fn test_find_customer_by_name_or_id() {
        let mut fx = fixture();
        let c = add_customer(&mut fx, "Globex");
        let company = fx.company_id().clone();
        assert_eq!(fx.db.find_customer(&company, "globex").unwrap().id, c.id);
        assert_eq!(
            fx.db.find_customer(&company, &c.id.to_string()).unwrap().name,
            "Globex"
        );
    }

    #[test]
    fn test_ambiguous_name_asks_for_id() {
        let mut fx = fixture();
        add_customer(&mut fx, "Initech");
        add_customer(&mut fx, "Initech");
        let company = fx.company_id().clone();
        let err = fx.db.find_customer(&company, "Initech").unwrap_err();
        assert!(matches!(err, DbError::InvalidState(_)));
    }

    #[test]
    fn test_update_and_clear_fields() {
        let mut fx = fixture();
        add_customer(&mut fx, "Hooli");
        let company = fx.company_id().clone();
        let updated = fx
            .db
            .update_customer(
                &company,
                "Hooli",
                ContactUpdate {
                    phone: Some("555-0100".to_string()),
                    email: Some(String::new()),
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(updated.details.phone.as_deref(), Some("555-0100"));
        assert!(updated.details.email.is_none());
    }

    #[test]
    fn test_list_hides_inactive_and_pages() {
        let mut fx = fixture();
        for name in ["Alpha", "Bravo", "Charlie"] {
            add_customer(&mut fx, name);
        }
        let company = fx.company_id().clone();
        fx.db.set_customer_active(&company, "Bravo", false).unwrap();

        let active = fx.db.list_customers(&company, None, false, Page::default()).unwrap();
        assert_eq!(active.len(), 2);

        let all = fx.db.list_customers(&company, None, true, Page::new(Some(2), 1)).unwrap();
        let names: Vec<_> = all.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["Bravo", "Charlie"]);

        let found = fx.db.list_customers(&company, Some("CHAR"), false, Page::default()).unwrap();
        assert_eq!(found.len(), 1);
    }

    #[test]
    fn test_suppliers_are_separate() {
        let mut fx = fixture();
        add_customer(&mut fx, "Umbrella");
        let company = fx.company_id().clone();
        let s = Supplier::new(
            company.clone(),
            "Umbrella".to_string(),
            ContactDetails::default(),
            fx.admin.id.clone(),
        );
        fx.db.create_supplier(&s).unwrap();

        assert_eq!(fx.db.find_supplier(&company, "umbrella").unwrap().id, s.id);
        assert_eq!(fx.db.list_suppliers(&company, None, false, Page::default()).unwrap().len(), 1);
        let off = fx.db.set_supplier_active(&company, &s.id.to_string(), false).unwrap();
        assert!(!off.active);
    }
}
