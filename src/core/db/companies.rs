//! Companies (tenants) and the data seeded with each one

use rusqlite::{params, OptionalExtension, Row};

use super::accounts::insert_account;
use super::users::{insert_employee, insert_employee_type};
use super::{not_found_if_none, parse_ts, ts, Database, DbError};
use crate::core::entity::Entity;
use crate::core::identity::{EntityId, EntityPrefix};
use crate::core::permissions::PermissionSet;
use crate::core::realtime::{record_change, Operation};
use crate::core::sequence;
use crate::entities::account::default_chart;
use crate::entities::{Account, Company, EmployeeType};

/// Employee type seeded with every company; holds every permission
pub const ADMIN_EMPLOYEE_TYPE: &str = "Admin";

fn map_company(row: &Row<'_>) -> rusqlite::Result<Company> {
    Ok(Company {
        id: row.get(0)?,
        name: row.get(1)?,
        base_currency: row.get(2)?,
        created: parse_ts(3, row.get(3)?)?,
    })
}

impl Database {
    /// Create a company and everything a new tenant needs
    ///
    /// Seeds the default sequences, the default chart of accounts and an
    /// `Admin` employee type, then makes `creator` an admin employee.
    pub fn create_company(
        &mut self,
        name: &str,
        base_currency: &str,
        creator: &EntityId,
    ) -> Result<Company, DbError> {
        let company = Company::new(name.trim().to_string(), base_currency.trim().to_string());

        self.write(|tx| {
            tx.execute(
                "INSERT INTO company (id, name, base_currency, created) VALUES (?1, ?2, ?3, ?4)",
                params![
                    company.id,
                    company.name,
                    company.base_currency,
                    ts(&company.created)
                ],
            )?;
            record_change(
                tx,
                &company.id,
                Company::TABLE,
                Operation::Insert,
                &company.id.to_string(),
            )?;

            sequence::seed_defaults(tx, &company.id)?;

            for (number, account_name, account_type) in default_chart() {
                let account =
                    Account::new(company.id.clone(), number, account_name, *account_type);
                insert_account(tx, &account)?;
            }

            let admin = EmployeeType::new(
                company.id.clone(),
                ADMIN_EMPLOYEE_TYPE.to_string(),
                PermissionSet::full(&company.id.to_string()),
            );
            insert_employee_type(tx, &admin)?;
            insert_employee(tx, creator, &company.id, &admin)
        })?;

        tracing::info!(company = %company.id, name = %company.name, "company created");
        Ok(company)
    }

    pub fn get_company(&self, id: &EntityId) -> Result<Company, DbError> {
        let company = self
            .conn()
            .query_row(
                "SELECT id, name, base_currency, created FROM company WHERE id = ?1",
                params![id],
                map_company,
            )
            .optional()?;
        not_found_if_none(company, "company", id.to_string())
    }

    /// Resolve a company by id or exact name
    pub fn find_company(&self, reference: &str) -> Result<Company, DbError> {
        if EntityId::looks_like(reference, EntityPrefix::Comp) {
            if let Ok(id) = EntityId::parse(reference) {
                return self.get_company(&id);
            }
        }
        let company = self
            .conn()
            .query_row(
                "SELECT id, name, base_currency, created FROM company
                 WHERE name = ?1 COLLATE NOCASE",
                params![reference],
                map_company,
            )
            .optional()?;
        not_found_if_none(company, "company", reference)
    }

    pub fn list_companies(&self) -> Result<Vec<Company>, DbError> {
        let mut stmt = self
            .conn()
            .prepare("SELECT id, name, base_currency, created FROM company ORDER BY name")?;
        let rows = stmt
            .query_map([], map_company)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::db::testing::fixture;

    #[test]
    fn test_new_company_is_seeded() {
        let fx = fixture();
        let company = fx.company_id();

        assert_eq!(fx.db.list_sequences(company).unwrap().len(), 3);
        assert_eq!(
            fx.db.list_accounts(company, None).unwrap().len(),
            default_chart().len()
        );
        let types = fx.db.list_employee_types(company).unwrap();
        assert_eq!(types.len(), 1);
        assert_eq!(types[0].name, ADMIN_EMPLOYEE_TYPE);
    }

    #[test]
    fn test_companies_are_isolated() {
        let mut fx = fixture();
        let admin = fx.admin.id.clone();
        let other = fx.db.create_company("Beta Castings", "eur", &admin).unwrap();
        assert_eq!(other.base_currency, "EUR");

        let first = fx.company_id().clone();
        assert_eq!(fx.db.get_next_sequence(&first, "quote").unwrap(), "Q000001");
        assert_eq!(fx.db.get_next_sequence(&other.id, "quote").unwrap(), "Q000001");
        assert_eq!(fx.db.list_companies().unwrap().len(), 2);
    }

    #[test]
    fn test_find_company_by_name() {
        let fx = fixture();
        let found = fx.db.find_company("acme fabrication").unwrap();
        assert_eq!(&found.id, fx.company_id());
        assert!(fx.db.find_company("Nope Inc").is_err());
    }
}
