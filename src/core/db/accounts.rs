//! Chart of accounts

use rusqlite::{params, Connection, OptionalExtension, Row};

use super::{not_found_if_none, Database, DbError};
use crate::core::entity::{parse_column, Entity};
use crate::core::identity::EntityId;
use crate::core::realtime::{record_change, Operation};
use crate::entities::{Account, AccountType};

const COLUMNS: &str = "id, company_id, number, name, account_type, active";

fn map_account(row: &Row<'_>) -> rusqlite::Result<Account> {
    Ok(Account {
        id: row.get(0)?,
        company_id: row.get(1)?,
        number: row.get(2)?,
        name: row.get(3)?,
        account_type: parse_column(4, row.get(4)?)?,
        active: row.get(5)?,
    })
}

pub(crate) fn insert_account(conn: &Connection, account: &Account) -> Result<(), DbError> {
    conn.execute(
        &format!("INSERT INTO account ({COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6)"),
        params![
            account.id,
            account.company_id,
            account.number,
            account.name,
            account.account_type.to_string(),
            account.active
        ],
    )
    .map_err(|e| DbError::from_insert(e, "account", &account.number))?;
    record_change(
        conn,
        &account.company_id,
        Account::TABLE,
        Operation::Insert,
        &account.id.to_string(),
    )
}

impl Database {
    pub fn create_account(&mut self, account: &Account) -> Result<(), DbError> {
        self.write(|tx| insert_account(tx, account))?;
        tracing::info!(number = %account.number, "account created");
        Ok(())
    }

    /// Accounts ordered by number, optionally of one type
    pub fn list_accounts(
        &self,
        company_id: &EntityId,
        account_type: Option<AccountType>,
    ) -> Result<Vec<Account>, DbError> {
        let mut stmt = self.conn().prepare(&format!(
            "SELECT {COLUMNS} FROM account
             WHERE company_id = ?1 AND (?2 IS NULL OR account_type = ?2)
             ORDER BY number"
        ))?;
        let rows = stmt
            .query_map(
                params![company_id, account_type.map(|t| t.to_string())],
                map_account,
            )?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn get_account(&self, company_id: &EntityId, number: &str) -> Result<Account, DbError> {
        let account = self
            .conn()
            .query_row(
                &format!("SELECT {COLUMNS} FROM account WHERE company_id = ?1 AND number = ?2"),
                params![company_id, number],
                map_account,
            )
            .optional()?;
        not_found_if_none(account, "account", number)
    }

    pub fn set_account_active(
        &mut self,
        company_id: &EntityId,
        number: &str,
        active: bool,
    ) -> Result<Account, DbError> {
        let mut account = self.get_account(company_id, number)?;
        self.write(|tx| {
            tx.execute(
                "UPDATE account SET active = ?2 WHERE id = ?1",
                params![account.id, active],
            )?;
            record_change(
                tx,
                company_id,
                Account::TABLE,
                Operation::Update,
                &account.id.to_string(),
            )
        })?;
        account.active = active;
        Ok(account)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::db::testing::fixture;

    #[test]
    fn test_account_number_unique_per_company() {
        let mut fx = fixture();
        let company = fx.company_id().clone();
        let dup = Account::new(company, "1000", "Petty Cash", AccountType::Asset);
        let err = fx.db.create_account(&dup).unwrap_err();
        assert!(matches!(err, DbError::Duplicate { kind: "account", .. }));
    }

    #[test]
    fn test_list_filters_by_type() {
        let mut fx = fixture();
        let company = fx.company_id().clone();
        fx.db
            .create_account(&Account::new(
                company.clone(),
                "4100",
                "Service Revenue",
                AccountType::Revenue,
            ))
            .unwrap();

        let revenue = fx.db.list_accounts(&company, Some(AccountType::Revenue)).unwrap();
        let numbers: Vec<_> = revenue.iter().map(|a| a.number.as_str()).collect();
        assert_eq!(numbers, vec!["4000", "4100"]);
    }

    #[test]
    fn test_deactivate_account() {
        let mut fx = fixture();
        let company = fx.company_id().clone();
        let account = fx.db.set_account_active(&company, "6000", false).unwrap();
        assert!(!account.active);
        assert!(!fx.db.get_account(&company, "6000").unwrap().active);
    }
}
