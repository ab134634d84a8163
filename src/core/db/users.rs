//! Users, employees, employee types and permission storage

use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::Serialize;

use super::{not_found_if_none, parse_ts, ts, Database, DbError};
use crate::core::entity::{parse_column, Entity};
use crate::core::identity::{EntityId, EntityPrefix};
use crate::core::permissions::{Permission, PermissionError, PermissionSet, Session};
use crate::core::realtime::{record_change, Operation};
use crate::entities::{EmployeeType, User};

const USER_COLUMNS: &str = "id, email, first_name, last_name, user_type, active, created";

/// An employee of a company with the name of their employee type
#[derive(Debug, Clone, Serialize)]
pub struct EmployeeRecord {
    #[serde(flatten)]
    pub user: User,
    pub company_id: EntityId,
    pub employee_type: String,
}

fn map_user(row: &Row<'_>) -> rusqlite::Result<User> {
    Ok(User {
        id: row.get(0)?,
        email: row.get(1)?,
        first_name: row.get(2)?,
        last_name: row.get(3)?,
        user_type: parse_column(4, row.get(4)?)?,
        active: row.get(5)?,
        created: parse_ts(6, row.get(6)?)?,
    })
}

fn map_employee_type(row: &Row<'_>) -> rusqlite::Result<(EntityId, EntityId, String, String)> {
    Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
}

fn build_employee_type(
    (id, company_id, name, permissions): (EntityId, EntityId, String, String),
) -> Result<EmployeeType, DbError> {
    Ok(EmployeeType {
        id,
        company_id,
        name,
        permissions: serde_json::from_str(&permissions)?,
    })
}

pub(crate) fn insert_user(conn: &Connection, user: &User) -> Result<(), DbError> {
    conn.execute(
        &format!("INSERT INTO users ({USER_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)"),
        params![
            user.id,
            user.email,
            user.first_name,
            user.last_name,
            user.user_type.to_string(),
            user.active,
            ts(&user.created)
        ],
    )
    .map_err(|e| DbError::from_insert(e, "user", &user.email))?;
    conn.execute(
        "INSERT INTO user_permission (user_id, permissions) VALUES (?1, '{}')",
        params![user.id],
    )?;
    Ok(())
}

pub(crate) fn find_user_by_email(conn: &Connection, email: &str) -> Result<Option<User>, DbError> {
    Ok(conn
        .query_row(
            &format!("SELECT {USER_COLUMNS} FROM users WHERE email = ?1"),
            params![email.trim().to_lowercase()],
            map_user,
        )
        .optional()?)
}

pub(crate) fn load_permissions(conn: &Connection, user_id: &EntityId) -> Result<PermissionSet, DbError> {
    let json: Option<String> = conn
        .query_row(
            "SELECT permissions FROM user_permission WHERE user_id = ?1",
            params![user_id],
            |row| row.get(0),
        )
        .optional()?;
    match json {
        Some(json) => Ok(serde_json::from_str(&json)?),
        None => Err(DbError::not_found("user", user_id.to_string())),
    }
}

pub(crate) fn save_permissions(
    conn: &Connection,
    user_id: &EntityId,
    company_id: &EntityId,
    permissions: &PermissionSet,
) -> Result<(), DbError> {
    let json = serde_json::to_string(permissions)?;
    conn.execute(
        "INSERT INTO user_permission (user_id, permissions) VALUES (?1, ?2)
         ON CONFLICT (user_id) DO UPDATE SET permissions = excluded.permissions",
        params![user_id, json],
    )?;
    record_change(
        conn,
        company_id,
        "user_permission",
        Operation::Update,
        &user_id.to_string(),
    )?;
    Ok(())
}

/// Grant `add` and revoke `remove` for one user in one company
pub(crate) fn apply_permission_changes(
    conn: &Connection,
    user_id: &EntityId,
    company_id: &EntityId,
    add: &[Permission],
    remove: &[Permission],
) -> Result<PermissionSet, DbError> {
    let mut set = load_permissions(conn, user_id)?;
    let company = company_id.to_string();
    for perm in add {
        set.grant(*perm, &company);
    }
    for perm in remove {
        set.revoke(*perm, &company);
    }
    save_permissions(conn, user_id, company_id, &set)?;
    Ok(set)
}

pub(crate) fn insert_employee_type(conn: &Connection, et: &EmployeeType) -> Result<(), DbError> {
    conn.execute(
        "INSERT INTO employee_type (id, company_id, name, permissions) VALUES (?1, ?2, ?3, ?4)",
        params![
            et.id,
            et.company_id,
            et.name,
            serde_json::to_string(&et.permissions)?
        ],
    )
    .map_err(|e| DbError::from_insert(e, "employee type", &et.name))?;
    record_change(
        conn,
        &et.company_id,
        EmployeeType::TABLE,
        Operation::Insert,
        &et.id.to_string(),
    )?;
    Ok(())
}

/// Make `user` an employee of `company` and apply the type's template
pub(crate) fn insert_employee(
    conn: &Connection,
    user_id: &EntityId,
    company_id: &EntityId,
    employee_type: &EmployeeType,
) -> Result<(), DbError> {
    conn.execute(
        "INSERT INTO employee (user_id, company_id, employee_type_id) VALUES (?1, ?2, ?3)",
        params![user_id, company_id, employee_type.id],
    )
    .map_err(|e| DbError::from_insert(e, "employee", &user_id.to_string()))?;
    record_change(conn, company_id, "employee", Operation::Insert, &user_id.to_string())?;

    let mut set = load_permissions(conn, user_id)?;
    set.apply_template(&employee_type.permissions, &company_id.to_string());
    save_permissions(conn, user_id, company_id, &set)
}

impl Database {
    /// Insert a user account with an empty permission set
    pub fn create_user(&mut self, user: &User) -> Result<(), DbError> {
        self.write(|tx| insert_user(tx, user))?;
        tracing::info!(email = %user.email, "user created");
        Ok(())
    }

    pub fn get_user(&self, id: &EntityId) -> Result<User, DbError> {
        let user = self
            .conn()
            .query_row(
                &format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?1"),
                params![id],
                map_user,
            )
            .optional()?;
        not_found_if_none(user, "user", id.to_string())
    }

    pub fn get_user_by_email(&self, email: &str) -> Result<User, DbError> {
        not_found_if_none(find_user_by_email(self.conn(), email)?, "user", email)
    }

    /// Resolve a user by id or email
    pub fn find_user(&self, reference: &str) -> Result<User, DbError> {
        if EntityId::looks_like(reference, EntityPrefix::User) {
            if let Ok(id) = EntityId::parse(reference) {
                return self.get_user(&id);
            }
        }
        self.get_user_by_email(reference)
    }

    /// Employees of a company
    pub fn list_employees(&self, company_id: &EntityId) -> Result<Vec<EmployeeRecord>, DbError> {
        let mut stmt = self.conn().prepare(
            "SELECT u.id, u.email, u.first_name, u.last_name, u.user_type, u.active, u.created,
                    e.company_id, t.name
             FROM employee e
             JOIN users u ON u.id = e.user_id
             JOIN employee_type t ON t.id = e.employee_type_id
             WHERE e.company_id = ?1
             ORDER BY u.last_name, u.first_name",
        )?;
        let rows = stmt
            .query_map(params![company_id], |row| {
                Ok(EmployeeRecord {
                    user: map_user(row)?,
                    company_id: row.get(7)?,
                    employee_type: row.get(8)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Add an employee to a company
    ///
    /// A user with the same email is reused; otherwise `user` is inserted.
    /// The employee type's permission template is granted in the company.
    pub fn add_employee(
        &mut self,
        user: &User,
        company_id: &EntityId,
        employee_type: &str,
    ) -> Result<EmployeeRecord, DbError> {
        let record = self.write(|tx| {
            let et = find_employee_type(tx, company_id, employee_type)?;
            let user = match find_user_by_email(tx, &user.email)? {
                Some(existing) => existing,
                None => {
                    insert_user(tx, user)?;
                    record_change(tx, company_id, User::TABLE, Operation::Insert, &user.id.to_string())?;
                    user.clone()
                }
            };
            insert_employee(tx, &user.id, company_id, &et)?;
            Ok(EmployeeRecord {
                user,
                company_id: company_id.clone(),
                employee_type: et.name,
            })
        })?;
        tracing::info!(email = %record.user.email, company = %company_id, "employee added");
        Ok(record)
    }

    /// Activate or deactivate a user account
    pub fn set_user_active(
        &mut self,
        user_id: &EntityId,
        company_id: &EntityId,
        active: bool,
    ) -> Result<User, DbError> {
        self.write(|tx| {
            let changed = tx.execute(
                "UPDATE users SET active = ?2 WHERE id = ?1",
                params![user_id, active],
            )?;
            if changed == 0 {
                return Err(DbError::not_found("user", user_id.to_string()));
            }
            record_change(tx, company_id, User::TABLE, Operation::Update, &user_id.to_string())
        })?;
        self.get_user(user_id)
    }

    pub fn get_permissions(&self, user_id: &EntityId) -> Result<PermissionSet, DbError> {
        load_permissions(self.conn(), user_id)
    }

    /// Grant and revoke permissions for one user immediately
    pub fn update_permissions(
        &mut self,
        user_id: &EntityId,
        company_id: &EntityId,
        add: &[Permission],
        remove: &[Permission],
    ) -> Result<PermissionSet, DbError> {
        let set = self.write(|tx| apply_permission_changes(tx, user_id, company_id, add, remove))?;
        tracing::info!(user = %user_id, added = add.len(), removed = remove.len(), "permissions updated");
        Ok(set)
    }

    pub fn create_employee_type(&mut self, et: &EmployeeType) -> Result<(), DbError> {
        self.write(|tx| insert_employee_type(tx, et))?;
        tracing::info!(name = %et.name, "employee type created");
        Ok(())
    }

    pub fn list_employee_types(&self, company_id: &EntityId) -> Result<Vec<EmployeeType>, DbError> {
        let mut stmt = self.conn().prepare(
            "SELECT id, company_id, name, permissions FROM employee_type
             WHERE company_id = ?1 ORDER BY name",
        )?;
        let rows = stmt
            .query_map(params![company_id], map_employee_type)?
            .collect::<Result<Vec<_>, _>>()?;
        rows.into_iter().map(build_employee_type).collect()
    }

    pub fn get_employee_type(
        &self,
        company_id: &EntityId,
        name: &str,
    ) -> Result<EmployeeType, DbError> {
        find_employee_type(self.conn(), company_id, name)
    }

    /// Build the session for `email` acting in `company_id`
    pub fn load_session(&self, email: &str, company_id: &EntityId) -> Result<Session, DbError> {
        let user = find_user_by_email(self.conn(), email)?
            .ok_or_else(|| PermissionError::UnknownUser(email.to_string()))?;
        self.get_company(company_id)?;
        let permissions = load_permissions(self.conn(), &user.id)?;
        Ok(Session {
            user,
            company_id: company_id.clone(),
            permissions,
        })
    }
}

fn find_employee_type(
    conn: &Connection,
    company_id: &EntityId,
    name: &str,
) -> Result<EmployeeType, DbError> {
    let row = conn
        .query_row(
            "SELECT id, company_id, name, permissions FROM employee_type
             WHERE company_id = ?1 AND name = ?2 COLLATE NOCASE",
            params![company_id, name],
            map_employee_type,
        )
        .optional()?;
    build_employee_type(not_found_if_none(row, "employee type", name)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::db::testing::fixture;
    use crate::core::permissions::{
        require_permissions, Action, Module, Requirements, ALL_COMPANIES,
    };
    use crate::entities::UserType;

    fn newcomer() -> User {
        User::new(
            "Bob@Acme.test",
            "Bob".to_string(),
            "Builder".to_string(),
            UserType::Employee,
        )
    }

    #[test]
    fn test_duplicate_email_is_refused() {
        let mut fx = fixture();
        let dup = User::new(
            "ADMIN@acme.test",
            "Other".to_string(),
            "Admin".to_string(),
            UserType::Employee,
        );
        let err = fx.db.create_user(&dup).unwrap_err();
        assert!(matches!(err, DbError::Duplicate { kind: "user", .. }));
    }

    #[test]
    fn test_creator_is_admin_employee() {
        let fx = fixture();
        let employees = fx.db.list_employees(fx.company_id()).unwrap();
        assert_eq!(employees.len(), 1);
        assert_eq!(employees[0].employee_type, "Admin");

        let session = fx.db.load_session("admin@acme.test", fx.company_id()).unwrap();
        let all = Permission::all().len();
        assert_eq!(session.permissions.held_in(fx.company_id()).len(), all);
    }

    #[test]
    fn test_add_employee_applies_template() {
        let mut fx = fixture();
        let company = fx.company_id().clone();
        let mut template = PermissionSet::new();
        template.grant(Permission::new(Module::Sales, Action::View), ALL_COMPANIES);
        template.grant(Permission::new(Module::Sales, Action::Create), ALL_COMPANIES);
        let et = EmployeeType::new(company.clone(), "Sales".to_string(), template);
        fx.db.create_employee_type(&et).unwrap();

        let record = fx.db.add_employee(&newcomer(), &company, "sales").unwrap();
        assert_eq!(record.user.email, "bob@acme.test");
        assert_eq!(record.employee_type, "Sales");

        let session = fx.db.load_session("bob@acme.test", &company).unwrap();
        assert!(require_permissions(&session, &Requirements::new().create(Module::Sales)).is_ok());
        assert!(require_permissions(&session, &Requirements::new().view(Module::Parts)).is_err());
    }

    #[test]
    fn test_add_employee_unknown_type() {
        let mut fx = fixture();
        let company = fx.company_id().clone();
        let err = fx.db.add_employee(&newcomer(), &company, "Wizard").unwrap_err();
        assert!(matches!(err, DbError::NotFound { kind: "employee type", .. }));
        assert!(fx.db.get_user_by_email("bob@acme.test").is_err());
    }

    #[test]
    fn test_update_permissions_grant_and_revoke() {
        let mut fx = fixture();
        let company = fx.company_id().clone();
        let admin = fx.admin.id.clone();
        let perm = Permission::new(Module::Accounting, Action::Delete);

        let set = fx.db.update_permissions(&admin, &company, &[], &[perm]).unwrap();
        assert!(!set.allows(perm, &company));

        let set = fx.db.update_permissions(&admin, &company, &[perm], &[]).unwrap();
        assert!(set.allows(perm, &company));
        assert_eq!(fx.db.get_permissions(&admin).unwrap(), set);
    }

    #[test]
    fn test_deactivated_user_fails_gate() {
        let mut fx = fixture();
        let company = fx.company_id().clone();
        let admin = fx.admin.id.clone();
        let user = fx.db.set_user_active(&admin, &company, false).unwrap();
        assert!(!user.active);

        let session = fx.db.load_session("admin@acme.test", &company).unwrap();
        let err = require_permissions(&session, &Requirements::new()).unwrap_err();
        assert!(matches!(err, PermissionError::Inactive(_)));
    }

    #[test]
    fn test_unknown_session_user() {
        let fx = fixture();
        let err = fx.db.load_session("ghost@acme.test", fx.company_id()).unwrap_err();
        assert!(matches!(
            err,
            DbError::Permission(PermissionError::UnknownUser(_))
        ));
    }

    #[test]
    fn test_find_user_by_id_or_email() {
        let fx = fixture();
        let by_id = fx.db.find_user(&fx.admin.id.to_string()).unwrap();
        let by_email = fx.db.find_user("admin@acme.test").unwrap();
        assert_eq!(by_id.id, by_email.id);
    }
}
