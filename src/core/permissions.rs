//! Permission model and the gate every command passes through
//!
//! A permission is a `(module, action)` pair stored under the key
//! `"<module>_<action>"`. Each key maps to the companies where the user holds
//! it; [`ALL_COMPANIES`] grants it everywhere.

use clap::ValueEnum;
use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

use crate::core::identity::EntityId;
use crate::entities::{User, UserType};

/// Company list entry that matches every company
pub const ALL_COMPANIES: &str = "*";

/// Functional area of the ERP
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ValueEnum, PartialOrd, Ord,
)]
#[serde(rename_all = "lowercase")]
pub enum Module {
    Accounting,
    Documents,
    Inventory,
    Parts,
    Purchasing,
    Resources,
    Sales,
    Settings,
    Users,
}

impl Module {
    pub fn all() -> &'static [Module] {
        &[
            Module::Accounting,
            Module::Documents,
            Module::Inventory,
            Module::Parts,
            Module::Purchasing,
            Module::Resources,
            Module::Sales,
            Module::Settings,
            Module::Users,
        ]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Module::Accounting => "accounting",
            Module::Documents => "documents",
            Module::Inventory => "inventory",
            Module::Parts => "parts",
            Module::Purchasing => "purchasing",
            Module::Resources => "resources",
            Module::Sales => "sales",
            Module::Settings => "settings",
            Module::Users => "users",
        }
    }
}

impl std::fmt::Display for Module {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for Module {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.to_lowercase();
        Module::all()
            .iter()
            .copied()
            .find(|m| m.as_str() == lower)
            .ok_or_else(|| format!("Unknown module: {}", s))
    }
}

/// What the user wants to do within a module
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ValueEnum, PartialOrd, Ord,
)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    View,
    Create,
    Update,
    Delete,
}

impl Action {
    pub fn all() -> &'static [Action] {
        &[Action::View, Action::Create, Action::Update, Action::Delete]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Action::View => "view",
            Action::Create => "create",
            Action::Update => "update",
            Action::Delete => "delete",
        }
    }
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for Action {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "view" => Ok(Action::View),
            "create" => Ok(Action::Create),
            "update" => Ok(Action::Update),
            "delete" => Ok(Action::Delete),
            _ => Err(format!("Unknown action: {}", s)),
        }
    }
}

/// A single permission, e.g. `sales_view`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Permission {
    pub module: Module,
    pub action: Action,
}

impl Permission {
    pub fn new(module: Module, action: Action) -> Self {
        Self { module, action }
    }

    pub fn key(&self) -> String {
        format!("{}_{}", self.module, self.action)
    }

    /// Every permission in the system
    pub fn all() -> Vec<Permission> {
        Module::all()
            .iter()
            .flat_map(|m| Action::all().iter().map(move |a| Permission::new(*m, *a)))
            .collect()
    }
}

impl std::fmt::Display for Permission {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.key())
    }
}

impl std::str::FromStr for Permission {
    type Err = PermissionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (module, action) = s
            .rsplit_once('_')
            .ok_or_else(|| PermissionError::InvalidPermission(s.to_string()))?;
        let module = module
            .parse()
            .map_err(|_| PermissionError::InvalidPermission(s.to_string()))?;
        let action = action
            .parse()
            .map_err(|_| PermissionError::InvalidPermission(s.to_string()))?;
        Ok(Permission { module, action })
    }
}

impl Serialize for Permission {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.key())
    }
}

impl<'de> Deserialize<'de> for Permission {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Permission key -> companies where it is held
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PermissionSet(BTreeMap<String, Vec<String>>);

impl PermissionSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every permission, scoped to one company or to all of them
    pub fn full(company: &str) -> Self {
        let mut set = Self::new();
        for perm in Permission::all() {
            set.grant(perm, company);
        }
        set
    }

    pub fn grant(&mut self, perm: Permission, company: &str) {
        let companies = self.0.entry(perm.key()).or_default();
        if !companies.iter().any(|c| c == company) {
            companies.push(company.to_string());
            companies.sort();
        }
    }

    /// Remove `perm` for `company`. Returns true if anything changed.
    pub fn revoke(&mut self, perm: Permission, company: &str) -> bool {
        let key = perm.key();
        let Some(companies) = self.0.get_mut(&key) else {
            return false;
        };
        let before = companies.len();
        companies.retain(|c| c != company);
        let changed = companies.len() < before;
        if companies.is_empty() {
            self.0.remove(&key);
        }
        changed
    }

    pub fn allows(&self, perm: Permission, company_id: &EntityId) -> bool {
        let company = company_id.to_string();
        self.0
            .get(&perm.key())
            .is_some_and(|cs| cs.iter().any(|c| c == ALL_COMPANIES || *c == company))
    }

    /// Apply an employee-type template: every permission it names is
    /// granted for `company`
    pub fn apply_template(&mut self, template: &PermissionSet, company: &str) {
        for perm in template.permissions() {
            self.grant(perm, company);
        }
    }

    /// Permissions held in `company_id` (directly or via `*`)
    pub fn held_in(&self, company_id: &EntityId) -> Vec<Permission> {
        Permission::all()
            .into_iter()
            .filter(|p| self.allows(*p, company_id))
            .collect()
    }

    /// Permission keys present in the set, regardless of company
    pub fn permissions(&self) -> Vec<Permission> {
        self.0.keys().filter_map(|k| k.parse().ok()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// The acting user and the company they are working in
#[derive(Debug, Clone)]
pub struct Session {
    pub user: User,
    pub company_id: EntityId,
    pub permissions: PermissionSet,
}

/// Proof that a permission check passed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Authorized {
    pub user_id: EntityId,
    pub company_id: EntityId,
}

/// What a handler needs before it may run
#[derive(Debug, Clone, Default)]
pub struct Requirements {
    permissions: Vec<Permission>,
    user_type: Option<UserType>,
}

impl Requirements {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn view(mut self, module: Module) -> Self {
        self.permissions.push(Permission::new(module, Action::View));
        self
    }

    pub fn create(mut self, module: Module) -> Self {
        self.permissions.push(Permission::new(module, Action::Create));
        self
    }

    pub fn update(mut self, module: Module) -> Self {
        self.permissions.push(Permission::new(module, Action::Update));
        self
    }

    pub fn delete(mut self, module: Module) -> Self {
        self.permissions.push(Permission::new(module, Action::Delete));
        self
    }

    pub fn user_type(mut self, user_type: UserType) -> Self {
        self.user_type = Some(user_type);
        self
    }
}

/// Check the session against `requirements`
///
/// The user must be active, match the required user type (if any), and hold
/// every listed permission in the session company.
pub fn require_permissions(
    session: &Session,
    requirements: &Requirements,
) -> Result<Authorized, PermissionError> {
    if !session.user.active {
        return Err(PermissionError::Inactive(session.user.email.clone()));
    }

    if let Some(expected) = requirements.user_type {
        if session.user.user_type != expected {
            return Err(PermissionError::WrongUserType {
                expected,
                actual: session.user.user_type,
            });
        }
    }

    if let Some(missing) = requirements
        .permissions
        .iter()
        .find(|p| !session.permissions.allows(**p, &session.company_id))
    {
        tracing::warn!(
            user = %session.user.email,
            permission = %missing,
            company = %session.company_id,
            "permission denied"
        );
        return Err(PermissionError::Unauthorized {
            user: session.user.email.clone(),
            permission: missing.key(),
            company: session.company_id.to_string(),
        });
    }

    Ok(Authorized {
        user_id: session.user.id.clone(),
        company_id: session.company_id.clone(),
    })
}

/// Errors raised by the permission gate
#[derive(Debug, Error, Diagnostic)]
pub enum PermissionError {
    #[error("no acting user configured")]
    #[diagnostic(
        code(iw::auth::no_user),
        help("set IW_USER or run `iw config set user <email>`")
    )]
    NoUser,

    #[error("no company selected")]
    #[diagnostic(
        code(iw::auth::no_company),
        help("pass --company, set IW_COMPANY, or run `iw company use <id>`")
    )]
    NoCompany,

    #[error("unknown user '{0}'")]
    #[diagnostic(code(iw::auth::unknown_user))]
    UnknownUser(String),

    #[error("user '{0}' is deactivated")]
    #[diagnostic(code(iw::auth::inactive))]
    Inactive(String),

    #[error("'{user}' lacks permission {permission} in company {company}")]
    #[diagnostic(
        code(iw::auth::unauthorized),
        help("an administrator can grant it with `iw user grant <email> <permission>`")
    )]
    Unauthorized {
        user: String,
        permission: String,
        company: String,
    },

    #[error("this action requires a {expected} account (you are {actual})")]
    #[diagnostic(code(iw::auth::user_type))]
    WrongUserType { expected: UserType, actual: UserType },

    #[error("invalid permission '{0}' (expected <module>_<action>, e.g. sales_view)")]
    #[diagnostic(code(iw::auth::invalid_permission))]
    InvalidPermission(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::identity::EntityPrefix;

    fn session_with(perms: PermissionSet, user_type: UserType) -> Session {
        Session {
            user: User::new(
                "jsmith@example.com",
                "Jane".to_string(),
                "Smith".to_string(),
                user_type,
            ),
            company_id: EntityId::new(EntityPrefix::Comp),
            permissions: perms,
        }
    }

    #[test]
    fn test_permission_key_roundtrip() {
        let perm: Permission = "purchasing_create".parse().unwrap();
        assert_eq!(perm.module, Module::Purchasing);
        assert_eq!(perm.action, Action::Create);
        assert_eq!(perm.key(), "purchasing_create");
    }

    #[test]
    fn test_permission_parse_rejects_garbage() {
        assert!("sales".parse::<Permission>().is_err());
        assert!("sales_fly".parse::<Permission>().is_err());
        assert!("kitchen_view".parse::<Permission>().is_err());
    }

    #[test]
    fn test_full_set_covers_everything() {
        let company = EntityId::new(EntityPrefix::Comp);
        let set = PermissionSet::full(ALL_COMPANIES);
        assert_eq!(set.held_in(&company).len(), Module::all().len() * Action::all().len());
    }

    #[test]
    fn test_grant_is_company_scoped() {
        let a = EntityId::new(EntityPrefix::Comp);
        let b = EntityId::new(EntityPrefix::Comp);
        let mut set = PermissionSet::new();
        set.grant(Permission::new(Module::Sales, Action::View), &a.to_string());

        assert!(set.allows(Permission::new(Module::Sales, Action::View), &a));
        assert!(!set.allows(Permission::new(Module::Sales, Action::View), &b));
        assert!(!set.allows(Permission::new(Module::Sales, Action::Create), &a));
    }

    #[test]
    fn test_revoke_removes_empty_keys() {
        let company = EntityId::new(EntityPrefix::Comp).to_string();
        let perm = Permission::new(Module::Parts, Action::Delete);
        let mut set = PermissionSet::new();
        set.grant(perm, &company);
        assert!(set.revoke(perm, &company));
        assert!(!set.revoke(perm, &company));
        assert!(set.is_empty());
    }

    #[test]
    fn test_grant_is_idempotent() {
        let perm = Permission::new(Module::Parts, Action::View);
        let mut set = PermissionSet::new();
        set.grant(perm, "COMP-X");
        set.grant(perm, "COMP-X");
        let json = serde_json::to_value(&set).unwrap();
        assert_eq!(json["parts_view"].as_array().unwrap().len(), 1);
    }

    #[test]
    fn test_require_permissions_passes() {
        let mut session = session_with(PermissionSet::new(), UserType::Employee);
        let company = session.company_id.to_string();
        session
            .permissions
            .grant(Permission::new(Module::Sales, Action::View), &company);
        session
            .permissions
            .grant(Permission::new(Module::Sales, Action::Create), &company);

        let auth = require_permissions(
            &session,
            &Requirements::new().view(Module::Sales).create(Module::Sales),
        )
        .unwrap();
        assert_eq!(auth.company_id, session.company_id);
        assert_eq!(auth.user_id, session.user.id);
    }

    #[test]
    fn test_require_permissions_names_missing_permission() {
        let mut session = session_with(PermissionSet::new(), UserType::Employee);
        let company = session.company_id.to_string();
        session
            .permissions
            .grant(Permission::new(Module::Sales, Action::View), &company);

        let err = require_permissions(
            &session,
            &Requirements::new().view(Module::Sales).update(Module::Sales),
        )
        .unwrap_err();
        match err {
            PermissionError::Unauthorized { permission, .. } => {
                assert_eq!(permission, "sales_update")
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_require_permissions_checks_user_type() {
        let session = session_with(PermissionSet::full(ALL_COMPANIES), UserType::Customer);
        let err = require_permissions(
            &session,
            &Requirements::new().user_type(UserType::Employee),
        )
        .unwrap_err();
        assert!(matches!(err, PermissionError::WrongUserType { .. }));
    }

    #[test]
    fn test_inactive_user_is_refused() {
        let mut session = session_with(PermissionSet::full(ALL_COMPANIES), UserType::Employee);
        session.user.active = false;
        let err = require_permissions(&session, &Requirements::new()).unwrap_err();
        assert!(matches!(err, PermissionError::Inactive(_)));
    }

    #[test]
    fn test_apply_template() {
        let mut template = PermissionSet::new();
        template.grant(Permission::new(Module::Inventory, Action::View), ALL_COMPANIES);
        let company = EntityId::new(EntityPrefix::Comp);

        let mut set = PermissionSet::new();
        set.apply_template(&template, &company.to_string());
        assert!(set.allows(Permission::new(Module::Inventory, Action::View), &company));
        assert!(!set.allows(
            Permission::new(Module::Inventory, Action::View),
            &EntityId::new(EntityPrefix::Comp)
        ));
    }
}
