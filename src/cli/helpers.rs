//! Shared helper functions for CLI commands
//!
//! Every command that touches company data goes through [`Context`]: it
//! finds the workspace, loads configuration, opens the database and
//! resolves the acting user and company before any permission check.

use clap::ValueEnum;
use miette::Result;

use crate::cli::{GlobalOpts, OutputFormat};
use crate::core::identity::EntityId;
use crate::core::permissions::{require_permissions, Authorized, PermissionError, Requirements};
use crate::core::{Config, Database, Session, Workspace};
use crate::schema::{Form, FormValidator};

/// Workspace, configuration and database for one invocation
pub struct Context {
    pub workspace: Workspace,
    pub config: Config,
    pub db: Database,
    company: Option<String>,
    format: OutputFormat,
    quiet: bool,
}

impl Context {
    pub fn open(global: &GlobalOpts) -> Result<Self> {
        let workspace = Workspace::locate(global.workspace.as_deref())
            .map_err(|e| miette::miette!("{}", e))?;
        let config = Config::load(Some(&workspace));
        let db = Database::open(&workspace)?;
        let format = resolve_format(global.format, &config);
        tracing::debug!(root = %workspace.root().display(), "workspace opened");
        Ok(Self {
            company: global.company.clone().or_else(|| config.company.clone()),
            workspace,
            config,
            db,
            format,
            quiet: global.quiet,
        })
    }

    pub fn format(&self) -> OutputFormat {
        self.format
    }

    pub fn quiet(&self) -> bool {
        self.quiet
    }

    /// Current company: `--company`, then `IW_COMPANY`, then config
    pub fn company_id(&self) -> Result<EntityId> {
        let reference = self.company.as_deref().ok_or(PermissionError::NoCompany)?;
        Ok(self.db.find_company(reference)?.id)
    }

    pub fn session(&self) -> Result<Session> {
        let email = self.config.user.as_deref().ok_or(PermissionError::NoUser)?;
        let company_id = self.company_id()?;
        Ok(self.db.load_session(email, &company_id)?)
    }

    /// Load the session and check it against `requirements`
    pub fn authorize(&self, requirements: Requirements) -> Result<Authorized> {
        let session = self.session()?;
        Ok(require_permissions(&session, &requirements)?)
    }
}

/// Check command input against a form schema before any write
pub fn validate_input(form: Form, value: &serde_json::Value) -> Result<()> {
    let validator = FormValidator::new()?;
    validator.validate(form, value)?;
    Ok(())
}

/// `--format auto` defers to `default_format` from config
pub fn resolve_format(requested: OutputFormat, config: &Config) -> OutputFormat {
    if requested != OutputFormat::Auto {
        return requested;
    }
    config
        .default_format
        .as_deref()
        .and_then(|f| OutputFormat::from_str(f, true).ok())
        .unwrap_or(OutputFormat::Auto)
}

/// Format an EntityId for display, truncating if too long
///
/// IDs longer than 16 characters are truncated to 13 chars with "..." suffix.
pub fn format_short_id(id: &EntityId) -> String {
    let s = id.to_string();
    if s.len() > 16 {
        format!("{}...", &s[..13])
    } else {
        s
    }
}

/// Truncate a string to max_len, adding "..." if truncated
pub fn truncate_str(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}

pub fn format_money(value: f64) -> String {
    format!("{:.2}", value)
}

/// Quantities print without a trailing `.0` when whole
pub fn format_quantity(value: f64) -> String {
    if value.fract() == 0.0 {
        format!("{:.0}", value)
    } else {
        format!("{}", value)
    }
}

pub fn or_dash(value: Option<&str>) -> String {
    value.filter(|v| !v.is_empty()).unwrap_or("-").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::identity::EntityPrefix;

    #[test]
    fn test_format_short_id() {
        let id = EntityId::new(EntityPrefix::Part);
        let formatted = format_short_id(&id);
        assert!(formatted.len() <= 16);
        assert!(formatted.ends_with("..."));
    }

    #[test]
    fn test_truncate_str() {
        assert_eq!(truncate_str("hello", 10), "hello");
        assert_eq!(truncate_str("hello world", 8), "hello...");
        assert_eq!(truncate_str("hi", 2), "hi");
        assert_eq!(truncate_str("Größenänderung", 6), "Grö...");
    }

    #[test]
    fn test_number_formatting() {
        assert_eq!(format_money(3.0), "3.00");
        assert_eq!(format_money(12.346), "12.35");
        assert_eq!(format_quantity(10.0), "10");
        assert_eq!(format_quantity(0.25), "0.25");
    }

    #[test]
    fn test_resolve_format() {
        let mut config = Config::default();
        assert_eq!(resolve_format(OutputFormat::Auto, &config), OutputFormat::Auto);
        config.default_format = Some("JSON".to_string());
        assert_eq!(resolve_format(OutputFormat::Auto, &config), OutputFormat::Json);
        assert_eq!(resolve_format(OutputFormat::Csv, &config), OutputFormat::Csv);
        config.default_format = Some("bogus".to_string());
        assert_eq!(resolve_format(OutputFormat::Auto, &config), OutputFormat::Auto);
    }
}
