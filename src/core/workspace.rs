//! Workspace discovery and on-disk layout
//!
//! A workspace is any directory containing `.iw/`. Everything the ERP
//! persists lives underneath it:
//!
//! ```text
//! .iw/
//!   config.yaml      workspace configuration
//!   erp.db           SQLite database
//!   signing.key      secret for signed preview URLs
//!   storage/         document buckets
//! ```

use rand::Rng;
use std::path::{Path, PathBuf};
use thiserror::Error;

const WORKSPACE_DIR: &str = ".iw";

/// Represents an Ironworks workspace
#[derive(Debug, Clone)]
pub struct Workspace {
    /// Root directory of the workspace (parent of .iw/)
    root: PathBuf,
}

impl Workspace {
    /// Find the workspace by walking up from the current directory
    pub fn discover() -> Result<Self, WorkspaceError> {
        let current =
            std::env::current_dir().map_err(|e| WorkspaceError::IoError(e.to_string()))?;
        Self::discover_from(&current)
    }

    /// Find the workspace by walking up from the given directory
    pub fn discover_from(start: &Path) -> Result<Self, WorkspaceError> {
        let mut current = start
            .canonicalize()
            .map_err(|e| WorkspaceError::IoError(e.to_string()))?;

        loop {
            if current.join(WORKSPACE_DIR).is_dir() {
                return Ok(Self { root: current });
            }

            if !current.pop() {
                return Err(WorkspaceError::NotFound {
                    searched_from: start.to_path_buf(),
                });
            }
        }
    }

    /// Open an explicit workspace root, or discover one from cwd
    pub fn locate(explicit: Option<&Path>) -> Result<Self, WorkspaceError> {
        match explicit {
            Some(path) => Self::discover_from(path),
            None => Self::discover(),
        }
    }

    /// Create the workspace layout at the given path
    ///
    /// With `force`, an existing `.iw/` is reused; the database and signing
    /// key are left untouched.
    pub fn init(path: &Path, force: bool) -> Result<Self, WorkspaceError> {
        let root = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());
        let dir = root.join(WORKSPACE_DIR);

        if dir.exists() && !force {
            return Err(WorkspaceError::AlreadyExists(root));
        }

        let workspace = Self { root };
        for bucket in ["private", "public"] {
            std::fs::create_dir_all(workspace.storage_dir().join(bucket))
                .map_err(|e| WorkspaceError::IoError(e.to_string()))?;
        }

        let config_path = workspace.config_path();
        if !config_path.exists() {
            std::fs::write(&config_path, Self::default_config())
                .map_err(|e| WorkspaceError::IoError(e.to_string()))?;
        }

        if !workspace.signing_key_path().exists() {
            let mut secret = [0u8; 32];
            rand::rng().fill(&mut secret);
            let encoded: String = secret.iter().map(|b| format!("{:02x}", b)).collect();
            std::fs::write(workspace.signing_key_path(), encoded)
                .map_err(|e| WorkspaceError::IoError(e.to_string()))?;
        }

        Ok(workspace)
    }

    fn default_config() -> &'static str {
        r#"# Ironworks workspace configuration

# Email of the acting user (overridden by IW_USER)
# user: ""

# Current company id (overridden by IW_COMPANY or --company)
# company: ""

# Default output format (auto, yaml, tsv, json, csv, md, id)
# default_format: auto

# Lifetime of signed document preview URLs, in seconds
# preview_ttl_secs: 3600
"#
    }

    /// Get the workspace root directory
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Get the .iw directory
    pub fn iw_dir(&self) -> PathBuf {
        self.root.join(WORKSPACE_DIR)
    }

    pub fn config_path(&self) -> PathBuf {
        self.iw_dir().join("config.yaml")
    }

    pub fn database_path(&self) -> PathBuf {
        self.iw_dir().join("erp.db")
    }

    pub fn storage_dir(&self) -> PathBuf {
        self.iw_dir().join("storage")
    }

    pub fn signing_key_path(&self) -> PathBuf {
        self.iw_dir().join("signing.key")
    }

    /// Read the preview-URL signing secret
    pub fn signing_key(&self) -> Result<String, WorkspaceError> {
        std::fs::read_to_string(self.signing_key_path())
            .map(|s| s.trim().to_string())
            .map_err(|e| WorkspaceError::IoError(e.to_string()))
    }
}

/// Errors that can occur during workspace operations
#[derive(Debug, Error)]
pub enum WorkspaceError {
    #[error("not an Ironworks workspace (searched from {searched_from:?}). Run 'iw init' to create one.")]
    NotFound { searched_from: PathBuf },

    #[error("Ironworks workspace already exists at {0:?}")]
    AlreadyExists(PathBuf),

    #[error("IO error: {0}")]
    IoError(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_workspace_init_creates_structure() {
        let tmp = tempdir().unwrap();
        let ws = Workspace::init(tmp.path(), false).unwrap();

        assert!(ws.iw_dir().is_dir());
        assert!(ws.config_path().exists());
        assert!(ws.storage_dir().join("private").is_dir());
        assert!(ws.storage_dir().join("public").is_dir());
        assert_eq!(ws.signing_key().unwrap().len(), 64);
    }

    #[test]
    fn test_workspace_init_fails_if_exists() {
        let tmp = tempdir().unwrap();
        Workspace::init(tmp.path(), false).unwrap();

        let err = Workspace::init(tmp.path(), false).unwrap_err();
        assert!(matches!(err, WorkspaceError::AlreadyExists(_)));
    }

    #[test]
    fn test_force_init_keeps_signing_key() {
        let tmp = tempdir().unwrap();
        let ws = Workspace::init(tmp.path(), false).unwrap();
        let key = ws.signing_key().unwrap();

        let again = Workspace::init(tmp.path(), true).unwrap();
        assert_eq!(again.signing_key().unwrap(), key);
    }

    #[test]
    fn test_discover_from_nested_dir() {
        let tmp = tempdir().unwrap();
        Workspace::init(tmp.path(), false).unwrap();

        let nested = tmp.path().join("orders/2026");
        std::fs::create_dir_all(&nested).unwrap();

        let ws = Workspace::discover_from(&nested).unwrap();
        assert_eq!(
            ws.root().canonicalize().unwrap(),
            tmp.path().canonicalize().unwrap()
        );
    }

    #[test]
    fn test_discover_fails_without_workspace() {
        let tmp = tempdir().unwrap();
        let err = Workspace::discover_from(tmp.path()).unwrap_err();
        assert!(matches!(err, WorkspaceError::NotFound { .. }));
    }
}
