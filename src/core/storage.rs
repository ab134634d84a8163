//! Document buckets on the local filesystem
//!
//! Objects live at `.iw/storage/<bucket>/<company>/<path>`; the `document`
//! table records their size and SHA-256. Preview links are `iw://` URLs
//! signed with the workspace secret:
//!
//! ```text
//! iw://<bucket>/<company>/<path>?expires=<unix seconds>&token=<hex>
//! token = hmac_sha256(secret, "<bucket>\n<company>/<path>\n<expires>")
//! ```

use std::path::{Component, Path, PathBuf};

use chrono::Utc;
use hmac::{Hmac, Mac};
use miette::Diagnostic;
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::core::db::{upsert_document, Database, DbError};
use crate::core::identity::{EntityId, EntityPrefix};
use crate::core::workspace::Workspace;
use crate::entities::{Bucket, Document};

const URL_SCHEME: &str = "iw://";

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Error, Diagnostic)]
pub enum StorageError {
    #[error("invalid object path '{0}'")]
    #[diagnostic(
        code(iw::storage::invalid_path),
        help("use a relative path without '..' segments, e.g. quotes/Q000001.html")
    )]
    InvalidPath(String),

    #[error("I/O error on {path}: {message}")]
    #[diagnostic(code(iw::storage::io))]
    Io { path: PathBuf, message: String },

    #[error("stored object {path} is corrupt: expected sha256 {expected}, found {actual}")]
    #[diagnostic(code(iw::storage::checksum))]
    Checksum {
        path: String,
        expected: String,
        actual: String,
    },

    #[error("malformed preview URL: {0}")]
    #[diagnostic(code(iw::storage::bad_url))]
    BadUrl(String),

    #[error("preview URL signature does not match")]
    #[diagnostic(code(iw::storage::bad_signature))]
    BadSignature,

    #[error("preview URL expired at {0}")]
    #[diagnostic(code(iw::storage::expired))]
    Expired(i64),

    #[error("signing key unavailable: {0}")]
    #[diagnostic(code(iw::storage::no_key), help("re-run `iw init --force` to create one"))]
    NoSigningKey(String),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Db(#[from] DbError),
}

fn io_error(path: &Path, err: std::io::Error) -> StorageError {
    StorageError::Io {
        path: path.to_path_buf(),
        message: err.to_string(),
    }
}

/// SHA-256 of a byte slice as lowercase hex
pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

/// Normalize an object path, refusing anything that could escape its bucket
pub fn normalize_path(path: &str) -> Result<String, StorageError> {
    let trimmed = path.trim().replace('\\', "/");
    let mut parts = Vec::new();
    for component in Path::new(&trimmed).components() {
        match component {
            Component::Normal(part) => parts.push(part.to_string_lossy().into_owned()),
            Component::CurDir => {}
            _ => return Err(StorageError::InvalidPath(path.to_string())),
        }
    }
    if parts.is_empty() {
        return Err(StorageError::InvalidPath(path.to_string()));
    }
    Ok(parts.join("/"))
}

/// A verified preview URL
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedObject {
    pub bucket: Bucket,
    pub company_id: EntityId,
    pub path: String,
    pub expires: i64,
}

/// A difference between the `document` table and the files on disk
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IntegrityIssue {
    /// Row without a file
    Missing { bucket: Bucket, path: String },
    /// File whose hash no longer matches its row
    Corrupt { bucket: Bucket, path: String },
    /// File without a row
    Untracked { bucket: Bucket, path: String },
}

impl std::fmt::Display for IntegrityIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IntegrityIssue::Missing { bucket, path } => write!(f, "missing   {}/{}", bucket, path),
            IntegrityIssue::Corrupt { bucket, path } => write!(f, "corrupt   {}/{}", bucket, path),
            IntegrityIssue::Untracked { bucket, path } => {
                write!(f, "untracked {}/{}", bucket, path)
            }
        }
    }
}

/// File storage rooted at a workspace's `storage/` directory
#[derive(Debug, Clone)]
pub struct Storage {
    root: PathBuf,
    secret: String,
}

impl Storage {
    pub fn new(root: PathBuf, secret: String) -> Self {
        Self { root, secret }
    }

    pub fn open(workspace: &Workspace) -> Result<Self, StorageError> {
        let secret = workspace
            .signing_key()
            .map_err(|e| StorageError::NoSigningKey(e.to_string()))?;
        Ok(Self::new(workspace.storage_dir(), secret))
    }

    fn company_dir(&self, bucket: Bucket, company_id: &EntityId) -> PathBuf {
        self.root.join(bucket.as_str()).join(company_id.to_string())
    }

    fn object_path(&self, bucket: Bucket, company_id: &EntityId, path: &str) -> PathBuf {
        self.company_dir(bucket, company_id).join(path)
    }

    /// Store `bytes` under `path`, replacing any previous object there
    pub fn put(
        &self,
        db: &mut Database,
        company_id: &EntityId,
        bucket: Bucket,
        path: &str,
        bytes: &[u8],
        user_id: &EntityId,
    ) -> Result<Document, StorageError> {
        let path = normalize_path(path)?;
        let target = self.object_path(bucket, company_id, &path);
        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent).map_err(|e| io_error(parent, e))?;
        }
        std::fs::write(&target, bytes).map_err(|e| io_error(&target, e))?;

        let name = path.rsplit('/').next().unwrap_or(&path).to_string();
        let doc = Document {
            id: EntityId::new(EntityPrefix::Doc),
            company_id: company_id.clone(),
            bucket,
            path: path.clone(),
            name,
            size: bytes.len() as u64,
            sha256: sha256_hex(bytes),
            uploaded_by: user_id.clone(),
            created: Utc::now(),
        };
        let stored = db.write(|tx| upsert_document(tx, &doc))?;
        tracing::info!(%bucket, path = %stored.path, size = stored.size, "document stored");
        Ok(stored)
    }

    /// Copy a local file into a bucket; `path` defaults to the file name
    pub fn upload(
        &self,
        db: &mut Database,
        company_id: &EntityId,
        bucket: Bucket,
        source: &Path,
        path: Option<&str>,
        user_id: &EntityId,
    ) -> Result<Document, StorageError> {
        let bytes = std::fs::read(source).map_err(|e| io_error(source, e))?;
        let path = match path {
            Some(p) => p.to_string(),
            None => source
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .ok_or_else(|| StorageError::InvalidPath(source.display().to_string()))?,
        };
        self.put(db, company_id, bucket, &path, &bytes, user_id)
    }

    /// Read an object, checking it against its recorded hash
    pub fn read(
        &self,
        db: &Database,
        company_id: &EntityId,
        bucket: Bucket,
        path: &str,
    ) -> Result<(Document, Vec<u8>), StorageError> {
        let path = normalize_path(path)?;
        let doc = db.get_document(company_id, bucket, &path)?;
        let file = self.object_path(bucket, company_id, &path);
        let bytes = std::fs::read(&file).map_err(|e| io_error(&file, e))?;
        let actual = sha256_hex(&bytes);
        if actual != doc.sha256 {
            tracing::warn!(%bucket, path = %path, "checksum mismatch");
            return Err(StorageError::Checksum {
                path: format!("{}/{}", bucket, path),
                expected: doc.sha256,
                actual,
            });
        }
        Ok((doc, bytes))
    }

    /// Copy an object out to `dest`
    pub fn download(
        &self,
        db: &Database,
        company_id: &EntityId,
        bucket: Bucket,
        path: &str,
        dest: &Path,
    ) -> Result<Document, StorageError> {
        let (doc, bytes) = self.read(db, company_id, bucket, path)?;
        std::fs::write(dest, bytes).map_err(|e| io_error(dest, e))?;
        Ok(doc)
    }

    /// Delete an object and its row
    pub fn remove(
        &self,
        db: &mut Database,
        company_id: &EntityId,
        bucket: Bucket,
        path: &str,
    ) -> Result<Document, StorageError> {
        let path = normalize_path(path)?;
        let doc = db.get_document(company_id, bucket, &path)?;
        let file = self.object_path(bucket, company_id, &path);
        match std::fs::remove_file(&file) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::warn!(file = %file.display(), "object already gone");
            }
            Err(e) => return Err(io_error(&file, e)),
        }
        db.delete_document_row(&doc)?;
        tracing::info!(%bucket, path = %path, "document removed");
        Ok(doc)
    }

    /// MAC over newline-separated fields; `expires` is digits only, so the
    /// last newline always ends the key
    fn mac(&self, bucket: Bucket, key: &str, expires: i64) -> Result<HmacSha256, StorageError> {
        let mut mac = HmacSha256::new_from_slice(self.secret.as_bytes())
            .map_err(|e| StorageError::NoSigningKey(e.to_string()))?;
        mac.update(format!("{}\n{}\n{}", bucket.as_str(), key, expires).as_bytes());
        Ok(mac)
    }

    /// Preview URL valid until `now + ttl_secs`
    pub fn sign_url(
        &self,
        bucket: Bucket,
        company_id: &EntityId,
        path: &str,
        ttl_secs: u64,
        now: i64,
    ) -> Result<String, StorageError> {
        let path = normalize_path(path)?;
        let key = format!("{}/{}", company_id, path);
        let expires = now.saturating_add(ttl_secs as i64);
        let token = hex::encode(self.mac(bucket, &key, expires)?.finalize().into_bytes());
        Ok(format!(
            "{}{}/{}?expires={}&token={}",
            URL_SCHEME, bucket, key, expires, token
        ))
    }

    /// Check a preview URL's signature and expiry
    pub fn verify_url(&self, url: &str, now: i64) -> Result<SignedObject, StorageError> {
        let bad = || StorageError::BadUrl(url.to_string());
        let rest = url.strip_prefix(URL_SCHEME).ok_or_else(bad)?;
        let (location, query) = rest.split_once('?').ok_or_else(bad)?;
        let (bucket, key) = location.split_once('/').ok_or_else(bad)?;
        let bucket: Bucket = bucket.parse().map_err(|_| bad())?;
        let (company, path) = key.split_once('/').ok_or_else(bad)?;
        let company_id: EntityId = company.parse().map_err(|_| bad())?;

        let mut expires = None;
        let mut token = None;
        for pair in query.split('&') {
            match pair.split_once('=') {
                Some(("expires", v)) => expires = v.parse::<i64>().ok(),
                Some(("token", v)) => token = Some(v),
                _ => {}
            }
        }
        let (expires, token) = expires.zip(token).ok_or_else(bad)?;

        let signature = hex::decode(token).map_err(|_| bad())?;
        if self.mac(bucket, key, expires)?.verify_slice(&signature).is_err() {
            tracing::warn!(url, "preview URL rejected");
            return Err(StorageError::BadSignature);
        }
        if now > expires {
            return Err(StorageError::Expired(expires));
        }
        Ok(SignedObject {
            bucket,
            company_id,
            path: normalize_path(path)?,
            expires,
        })
    }

    /// Compare a company's rows against the files in both buckets
    pub fn verify(
        &self,
        db: &Database,
        company_id: &EntityId,
    ) -> Result<Vec<IntegrityIssue>, StorageError> {
        let mut issues = Vec::new();
        for doc in db.list_documents(company_id, None, None)? {
            let file = self.object_path(doc.bucket, company_id, &doc.path);
            match std::fs::read(&file) {
                Ok(bytes) if sha256_hex(&bytes) == doc.sha256 => {}
                Ok(_) => issues.push(IntegrityIssue::Corrupt {
                    bucket: doc.bucket,
                    path: doc.path,
                }),
                Err(_) => issues.push(IntegrityIssue::Missing {
                    bucket: doc.bucket,
                    path: doc.path,
                }),
            }
        }

        for bucket in [Bucket::Private, Bucket::Public] {
            let dir = self.company_dir(bucket, company_id);
            if !dir.exists() {
                continue;
            }
            for entry in walkdir::WalkDir::new(&dir)
                .into_iter()
                .filter_map(|e| e.ok())
                .filter(|e| e.file_type().is_file())
            {
                let Ok(relative) = entry.path().strip_prefix(&dir) else {
                    continue;
                };
                let path = relative
                    .components()
                    .map(|c| c.as_os_str().to_string_lossy())
                    .collect::<Vec<_>>()
                    .join("/");
                if matches!(
                    db.get_document(company_id, bucket, &path),
                    Err(DbError::NotFound { .. })
                ) {
                    issues.push(IntegrityIssue::Untracked { bucket, path });
                }
            }
        }
        Ok(issues)
    }
}
