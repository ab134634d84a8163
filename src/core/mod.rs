//! Core module - workspace, data layer and backend services

pub mod config;
pub mod conversion;
pub mod db;
pub mod entity;
pub mod identity;
pub mod jobs;
pub mod permissions;
pub mod realtime;
pub mod sequence;
pub mod storage;
pub mod workspace;

pub use config::Config;
pub use conversion::ConversionError;
pub use db::{Database, DbError, Page};
pub use entity::Entity;
pub use identity::{EntityId, EntityPrefix, IdParseError};
pub use jobs::{Job, JobKind, JobStatus};
pub use permissions::{Action, Module, Permission, PermissionError, PermissionSet, Session};
pub use realtime::{ChangeEvent, Operation, Subscription};
pub use sequence::Sequence;
pub use storage::{Storage, StorageError};
pub use workspace::{Workspace, WorkspaceError};
