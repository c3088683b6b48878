//! POSIT Core Library
//!
//! This crate provides the core functionality for POSIT, an offline-first
//! store of field "finds": records with free-form attributes, ordered
//! attachments, and the revision/synced bookkeeping a sync client needs to
//! reconcile them with a server later.
//!
//! # Quick Start
//!
//! ```text
//! let repo = Repository::open()?;
//!
//! // Add a find with two photos
//! let find = repo.create(
//!     Attributes::new().with("name", "Frog"),
//!     vec!["photos/1.jpg".into(), "photos/2.jpg".into()],
//! )?;
//!
//! // Edit it; revision bumps only on the first edit after a sync
//! find.update(Attributes::new().with("name", "Bullfrog"))?;
//! ```
//!
//! # Modules
//!
//! - `repository`: Unified storage interface (main entry point)
//! - `entity`: Per-find façade
//! - `records`: Row storage
//! - `attachments`: Attachment lifecycle
//! - `sync`: Revision and synced-flag rules
//! - `payload`: Release of attachment content
//! - `storage`: SQLite handle, schema, errors
//! - `config`: Application configuration

pub mod attachments;
pub mod config;
pub mod entity;
pub mod models;
pub mod payload;
pub mod records;
pub mod repository;
pub mod storage;
pub mod sync;

pub use attachments::{AttachmentStore, Attachments};
pub use config::{Config, ConfigKey};
pub use entity::Entity;
pub use models::{
    Attachment, AttachmentId, AttributeValue, Attributes, EntitySnapshot, PayloadRef, RecordId,
};
pub use payload::{FilePayloads, PayloadStore, RetainPayloads};
pub use records::RecordStore;
pub use repository::{Repository, StoreStats};
pub use storage::{Database, StoreError, StoreResult};
pub use sync::{SyncState, SyncStatus};
