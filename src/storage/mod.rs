//! Storage layer for the sync engine.
//!
//! Everything the engine persists lives behind the transactional store:
//! repository records, the four file-index roles, blob content, and blob
//! ref-counts. Mutations that must be atomic together execute inside one
//! transaction; change events are published only after commit.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                          Store                              │
//! │        (transactions, change events, atomic commit)         │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!        ┌─────────────────────┼─────────────────────┐
//!        │                     │                     │
//!        ▼                     ▼                     ▼
//!  ┌─────────────┐       ┌─────────────┐       ┌──────────────┐
//!  │    blobs    │       │   indexes   │       │ repositories │
//!  │ (content +  │       │ (file trees │       │   (records + │
//!  │  ref-counts)│       │  + ref pair)│       │    flags)    │
//!  └─────────────┘       └─────────────┘       └──────────────┘
//! ```

pub mod blobs;
pub mod error;
pub mod indexes;
pub mod memory;
pub mod repositories;
pub mod types;

pub use error::{StorageError, StorageResult};
pub use memory::{Store, Transaction};
pub use types::{BlobId, CommitSha, IndexId, Repository, RepositoryId, TreeSha};
