//! mdsync - a local-first Markdown sync engine
//!
//! This crate keeps a client-side, content-addressed working copy of a
//! Markdown file tree in sync with a remote Git-compatible host. Users edit
//! files offline; the engine reconciles local edits against new remote
//! commits, surfaces genuine conflicts, and pushes a single new commit.
//!
//! # Example
//!
//! ```no_run
//! use mdsync::remote::memory::MemoryHost;
//! use mdsync::storage::{RepositoryId, Store};
//! use mdsync::sync::Syncer;
//! use mdsync::workspace::Workspace;
//!
//! let store = Store::new();
//! let workspace = Workspace::new(store.clone());
//! let repo = RepositoryId::new("notes");
//! workspace.add_repository(&repo).unwrap();
//! workspace.write_file(&repo, "journal.md", b"# Day one\n").unwrap();
//!
//! let syncer = Syncer::new(store, MemoryHost::new());
//! syncer.sync(&repo, &mdsync::progress::NullProgress).unwrap();
//! ```

pub mod diff;
pub mod error;
pub mod events;
pub mod index;
pub mod progress;
pub mod rebase;
pub mod remote;
pub mod storage;
pub mod sync;
pub mod workspace;
