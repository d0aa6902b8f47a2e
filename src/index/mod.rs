//! The path-indexed file/tree model.
//!
//! A [`FileIndex`] is a snapshot of a file tree at a point in time. Four
//! index roles exist per repository: `base` (last known remote commit),
//! `remote` (latest fetched remote commit), `local` (working copy), and
//! `rebase` (transient reconciliation output).
//!
//! File nodes carry their relationship to the base snapshot
//! (`path_in_base`, `blob_id_in_base`); tree nodes roll up change
//! statistics over all descendants.

mod file_index;
mod node;
pub mod paths;
mod stats;

pub use file_index::FileIndex;
pub use node::{File, FileInit, Node, NodeStatus, Tree};
pub use stats::FileStats;
