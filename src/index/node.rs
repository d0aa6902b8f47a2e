//! File and tree nodes of a file index.
//!
//! A `File`'s change flags `added`/`renamed`/`modified` are derived from
//! `path_in_base`/`blob_id` comparisons on every construction and stored
//! immutably; there is no way to build a node with an inconsistent
//! combination. All mutation helpers reconstruct the node.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::index::paths;
use crate::index::stats::FileStats;
use crate::storage::types::BlobId;

/// Status of a node, derived from its change flags (files) or its
/// aggregated stats (trees).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NodeStatus {
    Unchanged,
    Deleted,
    Added,
    Modified,
}

impl NodeStatus {
    /// Derivation rule for tree nodes, applied in this order:
    /// every descendant deleted -> deleted; every descendant added (or
    /// renamed) -> added; any pending change -> modified; else unchanged.
    pub fn derive(stats: &FileStats) -> Self {
        if stats.all == stats.deleted {
            NodeStatus::Deleted
        } else if stats.all == stats.added || stats.all == stats.renamed {
            NodeStatus::Added
        } else if stats.has_changes() {
            NodeStatus::Modified
        } else {
            NodeStatus::Unchanged
        }
    }
}

/// Construction parameters for a [`File`].
///
/// The derived flags are computed by [`File::new`]; callers only describe
/// the relationship to the base snapshot.
#[derive(Debug, Clone)]
pub struct FileInit {
    pub path: String,
    pub path_in_base: Option<String>,
    pub blob_id: BlobId,
    pub blob_hash: BlobId,
    pub blob_id_in_base: Option<BlobId>,
    pub ignored: bool,
    pub deleted: bool,
    pub conflicting: bool,
    pub conflict_reason: Option<String>,
}

/// A tracked file at a point in time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct File {
    pub path: String,
    /// Path this file had in the base snapshot; `None` for added files.
    pub path_in_base: Option<String>,
    /// Current content handle (may be a temporary local id).
    pub blob_id: BlobId,
    /// Canonical content hash of the current content.
    pub blob_hash: BlobId,
    /// Content handle in the base snapshot, if the file existed there.
    pub blob_id_in_base: Option<BlobId>,
    /// Non-markdown paths are tracked but excluded from diffing, renaming,
    /// and ref-counting.
    pub ignored: bool,
    /// Pending local deletion (the node stays until commit-time
    /// normalization removes it).
    pub deleted: bool,
    pub conflicting: bool,
    pub conflict_reason: Option<String>,
    added: bool,
    renamed: bool,
    modified: bool,
}

impl File {
    /// Build a file node, computing the derived flags.
    pub fn new(init: FileInit) -> Self {
        let added = init.path_in_base.is_none();
        let renamed = init
            .path_in_base
            .as_deref()
            .is_some_and(|base| base != init.path);
        let modified = init
            .blob_id_in_base
            .as_ref()
            .is_some_and(|base| *base != init.blob_id);

        Self {
            path: init.path,
            path_in_base: init.path_in_base,
            blob_id: init.blob_id,
            blob_hash: init.blob_hash,
            blob_id_in_base: init.blob_id_in_base,
            ignored: init.ignored,
            deleted: init.deleted,
            conflicting: init.conflicting,
            conflict_reason: init.conflict_reason,
            added,
            renamed,
            modified,
        }
    }

    /// A committed baseline file: its own path and hash in base.
    pub fn tracked(path: impl Into<String>, sha: BlobId) -> Self {
        let path = path.into();
        let ignored = !paths::is_markdown(&path);
        Self::new(FileInit {
            path_in_base: Some(path.clone()),
            path,
            blob_id: sha.clone(),
            blob_hash: sha.clone(),
            blob_id_in_base: Some(sha),
            ignored,
            deleted: false,
            conflicting: false,
            conflict_reason: None,
        })
    }

    fn init(&self) -> FileInit {
        FileInit {
            path: self.path.clone(),
            path_in_base: self.path_in_base.clone(),
            blob_id: self.blob_id.clone(),
            blob_hash: self.blob_hash.clone(),
            blob_id_in_base: self.blob_id_in_base.clone(),
            ignored: self.ignored,
            deleted: self.deleted,
            conflicting: self.conflicting,
            conflict_reason: self.conflict_reason.clone(),
        }
    }

    /// Rebuild with a new path.
    pub fn with_path(&self, path: impl Into<String>) -> Self {
        let mut init = self.init();
        init.path = path.into();
        Self::new(init)
    }

    /// Rebuild with new content. A write revives a pending deletion.
    pub fn with_content(&self, blob_id: BlobId, blob_hash: BlobId) -> Self {
        let mut init = self.init();
        init.blob_id = blob_id;
        init.blob_hash = blob_hash;
        init.deleted = false;
        Self::new(init)
    }

    /// Rebuild with the deletion flag set.
    pub fn with_deleted(&self) -> Self {
        let mut init = self.init();
        init.deleted = true;
        Self::new(init)
    }

    /// Rebuild with a conflict reason appended (reasons are space-joined
    /// when one file accrues several).
    pub fn with_conflict(&self, reason: &str) -> Self {
        let mut init = self.init();
        init.conflicting = true;
        init.conflict_reason = Some(match &self.conflict_reason {
            Some(existing) => format!("{} {}", existing, reason),
            None => reason.to_string(),
        });
        Self::new(init)
    }

    /// Rebuild with the conflict cleared.
    pub fn without_conflict(&self) -> Self {
        let mut init = self.init();
        init.conflicting = false;
        init.conflict_reason = None;
        Self::new(init)
    }

    /// The file does not exist in the base snapshot.
    pub fn added(&self) -> bool {
        self.added
    }

    /// The file moved relative to the base snapshot.
    pub fn renamed(&self) -> bool {
        self.renamed
    }

    /// The content changed relative to the base snapshot.
    pub fn modified(&self) -> bool {
        self.modified
    }

    /// Whether any pending change is recorded on this file.
    pub fn has_changes(&self) -> bool {
        self.deleted || self.added || self.renamed || self.modified
    }

    /// This file's contribution to its ancestors' aggregated stats.
    ///
    /// A pending deletion dominates the other flags: the only change left
    /// to publish for that file is the deletion itself.
    pub fn stats(&self) -> FileStats {
        let flag = |on: bool| if on { 1 } else { 0 };
        FileStats {
            all: 1,
            deleted: flag(self.deleted),
            added: flag(!self.deleted && self.added),
            renamed: flag(!self.deleted && self.renamed),
            modified: flag(!self.deleted && self.modified),
            conflicting: flag(self.conflicting),
        }
    }
}

/// A directory-like node with aggregated statistics over descendants.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tree {
    pub path: String,
    pub status: NodeStatus,
    pub file_stats: FileStats,
    /// Paths of direct children (files and trees).
    pub children: BTreeSet<String>,
}

impl Tree {
    pub fn new(path: impl Into<String>) -> Self {
        let file_stats = FileStats::default();
        Self {
            path: path.into(),
            status: NodeStatus::derive(&file_stats),
            file_stats,
            children: BTreeSet::new(),
        }
    }

    /// Apply a stats delta and re-derive the status.
    pub fn apply_delta(&mut self, delta: FileStats) {
        self.file_stats += delta;
        self.status = NodeStatus::derive(&self.file_stats);
    }
}

/// A node of the index map: either a tree or a file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Node {
    Tree(Tree),
    File(File),
}

impl Node {
    pub fn as_file(&self) -> Option<&File> {
        match self {
            Node::File(file) => Some(file),
            Node::Tree(_) => None,
        }
    }

    pub fn as_tree(&self) -> Option<&Tree> {
        match self {
            Node::Tree(tree) => Some(tree),
            Node::File(_) => None,
        }
    }

    pub fn path(&self) -> &str {
        match self {
            Node::Tree(tree) => &tree.path,
            Node::File(file) => &file.path,
        }
    }
}
