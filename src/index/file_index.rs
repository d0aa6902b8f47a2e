//! A snapshot of a file tree at a point in time, keyed by path.
//!
//! The index is an arena of nodes addressed by path: parent/child
//! relationships are expressed through path prefixes and child-path sets
//! stored by value, never object references. The root tree (path `""`)
//! always exists.
//!
//! Mutations propagate a delta of `FileStats` up the ancestor chain rather
//! than recounting, so a single file mutation costs O(depth).

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::index::node::{File, FileInit, Node, Tree};
use crate::index::paths;
use crate::index::stats::FileStats;
use crate::storage::types::{CommitSha, IndexId, RepositoryId, TreeSha};

/// A path-indexed snapshot of a file tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileIndex {
    pub repository_id: RepositoryId,
    pub index_id: IndexId,
    /// Present only for `Remote`/`Base` roles.
    pub commit_sha: Option<CommitSha>,
    pub commit_time: Option<DateTime<Utc>>,
    pub root_tree_sha: Option<TreeSha>,
    nodes: BTreeMap<String, Node>,
}

impl FileIndex {
    /// Create an empty index containing only the root tree.
    pub fn new(repository_id: RepositoryId, index_id: IndexId) -> Self {
        let mut nodes = BTreeMap::new();
        nodes.insert(String::new(), Node::Tree(Tree::new("")));
        Self {
            repository_id,
            index_id,
            commit_sha: None,
            commit_time: None,
            root_tree_sha: None,
            nodes,
        }
    }

    /// Attach remote commit metadata (only meaningful for committed roles).
    pub fn with_commit(
        mut self,
        sha: CommitSha,
        time: DateTime<Utc>,
        tree_sha: TreeSha,
    ) -> Self {
        self.commit_sha = Some(sha);
        self.commit_time = Some(time);
        self.root_tree_sha = Some(tree_sha);
        self
    }

    /// Clone this index into another role. Roles without remote commits
    /// shed the commit metadata.
    pub fn cloned_as(&self, index_id: IndexId) -> Self {
        let mut clone = self.clone();
        clone.index_id = index_id;
        if !index_id.is_committed() {
            clone.commit_sha = None;
            clone.commit_time = None;
            clone.root_tree_sha = None;
        }
        clone
    }

    pub fn node(&self, path: &str) -> Option<&Node> {
        self.nodes.get(path)
    }

    pub fn file(&self, path: &str) -> Option<&File> {
        self.nodes.get(path).and_then(Node::as_file)
    }

    pub fn tree(&self, path: &str) -> Option<&Tree> {
        self.nodes.get(path).and_then(Node::as_tree)
    }

    /// The root tree. Always present.
    pub fn root(&self) -> &Tree {
        match self.nodes.get("") {
            Some(Node::Tree(tree)) => tree,
            // the constructor plants the root and no mutation removes it
            _ => unreachable!("file index root tree missing"),
        }
    }

    /// Iterate all file nodes in path order.
    pub fn files(&self) -> impl Iterator<Item = &File> {
        self.nodes.values().filter_map(Node::as_file)
    }

    /// Non-ignored files carrying any pending change flag.
    pub fn changed_files(&self) -> Vec<&File> {
        self.files()
            .filter(|file| !file.ignored && file.has_changes())
            .collect()
    }

    /// Whether any descendant file is marked conflicting.
    pub fn has_conflicts(&self) -> bool {
        self.root().file_stats.conflicting > 0
    }

    /// Insert or replace a file node at its path.
    ///
    /// Missing ancestor trees are materialized lazily; the stats delta is
    /// then propagated up every ancestor. Callers never put a file where a
    /// tree node lives.
    pub fn put_file(&mut self, file: File) {
        let path = file.path.clone();
        let new_stats = file.stats();

        debug_assert!(
            !matches!(self.nodes.get(&path), Some(Node::Tree(_))),
            "file path collides with a tree node: {}",
            path
        );

        let old_stats = match self.nodes.get(&path) {
            Some(Node::File(existing)) => existing.stats(),
            _ => FileStats::default(),
        };

        self.materialize_ancestors(&path);
        self.nodes.insert(path.clone(), Node::File(file));
        self.propagate(&path, new_stats - old_stats);
    }

    /// Remove a file node and propagate the negated delta.
    pub fn delete_file(&mut self, path: &str) {
        let old_stats = match self.nodes.get(path) {
            Some(Node::File(existing)) => existing.stats(),
            _ => return,
        };

        self.nodes.remove(path);
        let parent = paths::parent(path);
        if let Some(Node::Tree(tree)) = self.nodes.get_mut(parent) {
            tree.children.remove(path);
        }
        self.propagate(path, -old_stats);
    }

    /// Commit-time normalization: drop deleted nodes, swap temporary ids
    /// for final hashes, and make every surviving file its own baseline.
    ///
    /// The caller must ensure the final-hash blob content exists in storage
    /// before this runs.
    pub fn apply_file_changes(&mut self) {
        let survivors: Vec<File> = self
            .files()
            .filter(|file| !file.deleted)
            .map(|file| {
                File::new(FileInit {
                    path: file.path.clone(),
                    path_in_base: Some(file.path.clone()),
                    blob_id: file.blob_hash.clone(),
                    blob_hash: file.blob_hash.clone(),
                    blob_id_in_base: Some(file.blob_hash.clone()),
                    ignored: file.ignored,
                    deleted: false,
                    conflicting: file.conflicting,
                    conflict_reason: file.conflict_reason.clone(),
                })
            })
            .collect();

        self.nodes.clear();
        self.nodes.insert(String::new(), Node::Tree(Tree::new("")));
        for file in survivors {
            self.put_file(file);
        }
    }

    /// Create any missing ancestor trees of `path` and link child sets.
    fn materialize_ancestors(&mut self, path: &str) {
        let mut child = path.to_string();
        loop {
            let parent = paths::parent(&child).to_string();
            let tree = self
                .nodes
                .entry(parent.clone())
                .or_insert_with(|| Node::Tree(Tree::new(parent.clone())));
            if let Node::Tree(tree) = tree {
                tree.children.insert(child.clone());
            }
            if parent.is_empty() {
                break;
            }
            child = parent;
        }
    }

    /// Apply `delta` to every ancestor of `path`, pruning trees whose
    /// aggregate drops to zero (except the root).
    fn propagate(&mut self, path: &str, delta: FileStats) {
        if delta.is_zero() {
            return;
        }

        let mut current = path.to_string();
        while !current.is_empty() {
            let parent = paths::parent(&current).to_string();

            let prune = match self.nodes.get_mut(&parent) {
                Some(Node::Tree(tree)) => {
                    tree.apply_delta(delta);
                    tree.file_stats.all == 0 && !parent.is_empty()
                }
                _ => false,
            };

            if prune {
                self.nodes.remove(&parent);
                let grandparent = paths::parent(&parent);
                if let Some(Node::Tree(tree)) = self.nodes.get_mut(grandparent) {
                    tree.children.remove(&parent);
                }
            }

            current = parent;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::node::NodeStatus;
    use crate::storage::types::BlobId;

    fn sha(content: &[u8]) -> BlobId {
        BlobId::from_content(content).unwrap()
    }

    fn index() -> FileIndex {
        FileIndex::new(RepositoryId::new("notes"), IndexId::Local)
    }

    /// Recount descendants the slow way and compare with the aggregates.
    fn assert_aggregates_consistent(index: &FileIndex) {
        let tree_paths: Vec<String> = index
            .nodes
            .values()
            .filter_map(Node::as_tree)
            .map(|tree| tree.path.clone())
            .collect();

        for tree_path in tree_paths {
            let mut expected = FileStats::default();
            for file in index.files() {
                let within = tree_path.is_empty()
                    || file.path.starts_with(&format!("{}/", tree_path));
                if within {
                    expected += file.stats();
                }
            }
            let tree = index.tree(&tree_path).unwrap();
            assert_eq!(tree.file_stats, expected, "stats at '{}'", tree_path);
            assert_eq!(tree.status, NodeStatus::derive(&expected));
        }
    }

    #[test]
    fn test_put_materializes_ancestors() {
        let mut index = index();
        index.put_file(File::tracked("a/b/c.md", sha(b"x")));

        assert!(index.tree("a").is_some());
        assert!(index.tree("a/b").is_some());
        assert!(index.root().children.contains("a"));
        assert!(index.tree("a").unwrap().children.contains("a/b"));
        assert!(index.tree("a/b").unwrap().children.contains("a/b/c.md"));
        assert_eq!(index.root().file_stats.all, 1);
        assert_aggregates_consistent(&index);
    }

    #[test]
    fn test_replace_propagates_delta_not_recount() {
        let mut index = index();
        index.put_file(File::tracked("a/one.md", sha(b"1")));
        index.put_file(File::tracked("a/two.md", sha(b"2")));
        assert_eq!(index.root().file_stats.all, 2);
        assert_eq!(index.root().status, NodeStatus::Unchanged);

        let modified = index
            .file("a/one.md")
            .unwrap()
            .with_content(BlobId::temporary(), sha(b"1'"));
        index.put_file(modified);

        assert_eq!(index.root().file_stats.all, 2);
        assert_eq!(index.root().file_stats.modified, 1);
        assert_eq!(index.root().status, NodeStatus::Modified);
        assert_aggregates_consistent(&index);
    }

    #[test]
    fn test_delete_prunes_empty_trees() {
        let mut index = index();
        index.put_file(File::tracked("a/b/c.md", sha(b"x")));
        index.put_file(File::tracked("top.md", sha(b"y")));

        index.delete_file("a/b/c.md");

        assert!(index.tree("a/b").is_none());
        assert!(index.tree("a").is_none());
        assert!(!index.root().children.contains("a"));
        assert_eq!(index.root().file_stats.all, 1);
        assert_aggregates_consistent(&index);
    }

    #[test]
    fn test_root_survives_emptying() {
        let mut index = index();
        index.put_file(File::tracked("only.md", sha(b"x")));
        index.delete_file("only.md");

        assert_eq!(index.root().file_stats, FileStats::default());
        // literal derivation order: an empty root reports deleted
        assert_eq!(index.root().status, NodeStatus::Deleted);
        assert!(index.node("only.md").is_none());
    }

    #[test]
    fn test_all_added_rolls_up_as_added() {
        let mut index = index();
        for path in ["new/a.md", "new/b.md"] {
            index.put_file(File::new(FileInit {
                path: path.to_string(),
                path_in_base: None,
                blob_id: BlobId::temporary(),
                blob_hash: sha(path.as_bytes()),
                blob_id_in_base: None,
                ignored: false,
                deleted: false,
                conflicting: false,
                conflict_reason: None,
            }));
        }

        assert_eq!(index.tree("new").unwrap().status, NodeStatus::Added);
        assert_eq!(index.root().status, NodeStatus::Added);
        assert_aggregates_consistent(&index);
    }

    #[test]
    fn test_apply_file_changes_normalizes() {
        let mut index = index();
        index.put_file(File::tracked("keep.md", sha(b"keep")));
        index.put_file(File::tracked("gone.md", sha(b"gone")).with_deleted());

        let temp = BlobId::temporary();
        let edited = File::new(FileInit {
            path: "renamed.md".to_string(),
            path_in_base: Some("original.md".to_string()),
            blob_id: temp,
            blob_hash: sha(b"edited"),
            blob_id_in_base: Some(sha(b"original")),
            ignored: false,
            deleted: false,
            conflicting: false,
            conflict_reason: None,
        });
        index.put_file(edited);

        index.apply_file_changes();

        assert!(index.file("gone.md").is_none());
        let renamed = index.file("renamed.md").unwrap();
        assert_eq!(renamed.blob_id, sha(b"edited"));
        assert!(!renamed.blob_id.is_temporary());
        assert_eq!(renamed.path_in_base.as_deref(), Some("renamed.md"));
        assert!(!renamed.has_changes());

        assert_eq!(index.root().file_stats.all, 2);
        assert!(!index.root().file_stats.has_changes());
        assert_aggregates_consistent(&index);
    }

    #[test]
    fn test_changed_files_skips_ignored() {
        let mut index = index();
        index.put_file(File::tracked("note.md", sha(b"a")).with_deleted());
        index.put_file(File::new(FileInit {
            path: "image.png".to_string(),
            path_in_base: None,
            blob_id: sha(b"img"),
            blob_hash: sha(b"img"),
            blob_id_in_base: None,
            ignored: true,
            deleted: false,
            conflicting: false,
            conflict_reason: None,
        }));

        let changed = index.changed_files();
        assert_eq!(changed.len(), 1);
        assert_eq!(changed[0].path, "note.md");
    }

    #[test]
    fn test_cloned_as_sheds_commit_metadata() {
        let committed = index()
            .cloned_as(IndexId::Remote)
            .with_commit(
                CommitSha::new("abc123def"),
                Utc::now(),
                TreeSha::new("tree456"),
            );

        let base = committed.cloned_as(IndexId::Base);
        assert_eq!(base.commit_sha, committed.commit_sha);

        let local = committed.cloned_as(IndexId::Local);
        assert!(local.commit_sha.is_none());
        assert!(local.commit_time.is_none());
        assert!(local.root_tree_sha.is_none());
    }
}
