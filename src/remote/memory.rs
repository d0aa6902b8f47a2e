//! In-memory remote host.
//!
//! Implements [`RemoteHost`] over plain object tables with a linear
//! default-branch history. Used by tests and offline operation; object ids
//! are git-style hashes of a canonical serialization, so they are stable
//! across runs.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, TimeZone, Utc};
use parking_lot::Mutex;

use crate::remote::{
    BranchHead, RemoteCommit, RemoteError, RemoteHost, RemoteResult, RemoteTreeEntry,
    TreeWrite, TreeWriteOp, COMMIT_PAGE_SIZE,
};
use crate::storage::types::{BlobId, CommitSha, TreeSha};

/// A Git-compatible host held entirely in memory.
///
/// Clone to share; all clones observe the same state.
#[derive(Clone)]
pub struct MemoryHost {
    state: Arc<Mutex<HostState>>,
}

struct HostState {
    blobs: BTreeMap<BlobId, Vec<u8>>,
    trees: BTreeMap<TreeSha, Vec<RemoteTreeEntry>>,
    commits: BTreeMap<CommitSha, RemoteCommit>,
    head: Option<CommitSha>,
    /// Last issued commit timestamp, to keep history strictly ordered.
    clock: DateTime<Utc>,
}

impl Default for MemoryHost {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryHost {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(HostState {
                blobs: BTreeMap::new(),
                trees: BTreeMap::new(),
                commits: BTreeMap::new(),
                head: None,
                clock: Utc.timestamp_opt(0, 0).single().unwrap_or_else(Utc::now),
            })),
        }
    }

    /// Commit a complete file listing on top of the current head and
    /// advance the branch. Simulates another client pushing.
    pub fn push_listing(
        &self,
        files: &[(&str, &[u8])],
        message: &str,
    ) -> RemoteResult<RemoteCommit> {
        let mut state = self.state.lock();

        let mut entries = Vec::new();
        for (path, content) in files {
            let sha = hash_blob(content)?;
            state.blobs.insert(sha.clone(), content.to_vec());
            entries.push(RemoteTreeEntry {
                path: path.to_string(),
                sha,
            });
        }
        entries.sort_by(|a, b| a.path.cmp(&b.path));

        let tree_sha = tree_id(&entries)?;
        state.trees.insert(tree_sha.clone(), entries);

        let parent = state.head.clone();
        let commit = state.new_commit(message, tree_sha, parent)?;
        state.head = Some(commit.sha.clone());
        Ok(commit)
    }

    /// The current head commit, if any.
    pub fn head_commit(&self) -> Option<RemoteCommit> {
        let state = self.state.lock();
        let head = state.head.clone()?;
        state.commits.get(&head).cloned()
    }

    /// Number of commits reachable from the head.
    pub fn history_len(&self) -> usize {
        let state = self.state.lock();
        state.history(None).len()
    }
}

impl HostState {
    fn next_timestamp(&mut self) -> DateTime<Utc> {
        let now = Utc::now();
        let next = if now > self.clock {
            now
        } else {
            self.clock + Duration::seconds(1)
        };
        self.clock = next;
        next
    }

    fn new_commit(
        &mut self,
        message: &str,
        tree_sha: TreeSha,
        parent: Option<CommitSha>,
    ) -> RemoteResult<RemoteCommit> {
        let timestamp = self.next_timestamp();
        let identity = format!(
            "commit {} {} {} {}",
            tree_sha,
            parent.as_ref().map(CommitSha::as_str).unwrap_or("-"),
            timestamp.timestamp(),
            message
        );
        let sha = CommitSha::new(hash_blob(identity.as_bytes())?.as_str().to_string());

        let commit = RemoteCommit {
            sha: sha.clone(),
            tree_sha,
            parents: parent.into_iter().collect(),
            message: message.to_string(),
            timestamp,
        };
        self.commits.insert(sha, commit.clone());
        Ok(commit)
    }

    /// Walk the first-parent chain from the head, newest first.
    fn history(&self, since: Option<DateTime<Utc>>) -> Vec<RemoteCommit> {
        let mut result = Vec::new();
        let mut cursor = self.head.clone();
        while let Some(sha) = cursor {
            let Some(commit) = self.commits.get(&sha) else {
                break;
            };
            if let Some(since) = since {
                if commit.timestamp < since {
                    break;
                }
            }
            result.push(commit.clone());
            cursor = commit.parents.first().cloned();
        }
        result
    }
}

fn hash_blob(content: &[u8]) -> RemoteResult<BlobId> {
    BlobId::from_content(content).map_err(|e| RemoteError::Host(e.to_string()))
}

fn tree_id(entries: &[RemoteTreeEntry]) -> RemoteResult<TreeSha> {
    let listing: String = entries
        .iter()
        .map(|entry| format!("{} {}\n", entry.sha, entry.path))
        .collect();
    Ok(TreeSha::new(
        hash_blob(listing.as_bytes())?.as_str().to_string(),
    ))
}

impl RemoteHost for MemoryHost {
    fn fetch_tree(&self, tree: &TreeSha) -> RemoteResult<Vec<RemoteTreeEntry>> {
        let state = self.state.lock();
        state
            .trees
            .get(tree)
            .cloned()
            .ok_or_else(|| RemoteError::NotFound(tree.to_string()))
    }

    fn fetch_blob(&self, sha: &BlobId) -> RemoteResult<Vec<u8>> {
        let state = self.state.lock();
        state
            .blobs
            .get(sha)
            .cloned()
            .ok_or_else(|| RemoteError::NotFound(sha.to_string()))
    }

    fn list_commits(
        &self,
        since: Option<DateTime<Utc>>,
        page: usize,
    ) -> RemoteResult<Vec<RemoteCommit>> {
        let state = self.state.lock();
        let history = state.history(since);
        let start = page.saturating_sub(1) * COMMIT_PAGE_SIZE;
        Ok(history
            .into_iter()
            .skip(start)
            .take(COMMIT_PAGE_SIZE)
            .collect())
    }

    fn create_tree(
        &self,
        base: Option<&TreeSha>,
        writes: &[TreeWrite],
    ) -> RemoteResult<TreeSha> {
        let mut state = self.state.lock();

        let mut entries: BTreeMap<String, BlobId> = match base {
            Some(base) => state
                .trees
                .get(base)
                .ok_or_else(|| RemoteError::NotFound(base.to_string()))?
                .iter()
                .map(|entry| (entry.path.clone(), entry.sha.clone()))
                .collect(),
            None => BTreeMap::new(),
        };

        for write in writes {
            match &write.op {
                TreeWriteOp::Put(content) => {
                    let sha = hash_blob(content)?;
                    state.blobs.insert(sha.clone(), content.clone());
                    entries.insert(write.path.clone(), sha);
                }
                TreeWriteOp::Delete => {
                    entries.remove(&write.path);
                }
            }
        }

        let entries: Vec<RemoteTreeEntry> = entries
            .into_iter()
            .map(|(path, sha)| RemoteTreeEntry { path, sha })
            .collect();
        let sha = tree_id(&entries)?;
        state.trees.insert(sha.clone(), entries);
        Ok(sha)
    }

    fn create_commit(
        &self,
        message: &str,
        tree: &TreeSha,
        parent: Option<&CommitSha>,
    ) -> RemoteResult<RemoteCommit> {
        let mut state = self.state.lock();
        if !state.trees.contains_key(tree) {
            return Err(RemoteError::NotFound(tree.to_string()));
        }
        state.new_commit(message, tree.clone(), parent.cloned())
    }

    fn branch_head(&self) -> RemoteResult<Option<BranchHead>> {
        let state = self.state.lock();
        Ok(state
            .head
            .clone()
            .map(|commit_sha| BranchHead { commit_sha }))
    }

    fn update_branch_head(
        &self,
        expected: Option<&CommitSha>,
        target: &CommitSha,
    ) -> RemoteResult<()> {
        let mut state = self.state.lock();
        if state.head.as_ref() != expected {
            return Err(RemoteError::RefChanged);
        }
        if !state.commits.contains_key(target) {
            return Err(RemoteError::NotFound(target.to_string()));
        }
        state.head = Some(target.clone());
        Ok(())
    }

    fn create_file(&self, path: &str, content: &[u8], message: &str) -> RemoteResult<()> {
        let mut state = self.state.lock();

        let mut entries: Vec<RemoteTreeEntry> = match &state.head {
            Some(head) => {
                let tree_sha = state
                    .commits
                    .get(head)
                    .map(|commit| commit.tree_sha.clone())
                    .ok_or_else(|| RemoteError::NotFound(head.to_string()))?;
                state.trees.get(&tree_sha).cloned().unwrap_or_default()
            }
            None => Vec::new(),
        };

        let sha = hash_blob(content)?;
        state.blobs.insert(sha.clone(), content.to_vec());
        entries.retain(|entry| entry.path != path);
        entries.push(RemoteTreeEntry {
            path: path.to_string(),
            sha,
        });
        entries.sort_by(|a, b| a.path.cmp(&b.path));

        let tree_sha = tree_id(&entries)?;
        state.trees.insert(tree_sha.clone(), entries);

        let parent = state.head.clone();
        let commit = state.new_commit(message, tree_sha, parent)?;
        state.head = Some(commit.sha.clone());
        Ok(())
    }
}
