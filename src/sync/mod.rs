//! The sync orchestrator.
//!
//! Sequences a full synchronization round for one repository:
//! resume an unresolved manual rebase, initialize an empty remote, fetch
//! the new remote commits, fold each one in (diff, rebase, promote), then
//! push the accumulated local changes as a single new commit.
//!
//! A rebase that produces conflicts fails the round with a distinguished
//! `rebase_conflicts` condition: that is user work, not a transient error.
//! Losing the branch-ref compare-and-swap restarts the whole round, once
//! per rejection, with no cap (observable through a warning per retry).
//!
//! The orchestrator is not internally serialized; callers must not run two
//! syncs for the same repository concurrently.

use tracing::{debug, info, warn};

use crate::diff;
use crate::error::{SyncError, SyncResult};
use crate::index::FileStats;
use crate::progress::{ProgressSink, SubProgress};
use crate::rebase;
use crate::remote::{BranchHead, RemoteCommit, RemoteError, RemoteHost, TreeWrite, TreeWriteOp};
use crate::storage::types::{BlobId, CommitSha, IndexId, RepositoryId, TreeSha};
use crate::storage::{blobs, indexes, repositories, Store};

/// Result of a completed sync round.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncOutcome {
    /// Remote commits folded into the working copy.
    pub commits_processed: usize,
    /// The commit created by the push, if local changes existed.
    pub pushed_commit: Option<CommitSha>,
}

/// Message formatting for engine-created commits.
pub struct CommitMessage;

impl CommitMessage {
    /// Message of the repository-initialization bootstrap commit.
    pub const INITIALIZE: &'static str = "Initialize repository";

    /// Summarize pushed change counts.
    pub fn sync(stats: &FileStats) -> String {
        let mut parts = Vec::new();
        for (count, label) in [
            (stats.added, "added"),
            (stats.modified, "modified"),
            (stats.renamed, "renamed"),
            (stats.deleted, "deleted"),
        ] {
            if count > 0 {
                parts.push(format!("{} {}", count, label));
            }
        }
        if parts.is_empty() {
            "Sync local changes".to_string()
        } else {
            format!("Sync: {}", parts.join(", "))
        }
    }
}

/// Drives synchronization of repositories against one remote host.
pub struct Syncer<H: RemoteHost> {
    store: Store,
    host: H,
}

impl<H: RemoteHost> Syncer<H> {
    pub fn new(store: Store, host: H) -> Self {
        Self { store, host }
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    /// Run a full sync round, restarting on optimistic-lock loss.
    pub fn sync(
        &self,
        repository: &RepositoryId,
        progress: &dyn ProgressSink,
    ) -> SyncResult<SyncOutcome> {
        loop {
            match self.sync_once(repository, progress) {
                Err(e) if e.is_push_rejected() => {
                    warn!(%repository, "push rejected, restarting sync");
                    continue;
                }
                result => return result,
            }
        }
    }

    fn sync_once(
        &self,
        repository: &RepositoryId,
        progress: &dyn ProgressSink,
    ) -> SyncResult<SyncOutcome> {
        progress.report(0.0, "Starting sync");
        self.resume_manual_rebase(repository)?;

        progress.report(0.05, "Checking remote repository");
        let head = self.ensure_remote_initialized()?;

        progress.report(0.1, "Fetching commit history");
        let commits = self.fetch_commits(repository, &head)?;
        debug!(%repository, count = commits.len(), "remote commits to process");

        let total = commits.len().max(1) as f64;
        for (i, commit) in commits.iter().enumerate() {
            let sub = SubProgress::new(progress, 0.2 + 0.6 * (i as f64 / total), 0.6 / total);
            self.process_commit(repository, commit, &sub)?;
        }

        let push_progress = SubProgress::new(progress, 0.8, 0.2);
        let pushed_commit = self.push_local_changes(repository, &push_progress)?;

        progress.report(1.0, "Sync complete");
        Ok(SyncOutcome {
            commits_processed: commits.len(),
            pushed_commit,
        })
    }

    /// Continue a previously conflicted rebase, or fail if its conflicts
    /// are still unresolved.
    fn resume_manual_rebase(&self, repository: &RepositoryId) -> SyncResult<()> {
        let unresolved = self.store.with_transaction(|tx| {
            let record = repositories::require(tx, repository)?;
            if !record.manual_rebase_in_progress {
                return Ok(None);
            }
            let pending = indexes::require(tx, repository, IndexId::Rebase)?;
            let conflicts = pending.root().file_stats.conflicting;
            if conflicts > 0 {
                return Ok(Some(conflicts));
            }
            rebase::continue_rebase(tx, repository)?;
            Ok::<_, SyncError>(None)
        })?;

        match unresolved {
            Some(conflicts) => Err(SyncError::rebase_conflicts(conflicts)),
            None => Ok(()),
        }
    }

    /// Read the branch head, bootstrapping an empty remote repository via
    /// the contents endpoint first (tree/commit object APIs require a
    /// non-empty repository).
    fn ensure_remote_initialized(&self) -> SyncResult<BranchHead> {
        let head = self
            .host
            .branch_head()
            .map_err(|e| SyncError::remote("read branch head", e))?;
        if let Some(head) = head {
            return Ok(head);
        }

        info!("initializing empty remote repository");
        self.host
            .create_file("README.md", b"", CommitMessage::INITIALIZE)
            .map_err(|e| SyncError::remote("create bootstrap file", e))?;

        self.host
            .branch_head()
            .map_err(|e| SyncError::remote("read branch head", e))?
            .ok_or_else(|| {
                SyncError::remote(
                    "initialize repository",
                    RemoteError::Host("repository still empty after bootstrap".to_string()),
                )
            })
    }

    /// Determine the new remote commits to process, oldest first.
    ///
    /// Walks history pages back to the last-known base commit; when the
    /// client is uninitialized or the base vanished from history, falls
    /// back to just the latest commit.
    fn fetch_commits(
        &self,
        repository: &RepositoryId,
        head: &BranchHead,
    ) -> SyncResult<Vec<RemoteCommit>> {
        let (base_sha, base_time) = self.store.with_transaction(|tx| {
            let base = indexes::require(tx, repository, IndexId::Base)?;
            Ok::<_, SyncError>((base.commit_sha.clone(), base.commit_time))
        })?;

        if base_sha.as_ref() == Some(&head.commit_sha) {
            return Ok(Vec::new());
        }

        // uninitialized client: no history walk, just the latest commit
        let Some(base_sha) = base_sha else {
            let batch = self
                .host
                .list_commits(None, 1)
                .map_err(|e| SyncError::remote("list commits", e))?;
            return Ok(batch.into_iter().take(1).collect());
        };

        let mut collected = Vec::new();
        let mut found_base = false;
        'pages: for page in 1usize.. {
            let batch = self
                .host
                .list_commits(base_time, page)
                .map_err(|e| SyncError::remote("list commits", e))?;
            if batch.is_empty() {
                break;
            }
            for commit in batch {
                if commit.sha == base_sha {
                    found_base = true;
                    break 'pages;
                }
                collected.push(commit);
            }
        }

        // the base commit vanished from remote history (force push or
        // similar): fall back to just the latest commit
        if !found_base {
            if collected.is_empty() {
                collected = self
                    .host
                    .list_commits(None, 1)
                    .map_err(|e| SyncError::remote("list commits", e))?;
            }
            collected.truncate(1);
        }

        collected.reverse();
        Ok(collected)
    }

    /// Fold one remote commit into the working copy: diff against base,
    /// rebase local changes, promote the result.
    fn process_commit(
        &self,
        repository: &RepositoryId,
        commit: &RemoteCommit,
        progress: &dyn ProgressSink,
    ) -> SyncResult<()> {
        progress.report(0.0, &format!("Fetching commit {}", commit.sha.short()));
        let entries = diff::fetch_commit_tree(&self.host, commit)?;

        let conflicts = self.store.with_transaction(|tx| {
            let base = indexes::require(tx, repository, IndexId::Base)?;
            let local = indexes::require(tx, repository, IndexId::Local)?;

            progress.report(0.3, "Comparing with last synced state");
            let remote = diff::build_remote_index(tx, &self.host, &base, commit, &entries)?;
            indexes::delete(tx, repository, IndexId::Remote)?;
            indexes::add(tx, &remote)?;

            progress.report(0.6, "Replaying local changes");
            let rebased = rebase::rebase(tx, &remote, &local)?;
            let conflicts = rebased.root().file_stats.conflicting;
            if conflicts == 0 {
                rebase::continue_rebase(tx, repository)?;
            } else {
                // the remote swap above may have orphaned blobs; the
                // rebase index and flag stay for manual work and the
                // transaction still commits
                blobs::collect_garbage(tx);
            }
            Ok::<_, SyncError>(conflicts)
        })?;

        if conflicts > 0 {
            return Err(SyncError::rebase_conflicts(conflicts));
        }
        progress.report(1.0, "Commit applied");
        Ok(())
    }

    /// Push all pending local changes as one commit and roll the local,
    /// remote, and base indexes forward to the new baseline.
    fn push_local_changes(
        &self,
        repository: &RepositoryId,
        progress: &dyn ProgressSink,
    ) -> SyncResult<Option<CommitSha>> {
        progress.report(0.0, "Collecting local changes");

        let pending = self.store.with_transaction(|tx| {
            let local = indexes::require(tx, repository, IndexId::Local)?;
            let remote = indexes::require(tx, repository, IndexId::Remote)?;

            let changed = local.changed_files();
            if changed.is_empty() {
                return Ok(None);
            }

            let mut writes = Vec::new();
            for file in changed {
                if file.deleted {
                    // the remote knows the file by its base path, even if
                    // it was renamed locally before the deletion
                    if let Some(base_path) = &file.path_in_base {
                        writes.push(TreeWrite {
                            path: base_path.clone(),
                            op: TreeWriteOp::Delete,
                        });
                    }
                    continue;
                }
                if let Some(base_path) = &file.path_in_base {
                    if *base_path != file.path {
                        writes.push(TreeWrite {
                            path: base_path.clone(),
                            op: TreeWriteOp::Delete,
                        });
                    }
                }
                let content = blobs::require(tx, &file.blob_id)?;
                writes.push(TreeWrite {
                    path: file.path.clone(),
                    op: TreeWriteOp::Put(content),
                });
            }

            Ok::<_, SyncError>(Some(PendingPush {
                writes,
                base_tree: remote.root_tree_sha.clone(),
                parent: remote.commit_sha.clone(),
                stats: local.root().file_stats,
            }))
        })?;

        let Some(pending) = pending else {
            progress.report(1.0, "Nothing to push");
            return Ok(None);
        };

        progress.report(0.3, "Uploading changes");
        let tree = self
            .host
            .create_tree(pending.base_tree.as_ref(), &pending.writes)
            .map_err(|e| SyncError::remote("create tree", e))?;

        let message = CommitMessage::sync(&pending.stats);
        let commit = self
            .host
            .create_commit(&message, &tree, pending.parent.as_ref())
            .map_err(|e| SyncError::remote("create commit", e))?;

        // optimistic lock: someone else pushing first surfaces here
        self.host
            .update_branch_head(pending.parent.as_ref(), &commit.sha)
            .map_err(|e| SyncError::remote("update branch ref", e))?;

        progress.report(0.7, "Recording new baseline");
        self.finalize_push(repository, &commit, &tree)?;

        info!(%repository, commit = %commit.sha, "pushed local changes");
        progress.report(1.0, "Push complete");
        Ok(Some(commit.sha))
    }

    /// Roll local/remote/base forward to the just-pushed commit.
    fn finalize_push(
        &self,
        repository: &RepositoryId,
        commit: &RemoteCommit,
        tree: &TreeSha,
    ) -> SyncResult<()> {
        self.store.with_transaction(|tx| {
            let mut local = indexes::require(tx, repository, IndexId::Local)?;

            // final-hash content must exist before normalization swaps ids
            let swaps: Vec<(BlobId, BlobId)> = local
                .files()
                .filter(|file| !file.ignored && !file.deleted && file.blob_id != file.blob_hash)
                .map(|file| (file.blob_id.clone(), file.blob_hash.clone()))
                .collect();
            for (id, hash) in swaps {
                let content = blobs::require(tx, &id)?;
                blobs::put(tx, &hash, &content);
            }

            local.apply_file_changes();
            let new_remote = local.cloned_as(IndexId::Remote).with_commit(
                commit.sha.clone(),
                commit.timestamp,
                tree.clone(),
            );
            let new_base = new_remote.cloned_as(IndexId::Base);

            indexes::delete(tx, repository, IndexId::Local)?;
            indexes::delete(tx, repository, IndexId::Base)?;
            indexes::delete(tx, repository, IndexId::Remote)?;
            indexes::add(tx, &local)?;
            indexes::add(tx, &new_remote)?;
            indexes::add(tx, &new_base)?;

            blobs::collect_garbage(tx);
            Ok::<_, SyncError>(())
        })
    }
}

struct PendingPush {
    writes: Vec<TreeWrite>,
    base_tree: Option<TreeSha>,
    parent: Option<CommitSha>,
    stats: FileStats,
}
