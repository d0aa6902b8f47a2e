//! Working-copy operations.
//!
//! The editing surface the presentation layer talks to: repository
//! lifecycle plus per-file writes, renames, deletes, and conflict
//! resolution. Edits target the `local` index, or the `rebase` index while
//! a manual rebase is in progress.
//!
//! Every operation runs in its own transaction and keeps the blob
//! ref-count pairing for the single file it touches; garbage collection
//! runs whenever an edit could have orphaned content.

use crate::index::{paths, File, FileIndex, FileInit, Node};
use crate::storage::error::{StorageError, StorageResult};
use crate::storage::memory::Transaction;
use crate::storage::types::{BlobId, IndexId, Repository, RepositoryId};
use crate::storage::{blobs, indexes, repositories, Store};

/// High-level access to repositories and their working copies.
#[derive(Clone)]
pub struct Workspace {
    store: Store,
}

impl Workspace {
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    // ==================== repository lifecycle ====================

    /// Create a repository record plus its empty `base`/`remote`/`local`
    /// indexes, atomically.
    pub fn add_repository(&self, id: &RepositoryId) -> StorageResult<()> {
        self.store.with_transaction(|tx| {
            if repositories::get(tx, id).is_some() {
                return Err(StorageError::RepositoryExists(id.clone()));
            }
            repositories::put(tx, Repository::new(id.clone()));
            for role in [IndexId::Base, IndexId::Remote, IndexId::Local] {
                indexes::add(tx, &FileIndex::new(id.clone(), role))?;
            }
            Ok(())
        })
    }

    /// Delete the repository record and all of its indexes (including a
    /// stale `rebase`), then collect orphaned blobs.
    pub fn remove_repository(&self, id: &RepositoryId) -> StorageResult<()> {
        self.store.with_transaction(|tx| {
            repositories::require(tx, id)?;
            for role in [
                IndexId::Base,
                IndexId::Remote,
                IndexId::Local,
                IndexId::Rebase,
            ] {
                if indexes::get(tx, id, role).is_some() {
                    indexes::delete(tx, id, role)?;
                }
            }
            repositories::delete(tx, id);
            blobs::collect_garbage(tx);
            Ok(())
        })
    }

    /// Read a repository record.
    pub fn repository(&self, id: &RepositoryId) -> StorageResult<Option<Repository>> {
        self.store
            .with_transaction(|tx| Ok(repositories::get(tx, id)))
    }

    /// Read an index by role.
    pub fn index(
        &self,
        id: &RepositoryId,
        role: IndexId,
    ) -> StorageResult<Option<FileIndex>> {
        self.store
            .with_transaction(|tx| Ok(indexes::get(tx, id, role)))
    }

    // ==================== file operations ====================

    /// Write file content, creating the file if needed.
    ///
    /// Content matching the base snapshot reverts the file to unmodified;
    /// anything else is stored under a temporary blob id until push.
    pub fn write_file(
        &self,
        repository: &RepositoryId,
        path: &str,
        content: &[u8],
    ) -> StorageResult<()> {
        if !paths::is_markdown(path) {
            return Err(StorageError::UnmanagedPath(path.to_string()));
        }

        self.store.with_transaction(|tx| {
            let mut index = editing_index(tx, repository)?;
            if matches!(index.node(path), Some(Node::Tree(_))) {
                return Err(StorageError::PathOccupied(path.to_string()));
            }

            let hash = BlobId::from_content(content)?;
            let file = match index.file(path).cloned() {
                Some(old) => {
                    if old.blob_hash == hash && !old.deleted {
                        return Ok(());
                    }
                    let blob_id = if old.blob_id_in_base.as_ref() == Some(&hash) {
                        // reverted to the base content
                        hash.clone()
                    } else if old.blob_hash == hash {
                        // revival with bytes already stored
                        old.blob_id.clone()
                    } else {
                        BlobId::temporary()
                    };
                    blobs::put(tx, &blob_id, content);
                    let new = old.with_content(blob_id, hash);
                    indexes::decrement_file_refs(tx, &old)?;
                    indexes::increment_file_refs(tx, &new)?;
                    new
                }
                None => {
                    let blob_id = BlobId::temporary();
                    blobs::put(tx, &blob_id, content);
                    let file = File::new(FileInit {
                        path: path.to_string(),
                        path_in_base: None,
                        blob_id,
                        blob_hash: hash,
                        blob_id_in_base: None,
                        ignored: false,
                        deleted: false,
                        conflicting: false,
                        conflict_reason: None,
                    });
                    indexes::increment_file_refs(tx, &file)?;
                    file
                }
            };

            index.put_file(file);
            indexes::save(tx, &index);
            blobs::collect_garbage(tx);
            Ok(())
        })
    }

    /// Read current file content.
    pub fn read_file(&self, repository: &RepositoryId, path: &str) -> StorageResult<Vec<u8>> {
        self.store.with_transaction(|tx| {
            let index = editing_index(tx, repository)?;
            let file = index
                .file(path)
                .ok_or_else(|| StorageError::PathNotFound(path.to_string()))?;
            if file.ignored {
                return Err(StorageError::UnmanagedPath(path.to_string()));
            }
            if file.deleted {
                return Err(StorageError::PathNotFound(path.to_string()));
            }
            blobs::require(tx, &file.blob_id)
        })
    }

    /// Move a file to a new path. The target must be free.
    pub fn rename_file(
        &self,
        repository: &RepositoryId,
        from: &str,
        to: &str,
    ) -> StorageResult<()> {
        if !paths::is_markdown(to) {
            return Err(StorageError::UnmanagedPath(to.to_string()));
        }

        self.store.with_transaction(|tx| {
            let mut index = editing_index(tx, repository)?;
            let file = index
                .file(from)
                .ok_or_else(|| StorageError::PathNotFound(from.to_string()))?
                .clone();
            if file.ignored || file.deleted {
                return Err(StorageError::PathNotFound(from.to_string()));
            }
            if from == to {
                return Ok(());
            }
            if index.node(to).is_some() {
                return Err(StorageError::PathOccupied(to.to_string()));
            }

            let renamed = file.with_path(to);
            index.delete_file(from);
            index.put_file(renamed);
            indexes::save(tx, &index);
            Ok(())
        })
    }

    /// Delete a file.
    ///
    /// Locally added files are removed outright; tracked files are marked
    /// deleted so the deletion can be pushed.
    pub fn delete_file(&self, repository: &RepositoryId, path: &str) -> StorageResult<()> {
        self.store.with_transaction(|tx| {
            let mut index = editing_index(tx, repository)?;
            let file = index
                .file(path)
                .ok_or_else(|| StorageError::PathNotFound(path.to_string()))?
                .clone();
            if file.ignored {
                return Err(StorageError::UnmanagedPath(path.to_string()));
            }

            if file.added() {
                indexes::decrement_file_refs(tx, &file)?;
                index.delete_file(path);
            } else if !file.deleted {
                index.put_file(file.with_deleted());
            }

            indexes::save(tx, &index);
            blobs::collect_garbage(tx);
            Ok(())
        })
    }

    /// Clear the conflict mark on a rebase-index file, once the user has
    /// settled its content. Sync continues when no conflicts remain.
    pub fn resolve_conflict(&self, repository: &RepositoryId, path: &str) -> StorageResult<()> {
        self.store.with_transaction(|tx| {
            let record = repositories::require(tx, repository)?;
            if !record.manual_rebase_in_progress {
                return Err(StorageError::NoRebaseInProgress(repository.clone()));
            }

            let mut index = indexes::require(tx, repository, IndexId::Rebase)?;
            let file = index
                .file(path)
                .ok_or_else(|| StorageError::PathNotFound(path.to_string()))?
                .clone();
            if !file.conflicting {
                return Ok(());
            }

            index.put_file(file.without_conflict());
            indexes::save(tx, &index);
            Ok(())
        })
    }
}

/// The index edits currently target: `rebase` during a manual rebase,
/// `local` otherwise.
fn editing_index(tx: &Transaction<'_>, repository: &RepositoryId) -> StorageResult<FileIndex> {
    let record = repositories::require(tx, repository)?;
    let role = if record.manual_rebase_in_progress {
        IndexId::Rebase
    } else {
        IndexId::Local
    };
    indexes::require(tx, repository, role)
}
