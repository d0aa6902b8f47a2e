//! Repository record persistence.

use crate::storage::error::{StorageError, StorageResult};
use crate::storage::memory::Transaction;
use crate::storage::types::{Repository, RepositoryId};

pub fn get(tx: &Transaction<'_>, id: &RepositoryId) -> Option<Repository> {
    tx.repository(id)
}

pub fn require(tx: &Transaction<'_>, id: &RepositoryId) -> StorageResult<Repository> {
    tx.repository(id)
        .ok_or_else(|| StorageError::RepositoryNotFound(id.clone()))
}

pub fn put(tx: &mut Transaction<'_>, repository: Repository) {
    tx.put_repository(repository);
}

pub fn delete(tx: &mut Transaction<'_>, id: &RepositoryId) {
    tx.remove_repository(id);
}

/// Set or clear the manual-rebase flag.
pub fn set_manual_rebase(
    tx: &mut Transaction<'_>,
    id: &RepositoryId,
    in_progress: bool,
) -> StorageResult<()> {
    let mut repository = require(tx, id)?;
    if repository.manual_rebase_in_progress != in_progress {
        repository.manual_rebase_in_progress = in_progress;
        put(tx, repository);
    }
    Ok(())
}
