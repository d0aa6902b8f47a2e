//! Content-addressed blob storage with reference counting.
//!
//! Blob content lives in the `blobs` store; each id has a ref-count record
//! in `blob_ref_counts`. Content may be deleted by garbage collection iff
//! its ref-count is zero. Increments and decrements are paired exactly with
//! the index mutations that add or remove references (see
//! `storage::indexes`); this pairing is the central correctness invariant
//! of the store.
//!
//! Garbage collection runs after every operation that could have dropped a
//! ref-count to zero (file delete, index replacement). It is never
//! scheduled periodically.

use tracing::debug;

use crate::storage::error::{StorageError, StorageResult};
use crate::storage::memory::Transaction;
use crate::storage::types::BlobId;

/// Read blob content. `None` if the id has never been put (or was
/// collected).
pub fn get(tx: &Transaction<'_>, id: &BlobId) -> Option<Vec<u8>> {
    tx.blob(id)
}

/// Read blob content, failing if it is absent.
pub fn require(tx: &Transaction<'_>, id: &BlobId) -> StorageResult<Vec<u8>> {
    tx.blob(id).ok_or_else(|| StorageError::BlobNotFound(id.clone()))
}

/// Check whether content exists for the id.
pub fn exists(tx: &Transaction<'_>, id: &BlobId) -> bool {
    tx.blob_exists(id)
}

/// Store blob content under the id.
///
/// Idempotent overwrite; initializes the ref-count record to zero if the id
/// has never been seen.
pub fn put(tx: &mut Transaction<'_>, id: &BlobId, content: &[u8]) {
    tx.put_blob(id, content.to_vec());
    if tx.ref_count(id).is_none() {
        tx.set_ref_count(id, 0);
    }
}

/// Add one reference to the blob.
pub fn increment_ref_count(tx: &mut Transaction<'_>, id: &BlobId) -> StorageResult<()> {
    let count = tx
        .ref_count(id)
        .ok_or_else(|| StorageError::MissingRefCount(id.clone()))?;
    tx.set_ref_count(id, count + 1);
    Ok(())
}

/// Drop one reference from the blob.
///
/// Underflow is a data-integrity bug and fails fatally.
pub fn decrement_ref_count(tx: &mut Transaction<'_>, id: &BlobId) -> StorageResult<()> {
    let count = tx
        .ref_count(id)
        .ok_or_else(|| StorageError::MissingRefCount(id.clone()))?;
    if count == 0 {
        return Err(StorageError::NegativeRefCount(id.clone()));
    }
    tx.set_ref_count(id, count - 1);
    Ok(())
}

/// Delete content and ref-count record for every blob with ref-count zero.
///
/// Returns how many blobs were collected.
pub fn collect_garbage(tx: &mut Transaction<'_>) -> usize {
    let ids = tx.zero_ref_count_blob_ids();
    for id in &ids {
        tx.remove_blob(id);
        tx.remove_ref_count(id);
    }
    if !ids.is_empty() {
        debug!(collected = ids.len(), "blob garbage collection");
    }
    ids.len()
}
