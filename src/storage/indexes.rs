//! File-index persistence and the blob reference contract.
//!
//! Adding an index increments blob ref-counts for every non-ignored file's
//! `blob_id` and `blob_id_in_base` (when present and distinct); deleting an
//! index decrements the same. This is how ref-counting stays correct across
//! the four index roles without per-file bookkeeping elsewhere.
//!
//! Single-file edits use the per-file helpers to keep their own
//! increment/decrement pairing, then persist with [`save`], which does not
//! touch ref-counts.

use crate::index::{File, FileIndex};
use crate::storage::blobs;
use crate::storage::error::{StorageError, StorageResult};
use crate::storage::memory::Transaction;
use crate::storage::types::{BlobId, IndexId, RepositoryId};

/// Read an index by role.
pub fn get(
    tx: &Transaction<'_>,
    repository: &RepositoryId,
    index: IndexId,
) -> Option<FileIndex> {
    tx.file_index(repository, index)
}

/// Read an index by role, failing if it does not exist.
pub fn require(
    tx: &Transaction<'_>,
    repository: &RepositoryId,
    index: IndexId,
) -> StorageResult<FileIndex> {
    tx.file_index(repository, index)
        .ok_or_else(|| StorageError::IndexNotFound {
            repository: repository.clone(),
            index,
        })
}

/// The blob references a file node holds: its `blob_id`, plus its
/// `blob_id_in_base` when present and distinct. Ignored files hold none.
pub fn file_refs(file: &File) -> Vec<&BlobId> {
    if file.ignored {
        return Vec::new();
    }
    let mut refs = vec![&file.blob_id];
    if let Some(base) = &file.blob_id_in_base {
        if *base != file.blob_id {
            refs.push(base);
        }
    }
    refs
}

/// Acquire the blob references held by one file node.
pub fn increment_file_refs(tx: &mut Transaction<'_>, file: &File) -> StorageResult<()> {
    for id in file_refs(file) {
        blobs::increment_ref_count(tx, id)?;
    }
    Ok(())
}

/// Release the blob references held by one file node.
pub fn decrement_file_refs(tx: &mut Transaction<'_>, file: &File) -> StorageResult<()> {
    for id in file_refs(file) {
        blobs::decrement_ref_count(tx, id)?;
    }
    Ok(())
}

/// Persist a new index and acquire references for all of its files.
pub fn add(tx: &mut Transaction<'_>, index: &FileIndex) -> StorageResult<()> {
    for file in index.files() {
        increment_file_refs(tx, file)?;
    }
    tx.put_file_index(index.clone());
    Ok(())
}

/// Delete an index and release references for all of its files.
pub fn delete(
    tx: &mut Transaction<'_>,
    repository: &RepositoryId,
    index: IndexId,
) -> StorageResult<()> {
    let existing = require(tx, repository, index)?;
    for file in existing.files() {
        decrement_file_refs(tx, file)?;
    }
    tx.remove_file_index(repository, index);
    Ok(())
}

/// Persist an updated index without touching ref-counts.
///
/// For callers that already adjusted references per file; pairing
/// [`save`] with anything else breaks the ref-count invariant.
pub fn save(tx: &mut Transaction<'_>, index: &FileIndex) {
    tx.put_file_index(index.clone());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::FileInit;
    use crate::storage::memory::Store;

    fn sha(content: &[u8]) -> BlobId {
        BlobId::from_content(content).unwrap()
    }

    fn repo() -> RepositoryId {
        RepositoryId::new("notes")
    }

    #[test]
    fn test_add_and_delete_pair_ref_counts() {
        let store = Store::new();
        let mut tx = store.begin();

        let content_sha = sha(b"content");
        blobs::put(&mut tx, &content_sha, b"content");

        let mut index = FileIndex::new(repo(), IndexId::Base);
        index.put_file(File::tracked("a.md", content_sha.clone()));

        add(&mut tx, &index).unwrap();
        assert_eq!(tx.ref_count(&content_sha), Some(1));

        // a second role referencing the same blob
        let remote = index.cloned_as(IndexId::Remote);
        add(&mut tx, &remote).unwrap();
        assert_eq!(tx.ref_count(&content_sha), Some(2));

        delete(&mut tx, &repo(), IndexId::Base).unwrap();
        delete(&mut tx, &repo(), IndexId::Remote).unwrap();
        assert_eq!(tx.ref_count(&content_sha), Some(0));
        assert_eq!(blobs::collect_garbage(&mut tx), 1);
    }

    #[test]
    fn test_edited_file_holds_two_refs() {
        let store = Store::new();
        let mut tx = store.begin();

        let base_sha = sha(b"old");
        let temp = BlobId::temporary();
        blobs::put(&mut tx, &base_sha, b"old");
        blobs::put(&mut tx, &temp, b"new");

        let mut index = FileIndex::new(repo(), IndexId::Local);
        index.put_file(File::new(FileInit {
            path: "a.md".to_string(),
            path_in_base: Some("a.md".to_string()),
            blob_id: temp.clone(),
            blob_hash: sha(b"new"),
            blob_id_in_base: Some(base_sha.clone()),
            ignored: false,
            deleted: false,
            conflicting: false,
            conflict_reason: None,
        }));

        add(&mut tx, &index).unwrap();
        assert_eq!(tx.ref_count(&temp), Some(1));
        assert_eq!(tx.ref_count(&base_sha), Some(1));
    }

    #[test]
    fn test_ignored_files_hold_no_refs() {
        let store = Store::new();
        let mut tx = store.begin();

        let mut index = FileIndex::new(repo(), IndexId::Remote);
        index.put_file(File::tracked("image.png", sha(b"pixels")));

        // no blob content was ever put; adding must not fail
        add(&mut tx, &index).unwrap();
        assert_eq!(tx.ref_count(&sha(b"pixels")), None);
    }

    #[test]
    fn test_delete_missing_index_fails() {
        let store = Store::new();
        let mut tx = store.begin();

        let err = delete(&mut tx, &repo(), IndexId::Rebase).unwrap_err();
        assert!(matches!(err, StorageError::IndexNotFound { .. }));
    }
}
