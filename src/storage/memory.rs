//! The transactional in-memory store.
//!
//! Four object stores back the engine: `repositories`, `file_indexes`,
//! `blobs`, and `blob_ref_counts` (the last with a secondary index by count
//! value, used to enumerate zero-refcount blobs for garbage collection).
//!
//! Transactions buffer a write-set per store; reads see the caller's own
//! writes layered over committed state. `commit` applies the write-set
//! atomically under one lock, then publishes the collected change events.
//! Dropping a transaction without committing discards it.
//!
//! Core operations always take an explicit `&mut Transaction`; the one
//! convenience wrapper is [`Store::with_transaction`]. There is no implicit
//! "current transaction" anywhere.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use parking_lot::RwLock;

use crate::events::{ChangeEvent, EventBus, Subscription};
use crate::index::FileIndex;
use crate::storage::error::StorageResult;
use crate::storage::types::{BlobId, IndexId, Repository, RepositoryId};

type IndexKey = (RepositoryId, IndexId);

#[derive(Default)]
struct Tables {
    repositories: BTreeMap<RepositoryId, Repository>,
    file_indexes: BTreeMap<IndexKey, FileIndex>,
    blobs: BTreeMap<BlobId, Vec<u8>>,
    blob_ref_counts: BTreeMap<BlobId, u64>,
    /// secondary index: ref-count value -> blob ids with that count
    by_ref_count: BTreeMap<u64, BTreeSet<BlobId>>,
}

impl Tables {
    fn set_ref_count(&mut self, id: BlobId, count: u64) {
        if let Some(old) = self.blob_ref_counts.insert(id.clone(), count) {
            if let Some(ids) = self.by_ref_count.get_mut(&old) {
                ids.remove(&id);
                if ids.is_empty() {
                    self.by_ref_count.remove(&old);
                }
            }
        }
        self.by_ref_count.entry(count).or_default().insert(id);
    }

    fn remove_ref_count(&mut self, id: &BlobId) {
        if let Some(old) = self.blob_ref_counts.remove(id) {
            if let Some(ids) = self.by_ref_count.get_mut(&old) {
                ids.remove(id);
                if ids.is_empty() {
                    self.by_ref_count.remove(&old);
                }
            }
        }
    }
}

/// The store handle.
///
/// Thread-safe; clone to share (uses `Arc` internally).
#[derive(Clone)]
pub struct Store {
    inner: Arc<StoreInner>,
}

struct StoreInner {
    tables: RwLock<Tables>,
    events: Arc<EventBus>,
}

impl Default for Store {
    fn default() -> Self {
        Self::new()
    }
}

impl Store {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(StoreInner {
                tables: RwLock::new(Tables::default()),
                events: Arc::new(EventBus::new()),
            }),
        }
    }

    /// Begin a new transaction.
    pub fn begin(&self) -> Transaction<'_> {
        Transaction {
            store: &self.inner,
            repositories: BTreeMap::new(),
            file_indexes: BTreeMap::new(),
            blobs: BTreeMap::new(),
            ref_counts: BTreeMap::new(),
            events: BTreeSet::new(),
        }
    }

    /// Execute a function within a transaction, committing on `Ok` and
    /// discarding the write-set on `Err`.
    pub fn with_transaction<T, E, F>(&self, f: F) -> Result<T, E>
    where
        E: From<crate::storage::error::StorageError>,
        F: FnOnce(&mut Transaction<'_>) -> Result<T, E>,
    {
        let mut tx = self.begin();
        let result = f(&mut tx)?;
        tx.commit()?;
        Ok(result)
    }

    /// Subscribe to change events published by committed transactions.
    pub fn subscribe(
        &self,
        callback: impl Fn(&ChangeEvent) + Send + Sync + 'static,
    ) -> Subscription {
        self.inner.events.subscribe(callback)
    }
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let tables = self.inner.tables.read();
        f.debug_struct("Store")
            .field("repositories", &tables.repositories.len())
            .field("file_indexes", &tables.file_indexes.len())
            .field("blobs", &tables.blobs.len())
            .finish()
    }
}

/// A buffered multi-store transaction.
///
/// `None` in a write-set entry marks a pending delete.
pub struct Transaction<'s> {
    store: &'s StoreInner,
    repositories: BTreeMap<RepositoryId, Option<Repository>>,
    file_indexes: BTreeMap<IndexKey, Option<FileIndex>>,
    blobs: BTreeMap<BlobId, Option<Vec<u8>>>,
    ref_counts: BTreeMap<BlobId, Option<u64>>,
    events: BTreeSet<ChangeEvent>,
}

impl Transaction<'_> {
    // ==================== repositories ====================

    pub fn repository(&self, id: &RepositoryId) -> Option<Repository> {
        match self.repositories.get(id) {
            Some(write) => write.clone(),
            None => self.store.tables.read().repositories.get(id).cloned(),
        }
    }

    pub fn put_repository(&mut self, repository: Repository) {
        self.events
            .insert(ChangeEvent::Repository(repository.id.clone()));
        self.repositories
            .insert(repository.id.clone(), Some(repository));
    }

    pub fn remove_repository(&mut self, id: &RepositoryId) {
        self.events.insert(ChangeEvent::Repository(id.clone()));
        self.repositories.insert(id.clone(), None);
    }

    // ==================== file indexes ====================

    pub fn file_index(&self, repository: &RepositoryId, index: IndexId) -> Option<FileIndex> {
        let key = (repository.clone(), index);
        match self.file_indexes.get(&key) {
            Some(write) => write.clone(),
            None => self.store.tables.read().file_indexes.get(&key).cloned(),
        }
    }

    pub fn put_file_index(&mut self, index: FileIndex) {
        self.events.insert(ChangeEvent::FileIndex {
            repository: index.repository_id.clone(),
            index: index.index_id,
        });
        self.file_indexes
            .insert((index.repository_id.clone(), index.index_id), Some(index));
    }

    pub fn remove_file_index(&mut self, repository: &RepositoryId, index: IndexId) {
        self.events.insert(ChangeEvent::FileIndex {
            repository: repository.clone(),
            index,
        });
        self.file_indexes.insert((repository.clone(), index), None);
    }

    // ==================== blobs ====================

    pub fn blob(&self, id: &BlobId) -> Option<Vec<u8>> {
        match self.blobs.get(id) {
            Some(write) => write.clone(),
            None => self.store.tables.read().blobs.get(id).cloned(),
        }
    }

    pub fn blob_exists(&self, id: &BlobId) -> bool {
        match self.blobs.get(id) {
            Some(write) => write.is_some(),
            None => self.store.tables.read().blobs.contains_key(id),
        }
    }

    pub fn put_blob(&mut self, id: &BlobId, content: Vec<u8>) {
        self.events.insert(ChangeEvent::Blob(id.clone()));
        self.blobs.insert(id.clone(), Some(content));
    }

    pub fn remove_blob(&mut self, id: &BlobId) {
        self.events.insert(ChangeEvent::Blob(id.clone()));
        self.blobs.insert(id.clone(), None);
    }

    // ==================== blob ref-counts ====================

    pub fn ref_count(&self, id: &BlobId) -> Option<u64> {
        match self.ref_counts.get(id) {
            Some(write) => *write,
            None => self.store.tables.read().blob_ref_counts.get(id).copied(),
        }
    }

    pub fn set_ref_count(&mut self, id: &BlobId, count: u64) {
        self.events.insert(ChangeEvent::Blob(id.clone()));
        self.ref_counts.insert(id.clone(), Some(count));
    }

    pub fn remove_ref_count(&mut self, id: &BlobId) {
        self.events.insert(ChangeEvent::Blob(id.clone()));
        self.ref_counts.insert(id.clone(), None);
    }

    /// Enumerate blob ids whose ref-count is zero, as seen by this
    /// transaction (committed secondary index overlaid with own writes).
    pub fn zero_ref_count_blob_ids(&self) -> Vec<BlobId> {
        let mut ids: BTreeSet<BlobId> = self
            .store
            .tables
            .read()
            .by_ref_count
            .get(&0)
            .cloned()
            .unwrap_or_default();

        for (id, write) in &self.ref_counts {
            match write {
                Some(0) => {
                    ids.insert(id.clone());
                }
                _ => {
                    ids.remove(id);
                }
            }
        }

        ids.into_iter().collect()
    }

    // ==================== lifecycle ====================

    /// Apply the write-set atomically, then publish the collected events.
    pub fn commit(self) -> StorageResult<()> {
        {
            let mut tables = self.store.tables.write();

            for (id, write) in self.repositories {
                match write {
                    Some(repository) => {
                        tables.repositories.insert(id, repository);
                    }
                    None => {
                        tables.repositories.remove(&id);
                    }
                }
            }

            for (key, write) in self.file_indexes {
                match write {
                    Some(index) => {
                        tables.file_indexes.insert(key, index);
                    }
                    None => {
                        tables.file_indexes.remove(&key);
                    }
                }
            }

            for (id, write) in self.blobs {
                match write {
                    Some(content) => {
                        tables.blobs.insert(id, content);
                    }
                    None => {
                        tables.blobs.remove(&id);
                    }
                }
            }

            for (id, write) in self.ref_counts {
                match write {
                    Some(count) => tables.set_ref_count(id, count),
                    None => tables.remove_ref_count(&id),
                }
            }
        }

        // publish after the lock is released so subscribers can read back
        for event in &self.events {
            self.store.events.emit(event);
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn repo_id() -> RepositoryId {
        RepositoryId::new("notes")
    }

    #[test]
    fn test_read_your_writes() {
        let store = Store::new();
        let mut tx = store.begin();

        assert!(tx.repository(&repo_id()).is_none());
        tx.put_repository(Repository::new(repo_id()));
        assert!(tx.repository(&repo_id()).is_some());

        // not visible outside before commit
        let other = store.begin();
        assert!(other.repository(&repo_id()).is_none());

        tx.commit().unwrap();
        let other = store.begin();
        assert!(other.repository(&repo_id()).is_some());
    }

    #[test]
    fn test_drop_discards_writes() {
        let store = Store::new();
        let mut tx = store.begin();
        tx.put_repository(Repository::new(repo_id()));
        drop(tx);

        let tx = store.begin();
        assert!(tx.repository(&repo_id()).is_none());
    }

    #[test]
    fn test_delete_overlays_committed_state() {
        let store = Store::new();
        store
            .with_transaction::<_, crate::storage::error::StorageError, _>(|tx| {
                tx.put_repository(Repository::new(repo_id()));
                Ok(())
            })
            .unwrap();

        let mut tx = store.begin();
        tx.remove_repository(&repo_id());
        assert!(tx.repository(&repo_id()).is_none());
        tx.commit().unwrap();

        assert!(store.begin().repository(&repo_id()).is_none());
    }

    #[test]
    fn test_zero_ref_count_enumeration() {
        let store = Store::new();
        let a = BlobId::from_content(b"a").unwrap();
        let b = BlobId::from_content(b"b").unwrap();

        store
            .with_transaction::<_, crate::storage::error::StorageError, _>(|tx| {
                tx.put_blob(&a, b"a".to_vec());
                tx.set_ref_count(&a, 0);
                tx.put_blob(&b, b"b".to_vec());
                tx.set_ref_count(&b, 1);
                Ok(())
            })
            .unwrap();

        let mut tx = store.begin();
        assert_eq!(tx.zero_ref_count_blob_ids(), vec![a.clone()]);

        // overlay: b drops to zero, a gets referenced
        tx.set_ref_count(&a, 1);
        tx.set_ref_count(&b, 0);
        assert_eq!(tx.zero_ref_count_blob_ids(), vec![b.clone()]);
    }

    #[test]
    fn test_events_published_once_after_commit() {
        let store = Store::new();
        let seen = Arc::new(AtomicUsize::new(0));
        let seen_clone = Arc::clone(&seen);
        let _sub = store.subscribe(move |event| {
            if matches!(event, ChangeEvent::Repository(_)) {
                seen_clone.fetch_add(1, Ordering::SeqCst);
            }
        });

        let mut tx = store.begin();
        tx.put_repository(Repository::new(repo_id()));
        // touched twice, deduplicated to one event
        tx.put_repository(Repository::new(repo_id()));
        assert_eq!(seen.load(Ordering::SeqCst), 0);

        tx.commit().unwrap();
        assert_eq!(seen.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_no_events_on_abort() {
        let store = Store::new();
        let seen = Arc::new(AtomicUsize::new(0));
        let seen_clone = Arc::clone(&seen);
        let _sub = store.subscribe(move |_| {
            seen_clone.fetch_add(1, Ordering::SeqCst);
        });

        let mut tx = store.begin();
        tx.put_repository(Repository::new(repo_id()));
        drop(tx);

        assert_eq!(seen.load(Ordering::SeqCst), 0);
    }
}
