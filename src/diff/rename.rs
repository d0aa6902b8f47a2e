//! Rename detection over the added/deleted remainder of a commit diff.
//!
//! Exact renames pair a deleted and an added file sharing a content hash.
//! Similarity renames pair the remainder by text similarity above a
//! threshold; the pairwise comparison is bounded by a fixed candidate
//! count, an intentional scale limit rather than an asymptotic fix.

use std::collections::{BTreeMap, VecDeque};

use similar::TextDiff;

use crate::index::File;
use crate::remote::RemoteTreeEntry;
use crate::storage::error::StorageResult;
use crate::storage::memory::Transaction;
use crate::storage::{blobs, BlobId};

/// Similarity detection is skipped when the remaining added + deleted
/// count exceeds this.
pub const MAX_SIMILARITY_CANDIDATES: usize = 1000;

/// Minimum similarity score for an edit-rename pairing.
pub const SIMILARITY_THRESHOLD: f32 = 0.5;

/// A deleted/added pair reclassified as a rename.
#[derive(Debug, Clone)]
pub struct RenameMatch {
    /// The base file that disappeared.
    pub from: File,
    /// The new-tree entry it became.
    pub to: RemoteTreeEntry,
    /// Whether the content changed too (similarity rename).
    pub edited: bool,
}

/// Output of rename detection: matches plus the unmatched remainder.
#[derive(Debug, Default)]
pub struct RenameOutcome {
    pub matches: Vec<RenameMatch>,
    pub deleted: Vec<File>,
    pub added: Vec<RemoteTreeEntry>,
}

/// Pair deleted base files with added entries, exact matches first.
///
/// Inputs must be sorted by path; once matched, a file leaves candidacy on
/// both sides. Deleted file contents are read from blob storage, added
/// entry contents must already be stored (the diff engine prefetches them).
pub fn detect(
    tx: &Transaction<'_>,
    deleted: Vec<File>,
    added: Vec<RemoteTreeEntry>,
) -> StorageResult<RenameOutcome> {
    let mut outcome = RenameOutcome::default();

    // exact: same content hash
    let mut by_hash: BTreeMap<BlobId, VecDeque<File>> = BTreeMap::new();
    for file in deleted {
        by_hash.entry(file.blob_hash.clone()).or_default().push_back(file);
    }

    let mut remaining_added = Vec::new();
    for entry in added {
        match by_hash.get_mut(&entry.sha).and_then(VecDeque::pop_front) {
            Some(from) => outcome.matches.push(RenameMatch {
                from,
                to: entry,
                edited: false,
            }),
            None => remaining_added.push(entry),
        }
    }
    let mut remaining_deleted: Vec<File> = by_hash
        .into_values()
        .flatten()
        .collect();
    remaining_deleted.sort_by(|a, b| a.path.cmp(&b.path));

    // similarity: best scoring pair per deleted file, above threshold
    if remaining_deleted.len() + remaining_added.len() <= MAX_SIMILARITY_CANDIDATES {
        pair_by_similarity(tx, &mut remaining_deleted, &mut remaining_added, &mut outcome)?;
    }

    outcome.deleted = remaining_deleted;
    outcome.added = remaining_added;
    Ok(outcome)
}

fn pair_by_similarity(
    tx: &Transaction<'_>,
    deleted: &mut Vec<File>,
    added: &mut Vec<RemoteTreeEntry>,
    outcome: &mut RenameOutcome,
) -> StorageResult<()> {
    if deleted.is_empty() || added.is_empty() {
        return Ok(());
    }

    let deleted_contents: Vec<String> = deleted
        .iter()
        .map(|file| blobs::require(tx, &file.blob_hash).map(lossy))
        .collect::<StorageResult<_>>()?;
    let added_contents: Vec<String> = added
        .iter()
        .map(|entry| blobs::require(tx, &entry.sha).map(lossy))
        .collect::<StorageResult<_>>()?;

    let mut scored: Vec<(f32, usize, usize)> = Vec::new();
    for (di, old) in deleted_contents.iter().enumerate() {
        for (ai, new) in added_contents.iter().enumerate() {
            let score = TextDiff::from_words(old.as_str(), new.as_str()).ratio();
            if score > SIMILARITY_THRESHOLD {
                scored.push((score, di, ai));
            }
        }
    }
    // best score first; path order breaks ties deterministically
    scored.sort_by(|a, b| {
        b.0.partial_cmp(&a.0)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| deleted[a.1].path.cmp(&deleted[b.1].path))
            .then_with(|| added[a.2].path.cmp(&added[b.2].path))
    });

    let mut deleted_taken = vec![false; deleted.len()];
    let mut added_taken = vec![false; added.len()];
    for (_, di, ai) in scored {
        if deleted_taken[di] || added_taken[ai] {
            continue;
        }
        deleted_taken[di] = true;
        added_taken[ai] = true;
        outcome.matches.push(RenameMatch {
            from: deleted[di].clone(),
            to: added[ai].clone(),
            edited: true,
        });
    }

    let mut keep_deleted = deleted_taken.iter().map(|taken| !taken);
    deleted.retain(|_| keep_deleted.next().unwrap_or(true));
    let mut keep_added = added_taken.iter().map(|taken| !taken);
    added.retain(|_| keep_added.next().unwrap_or(true));

    Ok(())
}

fn lossy(content: Vec<u8>) -> String {
    String::from_utf8_lossy(&content).into_owned()
}
