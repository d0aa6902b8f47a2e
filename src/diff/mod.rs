//! The commit-diff engine.
//!
//! Given a freshly fetched remote tree and the prior `base` index, classify
//! every path as unchanged/added/deleted/modified, then reclassify
//! added/deleted pairs as renames (exact, then similarity-based). The
//! result is a new `remote`-role index whose file nodes carry
//! `path_in_base`/`blob_id_in_base` reflecting the classification.

pub mod rename;

use std::collections::BTreeMap;

use crate::error::{SyncError, SyncResult};
use crate::index::{paths, File, FileIndex, FileInit};
use crate::remote::{RemoteCommit, RemoteHost, RemoteTreeEntry, EMPTY_TREE_SHA};
use crate::storage::memory::Transaction;
use crate::storage::{blobs, IndexId};

/// Fetch the flattened tree of a commit.
///
/// The canonical empty tree is returned as zero entries without a host
/// call: some hosts 404 on requests for that object.
pub fn fetch_commit_tree(
    host: &dyn RemoteHost,
    commit: &RemoteCommit,
) -> SyncResult<Vec<RemoteTreeEntry>> {
    if commit.tree_sha.as_str() == EMPTY_TREE_SHA {
        return Ok(Vec::new());
    }
    host.fetch_tree(&commit.tree_sha)
        .map_err(|e| SyncError::remote("fetch tree", e))
}

/// Diff a fetched remote tree against the `base` index, producing the new
/// `remote`-role index.
///
/// Blob contents for managed files are fetched and stored so later stages
/// (similarity detection, content merge) can read them; ref-counts are
/// acquired when the returned index is added to storage.
pub fn build_remote_index(
    tx: &mut Transaction<'_>,
    host: &dyn RemoteHost,
    base: &FileIndex,
    commit: &RemoteCommit,
    entries: &[RemoteTreeEntry],
) -> SyncResult<FileIndex> {
    let base_files: BTreeMap<&str, &File> = base
        .files()
        .filter(|file| !file.ignored)
        .map(|file| (file.path.as_str(), file))
        .collect();

    let mut files: Vec<File> = Vec::new();
    let mut added: Vec<RemoteTreeEntry> = Vec::new();
    let mut seen: Vec<&str> = Vec::new();

    for entry in entries {
        if !paths::is_markdown(&entry.path) {
            files.push(ignored_file(entry));
            continue;
        }

        // managed content must be locally available from here on
        if !blobs::exists(tx, &entry.sha) {
            let content = host
                .fetch_blob(&entry.sha)
                .map_err(|e| SyncError::remote("fetch blob", e))?;
            blobs::put(tx, &entry.sha, &content);
        }

        match base_files.get(entry.path.as_str()) {
            Some(base_file) if base_file.blob_hash == entry.sha => {
                files.push(File::tracked(entry.path.clone(), entry.sha.clone()));
            }
            Some(base_file) => {
                files.push(File::new(FileInit {
                    path: entry.path.clone(),
                    path_in_base: Some(entry.path.clone()),
                    blob_id: entry.sha.clone(),
                    blob_hash: entry.sha.clone(),
                    blob_id_in_base: Some(base_file.blob_hash.clone()),
                    ignored: false,
                    deleted: false,
                    conflicting: false,
                    conflict_reason: None,
                }));
            }
            None => added.push(entry.clone()),
        }
        seen.push(entry.path.as_str());
    }

    let deleted: Vec<File> = base_files
        .values()
        .filter(|file| !seen.contains(&file.path.as_str()))
        .map(|file| (*file).clone())
        .collect();

    let outcome = rename::detect(tx, deleted, added)?;

    for matched in &outcome.matches {
        files.push(File::new(FileInit {
            path: matched.to.path.clone(),
            path_in_base: Some(matched.from.path.clone()),
            blob_id: matched.to.sha.clone(),
            blob_hash: matched.to.sha.clone(),
            blob_id_in_base: Some(matched.from.blob_hash.clone()),
            ignored: false,
            deleted: false,
            conflicting: false,
            conflict_reason: None,
        }));
    }
    for file in &outcome.deleted {
        files.push(file.with_deleted());
    }
    for entry in &outcome.added {
        files.push(File::new(FileInit {
            path: entry.path.clone(),
            path_in_base: None,
            blob_id: entry.sha.clone(),
            blob_hash: entry.sha.clone(),
            blob_id_in_base: None,
            ignored: false,
            deleted: false,
            conflicting: false,
            conflict_reason: None,
        }));
    }

    // path order for determinism, not correctness
    files.sort_by(|a, b| a.path.cmp(&b.path));

    let mut index = FileIndex::new(base.repository_id.clone(), IndexId::Remote).with_commit(
        commit.sha.clone(),
        commit.timestamp,
        commit.tree_sha.clone(),
    );
    for file in files {
        index.put_file(file);
    }
    Ok(index)
}

fn ignored_file(entry: &RemoteTreeEntry) -> File {
    File::new(FileInit {
        path: entry.path.clone(),
        path_in_base: Some(entry.path.clone()),
        blob_id: entry.sha.clone(),
        blob_hash: entry.sha.clone(),
        blob_id_in_base: Some(entry.sha.clone()),
        ignored: true,
        deleted: false,
        conflicting: false,
        conflict_reason: None,
    })
}
