//! The rebase engine.
//!
//! Replays local changes on top of a newly fetched remote snapshot,
//! producing the transient `rebase` index. Both inputs are diffed against
//! the same `base`; local changes are looked up by the path they had in
//! base. The per-file policy lives in [`cases`]; content merging in
//! [`merge`]; this module assembles the result, resolves path collisions,
//! and handles promotion once conflicts are cleared.

pub mod cases;
pub mod merge;

use std::collections::BTreeMap;

use tracing::{debug, info};

use crate::index::{paths, File, FileIndex, FileInit};
use crate::storage::error::{StorageError, StorageResult};
use crate::storage::memory::Transaction;
use crate::storage::types::{BlobId, IndexId, RepositoryId};
use crate::storage::{blobs, indexes, repositories};

use cases::{ChangeKind, ConflictKind, Side, Verdict};
use merge::merge_lines;

/// Conflict reasons, space-joined when one file accrues several.
pub const REASON_DELETED_REMOTELY: &str = "The file was deleted remotely but changed locally.";
pub const REASON_DELETED_LOCALLY: &str = "The file was deleted locally but changed remotely.";
pub const REASON_MERGE_FAILED: &str = "Automatic merging failed.";
pub const REASON_PATH_OCCUPIED: &str =
    "The file was renamed because its path became occupied.";

/// A resolved file waiting for placement.
///
/// Files whose path is dictated by the local side yield to already-placed
/// files on collision and move to an alternate path under conflict.
struct Candidate {
    file: File,
    local_pathed: bool,
}

/// Rebase `local` onto `remote` (both diffed against the same base).
///
/// The produced `rebase` index is persisted; if any file came out
/// conflicting, the repository is flagged for manual rebase. Fails if a
/// rebase index already exists.
pub fn rebase(
    tx: &mut Transaction<'_>,
    remote: &FileIndex,
    local: &FileIndex,
) -> StorageResult<FileIndex> {
    let repository = &remote.repository_id;
    if indexes::get(tx, repository, IndexId::Rebase).is_some() {
        return Err(StorageError::RebaseInProgress(repository.clone()));
    }

    let remote_label = remote
        .commit_sha
        .as_ref()
        .map(|sha| sha.short().to_string())
        .unwrap_or_else(|| "remote".to_string());

    // local changes are indexed by the path they had in base
    let local_by_base: BTreeMap<&str, &File> = local
        .files()
        .filter(|file| !file.ignored)
        .filter_map(|file| file.path_in_base.as_deref().map(|base| (base, file)))
        .collect();

    let mut candidates: Vec<Candidate> = Vec::new();

    for remote_file in remote.files() {
        if remote_file.ignored {
            candidates.push(Candidate {
                file: remote_file.clone(),
                local_pathed: false,
            });
            continue;
        }

        let local_file = remote_file
            .path_in_base
            .as_deref()
            .and_then(|base| local_by_base.get(base).copied());

        let remote_kind = ChangeKind::of(remote_file);
        let local_kind = local_file.map(ChangeKind::of).unwrap_or(ChangeKind::Unchanged);

        match cases::resolve(remote_kind, local_kind) {
            Verdict::Drop => {}
            Verdict::Keep {
                content,
                path,
                pending_delete,
                conflict,
            } => {
                let file = keep_file(
                    remote_file,
                    local_file,
                    content,
                    path,
                    pending_delete,
                    conflict,
                )?;
                candidates.push(Candidate {
                    local_pathed: matches!(path, Side::Local),
                    file,
                });
            }
            Verdict::Merge { path } => {
                let local_file = local_file.ok_or_else(|| {
                    StorageError::Internal(format!(
                        "merge verdict without a local change: {}",
                        remote_file.path
                    ))
                })?;
                let file =
                    merge_file(tx, remote_file, local_file, path, &remote_label)?;
                candidates.push(Candidate {
                    local_pathed: matches!(path, Side::Local),
                    file,
                });
            }
        }
    }

    // locally added files are carried over verbatim, subject only to
    // collision against the final rebased set
    for local_file in local.files() {
        if !local_file.ignored && local_file.added() && !local_file.deleted {
            candidates.push(Candidate {
                file: local_file.clone(),
                local_pathed: true,
            });
        }
    }

    let mut index = FileIndex::new(repository.clone(), IndexId::Rebase);
    for file in place(candidates) {
        index.put_file(file);
    }

    let conflicts = index.root().file_stats.conflicting;
    if conflicts > 0 {
        repositories::set_manual_rebase(tx, repository, true)?;
        debug!(%repository, conflicts, "rebase produced conflicts");
    }
    indexes::add(tx, &index)?;
    Ok(index)
}

/// Build the file for a `Keep` verdict.
fn keep_file(
    remote_file: &File,
    local_file: Option<&File>,
    content: Side,
    path: Side,
    pending_delete: bool,
    conflict: Option<ConflictKind>,
) -> StorageResult<File> {
    let local = |side: &Option<&File>| -> StorageResult<File> {
        side.map(|file| (*file).clone()).ok_or_else(|| {
            StorageError::Internal(format!(
                "local-side verdict without a local change: {}",
                remote_file.path
            ))
        })
    };

    let path = match path {
        Side::Remote => remote_file.path.clone(),
        Side::Local => local(&local_file)?.path,
    };

    let file = match conflict {
        // revival from the local version: remote no longer has the file,
        // so the revived node has no baseline
        Some(ConflictKind::DeletedRemotely) => {
            let source = local(&local_file)?;
            File::new(FileInit {
                path,
                path_in_base: None,
                blob_id: source.blob_id.clone(),
                blob_hash: source.blob_hash.clone(),
                blob_id_in_base: None,
                ignored: false,
                deleted: false,
                conflicting: false,
                conflict_reason: None,
            })
            .with_conflict(REASON_DELETED_REMOTELY)
        }
        // revival from the remote version
        Some(ConflictKind::DeletedLocally) => File::new(FileInit {
            path,
            path_in_base: Some(remote_file.path.clone()),
            blob_id: remote_file.blob_id.clone(),
            blob_hash: remote_file.blob_hash.clone(),
            blob_id_in_base: Some(remote_file.blob_id.clone()),
            ignored: false,
            deleted: false,
            conflicting: false,
            conflict_reason: None,
        })
        .with_conflict(REASON_DELETED_LOCALLY),
        None => {
            let (blob_id, blob_hash) = match content {
                Side::Remote => (remote_file.blob_id.clone(), remote_file.blob_hash.clone()),
                Side::Local => {
                    let source = local(&local_file)?;
                    if source.blob_hash == remote_file.blob_hash {
                        // local content converged with the remote version
                        (remote_file.blob_id.clone(), remote_file.blob_hash.clone())
                    } else {
                        (source.blob_id.clone(), source.blob_hash.clone())
                    }
                }
            };
            File::new(FileInit {
                path,
                path_in_base: Some(remote_file.path.clone()),
                blob_id,
                blob_hash,
                blob_id_in_base: Some(remote_file.blob_id.clone()),
                ignored: false,
                deleted: pending_delete,
                conflicting: false,
                conflict_reason: None,
            })
        }
    };
    Ok(file)
}

/// Build the file for a `Merge` verdict: three-way line merge of local,
/// base, and remote content.
fn merge_file(
    tx: &mut Transaction<'_>,
    remote_file: &File,
    local_file: &File,
    path: Side,
    remote_label: &str,
) -> StorageResult<File> {
    let base_blob = remote_file.blob_id_in_base.as_ref().ok_or_else(|| {
        StorageError::Internal(format!(
            "merge verdict without a base blob: {}",
            remote_file.path
        ))
    })?;
    let base_content = blobs::require(tx, base_blob)?;
    let local_content = blobs::require(tx, &local_file.blob_id)?;
    let remote_content = blobs::require(tx, &remote_file.blob_id)?;

    let merged = merge_lines(
        &String::from_utf8_lossy(&base_content),
        &String::from_utf8_lossy(&local_content),
        &String::from_utf8_lossy(&remote_content),
        remote_label,
    );

    let merged_hash = BlobId::from_content(merged.text().as_bytes())?;
    let blob_id = if merged_hash == remote_file.blob_hash {
        // content reverted to the remote version: no new blob
        remote_file.blob_id.clone()
    } else {
        let id = BlobId::temporary();
        blobs::put(tx, &id, merged.text().as_bytes());
        id
    };

    let path = match path {
        Side::Remote => remote_file.path.clone(),
        Side::Local => local_file.path.clone(),
    };

    let file = File::new(FileInit {
        path,
        path_in_base: Some(remote_file.path.clone()),
        blob_id,
        blob_hash: merged_hash,
        blob_id_in_base: Some(remote_file.blob_id.clone()),
        ignored: false,
        deleted: false,
        conflicting: false,
        conflict_reason: None,
    });

    Ok(if merged.is_conflicted() {
        file.with_conflict(REASON_MERGE_FAILED)
    } else {
        file
    })
}

/// Place candidates, resolving path collisions.
///
/// Remote-dictated paths are unique and win; locally-pathed files that find
/// their path occupied move to `-2`, `-3`, ... and are marked conflicting.
fn place(candidates: Vec<Candidate>) -> Vec<File> {
    let mut placed: BTreeMap<String, File> = BTreeMap::new();

    for candidate in candidates.iter().filter(|c| !c.local_pathed) {
        placed.insert(candidate.file.path.clone(), candidate.file.clone());
    }

    for candidate in candidates.into_iter().filter(|c| c.local_pathed) {
        if !placed.contains_key(&candidate.file.path) {
            placed.insert(candidate.file.path.clone(), candidate.file);
            continue;
        }

        let mut n = 2;
        let alternate = loop {
            let attempt = paths::alternate(&candidate.file.path, n);
            if !placed.contains_key(&attempt) {
                break attempt;
            }
            n += 1;
        };
        let file = candidate
            .file
            .with_path(alternate)
            .with_conflict(REASON_PATH_OCCUPIED);
        placed.insert(file.path.clone(), file);
    }

    placed.into_values().collect()
}

/// Promote a conflict-free rebase: it becomes the new `local`, the old
/// `remote` is normalized in place, and its post-normalization state
/// becomes the new `base`. Replaced indexes release their blob references
/// before the new ones acquire theirs; garbage collection follows.
pub fn continue_rebase(tx: &mut Transaction<'_>, repository: &RepositoryId) -> StorageResult<()> {
    let rebase = indexes::get(tx, repository, IndexId::Rebase)
        .ok_or_else(|| StorageError::NoRebaseInProgress(repository.clone()))?;
    if rebase.has_conflicts() {
        return Err(StorageError::Internal(format!(
            "cannot continue rebase with unresolved conflicts: {}",
            repository
        )));
    }

    let mut new_remote = indexes::require(tx, repository, IndexId::Remote)?;
    new_remote.apply_file_changes();
    let new_base = new_remote.cloned_as(IndexId::Base);
    let new_local = rebase.cloned_as(IndexId::Local);

    indexes::delete(tx, repository, IndexId::Rebase)?;
    indexes::delete(tx, repository, IndexId::Local)?;
    indexes::delete(tx, repository, IndexId::Base)?;
    indexes::delete(tx, repository, IndexId::Remote)?;

    indexes::add(tx, &new_local)?;
    indexes::add(tx, &new_remote)?;
    indexes::add(tx, &new_base)?;

    repositories::set_manual_rebase(tx, repository, false)?;
    blobs::collect_garbage(tx);
    info!(%repository, "rebase promoted to local");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diff;
    use crate::remote::memory::MemoryHost;
    use crate::storage::memory::Store;
    use crate::storage::types::Repository;

    fn sha(content: &[u8]) -> BlobId {
        BlobId::from_content(content).unwrap()
    }

    fn repo() -> RepositoryId {
        RepositoryId::new("notes")
    }

    fn setup() -> (Store, MemoryHost) {
        (Store::new(), MemoryHost::new())
    }

    /// Base index from a listing, blobs stored, repository record created.
    fn base_index(tx: &mut Transaction<'_>, listing: &[(&str, &[u8])]) -> FileIndex {
        repositories::put(tx, Repository::new(repo()));
        let mut index = FileIndex::new(repo(), IndexId::Base);
        for (path, content) in listing {
            let file = File::tracked(*path, sha(content));
            if !file.ignored {
                blobs::put(tx, &file.blob_hash, content);
            }
            index.put_file(file);
        }
        index
    }

    /// Remote index for a new listing, via the real diff engine.
    fn remote_index(
        tx: &mut Transaction<'_>,
        host: &MemoryHost,
        base: &FileIndex,
        listing: &[(&str, &[u8])],
    ) -> FileIndex {
        let commit = host.push_listing(listing, "remote change").unwrap();
        let entries = diff::fetch_commit_tree(host, &commit).unwrap();
        diff::build_remote_index(tx, host, base, &commit, &entries).unwrap()
    }

    fn edit(tx: &mut Transaction<'_>, index: &mut FileIndex, path: &str, content: &[u8]) {
        let id = BlobId::temporary();
        blobs::put(tx, &id, content);
        let file = index.file(path).unwrap().with_content(id, sha(content));
        index.put_file(file);
    }

    fn rename(index: &mut FileIndex, from: &str, to: &str) {
        let file = index.file(from).unwrap().with_path(to);
        index.delete_file(from);
        index.put_file(file);
    }

    fn delete(index: &mut FileIndex, path: &str) {
        let file = index.file(path).unwrap().with_deleted();
        index.put_file(file);
    }

    fn add_local(tx: &mut Transaction<'_>, index: &mut FileIndex, path: &str, content: &[u8]) {
        let id = BlobId::temporary();
        blobs::put(tx, &id, content);
        index.put_file(File::new(FileInit {
            path: path.to_string(),
            path_in_base: None,
            blob_id: id,
            blob_hash: sha(content),
            blob_id_in_base: None,
            ignored: false,
            deleted: false,
            conflicting: false,
            conflict_reason: None,
        }));
    }

    #[test]
    fn test_no_local_changes_yields_remote_content() {
        let (store, host) = setup();
        let mut tx = store.begin();

        let base = base_index(
            &mut tx,
            &[("a.md", b"one\n"), ("b.md", b"two\n"), ("c.md", b"three\n")],
        );
        let local = base.cloned_as(IndexId::Local);
        // remote: modify a, rename b, delete c, add d
        let remote = remote_index(
            &mut tx,
            &host,
            &base,
            &[("a.md", b"one!\n"), ("b2.md", b"two\n"), ("d.md", b"four\n")],
        );

        let result = rebase(&mut tx, &remote, &local).unwrap();

        assert!(!result.has_conflicts());
        assert!(result.changed_files().is_empty());
        let result_paths: Vec<&str> = result.files().map(|f| f.path.as_str()).collect();
        assert_eq!(result_paths, vec!["a.md", "b2.md", "d.md"]);
        assert_eq!(result.file("a.md").unwrap().blob_id, sha(b"one!\n"));
    }

    #[test]
    fn test_local_changes_replay_onto_unchanged_remote() {
        let (store, host) = setup();
        let mut tx = store.begin();

        let listing: &[(&str, &[u8])] =
            &[("a.md", b"one\n"), ("b.md", b"two\n"), ("c.md", b"three\n")];
        let base = base_index(&mut tx, listing);
        let remote = remote_index(&mut tx, &host, &base, listing);

        let mut local = base.cloned_as(IndexId::Local);
        edit(&mut tx, &mut local, "a.md", b"one local\n");
        rename(&mut local, "b.md", "b-moved.md");
        delete(&mut local, "c.md");
        add_local(&mut tx, &mut local, "new.md", b"fresh\n");

        let result = rebase(&mut tx, &remote, &local).unwrap();

        assert!(!result.has_conflicts());
        let a = result.file("a.md").unwrap();
        assert!(a.modified());
        assert_eq!(a.blob_hash, sha(b"one local\n"));

        let moved = result.file("b-moved.md").unwrap();
        assert!(moved.renamed());
        assert_eq!(moved.path_in_base.as_deref(), Some("b.md"));

        assert!(result.file("c.md").unwrap().deleted);
        assert!(result.file("new.md").unwrap().added());
    }

    #[test]
    fn test_remote_delete_with_local_edit_revives_under_conflict() {
        let (store, host) = setup();
        let mut tx = store.begin();

        let base = base_index(&mut tx, &[("a.md", b"1")]);
        let remote = remote_index(&mut tx, &host, &base, &[]);

        let mut local = base.cloned_as(IndexId::Local);
        edit(&mut tx, &mut local, "a.md", b"2");

        let result = rebase(&mut tx, &remote, &local).unwrap();

        assert!(result.has_conflicts());
        let file = result.file("a.md").unwrap();
        assert!(file.conflicting);
        assert!(file
            .conflict_reason
            .as_deref()
            .unwrap()
            .contains("deleted remotely"));
        assert!(file.added());
        assert_eq!(blobs::require(&tx, &file.blob_id).unwrap(), b"2");

        // the repository was flagged for manual rebase
        assert!(repositories::require(&tx, &repo())
            .unwrap()
            .manual_rebase_in_progress);
    }

    #[test]
    fn test_local_delete_with_remote_edit_revives_under_conflict() {
        let (store, host) = setup();
        let mut tx = store.begin();

        let base = base_index(&mut tx, &[("a.md", b"1")]);
        let remote = remote_index(&mut tx, &host, &base, &[("a.md", b"1 remote\n")]);

        let mut local = base.cloned_as(IndexId::Local);
        delete(&mut local, "a.md");

        let result = rebase(&mut tx, &remote, &local).unwrap();

        assert!(result.has_conflicts());
        let file = result.file("a.md").unwrap();
        assert!(file.conflicting);
        assert!(file
            .conflict_reason
            .as_deref()
            .unwrap()
            .contains("deleted locally"));
        assert!(!file.deleted);
        assert_eq!(file.blob_id, sha(b"1 remote\n"));
    }

    #[test]
    fn test_local_delete_replays_when_remote_only_renamed() {
        let (store, host) = setup();
        let mut tx = store.begin();

        let base = base_index(&mut tx, &[("a.md", b"same content\n")]);
        let remote = remote_index(&mut tx, &host, &base, &[("b.md", b"same content\n")]);

        let mut local = base.cloned_as(IndexId::Local);
        delete(&mut local, "a.md");

        let result = rebase(&mut tx, &remote, &local).unwrap();

        assert!(!result.has_conflicts());
        let file = result.file("b.md").unwrap();
        assert!(file.deleted);
    }

    #[test]
    fn test_non_overlapping_content_merge_is_clean() {
        let (store, host) = setup();
        let mut tx = store.begin();

        let base = base_index(&mut tx, &[("a.md", b"line1\nline2\n")]);
        let remote = remote_index(&mut tx, &host, &base, &[("a.md", b"line1\nline2-remote\n")]);

        let mut local = base.cloned_as(IndexId::Local);
        edit(&mut tx, &mut local, "a.md", b"line1-local\nline2\n");

        let result = rebase(&mut tx, &remote, &local).unwrap();

        assert!(!result.has_conflicts());
        let file = result.file("a.md").unwrap();
        assert!(!file.conflicting);
        assert!(file.modified());
        assert_eq!(
            blobs::require(&tx, &file.blob_id).unwrap(),
            b"line1-local\nline2-remote\n"
        );
        assert!(file.blob_id.is_temporary());
        assert_eq!(file.blob_hash, sha(b"line1-local\nline2-remote\n"));
    }

    #[test]
    fn test_overlapping_content_merge_conflicts_with_markers() {
        let (store, host) = setup();
        let mut tx = store.begin();

        let base = base_index(&mut tx, &[("a.md", b"line\n")]);
        let remote = remote_index(&mut tx, &host, &base, &[("a.md", b"line remote\n")]);
        let remote_short = remote.commit_sha.as_ref().unwrap().short().to_string();

        let mut local = base.cloned_as(IndexId::Local);
        edit(&mut tx, &mut local, "a.md", b"line local\n");

        let result = rebase(&mut tx, &remote, &local).unwrap();

        assert!(result.has_conflicts());
        let file = result.file("a.md").unwrap();
        assert_eq!(file.conflict_reason.as_deref(), Some(REASON_MERGE_FAILED));

        let content = blobs::require(&tx, &file.blob_id).unwrap();
        let text = String::from_utf8(content).unwrap();
        assert!(text.contains("<<<<<<< local\nline local\n"));
        assert!(text.contains("||||||| base\nline\n"));
        assert!(text.contains(&format!(">>>>>>> {}\n", remote_short)));
    }

    #[test]
    fn test_identical_edits_converge_to_remote_blob() {
        let (store, host) = setup();
        let mut tx = store.begin();

        let base = base_index(&mut tx, &[("a.md", b"before\n")]);
        let remote = remote_index(&mut tx, &host, &base, &[("a.md", b"after\n")]);

        let mut local = base.cloned_as(IndexId::Local);
        edit(&mut tx, &mut local, "a.md", b"after\n");

        let result = rebase(&mut tx, &remote, &local).unwrap();

        assert!(!result.has_conflicts());
        let file = result.file("a.md").unwrap();
        // content reverted to remote: the remote blob is reused
        assert!(!file.blob_id.is_temporary());
        assert_eq!(file.blob_id, sha(b"after\n"));
        assert!(!file.modified());
    }

    #[test]
    fn test_local_rename_target_occupied_by_remote_add() {
        let (store, host) = setup();
        let mut tx = store.begin();

        let base = base_index(&mut tx, &[("journal.md", b"mine\n")]);
        let remote = remote_index(
            &mut tx,
            &host,
            &base,
            &[("journal.md", b"mine\n"), ("notes.md", b"theirs, unrelated\n")],
        );

        let mut local = base.cloned_as(IndexId::Local);
        rename(&mut local, "journal.md", "notes.md");

        let result = rebase(&mut tx, &remote, &local).unwrap();

        assert!(result.has_conflicts());
        let remote_add = result.file("notes.md").unwrap();
        assert!(!remote_add.conflicting);

        let displaced = result.file("notes-2.md").unwrap();
        assert!(displaced.conflicting);
        assert!(displaced
            .conflict_reason
            .as_deref()
            .unwrap()
            .contains("path became occupied"));
        assert_eq!(displaced.path_in_base.as_deref(), Some("journal.md"));
    }

    #[test]
    fn test_convergent_renames_do_not_conflict() {
        let (store, host) = setup();
        let mut tx = store.begin();

        let base = base_index(&mut tx, &[("a.md", b"stable content\n")]);
        let remote = remote_index(&mut tx, &host, &base, &[("moved.md", b"stable content\n")]);

        let mut local = base.cloned_as(IndexId::Local);
        rename(&mut local, "a.md", "moved.md");

        let result = rebase(&mut tx, &remote, &local).unwrap();

        assert!(!result.has_conflicts());
        let file = result.file("moved.md").unwrap();
        assert!(!file.conflicting);
        assert!(!file.renamed());
        assert_eq!(result.files().count(), 1);
    }

    #[test]
    fn test_local_added_file_collision_is_conflicting() {
        let (store, host) = setup();
        let mut tx = store.begin();

        let base = base_index(&mut tx, &[]);
        let remote = remote_index(&mut tx, &host, &base, &[("idea.md", b"remote idea\n")]);

        let mut local = base.cloned_as(IndexId::Local);
        add_local(&mut tx, &mut local, "idea.md", b"local idea\n");

        let result = rebase(&mut tx, &remote, &local).unwrap();

        assert!(result.has_conflicts());
        assert!(!result.file("idea.md").unwrap().conflicting);
        let displaced = result.file("idea-2.md").unwrap();
        assert!(displaced.conflicting);
        assert!(displaced.added());
    }

    #[test]
    fn test_conflict_reasons_are_additive() {
        let (store, host) = setup();
        let mut tx = store.begin();

        // remote deletes a.md and adds an unrelated taken.md; local renamed
        // and edited a.md to exactly that path. The revival conflicts, and
        // so does the collision: both reasons land on the same file.
        let base = base_index(&mut tx, &[("a.md", b"alpha beta gamma\n")]);
        let remote = remote_index(
            &mut tx,
            &host,
            &base,
            &[("taken.md", b"unrelated words entirely\n")],
        );

        let mut local = base.cloned_as(IndexId::Local);
        edit(&mut tx, &mut local, "a.md", b"alpha beta gamma delta\n");
        rename(&mut local, "a.md", "taken.md");

        let result = rebase(&mut tx, &remote, &local).unwrap();
        let displaced = result.file("taken-2.md").unwrap();
        assert!(displaced.conflicting);
        let reason = displaced.conflict_reason.as_deref().unwrap();
        assert_eq!(
            reason,
            format!("{} {}", REASON_DELETED_REMOTELY, REASON_PATH_OCCUPIED)
        );
    }

    #[test]
    fn test_second_rebase_requires_no_pending_one() {
        let (store, host) = setup();
        let mut tx = store.begin();

        let base = base_index(&mut tx, &[("a.md", b"x\n")]);
        let remote = remote_index(&mut tx, &host, &base, &[("a.md", b"x\n")]);
        let local = base.cloned_as(IndexId::Local);

        rebase(&mut tx, &remote, &local).unwrap();
        let err = rebase(&mut tx, &remote, &local).unwrap_err();
        assert!(matches!(err, StorageError::RebaseInProgress(_)));
    }

    #[test]
    fn test_continue_rebase_promotes_indexes() {
        let (store, host) = setup();
        let mut tx = store.begin();

        let base = base_index(&mut tx, &[("a.md", b"one\n")]);
        indexes::add(&mut tx, &base).unwrap();
        let mut local = base.cloned_as(IndexId::Local);
        edit(&mut tx, &mut local, "a.md", b"one local\n");
        indexes::add(&mut tx, &local).unwrap();

        let remote = remote_index(&mut tx, &host, &base, &[("a.md", b"one\n"), ("b.md", b"two\n")]);
        indexes::add(&mut tx, &remote).unwrap();

        let result = rebase(&mut tx, &remote, &local).unwrap();
        assert!(!result.has_conflicts());

        continue_rebase(&mut tx, &repo()).unwrap();

        assert!(indexes::get(&tx, &repo(), IndexId::Rebase).is_none());
        let new_local = indexes::require(&tx, &repo(), IndexId::Local).unwrap();
        assert!(new_local.file("a.md").unwrap().modified());
        assert!(new_local.file("b.md").is_some());

        let new_base = indexes::require(&tx, &repo(), IndexId::Base).unwrap();
        assert_eq!(new_base.commit_sha, remote.commit_sha);
        assert!(!new_base.file("b.md").unwrap().has_changes());

        let new_remote = indexes::require(&tx, &repo(), IndexId::Remote).unwrap();
        assert!(new_remote.changed_files().is_empty());
    }

    #[test]
    fn test_continue_rebase_refuses_conflicts() {
        let (store, host) = setup();
        let mut tx = store.begin();

        let base = base_index(&mut tx, &[("a.md", b"line\n")]);
        let remote = remote_index(&mut tx, &host, &base, &[("a.md", b"line remote\n")]);
        let mut local = base.cloned_as(IndexId::Local);
        edit(&mut tx, &mut local, "a.md", b"line local\n");

        let result = rebase(&mut tx, &remote, &local).unwrap();
        assert!(result.has_conflicts());

        let err = continue_rebase(&mut tx, &repo()).unwrap_err();
        assert!(matches!(err, StorageError::Internal(_)));
    }
}
