//! The three-way merge case table.
//!
//! The merge decision for one base file is a pure function of the remote
//! change kind and the local change kind, matched exhaustively so a new
//! status combination cannot silently fall through. Interpretation of the
//! verdict (content lookup, collision handling, conflict wording) lives in
//! the assembly code; this table only encodes policy.

use crate::index::File;

/// How one side changed a file relative to the shared base.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Unchanged,
    Added,
    Deleted,
    Modified,
    Renamed,
    RenamedModified,
}

impl ChangeKind {
    /// Classify a diffed file node by its change flags.
    pub fn of(file: &File) -> Self {
        if file.deleted {
            ChangeKind::Deleted
        } else if file.added() {
            ChangeKind::Added
        } else {
            match (file.renamed(), file.modified()) {
                (true, true) => ChangeKind::RenamedModified,
                (true, false) => ChangeKind::Renamed,
                (false, true) => ChangeKind::Modified,
                (false, false) => ChangeKind::Unchanged,
            }
        }
    }
}

/// Which side supplies a property of the merged file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Remote,
    Local,
}

/// Conflicts a verdict can carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictKind {
    /// Remote deleted a file the local side changed; the local version is
    /// revived.
    DeletedRemotely,
    /// Local deleted a file the remote side changed; the remote version is
    /// revived.
    DeletedLocally,
}

/// The verdict for one base file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// The file is absent from the rebase result.
    Drop,
    /// Keep one side's content at one side's path.
    Keep {
        content: Side,
        path: Side,
        /// The local deletion is replayed onto the remote snapshot.
        pending_delete: bool,
        conflict: Option<ConflictKind>,
    },
    /// Both sides changed content: three-way line merge, at one side's
    /// path.
    Merge { path: Side },
}

const fn keep(content: Side, path: Side) -> Verdict {
    Verdict::Keep {
        content,
        path,
        pending_delete: false,
        conflict: None,
    }
}

const fn revive(content: Side, path: Side, conflict: ConflictKind) -> Verdict {
    Verdict::Keep {
        content,
        path,
        pending_delete: false,
        conflict: Some(conflict),
    }
}

const fn delete_pending(path: Side) -> Verdict {
    Verdict::Keep {
        content: Side::Remote,
        path,
        pending_delete: true,
        conflict: None,
    }
}

/// The 36-case table: remote change kind x local change kind.
///
/// `Added` rows and columns are nominal: added files carry no base path, so
/// they never meet a counterpart here. They resolve to carrying the adding
/// side verbatim.
pub fn resolve(remote: ChangeKind, local: ChangeKind) -> Verdict {
    use ChangeKind::*;
    use ConflictKind::*;
    use Side::*;

    match (remote, local) {
        // remote left the file alone: replay the local change verbatim
        (Unchanged, Unchanged) => keep(Remote, Remote),
        (Unchanged, Added) => keep(Local, Local),
        (Unchanged, Deleted) => delete_pending(Remote),
        (Unchanged, Modified) => keep(Local, Remote),
        (Unchanged, Renamed) => keep(Remote, Local),
        (Unchanged, RenamedModified) => keep(Local, Local),

        // remote-added files have no local counterpart
        (Added, Unchanged) => keep(Remote, Remote),
        (Added, Added) => keep(Remote, Remote),
        (Added, Deleted) => keep(Remote, Remote),
        (Added, Modified) => keep(Remote, Remote),
        (Added, Renamed) => keep(Remote, Remote),
        (Added, RenamedModified) => keep(Remote, Remote),

        // deletion dominance: a remote delete wins unless local changed
        // content, which revives the local version under conflict
        (Deleted, Unchanged) => Verdict::Drop,
        (Deleted, Added) => keep(Local, Local),
        (Deleted, Deleted) => Verdict::Drop,
        (Deleted, Modified) => revive(Local, Local, DeletedRemotely),
        (Deleted, Renamed) => Verdict::Drop,
        (Deleted, RenamedModified) => revive(Local, Local, DeletedRemotely),

        // symmetric revival: a local delete loses to a remote content
        // change
        (Modified, Unchanged) => keep(Remote, Remote),
        (Modified, Added) => keep(Local, Local),
        (Modified, Deleted) => revive(Remote, Remote, DeletedLocally),
        (Modified, Modified) => Verdict::Merge { path: Remote },
        (Modified, Renamed) => keep(Remote, Local),
        (Modified, RenamedModified) => Verdict::Merge { path: Local },

        // a remote rename moves the baseline; local changes follow it
        (Renamed, Unchanged) => keep(Remote, Remote),
        (Renamed, Added) => keep(Local, Local),
        (Renamed, Deleted) => delete_pending(Remote),
        (Renamed, Modified) => keep(Local, Remote),
        (Renamed, Renamed) => keep(Remote, Local),
        (Renamed, RenamedModified) => keep(Local, Local),

        (RenamedModified, Unchanged) => keep(Remote, Remote),
        (RenamedModified, Added) => keep(Local, Local),
        (RenamedModified, Deleted) => revive(Remote, Remote, DeletedLocally),
        (RenamedModified, Modified) => Verdict::Merge { path: Remote },
        (RenamedModified, Renamed) => keep(Remote, Local),
        (RenamedModified, RenamedModified) => Verdict::Merge { path: Local },
    }
}
