//! Aggregated per-tree change statistics.
//!
//! Every tree node carries a `FileStats` rolled up over all descendant file
//! nodes (not just direct children). Mutations propagate a signed delta up
//! the ancestor chain instead of recounting, which keeps per-file index
//! mutation O(depth).

use std::ops::{Add, AddAssign, Neg, Sub};

use serde::{Deserialize, Serialize};

/// Counts of descendant file nodes by change flag.
///
/// Fields are signed so the same type can represent a delta between two
/// states; persisted values are always non-negative.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileStats {
    pub all: i64,
    pub deleted: i64,
    pub added: i64,
    pub renamed: i64,
    pub modified: i64,
    pub conflicting: i64,
}

impl FileStats {
    pub fn is_zero(&self) -> bool {
        *self == Self::default()
    }

    /// Whether any pending change is recorded.
    pub fn has_changes(&self) -> bool {
        self.deleted > 0 || self.added > 0 || self.renamed > 0 || self.modified > 0
    }
}

impl Add for FileStats {
    type Output = FileStats;

    fn add(self, rhs: FileStats) -> FileStats {
        FileStats {
            all: self.all + rhs.all,
            deleted: self.deleted + rhs.deleted,
            added: self.added + rhs.added,
            renamed: self.renamed + rhs.renamed,
            modified: self.modified + rhs.modified,
            conflicting: self.conflicting + rhs.conflicting,
        }
    }
}

impl AddAssign for FileStats {
    fn add_assign(&mut self, rhs: FileStats) {
        *self = *self + rhs;
    }
}

impl Sub for FileStats {
    type Output = FileStats;

    fn sub(self, rhs: FileStats) -> FileStats {
        self + (-rhs)
    }
}

impl Neg for FileStats {
    type Output = FileStats;

    fn neg(self) -> FileStats {
        FileStats {
            all: -self.all,
            deleted: -self.deleted,
            added: -self.added,
            renamed: -self.renamed,
            modified: -self.modified,
            conflicting: -self.conflicting,
        }
    }
}
