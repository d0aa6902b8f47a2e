//! Core identifier types for the storage layer.

use std::fmt;

use git2::{ObjectType, Oid};
use serde::{Deserialize, Serialize};

/// Handle to blob content.
///
/// Two namespaces overlap: the canonical git-style content hash
/// (`sha1("blob <len>\0<content>")`) and locally generated temporary ids
/// used for content that has not been committed yet. A `File` node carries
/// both its `blob_id` and its `blob_hash`, so temporary ids are swapped for
/// final hashes only at commit time.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BlobId(String);

impl BlobId {
    /// Prefix distinguishing temporary local ids from content hashes.
    const LOCAL_PREFIX: &'static str = "local-";

    /// Compute the canonical git blob hash for the given content.
    pub fn from_content(content: &[u8]) -> Result<Self, git2::Error> {
        let oid = Oid::hash_object(ObjectType::Blob, content)?;
        Ok(Self(oid.to_string()))
    }

    /// Wrap a hash received from the remote host.
    pub fn from_hex(hex: impl Into<String>) -> Self {
        Self(hex.into())
    }

    /// Generate a new ULID-based temporary id.
    pub fn temporary() -> Self {
        Self(format!(
            "{}{}",
            Self::LOCAL_PREFIX,
            ulid::Ulid::new().to_string().to_lowercase()
        ))
    }

    /// Check whether this id is a temporary local id rather than a hash.
    pub fn is_temporary(&self) -> bool {
        self.0.starts_with(Self::LOCAL_PREFIX)
    }

    /// Get the string representation.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BlobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of a remote commit object.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CommitSha(String);

impl CommitSha {
    pub fn new(sha: impl Into<String>) -> Self {
        Self(sha.into())
    }

    /// Short form of the commit id.
    pub fn short(&self) -> &str {
        &self.0[..self.0.len().min(7)]
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CommitSha {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of a remote tree object.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TreeSha(String);

impl TreeSha {
    pub fn new(sha: impl Into<String>) -> Self {
        Self(sha.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TreeSha {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of a synced repository.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RepositoryId(String);

impl RepositoryId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RepositoryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The four index roles kept per repository.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum IndexId {
    /// Last known remote commit (the sync baseline).
    Base,
    /// Latest fetched remote commit.
    Remote,
    /// The working copy.
    Local,
    /// Transient reconciliation output.
    Rebase,
}

impl IndexId {
    pub fn as_str(&self) -> &'static str {
        match self {
            IndexId::Base => "base",
            IndexId::Remote => "remote",
            IndexId::Local => "local",
            IndexId::Rebase => "rebase",
        }
    }

    /// Roles that carry remote commit metadata.
    pub fn is_committed(&self) -> bool {
        matches!(self, IndexId::Base | IndexId::Remote)
    }
}

impl fmt::Display for IndexId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A synced repository record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Repository {
    pub id: RepositoryId,
    /// Set when a rebase produced conflicts that need user resolution.
    /// While set, editing targets the `rebase` index instead of `local`.
    pub manual_rebase_in_progress: bool,
}

impl Repository {
    pub fn new(id: RepositoryId) -> Self {
        Self {
            id,
            manual_rebase_in_progress: false,
        }
    }
}
