//! Domain newtypes with validation
//!
//! This module provides strongly-typed wrappers for the identifiers the sync
//! engine passes around. Each newtype ensures data validity at construction time.

use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::errors::DomainError;

/// Returns true when `id` is usable as a path segment and storage key
fn is_valid_segment(id: &str) -> bool {
    !id.is_empty()
        && id.len() <= 512
        && !id
            .chars()
            .any(|c| c == '/' || c == '\\' || c.is_whitespace() || c.is_control())
}

// ============================================================================
// SpaceId
// ============================================================================

/// Namespace ("space") identifier
///
/// A space isolates one workspace's sync domain from another's. Every task
/// and every remote call is scoped to exactly one space.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SpaceId(String);

impl SpaceId {
    /// Create a new SpaceId
    ///
    /// # Errors
    /// Returns error if the ID is empty or contains separators or whitespace
    pub fn new(id: impl Into<String>) -> Result<Self, DomainError> {
        let id = id.into();
        if !is_valid_segment(&id) {
            return Err(DomainError::InvalidSpaceId(id));
        }
        Ok(Self(id))
    }

    /// Get the inner string reference
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for SpaceId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for SpaceId {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for SpaceId {
    type Error = DomainError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::new(s)
    }
}

impl From<SpaceId> for String {
    fn from(id: SpaceId) -> Self {
        id.0
    }
}

// ============================================================================
// FileId
// ============================================================================

/// File identifier
///
/// For uploads the file ID is the textual form of the file's root content
/// address (see [`FileId::root_cid`]). Deletes accept any well-formed ID, since
/// the remote side may hold files this node never had locally.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct FileId(String);

impl FileId {
    /// Create a new FileId
    ///
    /// # Errors
    /// Returns error if the ID is empty or contains separators or whitespace
    pub fn new(id: impl Into<String>) -> Result<Self, DomainError> {
        let id = id.into();
        if !is_valid_segment(&id) {
            return Err(DomainError::InvalidFileId(id));
        }
        Ok(Self(id))
    }

    /// Get the inner string reference
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Interprets this ID as the root address of the file's block graph
    ///
    /// # Errors
    /// Returns `DomainError::InvalidCid` when the ID is not a content address
    pub fn root_cid(&self) -> Result<Cid, DomainError> {
        self.0.parse()
    }
}

impl Display for FileId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for FileId {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for FileId {
    type Error = DomainError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::new(s)
    }
}

impl From<FileId> for String {
    fn from(id: FileId) -> Self {
        id.0
    }
}

impl From<Cid> for FileId {
    fn from(cid: Cid) -> Self {
        Self(cid.to_string())
    }
}

// ============================================================================
// Cid
// ============================================================================

/// Length in bytes of a content address digest (SHA-256)
pub const CID_LEN: usize = 32;

/// Content address of an immutable block
///
/// The SHA-256 digest of the block's canonical encoding. Identical content
/// always yields the identical address. Textual form is 64 lowercase hex chars.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Cid([u8; CID_LEN]);

impl Cid {
    /// Computes the address of an arbitrary byte sequence
    #[must_use]
    pub fn digest(bytes: &[u8]) -> Self {
        let hash = Sha256::digest(bytes);
        let mut out = [0u8; CID_LEN];
        out.copy_from_slice(&hash);
        Self(out)
    }

    /// Wraps raw digest bytes
    #[must_use]
    pub const fn from_bytes(bytes: [u8; CID_LEN]) -> Self {
        Self(bytes)
    }

    /// Raw digest bytes
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; CID_LEN] {
        &self.0
    }
}

impl Display for Cid {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        for byte in &self.0 {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

impl fmt::Debug for Cid {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "Cid({self})")
    }
}

impl FromStr for Cid {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.len() != CID_LEN * 2 {
            return Err(DomainError::InvalidCid(format!(
                "expected {} hex chars, got {}",
                CID_LEN * 2,
                s.len()
            )));
        }

        let mut out = [0u8; CID_LEN];
        for (i, chunk) in s.as_bytes().chunks(2).enumerate() {
            let pair = std::str::from_utf8(chunk)
                .map_err(|_| DomainError::InvalidCid(s.to_string()))?;
            if pair.chars().any(|c| c.is_ascii_uppercase()) {
                return Err(DomainError::InvalidCid(format!("not lowercase hex: {s}")));
            }
            out[i] = u8::from_str_radix(pair, 16)
                .map_err(|_| DomainError::InvalidCid(format!("not hex: {s}")))?;
        }
        Ok(Self(out))
    }
}

impl TryFrom<String> for Cid {
    type Error = DomainError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<Cid> for String {
    fn from(cid: Cid) -> Self {
        cid.to_string()
    }
}
