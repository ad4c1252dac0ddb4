//! Immutable content-addressed blocks
//!
//! A file is the transitive closure of blocks reachable from its root
//! address. Each block carries the addresses of its children (already
//! decoded by the content-addressing layer) and an opaque payload.
//!
//! ## Canonical encoding
//!
//! ```text
//! u32 BE link count | link_0 (32 bytes) | ... | link_n | payload
//! ```
//!
//! The block's [`Cid`] is the SHA-256 of this encoding, so links are covered
//! by the address and a block can never reference itself.

use serde::{Deserialize, Serialize};

use super::errors::DomainError;
use super::newtypes::{Cid, CID_LEN};

/// An immutable chunk of file data addressed by its content hash
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    cid: Cid,
    links: Vec<Cid>,
    data: Vec<u8>,
}

impl Block {
    /// Builds a block and derives its address
    #[must_use]
    pub fn new(links: Vec<Cid>, data: Vec<u8>) -> Self {
        let cid = Self::compute_cid(&links, &data);
        Self { cid, links, data }
    }

    /// A block without children
    #[must_use]
    pub fn leaf(data: Vec<u8>) -> Self {
        Self::new(Vec::new(), data)
    }

    /// Rebuilds a block read from storage or the wire, checking its address
    ///
    /// # Errors
    /// Returns `DomainError::IntegrityMismatch` if `cid` does not match the content
    pub fn from_parts(cid: Cid, links: Vec<Cid>, data: Vec<u8>) -> Result<Self, DomainError> {
        let block = Self { cid, links, data };
        block.verify()?;
        Ok(block)
    }

    /// Recomputes the address and compares it with the stored one
    ///
    /// # Errors
    /// Returns `DomainError::IntegrityMismatch` on mismatch
    pub fn verify(&self) -> Result<(), DomainError> {
        if Self::compute_cid(&self.links, &self.data) != self.cid {
            return Err(DomainError::IntegrityMismatch(self.cid.to_string()));
        }
        Ok(())
    }

    pub fn cid(&self) -> &Cid {
        &self.cid
    }

    pub fn links(&self) -> &[Cid] {
        &self.links
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Payload plus link bytes, used for batch sizing
    pub fn encoded_len(&self) -> usize {
        4 + self.links.len() * CID_LEN + self.data.len()
    }

    fn compute_cid(links: &[Cid], data: &[u8]) -> Cid {
        let mut buf = Vec::with_capacity(4 + links.len() * CID_LEN + data.len());
        buf.extend_from_slice(&(links.len() as u32).to_be_bytes());
        for link in links {
            buf.extend_from_slice(link.as_bytes());
        }
        buf.extend_from_slice(data);
        Cid::digest(&buf)
    }
}
