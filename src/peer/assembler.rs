use std::collections::BTreeMap;

use sha1::Digest;

use crate::crypto::Sha1;

/// Collects the blocks of a single piece, keyed by offset so arrival order does not matter, and
/// verifies the result once every byte is present.
pub struct PieceAssembler {
    size: usize,
    sha1: Sha1,
    received: usize,
    blocks: BTreeMap<usize, Vec<u8>>,
}

#[derive(Debug, PartialEq, Eq)]
pub enum Status {
    Incomplete,
    Invalid,
    Valid(Vec<u8>),
}

impl PieceAssembler {
    pub fn new(size: usize, sha1: Sha1) -> Self {
        Self {
            size,
            sha1,
            received: 0,
            blocks: BTreeMap::new(),
        }
    }

    /// Blocks must not overlap; re-adding an offset replaces the earlier data.
    pub fn add(&mut self, offset: usize, data: Vec<u8>) -> Status {
        self.received += data.len();
        if let Some(previous) = self.blocks.insert(offset, data) {
            self.received -= previous.len();
        }
        if self.received < self.size {
            return Status::Incomplete;
        }

        let mut hasher = sha1::Sha1::new();
        for data in self.blocks.values() {
            hasher.update(data);
        }
        let sha1 = Sha1(hasher.finalize().into());
        let blocks = std::mem::take(&mut self.blocks);
        self.received = 0;
        if self.sha1 == sha1 {
            Status::Valid(blocks.into_values().flatten().collect())
        } else {
            Status::Invalid
        }
    }
}
