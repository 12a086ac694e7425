use size::Size;

use crate::message::Block;

/// Splits one piece into consecutive blocks of `block_size`, the last one holding the remainder.
pub struct Blocks {
    piece: usize,
    block_size: usize,
    offset: usize,
    end: usize,
}

impl Blocks {
    pub fn new(piece: usize, piece_size: usize, block_size: Size) -> Self {
        Self {
            piece,
            block_size: (block_size.bytes() as usize).max(1),
            offset: 0,
            end: piece_size,
        }
    }
}

impl Iterator for Blocks {
    type Item = Block;

    fn next(&mut self) -> Option<Self::Item> {
        if self.offset < self.end {
            let block_size = self.block_size.min(self.end - self.offset);
            let block = Block::new(self.piece, self.offset, block_size);
            self.offset += block_size;
            Some(block)
        } else {
            None
        }
    }
}
