use tokio_util::bytes::{Buf, BufMut, BytesMut};

/// A byte range within a piece, as carried by `request` and `cancel` messages.
#[derive(Debug, PartialEq, Clone, Copy, Eq, Hash)]
pub struct Block {
    pub piece: usize,
    pub offset: usize,
    pub length: usize,
}

impl Block {
    pub fn new(piece: usize, offset: usize, length: usize) -> Self {
        Self {
            piece,
            offset,
            length,
        }
    }

    pub(super) fn encode(&self, dst: &mut BytesMut) {
        dst.put_u32(self.piece as u32);
        dst.put_u32(self.offset as u32);
        dst.put_u32(self.length as u32);
    }

    pub(super) fn decode(src: &mut BytesMut) -> Self {
        let piece = src.get_u32() as usize;
        let offset = src.get_u32() as usize;
        let length = src.get_u32() as usize;
        Self::new(piece, offset, length)
    }
}

/// Payload of a `piece` message.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct BlockData {
    pub piece: usize,
    pub offset: usize,
    pub data: Vec<u8>,
}

impl BlockData {
    pub fn new(piece: usize, offset: usize, data: Vec<u8>) -> Self {
        Self {
            piece,
            offset,
            data,
        }
    }
}

impl From<&BlockData> for Block {
    fn from(value: &BlockData) -> Self {
        Self::new(value.piece, value.offset, value.data.len())
    }
}
