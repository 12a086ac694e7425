mod block;
mod codec;
mod handshake;

use std::fmt::Formatter;

use bit_set::BitSet;

pub use block::*;
pub use codec::*;
pub use handshake::*;

/// Messages exchanged after the handshake. On the wire each takes the form
/// <length prefix><message ID><payload>, where the length prefix is a four byte big-endian value
/// covering the ID and payload.
#[derive(PartialEq, Eq, Clone)]
pub enum Message {
    /// # keep-alive: <len=0000>
    ///
    /// No message ID and no payload. Only keeps the connection open.
    KeepAlive,

    /// # choke: <len=0001><id=0>
    Choke,

    /// # unchoke: <len=0001><id=1>
    Unchoke,

    /// # interested: <len=0001><id=2>
    Interested,

    /// # not interested: <len=0001><id=3>
    NotInterested,

    /// # have: <len=0005><id=4><piece index>
    ///
    /// The zero-based index of a piece the peer has just completed.
    Have(usize),

    /// # bitfield: <len=0001+X><id=5><bitfield>
    ///
    /// The pieces the peer holds. The high bit in the first byte corresponds to piece index 0.
    /// Usually sent once, right after the handshake, but peers without pieces may skip it and
    /// lazy peers may send it late.
    Bitfield(BitSet),

    /// # request: <len=0013><id=6><index><begin><length>
    Request(Block),

    /// # piece: <len=0009+X><id=7><index><begin><block>
    Piece(BlockData),

    /// # cancel: <len=0013><id=8><index><begin><length>
    Cancel(Block),
}

impl std::fmt::Debug for Message {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Message::KeepAlive => write!(f, "KeepAlive"),
            Message::Choke => write!(f, "Choke"),
            Message::Unchoke => write!(f, "Unchoke"),
            Message::Interested => write!(f, "Interested"),
            Message::NotInterested => write!(f, "NotInterested"),
            Message::Have(piece) => write!(f, "Have {{ piece: {} }}", piece),
            Message::Bitfield(bitset) => write!(f, "Bitfield(<{} pieces>)", bitset.len()),
            Message::Request(block) => write!(f, "Request({:?})", block),
            Message::Piece(block) => write!(
                f,
                "Piece {{ piece: {}, offset: {}, data: <{} bytes> }}",
                block.piece,
                block.offset,
                block.data.len()
            ),
            Message::Cancel(block) => write!(f, "Cancel({:?})", block),
        }
    }
}
