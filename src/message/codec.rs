use std::io::{Error, ErrorKind, Result};

use bit_set::BitSet;
use tokio_util::bytes::{Buf, BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::codec::TransportMessage;
use crate::message::{Block, BlockData, Message};

const ID_CHOKE: u8 = 0;
const ID_UNCHOKE: u8 = 1;
const ID_INTERESTED: u8 = 2;
const ID_NOT_INTERESTED: u8 = 3;
const ID_HAVE: u8 = 4;
const ID_BITFIELD: u8 = 5;
const ID_REQUEST: u8 = 6;
const ID_PIECE: u8 = 7;
const ID_CANCEL: u8 = 8;
const LENGTH_SIZE: usize = 4;

/// Length-prefixed framing for [`Message`]. Partial frames stay buffered until complete.
pub struct MessageCodec {
    max_length: usize,
}

impl MessageCodec {
    /// `max_length` bounds the length prefix (ID byte plus payload) of incoming messages.
    pub fn new(max_length: usize) -> Self {
        Self { max_length }
    }
}

impl Encoder<Message> for MessageCodec {
    type Error = Error;

    fn encode(&mut self, item: Message, dst: &mut BytesMut) -> Result<()> {
        dst.reserve(item.transport_bytes());
        match item {
            Message::KeepAlive => dst.put_u32(0),
            Message::Choke => put_id(ID_CHOKE, dst),
            Message::Unchoke => put_id(ID_UNCHOKE, dst),
            Message::Interested => put_id(ID_INTERESTED, dst),
            Message::NotInterested => put_id(ID_NOT_INTERESTED, dst),
            Message::Have(piece) => {
                dst.put_u32(5);
                dst.put_u8(ID_HAVE);
                dst.put_u32(piece as u32);
            }
            Message::Bitfield(bitset) => {
                let bytes = bitset.get_ref().to_bytes();
                dst.put_u32(1 + (bytes.len() as u32));
                dst.put_u8(ID_BITFIELD);
                dst.extend_from_slice(&bytes);
            }
            Message::Request(block) => {
                dst.put_u32(13);
                dst.put_u8(ID_REQUEST);
                block.encode(dst);
            }
            Message::Piece(BlockData {
                piece,
                offset,
                data,
            }) => {
                dst.put_u32((9 + data.len()) as u32);
                dst.put_u8(ID_PIECE);
                dst.put_u32(piece as u32);
                dst.put_u32(offset as u32);
                dst.extend_from_slice(&data);
            }
            Message::Cancel(block) => {
                dst.put_u32(13);
                dst.put_u8(ID_CANCEL);
                block.encode(dst);
            }
        }
        Ok(())
    }
}

fn put_id(id: u8, dst: &mut BytesMut) {
    dst.put_u32(1);
    dst.put_u8(id);
}

impl Decoder for MessageCodec {
    type Error = Error;
    type Item = Message;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>> {
        if src.len() < LENGTH_SIZE {
            // Not enough data to read length marker.
            return Ok(None);
        }

        let mut length_bytes = [0; LENGTH_SIZE];
        length_bytes.copy_from_slice(&src[0..LENGTH_SIZE]);
        let length = u32::from_be_bytes(length_bytes) as usize;

        if length == 0 {
            src.advance(LENGTH_SIZE);
            return Ok(Some(Message::KeepAlive));
        }

        if length > self.max_length {
            return Err(Error::new(
                ErrorKind::InvalidData,
                format!(
                    "message length {} exceeds maximum of {}",
                    length, self.max_length
                ),
            ));
        }

        if src.len() < LENGTH_SIZE + length {
            src.reserve(LENGTH_SIZE + length - src.len());
            return Ok(None);
        }

        src.advance(LENGTH_SIZE);
        let id = src.get_u8();
        let message = match (id, length) {
            (ID_CHOKE, 1) => Message::Choke,
            (ID_UNCHOKE, 1) => Message::Unchoke,
            (ID_INTERESTED, 1) => Message::Interested,
            (ID_NOT_INTERESTED, 1) => Message::NotInterested,
            (ID_HAVE, 5) => Message::Have(src.get_u32() as usize),
            (ID_BITFIELD, _) => {
                let bitset = BitSet::from_bytes(&src[0..length - 1]);
                src.advance(length - 1);
                Message::Bitfield(bitset)
            }
            (ID_REQUEST, 13) => Message::Request(Block::decode(src)),
            (ID_PIECE, 9..) => {
                let piece = src.get_u32() as usize;
                let offset = src.get_u32() as usize;
                let data = src.split_to(length - 9).to_vec();
                Message::Piece(BlockData::new(piece, offset, data))
            }
            (ID_CANCEL, 13) => Message::Cancel(Block::decode(src)),
            _ => {
                return Err(Error::new(
                    ErrorKind::InvalidData,
                    format!("invalid message id {} with length {}", id, length),
                ));
            }
        };
        Ok(Some(message))
    }
}

impl TransportMessage for Message {
    fn transport_bytes(&self) -> usize {
        let payload_size = match self {
            Self::KeepAlive => 0,
            Self::Choke | Self::Unchoke | Self::Interested | Self::NotInterested => 1,
            Self::Have(_) => 5,
            Self::Bitfield(bitset) => 1 + bitset.get_ref().to_bytes().len(),
            Self::Request(_) | Self::Cancel(_) => 13,
            Self::Piece(block) => 9 + block.data.len(),
        };
        LENGTH_SIZE + payload_size
    }
}
