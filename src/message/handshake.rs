use std::io::{Error, ErrorKind, Result};

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::codec::{AsyncDecoder, AsyncEncoder, TransportMessage};
use crate::core::PeerId;
use crate::crypto::Sha1;

const PROTOCOL: &[u8; 19] = b"BitTorrent protocol";

pub const HANDSHAKE_LENGTH: usize = 1 + PROTOCOL.len() + 8 + 20 + 20;

/// The handshake is a required message and must be the first message transmitted by the client. It
/// is (49+len(pstr)) bytes long.
///
/// _handshake: <pstrlen><pstr><reserved><info\_hash><peer\_id>_
///
/// * **pstrlen**: string length of <pstr>, as a single raw byte
/// * **pstr**: string identifier of the protocol
/// * **reserved**: eight (8) reserved bytes. Sent as zeroes, ignored on receipt.
/// * **info\_hash**: 20-byte SHA1 hash of the info key in the metainfo file.
/// * **peer\_id**: 20-byte string used as a unique ID for the client.
///
/// Only version 1.0 of the protocol is spoken, where pstrlen = 19 and pstr = "BitTorrent
/// protocol", so the message is always exactly 68 bytes.
#[derive(Debug, PartialEq, Clone)]
pub struct Handshake {
    pub info_hash: Sha1,
    pub peer_id: PeerId,
}

impl Handshake {
    pub fn new(info_hash: Sha1, peer_id: PeerId) -> Self {
        Self { info_hash, peer_id }
    }

    pub fn to_bytes(&self) -> [u8; HANDSHAKE_LENGTH] {
        let mut buf = [0; HANDSHAKE_LENGTH];
        buf[0] = PROTOCOL.len() as u8;
        buf[1..20].copy_from_slice(PROTOCOL);
        // buf[20..28] stays zeroed (reserved)
        buf[28..48].copy_from_slice(&self.info_hash.0);
        buf[48..68].copy_from_slice(&self.peer_id.0);
        buf
    }

    pub fn from_bytes(buf: &[u8; HANDSHAKE_LENGTH]) -> Result<Self> {
        if buf[0] as usize != PROTOCOL.len() || &buf[1..20] != PROTOCOL {
            return Err(Error::new(
                ErrorKind::InvalidData,
                "unsupported protocol identifier",
            ));
        }
        let mut info_hash = [0; 20];
        info_hash.copy_from_slice(&buf[28..48]);
        let mut peer_id = [0; 20];
        peer_id.copy_from_slice(&buf[48..68]);
        Ok(Self::new(Sha1(info_hash), PeerId(peer_id)))
    }
}

impl AsyncDecoder for Handshake {
    async fn decode<S: AsyncRead + Unpin>(stream: &mut S) -> Result<Self> {
        let mut buf = [0; HANDSHAKE_LENGTH];
        stream.read_exact(&mut buf).await?;
        Self::from_bytes(&buf)
    }
}

impl AsyncEncoder for Handshake {
    async fn encode<S: AsyncWrite + Unpin>(&self, stream: &mut S) -> Result<()> {
        stream.write_all(&self.to_bytes()).await?;
        stream.flush().await
    }
}

impl TransportMessage for Handshake {
    fn transport_bytes(&self) -> usize {
        HANDSHAKE_LENGTH
    }
}
