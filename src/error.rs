//! Error taxonomy shared by the codec, descriptor, tracker and peer session layers.
//!
//! Every variant names the stage that failed and the identifiers involved (peer address, piece
//! index, byte position). Raw buffer contents are never included.

use std::net::SocketAddr;
use std::time::Duration;

use thiserror::Error;

use crate::crypto::Sha1;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("decode: malformed bencode at byte {position}: {reason}")]
    MalformedEncoding { position: usize, reason: String },

    #[error("torrent: {0}")]
    InvalidTorrent(String),

    #[error("handshake with {peer} failed: {reason}")]
    Handshake { peer: SocketAddr, reason: String },

    #[error("handshake with {peer}: peer serves info hash {actual}, expected {expected}")]
    ProtocolMismatch {
        peer: SocketAddr,
        expected: Sha1,
        actual: Sha1,
    },

    #[error("connection to {peer} lost: {reason}")]
    ConnectionLost { peer: SocketAddr, reason: String },

    #[error("download: {peer} did not unchoke within {timeout:?}")]
    ChokeTimeout { peer: SocketAddr, timeout: Duration },

    #[error("download: {peer} choked us while downloading piece {piece}")]
    Choked { peer: SocketAddr, piece: usize },

    #[error("download: {peer} did not deliver piece {piece} offset {offset} within {timeout:?}")]
    BlockTimeout {
        peer: SocketAddr,
        piece: usize,
        offset: usize,
        timeout: Duration,
    },

    #[error("download: piece {piece} from {peer} failed hash verification")]
    PieceHashMismatch { peer: SocketAddr, piece: usize },

    #[error("download: piece {piece} out of range, torrent has {total} pieces")]
    PieceOutOfRange { piece: usize, total: usize },

    #[error("tracker: {0}")]
    Tracker(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    pub fn malformed(position: usize, reason: impl Into<String>) -> Self {
        Self::MalformedEncoding {
            position,
            reason: reason.into(),
        }
    }

    pub fn connection_lost(peer: SocketAddr, reason: impl ToString) -> Self {
        Self::ConnectionLost {
            peer,
            reason: reason.to_string(),
        }
    }

    /// Network and flow-control failures may succeed against the same or another peer.
    /// Decode and descriptor failures are deterministic and never retried.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Handshake { .. }
                | Self::ConnectionLost { .. }
                | Self::ChokeTimeout { .. }
                | Self::Choked { .. }
                | Self::BlockTimeout { .. }
                | Self::PieceHashMismatch { .. }
                | Self::Tracker(_)
                | Self::Io(_)
        )
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        Self::Tracker(err.to_string())
    }
}
