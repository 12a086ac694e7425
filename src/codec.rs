use std::io::{Result, Write};

use tokio::io::{AsyncRead, AsyncWrite};

/// Synchronous encoding into any byte sink (used for bencode values).
pub trait Encoder {
    fn encode(&self, out: &mut impl Write) -> Result<()>;

    fn to_bytes(&self) -> Vec<u8> {
        let mut buffer = Vec::new();
        self.encode(&mut buffer)
            .expect("writing to a vec never fails");
        buffer
    }
}

/// Wire messages written directly to a peer connection.
pub trait AsyncEncoder {
    async fn encode<S: AsyncWrite + Unpin>(&self, stream: &mut S) -> Result<()>;
}

/// Wire messages read directly from a peer connection. Implementations must read exactly the
/// bytes that belong to the message, accumulating short reads.
pub trait AsyncDecoder: Sized {
    async fn decode<S: AsyncRead + Unpin>(stream: &mut S) -> Result<Self>;
}

pub trait TransportMessage {
    /// Total bytes on the wire, including length prefixes and message IDs.
    fn transport_bytes(&self) -> usize;
}
