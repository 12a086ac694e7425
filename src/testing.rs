//! Scripted in-memory peers for exercising sessions and the client without a real swarm.

use std::io;
use std::net::SocketAddr;

use bit_set::BitSet;
use futures::SinkExt;
use log::debug;
use tokio::io::{AsyncRead, AsyncWrite, DuplexStream};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_stream::StreamExt;
use tokio_util::codec::Framed;

use crate::codec::{AsyncDecoder, AsyncEncoder};
use crate::core::PeerId;
use crate::crypto::{Md5, Sha1};
use crate::message::{Block, BlockData, Handshake, Message, MessageCodec};
use crate::torrent::Info;

pub const MOCK_PEER_ID: PeerId = PeerId([7; 20]);

pub fn mock_addr() -> SocketAddr {
    "127.0.0.1:6881".parse().unwrap()
}

pub fn test_data(length: usize) -> Vec<u8> {
    (0..length).map(|i| (i % 251) as u8).collect()
}

pub fn test_info(data: &[u8], piece_length: usize) -> Info {
    Info {
        info_hash: Sha1::digest(b"test torrent"),
        name: "test.bin".to_string(),
        piece_length,
        length: data.len(),
        pieces: data.chunks(piece_length).map(Sha1::digest).collect(),
        md5sum: Some(Md5::digest(data)),
    }
}

/// A seeder holding the whole content of one torrent, with knobs for misbehaving.
#[derive(Clone)]
pub struct MockPeer {
    data: Vec<u8>,
    piece_length: usize,
    info_hash: Sha1,
    send_bitfield: bool,
    unchoke: bool,
    corrupt: bool,
    choke_after: Option<usize>,
    keep_alives: bool,
    reverse: bool,
}

impl MockPeer {
    pub fn new(info: &Info, data: Vec<u8>) -> Self {
        Self {
            data,
            piece_length: info.piece_length,
            info_hash: info.info_hash.clone(),
            send_bitfield: true,
            unchoke: true,
            corrupt: false,
            choke_after: None,
            keep_alives: false,
            reverse: false,
        }
    }

    /// Sends its bitfield and then nothing else.
    pub fn never_unchoke(mut self) -> Self {
        self.unchoke = false;
        self
    }

    pub fn without_bitfield(mut self) -> Self {
        self.send_bitfield = false;
        self
    }

    /// Flips the first byte of every block served.
    pub fn corrupt_data(mut self) -> Self {
        self.corrupt = true;
        self
    }

    /// Serves `blocks` blocks, then chokes and stops answering.
    pub fn choke_after(mut self, blocks: usize) -> Self {
        self.choke_after = Some(blocks);
        self
    }

    /// Precedes every outgoing message with a keep-alive.
    pub fn with_keep_alives(mut self) -> Self {
        self.keep_alives = true;
        self
    }

    /// Holds requests until a whole piece is requested, then answers last-to-first.
    pub fn reverse_responses(mut self) -> Self {
        self.reverse = true;
        self
    }

    pub fn with_info_hash(mut self, info_hash: Sha1) -> Self {
        self.info_hash = info_hash;
        self
    }

    /// Serves a single in-memory connection and returns the client's end.
    pub fn spawn(self) -> (DuplexStream, JoinHandle<io::Result<()>>) {
        let (local, remote) = tokio::io::duplex(64 * 1024);
        let handle = tokio::spawn(self.serve(remote));
        (local, handle)
    }

    /// Accepts TCP connections on an ephemeral local port until the runtime shuts down.
    pub async fn listen(self) -> SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("unable to bind");
        let addr = listener.local_addr().expect("no local address");
        tokio::spawn(async move {
            while let Ok((socket, _)) = listener.accept().await {
                tokio::spawn(self.clone().serve(socket));
            }
        });
        addr
    }

    pub async fn serve<S: AsyncRead + AsyncWrite + Unpin>(self, mut stream: S) -> io::Result<()> {
        Handshake::decode(&mut stream).await?;
        Handshake::new(self.info_hash.clone(), MOCK_PEER_ID)
            .encode(&mut stream)
            .await?;

        let mut framed = Framed::new(stream, MessageCodec::new(1 << 20));
        if self.send_bitfield {
            let pieces: BitSet = (0..self.total_pieces()).collect();
            self.send(&mut framed, Message::Bitfield(pieces)).await?;
        }

        let mut served = 0;
        let mut choked = false;
        let mut held: Vec<Block> = Vec::new();
        while let Some(message) = framed.next().await {
            let message = message?;
            debug!("mock peer < got {:?}", message);
            match message {
                Message::Interested if self.unchoke => {
                    self.send(&mut framed, Message::Unchoke).await?;
                }
                Message::Request(_) if choked => {}
                Message::Request(_) if self.choke_after == Some(served) => {
                    choked = true;
                    self.send(&mut framed, Message::Choke).await?;
                }
                Message::Request(block) if self.reverse => {
                    held.push(block);
                    let requested: usize = held.iter().map(|block| block.length).sum();
                    if requested == self.piece_size(block.piece) {
                        while let Some(block) = held.pop() {
                            self.send(&mut framed, Message::Piece(self.block_data(&block)))
                                .await?;
                            served += 1;
                        }
                    }
                }
                Message::Request(block) => {
                    self.send(&mut framed, Message::Piece(self.block_data(&block)))
                        .await?;
                    served += 1;
                }
                _ => {}
            }
        }
        Ok(())
    }

    async fn send<S: AsyncRead + AsyncWrite + Unpin>(
        &self,
        framed: &mut Framed<S, MessageCodec>,
        message: Message,
    ) -> io::Result<()> {
        if self.keep_alives {
            framed.send(Message::KeepAlive).await?;
        }
        framed.send(message).await
    }

    fn total_pieces(&self) -> usize {
        self.data.len().div_ceil(self.piece_length)
    }

    fn piece_size(&self, piece: usize) -> usize {
        self.piece_length
            .min(self.data.len() - piece * self.piece_length)
    }

    fn block_data(&self, block: &Block) -> BlockData {
        let start = block.piece * self.piece_length + block.offset;
        let mut data = self.data[start..start + block.length].to_vec();
        if self.corrupt {
            data[0] ^= 0xff;
        }
        BlockData::new(block.piece, block.offset, data)
    }
}
