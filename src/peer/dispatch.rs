use std::net::SocketAddr;

use bit_set::BitSet;
use log::{debug, info, warn};
use tokio::io::AsyncRead;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, watch};
use tokio_stream::StreamExt;
use tokio_util::codec::FramedRead;
use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result};
use crate::message::{Block, BlockData, Message, MessageCodec};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChokeState {
    Choked,
    Unchoked,
}

/// Choke state as published by the dispatch loop. `chokes` counts every choke message received,
/// so a choke is observable even if an unchoke follows before the downloader looks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) struct ChokeSignal {
    pub state: ChokeState,
    pub chokes: u64,
}

impl Default for ChokeSignal {
    fn default() -> Self {
        Self {
            state: ChokeState::Choked,
            chokes: 0,
        }
    }
}

/// Owns the read half of a peer connection and routes every incoming message to the session
/// through hand-off channels. It never waits on the downloader: blocks that do not fit in the
/// bounded block queue are dropped.
pub(super) struct Dispatcher<R> {
    addr: SocketAddr,
    messages: FramedRead<R, MessageCodec>,
    total_pieces: usize,
    choke_tx: watch::Sender<ChokeSignal>,
    pieces_tx: watch::Sender<BitSet>,
    blocks_tx: mpsc::Sender<BlockData>,
}

impl<R: AsyncRead + Unpin> Dispatcher<R> {
    pub fn new(
        addr: SocketAddr,
        messages: FramedRead<R, MessageCodec>,
        total_pieces: usize,
        choke_tx: watch::Sender<ChokeSignal>,
        pieces_tx: watch::Sender<BitSet>,
        blocks_tx: mpsc::Sender<BlockData>,
    ) -> Self {
        Self {
            addr,
            messages,
            total_pieces,
            choke_tx,
            pieces_tx,
            blocks_tx,
        }
    }

    /// Runs until the peer closes the connection, a read fails or `cancellation_token` fires.
    /// Dropping the senders on exit wakes every waiter on the session side.
    pub async fn run(mut self, cancellation_token: CancellationToken) -> Result<()> {
        loop {
            tokio::select! {
                _ = cancellation_token.cancelled() => {
                    debug!("[{}] dispatch loop cancelled", self.addr);
                    return Ok(());
                }
                message = self.messages.next() => match message {
                    Some(Ok(message)) => self.handle(message),
                    Some(Err(err)) => {
                        warn!("[{}] failed to read message: {}", self.addr, err);
                        return Err(Error::connection_lost(self.addr, err));
                    }
                    None => {
                        info!("[{}] peer closed the connection", self.addr);
                        return Ok(());
                    }
                }
            }
        }
    }

    fn handle(&mut self, message: Message) {
        debug!("[{}] < got {:?}", self.addr, message);
        match message {
            Message::KeepAlive => {}
            Message::Choke => {
                self.choke_tx.send_modify(|signal| {
                    signal.state = ChokeState::Choked;
                    signal.chokes += 1;
                });
            }
            Message::Unchoke => {
                self.choke_tx
                    .send_modify(|signal| signal.state = ChokeState::Unchoked);
            }
            Message::Have(piece) if piece < self.total_pieces => {
                self.pieces_tx.send_modify(|pieces| {
                    pieces.insert(piece);
                });
            }
            Message::Have(piece) => {
                warn!("[{}] ignoring have for unknown piece {}", self.addr, piece);
            }
            Message::Bitfield(bitset) => {
                let total_pieces = self.total_pieces;
                self.pieces_tx.send_modify(|pieces| {
                    pieces.extend(bitset.iter().filter(|&piece| piece < total_pieces));
                });
            }
            Message::Piece(block) => match self.blocks_tx.try_send(block) {
                Ok(()) => {}
                Err(TrySendError::Full(block)) => {
                    warn!(
                        "[{}] block queue full, dropping {:?}",
                        self.addr,
                        Block::from(&block)
                    );
                }
                Err(TrySendError::Closed(_)) => {
                    debug!("[{}] session gone, dropping block", self.addr);
                }
            },
            Message::Interested
            | Message::NotInterested
            | Message::Request(_)
            | Message::Cancel(_) => {
                debug!("[{}] not serving data, ignoring message", self.addr);
            }
        }
    }
}
