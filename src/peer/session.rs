use std::collections::HashMap;
use std::io::ErrorKind;
use std::net::SocketAddr;

use bit_set::BitSet;
use futures::SinkExt;
use log::{debug, info, warn};
use tokio::io::{AsyncRead, AsyncWrite, WriteHalf};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{self, Instant};
use tokio_util::codec::{FramedRead, FramedWrite};
use tokio_util::sync::CancellationToken;

use crate::client::Config;
use crate::codec::{AsyncDecoder, AsyncEncoder};
use crate::core::PeerId;
use crate::error::{Error, Result};
use crate::message::{Block, BlockData, Handshake, Message, MessageCodec};
use crate::peer::assembler::{PieceAssembler, Status};
use crate::peer::blocks::Blocks;
use crate::peer::dispatch::{ChokeSignal, ChokeState, Dispatcher};
use crate::torrent::Info;

/// Incoming blocks buffered per pipelined request before the dispatch loop starts dropping them.
const QUEUED_BLOCKS_PER_REQUEST: usize = 4;

/// An established connection to one peer, past the handshake.
///
/// Reads happen on a dedicated dispatch task that owns the read half of the stream. The session
/// keeps the write half and consumes what the dispatch loop publishes: choke state, the pieces
/// the peer advertised and incoming blocks.
pub struct PeerSession<S = TcpStream> {
    addr: SocketAddr,
    peer_id: PeerId,
    config: Config,
    writer: FramedWrite<WriteHalf<S>, MessageCodec>,
    choke_rx: watch::Receiver<ChokeSignal>,
    pieces_rx: watch::Receiver<BitSet>,
    blocks_rx: mpsc::Receiver<BlockData>,
    interested: bool,
    cancellation_token: CancellationToken,
    dispatcher: Option<JoinHandle<Result<()>>>,
}

impl PeerSession<TcpStream> {
    pub async fn connect(addr: SocketAddr, info: &Info, config: &Config) -> Result<Self> {
        info!("[{}] connecting...", addr);
        let stream = time::timeout(config.connect_timeout, TcpStream::connect(addr))
            .await
            .map_err(|_| {
                Error::connection_lost(
                    addr,
                    format!("connect timed out after {:?}", config.connect_timeout),
                )
            })?
            .map_err(|err| Error::connection_lost(addr, err))?;
        Self::handshake(addr, stream, info, config).await
    }
}

impl<S> PeerSession<S>
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    /// Exchanges handshakes over `stream` and starts the dispatch loop. Fails with
    /// `ProtocolMismatch` if the peer answers for a different torrent.
    pub async fn handshake(
        addr: SocketAddr,
        stream: S,
        info: &Info,
        config: &Config,
    ) -> Result<Self> {
        let (mut reader, mut writer) = tokio::io::split(stream);
        let handshake = Handshake::new(info.info_hash.clone(), config.client_id.clone());
        debug!("[{}] > sending handshake", addr);
        let exchange = async {
            handshake.encode(&mut writer).await?;
            Handshake::decode(&mut reader).await
        };
        let remote = time::timeout(config.handshake_timeout, exchange)
            .await
            .map_err(|_| Error::Handshake {
                peer: addr,
                reason: format!("timed out after {:?}", config.handshake_timeout),
            })?
            .map_err(|err| handshake_error(addr, err))?;

        if remote.info_hash != info.info_hash {
            return Err(Error::ProtocolMismatch {
                peer: addr,
                expected: info.info_hash.clone(),
                actual: remote.info_hash,
            });
        }
        info!("[{}] handshake complete, peer id {}", addr, remote.peer_id.to_hex());

        let block_size = config.block_size.bytes() as usize;
        let bitfield_size = info.total_pieces().div_ceil(8);
        let max_length = block_size.max(bitfield_size) + 9;

        let (choke_tx, choke_rx) = watch::channel(ChokeSignal::default());
        let (pieces_tx, pieces_rx) = watch::channel(BitSet::with_capacity(info.total_pieces()));
        let queue = config.max_pipelined_requests.max(1) * QUEUED_BLOCKS_PER_REQUEST;
        let (blocks_tx, blocks_rx) = mpsc::channel(queue);
        let dispatcher = Dispatcher::new(
            addr,
            FramedRead::new(reader, MessageCodec::new(max_length)),
            info.total_pieces(),
            choke_tx,
            pieces_tx,
            blocks_tx,
        );
        let cancellation_token = CancellationToken::new();
        let dispatcher = tokio::spawn(dispatcher.run(cancellation_token.clone()));

        Ok(Self {
            addr,
            peer_id: remote.peer_id,
            config: config.clone(),
            writer: FramedWrite::new(writer, MessageCodec::new(max_length)),
            choke_rx,
            pieces_rx,
            blocks_rx,
            interested: false,
            cancellation_token,
            dispatcher: Some(dispatcher),
        })
    }

    pub fn peer_id(&self) -> &PeerId {
        &self.peer_id
    }

    pub fn address(&self) -> SocketAddr {
        self.addr
    }

    pub fn choke_state(&self) -> ChokeState {
        self.choke_rx.borrow().state
    }

    /// Pieces advertised so far through bitfield and have messages.
    pub fn available_pieces(&self) -> BitSet {
        self.pieces_rx.borrow().clone()
    }

    pub fn has_piece(&self, piece: usize) -> bool {
        self.pieces_rx.borrow().contains(piece)
    }

    /// Downloads and verifies one piece. Nothing is returned unless the SHA-1 matches.
    pub async fn download_piece(&mut self, info: &Info, piece: usize) -> Result<Vec<u8>> {
        if piece >= info.total_pieces() {
            return Err(Error::PieceOutOfRange {
                piece,
                total: info.total_pieces(),
            });
        }
        if !self.pieces_rx.borrow().is_empty() && !self.has_piece(piece) {
            warn!("[{}] peer did not advertise piece {}", self.addr, piece);
        }
        let chokes = self.choke_rx.borrow_and_update().chokes;
        if !self.interested {
            self.send(Message::Interested).await?;
            self.interested = true;
        }
        self.wait_for_unchoke(piece, chokes).await?;

        while let Ok(stale) = self.blocks_rx.try_recv() {
            debug!(
                "[{}] discarding stale block {:?}",
                self.addr,
                Block::from(&stale)
            );
        }

        let piece_size = info.piece_size(piece);
        let mut blocks = Blocks::new(piece, piece_size, self.config.block_size);
        let mut assembler = PieceAssembler::new(piece_size, info.pieces[piece].clone());
        let mut pending: HashMap<usize, Block> = HashMap::new();
        let window = self.config.max_pipelined_requests.max(1);

        info!("[{}] downloading piece {} ({} bytes)", self.addr, piece, piece_size);
        // Only progress on a requested block moves the deadline
        let mut deadline = Instant::now() + self.config.block_timeout;
        loop {
            while pending.len() < window {
                let Some(block) = blocks.next() else {
                    break;
                };
                self.send(Message::Request(block)).await?;
                pending.insert(block.offset, block);
            }

            let block_data = self.next_block(piece, chokes, deadline, &pending).await?;
            match pending.get(&block_data.offset) {
                Some(block)
                    if block_data.piece == piece && block.length == block_data.data.len() =>
                {
                    pending.remove(&block_data.offset);
                    deadline = Instant::now() + self.config.block_timeout;
                }
                _ => {
                    warn!(
                        "[{}] discarding unexpected block {:?}",
                        self.addr,
                        Block::from(&block_data)
                    );
                    continue;
                }
            }

            match assembler.add(block_data.offset, block_data.data) {
                Status::Incomplete => {}
                Status::Invalid => {
                    warn!("[{}] piece {} failed hash verification", self.addr, piece);
                    return Err(Error::PieceHashMismatch {
                        peer: self.addr,
                        piece,
                    });
                }
                Status::Valid(data) => {
                    info!("[{}] piece {} verified", self.addr, piece);
                    return Ok(data);
                }
            }
        }
    }

    /// Stops the dispatch loop, waits for it and shuts the connection down.
    pub async fn close(mut self) {
        self.cancellation_token.cancel();
        if let Some(dispatcher) = self.dispatcher.take() {
            match dispatcher.await {
                Ok(Err(err)) => debug!("[{}] dispatch loop ended with: {}", self.addr, err),
                Err(err) => warn!("[{}] dispatch task failed: {}", self.addr, err),
                Ok(Ok(())) => {}
            }
        }
        if let Err(err) = self.writer.close().await {
            debug!("[{}] error while closing connection: {}", self.addr, err);
        }
        info!("[{}] session closed", self.addr);
    }

    async fn send(&mut self, message: Message) -> Result<()> {
        debug!("[{}] > sending {:?}", self.addr, message);
        let addr = self.addr;
        self.writer
            .send(message)
            .await
            .map_err(|err| Error::connection_lost(addr, err))
    }

    /// Waits until the peer unchokes us. Any choke received after `chokes` was observed fails the
    /// wait at once, even if an unchoke follows it.
    async fn wait_for_unchoke(&mut self, piece: usize, chokes: u64) -> Result<()> {
        let addr = self.addr;
        let timeout = self.config.unchoke_timeout;
        let choke_rx = &mut self.choke_rx;
        let wait = async {
            loop {
                let signal = *choke_rx.borrow_and_update();
                if signal.chokes != chokes {
                    warn!("[{}] choked while waiting to download piece {}", addr, piece);
                    return Err(Error::Choked { peer: addr, piece });
                }
                if signal.state == ChokeState::Unchoked {
                    return Ok(());
                }
                if choke_rx.changed().await.is_err() {
                    return Err(Error::connection_lost(
                        addr,
                        "connection closed while waiting for unchoke",
                    ));
                }
            }
        };
        time::timeout(timeout, wait)
            .await
            .map_err(|_| Error::ChokeTimeout {
                peer: addr,
                timeout,
            })?
    }

    async fn next_block(
        &mut self,
        piece: usize,
        chokes: u64,
        deadline: Instant,
        pending: &HashMap<usize, Block>,
    ) -> Result<BlockData> {
        let timeout = self.config.block_timeout;
        loop {
            tokio::select! {
                biased;
                block = self.blocks_rx.recv() => {
                    return block.ok_or_else(|| {
                        Error::connection_lost(self.addr, "connection closed during download")
                    });
                }
                changed = self.choke_rx.changed() => {
                    if changed.is_err() {
                        return Err(Error::connection_lost(
                            self.addr,
                            "connection closed during download",
                        ));
                    }
                    if self.choke_rx.borrow_and_update().chokes != chokes {
                        warn!("[{}] choked while downloading piece {}", self.addr, piece);
                        return Err(Error::Choked { peer: self.addr, piece });
                    }
                }
                _ = time::sleep_until(deadline) => {
                    let offset = pending.keys().min().copied().unwrap_or_default();
                    return Err(Error::BlockTimeout {
                        peer: self.addr,
                        piece,
                        offset,
                        timeout,
                    });
                }
            }
        }
    }
}

impl<S> Drop for PeerSession<S> {
    fn drop(&mut self) {
        self.cancellation_token.cancel();
    }
}

fn handshake_error(addr: SocketAddr, err: std::io::Error) -> Error {
    let reason = match err.kind() {
        ErrorKind::UnexpectedEof => "connection closed before the handshake completed".to_string(),
        _ => err.to_string(),
    };
    Error::Handshake { peer: addr, reason }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use size::Size;
    use tokio::io::DuplexStream;
    use tokio_stream::StreamExt;
    use tokio_util::codec::Framed;

    use crate::crypto::Sha1;
    use crate::testing::{MOCK_PEER_ID, MockPeer, mock_addr, test_data, test_info};

    use super::*;

    // 3 pieces of 40, 40 and 20 bytes, split into 16 byte blocks
    fn setup() -> (Vec<u8>, Info, Config) {
        let data = test_data(100);
        let info = test_info(&data, 40);
        let config = Config::default().with_block_size(Size::from_bytes(16));
        (data, info, config)
    }

    async fn session(peer: MockPeer, info: &Info, config: &Config) -> PeerSession<DuplexStream> {
        let (stream, _) = peer.spawn();
        PeerSession::handshake(mock_addr(), stream, info, config)
            .await
            .expect("handshake failed")
    }

    #[tokio::test]
    async fn downloads_every_piece() {
        let (data, info, config) = setup();
        let mut session = session(MockPeer::new(&info, data.clone()), &info, &config).await;

        for piece in 0..info.total_pieces() {
            let downloaded = session
                .download_piece(&info, piece)
                .await
                .expect("download failed");
            let start = info.piece_offset(piece);

            assert_eq!(downloaded, data[start..start + info.piece_size(piece)]);
        }
        assert_eq!(session.peer_id(), &MOCK_PEER_ID);
        assert_eq!(session.address(), mock_addr());
        assert_eq!(session.choke_state(), ChokeState::Unchoked);
        assert_eq!(session.available_pieces().len(), 3);
        assert!(session.has_piece(2));
    }

    #[tokio::test]
    async fn strictly_sequential_requests() {
        let (data, info, config) = setup();
        let config = config.with_max_pipelined_requests(1);
        let mut session = session(MockPeer::new(&info, data.clone()), &info, &config).await;

        let downloaded = session.download_piece(&info, 2).await.unwrap();

        assert_eq!(downloaded, data[80..]);
    }

    #[tokio::test]
    async fn keep_alives_do_not_disrupt_download() {
        let (data, info, config) = setup();
        let peer = MockPeer::new(&info, data.clone()).with_keep_alives();
        let mut session = session(peer, &info, &config).await;

        let downloaded = session.download_piece(&info, 1).await.unwrap();

        assert_eq!(downloaded, data[40..80]);
    }

    #[tokio::test]
    async fn reordered_blocks_are_reassembled_by_offset() {
        let (data, info, config) = setup();
        let peer = MockPeer::new(&info, data.clone()).reverse_responses();
        let mut session = session(peer, &info, &config).await;

        let downloaded = session.download_piece(&info, 0).await.unwrap();

        assert_eq!(downloaded, data[..40]);
    }

    #[tokio::test]
    async fn missing_bitfield_is_tolerated() {
        let (data, info, config) = setup();
        let peer = MockPeer::new(&info, data.clone()).without_bitfield();
        let mut session = session(peer, &info, &config).await;

        let downloaded = session.download_piece(&info, 0).await.unwrap();

        assert_eq!(downloaded, data[..40]);
        assert!(session.available_pieces().is_empty());
    }

    #[tokio::test]
    async fn corrupted_piece_is_never_returned() {
        let (data, info, config) = setup();
        let peer = MockPeer::new(&info, data).corrupt_data();
        let mut session = session(peer, &info, &config).await;

        let result = session.download_piece(&info, 1).await;

        assert!(matches!(
            result,
            Err(Error::PieceHashMismatch { piece: 1, .. })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn peer_that_never_unchokes() {
        let (data, info, config) = setup();
        let peer = MockPeer::new(&info, data).never_unchoke();
        let mut session = session(peer, &info, &config).await;

        let result = session.download_piece(&info, 0).await;

        assert!(matches!(result, Err(Error::ChokeTimeout { .. })));
        assert_eq!(session.choke_state(), ChokeState::Choked);
    }

    #[tokio::test]
    async fn choke_mid_piece_aborts_download() {
        let (data, info, config) = setup();
        let config = config.with_max_pipelined_requests(1);
        let peer = MockPeer::new(&info, data).choke_after(1);
        let mut session = session(peer, &info, &config).await;

        let result = session.download_piece(&info, 0).await;

        assert!(matches!(result, Err(Error::Choked { piece: 0, .. })));
    }

    #[tokio::test]
    async fn piece_out_of_range() {
        let (data, info, config) = setup();
        let mut session = session(MockPeer::new(&info, data), &info, &config).await;

        let result = session.download_piece(&info, 3).await;

        assert!(matches!(
            result,
            Err(Error::PieceOutOfRange { piece: 3, total: 3 })
        ));
    }

    #[tokio::test]
    async fn info_hash_mismatch_aborts_session() {
        let (data, info, config) = setup();
        let peer = MockPeer::new(&info, data).with_info_hash(Sha1([0xee; 20]));
        let (stream, _) = peer.spawn();

        let result = PeerSession::handshake(mock_addr(), stream, &info, &config).await;

        assert!(matches!(result, Err(Error::ProtocolMismatch { .. })));
    }

    #[tokio::test]
    async fn peer_closes_during_handshake() {
        let (_, info, config) = setup();
        let (stream, remote) = tokio::io::duplex(1024);
        tokio::spawn(async move {
            let mut remote = remote;
            let mut buf = [0; 10];
            tokio::io::AsyncReadExt::read_exact(&mut remote, &mut buf).await
        });

        let result = PeerSession::handshake(mock_addr(), stream, &info, &config).await;

        assert!(matches!(result, Err(Error::Handshake { .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn silent_peer_times_out_handshake() {
        let (_, info, config) = setup();
        let (stream, _remote) = tokio::io::duplex(1024);

        let result = PeerSession::handshake(mock_addr(), stream, &info, &config).await;

        let Err(Error::Handshake { reason, .. }) = result else {
            panic!("expected handshake error");
        };
        assert_eq!(reason, "timed out after 10s");
    }

    /// Answers the handshake and unchokes, then hands the framed stream to the test.
    async fn scripted_peer(
        info: &Info,
        mut stream: DuplexStream,
    ) -> Framed<DuplexStream, MessageCodec> {
        Handshake::decode(&mut stream).await.unwrap();
        Handshake::new(info.info_hash.clone(), MOCK_PEER_ID)
            .encode(&mut stream)
            .await
            .unwrap();
        let mut framed = Framed::new(stream, MessageCodec::new(1024));
        framed.send(Message::Unchoke).await.unwrap();
        framed
    }

    async fn expect_request(framed: &mut Framed<DuplexStream, MessageCodec>) -> Block {
        loop {
            match framed.next().await.unwrap().unwrap() {
                Message::Request(block) => return block,
                Message::Interested => {}
                other => panic!("unexpected message {:?}", other),
            }
        }
    }

    #[tokio::test]
    async fn unexpected_blocks_are_discarded() {
        let (data, info, config) = setup();
        let (stream, remote) = tokio::io::duplex(64 * 1024);
        let script_info = info.clone();
        let script_data = data.clone();
        let script = tokio::spawn(async move {
            let mut framed = scripted_peer(&script_info, remote).await;
            let mut requests = Vec::new();
            for _ in 0..3 {
                requests.push(expect_request(&mut framed).await);
            }
            // Unsolicited piece, and a block with the wrong length
            framed
                .send(Message::Piece(BlockData::new(2, 0, vec![0; 16])))
                .await
                .unwrap();
            framed
                .send(Message::Piece(BlockData::new(0, 0, vec![0; 3])))
                .await
                .unwrap();
            for block in requests {
                let start = block.offset;
                let data = script_data[start..start + block.length].to_vec();
                framed
                    .send(Message::Piece(BlockData::new(0, block.offset, data)))
                    .await
                    .unwrap();
            }
            framed
        });
        let mut session = PeerSession::handshake(mock_addr(), stream, &info, &config)
            .await
            .unwrap();

        let downloaded = session.download_piece(&info, 0).await.unwrap();

        assert_eq!(downloaded, data[..40]);
        script.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn unanswered_request_times_out() {
        let (_, info, config) = setup();
        let (stream, remote) = tokio::io::duplex(64 * 1024);
        let script_info = info.clone();
        let script = tokio::spawn(async move {
            let mut framed = scripted_peer(&script_info, remote).await;
            while framed.next().await.is_some() {}
        });
        let mut session = PeerSession::handshake(mock_addr(), stream, &info, &config)
            .await
            .unwrap();

        let result = session.download_piece(&info, 1).await;

        assert!(matches!(
            result,
            Err(Error::BlockTimeout {
                piece: 1,
                offset: 0,
                ..
            })
        ));
        drop(session);
        script.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn choke_while_waiting_for_unchoke_fails_fast() {
        let (_, info, config) = setup();
        let (stream, mut remote) = tokio::io::duplex(64 * 1024);
        let script_info = info.clone();
        let script = tokio::spawn(async move {
            Handshake::decode(&mut remote).await.unwrap();
            Handshake::new(script_info.info_hash.clone(), MOCK_PEER_ID)
                .encode(&mut remote)
                .await
                .unwrap();
            let mut framed = Framed::new(remote, MessageCodec::new(1024));
            while let Some(Ok(message)) = framed.next().await {
                if matches!(message, Message::Interested) {
                    framed.send(Message::Choke).await.unwrap();
                }
            }
        });
        let mut session = PeerSession::handshake(mock_addr(), stream, &info, &config)
            .await
            .unwrap();
        let started = Instant::now();

        let result = session.download_piece(&info, 0).await;

        assert!(matches!(result, Err(Error::Choked { piece: 0, .. })));
        assert!(started.elapsed() < config.unchoke_timeout);
        drop(session);
        script.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn stray_blocks_do_not_extend_block_timeout() {
        let (_, info, config) = setup();
        let (stream, remote) = tokio::io::duplex(64 * 1024);
        let script_info = info.clone();
        tokio::spawn(async move {
            let mut framed = scripted_peer(&script_info, remote).await;
            for _ in 0..10 {
                time::sleep(Duration::from_secs(20)).await;
                let stray = Message::Piece(BlockData::new(2, 0, vec![0; 16]));
                if framed.send(stray).await.is_err() {
                    break;
                }
            }
        });
        let mut session = PeerSession::handshake(mock_addr(), stream, &info, &config)
            .await
            .unwrap();
        let started = Instant::now();

        let result = session.download_piece(&info, 0).await;

        assert!(matches!(
            result,
            Err(Error::BlockTimeout { piece: 0, .. })
        ));
        assert!(started.elapsed() < config.block_timeout + Duration::from_secs(10));
    }

    #[tokio::test]
    async fn connection_lost_during_download() {
        let (_, info, config) = setup();
        let (stream, remote) = tokio::io::duplex(64 * 1024);
        let script_info = info.clone();
        tokio::spawn(async move {
            let mut framed = scripted_peer(&script_info, remote).await;
            expect_request(&mut framed).await;
        });
        let mut session = PeerSession::handshake(mock_addr(), stream, &info, &config)
            .await
            .unwrap();

        let result = session.download_piece(&info, 0).await;

        assert!(matches!(result, Err(Error::ConnectionLost { .. })));
    }

    #[tokio::test]
    async fn close_releases_connection() {
        let (data, info, config) = setup();
        let (stream, peer) = MockPeer::new(&info, data).spawn();
        let session = PeerSession::handshake(mock_addr(), stream, &info, &config)
            .await
            .unwrap();

        session.close().await;

        let served = time::timeout(Duration::from_secs(5), peer).await;
        assert!(served.expect("peer still connected").unwrap().is_ok());
    }

    #[tokio::test]
    async fn drop_cancels_dispatch_loop() {
        let (data, info, config) = setup();
        let (stream, peer) = MockPeer::new(&info, data).spawn();
        let session = PeerSession::handshake(mock_addr(), stream, &info, &config)
            .await
            .unwrap();

        drop(session);

        let served = time::timeout(Duration::from_secs(5), peer).await;
        assert!(served.expect("peer still connected").is_ok());
    }
}
