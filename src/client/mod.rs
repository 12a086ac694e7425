mod config;
mod retry;

use std::net::SocketAddr;

use log::{info, warn};

use crate::crypto::Md5;
use crate::error::{Error, Result};
use crate::peer::PeerSession;
use crate::torrent::{Info, Torrent};
use crate::tracker;

pub use config::Config;
pub use retry::{RetryPolicy, retry};

/// Ties the tracker and peer sessions together to fetch pieces or whole files.
pub struct Client {
    config: Config,
}

impl Client {
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub async fn discover_peers(&self, torrent: &Torrent) -> Result<Vec<SocketAddr>> {
        let config = &self.config;
        let response = retry(&config.retry, move |_| tracker::announce(torrent, config)).await?;
        if response.peers.is_empty() {
            return Err(Error::Tracker("no peers available".to_string()));
        }
        Ok(response.peers)
    }

    /// Connects to the first candidate that completes a handshake.
    pub async fn open_session(
        &self,
        info: &Info,
        candidates: &[SocketAddr],
    ) -> Result<PeerSession> {
        let mut last_error = None;
        for &addr in candidates {
            match PeerSession::connect(addr, info, &self.config).await {
                Ok(session) => return Ok(session),
                Err(err) => {
                    warn!("[{}] unable to open session: {}", addr, err);
                    last_error = Some(err);
                }
            }
        }
        Err(last_error.unwrap_or_else(|| Error::Tracker("no peers available".to_string())))
    }

    pub async fn download_piece(&self, torrent: &Torrent, piece: usize) -> Result<Vec<u8>> {
        let info = &torrent.info;
        if piece >= info.total_pieces() {
            return Err(Error::PieceOutOfRange {
                piece,
                total: info.total_pieces(),
            });
        }
        let peers = self.discover_peers(torrent).await?;
        let mut idle = None;
        let data = self.fetch_piece(info, &peers, piece, &mut idle).await;
        if let Some(session) = idle {
            session.close().await;
        }
        data
    }

    /// Downloads every piece in order over one session, moving to another peer when a piece fails
    /// with a retryable error.
    pub async fn download(&self, torrent: &Torrent) -> Result<Vec<u8>> {
        let info = &torrent.info;
        let peers = self.discover_peers(torrent).await?;
        let mut data = Vec::with_capacity(info.total_size());
        let mut idle = None;
        for piece in 0..info.total_pieces() {
            match self.fetch_piece(info, &peers, piece, &mut idle).await {
                Ok(bytes) => data.extend_from_slice(&bytes),
                Err(err) => {
                    if let Some(session) = idle.take() {
                        session.close().await;
                    }
                    return Err(err);
                }
            }
            info!("downloaded piece {}/{}", piece + 1, info.total_pieces());
        }
        if let Some(session) = idle {
            session.close().await;
        }

        if let Some(expected) = &info.md5sum {
            if &Md5::digest(&data) != expected {
                return Err(Error::InvalidTorrent(
                    "downloaded content does not match 'info.md5sum'".to_string(),
                ));
            }
        }
        Ok(data)
    }

    /// Downloads `piece` reusing `idle` when present. On success the session used is left in
    /// `idle`; a session that failed is closed and a fresh one is opened for the next attempt.
    async fn fetch_piece(
        &self,
        info: &Info,
        peers: &[SocketAddr],
        piece: usize,
        idle: &mut Option<PeerSession>,
    ) -> Result<Vec<u8>> {
        let policy = &self.config.retry;
        let mut attempt = 0;
        loop {
            let session = match idle.take() {
                Some(session) => Ok(session),
                None => self.open_session(info, &rotated(peers, attempt)).await,
            };
            let err = match session {
                Ok(mut session) => match session.download_piece(info, piece).await {
                    Ok(data) => {
                        *idle = Some(session);
                        return Ok(data);
                    }
                    Err(err) => {
                        session.close().await;
                        err
                    }
                },
                Err(err) => err,
            };
            if !policy.should_retry(attempt, &err) {
                return Err(err);
            }
            let delay = policy.delay_for_attempt(attempt);
            warn!(
                "piece {} attempt {} failed, retrying in {:?}: {}",
                piece,
                attempt + 1,
                delay,
                err
            );
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }
}

/// The candidate list starting at a different peer for every attempt.
fn rotated(peers: &[SocketAddr], attempt: u32) -> Vec<SocketAddr> {
    if peers.is_empty() {
        return Vec::new();
    }
    let start = attempt as usize % peers.len();
    peers[start..].iter().chain(&peers[..start]).copied().collect()
}
