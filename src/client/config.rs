use std::time::Duration;

use size::Size;

use crate::client::RetryPolicy;
use crate::core::PeerId;

/// Configuration settings for the downloader
#[derive(Clone, Debug)]
pub struct Config {
    // Identity and Network Settings
    /// Unique identifier for this client, sent in handshakes and tracker requests
    pub client_id: PeerId,
    /// Port number reported to the tracker
    pub port: u16,

    // Transfer Settings
    /// Size of data blocks requested from peers
    pub block_size: Size,
    /// Maximum number of outstanding block requests while downloading a piece
    pub max_pipelined_requests: usize,

    // Timeouts
    /// Timeout for establishing new connections
    pub connect_timeout: Duration,
    /// Timeout for the handshake exchange
    pub handshake_timeout: Duration,
    /// Time to wait for a peer to unchoke us before giving up
    pub unchoke_timeout: Duration,
    /// Time to wait for a requested block before giving up
    pub block_timeout: Duration,

    // Retry Settings
    /// Retry policy for connecting to peers and downloading pieces
    pub retry: RetryPolicy,
}

#[allow(dead_code)]
impl Config {
    pub fn with_client_id(mut self, client_id: PeerId) -> Self {
        self.client_id = client_id;
        self
    }

    pub fn with_block_size(mut self, size: Size) -> Self {
        self.block_size = size;
        self
    }

    pub fn with_max_pipelined_requests(mut self, n: usize) -> Self {
        self.max_pipelined_requests = n;
        self
    }

    pub fn with_unchoke_timeout(mut self, timeout: Duration) -> Self {
        self.unchoke_timeout = timeout;
        self
    }

    pub fn with_block_timeout(mut self, timeout: Duration) -> Self {
        self.block_timeout = timeout;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            client_id: PeerId::random(),
            port: 6881,
            block_size: Size::from_kibibytes(16),
            max_pipelined_requests: 5,
            connect_timeout: Duration::from_secs(10),
            handshake_timeout: Duration::from_secs(10),
            unchoke_timeout: Duration::from_secs(10),
            block_timeout: Duration::from_secs(30),
            retry: RetryPolicy::default(),
        }
    }
}
