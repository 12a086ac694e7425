mod info;

use std::path::Path;

use log::debug;
use url::Url;

use crate::bencoding::{self, Value};
use crate::codec::Encoder;
use crate::crypto::Sha1;
use crate::error::{Error, Result};

pub use info::Info;

use info::field;

// https://wiki.theory.org/BitTorrentSpecification#Metainfo_File_Structure

#[derive(Debug, PartialEq, Clone)]
pub struct Torrent {
    pub announce: Url,
    pub info: Info,
}

impl Torrent {
    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let bytes = tokio::fs::read(path).await?;
        Self::from_bytes(&bytes)
    }

    /// Parses a metainfo file. The info hash is computed over the exact bytes of the `info`
    /// dictionary as they appear in `bytes`, never over a re-encoding.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let mut value = Value::from_bytes(bytes)?;
        if !matches!(value, Value::Dictionary(_)) {
            return Err(Error::InvalidTorrent(format!(
                "top-level value must be a dictionary, found {}",
                value.kind()
            )));
        }

        let announce: String = field(&mut value, "", "announce")?;
        let announce = Url::parse(&announce)
            .map_err(|err| Error::InvalidTorrent(format!("'announce': {err}")))?;

        let info = value
            .remove_entry("info")
            .map_err(|_| Error::InvalidTorrent("missing 'info'".to_string()))?;
        let raw_info = bencoding::raw_value(bytes, b"info")?
            .ok_or_else(|| Error::InvalidTorrent("missing 'info'".to_string()))?;
        if info.to_bytes() != raw_info {
            debug!("'info' is not canonically encoded, hashing the original bytes");
        }
        let info = Info::new(info, Sha1::digest(raw_info))?;

        Ok(Torrent { announce, info })
    }
}
