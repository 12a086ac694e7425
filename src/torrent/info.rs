use crate::bencoding::{Value, ValueError};
use crate::crypto::{Md5, Sha1};
use crate::error::{Error, Result};

const SHA1_LEN: usize = 20;

/// Single-file torrent metadata, derived from the `info` dictionary.
#[derive(Debug, PartialEq, Clone)]
pub struct Info {
    /// SHA-1 of the original encoded `info` dictionary.
    pub info_hash: Sha1,
    /// Suggested file name.
    pub name: String,
    /// Bytes per piece, except possibly the last.
    pub piece_length: usize,
    /// Total content bytes.
    pub length: usize,
    pub pieces: Vec<Sha1>,
    pub md5sum: Option<Md5>,
}

impl Info {
    pub fn new(mut value: Value, info_hash: Sha1) -> Result<Self> {
        if !matches!(value, Value::Dictionary(_)) {
            return Err(Error::InvalidTorrent(format!(
                "'info' must be a dictionary, found {}",
                value.kind()
            )));
        }
        if !value.contains_key("length") && value.contains_key("files") {
            return Err(Error::InvalidTorrent(
                "multi-file torrents are not supported".to_string(),
            ));
        }

        let length: usize = field(&mut value, "info.", "length")?;
        let name: String = field(&mut value, "info.", "name")?;
        let piece_length: usize = field(&mut value, "info.", "piece length")?;
        let pieces: Vec<u8> = field(&mut value, "info.", "pieces")?;
        let md5sum = match value.try_remove_entry("md5sum") {
            Ok(Some(md5sum)) => {
                let md5sum: String = md5sum
                    .try_into()
                    .map_err(|err| Error::InvalidTorrent(format!("'info.md5sum': {err}")))?;
                let md5sum = Md5::from_hex(&md5sum)
                    .map_err(|err| Error::InvalidTorrent(format!("'info.md5sum': {err}")))?;
                Some(md5sum)
            }
            _ => None,
        };

        if piece_length == 0 {
            return Err(Error::InvalidTorrent(
                "'info.piece length' must be positive".to_string(),
            ));
        }
        if length == 0 {
            return Err(Error::InvalidTorrent(
                "'info.length' must be positive".to_string(),
            ));
        }
        let pieces = Info::build_pieces(&pieces)?;
        let expected_pieces = length.div_ceil(piece_length);
        if pieces.len() != expected_pieces {
            return Err(Error::InvalidTorrent(format!(
                "expected {} piece hashes for {} bytes, found {}",
                expected_pieces,
                length,
                pieces.len()
            )));
        }

        Ok(Info {
            info_hash,
            name,
            piece_length,
            length,
            pieces,
            md5sum,
        })
    }

    fn build_pieces(pieces: &[u8]) -> Result<Vec<Sha1>> {
        if pieces.len() % SHA1_LEN != 0 {
            return Err(Error::InvalidTorrent(format!(
                "'info.pieces' length {} is not a multiple of {}",
                pieces.len(),
                SHA1_LEN
            )));
        }
        Ok(pieces
            .chunks_exact(SHA1_LEN)
            .map(|chunk| {
                let mut bytes = [0; SHA1_LEN];
                bytes.copy_from_slice(chunk);
                Sha1(bytes)
            })
            .collect())
    }

    pub fn total_pieces(&self) -> usize {
        self.pieces.len()
    }

    pub fn total_size(&self) -> usize {
        self.length
    }

    pub fn piece_offset(&self, piece: usize) -> usize {
        self.piece_length * piece
    }

    /// Effective length of `piece`. The last piece holds the remainder.
    pub fn piece_size(&self, piece: usize) -> usize {
        let piece_start = self.piece_offset(piece);
        let piece_end = (piece_start + self.piece_length).min(self.length);
        piece_end - piece_start
    }
}

/// Removes `key` from a descriptor dictionary, converting it and naming the field on failure.
pub(super) fn field<T>(dict: &mut Value, prefix: &str, key: &str) -> Result<T>
where
    T: TryFrom<Value, Error = ValueError>,
{
    dict.remove_entry(key)
        .and_then(T::try_from)
        .map_err(|err| match err {
            ValueError::MissingKey(_) => Error::InvalidTorrent(format!("missing '{prefix}{key}'")),
            other => Error::InvalidTorrent(format!("'{prefix}{key}': {other}")),
        })
}
