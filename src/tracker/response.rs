use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

use crate::bencoding::{Value, ValueError};
use crate::error::{Error, Result};

const COMPACT_PEER_LEN: usize = 6;

#[derive(Debug, PartialEq)]
pub struct TrackerResponse {
    pub interval: Duration,
    pub complete: Option<usize>,
    pub incomplete: Option<usize>,
    pub peers: Vec<SocketAddr>,
}

impl TryFrom<Value> for TrackerResponse {
    type Error = Error;

    fn try_from(mut value: Value) -> Result<Self> {
        if !matches!(value, Value::Dictionary(_)) {
            return Err(Error::Tracker(format!(
                "response must be a dictionary, found {}",
                value.kind()
            )));
        }
        if let Some(reason) = optional::<String>(&mut value, "failure reason")? {
            return Err(Error::Tracker(format!("announce rejected: {}", reason)));
        }
        let interval = field(&mut value, "interval")?;
        let complete = optional(&mut value, "complete")?;
        let incomplete = optional(&mut value, "incomplete")?;
        let peers = match value.remove_entry("peers").map_err(invalid("peers"))? {
            Value::String(bytes) => compact_peers(&bytes)?,
            Value::List(peers) => peers
                .into_iter()
                .map(dictionary_peer)
                .collect::<Result<_>>()?,
            other => {
                return Err(Error::Tracker(format!(
                    "'peers': expected string or list, found {}",
                    other.kind()
                )));
            }
        };
        Ok(TrackerResponse {
            interval,
            complete,
            incomplete,
            peers,
        })
    }
}

/// 4 bytes of IPv4 address followed by 2 bytes of port, both big-endian, per peer.
fn compact_peers(bytes: &[u8]) -> Result<Vec<SocketAddr>> {
    if bytes.len() % COMPACT_PEER_LEN != 0 {
        return Err(Error::Tracker(format!(
            "compact peer list length {} is not a multiple of {}",
            bytes.len(),
            COMPACT_PEER_LEN
        )));
    }
    Ok(bytes
        .chunks_exact(COMPACT_PEER_LEN)
        .map(|chunk| {
            let ip = Ipv4Addr::new(chunk[0], chunk[1], chunk[2], chunk[3]);
            let port = u16::from_be_bytes([chunk[4], chunk[5]]);
            SocketAddr::new(IpAddr::V4(ip), port)
        })
        .collect())
}

fn dictionary_peer(mut value: Value) -> Result<SocketAddr> {
    let ip: String = field(&mut value, "ip")?;
    let ip: IpAddr = ip
        .parse()
        .map_err(|err| Error::Tracker(format!("'ip': {}", err)))?;
    let port = field(&mut value, "port")?;
    Ok(SocketAddr::new(ip, port))
}

fn field<T>(value: &mut Value, key: &'static str) -> Result<T>
where
    T: TryFrom<Value, Error = ValueError>,
{
    value
        .remove_entry(key)
        .and_then(T::try_from)
        .map_err(invalid(key))
}

fn optional<T>(value: &mut Value, key: &'static str) -> Result<Option<T>>
where
    T: TryFrom<Value, Error = ValueError>,
{
    value
        .try_remove_entry(key)
        .and_then(|entry| entry.map(T::try_from).transpose())
        .map_err(invalid(key))
}

fn invalid(key: &'static str) -> impl Fn(ValueError) -> Error {
    move |err| Error::Tracker(format!("'{}': {}", key, err))
}
