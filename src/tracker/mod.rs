mod request;
mod response;

use log::{debug, info};
use size::Size;
use url::Url;

use crate::bencoding::Value;
use crate::client::Config;
use crate::error::{Error, Result};
use crate::torrent::Torrent;

pub use request::{Event, TrackerRequest};
pub use response::TrackerResponse;

/// Announces to the torrent's tracker as a fresh download and returns the peers it knows about.
pub async fn announce(torrent: &Torrent, config: &Config) -> Result<TrackerResponse> {
    let request = TrackerRequest {
        announce: torrent.announce.clone(),
        info_hash: torrent.info.info_hash.clone(),
        peer_id: config.client_id.clone(),
        port: config.port,
        uploaded: Size::from_bytes(0),
        downloaded: Size::from_bytes(0),
        left: Size::from_bytes(torrent.info.total_size()),
        event: Some(Event::Started),
    };
    let url = Url::from(request);
    debug!("announcing to {}", url);

    let response = reqwest::get(url).await?;
    if !response.status().is_success() {
        return Err(Error::Tracker(format!(
            "server returned status {}",
            response.status()
        )));
    }
    let body = response.bytes().await?;
    let value = Value::from_bytes(&body)
        .map_err(|err| Error::Tracker(format!("invalid response body: {}", err)))?;
    let response = TrackerResponse::try_from(value)?;
    info!(
        "tracker returned {} peers, interval {:?}",
        response.peers.len(),
        response.interval
    );
    Ok(response)
}
