use size::Size;
use url::Url;
use url::form_urlencoded::byte_serialize;

use crate::core::PeerId;
use crate::crypto::Sha1;

#[derive(Debug)]
pub struct TrackerRequest {
    pub announce: Url,
    pub info_hash: Sha1,
    pub peer_id: PeerId,
    /// The port number that the client is listening on.
    pub port: u16,
    /// The total amount uploaded since the client sent the 'started' event.
    pub uploaded: Size,
    /// The total amount downloaded since the client sent the 'started' event.
    pub downloaded: Size,
    /// The number of bytes needed to download to be 100% complete.
    pub left: Size,
    pub event: Option<Event>,
}

impl From<TrackerRequest> for Url {
    fn from(value: TrackerRequest) -> Self {
        let mut url = value.announce;
        let mut query = format!(
            "info_hash={}&peer_id={}&port={}&uploaded={}&downloaded={}&left={}&compact=1",
            url_encode(&value.info_hash.0),
            url_encode(&value.peer_id.0),
            value.port,
            value.uploaded.bytes(),
            value.downloaded.bytes(),
            value.left.bytes(),
        );
        if let Some(event) = &value.event {
            query.push_str("&event=");
            query.push_str(event.into());
        }
        // Keep any query the announce URL already carries (private tracker passkeys)
        if let Some(existing) = url.query().filter(|existing| !existing.is_empty()) {
            query = format!("{}&{}", existing, query);
        }
        url.set_query(Some(&query));
        url
    }
}

fn url_encode(bytes: &[u8]) -> String {
    String::from_iter(byte_serialize(bytes))
}

#[allow(dead_code)]
#[derive(Debug, Clone, Copy)]
pub enum Event {
    /// The first request to the tracker must include the event key with this value.
    Started,
    /// Must be sent to the tracker if the client is shutting down gracefully.
    Stopped,
    /// Must be sent to the tracker when the download completes.
    Completed,
}

impl From<&Event> for &str {
    fn from(value: &Event) -> Self {
        match value {
            Event::Started => "started",
            Event::Stopped => "stopped",
            Event::Completed => "completed",
        }
    }
}
