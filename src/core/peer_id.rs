use std::fmt::{Debug, Formatter};

use rand::RngCore;

const CLIENT_PREFIX: &[u8; 8] = b"-BF0100-";

#[derive(PartialEq, Eq, Clone)]
pub struct PeerId(pub [u8; 20]);

impl PeerId {
    /// Azureus-style id: client prefix followed by random bytes.
    pub fn random() -> Self {
        let mut data = [0; 20];
        data[..CLIENT_PREFIX.len()].copy_from_slice(CLIENT_PREFIX);
        rand::rng().fill_bytes(&mut data[CLIENT_PREFIX.len()..]);
        Self(data)
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl Debug for PeerId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "PeerId({})", self.to_hex())
    }
}
