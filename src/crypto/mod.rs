use std::fmt::{Debug, Display, Formatter};

use sha1::Digest;

#[derive(PartialEq, Eq, Clone)]
pub struct Md5(pub [u8; 16]);

impl Md5 {
    pub fn from_hex(hex: &str) -> Result<Self, hex::FromHexError> {
        let mut bytes = [0; 16];
        hex::decode_to_slice(hex, &mut bytes)?;
        Ok(Self(bytes))
    }

    pub fn digest(data: &[u8]) -> Self {
        Self(md5::compute(data).0)
    }
}

impl Debug for Md5 {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "Md5({})", hex::encode(self.0))
    }
}

#[derive(PartialEq, Eq, Clone, Hash)]
pub struct Sha1(pub [u8; 20]);

impl Sha1 {
    pub fn from_hex(hex: &str) -> Result<Self, hex::FromHexError> {
        let mut bytes = [0; 20];
        hex::decode_to_slice(hex, &mut bytes)?;
        Ok(Self(bytes))
    }

    pub fn digest(data: &[u8]) -> Self {
        Self(sha1::Sha1::digest(data).into())
    }
}

impl Debug for Sha1 {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "Sha1({})", self)
    }
}

impl Display for Sha1 {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        for byte in self.0 {
            write!(f, "{:02x}", byte)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sha1_of_empty_input() {
        assert_eq!(
            Sha1::digest(b"").to_string(),
            "da39a3ee5e6b4b0d3255bfef95601890afd80709"
        );
    }

    #[test]
    fn sha1_hex_round_trip() {
        let hash = Sha1::from_hex("d69f91e6b2ae4c542468d1073a71d4ea13879a7f").unwrap();

        assert_eq!(hash.to_string(), "d69f91e6b2ae4c542468d1073a71d4ea13879a7f");
        assert_eq!(
            format!("{:?}", hash),
            "Sha1(d69f91e6b2ae4c542468d1073a71d4ea13879a7f)"
        );
    }

    #[test]
    fn invalid_hex() {
        assert!(Sha1::from_hex("not hex").is_err());
        assert!(Md5::from_hex("abcd").is_err());
    }

    #[test]
    fn md5_digest() {
        assert_eq!(
            Md5::digest(b"hello"),
            Md5::from_hex("5d41402abc4b2a76b9719d911017c592").unwrap()
        );
    }
}
