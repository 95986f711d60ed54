//! Node Id or a search target (info-hash)
use std::fmt::{self, Debug, Display, Formatter};
use std::str::FromStr;

use sha1_smol::Sha1;

use crate::{Error, Result};

use super::random_bytes;

/// The size of node IDs and info-hashes in bytes.
pub const ID_SIZE: usize = 20;

#[derive(Clone, Copy, PartialEq, Ord, PartialOrd, Eq, Hash, Default)]
/// Node Id or a search target (info-hash)
pub struct Id(pub [u8; ID_SIZE]);

impl Id {
    /// Generate a random Id from the OS random source.
    pub fn random() -> Id {
        let mut bytes = [0u8; ID_SIZE];
        random_bytes(&mut bytes);

        Id(bytes)
    }

    /// Ids need to be distributed evenly, so instead of reusing an existing
    /// identifier, derive one as the SHA-1 of it.
    pub fn from_sha1<T: AsRef<[u8]>>(data: T) -> Id {
        let mut hasher = Sha1::new();
        hasher.update(data.as_ref());

        Id(hasher.digest().bytes())
    }

    /// Create a new Id from some bytes. Returns Err if `bytes` is not of length
    /// [ID_SIZE](crate::ID_SIZE).
    pub fn from_bytes<T: AsRef<[u8]>>(bytes: T) -> Result<Id> {
        let bytes = bytes.as_ref();
        if bytes.len() != ID_SIZE {
            return Err(Error::InvalidIdSize(bytes.len()));
        }

        let mut tmp: [u8; ID_SIZE] = [0; ID_SIZE];
        tmp.copy_from_slice(bytes);

        Ok(Id(tmp))
    }

    pub fn as_bytes(&self) -> &[u8; ID_SIZE] {
        &self.0
    }

    pub fn to_vec(&self) -> Vec<u8> {
        self.0.to_vec()
    }
}

impl Display for Id {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        for byte in self.0 {
            write!(f, "{:02x}", byte)?;
        }

        Ok(())
    }
}

impl Debug for Id {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "Id({})", self)
    }
}

impl From<[u8; ID_SIZE]> for Id {
    fn from(bytes: [u8; ID_SIZE]) -> Id {
        Id(bytes)
    }
}

impl TryFrom<&[u8]> for Id {
    type Error = Error;

    fn try_from(bytes: &[u8]) -> Result<Id> {
        Id::from_bytes(bytes)
    }
}

impl FromStr for Id {
    type Err = Error;

    /// Parse a 40 characters hex string.
    fn from_str(s: &str) -> Result<Id> {
        if s.len() != ID_SIZE * 2 {
            return Err(Error::InvalidIdSize(s.len() / 2));
        }

        let mut bytes = [0u8; ID_SIZE];

        for (i, byte) in bytes.iter_mut().enumerate() {
            *byte = s
                .get(i * 2..i * 2 + 2)
                .and_then(|pair| u8::from_str_radix(pair, 16).ok())
                .ok_or(Error::InvalidArgument("Id is not a valid hex string"))?;
        }

        Ok(Id(bytes))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn from_bytes_requires_twenty_bytes() {
        assert!(Id::from_bytes([0u8; 20]).is_ok());
        assert!(matches!(
            Id::from_bytes([0u8; 19]),
            Err(Error::InvalidIdSize(19))
        ));
        assert!(matches!(
            Id::from_bytes(vec![1u8; 21]),
            Err(Error::InvalidIdSize(21))
        ));
    }

    #[test]
    fn random_ids_differ() {
        assert_ne!(Id::random(), Id::random());
    }

    #[test]
    fn sha1_of_empty_input() {
        let id = Id::from_sha1(b"");

        assert_eq!(id.to_string(), "da39a3ee5e6b4b0d3255bfef95601890afd80709");
    }

    #[test]
    fn hex_roundtrip() {
        let hex = "f919bc3c68eed436c485a564c51984a35af9151c";
        let id: Id = hex.parse().unwrap();

        assert_eq!(id.to_string(), hex);
        assert_eq!(id.0[0], 0xf9);
        assert!("f919".parse::<Id>().is_err());
        assert!("zz19bc3c68eed436c485a564c51984a35af9151c"
            .parse::<Id>()
            .is_err());
    }
}
