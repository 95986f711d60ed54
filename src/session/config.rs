use std::fmt::{self, Display, Formatter};
use std::net::{IpAddr, SocketAddr};

use crate::common::Id;

pub const DEFAULT_PORT: u16 = 6881;

/// One of the two address families a session can run on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Family {
    V4,
    V6,
}

impl Family {
    pub fn of(address: &SocketAddr) -> Family {
        match address {
            SocketAddr::V4(_) => Family::V4,
            SocketAddr::V6(_) => Family::V6,
        }
    }
}

impl Display for Family {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Family::V4 => write!(f, "IPv4"),
            Family::V6 => write!(f, "IPv6"),
        }
    }
}

/// Set of enabled address families.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Families {
    pub ipv4: bool,
    pub ipv6: bool,
}

impl Families {
    pub const NONE: Families = Families {
        ipv4: false,
        ipv6: false,
    };
    pub const V4: Families = Families {
        ipv4: true,
        ipv6: false,
    };
    pub const V6: Families = Families {
        ipv4: false,
        ipv6: true,
    };
    pub const BOTH: Families = Families {
        ipv4: true,
        ipv6: true,
    };

    /// Bit flag for IPv4 in [Families::from_bits].
    pub const ENABLE_IPV4: u8 = 1;
    /// Bit flag for IPv6 in [Families::from_bits].
    pub const ENABLE_IPV6: u8 = 2;

    pub fn from_bits(bits: u8) -> Families {
        Families {
            ipv4: bits & Self::ENABLE_IPV4 == Self::ENABLE_IPV4,
            ipv6: bits & Self::ENABLE_IPV6 == Self::ENABLE_IPV6,
        }
    }

    pub fn bits(&self) -> u8 {
        let mut bits = 0;
        if self.ipv4 {
            bits |= Self::ENABLE_IPV4;
        }
        if self.ipv6 {
            bits |= Self::ENABLE_IPV6;
        }
        bits
    }

    pub fn contains(&self, family: Family) -> bool {
        match family {
            Family::V4 => self.ipv4,
            Family::V6 => self.ipv6,
        }
    }

    pub fn is_empty(&self) -> bool {
        !self.ipv4 && !self.ipv6
    }

    /// Enabled families, IPv4 first.
    pub fn iter(&self) -> impl Iterator<Item = Family> {
        let this = *self;
        [Family::V4, Family::V6]
            .into_iter()
            .filter(move |family| this.contains(*family))
    }
}

impl Default for Families {
    fn default() -> Self {
        Families::BOTH
    }
}

#[derive(Debug, Clone)]
/// Session Configurations
pub struct Config {
    /// Node Id.
    ///
    /// Should be generated randomly once, then saved and reused.
    ///
    /// Defaults to None, where a random Id is generated from the OS random source.
    pub id: Option<Id>,
    /// UDP port both sockets are bound to, must not be `0`.
    ///
    /// Defaults to [DEFAULT_PORT]
    pub port: u16,
    /// Address families to open sockets for.
    ///
    /// If both are enabled and only one socket can be created, the session runs
    /// on that family alone.
    ///
    /// Defaults to [Families::BOTH]
    pub families: Families,
    /// Datagrams from these addresses are dropped before reaching the engine,
    /// and they are never pinged.
    ///
    /// Defaults to empty.
    pub blacklist: Vec<IpAddr>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            id: None,
            port: DEFAULT_PORT,
            families: Families::BOTH,
            blacklist: vec![],
        }
    }
}
