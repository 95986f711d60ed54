//! Compact peer info: the fixed width `address || port` records used by
//! [BEP_0005](https://www.bittorrent.org/beps/bep_0005.html) and
//! [BEP_0032](https://www.bittorrent.org/beps/bep_0032.html).

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr, SocketAddrV4, SocketAddrV6};

use crate::{Error, Result};

/// 4 bytes address + 2 bytes big endian port.
pub const IPV4_RECORD_LEN: usize = 6;
/// 16 bytes address + 2 bytes big endian port.
pub const IPV6_RECORD_LEN: usize = 18;

/// Decode a contiguous batch of compact IPv4 peers.
///
/// A batch whose length is not a multiple of [IPV4_RECORD_LEN] is rejected as a whole.
pub fn decode_ipv4_batch<T: AsRef<[u8]>>(bytes: T) -> Result<Vec<SocketAddrV4>> {
    let bytes = bytes.as_ref();
    check_framing(bytes, IPV4_RECORD_LEN)?;

    Ok(bytes
        .chunks_exact(IPV4_RECORD_LEN)
        .map(|record| {
            let ip = Ipv4Addr::new(record[0], record[1], record[2], record[3]);
            SocketAddrV4::new(ip, port(&record[4..]))
        })
        .collect())
}

/// Decode a contiguous batch of compact IPv6 peers.
///
/// A batch whose length is not a multiple of [IPV6_RECORD_LEN] is rejected as a whole.
pub fn decode_ipv6_batch<T: AsRef<[u8]>>(bytes: T) -> Result<Vec<SocketAddrV6>> {
    let bytes = bytes.as_ref();
    check_framing(bytes, IPV6_RECORD_LEN)?;

    Ok(bytes
        .chunks_exact(IPV6_RECORD_LEN)
        .map(|record| {
            let mut octets = [0u8; 16];
            octets.copy_from_slice(&record[..16]);
            SocketAddrV6::new(Ipv6Addr::from(octets), port(&record[16..]), 0, 0)
        })
        .collect())
}

/// Decode a single compact record of either width.
pub fn decode_socket_addr<T: AsRef<[u8]>>(bytes: T) -> Result<SocketAddr> {
    let bytes = bytes.as_ref();
    match bytes.len() {
        IPV4_RECORD_LEN => Ok(SocketAddr::V4(decode_ipv4_batch(bytes)?[0])),
        IPV6_RECORD_LEN => Ok(SocketAddr::V6(decode_ipv6_batch(bytes)?[0])),
        len => Err(Error::RecordLength(len)),
    }
}

/// Parse a textual IPv4 or IPv6 address and a port into a [SocketAddr].
///
/// Port `0` is not a valid destination.
pub fn parse_address(address: &str, port: u16) -> Result<SocketAddr> {
    if port == 0 {
        return Err(Error::InvalidAddress(format!(
            "port of {address} must be in 1..=65535"
        )));
    }

    let ip: IpAddr = address
        .trim_start_matches('[')
        .trim_end_matches(']')
        .parse()
        .map_err(|_| Error::InvalidAddress(format!("{address} is not an IPv4 or IPv6 address")))?;

    Ok(SocketAddr::new(ip, port))
}

/// Encode a textual address and port into its compact record, 6 bytes for IPv4
/// and 18 bytes for IPv6.
pub fn encode_address(address: &str, port: u16) -> Result<Vec<u8>> {
    Ok(encode_socket_addr(&parse_address(address, port)?))
}

pub fn encode_socket_addr(address: &SocketAddr) -> Vec<u8> {
    let mut bytes = match address.ip() {
        IpAddr::V4(ip) => {
            let mut bytes = Vec::with_capacity(IPV4_RECORD_LEN);
            bytes.extend_from_slice(&ip.octets());
            bytes
        }
        IpAddr::V6(ip) => {
            let mut bytes = Vec::with_capacity(IPV6_RECORD_LEN);
            bytes.extend_from_slice(&ip.octets());
            bytes
        }
    };

    bytes.extend_from_slice(&address.port().to_be_bytes());
    bytes
}

pub fn encode_ipv4_batch(peers: &[SocketAddrV4]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(peers.len() * IPV4_RECORD_LEN);
    for peer in peers {
        bytes.extend_from_slice(&peer.ip().octets());
        bytes.extend_from_slice(&peer.port().to_be_bytes());
    }
    bytes
}

pub fn encode_ipv6_batch(peers: &[SocketAddrV6]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(peers.len() * IPV6_RECORD_LEN);
    for peer in peers {
        bytes.extend_from_slice(&peer.ip().octets());
        bytes.extend_from_slice(&peer.port().to_be_bytes());
    }
    bytes
}

fn check_framing(bytes: &[u8], record_len: usize) -> Result<()> {
    if bytes.len() % record_len != 0 {
        return Err(Error::Framing {
            record_len,
            len: bytes.len(),
        });
    }

    Ok(())
}

fn port(bytes: &[u8]) -> u16 {
    u16::from_be_bytes([bytes[0], bytes[1]])
}
