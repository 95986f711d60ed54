//! Dual-stack UDP sockets owned by a session.

use std::io;
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};
use std::time::Duration;

use mio::net::UdpSocket;
use mio::{Events, Interest, Poll, Token};
use socket2::{Domain, Protocol, Socket, Type};
use tracing::{debug, trace, warn};

use crate::{Error, Result};

use super::{Families, Family};

/// Datagrams larger than this are truncated.
pub const RECV_BUFFER_SIZE: usize = 4096;

const V4_TOKEN: Token = Token(0);
const V6_TOKEN: Token = Token(1);

/// One UDP socket per enabled family, both bound to the same port.
///
/// The IPv6 socket is IPv6-only, so the two never share address space.
#[derive(Debug)]
pub struct Sockets {
    v4: Option<UdpSocket>,
    v6: Option<UdpSocket>,
    port: u16,
    poll: Poll,
    events: Events,
    /// Sockets seen readable and not yet drained, since readiness is edge triggered.
    pending: Readiness,
}

/// Which sockets have datagrams waiting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct Readiness {
    pub v4: bool,
    pub v6: bool,
}

impl Readiness {
    pub(crate) fn any(&self) -> bool {
        self.v4 || self.v6
    }

    fn get(&self, family: Family) -> bool {
        match family {
            Family::V4 => self.v4,
            Family::V6 => self.v6,
        }
    }

    fn set(&mut self, family: Family, ready: bool) {
        match family {
            Family::V4 => self.v4 = ready,
            Family::V6 => self.v6 = ready,
        }
    }
}

impl Sockets {
    /// Create and bind a socket per family in `families`.
    ///
    /// A family whose socket cannot be created is skipped, as long as the other one
    /// succeeds. A created socket that cannot be bound fails the whole call.
    pub(crate) fn bind(families: Families, port: u16) -> Result<Self> {
        Self::bind_with(families, port, create)
    }

    pub(crate) fn bind_with<F>(families: Families, port: u16, mut create: F) -> Result<Self>
    where
        F: FnMut(Family) -> io::Result<Socket>,
    {
        let mut created = Vec::with_capacity(2);
        let mut last_error = None;

        for family in families.iter() {
            match create(family) {
                Ok(socket) => created.push((family, socket)),
                Err(error) => {
                    warn!(%family, ?error, "Could not create socket");
                    last_error = Some(error);
                }
            }
        }

        if created.is_empty() {
            let error = last_error.unwrap_or_else(|| {
                io::Error::new(io::ErrorKind::InvalidInput, "no address family enabled")
            });
            return Err(Error::SocketCreation(error));
        }

        let mut sockets = Sockets {
            v4: None,
            v6: None,
            port,
            poll: Poll::new().map_err(Error::SocketCreation)?,
            events: Events::with_capacity(2),
            pending: Readiness::default(),
        };

        for (family, socket) in created {
            let mut socket =
                setup(family, socket, port).map_err(|source| Error::Bind { family, source })?;

            let token = match family {
                Family::V4 => V4_TOKEN,
                Family::V6 => V6_TOKEN,
            };
            sockets
                .poll
                .registry()
                .register(&mut socket, token, Interest::READABLE)
                .map_err(|source| Error::Bind { family, source })?;

            debug!(%family, port, "Bound socket");

            match family {
                Family::V4 => sockets.v4 = Some(socket),
                Family::V6 => sockets.v6 = Some(socket),
            }
        }

        Ok(sockets)
    }

    // === Getters ===

    pub fn v4(&self) -> Option<&UdpSocket> {
        self.v4.as_ref()
    }

    pub fn v6(&self) -> Option<&UdpSocket> {
        self.v6.as_ref()
    }

    pub fn get(&self, family: Family) -> Option<&UdpSocket> {
        match family {
            Family::V4 => self.v4(),
            Family::V6 => self.v6(),
        }
    }

    /// Families with an open socket.
    pub fn families(&self) -> Families {
        Families {
            ipv4: self.v4.is_some(),
            ipv6: self.v6.is_some(),
        }
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Local addresses of the open sockets, IPv4 first.
    pub fn local_addrs(&self) -> Vec<SocketAddr> {
        self.v4
            .iter()
            .chain(self.v6.iter())
            .filter_map(|socket| socket.local_addr().ok())
            .collect()
    }

    /// Raw descriptors of the IPv4 and IPv6 sockets, for engines that wrap a C library.
    #[cfg(all(unix, feature = "raw-fds"))]
    pub fn raw_fds(&self) -> (Option<std::os::fd::RawFd>, Option<std::os::fd::RawFd>) {
        use std::os::fd::AsRawFd;

        (
            self.v4.as_ref().map(|socket| socket.as_raw_fd()),
            self.v6.as_ref().map(|socket| socket.as_raw_fd()),
        )
    }

    // === Public Methods ===

    /// Send `buf` to `address` through the socket of the matching family.
    pub fn send_to(&self, buf: &[u8], address: SocketAddr) -> io::Result<usize> {
        let family = Family::of(&address);

        match self.get(family) {
            Some(socket) => socket.send_to(buf, address),
            None => Err(io::Error::new(
                io::ErrorKind::Unsupported,
                format!("no {family} socket is open"),
            )),
        }
    }

    // === Private Methods ===

    /// Block until an open socket is readable, or `timeout` elapses.
    ///
    /// Returns at once if a socket still has datagrams from an earlier wakeup.
    pub(crate) fn wait_readable(&mut self, timeout: Duration) -> io::Result<Readiness> {
        let timeout = if self.pending.any() {
            Duration::ZERO
        } else {
            timeout
        };

        self.poll.poll(&mut self.events, Some(timeout))?;

        for event in self.events.iter() {
            if !(event.is_readable() || event.is_error()) {
                continue;
            }

            match event.token() {
                V4_TOKEN => self.pending.v4 = true,
                V6_TOKEN => self.pending.v6 = true,
                _ => {}
            }
        }

        Ok(self.pending)
    }

    /// Receive one datagram from a ready socket, IPv4 first when both are ready.
    pub(crate) fn recv_from(
        &mut self,
        readiness: Readiness,
        buf: &mut [u8],
    ) -> Option<(usize, SocketAddr)> {
        for family in [Family::V4, Family::V6] {
            if !readiness.get(family) {
                continue;
            }

            let result = match self.get(family) {
                Some(socket) => socket.recv_from(buf),
                None => Err(io::ErrorKind::WouldBlock.into()),
            };

            match result {
                Ok((amt, from)) => return Some((amt, from)),
                Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => {
                    trace!(context = "socket_validation", %family, "Drained");
                    self.pending.set(family, false);
                }
                Err(e) => {
                    trace!(
                        context = "socket_error",
                        ?e,
                        "recv_from failed unexpectedly"
                    );
                    return None;
                }
            }
        }

        None
    }
}

/// Create an unbound datagram socket of `family`.
pub(crate) fn create(family: Family) -> io::Result<Socket> {
    let domain = match family {
        Family::V4 => Domain::IPV4,
        Family::V6 => Domain::IPV6,
    };

    Socket::new(domain, Type::DGRAM, Some(Protocol::UDP))
}

fn setup(family: Family, socket: Socket, port: u16) -> io::Result<UdpSocket> {
    let address = match family {
        Family::V4 => SocketAddr::from((Ipv4Addr::UNSPECIFIED, port)),
        Family::V6 => {
            socket.set_only_v6(true)?;
            SocketAddr::from((Ipv6Addr::UNSPECIFIED, port))
        }
    };

    socket.bind(&address.into())?;
    socket.set_nonblocking(true)?;

    Ok(UdpSocket::from_std(std::net::UdpSocket::from(socket)))
}

#[cfg(test)]
pub(crate) mod test {
    use super::*;

    pub(crate) fn free_port() -> u16 {
        std::net::UdpSocket::bind("0.0.0.0:0")
            .and_then(|socket| socket.local_addr())
            .map(|addr| addr.port())
            .unwrap()
    }

    pub(crate) fn ipv6_available() -> bool {
        std::net::UdpSocket::bind("[::1]:0").is_ok()
    }

    fn client() -> std::net::UdpSocket {
        std::net::UdpSocket::bind("127.0.0.1:0").unwrap()
    }

    #[test]
    fn bind_ipv4_only() {
        let port = free_port();
        let sockets = Sockets::bind(Families::V4, port).unwrap();

        assert!(sockets.v4().is_some());
        assert!(sockets.v6().is_none());
        assert_eq!(sockets.families(), Families::V4);
        assert_eq!(sockets.local_addrs()[0].port(), port);
    }

    #[test]
    fn bind_both_families_on_same_port() {
        if !ipv6_available() {
            return;
        }

        let port = free_port();
        let sockets = Sockets::bind(Families::BOTH, port).unwrap();

        assert_eq!(sockets.families(), Families::BOTH);
        let addrs = sockets.local_addrs();
        assert_eq!(addrs.len(), 2);
        assert!(addrs[0].is_ipv4());
        assert!(addrs[1].is_ipv6());
        assert!(addrs.iter().all(|addr| addr.port() == port));
    }

    #[test]
    fn degrade_when_one_family_fails() {
        let port = free_port();
        let sockets = Sockets::bind_with(Families::BOTH, port, |family| match family {
            Family::V4 => create(family),
            Family::V6 => Err(io::Error::from(io::ErrorKind::Unsupported)),
        })
        .unwrap();

        assert_eq!(sockets.families(), Families::V4);
    }

    #[test]
    fn fail_when_no_socket_created() {
        let result = Sockets::bind_with(Families::BOTH, free_port(), |_| {
            Err(io::Error::from(io::ErrorKind::Unsupported))
        });

        assert!(matches!(result, Err(Error::SocketCreation(_))));

        let result = Sockets::bind(Families::NONE, free_port());
        assert!(matches!(result, Err(Error::SocketCreation(_))));
    }

    #[test]
    fn fail_when_port_taken() {
        let taken = std::net::UdpSocket::bind("0.0.0.0:0").unwrap();
        let port = taken.local_addr().unwrap().port();

        let result = Sockets::bind(Families::V4, port);

        assert!(matches!(
            result,
            Err(Error::Bind {
                family: Family::V4,
                ..
            })
        ));
    }

    #[test]
    fn wait_then_receive() {
        let mut sockets = Sockets::bind(Families::V4, free_port()).unwrap();
        let readiness = sockets.wait_readable(Duration::from_millis(10)).unwrap();
        assert_eq!(readiness, Readiness::default());

        let client = client();
        client
            .send_to(b"hello", ("127.0.0.1", sockets.port()))
            .unwrap();

        let readiness = sockets.wait_readable(Duration::from_secs(2)).unwrap();
        assert!(readiness.v4);
        assert!(!readiness.v6);

        let mut buf = [0u8; RECV_BUFFER_SIZE];
        let (amt, from) = sockets.recv_from(readiness, &mut buf).unwrap();
        assert_eq!(&buf[..amt], b"hello");
        assert_eq!(from, client.local_addr().unwrap());

        assert!(sockets.recv_from(readiness, &mut buf).is_none());
        assert_eq!(
            sockets.wait_readable(Duration::from_millis(10)).unwrap(),
            Readiness::default()
        );
    }

    #[test]
    fn queued_datagrams_stay_readable() {
        let mut sockets = Sockets::bind(Families::V4, free_port()).unwrap();

        let client = client();
        client.send_to(b"one", ("127.0.0.1", sockets.port())).unwrap();
        client.send_to(b"two", ("127.0.0.1", sockets.port())).unwrap();

        let mut buf = [0u8; RECV_BUFFER_SIZE];
        let mut received = vec![];
        for _ in 0..100 {
            let readiness = sockets.wait_readable(Duration::from_millis(20)).unwrap();
            if let Some((amt, _)) = sockets.recv_from(readiness, &mut buf) {
                received.push(buf[..amt].to_vec());
            }
            if received.len() == 2 {
                break;
            }
        }

        assert_eq!(received, vec![b"one".to_vec(), b"two".to_vec()]);
    }

    #[test]
    fn ipv4_wins_when_both_ready() {
        if !ipv6_available() {
            return;
        }

        let mut sockets = Sockets::bind(Families::BOTH, free_port()).unwrap();

        let client6 = std::net::UdpSocket::bind("[::1]:0").unwrap();
        client6.send_to(b"six", ("::1", sockets.port())).unwrap();
        client().send_to(b"four", ("127.0.0.1", sockets.port())).unwrap();

        let mut readiness = Readiness::default();
        for _ in 0..100 {
            readiness = sockets.wait_readable(Duration::from_millis(20)).unwrap();
            if readiness.v4 && readiness.v6 {
                break;
            }
        }
        assert!(readiness.v4 && readiness.v6);

        let mut buf = [0u8; RECV_BUFFER_SIZE];
        let (amt, _) = sockets.recv_from(readiness, &mut buf).unwrap();
        assert_eq!(&buf[..amt], b"four");
    }

    #[test]
    fn send_to_missing_family() {
        let sockets = Sockets::bind(Families::V4, free_port()).unwrap();

        let error = sockets
            .send_to(b"x", "[::1]:6881".parse().unwrap())
            .unwrap_err();
        assert_eq!(error.kind(), io::ErrorKind::Unsupported);
    }

    #[cfg(all(unix, feature = "raw-fds"))]
    #[test]
    fn raw_fds_match_open_sockets() {
        use std::os::fd::AsRawFd;

        let sockets = Sockets::bind(Families::V4, free_port()).unwrap();

        let (v4, v6) = sockets.raw_fds();
        assert_eq!(v4, Some(sockets.v4().unwrap().as_raw_fd()));
        assert!(v4.unwrap() >= 0);
        assert_eq!(v6, None);
    }
}
