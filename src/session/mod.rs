//! Session driving one DHT node: sockets, lifecycle and the operations forwarded
//! to the engine.

mod bridge;
mod config;
mod info;
pub(crate) mod socket;
mod tick;

use std::fmt::{self, Debug, Formatter};
use std::mem;
use std::net::{IpAddr, SocketAddr, SocketAddrV4, SocketAddrV6, ToSocketAddrs};
use std::time::Duration;

use rand::rngs::StdRng;
use tracing::{debug, warn};

use crate::common::{compact, seeded_rng, Id};
use crate::engine::token::{EngineCall, EngineToken};
use crate::engine::{Engine, EngineError, NodeCounts};
use crate::{Error, Result};

pub use bridge::{Event, EventHandler};
pub use config::{Config, Families, Family, DEFAULT_PORT};
pub use info::Info;
pub use socket::{Sockets, RECV_BUFFER_SIZE};
pub use tick::MIN_RETRY_INTERVAL;

use bridge::EventBridge;

pub const DEFAULT_BOOTSTRAP_NODES: [&str; 4] = [
    "router.bittorrent.com:6881",
    "dht.transmissionbt.com:6881",
    "dht.libtorrent.org:25401",
    "router.utorrent.com:6881",
];

/// A DHT node driven by the caller through [Session::tick].
///
/// A session starts unconfigured, becomes configured once its sockets are bound
/// and the engine initialized, and is closed by [Session::close] or on drop.
/// Closed is terminal.
///
/// The engine is process-wide: while a session is configured, configuring another
/// one fails with [Error::EngineInUse].
pub struct Session<E: Engine> {
    engine: E,
    state: State,
    handler: Box<dyn EventHandler>,
    /// How soon the engine wants the next tick, before jitter.
    next_wake: Duration,
    rng: StdRng,
    blacklist: Vec<IpAddr>,
}

enum State {
    Unconfigured,
    Configured(Configured),
    Closed,
}

struct Configured {
    id: Id,
    sockets: Sockets,
    // Released last, after the sockets are closed.
    _token: EngineToken,
}

impl<E: Engine> Session<E> {
    /// Create an unconfigured session around `engine`.
    pub fn new(engine: E) -> Self {
        Session {
            engine,
            state: State::Unconfigured,
            handler: Box::new(()),
            next_wake: Duration::ZERO,
            rng: seeded_rng(),
            blacklist: vec![],
        }
    }

    /// Create and configure a session in one step.
    pub fn with_config(engine: E, config: Config) -> Result<Self> {
        let mut session = Session::new(engine);
        session.configure(config)?;

        Ok(session)
    }

    // === Options ===

    pub fn with_handler<H: EventHandler + 'static>(mut self, handler: H) -> Self {
        self.handler = Box::new(handler);
        self
    }

    /// Replace the event handler. The default one ignores every event.
    pub fn set_handler<H: EventHandler + 'static>(&mut self, handler: H) {
        self.handler = Box::new(handler);
    }

    // === Getters ===

    /// Node [Id], once configured.
    pub fn id(&self) -> Option<&Id> {
        self.configured().map(|configured| &configured.id)
    }

    /// Sockets, once configured.
    pub fn sockets(&self) -> Option<&Sockets> {
        self.configured().map(|configured| &configured.sockets)
    }

    pub fn is_configured(&self) -> bool {
        matches!(self.state, State::Configured(_))
    }

    pub fn is_closed(&self) -> bool {
        matches!(self.state, State::Closed)
    }

    /// Deadline the engine asked for before the next tick, without jitter.
    pub fn next_wake(&self) -> Duration {
        self.next_wake
    }

    // === Public Methods ===

    /// Bind the sockets and initialize the engine.
    ///
    /// Returns the families that actually got a socket: if both are enabled and only
    /// one socket could be created, the session runs on that family alone.
    ///
    /// On failure the session stays unconfigured and may be configured again.
    pub fn configure(&mut self, config: Config) -> Result<Families> {
        self.configure_with(config, Sockets::bind)
    }

    pub(crate) fn configure_with<F>(&mut self, config: Config, bind: F) -> Result<Families>
    where
        F: FnOnce(Families, u16) -> Result<Sockets>,
    {
        match self.state {
            State::Unconfigured => {}
            State::Configured(_) => {
                return Err(Error::InvalidArgument("session is already configured"))
            }
            State::Closed => return Err(Error::SessionClosed),
        }

        if config.port == 0 {
            return Err(Error::InvalidArgument("port must be in 1..=65535"));
        }
        if config.families.is_empty() {
            return Err(Error::InvalidArgument(
                "at least one address family must be enabled",
            ));
        }

        let token = EngineToken::acquire()?;
        let sockets = bind(config.families, config.port)?;

        let id = config.id.unwrap_or_else(Id::random);

        {
            let _call = EngineCall::enter()?;
            self.engine
                .init(&sockets, id)
                .map_err(Error::EngineInit)?;
        }

        let families = sockets.families();
        if families != config.families {
            warn!(
                requested = ?config.families,
                active = ?families,
                "Running on a single address family"
            );
        }
        debug!(?id, port = config.port, ?families, "Configured session");

        self.blacklist = config.blacklist;
        self.next_wake = Duration::ZERO;
        self.state = State::Configured(Configured {
            id,
            sockets,
            _token: token,
        });

        Ok(families)
    }

    /// Ping `address`:`port`, the textual form of an IPv4 or IPv6 address.
    ///
    /// Returns whether the engine accepted the probe for sending, not whether the
    /// node replied.
    pub fn ping(&mut self, address: &str, port: u16) -> Result<bool> {
        configured(&self.state)?;
        let address = compact::parse_address(address, port)?;

        self.ping_addr(address)
    }

    /// Same as [Session::ping] with a resolved address.
    pub fn ping_addr(&mut self, address: SocketAddr) -> Result<bool> {
        let configured = configured(&self.state)?;

        if self.blacklist.contains(&address.ip()) {
            debug!(?address, "Refusing to ping blacklisted address");
            return Ok(false);
        }
        if configured.sockets.get(Family::of(&address)).is_none() {
            debug!(?address, "No socket for this address family");
            return Ok(false);
        }

        let _call = EngineCall::enter()?;

        match self.engine.ping_node(&configured.sockets, address) {
            Ok(()) => Ok(true),
            Err(error) if error.is_fatal() => Err(Error::ProtocolEngine(error)),
            Err(error) => {
                debug!(?address, ?error, "Ping not sent");
                Ok(false)
            }
        }
    }

    /// Resolve `host:port` entries and ping every address of an open family.
    ///
    /// Returns how many pings were accepted. Entries that fail to resolve are skipped.
    pub fn bootstrap<T: AsRef<str>>(&mut self, nodes: &[T]) -> Result<usize> {
        let families = configured(&self.state)?.sockets.families();
        let mut accepted = 0;

        for node in nodes {
            let node = node.as_ref();
            let addresses = match node.to_socket_addrs() {
                Ok(addresses) => addresses,
                Err(error) => {
                    debug!(?node, ?error, "Could not resolve bootstrap node");
                    continue;
                }
            };

            for address in addresses.filter(|address| families.contains(Family::of(address))) {
                if self.ping_addr(address)? {
                    accepted += 1;
                }
            }
        }

        Ok(accepted)
    }

    /// Search for peers of `info_hash` on every open family, announcing
    /// `announce_port` as well unless it is `0`.
    ///
    /// Returns `false` if the engine refused a search, most likely because too many
    /// searches are already running.
    pub fn search(&mut self, info_hash: Id, announce_port: u16) -> Result<bool> {
        let configured = configured(&self.state)?;
        let _call = EngineCall::enter()?;

        let mut bridge = EventBridge::new(&mut *self.handler);
        let mut accepted = true;

        for family in configured.sockets.families().iter() {
            match self.engine.search(
                &configured.sockets,
                info_hash,
                announce_port,
                family,
                &mut bridge,
            ) {
                Ok(()) => {}
                Err(error) if error.is_fatal() => return Err(Error::ProtocolEngine(error)),
                Err(EngineError::CapacityExhausted) => {
                    debug!(?info_hash, %family, "Too many searches");
                    accepted = false;
                }
                Err(error) => {
                    debug!(?info_hash, %family, ?error, "Search not started");
                    accepted = false;
                }
            }
        }

        bridge.finish()?;

        Ok(accepted)
    }

    /// Good, dubious, cached and incoming node counts for `family`.
    pub fn node_counts(&self, family: Family) -> Result<NodeCounts> {
        configured(&self.state)?;

        Ok(self.engine.node_counts(family))
    }

    /// Good nodes known to the engine, IPv4 and IPv6.
    pub fn known_nodes(&self) -> Result<(Vec<SocketAddrV4>, Vec<SocketAddrV6>)> {
        configured(&self.state)?;
        let known = self.engine.known_nodes();

        Ok((
            compact::decode_ipv4_batch(&known.v4)?,
            compact::decode_ipv6_batch(&known.v6)?,
        ))
    }

    /// Uninitialize the engine and close the sockets.
    ///
    /// Any later operation fails with [Error::SessionClosed]. Closing twice is a no-op.
    pub fn close(&mut self) {
        if let State::Configured(configured) = mem::replace(&mut self.state, State::Closed) {
            self.engine.uninit();
            drop(configured);

            debug!("Closed session");
        }
    }

    // === Private Methods ===

    fn configured(&self) -> Option<&Configured> {
        configured(&self.state).ok()
    }
}

fn configured(state: &State) -> Result<&Configured> {
    match state {
        State::Configured(configured) => Ok(configured),
        _ => Err(Error::SessionClosed),
    }
}

fn configured_mut(state: &mut State) -> Result<&mut Configured> {
    match state {
        State::Configured(configured) => Ok(configured),
        _ => Err(Error::SessionClosed),
    }
}

impl<E: Engine> Drop for Session<E> {
    fn drop(&mut self) {
        self.close();
    }
}

impl<E: Engine> Debug for Session<E> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let state = match &self.state {
            State::Unconfigured => "Unconfigured",
            State::Configured(_) => "Configured",
            State::Closed => "Closed",
        };

        f.debug_struct("Session")
            .field("engine", &self.engine)
            .field("state", &state)
            .field("id", &self.id())
            .field("sockets", &self.sockets())
            .field("next_wake", &self.next_wake)
            .finish()
    }
}
