use std::net::SocketAddr;
use std::time::Duration;

use crate::common::Id;
use crate::engine::Engine;

use super::{Families, Session};

/// Information about a configured session.
#[derive(Debug, Clone)]
pub struct Info {
    id: Id,
    port: u16,
    families: Families,
    local_addrs: Vec<SocketAddr>,
    next_wake: Duration,
}

impl Info {
    /// This node's [Id]
    pub fn id(&self) -> &Id {
        &self.id
    }
    /// UDP port shared by both sockets.
    pub fn port(&self) -> u16 {
        self.port
    }
    /// Families with an open socket, which may be fewer than requested.
    pub fn families(&self) -> Families {
        self.families
    }
    /// Local addresses the sockets are listening on.
    pub fn local_addrs(&self) -> &[SocketAddr] {
        &self.local_addrs
    }
    /// Deadline the engine asked for before the next tick, without jitter.
    pub fn next_wake(&self) -> Duration {
        self.next_wake
    }
}

impl<E: Engine> Session<E> {
    /// Snapshot of this session, `None` unless configured.
    pub fn info(&self) -> Option<Info> {
        let configured = self.configured()?;

        Some(Info {
            id: configured.id,
            port: configured.sockets.port(),
            families: configured.sockets.families(),
            local_addrs: configured.sockets.local_addrs(),
            next_wake: self.next_wake,
        })
    }
}
