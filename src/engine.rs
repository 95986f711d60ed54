//! The interface to the wrapped DHT engine.
//!
//! The engine owns the routing table, the search protocol and every retry policy.
//! A [crate::Session] only drives it: it hands over datagrams, lets it send through
//! the session's [Sockets], and bridges the events it raises.
//!
//! Engines of this kind keep process-wide state behind global init/uninit entry
//! points, so only one session may hold an initialized engine at a time.

#[cfg(test)]
pub(crate) mod mock;
pub(crate) mod token;

use std::fmt::Debug;
use std::net::SocketAddr;
use std::time::Duration;

use bytes::Bytes;

use crate::common::Id;
use crate::session::{Family, Sockets};

/// A datagram received during a tick, with its origin.
#[derive(Debug, Clone, Copy)]
pub struct Datagram<'a> {
    pub bytes: &'a [u8],
    pub from: SocketAddr,
}

/// Events an engine raises while processing, with their wire level codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    None,
    /// Compact IPv4 peers for a searched info-hash.
    Values,
    /// Compact IPv6 peers for a searched info-hash.
    Values6,
    SearchDone,
    SearchDone6,
}

impl EventKind {
    pub fn code(&self) -> i32 {
        match self {
            EventKind::None => 0,
            EventKind::Values => 1,
            EventKind::Values6 => 2,
            EventKind::SearchDone => 3,
            EventKind::SearchDone6 => 4,
        }
    }
}

impl TryFrom<i32> for EventKind {
    type Error = EngineError;

    fn try_from(code: i32) -> Result<Self, EngineError> {
        Ok(match code {
            0 => EventKind::None,
            1 => EventKind::Values,
            2 => EventKind::Values6,
            3 => EventKind::SearchDone,
            4 => EventKind::SearchDone6,
            _ => return Err(EngineError::InvalidArgument),
        })
    }
}

/// Receiver of the events raised synchronously from inside an engine call.
pub trait EventSink {
    /// `data` is a compact peer batch for [EventKind::Values] and [EventKind::Values6],
    /// and is ignored otherwise.
    fn emit(&mut self, kind: EventKind, info_hash: &Id, data: &[u8]);
}

/// Failures reported by the engine.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    #[error("interrupted")]
    Interrupted,
    #[error("invalid argument")]
    InvalidArgument,
    #[error("bad address")]
    Fault,
    /// Too many concurrent searches.
    #[error("search capacity exhausted")]
    CapacityExhausted,
    #[error("{0}")]
    Other(String),
}

impl EngineError {
    /// Faults in the arguments given to the engine, as opposed to transient failures
    /// that the next tick can recover from.
    pub fn is_fatal(&self) -> bool {
        matches!(self, EngineError::InvalidArgument | EngineError::Fault)
    }
}

/// Routing table population for one address family.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NodeCounts {
    pub good: usize,
    pub dubious: usize,
    pub cached: usize,
    pub incoming: usize,
}

/// Known good nodes as compact batches, one per family.
#[derive(Debug, Clone, Default)]
pub struct KnownNodes {
    pub v4: Bytes,
    pub v6: Bytes,
}

/// The wrapped DHT engine.
///
/// Every method is called from a single thread, never concurrently and never
/// reentrantly. Methods that may transmit get the session's [Sockets].
pub trait Engine: Debug {
    /// Called once the sockets are bound. The sockets are already non-blocking.
    fn init(&mut self, sockets: &Sockets, id: Id) -> Result<(), EngineError>;

    /// Periodic processing, called exactly once per tick.
    ///
    /// `input` is the datagram received during this tick, if any.
    /// `next_wake` holds the previous deadline and must be set to how soon the
    /// engine wants to be called again.
    fn periodic(
        &mut self,
        sockets: &Sockets,
        input: Option<Datagram<'_>>,
        next_wake: &mut Duration,
        events: &mut dyn EventSink,
    ) -> Result<(), EngineError>;

    /// Start a search for `info_hash` on one family, announcing `announce_port`
    /// unless it is `0`.
    ///
    /// Returns [EngineError::CapacityExhausted] if no more searches can be started.
    fn search(
        &mut self,
        sockets: &Sockets,
        info_hash: Id,
        announce_port: u16,
        family: Family,
        events: &mut dyn EventSink,
    ) -> Result<(), EngineError>;

    /// Queue a ping to `address`. Ok means the probe was accepted for sending.
    fn ping_node(&mut self, sockets: &Sockets, address: SocketAddr) -> Result<(), EngineError>;

    fn node_counts(&self, family: Family) -> NodeCounts;

    fn known_nodes(&self) -> KnownNodes;

    /// Release the engine's process-wide state.
    fn uninit(&mut self);
}
