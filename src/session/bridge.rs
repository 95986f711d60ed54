//! Conversion of engine events into decoded [Event]s for the caller's handler.

use std::net::{SocketAddr, SocketAddrV4, SocketAddrV6};

use tracing::debug;

use crate::common::compact::{decode_ipv4_batch, decode_ipv6_batch};
use crate::common::Id;
use crate::engine::{EventKind, EventSink};
use crate::Error;

/// An event raised by the engine about a searched info-hash.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    None,
    /// Peers found for the info-hash over IPv4.
    ValuesV4(Vec<SocketAddrV4>),
    /// Peers found for the info-hash over IPv6.
    ValuesV6(Vec<SocketAddrV6>),
    SearchDoneV4,
    SearchDoneV6,
}

impl Event {
    pub fn kind(&self) -> EventKind {
        match self {
            Event::None => EventKind::None,
            Event::ValuesV4(_) => EventKind::Values,
            Event::ValuesV6(_) => EventKind::Values6,
            Event::SearchDoneV4 => EventKind::SearchDone,
            Event::SearchDoneV6 => EventKind::SearchDone6,
        }
    }

    /// Decoded peers, empty for anything but values events.
    pub fn peers(&self) -> Vec<SocketAddr> {
        match self {
            Event::ValuesV4(peers) => peers.iter().copied().map(SocketAddr::V4).collect(),
            Event::ValuesV6(peers) => peers.iter().copied().map(SocketAddr::V6).collect(),
            _ => vec![],
        }
    }

    /// Decode the compact payload of an engine event.
    pub fn decode(kind: EventKind, data: &[u8]) -> Result<Event, Error> {
        Ok(match kind {
            EventKind::None => Event::None,
            EventKind::Values => Event::ValuesV4(decode_ipv4_batch(data)?),
            EventKind::Values6 => Event::ValuesV6(decode_ipv6_batch(data)?),
            EventKind::SearchDone => Event::SearchDoneV4,
            EventKind::SearchDone6 => Event::SearchDoneV6,
        })
    }
}

/// Caller supplied receiver of [Event]s.
///
/// Handlers run inside [crate::Session::tick] (or [crate::Session::search]) and must
/// not block.
pub trait EventHandler {
    fn on_event(&mut self, info_hash: Id, event: Event);
}

/// Ignores every event.
impl EventHandler for () {
    fn on_event(&mut self, _info_hash: Id, _event: Event) {}
}

impl<F> EventHandler for F
where
    F: FnMut(Id, Event),
{
    fn on_event(&mut self, info_hash: Id, event: Event) {
        self(info_hash, event)
    }
}

/// Forwards events to a receiver, dropping them if the channel is full or closed.
impl EventHandler for flume::Sender<(Id, Event)> {
    fn on_event(&mut self, info_hash: Id, event: Event) {
        if let Err(error) = self.try_send((info_hash, event)) {
            debug!(?info_hash, ?error, "Dropped event");
        }
    }
}

/// [EventSink] given to the engine for the duration of one call.
///
/// Remembers the first malformed payload instead of delivering it.
pub(crate) struct EventBridge<'a> {
    handler: &'a mut dyn EventHandler,
    error: Option<Error>,
}

impl<'a> EventBridge<'a> {
    pub(crate) fn new(handler: &'a mut dyn EventHandler) -> Self {
        Self {
            handler,
            error: None,
        }
    }

    /// The first framing error seen during the call, if any.
    pub(crate) fn finish(self) -> Result<(), Error> {
        match self.error {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

impl EventSink for EventBridge<'_> {
    fn emit(&mut self, kind: EventKind, info_hash: &Id, data: &[u8]) {
        match Event::decode(kind, data) {
            Ok(event) => self.handler.on_event(*info_hash, event),
            Err(error) => {
                debug!(?kind, ?info_hash, ?error, "Malformed peers in event");
                if self.error.is_none() {
                    self.error = Some(error);
                }
            }
        }
    }
}
