//! One bounded iteration of wait, receive and process.

use std::io;
use std::time::Duration;

use rand::Rng;
use tracing::{debug, trace, warn};

use crate::engine::token::EngineCall;
use crate::engine::{Datagram, Engine, EngineError};
use crate::{Error, Result};

use super::bridge::EventBridge;
use super::socket::{Readiness, RECV_BUFFER_SIZE};
use super::{configured_mut, Session, Sockets};

/// Next deadline after the engine fails in a way the next tick can recover from.
pub const MIN_RETRY_INTERVAL: Duration = Duration::from_secs(1);

/// Up to one second of jitter, so independent nodes don't retransmit in lockstep.
const MAX_JITTER_MICROS: u64 = 1_000_000;

impl<E: Engine> Session<E> {
    /// Wait for a datagram until the engine's deadline (plus jitter), then run the
    /// engine's periodic processing once, with the datagram if one arrived.
    ///
    /// Event handlers are called from inside this method.
    ///
    /// Returns how soon the next tick should run. Callers loop on it:
    ///
    /// ```ignore
    /// loop {
    ///     session.tick()?;
    /// }
    /// ```
    ///
    /// A signal interrupting the wait ends the tick without calling the engine.
    pub fn tick(&mut self) -> Result<Duration> {
        self.tick_with(Sockets::wait_readable)
    }

    pub(crate) fn tick_with<W>(&mut self, wait: W) -> Result<Duration>
    where
        W: FnOnce(&mut Sockets, Duration) -> io::Result<Readiness>,
    {
        let configured = configured_mut(&mut self.state)?;
        let _call = EngineCall::enter()?;

        let timeout = jittered(self.next_wake, &mut self.rng);
        trace!(context = "tick", ?timeout, "Waiting for datagrams");

        let mut wait_failed = false;
        let readiness = match wait(&mut configured.sockets, timeout) {
            Ok(readiness) => readiness,
            Err(ref e) if e.kind() == io::ErrorKind::Interrupted => {
                trace!(context = "tick", "Wait interrupted by a signal");
                return Ok(self.next_wake);
            }
            Err(error) => {
                warn!(?error, "Waiting on sockets failed");
                wait_failed = true;
                Readiness::default()
            }
        };

        let mut buf = [0u8; RECV_BUFFER_SIZE];
        let received = configured.sockets.recv_from(readiness, &mut buf);
        let sockets = &configured.sockets;

        let input = match received {
            Some((_, from)) if self.blacklist.contains(&from.ip()) => {
                debug!(?from, "Dropped datagram from blacklisted address");
                None
            }
            Some((amt, from)) => {
                trace!(context = "socket_message_receiving", ?from, amt);
                Some(Datagram {
                    bytes: &buf[..amt],
                    from,
                })
            }
            None => None,
        };

        let mut bridge = EventBridge::new(&mut *self.handler);
        let result = self
            .engine
            .periodic(sockets, input, &mut self.next_wake, &mut bridge);

        // A failing wait returns at once, don't let the caller spin on it.
        if wait_failed {
            self.next_wake = self.next_wake.max(MIN_RETRY_INTERVAL);
        }

        match result {
            Ok(()) | Err(EngineError::Interrupted) => {}
            Err(error) if error.is_fatal() => return Err(Error::ProtocolEngine(error)),
            Err(error) => {
                debug!(?error, "Engine periodic failed, retrying soon");
                self.next_wake = MIN_RETRY_INTERVAL;
            }
        }

        bridge.finish()?;

        Ok(self.next_wake)
    }
}

/// `next_wake` plus a uniform jitter in `[0, 1)` second.
pub(crate) fn jittered<R: Rng>(next_wake: Duration, rng: &mut R) -> Duration {
    next_wake.saturating_add(Duration::from_micros(rng.gen_range(0..MAX_JITTER_MICROS)))
}
