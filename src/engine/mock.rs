//! Scripted engine for unit tests.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::net::SocketAddr;
use std::rc::Rc;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use crate::common::Id;
use crate::session::{Family, Sockets};

use super::{Datagram, Engine, EngineError, EventKind, EventSink, KnownNodes, NodeCounts};

static SERIAL: Mutex<()> = Mutex::new(());

/// The engine is process-wide, tests touching it must not overlap.
pub(crate) fn serial() -> MutexGuard<'static, ()> {
    SERIAL.lock().unwrap_or_else(|e| e.into_inner())
}

#[derive(Debug, Default)]
pub(crate) struct Script {
    // Behaviour
    pub fail_init: Option<EngineError>,
    pub next_wake: Duration,
    pub events: Vec<(EventKind, Id, Vec<u8>)>,
    pub periodic_results: VecDeque<Result<(), EngineError>>,
    pub search_capacity: usize,
    pub known: KnownNodes,
    pub counts: NodeCounts,

    // Observations
    pub init_id: Option<Id>,
    pub init_families: Option<(bool, bool)>,
    pub inputs: Vec<Option<(Vec<u8>, SocketAddr)>>,
    pub searches: Vec<(Id, u16, Family)>,
    pub pings: Vec<SocketAddr>,
    pub uninits: usize,
}

#[derive(Debug, Clone, Default)]
pub(crate) struct MockEngine(pub Rc<RefCell<Script>>);

impl MockEngine {
    pub(crate) fn new() -> (Self, Rc<RefCell<Script>>) {
        let script = Rc::new(RefCell::new(Script {
            next_wake: Duration::from_secs(2),
            search_capacity: usize::MAX,
            ..Default::default()
        }));

        (MockEngine(script.clone()), script)
    }
}

impl Engine for MockEngine {
    fn init(&mut self, sockets: &Sockets, id: Id) -> Result<(), EngineError> {
        let mut script = self.0.borrow_mut();
        if let Some(error) = script.fail_init.clone() {
            return Err(error);
        }

        script.init_id = Some(id);
        script.init_families = Some((sockets.v4().is_some(), sockets.v6().is_some()));
        Ok(())
    }

    fn periodic(
        &mut self,
        _sockets: &Sockets,
        input: Option<Datagram<'_>>,
        next_wake: &mut Duration,
        events: &mut dyn EventSink,
    ) -> Result<(), EngineError> {
        let mut script = self.0.borrow_mut();

        script
            .inputs
            .push(input.map(|datagram| (datagram.bytes.to_vec(), datagram.from)));

        for (kind, info_hash, data) in script.events.drain(..) {
            events.emit(kind, &info_hash, &data);
        }

        *next_wake = script.next_wake;
        script.periodic_results.pop_front().unwrap_or(Ok(()))
    }

    fn search(
        &mut self,
        _sockets: &Sockets,
        info_hash: Id,
        announce_port: u16,
        family: Family,
        _events: &mut dyn EventSink,
    ) -> Result<(), EngineError> {
        let mut script = self.0.borrow_mut();
        if script.search_capacity == 0 {
            return Err(EngineError::CapacityExhausted);
        }

        script.search_capacity -= 1;
        script.searches.push((info_hash, announce_port, family));
        Ok(())
    }

    fn ping_node(&mut self, _sockets: &Sockets, address: SocketAddr) -> Result<(), EngineError> {
        self.0.borrow_mut().pings.push(address);
        Ok(())
    }

    fn node_counts(&self, _family: Family) -> NodeCounts {
        self.0.borrow().counts
    }

    fn known_nodes(&self) -> KnownNodes {
        self.0.borrow().known.clone()
    }

    fn uninit(&mut self) {
        self.0.borrow_mut().uninits += 1;
    }
}
