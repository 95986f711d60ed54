//! Process-wide ownership of the engine.

use std::sync::atomic::{AtomicBool, Ordering};

use crate::{Error, Result};

static CONFIGURED: AtomicBool = AtomicBool::new(false);
static IN_CALL: AtomicBool = AtomicBool::new(false);

/// Held by the one configured session. Dropping it lets another session configure.
#[derive(Debug)]
pub(crate) struct EngineToken(());

impl EngineToken {
    pub(crate) fn acquire() -> Result<Self> {
        CONFIGURED
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map(|_| EngineToken(()))
            .map_err(|_| Error::EngineInUse)
    }
}

impl Drop for EngineToken {
    fn drop(&mut self) {
        CONFIGURED.store(false, Ordering::Release);
    }
}

/// Marks an engine call in progress for as long as it is alive.
///
/// Sessions already take `&mut self` for engine calls. This catches overlapping
/// calls into the process-wide engine that get past that, and fails them with
/// [Error::Reentrant].
#[derive(Debug)]
pub(crate) struct EngineCall(());

impl EngineCall {
    pub(crate) fn enter() -> Result<Self> {
        IN_CALL
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map(|_| EngineCall(()))
            .map_err(|_| Error::Reentrant)
    }
}

impl Drop for EngineCall {
    fn drop(&mut self) {
        IN_CALL.store(false, Ordering::Release);
    }
}
