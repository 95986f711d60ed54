#![doc = include_str!("../README.md")]
//! ## Feature flags
#![doc = document_features::document_features!()]
//!

// Public modules
mod common;
pub mod engine;
mod error;
pub mod session;

pub use crate::common::{compact, hash, random_bytes, Id, ID_SIZE};
pub use bytes::Bytes;
pub use engine::{Engine, EngineError, EventKind, NodeCounts};
pub use error::{Error, Result};
pub use session::{
    Config, Event, EventHandler, Families, Family, Info, Session, Sockets,
    DEFAULT_BOOTSTRAP_NODES,
};
