//! Main Crate Error

use crate::engine::EngineError;
use crate::session::Family;

#[derive(thiserror::Error, Debug)]
/// Jcdht crate error enum.
pub enum Error {
    /// Neither of the enabled families could get a datagram socket.
    #[error("Error creating sockets: {0}")]
    SocketCreation(#[source] std::io::Error),

    /// A created socket could not be configured or bound to the wildcard address.
    #[error("Error binding {family} socket: {source}")]
    Bind {
        family: Family,
        #[source]
        source: std::io::Error,
    },

    /// The wrapped engine refused to initialize.
    #[error("Error initializing DHT: {0}")]
    EngineInit(EngineError),

    /// Another session currently holds the process-wide engine.
    #[error("Another session is already configured in this process")]
    EngineInUse,

    /// An engine-entering call was made while another engine call is still running.
    #[error("Reentrant call into the DHT engine")]
    Reentrant,

    /// The session is not configured, or was already closed.
    #[error("jcdht session is not configured or was closed")]
    SessionClosed,

    /// A compact peer batch whose length is not a multiple of the record width.
    #[error("Wrong number of bytes for compact peers ({len} is not a multiple of {record_len})")]
    Framing { record_len: usize, len: usize },

    /// A single compact record that is neither 6 (IPv4) nor 18 (IPv6) bytes long.
    #[error("Compact record of {0} bytes, expected 6 or 18")]
    RecordLength(usize),

    /// Address could not be parsed as IPv4 or IPv6, or its port is out of range.
    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(&'static str),

    /// Id must be exactly 20 bytes.
    #[error("Invalid Id size, expected 20, got {0}")]
    InvalidIdSize(usize),

    /// The wrapped engine reported an unrecoverable fault.
    #[error("DHT engine failure: {0}")]
    ProtocolEngine(EngineError),
}

/// Alias for `Result<T, Error>`.
pub type Result<T, E = Error> = core::result::Result<T, E>;
