//! Miscellaneous common structs used throughout the library.

pub mod compact;
mod id;
mod random;

pub use id::*;
pub use random::*;
