//! Host services offered to the engine: randomness and hashing.

use rand::rngs::{OsRng, StdRng};
use rand::{RngCore, SeedableRng};
use tracing::debug;

/// Fill `buf` with random bytes.
///
/// Reads from the operating system's CSPRNG, and falls back to the thread local
/// generator (itself seeded from the OS) if that source is unavailable.
pub fn random_bytes(buf: &mut [u8]) {
    if let Err(error) = OsRng.try_fill_bytes(buf) {
        debug!(?error, "OS random source failed, falling back to thread_rng");
        rand::thread_rng().fill_bytes(buf);
    }
}

/// SHA-1 over the concatenation of `parts`.
///
/// Engines use this to derive search tokens from a secret and a requester address.
pub fn hash(parts: &[&[u8]]) -> [u8; 20] {
    let mut sha1 = sha1_smol::Sha1::new();
    for part in parts {
        sha1.update(part);
    }

    sha1.digest().bytes()
}

/// A generator seeded once from [random_bytes], used for scheduling jitter.
pub(crate) fn seeded_rng() -> StdRng {
    let mut seed = <StdRng as SeedableRng>::Seed::default();
    random_bytes(&mut seed);

    StdRng::from_seed(seed)
}
