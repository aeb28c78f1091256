//! Lease identifier generation and format checks.

use uuid::{Builder, Uuid};

/// Generates a fresh random lease id (hyphenated UUID v4).
pub fn new_lease_id() -> String {
   Uuid::new_v4().hyphenated().to_string()
}

/// Builds a v4 lease id from caller-supplied entropy.
///
/// Deterministic for a given input, so tests and callers with their own
/// randomness source do not depend on the process RNG.
pub fn lease_id_from_entropy(entropy: [u8; 16]) -> String {
   Builder::from_random_bytes(entropy)
      .into_uuid()
      .hyphenated()
      .to_string()
}

/// Returns true if `id` is in the GUID format the service accepts for
/// proposed lease ids.
pub fn is_guid(id: &str) -> bool {
   id.len() == 36 && Uuid::try_parse(id).is_ok()
}
