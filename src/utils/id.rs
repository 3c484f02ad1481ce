//! Random identifiers for sessions and messages.
//!
//! Generates 21-character URL-safe ids from OS entropy. The length and
//! alphabet match the ids already present in persisted chat state, so
//! fresh ids sort and dedupe alongside imported ones.

const ID_LEN: usize = 21;
const ALPHABET: &[u8; 64] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789_-";

/// Generate a fresh random identifier.
///
/// Falls back to a timestamp-seeded generator if the OS entropy source is
/// unavailable; ids must keep flowing even on exotic platforms.
pub fn new_id() -> String {
    let mut bytes = [0u8; ID_LEN];
    if getrandom::fill(&mut bytes).is_err() {
        let mut seed = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or(0x9e3779b97f4a7c15);
        for byte in bytes.iter_mut() {
            seed = seed
                .wrapping_mul(6364136223846793005)
                .wrapping_add(1442695040888963407);
            *byte = (seed >> 33) as u8;
        }
    }

    bytes
        .iter()
        .map(|b| ALPHABET[(b & 63) as usize] as char)
        .collect()
}
