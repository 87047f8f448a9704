//! Session key generation and client address packing.

use std::net::{Ipv4Addr, SocketAddr};

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::Utc;
use rand::RngCore;
use rand::rngs::OsRng;

/// Length of an encoded session key in characters.
pub const SESSION_KEY_LEN: usize = 40;

/// Raw bytes behind a key: 8 bytes of time followed by 22 random bytes.
const RAW_KEY_LEN: usize = 30;
const TIME_PREFIX_LEN: usize = 8;

/// Generates a new session key.
///
/// The first 8 bytes carry the current time in nanoseconds (big-endian) so
/// keys sort roughly by creation time. The remaining 22 bytes come from the
/// OS random source and are what makes the key unguessable. The 30 raw bytes
/// are encoded as unpadded URL-safe base64, giving exactly 40 characters.
///
/// # Example
///
/// ```rust
/// use latchkey::crypto::{generate_session_key, SESSION_KEY_LEN};
///
/// let key = generate_session_key();
/// assert_eq!(key.len(), SESSION_KEY_LEN);
/// ```
pub fn generate_session_key() -> String {
    let mut raw = [0u8; RAW_KEY_LEN];

    let nanos = Utc::now().timestamp_nanos_opt().unwrap_or_default();
    raw[..TIME_PREFIX_LEN].copy_from_slice(&(nanos as u64).to_be_bytes());
    OsRng.fill_bytes(&mut raw[TIME_PREFIX_LEN..]);

    URL_SAFE_NO_PAD.encode(raw)
}

/// Returns true if `value` has the shape of a key produced by
/// [`generate_session_key`].
///
/// Comparison of keys is byte-exact; this only rejects values that could
/// never have been issued.
pub fn is_well_formed_key(value: &str) -> bool {
    value.len() == SESSION_KEY_LEN
        && value
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
}

/// Packs the IPv4 part of a remote address into a big-endian `u32`.
///
/// Accepts `ip:port` or a bare address. Anything that is not IPv4 packs
/// to `0`.
pub fn pack_remote_ip(remote_addr: &str) -> u32 {
    if let Ok(SocketAddr::V4(addr)) = remote_addr.parse::<SocketAddr>() {
        return u32::from(*addr.ip());
    }

    let host = remote_addr
        .split_once(':')
        .map_or(remote_addr, |(host, _)| host);

    host.parse::<Ipv4Addr>().map(u32::from).unwrap_or(0)
}

/// Unpacks an address stored by [`pack_remote_ip`].
pub fn unpack_ip(ip: u32) -> Ipv4Addr {
    Ipv4Addr::from(ip)
}
