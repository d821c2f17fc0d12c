//! `Connect-Timeout-Ms` parsing and effective timeout computation.

use std::time::Duration;

/// Header carrying the client's timeout in milliseconds.
pub const CONNECT_TIMEOUT_MS_HEADER: &str = "connect-timeout-ms";

/// Parse a timeout milliseconds string.
///
/// Returns `None` for invalid values and for `0`, which means "no timeout".
pub fn parse_timeout_ms(value: &str) -> Option<Duration> {
    let ms: u64 = value.trim().parse().ok()?;
    if ms == 0 {
        None
    } else {
        Some(Duration::from_millis(ms))
    }
}

/// The effective timeout is the smaller of the server and client timeouts.
///
/// Returns `None` if neither is set.
pub fn compute_effective_timeout(
    server_timeout: Option<Duration>,
    client_timeout: Option<Duration>,
) -> Option<Duration> {
    match (server_timeout, client_timeout) {
        (Some(server), Some(client)) => Some(server.min(client)),
        (Some(timeout), None) | (None, Some(timeout)) => Some(timeout),
        (None, None) => None,
    }
}
