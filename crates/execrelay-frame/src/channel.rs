//! Channel IDs used by the exec protocol.

/// Client → executor: setup, stdin, terminal size, heartbeats.
pub const EXEC_REQUEST: u16 = 1;

/// Executor → client: stdout, stderr, exit result.
pub const EXEC_RESPONSE: u16 = 2;

/// Returns a human-readable name for a channel ID.
pub fn channel_name(id: u16) -> &'static str {
    match id {
        EXEC_REQUEST => "EXEC_REQUEST",
        EXEC_RESPONSE => "EXEC_RESPONSE",
        _ => "UNKNOWN",
    }
}
