//! Shared protocol constants for the FTP control and data channels

use std::time::Duration;

// Line terminator for every command and reply line
pub const CRLF: &[u8; 2] = b"\r\n";

// Well-known FTP control port
pub const DEFAULT_PORT: u16 = 21;

// Longest reply line accepted before the reassembly buffer gives up
pub const MAX_LINE: usize = 8192;

// Chunk size for bulk transfers on the data socket
pub const DATA_CHUNK: usize = 8192;

// Reply codes consumed by the engine (keep numeric values in sync with RFC 959)
pub mod reply {
    pub const DATA_ALREADY_OPEN: u16 = 125;
    pub const TRANSFER_STARTING: u16 = 150;
    pub const OK: u16 = 200;
    pub const WELCOME: u16 = 220;
    pub const GOODBYE: u16 = 221;
    pub const TRANSFER_COMPLETE: u16 = 226;
    pub const PASSIVE: u16 = 227;
    pub const LOGGED_IN: u16 = 230;
    pub const COMMAND_OK: u16 = 250;
    pub const NEED_PASSWORD: u16 = 331;
    pub const NOT_LOGGED_IN: u16 = 530;
    pub const FAILED: u16 = 550;
}

// Bounded retry policy for the non-blocking control socket
pub mod poll {
    use super::Duration;

    // Polls allowed per command before the command times out
    pub const DEFAULT_MAX_TRIES: u32 = 100;

    // Sleep before each poll
    pub const DEFAULT_INTERVAL_MS: u64 = 250;

    pub fn default_interval() -> Duration {
        Duration::from_millis(DEFAULT_INTERVAL_MS)
    }
}
