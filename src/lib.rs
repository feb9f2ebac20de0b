//! zs - save, move and restore objects between AS/400 systems over FTP
//!
//! Control sessions, the passive-mode data channel, the two-role copy
//! pipeline and the dependency analyzer.

pub mod analyze;
pub mod cli;
pub mod commands;
pub mod config;
pub mod copy;
pub mod error;
pub mod handoff;
pub mod logger;
pub mod net;
pub mod object;
pub mod protocol;
pub mod protocol_core;
pub mod record;
pub mod transfer;

pub const PROGRAM_NAME: &str = "zs";

/// Print a failure as one `zs: ...` line with its whole cause chain
pub fn report_error(err: &anyhow::Error) {
    eprintln!("{}: {:#}", PROGRAM_NAME, err);
}
