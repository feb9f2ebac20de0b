//! Error taxonomy shared by the protocol engine, data channel and helpers

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::protocol_core::Reply;

/// Failures raised by a control session or its data channel
#[derive(Debug, Error)]
pub enum FtpError {
    #[error("missing host")]
    NoHost,

    #[error("failed to resolve {host}: {source}")]
    Resolve {
        host: String,
        #[source]
        source: io::Error,
    },

    #[error("failed to connect to {addr}: {source}")]
    Connect {
        addr: String,
        #[source]
        source: io::Error,
    },

    #[error("timed out after {tries} polls")]
    Timeout { tries: u32 },

    #[error("not logged in: {message}")]
    NotLoggedIn { message: String },

    #[error("unexpected reply (expected {expected}): {reply}")]
    UnexpectedReply { expected: u16, reply: Reply },

    #[error("malformed reply line: {0:?}")]
    MalformedReply(String),

    #[error("reply line exceeds {limit} bytes")]
    LineTooLong { limit: usize },

    #[error("connection closed by server")]
    ConnectionClosed,

    #[error("bad passive mode reply: {0:?}")]
    BadPassiveReply(String),

    #[error("transfer failed: {0}")]
    Transfer(#[source] io::Error),

    #[error(transparent)]
    Io(#[from] io::Error),
}

impl FtpError {
    /// True when the control connection can no longer be trusted
    pub fn is_fatal_to_session(&self) -> bool {
        matches!(
            self,
            FtpError::Timeout { .. }
                | FtpError::NotLoggedIn { .. }
                | FtpError::ConnectionClosed
                | FtpError::LineTooLong { .. }
                | FtpError::Io(_)
        )
    }
}

/// Configuration file errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("missing value for option {key:?} (line {line})")]
    MissingValue { line: usize, key: String },

    #[error("unknown option {key:?} (line {line})")]
    UnknownKey { line: usize, key: String },

    #[error("invalid value {value:?} for option {key:?} (line {line})")]
    InvalidValue {
        line: usize,
        key: String,
        value: String,
    },
}

/// Object, library list and type list errors
#[derive(Debug, Error)]
pub enum ObjectError {
    #[error("failed to parse object {0:?}")]
    Parse(String),

    #[error("name {name:?} is longer than {max} characters")]
    TooLong { name: String, max: usize },

    #[error("maximum of {max} entries reached")]
    ListFull { max: usize },

    #[error("object {0} not found in any library/type combination")]
    NotFound(String),
}

/// Fixed-width dump decoding errors
#[derive(Debug, Error)]
pub enum RecordError {
    #[error("truncated record at offset {offset}: {len} of {expected} bytes")]
    Truncated {
        offset: usize,
        len: usize,
        expected: usize,
    },

    #[error("record at offset {offset} is not terminated by a line feed")]
    MissingDelimiter { offset: usize },
}

/// Source-to-target hand-off pipe errors
#[derive(Debug, Error)]
pub enum HandoffError {
    #[error("failed to understand payload: {0:?}")]
    Malformed(String),

    #[error("hand-off pipe closed by the target")]
    Closed,

    #[error(transparent)]
    Io(#[from] io::Error),
}

pub type FtpResult<T> = std::result::Result<T, FtpError>;
