//! Protocol logic shared by the control session and the data channel
//!
//! Everything here is pure: no sockets, no sleeping. The session feeds raw
//! socket bytes into a [`LineBuffer`] and decodes each complete line with
//! [`parse_reply_line`].

use std::borrow::Cow;
use std::fmt;
use std::net::{Ipv4Addr, SocketAddrV4};

use crate::error::FtpError;
use crate::protocol::CRLF;

/// One decoded reply line: `NNN-text` (continues) or `NNN text` (final)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub code: u16,
    pub continues: bool,
    pub message: String,
}

impl Reply {
    pub fn new(code: u16, message: impl Into<String>) -> Self {
        Reply {
            code,
            continues: false,
            message: message.into(),
        }
    }

    /// 1xx replies announce that another reply will follow
    pub fn is_preliminary(&self) -> bool {
        (100..200).contains(&self.code)
    }
}

impl fmt::Display for Reply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sep = if self.continues { '-' } else { ' ' };
        write!(f, "{}{}{}", self.code, sep, self.message)
    }
}

/// Reassembles CRLF-terminated lines from arbitrarily split socket reads.
///
/// Bytes that do not yet form a complete line stay buffered until the next
/// [`push`](LineBuffer::push); several lines delivered by one read are handed
/// out one at a time.
#[derive(Debug)]
pub struct LineBuffer {
    buf: Vec<u8>,
    limit: usize,
}

impl LineBuffer {
    pub fn new(limit: usize) -> Self {
        LineBuffer {
            buf: Vec::new(),
            limit,
        }
    }

    pub fn push(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Next complete line without its terminator, if one is buffered
    pub fn next_line(&mut self) -> Result<Option<String>, FtpError> {
        match self.buf.windows(CRLF.len()).position(|w| w == CRLF) {
            Some(end) => {
                if end > self.limit {
                    return Err(FtpError::LineTooLong { limit: self.limit });
                }
                let line = String::from_utf8_lossy(&self.buf[..end]).into_owned();
                self.buf.drain(..end + CRLF.len());
                Ok(Some(line))
            }
            None if self.buf.len() > self.limit + 1 => {
                Err(FtpError::LineTooLong { limit: self.limit })
            }
            None => Ok(None),
        }
    }

    /// Number of bytes held back waiting for a terminator
    pub fn pending(&self) -> usize {
        self.buf.len()
    }

    pub fn clear(&mut self) {
        self.buf.clear();
        self.buf.shrink_to_fit();
    }
}

/// Decode `NNN<sep>text`. Returns `None` when the line carries no reply code.
pub fn parse_reply_line(line: &str) -> Option<Reply> {
    let bytes = line.as_bytes();
    if bytes.len() < 3 || !bytes[..3].iter().all(u8::is_ascii_digit) {
        return None;
    }
    let continues = match bytes.get(3) {
        None | Some(b' ') => false,
        Some(b'-') => true,
        Some(_) => return None,
    };
    let code = line[..3].parse().ok()?;
    let message = line.get(4..).unwrap_or("").to_string();
    Some(Reply {
        code,
        continues,
        message,
    })
}

/// Extract the data socket address from a 227 message body:
/// `Entering Passive Mode (h1,h2,h3,h4,p1,p2).`
pub fn parse_pasv(message: &str) -> Result<SocketAddrV4, FtpError> {
    let bad = || FtpError::BadPassiveReply(message.to_string());

    let open = message.find('(').ok_or_else(bad)?;
    let close = message[open..].find(')').ok_or_else(bad)? + open;
    let fields: Vec<u8> = message[open + 1..close]
        .split(',')
        .map(|f| f.trim().parse::<u8>())
        .collect::<Result<_, _>>()
        .map_err(|_| bad())?;
    if fields.len() != 6 {
        return Err(bad());
    }

    let ip = Ipv4Addr::new(fields[0], fields[1], fields[2], fields[3]);
    let port = u16::from(fields[4]) * 256 + u16::from(fields[5]);
    Ok(SocketAddrV4::new(ip, port))
}

/// Hide the secret of a `PASS` command before it reaches any log
pub fn redact(command: &str) -> Cow<'_, str> {
    let trimmed = command.trim_end_matches(['\r', '\n']);
    match trimmed.get(..5) {
        Some(verb) if verb.eq_ignore_ascii_case("PASS ") => Cow::Borrowed("PASS ******"),
        _ => Cow::Borrowed(trimmed),
    }
}
