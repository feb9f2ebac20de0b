//! FTP control session: connection, handshake and reply polling.
//!
//! The control socket is non-blocking once connected. Every wait for a reply
//! is an explicit poll loop: sleep the configured interval, drain whatever
//! bytes the socket has, and hand back either a complete reply or
//! [`Poll::Pending`]. A command that stays pending for `max_tries` polls
//! fails with [`FtpError::Timeout`].

use std::io::{ErrorKind, Read, Write};
use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::thread;
use std::time::Duration;

use tracing::{debug, trace};

use crate::config::ConnectionParams;
use crate::error::{FtpError, FtpResult};
use crate::protocol::{reply, CRLF, MAX_LINE};
use crate::protocol_core::{parse_reply_line, redact, LineBuffer, Reply};

// Verbosity thresholds: protocol lines, then raw socket tracing
pub const VERBOSE_PROTOCOL: u8 = 1;
pub const VERBOSE_SOCKET: u8 = 2;

const READ_CHUNK: usize = 4096;

/// Outcome of one poll of the control socket
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Poll {
    /// No final reply line yet
    Pending,
    Ready(Reply),
}

enum Fill {
    Data,
    WouldBlock,
    Closed,
}

/// One control connection. Owns its socket and its partial-line buffer.
pub struct Session<S = TcpStream> {
    stream: S,
    label: String,
    verbosity: u8,
    max_tries: u32,
    interval: Duration,
    tries: u32,
    lines: LineBuffer,
    in_continuation: bool,
}

impl Session<TcpStream> {
    /// Open the control socket, drain the welcome reply, log in if a user is
    /// configured and switch to binary representation.
    pub fn connect(params: &ConnectionParams, label: &str) -> FtpResult<Self> {
        if params.host.is_empty() {
            return Err(FtpError::NoHost);
        }

        let addrs: Vec<SocketAddr> = (params.host.as_str(), params.port)
            .to_socket_addrs()
            .map_err(|source| FtpError::Resolve {
                host: params.host.clone(),
                source,
            })?
            .collect();

        let mut last_err = None;
        let mut connected = None;
        for addr in addrs {
            match TcpStream::connect(addr) {
                Ok(s) => {
                    connected = Some(s);
                    break;
                }
                Err(e) => last_err = Some((addr, e)),
            }
        }
        let stream = match (connected, last_err) {
            (Some(s), _) => s,
            (None, Some((addr, source))) => {
                return Err(FtpError::Connect {
                    addr: addr.to_string(),
                    source,
                })
            }
            (None, None) => {
                return Err(FtpError::Resolve {
                    host: params.host.clone(),
                    source: std::io::Error::new(ErrorKind::NotFound, "no addresses found"),
                })
            }
        };

        stream.set_nonblocking(true)?;
        stream.set_nodelay(true).ok();

        let mut session = Session::from_stream(stream, params, label);
        session.handshake(params)?;
        Ok(session)
    }
}

impl<S: Read + Write> Session<S> {
    /// Wrap an already connected stream. No bytes are exchanged.
    pub fn from_stream(stream: S, params: &ConnectionParams, label: &str) -> Self {
        Session {
            stream,
            label: label.to_string(),
            verbosity: params.verbosity,
            max_tries: params.max_tries.max(1),
            interval: params.poll_interval,
            tries: 0,
            lines: LineBuffer::new(MAX_LINE),
            in_continuation: false,
        }
    }

    /// Welcome, optional USER/PASS, then `TYPE I`
    pub fn handshake(&mut self, params: &ConnectionParams) -> FtpResult<()> {
        self.tries = 0;
        let welcome = self.poll()?;
        self.expect_reply(reply::WELCOME, welcome)?;

        if params.has_login() {
            let observed = self.submit(&format!("USER {}", params.user))?;
            let user_reply = self.wait_final(observed)?;
            // Some servers accept the user without a password
            if user_reply.code != reply::LOGGED_IN {
                check(reply::NEED_PASSWORD, user_reply)?;
                self.expect(&format!("PASS {}", params.password), reply::LOGGED_IN)?;
            }
        }

        self.expect("TYPE I", reply::OK)?;
        Ok(())
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn verbosity(&self) -> u8 {
        self.verbosity
    }

    /// Polls spent on the current command
    pub fn tries(&self) -> u32 {
        self.tries
    }

    /// Write one command line and reset the retry counter
    pub fn send(&mut self, text: &str) -> FtpResult<()> {
        let body = text.trim_end_matches(['\r', '\n']);
        if self.verbosity >= VERBOSE_PROTOCOL {
            debug!(session = %self.label, "WRITE: {}", redact(body));
        }
        let mut line = Vec::with_capacity(body.len() + CRLF.len());
        line.extend_from_slice(body.as_bytes());
        line.extend_from_slice(CRLF);

        self.tries = 0;
        self.write_all(&line)
    }

    /// Send a command and poll once for its reply
    pub fn submit(&mut self, text: &str) -> FtpResult<Poll> {
        self.send(text)?;
        self.poll()
    }

    /// One bounded attempt at reading a final reply line
    pub fn poll(&mut self) -> FtpResult<Poll> {
        thread::sleep(self.interval);
        self.tries += 1;

        loop {
            if let Some(line) = self.lines.next_line()? {
                if let Some(reply) = self.classify(line)? {
                    return Ok(Poll::Ready(reply));
                }
                continue;
            }
            match self.fill()? {
                Fill::Data => continue,
                Fill::WouldBlock => break,
                Fill::Closed => return Err(FtpError::ConnectionClosed),
            }
        }

        if self.tries >= self.max_tries {
            return Err(FtpError::Timeout {
                tries: self.max_tries,
            });
        }
        Ok(Poll::Pending)
    }

    /// Keep polling until `observed` turns into a final reply
    pub fn wait_final(&mut self, mut observed: Poll) -> FtpResult<Reply> {
        loop {
            match observed {
                Poll::Ready(reply) => return Ok(reply),
                Poll::Pending => observed = self.poll()?,
            }
        }
    }

    /// Poll for the next reply with a fresh retry budget, e.g. after a
    /// data transfer finished.
    pub fn await_reply(&mut self) -> FtpResult<Reply> {
        self.tries = 0;
        let first = self.poll()?;
        self.wait_final(first)
    }

    /// Accept `observed` only if it settles on `expected`
    pub fn expect_reply(&mut self, expected: u16, observed: Poll) -> FtpResult<Reply> {
        let reply = self.wait_final(observed)?;
        check(expected, reply)
    }

    /// Run a command and return the final reply code
    pub fn run_command(&mut self, text: &str) -> FtpResult<u16> {
        Ok(self.run_command_capture(text)?.code)
    }

    /// Run a command and return the final reply including its message body
    pub fn run_command_capture(&mut self, text: &str) -> FtpResult<Reply> {
        let first = self.submit(text)?;
        self.wait_final(first)
    }

    pub fn expect(&mut self, text: &str, code: u16) -> FtpResult<Reply> {
        let first = self.submit(text)?;
        self.expect_reply(code, first)
    }

    /// Remote job-control command that must succeed (250)
    pub fn rcmd(&mut self, command: &str) -> FtpResult<Reply> {
        self.expect(&format!("RCMD {}", command), reply::COMMAND_OK)
    }

    /// Remote job-control command whose outcome the caller inspects
    pub fn rcmd_capture(&mut self, command: &str) -> FtpResult<Reply> {
        self.run_command_capture(&format!("RCMD {}", command))
    }

    pub fn delete(&mut self, remote: &str) -> FtpResult<()> {
        self.expect(&format!("DELETE {}", remote), reply::COMMAND_OK)?;
        Ok(())
    }

    /// Say goodbye. The session stays usable only for `close`.
    pub fn quit(&mut self) -> FtpResult<()> {
        let code = self.run_command("QUIT")?;
        if code != reply::GOODBYE && self.verbosity >= VERBOSE_PROTOCOL {
            debug!(session = %self.label, "QUIT answered with {}", code);
        }
        Ok(())
    }

    /// Release the socket and any buffered partial line
    pub fn close(mut self) {
        self.lines.clear();
        if self.verbosity >= VERBOSE_SOCKET {
            trace!(session = %self.label, "::CLOSE");
        }
    }

    fn classify(&mut self, line: String) -> FtpResult<Option<Reply>> {
        if self.verbosity >= VERBOSE_PROTOCOL {
            debug!(session = %self.label, "RECVLINE: {}", line);
        }
        match parse_reply_line(&line) {
            Some(reply) if reply.continues => {
                self.in_continuation = true;
                Ok(None)
            }
            Some(reply) => {
                self.in_continuation = false;
                Ok(Some(reply))
            }
            // free text inside a multi-line block
            None if self.in_continuation => Ok(None),
            None => Err(FtpError::MalformedReply(line)),
        }
    }

    fn fill(&mut self) -> FtpResult<Fill> {
        let mut chunk = [0u8; READ_CHUNK];
        loop {
            match self.stream.read(&mut chunk) {
                Ok(0) => {
                    if self.verbosity >= VERBOSE_SOCKET {
                        trace!(session = %self.label, "::RECV: [NOTHING]");
                    }
                    return Ok(Fill::Closed);
                }
                Ok(n) => {
                    if self.verbosity >= VERBOSE_SOCKET {
                        trace!(
                            session = %self.label,
                            "RECV: <{}>",
                            String::from_utf8_lossy(&chunk[..n])
                        );
                    }
                    self.lines.push(&chunk[..n]);
                    return Ok(Fill::Data);
                }
                Err(e) if e.kind() == ErrorKind::WouldBlock => {
                    if self.verbosity >= VERBOSE_SOCKET {
                        trace!(session = %self.label, "::RECV: [{}]", e);
                    }
                    return Ok(Fill::WouldBlock);
                }
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }
    }

    // A full send buffer on the non-blocking socket is retried like a poll
    fn write_all(&mut self, mut buf: &[u8]) -> FtpResult<()> {
        while !buf.is_empty() {
            match self.stream.write(buf) {
                Ok(0) => return Err(FtpError::ConnectionClosed),
                Ok(n) => {
                    if self.verbosity >= VERBOSE_SOCKET {
                        trace!(session = %self.label, "::WRITE: {} bytes", n);
                    }
                    buf = &buf[n..];
                }
                Err(e) if e.kind() == ErrorKind::WouldBlock => {
                    self.tries += 1;
                    if self.tries >= self.max_tries {
                        return Err(FtpError::Timeout {
                            tries: self.max_tries,
                        });
                    }
                    thread::sleep(self.interval);
                }
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }
        self.stream.flush()?;
        Ok(())
    }
}

pub(crate) fn check(expected: u16, reply: Reply) -> FtpResult<Reply> {
    if reply.code == expected {
        Ok(reply)
    } else if reply.code == reply::NOT_LOGGED_IN {
        Err(FtpError::NotLoggedIn {
            message: reply.message,
        })
    } else {
        Err(FtpError::UnexpectedReply { expected, reply })
    }
}
