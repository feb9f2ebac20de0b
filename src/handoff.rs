//! Source-to-target hand-off
//!
//! A bounded, one-way byte pipe between the two pipeline roles plus the line
//! protocol spoken over it: one `library:local-path\n` line per saved object,
//! an empty line (or end of stream) when there is nothing more.

use std::io::{self, BufRead, BufReader, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{sync_channel, Receiver, SyncSender};
use std::sync::Arc;

use crate::error::HandoffError;

/// Chunks the writer may run ahead of the reader before blocking
pub const PIPE_CAPACITY: usize = 4;

/// Create a pipe holding at most `capacity` unread writes
pub fn pipe(capacity: usize) -> (PipeWriter, PipeReader) {
    let (tx, rx) = sync_channel(capacity);
    let abandoned = Arc::new(AtomicBool::new(false));
    (
        PipeWriter {
            tx,
            abandoned: abandoned.clone(),
        },
        PipeReader {
            rx,
            chunk: Vec::new(),
            pos: 0,
            abandoned,
        },
    )
}

pub struct PipeWriter {
    tx: SyncSender<Vec<u8>>,
    abandoned: Arc<AtomicBool>,
}

impl Write for PipeWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        if self.abandoned.load(Ordering::Acquire) {
            return Err(io::Error::from(io::ErrorKind::BrokenPipe));
        }
        self.tx
            .send(buf.to_vec())
            .map_err(|_| io::Error::from(io::ErrorKind::BrokenPipe))?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Reading end; yields EOF once the writer is dropped and drained
pub struct PipeReader {
    rx: Receiver<Vec<u8>>,
    chunk: Vec<u8>,
    pos: usize,
    abandoned: Arc<AtomicBool>,
}

impl PipeReader {
    /// Make every later write fail as if the reader were gone, while
    /// leaving what is already queued readable.
    pub fn abandon(&self) {
        self.abandoned.store(true, Ordering::Release);
    }
}

impl Read for PipeReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.pos >= self.chunk.len() {
            match self.rx.recv() {
                Ok(chunk) => {
                    self.chunk = chunk;
                    self.pos = 0;
                }
                Err(_) => return Ok(0),
            }
        }
        let n = buf.len().min(self.chunk.len() - self.pos);
        buf[..n].copy_from_slice(&self.chunk[self.pos..self.pos + n]);
        self.pos += n;
        Ok(n)
    }
}

/// One saved object waiting to be restored
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Handoff {
    pub library: String,
    pub path: PathBuf,
}

impl Handoff {
    pub fn encode(&self) -> String {
        format!("{}:{}\n", self.library, self.path.display())
    }

    /// Decode one line (terminator optional). `Ok(None)` is the end marker.
    pub fn decode(line: &str) -> Result<Option<Handoff>, HandoffError> {
        let line = line.trim_end_matches(['\r', '\n']);
        if line.is_empty() {
            return Ok(None);
        }
        match line.split_once(':') {
            Some((library, path)) if !library.is_empty() && !path.is_empty() => {
                Ok(Some(Handoff {
                    library: library.to_string(),
                    path: PathBuf::from(path),
                }))
            }
            _ => Err(HandoffError::Malformed(line.to_string())),
        }
    }
}

/// Writing side of the line protocol
pub struct HandoffSender<W: Write = PipeWriter> {
    out: W,
}

impl<W: Write> HandoffSender<W> {
    pub fn new(out: W) -> Self {
        HandoffSender { out }
    }

    pub fn send(&mut self, library: &str, path: &Path) -> Result<(), HandoffError> {
        let line = Handoff {
            library: library.to_string(),
            path: path.to_path_buf(),
        }
        .encode();
        self.out.write_all(line.as_bytes()).map_err(closed)?;
        self.out.flush().map_err(closed)
    }

    /// Send the end marker and close the writing end
    pub fn finish(mut self) -> Result<(), HandoffError> {
        self.out.write_all(b"\n").map_err(closed)?;
        self.out.flush().map_err(closed)
    }
}

fn closed(e: io::Error) -> HandoffError {
    if e.kind() == io::ErrorKind::BrokenPipe {
        HandoffError::Closed
    } else {
        HandoffError::Io(e)
    }
}

/// Reading side of the line protocol
pub struct HandoffReceiver<R: Read = PipeReader> {
    input: BufReader<R>,
    done: bool,
}

impl<R: Read> HandoffReceiver<R> {
    pub fn new(input: R) -> Self {
        HandoffReceiver {
            input: BufReader::new(input),
            done: false,
        }
    }

    /// Next hand-off; `None` after the end marker or end of stream
    pub fn next_handoff(&mut self) -> Result<Option<Handoff>, HandoffError> {
        if self.done {
            return Ok(None);
        }
        let mut line = String::new();
        if self.input.read_line(&mut line)? == 0 {
            self.done = true;
            return Ok(None);
        }
        let item = Handoff::decode(&line)?;
        if item.is_none() {
            self.done = true;
        }
        Ok(item)
    }
}

impl HandoffReceiver<PipeReader> {
    /// Refuse further hand-offs and collect the local files of those already
    /// sent, so the caller can delete them. Returns once the writer is gone.
    pub fn abandon(mut self) -> Vec<PathBuf> {
        self.input.get_ref().abandon();
        let mut paths = Vec::new();
        while let Ok(Some(item)) = self.next_handoff() {
            paths.push(item.path);
        }
        paths
    }
}
