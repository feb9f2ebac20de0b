//! Passive-mode data channel: whole-file STOR / RETR.
//!
//! The data socket is an ordinary blocking `TcpStream`; once bytes are moving
//! there is nothing else to interleave. A failure after the STOR/RETR command
//! leaves a partial file behind and is reported as [`FtpError::Transfer`] so
//! the caller can clean up. Nothing here retries.

use std::fs::File;
use std::io::{Read, Write};
use std::net::{Shutdown, TcpStream};
use std::path::Path;

use tracing::debug;

use crate::error::{FtpError, FtpResult};
use crate::net::{check, Session, VERBOSE_PROTOCOL};
use crate::protocol::{reply, DATA_CHUNK};
use crate::protocol_core::parse_pasv;

/// Upload `local` to `remote`. Returns the number of bytes sent.
pub fn put<S: Read + Write>(session: &mut Session<S>, local: &Path, remote: &str) -> FtpResult<u64> {
    let mut file = File::open(local)?;
    let mut data = open_passive(session)?;
    start(session, &format!("STOR {}", remote))?;

    let mut buf = vec![0u8; DATA_CHUNK];
    let mut total = 0u64;
    loop {
        let n = file.read(&mut buf).map_err(FtpError::Transfer)?;
        if n == 0 {
            break;
        }
        data.write_all(&buf[..n]).map_err(FtpError::Transfer)?;
        total += n as u64;
    }
    data.flush().map_err(FtpError::Transfer)?;
    // EOF on the data socket tells the server the upload is complete
    data.shutdown(Shutdown::Write).ok();
    drop(data);
    drop(file);

    finish(session)?;
    if session.verbosity() >= VERBOSE_PROTOCOL {
        debug!(session = %session.label(), "PUT {} -> {} ({} bytes)", local.display(), remote, total);
    }
    Ok(total)
}

/// Download `remote` into `local` (created or truncated). Returns the number
/// of bytes received.
pub fn get<S: Read + Write>(session: &mut Session<S>, local: &Path, remote: &str) -> FtpResult<u64> {
    let mut file = File::create(local)?;
    let mut data = open_passive(session)?;
    start(session, &format!("RETR {}", remote))?;

    let mut buf = vec![0u8; DATA_CHUNK];
    let mut total = 0u64;
    loop {
        let n = match data.read(&mut buf) {
            Ok(n) => n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(FtpError::Transfer(e)),
        };
        if n == 0 {
            break;
        }
        file.write_all(&buf[..n]).map_err(FtpError::Transfer)?;
        total += n as u64;
    }
    file.flush().map_err(FtpError::Transfer)?;
    drop(data);
    drop(file);

    finish(session)?;
    if session.verbosity() >= VERBOSE_PROTOCOL {
        debug!(session = %session.label(), "GET {} -> {} ({} bytes)", remote, local.display(), total);
    }
    Ok(total)
}

/// `PASV`, then connect to the advertised address
fn open_passive<S: Read + Write>(session: &mut Session<S>) -> FtpResult<TcpStream> {
    let reply = session.expect("PASV", reply::PASSIVE)?;
    let addr = parse_pasv(&reply.message)?;
    TcpStream::connect(addr).map_err(|source| FtpError::Connect {
        addr: addr.to_string(),
        source,
    })
}

// Wait for the "ready to transfer" preliminary reply
fn start<S: Read + Write>(session: &mut Session<S>, command: &str) -> FtpResult<()> {
    let observed = session.submit(command)?;
    let ready = session.wait_final(observed)?;
    if ready.is_preliminary() {
        return Ok(());
    }
    check(reply::TRANSFER_STARTING, ready).map(|_| ())
}

fn finish<S: Read + Write>(session: &mut Session<S>) -> FtpResult<()> {
    let done = session.await_reply()?;
    check(reply::TRANSFER_COMPLETE, done)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::tests::{fast_params, Scripted};
    use std::net::TcpListener;
    use std::thread;

    fn pasv_line(listener: &TcpListener) -> String {
        let port = listener.local_addr().unwrap().port();
        format!(
            "227 Entering Passive Mode (127,0,0,1,{},{}).\r\n",
            port / 256,
            port % 256
        )
    }

    #[test]
    fn test_get_writes_local_file() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let pasv = pasv_line(&listener);
        let payload: Vec<u8> = (0..20_000u32).map(|i| (i % 251) as u8).collect();
        let expected = payload.clone();
        let server = thread::spawn(move || {
            let (mut conn, _) = listener.accept().unwrap();
            conn.write_all(&payload).unwrap();
        });

        let control = Scripted::data(&[&pasv, "150 Opening data connection\r\n", "226 Done\r\n"]);
        let mut session = Session::from_stream(control, &fast_params(50), "test");
        let dir = tempfile::tempdir().unwrap();
        let local = dir.path().join("out.bin");

        let n = get(&mut session, &local, "/tmp/zs-x").unwrap();
        server.join().unwrap();
        assert_eq!(n, expected.len() as u64);
        assert_eq!(std::fs::read(&local).unwrap(), expected);
    }

    #[test]
    fn test_put_streams_local_file() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let pasv = pasv_line(&listener);
        let server = thread::spawn(move || {
            let (mut conn, _) = listener.accept().unwrap();
            let mut got = Vec::new();
            conn.read_to_end(&mut got).unwrap();
            got
        });

        let dir = tempfile::tempdir().unwrap();
        let local = dir.path().join("in.bin");
        std::fs::write(&local, vec![7u8; DATA_CHUNK * 2 + 3]).unwrap();

        let already_open = format!("{} Data connection already open\r\n", reply::DATA_ALREADY_OPEN);
        let control = Scripted::data(&[&pasv, &already_open, "226 Transfer complete\r\n"]);
        let mut session = Session::from_stream(control, &fast_params(50), "test");
        let n = put(&mut session, &local, "/tmp/zs-put").unwrap();
        let received = server.join().unwrap();
        assert_eq!(n, (DATA_CHUNK * 2 + 3) as u64);
        assert_eq!(received.len(), DATA_CHUNK * 2 + 3);
    }

    #[test]
    fn test_bad_passive_reply() {
        let control = Scripted::data(&["227 Entering Passive Mode\r\n"]);
        let mut session = Session::from_stream(control, &fast_params(10), "test");
        let dir = tempfile::tempdir().unwrap();
        let err = get(&mut session, &dir.path().join("x"), "/tmp/x").unwrap_err();
        assert!(matches!(err, FtpError::BadPassiveReply(_)));
    }

    #[test]
    fn test_retr_refused() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let pasv = pasv_line(&listener);
        let control = Scripted::data(&[&pasv, "550 No such file\r\n"]);
        let mut session = Session::from_stream(control, &fast_params(10), "test");
        let dir = tempfile::tempdir().unwrap();
        let err = get(&mut session, &dir.path().join("x"), "/tmp/missing").unwrap_err();
        assert!(matches!(
            err,
            FtpError::UnexpectedReply { expected: 150, .. }
        ));
    }

    #[test]
    fn test_put_missing_local_file() {
        let control = Scripted::data(&[]);
        let mut session = Session::from_stream(control, &fast_params(10), "test");
        let err = put(&mut session, Path::new("/nonexistent/zs-file"), "/tmp/x").unwrap_err();
        assert!(matches!(err, FtpError::Io(_)));
        // nothing was sent on the control channel
        assert_eq!(session.tries(), 0);
    }
}
