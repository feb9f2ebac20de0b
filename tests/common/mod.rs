//! In-process FTP server for integration tests
//!
//! Speaks just enough of the protocol for zs: login, TYPE, PASV, STOR, RETR,
//! DELETE, QUIT, plus RCMD lines handed to a per-test closure. Replies are
//! written in two fragments so clients have to reassemble lines.
#![allow(dead_code)]

use anyhow::Result;
use std::collections::HashMap;
use std::io::{BufRead, BufReader, Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use zs::config::ConnectionParams;

pub const USER: &str = "QPGMR";
pub const PASSWORD: &str = "secret";

/// Server-side state shared with the test
#[derive(Default)]
pub struct Remote {
    /// IFS stream files and QTEMP save files, by name
    pub files: HashMap<String, Vec<u8>>,
    /// Every command line received, in order
    pub commands: Vec<String>,
    /// Final STOR reply in place of 226; the partial file is still kept
    pub stor_reply: Option<String>,
}

type Handler = dyn Fn(&str, &mut Remote) -> String + Send + Sync;

pub struct MockServer {
    pub addr: SocketAddr,
    pub remote: Arc<Mutex<Remote>>,
}

impl MockServer {
    /// Start a server whose RCMD replies come from `handler`. The reply may
    /// hold several CRLF separated lines.
    pub fn start<F>(handler: F) -> Result<Self>
    where
        F: Fn(&str, &mut Remote) -> String + Send + Sync + 'static,
    {
        let listener = TcpListener::bind("127.0.0.1:0")?;
        let addr = listener.local_addr()?;
        let remote = Arc::new(Mutex::new(Remote::default()));
        let handler: Arc<Handler> = Arc::new(handler);

        let shared = remote.clone();
        thread::spawn(move || {
            for conn in listener.incoming() {
                let Ok(conn) = conn else { break };
                let remote = shared.clone();
                let handler = handler.clone();
                thread::spawn(move || {
                    let _ = serve(conn, remote, handler);
                });
            }
        });
        Ok(MockServer { addr, remote })
    }

    /// Server without any RCMD support
    pub fn plain() -> Result<Self> {
        Self::start(|_, _| "502 RCMD not supported".to_string())
    }

    /// Login parameters with a fast poll interval
    pub fn params(&self) -> ConnectionParams {
        ConnectionParams {
            host: self.addr.ip().to_string(),
            port: self.addr.port(),
            user: USER.into(),
            password: PASSWORD.into(),
            max_tries: 2000,
            poll_interval: Duration::from_millis(2),
            ..ConnectionParams::default()
        }
    }

    pub fn commands(&self) -> Vec<String> {
        self.remote.lock().unwrap().commands.clone()
    }

    /// Commands starting with `prefix`, e.g. `"RCMD SAVOBJ"`
    pub fn commands_like(&self, prefix: &str) -> Vec<String> {
        self.commands()
            .into_iter()
            .filter(|c| c.starts_with(prefix))
            .collect()
    }

    pub fn file(&self, name: &str) -> Option<Vec<u8>> {
        self.remote.lock().unwrap().files.get(name).cloned()
    }

    pub fn file_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.remote.lock().unwrap().files.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn put_file(&self, name: &str, data: Vec<u8>) {
        self.remote.lock().unwrap().files.insert(name.to_string(), data);
    }
}

/// Value of `KEY(...)` in a CL command, quotes stripped
pub fn param<'a>(command: &'a str, key: &str) -> Option<&'a str> {
    let needle = format!("{}(", key);
    let mut search = 0;
    while let Some(pos) = command[search..].find(&needle) {
        let start = search + pos;
        // whole keyword only: OBJ( must not match SAVOBJ(
        let boundary = start == 0 || command.as_bytes()[start - 1] == b' ';
        let open = start + needle.len();
        if boundary {
            let close = command[open..].find(')')? + open;
            return Some(command[open..close].trim_matches('\''));
        }
        search = open;
    }
    None
}

/// Save file name from a `/QSYS.LIB/QTEMP.LIB/<name>.FILE` member path
pub fn savf_from_member(member: &str) -> String {
    let name = member
        .trim_start_matches("/QSYS.LIB/QTEMP.LIB/")
        .trim_end_matches(".FILE");
    format!("QTEMP/{}", name)
}

fn send(out: &mut TcpStream, text: &str) -> std::io::Result<()> {
    let wire = format!("{}\r\n", text);
    let bytes = wire.as_bytes();
    let mid = bytes.len() / 2;
    out.write_all(&bytes[..mid])?;
    out.flush()?;
    thread::sleep(Duration::from_millis(1));
    out.write_all(&bytes[mid..])?;
    out.flush()
}

fn serve(stream: TcpStream, remote: Arc<Mutex<Remote>>, handler: Arc<Handler>) -> Result<()> {
    let mut reader = BufReader::new(stream.try_clone()?);
    let mut out = stream;
    send(&mut out, "220-Mock FTP server\r\n220 Ready")?;

    let mut passive: Option<TcpListener> = None;
    let mut line = String::new();
    loop {
        line.clear();
        if reader.read_line(&mut line)? == 0 {
            return Ok(());
        }
        let command = line.trim_end_matches(['\r', '\n']).to_string();
        remote.lock().unwrap().commands.push(command.clone());
        let (verb, arg) = command.split_once(' ').unwrap_or((command.as_str(), ""));

        match verb.to_ascii_uppercase().as_str() {
            "USER" => send(&mut out, "331 Enter password")?,
            "PASS" if arg == PASSWORD => send(&mut out, "230 Logged on")?,
            "PASS" => send(&mut out, "530 Log on attempt by user rejected")?,
            "TYPE" => send(&mut out, "200 Representation type is binary IMAGE.")?,
            "PASV" => {
                let listener = TcpListener::bind("127.0.0.1:0")?;
                let port = listener.local_addr()?.port();
                passive = Some(listener);
                send(
                    &mut out,
                    &format!(
                        "227 Entering Passive Mode (127,0,0,1,{},{}).",
                        port / 256,
                        port % 256
                    ),
                )?;
            }
            "STOR" => match passive.take() {
                Some(listener) => {
                    send(&mut out, "150 File status okay; about to open data connection.")?;
                    let (mut data, _) = listener.accept()?;
                    let mut bytes = Vec::new();
                    data.read_to_end(&mut bytes)?;
                    let reply = {
                        let mut remote = remote.lock().unwrap();
                        remote.files.insert(arg.to_string(), bytes);
                        remote.stor_reply.clone()
                    };
                    send(&mut out, reply.as_deref().unwrap_or("226 Closing data connection."))?;
                }
                None => send(&mut out, "425 Use PASV first")?,
            },
            "RETR" => {
                let file = remote.lock().unwrap().files.get(arg).cloned();
                match (file, passive.take()) {
                    (Some(bytes), Some(listener)) => {
                        send(&mut out, "150 File status okay; about to open data connection.")?;
                        let (mut data, _) = listener.accept()?;
                        data.write_all(&bytes)?;
                        drop(data);
                        send(&mut out, "226 Closing data connection.")?;
                    }
                    (None, _) => send(&mut out, &format!("550 {}: not found", arg))?,
                    (_, None) => send(&mut out, "425 Use PASV first")?,
                }
            }
            "DELETE" => {
                let removed = remote.lock().unwrap().files.remove(arg).is_some();
                if removed {
                    send(&mut out, "250 DELE command successful.")?;
                } else {
                    send(&mut out, &format!("550 {}: not found", arg))?;
                }
            }
            "RCMD" => {
                let reply = handler(arg, &mut remote.lock().unwrap());
                send(&mut out, &reply)?;
            }
            "QUIT" => {
                send(&mut out, "221 QUIT subcommand received.")?;
                return Ok(());
            }
            _ => send(&mut out, "502 Command not implemented")?,
        }
    }
}

/// Source-side AS/400 behaviour: objects that exist as `(lib, obj, type)`
pub fn source_system(objects: &[(&str, &str, &str)]) -> impl Fn(&str, &mut Remote) -> String {
    let objects: Vec<(String, String, String)> = objects
        .iter()
        .map(|(l, o, t)| (l.to_string(), o.to_string(), t.to_string()))
        .collect();
    move |cmd: &str, remote: &mut Remote| {
        if cmd.starts_with("CRTSAVF") {
            let file = param(cmd, "FILE").unwrap_or_default().to_string();
            remote.files.insert(file, Vec::new());
            "250 Command CRTSAVF completed".into()
        } else if cmd.starts_with("SAVOBJ") {
            let obj = param(cmd, "OBJ").unwrap_or_default();
            let kind = param(cmd, "OBJTYPE").unwrap_or_default();
            let lib = param(cmd, "LIB").unwrap_or_default();
            let savf = param(cmd, "SAVF").unwrap_or_default().to_string();
            let found = objects
                .iter()
                .any(|(l, o, t)| l == lib && o == obj && (t == kind || kind == "*ALL"));
            if found {
                remote.files.insert(savf, savf_payload(lib, obj));
                "250-Object saved.\r\n250 1 objects saved from library.".into()
            } else {
                format!("550 Object {} in library {} not found", obj, lib)
            }
        } else if cmd.starts_with("CPYTOSTMF") {
            let savf = savf_from_member(param(cmd, "FROMMBR").unwrap_or_default());
            let stmf = param(cmd, "TOSTMF").unwrap_or_default().to_string();
            match remote.files.get(&savf).cloned() {
                Some(bytes) => {
                    remote.files.insert(stmf, bytes);
                    "250 Stream file copied".into()
                }
                None => "550 Save file not found".into(),
            }
        } else if cmd.starts_with("DLTF") {
            let file = param(cmd, "FILE").unwrap_or_default();
            if remote.files.remove(file).is_some() {
                "250 File deleted".into()
            } else {
                "550 File not found".into()
            }
        } else {
            "550 Unknown command".into()
        }
    }
}

/// Target-side AS/400 behaviour; `restore_reply` answers RSTOBJ
pub fn target_system(restore_reply: &'static str) -> impl Fn(&str, &mut Remote) -> String {
    move |cmd: &str, remote: &mut Remote| {
        if cmd.starts_with("CPYFRMSTMF") {
            let stmf = param(cmd, "FROMSTMF").unwrap_or_default();
            let savf = savf_from_member(param(cmd, "TOMBR").unwrap_or_default());
            match remote.files.get(stmf).cloned() {
                Some(bytes) => {
                    remote.files.insert(savf, bytes);
                    "250 Stream file copied to member".into()
                }
                None => "550 Stream file not found".into(),
            }
        } else if cmd.starts_with("RSTOBJ") {
            let savf = param(cmd, "SAVF").unwrap_or_default();
            let into = param(cmd, "RSTLIB").unwrap_or_default();
            if let Some(bytes) = remote.files.get(savf).cloned() {
                remote.files.insert(format!("RESTORED/{}", into), bytes);
            }
            restore_reply.into()
        } else if cmd.starts_with("DLTF") {
            let file = param(cmd, "FILE").unwrap_or_default();
            remote.files.remove(file);
            "250 File deleted".into()
        } else {
            "550 Unknown command".into()
        }
    }
}

/// Deterministic save file contents, larger than one transfer chunk
pub fn savf_payload(lib: &str, obj: &str) -> Vec<u8> {
    let mut bytes = format!("SAVF {}/{}\n", lib, obj).into_bytes();
    bytes.extend((0..20_000u32).map(|i| (i % 253) as u8));
    bytes
}
