//! Object copy between two servers
//!
//! The source role saves each object into a QTEMP save file, pulls the save
//! file down as a local temp file and hands `(library, path)` to the target
//! role, which pushes it to the other server and restores it. The roles run
//! on their own threads with their own control session, joined by a bounded
//! hand-off pipe so the source never runs far ahead of the target.

use anyhow::{anyhow, Context, Result};
use std::any::Any;
use std::fs;
use std::io::{Read, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::Instant;
use tracing::{debug, info, warn};

use crate::commands;
use crate::error::{FtpError, ObjectError};
use crate::handoff::{pipe, Handoff, HandoffReceiver, HandoffSender, PIPE_CAPACITY};
use crate::logger::Logger;
use crate::net::{check, Session};
use crate::object::{LibraryList, ObjectRef, TypeList};
use crate::protocol::reply;
use crate::transfer;

/// What the source role searches and how it saves
#[derive(Debug, Clone)]
pub struct SourceOptions {
    pub libraries: LibraryList,
    pub types: TypeList,
    pub release: String,
}

impl Default for SourceOptions {
    fn default() -> Self {
        SourceOptions {
            libraries: LibraryList::default(),
            types: TypeList::default(),
            release: commands::DEFAULT_RELEASE.to_string(),
        }
    }
}

/// Where the target role restores. `None` keeps the saved library.
#[derive(Debug, Clone, Default)]
pub struct TargetOptions {
    pub library: Option<String>,
}

/// Status of a role whose thread panicked. Kept apart from the runtime
/// failure bit so `source | target` still shows an abnormal termination.
pub const EXIT_ABORTED: i32 = 4;

/// How a role finished
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoleStatus {
    Exited(i32),
    /// The role's thread panicked
    Aborted(String),
}

impl RoleStatus {
    pub fn code(&self) -> i32 {
        match self {
            RoleStatus::Exited(code) => *code,
            RoleStatus::Aborted(_) => EXIT_ABORTED,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineOutcome {
    pub source: RoleStatus,
    pub target: RoleStatus,
}

impl PipelineOutcome {
    /// Non-zero if either role failed
    pub fn code(&self) -> i32 {
        self.source.code() | self.target.code()
    }
}

/// True when the error left the control connection unusable, so cleanup
/// commands would only burn their own retry budget.
pub fn session_lost(err: &anyhow::Error) -> bool {
    err.chain().any(|cause| {
        cause
            .downcast_ref::<FtpError>()
            .is_some_and(FtpError::is_fatal_to_session)
    })
}

/// Save `object` remotely and download it. Returns the library it was
/// found in and the local file holding the save file.
pub fn download_object<S: Read + Write>(
    session: &mut Session<S>,
    opts: &SourceOptions,
    object: &ObjectRef,
    logger: &dyn Logger,
) -> Result<(String, PathBuf)> {
    let container = commands::container_name();
    session
        .rcmd(&commands::create_savf(&container))
        .context("failed to create save file")?;

    let result: Result<(String, PathBuf)> = (|| {
        let (library, kind) = save_into(session, opts, object, &container)?;
        info!(session = %session.label(), "saved {} from {} as {}", object.name, library, kind);

        let remote = commands::transfer_name();
        session
            .rcmd(&commands::copy_to_stream(&container, &remote))
            .context("failed to copy to stream file")?;

        let local = tempfile::Builder::new()
            .prefix("zs-")
            .tempfile()
            .context("failed to create output file")?
            .into_temp_path();
        let bytes = match transfer::get(session, &local, &remote) {
            Ok(bytes) => bytes,
            Err(e) => {
                if !e.is_fatal_to_session() {
                    let _ = session.delete(&remote);
                }
                return Err(e).context("failed to get file");
            }
        };
        session
            .delete(&remote)
            .context("failed to remove tempfile")?;

        logger.saved(&object.name, &library, &kind, bytes);
        let path = local.keep().context("failed to keep output file")?;
        Ok((library, path))
    })();

    match result {
        Ok(done) => {
            if let Err(e) = session.rcmd(&commands::delete_file(&container)) {
                let _ = fs::remove_file(&done.1);
                return Err(e).context("failed to remove savf");
            }
            Ok(done)
        }
        Err(e) => {
            if !session_lost(&e) {
                if let Err(cleanup) = session.rcmd(&commands::delete_file(&container)) {
                    debug!(session = %session.label(), "leaving {}: {}", container, cleanup);
                }
            }
            Err(e)
        }
    }
}

// First library/type combination the server agrees to save wins
fn save_into<S: Read + Write>(
    session: &mut Session<S>,
    opts: &SourceOptions,
    object: &ObjectRef,
    container: &str,
) -> Result<(String, String)> {
    for library in object.libraries(&opts.libraries) {
        for kind in object.types(&opts.types) {
            let command =
                commands::save_object(&object.name, kind, library, &opts.release, container);
            let answer = session.rcmd_capture(&command)?;
            match answer.code {
                reply::COMMAND_OK => return Ok((library.to_string(), kind.to_string())),
                reply::NOT_LOGGED_IN => {
                    return Err(FtpError::NotLoggedIn {
                        message: answer.message,
                    })
                    .context("failed to save object")
                }
                _ => debug!(
                    session = %session.label(),
                    "{}{} not saved from {}: {}", object.name, kind, library, answer
                ),
            }
        }
    }
    Err(ObjectError::NotFound(object.to_string()).into())
}

/// Source role: download every object in order and hand each one over.
/// Dropping the sender on failure ends the target's loop.
pub fn run_source<S: Read + Write, W: Write>(
    session: &mut Session<S>,
    opts: &SourceOptions,
    objects: &[ObjectRef],
    mut handoff: HandoffSender<W>,
    logger: &dyn Logger,
) -> Result<usize> {
    for object in objects {
        let (library, path) = match download_object(session, opts, object, logger) {
            Ok(done) => done,
            Err(e) => {
                logger.error("source", &object.to_string(), &format!("{:#}", e));
                return Err(e.context(format!("failed to copy {}", object)));
            }
        };
        if let Err(e) = handoff.send(&library, &path) {
            let _ = fs::remove_file(&path);
            return Err(e).context("failed to write to target");
        }
    }
    handoff.finish().context("failed to write to target")?;
    Ok(objects.len())
}

/// Upload one handed-off save file and restore it. The local file is
/// removed whatever happens.
pub fn upload_object<S: Read + Write>(
    session: &mut Session<S>,
    opts: &TargetOptions,
    item: &Handoff,
    logger: &dyn Logger,
) -> Result<()> {
    let remote = commands::transfer_name();
    let sent = transfer::put(session, &item.path, &remote);
    if let Err(e) = fs::remove_file(&item.path) {
        debug!(session = %session.label(), "remove {}: {}", item.path.display(), e);
    }
    let bytes = match sent {
        Ok(bytes) => bytes,
        Err(e) => {
            // the server may have kept a partial file
            if !e.is_fatal_to_session() {
                let _ = session.delete(&remote);
            }
            return Err(e).context("failed to put file");
        }
    };

    let container = commands::container_name();
    if let Err(e) = session.rcmd(&commands::copy_from_stream(&remote, &container)) {
        if !e.is_fatal_to_session() {
            let _ = session.delete(&remote);
        }
        return Err(e).context("failed to copy from stream file");
    }

    let into = opts.library.as_deref().unwrap_or(&item.library);
    let result: Result<()> = (|| {
        session
            .delete(&remote)
            .context("failed to remove tempfile")?;

        let answer = session.rcmd_capture(&commands::restore_objects(&item.library, &container, into))?;
        if answer.code != reply::COMMAND_OK {
            if commands::restore_partially_ok(&answer) {
                warn!(session = %session.label(), "restore into {} partial: {}", into, answer.message);
            } else {
                check(reply::COMMAND_OK, answer).context("failed to restore object")?;
            }
        }
        Ok(())
    })();

    match result {
        Ok(()) => {
            session
                .rcmd(&commands::delete_file(&container))
                .context("failed to remove savf")?;
            logger.restored(&item.library, into, bytes);
            info!(session = %session.label(), "restored {} bytes into {}", bytes, into);
            Ok(())
        }
        Err(e) => {
            if !session_lost(&e) {
                let _ = session.rcmd(&commands::delete_file(&container));
            }
            Err(e)
        }
    }
}

/// Target role: restore hand-offs until the end marker or end of stream
pub fn run_target<S: Read + Write, R: Read>(
    session: &mut Session<S>,
    opts: &TargetOptions,
    handoff: &mut HandoffReceiver<R>,
    logger: &dyn Logger,
) -> Result<usize> {
    let mut restored = 0;
    while let Some(item) = handoff.next_handoff()? {
        if let Err(e) = upload_object(session, opts, &item, logger) {
            logger.error("target", &item.path.display().to_string(), &format!("{:#}", e));
            return Err(e.context(format!("failed to restore {}", item.library)));
        }
        restored += 1;
    }
    Ok(restored)
}

/// Run both roles to completion and collect how each one ended
pub fn run_pipeline<S, T>(
    mut source: Session<S>,
    mut target: Session<T>,
    source_opts: SourceOptions,
    target_opts: TargetOptions,
    objects: Vec<ObjectRef>,
    logger: Arc<dyn Logger>,
) -> Result<PipelineOutcome>
where
    S: Read + Write + Send + 'static,
    T: Read + Write + Send + 'static,
{
    let started = Instant::now();
    logger.start(source.label(), target.label(), objects.len());
    let (writer, reader) = pipe(PIPE_CAPACITY);

    let source_logger = logger.clone();
    let source_handle = thread::Builder::new()
        .name("zs-source".into())
        .spawn(move || {
            let result = run_source(
                &mut source,
                &source_opts,
                &objects,
                HandoffSender::new(writer),
                &*source_logger,
            );
            finish_role("source", source, result)
        })
        .context("failed to start source role")?;

    let target_logger = logger.clone();
    let target_handle = thread::Builder::new()
        .name("zs-target".into())
        .spawn(move || {
            let mut handoff = HandoffReceiver::new(reader);
            let result = run_target(&mut target, &target_opts, &mut handoff, &*target_logger);
            if result.is_err() {
                // stop the source and drop save files it already handed over
                for path in handoff.abandon() {
                    let _ = fs::remove_file(&path);
                }
            }
            finish_role("target", target, result)
        });
    let target_handle = match target_handle {
        Ok(handle) => handle,
        Err(e) => {
            // the source sees a closed pipe and stops on its own
            let _ = source_handle.join();
            return Err(anyhow!(e).context("failed to start target role"));
        }
    };

    let outcome = PipelineOutcome {
        source: role_status(source_handle.join()),
        target: role_status(target_handle.join()),
    };
    logger.done(outcome.code(), started.elapsed().as_secs_f64());
    Ok(outcome)
}

fn finish_role<S: Read + Write>(role: &str, mut session: Session<S>, result: Result<usize>) -> i32 {
    let code = match &result {
        Ok(count) => {
            debug!(session = %session.label(), "{} role done, {} objects", role, count);
            0
        }
        Err(e) => {
            crate::report_error(e);
            1
        }
    };
    let usable = result.as_ref().err().map_or(true, |e| !session_lost(e));
    if usable {
        if let Err(e) = session.quit() {
            debug!(session = %session.label(), "quit: {}", e);
        }
    }
    session.close();
    code
}

fn role_status(joined: thread::Result<i32>) -> RoleStatus {
    match joined {
        Ok(code) => RoleStatus::Exited(code),
        Err(payload) => RoleStatus::Aborted(panic_message(payload.as_ref())),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "panicked".to_string()
    }
}
