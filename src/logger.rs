use anyhow::{Context, Result};
use chrono::Utc;
use parking_lot::Mutex;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;

/// Journal of pipeline events. Both roles share one logger.
pub trait Logger: Send + Sync {
    fn start(&self, _source: &str, _target: &str, _objects: usize) {}
    fn saved(&self, _object: &str, _library: &str, _kind: &str, _bytes: u64) {}
    fn restored(&self, _library: &str, _into: &str, _bytes: u64) {}
    fn error(&self, _role: &str, _object: &str, _msg: &str) {}
    fn done(&self, _code: i32, _seconds: f64) {}
}

pub struct NoopLogger;
impl Logger for NoopLogger {}

pub struct TextLogger {
    file: Mutex<File>,
}

impl TextLogger {
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).ok();
        }
        let f = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("failed to open log file {}", path.display()))?;
        Ok(Self {
            file: Mutex::new(f),
        })
    }

    fn line(&self, s: &str) {
        let mut f = self.file.lock();
        let _ = writeln!(f, "[{}] {}", Utc::now().to_rfc3339(), s);
    }
}

impl Logger for TextLogger {
    fn start(&self, source: &str, target: &str, objects: usize) {
        self.line(&format!("START source={source} target={target} objects={objects}"));
    }
    fn saved(&self, object: &str, library: &str, kind: &str, bytes: u64) {
        self.line(&format!(
            "SAVE object={} lib={} type={} bytes={}",
            object, library, kind, bytes
        ));
    }
    fn restored(&self, library: &str, into: &str, bytes: u64) {
        self.line(&format!("RESTORE lib={library} into={into} bytes={bytes}"));
    }
    fn error(&self, role: &str, object: &str, msg: &str) {
        self.line(&format!("ERROR role={} object={} msg={}", role, object, msg));
    }
    fn done(&self, code: i32, seconds: f64) {
        self.line(&format!("DONE code={code} seconds={seconds:.3}"));
    }
}
