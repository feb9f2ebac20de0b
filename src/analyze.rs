//! Dependency discovery
//!
//! For each object the server is asked what it depends on (`DSPPGMREF`) and,
//! with access paths enabled, which files its access paths are based on
//! (`DSPFD TYPE(*ACCPTH)`) and which files are built over it (`DSPDBR`). The
//! outfile is exported as a fixed-width dump, pulled back over the data
//! channel and decoded. Every accepted object not seen before is printed and
//! explored in turn, depth first.

use anyhow::{anyhow, Context, Result};
use std::collections::HashSet;
use std::fmt;
use std::fs;
use std::io::{Read, Write};
use tracing::{debug, info};

use crate::commands;
use crate::copy::session_lost;
use crate::net::Session;
use crate::object::ObjectRef;
use crate::record::{DependencyRecord, RecordLayout, ACCPTH, DBR, PGMREF};
use crate::transfer;

/// The server's own library; never reported
pub const SYSTEM_LIBRARY: &str = "QSYS";
/// Libraries starting with this are unresolved variable references
pub const VARIABLE_MARKER: char = '&';

#[derive(Debug, Clone, Copy, Default)]
pub struct AnalyzeOptions {
    /// Also follow files built over physical files
    pub access_paths: bool,
}

/// One introspection command and the dump layout it produces
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Query {
    ProgramReferences,
    AccessPaths,
    DatabaseRelations,
}

impl Query {
    pub fn command(&self, library: &str, object: &str, outfile: &str) -> String {
        match self {
            Query::ProgramReferences => commands::program_references(library, object, outfile),
            Query::AccessPaths => commands::access_paths(library, object, outfile),
            Query::DatabaseRelations => commands::database_relations(library, object, outfile),
        }
    }

    pub fn layout(&self) -> &'static RecordLayout {
        match self {
            Query::ProgramReferences => &PGMREF,
            Query::AccessPaths => &ACCPTH,
            Query::DatabaseRelations => &DBR,
        }
    }
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Query::ProgramReferences => "DSPPGMREF",
            Query::AccessPaths => "DSPFD",
            Query::DatabaseRelations => "DSPDBR",
        })
    }
}

/// Walks the dependency graph from one or more roots over a single session.
/// Both sets live as long as the analyzer, so objects reachable from several
/// roots are still reported once. A root is reported only when some other
/// object leads back to it.
pub struct Analyzer<'a, S: Read + Write, W: Write> {
    session: &'a mut Session<S>,
    opts: AnalyzeOptions,
    out: W,
    /// Objects already printed
    visited: HashSet<(String, String)>,
    /// Objects whose queries have been issued
    explored: HashSet<(String, String)>,
    failures: usize,
}

impl<'a, S: Read + Write, W: Write> Analyzer<'a, S, W> {
    pub fn new(session: &'a mut Session<S>, opts: AnalyzeOptions, out: W) -> Self {
        Analyzer {
            session,
            opts,
            out,
            visited: HashSet::new(),
            explored: HashSet::new(),
            failures: 0,
        }
    }

    /// Objects reported so far
    pub fn visited(&self) -> usize {
        self.visited.len()
    }

    /// Objects whose exploration was cut short
    pub fn failures(&self) -> usize {
        self.failures
    }

    pub fn exit_code(&self) -> i32 {
        if self.failures > 0 {
            1
        } else {
            0
        }
    }

    pub fn into_output(self) -> W {
        self.out
    }

    /// Explore one root. Only a lost session is returned as an error; a
    /// failed query is reported and counted.
    pub fn analyze(&mut self, root: &ObjectRef) -> Result<()> {
        let library = root
            .library
            .clone()
            .ok_or_else(|| anyhow!("object {} has no library", root))?;
        self.explore(&library, &root.name, root.kind.as_deref())
    }

    /// Which queries apply to an object of `kind` (`None` = unknown)
    pub fn queries_for(&self, kind: Option<&str>) -> Vec<Query> {
        let mut queries = Vec::new();
        if matches!(kind, None | Some("*PGM") | Some("*SRVPGM")) {
            queries.push(Query::ProgramReferences);
        }
        if self.opts.access_paths && matches!(kind, None | Some("*FILE")) {
            queries.push(Query::AccessPaths);
            queries.push(Query::DatabaseRelations);
        }
        queries
    }

    /// Record filters, sentinel aside
    pub fn accepts(&self, record: &DependencyRecord) -> bool {
        if record.library.starts_with(VARIABLE_MARKER) || record.library == SYSTEM_LIBRARY {
            return false;
        }
        match record.kind.as_str() {
            "*PGM" | "*SRVPGM" => true,
            "*FILE" => self.opts.access_paths,
            _ => false,
        }
    }

    fn explore(&mut self, library: &str, object: &str, kind: Option<&str>) -> Result<()> {
        if !self.explored.insert((library.to_string(), object.to_string())) {
            return Ok(());
        }
        for query in self.queries_for(kind) {
            let records = match self.fetch(query, library, object) {
                Ok(records) => records,
                Err(e) if session_lost(&e) => return Err(e),
                Err(e) => {
                    crate::report_error(&e.context(format!("failed to analyze {}/{}", library, object)));
                    self.failures += 1;
                    return Ok(());
                }
            };
            debug!(session = %self.session.label(), "{} {}/{}: {} records", query, library, object, records.len());

            for record in records {
                if !self.accepts(&record) {
                    continue;
                }
                let key = (record.library.clone(), record.object.clone());
                if !self.visited.insert(key) {
                    continue;
                }
                writeln!(self.out, "{}/{}{}", record.library, record.object, record.kind)
                    .context("failed to write output")?;
                self.explore(&record.library, &record.object, Some(record.kind.as_str()))?;
            }
        }
        Ok(())
    }

    // Run `query` into a QTEMP outfile, export it and decode the dump
    fn fetch(&mut self, query: Query, library: &str, object: &str) -> Result<Vec<DependencyRecord>> {
        let outfile = commands::container_name();
        self.session
            .rcmd(&query.command(library, object, &outfile))
            .with_context(|| format!("failed to run {}", query))?;

        let session = &mut *self.session;
        let result: Result<Vec<DependencyRecord>> = (|| {
            let remote = commands::transfer_name();
            session
                .rcmd(&commands::export_fixed(&outfile, &remote))
                .context("failed to copy to import-file")?;

            let local = tempfile::Builder::new()
                .prefix("zs-")
                .tempfile()
                .context("failed to create output file")?;
            if let Err(e) = transfer::get(session, local.path(), &remote) {
                if !e.is_fatal_to_session() {
                    let _ = session.delete(&remote);
                }
                return Err(e).context("failed to get file");
            }
            session
                .delete(&remote)
                .context("failed to remove tempfile")?;

            let data = fs::read(local.path()).context("failed to read dump")?;
            let records = query.layout().decode(&data)?;
            info!(session = %session.label(), "{} {}/{}: {} bytes", query, library, object, data.len());
            Ok(records)
        })();

        let lost = result.as_ref().err().is_some_and(session_lost);
        if !lost {
            let dropped = self.session.rcmd(&commands::delete_file(&outfile));
            if let (Ok(_), Err(e)) = (&result, dropped) {
                return Err(e).context("failed to remove outfile");
            }
        }
        result
    }
}
