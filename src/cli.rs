//! Command line for `zs copy` and `zs analyze`
//!
//! Every conversion here fails with a usage error (exit status 2); nothing
//! touches the network.

use anyhow::{bail, Context, Result};
use clap::{ArgAction, Args, Parser, Subcommand};
use std::path::PathBuf;

use crate::analyze::AnalyzeOptions;
use crate::config::ConnectionParams;
use crate::copy::{SourceOptions, TargetOptions};
use crate::object::{normalize_name, LibraryList, ObjectRef, TypeList};

#[derive(Parser, Debug)]
#[command(
    name = "zs",
    author,
    version,
    about = "Work with, and move objects from one AS/400 to another"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Copy objects from one AS/400 to another
    Copy(CopyArgs),
    /// Print the dependencies of objects
    Analyze(AnalyzeArgs),
}

impl Cli {
    pub fn verbosity(&self) -> u8 {
        match &self.command {
            Command::Copy(args) => args.verbose,
            Command::Analyze(args) => args.verbose,
        }
    }
}

#[derive(Args, Debug, Clone, Default)]
pub struct CopyArgs {
    /// Level of verbosity, can be given multiple times
    #[arg(short = 'v', action = ArgAction::Count)]
    pub verbose: u8,

    /// Source host
    #[arg(short = 's', value_name = "HOST")]
    pub source_host: Option<String>,

    /// Source user
    #[arg(short = 'u', value_name = "USER")]
    pub source_user: Option<String>,

    /// Source port
    #[arg(short = 'p', value_name = "PORT")]
    pub source_port: Option<u16>,

    /// Source library list, comma separated
    #[arg(short = 'l', value_name = "LIBL")]
    pub libraries: Option<String>,

    /// Type list, comma separated
    #[arg(short = 't', value_name = "TYPES")]
    pub types: Option<String>,

    /// Maximum polls for the source to respond
    #[arg(short = 'm', value_name = "TRIES")]
    pub source_tries: Option<u32>,

    /// Target release
    #[arg(short = 'r', value_name = "RELEASE")]
    pub release: Option<String>,

    /// Source config file
    #[arg(short = 'c', value_name = "FILE")]
    pub source_config: Option<String>,

    /// Target host
    #[arg(short = 'S', value_name = "HOST")]
    pub target_host: Option<String>,

    /// Target user
    #[arg(short = 'U', value_name = "USER")]
    pub target_user: Option<String>,

    /// Target port
    #[arg(short = 'P', value_name = "PORT")]
    pub target_port: Option<u16>,

    /// Target destination library
    #[arg(short = 'L', value_name = "LIB")]
    pub target_library: Option<String>,

    /// Maximum polls for the target to respond
    #[arg(short = 'M', value_name = "TRIES")]
    pub target_tries: Option<u32>,

    /// Target config file
    #[arg(short = 'C', value_name = "FILE")]
    pub target_config: Option<String>,

    /// Append pipeline events to this file
    #[arg(long = "log-file", value_name = "PATH")]
    pub log_file: Option<PathBuf>,

    /// Objects as LIB/OBJ*TYPE, LIB/OBJ, OBJ*TYPE or OBJ
    #[arg(value_name = "OBJECT")]
    pub objects: Vec<String>,
}

#[derive(Args, Debug, Clone, Default)]
pub struct AnalyzeArgs {
    /// Level of verbosity, can be given multiple times
    #[arg(short = 'v', action = ArgAction::Count)]
    pub verbose: u8,

    /// Host
    #[arg(short = 's', value_name = "HOST")]
    pub host: Option<String>,

    /// User
    #[arg(short = 'u', value_name = "USER")]
    pub user: Option<String>,

    /// Port
    #[arg(short = 'p', value_name = "PORT")]
    pub port: Option<u16>,

    /// Maximum polls for the server to respond
    #[arg(short = 'm', value_name = "TRIES")]
    pub tries: Option<u32>,

    /// Config file
    #[arg(short = 'c', value_name = "FILE")]
    pub config: Option<String>,

    /// Also follow files built over physical files
    #[arg(long = "access-paths")]
    pub access_paths: bool,

    /// Objects as LIB/OBJ or LIB/OBJ*TYPE
    #[arg(value_name = "OBJECT")]
    pub objects: Vec<String>,
}

/// Connection flags of one side; config file first, explicit flags win
struct Endpoint<'a> {
    config: Option<&'a str>,
    host: Option<&'a str>,
    user: Option<&'a str>,
    port: Option<u16>,
    tries: Option<u32>,
    verbosity: u8,
}

impl Endpoint<'_> {
    fn params(&self, side: &str) -> Result<ConnectionParams> {
        let mut params = ConnectionParams::default();
        if let Some(config) = self.config {
            params
                .apply_config_file(config)
                .with_context(|| format!("failed to parse {} config file", side))?;
        }
        if let Some(host) = self.host {
            params.host = host.to_string();
        }
        if let Some(user) = self.user {
            params.user = user.to_string();
        }
        if let Some(port) = self.port {
            params.port = port;
        }
        if let Some(tries) = self.tries {
            params.max_tries = tries;
        }
        params.verbosity = self.verbosity;
        Ok(params)
    }
}

/// Everything `zs copy` needs, validated
#[derive(Debug)]
pub struct CopyPlan {
    pub source: ConnectionParams,
    pub target: ConnectionParams,
    pub source_opts: SourceOptions,
    pub target_opts: TargetOptions,
    pub objects: Vec<ObjectRef>,
    pub log_file: Option<PathBuf>,
}

impl CopyArgs {
    pub fn plan(&self) -> Result<CopyPlan> {
        let source = Endpoint {
            config: self.source_config.as_deref(),
            host: self.source_host.as_deref(),
            user: self.source_user.as_deref(),
            port: self.source_port,
            tries: self.source_tries,
            verbosity: self.verbose,
        }
        .params("source")?;
        let target = Endpoint {
            config: self.target_config.as_deref(),
            host: self.target_host.as_deref(),
            user: self.target_user.as_deref(),
            port: self.target_port,
            tries: self.target_tries,
            verbosity: self.verbose,
        }
        .params("target")?;

        let mut source_opts = SourceOptions::default();
        if let Some(list) = &self.libraries {
            source_opts.libraries =
                LibraryList::parse(list).context("failed to parse library list")?;
        }
        if let Some(list) = &self.types {
            source_opts.types = TypeList::parse(list).context("failed to parse types")?;
        }
        if let Some(release) = &self.release {
            source_opts.release = release.trim().to_ascii_uppercase();
        }
        let target_opts = TargetOptions {
            library: self
                .target_library
                .as_deref()
                .map(normalize_name)
                .transpose()
                .context("failed to parse target library")?,
        };

        let objects = parse_objects(&self.objects)?;
        if let Some(orphan) = objects
            .iter()
            .find(|o| o.library.is_none() && source_opts.libraries.is_empty())
        {
            bail!("object {} has no library and the library list is empty", orphan);
        }

        Ok(CopyPlan {
            source,
            target,
            source_opts,
            target_opts,
            objects,
            log_file: self.log_file.clone(),
        })
    }
}

/// Everything `zs analyze` needs, validated
#[derive(Debug)]
pub struct AnalyzePlan {
    pub params: ConnectionParams,
    pub opts: AnalyzeOptions,
    pub roots: Vec<ObjectRef>,
}

impl AnalyzeArgs {
    pub fn plan(&self) -> Result<AnalyzePlan> {
        let params = Endpoint {
            config: self.config.as_deref(),
            host: self.host.as_deref(),
            user: self.user.as_deref(),
            port: self.port,
            tries: self.tries,
            verbosity: self.verbose,
        }
        .params("server")?;
        let roots = parse_objects(&self.objects)?;
        if let Some(orphan) = roots.iter().find(|o| o.library.is_none()) {
            bail!("failed to parse object: {} (expected LIB/OBJ)", orphan);
        }
        Ok(AnalyzePlan {
            params,
            opts: AnalyzeOptions {
                access_paths: self.access_paths,
            },
            roots,
        })
    }
}

fn parse_objects(raw: &[String]) -> Result<Vec<ObjectRef>> {
    if raw.is_empty() {
        bail!("missing object");
    }
    raw.iter()
        .map(|s| s.parse::<ObjectRef>().context("failed to parse object"))
        .collect()
}
