//! zs - work with, and move objects from one AS/400 to another
//!
//! Exit status: 0 success, 1 runtime failure, 2 usage or configuration error.
//! For `copy` the status is the OR of both roles, and 4 is set when a role's
//! thread died abnormally.

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use std::io::{self, Write};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use zs::analyze::Analyzer;
use zs::cli::{AnalyzeArgs, Cli, Command, CopyArgs};
use zs::copy::{run_pipeline, RoleStatus};
use zs::logger::{Logger, NoopLogger, TextLogger};
use zs::net::Session;
use zs::report_error;

const EXIT_FAILURE: i32 = 1;
const EXIT_USAGE: i32 = 2;

fn main() {
    if let Err(e) = ctrlc::set_handler(move || {
        eprintln!("\nInterrupted by user. Exiting (Ctrl-C)...");
        // 128 + SIGINT
        std::process::exit(130);
    }) {
        eprintln!("{}: failed to set Ctrl-C handler: {}", zs::PROGRAM_NAME, e);
    }

    let cli = Cli::parse();
    init_tracing(cli.verbosity());

    let code = match &cli.command {
        Command::Copy(args) => copy_main(args),
        Command::Analyze(args) => analyze_main(args),
    };
    std::process::exit(code);
}

fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .init();
}

fn copy_main(args: &CopyArgs) -> i32 {
    let plan = match args.plan() {
        Ok(plan) => plan,
        Err(e) => {
            report_error(&e);
            return EXIT_USAGE;
        }
    };

    let result = (|| -> Result<i32> {
        let logger: Arc<dyn Logger> = match &plan.log_file {
            Some(path) => Arc::new(TextLogger::new(path)?),
            None => Arc::new(NoopLogger),
        };
        let source =
            Session::connect(&plan.source, "source").context("failed to connect to source")?;
        let target =
            Session::connect(&plan.target, "target").context("failed to connect to target")?;

        let outcome = run_pipeline(
            source,
            target,
            plan.source_opts.clone(),
            plan.target_opts.clone(),
            plan.objects.clone(),
            logger,
        )?;
        for (role, status) in [("source", &outcome.source), ("target", &outcome.target)] {
            if let RoleStatus::Aborted(msg) = status {
                report_error(&anyhow!("{} role aborted: {}", role, msg));
            }
        }
        Ok(outcome.code())
    })();

    match result {
        Ok(code) => code,
        Err(e) => {
            report_error(&e);
            EXIT_FAILURE
        }
    }
}

fn analyze_main(args: &AnalyzeArgs) -> i32 {
    let plan = match args.plan() {
        Ok(plan) => plan,
        Err(e) => {
            report_error(&e);
            return EXIT_USAGE;
        }
    };

    let result = (|| -> Result<i32> {
        let mut session =
            Session::connect(&plan.params, "analyze").context("failed to connect to server")?;
        let stdout = io::stdout();
        let mut analyzer = Analyzer::new(&mut session, plan.opts, stdout.lock());
        for root in &plan.roots {
            analyzer.analyze(root)?;
        }
        let code = analyzer.exit_code();
        analyzer.into_output().flush()?;
        if let Err(e) = session.quit() {
            tracing::debug!("quit: {}", e);
        }
        session.close();
        Ok(code)
    })();

    match result {
        Ok(code) => code,
        Err(e) => {
            report_error(&e);
            EXIT_FAILURE
        }
    }
}
