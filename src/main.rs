mod catalog;
mod check;
mod classify;
mod command;
mod engine;
mod host;
mod prototype;
mod report;
mod session;
mod types;

use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use serde_json::Value;
use tracing::{info, warn, Level};

use crate::check::check_catalog;
use crate::command::JniHelperCommand;
use crate::report::{build_invocation, build_sarif};
use crate::session::{AnalysisSession, ConsolePicker, ConsoleStatus};

/// CLI arguments for jni-helper execution.
#[derive(Parser, Debug)]
#[command(
    name = "jni-helper",
    about = "Apply JSON JNI signatures to functions discovered in a native library.",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
    /// Only log warnings and errors.
    #[arg(long, global = true)]
    quiet: bool,
    /// Log every declaration that is applied.
    #[arg(long, global = true, conflicts_with = "quiet")]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Apply a signature catalog to a function listing.
    Apply(ApplyArgs),
    /// Validate a signature catalog without applying it.
    Check(CheckArgs),
}

#[derive(Args, Debug)]
struct ApplyArgs {
    /// JSON array of `{"address", "name"}` objects.
    #[arg(long, value_name = "PATH")]
    functions: PathBuf,
    /// Signature catalog; `-` reads stdin. Prompts when omitted.
    #[arg(long, value_name = "PATH")]
    catalog: Option<PathBuf>,
    /// Where to write applied prototypes (stdout by default).
    #[arg(long, value_name = "PATH")]
    output: Option<PathBuf>,
    /// Write unmatched exports and failed binds as SARIF.
    #[arg(long, value_name = "PATH")]
    sarif: Option<PathBuf>,
    /// Unattended run.
    #[arg(long)]
    batch: bool,
    #[arg(long)]
    timing: bool,
}

#[derive(Args, Debug)]
struct CheckArgs {
    #[arg(value_name = "PATH")]
    catalog: PathBuf,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.quiet, cli.verbose);
    match cli.command {
        Commands::Apply(args) => run_apply(args, cli.quiet),
        Commands::Check(args) => run_check(args),
    }
}

fn init_logging(quiet: bool, verbose: bool) {
    let level = if verbose {
        Level::DEBUG
    } else if quiet {
        Level::WARN
    } else {
        Level::INFO
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .with_writer(io::stderr)
        .init();
}

fn run_apply(args: ApplyArgs, quiet: bool) -> Result<()> {
    let picker = ConsolePicker::new(args.catalog.clone());
    apply_with_picker(args, picker, quiet)
}

fn apply_with_picker(args: ApplyArgs, mut picker: ConsolePicker, quiet: bool) -> Result<()> {
    if !args.functions.exists() {
        anyhow::bail!("function listing not found: {}", args.functions.display());
    }

    let started_at = Instant::now();
    let mut session = AnalysisSession::from_listing(&args.functions)?;
    let status = ConsoleStatus::default();

    let command = JniHelperCommand;
    command.setup();
    let outcome = command.execute(&mut session, &mut picker, &status, i32::from(args.batch));
    command.teardown();

    let Some(result) = outcome? else {
        return Ok(());
    };
    eprintln!("{}", result.summary());

    let mut writer = output_writer(args.output.as_deref())?;
    serde_json::to_writer_pretty(&mut writer, &session.binding_records())
        .context("failed to serialize applied prototypes")?;
    writer
        .write_all(b"\n")
        .context("failed to write applied prototypes")?;

    if let Some(path) = args.sarif.as_deref() {
        let sarif = build_sarif(&result, build_invocation());
        let mut writer = output_writer(Some(path))?;
        serde_json::to_writer_pretty(&mut writer, &sarif)
            .context("failed to serialize SARIF output")?;
        writer
            .write_all(b"\n")
            .context("failed to write SARIF output")?;
        info!(path = %path.display(), "wrote SARIF report");
    }

    if args.timing && !quiet {
        eprintln!(
            "timing: total_ms={} functions={} bindings={}",
            started_at.elapsed().as_millis(),
            session.function_count(),
            session.bindings().count()
        );
    }

    Ok(())
}

fn run_check(args: CheckArgs) -> Result<()> {
    let text = fs::read_to_string(&args.catalog)
        .with_context(|| format!("failed to read {}", args.catalog.display()))?;
    let document: Value = serde_json::from_str(&text)
        .with_context(|| format!("failed to parse {}", args.catalog.display()))?;

    let report = check_catalog(&document)?;
    for name in &report.null_entries {
        warn!(name = %name, "entry is null and will be reported as unmatched");
    }
    for name in &report.unreachable {
        warn!(name = %name, "entry name is not a Java_ export and will never match");
    }
    for violation in &report.violations {
        eprintln!("{violation}");
    }

    if !report.is_valid() {
        anyhow::bail!(
            "{} invalid entries in {}",
            report.violations.len(),
            args.catalog.display()
        );
    }
    info!(entries = report.entries, "catalog is valid");
    Ok(())
}

fn output_writer(output: Option<&Path>) -> Result<Box<dyn Write>> {
    match output {
        Some(path) if path == Path::new("-") => Ok(Box::new(io::stdout())),
        Some(path) => Ok(Box::new(
            File::create(path).with_context(|| format!("failed to open {}", path.display()))?,
        )),
        None => Ok(Box::new(io::stdout())),
    }
}
