// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

use forgeini::{
    config::Settings,
    ini::canon::{canonical, changed_sections, fingerprint},
    merge::{merge_files_with, StaleKeys},
    path::default_settings_path,
    Document, IgnorePolicy, Reconciler,
};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::{fs::read_to_string, path::PathBuf, process::exit};
use tracing::{debug, error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Debug, Clone, Parser)]
#[command(
    about,
    override_usage = "\n  forgeini [options] <forgeini-command>",
    subcommand_help_heading = "Commands",
    version
)]
struct Cli {
    /// Path to settings file.
    #[arg(short, long, global = true, value_name = "path")]
    pub settings: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    fn run(self) -> Result<i32> {
        let settings = load_settings(self.settings)?;
        match self.command {
            Command::Reconcile(opts) => run_reconcile(settings, opts),
            Command::Merge(opts) => run_merge(settings, opts),
            Command::Diff(opts) => run_diff(settings, opts),
            Command::Fingerprint(opts) => run_fingerprint(settings, opts),
            Command::Canonical(opts) => run_canonical(settings, opts),
        }
    }
}

#[derive(Debug, Clone, Subcommand)]
enum Command {
    /// Replace deployed configuration if candidate changes anything relevant.
    #[command(override_usage = "forgeini reconcile [options]")]
    Reconcile(ReconcileOptions),

    /// Merge candidate configuration into base configuration.
    #[command(override_usage = "forgeini merge [options] <base> <candidate> --output <path>")]
    Merge(MergeOptions),

    /// List sections that differ between two configurations.
    #[command(override_usage = "forgeini diff [options] <left> <right>")]
    Diff(DiffOptions),

    /// Print fingerprint of configuration.
    #[command(override_usage = "forgeini fingerprint [options] <file>")]
    Fingerprint(DumpOptions),

    /// Print canonical form of configuration.
    #[command(override_usage = "forgeini canonical [options] <file>")]
    Canonical(DumpOptions),
}

#[derive(Parser, Clone, Debug)]
#[command(author, about, long_about)]
struct ReconcileOptions {
    /// Deployed configuration file.
    #[arg(short, long, value_name = "path")]
    pub config: Option<PathBuf>,

    /// Candidate configuration file.
    #[arg(short, long, value_name = "path")]
    pub new_config: Option<PathBuf>,

    /// Ignore policy as JSON mapping of section to key list.
    #[arg(short, long, value_name = "json")]
    pub ignore: Option<IgnorePolicy>,

    /// Stale key treatment, "retain" or "prune".
    #[arg(long, value_name = "mode")]
    pub stale_keys: Option<StaleKeys>,

    /// Back up deployed configuration before replacing it.
    #[arg(short, long)]
    pub backup: bool,

    /// Report what would change without writing anything.
    #[arg(long)]
    pub check: bool,
}

#[derive(Parser, Clone, Debug)]
#[command(author, about, long_about)]
struct MergeOptions {
    /// Base configuration file, may be missing.
    #[arg(required = true, value_name = "base")]
    pub base: PathBuf,

    /// Candidate configuration file.
    #[arg(required = true, value_name = "candidate")]
    pub candidate: PathBuf,

    /// Where to write merged configuration.
    #[arg(short, long, required = true, value_name = "path")]
    pub output: PathBuf,

    /// Ignore policy as JSON mapping of section to key list.
    #[arg(short, long, value_name = "json")]
    pub ignore: Option<IgnorePolicy>,

    /// Stale key treatment, "retain" or "prune".
    #[arg(long, value_name = "mode")]
    pub stale_keys: Option<StaleKeys>,
}

#[derive(Parser, Clone, Debug)]
#[command(author, about, long_about)]
struct DiffOptions {
    #[arg(required = true, value_name = "left")]
    pub left: PathBuf,

    #[arg(required = true, value_name = "right")]
    pub right: PathBuf,

    /// Ignore policy as JSON mapping of section to key list.
    #[arg(short, long, value_name = "json")]
    pub ignore: Option<IgnorePolicy>,

    /// Exit with status 2 if configurations differ.
    #[arg(long)]
    pub exit_code: bool,
}

#[derive(Parser, Clone, Debug)]
#[command(author, about, long_about)]
struct DumpOptions {
    #[arg(required = true, value_name = "file")]
    pub file: PathBuf,

    /// Ignore policy as JSON mapping of section to key list.
    #[arg(short, long, value_name = "json")]
    pub ignore: Option<IgnorePolicy>,
}

fn main() {
    let layer = fmt::layer()
        .compact()
        .with_target(false)
        .without_time()
        .with_writer(std::io::stderr);
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info"))
        .unwrap();
    tracing_subscriber::registry()
        .with(layer)
        .with(filter)
        .init();

    match run() {
        Ok(code) => exit(code),
        Err(error) => {
            error!("{error:?}");
            exit(1);
        }
    }
}

fn run() -> Result<i32> {
    Cli::parse().run()
}

fn load_settings(path: Option<PathBuf>) -> Result<Settings> {
    // INVARIANT: Explicit settings path must exist, default one may not.
    let path = match path {
        Some(path) => path,
        None => {
            let path = default_settings_path()?;
            if !path.exists() {
                debug!("no settings at {:?}, use defaults", path.display());
                return Ok(Settings::default());
            }
            path
        }
    };

    let data = read_to_string(&path)
        .with_context(|| format!("failed to read settings file {:?}", path.display()))?;
    let settings = data
        .parse::<Settings>()
        .with_context(|| format!("invalid settings file {:?}", path.display()))?;

    Ok(settings)
}

fn run_reconcile(settings: Settings, opts: ReconcileOptions) -> Result<i32> {
    let reconciler = Reconciler::new(
        opts.config.unwrap_or(settings.paths.config),
        opts.new_config.unwrap_or(settings.paths.new_config),
        opts.ignore.unwrap_or(settings.ignore),
    )
    .stale_keys(opts.stale_keys.unwrap_or(settings.reconcile.stale_keys))
    .backup(opts.backup || settings.reconcile.backup)
    .dry_run(opts.check);

    let report = reconciler.run()?;
    info!("{report}");
    println!("changed={}", report.changed());

    Ok(0)
}

fn run_merge(settings: Settings, opts: MergeOptions) -> Result<i32> {
    let report = merge_files_with(
        &opts.base,
        &opts.candidate,
        &opts.ignore.unwrap_or(settings.ignore),
        opts.stale_keys.unwrap_or(settings.reconcile.stale_keys),
        &opts.output,
    )?;

    println!("changed={}", report.changed());

    Ok(0)
}

fn run_diff(settings: Settings, opts: DiffOptions) -> Result<i32> {
    let policy = opts.ignore.unwrap_or(settings.ignore);
    let left = Document::load(&opts.left)?;
    let right = Document::load(&opts.right)?;

    let sections = changed_sections(&left, &right, &policy);
    for section in &sections {
        println!("{section}");
    }

    if opts.exit_code && !sections.is_empty() {
        return Ok(2);
    }

    Ok(0)
}

fn run_fingerprint(settings: Settings, opts: DumpOptions) -> Result<i32> {
    let policy = opts.ignore.unwrap_or(settings.ignore);
    let document = Document::load(&opts.file)?;
    println!("{}", fingerprint(&document, &policy));

    Ok(0)
}

fn run_canonical(settings: Settings, opts: DumpOptions) -> Result<i32> {
    let policy = opts.ignore.unwrap_or(settings.ignore);
    let document = Document::load(&opts.file)?;
    print!("{}", canonical(&document, &policy));

    Ok(0)
}
