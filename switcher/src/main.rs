//! `project` - fuzzy-pick a git project and switch to its tmux session.
//!
//! Reads root directories from the config file, shows cached projects
//! immediately while rescanning in the background, and creates or switches to
//! the tmux session of the chosen project.
//!
//! Exit status is 0 after a successful switch or attach, 1 when the picker is
//! cancelled or anything fails. Cancelling exits non-zero so shell bindings
//! wrapping the command can tell the two apart.

use std::fs::{self, OpenOptions};
use std::io;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

use project_switcher::config::{self, Config};
use project_switcher::index::{CandidateList, ProjectIndex};
use project_switcher::scanner::{ScanOptions, ScanReport, ScanSet};
use project_switcher::session::{SessionReconciler, Tmux};
use project_switcher::tui::{install_panic_hook, run_picker, Selection, DEFAULT_HEADER};

/// Pick a project and switch to its tmux session.
#[derive(Parser, Debug)]
#[command(name = "project")]
#[command(author, version, about, long_about = None)]
#[command(after_help = "\
ENVIRONMENT VARIABLES:
    PROJECT_CONFIG     Config file (default: ~/.config/project/config.toml)
    PROJECT_CACHE      Project cache file (default: ~/.cache/project/config.json)
    PROJECT_TMUX_BIN   tmux executable (default: tmux)
    RUST_LOG           Log filter; logs go to project.log beside the cache
    NO_COLOR           Disable colors in the picker

EXAMPLES:
    # Pick a project
    project

    # Forget cached projects and rescan everything
    project --clear

    # Refresh the cache without opening the picker
    project --scan-only
")]
struct Cli {
    /// Clear the project cache before scanning.
    #[arg(short, long)]
    clear: bool,

    /// Config file to use instead of the default.
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Scan all roots, save the cache, print the project count, and exit.
    #[arg(long)]
    scan_only: bool,

    /// Log at debug level unless RUST_LOG says otherwise.
    #[arg(short, long)]
    verbose: bool,
}

/// How a run ended without error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Switched,
    Aborted,
    Scanned(usize),
}

impl Outcome {
    fn exit_code(self) -> ExitCode {
        match self {
            Outcome::Switched | Outcome::Scanned(_) => ExitCode::SUCCESS,
            Outcome::Aborted => ExitCode::FAILURE,
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match run(&cli) {
        Ok(outcome) => {
            debug!(?outcome, "Exiting");
            if let Outcome::Scanned(count) = outcome {
                println!("{count}");
            }
            outcome.exit_code()
        }
        Err(e) => {
            error!("{e:#}");
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: &Cli) -> Result<Outcome> {
    let config = Config::load(cli.config.as_deref()).context("Failed to load configuration")?;
    info!(
        config = %config.config_path.display(),
        roots = config.root_dirs.len(),
        "Configuration loaded"
    );

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to create tokio runtime")?;

    let index = ProjectIndex::load(&config.cache_path, cli.clear)
        .context("Failed to load project cache")?;
    info!(known = index.len(), clear = cli.clear, "Project cache loaded");
    let index = Arc::new(index);

    if !cli.scan_only {
        install_panic_hook();
    }

    let result = runtime.block_on(switch_project(&config, Arc::clone(&index), cli.scan_only));

    // Scanners still walking are abandoned; their finds are already saved or discarded.
    runtime.shutdown_background();
    result
}

async fn switch_project(config: &Config, index: Arc<ProjectIndex>, scan_only: bool) -> Result<Outcome> {
    let candidates = CandidateList::new(index.snapshot());
    let mut scans = ScanSet::spawn(
        &config.root_dirs,
        ScanOptions::from(config),
        Arc::clone(&index),
        candidates.clone(),
    );

    if scan_only {
        log_reports(&scans.wait_all().await);
        save(&index)?;
        return Ok(Outcome::Scanned(index.len()));
    }

    let selection = run_picker(candidates.clone(), DEFAULT_HEADER).await;
    log_reports(&scans.collect_finished());

    let selection = match selection {
        Ok(selection) => selection,
        Err(e) => {
            save_best_effort(&index);
            return Err(e).context("Project picker failed");
        }
    };

    let index_position = match selection {
        Selection::Chosen(index_position) => index_position,
        Selection::Aborted => {
            info!("Selection aborted");
            save(&index)?;
            return Ok(Outcome::Aborted);
        }
    };

    let Some(record) = candidates.get(index_position) else {
        save_best_effort(&index);
        anyhow::bail!("Selected project {index_position} is not in the candidate list");
    };
    info!(path = %record.full_path().display(), session = %record.session_name(), "Project selected");

    // Attaching blocks until the client detaches, so save first.
    save_best_effort(&index);

    let reconciled = tokio::task::spawn_blocking(move || {
        SessionReconciler::new(Tmux::from_env()).reconcile(&record)
    })
    .await;

    // Scanners kept running during reconcile; save again to keep what they found since.
    log_reports(&scans.collect_finished());
    let saved = save(&index);

    let state = reconciled
        .context("Session task failed")?
        .context("Failed to switch tmux session")?;
    debug!(?state, "Session reconciled");
    saved?;

    Ok(Outcome::Switched)
}

fn save(index: &ProjectIndex) -> Result<()> {
    index
        .persist()
        .with_context(|| format!("Failed to save project cache {}", index.store_path().display()))?;
    debug!(known = index.len(), "Project cache saved");
    Ok(())
}

fn save_best_effort(index: &ProjectIndex) {
    if let Err(e) = save(index) {
        warn!("{e:#}");
    }
}

fn log_reports(reports: &[ScanReport]) {
    for report in reports {
        if let Err(e) = &report.outcome {
            warn!(root = %report.root.display(), discovered = report.discovered, error = %e, "Scan incomplete");
        }
    }
}

/// Initializes logging to the log file.
///
/// The picker owns the terminal, so nothing is logged to stdout or stderr.
/// Without a usable log file, logs are discarded.
fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_level(true)
        .with_ansi(false);

    match open_log_file() {
        Ok(file) => builder.with_writer(Mutex::new(file)).init(),
        Err(_) => builder.with_writer(io::sink).init(),
    }
}

fn open_log_file() -> io::Result<fs::File> {
    let path = config::log_path()
        .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "no cache directory"))?;
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    OpenOptions::new().create(true).append(true).open(path)
}
