//! Landing the user in the tmux session for a chosen project.
//!
//! [`SessionReconciler::reconcile`] probes the multiplexer once, turns the
//! probe result into an ordered list of [`SessionAction`]s with the pure
//! [`plan`] function, and executes them. After a successful reconcile exactly
//! one session with the record's name exists and the client is on it.
//!
//! The [`Multiplexer`] trait is the process boundary; [`Tmux`] implements it
//! by shelling out to the `tmux` binary.

use std::env;
use std::ffi::OsStr;
use std::io;
use std::path::{Path, PathBuf};
use std::process::{Command, Output, Stdio};

use thiserror::Error;
use tracing::{debug, info};

use crate::types::PathRecord;

/// Environment variable overriding the tmux binary.
pub const TMUX_BIN_ENV: &str = "PROJECT_TMUX_BIN";

/// Set by tmux inside every client it spawns.
const TMUX_CLIENT_ENV: &str = "TMUX";

const DEFAULT_TMUX_BIN: &str = "tmux";

/// Diagnostics `list-sessions` prints when there is simply nothing to list.
const NO_SERVER_DIAGNOSTICS: [&str; 3] = ["no server running", "failed to connect", "no sessions"];

/// Failure of an external multiplexer command.
#[derive(Error, Debug)]
pub enum MultiplexerError {
    /// The binary could not be started at all.
    #[error("could not run `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: io::Error,
    },

    /// The command ran and reported failure.
    #[error("`{command}` failed: {details}")]
    Failed { command: String, details: String },
}

/// Operations the reconciler needs from a terminal multiplexer.
pub trait Multiplexer {
    /// Whether this process runs inside a client of the multiplexer.
    fn client_active(&self) -> bool;

    /// Names of all sessions on the server. No server means no sessions.
    fn list_sessions(&self) -> Result<Vec<String>, MultiplexerError>;

    /// Creates a detached session named `name` rooted at `dir`.
    fn new_session(&self, name: &str, dir: &Path) -> Result<(), MultiplexerError>;

    /// Moves the current client to the session named `name`.
    fn switch_client(&self, name: &str) -> Result<(), MultiplexerError>;

    /// Attaches this terminal to the session named `name`.
    ///
    /// Blocks until the client detaches.
    fn attach(&self, name: &str) -> Result<(), MultiplexerError>;
}

/// What the multiplexer looks like from where this process runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MultiplexerState {
    /// No active client. `has_session` tells whether the target already exists.
    Detached { has_session: bool },
    /// Inside a client, target session missing.
    AttachedNoSession,
    /// Inside a client, target session present.
    AttachedHasSession,
}

/// A single multiplexer command issued during reconciliation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionAction {
    Create,
    Switch,
    Attach,
}

/// Maps a probe result to the commands that bring the client to the target.
///
/// | state                              | actions          |
/// |------------------------------------|------------------|
/// | `Detached { has_session: false }`  | create, attach   |
/// | `Detached { has_session: true }`   | attach           |
/// | `AttachedNoSession`                | create, switch   |
/// | `AttachedHasSession`               | switch           |
#[must_use]
pub fn plan(state: MultiplexerState) -> Vec<SessionAction> {
    match state {
        MultiplexerState::Detached { has_session: false } => {
            vec![SessionAction::Create, SessionAction::Attach]
        }
        MultiplexerState::Detached { has_session: true } => vec![SessionAction::Attach],
        MultiplexerState::AttachedNoSession => vec![SessionAction::Create, SessionAction::Switch],
        MultiplexerState::AttachedHasSession => vec![SessionAction::Switch],
    }
}

/// Drives a [`Multiplexer`] to the session for a chosen record.
#[derive(Debug)]
pub struct SessionReconciler<M> {
    multiplexer: M,
}

impl<M: Multiplexer> SessionReconciler<M> {
    pub fn new(multiplexer: M) -> Self {
        Self { multiplexer }
    }

    /// The wrapped multiplexer.
    pub fn multiplexer(&self) -> &M {
        &self.multiplexer
    }

    /// Reads the client flag and the session list once.
    ///
    /// Session existence is an exact name match; `proj-old` does not count
    /// as `proj`.
    pub fn probe(&self, session_name: &str) -> Result<MultiplexerState, MultiplexerError> {
        let has_session = self
            .multiplexer
            .list_sessions()?
            .iter()
            .any(|name| name == session_name);

        let state = match (self.multiplexer.client_active(), has_session) {
            (false, has_session) => MultiplexerState::Detached { has_session },
            (true, false) => MultiplexerState::AttachedNoSession,
            (true, true) => MultiplexerState::AttachedHasSession,
        };
        debug!(session = session_name, ?state, "Probed multiplexer");
        Ok(state)
    }

    /// Brings the client to the session for `record`, creating it if needed.
    ///
    /// The first failing command ends reconciliation; nothing is retried.
    pub fn reconcile(&self, record: &PathRecord) -> Result<MultiplexerState, MultiplexerError> {
        let name = record.session_name();
        let state = self.probe(name)?;

        for action in plan(state) {
            debug!(session = name, ?action, "Running session action");
            match action {
                SessionAction::Create => {
                    self.multiplexer.new_session(name, record.full_path())?;
                    info!(session = name, path = %record.full_path().display(), "Created session");
                }
                SessionAction::Switch => self.multiplexer.switch_client(name)?,
                SessionAction::Attach => self.multiplexer.attach(name)?,
            }
        }

        Ok(state)
    }
}

/// [`Multiplexer`] backed by the `tmux` executable.
#[derive(Debug, Clone)]
pub struct Tmux {
    bin: PathBuf,
    inside_client: bool,
}

impl Tmux {
    /// Creates a backend with an explicit binary and client flag.
    pub fn new(bin: impl Into<PathBuf>, inside_client: bool) -> Self {
        Self {
            bin: bin.into(),
            inside_client,
        }
    }

    /// Reads `PROJECT_TMUX_BIN` and `TMUX` from the environment.
    #[must_use]
    pub fn from_env() -> Self {
        let bin = env::var_os(TMUX_BIN_ENV)
            .filter(|value| !value.is_empty())
            .map_or_else(|| PathBuf::from(DEFAULT_TMUX_BIN), PathBuf::from);
        let inside_client = env::var_os(TMUX_CLIENT_ENV).is_some_and(|value| !value.is_empty());
        Self::new(bin, inside_client)
    }

    fn command<I, S>(&self, args: I) -> Command
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let mut command = Command::new(&self.bin);
        command.args(args);
        command
    }

    fn describe(&self, args: &[&str]) -> String {
        let mut line = self.bin.display().to_string();
        for arg in args {
            line.push(' ');
            line.push_str(arg);
        }
        line
    }

    fn output(&self, args: &[&str]) -> Result<Output, MultiplexerError> {
        self.command(args)
            .stdin(Stdio::null())
            .output()
            .map_err(|source| MultiplexerError::Spawn {
                command: self.describe(args),
                source,
            })
    }

    fn run(&self, args: &[&str]) -> Result<(), MultiplexerError> {
        let output = self.output(args)?;
        if output.status.success() {
            Ok(())
        } else {
            Err(command_failure(self.describe(args), &output))
        }
    }
}

impl Multiplexer for Tmux {
    fn client_active(&self) -> bool {
        self.inside_client
    }

    fn list_sessions(&self) -> Result<Vec<String>, MultiplexerError> {
        let args = ["list-sessions", "-F", "#S"];
        let output = self.output(&args)?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).to_ascii_lowercase();
            if NO_SERVER_DIAGNOSTICS.iter().any(|needle| stderr.contains(needle)) {
                debug!("No tmux server running");
                return Ok(Vec::new());
            }
            return Err(command_failure(self.describe(&args), &output));
        }

        Ok(parse_session_list(&String::from_utf8_lossy(&output.stdout)))
    }

    fn new_session(&self, name: &str, dir: &Path) -> Result<(), MultiplexerError> {
        let dir = dir.to_string_lossy();
        self.run(&["new-session", "-d", "-s", name, "-c", &*dir])
    }

    fn switch_client(&self, name: &str) -> Result<(), MultiplexerError> {
        let target = exact_target(name);
        self.run(&["switch-client", "-t", target.as_str()])
    }

    fn attach(&self, name: &str) -> Result<(), MultiplexerError> {
        let target = exact_target(name);
        let args = ["attach-session", "-t", target.as_str()];
        let status = self
            .command(args)
            .status()
            .map_err(|source| MultiplexerError::Spawn {
                command: self.describe(&args),
                source,
            })?;

        if status.success() {
            Ok(())
        } else {
            Err(MultiplexerError::Failed {
                command: self.describe(&args),
                details: format!("exited with {status}"),
            })
        }
    }
}

/// `=name` makes tmux match the session name exactly instead of by prefix.
fn exact_target(name: &str) -> String {
    format!("={name}")
}

fn parse_session_list(stdout: &str) -> Vec<String> {
    stdout
        .lines()
        .map(str::trim_end)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}

/// Builds an error from the most useful diagnostic the command produced.
fn command_failure(command: String, output: &Output) -> MultiplexerError {
    let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
    let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
    let details = if !stderr.is_empty() {
        stderr
    } else if !stdout.is_empty() {
        stdout
    } else {
        format!("exited with {}", output.status)
    };
    MultiplexerError::Failed { command, details }
}
