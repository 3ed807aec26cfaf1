//! Backend trait and availability-ranked backend selection

use crate::backends::{BackticksBackend, FakeBackend, SpawnBackend};
use crate::command::Command;
use crate::error::{Error, Result};
use crate::future::{Completion, ResultFuture};
use crate::message::Message;
use crate::options::Options;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// A strategy for launching OS processes
///
/// Implementations launch `command` with the given options and return a
/// [`ResultFuture`] right after launch. A command that cannot be found is
/// reported as a [`Message`] with `executed == false`, never as an error.
pub trait Backend: Send + Sync + fmt::Debug + 'static {
    /// Which launch strategy this is
    fn kind(&self) -> BackendKind;

    /// Whether this backend can run on the current platform
    fn available(&self) -> bool {
        self.kind().is_available()
    }

    /// Launch a command; `on_complete` runs exactly once with the outcome.
    ///
    /// Most backends return as soon as the process is launched. The
    /// backticks backend is the exception: it blocks the calling thread
    /// until the process exits and returns an already-resolved future.
    fn call(
        &self,
        command: Command,
        options: Options,
        on_complete: Option<Completion>,
    ) -> Result<ResultFuture>;

    /// Launch a command and block until it completes
    fn execute(&self, command: Command, options: Options) -> Result<Message> {
        self.call(command, options, None)?.wait()
    }
}

/// The built-in launch strategies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    /// Explicit fork + execve with hand-wired pipes (Unix)
    ForkExec,
    /// Native process spawning through `async-process`
    Spawn,
    /// The joined command line run through the shell, stdout captured
    Backticks,
    /// In-memory fake that never launches anything
    Fake,
}

impl BackendKind {
    /// Auto-selection order, most preferred first. [`BackendKind::Fake`] is
    /// never auto-selected.
    pub const RANKING: [BackendKind; 3] = [
        BackendKind::ForkExec,
        BackendKind::Spawn,
        BackendKind::Backticks,
    ];

    /// Probe the platform for this backend
    pub fn is_available(self) -> bool {
        match self {
            BackendKind::ForkExec => cfg!(unix),
            BackendKind::Spawn | BackendKind::Fake => true,
            BackendKind::Backticks => crate::backends::path::shell_available(),
        }
    }

    /// Construct a backend of this kind.
    ///
    /// Fails with [`Error::BackendUnavailable`] for a kind this platform
    /// cannot build at all.
    pub fn instantiate(self) -> Result<Arc<dyn Backend>> {
        Ok(match self {
            #[cfg(unix)]
            BackendKind::ForkExec => Arc::new(crate::backends::ForkExecBackend),
            #[cfg(not(unix))]
            BackendKind::ForkExec => {
                return Err(Error::BackendUnavailable {
                    candidates: self.name().to_owned(),
                });
            }
            BackendKind::Spawn => Arc::new(SpawnBackend),
            BackendKind::Backticks => Arc::new(BackticksBackend),
            BackendKind::Fake => Arc::new(FakeBackend::new()),
        })
    }

    /// Short lowercase name
    pub fn name(self) -> &'static str {
        match self {
            BackendKind::ForkExec => "fork_exec",
            BackendKind::Spawn => "spawn",
            BackendKind::Backticks => "backticks",
            BackendKind::Fake => "fake",
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Backend availability, with optional per-kind overrides of the platform
/// probe
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Availability {
    overrides: BTreeMap<BackendKind, bool>,
}

impl Availability {
    /// Availability as probed from the platform, without overrides
    pub const fn new() -> Self {
        Self {
            overrides: BTreeMap::new(),
        }
    }

    /// Override one kind (for chaining)
    pub fn with(mut self, kind: BackendKind, available: bool) -> Self {
        self.set(kind, available);
        self
    }

    /// Override one kind
    pub fn set(&mut self, kind: BackendKind, available: bool) {
        self.overrides.insert(kind, available);
    }

    /// Drop all overrides
    pub fn clear(&mut self) {
        self.overrides.clear();
    }

    /// Whether `kind` counts as available
    pub fn is_available(&self, kind: BackendKind) -> bool {
        self.overrides
            .get(&kind)
            .copied()
            .unwrap_or_else(|| kind.is_available())
    }

    /// The highest-ranked available kind
    pub fn best(&self) -> Result<BackendKind> {
        BackendKind::RANKING
            .into_iter()
            .find(|kind| self.is_available(*kind))
            .ok_or_else(|| Error::BackendUnavailable {
                candidates: BackendKind::RANKING
                    .iter()
                    .map(|kind| kind.name())
                    .collect::<Vec<_>>()
                    .join(", "),
            })
    }
}

/// Instantiate the highest-ranked backend under `availability`
pub fn best_backend_with(availability: &Availability) -> Result<Arc<dyn Backend>> {
    let kind = availability.best()?;
    tracing::debug!(backend = %kind, "selected backend");
    kind.instantiate()
}
