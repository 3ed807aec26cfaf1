//! Error types for command running

use std::fmt;
use thiserror::Error;

/// One of the three standard streams wired up for a child process
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stream {
    /// Standard input
    Stdin,
    /// Standard output
    Stdout,
    /// Standard error
    Stderr,
}

impl fmt::Display for Stream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stream::Stdin => f.write_str("stdin"),
            Stream::Stdout => f.write_str("stdout"),
            Stream::Stderr => f.write_str("stderr"),
        }
    }
}

/// Unified error type for command running
///
/// A command that cannot be found is not an error: backends report it as a
/// [`Message`](crate::Message) with `executed == false`.
#[derive(Error, Debug)]
pub enum Error {
    /// Failed to spawn a process
    #[error("failed to spawn process: {reason}")]
    SpawnFailed {
        /// The reason for the spawn failure
        reason: String,
    },

    /// Reading from or writing to one of the child's pipes failed
    #[error("failed to {action} {stream}: {source}")]
    Pipe {
        /// The stream that failed
        stream: Stream,
        /// What was being done with the stream
        action: &'static str,
        /// The underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// Failed to send signal to process
    #[error("failed to send signal {signal}: {reason}")]
    SignalFailed {
        /// The signal number that failed to send
        signal: i32,
        /// The reason for the signal failure
        reason: String,
    },

    /// No backend reports itself as available on this platform
    #[error("no available backend among: {candidates}")]
    BackendUnavailable {
        /// The backends that were probed, in ranking order
        candidates: String,
    },

    /// A placeholder named a value that was not supplied
    #[error("no value supplied for placeholder `{name}`")]
    MissingValue {
        /// The placeholder name
        name: String,
    },

    /// The worker thread finished without delivering a result
    #[error("worker for `{line}` exited without a result")]
    WorkerLost {
        /// The command line the worker was running
        line: String,
    },

    /// Configuration could not be parsed
    #[error("invalid configuration: {0}")]
    Config(#[from] serde_json::Error),

    /// I/O error
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Nix error (pipes, fork/exec and signals)
    #[cfg(unix)]
    #[error(transparent)]
    Nix(#[from] nix::Error),
}

impl Error {
    /// Create a spawn failed error
    pub fn spawn_failed(reason: impl Into<String>) -> Self {
        Self::SpawnFailed {
            reason: reason.into(),
        }
    }

    /// Create a signal failed error
    pub fn signal_failed(signal: i32, reason: impl Into<String>) -> Self {
        Self::SignalFailed {
            signal,
            reason: reason.into(),
        }
    }

    /// Create a pipe failure for the given stream
    pub fn pipe(stream: Stream, action: &'static str, source: std::io::Error) -> Self {
        Self::Pipe {
            stream,
            action,
            source,
        }
    }

    /// Create a missing value error
    pub fn missing_value(name: impl Into<String>) -> Self {
        Self::MissingValue { name: name.into() }
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;
