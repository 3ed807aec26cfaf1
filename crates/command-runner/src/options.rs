//! Per-invocation execution options

use crate::command::Environment;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Options for one command invocation
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Options {
    /// Bytes written to the child's stdin before it is closed
    #[serde(default)]
    pub input: Option<Vec<u8>>,
    /// Run the joined command line through the shell instead of exec'ing the
    /// argument vector. Escaping becomes the caller's responsibility.
    #[serde(default, rename = "unsafe")]
    pub unsafe_line: bool,
    /// Extra environment variables merged into the child's environment
    #[serde(default)]
    pub env: Environment,
    /// Working directory for the child
    #[serde(default)]
    pub current_dir: Option<PathBuf>,
}

/// The part of [`Options`] a backend consumes while launching
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Launch {
    /// Bytes for the child's stdin
    pub input: Option<Vec<u8>>,
    /// Whether to run the joined line through the shell
    pub unsafe_line: bool,
}

impl Options {
    /// Create empty options
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the bytes to write to stdin
    pub fn with_input(mut self, input: impl Into<Vec<u8>>) -> Self {
        self.input = Some(input.into());
        self
    }

    /// Request shell-line execution
    pub fn with_unsafe(mut self, unsafe_line: bool) -> Self {
        self.unsafe_line = unsafe_line;
        self
    }

    /// Add an environment variable
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Set the working directory
    pub fn with_current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.current_dir = Some(dir.into());
        self
    }

    /// Layer `overrides` on top of these options.
    ///
    /// Environment entries are merged with `overrides` winning, `input` and
    /// `current_dir` are replaced when `overrides` sets them, and shell-line
    /// execution is on if either side asks for it.
    pub fn merged(&self, overrides: Options) -> Options {
        let mut env = self.env.clone();
        env.extend(overrides.env);
        Options {
            input: overrides.input.or_else(|| self.input.clone()),
            unsafe_line: self.unsafe_line || overrides.unsafe_line,
            env,
            current_dir: overrides.current_dir.or_else(|| self.current_dir.clone()),
        }
    }

    /// Take the environment out, leaving the rest
    pub fn split_env(mut self) -> (Environment, Options) {
        let env = std::mem::take(&mut self.env);
        (env, self)
    }

    /// Split into what the backend consumes and the residual options that
    /// are echoed back in the [`Message`](crate::Message)
    pub fn split(self) -> (Launch, Options) {
        let launch = Launch {
            input: self.input,
            unsafe_line: self.unsafe_line,
        };
        let residual = Options {
            input: None,
            unsafe_line: false,
            env: self.env,
            current_dir: self.current_dir,
        };
        (launch, residual)
    }
}
