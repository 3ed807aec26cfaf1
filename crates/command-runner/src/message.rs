//! The outcome of one command invocation

use crate::command::Environment;
use crate::options::Options;
use crate::process::ExitStatus;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::fmt;
use std::time::Duration;

/// Immutable record of a single invocation
///
/// Built once by a backend when the invocation reaches a terminal state.
/// `executed == false` means the command could not be found or launched at
/// all, which is distinct from a command that ran and failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    process_id: Option<u32>,
    exit_code: Option<i32>,
    finished: bool,
    time: Duration,
    env: Environment,
    options: Options,
    stdout: Vec<u8>,
    stderr: Vec<u8>,
    line: String,
    executed: bool,
    status: Option<ExitStatus>,
}

impl Message {
    /// Start building a message for the given command line
    pub fn builder(line: impl Into<String>) -> MessageBuilder {
        MessageBuilder(Message {
            process_id: None,
            exit_code: None,
            finished: true,
            time: Duration::ZERO,
            env: Environment::new(),
            options: Options::default(),
            stdout: Vec::new(),
            stderr: Vec::new(),
            line: line.into(),
            executed: true,
            status: None,
        })
    }

    /// A message for a command that could not be found or launched
    pub fn no_such_command(
        line: impl Into<String>,
        env: Environment,
        options: Options,
    ) -> Self {
        Self::builder(line)
            .env(env)
            .options(options)
            .executed(false)
            .build()
    }

    /// Process id, if a process was actually launched
    pub fn process_id(&self) -> Option<u32> {
        self.process_id
    }

    /// Exit code, if the process exited normally
    pub fn exit_code(&self) -> Option<i32> {
        self.exit_code
    }

    /// True once the process has terminated
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Wall-clock time between launch and termination
    pub fn time(&self) -> Duration {
        self.time
    }

    /// Environment variables passed to the child
    pub fn env(&self) -> &Environment {
        &self.env
    }

    /// The residual options used for the invocation
    pub fn options(&self) -> &Options {
        &self.options
    }

    /// Captured standard output
    pub fn stdout(&self) -> &[u8] {
        &self.stdout
    }

    /// Captured standard error
    pub fn stderr(&self) -> &[u8] {
        &self.stderr
    }

    /// Standard output decoded as UTF-8, replacing invalid sequences
    pub fn stdout_lossy(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.stdout)
    }

    /// Standard error decoded as UTF-8, replacing invalid sequences
    pub fn stderr_lossy(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.stderr)
    }

    /// The command line that was, or would have been, executed
    pub fn line(&self) -> &str {
        &self.line
    }

    /// False if the command could not be found or launched
    pub fn is_executed(&self) -> bool {
        self.executed
    }

    /// True if the command could not be found or launched
    pub fn no_command(&self) -> bool {
        !self.executed
    }

    /// Raw platform exit information
    pub fn status(&self) -> Option<ExitStatus> {
        self.status
    }

    /// True if the command ran and exited with code 0
    pub fn is_success(&self) -> bool {
        self.executed && self.exit_code == Some(0)
    }

    /// True if the process exited normally (not through a signal)
    pub fn exited(&self) -> bool {
        self.status.is_some_and(|status| status.code.is_some())
    }

    /// True if the process was terminated by a signal
    pub fn signaled(&self) -> bool {
        self.status.is_some_and(|status| status.terminated_by_signal())
    }

    /// The signal that terminated the process, if any
    pub fn term_signal(&self) -> Option<i32> {
        self.status.and_then(|status| status.signal)
    }
}

/// Renders the captured standard output
impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.stdout_lossy())
    }
}

/// Builder used by backends to assemble a [`Message`]
#[derive(Debug)]
pub struct MessageBuilder(Message);

impl MessageBuilder {
    /// Set the process id
    pub fn process_id(mut self, pid: u32) -> Self {
        self.0.process_id = Some(pid);
        self
    }

    /// Set the raw exit status; also fills in the exit code
    pub fn status(mut self, status: ExitStatus) -> Self {
        self.0.exit_code = status.code;
        self.0.status = Some(status);
        self
    }

    /// Set the exit code without a raw status
    pub fn exit_code(mut self, code: i32) -> Self {
        self.0.exit_code = Some(code);
        self
    }

    /// Set the elapsed time
    pub fn time(mut self, time: Duration) -> Self {
        self.0.time = time;
        self
    }

    /// Set the environment used
    pub fn env(mut self, env: Environment) -> Self {
        self.0.env = env;
        self
    }

    /// Set the residual options used
    pub fn options(mut self, options: Options) -> Self {
        self.0.options = options;
        self
    }

    /// Set the captured standard output
    pub fn stdout(mut self, stdout: impl Into<Vec<u8>>) -> Self {
        self.0.stdout = stdout.into();
        self
    }

    /// Set the captured standard error
    pub fn stderr(mut self, stderr: impl Into<Vec<u8>>) -> Self {
        self.0.stderr = stderr.into();
        self
    }

    /// Mark whether the command was executed at all
    pub fn executed(mut self, executed: bool) -> Self {
        self.0.executed = executed;
        self
    }

    /// Finish the message
    pub fn build(self) -> Message {
        self.0
    }
}
