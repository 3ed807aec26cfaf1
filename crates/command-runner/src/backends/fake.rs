//! In-memory backend for tests

use std::sync::{Arc, Mutex, PoisonError};

use tracing::trace;

use crate::backend::{Backend, BackendKind};
use crate::command::Command;
use crate::error::Result;
use crate::future::{Completion, ResultFuture};
use crate::message::Message;
use crate::options::Options;

/// One invocation recorded by a [`FakeBackend`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FakeCall {
    /// The command as the backend received it
    pub command: Command,
    /// The options as the backend received them
    pub options: Options,
}

#[derive(Debug, Clone, Default)]
struct Response {
    stdout: Vec<u8>,
    stderr: Vec<u8>,
    exit_code: i32,
}

/// Backend that never launches anything.
///
/// Every call resolves immediately with a message built from the scripted
/// response (empty output and exit code 0 unless configured) and is
/// recorded for later inspection. Clones share the recording.
#[derive(Debug, Clone, Default)]
pub struct FakeBackend {
    response: Response,
    calls: Arc<Mutex<Vec<FakeCall>>>,
}

impl FakeBackend {
    /// A fake that answers every call with empty output and exit code 0
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer with this stdout
    pub fn with_stdout(mut self, stdout: impl Into<Vec<u8>>) -> Self {
        self.response.stdout = stdout.into();
        self
    }

    /// Answer with this stderr
    pub fn with_stderr(mut self, stderr: impl Into<Vec<u8>>) -> Self {
        self.response.stderr = stderr.into();
        self
    }

    /// Answer with this exit code
    pub fn with_exit_code(mut self, exit_code: i32) -> Self {
        self.response.exit_code = exit_code;
        self
    }

    /// Every call received so far, oldest first
    pub fn calls(&self) -> Vec<FakeCall> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Number of calls received so far
    pub fn call_count(&self) -> usize {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

impl Backend for FakeBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Fake
    }

    fn call(
        &self,
        command: Command,
        options: Options,
        on_complete: Option<Completion>,
    ) -> Result<ResultFuture> {
        let line = command.line();
        trace!(line = %line, "fake backend call");

        let mut env = command.get_envs().clone();
        env.extend(options.env.clone());
        let (_, residual) = options.clone().split();

        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(FakeCall { command, options });

        let message = Message::builder(line)
            .exit_code(self.response.exit_code)
            .env(env)
            .options(residual)
            .stdout(self.response.stdout.clone())
            .stderr(self.response.stderr.clone())
            .build();

        Ok(ResultFuture::ready(Ok(message), on_complete))
    }
}
