//! Backend implementations for different launch strategies
//!
//! Users can also implement their own backends by implementing the
//! [`Backend`](crate::backend::Backend) trait.

use crate::command::Command;
use crate::error::{Error, Result, Stream};
use crate::message::Message;
use crate::options::{Launch, Options};
use chrono::{DateTime, Utc};
use std::path::PathBuf;
use std::time::Duration;

pub mod backticks;
pub mod fake;
#[cfg(unix)]
pub mod fork_exec;
pub mod path;
pub mod spawn;

pub use backticks::BackticksBackend;
pub use fake::{FakeBackend, FakeCall};
#[cfg(unix)]
pub use fork_exec::ForkExecBackend;
pub use spawn::SpawnBackend;

/// A command with its options split into what the backend consumes and what
/// is echoed back in the message
#[derive(Debug)]
pub(crate) struct Invocation {
    pub(crate) command: Command,
    pub(crate) launch: Launch,
    pub(crate) options: Options,
    pub(crate) line: String,
}

impl Invocation {
    pub(crate) fn new(mut command: Command, options: Options) -> Self {
        let (launch, options) = options.split();
        command.envs(options.env.clone());
        let line = command.line();
        Self {
            command,
            launch,
            options,
            line,
        }
    }

    /// Locate the program, honoring a `PATH` passed in the child environment
    /// and resolving relative names against the child's working directory
    pub(crate) fn resolve_program(&self) -> Option<PathBuf> {
        let cwd = match &self.options.current_dir {
            Some(dir) => dir.clone(),
            None => std::env::current_dir().ok()?,
        };
        path::find_program(self.command.get_program(), self.command.get_envs(), &cwd)
    }

    pub(crate) fn no_such_command(&self) -> Message {
        tracing::debug!(line = %self.line, "command not found");
        Message::no_such_command(
            self.line.clone(),
            self.command.get_envs().clone(),
            self.options.clone(),
        )
    }

    /// The `async_process` command for this invocation, argv or shell line
    pub(crate) fn prepare(&self, shell_line: bool) -> async_process::Command {
        let mut cmd = if shell_line {
            self.command.prepare_shell()
        } else {
            self.command.prepare()
        };
        if let Some(dir) = &self.options.current_dir {
            cmd.current_dir(dir);
        }
        cmd
    }

    pub(crate) fn message(&self) -> crate::message::MessageBuilder {
        Message::builder(self.line.clone())
            .env(self.command.get_envs().clone())
            .options(self.options.clone())
    }
}

/// Elapsed time between two timestamps, whichever order they come in
pub(crate) fn elapsed(start: DateTime<Utc>, end: DateTime<Utc>) -> Duration {
    (start - end).abs().to_std().unwrap_or_default()
}

/// Write `input` to an `async_process` stdin and close it
pub(crate) async fn feed_input(
    stdin: Option<async_process::ChildStdin>,
    input: Option<Vec<u8>>,
) -> Result<()> {
    use futures::io::AsyncWriteExt;

    let (Some(mut stdin), Some(input)) = (stdin, input) else {
        return Ok(());
    };
    let written = match stdin.write_all(&input).await {
        Ok(()) => stdin.flush().await.or_else(ignore_broken_pipe),
        Err(e) => ignore_broken_pipe(e),
    };
    // Dropping stdin closes the write end so the child sees EOF
    drop(stdin);
    written.map_err(|e| Error::pipe(Stream::Stdin, "write", e))
}

/// Whether a spawn error means the program could not be started at all, as
/// opposed to a resource failure
pub(crate) fn launch_refused(e: &std::io::Error) -> bool {
    matches!(
        e.kind(),
        std::io::ErrorKind::NotFound | std::io::ErrorKind::PermissionDenied
    )
}

/// Read an `async_process` output pipe to the end
pub(crate) async fn read_stream<R>(pipe: Option<R>, stream: Stream) -> Result<Vec<u8>>
where
    R: futures::io::AsyncRead + Unpin,
{
    use futures::io::AsyncReadExt;

    let mut buffer = Vec::new();
    if let Some(mut pipe) = pipe {
        pipe.read_to_end(&mut buffer)
            .await
            .map_err(|e| Error::pipe(stream, "read", e))?;
    }
    Ok(buffer)
}

/// A child that exits without reading all of its input closes the pipe
pub(crate) fn ignore_broken_pipe(e: std::io::Error) -> std::io::Result<()> {
    if e.kind() == std::io::ErrorKind::BrokenPipe {
        tracing::trace!("child closed stdin before reading all input");
        Ok(())
    } else {
        Err(e)
    }
}
