//! Shell-line backend in the style of shell backticks
//!
//! The command and its arguments are always joined into one line and handed
//! to the system shell, so escaping is what keeps values from being
//! reinterpreted. Only stdout is captured; stderr goes to the parent's
//! stderr. The call blocks until the child exits and returns an already
//! resolved future.

use async_process::Stdio;
use chrono::Utc;
use tracing::debug;

use crate::backend::{Backend, BackendKind};
use crate::backends::{Invocation, elapsed, feed_input, launch_refused};
use crate::command::Command;
use crate::error::{Error, Result, Stream};
use crate::future::{Completion, ResultFuture};
use crate::options::Options;
use crate::process::ExitStatus;

/// Backend that runs the joined line through the shell and captures stdout
#[derive(Debug, Clone, Copy, Default)]
pub struct BackticksBackend;

impl Backend for BackticksBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Backticks
    }

    fn call(
        &self,
        command: Command,
        options: Options,
        on_complete: Option<Completion>,
    ) -> Result<ResultFuture> {
        let invocation = Invocation::new(command, options);
        // The shell would report a missing program as exit 127; check first
        // so the message says it never ran
        if invocation.resolve_program().is_none() {
            return Ok(ResultFuture::ready(
                Ok(invocation.no_such_command()),
                on_complete,
            ));
        }

        let mut cmd = invocation.prepare(true);
        cmd.stdin(Stdio::piped());
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::inherit());
        cmd.kill_on_drop(true);

        let start = Utc::now();
        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(e) if launch_refused(&e) => {
                return Ok(ResultFuture::ready(
                    Ok(invocation.no_such_command()),
                    on_complete,
                ));
            }
            Err(e) => {
                return Err(Error::spawn_failed(format!(
                    "Failed to spawn `{}`: {}",
                    invocation.line, e
                )));
            }
        };

        let pid = child.id();
        debug!(line = %invocation.line, pid, backend = "backticks", "launched process");

        let stdin = child.stdin.take();
        let input = invocation.launch.input.clone();
        let outcome = futures_lite::future::block_on(async {
            let (fed, output) =
                futures_lite::future::zip(feed_input(stdin, input), child.output()).await;
            let end = Utc::now();

            let output = output.map_err(|e| Error::pipe(Stream::Stdout, "collect", e))?;
            fed?;

            let status: ExitStatus = output.status.into();
            debug!(line = %invocation.line, pid, ?status, "process exited");

            Ok(invocation
                .message()
                .process_id(pid)
                .status(status)
                .time(elapsed(start, end))
                .stdout(output.stdout)
                .build())
        });

        Ok(ResultFuture::ready(outcome, on_complete))
    }
}
