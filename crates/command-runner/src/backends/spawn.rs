//! Native process spawning through `async-process`

use async_process::{Child, Stdio};
use chrono::Utc;
use futures_lite::future::{or, pending, zip};
use tracing::{debug, warn};

use crate::backend::{Backend, BackendKind};
use crate::backends::{Invocation, elapsed, feed_input, launch_refused, read_stream};
use crate::command::Command;
use crate::error::{Error, Result, Stream};
use crate::future::{Canceller, Completion, ResultFuture};
use crate::options::Options;
use crate::process::ExitStatus;

/// Backend that spawns processes with the platform's native spawn call
///
/// All three standard streams are piped. The worker thread feeds stdin,
/// drains stdout and stderr, and waits for the exit status concurrently, so
/// a child that writes more than a pipe buffer never stalls.
#[derive(Debug, Clone, Copy, Default)]
pub struct SpawnBackend;

impl Backend for SpawnBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Spawn
    }

    fn call(
        &self,
        command: Command,
        options: Options,
        on_complete: Option<Completion>,
    ) -> Result<ResultFuture> {
        let invocation = Invocation::new(command, options);
        if invocation.resolve_program().is_none() {
            return Ok(ResultFuture::ready(
                Ok(invocation.no_such_command()),
                on_complete,
            ));
        }

        let mut cmd = command_for(&invocation);
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
        debug!(line = %invocation.line, pid, backend = "spawn", "launched process");

        let stdin = child.stdin.take();
        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        let input = invocation.launch.input.clone();
        let line = invocation.line.clone();

        let (cancel_tx, cancel_rx) = async_channel::bounded(1);
        let canceller: Canceller = Box::new(move || {
            // Full means a kill is already pending, closed means the worker
            // is done
            let _ = cancel_tx.try_send(());
            Ok(())
        });

        // If the worker cannot start, dropping `child` kills it
        ResultFuture::spawn_process(line, pid, canceller, on_complete, move || {
            futures_lite::future::block_on(async move {
                let collect = zip(
                    feed_input(stdin, input),
                    zip(
                        read_stream(stdout, Stream::Stdout),
                        read_stream(stderr, Stream::Stderr),
                    ),
                );
                let ((fed, (stdout, stderr)), status) =
                    zip(collect, wait_or_kill(&mut child, cancel_rx)).await;
                let end = Utc::now();

                let status: ExitStatus = status?.into();
                fed?;
                debug!(line = %invocation.line, pid, ?status, "process exited");

                Ok(invocation
                    .message()
                    .process_id(pid)
                    .status(status)
                    .time(elapsed(start, end))
                    .stdout(stdout?)
                    .stderr(stderr?)
                    .build())
            })
        })
    }
}

/// The piped command for `invocation`; the child is killed if its handle is
/// dropped while it still runs
fn command_for(invocation: &Invocation) -> async_process::Command {
    let mut cmd = invocation.prepare(invocation.launch.unsafe_line);
    cmd.stdin(Stdio::piped());
    cmd.stdout(Stdio::piped());
    cmd.stderr(Stdio::piped());
    cmd.kill_on_drop(true);
    cmd
}

/// Wait for `child` to exit, killing it first if a cancel request arrives.
///
/// The kill goes through the child handle, which knows whether the process
/// has been reaped, so a recycled pid is never signalled.
async fn wait_or_kill(
    child: &mut Child,
    cancel: async_channel::Receiver<()>,
) -> std::io::Result<std::process::ExitStatus> {
    let exited = or(async { Some(child.status().await) }, async {
        match cancel.recv().await {
            Ok(()) => None,
            // Nobody can cancel any more
            Err(_) => pending().await,
        }
    })
    .await;
    if let Some(status) = exited {
        return status;
    }

    debug!(pid = child.id(), "cancelling process");
    if let Err(e) = child.kill() {
        warn!(pid = child.id(), error = %e, "failed to kill process");
    }
    child.status().await
}
