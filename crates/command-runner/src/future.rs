//! Asynchronous delivery of invocation results
//!
//! Every backend hands back a [`ResultFuture`] as soon as the process is
//! launched. Waiting for the process happens on a dedicated worker thread,
//! which builds the [`Message`], runs the completion callback (if any) and
//! then resolves the future. The caller can `.await` it, block on it with
//! [`ResultFuture::wait`], or drop it and rely on the callback alone.

use crate::error::{Error, Result};
use crate::message::Message;
use std::future::Future;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::task::{Context, Poll};
use tracing::{trace, warn};

/// Callback invoked exactly once with the terminal outcome of an invocation,
/// whether it produced a [`Message`] or failed
pub type Completion = Box<dyn FnOnce(&Result<Message>) + Send + 'static>;

/// Kills the launched process, if it has not been reaped yet
pub(crate) type Canceller = Box<dyn Fn() -> Result<()> + Send + Sync + 'static>;

type Pending = Pin<Box<dyn Future<Output = Result<Message>> + Send>>;

/// Handle to the eventual [`Message`] of one invocation
pub struct ResultFuture {
    pid: Option<u32>,
    finished: Arc<AtomicBool>,
    canceller: Option<Canceller>,
    inner: Pending,
}

impl ResultFuture {
    /// A future that is already resolved.
    ///
    /// The callback runs right away, on the calling thread.
    pub fn ready(outcome: Result<Message>, on_complete: Option<Completion>) -> Self {
        if let Some(callback) = on_complete {
            callback(&outcome);
        }
        Self {
            pid: None,
            finished: Arc::new(AtomicBool::new(true)),
            canceller: None,
            inner: Box::pin(futures::future::ready(outcome)),
        }
    }

    /// Run `work` on a new worker thread and resolve with its outcome.
    ///
    /// This is how a custom [`Backend`](crate::Backend) that does not own an
    /// OS process delivers its result. A panic in `work` resolves the future
    /// with [`Error::WorkerLost`].
    pub fn spawn<F>(line: impl Into<String>, on_complete: Option<Completion>, work: F) -> Result<Self>
    where
        F: FnOnce() -> Result<Message> + Send + 'static,
    {
        Self::start(line.into(), None, None, on_complete, work)
    }

    /// Like [`ResultFuture::spawn`], for a worker that supervises process
    /// `pid`; `canceller` backs [`ResultFuture::cancel`]
    pub(crate) fn spawn_process<F>(
        line: String,
        pid: u32,
        canceller: Canceller,
        on_complete: Option<Completion>,
        work: F,
    ) -> Result<Self>
    where
        F: FnOnce() -> Result<Message> + Send + 'static,
    {
        Self::start(line, Some(pid), Some(canceller), on_complete, work)
    }

    fn start<F>(
        line: String,
        pid: Option<u32>,
        canceller: Option<Canceller>,
        on_complete: Option<Completion>,
        work: F,
    ) -> Result<Self>
    where
        F: FnOnce() -> Result<Message> + Send + 'static,
    {
        let (tx, rx) = async_channel::bounded(1);
        let finished = Arc::new(AtomicBool::new(false));
        let flag = finished.clone();
        let worker_line = line.clone();

        std::thread::Builder::new()
            .name(format!("command-runner-{}", pid.unwrap_or_default()))
            .spawn(move || {
                let outcome = catch_unwind(AssertUnwindSafe(work)).unwrap_or_else(|_| {
                    Err(Error::WorkerLost {
                        line: worker_line.clone(),
                    })
                });
                flag.store(true, Ordering::Release);
                match &outcome {
                    Ok(message) => {
                        trace!(line = %worker_line, exit_code = ?message.exit_code(), "invocation finished")
                    }
                    Err(e) => warn!(line = %worker_line, error = %e, "invocation failed"),
                }
                if let Some(callback) = on_complete {
                    callback(&outcome);
                }
                // Nobody may be waiting on the future any more
                let _ = tx.send_blocking(outcome);
            })?;

        let inner = Box::pin(async move {
            match rx.recv().await {
                Ok(outcome) => outcome,
                Err(_) => Err(Error::WorkerLost { line }),
            }
        });

        Ok(Self {
            pid,
            finished,
            canceller,
            inner,
        })
    }

    /// The id of the launched process, if one was launched
    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// True once the outcome is known (or nothing was launched)
    pub fn is_finished(&self) -> bool {
        self.finished.load(Ordering::Acquire)
    }

    /// Block the current thread until the message is available
    pub fn wait(self) -> Result<Message> {
        futures_lite::future::block_on(self)
    }

    /// Kill the process if it is still running.
    ///
    /// The future still resolves, with a message reporting the signal. Does
    /// nothing if no process was launched or it has already been reaped.
    pub fn cancel(&self) -> Result<()> {
        match &self.canceller {
            Some(cancel) if !self.is_finished() => cancel(),
            _ => Ok(()),
        }
    }
}

impl std::fmt::Debug for ResultFuture {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResultFuture")
            .field("pid", &self.pid)
            .field("finished", &self.is_finished())
            .finish_non_exhaustive()
    }
}

impl Future for ResultFuture {
    type Output = Result<Message>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        self.inner.as_mut().poll(cx)
    }
}
