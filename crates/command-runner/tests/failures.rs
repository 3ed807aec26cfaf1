//! Failures after launch reach the caller through the future and the callback

mod common;

use anyhow::Result;
use command_runner::{
    Backend, BackendKind, Command, Completion, Error, Message, Options, ResultFuture, Runner,
    Stream, Values,
};
use std::io;
use std::sync::{Arc, Mutex};

/// How the worker of [`FailingBackend`] ends
#[derive(Debug, Clone, Copy)]
enum Failure {
    /// Reading stdout breaks half way
    Pipe,
    /// The worker thread dies
    Panic,
}

#[derive(Debug)]
struct FailingBackend(Failure);

impl Backend for FailingBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Fake
    }

    fn call(
        &self,
        command: Command,
        _options: Options,
        on_complete: Option<Completion>,
    ) -> command_runner::Result<ResultFuture> {
        let failure = self.0;
        ResultFuture::spawn(command.line(), on_complete, move || match failure {
            Failure::Pipe => Err(Error::pipe(
                Stream::Stdout,
                "read",
                io::Error::new(io::ErrorKind::UnexpectedEof, "stdout closed early"),
            )),
            Failure::Panic => panic!("supervisor crashed"),
        })
    }
}

fn runner(failure: Failure) -> Runner {
    common::init_tracing();
    Runner::new("cat {file}").with_backend(Arc::new(FailingBackend(failure)))
}

fn values() -> Values {
    Values::new().with("file", "notes.txt")
}

type Outcomes = Arc<Mutex<Vec<command_runner::Result<Message>>>>;

fn recorded(runner: &Runner, outcomes: &Outcomes) -> command_runner::Result<Message> {
    let sink = outcomes.clone();
    runner
        .execute_then(&values(), Options::new(), move |outcome| {
            let copy = match outcome {
                Ok(message) => Ok(message.clone()),
                Err(e) => Err(Error::spawn_failed(e.to_string())),
            };
            sink.lock().unwrap().push(copy);
        })?
        .wait()
}

#[test]
fn test_pipe_failure_through_runner() -> Result<()> {
    let runner = runner(Failure::Pipe);

    let err = runner.execute(&values(), Options::new())?.wait().unwrap_err();
    assert!(matches!(
        err,
        Error::Pipe {
            stream: Stream::Stdout,
            ..
        }
    ));

    let outcomes: Outcomes = Arc::default();
    let err = recorded(&runner, &outcomes).unwrap_err();
    assert!(matches!(err, Error::Pipe { .. }));

    let outcomes = outcomes.lock().unwrap();
    assert_eq!(outcomes.len(), 1);
    let delivered = outcomes[0].as_ref().unwrap_err().to_string();
    assert!(delivered.contains("stdout closed early"), "{delivered}");
    Ok(())
}

#[test]
fn test_lost_worker_through_runner() -> Result<()> {
    let runner = runner(Failure::Panic);

    let err = runner.execute(&values(), Options::new())?.wait().unwrap_err();
    assert!(matches!(err, Error::WorkerLost { ref line } if line == "cat notes.txt"));

    let outcomes: Outcomes = Arc::default();
    let err = recorded(&runner, &outcomes).unwrap_err();
    assert!(matches!(err, Error::WorkerLost { .. }));
    assert_eq!(outcomes.lock().unwrap().len(), 1);
    Ok(())
}

#[smol_potat::test]
async fn test_failures_resolve_awaited_futures() {
    for failure in [Failure::Pipe, Failure::Panic] {
        let future = runner(failure)
            .execute(&values(), Options::new())
            .unwrap();
        let err = future.await.unwrap_err();
        assert!(
            matches!(err, Error::Pipe { .. } | Error::WorkerLost { .. }),
            "{failure:?}: {err}"
        );
    }
}

#[test]
fn test_failed_future_reports_finished() -> Result<()> {
    let future = runner(Failure::Pipe).execute(&values(), Options::new())?;
    while !future.is_finished() {
        std::thread::yield_now();
    }
    assert_eq!(future.pid(), None);
    future.cancel()?;
    assert!(future.wait().is_err());
    Ok(())
}
