//! Commands that cannot be found are reported, not raised

mod common;

use anyhow::Result;
use command_runner::backends::{BackticksBackend, FakeBackend, SpawnBackend};
use command_runner::{Backend, Message, Options, Runner, Values};
use std::sync::{Arc, Mutex};

fn backends() -> Vec<Arc<dyn Backend>> {
    common::init_tracing();
    let mut backends: Vec<Arc<dyn Backend>> =
        vec![Arc::new(BackticksBackend), Arc::new(SpawnBackend)];
    #[cfg(unix)]
    backends.push(Arc::new(command_runner::backends::ForkExecBackend));
    backends
}

#[test]
fn test_missing_command_calls_back_once() -> Result<()> {
    for backend in backends() {
        let kind = backend.kind();
        let runner = Runner::new("some-non-existant-command").with_backend(backend);
        let seen: Arc<Mutex<Vec<Message>>> = Arc::default();
        let sink = seen.clone();

        let message = runner
            .execute_then(&Values::new(), Options::new(), move |outcome| {
                sink.lock().unwrap().push(outcome.as_ref().unwrap().clone());
            })?
            .wait()?;

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1, "{kind}");
        assert_eq!(seen[0], message);
        assert!(message.no_command());
        assert!(!message.is_executed());
        assert!(message.is_finished());
        assert_eq!(message.process_id(), None);
        assert_eq!(message.exit_code(), None);
        assert_eq!(message.line(), "some-non-existant-command ");
    }
    Ok(())
}

#[test]
fn test_missing_command_with_arguments() -> Result<()> {
    for backend in backends() {
        let runner = Runner::new("some-non-existant-command {x}").with_backend(backend);
        let message = runner
            .execute(&Values::new().with("x", "a b"), Options::new())?
            .wait()?;
        assert!(message.no_command());
        assert_eq!(message.line(), "some-non-existant-command a\\ b");
    }
    Ok(())
}

#[test]
fn test_missing_command_in_unsafe_mode() -> Result<()> {
    for backend in backends() {
        let runner = Runner::new("some-non-existant-command").with_backend(backend);
        let message = runner
            .execute(&Values::new(), Options::new().with_unsafe(true))?
            .wait()?;
        assert!(message.no_command());
    }
    Ok(())
}

#[cfg(unix)]
#[test]
fn test_child_path_is_searched() -> Result<()> {
    let dir = tempfile::tempdir()?;
    for backend in backends() {
        let runner = Runner::new("ls")
            .with_options(Options::new().with_env("PATH", dir.path().display().to_string()))
            .with_backend(backend);
        assert!(runner.pass()?.no_command());
    }
    Ok(())
}

#[test]
fn test_fake_backend_always_executes() -> Result<()> {
    common::init_tracing();
    let fake = FakeBackend::new();
    let runner = Runner::new("some-non-existant-command").with_backend(Arc::new(fake.clone()));

    let message = runner.pass()?;
    assert!(message.is_executed());
    assert_eq!(fake.call_count(), 1);
    Ok(())
}
