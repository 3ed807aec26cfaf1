//! The process-wide default backend.
//!
//! These tests share global state, so they live in their own test binary and
//! take a lock to run one at a time.

mod common;

use anyhow::Result;
use command_runner::backends::FakeBackend;
use command_runner::{BackendKind, Runner, defaults};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

static SERIAL: Mutex<()> = Mutex::new(());

fn isolated() -> MutexGuard<'static, ()> {
    common::init_tracing();
    let guard = SERIAL.lock().unwrap_or_else(PoisonError::into_inner);
    defaults::reset();
    guard
}

#[test]
fn test_selection_follows_availability() -> Result<()> {
    let _guard = isolated();

    defaults::set_available(BackendKind::ForkExec, false);
    defaults::set_available(BackendKind::Spawn, true);
    assert_eq!(Runner::best_backend()?.kind(), BackendKind::Spawn);

    defaults::set_available(BackendKind::ForkExec, true);
    assert_eq!(Runner::best_backend()?.kind(), BackendKind::ForkExec);

    defaults::set_available(BackendKind::ForkExec, false);
    defaults::set_available(BackendKind::Spawn, false);
    defaults::set_available(BackendKind::Backticks, true);
    assert_eq!(Runner::best_backend()?.kind(), BackendKind::Backticks);

    defaults::set_available(BackendKind::Backticks, false);
    assert!(Runner::best_backend().is_err());

    defaults::reset();
    Ok(())
}

#[test]
fn test_cached_default_is_invalidated() -> Result<()> {
    let _guard = isolated();

    defaults::set_available(BackendKind::ForkExec, false);
    let runner = Runner::new("true");
    assert_eq!(runner.backend()?.kind(), BackendKind::Spawn);
    assert_eq!(runner.backend()?.kind(), BackendKind::Spawn);

    defaults::set_available(BackendKind::Spawn, false);
    assert_eq!(runner.backend()?.kind(), BackendKind::Backticks);

    defaults::reset();
    Ok(())
}

#[test]
fn test_installed_backend_wins_until_reset() -> Result<()> {
    let _guard = isolated();

    let fake = FakeBackend::new().with_stdout("faked");
    defaults::set_backend(Arc::new(fake.clone()));
    defaults::set_available(BackendKind::ForkExec, false);

    let runner = Runner::new("ls {path}");
    let message = runner.pass()?;
    assert_eq!(message.stdout_lossy(), "faked");
    assert_eq!(fake.call_count(), 1);

    defaults::reset();
    assert_ne!(runner.backend()?.kind(), BackendKind::Fake);
    assert_eq!(defaults::availability(), command_runner::Availability::new());
    Ok(())
}

#[test]
fn test_runner_backend_overrides_default() -> Result<()> {
    let _guard = isolated();

    defaults::set_backend(Arc::new(FakeBackend::new()));
    let runner = Runner::new("true").with_backend(BackendKind::Spawn.instantiate()?);
    assert_eq!(runner.backend()?.kind(), BackendKind::Spawn);

    defaults::reset();
    Ok(())
}

#[test]
fn test_fake_must_be_chosen_explicitly() -> Result<()> {
    let _guard = isolated();

    // Left alone, the default launches real processes
    assert_ne!(Runner::new("true").backend()?.kind(), BackendKind::Fake);

    // Configured fake never shells out, even for a command that does not exist
    let config = command_runner::RunnerConfig::from_json_str(r#"{"backend": "fake"}"#)?;
    let runner = Runner::from_config("some-non-existant-command", &config)?;
    let message = runner.pass()?;
    assert!(message.is_executed());
    assert_eq!(message.process_id(), None);

    defaults::reset();
    Ok(())
}
