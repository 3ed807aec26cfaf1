//! Run external commands from interpolated templates
//!
//! A [`Runner`] holds a command template such as `grep -e {pattern} {{file}}`.
//! Each call substitutes values into the template, escaping `{name}`
//! placeholders for the shell and inserting `{{name}}` placeholders as-is,
//! then hands the resulting argument vector to a [`Backend`]. The backend
//! launches the process, wires up its standard streams and delivers a
//! [`Message`] through a [`ResultFuture`] and an optional callback.
//!
//! Backends are ranked by platform capability (fork/exec, native spawn,
//! shell backticks) and the best available one becomes the process-wide
//! default, see [`config::defaults`]. [`backends::FakeBackend`] never launches
//! anything and is meant for tests.

#![warn(missing_docs)]

pub mod backend;
pub mod backends;
pub mod command;
pub mod config;
pub mod error;
pub mod future;
pub mod interpolate;
pub mod message;
pub mod options;
pub mod process;
pub mod runner;

pub use backend::{Availability, Backend, BackendKind, best_backend_with};
pub use command::{Command, Environment};
pub use config::{RunnerConfig, defaults};
pub use error::{Error, Result, Stream};
pub use future::{Completion, ResultFuture};
pub use interpolate::{Contents, MissingValues, Template, Values, escape};
pub use message::Message;
pub use options::Options;
pub use process::ExitStatus;
pub use runner::Runner;
