//! Program lookup on `PATH` and the system shell

use crate::command::Environment;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use tracing::trace;

/// The shell used for shell-line execution
#[cfg(unix)]
pub const SHELL: &str = "/bin/sh";
/// The shell used for shell-line execution
#[cfg(windows)]
pub const SHELL: &str = "cmd.exe";

#[cfg(unix)]
const SHELL_FLAG: &str = "-c";
#[cfg(windows)]
const SHELL_FLAG: &str = "/C";

/// Whether the system shell can be launched
pub fn shell_available() -> bool {
    which::which(SHELL).is_ok()
}

/// An `async_process` command that runs `line` through the system shell
pub(crate) fn shell_command(line: &str) -> async_process::Command {
    let mut cmd = async_process::Command::new(SHELL);
    cmd.arg(SHELL_FLAG).arg(line);
    cmd
}

/// Locate `program` the way `execvp` would.
///
/// Bare names are searched in `PATH`, taken from `env` when it sets one and
/// from the current process otherwise. Names with a path separator are
/// checked as given, relative to `cwd`.
pub fn find_program(program: &str, env: &Environment, cwd: &Path) -> Option<PathBuf> {
    if program.is_empty() {
        return None;
    }

    let search = env
        .get("PATH")
        .map(OsString::from)
        .or_else(|| std::env::var_os("PATH"));

    match which::which_in(program, search, cwd) {
        Ok(path) => Some(path),
        Err(e) => {
            trace!(program, error = %e, "program not found");
            None
        }
    }
}
