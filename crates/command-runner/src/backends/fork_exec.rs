//! Fork/exec backend with hand-wired pipes
//!
//! The parent prepares everything the child needs (program path, argv,
//! environment block, working directory) as C strings before forking. The
//! child only duplicates descriptors, changes directory and calls `execve`,
//! all async-signal-safe. An extra close-on-exec pipe reports an `execve`
//! failure back to the parent: reading EOF from it means the exec succeeded.

use std::collections::BTreeMap;
use std::ffi::{CString, OsString, c_char};
use std::fs::File;
use std::io::{Read, Write};
use std::os::fd::{AsRawFd, OwnedFd, RawFd};
use std::os::unix::ffi::{OsStrExt, OsStringExt};
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};

use chrono::Utc;
use nix::errno::Errno;
use nix::fcntl::{FcntlArg, FdFlag, fcntl};
use nix::libc;
use nix::sys::signal::{self, SigHandler, Signal};
use nix::sys::wait::{WaitStatus, waitpid};
use nix::unistd::{self, ForkResult, Pid};
use tracing::debug;

use crate::backend::{Backend, BackendKind};
use crate::backends::path::SHELL;
use crate::backends::{Invocation, elapsed, ignore_broken_pipe};
use crate::command::Command;
use crate::error::{Error, Result, Stream};
use crate::future::{Completion, ResultFuture};
use crate::options::Options;
use crate::process::ExitStatus;

/// Backend that forks and execs the child directly
#[derive(Debug, Clone, Copy, Default)]
pub struct ForkExecBackend;

impl Backend for ForkExecBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::ForkExec
    }

    fn call(
        &self,
        command: Command,
        options: Options,
        on_complete: Option<Completion>,
    ) -> Result<ResultFuture> {
        let invocation = Invocation::new(command, options);
        let Some(program) = invocation.resolve_program() else {
            return Ok(ResultFuture::ready(
                Ok(invocation.no_such_command()),
                on_complete,
            ));
        };

        let image = ExecImage::new(&program, &invocation)?;
        let pipes = Pipes::new()?;

        let start = Utc::now();
        let launched = match launch(&image, pipes)? {
            Launched::Running(child) => child,
            Launched::ExecFailed(code) if is_not_found(code) => {
                return Ok(ResultFuture::ready(
                    Ok(invocation.no_such_command()),
                    on_complete,
                ));
            }
            Launched::ExecFailed(code) => {
                return Err(Error::spawn_failed(format!(
                    "Failed to exec `{}`: {}",
                    invocation.line,
                    std::io::Error::from_raw_os_error(code)
                )));
            }
        };

        let pid = launched.process.pid.as_raw() as u32;
        debug!(line = %invocation.line, pid, backend = "fork_exec", "launched process");

        let process = launched.process.clone();
        let canceller = Box::new(move || process.kill());

        // If the worker cannot start, dropping `launched` kills and reaps
        // the child
        let line = invocation.line.clone();
        ResultFuture::spawn_process(line, pid, canceller, on_complete, move || {
            let RunningChild {
                process,
                stdin,
                stdout,
                stderr,
            } = launched;
            let input = invocation.launch.input.clone();

            let (fed, status, stdout, stderr) = std::thread::scope(|scope| {
                let stdout = scope.spawn(move || drain(stdout, Stream::Stdout));
                let stderr = scope.spawn(move || drain(stderr, Stream::Stderr));

                let fed = feed(stdin, input);
                let status = process.wait();

                (fed, status, join(stdout, Stream::Stdout), join(stderr, Stream::Stderr))
            });
            let end = Utc::now();

            let status = status?;
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
    }
}

/// Everything `execve` needs, prepared before forking so the child never
/// allocates
struct ExecImage {
    path: CString,
    argv: Vec<CString>,
    envp: Vec<CString>,
    dir: Option<CString>,
}

/// Null-terminated pointer array over `strings`, valid while they live
fn pointers(strings: &[CString]) -> Vec<*const c_char> {
    strings
        .iter()
        .map(|s| s.as_ptr())
        .chain(std::iter::once(std::ptr::null()))
        .collect()
}

fn cstring(bytes: impl Into<Vec<u8>>) -> Result<CString> {
    CString::new(bytes).map_err(|e| {
        Error::spawn_failed(format!("argument contains an interior NUL byte: {e}"))
    })
}

impl ExecImage {
    fn new(program: &Path, invocation: &Invocation) -> Result<Self> {
        let (path, argv) = if invocation.launch.unsafe_line {
            let argv = vec![cstring("sh")?, cstring("-c")?, cstring(invocation.line.as_str())?];
            (cstring(SHELL)?, argv)
        } else {
            let mut argv = vec![cstring(invocation.command.get_program())?];
            for arg in invocation.command.get_args() {
                argv.push(cstring(arg.as_str())?);
            }
            (cstring(program.as_os_str().as_bytes())?, argv)
        };

        let mut env: BTreeMap<OsString, OsString> = std::env::vars_os().collect();
        env.extend(
            invocation
                .command
                .get_envs()
                .iter()
                .map(|(key, value)| (OsString::from(key), OsString::from(value))),
        );
        let envp = env
            .into_iter()
            .map(|(key, value)| {
                let mut entry = key.into_vec();
                entry.push(b'=');
                entry.extend(value.into_vec());
                cstring(entry)
            })
            .collect::<Result<Vec<_>>>()?;

        let dir = invocation
            .options
            .current_dir
            .as_ref()
            .map(|dir| cstring(dir.as_os_str().as_bytes()))
            .transpose()?;

        Ok(Self {
            path,
            argv,
            envp,
            dir,
        })
    }
}

/// A pipe whose ends are both close-on-exec
#[cfg(any(target_os = "linux", target_os = "android"))]
fn cloexec_pipe() -> Result<(OwnedFd, OwnedFd)> {
    Ok(unistd::pipe2(nix::fcntl::OFlag::O_CLOEXEC)?)
}

/// A pipe whose ends are both close-on-exec
#[cfg(not(any(target_os = "linux", target_os = "android")))]
fn cloexec_pipe() -> Result<(OwnedFd, OwnedFd)> {
    let (read, write) = unistd::pipe()?;
    for fd in [&read, &write] {
        fcntl(fd.as_raw_fd(), FcntlArg::F_SETFD(FdFlag::FD_CLOEXEC))?;
    }
    Ok((read, write))
}

/// The four pipes of one invocation: the three standard streams plus the
/// exec-error channel
struct Pipes {
    stdin: (OwnedFd, OwnedFd),
    stdout: (OwnedFd, OwnedFd),
    stderr: (OwnedFd, OwnedFd),
    exec_error: (OwnedFd, OwnedFd),
}

impl Pipes {
    fn new() -> Result<Self> {
        Ok(Self {
            stdin: cloexec_pipe()?,
            stdout: cloexec_pipe()?,
            stderr: cloexec_pipe()?,
            exec_error: cloexec_pipe()?,
        })
    }
}

/// A forked child, killed and reaped if dropped before it was waited on
#[derive(Debug)]
struct ChildProcess {
    pid: Pid,
    /// Set once the child has been reaped; held while signalling so a kill
    /// never reaches a recycled pid
    reaped: Mutex<bool>,
}

impl ChildProcess {
    fn new(pid: Pid) -> Arc<Self> {
        Arc::new(Self {
            pid,
            reaped: Mutex::new(false),
        })
    }

    /// Send SIGKILL unless the child has already been reaped
    fn kill(&self) -> Result<()> {
        let reaped = self.reaped.lock().unwrap_or_else(PoisonError::into_inner);
        if *reaped {
            return Ok(());
        }
        signal::kill(self.pid, Signal::SIGKILL)
            .map_err(|e| Error::signal_failed(Signal::SIGKILL as i32, e.to_string()))
    }

    /// Block until the child terminates, then reap it
    fn wait(&self) -> Result<ExitStatus> {
        // The child stays a zombie after this, so its pid cannot be reused
        // before `reaped` is set
        wait_exited(self.pid)?;
        let mut reaped = self.reaped.lock().unwrap_or_else(PoisonError::into_inner);
        let status = reap(self.pid);
        *reaped = true;
        status
    }
}

impl Drop for ChildProcess {
    fn drop(&mut self) {
        let reaped = self.reaped.get_mut().unwrap_or_else(PoisonError::into_inner);
        if !*reaped {
            debug!(pid = self.pid.as_raw(), "killing unsupervised child");
            let _ = signal::kill(self.pid, Signal::SIGKILL);
            let _ = reap(self.pid);
            *reaped = true;
        }
    }
}

/// The parent's side of a running child
struct RunningChild {
    process: Arc<ChildProcess>,
    stdin: File,
    stdout: File,
    stderr: File,
}

enum Launched {
    Running(RunningChild),
    /// The child could not exec; carries the raw errno
    ExecFailed(i32),
}

fn is_not_found(code: i32) -> bool {
    matches!(code, libc::ENOENT | libc::ENOTDIR | libc::EACCES)
}

/// Fork, exec in the child, and keep the parent's ends of the pipes.
///
/// Every descriptor the parent does not keep is closed before this returns,
/// on both the success and the error paths.
#[allow(unsafe_code)]
fn launch(image: &ExecImage, pipes: Pipes) -> Result<Launched> {
    let Pipes {
        stdin: (stdin_read, stdin_write),
        stdout: (stdout_read, stdout_write),
        stderr: (stderr_read, stderr_write),
        exec_error: (error_read, error_write),
    } = pipes;

    let argv = pointers(&image.argv);
    let envp = pointers(&image.envp);

    // SAFETY: the child branch only calls async-signal-safe functions on
    // memory prepared before the fork, and never returns.
    let process = match unsafe { unistd::fork() }? {
        ForkResult::Parent { child } => ChildProcess::new(child),
        ForkResult::Child => exec_child(
            image,
            &argv,
            &envp,
            [
                stdin_read.as_raw_fd(),
                stdout_write.as_raw_fd(),
                stderr_write.as_raw_fd(),
            ],
            &error_write,
        ),
    };

    // Close the child's ends right away so our readers see EOF once the
    // child exits
    drop((stdin_read, stdout_write, stderr_write, error_write));

    let mut report = Vec::new();
    File::from(error_read)
        .read_to_end(&mut report)
        .map_err(|e| Error::spawn_failed(format!("Failed to read exec status: {e}")))?;

    if let Ok(bytes) = <[u8; 4]>::try_from(report.as_slice()) {
        // The child exits right after reporting; reap it
        process.wait()?;
        return Ok(Launched::ExecFailed(i32::from_ne_bytes(bytes)));
    }

    Ok(Launched::Running(RunningChild {
        process,
        stdin: File::from(stdin_write),
        stdout: File::from(stdout_read),
        stderr: File::from(stderr_read),
    }))
}

/// Runs in the forked child. Wires up stdio and execs; on failure reports
/// the errno through `error_pipe` and exits with 127.
#[allow(unsafe_code)]
fn exec_child(
    image: &ExecImage,
    argv: &[*const c_char],
    envp: &[*const c_char],
    stdio: [RawFd; 3],
    error_pipe: &OwnedFd,
) -> ! {
    let attempt = || -> nix::Result<()> {
        for (fd, target) in stdio.into_iter().zip(0..) {
            if fd == target {
                // dup2 onto itself keeps close-on-exec set
                fcntl(fd, FcntlArg::F_SETFD(FdFlag::empty()))?;
            } else {
                unistd::dup2(fd, target)?;
            }
        }
        if let Some(dir) = &image.dir {
            unistd::chdir(dir.as_c_str())?;
        }
        // Ignored dispositions survive exec; children expect the default
        // SAFETY: installing SIG_DFL runs no handler code.
        unsafe { signal::signal(Signal::SIGPIPE, SigHandler::SigDfl) }?;
        // SAFETY: both arrays are null-terminated and point into `image`,
        // which outlives this call.
        unsafe { libc::execve(image.path.as_ptr(), argv.as_ptr(), envp.as_ptr()) };
        Err(Errno::last())
    };

    let errno = match attempt() {
        Ok(()) => Errno::UnknownErrno,
        Err(errno) => errno,
    };
    let _ = unistd::write(error_pipe, &(errno as i32).to_ne_bytes());
    // SAFETY: `_exit` is async-signal-safe and skips the parent's atexit
    // handlers and buffered stdio, which the child must not run.
    unsafe { libc::_exit(127) }
}

/// Write the input and close stdin
fn feed(mut stdin: File, input: Option<Vec<u8>>) -> Result<()> {
    let Some(input) = input else {
        return Ok(());
    };
    stdin
        .write_all(&input)
        .or_else(ignore_broken_pipe)
        .map_err(|e| Error::pipe(Stream::Stdin, "write", e))
}

fn drain(mut pipe: File, stream: Stream) -> Result<Vec<u8>> {
    let mut buffer = Vec::new();
    pipe.read_to_end(&mut buffer)
        .map_err(|e| Error::pipe(stream, "read", e))?;
    Ok(buffer)
}

fn join(
    reader: std::thread::ScopedJoinHandle<'_, Result<Vec<u8>>>,
    stream: Stream,
) -> Result<Vec<u8>> {
    reader.join().unwrap_or_else(|_| {
        Err(Error::pipe(
            stream,
            "read",
            std::io::Error::other("reader thread panicked"),
        ))
    })
}

/// Block until `pid` has terminated without reaping it
#[allow(unsafe_code)]
fn wait_exited(pid: Pid) -> Result<()> {
    loop {
        // SAFETY: `siginfo_t` is plain data and `waitid` only writes into it.
        let mut info: libc::siginfo_t = unsafe { std::mem::zeroed() };
        let rc = unsafe {
            libc::waitid(
                libc::P_PID,
                pid.as_raw() as libc::id_t,
                &mut info,
                libc::WEXITED | libc::WNOWAIT,
            )
        };
        if rc == 0 {
            return Ok(());
        }
        match Errno::last() {
            Errno::EINTR => continue,
            errno => return Err(errno.into()),
        }
    }
}

/// Reap `pid`, blocking until it terminates
fn reap(pid: Pid) -> Result<ExitStatus> {
    loop {
        match waitpid(pid, None) {
            Ok(WaitStatus::Exited(_, code)) => return Ok(ExitStatus::exited(code)),
            Ok(WaitStatus::Signaled(_, sig, _)) => {
                return Ok(ExitStatus::signaled(sig as i32));
            }
            Ok(_) | Err(Errno::EINTR) => continue,
            Err(e) => return Err(e.into()),
        }
    }
}
