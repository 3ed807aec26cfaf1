//! Command type handed to backends

use crate::interpolate::Contents;
use std::collections::HashMap;

/// Extra environment variables for a child process
pub type Environment = HashMap<String, String>;

/// Join a command and its arguments with single spaces.
///
/// The separator after the command is always written, so a command with no
/// arguments ends in a space.
pub(crate) fn join_line(command: &str, arguments: &[String]) -> String {
    format!("{} {}", command, arguments.join(" "))
}

/// A resolved command ready to be launched by a backend
///
/// Unlike the template it was resolved from, every argument here is final:
/// backends pass them through as-is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    /// The program to execute
    program: String,
    /// The arguments to pass to the program
    args: Vec<String>,
    /// Environment variables to add to the inherited environment
    env: Environment,
}

impl Command {
    /// Create a new command for the given program
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            env: Environment::new(),
        }
    }

    /// Add an argument to the command
    pub fn arg(&mut self, arg: impl Into<String>) -> &mut Self {
        self.args.push(arg.into());
        self
    }

    /// Add multiple arguments to the command
    pub fn args<I, S>(&mut self, args: I) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for arg in args {
            self.arg(arg);
        }
        self
    }

    /// Set an environment variable
    pub fn env(&mut self, key: impl Into<String>, val: impl Into<String>) -> &mut Self {
        self.env.insert(key.into(), val.into());
        self
    }

    /// Set multiple environment variables
    pub fn envs<I, K, V>(&mut self, vars: I) -> &mut Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        for (key, val) in vars {
            self.env(key, val);
        }
        self
    }

    /// Get the program name
    pub fn get_program(&self) -> &str {
        &self.program
    }

    /// Get the arguments
    pub fn get_args(&self) -> &[String] {
        &self.args
    }

    /// Get the environment variables
    pub fn get_envs(&self) -> &Environment {
        &self.env
    }

    /// The line this command stands for: program and arguments joined by spaces
    pub fn line(&self) -> String {
        join_line(&self.program, &self.args)
    }

    /// Build the `async_process::Command` that runs this program directly
    pub(crate) fn prepare(&self) -> async_process::Command {
        let mut cmd = async_process::Command::new(&self.program);
        cmd.args(&self.args);
        cmd.envs(&self.env);
        cmd
    }

    /// Build the `async_process::Command` that hands the joined line to `sh -c`
    pub(crate) fn prepare_shell(&self) -> async_process::Command {
        let mut cmd = crate::backends::path::shell_command(&self.line());
        cmd.envs(&self.env);
        cmd
    }
}

impl From<Contents> for Command {
    fn from(contents: Contents) -> Self {
        Self {
            program: contents.command,
            args: contents.arguments,
            env: Environment::new(),
        }
    }
}

/// Builder pattern helper
impl Command {
    /// Create a builder for this command (for chaining)
    pub fn builder(program: impl Into<String>) -> CommandBuilder {
        CommandBuilder(Command::new(program))
    }
}

/// Builder wrapper for more ergonomic command construction
pub struct CommandBuilder(Command);

impl CommandBuilder {
    /// Add an argument
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.0.arg(arg);
        self
    }

    /// Add multiple arguments
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.0.args(args);
        self
    }

    /// Set an environment variable
    pub fn env(mut self, key: impl Into<String>, val: impl Into<String>) -> Self {
        self.0.env(key, val);
        self
    }

    /// Set multiple environment variables
    pub fn envs<I, K, V>(mut self, vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.0.envs(vars);
        self
    }

    /// Build the command
    pub fn build(self) -> Command {
        self.0
    }
}
