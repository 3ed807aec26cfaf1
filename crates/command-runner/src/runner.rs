//! The public entry point: a command template bound to a backend

use crate::backend::Backend;
use crate::command::Command;
use crate::config::{RunnerConfig, defaults};
use crate::error::Result;
use crate::future::{Completion, ResultFuture};
use crate::interpolate::{Contents, MissingValues, Template, Values};
use crate::message::Message;
use crate::options::Options;
use std::sync::Arc;
use tracing::debug;

/// Runs one command template with interpolated values
///
/// ```no_run
/// use command_runner::{Options, Runner, Values};
///
/// let runner = Runner::new("grep -e {pattern} {{file}}");
/// let values = Values::new().with("pattern", "a b").with("file", "notes.txt");
/// let message = runner.execute(&values, Options::new())?.wait()?;
/// println!("{}", message.stdout_lossy());
/// # Ok::<(), command_runner::Error>(())
/// ```
#[derive(Debug, Clone)]
pub struct Runner {
    template: Template,
    context: Values,
    options: Options,
    missing: MissingValues,
    backend: Option<Arc<dyn Backend>>,
}

impl Runner {
    /// A runner for a whole command line; the first word is the command
    pub fn new(line: &str) -> Self {
        Self::with_template(Template::parse(line))
    }

    /// A runner for a command name and an argument template
    pub fn from_parts(command: impl Into<String>, arguments: &str) -> Self {
        Self::with_template(Template::from_parts(command, arguments))
    }

    /// A runner for `line` with the settings from `config`.
    ///
    /// Fails if the configured backend cannot run on this platform.
    pub fn from_config(line: &str, config: &RunnerConfig) -> Result<Self> {
        let mut runner = Self::new(line)
            .with_options(config.options())
            .with_missing_values(config.missing_values);
        runner.backend = config.backend()?;
        Ok(runner)
    }

    fn with_template(template: Template) -> Self {
        Self {
            template,
            context: Values::new(),
            options: Options::new(),
            missing: MissingValues::default(),
            backend: None,
        }
    }

    /// Values available to every call; per-call values take precedence
    pub fn with_context(mut self, context: Values) -> Self {
        self.context = context;
        self
    }

    /// Options applied to every call; per-call options take precedence
    pub fn with_options(mut self, options: Options) -> Self {
        self.options = options;
        self
    }

    /// How placeholders without a value are handled
    pub fn with_missing_values(mut self, missing: MissingValues) -> Self {
        self.missing = missing;
        self
    }

    /// Use `backend` instead of the process-wide default
    pub fn with_backend(mut self, backend: Arc<dyn Backend>) -> Self {
        self.backend = Some(backend);
        self
    }

    /// Replace the backend of this runner
    pub fn set_backend(&mut self, backend: Arc<dyn Backend>) {
        self.backend = Some(backend);
    }

    /// The parsed template
    pub fn template(&self) -> &Template {
        &self.template
    }

    /// The backend calls go to: this runner's own, or the process-wide
    /// default
    pub fn backend(&self) -> Result<Arc<dyn Backend>> {
        match &self.backend {
            Some(backend) => Ok(backend.clone()),
            None => defaults::backend(),
        }
    }

    /// The best available backend right now, ignoring any override
    pub fn best_backend() -> Result<Arc<dyn Backend>> {
        defaults::best_backend()
    }

    /// Resolve the template against the context and `values`, without
    /// running anything
    pub fn contents(&self, values: &Values) -> Result<Contents> {
        self.template
            .resolve(&self.context.merged(values), self.missing)
    }

    /// Launch the command
    pub fn execute(&self, values: &Values, options: Options) -> Result<ResultFuture> {
        self.dispatch(values, options, None)
    }

    /// Launch the command; `on_complete` runs once with the outcome, a
    /// message or the error that prevented one
    pub fn execute_then<F>(
        &self,
        values: &Values,
        options: Options,
        on_complete: F,
    ) -> Result<ResultFuture>
    where
        F: FnOnce(&Result<Message>) + Send + 'static,
    {
        self.dispatch(values, options, Some(Box::new(on_complete)))
    }

    /// Run with the context alone and wait for the message
    pub fn pass(&self) -> Result<Message> {
        self.execute(&Values::new(), Options::new())?.wait()
    }

    /// Run with the context alone, call `on_complete`, and wait for the
    /// message
    pub fn pass_then<F>(&self, on_complete: F) -> Result<Message>
    where
        F: FnOnce(&Result<Message>) + Send + 'static,
    {
        self.execute_then(&Values::new(), Options::new(), on_complete)?
            .wait()
    }

    fn dispatch(
        &self,
        values: &Values,
        options: Options,
        on_complete: Option<Completion>,
    ) -> Result<ResultFuture> {
        let contents = self.contents(values)?;
        let (env, options) = self.options.merged(options).split_env();
        let mut command = Command::from(contents);
        command.envs(env);

        let backend = self.backend()?;
        debug!(line = %command.line(), backend = %backend.kind(), "executing command");
        backend.call(command, options, on_complete)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::FakeBackend;
    use crate::error::Error;
    use std::sync::Mutex;

    fn fake_runner(line: &str) -> (Runner, FakeBackend) {
        let fake = FakeBackend::new();
        let runner = Runner::new(line).with_backend(Arc::new(fake.clone()));
        (runner, fake)
    }

    #[test]
    fn test_escaped_value_reaches_backend() {
        let (runner, fake) = fake_runner("some {x}");
        let values = Values::new().with("x", "`bad value`");

        let message = runner.execute(&values, Options::new()).unwrap().wait().unwrap();

        let calls = fake.calls();
        assert_eq!(calls[0].command.get_program(), "some");
        assert_eq!(calls[0].command.get_args(), ["\\`bad\\ value\\`"]);
        assert_eq!(message.line(), "some \\`bad\\ value\\`");
    }

    #[test]
    fn test_raw_value_reaches_backend() {
        let (runner, fake) = fake_runner("some {{x}}");
        runner
            .execute(&Values::new().with("x", "`bad value`"), Options::new())
            .unwrap();
        assert_eq!(fake.calls()[0].command.get_args(), ["`bad value`"]);
    }

    #[test]
    fn test_context_and_values_merge() {
        let (runner, _) = fake_runner("cp {src} {dst}");
        let runner = runner.with_context(Values::new().with("src", "a").with("dst", "b"));

        let contents = runner.contents(&Values::new().with("dst", "c")).unwrap();
        assert_eq!(contents.command, "cp");
        assert_eq!(contents.arguments, ["a", "c"]);
    }

    #[test]
    fn test_strict_missing_value() {
        let (runner, fake) = fake_runner("echo {absent}");
        let runner = runner.with_missing_values(MissingValues::Fail);

        let err = runner.execute(&Values::new(), Options::new()).unwrap_err();
        assert!(matches!(err, Error::MissingValue { ref name } if name == "absent"));
        assert_eq!(fake.call_count(), 0);
    }

    #[test]
    fn test_options_are_layered() {
        let (runner, fake) = fake_runner("env");
        let runner = runner.with_options(
            Options::new()
                .with_env("A", "runner")
                .with_env("B", "runner")
                .with_input("default"),
        );

        let message = runner
            .execute(&Values::new(), Options::new().with_env("B", "call"))
            .unwrap()
            .wait()
            .unwrap();

        let call = &fake.calls()[0];
        assert_eq!(call.command.get_envs().get("A").map(String::as_str), Some("runner"));
        assert_eq!(call.command.get_envs().get("B").map(String::as_str), Some("call"));
        assert!(call.options.env.is_empty());
        assert_eq!(call.options.input.as_deref(), Some(&b"default"[..]));
        assert_eq!(message.env().len(), 2);
    }

    #[test]
    fn test_pass_then_calls_back_once() {
        let (runner, _) = fake_runner("true");
        let lines = Arc::new(Mutex::new(Vec::new()));
        let sink = lines.clone();

        let message = runner
            .pass_then(move |outcome| {
                let line = outcome.as_ref().map(|m| m.line().to_owned()).unwrap();
                sink.lock().unwrap().push(line)
            })
            .unwrap();

        assert!(message.is_success());
        assert_eq!(*lines.lock().unwrap(), ["true ".to_owned()]);
    }

    #[test]
    fn test_from_parts() {
        let (runner, _) = fake_runner("ignored");
        let runner = Runner::from_parts("echo", "{a} b").with_backend(runner.backend().unwrap());
        let contents = runner.contents(&Values::new().with("a", "x y")).unwrap();
        assert_eq!(contents.line(), "echo x\\ y b");
    }

    #[test]
    fn test_from_config() {
        let config = RunnerConfig::from_json_str(
            r#"{"backend": "fake", "missing_values": "fail", "env": {"K": "V"}}"#,
        )
        .unwrap();
        let runner = Runner::from_config("echo {x}", &config).unwrap();

        assert_eq!(runner.backend().unwrap().kind(), crate::BackendKind::Fake);
        assert!(runner.contents(&Values::new()).is_err());
        let err = runner.pass_then(|_| {}).unwrap_err();
        assert!(matches!(err, Error::MissingValue { .. }));
    }

    #[cfg(not(unix))]
    #[test]
    fn test_from_config_rejects_unsupported_backend() {
        let config = RunnerConfig::from_json_str(r#"{"backend": "fork_exec"}"#).unwrap();
        let err = Runner::from_config("echo", &config).unwrap_err();
        assert!(matches!(err, Error::BackendUnavailable { .. }));
    }
}
