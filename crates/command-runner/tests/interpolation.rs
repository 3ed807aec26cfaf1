//! Template interpolation as seen by a backend

mod common;

use command_runner::backends::FakeBackend;
use command_runner::{MissingValues, Options, Runner, Values};
use std::sync::Arc;

fn runner(line: &str) -> (Runner, FakeBackend) {
    common::init_tracing();
    let fake = FakeBackend::new();
    (Runner::new(line).with_backend(Arc::new(fake.clone())), fake)
}

fn bad_value() -> Values {
    Values::new().with("x", "`bad value`")
}

#[test]
fn test_single_braces_escape_value() {
    let (runner, fake) = runner("some {x}");

    let contents = runner.contents(&bad_value()).unwrap();
    assert_eq!(contents.command, "some");
    assert_eq!(contents.arguments, ["\\`bad\\ value\\`"]);

    runner.execute(&bad_value(), Options::new()).unwrap().wait().unwrap();
    assert_eq!(fake.calls()[0].command.get_args(), ["\\`bad\\ value\\`"]);
}

#[test]
fn test_double_braces_insert_value_verbatim() {
    let (runner, _) = runner("some {{x}}");
    let contents = runner.contents(&bad_value()).unwrap();
    assert_eq!(contents.arguments, ["`bad value`"]);
}

#[test]
fn test_values_are_not_rescanned() {
    let (runner, _) = runner("some {x}");
    let values = Values::new().with("x", "{other}").with("other", "boom");

    let contents = runner.contents(&values).unwrap();
    assert_eq!(contents.arguments, ["\\{other\\}"]);
}

#[test]
fn test_mismatched_braces_stay_literal() {
    let (mismatched_open, _) = runner("some {{x}");
    assert_eq!(
        mismatched_open.contents(&bad_value()).unwrap().arguments,
        ["{{x}"]
    );

    let (mismatched_close, _) = runner("some {x}}");
    assert_eq!(
        mismatched_close.contents(&bad_value()).unwrap().arguments,
        ["{x}}"]
    );
}

#[test]
fn test_interpolation_keeps_argument_boundaries() {
    let (runner, fake) = runner("printf %s {{x}} tail");
    runner
        .execute(&Values::new().with("x", "one two three"), Options::new())
        .unwrap()
        .wait()
        .unwrap();

    let call = &fake.calls()[0];
    assert_eq!(call.command.get_program(), "printf");
    assert_eq!(call.command.get_args(), ["%s", "one two three", "tail"]);
}

#[test]
fn test_plain_command_reaches_backend_unchanged() {
    let (runner, fake) = runner("git log --oneline -n 5");
    let message = runner.pass().unwrap();

    assert_eq!(message.line(), "git log --oneline -n 5");
    let call = &fake.calls()[0];
    assert_eq!(call.command.get_program(), "git");
    assert_eq!(call.command.get_args(), ["log", "--oneline", "-n", "5"]);
}

#[test]
fn test_command_word_is_never_interpolated() {
    let (runner, fake) = runner("{x} arg");
    runner.execute(&bad_value(), Options::new()).unwrap();
    assert_eq!(fake.calls()[0].command.get_program(), "{x}");
}

#[test]
fn test_missing_values_policies() {
    let (runner, _) = runner("echo {absent} {{also_absent}}");
    let contents = runner.contents(&Values::new()).unwrap();
    assert_eq!(contents.arguments, ["{absent}", "{{also_absent}}"]);

    let strict = runner.with_missing_values(MissingValues::Fail);
    let err = strict.contents(&Values::new()).unwrap_err();
    assert!(err.to_string().contains("absent"));
}

#[test]
fn test_empty_value_is_quoted() {
    let (runner, _) = runner("grep {pattern}");
    let contents = runner
        .contents(&Values::new().with("pattern", ""))
        .unwrap();
    assert_eq!(contents.arguments, ["''"]);
}

#[test]
fn test_context_values_are_overridden_per_call() {
    let (runner, _) = runner("ls {dir}");
    let runner = runner.with_context(Values::new().with("dir", "/var/log"));

    assert_eq!(runner.contents(&Values::new()).unwrap().arguments, ["/var/log"]);
    assert_eq!(
        runner
            .contents(&Values::new().with("dir", "/tmp"))
            .unwrap()
            .arguments,
        ["/tmp"]
    );
}
