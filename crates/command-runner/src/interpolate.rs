//! Command templates and placeholder interpolation
//!
//! A template such as `git log {branch} --format={{format}}` is split on
//! whitespace once, when it is parsed. The first word is the command and is
//! never interpolated; every other word is scanned for placeholders:
//!
//! - `{name}` is replaced by the value for `name`, shell-escaped
//! - `{{name}}` is replaced by the value verbatim
//! - anything with unbalanced braces (`{{name}`, `{name}}`) stays literal
//!
//! Values are inserted after the split, so they can never introduce new
//! arguments, and the substituted text is never scanned again.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::ops::Range;

/// How a placeholder's value is inserted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PlaceholderKind {
    /// `{name}`: the value is shell-escaped
    Escaped,
    /// `{{name}}`: the value is inserted verbatim
    Raw,
}

/// One piece of an argument token
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    /// Text copied through unchanged
    Literal(String),
    /// A named substitution site
    Placeholder {
        /// Name of the value to substitute
        name: String,
        /// Whether the value is escaped
        kind: PlaceholderKind,
    },
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Segment::Literal(text) => f.write_str(text),
            Segment::Placeholder {
                name,
                kind: PlaceholderKind::Escaped,
            } => write!(f, "{{{name}}}"),
            Segment::Placeholder {
                name,
                kind: PlaceholderKind::Raw,
            } => write!(f, "{{{{{name}}}}}"),
        }
    }
}

/// What to do when a placeholder names a value that was not supplied
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MissingValues {
    /// Leave the placeholder text in the argument as written
    #[default]
    Literal,
    /// Fail with [`Error::MissingValue`]
    Fail,
}

/// Substitution values, keyed by placeholder name
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Values(HashMap<String, String>);

impl Values {
    /// Create an empty set of values
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a value (for chaining)
    pub fn with(mut self, name: impl Into<String>, value: impl ToString) -> Self {
        self.insert(name, value);
        self
    }

    /// Insert a value, returning the previous one for that name
    pub fn insert(&mut self, name: impl Into<String>, value: impl ToString) -> Option<String> {
        self.0.insert(name.into(), value.to_string())
    }

    /// Look up a value by placeholder name
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(String::as_str)
    }

    /// Number of values
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true if there are no values
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Layer `overrides` on top of these values
    pub fn merged(&self, overrides: &Values) -> Values {
        let mut merged = self.clone();
        merged
            .0
            .extend(overrides.0.iter().map(|(k, v)| (k.clone(), v.clone())));
        merged
    }
}

impl<K: Into<String>, V: ToString> FromIterator<(K, V)> for Values {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut values = Values::new();
        for (name, value) in iter {
            values.insert(name, value);
        }
        values
    }
}

impl<K: Into<String>, V: ToString, const N: usize> From<[(K, V); N]> for Values {
    fn from(pairs: [(K, V); N]) -> Self {
        pairs.into_iter().collect()
    }
}

/// A resolved template: the command and its final argument vector
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Contents {
    /// The command to run
    pub command: String,
    /// The interpolated arguments
    pub arguments: Vec<String>,
}

impl Contents {
    /// The command joined with its arguments by single spaces
    pub fn line(&self) -> String {
        crate::command::join_line(&self.command, &self.arguments)
    }
}

/// A parsed command template
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template {
    command: String,
    arguments: Vec<Vec<Segment>>,
}

impl Template {
    /// Parse a whole command line; the first word is the command
    pub fn parse(line: &str) -> Self {
        let mut words = line.split_whitespace();
        let command = words.next().unwrap_or_default().to_owned();
        Self {
            command,
            arguments: words.map(parse_token).collect(),
        }
    }

    /// Build a template from a command and a separate argument template
    pub fn from_parts(command: impl Into<String>, arguments: &str) -> Self {
        Self {
            command: command.into(),
            arguments: arguments.split_whitespace().map(parse_token).collect(),
        }
    }

    /// The command name
    pub fn command(&self) -> &str {
        &self.command
    }

    /// The parsed argument tokens
    pub fn arguments(&self) -> &[Vec<Segment>] {
        &self.arguments
    }

    /// All placeholders in the template, in order of appearance
    pub fn placeholders(&self) -> impl Iterator<Item = (&str, PlaceholderKind)> {
        self.arguments.iter().flatten().filter_map(|segment| match segment {
            Segment::Placeholder { name, kind } => Some((name.as_str(), *kind)),
            Segment::Literal(_) => None,
        })
    }

    /// Substitute `values` into the template
    pub fn resolve(&self, values: &Values, missing: MissingValues) -> Result<Contents> {
        let arguments = self
            .arguments
            .iter()
            .map(|token| resolve_token(token, values, missing))
            .collect::<Result<Vec<_>>>()?;

        Ok(Contents {
            command: self.command.clone(),
            arguments,
        })
    }
}

/// Escape `value` so a POSIX shell reads it back as a single word
///
/// Every character outside `[A-Za-z0-9_\-.,:+/@\n]` gets a backslash, a
/// newline is wrapped in single quotes, and the empty string becomes `''`.
pub fn escape(value: &str) -> String {
    if value.is_empty() {
        return "''".to_owned();
    }

    let mut escaped = String::with_capacity(value.len() * 2);
    for ch in value.chars() {
        match ch {
            '\n' => escaped.push_str("'\n'"),
            c if c.is_ascii_alphanumeric()
                || matches!(c, '_' | '-' | '.' | ',' | ':' | '+' | '/' | '@') =>
            {
                escaped.push(c)
            }
            c => {
                escaped.push('\\');
                escaped.push(c);
            }
        }
    }
    escaped
}

fn resolve_token(token: &[Segment], values: &Values, missing: MissingValues) -> Result<String> {
    let mut resolved = String::new();
    for segment in token {
        match segment {
            Segment::Literal(text) => resolved.push_str(text),
            Segment::Placeholder { name, kind } => match (values.get(name), kind) {
                (Some(value), PlaceholderKind::Raw) => resolved.push_str(value),
                (Some(value), PlaceholderKind::Escaped) => resolved.push_str(&escape(value)),
                (None, _) if missing == MissingValues::Fail => {
                    return Err(Error::missing_value(name.clone()));
                }
                (None, _) => resolved.push_str(&segment.to_string()),
            },
        }
    }
    Ok(resolved)
}

fn is_name_byte(byte: u8) -> bool {
    byte.is_ascii_alphanumeric() || byte == b'_' || byte == b'-'
}

struct BraceMatch {
    name: Range<usize>,
    end: usize,
    kind: Option<PlaceholderKind>,
}

/// Match `{name}` or `{{name}}` starting at the `{` at `start`.
///
/// Brace runs are greedy (two if present, else one). A match whose opening
/// and closing runs differ has no kind and is kept as literal text.
fn match_braces(bytes: &[u8], start: usize) -> Option<BraceMatch> {
    let open = if bytes.get(start + 1) == Some(&b'{') { 2 } else { 1 };
    let name_start = start + open;
    let name_len = bytes[name_start..]
        .iter()
        .take_while(|byte| is_name_byte(**byte))
        .count();
    if name_len == 0 {
        return None;
    }

    let name_end = name_start + name_len;
    let close = match (bytes.get(name_end), bytes.get(name_end + 1)) {
        (Some(b'}'), Some(b'}')) => 2,
        (Some(b'}'), _) => 1,
        _ => return None,
    };

    let kind = match (open, close) {
        (1, 1) => Some(PlaceholderKind::Escaped),
        (2, 2) => Some(PlaceholderKind::Raw),
        _ => None,
    };

    Some(BraceMatch {
        name: name_start..name_end,
        end: name_end + close,
        kind,
    })
}

fn parse_token(token: &str) -> Vec<Segment> {
    let bytes = token.as_bytes();
    let mut segments = Vec::new();
    let mut literal_start = 0;
    let mut i = 0;

    while i < bytes.len() {
        if bytes[i] != b'{' {
            i += 1;
            continue;
        }

        let Some(found) = match_braces(bytes, i) else {
            i += 1;
            continue;
        };

        if let Some(kind) = found.kind {
            if literal_start < i {
                segments.push(Segment::Literal(token[literal_start..i].to_owned()));
            }
            segments.push(Segment::Placeholder {
                name: token[found.name].to_owned(),
                kind,
            });
            literal_start = found.end;
        }
        i = found.end;
    }

    if literal_start < bytes.len() {
        segments.push(Segment::Literal(token[literal_start..].to_owned()));
    }
    segments
}
