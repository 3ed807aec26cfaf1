//! Runner configuration and the process-wide default backend

use crate::backend::BackendKind;
use crate::command::Environment;
use crate::error::Result;
use crate::interpolate::MissingValues;
use crate::options::Options;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Serializable runner settings
///
/// ```json
/// { "backend": "spawn", "missing_values": "fail", "unsafe": false, "env": { "LANG": "C" } }
/// ```
///
/// Every field is optional.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunnerConfig {
    /// Backend to use instead of the process-wide default
    pub backend: Option<BackendKind>,
    /// How placeholders without a value are handled
    pub missing_values: MissingValues,
    /// Run every invocation as a shell line
    #[serde(rename = "unsafe")]
    pub unsafe_line: bool,
    /// Environment added to every invocation
    pub env: Environment,
}

impl RunnerConfig {
    /// Parse a configuration from JSON text
    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Read and parse a JSON configuration file
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    /// The default options these settings describe
    pub fn options(&self) -> Options {
        Options {
            unsafe_line: self.unsafe_line,
            env: self.env.clone(),
            ..Options::default()
        }
    }

    /// The configured backend, instantiated; `None` when the process-wide
    /// default applies
    pub fn backend(&self) -> Result<Option<std::sync::Arc<dyn crate::backend::Backend>>> {
        self.backend.map(BackendKind::instantiate).transpose()
    }
}

/// The process-wide default backend.
///
/// Runners without a backend of their own use [`backend`]. Unless one was
/// installed with [`set_backend`], it is the best available backend, picked
/// on first use and cached. Changing availability overrides with
/// [`set_available`] drops a cached pick; an installed backend stays until
/// [`reset`].
pub mod defaults {
    use crate::backend::{Availability, Backend, BackendKind, best_backend_with};
    use crate::error::Result;
    use std::sync::{Arc, PoisonError, RwLock};
    use tracing::debug;

    struct State {
        backend: Option<Arc<dyn Backend>>,
        explicit: bool,
        availability: Availability,
    }

    static STATE: RwLock<State> = RwLock::new(State {
        backend: None,
        explicit: false,
        availability: Availability::new(),
    });

    /// The default backend, selecting and caching one if needed
    pub fn backend() -> Result<Arc<dyn Backend>> {
        if let Some(backend) = &STATE.read().unwrap_or_else(PoisonError::into_inner).backend {
            return Ok(backend.clone());
        }

        let mut state = STATE.write().unwrap_or_else(PoisonError::into_inner);
        // Another thread may have selected one in between
        if let Some(backend) = &state.backend {
            return Ok(backend.clone());
        }
        let backend = best_backend_with(&state.availability)?;
        state.backend = Some(backend.clone());
        Ok(backend)
    }

    /// Install `backend` as the default until [`reset`]
    pub fn set_backend(backend: Arc<dyn Backend>) {
        debug!(backend = %backend.kind(), "installing default backend");
        let mut state = STATE.write().unwrap_or_else(PoisonError::into_inner);
        state.backend = Some(backend);
        state.explicit = true;
    }

    /// Override the availability of one backend kind
    pub fn set_available(kind: BackendKind, available: bool) {
        let mut state = STATE.write().unwrap_or_else(PoisonError::into_inner);
        state.availability.set(kind, available);
        if !state.explicit {
            state.backend = None;
        }
        debug!(backend = %kind, available, "availability override changed");
    }

    /// The current availability overrides
    pub fn availability() -> Availability {
        STATE
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .availability
            .clone()
    }

    /// The best available backend under the current overrides, never cached
    pub fn best_backend() -> Result<Arc<dyn Backend>> {
        best_backend_with(&availability())
    }

    /// Forget the installed backend, the cached pick and all overrides
    pub fn reset() {
        let mut state = STATE.write().unwrap_or_else(PoisonError::into_inner);
        state.backend = None;
        state.explicit = false;
        state.availability.clear();
        debug!("default backend reset");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_config() {
        let config = RunnerConfig::from_json_str(
            r#"{"backend": "backticks", "missing_values": "fail", "unsafe": true, "env": {"LANG": "C"}}"#,
        )
        .unwrap();

        assert_eq!(config.backend, Some(BackendKind::Backticks));
        assert_eq!(config.missing_values, MissingValues::Fail);
        assert!(config.unsafe_line);

        let options = config.options();
        assert!(options.unsafe_line);
        assert_eq!(options.env.get("LANG").map(String::as_str), Some("C"));
        assert_eq!(config.backend().unwrap().unwrap().kind(), BackendKind::Backticks);
    }

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = RunnerConfig::from_json_str("{}").unwrap();
        assert_eq!(config, RunnerConfig::default());
        assert_eq!(config.missing_values, MissingValues::Literal);
        assert!(config.backend().unwrap().is_none());
    }

    #[test]
    fn test_invalid_config() {
        let err = RunnerConfig::from_json_str(r#"{"backend": "telnet"}"#).unwrap_err();
        assert!(matches!(err, crate::Error::Config(_)));
    }

    #[test]
    fn test_config_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("runner.json");
        std::fs::write(&path, r#"{"backend": "fake"}"#).unwrap();

        let config = RunnerConfig::from_json_file(&path).unwrap();
        assert_eq!(config.backend, Some(BackendKind::Fake));
    }
}
