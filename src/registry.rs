//! Explicit registration table for handlers and path functions.
//!
//! Handlers and the path functions they reference are registered by name at
//! startup from the `pluggable` configuration section. There is no implicit
//! discovery: a name that is not in the table is a configuration error.

use std::collections::BTreeMap;
use std::sync::Arc;

use camino::Utf8PathBuf;

use crate::config::{HandlerConfig, Settings};
use crate::error::FloodgateError;
use crate::file::PipelineFile;

/// Maps a pipeline file to its destination path under the store root.
pub type PathFunction = Arc<dyn Fn(&PipelineFile) -> Utf8PathBuf + Send + Sync>;

/// Name of the default path function: the source path mirrored under the
/// store root.
pub const DEFAULT_PATH_FUNCTION: &str = "mirror";

/// Registration table for handler parameter sets and path functions.
pub struct Registry {
    handlers: BTreeMap<String, HandlerConfig>,
    path_functions: BTreeMap<String, PathFunction>,
}

impl Registry {
    /// Creates a registry with the built-in path functions registered.
    ///
    /// - `mirror`: the source path, with any leading slash stripped
    /// - `basename`: the file name only, flattening directory structure
    pub fn new() -> Self {
        let mut registry = Self {
            handlers: BTreeMap::new(),
            path_functions: BTreeMap::new(),
        };
        registry.register_path_function(DEFAULT_PATH_FUNCTION, |file| {
            Utf8PathBuf::from(file.source_path().as_str().trim_start_matches('/'))
        });
        registry.register_path_function("basename", |file| Utf8PathBuf::from(file.name()));
        registry
    }

    /// Creates a registry populated with the handlers from settings.
    pub fn from_settings(settings: &Settings) -> Self {
        let mut registry = Self::new();
        for (name, config) in &settings.pluggable.handlers {
            registry.register_handler(name, config.clone());
        }
        registry
    }

    /// Registers a handler parameter set under the given name.
    pub fn register_handler(&mut self, name: impl Into<String>, config: HandlerConfig) {
        self.handlers.insert(name.into(), config);
    }

    /// Registers a path function under the given name.
    pub fn register_path_function<F>(&mut self, name: impl Into<String>, function: F)
    where
        F: Fn(&PipelineFile) -> Utf8PathBuf + Send + Sync + 'static,
    {
        self.path_functions.insert(name.into(), Arc::new(function));
    }

    /// Looks up a handler by name.
    pub fn handler(&self, name: &str) -> Result<&HandlerConfig, FloodgateError> {
        self.handlers.get(name).ok_or_else(|| {
            FloodgateError::Config(format!("no handler registered under name '{}'", name))
        })
    }

    /// Resolves the path function a handler configuration references.
    ///
    /// Falls back to the default when the handler names none.
    pub fn path_function_for(&self, config: &HandlerConfig) -> Result<PathFunction, FloodgateError> {
        let name = config
            .path_function
            .as_deref()
            .unwrap_or(DEFAULT_PATH_FUNCTION);
        self.path_functions.get(name).cloned().ok_or_else(|| {
            FloodgateError::Config(format!(
                "no path function registered under name '{}'",
                name
            ))
        })
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_path_functions() {
        let registry = Registry::new();
        let file = PipelineFile::new("/scratch/sub/a.nc", "/incoming/sub/a.nc");

        let mirror = registry
            .path_function_for(&HandlerConfig::default())
            .unwrap();
        assert_eq!(mirror(&file), Utf8PathBuf::from("incoming/sub/a.nc"));

        let config = HandlerConfig {
            path_function: Some("basename".to_string()),
            ..Default::default()
        };
        let basename = registry.path_function_for(&config).unwrap();
        assert_eq!(basename(&file), Utf8PathBuf::from("a.nc"));
    }

    #[test]
    fn test_unknown_names_are_config_errors() {
        let registry = Registry::new();
        assert!(matches!(
            registry.handler("missing"),
            Err(FloodgateError::Config(_))
        ));

        let config = HandlerConfig {
            path_function: Some("missing".to_string()),
            ..Default::default()
        };
        assert!(matches!(
            registry.path_function_for(&config),
            Err(FloodgateError::Config(_))
        ));
    }

    #[test]
    fn test_custom_path_function_registration() {
        let mut registry = Registry::new();
        registry.register_path_function("dated", |file| {
            Utf8PathBuf::from(format!("2026/{}", file.name()))
        });
        let config = HandlerConfig {
            path_function: Some("dated".to_string()),
            ..Default::default()
        };
        let function = registry.path_function_for(&config).unwrap();
        let file = PipelineFile::new("/scratch/a.nc", "a.nc");
        assert_eq!(function(&file), Utf8PathBuf::from("2026/a.nc"));
    }
}
