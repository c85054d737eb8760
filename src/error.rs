//! Error types for configuration, retrieval, monitoring and filesystem policy.
//!
//! Each domain gets its own enum. The binary wraps them in `anyhow` at the
//! top level and prints a `FATAL ERROR:` block before exiting.

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while loading, merging, resolving or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A YAML tag other than `!INCLUDE` was found.
    #[error("unknown YAML tag '!{tag}' in {}", path.display())]
    UnknownTag { tag: String, path: PathBuf },

    /// A mapping was used as a key, usually an unquoted `{{ ... }}` value.
    #[error("mapping used as a key in {}; templated value may need quoting", path.display())]
    UnquotedTemplate { path: PathBuf },

    #[error("unknown filter '{filter}' while resolving '{key}'")]
    UnknownFilter { filter: String, key: String },

    /// A template failed for a reason other than an undefined name,
    /// a type mismatch or a division by zero.
    #[error("template error in '{key}': {message}")]
    Template { key: String, message: String },

    #[error("templates did not converge after {iterations} passes")]
    DidNotConverge { iterations: usize },

    #[error("mandatory variable '{0}' is not set")]
    MissingMandatory(String),

    #[error("invalid value '{value}' for '{key}'; valid values are: {valid}")]
    InvalidValue {
        key: String,
        value: String,
        valid: String,
    },

    /// A user-supplied key with no counterpart in the defaults.
    #[error("invalid key '{key}' in {}", path.display())]
    InvalidKey { key: String, path: PathBuf },

    #[error("task key '{0}' must look like task_<name> or metatask_<name>")]
    InvalidTaskKey(String),

    #[error("unrecognized config file type for {}", .0.display())]
    UnknownFileType(PathBuf),

    #[error("required values are missing: {}", .0.join(", "))]
    MissingValues(Vec<String>),

    #[error("failed to parse {}: {message}", path.display())]
    Parse { path: PathBuf, message: String },

    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("YAML error in {}: {source}", path.display())]
    Yaml {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
}

impl ConfigError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub fn parse(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::Parse {
            path: path.into(),
            message: message.into(),
        }
    }

    pub fn template(key: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Template {
            key: key.into(),
            message: message.into(),
        }
    }
}

/// Errors raised by the data retrieval driver.
#[derive(Debug, Error)]
pub enum RetrievalError {
    /// Every data store was tried and none provided the requested files.
    #[error("no data stores had the requested data for {model} at {cycle}")]
    Unavailable { model: String, cycle: String },

    #[error("no data store configuration for {model} in store '{store}'")]
    NoStoreSpecs { model: String, store: String },

    #[error("no file names configured for {model} ({anl_or_fcst}) in store '{store}'")]
    NoFileNames {
        model: String,
        store: String,
        anl_or_fcst: String,
    },

    #[error("invalid data locations file {}: {message}", path.display())]
    Locations { path: PathBuf, message: String },

    #[error("invalid forecast hour list: {0}")]
    InvalidHours(String),

    #[error("invalid template '{template}': {reason}")]
    Template { template: String, reason: String },

    #[error("failed to run '{command}': {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Errors raised while checking a pre-existing directory or file.
#[derive(Debug, Error)]
pub enum PreexistError {
    /// The `quit` policy was selected and the path already exists.
    #[error("{} already exists", .0.display())]
    Exists(PathBuf),

    #[error("invalid preexisting directory policy '{0}'; valid values are delete, rename, reuse, quit")]
    InvalidPolicy(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Errors raised while generating an experiment directory.
#[derive(Debug, Error)]
pub enum GenerateError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("EXPTDIR {}: {source}", path.display())]
    Preexist {
        path: PathBuf,
        #[source]
        source: PreexistError,
    },

    #[error("failed to write {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Errors raised while polling experiment status.
#[derive(Debug, Error)]
pub enum MonitorError {
    #[error("no recognized task statuses for experiment {0}")]
    NoStatus(String),

    #[error("failed to read jobs database {}: {source}", path.display())]
    Database {
        path: PathBuf,
        #[source]
        source: rusqlite::Error,
    },

    #[error("failed to run '{command}': {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid monitor file {}: {message}", path.display())]
    MonitorFile { path: PathBuf, message: String },

    /// The operator interrupted monitoring between polling rounds.
    #[error("monitoring interrupted; progress saved to {}", .0.display())]
    Interrupted(PathBuf),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type ConfigResult<T> = Result<T, ConfigError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_tag_names_tag_and_file() {
        let err = ConfigError::UnknownTag {
            tag: "FOO".to_string(),
            path: PathBuf::from("/tmp/a.yaml"),
        };
        let msg = err.to_string();
        assert!(msg.contains("!FOO"));
        assert!(msg.contains("/tmp/a.yaml"));
    }

    #[test]
    fn test_missing_values_lists_names() {
        let err = ConfigError::MissingValues(vec!["a".into(), "b".into()]);
        assert_eq!(err.to_string(), "required values are missing: a, b");
    }

    #[test]
    fn test_preexist_exists_message() {
        let err = PreexistError::Exists(PathBuf::from("/work/expt"));
        assert_eq!(err.to_string(), "/work/expt already exists");
    }
}
