//! Handling of an experiment directory (or file) that already exists.

use crate::error::PreexistError;
use chrono::Local;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::info;

/// What to do when the target path is already present.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PreexistPolicy {
    Delete,
    #[default]
    Rename,
    Reuse,
    Quit,
}

impl FromStr for PreexistPolicy {
    type Err = PreexistError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "delete" => Ok(Self::Delete),
            "rename" => Ok(Self::Rename),
            "reuse" => Ok(Self::Reuse),
            "quit" => Ok(Self::Quit),
            _ => Err(PreexistError::InvalidPolicy(s.to_string())),
        }
    }
}

impl fmt::Display for PreexistPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Delete => write!(f, "delete"),
            Self::Rename => write!(f, "rename"),
            Self::Reuse => write!(f, "reuse"),
            Self::Quit => write!(f, "quit"),
        }
    }
}

/// Apply `policy` to `path` if it exists. Returns the new location when the
/// path was renamed.
pub fn check_for_preexist_dir_file(path: &Path, policy: PreexistPolicy) -> Result<Option<PathBuf>, PreexistError> {
    if !path.exists() {
        return Ok(None);
    }
    match policy {
        PreexistPolicy::Delete => {
            if path.is_dir() {
                std::fs::remove_dir_all(path)?;
            } else {
                std::fs::remove_file(path)?;
            }
            info!(path = %path.display(), "removed preexisting path");
            Ok(None)
        }
        PreexistPolicy::Rename => {
            let suffix = Local::now().format("_old_%Y%m%d_%H%M%S").to_string();
            let mut renamed = path.as_os_str().to_owned();
            renamed.push(suffix);
            let renamed = PathBuf::from(renamed);
            info!(
                path = %path.display(),
                new_path = %renamed.display(),
                "moving preexisting directory or file"
            );
            std::fs::rename(path, &renamed)?;
            Ok(Some(renamed))
        }
        PreexistPolicy::Reuse => {
            info!(path = %path.display(), "reusing preexisting path");
            Ok(None)
        }
        PreexistPolicy::Quit => Err(PreexistError::Exists(path.to_path_buf())),
    }
}
