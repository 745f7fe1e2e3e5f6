//! Repository and logging configuration.

use std::path::PathBuf;

use serde::Deserialize;

use crate::storage::BranchName;

/// Repository configuration options.
#[derive(Debug, Clone)]
pub struct RepositoryConfig {
    /// Working directory root; metadata lives in `<root>/.minivcs`.
    pub root: PathBuf,
    /// Initialize a repository if none exists at `root`.
    pub create_if_missing: bool,
    /// Branch created (unborn) by `init` and pointed at by HEAD.
    pub default_branch: BranchName,
    /// Number of commits `log` shows when no limit is given.
    pub log_limit: usize,
}

impl Default for RepositoryConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("."),
            create_if_missing: false,
            default_branch: BranchName::main(),
            log_limit: 10,
        }
    }
}

impl RepositoryConfig {
    /// Create a new configuration with the given root.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            ..Default::default()
        }
    }

    /// Set create_if_missing flag.
    pub fn create_if_missing(mut self, value: bool) -> Self {
        self.create_if_missing = value;
        self
    }

    /// Set the initial branch used by `init`.
    pub fn default_branch(mut self, branch: BranchName) -> Self {
        self.default_branch = branch;
        self
    }

    /// Set the default log length.
    pub fn log_limit(mut self, limit: usize) -> Self {
        self.log_limit = limit;
        self
    }
}

/// Logging options for the command-line tool.
///
/// Environment variables win over these values: `MINIVCS_LOG` holds a
/// tracing filter directive, `MINIVCS_LOG_FORMAT` is `text` or `json`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LoggingConfig {
    /// Filter directive such as `warn` or `minivcs=debug`.
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Output format: `text` or `json`.
    #[serde(default = "default_format")]
    pub format: String,
}

fn default_log_level() -> String {
    "warn".to_string()
}

fn default_format() -> String {
    "text".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_format(),
        }
    }
}

impl LoggingConfig {
    /// `warn` normally, `debug` when running verbose
    pub fn for_verbosity(verbose: bool) -> Self {
        Self {
            level: if verbose { "debug" } else { "warn" }.to_string(),
            ..Default::default()
        }
    }
}
