//! XDG-compliant path resolution for biblio-harvest.
//!
//! `HarvestPaths` names the config file and the data directory that holds the
//! harvest database. An explicit data directory (from the config file or the
//! command line) replaces the XDG default.

use std::path::{Path, PathBuf};

use miette::Diagnostic;
use thiserror::Error;

const APP_DIR: &str = "biblio-harvest";

/// File name of the embedded database inside the data directory.
pub const DATABASE_FILE: &str = "harvest.redb";

/// Errors from path resolution.
#[derive(Debug, Error, Diagnostic)]
pub enum PathError {
    #[error("cannot determine home directory")]
    #[diagnostic(
        code(harvest::paths::no_home),
        help("Set the HOME environment variable, or pass --config and --data-dir explicitly.")
    )]
    NoHome,

    #[error("failed to create directory: {path}")]
    #[diagnostic(
        code(harvest::paths::create_dir),
        help("Check that the parent directory exists and you have write permissions.")
    )]
    CreateDir {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

pub type PathResult<T> = std::result::Result<T, PathError>;

/// Directories used by the harvester.
#[derive(Debug, Clone)]
pub struct HarvestPaths {
    /// `$XDG_CONFIG_HOME/biblio-harvest/`
    pub config_dir: PathBuf,
    /// `$XDG_DATA_HOME/biblio-harvest/`
    pub data_dir: PathBuf,
}

impl HarvestPaths {
    /// Resolve XDG directories from environment variables with standard fallbacks.
    pub fn resolve() -> PathResult<Self> {
        let home = std::env::var("HOME")
            .map(PathBuf::from)
            .map_err(|_| PathError::NoHome)?;

        let config_dir = std::env::var("XDG_CONFIG_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| home.join(".config"))
            .join(APP_DIR);

        let data_dir = std::env::var("XDG_DATA_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| home.join(".local/share"))
            .join(APP_DIR);

        Ok(Self {
            config_dir,
            data_dir,
        })
    }

    /// Replace the data directory, keeping the config location.
    pub fn with_data_dir(mut self, data_dir: impl Into<PathBuf>) -> Self {
        self.data_dir = data_dir.into();
        self
    }

    /// Path to the config file.
    pub fn config_file(&self) -> PathBuf {
        self.config_dir.join("config.toml")
    }

    /// Path to the harvest database.
    pub fn database_file(&self) -> PathBuf {
        database_in(&self.data_dir)
    }

    /// Create the data directory. Idempotent.
    pub fn ensure_data_dir(&self) -> PathResult<()> {
        std::fs::create_dir_all(&self.data_dir).map_err(|e| PathError::CreateDir {
            path: self.data_dir.display().to_string(),
            source: e,
        })
    }
}

/// Database path inside an arbitrary data directory.
pub fn database_in(data_dir: &Path) -> PathBuf {
    data_dir.join(DATABASE_FILE)
}
