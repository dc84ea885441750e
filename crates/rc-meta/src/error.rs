use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum MetaError {
    #[error(
        "Project directories are unavailable - this usually indicates an unsupported OS or missing home directory"
    )]
    ProjectDirectoriesUnavailable,

    #[error("Failed to read manifest '{path}': {source}")]
    ManifestReadFailed {
        path: PathBuf,
        #[source]
        source: anyhow::Error,
    },

    #[error("Failed to parse manifest '{path}': {source}")]
    ManifestParseFailed {
        path: PathBuf,
        #[source]
        source: anyhow::Error,
    },

    #[error("Library '{name}' has no artifact path")]
    MissingLibraryPath { name: String },

    #[error("Asset '{name}' has an invalid hash '{hash}'")]
    InvalidAssetHash { name: String, hash: String },
}

pub type Result<T> = std::result::Result<T, MetaError>;
