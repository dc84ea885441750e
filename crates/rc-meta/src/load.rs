use std::path::Path;

use anyhow::Context;
use serde::de::DeserializeOwned;
use tracing::{debug, error, instrument};

use crate::error::{MetaError, Result};
use crate::models::{AssetIndex, VersionDetails};

async fn load_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let content = tokio::fs::read_to_string(path)
        .await
        .context("Failed to read manifest file")
        .map_err(|e| {
            error!("Failed to read manifest {}: {}", path.display(), e);
            MetaError::ManifestReadFailed {
                path: path.to_path_buf(),
                source: e,
            }
        })?;

    serde_json::from_str(&content)
        .context("Failed to deserialize manifest JSON")
        .map_err(|e| MetaError::ManifestParseFailed {
            path: path.to_path_buf(),
            source: e,
        })
}

/// Read a version document such as `versions/<id>/<id>.json`
#[instrument(level = "debug")]
pub async fn load_version(path: &Path) -> Result<VersionDetails> {
    let details: VersionDetails = load_json(path).await?;
    debug!(version = %details.id, libraries = details.libraries.len(), "Loaded version");
    Ok(details)
}

/// Read an asset index, typically after it was downloaded with the version plan
#[instrument(level = "debug")]
pub async fn load_asset_index(path: &Path) -> Result<AssetIndex> {
    let index: AssetIndex = load_json(path).await?;
    debug!(objects = index.objects.len(), "Loaded asset index");
    Ok(index)
}
