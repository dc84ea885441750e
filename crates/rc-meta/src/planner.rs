//! Turns version and asset index documents into download batches.
//!
//! Layout under the game directory:
//!
//! ```text
//! versions/<id>/<id>.jar
//! libraries/<maven path>
//! assets/indexes/<asset index id>.json
//! assets/objects/<hash[..2]>/<hash>
//! ```

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use rc_download::{DownloadTask, Priority};
use tracing::{debug, info, instrument, warn};

use crate::config::PlannerConfig;
use crate::error::{MetaError, Result};
use crate::models::{AssetIndex, DownloadInfo, Library, VersionDetails};

/// Tasks for one version plus the entries that could not be planned
#[derive(Debug, Default)]
pub struct Plan {
    pub tasks: Vec<DownloadTask>,
    /// Libraries without a declared size or digest; they cannot be verified
    /// and are left to the caller
    pub skipped: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct Planner {
    config: PlannerConfig,
}

pub fn asset_index_path(game_dir: &Path, index_id: &str) -> PathBuf {
    game_dir
        .join("assets")
        .join("indexes")
        .join(format!("{index_id}.json"))
}

fn is_sha1_hex(hash: &str) -> bool {
    hash.len() == 40 && hash.bytes().all(|b| b.is_ascii_hexdigit())
}

impl Planner {
    pub fn new(config: PlannerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &PlannerConfig {
        &self.config
    }

    fn task(
        &self,
        id: String,
        name: String,
        url: &str,
        save_path: PathBuf,
        size: u64,
        sha1: &str,
    ) -> DownloadTask {
        DownloadTask::new(id, name, url, save_path)
            .with_effective_url(self.config.effective_url(url))
            .with_declared(size, sha1)
            .with_max_retries(self.config.max_retries)
    }

    /// Client jar and asset index at high priority, then every library
    /// allowed on the configured platform
    #[instrument(skip_all, fields(version = %details.id))]
    pub fn plan_version(&self, details: &VersionDetails, game_dir: &Path) -> Result<Plan> {
        let mut plan = Plan::default();

        let client = &details.downloads.client;
        match (client.size, client.sha1.as_deref()) {
            (Some(size), Some(sha1)) => {
                let version_dir = game_dir.join("versions").join(&details.id);
                plan.tasks.push(self.task(
                    format!("{}-client", details.id),
                    format!("{}.jar", details.id),
                    &client.url,
                    version_dir.join(format!("{}.jar", details.id)),
                    size,
                    sha1,
                )
                .with_priority(Priority::High));
            }
            _ => {
                warn!("Client download has no size or digest");
                plan.skipped.push(format!("{}.jar", details.id));
            }
        }

        let index = &details.asset_index;
        plan.tasks.push(self.task(
            format!("asset-index-{}", index.id),
            format!("{}.json", index.id),
            &index.url,
            asset_index_path(game_dir, &index.id),
            index.size,
            &index.sha1,
        )
        .with_priority(Priority::High));

        let mut seen = HashSet::new();
        for library in &details.libraries {
            if !self.config.platform.allows(library.rules.as_deref()) {
                debug!(library = %library.name, "Library not needed on this platform");
                continue;
            }
            for info in self.library_downloads(library) {
                let path = info.path.as_deref().ok_or_else(|| MetaError::MissingLibraryPath {
                    name: library.name.clone(),
                })?;
                if !seen.insert(path.to_string()) {
                    continue;
                }
                match (info.size, info.sha1.as_deref()) {
                    (Some(size), Some(sha1)) => plan.tasks.push(self.task(
                        path.to_string(),
                        library.name.clone(),
                        &info.url,
                        game_dir.join("libraries").join(path),
                        size,
                        sha1,
                    )
                    .with_priority(Priority::Normal)),
                    _ => plan.skipped.push(library.name.clone()),
                }
            }
            if library.downloads.is_none() {
                warn!(library = %library.name, "Library declares no downloads");
                plan.skipped.push(library.name.clone());
            }
        }

        info!(
            tasks = plan.tasks.len(),
            skipped = plan.skipped.len(),
            "Planned version downloads"
        );
        Ok(plan)
    }

    /// Main artifact and, where the platform needs one, the native classifier
    fn library_downloads<'a>(&self, library: &'a Library) -> Vec<&'a DownloadInfo> {
        let Some(downloads) = &library.downloads else {
            return Vec::new();
        };
        let mut infos: Vec<&DownloadInfo> = downloads.artifact.iter().collect();
        if let Some(classifier) = self.config.platform.native_classifier(library) {
            match downloads.classifiers.as_ref().and_then(|c| c.get(&classifier)) {
                Some(native) => infos.push(native),
                None => warn!(library = %library.name, %classifier, "Native classifier missing"),
            }
        }
        infos
    }

    /// One low-priority task per distinct asset object. Objects shared by
    /// several names are fetched once.
    #[instrument(skip_all, fields(objects = index.objects.len()))]
    pub fn plan_assets(&self, index: &AssetIndex, game_dir: &Path) -> Result<Vec<DownloadTask>> {
        let objects_dir = game_dir.join("assets").join("objects");
        let mut seen = HashSet::new();
        let mut tasks = Vec::new();

        for (name, object) in &index.objects {
            let hash = object.hash.to_ascii_lowercase();
            if !is_sha1_hex(&hash) {
                return Err(MetaError::InvalidAssetHash {
                    name: name.clone(),
                    hash: object.hash.clone(),
                });
            }
            if !seen.insert(hash.clone()) {
                continue;
            }
            let prefix = &hash[..2];
            let url = format!(
                "{}/{}/{}",
                self.config.resources_base.trim_end_matches('/'),
                prefix,
                hash
            );
            tasks.push(self.task(
                hash.clone(),
                name.clone(),
                &url,
                objects_dir.join(prefix).join(&hash),
                object.size,
                &hash,
            )
            .with_priority(Priority::Low));
        }

        debug!(tasks = tasks.len(), "Planned asset downloads");
        Ok(tasks)
    }
}
