use std::path::PathBuf;

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use tracing::error;

use crate::error::{MetaError, Result};
use crate::rules::Platform;

pub const RESOURCES_BASE: &str = "https://resources.download.minecraft.net";

/// Replaces the `from` prefix of a URL with `to`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mirror {
    pub from: String,
    pub to: String,
}

impl Mirror {
    pub fn new(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
        }
    }

    pub fn rewrite(&self, url: &str) -> Option<String> {
        let rest = url.strip_prefix(self.from.as_str())?;
        Some(format!("{}{}", self.to, rest))
    }
}

#[derive(Debug, Clone)]
pub struct PlannerConfig {
    /// Asset objects live under `{resources_base}/{hash[..2]}/{hash}`
    pub resources_base: String,
    /// First matching mirror wins
    pub mirrors: Vec<Mirror>,
    pub max_retries: u32,
    pub platform: Platform,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            resources_base: RESOURCES_BASE.to_string(),
            mirrors: Vec::new(),
            max_retries: 3,
            platform: Platform::current(),
        }
    }
}

impl PlannerConfig {
    /// Where `url` is actually fetched from
    pub fn effective_url(&self, url: &str) -> String {
        self.mirrors
            .iter()
            .find_map(|mirror| mirror.rewrite(url))
            .unwrap_or_else(|| url.to_string())
    }
}

/// Per-user game directory, e.g. `~/.local/share/rauncher-mc/minecraft`
pub fn default_game_dir() -> Result<PathBuf> {
    let proj_dirs = ProjectDirs::from("com", "rauncher", "rauncher-mc").ok_or_else(|| {
        error!("Failed to determine project directories");
        MetaError::ProjectDirectoriesUnavailable
    })?;
    Ok(proj_dirs.data_dir().join("minecraft"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_matching_mirror_wins() {
        let config = PlannerConfig {
            mirrors: vec![
                Mirror::new("https://libraries.minecraft.net", "https://mirror.test/maven"),
                Mirror::new("https://libraries.minecraft.net", "https://unused.test"),
                Mirror::new(RESOURCES_BASE, "https://mirror.test/assets"),
            ],
            ..PlannerConfig::default()
        };

        assert_eq!(
            config.effective_url("https://libraries.minecraft.net/com/mojang/a.jar"),
            "https://mirror.test/maven/com/mojang/a.jar"
        );
        assert_eq!(
            config.effective_url("https://resources.download.minecraft.net/bd/bdf4"),
            "https://mirror.test/assets/bd/bdf4"
        );
        assert_eq!(
            config.effective_url("https://piston-data.mojang.com/client.jar"),
            "https://piston-data.mojang.com/client.jar"
        );
    }
}
