//! Version metadata and download planning.
//!
//! A version document lists the client jar, the libraries (with per-OS rules
//! and native classifiers) and a reference to the asset index. [`Planner`]
//! turns them into [`rc_download::DownloadTask`]s: client jar and asset index
//! at high priority, libraries at normal priority, asset objects at low
//! priority. Every path appears at most once per plan, since concurrent
//! writers to one path are not arbitrated downstream.

pub mod config;
pub mod error;
pub mod load;
pub mod models;
pub mod planner;
pub mod rules;

pub use config::{Mirror, PlannerConfig, default_game_dir};
pub use error::{MetaError, Result};
pub use load::{load_asset_index, load_version};
pub use models::{AssetIndex, AssetObject, Library, VersionDetails};
pub use planner::{Plan, Planner, asset_index_path};
pub use rules::{OsName, Platform};
