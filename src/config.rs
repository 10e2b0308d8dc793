// Sync configuration: JSON file with defaults from the platform directories

use std::fs;
use std::path::{Path, PathBuf};
use serde::{Deserialize, Serialize};

use crate::constants::{
    APP_NAME, APP_ORGANIZATION, APP_QUALIFIER, ARCHIVE_FOLDER, CONFIG_FILENAME, DB_FILENAME,
    EXCLUDED_DIRECTORIES, PROGRESS_EVERY_FILES, PROGRESS_EVERY_SECONDS, SCRATCH_FOLDER,
};
use crate::error::{ImageSortError, Result};
use crate::ingest::PipelineOptions;

/// Everything a sync run needs to know about the local side.
/// Missing keys in the JSON file take their defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SyncConfig {
    pub archive_root: PathBuf,
    pub scratch_root: PathBuf,
    pub catalog_path: PathBuf,
    /// Directories whose immediate subdirectories are mounted volumes
    pub mount_roots: Vec<PathBuf>,
    pub excluded_dirs: Vec<String>,
    pub progress_every_files: u64,
    pub progress_every_secs: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            archive_root: default_archive_root(),
            scratch_root: std::env::temp_dir().join(SCRATCH_FOLDER),
            catalog_path: data_dir().join(DB_FILENAME),
            mount_roots: default_mount_roots(),
            excluded_dirs: EXCLUDED_DIRECTORIES.iter().map(|s| s.to_string()).collect(),
            progress_every_files: PROGRESS_EVERY_FILES,
            progress_every_secs: PROGRESS_EVERY_SECONDS,
        }
    }
}

impl SyncConfig {
    /// Read `path`, or the default config file when `path` is None.
    /// A missing default file is not an error; a missing explicit one is.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let (path, explicit) = match path {
            Some(p) => (p.to_path_buf(), true),
            None => (default_config_path(), false),
        };

        if !path.exists() {
            if explicit {
                return Err(ImageSortError::Config(format!("{} does not exist", path.display())));
            }
            log::debug!("No config at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let raw = fs::read_to_string(&path)?;
        let config: SyncConfig = serde_json::from_str(&raw)
            .map_err(|e| ImageSortError::Config(format!("{}: {}", path.display(), e)))?;
        log::debug!("Loaded config from {}", path.display());
        Ok(config)
    }

    pub fn pipeline_options(&self, dry_run: bool) -> PipelineOptions {
        PipelineOptions {
            excluded_dirs: self.excluded_dirs.clone(),
            dry_run,
            progress_every_files: self.progress_every_files,
            progress_every_secs: self.progress_every_secs,
        }
    }
}

/// Per-user data directory for the catalog and config
pub fn data_dir() -> PathBuf {
    directories::ProjectDirs::from(APP_QUALIFIER, APP_ORGANIZATION, APP_NAME)
        .map(|dirs| dirs.data_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from(".imagesort"))
}

pub fn default_config_path() -> PathBuf {
    directories::ProjectDirs::from(APP_QUALIFIER, APP_ORGANIZATION, APP_NAME)
        .map(|dirs| dirs.config_dir().join(CONFIG_FILENAME))
        .unwrap_or_else(|| PathBuf::from(CONFIG_FILENAME))
}

fn default_archive_root() -> PathBuf {
    let user_dirs = directories::UserDirs::new();
    let pictures = user_dirs.as_ref().and_then(|d| d.picture_dir().map(Path::to_path_buf));
    let base = match pictures {
        Some(p) => p,
        None => directories::BaseDirs::new()
            .map(|b| b.home_dir().to_path_buf())
            .unwrap_or_else(|| PathBuf::from(".")),
    };
    base.join(ARCHIVE_FOLDER)
}

#[cfg(target_os = "macos")]
fn default_mount_roots() -> Vec<PathBuf> {
    vec![PathBuf::from("/Volumes")]
}

#[cfg(not(target_os = "macos"))]
fn default_mount_roots() -> Vec<PathBuf> {
    match std::env::var("USER") {
        Ok(user) if !user.is_empty() => vec![
            PathBuf::from("/media").join(&user),
            PathBuf::from("/run/media").join(&user),
        ],
        _ => vec![PathBuf::from("/media")],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_partial_file_keeps_defaults() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("imagesort.json");
        fs::write(&path, r#"{ "archiveRoot": "/srv/photos", "progressEveryFiles": 5 }"#).unwrap();

        let config = SyncConfig::load(Some(&path)).unwrap();
        assert_eq!(config.archive_root, PathBuf::from("/srv/photos"));
        assert_eq!(config.progress_every_files, 5);
        assert_eq!(config.excluded_dirs, SyncConfig::default().excluded_dirs);
    }

    #[test]
    fn test_serialized_config_loads_back() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("imagesort.json");
        let mut config = SyncConfig::default();
        config.mount_roots = vec![PathBuf::from("/mnt/cards")];
        fs::write(&path, serde_json::to_string_pretty(&config).unwrap()).unwrap();

        assert_eq!(SyncConfig::load(Some(&path)).unwrap(), config);
    }

    #[test]
    fn test_explicit_missing_file_is_an_error() {
        let tmp = TempDir::new().unwrap();
        let err = SyncConfig::load(Some(&tmp.path().join("nope.json"))).unwrap_err();
        assert!(matches!(err, ImageSortError::Config(_)));
    }

    #[test]
    fn test_bad_json_is_a_config_error() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("imagesort.json");
        fs::write(&path, "{ not json").unwrap();
        assert!(matches!(SyncConfig::load(Some(&path)).unwrap_err(), ImageSortError::Config(_)));
    }
}
