// Per-device and per-run transfer reports

use std::path::PathBuf;
use chrono::NaiveDateTime;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceStatus {
    Completed,
    /// Device flagged as ignored in the catalog
    Ignored,
    /// Device became unreachable or could not be set up
    Aborted,
    Cancelled,
    DryRun,
}

/// A file that was not archived. `staged_path` is kept when a verified
/// scratch copy survives for manual recovery.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FileFailure {
    pub remote_path: String,
    pub error: String,
    pub staged_path: Option<PathBuf>,
}

/// Placed on disk but not catalogued. The next run will transfer it again
/// under a new `.n.` name.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Inconsistency {
    pub remote_path: String,
    pub placed_path: PathBuf,
    pub error: String,
}

/// What a dry run would have transferred.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlannedFile {
    pub remote_path: String,
    pub size: u64,
    pub creation_time: NaiveDateTime,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceReport {
    pub device: String,
    pub key: String,
    pub local_path: Option<String>,
    pub status: DeviceStatus,
    /// Files on the device that were not yet catalogued
    pub new_files: usize,
    pub copied: usize,
    pub bytes: u64,
    /// Remote paths whose capture date came from the device instead of metadata
    pub metadata_fallbacks: Vec<String>,
    pub failures: Vec<FileFailure>,
    pub inconsistencies: Vec<Inconsistency>,
    pub planned: Vec<PlannedFile>,
    /// Why the batch stopped early, if it did
    pub aborted: Option<String>,
}

impl DeviceReport {
    pub fn new(device: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            device: device.into(),
            key: key.into(),
            local_path: None,
            status: DeviceStatus::Completed,
            new_files: 0,
            copied: 0,
            bytes: 0,
            metadata_fallbacks: Vec::new(),
            failures: Vec::new(),
            inconsistencies: Vec::new(),
            planned: Vec::new(),
            aborted: None,
        }
    }

    pub fn abort(mut self, reason: impl Into<String>) -> Self {
        self.status = DeviceStatus::Aborted;
        self.aborted = Some(reason.into());
        self
    }

    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
            && self.inconsistencies.is_empty()
            && !matches!(self.status, DeviceStatus::Aborted)
    }
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunReport {
    pub run_id: String,
    pub devices: Vec<DeviceReport>,
}

impl RunReport {
    pub fn total_copied(&self) -> usize {
        self.devices.iter().map(|d| d.copied).sum()
    }

    pub fn total_bytes(&self) -> u64 {
        self.devices.iter().map(|d| d.bytes).sum()
    }

    pub fn total_failures(&self) -> usize {
        self.devices.iter().map(|d| d.failures.len() + d.inconsistencies.len()).sum()
    }

    /// True when every device finished without failures or aborts
    pub fn is_clean(&self) -> bool {
        self.devices.iter().all(DeviceReport::is_clean)
    }
}
