// Archive verification: re-hash catalogued files and compare to the catalog

use std::path::{Path, PathBuf};
use serde::Serialize;

use crate::constants::PATH_DB_SEPARATOR;
use crate::db::{Catalog, DeviceRecord};
use crate::error::Result;
use crate::hash;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "detail")]
pub enum VerifyProblem {
    Missing,
    SizeMismatch { expected: i64, actual: u64 },
    DigestMismatch,
    Unreadable(String),
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyIssue {
    pub device: String,
    pub path_local: String,
    pub problem: VerifyProblem,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyReport {
    pub checked: usize,
    pub issues: Vec<VerifyIssue>,
}

impl VerifyReport {
    pub fn is_clean(&self) -> bool {
        self.issues.is_empty()
    }
}

/// Absolute location of a catalog `path_local` under `archive_root`
pub fn resolve_local_path(archive_root: &Path, path_local: &str) -> PathBuf {
    path_local
        .split(PATH_DB_SEPARATOR)
        .filter(|part| !part.is_empty())
        .fold(archive_root.to_path_buf(), |path, part| path.join(part))
}

/// Check every archived file of the given devices (all devices when empty).
pub fn verify_archive(catalog: &Catalog, archive_root: &Path, only: &[DeviceRecord]) -> Result<VerifyReport> {
    let devices = if only.is_empty() { catalog.list_devices()? } else { only.to_vec() };
    let mut report = VerifyReport::default();

    for device in &devices {
        let entries = catalog.list_entries(device.id)?;
        log::info!("Verifying {} file(s) for {}", entries.len(), device.local_path);

        for entry in entries {
            report.checked += 1;
            let path = resolve_local_path(archive_root, &entry.path_local);
            if let Some(problem) = check_file(&path, entry.size, &entry.sha256sum) {
                log::warn!("{}: {:?}", entry.path_local, problem);
                report.issues.push(VerifyIssue {
                    device: device.local_path.clone(),
                    path_local: entry.path_local,
                    problem,
                });
            }
        }
    }

    log::info!("Verified {} file(s), {} issue(s)", report.checked, report.issues.len());
    Ok(report)
}

fn check_file(path: &Path, expected_size: i64, expected_digest: &str) -> Option<VerifyProblem> {
    let meta = match std::fs::metadata(path) {
        Ok(meta) => meta,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Some(VerifyProblem::Missing),
        Err(e) => return Some(VerifyProblem::Unreadable(e.to_string())),
    };

    if meta.len() as i64 != expected_size {
        return Some(VerifyProblem::SizeMismatch { expected: expected_size, actual: meta.len() });
    }

    match hash::verify_file(path, expected_digest) {
        Ok(true) => None,
        Ok(false) => Some(VerifyProblem::DigestMismatch),
        Err(e) => Some(VerifyProblem::Unreadable(e.to_string())),
    }
}
