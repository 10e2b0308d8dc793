// Transfer pipeline: diff a device against the catalog and archive what is new

pub mod naming;
pub mod place;
pub mod progress;
pub mod report;
pub mod staging;
pub mod verify;

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use crate::constants::{EXCLUDED_DIRECTORIES, PROGRESS_EVERY_FILES, PROGRESS_EVERY_SECONDS};
use crate::db::{Catalog, CatalogEntry, DeviceRecord};
use crate::device::registry::DeviceRegistry;
use crate::device::{list_files, remote_basename, DeviceAccess, DeviceHandle};
use crate::error::{ImageSortError, Result};
use crate::hash;
use crate::metadata::CaptureDateResolver;

use progress::{log_progress, ThroughputMeter};
use report::{DeviceReport, DeviceStatus, FileFailure, Inconsistency, PlannedFile, RunReport};

#[derive(Debug, Clone)]
pub struct PipelineOptions {
    /// Directory names never descended into on a device
    pub excluded_dirs: Vec<String>,
    /// List what would be transferred without staging anything
    pub dry_run: bool,
    pub progress_every_files: u64,
    pub progress_every_secs: u64,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            excluded_dirs: EXCLUDED_DIRECTORIES.iter().map(|s| s.to_string()).collect(),
            dry_run: false,
            progress_every_files: PROGRESS_EVERY_FILES,
            progress_every_secs: PROGRESS_EVERY_SECONDS,
        }
    }
}

/// A file that made it into the archive.
struct ArchivedFile {
    size: u64,
    metadata_fallback: bool,
    /// Set when the file was placed but the catalog refused it
    unrecorded: Option<Inconsistency>,
}

/// A file that did not. `staged_path` survives only for placement failures.
struct FileError {
    error: ImageSortError,
    staged_path: Option<PathBuf>,
}

impl From<ImageSortError> for FileError {
    fn from(error: ImageSortError) -> Self {
        Self { error, staged_path: None }
    }
}

/// Moves new device files into the archive, one device batch at a time.
///
/// Files within a device are processed strictly in listing order. Devices may
/// run side by side on scoped threads; they share the catalog handle, which
/// serializes their writes.
pub struct TransferPipeline<'a> {
    catalog: &'a Catalog,
    access: &'a dyn DeviceAccess,
    resolver: &'a CaptureDateResolver,
    archive_root: PathBuf,
    scratch_root: PathBuf,
    options: PipelineOptions,
    cancel: Option<&'a AtomicBool>,
    run_id: String,
}

impl<'a> TransferPipeline<'a> {
    pub fn new(
        catalog: &'a Catalog,
        access: &'a dyn DeviceAccess,
        resolver: &'a CaptureDateResolver,
        archive_root: impl Into<PathBuf>,
        scratch_root: impl Into<PathBuf>,
    ) -> Self {
        let run_id = format!(
            "{}-{}",
            chrono::Local::now().format("%Y%m%d-%H%M%S"),
            &uuid::Uuid::new_v4().simple().to_string()[..8]
        );
        Self {
            catalog,
            access,
            resolver,
            archive_root: archive_root.into(),
            scratch_root: scratch_root.into(),
            options: PipelineOptions::default(),
            cancel: None,
            run_id,
        }
    }

    pub fn with_options(mut self, options: PipelineOptions) -> Self {
        self.options = options;
        self
    }

    /// Stop after the file in flight once `flag` is set
    pub fn with_cancel(mut self, flag: &'a AtomicBool) -> Self {
        self.cancel = Some(flag);
        self
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// Sync every device connected right now. Devices plugged in later wait for the next run.
    pub fn run(&self, parallel: bool) -> Result<RunReport> {
        let devices = self.access.list_connected_devices()?;
        log::info!("Run {}: {} device(s) connected", self.run_id, devices.len());
        Ok(self.sync_devices(&devices, parallel))
    }

    pub fn sync_devices(&self, devices: &[DeviceHandle], parallel: bool) -> RunReport {
        let reports = if parallel && devices.len() > 1 {
            std::thread::scope(|s| {
                let workers: Vec<_> = devices
                    .iter()
                    .map(|device| (device, s.spawn(move || self.sync_device(device))))
                    .collect();
                workers
                    .into_iter()
                    .map(|(device, worker)| {
                        worker.join().unwrap_or_else(|_| {
                            log::error!("Worker for {} panicked", device);
                            DeviceReport::new(device.to_string(), device.key()).abort("worker thread panicked")
                        })
                    })
                    .collect()
            })
        } else {
            devices.iter().map(|device| self.sync_device(device)).collect()
        };

        self.remove_if_empty(&self.run_scratch_dir());

        RunReport { run_id: self.run_id.clone(), devices: reports }
    }

    /// Run one device's batch. Never fails: problems end up in the report.
    pub fn sync_device(&self, device: &DeviceHandle) -> DeviceReport {
        let mut report = DeviceReport::new(device.to_string(), device.key());

        if let Err(e) = self.access.connect(device) {
            log::warn!("Cannot connect to {}: {}", device, e);
            return report.abort(e.to_string());
        }

        let result = self.sync_connected(device, &mut report);

        if let Err(e) = self.access.disconnect(device) {
            log::warn!("Disconnect from {} failed: {}", device, e);
        }

        if let Err(e) = result {
            log::warn!("Batch for {} aborted: {}", device, e);
            report.status = DeviceStatus::Aborted;
            report.aborted = Some(e.to_string());
        }

        log_summary(&report);
        report
    }

    fn sync_connected(&self, device: &DeviceHandle, report: &mut DeviceReport) -> Result<()> {
        let registry = DeviceRegistry::new(self.catalog, &self.archive_root);

        if self.options.dry_run {
            if let Some(record) = self.catalog.get_device(&device.device_id, &device.serial)? {
                if record.ignore {
                    skip_ignored(device, report);
                    return Ok(());
                }
            }
            report.local_path = Some(registry.local_path_for(device)?);
            let new_files = self.new_files(device)?;
            return self.plan(device, &new_files, report);
        }

        let record = registry.resolve(device)?;
        report.local_path = Some(record.local_path.clone());
        if record.ignore {
            skip_ignored(device, report);
            return Ok(());
        }

        let new_files = self.new_files(device)?;
        report.new_files = new_files.len();
        log::info!("{}: {} new file(s) for '{}'", device, new_files.len(), record.local_path);
        if new_files.is_empty() {
            return Ok(());
        }

        let scratch_dir = self.run_scratch_dir().join(format!("device-{}", record.id));
        fs::create_dir_all(&scratch_dir)?;

        let outcome = self.transfer_all(device, &record, &new_files, &scratch_dir, report);
        self.remove_if_empty(&scratch_dir);
        outcome
    }

    /// Remote paths on the device with no catalog entry, in listing order
    fn new_files(&self, device: &DeviceHandle) -> Result<Vec<String>> {
        let root = self.access.root_path(device)?;
        let mut new_files = Vec::new();
        for remote_path in list_files(self.access, device, &root, &self.options.excluded_dirs) {
            let remote_path = remote_path?;
            if !self.catalog.has_entry(&device.device_id, &device.serial, &remote_path)? {
                new_files.push(remote_path);
            }
        }
        Ok(new_files)
    }

    fn plan(&self, device: &DeviceHandle, new_files: &[String], report: &mut DeviceReport) -> Result<()> {
        report.status = DeviceStatus::DryRun;
        report.new_files = new_files.len();
        for remote_path in new_files {
            match self.access.stat_file(device, remote_path) {
                Ok(stat) => report.planned.push(PlannedFile {
                    remote_path: remote_path.clone(),
                    size: stat.size,
                    creation_time: stat.creation_time,
                }),
                Err(e) if e.is_device_fatal() => return Err(e),
                Err(e) => report.failures.push(FileFailure {
                    remote_path: remote_path.clone(),
                    error: e.to_string(),
                    staged_path: None,
                }),
            }
        }
        log::info!("{}: dry run, {} file(s) would be transferred", device, report.planned.len());
        Ok(())
    }

    fn transfer_all(
        &self,
        device: &DeviceHandle,
        record: &DeviceRecord,
        new_files: &[String],
        scratch_dir: &Path,
        report: &mut DeviceReport,
    ) -> Result<()> {
        let mut meter = ThroughputMeter::new(
            device.name.clone(),
            new_files.len() as u64,
            self.options.progress_every_files,
            self.options.progress_every_secs,
        );

        for (idx, remote_path) in new_files.iter().enumerate() {
            if self.is_cancelled() {
                log::info!("{}: cancelled, {} file(s) left", device, new_files.len() - idx);
                report.status = DeviceStatus::Cancelled;
                break;
            }

            match self.transfer_file(device, record, remote_path, scratch_dir) {
                Ok(archived) => {
                    if archived.metadata_fallback {
                        report.metadata_fallbacks.push(remote_path.clone());
                    }
                    match archived.unrecorded {
                        Some(inconsistency) => report.inconsistencies.push(inconsistency),
                        None => {
                            report.copied += 1;
                            report.bytes += archived.size;
                        }
                    }
                    if let Some(progress) = meter.record(archived.size) {
                        log_progress(&progress);
                    }
                }
                Err(FileError { error, staged_path }) => {
                    let fatal = error.is_device_fatal();
                    log::warn!("{}: {} failed: {}", device, remote_path, error);
                    report.failures.push(FileFailure {
                        remote_path: remote_path.clone(),
                        error: error.to_string(),
                        staged_path,
                    });
                    if fatal {
                        return Err(error);
                    }
                }
            }
        }

        Ok(())
    }

    /// Listed -> Staged -> Hashed -> DateResolved -> Named -> Placed, then recorded.
    fn transfer_file(
        &self,
        device: &DeviceHandle,
        record: &DeviceRecord,
        remote_path: &str,
        scratch_dir: &Path,
    ) -> std::result::Result<ArchivedFile, FileError> {
        let stat = self.access.stat_file(device, remote_path)?;
        let staged = staging::stage_file(self.access, device, remote_path, scratch_dir)?;

        let placed = (|| -> Result<(naming::Destination, String, chrono::NaiveDateTime, bool)> {
            if staged.size != stat.size {
                return Err(ImageSortError::TransferIncomplete(format!(
                    "{}: read {} of {} bytes", remote_path, staged.size, stat.size
                )));
            }

            let digest = hash::digest_file(&staged.path)?;

            let (capture, metadata_fallback) = match self.resolver.resolve(&staged.path) {
                Ok(capture) => (capture, false),
                Err(e) => {
                    log::warn!("{}: {}; using device creation time {}", remote_path, e, stat.creation_time);
                    (stat.creation_time, true)
                }
            };

            let dest = naming::resolve_destination(
                &self.archive_root,
                &record.local_path,
                capture,
                remote_basename(remote_path),
                |p| p.exists(),
            )?;

            place::place_file(&staged.path, &dest.absolute, &digest, capture)?;
            Ok((dest, digest, capture, metadata_fallback))
        })();

        let (dest, digest, capture, metadata_fallback) = match placed {
            Ok(placed) => placed,
            Err(error @ ImageSortError::PlacementFailed(_)) => {
                log::error!("{}: staged copy kept at {}", remote_path, staged.path.display());
                return Err(FileError { error, staged_path: Some(staged.path.clone()) });
            }
            Err(error) => {
                let _ = fs::remove_file(&staged.path);
                return Err(error.into());
            }
        };

        let entry = CatalogEntry {
            device_rowid: record.id,
            path_camera: remote_path.to_string(),
            path_local: dest.relative.clone(),
            sha256sum: digest,
            size: staged.size as i64,
            created: capture,
        };

        let unrecorded = match self.catalog.record_entry(&entry) {
            Ok(()) => {
                log::debug!("{} -> {}", remote_path, dest.relative);
                None
            }
            Err(e) => {
                log::error!("{}: placed at {} but not catalogued: {}", remote_path, dest.absolute.display(), e);
                Some(Inconsistency {
                    remote_path: remote_path.to_string(),
                    placed_path: dest.absolute.clone(),
                    error: e.to_string(),
                })
            }
        };

        Ok(ArchivedFile { size: staged.size, metadata_fallback, unrecorded })
    }

    fn is_cancelled(&self) -> bool {
        self.cancel.map_or(false, |flag| flag.load(Ordering::SeqCst))
    }

    fn run_scratch_dir(&self) -> PathBuf {
        self.scratch_root.join(format!("run-{}", self.run_id))
    }

    fn remove_if_empty(&self, dir: &Path) {
        // remove_dir refuses non-empty directories, which keeps recovery copies
        if dir.exists() {
            let _ = fs::remove_dir(dir);
        }
    }
}

fn skip_ignored(device: &DeviceHandle, report: &mut DeviceReport) {
    log::info!("{} is marked ignored, skipping", device);
    report.status = DeviceStatus::Ignored;
}

fn log_summary(report: &DeviceReport) {
    log::info!(
        "{}: {:?}, {} new, {} copied ({} bytes), {} metadata fallback(s), {} failure(s), {} inconsistency(ies)",
        report.device,
        report.status,
        report.new_files,
        report.copied,
        report.bytes,
        report.metadata_fallbacks.len(),
        report.failures.len(),
        report.inconsistencies.len()
    );
    if !report.metadata_fallbacks.is_empty() {
        log::warn!(
            "{}: capture date missing from metadata for: {}",
            report.device,
            report.metadata_fallbacks.join(", ")
        );
    }
}
