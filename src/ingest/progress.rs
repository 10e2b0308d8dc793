// Transfer progress payload and throughput meter

use std::time::{Duration, Instant};
use serde::Serialize;

/// Progress snapshot for one device's transfer.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferProgress {
    pub device: String,
    pub current: u64,
    pub total: u64,
    pub percent: f64,
    pub bytes: u64,
    pub files_per_sec: f64,
    pub bytes_per_sec: f64,
}

/// Counts files and bytes since construction and decides when a
/// progress line is due.
pub struct ThroughputMeter {
    device: String,
    total: u64,
    started: Instant,
    last_report: Instant,
    files: u64,
    bytes: u64,
    files_since_report: u64,
    every_files: u64,
    every: Duration,
}

impl ThroughputMeter {
    pub fn new(device: impl Into<String>, total: u64, every_files: u64, every_secs: u64) -> Self {
        let now = Instant::now();
        Self {
            device: device.into(),
            total,
            started: now,
            last_report: now,
            files: 0,
            bytes: 0,
            files_since_report: 0,
            every_files: every_files.max(1),
            every: Duration::from_secs(every_secs),
        }
    }

    /// Record one finished file. Returns a snapshot when a report is due.
    pub fn record(&mut self, bytes: u64) -> Option<TransferProgress> {
        self.files += 1;
        self.bytes += bytes;
        self.files_since_report += 1;

        let due = self.files_since_report >= self.every_files
            || self.last_report.elapsed() >= self.every
            || self.files == self.total;
        if !due {
            return None;
        }

        self.files_since_report = 0;
        self.last_report = Instant::now();
        Some(self.snapshot())
    }

    pub fn snapshot(&self) -> TransferProgress {
        let secs = self.started.elapsed().as_secs_f64().max(0.001);
        let total_safe = self.total.max(1);
        TransferProgress {
            device: self.device.clone(),
            current: self.files,
            total: self.total,
            percent: ((self.files as f64 / total_safe as f64) * 100.0).min(100.0),
            bytes: self.bytes,
            files_per_sec: self.files as f64 / secs,
            bytes_per_sec: self.bytes as f64 / secs,
        }
    }
}

/// Log a progress line.
pub fn log_progress(progress: &TransferProgress) {
    log::info!(
        "{}: {}/{} files ({:.0}%), {} bytes, {:.1} files/s, {:.1} MB/s",
        progress.device,
        progress.current,
        progress.total,
        progress.percent,
        progress.bytes,
        progress.files_per_sec,
        progress.bytes_per_sec / 1_048_576.0
    );
}
