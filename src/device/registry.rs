// Device registry: stable archive sub-paths per physical device

use std::path::PathBuf;

use crate::constants::{DEFAULT_DEVICE_NAME, MAX_DEVICE_NAME_COUNTER};
use crate::db::{Catalog, DeviceRecord};
use crate::error::{ImageSortError, Result};
use super::DeviceHandle;

/// Resolves connected devices to their archive sub-path under one archive root.
pub struct DeviceRegistry<'a> {
    catalog: &'a Catalog,
    archive_root: PathBuf,
}

impl<'a> DeviceRegistry<'a> {
    pub fn new(catalog: &'a Catalog, archive_root: impl Into<PathBuf>) -> Self {
        Self { catalog, archive_root: archive_root.into() }
    }

    /// Sub-path for a device. A catalogued device always gets its stored path back,
    /// whatever the archive directory looks like now. An unknown device gets a
    /// freshly negotiated name that is not persisted here.
    pub fn local_path_for(&self, device: &DeviceHandle) -> Result<String> {
        if let Some(existing) = self.catalog.get_device(&device.device_id, &device.serial)? {
            return Ok(existing.local_path);
        }

        negotiate_local_path(&device.name, |candidate| {
            Ok(self.archive_root.join(candidate).exists() || self.catalog.is_local_path_assigned(candidate)?)
        })
    }

    /// Register the device if needed and return its catalog record
    pub fn resolve(&self, device: &DeviceHandle) -> Result<DeviceRecord> {
        self.catalog.register_device(&device.device_id, &device.serial, &device.name, &self.archive_root)
    }
}

/// Pick `name`, then `name (2)`, `name (3)`, ... until `is_taken` says no.
pub fn negotiate_local_path(display_name: &str, mut is_taken: impl FnMut(&str) -> Result<bool>) -> Result<String> {
    let base = sanitize_device_name(display_name);

    if !is_taken(&base)? {
        return Ok(base);
    }

    for n in 2..=MAX_DEVICE_NAME_COUNTER {
        let candidate = format!("{} ({})", base, n);
        if !is_taken(&candidate)? {
            return Ok(candidate);
        }
    }

    Err(ImageSortError::NamingExhausted(format!(
        "no free archive folder for device '{}' after {} attempts",
        display_name, MAX_DEVICE_NAME_COUNTER
    )))
}

/// Turn a device display name into one safe path component
pub fn sanitize_device_name(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();

    let trimmed = cleaned.trim().trim_matches('.').trim();
    if trimmed.is_empty() {
        DEFAULT_DEVICE_NAME.to_string()
    } else {
        trimmed.to_string()
    }
}
