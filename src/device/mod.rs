// Device access: the boundary to cameras, phones and cards

pub mod mounted;
pub mod registry;

use std::collections::VecDeque;
use std::fmt;
use std::io::Read;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// A connected device as reported by a backend snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceHandle {
    pub device_id: String,
    pub serial: String,
    /// Display name; may change between connections
    pub name: String,
    /// Backend-specific address (mount path, bus id)
    pub location: String,
}

impl DeviceHandle {
    pub fn key(&self) -> String {
        format!("{}/{}", self.device_id, self.serial)
    }
}

impl fmt::Display for DeviceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({} - {})", self.name, self.device_id, self.serial)
    }
}

/// One directory entry on a device. Paths are '/'-separated and absolute on the device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteEntry {
    pub name: String,
    pub path: String,
    pub is_dir: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileStat {
    pub size: u64,
    /// Device-reported creation time, local wall clock
    pub creation_time: NaiveDateTime,
}

/// Everything the transfer pipeline needs from a device backend.
///
/// Implementations report a vanished device as `DeviceUnreachable`.
/// No method carries a timeout; wrap the backend if one is needed.
pub trait DeviceAccess: Send + Sync {
    /// Snapshot of the devices connected right now
    fn list_connected_devices(&self) -> Result<Vec<DeviceHandle>>;

    fn connect(&self, device: &DeviceHandle) -> Result<()>;

    fn disconnect(&self, device: &DeviceHandle) -> Result<()>;

    /// Path the listing starts from
    fn root_path(&self, device: &DeviceHandle) -> Result<String>;

    /// Immediate children of one directory
    fn read_dir(&self, device: &DeviceHandle, path: &str) -> Result<Vec<RemoteEntry>>;

    fn open_read_stream(&self, device: &DeviceHandle, path: &str) -> Result<Box<dyn Read + Send + '_>>;

    fn stat_file(&self, device: &DeviceHandle, path: &str) -> Result<FileStat>;
}

/// Lazily list every file under `root`, skipping excluded directory names.
pub fn list_files<'a>(
    access: &'a dyn DeviceAccess,
    device: &'a DeviceHandle,
    root: &str,
    excluded: &'a [String],
) -> RemoteWalk<'a> {
    RemoteWalk {
        access,
        device,
        excluded,
        pending_dirs: vec![root.to_string()],
        pending_files: VecDeque::new(),
        failed: false,
    }
}

/// Worklist traversal over a device's directory tree.
///
/// Each directory yields its own files first, then its subdirectories depth-first,
/// in the order the backend lists them. A failed directory read is yielded once
/// and ends the walk.
pub struct RemoteWalk<'a> {
    access: &'a dyn DeviceAccess,
    device: &'a DeviceHandle,
    excluded: &'a [String],
    pending_dirs: Vec<String>,
    pending_files: VecDeque<String>,
    failed: bool,
}

impl<'a> RemoteWalk<'a> {
    fn is_excluded(&self, name: &str) -> bool {
        self.excluded.iter().any(|e| e == name)
    }
}

impl<'a> Iterator for RemoteWalk<'a> {
    type Item = Result<String>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(file) = self.pending_files.pop_front() {
                return Some(Ok(file));
            }
            if self.failed {
                return None;
            }

            let dir = self.pending_dirs.pop()?;
            let entries = match self.access.read_dir(self.device, &dir) {
                Ok(entries) => entries,
                Err(e) => {
                    self.failed = true;
                    self.pending_dirs.clear();
                    return Some(Err(e));
                }
            };

            let mut subdirs = Vec::new();
            for entry in entries {
                if entry.is_dir {
                    if self.is_excluded(&entry.name) {
                        log::debug!("Excluding dir: {}", entry.path);
                        continue;
                    }
                    subdirs.push(entry.path);
                } else {
                    self.pending_files.push_back(entry.path);
                }
            }

            // Stack: push in reverse so the first listed subdirectory is visited next
            self.pending_dirs.extend(subdirs.into_iter().rev());
        }
    }
}

/// Join a device directory path and a child name
pub fn join_remote(dir: &str, name: &str) -> String {
    if dir.ends_with('/') {
        format!("{}{}", dir, name)
    } else {
        format!("{}/{}", dir, name)
    }
}

/// Last component of a device path
pub fn remote_basename(path: &str) -> &str {
    path.rsplit(|c| c == '/' || c == '\\').next().unwrap_or(path)
}


#[cfg(test)]
mod tests {
    use super::*;
    use super::fake::FakeDevices;
    use chrono::NaiveDate;

    fn t() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 1, 1).unwrap().and_hms_opt(0, 0, 0).unwrap()
    }

    #[test]
    fn test_walk_lists_files_before_subdirectories_and_skips_excluded() {
        let mut fake = FakeDevices::default();
        let dev = fake.add_device("X", "1", "Phone");
        fake.add_file(&dev, "/root.jpg", b"r", t());
        fake.add_file(&dev, "/DCIM/a.jpg", b"a", t());
        fake.add_file(&dev, "/DCIM/Camera/b.jpg", b"b", t());
        fake.add_file(&dev, "/Pictures/c.jpg", b"c", t());
        fake.add_file(&dev, "/System Volume Information/IndexerVolumeGuid", b"x", t());

        let excluded = vec!["System Volume Information".to_string()];
        let files: Vec<String> = list_files(&fake, &dev, "/", &excluded)
            .collect::<Result<_>>()
            .unwrap();

        assert_eq!(files, vec![
            "/root.jpg".to_string(),
            "/DCIM/a.jpg".to_string(),
            "/DCIM/Camera/b.jpg".to_string(),
            "/Pictures/c.jpg".to_string(),
        ]);

        // Restartable: a second walk yields the same sequence
        let again: Vec<String> = list_files(&fake, &dev, "/", &excluded)
            .collect::<Result<_>>()
            .unwrap();
        assert_eq!(again, files);
    }

    #[test]
    fn test_walk_stops_after_device_error() {
        let mut fake = FakeDevices::default();
        let dev = fake.add_device("X", "1", "Phone");
        fake.add_file(&dev, "/a.jpg", b"a", t());
        fake.unplug(&dev);

        let mut walk = list_files(&fake, &dev, "/", &[]);
        assert!(walk.next().unwrap().is_err());
        assert!(walk.next().is_none());
    }

    #[test]
    fn test_remote_path_helpers() {
        assert_eq!(join_remote("/", "DCIM"), "/DCIM");
        assert_eq!(join_remote("/DCIM", "a.jpg"), "/DCIM/a.jpg");
        assert_eq!(remote_basename("/DCIM/Camera/IMG_1.jpg"), "IMG_1.jpg");
        assert_eq!(remote_basename("IMG_1.jpg"), "IMG_1.jpg");
    }
}
