// Mounted-volume device backend
//
// Treats every mounted removable volume (camera card, phone in mass-storage
// mode, USB stick) as a device. Identity comes from the filesystem UUID so a
// card keeps its archive folder across mount points and relabels.

use std::fs;
use std::io::{ErrorKind, Read};
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use chrono::{DateTime, Local};
use regex::Regex;

use crate::error::{ImageSortError, Result};
use super::{join_remote, DeviceAccess, DeviceHandle, FileStat, RemoteEntry};

/// `device_id` of a mounted filesystem identified by its UUID
pub const VOLUME_DEVICE_ID: &str = "volume";
/// `device_id` of a directory without a UUID of its own; its serial is the path
pub const PATH_DEVICE_ID: &str = "path";

/// Volume information (serial, label, mount point)
#[derive(Debug, Clone, Default)]
pub struct VolumeInfo {
    pub serial: Option<String>,
    pub label: Option<String>,
    pub mount_point: Option<String>,
}

pub struct MountedVolumes {
    /// Directories whose immediate subdirectories are volumes (e.g. /media/<user>)
    mount_roots: Vec<PathBuf>,
    /// Volumes named directly
    volumes: Vec<PathBuf>,
}

impl MountedVolumes {
    pub fn new(mount_roots: Vec<PathBuf>, volumes: Vec<PathBuf>) -> Self {
        Self { mount_roots, volumes }
    }

    fn handle_for(&self, volume: &Path) -> DeviceHandle {
        let info = get_volume_info(volume);

        // A plain directory shares the filesystem (and its UUID) of whatever it lives on
        let canonical = volume.canonicalize().unwrap_or_else(|_| volume.to_path_buf());
        let df_says_mounted = info.mount_point.as_deref().map(Path::new) == Some(canonical.as_path());
        if is_mount_point(&canonical) || df_says_mounted {
            volume_handle(volume, info)
        } else {
            log::debug!("{} is not a mount point, identifying it by path", volume.display());
            volume_handle(volume, VolumeInfo::default())
        }
    }

    fn local_path(&self, device: &DeviceHandle, remote: &str) -> PathBuf {
        let root = PathBuf::from(&device.location);
        let relative = remote.trim_start_matches('/');
        if relative.is_empty() {
            root
        } else {
            root.join(relative)
        }
    }

    /// An IO failure while the volume is gone means the device was pulled
    fn map_io(&self, device: &DeviceHandle, err: std::io::Error) -> ImageSortError {
        if !Path::new(&device.location).exists() || err.kind() == ErrorKind::NotConnected {
            ImageSortError::DeviceUnreachable(format!("{}: {}", device, err))
        } else {
            ImageSortError::Io(err)
        }
    }
}

impl DeviceAccess for MountedVolumes {
    fn list_connected_devices(&self) -> Result<Vec<DeviceHandle>> {
        let mut volumes: Vec<PathBuf> = self.volumes.iter()
            .filter(|v| v.is_dir())
            .cloned()
            .collect();

        for root in &self.mount_roots {
            let entries = match fs::read_dir(root) {
                Ok(entries) => entries,
                Err(e) => {
                    log::debug!("Skipping mount root {}: {}", root.display(), e);
                    continue;
                }
            };
            let mut found: Vec<PathBuf> = entries
                .filter_map(|e| e.ok())
                .map(|e| e.path())
                .filter(|p| p.is_dir())
                .collect();
            found.sort();
            volumes.extend(found);
        }

        Ok(volumes.iter().map(|v| self.handle_for(v)).collect())
    }

    fn connect(&self, device: &DeviceHandle) -> Result<()> {
        if Path::new(&device.location).is_dir() {
            Ok(())
        } else {
            Err(ImageSortError::DeviceUnreachable(format!("{} is not mounted", device)))
        }
    }

    fn disconnect(&self, _device: &DeviceHandle) -> Result<()> {
        Ok(())
    }

    fn root_path(&self, _device: &DeviceHandle) -> Result<String> {
        Ok("/".to_string())
    }

    fn read_dir(&self, device: &DeviceHandle, path: &str) -> Result<Vec<RemoteEntry>> {
        let dir = self.local_path(device, path);
        let mut entries = Vec::new();
        for entry in fs::read_dir(&dir).map_err(|e| self.map_io(device, e))? {
            let entry = entry.map_err(|e| self.map_io(device, e))?;
            let file_type = entry.file_type().map_err(|e| self.map_io(device, e))?;
            // Symlinks on a card are not followed
            if file_type.is_symlink() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().to_string();
            entries.push(RemoteEntry {
                path: join_remote(path, &name),
                name,
                is_dir: file_type.is_dir(),
            });
        }
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }

    fn open_read_stream(&self, device: &DeviceHandle, path: &str) -> Result<Box<dyn Read + Send + '_>> {
        let file = fs::File::open(self.local_path(device, path)).map_err(|e| self.map_io(device, e))?;
        Ok(Box::new(file))
    }

    fn stat_file(&self, device: &DeviceHandle, path: &str) -> Result<FileStat> {
        let meta = fs::metadata(self.local_path(device, path)).map_err(|e| self.map_io(device, e))?;
        let created = meta.created()
            .or_else(|_| meta.modified())
            .map_err(|e| self.map_io(device, e))?;
        let created: DateTime<Local> = created.into();
        Ok(FileStat {
            size: meta.len(),
            creation_time: created.naive_local(),
        })
    }
}

/// Build the handle for a volume. The label only names the device; the UUID
/// (or, lacking one, the path) is what identifies it.
pub fn volume_handle(volume: &Path, info: VolumeInfo) -> DeviceHandle {
    let dir_name = volume
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| volume.to_string_lossy().to_string());

    let (device_id, serial) = match info.serial {
        Some(uuid) => (VOLUME_DEVICE_ID, uuid),
        None => (PATH_DEVICE_ID, format!("mount:{}", volume.display())),
    };

    DeviceHandle {
        device_id: device_id.to_string(),
        serial,
        name: info.label.unwrap_or(dir_name),
        location: volume.to_string_lossy().to_string(),
    }
}

/// True when `path` is the root of its own filesystem
#[cfg(unix)]
pub fn is_mount_point(path: &Path) -> bool {
    use std::os::unix::fs::MetadataExt;

    let Ok(meta) = fs::metadata(path) else { return false };
    match path.parent() {
        None => true,
        Some(parent) => fs::metadata(parent)
            .map(|p| p.dev() != meta.dev())
            .unwrap_or(false),
    }
}

#[cfg(not(unix))]
pub fn is_mount_point(path: &Path) -> bool {
    path.parent().is_none()
}

/// Split a `df -P` data line into (filesystem, mount point).
///
/// The mount point is everything after the capacity column, so labels
/// with spaces ("NO NAME") survive.
pub fn parse_df_line(line: &str) -> Option<(String, String)> {
    static DF_LINE: OnceLock<Option<Regex>> = OnceLock::new();
    let re = DF_LINE
        .get_or_init(|| Regex::new(r"^(\S+)\s+(?:\d+|-)\s+(?:\d+|-)\s+(?:\d+|-)\s+(?:\d+%|-)\s+(.+)$").ok())
        .as_ref()?;
    let caps = re.captures(line.trim_end())?;
    Some((caps[1].to_string(), caps[2].to_string()))
}

/// Get volume information for a path (cross-platform)
pub fn get_volume_info(path: &Path) -> VolumeInfo {
    #[cfg(target_os = "linux")]
    {
        get_volume_info_linux(path)
    }
    #[cfg(target_os = "macos")]
    {
        get_volume_info_macos(path)
    }
    #[cfg(not(any(target_os = "linux", target_os = "macos")))]
    {
        let _ = path;
        VolumeInfo::default()
    }
}

#[cfg(target_os = "linux")]
fn get_volume_info_linux(path: &Path) -> VolumeInfo {
    use std::process::Command;

    // One df call gives both the block device and its mount point
    let (device, mount_point) = Command::new("df")
        .arg("-P")
        .arg(path)
        .output()
        .ok()
        .and_then(|o| {
            let stdout = String::from_utf8_lossy(&o.stdout);
            stdout.lines().nth(1).and_then(parse_df_line)
        })
        .map(|(dev, mount)| (Some(dev), Some(mount)))
        .unwrap_or((None, None));

    let blkid = |dev: &str, field: &str| -> Option<String> {
        Command::new("blkid")
            .args(["-s", field, "-o", "value", dev])
            .output()
            .ok()
            .and_then(|o| {
                let s = String::from_utf8_lossy(&o.stdout).trim().to_string();
                if s.is_empty() { None } else { Some(s) }
            })
    };

    let (serial, label) = match device.as_deref() {
        Some(dev) if dev.starts_with("/dev/") => (blkid(dev, "UUID"), blkid(dev, "LABEL")),
        _ => (None, None),
    };

    VolumeInfo { serial, label, mount_point }
}

#[cfg(target_os = "macos")]
fn get_volume_info_macos(path: &Path) -> VolumeInfo {
    use std::process::Command;

    let output = Command::new("diskutil")
        .args(["info"])
        .arg(path)
        .output()
        .ok()
        .map(|o| String::from_utf8_lossy(&o.stdout).to_string())
        .unwrap_or_default();

    let field = |name: &str| -> Option<String> {
        output.lines()
            .find(|l| l.trim_start().starts_with(name))
            .and_then(|l| l.split_once(':'))
            .map(|(_, v)| v.trim().to_string())
            .filter(|v| !v.is_empty())
    };

    VolumeInfo {
        serial: field("Volume UUID"),
        label: field("Volume Name"),
        mount_point: field("Mount Point"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::list_files;
    use tempfile::TempDir;

    #[test]
    fn test_volumes_under_mount_root_become_devices() {
        let tmp = TempDir::new().unwrap();
        std::fs::create_dir_all(tmp.path().join("CANON_SD/DCIM")).unwrap();
        std::fs::create_dir_all(tmp.path().join("PHONE")).unwrap();
        std::fs::write(tmp.path().join("stray-file"), b"x").unwrap();

        let backend = MountedVolumes::new(vec![tmp.path().to_path_buf()], vec![]);
        let devices = backend.list_connected_devices().unwrap();
        assert_eq!(devices.len(), 2);
        assert!(devices.iter().all(|d| !d.serial.is_empty()));
        assert!(devices.iter().any(|d| d.location.ends_with("CANON_SD")));
    }

    #[test]
    fn test_list_and_read_files() {
        let tmp = TempDir::new().unwrap();
        let volume = tmp.path().join("CARD");
        std::fs::create_dir_all(volume.join("DCIM/100CANON")).unwrap();
        std::fs::create_dir_all(volume.join("System Volume Information")).unwrap();
        std::fs::write(volume.join("DCIM/100CANON/IMG_0001.JPG"), b"jpeg bytes").unwrap();
        std::fs::write(volume.join("System Volume Information/WPSettings.dat"), b"x").unwrap();

        let backend = MountedVolumes::new(vec![], vec![volume.clone()]);
        let device = backend.list_connected_devices().unwrap().remove(0);
        backend.connect(&device).unwrap();

        let excluded = vec!["System Volume Information".to_string()];
        let root = backend.root_path(&device).unwrap();
        let files: Vec<String> = list_files(&backend, &device, &root, &excluded)
            .collect::<Result<_>>()
            .unwrap();
        assert_eq!(files, vec!["/DCIM/100CANON/IMG_0001.JPG".to_string()]);

        let stat = backend.stat_file(&device, &files[0]).unwrap();
        assert_eq!(stat.size, 10);

        let mut content = Vec::new();
        backend.open_read_stream(&device, &files[0]).unwrap().read_to_end(&mut content).unwrap();
        assert_eq!(content, b"jpeg bytes");
    }

    #[test]
    fn test_removed_volume_is_unreachable() {
        let tmp = TempDir::new().unwrap();
        let volume = tmp.path().join("CARD");
        std::fs::create_dir_all(&volume).unwrap();

        let backend = MountedVolumes::new(vec![], vec![volume.clone()]);
        let device = backend.list_connected_devices().unwrap().remove(0);
        std::fs::remove_dir_all(&volume).unwrap();

        assert!(matches!(backend.connect(&device), Err(ImageSortError::DeviceUnreachable(_))));
        assert!(matches!(backend.read_dir(&device, "/"), Err(ImageSortError::DeviceUnreachable(_))));
    }

    #[test]
    fn test_df_line_with_spaces_in_mount_point() {
        let parsed = parse_df_line("/dev/sdb1  31154688  1024  31153664  1% /media/user/NO NAME");
        assert_eq!(parsed, Some(("/dev/sdb1".to_string(), "/media/user/NO NAME".to_string())));

        let plain = parse_df_line("/dev/sda2 479668728 123 456 27% /");
        assert_eq!(plain, Some(("/dev/sda2".to_string(), "/".to_string())));

        assert_eq!(parse_df_line("Filesystem 1024-blocks Used Available Capacity Mounted on"), None);
    }

    #[cfg(unix)]
    #[test]
    fn test_plain_directory_is_not_a_mount_point() {
        let tmp = TempDir::new().unwrap();
        let volume = tmp.path().join("NO NAME");
        std::fs::create_dir_all(&volume).unwrap();

        assert!(!is_mount_point(&volume));
        assert!(is_mount_point(Path::new("/")));

        let backend = MountedVolumes::new(vec![], vec![volume.clone()]);
        let device = backend.list_connected_devices().unwrap().remove(0);
        assert_eq!(device.device_id, PATH_DEVICE_ID);
        assert_eq!(device.serial, format!("mount:{}", volume.display()));
        assert_eq!(device.name, "NO NAME");
    }

    #[test]
    fn test_relabelled_volume_keeps_its_identity() {
        let info = |label: &str| VolumeInfo {
            serial: Some("1A2B-3C4D".to_string()),
            label: Some(label.to_string()),
            mount_point: None,
        };
        let before = volume_handle(Path::new("/media/user/EOS_DIGITAL"), info("EOS_DIGITAL"));
        let after = volume_handle(Path::new("/media/user/HOLIDAY"), info("HOLIDAY"));

        assert_eq!(before.key(), after.key());
        assert_eq!(before.device_id, VOLUME_DEVICE_ID);
        assert_eq!(after.name, "HOLIDAY");
        assert_ne!(before.name, after.name);
    }
}
