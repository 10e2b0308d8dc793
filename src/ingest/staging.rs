// Staging: stream a device file into the scratch area

use std::fs;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use crate::constants::HASH_CHUNK_SIZE;
use crate::device::{remote_basename, DeviceAccess, DeviceHandle};
use crate::error::{ImageSortError, Result};
use crate::hash::scratch_suffix;

/// A device file copied into scratch, not yet verified or placed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedFile {
    pub path: PathBuf,
    pub size: u64,
}

/// `<stem>.<suffix><ext>`: keeps the extension so the file can still be classified
pub fn scratch_name(device: &DeviceHandle, remote_path: &str) -> String {
    let basename = remote_basename(remote_path);
    let suffix = scratch_suffix(&device.key(), remote_path);
    match basename.rfind('.') {
        Some(idx) if idx > 0 => format!("{}.{}{}", &basename[..idx], suffix, &basename[idx..]),
        _ => format!("{}.{}", basename, suffix),
    }
}

/// Copy one device file into `scratch_dir`.
///
/// A read failure is `DeviceUnreachable` only when the device no longer answers
/// `connect`; otherwise just this file fails. Write failures stay IO errors.
/// A partial scratch file never survives an error.
pub fn stage_file(
    access: &dyn DeviceAccess,
    device: &DeviceHandle,
    remote_path: &str,
    scratch_dir: &Path,
) -> Result<StagedFile> {
    let staged_path = scratch_dir.join(scratch_name(device, remote_path));

    let result = copy_stream(access, device, remote_path, &staged_path);
    if result.is_err() {
        let _ = fs::remove_file(&staged_path);
    }
    let size = result?;

    Ok(StagedFile { path: staged_path, size })
}

fn copy_stream(
    access: &dyn DeviceAccess,
    device: &DeviceHandle,
    remote_path: &str,
    staged_path: &Path,
) -> Result<u64> {
    let mut reader = access.open_read_stream(device, remote_path)?;
    let mut writer = fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(staged_path)?;

    let mut buffer = vec![0u8; HASH_CHUNK_SIZE];
    let mut total: u64 = 0;
    loop {
        let bytes_read = match reader.read(&mut buffer) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(classify_read_error(access, device, remote_path, e)),
        };
        writer.write_all(&buffer[..bytes_read])?;
        total += bytes_read as u64;
    }

    writer.sync_all()?;
    Ok(total)
}

/// Ask the device whether it is still there before blaming the transport
fn classify_read_error(
    access: &dyn DeviceAccess,
    device: &DeviceHandle,
    remote_path: &str,
    err: std::io::Error,
) -> ImageSortError {
    let context = format!("reading {} from {}: {}", remote_path, device, err);
    match access.connect(device) {
        Err(e) if e.is_device_fatal() => {
            log::warn!("{} went away while {}", device, context);
            ImageSortError::DeviceUnreachable(context)
        }
        _ => ImageSortError::TransferIncomplete(context),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::fake::FakeDevices;
    use chrono::NaiveDate;
    use tempfile::TempDir;

    #[test]
    fn test_scratch_name_keeps_extension() {
        let mut fake = FakeDevices::default();
        let dev = fake.add_device("X", "1", "Phone");
        let name = scratch_name(&dev, "/DCIM/IMG_1.jpg");
        assert!(name.starts_with("IMG_1."));
        assert!(name.ends_with(".jpg"));
        assert_eq!(name.len(), "IMG_1..jpg".len() + crate::constants::SCRATCH_SUFFIX_LEN);

        let bare = scratch_name(&dev, "/README");
        assert!(bare.starts_with("README."));
    }

    #[test]
    fn test_same_basename_from_different_folders_do_not_collide() {
        let tmp = TempDir::new().unwrap();
        let mut fake = FakeDevices::default();
        let dev = fake.add_device("X", "1", "Phone");
        let when = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap().and_hms_opt(0, 0, 0).unwrap();
        fake.add_file(&dev, "/DCIM/A/IMG_1.jpg", b"first", when);
        fake.add_file(&dev, "/DCIM/B/IMG_1.jpg", b"second", when);

        let a = stage_file(&fake, &dev, "/DCIM/A/IMG_1.jpg", tmp.path()).unwrap();
        let b = stage_file(&fake, &dev, "/DCIM/B/IMG_1.jpg", tmp.path()).unwrap();
        assert_ne!(a.path, b.path);
        assert_eq!(std::fs::read(&a.path).unwrap(), b"first");
        assert_eq!(std::fs::read(&b.path).unwrap(), b"second");
        assert_eq!(a.size, 5);
    }

    #[test]
    fn test_failed_read_leaves_no_scratch_file() {
        let tmp = TempDir::new().unwrap();
        let mut fake = FakeDevices::default();
        let dev = fake.add_device("X", "1", "Phone");
        fake.broken_reads.lock().unwrap().push("/a.jpg".to_string());

        let err = stage_file(&fake, &dev, "/a.jpg", tmp.path()).unwrap_err();
        assert!(err.is_device_fatal());
        assert_eq!(std::fs::read_dir(tmp.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_stream_error_on_present_device_fails_only_the_file() {
        let tmp = TempDir::new().unwrap();
        let mut fake = FakeDevices::default();
        let dev = fake.add_device("X", "1", "Phone");
        let when = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap().and_hms_opt(0, 0, 0).unwrap();
        fake.add_file(&dev, "/DCIM/bad.jpg", b"unreadable sector", when);
        fake.failing_streams.lock().unwrap().push("/DCIM/bad.jpg".to_string());

        let err = stage_file(&fake, &dev, "/DCIM/bad.jpg", tmp.path()).unwrap_err();
        assert!(!err.is_device_fatal());
        assert!(matches!(err, ImageSortError::TransferIncomplete(_)));
        assert_eq!(std::fs::read_dir(tmp.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_stream_error_after_device_pulled_is_fatal() {
        let tmp = TempDir::new().unwrap();
        let mut fake = FakeDevices::default();
        let dev = fake.add_device("X", "1", "Phone");
        let when = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap().and_hms_opt(0, 0, 0).unwrap();
        fake.add_file(&dev, "/DCIM/last.jpg", b"half a file", when);
        fake.pulled_mid_read.lock().unwrap().push("/DCIM/last.jpg".to_string());

        let err = stage_file(&fake, &dev, "/DCIM/last.jpg", tmp.path()).unwrap_err();
        assert!(err.is_device_fatal());
        assert_eq!(std::fs::read_dir(tmp.path()).unwrap().count(), 0);
    }
}
