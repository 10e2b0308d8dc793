// Placement: move a verified scratch file to its final archive path

use std::fs;
use std::path::{Path, PathBuf};
use chrono::{Local, NaiveDateTime, TimeZone};

use crate::constants::TEMP_FILE_PREFIX;
use crate::error::{ImageSortError, Result};
use crate::hash;

/// Move `staged` to `dest` and stamp it with the capture time.
///
/// Same-filesystem moves are a rename. Otherwise the file is copied to a
/// hidden sibling of `dest`, re-hashed against `expected_digest`, then
/// renamed into place, so `dest` never exists half-written. On any
/// `PlacementFailed` the staged file is left where it was.
pub fn place_file(staged: &Path, dest: &Path, expected_digest: &str, capture: NaiveDateTime) -> Result<()> {
    let dest_dir = dest.parent().ok_or_else(|| {
        ImageSortError::InvalidPath(format!("{} has no parent directory", dest.display()))
    })?;
    fs::create_dir_all(dest_dir).map_err(|e| placement_error(dest, e))?;

    if dest.exists() {
        return Err(ImageSortError::PlacementFailed(format!(
            "{} already exists", dest.display()
        )));
    }

    if let Err(e) = fs::rename(staged, dest) {
        log::debug!("rename {} -> {} failed ({}), copying instead", staged.display(), dest.display(), e);
        copy_across_volumes(staged, dest, expected_digest)?;
    }

    set_capture_times(dest, capture);
    sync_dir(dest_dir);
    Ok(())
}

fn copy_across_volumes(staged: &Path, dest: &Path, expected_digest: &str) -> Result<()> {
    let temp = sibling_temp_path(dest);

    let copied = (|| -> Result<()> {
        fs::copy(staged, &temp)?;
        fs::File::open(&temp)?.sync_all()?;
        if !hash::verify_file(&temp, expected_digest)? {
            return Err(ImageSortError::PlacementFailed(format!(
                "copy of {} does not match its digest", staged.display()
            )));
        }
        if dest.exists() {
            return Err(ImageSortError::PlacementFailed(format!(
                "{} appeared during copy", dest.display()
            )));
        }
        fs::rename(&temp, dest)?;
        Ok(())
    })();

    if let Err(e) = copied {
        let _ = fs::remove_file(&temp);
        return Err(match e {
            ImageSortError::PlacementFailed(_) => e,
            other => ImageSortError::PlacementFailed(format!("{}: {}", dest.display(), other)),
        });
    }

    if let Err(e) = fs::remove_file(staged) {
        log::warn!("placed {} but could not remove staged copy {}: {}", dest.display(), staged.display(), e);
    }
    Ok(())
}

fn sibling_temp_path(dest: &Path) -> PathBuf {
    let name = format!("{}{}", TEMP_FILE_PREFIX, uuid::Uuid::new_v4().simple());
    dest.with_file_name(name)
}

fn placement_error(dest: &Path, err: std::io::Error) -> ImageSortError {
    ImageSortError::PlacementFailed(format!("{}: {}", dest.display(), err))
}

/// Access and modification times follow the capture time. Creation time
/// cannot be set portably, so it is left alone.
fn set_capture_times(dest: &Path, capture: NaiveDateTime) {
    let Some(local) = Local.from_local_datetime(&capture).earliest() else {
        log::warn!("capture time {} does not exist in the local zone, keeping file times", capture);
        return;
    };
    let stamp = filetime::FileTime::from_unix_time(local.timestamp(), 0);
    if let Err(e) = filetime::set_file_times(dest, stamp, stamp) {
        log::warn!("Failed to set file times on {}: {}", dest.display(), e);
    }
}

#[cfg(unix)]
fn sync_dir(dir: &Path) {
    if let Err(e) = fs::File::open(dir).and_then(|d| d.sync_all()) {
        log::debug!("fsync of {} failed: {}", dir.display(), e);
    }
}

#[cfg(not(unix))]
fn sync_dir(_dir: &Path) {}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use tempfile::TempDir;

    fn capture() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, 1).unwrap().and_hms_opt(10, 0, 0).unwrap()
    }

    #[test]
    fn test_place_moves_file_and_sets_times() {
        let tmp = TempDir::new().unwrap();
        let staged = tmp.path().join("IMG_1.abcd1234.jpg");
        fs::write(&staged, b"pixels").unwrap();
        let digest = hash::digest_bytes(b"pixels");
        let dest = tmp.path().join("archive/Phone/2024-03/2024-03-01 10.00.00.IMG_1.jpg");

        place_file(&staged, &dest, &digest, capture()).unwrap();

        assert!(!staged.exists());
        assert_eq!(fs::read(&dest).unwrap(), b"pixels");
        let meta = fs::metadata(&dest).unwrap();
        let mtime = filetime::FileTime::from_last_modification_time(&meta);
        let expected = Local.from_local_datetime(&capture()).earliest().unwrap().timestamp();
        assert_eq!(mtime.unix_seconds(), expected);
    }

    #[test]
    fn test_place_refuses_existing_destination() {
        let tmp = TempDir::new().unwrap();
        let staged = tmp.path().join("staged.jpg");
        fs::write(&staged, b"new").unwrap();
        let dest = tmp.path().join("dest.jpg");
        fs::write(&dest, b"old").unwrap();

        let err = place_file(&staged, &dest, &hash::digest_bytes(b"new"), capture()).unwrap_err();
        assert!(matches!(err, ImageSortError::PlacementFailed(_)));
        assert_eq!(fs::read(&dest).unwrap(), b"old");
        assert!(staged.exists());
    }

    #[test]
    fn test_cross_volume_copy_checks_digest() {
        let tmp = TempDir::new().unwrap();
        let staged = tmp.path().join("staged.jpg");
        fs::write(&staged, b"content").unwrap();
        let dest = tmp.path().join("out").join("dest.jpg");
        fs::create_dir_all(dest.parent().unwrap()).unwrap();

        let err = copy_across_volumes(&staged, &dest, &hash::digest_bytes(b"other")).unwrap_err();
        assert!(matches!(err, ImageSortError::PlacementFailed(_)));
        assert!(!dest.exists());
        assert!(staged.exists());
        assert_eq!(fs::read_dir(dest.parent().unwrap()).unwrap().count(), 0);

        copy_across_volumes(&staged, &dest, &hash::digest_bytes(b"content")).unwrap();
        assert_eq!(fs::read(&dest).unwrap(), b"content");
        assert!(!staged.exists());
    }
}
