// Destination naming: capture date first, original name second, counter on collision

use std::path::{Path, PathBuf};
use chrono::NaiveDateTime;

use crate::constants::{FILE_TIMESTAMP_FORMAT, MAX_COLLISION_COUNTER, MONTH_FOLDER_FORMAT, PATH_DB_SEPARATOR};
use crate::error::{ImageSortError, Result};

/// Where a file will land, both on disk and as the catalog records it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Destination {
    pub absolute: PathBuf,
    /// Relative to the archive root, '/' separated
    pub relative: String,
}

/// `YYYY-MM` folder for a capture date
pub fn month_folder(capture: NaiveDateTime) -> String {
    capture.format(MONTH_FOLDER_FORMAT).to_string()
}

/// `YYYY-MM-DD HH.mm.ss[.n].<stem><ext>`; the counter is omitted when zero.
pub fn destination_file_name(capture: NaiveDateTime, original_basename: &str, n: u32) -> String {
    let (stem, ext) = split_basename(original_basename);
    let stamp = capture.format(FILE_TIMESTAMP_FORMAT);
    if n == 0 {
        format!("{}.{}{}", stamp, stem, ext)
    } else {
        format!("{}.{}.{}{}", stamp, n, stem, ext)
    }
}

/// Lowest-numbered destination for which `exists` is false.
///
/// Deterministic for a given `exists`: two files with the same capture time and
/// basename get `.1.`, `.2.`, ... in placement order, as long as `exists` sees
/// every earlier placement.
pub fn resolve_destination(
    archive_root: &Path,
    device_local_path: &str,
    capture: NaiveDateTime,
    original_basename: &str,
    exists: impl Fn(&Path) -> bool,
) -> Result<Destination> {
    let month = month_folder(capture);
    let dir = archive_root.join(device_local_path).join(&month);

    for n in 0..=MAX_COLLISION_COUNTER {
        let name = destination_file_name(capture, original_basename, n);
        let absolute = dir.join(&name);
        if !exists(&absolute) {
            let relative = [device_local_path, month.as_str(), name.as_str()]
                .join(PATH_DB_SEPARATOR);
            return Ok(Destination { absolute, relative });
        }
    }

    Err(ImageSortError::NamingExhausted(format!(
        "{} names already taken for '{}' at {}",
        MAX_COLLISION_COUNTER + 1,
        original_basename,
        capture
    )))
}

/// ("IMG_1", ".jpg"); a leading dot is part of the stem, not an extension
fn split_basename(basename: &str) -> (&str, &str) {
    match basename.rfind('.') {
        Some(idx) if idx > 0 => (&basename[..idx], &basename[idx..]),
        _ => (basename, ""),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use chrono::NaiveDate;
    use tempfile::TempDir;

    fn capture() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, 1).unwrap().and_hms_opt(10, 0, 0).unwrap()
    }

    #[test]
    fn test_file_name_format() {
        assert_eq!(destination_file_name(capture(), "IMG_1.jpg", 0), "2024-03-01 10.00.00.IMG_1.jpg");
        assert_eq!(destination_file_name(capture(), "IMG_1.jpg", 1), "2024-03-01 10.00.00.1.IMG_1.jpg");
        assert_eq!(destination_file_name(capture(), "archive.tar.gz", 0), "2024-03-01 10.00.00.archive.tar.gz");
        assert_eq!(destination_file_name(capture(), "README", 0), "2024-03-01 10.00.00.README");
        assert_eq!(destination_file_name(capture(), ".hidden", 2), "2024-03-01 10.00.00.2..hidden");
    }

    #[test]
    fn test_resolve_without_collision() {
        let dest = resolve_destination(Path::new("/archive"), "Phone", capture(), "IMG_1.jpg", |_| false).unwrap();
        assert_eq!(dest.absolute, Path::new("/archive/Phone/2024-03/2024-03-01 10.00.00.IMG_1.jpg"));
        assert_eq!(dest.relative, "Phone/2024-03/2024-03-01 10.00.00.IMG_1.jpg");
    }

    #[test]
    fn test_collisions_count_up_on_disk() {
        let tmp = TempDir::new().unwrap();
        let month_dir = tmp.path().join("Phone").join("2024-03");
        std::fs::create_dir_all(&month_dir).unwrap();
        std::fs::write(month_dir.join("2024-03-01 10.00.00.IMG_1.jpg"), b"first").unwrap();

        let second = resolve_destination(tmp.path(), "Phone", capture(), "IMG_1.jpg", |p| p.exists()).unwrap();
        assert_eq!(second.relative, "Phone/2024-03/2024-03-01 10.00.00.1.IMG_1.jpg");
        std::fs::write(&second.absolute, b"second").unwrap();

        let third = resolve_destination(tmp.path(), "Phone", capture(), "IMG_1.jpg", |p| p.exists()).unwrap();
        assert_eq!(third.relative, "Phone/2024-03/2024-03-01 10.00.00.2.IMG_1.jpg");
    }

    #[test]
    fn test_same_state_same_answer() {
        let taken: HashSet<PathBuf> = [
            PathBuf::from("/a/P/2024-03/2024-03-01 10.00.00.IMG_1.jpg"),
            PathBuf::from("/a/P/2024-03/2024-03-01 10.00.00.2.IMG_1.jpg"),
        ].into_iter().collect();

        let first = resolve_destination(Path::new("/a"), "P", capture(), "IMG_1.jpg", |p| taken.contains(p)).unwrap();
        let again = resolve_destination(Path::new("/a"), "P", capture(), "IMG_1.jpg", |p| taken.contains(p)).unwrap();
        assert_eq!(first, again);
        // Lowest free slot, even with a gap above it
        assert_eq!(first.relative, "P/2024-03/2024-03-01 10.00.00.1.IMG_1.jpg");
    }

    #[test]
    fn test_exhaustion_does_not_loop_forever() {
        let err = resolve_destination(Path::new("/a"), "P", capture(), "IMG_1.jpg", |_| true).unwrap_err();
        assert!(matches!(err, ImageSortError::NamingExhausted(_)));
    }
}
