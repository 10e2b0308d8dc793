// exiftool lookup
//
// IMAGESORT_EXIFTOOL_PATH wins, then a copy shipped next to the binary
// (or in its bin/ subdirectory), then whatever PATH finds as `exiftool`.

use std::env;
use std::path::{Path, PathBuf};

pub const EXIFTOOL_ENV: &str = "IMAGESORT_EXIFTOOL_PATH";

const EXIFTOOL_NAME: &str = if cfg!(windows) { "exiftool.exe" } else { "exiftool" };

/// Get the directory containing the current executable
fn exe_dir() -> Option<PathBuf> {
    env::current_exe()
        .ok()
        .and_then(|p| p.parent().map(|d| d.to_path_buf()))
}

/// First existing candidate, else the bare name for a PATH lookup
fn find_exiftool(env_override: Option<PathBuf>, exe_dir: Option<&Path>) -> PathBuf {
    if let Some(p) = env_override.as_ref().filter(|p| !p.exists()) {
        log::warn!("{} points at missing file {}, falling back", EXIFTOOL_ENV, p.display());
    }

    let bundled = exe_dir
        .into_iter()
        .flat_map(|dir| [dir.join(EXIFTOOL_NAME), dir.join("bin").join(EXIFTOOL_NAME)]);

    env_override
        .into_iter()
        .chain(bundled)
        .find(|p| p.exists())
        .unwrap_or_else(|| PathBuf::from(EXIFTOOL_NAME))
}

/// Get path to exiftool binary
pub fn exiftool_path() -> PathBuf {
    find_exiftool(env::var_os(EXIFTOOL_ENV).map(PathBuf::from), exe_dir().as_deref())
}

/// Check that exiftool can actually be run
pub fn is_exiftool_available() -> bool {
    std::process::Command::new(exiftool_path())
        .arg("-ver")
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_falls_back_to_path_lookup() {
        let empty = TempDir::new().unwrap();
        assert_eq!(find_exiftool(None, Some(empty.path())), PathBuf::from(EXIFTOOL_NAME));
        assert_eq!(find_exiftool(None, None), PathBuf::from(EXIFTOOL_NAME));
    }

    #[test]
    fn test_env_override_wins() {
        let dir = TempDir::new().unwrap();
        let custom = dir.path().join("my-exiftool");
        std::fs::write(&custom, b"").unwrap();
        std::fs::write(dir.path().join(EXIFTOOL_NAME), b"").unwrap();

        assert_eq!(find_exiftool(Some(custom.clone()), Some(dir.path())), custom);
    }

    #[test]
    fn test_missing_override_uses_bundled_copy() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join("bin")).unwrap();
        let bundled = dir.path().join("bin").join(EXIFTOOL_NAME);
        std::fs::write(&bundled, b"").unwrap();

        let missing = dir.path().join("gone");
        assert_eq!(find_exiftool(Some(missing), Some(dir.path())), bundled);
    }
}
