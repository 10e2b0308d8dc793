// ExifTool-backed tag reader

use std::path::Path;
use std::process::Command;

use crate::error::{ImageSortError, Result};
use super::{MetadataTag, TagReader};

/// Reads tags by running `exiftool -j -G` on the file.
/// Keys come back as "Group:TagName", values as exiftool prints them.
#[derive(Debug, Default, Clone)]
pub struct ExifToolReader;

impl TagReader for ExifToolReader {
    fn read_tags(&self, path: &Path) -> Result<Vec<MetadataTag>> {
        let output = Command::new(crate::tools::exiftool_path())
            .args(["-j", "-G"])
            .arg(path)
            .output()
            .map_err(|e| ImageSortError::ExifTool(format!("Failed to run exiftool: {}", e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            return Err(ImageSortError::ExifTool(format!(
                "exiftool exited with {} for {}: {}",
                output.status.code().unwrap_or(-1),
                path.display(),
                stderr
            )));
        }

        parse_dump(&output.stdout)
    }
}

/// Flatten exiftool's JSON array (one object per file) into ordered tags.
pub fn parse_dump(stdout: &[u8]) -> Result<Vec<MetadataTag>> {
    let raw: serde_json::Value = serde_json::from_slice(stdout)
        .map_err(|e| ImageSortError::ExifTool(format!("Failed to parse exiftool JSON: {}", e)))?;

    let object = raw.as_array()
        .and_then(|a| a.first())
        .and_then(|v| v.as_object())
        .ok_or_else(|| ImageSortError::ExifTool("exiftool returned no tags".to_string()))?;

    let tags = object.iter()
        .filter_map(|(key, value)| {
            let value = value_to_string(value)?;
            let (directory, name) = match key.split_once(':') {
                Some((group, tag)) => (group.to_string(), tag.to_string()),
                None => (String::new(), key.clone()),
            };
            Some(MetadataTag { directory, name, value })
        })
        .collect();

    Ok(tags)
}

/// Convert a JSON value to string (handles both string and numeric values).
fn value_to_string(val: &serde_json::Value) -> Option<String> {
    match val {
        serde_json::Value::String(s) if !s.is_empty() => Some(s.clone()),
        serde_json::Value::Number(n) => Some(n.to_string()),
        serde_json::Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}
