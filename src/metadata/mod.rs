// Capture-date resolution from embedded media metadata

pub mod exiftool;

use std::path::Path;
use std::sync::OnceLock;
use chrono::{Local, NaiveDateTime, TimeZone, Utc};
use regex::Regex;

use crate::constants::{EXIF_DATE_PATTERN, IMAGE_EXTENSIONS, QUICKTIME_DATE_PATTERN, VIDEO_EXTENSIONS};
use crate::error::{ImageSortError, Result};

/// One decoded tag: the directory (group) it lives in, its name, and its value as text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetadataTag {
    pub directory: String,
    pub name: String,
    pub value: String,
}

/// Decodes metadata tags from a local file.
pub trait TagReader: Send + Sync {
    /// Fails when the format is unsupported or unreadable
    fn read_tags(&self, path: &Path) -> Result<Vec<MetadataTag>>;
}

/// The file kinds a capture date can be read from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaClass {
    StillImage,
    Video,
}

/// How a date tag's value is interpreted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TagClock {
    /// Camera wall clock, no zone
    Local,
    /// Stored as UTC by the container format
    Utc,
}

struct DateTagRule {
    directory: &'static str,
    tag: &'static str,
    pattern: &'static str,
    clock: TagClock,
}

const STILL_IMAGE_RULE: DateTagRule = DateTagRule {
    directory: "EXIF",
    tag: "DateTimeOriginal",
    pattern: EXIF_DATE_PATTERN,
    clock: TagClock::Local,
};

const VIDEO_RULE: DateTagRule = DateTagRule {
    directory: "QuickTime",
    tag: "CreateDate",
    pattern: QUICKTIME_DATE_PATTERN,
    clock: TagClock::Utc,
};

impl MediaClass {
    /// Classify by extension (case-insensitive). None for anything unrecognized.
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_lowercase();
        if IMAGE_EXTENSIONS.contains(&ext.as_str()) {
            Some(MediaClass::StillImage)
        } else if VIDEO_EXTENSIONS.contains(&ext.as_str()) {
            Some(MediaClass::Video)
        } else {
            None
        }
    }

    fn rule(&self) -> &'static DateTagRule {
        match self {
            MediaClass::StillImage => &STILL_IMAGE_RULE,
            MediaClass::Video => &VIDEO_RULE,
        }
    }
}

/// Leading "YYYY:MM:DD HH:MM:SS"; exiftool may append sub-seconds or an offset
fn date_prefix_regex() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^\s*(\d{4}:\d{2}:\d{2} \d{2}:\d{2}:\d{2})").ok()
    }).as_ref()
}

/// Reads the authoritative capture timestamp of a staged file.
///
/// Never falls back to filesystem times; callers decide what to do with
/// `MetadataUnavailable`.
pub struct CaptureDateResolver {
    reader: Box<dyn TagReader>,
}

impl CaptureDateResolver {
    pub fn new(reader: impl TagReader + 'static) -> Self {
        Self { reader: Box::new(reader) }
    }

    /// Capture time as local wall-clock time
    pub fn resolve(&self, path: &Path) -> Result<NaiveDateTime> {
        let class = MediaClass::from_path(path).ok_or_else(|| {
            ImageSortError::MetadataUnavailable(format!("{}: unrecognized file type", path.display()))
        })?;
        let rule = class.rule();

        let tags = self.reader.read_tags(path).map_err(|e| {
            ImageSortError::MetadataUnavailable(format!("{}: {}", path.display(), e))
        })?;

        let tag = tags.iter()
            .find(|t| t.directory == rule.directory && t.name == rule.tag)
            .ok_or_else(|| ImageSortError::MetadataUnavailable(format!(
                "{}: no {}:{} tag", path.display(), rule.directory, rule.tag
            )))?;

        parse_tag_date(&tag.value, rule).ok_or_else(|| ImageSortError::MetadataUnavailable(format!(
            "{}: {}:{} value '{}' is not a date", path.display(), rule.directory, rule.tag, tag.value
        )))
    }
}

fn parse_tag_date(value: &str, rule: &DateTagRule) -> Option<NaiveDateTime> {
    let caps = date_prefix_regex()?.captures(value)?;
    let parsed = NaiveDateTime::parse_from_str(caps.get(1)?.as_str(), rule.pattern).ok()?;

    match rule.clock {
        TagClock::Local => Some(parsed),
        TagClock::Utc => Some(Utc.from_utc_datetime(&parsed).with_timezone(&Local).naive_local()),
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use super::fake::FakeTags;
    use chrono::NaiveDate;

    fn dt(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, mo, d).unwrap().and_hms_opt(h, mi, s).unwrap()
    }

    #[test]
    fn test_media_class_from_extension() {
        assert_eq!(MediaClass::from_path(Path::new("IMG_1.JPG")), Some(MediaClass::StillImage));
        assert_eq!(MediaClass::from_path(Path::new("a.heic")), Some(MediaClass::StillImage));
        assert_eq!(MediaClass::from_path(Path::new("VID_1.mp4")), Some(MediaClass::Video));
        assert_eq!(MediaClass::from_path(Path::new("clip.MOV")), Some(MediaClass::Video));
        assert_eq!(MediaClass::from_path(Path::new("notes.txt")), None);
        assert_eq!(MediaClass::from_path(Path::new("noext")), None);
    }

    #[test]
    fn test_resolve_exif_original_date() {
        let tags = FakeTags::default();
        tags.set("IMG_1", "EXIF", "DateTimeOriginal", "2024:03:01 10:00:00");
        tags.set("IMG_1", "EXIF", "ModifyDate", "2025:01:01 00:00:00");
        let resolver = CaptureDateResolver::new(tags);

        let date = resolver.resolve(Path::new("/scratch/IMG_1.abcd1234.jpg")).unwrap();
        assert_eq!(date, dt(2024, 3, 1, 10, 0, 0));
    }

    #[test]
    fn test_resolve_accepts_subseconds_and_offset_suffix() {
        let tags = FakeTags::default();
        tags.set("IMG_2", "EXIF", "DateTimeOriginal", "2023:12:31 23:59:58.123+01:00");
        let resolver = CaptureDateResolver::new(tags);

        let date = resolver.resolve(Path::new("IMG_2.jpg")).unwrap();
        assert_eq!(date, dt(2023, 12, 31, 23, 59, 58));
    }

    #[test]
    fn test_resolve_quicktime_date_is_utc() {
        let tags = FakeTags::default();
        tags.set("VID_1", "QuickTime", "CreateDate", "2024:06:15 12:30:00");
        let resolver = CaptureDateResolver::new(tags);

        let date = resolver.resolve(Path::new("VID_1.mp4")).unwrap();
        let expected = Utc.from_utc_datetime(&dt(2024, 6, 15, 12, 30, 0)).with_timezone(&Local).naive_local();
        assert_eq!(date, expected);
    }

    #[test]
    fn test_unavailable_cases() {
        let tags = FakeTags::default();
        tags.set("no_tag", "EXIF", "Make", "Canon");
        tags.set("zero", "EXIF", "DateTimeOriginal", "0000:00:00 00:00:00");
        tags.set("garbage", "EXIF", "DateTimeOriginal", "yesterday");
        tags.set("wrong_dir", "XMP", "DateTimeOriginal", "2024:03:01 10:00:00");
        let resolver = CaptureDateResolver::new(tags);

        for name in ["notes.txt", "no_tag.jpg", "zero.jpg", "garbage.jpg", "wrong_dir.jpg", "unknown.jpg"] {
            let err = resolver.resolve(Path::new(name)).unwrap_err();
            assert!(matches!(err, ImageSortError::MetadataUnavailable(_)), "{} gave {:?}", name, err);
        }
    }
}
