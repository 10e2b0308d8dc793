// ImageSort Constants
// Changing DIGEST_ALGORITHM invalidates every digest already stored in a catalog.

// Hashing
pub const DIGEST_ALGORITHM: &str = "sha256";
pub const DIGEST_HEX_LEN: usize = 64;
pub const HASH_CHUNK_SIZE: usize = 1_048_576; // 1MB
pub const SCRATCH_SUFFIX_LEN: usize = 8;

// Paths
pub const PATH_DB_SEPARATOR: &str = "/";
pub const APP_QUALIFIER: &str = "org";
pub const APP_ORGANIZATION: &str = "imagesort";
pub const APP_NAME: &str = "ImageSort";
pub const DB_FILENAME: &str = "imagesort.db";
pub const CONFIG_FILENAME: &str = "imagesort.json";
pub const ARCHIVE_FOLDER: &str = "ImageSort";
pub const SCRATCH_FOLDER: &str = "imagesort-staging";
pub const TEMP_FILE_PREFIX: &str = ".imagesort-tmp-";
pub const DEFAULT_DEVICE_NAME: &str = "Device";

// Directories never descended into on a device
pub const EXCLUDED_DIRECTORIES: [&str; 4] = [
    "System Volume Information",
    "$RECYCLE.BIN",
    ".Trashes",
    ".Spotlight-V100",
];

// Naming
pub const MONTH_FOLDER_FORMAT: &str = "%Y-%m";
pub const FILE_TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H.%M.%S";
pub const MAX_COLLISION_COUNTER: u32 = 9_999;
pub const MAX_DEVICE_NAME_COUNTER: u32 = 999;

// Catalog storage
pub const CATALOG_TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

// Capture-date tags
pub const EXIF_DATE_PATTERN: &str = "%Y:%m:%d %H:%M:%S";
pub const QUICKTIME_DATE_PATTERN: &str = "%Y:%m:%d %H:%M:%S";

pub const IMAGE_EXTENSIONS: [&str; 15] = [
    "jpg", "jpeg", "jpe", "tif", "tiff", "heic", "heif", "dng",
    "cr2", "cr3", "nef", "arw", "orf", "rw2", "raf",
];

pub const VIDEO_EXTENSIONS: [&str; 4] = ["mp4", "mov", "m4v", "3gp"];

// Progress reporting
pub const PROGRESS_EVERY_FILES: u64 = 25;
pub const PROGRESS_EVERY_SECONDS: u64 = 10;
