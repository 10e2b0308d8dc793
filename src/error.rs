// ImageSort Error Types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ImageSortError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Device unreachable: {0}")]
    DeviceUnreachable(String),

    #[error("Device not registered: {0}")]
    DeviceNotFound(String),

    #[error("Metadata unavailable: {0}")]
    MetadataUnavailable(String),

    #[error("Duplicate catalog entry: {0}")]
    DuplicateEntry(String),

    #[error("Naming exhausted: {0}")]
    NamingExhausted(String),

    #[error("Placement failed: {0}")]
    PlacementFailed(String),

    #[error("Transfer incomplete: {0}")]
    TransferIncomplete(String),

    #[error("Invalid path: {0}")]
    InvalidPath(String),

    #[error("ExifTool error: {0}")]
    ExifTool(String),

    #[error("Hash error: {0}")]
    Hash(String),

    #[error("Catalog error: {0}")]
    Catalog(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("{0}")]
    Other(String),
}

impl ImageSortError {
    /// Errors that end the current device's batch rather than just one file.
    pub fn is_device_fatal(&self) -> bool {
        matches!(self, ImageSortError::DeviceUnreachable(_))
    }
}

impl From<anyhow::Error> for ImageSortError {
    fn from(err: anyhow::Error) -> Self {
        ImageSortError::Other(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, ImageSortError>;
