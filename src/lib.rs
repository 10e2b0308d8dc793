// ImageSort - Library Entry Point

pub mod constants;
pub mod error;
pub mod tools;
pub mod config;
pub mod logging;
pub mod db;
pub mod hash;
pub mod device;
pub mod metadata;
pub mod ingest;

pub use config::SyncConfig;
pub use db::Catalog;
pub use error::{ImageSortError, Result};
pub use ingest::{PipelineOptions, TransferPipeline};
