// ImageSort CLI binary

use std::path::PathBuf;
use clap::{Parser, Subcommand};
use anyhow::{Context, Result};

use imagesort_lib::config::SyncConfig;
use imagesort_lib::db::Catalog;
use imagesort_lib::device::mounted::MountedVolumes;
use imagesort_lib::ingest::report::{DeviceStatus, RunReport};
use imagesort_lib::ingest::verify::{verify_archive, VerifyProblem};
use imagesort_lib::ingest::TransferPipeline;
use imagesort_lib::logging::init_logging;
use imagesort_lib::metadata::exiftool::ExifToolReader;
use imagesort_lib::metadata::CaptureDateResolver;
use imagesort_lib::tools;

#[derive(Parser)]
#[command(name = "imagesort")]
#[command(about = "ImageSort - Archive photos and videos from cameras, phones and cards", long_about = None)]
#[command(version)]
struct Cli {
    /// Config file (defaults to the per-user config directory)
    #[arg(long, global = true, env = "IMAGESORT_CONFIG")]
    config: Option<PathBuf>,

    /// Archive root
    #[arg(long, global = true, env = "IMAGESORT_ARCHIVE")]
    archive: Option<PathBuf>,

    /// Scratch directory for staged downloads
    #[arg(long, global = true, env = "IMAGESORT_SCRATCH")]
    scratch: Option<PathBuf>,

    /// Catalog database file
    #[arg(long, global = true, env = "IMAGESORT_CATALOG")]
    catalog: Option<PathBuf>,

    /// Debug logging (RUST_LOG still wins)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Copy new files from every connected device into the archive
    Sync {
        /// Sync only this mounted volume (repeatable)
        #[arg(short, long)]
        device: Vec<PathBuf>,
        /// List what would be copied without copying
        #[arg(long)]
        dry_run: bool,
        /// Run devices side by side
        #[arg(long)]
        parallel: bool,
    },

    /// List catalogued devices
    Devices,

    /// Skip (or stop skipping) a device in future syncs
    Ignore {
        device_id: String,
        serial: String,
        /// Clear the ignore flag instead of setting it
        #[arg(long)]
        off: bool,
    },

    /// Re-hash archived files and compare them to the catalog
    Verify {
        /// Only devices whose id or archive folder matches (repeatable)
        #[arg(short, long)]
        device: Vec<String>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let mut config = SyncConfig::load(cli.config.as_deref())?;
    if let Some(archive) = cli.archive {
        config.archive_root = archive;
    }
    if let Some(scratch) = cli.scratch {
        config.scratch_root = scratch;
    }
    if let Some(catalog) = cli.catalog {
        config.catalog_path = catalog;
    }

    match cli.command {
        Commands::Sync { device, dry_run, parallel } => cmd_sync(&config, device, dry_run, parallel),
        Commands::Devices => cmd_devices(&config),
        Commands::Ignore { device_id, serial, off } => cmd_ignore(&config, &device_id, &serial, !off),
        Commands::Verify { device } => cmd_verify(&config, &device),
    }
}

fn open_catalog(config: &SyncConfig) -> Result<Catalog> {
    Catalog::open(&config.catalog_path)
        .with_context(|| format!("Failed to open catalog {}", config.catalog_path.display()))
}

fn cmd_sync(config: &SyncConfig, devices: Vec<PathBuf>, dry_run: bool, parallel: bool) -> Result<()> {
    if !tools::is_exiftool_available() {
        log::warn!("exiftool not found; capture dates will fall back to device file times");
    }

    let catalog = open_catalog(config)?;
    let access = if devices.is_empty() {
        MountedVolumes::new(config.mount_roots.clone(), Vec::new())
    } else {
        MountedVolumes::new(Vec::new(), devices)
    };
    let resolver = CaptureDateResolver::new(ExifToolReader);

    println!("Archiving into {}", config.archive_root.display());

    let report = {
        let pipeline = TransferPipeline::new(
            &catalog,
            &access,
            &resolver,
            config.archive_root.clone(),
            config.scratch_root.clone(),
        )
        .with_options(config.pipeline_options(dry_run));
        pipeline.run(parallel)?
    };
    catalog.close()?;

    print_run_report(&report);

    if !report.is_clean() {
        anyhow::bail!("Sync finished with {} problem file(s); see above", report.total_failures());
    }
    Ok(())
}

fn print_run_report(report: &RunReport) {
    println!();
    if report.devices.is_empty() {
        println!("No devices connected.");
        return;
    }

    for device in &report.devices {
        println!("{}", device.device);
        println!("  Folder:       {}", device.local_path.as_deref().unwrap_or("-"));
        println!("  Status:       {:?}", device.status);

        match device.status {
            DeviceStatus::Ignored => continue,
            DeviceStatus::DryRun => {
                println!("  Would copy:   {}", device.planned.len());
                for planned in &device.planned {
                    println!("    {} ({} bytes)", planned.remote_path, planned.size);
                }
                continue;
            }
            _ => {}
        }

        println!("  New files:    {}", device.new_files);
        println!("  Copied:       {} ({} bytes)", device.copied, device.bytes);
        if let Some(reason) = &device.aborted {
            println!("  Aborted:      {}", reason);
        }
        if !device.metadata_fallbacks.is_empty() {
            println!("  No capture date in metadata ({}):", device.metadata_fallbacks.len());
            for path in &device.metadata_fallbacks {
                println!("    {}", path);
            }
        }
        for failure in &device.failures {
            match &failure.staged_path {
                Some(staged) => println!("  FAILED {}: {} (staged copy: {})", failure.remote_path, failure.error, staged.display()),
                None => println!("  FAILED {}: {}", failure.remote_path, failure.error),
            }
        }
        for inconsistency in &device.inconsistencies {
            println!(
                "  NOT CATALOGUED {} -> {}: {}",
                inconsistency.remote_path,
                inconsistency.placed_path.display(),
                inconsistency.error
            );
        }
    }

    println!();
    println!(
        "Total: {} file(s), {} bytes copied, {} problem(s)",
        report.total_copied(),
        report.total_bytes(),
        report.total_failures()
    );
}

fn cmd_devices(config: &SyncConfig) -> Result<()> {
    let catalog = open_catalog(config)?;
    let devices = catalog.list_devices()?;

    if devices.is_empty() {
        println!("No devices catalogued yet. Use 'imagesort sync' to add some.");
        return Ok(());
    }

    println!("{:<20}  {:<24}  {:>7}  {:<6}  {}", "Device", "Serial", "Files", "Ignore", "Folder");
    println!("{}", "-".repeat(80));

    for device in &devices {
        let files = catalog.entry_count(Some(device.id))?;
        println!("{:<20}  {:<24}  {:>7}  {:<6}  {}",
            device.device_id,
            device.serial,
            files,
            if device.ignore { "yes" } else { "" },
            device.local_path
        );
    }

    catalog.close()?;
    Ok(())
}

fn cmd_ignore(config: &SyncConfig, device_id: &str, serial: &str, ignore: bool) -> Result<()> {
    let catalog = open_catalog(config)?;
    catalog.set_device_ignored(device_id, serial, ignore)?;
    catalog.close()?;

    if ignore {
        println!("{}/{} will be skipped", device_id, serial);
    } else {
        println!("{}/{} will be synced again", device_id, serial);
    }
    Ok(())
}

fn cmd_verify(config: &SyncConfig, filters: &[String]) -> Result<()> {
    let catalog = open_catalog(config)?;

    let selected: Vec<_> = if filters.is_empty() {
        Vec::new()
    } else {
        let matched: Vec<_> = catalog.list_devices()?
            .into_iter()
            .filter(|d| filters.iter().any(|f| *f == d.device_id || *f == d.local_path))
            .collect();
        if matched.is_empty() {
            anyhow::bail!("No catalogued device matches {:?}", filters);
        }
        matched
    };

    let report = verify_archive(&catalog, &config.archive_root, &selected)?;
    catalog.close()?;

    for issue in &report.issues {
        let what = match &issue.problem {
            VerifyProblem::Missing => "missing".to_string(),
            VerifyProblem::SizeMismatch { expected, actual } => format!("size {} (catalog says {})", actual, expected),
            VerifyProblem::DigestMismatch => "content changed".to_string(),
            VerifyProblem::Unreadable(e) => format!("unreadable: {}", e),
        };
        println!("  {}: {}", issue.path_local, what);
    }

    println!("Checked {} file(s), {} problem(s)", report.checked, report.issues.len());
    if !report.is_clean() {
        anyhow::bail!("Archive does not match the catalog");
    }
    Ok(())
}
