// Catalog store: devices and archived files in SQLite

pub mod migrations;
pub mod schema;

use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use rusqlite::{Connection, Transaction, TransactionBehavior};

use crate::constants::{DB_FILENAME, DIGEST_ALGORITHM};
use crate::device::registry;
use crate::error::{ImageSortError, Result};

pub use schema::{CatalogEntry, DeviceRecord};

const META_DIGEST_ALGORITHM: &str = "digest_algorithm";

/// Handle to one catalog database.
///
/// The connection sits behind a mutex so every write runs as a single
/// `BEGIN IMMEDIATE` transaction, one at a time, even when several device
/// batches share the handle. Dropping the handle closes the connection.
pub struct Catalog {
    conn: Mutex<Connection>,
}

impl Catalog {
    /// Open or create a catalog at the given path
    pub fn open(db_path: &Path) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(db_path)?;

        // Enable foreign keys (must be done per connection)
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;

        // WAL keeps readers off the writer's back and survives crashes mid-commit
        conn.execute_batch("PRAGMA journal_mode = WAL;")?;
        conn.execute_batch("PRAGMA synchronous = FULL;")?;

        Self::init(conn)
    }

    /// Open an in-memory catalog (tests, dry runs)
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        Self::init(conn)
    }

    fn init(conn: Connection) -> Result<Self> {
        migrations::run_migrations(&conn)?;

        match schema::get_meta(&conn, META_DIGEST_ALGORITHM)? {
            Some(algorithm) if algorithm != DIGEST_ALGORITHM => {
                return Err(ImageSortError::Catalog(format!(
                    "catalog digests were written with '{}', this build uses '{}'",
                    algorithm, DIGEST_ALGORITHM
                )));
            }
            Some(_) => {}
            None => schema::set_meta(&conn, META_DIGEST_ALGORITHM, DIGEST_ALGORITHM)?,
        }

        Ok(Self { conn: Mutex::new(conn) })
    }

    /// Close the connection now instead of at drop, surfacing any error
    pub fn close(self) -> Result<()> {
        let conn = self.conn.into_inner()
            .map_err(|_| ImageSortError::Catalog("catalog lock poisoned".to_string()))?;
        conn.close().map_err(|(_, e)| ImageSortError::Database(e))
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn.lock()
            .map_err(|_| ImageSortError::Catalog("catalog lock poisoned".to_string()))
    }

    /// Run `f` inside one immediate transaction; commit on Ok, roll back on Err.
    fn write<T>(&self, f: impl FnOnce(&Transaction) -> Result<T>) -> Result<T> {
        let mut conn = self.lock()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let value = f(&tx)?;
        tx.commit()?;
        Ok(value)
    }

    // ----- Devices -----

    /// Register a device, or return the existing record unchanged.
    /// A new device gets a sub-path negotiated against `archive_root` and the catalog.
    pub fn register_device(&self, device_id: &str, serial: &str, name: &str, archive_root: &Path) -> Result<DeviceRecord> {
        self.write(|tx| {
            if let Some(existing) = schema::find_device(tx, device_id, serial)? {
                return Ok(existing);
            }

            let local_path = registry::negotiate_local_path(name, |candidate| {
                Ok(archive_root.join(candidate).exists() || schema::local_path_assigned(tx, candidate)?)
            })?;

            let id = schema::insert_device(tx, &schema::NewDevice {
                device_id: device_id.to_string(),
                serial: serial.to_string(),
                name: name.to_string(),
                local_path,
            })?;

            log::info!("Registered device {}/{} ({})", device_id, serial, name);

            schema::get_device(tx, id)?
                .ok_or_else(|| ImageSortError::Catalog(format!("device row {} vanished after insert", id)))
        })
    }

    pub fn is_known_device(&self, device_id: &str, serial: &str) -> Result<bool> {
        Ok(self.get_device(device_id, serial)?.is_some())
    }

    pub fn get_device(&self, device_id: &str, serial: &str) -> Result<Option<DeviceRecord>> {
        let conn = self.lock()?;
        schema::find_device(&conn, device_id, serial)
    }

    pub fn list_devices(&self) -> Result<Vec<DeviceRecord>> {
        let conn = self.lock()?;
        schema::list_devices(&conn)
    }

    /// Whether `local_path` is already owned by a catalogued device
    pub fn is_local_path_assigned(&self, local_path: &str) -> Result<bool> {
        let conn = self.lock()?;
        schema::local_path_assigned(&conn, local_path)
    }

    pub fn set_device_ignored(&self, device_id: &str, serial: &str, ignore: bool) -> Result<()> {
        let updated = self.write(|tx| schema::set_device_ignore(tx, device_id, serial, ignore))?;
        if !updated {
            return Err(ImageSortError::DeviceNotFound(format!("{}/{}", device_id, serial)));
        }
        Ok(())
    }

    // ----- Files -----

    pub fn has_entry(&self, device_id: &str, serial: &str, remote_path: &str) -> Result<bool> {
        let conn = self.lock()?;
        schema::has_entry(&conn, device_id, serial, remote_path)
    }

    /// Insert one entry. Fails with DuplicateEntry if the device file or the local path is already catalogued.
    pub fn record_entry(&self, entry: &CatalogEntry) -> Result<()> {
        self.write(|tx| schema::insert_entry(tx, entry))
    }

    pub fn list_entries(&self, device_rowid: i64) -> Result<Vec<CatalogEntry>> {
        let conn = self.lock()?;
        schema::list_entries(&conn, device_rowid)
    }

    pub fn find_entry_by_local_path(&self, path_local: &str) -> Result<Option<CatalogEntry>> {
        let conn = self.lock()?;
        schema::find_entry_by_local_path(&conn, path_local)
    }

    pub fn entry_count(&self, device_rowid: Option<i64>) -> Result<i64> {
        let conn = self.lock()?;
        schema::count_entries(&conn, device_rowid)
    }
}

/// Default catalog location inside a data directory
pub fn get_db_path(data_dir: &Path) -> PathBuf {
    data_dir.join(DB_FILENAME)
}
