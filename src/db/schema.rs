// Catalog row types and queries

use chrono::NaiveDateTime;
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};

use crate::constants::CATALOG_TIMESTAMP_FORMAT;
use crate::error::{ImageSortError, Result};

// ----- Devices -----

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceRecord {
    pub id: i64,
    pub device_id: String,
    pub serial: String,
    pub name: String,
    pub local_path: String,
    pub added: String,
    pub ignore: bool,
}

#[derive(Debug, Clone)]
pub struct NewDevice {
    pub device_id: String,
    pub serial: String,
    pub name: String,
    pub local_path: String,
}

const DEVICE_COLUMNS: &str = r#"id, device_id, serial, name, local_path, added, "ignore""#;

fn map_device(row: &rusqlite::Row) -> rusqlite::Result<DeviceRecord> {
    Ok(DeviceRecord {
        id: row.get(0)?,
        device_id: row.get(1)?,
        serial: row.get(2)?,
        name: row.get(3)?,
        local_path: row.get(4)?,
        added: row.get(5)?,
        ignore: row.get::<_, i64>(6)? != 0,
    })
}

pub fn insert_device(conn: &Connection, device: &NewDevice) -> Result<i64> {
    conn.execute(
        "INSERT INTO device (device_id, serial, name, local_path) VALUES (?1, ?2, ?3, ?4)",
        params![device.device_id, device.serial, device.name, device.local_path],
    )
    .map_err(|e| map_constraint(e, || format!(
        "device {}/{} or local path '{}' already registered",
        device.device_id, device.serial, device.local_path
    )))?;
    Ok(conn.last_insert_rowid())
}

pub fn find_device(conn: &Connection, device_id: &str, serial: &str) -> Result<Option<DeviceRecord>> {
    let device = conn.query_row(
        &format!("SELECT {} FROM device WHERE device_id = ?1 AND serial = ?2", DEVICE_COLUMNS),
        params![device_id, serial],
        map_device,
    ).optional()?;
    Ok(device)
}

pub fn get_device(conn: &Connection, id: i64) -> Result<Option<DeviceRecord>> {
    let device = conn.query_row(
        &format!("SELECT {} FROM device WHERE id = ?1", DEVICE_COLUMNS),
        [id],
        map_device,
    ).optional()?;
    Ok(device)
}

pub fn list_devices(conn: &Connection) -> Result<Vec<DeviceRecord>> {
    let mut stmt = conn.prepare(
        &format!("SELECT {} FROM device ORDER BY added, id", DEVICE_COLUMNS)
    )?;
    let devices = stmt.query_map([], map_device)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(devices)
}

/// Whether any device already owns this archive sub-path
pub fn local_path_assigned(conn: &Connection, local_path: &str) -> Result<bool> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM device WHERE local_path = ?1",
        [local_path],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

/// Returns false when no such device is registered
pub fn set_device_ignore(conn: &Connection, device_id: &str, serial: &str, ignore: bool) -> Result<bool> {
    let updated = conn.execute(
        r#"UPDATE device SET "ignore" = ?3 WHERE device_id = ?1 AND serial = ?2"#,
        params![device_id, serial, ignore as i64],
    )?;
    Ok(updated > 0)
}

// ----- Files -----

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogEntry {
    pub device_rowid: i64,
    pub path_camera: String,
    /// Relative to the archive root, '/' separated
    pub path_local: String,
    pub sha256sum: String,
    pub size: i64,
    pub created: NaiveDateTime,
}

const FILE_COLUMNS: &str = "device_rowid, path_camera, path_local, sha256sum, size, created";

fn map_entry(row: &rusqlite::Row) -> rusqlite::Result<CatalogEntry> {
    let created: String = row.get(5)?;
    let created = NaiveDateTime::parse_from_str(&created, CATALOG_TIMESTAMP_FORMAT)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(
            5, rusqlite::types::Type::Text, Box::new(e),
        ))?;
    Ok(CatalogEntry {
        device_rowid: row.get(0)?,
        path_camera: row.get(1)?,
        path_local: row.get(2)?,
        sha256sum: row.get(3)?,
        size: row.get(4)?,
        created,
    })
}

pub fn insert_entry(conn: &Connection, entry: &CatalogEntry) -> Result<()> {
    conn.execute(
        &format!("INSERT INTO file ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6)", FILE_COLUMNS),
        params![
            entry.device_rowid,
            entry.path_camera,
            entry.path_local,
            entry.sha256sum,
            entry.size,
            entry.created.format(CATALOG_TIMESTAMP_FORMAT).to_string(),
        ],
    )
    .map_err(|e| map_constraint(e, || format!(
        "'{}' (device row {}) or local path '{}' already catalogued",
        entry.path_camera, entry.device_rowid, entry.path_local
    )))?;
    Ok(())
}

pub fn has_entry(conn: &Connection, device_id: &str, serial: &str, path_camera: &str) -> Result<bool> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM file f
         JOIN device d ON d.id = f.device_rowid
         WHERE d.device_id = ?1 AND d.serial = ?2 AND f.path_camera = ?3",
        params![device_id, serial, path_camera],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

pub fn list_entries(conn: &Connection, device_rowid: i64) -> Result<Vec<CatalogEntry>> {
    let mut stmt = conn.prepare(
        &format!("SELECT {} FROM file WHERE device_rowid = ?1 ORDER BY created, path_local", FILE_COLUMNS)
    )?;
    let entries = stmt.query_map([device_rowid], map_entry)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(entries)
}

pub fn find_entry_by_local_path(conn: &Connection, path_local: &str) -> Result<Option<CatalogEntry>> {
    let entry = conn.query_row(
        &format!("SELECT {} FROM file WHERE path_local = ?1", FILE_COLUMNS),
        [path_local],
        map_entry,
    ).optional()?;
    Ok(entry)
}

pub fn count_entries(conn: &Connection, device_rowid: Option<i64>) -> Result<i64> {
    let count: i64 = match device_rowid {
        Some(id) => conn.query_row("SELECT COUNT(*) FROM file WHERE device_rowid = ?1", [id], |row| row.get(0))?,
        None => conn.query_row("SELECT COUNT(*) FROM file", [], |row| row.get(0))?,
    };
    Ok(count)
}

// ----- Catalog meta -----

pub fn get_meta(conn: &Connection, key: &str) -> Result<Option<String>> {
    let value = conn.query_row(
        "SELECT value FROM catalog_meta WHERE key = ?1",
        [key],
        |row| row.get(0),
    ).optional()?;
    Ok(value)
}

pub fn set_meta(conn: &Connection, key: &str, value: &str) -> Result<()> {
    conn.execute(
        "INSERT INTO catalog_meta (key, value) VALUES (?1, ?2)
         ON CONFLICT(key) DO UPDATE SET value = excluded.value",
        params![key, value],
    )?;
    Ok(())
}

/// UNIQUE and PRIMARY KEY violations become DuplicateEntry; everything else stays a database error.
fn map_constraint(err: rusqlite::Error, describe: impl FnOnce() -> String) -> ImageSortError {
    if let rusqlite::Error::SqliteFailure(ref failure, _) = err {
        if failure.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
            || failure.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY
        {
            return ImageSortError::DuplicateEntry(describe());
        }
    }
    ImageSortError::Database(err)
}
