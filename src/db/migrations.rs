// Catalog migrations
// Migrations are forward-only. Never edit or delete a migration after it ships.

use rusqlite::Connection;
use anyhow::Result;

/// All migrations in order. Each migration is a SQL string.
const MIGRATIONS: &[&str] = &[
    // Migration 1: Initial catalog
    r#"
    -- Known devices. id is the row key files point at.
    CREATE TABLE device (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        device_id TEXT NOT NULL,
        serial TEXT NOT NULL,
        name TEXT NOT NULL,
        local_path TEXT NOT NULL UNIQUE,
        added TEXT NOT NULL DEFAULT (datetime('now', 'localtime')),
        "ignore" INTEGER NOT NULL DEFAULT 0 CHECK ("ignore" IN (0, 1)),
        UNIQUE (device_id, serial)
    );

    -- Archived files. One row per device file, ever.
    CREATE TABLE file (
        device_rowid INTEGER NOT NULL REFERENCES device(id),
        path_camera TEXT NOT NULL,
        path_local TEXT NOT NULL UNIQUE,
        sha256sum TEXT NOT NULL,
        size INTEGER NOT NULL,
        created TEXT NOT NULL,
        PRIMARY KEY (device_rowid, path_camera)
    );

    -- Catalog-wide settings (digest algorithm)
    CREATE TABLE catalog_meta (
        key TEXT PRIMARY KEY,
        value TEXT NOT NULL
    );

    CREATE INDEX idx_file_sha256sum ON file(sha256sum);
    CREATE INDEX idx_file_created ON file(created);
    "#,
];

/// Get current schema version from database
fn get_schema_version(conn: &Connection) -> Result<u32> {
    let version: u32 = conn.query_row(
        "PRAGMA user_version",
        [],
        |row| row.get(0)
    )?;
    Ok(version)
}

/// Run all pending migrations. Each one commits together with its version bump.
pub fn run_migrations(conn: &Connection) -> Result<()> {
    let current_version = get_schema_version(conn)?;
    let target_version = MIGRATIONS.len() as u32;

    // Refuse to open a catalog created by a newer build
    if current_version > target_version {
        anyhow::bail!(
            "Catalog schema version {} is newer than this build supports (max {}). Please upgrade ImageSort.",
            current_version,
            target_version
        );
    }

    if current_version == target_version {
        return Ok(());
    }

    for (i, migration) in MIGRATIONS.iter().enumerate() {
        let migration_version = (i + 1) as u32;
        if migration_version <= current_version {
            continue;
        }

        conn.execute_batch(&format!(
            "BEGIN IMMEDIATE;\n{}\nPRAGMA user_version = {};\nCOMMIT;",
            migration, migration_version
        ))?;

        log::info!("Applied catalog migration {}", migration_version);
    }

    Ok(())
}
