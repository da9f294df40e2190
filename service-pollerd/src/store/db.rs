use std::path::Path;
use anyhow::{Context, Result};
use chrono::{DateTime, SubsecRound, Utc};
use rusqlite::{ffi, params, Connection, ErrorCode, OptionalExtension};
use shared::types::{NewService, ServiceRecord, ServiceStatus};
use crate::error::{RegistryError, RegistryResult};

const SELECT_COLUMNS: &str = "SELECT url, name, created_at, status FROM service";

/// The `service` table. Runs parameterized queries only; existence and
/// uniqueness rules live in the registry.
pub struct RecordStore {
    conn: Connection,
}

impl RecordStore {
    /// Open or create the SQLite database with WAL mode enabled
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
        }

        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open database: {}", path.display()))?;

        conn.execute_batch("PRAGMA journal_mode=WAL;")
            .context("Failed to enable WAL mode")?;

        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS service (
                url        TEXT NOT NULL CHECK (length(url) > 0),
                name       TEXT NOT NULL PRIMARY KEY CHECK (length(name) > 0),
                created_at INTEGER NOT NULL,
                status     TEXT NOT NULL DEFAULT 'UNKNOWN'
            );
            "#,
        )
        .context("Failed to create database schema")?;

        Ok(Self { conn })
    }

    /// Every record, oldest first
    pub fn get_all(&self) -> rusqlite::Result<Vec<ServiceRecord>> {
        let mut stmt = self
            .conn
            .prepare(&format!("{} ORDER BY created_at, name", SELECT_COLUMNS))?;

        let records = stmt
            .query_map([], Self::row_to_record)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(records)
    }

    pub fn get(&self, name: &str) -> rusqlite::Result<Option<ServiceRecord>> {
        self.conn
            .query_row(
                &format!("{} WHERE name = ?1 LIMIT 1", SELECT_COLUMNS),
                params![name],
                Self::row_to_record,
            )
            .optional()
    }

    /// Insert a fresh record with status `UNKNOWN`. A primary key clash is
    /// reported as `DuplicateName`.
    pub fn insert(&self, service: &NewService) -> RegistryResult<ServiceRecord> {
        // Millisecond precision is all the column keeps
        let created_at = Utc::now().trunc_subsecs(3);

        self.conn
            .execute(
                "INSERT INTO service (url, name, created_at, status) VALUES (?1, ?2, ?3, ?4)",
                params![
                    &service.url,
                    &service.name,
                    created_at.timestamp_millis(),
                    ServiceStatus::Unknown.as_str(),
                ],
            )
            .map_err(|e| translate_conflict(e, &service.name))?;

        Ok(ServiceRecord {
            name: service.name.clone(),
            url: service.url.clone(),
            created_at,
            status: ServiceStatus::Unknown,
        })
    }

    /// Write the status column only. Returns the number of rows touched.
    pub fn set_status(&self, name: &str, status: ServiceStatus) -> rusqlite::Result<usize> {
        self.conn.execute(
            "UPDATE service SET status = ?1 WHERE name = ?2",
            params![status.as_str(), name],
        )
    }

    /// Replace name and url of the addressed row and reset its status.
    /// `created_at` is left alone. Returns the number of rows touched.
    pub fn replace(&self, name: &str, service: &NewService) -> RegistryResult<usize> {
        self.conn
            .execute(
                "UPDATE service SET name = ?1, url = ?2, status = ?3 WHERE name = ?4",
                params![
                    &service.name,
                    &service.url,
                    ServiceStatus::Unknown.as_str(),
                    name,
                ],
            )
            .map_err(|e| translate_conflict(e, &service.name))
    }

    pub fn delete(&self, name: &str) -> rusqlite::Result<usize> {
        self.conn
            .execute("DELETE FROM service WHERE name = ?1", params![name])
    }

    fn row_to_record(row: &rusqlite::Row) -> Result<ServiceRecord, rusqlite::Error> {
        let created_at_ms: i64 = row.get(2)?;
        let status: String = row.get(3)?;

        let created_at = DateTime::from_timestamp_millis(created_at_ms)
            .ok_or(rusqlite::Error::IntegralValueOutOfRange(2, created_at_ms))?;

        Ok(ServiceRecord {
            url: row.get(0)?,
            name: row.get(1)?,
            created_at,
            status: ServiceStatus::parse_or_unknown(&status),
        })
    }
}

fn translate_conflict(err: rusqlite::Error, name: &str) -> RegistryError {
    if is_unique_violation(&err) {
        RegistryError::DuplicateName(name.to_string())
    } else {
        RegistryError::Store(err)
    }
}

fn is_unique_violation(err: &rusqlite::Error) -> bool {
    match err {
        rusqlite::Error::SqliteFailure(e, _) => {
            e.code == ErrorCode::ConstraintViolation
                && (e.extended_code == ffi::SQLITE_CONSTRAINT_PRIMARYKEY
                    || e.extended_code == ffi::SQLITE_CONSTRAINT_UNIQUE)
        }
        _ => false,
    }
}
