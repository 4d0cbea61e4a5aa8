use rusqlite::{Connection, Row, params};

use crate::model::{Entry, Reading, StorageError, Trend};

pub struct SqliteStorage {
    conn: Connection,
}

impl SqliteStorage {
    /// Opens the cache database, creating the schema if needed.
    pub fn new(db_path: &str) -> Result<Self, StorageError> {
        let conn = Connection::open(db_path)?;
        Self::init_schema(&conn)?;
        Ok(Self { conn })
    }

    #[cfg(test)]
    pub fn open_in_memory() -> Result<Self, StorageError> {
        let conn = Connection::open_in_memory()?;
        Self::init_schema(&conn)?;
        Ok(Self { conn })
    }

    fn init_schema(conn: &Connection) -> Result<(), StorageError> {
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS readings (
                id TEXT PRIMARY KEY,
                sgv INTEGER,
                date_ms INTEGER,
                date_string TEXT,
                trend INTEGER,
                direction TEXT,
                device TEXT
            );

            CREATE INDEX IF NOT EXISTS idx_readings_date_ms ON readings(date_ms);
            ",
        )?;
        Ok(())
    }

    /// Inserts a raw entry unless one with the same id is already cached.
    /// Returns true when a row was actually added.
    pub fn insert_entry(&self, entry: &Entry) -> Result<bool, StorageError> {
        let changed = self.conn.execute(
            "INSERT OR IGNORE INTO readings (id, sgv, date_ms, date_string, trend, direction, device)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                &entry.id,
                &entry.sgv,
                &entry.date,
                &entry.date_string,
                &entry.trend,
                &entry.direction,
                &entry.device,
            ],
        )?;
        Ok(changed > 0)
    }

    /// Readings at or after `cutoff_ms`, oldest first. Rows with zero or
    /// missing glucose are excluded.
    pub fn readings_since(&self, cutoff_ms: i64) -> Result<Vec<Reading>, StorageError> {
        let mut stmt = self.conn.prepare(
            "SELECT sgv, date_ms, direction FROM readings
             WHERE date_ms >= ?1 AND sgv > 0 ORDER BY date_ms ASC",
        )?;

        let rows = stmt.query_map(params![cutoff_ms], Self::map_reading)?;
        let mut readings = Vec::new();
        for reading in rows {
            readings.push(reading?);
        }
        Ok(readings)
    }

    /// Readings within `[start_ms, end_ms)`, oldest first.
    pub fn readings_between(
        &self,
        start_ms: i64,
        end_ms: i64,
    ) -> Result<Vec<Reading>, StorageError> {
        let mut stmt = self.conn.prepare(
            "SELECT sgv, date_ms, direction FROM readings
             WHERE date_ms >= ?1 AND date_ms < ?2 AND sgv > 0 ORDER BY date_ms ASC",
        )?;

        let rows = stmt.query_map(params![start_ms, end_ms], Self::map_reading)?;
        let mut readings = Vec::new();
        for reading in rows {
            readings.push(reading?);
        }
        Ok(readings)
    }

    /// Total number of cached rows, including non-glucose ones.
    pub fn count_readings(&self) -> Result<i64, StorageError> {
        let count = self
            .conn
            .query_row("SELECT COUNT(*) FROM readings", [], |row| row.get(0))?;
        Ok(count)
    }

    fn map_reading(row: &Row) -> Result<Reading, rusqlite::Error> {
        let sgv: i32 = row.get(0)?;
        let date_ms: i64 = row.get(1)?;
        let direction: Option<String> = row.get(2)?;

        let timestamp = chrono::DateTime::from_timestamp_millis(date_ms)
            .ok_or(rusqlite::Error::IntegralValueOutOfRange(1, date_ms))?;

        Ok(Reading {
            timestamp,
            glucose_mg_dl: sgv,
            trend: Trend::from_direction(direction.as_deref()),
        })
    }
}
