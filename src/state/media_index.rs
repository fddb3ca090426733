use rusqlite::{params, Connection, OptionalExtension, Result as SqlResult, Row};
use std::path::{Path, PathBuf};

use crate::error::StorageError;

/// MIME type recorded for every album entry
pub const JPEG_MIME_TYPE: &str = "image/jpeg";

/// One row of the media index
#[derive(Debug, Clone, PartialEq)]
pub struct MediaEntry {
    pub id: i64,
    pub display_name: String,
    /// Folder the file lives in, relative to the media root (e.g., "Pictures/MyAppImages/")
    pub relative_path: String,
    pub mime_type: String,
    /// Milliseconds since the Unix epoch, assigned at insert time
    pub date_added: i64,
    /// True while the file is still being written
    pub is_pending: bool,
}

/// The MediaIndex manages the SQLite table describing saved images.
///
/// It plays the role a platform media store plays on a phone: every
/// image gets a row with its folder, name, type and creation time, and a
/// pending flag that hides the row until its file is fully written.
pub struct MediaIndex {
    conn: Connection,
    db_path: PathBuf,
}

impl MediaIndex {
    /// Open (or create) the index at `db_path`.
    ///
    /// The parent directory is created when missing.
    pub fn open(db_path: &Path) -> Result<Self, StorageError> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(db_path)?;
        log::debug!("media index opened at {}", db_path.display());

        let index = MediaIndex {
            conn,
            db_path: db_path.to_path_buf(),
        };
        index.init_schema()?;

        Ok(index)
    }

    /// Create the media table and its indexes if they don't exist.
    fn init_schema(&self) -> SqlResult<()> {
        // AUTOINCREMENT keeps ids from being reused, so a deleted handle
        // never points at a newer image
        self.conn.execute(
            "CREATE TABLE IF NOT EXISTS media (
                id              INTEGER PRIMARY KEY AUTOINCREMENT,
                display_name    TEXT NOT NULL,
                relative_path   TEXT NOT NULL,
                mime_type       TEXT NOT NULL,
                date_added      INTEGER NOT NULL,
                is_pending      INTEGER NOT NULL DEFAULT 1
            )",
            [],
        )?;

        self.conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_media_folder_date
             ON media(relative_path, date_added DESC)",
            [],
        )?;

        Ok(())
    }

    /// Insert a new row flagged as pending.
    /// Returns the new row id.
    pub fn insert_pending(
        &self,
        display_name: &str,
        relative_path: &str,
        date_added: i64,
    ) -> SqlResult<i64> {
        self.conn.execute(
            "INSERT INTO media (display_name, relative_path, mime_type, date_added, is_pending)
             VALUES (?1, ?2, ?3, ?4, 1)",
            params![display_name, relative_path, JPEG_MIME_TYPE, date_added],
        )?;

        Ok(self.conn.last_insert_rowid())
    }

    /// Clear the pending flag, making the row visible to listings
    pub fn publish(&self, id: i64) -> SqlResult<()> {
        self.conn.execute(
            "UPDATE media SET is_pending = 0 WHERE id = ?1",
            params![id],
        )?;
        Ok(())
    }

    /// Remove a row. Returns false when no such row existed.
    pub fn remove(&self, id: i64) -> SqlResult<bool> {
        let changed = self
            .conn
            .execute("DELETE FROM media WHERE id = ?1", params![id])?;
        Ok(changed > 0)
    }

    /// Look up a row by id inside one folder
    pub fn find(&self, id: i64, relative_path: &str) -> SqlResult<Option<MediaEntry>> {
        self.conn
            .query_row(
                "SELECT id, display_name, relative_path, mime_type, date_added, is_pending
                 FROM media
                 WHERE id = ?1 AND relative_path = ?2",
                params![id, relative_path],
                entry_from_row,
            )
            .optional()
    }

    /// Get every completed row of one folder, newest first
    pub fn list_published(&self, relative_path: &str) -> SqlResult<Vec<MediaEntry>> {
        self.query_folder(relative_path, false)
    }

    /// Get rows of one folder whose write never completed
    pub fn list_pending(&self, relative_path: &str) -> SqlResult<Vec<MediaEntry>> {
        self.query_folder(relative_path, true)
    }

    fn query_folder(&self, relative_path: &str, pending: bool) -> SqlResult<Vec<MediaEntry>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, display_name, relative_path, mime_type, date_added, is_pending
             FROM media
             WHERE relative_path = ?1 AND is_pending = ?2
             ORDER BY date_added DESC, id DESC",
        )?;

        let entry_iter = stmt.query_map(params![relative_path, pending], entry_from_row)?;

        let mut entries = Vec::new();
        for entry in entry_iter {
            entries.push(entry?);
        }

        Ok(entries)
    }

    /// Newest `date_added` of a folder, pending rows included
    pub fn latest_date_added(&self, relative_path: &str) -> SqlResult<Option<i64>> {
        self.conn.query_row(
            "SELECT MAX(date_added) FROM media WHERE relative_path = ?1",
            params![relative_path],
            |row| row.get(0),
        )
    }

    /// Check whether a display name is already used in a folder,
    /// pending rows included
    pub fn name_taken(&self, relative_path: &str, display_name: &str) -> SqlResult<bool> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM media WHERE relative_path = ?1 AND display_name = ?2",
            params![relative_path, display_name],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }
}

fn entry_from_row(row: &Row<'_>) -> SqlResult<MediaEntry> {
    Ok(MediaEntry {
        id: row.get(0)?,
        display_name: row.get(1)?,
        relative_path: row.get(2)?,
        mime_type: row.get(3)?,
        date_added: row.get(4)?,
        is_pending: row.get(5)?,
    })
}

// Implement Debug for better error messages
impl std::fmt::Debug for MediaIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MediaIndex")
            .field("db_path", &self.db_path)
            .finish()
    }
}
