//! DuckDB persistence for the local mirror.
//!
//! One row per torrent. The full record is kept as JSON next to a few
//! columns used for ordering and inspection.

use crate::error::{StoreError, StoreResult};
use crate::persistence::TorrentPersistence;
use chrono::{SecondsFormat, Utc};
use debridmirror_types::CanonicalTorrent;
use duckdb::{Connection, params};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, warn};

// The mirror is a few thousand small rows; keep DuckDB from sizing itself
// to the machine.
const MEMORY_LIMIT: &str = "64MB";
const THREADS: u32 = 1;

const INSERT_SQL: &str =
    "INSERT INTO torrents (id, service, hash, added_at, data_json) VALUES (?, ?, ?, ?, ?)";

/// Persists mirrored torrents in a DuckDB file.
#[derive(Clone)]
pub struct DuckDbPersistence {
    conn: Arc<Mutex<Connection>>,
}

impl DuckDbPersistence {
    /// Opens or creates a store at the given path.
    ///
    /// A write-ahead log left by a crash can make the file unopenable. In
    /// that case the log is discarded and the open is tried once more; the
    /// rows it held are rewritten by the next reconcile.
    pub fn open(path: &Path) -> StoreResult<Self> {
        let conn = match Connection::open(path) {
            Ok(conn) => conn,
            Err(e) => {
                let wal = wal_path(path);
                if !wal.exists() {
                    return Err(e.into());
                }
                warn!("cannot open {} ({e}), discarding {}", path.display(), wal.display());
                std::fs::remove_file(&wal).map_err(|io| {
                    StoreError::Persistence(format!("cannot remove {}: {io}", wal.display()))
                })?;
                Connection::open(path)?
            }
        };
        conn.execute_batch(&format!(
            "SET memory_limit = '{MEMORY_LIMIT}'; SET threads = {THREADS};"
        ))?;
        initialize_schema(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Opens an in-memory store (for testing).
    pub fn open_in_memory() -> StoreResult<Self> {
        let conn = Connection::open_in_memory()?;
        initialize_schema(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn lock(&self) -> StoreResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| StoreError::Persistence("database lock poisoned".into()))
    }

    /// Number of persisted rows.
    pub fn count(&self) -> StoreResult<usize> {
        let conn = self.lock()?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM torrents", [], |row| row.get(0))?;
        Ok(count as usize)
    }
}

impl TorrentPersistence for DuckDbPersistence {
    fn load_all(&self) -> StoreResult<Vec<CanonicalTorrent>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare("SELECT id, data_json FROM torrents ORDER BY added_at DESC, id")?;
        let rows = stmt.query_map([], |row| {
            let id: String = row.get(0)?;
            let data: String = row.get(1)?;
            Ok((id, data))
        })?;

        let mut torrents = Vec::new();
        for row in rows {
            let (id, data) = row?;
            match serde_json::from_str::<CanonicalTorrent>(&data) {
                Ok(torrent) => torrents.push(torrent),
                // Dropped from the snapshot, so the next reconcile rewrites it.
                Err(e) => warn!("skipping unreadable row {id}: {e}"),
            }
        }
        Ok(torrents)
    }

    fn apply_changes(&self, upserted: &[CanonicalTorrent], removed: &[String]) -> StoreResult<()> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        {
            // Ids stay unique because every upsert deletes its old row first.
            let mut delete = tx.prepare("DELETE FROM torrents WHERE id = ?")?;
            for id in removed {
                delete.execute(params![id])?;
            }
            for torrent in upserted {
                delete.execute(params![torrent.id])?;
            }
            let mut insert = tx.prepare(INSERT_SQL)?;
            for torrent in upserted {
                insert_row(&mut insert, torrent)?;
            }
        }
        tx.commit()?;
        debug!("applied {} upserts and {} removals", upserted.len(), removed.len());
        Ok(())
    }

    fn replace_all(&self, torrents: &[CanonicalTorrent]) -> StoreResult<()> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        {
            tx.execute("DELETE FROM torrents", [])?;
            let mut insert = tx.prepare(INSERT_SQL)?;
            for torrent in torrents {
                insert_row(&mut insert, torrent)?;
            }
        }
        tx.commit()?;
        debug!("replaced store with {} rows", torrents.len());
        Ok(())
    }
}

fn insert_row(stmt: &mut duckdb::Statement<'_>, torrent: &CanonicalTorrent) -> StoreResult<()> {
    let data = serde_json::to_string(torrent)?;
    let service = torrent.service().map(|s| s.as_str()).unwrap_or("unknown");
    stmt.execute(params![
        torrent.id,
        service,
        torrent.hash,
        torrent
            .added_at
            .with_timezone(&Utc)
            .to_rfc3339_opts(SecondsFormat::Micros, true),
        data,
    ])?;
    Ok(())
}

/// `mirror.duckdb` logs to `mirror.duckdb.wal`.
fn wal_path(path: &Path) -> PathBuf {
    let mut wal = path.as_os_str().to_owned();
    wal.push(".wal");
    PathBuf::from(wal)
}

fn initialize_schema(conn: &Connection) -> StoreResult<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS torrents (
            id VARCHAR NOT NULL,
            service VARCHAR NOT NULL,
            hash VARCHAR NOT NULL,
            added_at VARCHAR NOT NULL,
            data_json TEXT NOT NULL
        );
        "#,
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wal_sits_next_to_the_database() {
        assert_eq!(
            wal_path(Path::new("/data/mirror.duckdb")),
            PathBuf::from("/data/mirror.duckdb.wal")
        );
        assert_eq!(wal_path(Path::new("mirror")), PathBuf::from("mirror.wal"));
    }
}
