//! `SQLite` persistence for player state.
//!
//! Each [`PlayerState`] is serialised to JSON and stored in one row:
//!
//! ```sql
//! CREATE TABLE IF NOT EXISTS players (
//!     player_id  TEXT PRIMARY KEY,
//!     data       BLOB NOT NULL,
//!     version    INTEGER NOT NULL,
//!     updated_at TEXT NOT NULL,
//!     checksum   TEXT
//! );
//! ```
//!
//! - WAL mode for concurrent readers.
//! - JSON inside a BLOB keeps the schema stable as `PlayerState` grows.
//! - `version` backs the compare-and-swap in [`PlayerRepository::save`];
//!   the check and the write share one `IMMEDIATE` transaction.
//! - Optional CRC-32 checksum detects save corruption.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use chrono::Utc;
use parking_lot::Mutex;
use rusqlite::types::ValueRef;
use rusqlite::{Connection, OpenFlags, OptionalExtension, TransactionBehavior, params};
use tracing::{debug, info, warn};

use crate::config::{PersistenceBackend, PersistenceConfig, RetryConfig};
use crate::player::PlayerState;
use crate::repository::{InMemoryRepository, PlayerRepository, RepositoryError, RetryingRepository};
use crate::types::PlayerId;

const SCHEMA: &str = "CREATE TABLE IF NOT EXISTS players (
    player_id  TEXT PRIMARY KEY,
    data       BLOB NOT NULL,
    version    INTEGER NOT NULL,
    updated_at TEXT NOT NULL,
    checksum   TEXT
);";

// ---------------------------------------------------------------------------
// CRC-32 checksum helper
// ---------------------------------------------------------------------------

/// CRC-32 of `data` as lowercase hex.
fn crc32_hex(data: &[u8]) -> String {
    format!("{:08x}", crc32_compute(data))
}

/// Basic CRC-32 (ISO 3309 / ITU-T V.42) computation.
fn crc32_compute(data: &[u8]) -> u32 {
    const POLY: u32 = 0xEDB8_8320;
    let mut crc: u32 = 0xFFFF_FFFF;
    for &byte in data {
        crc ^= u32::from(byte);
        for _ in 0..8 {
            if crc & 1 == 1 {
                crc = (crc >> 1) ^ POLY;
            } else {
                crc >>= 1;
            }
        }
    }
    !crc
}

// ---------------------------------------------------------------------------
// SqliteRepository
// ---------------------------------------------------------------------------

/// Player repository backed by an `SQLite` database.
///
/// ```no_run
/// # use rewardz_core::persistence::SqliteRepository;
/// # use rewardz_core::config::PersistenceConfig;
/// # use rewardz_core::repository::PlayerRepository;
/// # use rewardz_core::types::PlayerId;
/// let repo = SqliteRepository::open("players.db", &PersistenceConfig::default())?;
/// let mut player = repo.get(&PlayerId::from("user_1"))?;
/// player.credit(10);
/// repo.save(&player)?;
/// # Ok::<(), rewardz_core::repository::RepositoryError>(())
/// ```
pub struct SqliteRepository {
    conn: Mutex<Connection>,
    config: PersistenceConfig,
    db_path: PathBuf,
}

impl std::fmt::Debug for SqliteRepository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteRepository")
            .field("db_path", &self.db_path)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl SqliteRepository {
    /// Open (or create) a database at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`RepositoryError::Database`] on `SQLite` failures.
    pub fn open<P: AsRef<Path>>(
        path: P,
        config: &PersistenceConfig,
    ) -> Result<Self, RepositoryError> {
        let db_path = path.as_ref().to_path_buf();
        let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
            | OpenFlags::SQLITE_OPEN_CREATE
            | OpenFlags::SQLITE_OPEN_NO_MUTEX;

        let conn = Connection::open_with_flags(&db_path, flags)?;

        if config.wal_mode {
            conn.execute_batch("PRAGMA journal_mode = WAL;")?;
        }
        conn.execute_batch("PRAGMA synchronous = NORMAL;")?;
        conn.busy_timeout(Duration::from_millis(config.busy_timeout_ms))?;
        conn.execute_batch(SCHEMA)?;

        info!(
            path = %db_path.display(),
            wal = config.wal_mode,
            "Player repository opened"
        );

        Ok(Self {
            conn: Mutex::new(conn),
            config: config.clone(),
            db_path,
        })
    }

    /// Open an in-memory database (useful for tests).
    ///
    /// # Errors
    ///
    /// Returns [`RepositoryError::Database`] on `SQLite` failures.
    pub fn open_in_memory(config: &PersistenceConfig) -> Result<Self, RepositoryError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;

        Ok(Self {
            conn: Mutex::new(conn),
            config: config.clone(),
            db_path: PathBuf::from(":memory:"),
        })
    }

    // ------------------------------------------------------------------
    // Core CRUD
    // ------------------------------------------------------------------

    /// Load a stored player; `None` if the player has never been saved.
    ///
    /// The row's `version` column is authoritative. A checksum mismatch is
    /// logged but the data is still returned.
    ///
    /// # Errors
    ///
    /// Returns [`RepositoryError::Corrupt`] if the JSON cannot be decoded,
    /// or [`RepositoryError::Database`] on `SQLite` failures.
    pub fn load_player(&self, id: &PlayerId) -> Result<Option<PlayerState>, RepositoryError> {
        let start = Instant::now();
        let conn = self.conn.lock();

        let mut stmt = conn
            .prepare_cached("SELECT data, version, checksum FROM players WHERE player_id = ?1")?;
        let row: Option<(Option<Vec<u8>>, i64, Option<String>)> = stmt
            .query_row(params![id.as_str()], |row| {
                // Rows written outside this process may hold TEXT.
                let data = match row.get_ref(0)? {
                    ValueRef::Blob(bytes) | ValueRef::Text(bytes) => Some(bytes.to_vec()),
                    _ => None,
                };
                Ok((data, row.get(1)?, row.get(2)?))
            })
            .optional()?;

        let Some((data, version, stored_checksum)) = row else {
            return Ok(None);
        };
        let data = data.ok_or_else(|| RepositoryError::Corrupt {
            player: id.clone(),
            reason: "data column is neither BLOB nor TEXT".to_string(),
        })?;

        if self.config.checksum_enabled {
            if let Some(ref expected) = stored_checksum {
                let actual = crc32_hex(&data);
                if *expected != actual {
                    warn!(
                        player = %id,
                        expected = %expected,
                        actual = %actual,
                        "Checksum mismatch, possible save corruption"
                    );
                }
            }
        }

        let mut player: PlayerState =
            serde_json::from_slice(&data).map_err(|e| RepositoryError::Corrupt {
                player: id.clone(),
                reason: e.to_string(),
            })?;
        player.version = u64::try_from(version).unwrap_or_default();

        debug!(
            player = %id,
            version = player.version,
            bytes = data.len(),
            elapsed_us = start.elapsed().as_micros(),
            "Loaded player"
        );

        Ok(Some(player))
    }

    /// Delete a stored player. Returns `true` if a row was removed.
    ///
    /// # Errors
    ///
    /// Returns [`RepositoryError::Database`] on `SQLite` failures.
    pub fn delete_player(&self, id: &PlayerId) -> Result<bool, RepositoryError> {
        let deleted = self
            .conn
            .lock()
            .execute("DELETE FROM players WHERE player_id = ?1", params![id.as_str()])?;
        Ok(deleted > 0)
    }

    /// All stored player ids.
    ///
    /// # Errors
    ///
    /// Returns [`RepositoryError::Database`] on `SQLite` failures.
    pub fn list_players(&self) -> Result<Vec<PlayerId>, RepositoryError> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare_cached("SELECT player_id FROM players ORDER BY player_id")?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
        let mut players = Vec::new();
        for row in rows {
            players.push(PlayerId(row?));
        }
        Ok(players)
    }

    /// Number of stored players.
    ///
    /// # Errors
    ///
    /// Returns [`RepositoryError::Database`] on `SQLite` failures.
    pub fn player_count(&self) -> Result<usize, RepositoryError> {
        let count: i64 = self
            .conn
            .lock()
            .query_row("SELECT COUNT(*) FROM players", [], |row| row.get(0))?;
        Ok(usize::try_from(count).unwrap_or_default())
    }

    // ------------------------------------------------------------------
    // Maintenance
    // ------------------------------------------------------------------

    /// Copy the database to `dest_path` with `SQLite`'s online-backup API.
    ///
    /// # Errors
    ///
    /// Returns [`RepositoryError::Database`] on `SQLite` failures.
    pub fn backup<P: AsRef<Path>>(&self, dest_path: P) -> Result<(), RepositoryError> {
        let start = Instant::now();
        let conn = self.conn.lock();
        let mut dest = Connection::open(dest_path.as_ref())?;
        let backup = rusqlite::backup::Backup::new(&conn, &mut dest)?;
        backup.run_to_completion(256, Duration::from_millis(50), None)?;

        info!(
            dest = %dest_path.as_ref().display(),
            elapsed_ms = start.elapsed().as_millis(),
            "Database backup completed"
        );
        Ok(())
    }

    /// Run `PRAGMA integrity_check`; `Ok(false)` means corruption.
    ///
    /// # Errors
    ///
    /// Returns [`RepositoryError::Database`] if the check itself fails.
    pub fn integrity_check(&self) -> Result<bool, RepositoryError> {
        let result: String = self
            .conn
            .lock()
            .query_row("PRAGMA integrity_check", [], |row| row.get(0))?;
        Ok(result == "ok")
    }

    /// Path to the database file (or `:memory:`).
    #[must_use]
    pub fn db_path(&self) -> &Path {
        &self.db_path
    }
}

impl PlayerRepository for SqliteRepository {
    fn get(&self, id: &PlayerId) -> Result<PlayerState, RepositoryError> {
        match self.load_player(id)? {
            Some(player) => Ok(player),
            None => {
                debug!(player = %id, "Player not found, starting fresh");
                Ok(PlayerState::new(id.clone()))
            }
        }
    }

    fn save(&self, player: &PlayerState) -> Result<(), RepositoryError> {
        let start = Instant::now();

        let mut stored = player.clone();
        stored.version = player.version + 1;
        let json =
            serde_json::to_vec(&stored).map_err(|e| RepositoryError::Serialization(e.to_string()))?;
        let checksum = self.config.checksum_enabled.then(|| crc32_hex(&json));
        let now = Utc::now().to_rfc3339();
        let expected = i64::try_from(player.version)
            .map_err(|e| RepositoryError::Serialization(e.to_string()))?;

        let mut conn = self.conn.lock();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let found: Option<i64> = tx
            .query_row(
                "SELECT version FROM players WHERE player_id = ?1",
                params![player.id.as_str()],
                |row| row.get(0),
            )
            .optional()?;
        let found = found.unwrap_or(0);
        if found != expected {
            return Err(RepositoryError::Conflict {
                player: player.id.clone(),
                expected: player.version,
                found: u64::try_from(found).unwrap_or_default(),
            });
        }

        tx.execute(
            "INSERT INTO players (player_id, data, version, updated_at, checksum)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(player_id) DO UPDATE SET
                data = excluded.data,
                version = excluded.version,
                updated_at = excluded.updated_at,
                checksum = excluded.checksum",
            params![player.id.as_str(), json, expected + 1, now, checksum],
        )?;
        tx.commit()?;

        debug!(
            player = %player.id,
            version = stored.version,
            bytes = json.len(),
            elapsed_us = start.elapsed().as_micros(),
            "Saved player"
        );
        Ok(())
    }
}

/// Open the repository selected by `config`, wrapped with `retry`.
///
/// # Errors
///
/// Returns [`RepositoryError::Database`] if the `SQLite` backend cannot be
/// opened.
pub fn open_repository(
    config: &PersistenceConfig,
    retry: &RetryConfig,
) -> Result<RetryingRepository<Box<dyn PlayerRepository>>, RepositoryError> {
    let inner: Box<dyn PlayerRepository> = match config.backend {
        PersistenceBackend::Sqlite => Box::new(SqliteRepository::open(&config.db_path, config)?),
        PersistenceBackend::Memory => Box::new(InMemoryRepository::new()),
    };
    Ok(RetryingRepository::new(inner, retry.clone()))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> PersistenceConfig {
        PersistenceConfig {
            checksum_enabled: true,
            ..PersistenceConfig::default()
        }
    }

    fn sample_player(id: &str) -> PlayerState {
        let mut player = PlayerState::new(PlayerId::from(id));
        player.add_item("ancient_scroll");
        player.add_item("ancient_scroll");
        player.grant_title("Archivist");
        player.complete_quest("collect_scrolls");
        player.credit(25);
        player.record_event("evt-1", 8);
        player
    }

    #[test]
    fn round_trip_save_load() {
        let repo = SqliteRepository::open_in_memory(&test_config()).expect("open");
        let player = sample_player("user_1");

        repo.save(&player).expect("save");
        let loaded = repo.get(&player.id).expect("load");

        assert_eq!(loaded.item_count("ancient_scroll"), 2);
        assert_eq!(loaded.titles, player.titles);
        assert_eq!(loaded.completed_quests, player.completed_quests);
        assert_eq!(loaded.currency, 25);
        assert!(loaded.has_processed("evt-1"));
        assert_eq!(loaded.version, 1);
    }

    #[test]
    fn load_nonexistent_returns_default() {
        let repo = SqliteRepository::open_in_memory(&test_config()).expect("open");
        let id = PlayerId::from("nobody");
        assert!(repo.load_player(&id).expect("load").is_none());
        assert_eq!(repo.get(&id).expect("get"), PlayerState::new(id));
    }

    #[test]
    fn sequential_saves_advance_version() {
        let repo = SqliteRepository::open_in_memory(&test_config()).expect("open");
        let id = PlayerId::from("user_1");

        for expected in 1..=3 {
            let mut player = repo.get(&id).expect("get");
            player.credit(1);
            repo.save(&player).expect("save");
            assert_eq!(repo.get(&id).expect("get").version, expected);
        }
        assert_eq!(repo.get(&id).expect("get").currency, 3);
    }

    #[test]
    fn stale_write_is_rejected() {
        let repo = SqliteRepository::open_in_memory(&test_config()).expect("open");
        let id = PlayerId::from("user_1");
        let mut a = repo.get(&id).expect("get");
        let mut b = repo.get(&id).expect("get");

        a.credit(10);
        repo.save(&a).expect("first writer");
        b.credit(99);
        let err = repo.save(&b).expect_err("second writer");
        assert!(matches!(err, RepositoryError::Conflict { expected: 0, found: 1, .. }));
        assert_eq!(repo.get(&id).expect("get").currency, 10);
    }

    #[test]
    fn delete_list_and_count() {
        let repo = SqliteRepository::open_in_memory(&test_config()).expect("open");
        for id in ["b", "a", "c"] {
            repo.save(&sample_player(id)).expect("save");
        }
        assert_eq!(repo.player_count().expect("count"), 3);
        assert_eq!(
            repo.list_players().expect("list"),
            vec![PlayerId::from("a"), PlayerId::from("b"), PlayerId::from("c")]
        );
        assert!(repo.delete_player(&PlayerId::from("a")).expect("delete"));
        assert!(!repo.delete_player(&PlayerId::from("a")).expect("delete again"));
        assert_eq!(repo.player_count().expect("count"), 2);
    }

    #[test]
    fn corrupt_document_is_reported() {
        let repo = SqliteRepository::open_in_memory(&test_config()).expect("open");
        repo.conn
            .lock()
            .execute(
                "INSERT INTO players (player_id, data, version, updated_at) VALUES ('x', 'not json', 1, 'now')",
                [],
            )
            .expect("insert");
        let err = repo.get(&PlayerId::from("x")).expect_err("corrupt");
        assert!(matches!(err, RepositoryError::Corrupt { .. }));
        assert!(!err.is_transient());
    }

    #[test]
    fn text_document_loads_and_wrong_type_is_corrupt() {
        let repo = SqliteRepository::open_in_memory(&test_config()).expect("open");
        let json = serde_json::to_string(&sample_player("t")).expect("json");
        {
            let conn = repo.conn.lock();
            conn.execute(
                "INSERT INTO players (player_id, data, version, updated_at) VALUES ('t', ?1, 3, 'now')",
                params![json],
            )
            .expect("insert text");
            conn.execute(
                "INSERT INTO players (player_id, data, version, updated_at) VALUES ('n', 42, 1, 'now')",
                [],
            )
            .expect("insert integer");
        }

        let loaded = repo.get(&PlayerId::from("t")).expect("text row loads");
        assert_eq!(loaded.version, 3);

        let err = repo.get(&PlayerId::from("n")).expect_err("integer row");
        assert!(matches!(err, RepositoryError::Corrupt { .. }));
    }

    #[test]
    fn checksum_mismatch_still_loads() {
        let repo = SqliteRepository::open_in_memory(&test_config()).expect("open");
        let player = sample_player("user_1");
        repo.save(&player).expect("save");
        repo.conn
            .lock()
            .execute(
                "UPDATE players SET checksum = 'deadbeef' WHERE player_id = ?1",
                params![player.id.as_str()],
            )
            .expect("corrupt checksum");

        let loaded = repo.get(&player.id).expect("load");
        assert_eq!(loaded.currency, 25);
    }

    #[test]
    fn file_based_open_and_backup() {
        let dir = tempfile::tempdir().expect("tempdir");
        let db_path = dir.path().join("players.db");
        let config = test_config();

        let repo = SqliteRepository::open(&db_path, &config).expect("open");
        let player = sample_player("user_1");
        repo.save(&player).expect("save");
        assert!(repo.integrity_check().expect("check"));

        let backup_path = dir.path().join("players_backup.db");
        repo.backup(&backup_path).expect("backup");

        let restored = SqliteRepository::open(&backup_path, &config).expect("open backup");
        assert_eq!(restored.get(&player.id).expect("load").currency, 25);
    }

    #[test]
    fn open_repository_honours_backend() {
        let config = PersistenceConfig {
            backend: PersistenceBackend::Memory,
            ..PersistenceConfig::default()
        };
        let repo = open_repository(&config, &RetryConfig::default()).expect("open");
        let id = PlayerId::from("p");
        let player = repo.get(&id).expect("get");
        repo.save(&player).expect("save");
        assert_eq!(repo.get(&id).expect("get").version, 1);
    }

    #[test]
    fn crc32_basic() {
        // Known test vector: CRC-32 of "123456789" = 0xCBF43926
        assert_eq!(crc32_compute(b"123456789"), 0xCBF4_3926);
    }
}
