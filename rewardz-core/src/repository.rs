//! Player state repositories.
//!
//! The engine talks to storage only through [`PlayerRepository`]:
//!
//! - `get` never fails on "not found"; it returns a fresh default player.
//! - `save` is a compare-and-swap on [`PlayerState::version`]: it succeeds
//!   only if the stored version still equals the version that was loaded,
//!   and bumps it. A lost race surfaces as [`RepositoryError::Conflict`]
//!   instead of silently overwriting the other writer.
//!
//! [`RetryingRepository`] adds bounded, backed-off retries for transient
//! failures on top of any implementation.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::RetryConfig;
use crate::player::PlayerState;
use crate::types::PlayerId;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Failure to load or save player state.
#[derive(Error, Debug)]
pub enum RepositoryError {
    /// The store could not be reached. Usually transient.
    #[error("Repository unavailable: {0}")]
    Unavailable(String),

    /// Another writer saved the player since it was loaded.
    #[error("Version conflict for player {player}: expected {expected}, found {found}")]
    Conflict {
        /// Player whose save lost the race.
        player: PlayerId,
        /// Version the caller loaded.
        expected: u64,
        /// Version currently stored.
        found: u64,
    },

    /// The stored document cannot be decoded.
    #[error("Corrupt state for player {player}: {reason}")]
    Corrupt {
        /// Affected player.
        player: PlayerId,
        /// Decoder message.
        reason: String,
    },

    /// Encoding the document failed.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// `SQLite` failure.
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Every retry of a transient failure failed.
    #[error("All {attempts} repository attempts failed: {last_error}")]
    RetriesExhausted {
        /// Attempts made.
        attempts: u32,
        /// The final error.
        last_error: String,
    },
}

impl RepositoryError {
    /// Whether repeating the same call may succeed.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Unavailable(_) | Self::RetriesExhausted { .. } => true,
            Self::Database(rusqlite::Error::SqliteFailure(e, _)) => matches!(
                e.code,
                rusqlite::ErrorCode::DatabaseBusy | rusqlite::ErrorCode::DatabaseLocked
            ),
            _ => false,
        }
    }

    /// Whether this is a lost compare-and-swap.
    #[must_use]
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }
}

// ---------------------------------------------------------------------------
// Trait
// ---------------------------------------------------------------------------

/// Storage for [`PlayerState`].
pub trait PlayerRepository: Send + Sync {
    /// Load a player, or a fresh default if none is stored.
    ///
    /// # Errors
    /// Returns a [`RepositoryError`] if the store fails or the stored
    /// document is unreadable.
    fn get(&self, id: &PlayerId) -> Result<PlayerState, RepositoryError>;

    /// Write `player` back if its version is still current.
    ///
    /// # Errors
    /// Returns [`RepositoryError::Conflict`] if another save happened since
    /// `player` was loaded, or any storage failure.
    fn save(&self, player: &PlayerState) -> Result<(), RepositoryError>;
}

impl<R: PlayerRepository + ?Sized> PlayerRepository for Arc<R> {
    fn get(&self, id: &PlayerId) -> Result<PlayerState, RepositoryError> {
        (**self).get(id)
    }

    fn save(&self, player: &PlayerState) -> Result<(), RepositoryError> {
        (**self).save(player)
    }
}

impl<R: PlayerRepository + ?Sized> PlayerRepository for Box<R> {
    fn get(&self, id: &PlayerId) -> Result<PlayerState, RepositoryError> {
        (**self).get(id)
    }

    fn save(&self, player: &PlayerState) -> Result<(), RepositoryError> {
        (**self).save(player)
    }
}

// ---------------------------------------------------------------------------
// In-memory
// ---------------------------------------------------------------------------

/// Process-local repository. Useful for tests and single-process setups.
#[derive(Debug, Default)]
pub struct InMemoryRepository {
    players: Mutex<HashMap<PlayerId, PlayerState>>,
}

impl InMemoryRepository {
    /// An empty repository.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The stored state of a player, if any.
    #[must_use]
    pub fn snapshot(&self, id: &PlayerId) -> Option<PlayerState> {
        self.players.lock().get(id).cloned()
    }

    /// Number of stored players.
    #[must_use]
    pub fn len(&self) -> usize {
        self.players.lock().len()
    }

    /// Whether no player is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.players.lock().is_empty()
    }
}

impl PlayerRepository for InMemoryRepository {
    fn get(&self, id: &PlayerId) -> Result<PlayerState, RepositoryError> {
        Ok(self
            .players
            .lock()
            .get(id)
            .cloned()
            .unwrap_or_else(|| PlayerState::new(id.clone())))
    }

    fn save(&self, player: &PlayerState) -> Result<(), RepositoryError> {
        let mut players = self.players.lock();
        let found = players.get(&player.id).map_or(0, |p| p.version);
        if found != player.version {
            return Err(RepositoryError::Conflict {
                player: player.id.clone(),
                expected: player.version,
                found,
            });
        }
        let mut stored = player.clone();
        stored.version += 1;
        players.insert(stored.id.clone(), stored);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Retry wrapper
// ---------------------------------------------------------------------------

/// Retries transient failures of the wrapped repository with exponential
/// backoff. Conflicts and permanent errors are returned immediately.
#[derive(Debug)]
pub struct RetryingRepository<R> {
    inner: R,
    policy: RetryConfig,
}

impl<R: PlayerRepository> RetryingRepository<R> {
    /// Wrap `inner` with `policy`.
    #[must_use]
    pub fn new(inner: R, policy: RetryConfig) -> Self {
        Self { inner, policy }
    }

    /// The wrapped repository.
    #[must_use]
    pub fn inner(&self) -> &R {
        &self.inner
    }

    fn with_retry<T>(
        &self,
        operation: &str,
        player: &PlayerId,
        mut call: impl FnMut() -> Result<T, RepositoryError>,
    ) -> Result<T, RepositoryError> {
        let attempts = self.policy.max_attempts.max(1);
        let mut last_error = String::new();
        for attempt in 1..=attempts {
            if attempt > 1 {
                let delay = self.policy.backoff(attempt - 1);
                debug!(
                    player = %player,
                    operation,
                    attempt,
                    delay_ms = delay.as_millis(),
                    "Retrying repository call"
                );
                std::thread::sleep(delay);
            }
            match call() {
                Ok(value) => return Ok(value),
                Err(e) if e.is_transient() => {
                    warn!(
                        player = %player,
                        operation,
                        attempt,
                        error = %e,
                        "Transient repository failure"
                    );
                    last_error = e.to_string();
                }
                Err(e) => return Err(e),
            }
        }
        Err(RepositoryError::RetriesExhausted {
            attempts,
            last_error,
        })
    }
}

impl<R: PlayerRepository> PlayerRepository for RetryingRepository<R> {
    fn get(&self, id: &PlayerId) -> Result<PlayerState, RepositoryError> {
        self.with_retry("get", id, || self.inner.get(id))
    }

    fn save(&self, player: &PlayerState) -> Result<(), RepositoryError> {
        self.with_retry("save", &player.id, || self.inner.save(player))
    }
}
