//! Storage collaborators: the saved game, named patterns, play sessions.
//!
//! The simulation only hands over and takes back coordinate lists; everything
//! else about storage lives behind these traits. Every call is scoped to the
//! [`UserContext`] it is given.

use std::path::PathBuf;

use bevy::prelude::Resource;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::simulation::coords::Cell;

mod file_store;

pub use file_store::FileStore;

pub type StoreResult<T> = std::result::Result<T, StoreError>;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("username cannot be empty")]
    EmptyUsername,

    #[error("pattern name cannot be empty")]
    EmptyPatternName,

    #[error("pattern {id} not found")]
    PatternNotFound { id: PatternId },

    #[error("pattern named {name:?} not found")]
    PatternNameNotFound { name: String },

    #[error("session {id} not found")]
    SessionNotFound { id: SessionId },

    #[error("store lock poisoned")]
    Poisoned,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub u64);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PatternId(pub u64);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(pub u64);

macro_rules! display_id {
    ($($ty:ty),*) => {
        $(impl std::fmt::Display for $ty {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                std::fmt::Display::fmt(&self.0, f)
            }
        })*
    };
}

display_id!(UserId, PatternId, SessionId);

/// The logged-in player. Created at login, removed at logout.
#[derive(Resource, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserContext {
    pub user_id: UserId,
    pub username: String,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PanOffset {
    pub x: f64,
    pub y: f64,
}

/// Everything needed to resume a game where it was left.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GameSnapshot {
    pub live_cells: Vec<Cell>,
    pub pan: PanOffset,
    pub cell_size: f64,
    pub generation: u64,
    pub population: u64,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatternSummary {
    pub id: PatternId,
    pub name: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatternRecord {
    pub id: PatternId,
    pub name: String,
    pub cells: Vec<Cell>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserStats {
    pub username: String,
    pub total_games: u64,
    pub total_patterns: u64,
    pub best_generation: u64,
    pub best_population: u64,
}

/// One saved game per user.
pub trait SnapshotStore {
    fn save_snapshot(&self, user: &UserContext, snapshot: &GameSnapshot) -> StoreResult<()>;
    /// `Ok(None)` means nothing has been saved yet.
    fn load_snapshot(&self, user: &UserContext) -> StoreResult<Option<GameSnapshot>>;
}

/// Named cell lists, unique by name per user.
pub trait PatternStore {
    /// Saving under an existing name overwrites it and keeps its id.
    fn save_pattern(&self, user: &UserContext, name: &str, cells: &[Cell]) -> StoreResult<PatternId>;
    fn list_patterns(&self, user: &UserContext) -> StoreResult<Vec<PatternSummary>>;
    fn get_pattern(&self, user: &UserContext, id: PatternId) -> StoreResult<PatternRecord>;
    fn find_pattern(&self, user: &UserContext, name: &str) -> StoreResult<PatternRecord>;
    fn delete_pattern(&self, user: &UserContext, id: PatternId) -> StoreResult<()>;
}

/// Start/end bookkeeping for play sessions.
pub trait SessionLog {
    fn start_session(&self, user: &UserContext) -> StoreResult<SessionId>;
    fn end_session(
        &self,
        user: &UserContext,
        session: SessionId,
        generation: u64,
        population: u64,
    ) -> StoreResult<()>;
    fn user_stats(&self, user: &UserContext) -> StoreResult<UserStats>;
}

/// Everything the game talks to, as one object-safe bundle.
pub trait Backend: SnapshotStore + PatternStore + SessionLog + Send + Sync {}

impl<T: SnapshotStore + PatternStore + SessionLog + Send + Sync> Backend for T {}
