use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use super::{
    GameSnapshot, PatternId, PatternRecord, PatternStore, PatternSummary, SessionId, SessionLog,
    SnapshotStore, StoreError, StoreResult, UserContext, UserId, UserStats,
};
use crate::simulation::coords::Cell;

const STORE_FILE: &str = "store.json";

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
struct StoreData {
    next_user_id: u64,
    next_pattern_id: u64,
    next_session_id: u64,
    users: Vec<UserRow>,
    /// Keyed by user id.
    snapshots: BTreeMap<u64, SnapshotRow>,
    patterns: Vec<PatternRow>,
    sessions: Vec<SessionRow>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
struct UserRow {
    id: UserId,
    username: String,
    created_at: u64,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
struct SnapshotRow {
    snapshot: GameSnapshot,
    updated_at: u64,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
struct PatternRow {
    id: PatternId,
    owner: UserId,
    name: String,
    cells: Vec<Cell>,
    updated_at: u64,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
struct SessionRow {
    id: SessionId,
    owner: UserId,
    started_at: u64,
    ended_at: Option<u64>,
    generations: u64,
    population: u64,
}

impl StoreData {
    fn next_id(counter: &mut u64) -> u64 {
        *counter += 1;
        *counter
    }

    fn pattern_index(&self, user: &UserContext, id: PatternId) -> StoreResult<usize> {
        self.patterns
            .iter()
            .position(|p| p.id == id && p.owner == user.user_id)
            .ok_or(StoreError::PatternNotFound { id })
    }
}

fn io_err(path: &Path) -> impl FnOnce(std::io::Error) -> StoreError + use<> {
    let path = path.to_path_buf();
    move |source| StoreError::Io { path, source }
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// JSON-document store in a single file. Every mutation rewrites the file
/// through a temporary sibling and a rename.
pub struct FileStore {
    path: PathBuf,
    data: Mutex<StoreData>,
}

impl FileStore {
    pub fn open(dir: impl AsRef<Path>) -> StoreResult<Self> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir).map_err(io_err(dir))?;

        let path = dir.join(STORE_FILE);
        let data = if path.exists() {
            let bytes = fs::read(&path).map_err(io_err(&path))?;
            serde_json::from_slice(&bytes)?
        } else {
            StoreData::default()
        };

        Ok(Self {
            path,
            data: Mutex::new(data),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Opens the account called `username`, registering it on first use.
    pub fn login(&self, username: &str) -> StoreResult<UserContext> {
        let username = username.trim();
        if username.is_empty() {
            return Err(StoreError::EmptyUsername);
        }
        if let Some(user) = self
            .lock()?
            .users
            .iter()
            .find(|u| u.username == username)
        {
            return Ok(UserContext {
                user_id: user.id,
                username: user.username.clone(),
            });
        }

        self.mutate(|data| {
            let id = UserId(StoreData::next_id(&mut data.next_user_id));
            data.users.push(UserRow {
                id,
                username: username.to_string(),
                created_at: unix_now(),
            });
            Ok(UserContext {
                user_id: id,
                username: username.to_string(),
            })
        })
    }

    fn lock(&self) -> StoreResult<MutexGuard<'_, StoreData>> {
        self.data.lock().map_err(|_| StoreError::Poisoned)
    }

    /// Applies `f` to a copy and persists it. The in-memory state only moves
    /// once the file is written, so a failure on either side leaves both as
    /// they were.
    fn mutate<T>(&self, f: impl FnOnce(&mut StoreData) -> StoreResult<T>) -> StoreResult<T> {
        let mut data = self.lock()?;
        let mut next = data.clone();
        let out = f(&mut next)?;
        self.write(&next)?;
        *data = next;
        Ok(out)
    }

    fn write(&self, data: &StoreData) -> StoreResult<()> {
        let bytes = serde_json::to_vec_pretty(data)?;
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, bytes).map_err(io_err(&tmp))?;
        fs::rename(&tmp, &self.path).map_err(io_err(&self.path))?;
        Ok(())
    }
}

impl SnapshotStore for FileStore {
    fn save_snapshot(&self, user: &UserContext, snapshot: &GameSnapshot) -> StoreResult<()> {
        self.mutate(|data| {
            data.snapshots.insert(
                user.user_id.0,
                SnapshotRow {
                    snapshot: snapshot.clone(),
                    updated_at: unix_now(),
                },
            );
            Ok(())
        })
    }

    fn load_snapshot(&self, user: &UserContext) -> StoreResult<Option<GameSnapshot>> {
        Ok(self
            .lock()?
            .snapshots
            .get(&user.user_id.0)
            .map(|row| row.snapshot.clone()))
    }
}

impl PatternStore for FileStore {
    fn save_pattern(&self, user: &UserContext, name: &str, cells: &[Cell]) -> StoreResult<PatternId> {
        let name = name.trim();
        if name.is_empty() {
            return Err(StoreError::EmptyPatternName);
        }
        self.mutate(|data| {
            let now = unix_now();
            if let Some(existing) = data
                .patterns
                .iter_mut()
                .find(|p| p.owner == user.user_id && p.name == name)
            {
                existing.cells = cells.to_vec();
                existing.updated_at = now;
                return Ok(existing.id);
            }
            let id = PatternId(StoreData::next_id(&mut data.next_pattern_id));
            data.patterns.push(PatternRow {
                id,
                owner: user.user_id,
                name: name.to_string(),
                cells: cells.to_vec(),
                updated_at: now,
            });
            Ok(id)
        })
    }

    fn list_patterns(&self, user: &UserContext) -> StoreResult<Vec<PatternSummary>> {
        let data = self.lock()?;
        let mut list: Vec<PatternSummary> = data
            .patterns
            .iter()
            .filter(|p| p.owner == user.user_id)
            .map(|p| PatternSummary {
                id: p.id,
                name: p.name.clone(),
            })
            .collect();
        list.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(list)
    }

    fn get_pattern(&self, user: &UserContext, id: PatternId) -> StoreResult<PatternRecord> {
        let data = self.lock()?;
        let row = &data.patterns[data.pattern_index(user, id)?];
        Ok(PatternRecord {
            id: row.id,
            name: row.name.clone(),
            cells: row.cells.clone(),
        })
    }

    fn find_pattern(&self, user: &UserContext, name: &str) -> StoreResult<PatternRecord> {
        let name = name.trim();
        let data = self.lock()?;
        data.patterns
            .iter()
            .find(|p| p.owner == user.user_id && p.name == name)
            .map(|row| PatternRecord {
                id: row.id,
                name: row.name.clone(),
                cells: row.cells.clone(),
            })
            .ok_or_else(|| StoreError::PatternNameNotFound {
                name: name.to_string(),
            })
    }

    fn delete_pattern(&self, user: &UserContext, id: PatternId) -> StoreResult<()> {
        self.mutate(|data| {
            let idx = data.pattern_index(user, id)?;
            data.patterns.remove(idx);
            Ok(())
        })
    }
}

impl SessionLog for FileStore {
    fn start_session(&self, user: &UserContext) -> StoreResult<SessionId> {
        self.mutate(|data| {
            let id = SessionId(StoreData::next_id(&mut data.next_session_id));
            data.sessions.push(SessionRow {
                id,
                owner: user.user_id,
                started_at: unix_now(),
                ended_at: None,
                generations: 0,
                population: 0,
            });
            Ok(id)
        })
    }

    fn end_session(
        &self,
        user: &UserContext,
        session: SessionId,
        generation: u64,
        population: u64,
    ) -> StoreResult<()> {
        self.mutate(|data| {
            let row = data
                .sessions
                .iter_mut()
                .find(|s| s.id == session && s.owner == user.user_id)
                .ok_or(StoreError::SessionNotFound { id: session })?;
            row.ended_at = Some(unix_now());
            row.generations = generation;
            row.population = population;
            Ok(())
        })
    }

    fn user_stats(&self, user: &UserContext) -> StoreResult<UserStats> {
        let data = self.lock()?;
        let sessions = data.sessions.iter().filter(|s| s.owner == user.user_id);
        let (total_games, best_generation, best_population) =
            sessions.fold((0, 0, 0), |(n, g, p), s| {
                (n + 1, g.max(s.generations), p.max(s.population))
            });
        let total_patterns = data
            .patterns
            .iter()
            .filter(|p| p.owner == user.user_id)
            .count() as u64;

        Ok(UserStats {
            username: user.username.clone(),
            total_games,
            total_patterns,
            best_generation,
            best_population,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::PanOffset;
    use tempfile::tempdir;

    fn cells(list: &[(i64, i64)]) -> Vec<Cell> {
        list.iter().copied().map(Cell::from).collect()
    }

    #[test]
    fn login_registers_once() {
        let dir = tempdir().unwrap();
        let store = FileStore::open(dir.path()).unwrap();
        let a = store.login("  alice ").unwrap();
        let again = store.login("alice").unwrap();
        let b = store.login("bob").unwrap();
        assert_eq!(a, again);
        assert_eq!(a.username, "alice");
        assert_ne!(a.user_id, b.user_id);
        assert!(matches!(store.login("   "), Err(StoreError::EmptyUsername)));
    }

    #[test]
    fn failed_write_leaves_memory_untouched() {
        let dir = tempdir().unwrap();
        let root = dir.path().join("store");
        let store = FileStore::open(&root).unwrap();
        let user = store.login("alice").unwrap();
        let first = store.save_pattern(&user, "a", &cells(&[(0, 0)])).unwrap();

        fs::remove_dir_all(&root).unwrap();
        assert!(matches!(
            store.save_pattern(&user, "b", &cells(&[(1, 1)])),
            Err(StoreError::Io { .. })
        ));
        let names: Vec<String> = store.list_patterns(&user).unwrap().into_iter().map(|p| p.name).collect();
        assert_eq!(names, ["a"]);

        // The id counter did not move either.
        fs::create_dir_all(&root).unwrap();
        let next = store.save_pattern(&user, "c", &cells(&[(2, 2)])).unwrap();
        assert_eq!(next, PatternId(first.0 + 1));
    }

    #[test]
    fn snapshot_is_per_user_and_survives_reopen() {
        let dir = tempdir().unwrap();
        let snapshot = GameSnapshot {
            live_cells: cells(&[(0, 1), (-5, 3)]),
            pan: PanOffset { x: 1.5, y: -2.0 },
            cell_size: 30.0,
            generation: 42,
            population: 2,
        };
        {
            let store = FileStore::open(dir.path()).unwrap();
            let alice = store.login("alice").unwrap();
            let bob = store.login("bob").unwrap();
            assert_eq!(store.load_snapshot(&alice).unwrap(), None);
            store.save_snapshot(&alice, &snapshot).unwrap();
            assert_eq!(store.load_snapshot(&bob).unwrap(), None);
        }
        let store = FileStore::open(dir.path()).unwrap();
        let alice = store.login("alice").unwrap();
        assert_eq!(store.load_snapshot(&alice).unwrap(), Some(snapshot));
    }

    #[test]
    fn saving_same_pattern_name_overwrites() {
        let dir = tempdir().unwrap();
        let store = FileStore::open(dir.path()).unwrap();
        let user = store.login("carol").unwrap();

        let first = store.save_pattern(&user, "glider", &cells(&[(0, 0)])).unwrap();
        let second = store.save_pattern(&user, " glider ", &cells(&[(1, 1), (2, 2)])).unwrap();
        assert_eq!(first, second);

        let listed = store.list_patterns(&user).unwrap();
        assert_eq!(listed.len(), 1);
        let record = store.get_pattern(&user, first).unwrap();
        assert_eq!(record.cells, cells(&[(1, 1), (2, 2)]));
        assert_eq!(store.find_pattern(&user, "glider").unwrap(), record);
    }

    #[test]
    fn patterns_are_private_to_their_owner() {
        let dir = tempdir().unwrap();
        let store = FileStore::open(dir.path()).unwrap();
        let alice = store.login("alice").unwrap();
        let mallory = store.login("mallory").unwrap();

        let id = store.save_pattern(&alice, "mine", &cells(&[(0, 0)])).unwrap();
        assert!(store.list_patterns(&mallory).unwrap().is_empty());
        assert!(matches!(
            store.get_pattern(&mallory, id),
            Err(StoreError::PatternNotFound { .. })
        ));
        assert!(store.delete_pattern(&mallory, id).is_err());

        store.delete_pattern(&alice, id).unwrap();
        assert!(store.list_patterns(&alice).unwrap().is_empty());
        assert!(matches!(
            store.find_pattern(&alice, "mine"),
            Err(StoreError::PatternNameNotFound { .. })
        ));
    }

    #[test]
    fn empty_pattern_name_is_rejected() {
        let dir = tempdir().unwrap();
        let store = FileStore::open(dir.path()).unwrap();
        let user = store.login("dave").unwrap();
        assert!(matches!(
            store.save_pattern(&user, "  ", &[]),
            Err(StoreError::EmptyPatternName)
        ));
    }

    #[test]
    fn list_is_sorted_by_name() {
        let dir = tempdir().unwrap();
        let store = FileStore::open(dir.path()).unwrap();
        let user = store.login("erin").unwrap();
        for name in ["zeta", "alpha", "mid"] {
            store.save_pattern(&user, name, &[]).unwrap();
        }
        let names: Vec<String> = store
            .list_patterns(&user)
            .unwrap()
            .into_iter()
            .map(|p| p.name)
            .collect();
        assert_eq!(names, ["alpha", "mid", "zeta"]);
    }

    #[test]
    fn sessions_feed_user_stats() {
        let dir = tempdir().unwrap();
        let store = FileStore::open(dir.path()).unwrap();
        let user = store.login("frank").unwrap();
        let other = store.login("grace").unwrap();

        let s1 = store.start_session(&user).unwrap();
        let s2 = store.start_session(&user).unwrap();
        store.end_session(&user, s1, 120, 7).unwrap();
        store.end_session(&user, s2, 30, 55).unwrap();
        store.save_pattern(&user, "p", &[]).unwrap();
        assert!(matches!(
            store.end_session(&other, s1, 1, 1),
            Err(StoreError::SessionNotFound { .. })
        ));

        let stats = store.user_stats(&user).unwrap();
        assert_eq!(
            stats,
            UserStats {
                username: "frank".into(),
                total_games: 2,
                total_patterns: 1,
                best_generation: 120,
                best_population: 55,
            }
        );
        assert_eq!(store.user_stats(&other).unwrap().total_games, 0);
    }

    #[test]
    fn corrupt_store_file_is_reported() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join(STORE_FILE), b"{ not json").unwrap();
        assert!(matches!(FileStore::open(dir.path()), Err(StoreError::Json(_))));
    }
}
