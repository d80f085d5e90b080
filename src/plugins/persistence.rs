//! Bridges the game to its storage backend.
//!
//! Backend calls run on the [`IoTaskPool`] and their replies are applied on the
//! main schedule, so a slow disk never stalls a frame and the grid is only
//! ever touched by systems. Once the session is torn down, pending tasks are
//! dropped and late replies are ignored.

use std::sync::Arc;
use std::time::Duration;

use bevy::app::AppExit;
use bevy::prelude::*;
use bevy::tasks::{IoTaskPool, Task, block_on, futures_lite::future};

use crate::config::{GameConfig, PersistenceConfig};
use crate::persistence::{
    Backend, GameSnapshot, PatternId, PatternRecord, SessionId, SessionLog, StoreResult, UserContext,
};
use crate::plugins::stats_boards::Notice;
use crate::simulation::grid::LifeGrid;
use crate::simulation::run_loop::{RunLoop, RunLoopSet};
use crate::simulation::session::LifeSession;
use crate::simulation::view::Viewport;

pub const QUICKSAVE_PATTERN: &str = "quicksave";

/// What to put on the board once the session has started.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum StartupLoad {
    #[default]
    Snapshot,
    Pattern(String),
}

pub struct PersistencePlugin {
    pub backend: Arc<dyn Backend>,
    pub startup: StartupLoad,
}

impl Plugin for PersistencePlugin {
    fn build(&self, app: &mut App) {
        let config = app
            .world()
            .get_resource::<GameConfig>()
            .cloned()
            .unwrap_or_default();
        app.insert_resource(Persistence {
            backend: self.backend.clone(),
        })
        .insert_resource(StartupRequest(self.startup.clone()))
        .insert_resource(AutoSave::new(&config.persistence))
        .init_resource::<InFlight>()
        .init_resource::<SessionBook>()
        .add_message::<PersistenceRequest>()
        .add_systems(Startup, begin_session)
        .add_systems(
            Update,
            (
                dispatch_requests,
                poll_replies.before(RunLoopSet),
                schedule_auto_save.after(RunLoopSet).after(poll_replies),
            ),
        )
        .add_systems(Last, teardown_on_exit);
    }
}

#[derive(Resource, Clone)]
pub struct Persistence {
    backend: Arc<dyn Backend>,
}

#[derive(Resource)]
struct StartupRequest(StartupLoad);

/// Commands from the keyboard surface.
#[derive(Message, Clone, Debug, PartialEq, Eq)]
pub enum PersistenceRequest {
    SaveSnapshot,
    LoadSnapshot,
    SavePattern(String),
    LoadPattern(String),
}

enum Reply {
    SessionStarted(StoreResult<SessionId>),
    SnapshotSaved { auto: bool, result: StoreResult<()> },
    SnapshotLoaded(StoreResult<Option<GameSnapshot>>),
    PatternSaved { name: String, result: StoreResult<PatternId> },
    PatternLoaded { name: String, result: StoreResult<PatternRecord> },
}

/// How teardown treats a task that has not finished yet.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Job {
    /// Session bookkeeping and saves. Teardown waits for these.
    Write,
    /// Loads. Teardown drops these, so their result never reaches the board.
    Read,
}

#[derive(Resource)]
struct InFlight {
    live: bool,
    tasks: Vec<(Job, Task<Reply>)>,
}

impl Default for InFlight {
    fn default() -> Self {
        Self {
            live: true,
            tasks: Vec::new(),
        }
    }
}

impl InFlight {
    fn spawn<F>(&mut self, kind: Job, backend: &Arc<dyn Backend>, job: F)
    where
        F: FnOnce(&dyn Backend) -> Reply + Send + 'static,
    {
        if !self.live {
            return;
        }
        let backend = backend.clone();
        let task = IoTaskPool::get().spawn(async move { job(backend.as_ref()) });
        self.tasks.push((kind, task));
    }

    /// Stops accepting work. Pending writes are waited for and their replies
    /// returned; pending reads are dropped, which cancels them.
    fn shut_down(&mut self) -> Vec<Reply> {
        self.live = false;
        self.tasks
            .drain(..)
            .filter(|(kind, _)| *kind == Job::Write)
            .map(|(_, task)| block_on(task))
            .collect()
    }
}

/// Session id plus the guarantee that it is closed at most once.
#[derive(Resource, Debug, Default)]
pub struct SessionBook {
    id: Option<SessionId>,
    ended: bool,
}

impl SessionBook {
    pub fn id(&self) -> Option<SessionId> {
        self.id
    }

    pub fn is_ended(&self) -> bool {
        self.ended
    }

    fn started(&mut self, id: SessionId) {
        if !self.ended {
            self.id = Some(id);
        }
    }

    /// Records the final counters. Later calls do nothing. Returns `true` if
    /// the backend was actually called.
    pub fn end(
        &mut self,
        log: &(impl SessionLog + ?Sized),
        user: &UserContext,
        generation: u64,
        population: u64,
    ) -> bool {
        if std::mem::replace(&mut self.ended, true) {
            return false;
        }
        let Some(id) = self.id else {
            warn!("session for {} never started, nothing to end", user.username);
            return false;
        };
        match log.end_session(user, id, generation, population) {
            Ok(()) => info!(
                "ended session {} at generation {} with population {}",
                id, generation, population
            ),
            Err(err) => warn!("failed to end session {}: {}", id, err),
        }
        true
    }
}

/// Debounced auto-save. Edits restart the delay; generation advances only
/// arm it when nothing is pending.
#[derive(Resource, Debug)]
pub struct AutoSave {
    enabled: bool,
    delay: Duration,
    timer: Option<Timer>,
    last_generation: u64,
    skip_next: bool,
}

impl AutoSave {
    pub fn new(config: &PersistenceConfig) -> Self {
        Self {
            enabled: config.auto_save,
            delay: config.auto_save_delay(),
            timer: None,
            last_generation: 0,
            skip_next: false,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.timer.is_some()
    }

    /// The session changed and now sits at `generation`.
    pub fn observe(&mut self, generation: u64) {
        let advanced = generation > self.last_generation;
        self.last_generation = generation;
        if std::mem::take(&mut self.skip_next) || !self.enabled || (advanced && self.timer.is_some()) {
            return;
        }
        self.timer = Some(Timer::new(self.delay, TimerMode::Once));
    }

    /// Returns `true` once when the delay runs out.
    pub fn tick(&mut self, delta: Duration) -> bool {
        let Some(timer) = self.timer.as_mut() else {
            return false;
        };
        if timer.tick(delta).is_finished() {
            self.timer = None;
            return true;
        }
        false
    }

    /// Forgets the pending save without running it.
    pub fn cancel(&mut self) {
        self.timer = None;
    }

    /// State just came from storage. The change it causes is not an edit.
    fn settle(&mut self, generation: u64) {
        self.last_generation = generation;
        self.timer = None;
        self.skip_next = true;
    }
}

fn begin_session(
    persistence: Res<Persistence>,
    user: Option<Res<UserContext>>,
    startup: Res<StartupRequest>,
    mut in_flight: ResMut<InFlight>,
) {
    let Some(user) = user else {
        warn!("no user logged in, persistence disabled");
        let _ = in_flight.shut_down();
        return;
    };
    info!("starting session for {}", user.username);

    let ctx = UserContext::clone(&user);
    in_flight.spawn(Job::Write, &persistence.backend, move |backend| {
        Reply::SessionStarted(backend.start_session(&ctx))
    });

    let ctx = UserContext::clone(&user);
    match &startup.0 {
        StartupLoad::Snapshot => in_flight.spawn(Job::Read, &persistence.backend, move |backend| {
            Reply::SnapshotLoaded(backend.load_snapshot(&ctx))
        }),
        StartupLoad::Pattern(name) => {
            let name = name.clone();
            in_flight.spawn(Job::Read, &persistence.backend, move |backend| Reply::PatternLoaded {
                result: backend.find_pattern(&ctx, &name),
                name,
            })
        }
    }
}

fn dispatch_requests(
    mut requests: MessageReader<PersistenceRequest>,
    persistence: Res<Persistence>,
    user: Option<Res<UserContext>>,
    session: Res<LifeSession>,
    viewport: Res<Viewport>,
    mut in_flight: ResMut<InFlight>,
    mut notice: ResMut<Notice>,
) {
    for request in requests.read() {
        let Some(user) = user.as_deref() else {
            notice.show("Not logged in.");
            continue;
        };
        let ctx = user.clone();
        debug!("{:?} for {}", request, ctx.username);
        match request {
            PersistenceRequest::SaveSnapshot => {
                let snapshot = session.snapshot(viewport.pan_offset(), viewport.cell_size);
                in_flight.spawn(Job::Write, &persistence.backend, move |backend| Reply::SnapshotSaved {
                    auto: false,
                    result: backend.save_snapshot(&ctx, &snapshot),
                });
            }
            PersistenceRequest::LoadSnapshot => {
                in_flight.spawn(Job::Read, &persistence.backend, move |backend| {
                    Reply::SnapshotLoaded(backend.load_snapshot(&ctx))
                });
            }
            PersistenceRequest::SavePattern(name) => {
                let name = name.clone();
                let cells = session.grid().sorted_cells();
                in_flight.spawn(Job::Write, &persistence.backend, move |backend| Reply::PatternSaved {
                    result: backend.save_pattern(&ctx, &name, &cells),
                    name,
                });
            }
            PersistenceRequest::LoadPattern(name) => {
                let name = name.clone();
                in_flight.spawn(Job::Read, &persistence.backend, move |backend| Reply::PatternLoaded {
                    result: backend.find_pattern(&ctx, &name),
                    name,
                });
            }
        }
    }
}

fn poll_replies(
    mut in_flight: ResMut<InFlight>,
    mut book: ResMut<SessionBook>,
    mut session: ResMut<LifeSession>,
    mut viewport: ResMut<Viewport>,
    mut run_loop: ResMut<RunLoop>,
    mut auto_save: ResMut<AutoSave>,
    mut notice: ResMut<Notice>,
) {
    if in_flight.tasks.is_empty() {
        return;
    }
    let in_flight = in_flight.bypass_change_detection();
    let mut replies = Vec::new();
    in_flight
        .tasks
        .retain_mut(|(_, task)| match block_on(future::poll_once(task)) {
            Some(reply) => {
                replies.push(reply);
                false
            }
            None => true,
        });
    if !in_flight.live {
        return;
    }

    for reply in replies {
        match reply {
            Reply::SessionStarted(Ok(id)) => {
                info!("session {} started", id);
                book.started(id);
            }
            Reply::SessionStarted(Err(err)) => {
                warn!("failed to start session: {}", err);
                notice.show(format!("Could not start session: {}", err));
            }
            Reply::SnapshotSaved { auto, result: Ok(()) } => {
                debug!("snapshot saved (auto: {})", auto);
                if !auto {
                    notice.show("Game saved.");
                }
            }
            Reply::SnapshotSaved { result: Err(err), .. } => {
                warn!("failed to save snapshot: {}", err);
                notice.show(format!("Save failed: {}", err));
            }
            Reply::SnapshotLoaded(Ok(Some(snapshot))) => {
                run_loop.halt();
                session.restore(&snapshot);
                viewport.restore(snapshot.pan, snapshot.cell_size);
                auto_save.settle(session.generation());
                info!(
                    "restored generation {} with {} live cells",
                    session.generation(),
                    session.population()
                );
                notice.show(format!("Loaded saved game at generation {}.", session.generation()));
            }
            Reply::SnapshotLoaded(Ok(None)) => {
                info!("no saved game state");
                notice.show("No saved game state found.");
            }
            Reply::SnapshotLoaded(Err(err)) => {
                warn!("failed to load snapshot: {}", err);
                notice.show(format!("Load failed: {}", err));
            }
            Reply::PatternSaved { name, result: Ok(id) } => {
                info!("saved pattern {:?} as {}", name, id);
                notice.show(format!("Saved pattern \"{}\".", name));
            }
            Reply::PatternSaved { name, result: Err(err) } => {
                warn!("failed to save pattern {:?}: {}", name, err);
                notice.show(format!("Could not save \"{}\": {}", name, err));
            }
            Reply::PatternLoaded { name, result: Ok(record) } => {
                run_loop.halt();
                session.load_grid(LifeGrid::from_cells(record.cells));
                auto_save.settle(session.generation());
                notice.show(format!("Loaded pattern \"{}\".", name));
            }
            Reply::PatternLoaded { name, result: Err(err) } => {
                warn!("failed to load pattern {:?}: {}", name, err);
                notice.show(format!("Could not load \"{}\": {}", name, err));
            }
        }
    }
}

fn schedule_auto_save(
    time: Res<Time>,
    persistence: Res<Persistence>,
    user: Option<Res<UserContext>>,
    session: Res<LifeSession>,
    viewport: Res<Viewport>,
    mut auto_save: ResMut<AutoSave>,
    mut in_flight: ResMut<InFlight>,
) {
    if session.is_changed() && !session.is_added() {
        auto_save.observe(session.generation());
    }
    if !auto_save.tick(time.delta()) {
        return;
    }
    let Some(user) = user.as_deref() else {
        return;
    };
    let ctx = UserContext::clone(&user);
    let snapshot = session.snapshot(viewport.pan_offset(), viewport.cell_size);
    debug!("auto-saving generation {}", snapshot.generation);
    in_flight.spawn(Job::Write, &persistence.backend, move |backend| Reply::SnapshotSaved {
        auto: true,
        result: backend.save_snapshot(&ctx, &snapshot),
    });
}

/// Runs once, on the first exit message, whether it came from closing the
/// window or from logging out.
#[allow(clippy::too_many_arguments)]
fn teardown_on_exit(
    mut exits: MessageReader<AppExit>,
    mut commands: Commands,
    persistence: Res<Persistence>,
    user: Option<Res<UserContext>>,
    session: Res<LifeSession>,
    viewport: Res<Viewport>,
    mut run_loop: ResMut<RunLoop>,
    mut auto_save: ResMut<AutoSave>,
    mut in_flight: ResMut<InFlight>,
    mut book: ResMut<SessionBook>,
    mut notice: ResMut<Notice>,
) {
    if exits.read().next().is_none() || book.is_ended() {
        return;
    }

    run_loop.halt();
    notice.dismiss();
    for reply in in_flight.shut_down() {
        match reply {
            Reply::SessionStarted(Ok(id)) => book.started(id),
            Reply::SessionStarted(Err(err)) => warn!("failed to start session: {}", err),
            Reply::SnapshotSaved { result: Err(err), .. } => warn!("failed to save snapshot: {}", err),
            Reply::PatternSaved { name, result: Err(err) } => {
                warn!("failed to save pattern {:?}: {}", name, err)
            }
            _ => {}
        }
    }
    let Some(user) = user else {
        book.ended = true;
        return;
    };

    if auto_save.is_pending() {
        auto_save.cancel();
        let snapshot = session.snapshot(viewport.pan_offset(), viewport.cell_size);
        if let Err(err) = persistence.backend.save_snapshot(&user, &snapshot) {
            warn!("final save failed: {}", err);
        }
    }
    book.end(
        persistence.backend.as_ref(),
        &user,
        session.generation(),
        session.population(),
    );
    info!("{} logged out", user.username);
    commands.remove_resource::<UserContext>();
}
