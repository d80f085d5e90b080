use std::time::{Duration, Instant};

use bevy::prelude::*;

use crate::config::{GameConfig, RunConfig};
use crate::simulation::session::LifeSession;

pub struct RunLoopPlugin;

impl Plugin for RunLoopPlugin {
    fn build(&self, app: &mut App) {
        let config = app
            .world()
            .get_resource::<GameConfig>()
            .cloned()
            .unwrap_or_default();
        app.insert_resource(RunLoop::new(&config.run))
            .add_systems(Update, drive_run_loop.in_set(RunLoopSet));
    }
}

/// Systems that advance generations. Input handling runs before it.
#[derive(SystemSet, Hash, Debug, Clone, PartialEq, Eq)]
pub struct RunLoopSet;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum RunState {
    #[default]
    Stopped,
    Running,
}

#[derive(Debug)]
struct Batch {
    remaining: u32,
    timer: Timer,
    /// Run state to restore once the batch finishes.
    resume: RunState,
}

/// Cooperative stepper: continuous play, single steps and fixed-size batches.
///
/// Nothing here owns a thread or a callback. Time is fed in through
/// [`RunLoop::tick`], which checks the current state before every step, so a
/// stop or a teardown takes effect on the next tick.
#[derive(Resource, Debug)]
pub struct RunLoop {
    state: RunState,
    interval: Timer,
    batch_interval: Duration,
    batch: Option<Batch>,
}

impl Default for RunLoop {
    fn default() -> Self {
        Self::new(&RunConfig::default())
    }
}

impl RunLoop {
    pub fn new(config: &RunConfig) -> Self {
        Self {
            state: RunState::Stopped,
            interval: Timer::new(config.step_interval(), TimerMode::Repeating),
            batch_interval: config.batch_interval(),
            batch: None,
        }
    }

    /// The current state. Reads `Stopped` while a batch holds play suspended.
    pub fn state(&self) -> RunState {
        self.state
    }

    pub fn is_running(&self) -> bool {
        self.state == RunState::Running
    }

    pub fn batch_remaining(&self) -> Option<u32> {
        self.batch.as_ref().map(|b| b.remaining)
    }

    pub fn start(&mut self) {
        if let Some(batch) = self.batch.as_mut() {
            batch.resume = RunState::Running;
            return;
        }
        if self.state != RunState::Running {
            self.state = RunState::Running;
            self.interval.reset();
        }
    }

    pub fn stop(&mut self) {
        if let Some(batch) = self.batch.as_mut() {
            batch.resume = RunState::Stopped;
        }
        self.state = RunState::Stopped;
        self.interval.reset();
    }

    pub fn toggle(&mut self) {
        let running = match &self.batch {
            Some(batch) => batch.resume == RunState::Running,
            None => self.is_running(),
        };
        if running { self.stop() } else { self.start() }
    }

    /// Exactly one generation, now. Interrupts continuous play and any batch.
    pub fn single_step(&mut self, session: &mut LifeSession) -> u64 {
        self.batch = None;
        self.stop();
        session.advance()
    }

    /// Schedules `generations` steps one batch interval apart, suspending
    /// continuous play until they are done. Zero is a no-op.
    pub fn begin_batch(&mut self, generations: u32) {
        if generations == 0 {
            return;
        }
        let resume = match self.batch.take() {
            Some(batch) => batch.resume,
            None => self.state,
        };
        self.state = RunState::Stopped;
        self.batch = Some(Batch {
            remaining: generations,
            timer: Timer::new(self.batch_interval, TimerMode::Repeating),
            resume,
        });
    }

    /// Feeds elapsed time in and applies every step that came due.
    /// Returns how many generations were advanced.
    pub fn tick(&mut self, delta: Duration, session: &mut LifeSession) -> u32 {
        if let Some(batch) = self.batch.as_mut() {
            batch.timer.tick(delta);
            let due = batch.timer.times_finished_this_tick().min(batch.remaining);
            for _ in 0..due {
                session.advance();
            }
            batch.remaining -= due;
            if batch.remaining == 0 {
                self.state = batch.resume;
                self.batch = None;
                self.interval.reset();
            }
            return due;
        }

        if self.state != RunState::Running {
            return 0;
        }
        self.interval.tick(delta);
        let due = self.interval.times_finished_this_tick();
        for _ in 0..due {
            session.advance();
        }
        due
    }

    /// Drops any pending batch and stops. Nothing fires after this until the
    /// next start.
    pub fn halt(&mut self) {
        self.batch = None;
        self.stop();
    }
}

fn drive_run_loop(time: Res<Time>, mut run_loop: ResMut<RunLoop>, mut session: ResMut<LifeSession>) {
    if !run_loop.is_running() && run_loop.batch_remaining().is_none() {
        return;
    }

    let start = Instant::now();
    let steps = run_loop.tick(time.delta(), session.bypass_change_detection());
    if steps > 0 {
        session.set_changed();
        let elapsed = start.elapsed();
        if elapsed.as_millis() > 16 {
            debug!(
                "{} step(s) to generation {} took {:?} (population {})",
                steps,
                session.generation(),
                elapsed,
                session.population()
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simulation::coords::Cell;
    use crate::simulation::patterns::find_preset;

    const MS: Duration = Duration::from_millis(1);

    fn glider_session() -> LifeSession {
        LifeSession::new(find_preset("glider").unwrap().placed_at(Cell::ORIGIN))
    }

    #[test]
    fn stopped_loop_never_steps() {
        let mut run = RunLoop::default();
        let mut session = glider_session();
        assert_eq!(run.tick(MS * 10_000, &mut session), 0);
        assert_eq!(session.generation(), 0);
    }

    #[test]
    fn running_steps_once_per_interval() {
        let mut run = RunLoop::default();
        let mut session = glider_session();
        run.start();
        assert_eq!(run.tick(MS * 99, &mut session), 0);
        assert_eq!(run.tick(MS * 1, &mut session), 1);
        assert_eq!(run.tick(MS * 250, &mut session), 2);
        assert_eq!(session.generation(), 3);
    }

    #[test]
    fn stop_cancels_the_pending_step() {
        let mut run = RunLoop::default();
        let mut session = glider_session();
        run.start();
        run.tick(MS * 150, &mut session);
        assert_eq!(session.generation(), 1);

        // Half an interval is already on the clock when stop arrives.
        run.stop();
        run.tick(MS * 60, &mut session);
        run.tick(MS * 1000, &mut session);
        assert_eq!(session.generation(), 1);
        assert_eq!(run.state(), RunState::Stopped);
    }

    #[test]
    fn single_step_interrupts_play() {
        let mut run = RunLoop::default();
        let mut session = glider_session();
        run.start();
        run.single_step(&mut session);
        assert_eq!(session.generation(), 1);
        assert_eq!(run.state(), RunState::Stopped);
        run.tick(MS * 500, &mut session);
        assert_eq!(session.generation(), 1);
    }

    #[test]
    fn batch_advances_exactly_n_and_restores_running() {
        let mut run = RunLoop::default();
        let mut session = glider_session();
        let mut expected = glider_session();
        expected.advance_by(23);

        run.start();
        run.begin_batch(23);
        assert_eq!(run.state(), RunState::Stopped);
        for _ in 0..22 {
            assert_eq!(run.tick(MS * 50, &mut session), 1);
        }
        assert_eq!(run.batch_remaining(), Some(1));
        assert_eq!(run.tick(MS * 50, &mut session), 1);

        assert_eq!(session, expected);
        assert_eq!(session.generation(), 23);
        assert_eq!(run.state(), RunState::Running);
        assert_eq!(run.batch_remaining(), None);
    }

    #[test]
    fn batch_restores_stopped_state() {
        let mut run = RunLoop::default();
        let mut session = glider_session();
        run.begin_batch(3);
        run.tick(MS * 1000, &mut session);
        assert_eq!(session.generation(), 3);
        assert_eq!(run.state(), RunState::Stopped);
        run.tick(MS * 1000, &mut session);
        assert_eq!(session.generation(), 3);
    }

    #[test]
    fn empty_batch_is_a_no_op() {
        let mut run = RunLoop::default();
        let mut session = glider_session();
        run.start();
        run.begin_batch(0);
        assert_eq!(run.state(), RunState::Running);
        assert_eq!(run.batch_remaining(), None);
        assert_eq!(session.generation(), 0);
    }

    #[test]
    fn start_during_batch_resumes_afterwards() {
        let mut run = RunLoop::default();
        let mut session = glider_session();
        run.begin_batch(2);
        run.toggle();
        assert_eq!(run.state(), RunState::Stopped);
        run.tick(MS * 100, &mut session);
        assert_eq!(run.state(), RunState::Running);
    }

    #[test]
    fn halt_drops_outstanding_batch_steps() {
        let mut run = RunLoop::default();
        let mut session = glider_session();
        run.begin_batch(23);
        run.tick(MS * 120, &mut session);
        assert_eq!(session.generation(), 2);
        run.halt();
        run.tick(MS * 5000, &mut session);
        assert_eq!(session.generation(), 2);
        assert_eq!(run.batch_remaining(), None);
    }
}
