use bevy::app::AppExit;
use bevy::prelude::*;

use crate::config::GameConfig;
use crate::plugins::persistence::{PersistenceRequest, QUICKSAVE_PATTERN};
use crate::simulation::patterns::{PRESETS, Preset};
use crate::simulation::run_loop::{RunLoop, RunLoopSet};
use crate::simulation::session::LifeSession;
use crate::simulation::view::Viewport;

/// Keyboard command surface.
///
/// | Key | Command |
/// |---|---|
/// | Space | start / stop |
/// | N | single step |
/// | B | batch of `run.batch_generations` |
/// | R | reset |
/// | C | recentre the view |
/// | 1-5 | load a built-in preset at the view centre |
/// | F5 / F9 | save / load the game |
/// | P / L | save / load the `quicksave` pattern |
/// | Escape | log out |
pub struct ControlsPlugin;

impl Plugin for ControlsPlugin {
    fn build(&self, app: &mut App) {
        let config = app
            .world()
            .get_resource::<GameConfig>()
            .cloned()
            .unwrap_or_default();
        app.insert_resource(BatchSize(config.run.batch_generations))
            .add_systems(Update, handle_keys.before(RunLoopSet));
    }
}

#[derive(Resource)]
struct BatchSize(u32);

const PRESET_KEYS: [KeyCode; 5] = [
    KeyCode::Digit1,
    KeyCode::Digit2,
    KeyCode::Digit3,
    KeyCode::Digit4,
    KeyCode::Digit5,
];

/// A key maps to at most one command.
#[derive(Clone, Debug, PartialEq)]
enum Command {
    ToggleRun,
    Step,
    Batch,
    Reset,
    Recenter,
    Preset(&'static Preset),
    Request(PersistenceRequest),
    Logout,
}

fn command_for(key: KeyCode) -> Option<Command> {
    let command = match key {
        KeyCode::Space => Command::ToggleRun,
        KeyCode::KeyN => Command::Step,
        KeyCode::KeyB => Command::Batch,
        KeyCode::KeyR => Command::Reset,
        KeyCode::KeyC => Command::Recenter,
        KeyCode::F5 => Command::Request(PersistenceRequest::SaveSnapshot),
        KeyCode::F9 => Command::Request(PersistenceRequest::LoadSnapshot),
        KeyCode::KeyP => Command::Request(PersistenceRequest::SavePattern(QUICKSAVE_PATTERN.into())),
        KeyCode::KeyL => Command::Request(PersistenceRequest::LoadPattern(QUICKSAVE_PATTERN.into())),
        KeyCode::Escape => Command::Logout,
        other => {
            let index = PRESET_KEYS.iter().position(|k| *k == other)?;
            Command::Preset(PRESETS.get(index)?)
        }
    };
    Some(command)
}

fn handle_keys(
    keys: Res<ButtonInput<KeyCode>>,
    batch: Res<BatchSize>,
    mut session: ResMut<LifeSession>,
    mut run_loop: ResMut<RunLoop>,
    mut viewport: ResMut<Viewport>,
    mut requests: MessageWriter<PersistenceRequest>,
    mut exit: MessageWriter<AppExit>,
) {
    for key in keys.get_just_pressed() {
        let Some(command) = command_for(*key) else {
            continue;
        };
        match command {
            Command::ToggleRun => run_loop.toggle(),
            Command::Step => {
                let generation = run_loop.single_step(&mut session);
                debug!("stepped to generation {}", generation);
            }
            Command::Batch => run_loop.begin_batch(batch.0),
            Command::Reset => {
                run_loop.halt();
                session.reset();
                viewport.reset();
                info!("board reset");
            }
            Command::Recenter => viewport.reset(),
            Command::Preset(preset) => {
                run_loop.halt();
                session.load_preset(preset, viewport.center_cell());
                info!("loaded preset {}", preset.name);
            }
            Command::Request(request) => {
                requests.write(request);
            }
            Command::Logout => {
                run_loop.halt();
                exit.write(AppExit::Success);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn digits_pick_presets_in_order() {
        for (key, preset) in PRESET_KEYS.iter().zip(PRESETS.iter()) {
            assert_eq!(command_for(*key), Some(Command::Preset(preset)));
        }
    }

    #[test]
    fn quicksave_keys_use_the_same_pattern() {
        assert_eq!(
            command_for(KeyCode::KeyP),
            Some(Command::Request(PersistenceRequest::SavePattern("quicksave".into())))
        );
        assert_eq!(
            command_for(KeyCode::KeyL),
            Some(Command::Request(PersistenceRequest::LoadPattern("quicksave".into())))
        );
    }

    #[test]
    fn unbound_keys_do_nothing() {
        assert_eq!(command_for(KeyCode::KeyZ), None);
        assert_eq!(command_for(KeyCode::Digit9), None);
    }
}
