use std::time::Duration;

use bevy::math::DVec2;
use bevy::prelude::*;
use bevy::window::PrimaryWindow;

use crate::config::{GameConfig, PointerConfig};
use crate::simulation::coords::Cell;
use crate::simulation::run_loop::RunLoopSet;
use crate::simulation::session::LifeSession;
use crate::simulation::view::Viewport;

pub struct PointerGesturePlugin;

impl Plugin for PointerGesturePlugin {
    fn build(&self, app: &mut App) {
        let config = app
            .world()
            .get_resource::<GameConfig>()
            .cloned()
            .unwrap_or_default();
        app.insert_resource(GestureController::new(&config.pointer))
            .add_systems(Update, handle_pointer.before(RunLoopSet));
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PointerButton {
    /// Tap toggles, drag pans.
    Primary,
    /// Always pans.
    Secondary,
}

#[derive(Debug)]
enum GestureState {
    Idle,
    Pressed {
        origin: DVec2,
        pan_at_press: DVec2,
        pending: Cell,
        confirm: Timer,
    },
    Panning {
        origin: DVec2,
        pan_at_press: DVec2,
    },
}

/// Tells taps from pans. A press only becomes a toggle if the pointer stays
/// within the threshold until release.
#[derive(Resource, Debug)]
pub struct GestureController {
    state: GestureState,
    threshold: f64,
    confirm_delay: Duration,
}

impl Default for GestureController {
    fn default() -> Self {
        Self::new(&PointerConfig::default())
    }
}

impl GestureController {
    pub fn new(config: &PointerConfig) -> Self {
        Self {
            state: GestureState::Idle,
            threshold: config.tap_threshold_px,
            confirm_delay: config.tap_confirm(),
        }
    }

    pub fn is_idle(&self) -> bool {
        matches!(self.state, GestureState::Idle)
    }

    pub fn is_panning(&self) -> bool {
        matches!(self.state, GestureState::Panning { .. })
    }

    /// The cell a tap would toggle right now, if any.
    pub fn pending_toggle(&self) -> Option<Cell> {
        match &self.state {
            GestureState::Pressed { pending, .. } => Some(*pending),
            _ => None,
        }
    }

    pub fn press(&mut self, button: PointerButton, pos: DVec2, viewport: &Viewport) {
        self.state = match button {
            PointerButton::Primary => GestureState::Pressed {
                origin: pos,
                pan_at_press: viewport.pan,
                pending: viewport.pixel_to_grid(pos),
                confirm: Timer::new(self.confirm_delay, TimerMode::Once),
            },
            PointerButton::Secondary => GestureState::Panning {
                origin: pos,
                pan_at_press: viewport.pan,
            },
        };
    }

    /// Pointer moved to `pos`. Returns `true` if the viewport was panned.
    pub fn drag(&mut self, pos: DVec2, viewport: &mut Viewport) -> bool {
        match self.state {
            GestureState::Idle => false,
            GestureState::Pressed {
                origin,
                pan_at_press,
                ..
            } => {
                if pos.distance(origin) <= self.threshold {
                    return false;
                }
                self.state = GestureState::Panning {
                    origin,
                    pan_at_press,
                };
                viewport.pan = pan_at_press + (pos - origin);
                true
            }
            GestureState::Panning {
                origin,
                pan_at_press,
            } => {
                let pan = pan_at_press + (pos - origin);
                if viewport.pan == pan {
                    return false;
                }
                viewport.pan = pan;
                true
            }
        }
    }

    /// Pointer released at `pos`. Returns the cell to toggle for a tap.
    pub fn release(&mut self, pos: DVec2, viewport: &mut Viewport) -> Option<Cell> {
        self.drag(pos, viewport);
        match std::mem::replace(&mut self.state, GestureState::Idle) {
            GestureState::Pressed { pending, .. } => Some(pending),
            _ => None,
        }
    }

    pub fn tick(&mut self, delta: Duration) {
        if let GestureState::Pressed { confirm, .. } = &mut self.state {
            confirm.tick(delta);
        }
    }

    /// The pointer went away without a release. A press held still past the
    /// confirmation delay still counts as a tap.
    pub fn cancel(&mut self) -> Option<Cell> {
        match std::mem::replace(&mut self.state, GestureState::Idle) {
            GestureState::Pressed {
                pending, confirm, ..
            } if confirm.is_finished() => Some(pending),
            _ => None,
        }
    }
}

const PAN_BUTTONS: [MouseButton; 2] = [MouseButton::Right, MouseButton::Middle];

fn handle_pointer(
    time: Res<Time>,
    buttons: Res<ButtonInput<MouseButton>>,
    window: Query<&Window, With<PrimaryWindow>>,
    mut controller: ResMut<GestureController>,
    mut viewport: ResMut<Viewport>,
    mut session: ResMut<LifeSession>,
) {
    controller.tick(time.delta());
    let Ok(window) = window.single() else {
        return;
    };

    let Some(cursor) = window.cursor_position() else {
        if let Some(cell) = controller.cancel() {
            let population = session.toggle(cell);
            debug!("toggled {:?} on pointer leave, population {}", cell, population);
        }
        return;
    };
    let pos = DVec2::new(cursor.x as f64, cursor.y as f64);

    if buttons.just_pressed(MouseButton::Left) {
        controller.press(PointerButton::Primary, pos, &viewport);
    } else if buttons.any_just_pressed(PAN_BUTTONS) {
        controller.press(PointerButton::Secondary, pos, &viewport);
    }

    if controller.is_idle() {
        return;
    }

    let held = buttons.pressed(MouseButton::Left) || buttons.any_pressed(PAN_BUTTONS);
    if held {
        controller.drag(pos, viewport.bypass_change_detection());
        viewport.set_changed();
    } else if let Some(cell) = controller.release(pos, &mut viewport) {
        let population = session.toggle(cell);
        debug!("toggled {:?}, population {}", cell, population);
    }
}
