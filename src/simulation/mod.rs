use bevy::prelude::*;

pub mod coords;
pub mod engine;
pub mod grid;
pub mod patterns;
pub mod render;
pub mod run_loop;
pub mod session;
pub mod view;

use self::render::SimulationRenderPlugin;
use self::run_loop::RunLoopPlugin;
use self::session::LifeSession;
use self::view::ViewPlugin;

pub struct SimulationPlugin;

impl Plugin for SimulationPlugin {
    fn build(&self, app: &mut App) {
        app.init_resource::<LifeSession>();
        app.add_plugins(ViewPlugin);
        app.add_plugins(RunLoopPlugin);
        app.add_plugins(SimulationRenderPlugin);
    }
}
