use bevy::math::DVec2;
use bevy::prelude::*;
use bevy::window::PrimaryWindow;

use crate::simulation::session::LifeSession;
use crate::simulation::view::{CellSprite, Viewport};

const ALIVE_COLOR: Color = Color::srgb(0.024, 0.839, 0.627);
const DEAD_OUTLINE_COLOR: Color = Color::srgba(1.0, 1.0, 1.0, 0.06);
const BACKGROUND_COLOR: Color = Color::srgb(0.027, 0.231, 0.298);
const HOVER_COLOR: Color = Color::srgba(0.5, 0.5, 0.5, 0.3);

/// Below this cell size the dead-cell outlines turn into noise.
const OUTLINE_MIN_CELL_SIZE: f64 = 20.0;
/// Gap between neighbouring live cells, as a fraction of the cell size.
const CELL_GAP: f32 = 0.1;

pub struct SimulationRenderPlugin;

impl Plugin for SimulationRenderPlugin {
    fn build(&self, app: &mut App) {
        app.insert_resource(ClearColor(BACKGROUND_COLOR))
            .add_systems(PostUpdate, (render_cells, draw_hover_cursor));
    }
}

/// Converts a top-left pixel (y down) into the centre of the cell in world
/// space (origin at the window centre, y up).
pub fn sprite_center(sprite: &CellSprite, cell_size: f64, window: DVec2) -> Vec2 {
    let half = cell_size / 2.0;
    Vec2::new(
        (sprite.pixel.x + half - window.x / 2.0) as f32,
        (window.y / 2.0 - (sprite.pixel.y + half)) as f32,
    )
}

fn render_cells(mut gizmos: Gizmos, session: Res<LifeSession>, viewport: Res<Viewport>) {
    let cell_size = viewport.cell_size;
    let outlines = cell_size >= OUTLINE_MIN_CELL_SIZE;
    let full = Vec2::splat(cell_size as f32);
    let body = full * (1.0 - CELL_GAP);

    for sprite in viewport.visible_cells(session.grid()) {
        let center = Isometry2d::from_translation(sprite_center(&sprite, cell_size, viewport.size));
        if sprite.alive {
            // Gizmos only stroke, so nest shrinking rectangles to fill the cell.
            let mut size = body;
            while size.x > 1.0 {
                gizmos.rect_2d(center, size, ALIVE_COLOR);
                size -= Vec2::splat(2.0);
            }
        } else if outlines {
            gizmos.rect_2d(center, full, DEAD_OUTLINE_COLOR);
        }
    }
}

fn draw_hover_cursor(
    window: Query<&Window, With<PrimaryWindow>>,
    viewport: Res<Viewport>,
    mut gizmos: Gizmos,
) {
    let Ok(window) = window.single() else {
        return;
    };
    let Some(cursor) = window.cursor_position() else {
        return;
    };
    let cell = viewport.pixel_to_grid(DVec2::new(cursor.x as f64, cursor.y as f64));
    let sprite = CellSprite {
        cell,
        pixel: viewport.grid_to_pixel(cell),
        alive: false,
    };
    gizmos.rect_2d(
        Isometry2d::from_translation(sprite_center(&sprite, viewport.cell_size, viewport.size)),
        Vec2::splat(viewport.cell_size as f32 * 0.9),
        HOVER_COLOR,
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simulation::coords::Cell;

    #[test]
    fn origin_cell_sits_right_of_and_below_the_window_centre() {
        let window = DVec2::new(200.0, 100.0);
        let sprite = CellSprite {
            cell: Cell::ORIGIN,
            pixel: DVec2::new(100.0, 50.0),
            alive: true,
        };
        assert_eq!(sprite_center(&sprite, 20.0, window), Vec2::new(10.0, -10.0));
    }

    #[test]
    fn rows_above_the_centre_have_positive_world_y() {
        let window = DVec2::new(200.0, 100.0);
        let sprite = CellSprite {
            cell: Cell::new(-1, -1),
            pixel: DVec2::new(80.0, 30.0),
            alive: false,
        };
        assert_eq!(sprite_center(&sprite, 20.0, window), Vec2::new(-10.0, 10.0));
    }
}
