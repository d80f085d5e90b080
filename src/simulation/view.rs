use std::ops::RangeInclusive;

use bevy::input::mouse::MouseWheel;
use bevy::math::DVec2;
use bevy::prelude::*;
use bevy::window::PrimaryWindow;

use crate::config::{GameConfig, ViewConfig};
use crate::persistence::PanOffset;
use crate::simulation::coords::Cell;
use crate::simulation::grid::LifeGrid;


pub struct ViewPlugin;

impl Plugin for ViewPlugin {
    fn build(&self, app: &mut App) {
        let config = app
            .world()
            .get_resource::<GameConfig>()
            .cloned()
            .unwrap_or_default();
        app.insert_resource(Viewport::from_config(&config.view))
            .add_systems(PreUpdate, track_window_size)
            .add_systems(Update, zoom_view);
    }
}

// --- Coordinate mapping ---
// Pixel space has its origin at the top-left of the window with y growing
// downwards; columns map to x and rows map to y.

/// Top-left pixel of `cell`.
#[inline]
pub fn grid_to_pixel(cell: Cell, pan: DVec2, cell_size: f64, center: DVec2) -> DVec2 {
    DVec2::new(
        cell.col as f64 * cell_size + pan.x + center.x,
        cell.row as f64 * cell_size + pan.y + center.y,
    )
}

/// Fractional grid position under `pixel`, x = column, y = row.
#[inline]
pub fn pixel_to_grid_f(pixel: DVec2, pan: DVec2, cell_size: f64, center: DVec2) -> DVec2 {
    (pixel - center - pan) / cell_size
}

/// Upper bound, in cells, on the rounding error of one trip through pixel
/// space at these magnitudes.
#[inline]
fn rounding_slack(pixel: f64, pan: f64, center: f64, cell_size: f64) -> f64 {
    8.0 * f64::EPSILON * (pixel.abs() + pan.abs() + center.abs()) / cell_size
}

/// Cell containing `pixel`: `floor((pixel - center - pan) / cell_size)`.
///
/// Floors, so negative coordinates land correctly. Before flooring the
/// position is nudged up by the rounding slack only, so a cell's own
/// top-left corner maps back onto it while a pixel measurably left of a
/// boundary still lands in the cell before it.
#[inline]
pub fn pixel_to_grid(pixel: DVec2, pan: DVec2, cell_size: f64, center: DVec2) -> Cell {
    let g = pixel_to_grid_f(pixel, pan, cell_size, center);
    let slack_x = rounding_slack(pixel.x, pan.x, center.x, cell_size);
    let slack_y = rounding_slack(pixel.y, pan.y, center.y, cell_size);
    Cell::new((g.y + slack_y).floor() as i64, (g.x + slack_x).floor() as i64)
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VisibleRect {
    pub rows: RangeInclusive<i64>,
    pub cols: RangeInclusive<i64>,
}

impl VisibleRect {
    pub fn contains(&self, cell: Cell) -> bool {
        self.rows.contains(&cell.row) && self.cols.contains(&cell.col)
    }

    pub fn cell_count(&self) -> u64 {
        let span = |r: &RangeInclusive<i64>| (r.end() - r.start() + 1).max(0) as u64;
        span(&self.rows) * span(&self.cols)
    }
}

/// Cells whose projection touches a `size` viewport, padded by `margin` cells.
pub fn visible_rect(size: DVec2, pan: DVec2, cell_size: f64, margin: i64) -> VisibleRect {
    let center = size / 2.0;
    let min = pixel_to_grid(DVec2::ZERO, pan, cell_size, center);
    let max = pixel_to_grid(size, pan, cell_size, center);
    VisibleRect {
        rows: (min.row - margin)..=(max.row + margin),
        cols: (min.col - margin)..=(max.col + margin),
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ZoomDirection {
    In,
    Out,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ZoomLimits {
    pub min: f64,
    pub max: f64,
    pub step: f64,
}

impl From<&ViewConfig> for ZoomLimits {
    fn from(config: &ViewConfig) -> Self {
        Self {
            min: config.min_cell_size,
            max: config.max_cell_size,
            step: config.zoom_step,
        }
    }
}

/// Center-preserving zoom: the grid position under the viewport center is the
/// same before and after. Returns the new cell size and pan.
pub fn zoom(direction: ZoomDirection, cell_size: f64, pan: DVec2, limits: ZoomLimits) -> (f64, DVec2) {
    let target = match direction {
        ZoomDirection::In => cell_size + limits.step,
        ZoomDirection::Out => cell_size - limits.step,
    };
    let new_size = target.clamp(limits.min, limits.max);
    if new_size == cell_size {
        return (cell_size, pan);
    }
    // The center sits at grid position -pan / cell_size.
    let anchor = -pan / cell_size;
    (new_size, -anchor * new_size)
}

/// One entry of the render list.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CellSprite {
    pub cell: Cell,
    pub pixel: DVec2,
    pub alive: bool,
}

// --- Viewport resource ---

#[derive(Resource, Clone, Debug, PartialEq)]
pub struct Viewport {
    pub pan: DVec2,
    pub cell_size: f64,
    /// Window size in logical pixels.
    pub size: DVec2,
    limits: ZoomLimits,
    default_cell_size: f64,
    margin: i64,
}

impl Default for Viewport {
    fn default() -> Self {
        Self::from_config(&ViewConfig::default())
    }
}

impl Viewport {
    pub fn from_config(config: &ViewConfig) -> Self {
        Self {
            pan: DVec2::ZERO,
            cell_size: config.default_cell_size,
            size: DVec2::new(1280.0, 720.0),
            limits: ZoomLimits::from(config),
            default_cell_size: config.default_cell_size,
            margin: config.visible_margin,
        }
    }

    #[inline]
    pub fn center(&self) -> DVec2 {
        self.size / 2.0
    }

    pub fn grid_to_pixel(&self, cell: Cell) -> DVec2 {
        grid_to_pixel(cell, self.pan, self.cell_size, self.center())
    }

    pub fn pixel_to_grid(&self, pixel: DVec2) -> Cell {
        pixel_to_grid(pixel, self.pan, self.cell_size, self.center())
    }

    pub fn center_cell(&self) -> Cell {
        self.pixel_to_grid(self.center())
    }

    pub fn visible_rect(&self) -> VisibleRect {
        visible_rect(self.size, self.pan, self.cell_size, self.margin)
    }

    /// Returns `true` if the cell size changed.
    pub fn zoom(&mut self, direction: ZoomDirection) -> bool {
        let (cell_size, pan) = zoom(direction, self.cell_size, self.pan, self.limits);
        let changed = cell_size != self.cell_size;
        self.cell_size = cell_size;
        self.pan = pan;
        changed
    }

    pub fn reset(&mut self) {
        self.pan = DVec2::ZERO;
        self.cell_size = self.default_cell_size;
    }

    pub fn pan_offset(&self) -> PanOffset {
        PanOffset {
            x: self.pan.x,
            y: self.pan.y,
        }
    }

    /// Applies a saved pan and zoom, clamping the zoom to the allowed range.
    pub fn restore(&mut self, pan: PanOffset, cell_size: f64) {
        self.pan = DVec2::new(pan.x, pan.y);
        self.cell_size = if cell_size.is_finite() {
            cell_size.clamp(self.limits.min, self.limits.max)
        } else {
            self.default_cell_size
        };
    }

    /// Every cell inside [`Self::visible_rect`] with its pixel position.
    pub fn visible_cells(&self, grid: &LifeGrid) -> Vec<CellSprite> {
        let rect = self.visible_rect();
        let mut sprites = Vec::with_capacity(rect.cell_count() as usize);
        for row in rect.rows.clone() {
            for col in rect.cols.clone() {
                let cell = Cell::new(row, col);
                sprites.push(CellSprite {
                    cell,
                    pixel: self.grid_to_pixel(cell),
                    alive: grid.is_alive(cell),
                });
            }
        }
        sprites
    }
}

// --- Systems ---

fn track_window_size(window: Query<&Window, With<PrimaryWindow>>, mut viewport: ResMut<Viewport>) {
    let Ok(window) = window.single() else {
        return;
    };
    let size = DVec2::new(window.width() as f64, window.height() as f64);
    if viewport.size != size && size.x > 0.0 && size.y > 0.0 {
        viewport.size = size;
    }
}

fn zoom_view(
    mut wheel: MessageReader<MouseWheel>,
    keys: Res<ButtonInput<KeyCode>>,
    mut viewport: ResMut<Viewport>,
) {
    let mut directions: Vec<ZoomDirection> = wheel
        .read()
        .filter(|ev| ev.y != 0.0)
        .map(|ev| if ev.y > 0.0 { ZoomDirection::In } else { ZoomDirection::Out })
        .collect();
    if keys.just_pressed(KeyCode::Equal) || keys.just_pressed(KeyCode::NumpadAdd) {
        directions.push(ZoomDirection::In);
    }
    if keys.just_pressed(KeyCode::Minus) || keys.just_pressed(KeyCode::NumpadSubtract) {
        directions.push(ZoomDirection::Out);
    }

    for direction in directions {
        if viewport.zoom(direction) {
            debug!("cell size now {}", viewport.cell_size);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const LIMITS: ZoomLimits = ZoomLimits {
        min: 15.0,
        max: 40.0,
        step: 5.0,
    };

    #[test]
    fn origin_maps_to_center_plus_pan() {
        let p = grid_to_pixel(Cell::ORIGIN, DVec2::new(3.0, -4.0), 25.0, DVec2::new(400.0, 300.0));
        assert_eq!(p, DVec2::new(403.0, 296.0));
        let c = pixel_to_grid(DVec2::new(402.9, 296.0), DVec2::new(3.0, -4.0), 25.0, DVec2::new(400.0, 300.0));
        assert_eq!(c, Cell::new(0, -1));
    }

    #[test]
    fn negative_pixels_floor_to_negative_cells() {
        let c = pixel_to_grid(DVec2::new(-1.0, -26.0), DVec2::ZERO, 25.0, DVec2::ZERO);
        assert_eq!(c, Cell::new(-2, -1));
    }

    #[test]
    fn visible_rect_covers_the_window_with_margin() {
        let rect = visible_rect(DVec2::new(100.0, 50.0), DVec2::ZERO, 25.0, 2);
        // Window spans x in [-50, 50] and y in [-25, 25] around the origin.
        assert_eq!(rect.cols, -4..=4);
        assert_eq!(rect.rows, -3..=3);
        assert!(rect.contains(Cell::new(-3, 4)));
        assert!(!rect.contains(Cell::new(0, 5)));
    }

    #[test]
    fn zoom_is_clamped() {
        assert_eq!(zoom(ZoomDirection::In, 40.0, DVec2::new(7.0, 1.0), LIMITS), (40.0, DVec2::new(7.0, 1.0)));
        assert_eq!(zoom(ZoomDirection::Out, 15.0, DVec2::ZERO, LIMITS).0, 15.0);
        assert_eq!(zoom(ZoomDirection::Out, 17.0, DVec2::ZERO, LIMITS).0, 15.0);
        assert_eq!(zoom(ZoomDirection::In, 25.0, DVec2::ZERO, LIMITS).0, 30.0);
    }

    #[test]
    fn zoom_keeps_the_center_fixed() {
        let center = DVec2::new(640.0, 360.0);
        let pan = DVec2::new(-137.0, 52.5);
        let before = pixel_to_grid_f(center, pan, 25.0, center);
        let (size, new_pan) = zoom(ZoomDirection::In, 25.0, pan, LIMITS);
        let after = pixel_to_grid_f(center, new_pan, size, center);
        assert!((before - after).length() < 1e-9);
    }

    #[test]
    fn viewport_zoom_reports_change() {
        let mut viewport = Viewport::default();
        viewport.cell_size = 40.0;
        assert!(!viewport.zoom(ZoomDirection::In));
        assert!(viewport.zoom(ZoomDirection::Out));
        assert_eq!(viewport.cell_size, 35.0);
    }

    #[test]
    fn restore_clamps_cell_size() {
        let mut viewport = Viewport::default();
        viewport.restore(PanOffset { x: 5.0, y: 6.0 }, 400.0);
        assert_eq!(viewport.cell_size, 40.0);
        assert_eq!(viewport.pan, DVec2::new(5.0, 6.0));
        viewport.restore(PanOffset { x: 0.0, y: 0.0 }, f64::NAN);
        assert_eq!(viewport.cell_size, 25.0);
    }

    #[test]
    fn visible_cells_flag_live_cells() {
        let mut viewport = Viewport::default();
        viewport.size = DVec2::new(100.0, 100.0);
        let grid = LifeGrid::from_cells([Cell::new(0, 0), Cell::new(1000, 1000)]);
        let sprites = viewport.visible_cells(&grid);
        assert_eq!(sprites.len() as u64, viewport.visible_rect().cell_count());
        let alive: Vec<_> = sprites.iter().filter(|s| s.alive).collect();
        assert_eq!(alive.len(), 1);
        assert_eq!(alive[0].cell, Cell::ORIGIN);
        assert_eq!(alive[0].pixel, DVec2::new(50.0, 50.0));
    }

    #[test]
    fn pixel_just_left_of_a_boundary_stays_in_the_previous_cell() {
        let center = DVec2::new(100.0, 100.0);
        let corner = grid_to_pixel(Cell::new(0, 3), DVec2::ZERO, 25.0, center);
        assert_eq!(pixel_to_grid(corner, DVec2::ZERO, 25.0, center), Cell::new(0, 3));
        let before = corner - DVec2::new(1e-5, 0.0);
        assert_eq!(pixel_to_grid(before, DVec2::ZERO, 25.0, center), Cell::new(0, 2));
        let above = corner - DVec2::new(0.0, 1e-5);
        assert_eq!(pixel_to_grid(above, DVec2::ZERO, 25.0, center), Cell::new(-1, 3));
    }

    proptest! {
        #[test]
        fn grid_pixel_round_trip(
            row in -1_000_000i64..1_000_000,
            col in -1_000_000i64..1_000_000,
            pan_x in -100_000.0f64..100_000.0,
            pan_y in -100_000.0f64..100_000.0,
            cell_size in 15.0f64..=40.0,
            width in 1.0f64..4000.0,
            height in 1.0f64..4000.0,
        ) {
            let cell = Cell::new(row, col);
            let pan = DVec2::new(pan_x, pan_y);
            let center = DVec2::new(width, height) / 2.0;
            let pixel = grid_to_pixel(cell, pan, cell_size, center);
            prop_assert_eq!(pixel_to_grid(pixel, pan, cell_size, center), cell);
            // Anywhere inside the cell maps back to it as well.
            let inside = pixel + DVec2::splat(cell_size * 0.5);
            prop_assert_eq!(pixel_to_grid(inside, pan, cell_size, center), cell);
        }
    }
}
