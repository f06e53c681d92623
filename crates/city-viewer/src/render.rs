use crate::config::{RenderMode, Resolution};
use crate::tiles::{car_tile, glyph, TileGrid};
use std::{collections::BTreeSet, io::Write, sync::Arc};
use world_api::{GridDims, WorldSnapshot};

/// Where the city lands on a screen of the configured resolution.
///
/// The city is drawn as a square whose side is the screen height, centred
/// horizontally.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Layout {
    pub side_px: f32,
    pub tile_width_px: f32,
    pub tile_height_px: f32,
    pub offset_x_px: f32,
}

impl Layout {
    pub fn fit(resolution: Resolution, dims: GridDims) -> Self {
        let side_px = resolution.height as f32;
        Self {
            side_px,
            tile_width_px: side_px / dims.width.max(1) as f32,
            tile_height_px: side_px / dims.height.max(1) as f32,
            offset_x_px: (resolution.width as f32 - side_px) / 2.0,
        }
    }
}

/// Draws the latest snapshot, redrawing only when it changed.
pub struct RenderSystem {
    mode: RenderMode,
    out: Box<dyn Write + Send>,
    last_drawn: Option<Arc<WorldSnapshot>>,
    frames: u64,
}

impl RenderSystem {
    pub fn new(mode: RenderMode, out: Box<dyn Write + Send>) -> Self {
        Self {
            mode,
            out,
            last_drawn: None,
            frames: 0,
        }
    }

    pub fn stdout(mode: RenderMode) -> Self {
        Self::new(mode, Box::new(std::io::stdout()))
    }

    pub fn frames(&self) -> u64 {
        self.frames
    }

    /// Returns `true` if a frame was actually drawn.
    pub fn render_frame(&mut self, snapshot: &Arc<WorldSnapshot>) -> anyhow::Result<bool> {
        if let Some(previous) = &self.last_drawn {
            if Arc::ptr_eq(previous, snapshot) {
                return Ok(false);
            }
        }

        let tiles = TileGrid::compose(snapshot);
        match self.mode {
            RenderMode::Ascii => self.draw_ascii(snapshot, &tiles)?,
            RenderMode::Log => {
                tracing::debug!(
                    frame = self.frames,
                    customers = snapshot.customers.len(),
                    cars = snapshot.cars.len(),
                    drawn_customers = snapshot
                        .customers
                        .values()
                        .filter(|c| c.overlay_position().is_some())
                        .count(),
                    "Rendering frame"
                );
                for (id, car) in &snapshot.cars {
                    let (x, y) = tiles.dims().coordinates(car.position).unwrap_or_default();
                    tracing::trace!(car_id = %id, team_id = car.team_id, x, y, "Car position");
                }
            }
        }

        self.last_drawn = Some(snapshot.clone());
        self.frames += 1;
        Ok(true)
    }

    fn draw_ascii(&mut self, snapshot: &WorldSnapshot, tiles: &TileGrid) -> std::io::Result<()> {
        // Clear screen, cursor home.
        write!(self.out, "\x1b[2J\x1b[H")?;
        for row in tiles.rows_top_down() {
            let line: String = row.iter().map(|&code| glyph(code)).collect();
            writeln!(self.out, "{line}")?;
        }

        let teams: BTreeSet<u32> = snapshot.cars.values().map(|car| car.team_id).collect();
        let legend: Vec<String> = teams
            .iter()
            .map(|&team_id| {
                let symbol = glyph(car_tile(team_id));
                match snapshot.team_name(team_id) {
                    Some(name) if !name.is_empty() => format!("{symbol}={name}"),
                    _ => format!("{symbol}=team {team_id}"),
                }
            })
            .collect();
        writeln!(
            self.out,
            "frame {} | {} customers | {} cars | {}",
            self.frames,
            snapshot.customers.len(),
            snapshot.cars.len(),
            legend.join(" ")
        )?;
        self.out.flush()
    }
}
