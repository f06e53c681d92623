//! Tile-grid composition from a world snapshot.

use world_api::{GridDims, Position, WorldSnapshot};

/// Index into the city tileset.
pub type TileCode = u32;

pub const PASSABLE: TileCode = 0;
pub const IMPASSABLE: TileCode = 1;
pub const CUSTOMER: TileCode = 2;
/// Cars use one tile per team, starting here.
pub const CAR_BASE: TileCode = 3;

pub fn car_tile(team_id: u32) -> TileCode {
    CAR_BASE.saturating_add(team_id)
}

/// One tile code per cell, row-major, same layout as the snapshot grid.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TileGrid {
    dims: GridDims,
    tiles: Vec<TileCode>,
}

impl TileGrid {
    /// Overlays terrain, then customers, then cars. Later layers win a cell.
    pub fn compose(snapshot: &WorldSnapshot) -> Self {
        let dims = snapshot.dims();
        let mut tiles: Vec<TileCode> = snapshot
            .grid
            .iter()
            .map(|&passable| if passable { PASSABLE } else { IMPASSABLE })
            .collect();
        // Parsed snapshots already match; this only squares up hand-built ones.
        if let Some(cells) = dims.checked_cell_count() {
            tiles.resize(cells, IMPASSABLE);
        }

        let customers = snapshot
            .customers
            .values()
            .filter_map(|customer| customer.overlay_position())
            .map(|position| (position, CUSTOMER));
        let cars = snapshot
            .cars
            .values()
            .map(|car| (car.position, car_tile(car.team_id)));

        for (position, code) in customers.chain(cars) {
            put(&mut tiles, position, code);
        }

        Self { dims, tiles }
    }

    pub fn dims(&self) -> GridDims {
        self.dims
    }

    pub fn tiles(&self) -> &[TileCode] {
        &self.tiles
    }

    pub fn get(&self, position: Position) -> Option<TileCode> {
        self.tiles.get(position).copied()
    }

    /// Rows with the highest `y` first, the way the map is shown on screen.
    pub fn rows_top_down(&self) -> impl Iterator<Item = &[TileCode]> {
        self.tiles.chunks(self.dims.width.max(1) as usize).rev()
    }
}

fn put(tiles: &mut [TileCode], position: Position, code: TileCode) {
    match tiles.get_mut(position) {
        Some(cell) => *cell = code,
        None => tracing::trace!(position, code, "Ignoring overlay outside the grid"),
    }
}

/// Single-character rendering of a tile for the terminal view.
pub fn glyph(code: TileCode) -> char {
    match code {
        PASSABLE => '.',
        IMPASSABLE => '#',
        CUSTOMER => 'c',
        car => char::from_digit((car - CAR_BASE) % 36, 36)
            .map(|c| c.to_ascii_uppercase())
            .unwrap_or('?'),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use world_api::{Car, Customer, CustomerStatus};

    fn open_city(width: u32, height: u32) -> WorldSnapshot {
        WorldSnapshot {
            width,
            height,
            grid: vec![true; (width * height) as usize],
            customers: BTreeMap::new(),
            cars: BTreeMap::new(),
            teams: BTreeMap::new(),
        }
    }

    fn customer(status: CustomerStatus, origin: Position, destination: Position) -> Customer {
        Customer {
            status,
            origin,
            destination,
        }
    }

    #[test]
    fn terrain_maps_passability() {
        let mut world = open_city(2, 1);
        world.grid[1] = false;
        assert_eq!(TileGrid::compose(&world).tiles(), &[PASSABLE, IMPASSABLE]);
    }

    #[test]
    fn car_wins_over_customer_and_terrain() {
        let mut world = open_city(3, 3);
        world
            .customers
            .insert("c1".into(), customer(CustomerStatus::Waiting, 5, 0));
        world.cars.insert("1".into(), Car { position: 5, team_id: 1 });

        let tiles = TileGrid::compose(&world);
        assert_eq!(tiles.get(5), Some(4));
    }

    #[test]
    fn delivered_customers_show_at_destination_only() {
        let mut world = open_city(3, 3);
        world
            .customers
            .insert("a".into(), customer(CustomerStatus::Delivered, 1, 7));
        world
            .customers
            .insert("b".into(), customer(CustomerStatus::InTransit, 2, 8));

        let tiles = TileGrid::compose(&world);
        assert_eq!(tiles.get(7), Some(CUSTOMER));
        assert_eq!(tiles.get(1), Some(PASSABLE));
        assert_eq!(tiles.get(2), Some(PASSABLE));
        assert_eq!(tiles.get(8), Some(PASSABLE));
    }

    #[test]
    fn customer_at_first_cell_is_drawn() {
        let mut world = open_city(2, 2);
        world
            .customers
            .insert("a".into(), customer(CustomerStatus::Waiting, 0, 3));
        assert_eq!(TileGrid::compose(&world).get(0), Some(CUSTOMER));
    }

    #[test]
    fn overlays_outside_the_grid_are_ignored() {
        let mut world = open_city(2, 2);
        world.cars.insert("9".into(), Car { position: 40, team_id: 0 });
        let tiles = TileGrid::compose(&world);
        assert_eq!(tiles.tiles().len(), 4);
        assert!(tiles.tiles().iter().all(|&t| t == PASSABLE));
    }

    #[test]
    fn rows_are_listed_top_row_first() {
        let mut world = open_city(2, 2);
        world.grid[0] = false;
        let tiles = TileGrid::compose(&world);
        let rows: Vec<&[TileCode]> = tiles.rows_top_down().collect();
        assert_eq!(rows, vec![&[PASSABLE, PASSABLE][..], &[IMPASSABLE, PASSABLE][..]]);
    }

    #[test]
    fn glyphs_cover_every_layer() {
        assert_eq!(glyph(PASSABLE), '.');
        assert_eq!(glyph(IMPASSABLE), '#');
        assert_eq!(glyph(CUSTOMER), 'c');
        assert_eq!(glyph(car_tile(0)), '0');
        assert_eq!(glyph(car_tile(11)), 'B');
    }
}
