//! Point-in-time world state as reported by the simulation server.

use crate::grid::{GridDims, Position};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use thiserror::Error;

/// One immutable copy of the server's world state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorldSnapshot {
    pub width: u32,
    pub height: u32,
    /// Passability per cell, row-major, `width * height` entries.
    #[serde(deserialize_with = "truthy_cells")]
    pub grid: Vec<bool>,
    pub customers: BTreeMap<String, Customer>,
    pub cars: BTreeMap<String, Car>,
    #[serde(default)]
    pub teams: BTreeMap<String, Team>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Customer {
    pub status: CustomerStatus,
    pub origin: Position,
    pub destination: Position,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CustomerStatus {
    Waiting,
    #[serde(alias = "in-transit", alias = "transit", alias = "picked_up")]
    InTransit,
    Delivered,
    /// Any status this client does not know about.
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Car {
    pub position: Position,
    pub team_id: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Team {
    #[serde(default)]
    pub name: String,
}

/// Structural problems that would break row-major indexing.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ShapeError {
    #[error("grid has no cells ({0})")]
    EmptyGrid(GridDims),
    #[error("grid of {dims} needs {expected} cells, server sent {actual}")]
    GridLength {
        dims: GridDims,
        expected: usize,
        actual: usize,
    },
    #[error("{entity} sits at position {position}, outside the {cells}-cell grid")]
    PositionOutOfBounds {
        entity: String,
        position: Position,
        cells: usize,
    },
    #[error("grid changed from {expected} to {actual} mid-session")]
    DimensionsChanged { expected: GridDims, actual: GridDims },
}

impl Customer {
    /// Cell this customer occupies on the map, if it is drawn at all.
    ///
    /// Waiting customers stand at their origin, delivered ones at their
    /// destination; customers riding in a car are drawn by the car.
    pub fn overlay_position(&self) -> Option<Position> {
        match self.status {
            CustomerStatus::Waiting => Some(self.origin),
            CustomerStatus::Delivered => Some(self.destination),
            CustomerStatus::InTransit | CustomerStatus::Other => None,
        }
    }
}

impl WorldSnapshot {
    pub fn dims(&self) -> GridDims {
        GridDims::new(self.width, self.height)
    }

    pub fn is_passable(&self, position: Position) -> bool {
        self.grid.get(position).copied().unwrap_or(false)
    }

    pub fn team_name(&self, team_id: u32) -> Option<&str> {
        self.teams.get(&team_id.to_string()).map(|t| t.name.as_str())
    }

    /// Checks that every index in the snapshot addresses a real cell.
    pub fn validate(&self) -> Result<(), ShapeError> {
        let dims = self.dims();
        if dims.is_empty() {
            return Err(ShapeError::EmptyGrid(dims));
        }
        let cells = dims.checked_cell_count().ok_or(ShapeError::GridLength {
            dims,
            expected: usize::MAX,
            actual: self.grid.len(),
        })?;
        if self.grid.len() != cells {
            return Err(ShapeError::GridLength {
                dims,
                expected: cells,
                actual: self.grid.len(),
            });
        }

        let check = |entity: String, position: Position| {
            if position < cells {
                Ok(())
            } else {
                Err(ShapeError::PositionOutOfBounds {
                    entity,
                    position,
                    cells,
                })
            }
        };
        for (id, customer) in &self.customers {
            check(format!("customer {id} origin"), customer.origin)?;
            check(format!("customer {id} destination"), customer.destination)?;
        }
        for (id, car) in &self.cars {
            check(format!("car {id}"), car.position)?;
        }
        Ok(())
    }

    /// Fails if this snapshot's grid differs from the one established at startup.
    pub fn ensure_dims(&self, expected: GridDims) -> Result<(), ShapeError> {
        let actual = self.dims();
        if actual != expected {
            return Err(ShapeError::DimensionsChanged { expected, actual });
        }
        Ok(())
    }
}

/// JavaScript-style truthiness, which is what the server's grid encoding assumes.
fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map_or(true, |f| f != 0.0 && !f.is_nan()),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

fn truthy_cells<'de, D>(deserializer: D) -> Result<Vec<bool>, D::Error>
where
    D: Deserializer<'de>,
{
    let cells = Vec::<Value>::deserialize(deserializer)?;
    Ok(cells.iter().map(is_truthy).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn snapshot(width: u32, height: u32) -> WorldSnapshot {
        WorldSnapshot {
            width,
            height,
            grid: vec![true; (width * height) as usize],
            customers: BTreeMap::new(),
            cars: BTreeMap::new(),
            teams: BTreeMap::new(),
        }
    }

    #[test]
    fn grid_cells_accept_truthy_values() {
        let world: WorldSnapshot = serde_json::from_value(json!({
            "width": 3, "height": 2,
            "grid": [true, 1, "x", false, 0, null],
            "customers": {}, "cars": {}
        }))
        .unwrap();
        assert_eq!(world.grid, vec![true, true, true, false, false, false]);
        assert!(world.teams.is_empty());
    }

    #[test]
    fn unknown_customer_status_is_tolerated() {
        let customer: Customer = serde_json::from_value(json!({
            "status": "abandoned", "origin": 1, "destination": 2
        }))
        .unwrap();
        assert_eq!(customer.status, CustomerStatus::Other);
        assert_eq!(customer.overlay_position(), None);
    }

    #[test]
    fn in_transit_spellings_map_to_one_status() {
        for spelling in ["in_transit", "in-transit", "transit"] {
            let status: CustomerStatus = serde_json::from_value(json!(spelling)).unwrap();
            assert_eq!(status, CustomerStatus::InTransit, "{spelling}");
        }
    }

    #[test]
    fn overlay_position_depends_on_status() {
        let mut customer = Customer {
            status: CustomerStatus::Waiting,
            origin: 0,
            destination: 7,
        };
        assert_eq!(customer.overlay_position(), Some(0));
        customer.status = CustomerStatus::Delivered;
        assert_eq!(customer.overlay_position(), Some(7));
        customer.status = CustomerStatus::InTransit;
        assert_eq!(customer.overlay_position(), None);
    }

    #[test]
    fn validate_rejects_short_grid() {
        let mut world = snapshot(3, 3);
        world.grid.pop();
        assert!(matches!(
            world.validate(),
            Err(ShapeError::GridLength { expected: 9, actual: 8, .. })
        ));
    }

    #[test]
    fn validate_rejects_positions_outside_grid() {
        let mut world = snapshot(2, 2);
        world.cars.insert("7".into(), Car { position: 4, team_id: 0 });
        let err = world.validate().unwrap_err();
        assert_eq!(
            err,
            ShapeError::PositionOutOfBounds {
                entity: "car 7".into(),
                position: 4,
                cells: 4
            }
        );
    }

    #[test]
    fn validate_rejects_empty_grid() {
        let world = snapshot(0, 5);
        assert!(matches!(world.validate(), Err(ShapeError::EmptyGrid(_))));
    }

    #[test]
    fn ensure_dims_reports_both_shapes() {
        let world = snapshot(4, 4);
        assert!(world.ensure_dims(GridDims::new(4, 4)).is_ok());
        assert_eq!(
            world.ensure_dims(GridDims::new(3, 3)),
            Err(ShapeError::DimensionsChanged {
                expected: GridDims::new(3, 3),
                actual: GridDims::new(4, 4),
            })
        );
    }

    #[test]
    fn team_names_are_looked_up_by_id() {
        let mut world = snapshot(1, 1);
        world.teams.insert("2".into(), Team { name: "Ada-and-Bob".into() });
        assert_eq!(world.team_name(2), Some("Ada-and-Bob"));
        assert_eq!(world.team_name(3), None);
    }
}
