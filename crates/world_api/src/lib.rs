//! Wire types for the city simulation's `GET /api/v1/world` endpoint.
//!
//! The server reports the whole world on every request: a row-major
//! passability grid plus the customers and cars placed on it. This crate
//! owns the shape of that document, the tolerant parsing rules the viewer
//! relies on, and the checks that keep grid indexing sound.

pub mod grid;
pub mod parse;
pub mod snapshot;

pub use self::grid::{GridDims, Position};
pub use self::parse::{parse_world, ParseError, REQUIRED_FIELDS};
pub use self::snapshot::{Car, Customer, CustomerStatus, ShapeError, Team, WorldSnapshot};

/// Path of the world-state resource, relative to the server address.
pub const WORLD_PATH: &str = "/api/v1/world";
