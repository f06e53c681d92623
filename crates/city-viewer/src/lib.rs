// src/lib.rs
//! Terminal viewer for a running city simulation.
//!
//! The viewer polls the simulation server's world endpoint and draws the
//! city as a tile grid.
//!
//! ```text
//! App  (app.rs)
//!   ├── PollingController  (poller.rs) ← rate limit, single in-flight fetch
//!   │     └── HttpSnapshotFetcher  (net.rs) ← one GET + parse, no retry
//!   └── RenderSystem  (render.rs) ← reads the latest snapshot each tick
//!         └── TileGrid  (tiles.rs)
//! ```

pub mod app;
pub mod config;
pub mod metrics;
pub mod net;
pub mod poller;
pub mod render;
pub mod tiles;
