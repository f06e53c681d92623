use clap::{Parser, ValueEnum};
use reqwest::Url;
use std::{fmt, str::FromStr, time::Duration};
use thiserror::Error;
use world_api::WORLD_PATH;

/// Address used when no server address is given. A native viewer has no
/// hosting page, so "same origin" means the simulation server's default bind.
pub const SAME_ORIGIN_ADDR: &str = "http://localhost:8080";

/// `city-viewer` - a live terminal view of a running city simulation.
///
/// The viewer reads the grid size from the server once at startup, then
/// polls the world endpoint at a bounded rate and redraws the tile grid
/// whenever a new snapshot arrives.
#[derive(Parser, Debug, Clone)]
#[command(version, about, long_about = None)]
pub struct Config {
    /// Address of the simulation server, e.g. `http://localhost:8080`.
    ///
    /// An empty value means "same origin" and resolves to the local default.
    #[arg(long, env = "CITY_SERVER_ADDR", default_value = SAME_ORIGIN_ADDR)]
    pub server_addr: String,

    /// Minimum spacing between two poll attempts, in milliseconds.
    ///
    /// Measured from the start of one attempt to the start of the next, so a
    /// slow response does not trigger an immediate follow-up request.
    #[arg(
        long,
        env = "CITY_UPDATE_INTERVAL_MS",
        default_value_t = 1000,
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    pub update_interval_ms: u64,

    /// Target render resolution as `WIDTHxHEIGHT` pixels.
    #[arg(long, env = "CITY_RESOLUTION", default_value = "1280x1100")]
    pub resolution: Resolution,

    /// How many frames per second the render loop ticks.
    #[arg(
        long,
        env = "CITY_FRAME_RATE_HZ",
        default_value_t = 30,
        value_parser = clap::value_parser!(u32).range(1..=240)
    )]
    pub frame_rate_hz: u32,

    /// Upper bound on a single world request, in milliseconds.
    ///
    /// Without it a request that never answers blocks further polling.
    #[arg(long, env = "CITY_FETCH_TIMEOUT_MS", value_parser = clap::value_parser!(u64).range(1..))]
    pub fetch_timeout_ms: Option<u64>,

    /// Team token sent as the `Authorization` header.
    #[arg(long, env = "CITY_AUTH_TOKEN")]
    pub auth_token: Option<AuthToken>,

    /// How frames are drawn.
    #[arg(long, env = "CITY_RENDER", value_enum, default_value_t = RenderMode::Ascii)]
    pub render: RenderMode,

    /// Listen address for the Prometheus metrics endpoint. Disabled if unset.
    #[arg(long, env = "CITY_METRICS_LISTEN_ADDR")]
    pub metrics_listen_addr: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum RenderMode {
    /// Draw the grid as text on stdout.
    Ascii,
    /// Emit one structured log line per frame.
    Log,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("server address `{addr}` is not a valid URL: {reason}")]
    InvalidServerAddr { addr: String, reason: String },
    #[error("server address `{addr}` uses unsupported scheme `{scheme}`")]
    UnsupportedScheme { addr: String, scheme: String },
}

impl Config {
    pub fn update_interval(&self) -> Duration {
        Duration::from_millis(self.update_interval_ms)
    }

    pub fn frame_period(&self) -> Duration {
        Duration::from_secs_f64(1.0 / f64::from(self.frame_rate_hz.max(1)))
    }

    pub fn fetch_timeout(&self) -> Option<Duration> {
        self.fetch_timeout_ms.map(Duration::from_millis)
    }

    pub fn world_url(&self) -> Result<Url, ConfigError> {
        resolve_world_url(&self.server_addr)
    }
}

/// Builds the full world endpoint from a server address.
pub fn resolve_world_url(server_addr: &str) -> Result<Url, ConfigError> {
    let base = match server_addr.trim() {
        "" => SAME_ORIGIN_ADDR.to_owned(),
        addr if addr.contains("://") => addr.to_owned(),
        addr => format!("http://{addr}"),
    };
    let raw = format!("{}{}", base.trim_end_matches('/'), WORLD_PATH);

    let url = Url::parse(&raw).map_err(|e| ConfigError::InvalidServerAddr {
        addr: server_addr.to_owned(),
        reason: e.to_string(),
    })?;

    match url.scheme() {
        "http" | "https" => Ok(url),
        scheme => Err(ConfigError::UnsupportedScheme {
            addr: server_addr.to_owned(),
            scheme: scheme.to_owned(),
        }),
    }
}

/// Render target size in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("expected resolution as WIDTHxHEIGHT with positive numbers, got `{0}`")]
pub struct ResolutionError(String);

impl FromStr for Resolution {
    type Err = ResolutionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bad = || ResolutionError(s.to_owned());
        let (w, h) = s
            .trim()
            .split_once(|c: char| c == 'x' || c == 'X')
            .ok_or_else(bad)?;
        let width: u32 = w.trim().parse().map_err(|_| bad())?;
        let height: u32 = h.trim().parse().map_err(|_| bad())?;
        if width == 0 || height == 0 {
            return Err(bad());
        }
        Ok(Self { width, height })
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Team token. Kept out of `Debug` output since the config is logged at startup.
#[derive(Clone, PartialEq, Eq)]
pub struct AuthToken(String);

impl AuthToken {
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl From<String> for AuthToken {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl fmt::Debug for AuthToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AuthToken(***)")
    }
}
