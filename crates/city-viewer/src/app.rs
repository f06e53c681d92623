use crate::{
    config::Config,
    metrics::ViewerMetrics,
    net::{HttpSnapshotFetcher, SnapshotSource},
    poller::{retrieve_grid_dims, PollingController, SnapshotReader},
    render::{Layout, RenderSystem},
};
use anyhow::Context;
use std::{future::Future, sync::Arc, time::Duration};
use tokio::time::{interval, MissedTickBehavior};

/// The viewer after a successful startup: grid known, polling not yet running.
pub struct App<S = HttpSnapshotFetcher> {
    pub controller: PollingController<S>,
    pub reader: SnapshotReader,
    pub renderer: RenderSystem,
    frame_period: Duration,
}

impl App<HttpSnapshotFetcher> {
    /// Resolves the endpoint from `config` and runs the one-time startup fetch.
    pub async fn bootstrap(config: &Config, metrics: Arc<ViewerMetrics>) -> anyhow::Result<Self> {
        let fetcher = HttpSnapshotFetcher::from_config(config)?;
        tracing::info!(url = %fetcher.url(), "Retrieving city configuration");

        let renderer = RenderSystem::stdout(config.render);
        Self::with_source(Arc::new(fetcher), config, renderer, metrics).await
    }
}

impl<S: SnapshotSource> App<S> {
    /// Phase one runs here: without the grid size nothing is drawn, so any
    /// failure aborts startup.
    pub async fn with_source(
        source: Arc<S>,
        config: &Config,
        renderer: RenderSystem,
        metrics: Arc<ViewerMetrics>,
    ) -> anyhow::Result<Self> {
        let dims = retrieve_grid_dims(source.as_ref())
            .await
            .context("Failed to retrieve city configuration; the viewer cannot start")?;

        let layout = Layout::fit(config.resolution, dims);
        tracing::info!(
            grid = %dims,
            resolution = %config.resolution,
            tile_width_px = layout.tile_width_px,
            tile_height_px = layout.tile_height_px,
            offset_x_px = layout.offset_x_px,
            "City layout established"
        );

        let controller =
            PollingController::new(source, dims, config.update_interval(), metrics);
        let reader = controller.subscribe();
        Ok(Self {
            controller,
            reader,
            renderer,
            frame_period: config.frame_period(),
        })
    }

    /// Phase two: tick, poll and draw until `shutdown` resolves.
    pub async fn run<F>(mut self, shutdown: F) -> anyhow::Result<()>
    where
        F: Future<Output = ()>,
    {
        let mut ticker = interval(self.frame_period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        tokio::pin!(shutdown);

        tracing::info!(frame_period_ms = self.frame_period.as_millis() as u64, "Starting render loop");
        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    tracing::info!("Shutdown signal received.");
                    break;
                },
                Some(outcome) = self.controller.next_outcome() => {
                    self.controller.apply(outcome);
                },
                now = ticker.tick() => {
                    self.controller.on_tick(now);
                    // Nothing to draw until the first poll succeeds.
                    if let Some(snapshot) = self.reader.latest() {
                        self.renderer
                            .render_frame(&snapshot)
                            .context("Failed to draw frame")?;
                    }
                }
            }
        }

        tracing::info!(frames = self.renderer.frames(), "Viewer stopped.");
        Ok(())
    }
}
