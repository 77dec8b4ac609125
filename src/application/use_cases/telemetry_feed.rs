use std::sync::{Arc, RwLock};
use std::time::Duration;

use rand::rngs::StdRng;
use rand::SeedableRng;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::domain::telemetry::Telemetry;

/// Read handle on the live telemetry readout.
#[derive(Clone, Default)]
pub struct TelemetryFeed {
    current: Arc<RwLock<Telemetry>>,
}

impl TelemetryFeed {
    pub fn current(&self) -> Telemetry {
        match self.current.read() {
            Ok(guard) => *guard,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }

    fn advance(&self, rng: &mut StdRng) {
        let mut guard = self
            .current
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *guard = guard.step(rng);
    }
}

/// Starts the background ticker. It stops once `session_end` turns true
/// or its sender is dropped.
pub fn spawn_telemetry(
    interval: Duration,
    mut session_end: watch::Receiver<bool>,
) -> (TelemetryFeed, JoinHandle<()>) {
    let feed = TelemetryFeed::default();
    let ticker_feed = feed.clone();

    let handle = tokio::spawn(async move {
        let mut rng = StdRng::from_entropy();
        let mut ticker = tokio::time::interval(interval);
        // first tick fires immediately
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => ticker_feed.advance(&mut rng),
                _ = session_end.wait_for(|ended| *ended) => break,
            }
        }
        debug!("Telemetry ticker stopped");
    });

    (feed, handle)
}
