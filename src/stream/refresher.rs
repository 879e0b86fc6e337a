use super::{Shared, StreamError};
use crate::net::Fetcher;
use hdsflow_media::parse_bootstrap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, warn};

/// Background worker for live streams: re-fetches the bootstrap once per
/// fragment duration and extends the queue to the new live edge.
pub(crate) struct LiveRefresher {
    shared: Arc<Shared>,
    fetcher: Arc<dyn Fetcher>,
    bootstrap_url: String,
    quality: Option<String>,
    min_interval: Duration,
}

impl LiveRefresher {
    pub(crate) fn new(
        shared: Arc<Shared>,
        fetcher: Arc<dyn Fetcher>,
        bootstrap_url: String,
        quality: Option<String>,
        min_interval: Duration,
    ) -> Self {
        Self {
            shared,
            fetcher,
            bootstrap_url,
            quality,
            min_interval,
        }
    }

    /// Run until shutdown.
    pub(crate) fn run(self) {
        debug!(url = %self.bootstrap_url, "Live refresher started");
        let mut cycle_start = Instant::now();

        while self.sleep_until(cycle_start + self.period()) {
            cycle_start = Instant::now();
            match self.refresh() {
                Ok(appended) => debug!(appended, "Live bootstrap refreshed"),
                // The new index is already installed at this point.
                Err(StreamError::Schedule(e)) => error!(
                    url = %self.bootstrap_url,
                    error = %e,
                    "Refreshed bootstrap installed, but the live queue cannot be extended"
                ),
                Err(e) => warn!(
                    url = %self.bootstrap_url,
                    error = %e,
                    "Live refresh failed, keeping previous bootstrap"
                ),
            }
        }

        debug!("Live refresher stopped");
    }

    /// Wall time of the most recent fragment, floored at the minimum interval.
    fn period(&self) -> Duration {
        let state = self.shared.state.lock();
        let index = &state.index;
        let secs = index
            .last_fragment_duration()
            .map_or(0.0, |duration| index.table_to_secs(duration as u64));
        Duration::from_secs_f64(secs).max(self.min_interval)
    }

    /// Sleep until `deadline`. Returns `false` if shutdown was requested.
    fn sleep_until(&self, deadline: Instant) -> bool {
        let mut state = self.shared.state.lock();
        while !state.shutdown {
            if self
                .shared
                .refresh_cv
                .wait_until(&mut state, deadline)
                .timed_out()
            {
                return !state.shutdown;
            }
        }
        false
    }

    /// One refresh cycle. The installed index is only replaced on success.
    pub(crate) fn refresh(&self) -> Result<usize, StreamError> {
        let data = self.fetcher.fetch(&self.bootstrap_url)?;
        let index =
            parse_bootstrap(&data, self.quality.as_deref()).map_err(StreamError::Bootstrap)?;

        let mut state = self.shared.state.lock();
        if state.shutdown {
            return Ok(0);
        }

        debug!(
            version = index.bootstrap_version,
            live_time = index.live_current_time,
            runs = index.fragment_runs.len(),
            "Installing refreshed bootstrap"
        );
        state.index = Arc::new(index);

        let state = &mut *state;
        let appended = state
            .queue
            .extend_to_live_edge(&state.index)
            .map_err(StreamError::Schedule)?;
        state.queue.prune_consumed();
        if appended > 0 {
            self.shared.fetch_cv.notify_one();
        }
        Ok(appended)
    }
}
