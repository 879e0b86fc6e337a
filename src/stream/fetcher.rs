use super::{ChunkId, Shared};
use crate::net::{FetchError, Fetcher, UrlResolver};
use bytes::Bytes;
use hdsflow_media::boxes::find_payload;
use hdsflow_media::{ChunkSpec, StreamIndex};
use std::ops::Range;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error, info};

#[derive(Debug, Error)]
enum DownloadError {
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error(transparent)]
    Payload(#[from] hdsflow_media::Error),
}

/// Background worker that downloads scheduled chunks one at a time, in
/// queue order.
pub(crate) struct FragmentFetcher {
    shared: Arc<Shared>,
    fetcher: Arc<dyn Fetcher>,
    urls: UrlResolver,
    lookahead_secs: u64,
}

impl FragmentFetcher {
    pub(crate) fn new(
        shared: Arc<Shared>,
        fetcher: Arc<dyn Fetcher>,
        urls: UrlResolver,
        lookahead_secs: u64,
    ) -> Self {
        Self {
            shared,
            fetcher,
            urls,
            lookahead_secs,
        }
    }

    /// Run until shutdown.
    pub(crate) fn run(self) {
        debug!("Fragment fetcher started");

        while let Some((id, spec, index)) = self.next_job() {
            let url = self.urls.fragment_url(&index, &spec);
            info!(
                fragment = spec.fragment_number,
                segment = spec.segment_number,
                url = %url,
                "Downloading fragment"
            );

            let outcome = self.download(&url);

            let mut state = self.shared.state.lock();
            if state.shutdown {
                break;
            }
            match outcome {
                Ok((data, payload)) => {
                    debug!(
                        fragment = spec.fragment_number,
                        bytes = data.len(),
                        payload = payload.len(),
                        "Fragment ready"
                    );
                    state.queue.complete_fetch(id, data, payload);
                }
                Err(e) => {
                    error!(
                        fragment = spec.fragment_number,
                        url = %url,
                        error = %e,
                        "Fragment download failed"
                    );
                    state.queue.fail_fetch(id, e.to_string());
                }
            }
            state.maintain(self.lookahead_secs);
        }

        debug!("Fragment fetcher stopped");
    }

    /// Block until a chunk needs fetching. `None` on shutdown.
    fn next_job(&self) -> Option<(ChunkId, ChunkSpec, Arc<StreamIndex>)> {
        let mut state = self.shared.state.lock();
        loop {
            if state.shutdown {
                return None;
            }
            if let Some((id, spec)) = state.queue.start_next_fetch() {
                return Some((id, spec, Arc::clone(&state.index)));
            }
            self.shared.fetch_cv.wait(&mut state);
        }
    }

    fn download(&self, url: &str) -> Result<(Bytes, Range<usize>), DownloadError> {
        let data = self.fetcher.fetch(url)?;
        let payload = find_payload(&data)?;
        Ok((data, payload))
    }
}
