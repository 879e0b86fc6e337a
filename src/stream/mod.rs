//! The fetch pipeline for one stream variant.
//!
//! [`HdsStream`] owns the shared [`ChunkQueue`] and [`StreamIndex`], a
//! background fragment fetcher and, for live sources, a bootstrap refresher.
//! The consumer pulls the FLV byte stream with [`HdsStream::read`], which never
//! blocks: a zero return means "nothing ready yet" unless
//! [`HdsStream::status`] reports the end of the stream or a stall.

mod assembler;
mod fetcher;
mod queue;
mod refresher;

pub use queue::{Chunk, ChunkId, ChunkQueue, ChunkState};

use crate::config::StreamConfig;
use crate::net::{FetchError, Fetcher, UrlResolver};
use assembler::OutputAssembler;
use bytes::Bytes;
use fetcher::FragmentFetcher;
use hdsflow_media::{flv, parse_bootstrap, SourceMode, StreamIndex};
use parking_lot::{Condvar, Mutex};
use refresher::LiveRefresher;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error, info, warn};

/// Bytes per second for each kbit/s of declared bitrate.
const BYTES_PER_KBPS: u64 = 1024 / 8;

/// Errors that make a stream variant unusable.
#[derive(Debug, Error)]
pub enum StreamError {
    #[error("no bootstrap: neither inline data nor a bootstrap URL was supplied")]
    MissingBootstrap,

    #[error("bootstrap download failed: {0}")]
    Fetch(#[from] FetchError),

    #[error("bootstrap is unusable: {0}")]
    Bootstrap(#[source] hdsflow_media::Error),

    #[error("no fragment could be scheduled: {0}")]
    Schedule(#[source] hdsflow_media::Error),

    #[error("failed to start {name} thread: {source}")]
    Spawn {
        name: &'static str,
        #[source]
        source: std::io::Error,
    },
}

/// What the consumer should make of a zero-byte read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamStatus {
    /// The next fragment is still being scheduled or downloaded.
    Buffering,
    /// Bytes are available now.
    Ready,
    /// The last VOD fragment has been delivered.
    EndOfStream,
    /// The pipeline cannot make progress: a fragment failed to download
    /// (`fragment` is set) or no further fragment could be scheduled.
    Stalled {
        fragment: Option<u32>,
        reason: String,
    },
}

/// Manifest-derived description of the variant to play.
#[derive(Debug, Clone, Default)]
pub struct VariantSource {
    /// Manifest URL without query and last path segment.
    pub base_url: String,
    /// Media `url` attribute: a movie path or a fully-qualified fragment base.
    pub media_url: Option<String>,
    /// Inline bootstrap bytes.
    pub bootstrap: Option<Bytes>,
    /// Bootstrap location; required for live refresh.
    pub bootstrap_url: Option<String>,
    /// Quality modifier used to select bootstrap sub-tables.
    pub quality: Option<String>,
    pub bitrate_kbps: Option<u32>,
    /// Presentation length; `None` or zero means live.
    pub duration_secs: Option<u64>,
    /// AMF `onMetaData` payload.
    pub metadata: Option<Bytes>,
}

/// Pipeline tuning.
#[derive(Debug, Clone)]
pub struct StreamOptions {
    /// Media seconds kept scheduled ahead of the reader (VOD).
    pub lookahead_secs: u64,
    /// Lower bound on the live refresh period.
    pub min_refresh_interval: Duration,
}

impl Default for StreamOptions {
    fn default() -> Self {
        Self {
            lookahead_secs: 15,
            min_refresh_interval: Duration::from_millis(500),
        }
    }
}

impl From<&StreamConfig> for StreamOptions {
    fn from(config: &StreamConfig) -> Self {
        Self {
            lookahead_secs: config.lookahead_secs,
            min_refresh_interval: Duration::from_millis(config.min_refresh_interval_ms),
        }
    }
}

/// State guarded by the per-variant mutex.
pub(crate) struct StreamState {
    pub(crate) queue: ChunkQueue,
    pub(crate) index: Arc<StreamIndex>,
    pub(crate) shutdown: bool,
}

impl StreamState {
    /// Queue upkeep after a fetch completes or a chunk drains: top up the VOD
    /// lookahead, retire delivered live chunks. Returns the chunks appended.
    pub(crate) fn maintain(&mut self, lookahead_secs: u64) -> usize {
        if self.queue.mode().is_live() {
            self.queue.prune_consumed();
            return 0;
        }

        let was_stalled = self.queue.stall().is_some();
        match self.queue.ensure_lookahead(&self.index, lookahead_secs) {
            Ok(appended) => appended,
            Err(e) => {
                if !was_stalled {
                    error!(error = %e, "Cannot schedule next fragment, stream will stall");
                }
                0
            }
        }
    }
}

pub(crate) struct Shared {
    pub(crate) state: Mutex<StreamState>,
    /// Wakes the fragment fetcher: new chunks or shutdown.
    pub(crate) fetch_cv: Condvar,
    /// Interrupts the refresher's sleep on shutdown.
    pub(crate) refresh_cv: Condvar,
}

/// A playing HDS stream variant.
pub struct HdsStream {
    shared: Arc<Shared>,
    assembler: OutputAssembler,
    mode: SourceMode,
    size_hint: Option<u64>,
    workers: Vec<JoinHandle<()>>,
}

impl HdsStream {
    /// Load the bootstrap, seed the queue and start the worker threads.
    pub fn open(
        source: VariantSource,
        options: StreamOptions,
        fetcher: Arc<dyn Fetcher>,
    ) -> Result<Self, StreamError> {
        let urls = UrlResolver::new(source.base_url.clone(), source.media_url.clone());
        let bootstrap_url = source
            .bootstrap_url
            .as_deref()
            .filter(|url| !url.is_empty())
            .map(|url| urls.bootstrap_url(url));

        let data = match (&source.bootstrap, &bootstrap_url) {
            (Some(data), _) => data.clone(),
            (None, Some(url)) => {
                debug!(url = %url, "Downloading bootstrap");
                fetcher.fetch(url)?
            }
            (None, None) => return Err(StreamError::MissingBootstrap),
        };

        let index = parse_bootstrap(&data, source.quality.as_deref()).map_err(|e| {
            warn!(error = %e, "Bootstrap parse failed, variant is unusable");
            StreamError::Bootstrap(e)
        })?;

        let mode = SourceMode::from_duration(source.duration_secs);
        if mode.is_live() != index.live {
            debug!(
                live = mode.is_live(),
                bootstrap_live = index.live,
                "Manifest and bootstrap disagree on liveness, following the manifest"
            );
        }

        let mut queue = ChunkQueue::new(mode);
        let seeded = match mode {
            SourceMode::Vod { .. } => queue.ensure_lookahead(&index, options.lookahead_secs),
            SourceMode::Live => queue.extend_to_live_edge(&index),
        };
        if let Err(e) = seeded {
            if queue.is_empty() {
                error!(error = %e, "No fragment could be scheduled");
                return Err(StreamError::Schedule(e));
            }
            error!(error = %e, "Scheduling stopped early, stream will stall");
        }

        let metadata = source.metadata.as_deref();
        let assembler = OutputAssembler::new(flv::write_header(metadata), options.lookahead_secs);
        let size_hint = match (mode, source.bitrate_kbps) {
            (SourceMode::Vod { duration_secs }, Some(kbps)) if kbps > 0 => Some(
                flv::header_len(metadata) as u64
                    + duration_secs * kbps as u64 * BYTES_PER_KBPS,
            ),
            _ => None,
        };

        info!(
            movie = %index.movie_id,
            live = mode.is_live(),
            scheduled = queue.len(),
            first_fragment = queue.head().map(|c| c.spec().fragment_number),
            "Stream opened"
        );

        let shared = Arc::new(Shared {
            state: Mutex::new(StreamState {
                queue,
                index: Arc::new(index),
                shutdown: false,
            }),
            fetch_cv: Condvar::new(),
            refresh_cv: Condvar::new(),
        });

        let mut stream = Self {
            shared: Arc::clone(&shared),
            assembler,
            mode,
            size_hint,
            workers: Vec::new(),
        };

        let worker = FragmentFetcher::new(
            Arc::clone(&shared),
            Arc::clone(&fetcher),
            urls,
            options.lookahead_secs,
        );
        stream.spawn("hds-fetch", move || worker.run())?;

        if mode.is_live() {
            match bootstrap_url {
                Some(url) => {
                    let worker = LiveRefresher::new(
                        Arc::clone(&shared),
                        fetcher,
                        url,
                        source.quality.clone(),
                        options.min_refresh_interval,
                    );
                    stream.spawn("hds-refresh", move || worker.run())?;
                }
                None => warn!("Live stream has no bootstrap URL, the edge will not advance"),
            }
        }

        Ok(stream)
    }

    fn spawn<F>(&mut self, name: &'static str, body: F) -> Result<(), StreamError>
    where
        F: FnOnce() + Send + 'static,
    {
        let handle = thread::Builder::new()
            .name(name.to_string())
            .spawn(body)
            .map_err(|source| StreamError::Spawn { name, source })?;
        self.workers.push(handle);
        Ok(())
    }

    /// Copy the next bytes of the FLV stream into `buf`.
    ///
    /// Never blocks. Returns 0 when nothing is ready; check
    /// [`status`](Self::status) to tell buffering from end of stream.
    pub fn read(&mut self, buf: &mut [u8]) -> usize {
        self.assembler.read(&self.shared, buf)
    }

    pub fn status(&self) -> StreamStatus {
        if self.assembler.header_pending() {
            return StreamStatus::Ready;
        }

        let state = self.shared.state.lock();
        let queue = &state.queue;
        match queue.reading() {
            Some(chunk) => match chunk.state() {
                ChunkState::Ready => StreamStatus::Ready,
                ChunkState::Failed => StreamStatus::Stalled {
                    fragment: Some(chunk.spec().fragment_number),
                    reason: chunk.failure().unwrap_or("download failed").to_string(),
                },
                ChunkState::Scheduled | ChunkState::Downloading => StreamStatus::Buffering,
            },
            None if queue.is_finished() => StreamStatus::EndOfStream,
            None => match queue.stall() {
                Some(reason) => StreamStatus::Stalled {
                    fragment: None,
                    reason: reason.to_string(),
                },
                None => StreamStatus::Buffering,
            },
        }
    }

    /// Estimated total size in bytes; VOD with a known bitrate only.
    pub fn size_hint(&self) -> Option<u64> {
        self.size_hint
    }

    pub fn mode(&self) -> SourceMode {
        self.mode
    }

    /// The bootstrap currently in effect.
    pub fn index(&self) -> Arc<StreamIndex> {
        Arc::clone(&self.shared.state.lock().index)
    }

    pub fn can_seek(&self) -> bool {
        false
    }

    pub fn can_pause(&self) -> bool {
        false
    }

    pub fn can_control_pace(&self) -> bool {
        true
    }

    /// Stop and join the worker threads.
    pub fn close(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        if self.workers.is_empty() {
            return;
        }

        self.shared.state.lock().shutdown = true;
        self.shared.fetch_cv.notify_all();
        self.shared.refresh_cv.notify_all();

        for handle in self.workers.drain(..) {
            let name = handle.thread().name().unwrap_or("worker").to_string();
            if handle.join().is_err() {
                error!(thread = %name, "Stream worker panicked");
            }
        }
        debug!("Stream closed");
    }
}

impl std::fmt::Debug for HdsStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HdsStream")
            .field("mode", &self.mode)
            .field("size_hint", &self.size_hint)
            .field("workers", &self.workers.len())
            .finish_non_exhaustive()
    }
}

impl Drop for HdsStream {
    fn drop(&mut self) {
        self.shutdown();
    }
}
