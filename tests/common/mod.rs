//! Shared test harness for integration tests.
//!
//! Provides [`MockFetcher`], an in-memory URL table standing in for the HTTP
//! transport, plus builders for bootstraps and fragment bodies.

#![allow(dead_code)]

use std::collections::HashMap;
use std::time::{Duration, Instant};

use bytes::{BufMut, Bytes, BytesMut};
use parking_lot::Mutex;

use hdsflow::net::{FetchError, Fetcher};
use hdsflow::{HdsStream, StreamStatus};
use hdsflow_media::{BootstrapWriter, FragmentRun, SegmentRun};

pub const BASE_URL: &str = "http://cdn.example/vod";

/// In-memory [`Fetcher`] that records every request.
#[derive(Default)]
pub struct MockFetcher {
    routes: Mutex<HashMap<String, Result<Bytes, FetchError>>>,
    requests: Mutex<Vec<String>>,
}

impl MockFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `body` for `url`, replacing any previous route.
    pub fn route(&self, url: impl Into<String>, body: Bytes) {
        self.routes.lock().insert(url.into(), Ok(body));
    }

    /// Answer `url` with an HTTP error status.
    pub fn fail(&self, url: impl Into<String>, status: u16) {
        let url = url.into();
        let err = FetchError::Status {
            url: url.clone(),
            status,
        };
        self.routes.lock().insert(url, Err(err));
    }

    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().clone()
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().len()
    }
}

impl Fetcher for MockFetcher {
    fn fetch(&self, url: &str) -> Result<Bytes, FetchError> {
        self.requests.lock().push(url.to_string());
        self.routes
            .lock()
            .get(url)
            .cloned()
            .unwrap_or_else(|| {
                Err(FetchError::Status {
                    url: url.to_string(),
                    status: 404,
                })
            })
    }
}

fn put_box(buf: &mut BytesMut, tag: &[u8; 4], body: &[u8]) {
    buf.put_u32(8 + body.len() as u32);
    buf.put_slice(tag);
    buf.put_slice(body);
}

/// A fragment body: `afra` and `moof` boxes, then `mdat` carrying `payload`.
pub fn fragment(payload: &[u8]) -> Bytes {
    let mut buf = BytesMut::new();
    put_box(&mut buf, b"afra", &[0; 9]);
    put_box(&mut buf, b"moof", &[0; 16]);
    put_box(&mut buf, b"mdat", payload);
    buf.freeze()
}

/// Distinct payload for fragment `n`.
pub fn payload(n: u32) -> Vec<u8> {
    format!("<fragment {n}>").into_bytes()
}

/// VOD bootstrap: fragments from 1, `duration` ms each, one segment.
pub fn vod_bootstrap(fragments: u32, duration: u32) -> Bytes {
    let data = BootstrapWriter::new(1000)
        .movie_id("movie")
        .segment_table(
            &[],
            vec![SegmentRun {
                first_segment: 1,
                fragments_per_segment: fragments,
            }],
        )
        .fragment_table(1000, &[], vec![FragmentRun::new(1, 0, duration)])
        .build();
    Bytes::from(data)
}

/// Live bootstrap with fragments of `duration` ms and its edge at `edge_ms`.
pub fn live_bootstrap(edge_ms: u64, duration: u32) -> Bytes {
    let data = BootstrapWriter::new(1000)
        .live(true)
        .current_media_time(edge_ms)
        .movie_id("live")
        .segment_table(
            &[],
            vec![SegmentRun {
                first_segment: 1,
                fragments_per_segment: u32::MAX,
            }],
        )
        .fragment_table(1000, &[], vec![FragmentRun::new(1, 0, duration)])
        .build();
    Bytes::from(data)
}

/// Route fragments `range` of a single-segment stream under `base`.
pub fn route_fragments(fetcher: &MockFetcher, base: &str, movie: &str, range: std::ops::RangeInclusive<u32>) {
    for n in range {
        fetcher.route(format!("{base}/{movie}Seg1-Frag{n}"), fragment(&payload(n)));
    }
}

/// Poll `condition` until it holds or `timeout` passes.
pub fn wait_for(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(2));
    }
    condition()
}

/// Read until end of stream, a stall or `timeout`, in `chunk`-byte reads.
pub fn read_all(stream: &mut HdsStream, chunk: usize, timeout: Duration) -> (Vec<u8>, StreamStatus) {
    let deadline = Instant::now() + timeout;
    let mut out = Vec::new();
    let mut buf = vec![0u8; chunk];

    loop {
        let n = stream.read(&mut buf);
        if n > 0 {
            out.extend_from_slice(&buf[..n]);
            continue;
        }
        let status = stream.status();
        match status {
            StreamStatus::EndOfStream | StreamStatus::Stalled { .. } => return (out, status),
            _ if Instant::now() > deadline => return (out, status),
            _ => std::thread::sleep(Duration::from_millis(1)),
        }
    }
}
