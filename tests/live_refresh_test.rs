//! Live streams: start at the edge, follow bootstrap refreshes.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{live_bootstrap, payload, route_fragments, wait_for, MockFetcher};
use hdsflow::{HdsStream, StreamOptions, StreamStatus, VariantSource};
use hdsflow_media::flv;

const BASE: &str = "http://cdn.example/live";
const BOOTSTRAP_URL: &str = "http://cdn.example/live/live.abst";
const TIMEOUT: Duration = Duration::from_secs(5);

fn live_source() -> VariantSource {
    VariantSource {
        base_url: BASE.to_string(),
        bootstrap_url: Some("live.abst".into()),
        ..Default::default()
    }
}

fn options() -> StreamOptions {
    StreamOptions {
        lookahead_secs: 15,
        min_refresh_interval: Duration::from_millis(10),
    }
}

/// Read until `len` bytes arrived or `TIMEOUT` passes.
fn read_exact(stream: &mut HdsStream, len: usize) -> Vec<u8> {
    let mut out = Vec::new();
    let mut buf = [0u8; 256];
    wait_for(TIMEOUT, || {
        let want = (len - out.len()).min(buf.len());
        let n = stream.read(&mut buf[..want]);
        out.extend_from_slice(&buf[..n]);
        out.len() >= len
    });
    out
}

#[test]
fn starts_at_live_edge_and_follows_refreshes() {
    let fetcher = Arc::new(MockFetcher::new());
    // 50 ms fragments; edge at 1 s is fragment 21.
    fetcher.route(BOOTSTRAP_URL, live_bootstrap(1000, 50));
    route_fragments(&fetcher, BASE, "live", 21..=25);

    let mut stream = HdsStream::open(live_source(), options(), fetcher.clone()).unwrap();
    assert!(stream.mode().is_live());
    assert_eq!(stream.size_hint(), None);

    let first = read_exact(&mut stream, 13 + payload(21).len());
    assert_eq!(&first[..13], &flv::FILE_HEADER);
    assert_eq!(&first[13..], &payload(21)[..]);

    // Nothing past the edge until the bootstrap advances.
    let mut buf = [0u8; 64];
    assert_eq!(stream.read(&mut buf), 0);
    assert_eq!(stream.status(), StreamStatus::Buffering);

    fetcher.route(BOOTSTRAP_URL, live_bootstrap(1200, 50));
    let expected: Vec<u8> = (22..=25).flat_map(payload).collect();
    let rest = read_exact(&mut stream, expected.len());
    assert_eq!(rest, expected);

    assert!(stream.index().live_current_time >= 1200);
    assert!(fetcher
        .requests()
        .iter()
        .all(|url| url == BOOTSTRAP_URL || url.starts_with("http://cdn.example/live/liveSeg1-Frag")));
    stream.close();
}

#[test]
fn failed_refresh_keeps_previous_bootstrap() {
    let fetcher = Arc::new(MockFetcher::new());
    fetcher.route(BOOTSTRAP_URL, live_bootstrap(1000, 50));
    route_fragments(&fetcher, BASE, "live", 21..=22);

    let mut stream = HdsStream::open(live_source(), options(), fetcher.clone()).unwrap();
    read_exact(&mut stream, 13 + payload(21).len());

    fetcher.fail(BOOTSTRAP_URL, 500);
    let refreshes = |f: &MockFetcher| f.requests().iter().filter(|u| *u == BOOTSTRAP_URL).count();
    let before = refreshes(fetcher.as_ref());
    assert!(wait_for(TIMEOUT, || refreshes(fetcher.as_ref()) >= before + 2));

    assert_eq!(stream.index().live_current_time, 1000);
    assert_eq!(stream.status(), StreamStatus::Buffering);

    // Recovery on the next good refresh.
    fetcher.route(BOOTSTRAP_URL, live_bootstrap(1050, 50));
    let next = read_exact(&mut stream, payload(22).len());
    assert_eq!(next, payload(22));
}

#[test]
fn close_stops_refreshing() {
    let fetcher = Arc::new(MockFetcher::new());
    fetcher.route(BOOTSTRAP_URL, live_bootstrap(1000, 50));
    route_fragments(&fetcher, BASE, "live", 21..=21);

    let stream = HdsStream::open(live_source(), options(), fetcher.clone()).unwrap();
    assert!(wait_for(TIMEOUT, || fetcher.request_count() >= 3));
    stream.close();

    let after_close = fetcher.request_count();
    std::thread::sleep(Duration::from_millis(150));
    assert_eq!(fetcher.request_count(), after_close);
}
