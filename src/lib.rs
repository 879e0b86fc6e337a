//! hdsflow - HTTP Dynamic Streaming client core
//!
//! Turns an HDS bootstrap into a continuous FLV byte stream: fragments are
//! scheduled from the bootstrap tables, downloaded by a background worker and
//! handed to the consumer in order. Live streams keep their bootstrap fresh
//! from a second worker.
//!
//! The binary formats live in the `hdsflow-media` crate; this crate adds the
//! HTTP fetcher, the threaded pipeline and configuration.

pub mod config;
pub mod net;
pub mod stream;

pub use net::{FetchError, Fetcher, HttpFetcher};
pub use stream::{HdsStream, StreamError, StreamOptions, StreamStatus, VariantSource};
