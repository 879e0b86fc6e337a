//! Hdsflow-Media: bootstrap parsing, fragment scheduling and FLV framing
//!
//! This crate holds the synchronous, thread-agnostic half of the HTTP Dynamic
//! Streaming client. Nothing in here performs I/O; the fetch pipeline in the
//! `hdsflow` crate drives these functions from its worker threads.
//!
//! # Modules
//!
//! - `boxes` - Bounds-checked byte cursor and length-tagged box headers
//! - `bootstrap` - `abst`/`asrt`/`afrt` decoding into a [`StreamIndex`]
//! - `schedule` - Fragment/segment numbering from the run tables
//! - `flv` - FLV file header and `onMetaData` script packet
//!
//! # Data flow
//!
//! 1. A bootstrap blob (inline from the manifest or fetched from its URL) is
//!    decoded by [`parse_bootstrap`] into a [`StreamIndex`]
//! 2. [`next_chunk`] walks the fragment-run and segment-run tables to produce
//!    one [`ChunkSpec`] at a time
//! 3. Each fetched fragment is scanned by [`boxes::find_payload`] for its
//!    `mdat` body, which is passed through verbatim after the FLV header

pub mod boxes;
pub mod bootstrap;
pub mod error;
pub mod flv;
pub mod schedule;

pub use bootstrap::{
    parse_bootstrap, BootstrapWriter, Discontinuity, FragmentRun, SegmentRun, StreamIndex,
};
pub use error::{Error, Result};
pub use schedule::{next_chunk, ChunkSpec, SourceMode};
