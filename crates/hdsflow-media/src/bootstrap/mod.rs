//! Bootstrap information (`abst`) model.
//!
//! A bootstrap describes which fragments exist for one stream variant: the
//! servers to fetch them from, how fragments group into segments (`asrt`) and
//! the timestamp and duration of every fragment (`afrt`).

mod parser;
mod writer;

pub use parser::{parse_bootstrap, MAX_FRAGMENT_RUNS, MAX_SEGMENT_RUNS, MAX_SERVERS};
pub use writer::BootstrapWriter;

/// One `asrt` entry: from `first_segment` on, every segment holds
/// `fragments_per_segment` fragments.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct SegmentRun {
    pub first_segment: u32,
    pub fragments_per_segment: u32,
}

/// Discontinuity indicator carried by zero-duration fragment-run entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub enum Discontinuity {
    EndOfPresentation,
    FragmentNumbering,
    Timestamps,
    FragmentNumberingAndTimestamps,
    Unknown(u8),
}

impl Discontinuity {
    pub fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::EndOfPresentation,
            1 => Self::FragmentNumbering,
            2 => Self::Timestamps,
            3 => Self::FragmentNumberingAndTimestamps,
            other => Self::Unknown(other),
        }
    }

    pub fn as_u8(&self) -> u8 {
        match self {
            Self::EndOfPresentation => 0,
            Self::FragmentNumbering => 1,
            Self::Timestamps => 2,
            Self::FragmentNumberingAndTimestamps => 3,
            Self::Unknown(other) => *other,
        }
    }
}

/// One `afrt` entry.
///
/// Fragments from `fragment_number_start` on each last `duration` table-timescale
/// units, the first one starting at `timestamp`. A zero `duration` marks a
/// discontinuity sentinel, never a playable fragment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct FragmentRun {
    pub fragment_number_start: u32,
    pub timestamp: u64,
    pub duration: u32,
    pub discontinuity: Option<Discontinuity>,
}

impl FragmentRun {
    /// Create a regular (non-sentinel) run.
    pub fn new(fragment_number_start: u32, timestamp: u64, duration: u32) -> Self {
        Self {
            fragment_number_start,
            timestamp,
            duration,
            discontinuity: None,
        }
    }

    /// Create a zero-duration discontinuity sentinel.
    pub fn discontinuity(fragment_number_start: u32, timestamp: u64, kind: Discontinuity) -> Self {
        Self {
            fragment_number_start,
            timestamp,
            duration: 0,
            discontinuity: Some(kind),
        }
    }

    pub fn is_discontinuity(&self) -> bool {
        self.duration == 0
    }
}

/// Decoded bootstrap for one stream variant.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct StreamIndex {
    /// Bootstrap info version, bumped by the server on every update.
    pub bootstrap_version: u32,
    /// Profile bits from the `abst` flag byte (0 = named access, 1 = range access).
    pub profile: u8,
    /// Live flag from the `abst` flag byte.
    pub live: bool,
    /// Update flag from the `abst` flag byte.
    pub update: bool,
    /// Container timescale (units per second of `live_current_time`).
    pub timescale: u32,
    /// Most recent media time the server advertises, in `timescale` units.
    pub live_current_time: u64,
    /// Movie identifier.
    pub movie_id: String,
    /// Server base URLs, in preference order.
    pub servers: Vec<String>,
    /// Quality entries listed at the top level of the bootstrap.
    pub qualities: Vec<String>,
    /// Quality modifier inserted into fragment URLs; set only when the caller
    /// asked for a quality.
    pub quality_modifier: Option<String>,
    /// Timescale of the fragment-run timestamps and durations.
    pub table_timescale: u32,
    /// Segment runs from the selected `asrt`, non-decreasing in `first_segment`.
    pub segment_runs: Vec<SegmentRun>,
    /// Fragment runs from the selected `afrt`.
    pub fragment_runs: Vec<FragmentRun>,
}

impl StreamIndex {
    /// First server entry, if the bootstrap names a non-empty one.
    pub fn server_base(&self) -> Option<&str> {
        self.servers
            .first()
            .map(String::as_str)
            .filter(|s| !s.is_empty())
    }

    /// Duration of the most recent playable fragment run, in table units.
    pub fn last_fragment_duration(&self) -> Option<u32> {
        self.fragment_runs
            .iter()
            .rev()
            .find(|run| !run.is_discontinuity())
            .map(|run| run.duration)
    }

    /// The live edge expressed in table-timescale units.
    pub fn live_edge(&self) -> u64 {
        self.container_to_table(self.live_current_time)
    }

    /// Convert a container-timescale time into table-timescale units.
    pub fn container_to_table(&self, time: u64) -> u64 {
        if self.timescale == 0 {
            return 0;
        }
        (time as u128 * self.table_timescale as u128 / self.timescale as u128) as u64
    }

    /// Convert table-timescale units into seconds.
    pub fn table_to_secs(&self, units: u64) -> f64 {
        if self.table_timescale == 0 {
            0.0
        } else {
            units as f64 / self.table_timescale as f64
        }
    }
}
