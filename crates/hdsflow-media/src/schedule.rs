//! Fragment and segment numbering.
//!
//! Given a [`StreamIndex`] and the previously scheduled chunk, [`next_chunk`]
//! computes which fragment comes next, where it sits on the timeline and which
//! segment it belongs to. The same algorithm serves VOD and live sources; the
//! [`SourceMode`] only changes where the first chunk starts and whether an
//! end-of-stream mark is ever set.

use crate::bootstrap::StreamIndex;
use crate::{Error, Result};

/// How the source advances.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceMode {
    /// Fixed presentation of `duration_secs` seconds (from the manifest).
    Vod { duration_secs: u64 },
    /// Open-ended presentation whose edge moves with every bootstrap refresh.
    Live,
}

impl SourceMode {
    /// Pick the mode from a manifest duration; no duration means live.
    pub fn from_duration(duration_secs: Option<u64>) -> Self {
        match duration_secs {
            Some(secs) if secs > 0 => Self::Vod {
                duration_secs: secs,
            },
            _ => Self::Live,
        }
    }

    pub fn is_live(&self) -> bool {
        matches!(self, Self::Live)
    }
}

/// Descriptor of one fetchable fragment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkSpec {
    pub fragment_number: u32,
    pub segment_number: u32,
    /// Start time in table-timescale units.
    pub timestamp: u64,
    /// Duration in table-timescale units.
    pub duration: u64,
    /// Fragment-run entry this chunk was derived from.
    pub run_index: usize,
    /// Last chunk of a VOD presentation.
    pub eof: bool,
}

impl ChunkSpec {
    /// End time in table-timescale units.
    pub fn end_time(&self) -> u64 {
        self.timestamp.saturating_add(self.duration)
    }
}

/// Compute the chunk following `previous` (or the first chunk).
///
/// The fragment-run table is scanned forward from `previous.run_index` for VOD.
/// Live tables are replaced on every refresh, so live scans start at entry 0.
pub fn next_chunk(
    index: &StreamIndex,
    mode: SourceMode,
    previous: Option<&ChunkSpec>,
) -> Result<ChunkSpec> {
    let runs = &index.fragment_runs;

    let (mut fragment, mut timestamp, first_entry) = match (previous, mode) {
        (Some(prev), _) => {
            let fragment = prev
                .fragment_number
                .checked_add(1)
                .ok_or(Error::FragmentRunNotFound {
                    fragment: prev.fragment_number,
                })?;
            let first_entry = if mode.is_live() { 0 } else { prev.run_index };
            (Some(fragment), prev.end_time(), first_entry)
        }
        (None, SourceMode::Vod { .. }) => {
            let first = runs
                .first()
                .ok_or(Error::FragmentRunNotFound { fragment: 0 })?;
            (Some(first.fragment_number_start), first.timestamp, 0)
        }
        // Resolved below by timestamp matching.
        (None, SourceMode::Live) => (None, index.live_edge(), 0),
    };

    let mut duration = 0u64;
    let mut resolved = None;

    for entry in first_entry..runs.len() {
        let run = &runs[entry];
        let next = runs.get(entry + 1);

        if run.is_discontinuity() {
            let next = match next {
                None => return Err(Error::DiscontinuityAtEnd { entry }),
                Some(next) if next.is_discontinuity() => continue,
                Some(next) => next,
            };
            // Only a chunk coming from before the sentinel crosses it; later
            // chunks belong to the entries after it.
            let crossing = match fragment {
                Some(candidate) => {
                    candidate < next.fragment_number_start
                        || previous.map_or(true, |prev| prev.run_index < entry)
                }
                None => timestamp < next.timestamp,
            };
            if !crossing {
                continue;
            }
            fragment = Some(next.fragment_number_start);
            timestamp = next.timestamp;
            duration = next.duration as u64;
            resolved = Some(entry + 1);
            break;
        }

        let candidate = match fragment {
            Some(f) => f,
            None => {
                let covers = next.map_or(true, |next| {
                    timestamp >= run.timestamp && timestamp < next.timestamp
                });
                if !covers {
                    continue;
                }
                let offset = timestamp.saturating_sub(run.timestamp) / run.duration as u64;
                let f = run
                    .fragment_number_start
                    .saturating_add(u32::try_from(offset).unwrap_or(u32::MAX));
                fragment = Some(f);
                f
            }
        };

        if run.fragment_number_start <= candidate
            && next.map_or(true, |next| next.fragment_number_start > candidate)
        {
            duration = run.duration as u64;
            let offset = (candidate - run.fragment_number_start) as u64;
            timestamp = run.timestamp.saturating_add(duration * offset);
            resolved = Some(entry);
            break;
        }
    }

    let (run_index, fragment_number) = match (resolved, fragment) {
        (Some(entry), Some(fragment)) => (entry, fragment),
        (_, fragment) => {
            return Err(Error::FragmentRunNotFound {
                fragment: fragment.unwrap_or(0),
            })
        }
    };

    let eof = match mode {
        SourceMode::Vod { duration_secs } => {
            timestamp.saturating_add(duration) / index.table_timescale.max(1) as u64 >= duration_secs
        }
        SourceMode::Live => false,
    };

    Ok(ChunkSpec {
        fragment_number,
        segment_number: segment_for_fragment(index, fragment_number),
        timestamp,
        duration,
        run_index,
        eof,
    })
}

/// Resolve the segment a fragment belongs to.
///
/// Each segment-run entry covers `(next.first_segment - first_segment)`
/// segments of `fragments_per_segment` fragments; the last entry is open-ended.
/// Fragments are counted from 1, or from 0 when the fragment-run table itself
/// starts at fragment 0. Without a segment-run table every fragment is in
/// segment 1.
pub fn segment_for_fragment(index: &StreamIndex, fragment: u32) -> u32 {
    let runs = &index.segment_runs;
    if runs.is_empty() {
        return 1;
    }

    let first_fragment = index
        .fragment_runs
        .iter()
        .find(|run| !run.is_discontinuity())
        .map_or(1, |run| run.fragment_number_start.min(1));

    let fragment = fragment as u64;
    let mut base = first_fragment as u64;

    for (i, run) in runs.iter().enumerate() {
        let per_segment = run.fragments_per_segment.max(1) as u64;
        let into_run = fragment.saturating_sub(base) / per_segment;

        match runs.get(i + 1) {
            Some(next) => {
                let segments = next.first_segment.saturating_sub(run.first_segment) as u64;
                let span = segments * per_segment;
                if fragment < base + span {
                    return run.first_segment.saturating_add(into_run as u32);
                }
                base += span;
            }
            None => {
                let into_run = u32::try_from(into_run).unwrap_or(u32::MAX);
                return run.first_segment.saturating_add(into_run);
            }
        }
    }

    runs[runs.len() - 1].first_segment
}
