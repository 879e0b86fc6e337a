//! `abst` / `asrt` / `afrt` decoding.

use super::{Discontinuity, FragmentRun, SegmentRun, StreamIndex};
use crate::boxes::{BoxType, ByteCursor};
use crate::{Error, Result};

/// Maximum server entries accepted in one bootstrap.
pub const MAX_SERVERS: usize = 10;

/// Maximum entries accepted in one segment-run table.
pub const MAX_SEGMENT_RUNS: usize = 256;

/// Maximum entries accepted in one fragment-run table.
pub const MAX_FRAGMENT_RUNS: usize = 10_000;

/// Size of one fixed `asrt` entry.
const SEGMENT_RUN_SIZE: usize = 8;

/// Smallest possible `afrt` entry (duration present, no discontinuity byte).
const FRAGMENT_RUN_MIN_SIZE: usize = 16;

/// A decoded sub-table together with the quality entries it applies to.
struct QualityTable<T> {
    qualities: Vec<String>,
    entries: T,
}

impl<T> QualityTable<T> {
    /// Prefix match against the requested quality; no request matches anything.
    fn matches(&self, wanted: Option<&str>) -> bool {
        match wanted {
            None => true,
            Some(q) => self.qualities.iter().any(|entry| entry.starts_with(q)),
        }
    }
}

/// Parse a bootstrap box into a [`StreamIndex`].
///
/// `quality` selects which `asrt` and `afrt` sub-tables are kept: each list is
/// searched independently and its first entry whose quality list has a prefix
/// match wins. Without a quality, the first sub-table of each list is used.
/// Every sub-table is still fully validated, selected or not.
pub fn parse_bootstrap(data: &[u8], quality: Option<&str>) -> Result<StreamIndex> {
    let mut cursor = ByteCursor::new(data);
    let (_, mut abst) = cursor.read_box(BoxType::ABST)?;

    // version + flags of the full box
    abst.skip(4)?;
    let bootstrap_version = abst.read_u32()?;
    let flags = abst.read_u8()?;
    let timescale = abst.read_u32()?;
    let live_current_time = abst.read_u64()?;
    // SMPTE time code offset
    abst.skip(8)?;

    let movie_id = abst.read_cstr("movie identifier")?;

    let server_count = abst.read_u8()? as usize;
    check_limit("server entries", server_count, MAX_SERVERS)?;
    let servers = (0..server_count)
        .map(|_| abst.read_cstr("server entry"))
        .collect::<Result<Vec<_>>>()?;

    let qualities = read_quality_list(&mut abst, "quality entry")?;

    abst.skip_cstr("DRM data")?;
    abst.skip_cstr("metadata")?;

    let mut segment_runs = None;
    let asrt_count = abst.read_u8()?;
    for _ in 0..asrt_count {
        let table = parse_asrt(&mut abst)?;
        if segment_runs.is_none() && table.matches(quality) {
            segment_runs = Some(table.entries);
        }
    }

    let mut fragment_table = None;
    let afrt_count = abst.read_u8()?;
    for _ in 0..afrt_count {
        let table = parse_afrt(&mut abst)?;
        if fragment_table.is_none() && table.matches(quality) {
            fragment_table = Some(table.entries);
        }
    }

    let (table_timescale, fragment_runs) = fragment_table.ok_or_else(|| {
        Error::invalid(format!(
            "no fragment run table for quality {:?}",
            quality.unwrap_or("")
        ))
    })?;
    let segment_runs = segment_runs.unwrap_or_default();

    if timescale == 0 || table_timescale == 0 {
        return Err(Error::invalid("zero timescale"));
    }
    if !fragment_runs.iter().any(|run| !run.is_discontinuity()) {
        return Err(Error::invalid("fragment run table has no playable entries"));
    }
    check_ordering(&segment_runs, &fragment_runs)?;

    // Only a requested quality ends up in fragment URLs.
    let quality_modifier = quality.map(str::to_string);

    Ok(StreamIndex {
        bootstrap_version,
        profile: flags >> 6,
        live: flags & 0x20 != 0,
        update: flags & 0x10 != 0,
        timescale,
        live_current_time,
        movie_id,
        servers,
        qualities,
        quality_modifier,
        table_timescale,
        segment_runs,
        fragment_runs,
    })
}

fn check_limit(what: &'static str, count: usize, max: usize) -> Result<()> {
    if count > max {
        return Err(Error::LimitExceeded { what, count, max });
    }
    Ok(())
}

fn read_quality_list(cursor: &mut ByteCursor<'_>, what: &'static str) -> Result<Vec<String>> {
    let count = cursor.read_u8()?;
    (0..count).map(|_| cursor.read_cstr(what)).collect()
}

fn parse_asrt(abst: &mut ByteCursor<'_>) -> Result<QualityTable<Vec<SegmentRun>>> {
    let (_, mut asrt) = abst.read_box(BoxType::ASRT)?;

    // version + flags; update flag ignored, every bootstrap is a full replacement
    asrt.skip(4)?;
    let qualities = read_quality_list(&mut asrt, "asrt quality entry")?;

    let count = asrt.read_u32()? as usize;
    check_limit("segment runs", count, MAX_SEGMENT_RUNS)?;
    let need = count * SEGMENT_RUN_SIZE;
    if asrt.remaining() < need {
        return Err(Error::BufferUnderflow {
            need,
            have: asrt.remaining(),
        });
    }

    let mut runs = Vec::with_capacity(count);
    for _ in 0..count {
        runs.push(SegmentRun {
            first_segment: asrt.read_u32()?,
            fragments_per_segment: asrt.read_u32()?,
        });
    }

    Ok(QualityTable {
        qualities,
        entries: runs,
    })
}

fn parse_afrt(abst: &mut ByteCursor<'_>) -> Result<QualityTable<(u32, Vec<FragmentRun>)>> {
    let (_, mut afrt) = abst.read_box(BoxType::AFRT)?;

    // version + flags
    afrt.skip(4)?;
    let table_timescale = afrt.read_u32()?;
    let qualities = read_quality_list(&mut afrt, "afrt quality entry")?;

    let count = afrt.read_u32()? as usize;
    check_limit("fragment runs", count, MAX_FRAGMENT_RUNS)?;
    let need = count * FRAGMENT_RUN_MIN_SIZE;
    if afrt.remaining() < need {
        return Err(Error::BufferUnderflow {
            need,
            have: afrt.remaining(),
        });
    }

    let mut runs = Vec::with_capacity(count);
    for _ in 0..count {
        let fragment_number_start = afrt.read_u32()?;
        let timestamp = afrt.read_u64()?;
        let duration = afrt.read_u32()?;
        let discontinuity = if duration == 0 {
            Some(Discontinuity::from_u8(afrt.read_u8()?))
        } else {
            None
        };
        runs.push(FragmentRun {
            fragment_number_start,
            timestamp,
            duration,
            discontinuity,
        });
    }

    // An all-zero trailing entry only marks the end of the presentation.
    if runs.last() == Some(&FragmentRun::discontinuity(0, 0, Discontinuity::EndOfPresentation)) {
        runs.pop();
    }

    Ok(QualityTable {
        qualities,
        entries: (table_timescale, runs),
    })
}

fn check_ordering(segment_runs: &[SegmentRun], fragment_runs: &[FragmentRun]) -> Result<()> {
    if segment_runs
        .windows(2)
        .any(|w| w[1].first_segment < w[0].first_segment)
    {
        return Err(Error::invalid("segment runs out of order"));
    }

    // Numbering may restart after a discontinuity sentinel.
    let mut previous: Option<u32> = None;
    for run in fragment_runs {
        if run.is_discontinuity() {
            previous = None;
            continue;
        }
        if let Some(previous) = previous.filter(|&p| run.fragment_number_start < p) {
            return Err(Error::invalid(format!(
                "fragment run starting at {} follows run starting at {}",
                run.fragment_number_start, previous
            )));
        }
        previous = Some(run.fragment_number_start);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bootstrap::BootstrapWriter;
    use crate::schedule::{next_chunk, SourceMode};
    use assert_matches::assert_matches;

    fn vod_writer() -> BootstrapWriter {
        BootstrapWriter::new(1000)
            .movie_id("movie")
            .server("http://cdn.example/vod")
            .segment_table(
                &[],
                vec![SegmentRun {
                    first_segment: 1,
                    fragments_per_segment: 3,
                }],
            )
            .fragment_table(1000, &[], vec![FragmentRun::new(1, 0, 2000)])
    }

    #[test]
    fn test_parse_vod_bootstrap() {
        let data = vod_writer().build();
        let index = parse_bootstrap(&data, None).unwrap();

        assert_eq!(index.movie_id, "movie");
        assert_eq!(index.servers, vec!["http://cdn.example/vod"]);
        assert_eq!(index.timescale, 1000);
        assert_eq!(index.table_timescale, 1000);
        assert!(!index.live);
        assert_eq!(index.quality_modifier, None);
        assert_eq!(index.segment_runs.len(), 1);
        assert_eq!(index.fragment_runs, vec![FragmentRun::new(1, 0, 2000)]);
    }

    #[test]
    fn test_parse_flags_and_live_time() {
        let data = vod_writer()
            .live(true)
            .current_media_time(123_456)
            .bootstrap_version(7)
            .build();
        let index = parse_bootstrap(&data, None).unwrap();
        assert!(index.live);
        assert!(!index.update);
        assert_eq!(index.live_current_time, 123_456);
        assert_eq!(index.bootstrap_version, 7);
    }

    #[test]
    fn test_roundtrip_tables() {
        let segment_runs = vec![
            SegmentRun {
                first_segment: 1,
                fragments_per_segment: 10,
            },
            SegmentRun {
                first_segment: 4,
                fragments_per_segment: 5,
            },
        ];
        let fragment_runs = vec![
            FragmentRun::new(1, 0, 4000),
            FragmentRun::discontinuity(30, 0, Discontinuity::FragmentNumbering),
            FragmentRun::new(40, 200_000, 3000),
            FragmentRun::new(60, 260_000, 4000),
        ];
        let data = BootstrapWriter::new(1000)
            .segment_table(&[], segment_runs.clone())
            .fragment_table(1000, &[], fragment_runs.clone())
            .build();

        let index = parse_bootstrap(&data, None).unwrap();
        assert_eq!(index.segment_runs, segment_runs);
        assert_eq!(index.fragment_runs, fragment_runs);

        let rewritten = BootstrapWriter::from_index(&index).build();
        let reparsed = parse_bootstrap(&rewritten, None).unwrap();
        assert_eq!(reparsed.segment_runs, segment_runs);
        assert_eq!(reparsed.fragment_runs, fragment_runs);
    }

    #[test]
    fn test_trailing_sentinel_dropped() {
        let data = BootstrapWriter::new(1000)
            .fragment_table(
                1000,
                &[],
                vec![
                    FragmentRun::new(1, 0, 2000),
                    FragmentRun::discontinuity(0, 0, Discontinuity::EndOfPresentation),
                ],
            )
            .build();
        let index = parse_bootstrap(&data, None).unwrap();
        assert_eq!(index.fragment_runs.len(), 1);
    }

    #[test]
    fn test_quality_selection_by_prefix() {
        let data = BootstrapWriter::new(1000)
            .quality("hd")
            .quality("sd")
            .segment_table(
                &["sd_"],
                vec![SegmentRun {
                    first_segment: 1,
                    fragments_per_segment: 5,
                }],
            )
            .segment_table(
                &["hd_720"],
                vec![SegmentRun {
                    first_segment: 1,
                    fragments_per_segment: 7,
                }],
            )
            .fragment_table(1000, &["sd_"], vec![FragmentRun::new(1, 0, 1000)])
            .fragment_table(90_000, &["hd_720"], vec![FragmentRun::new(1, 0, 2000)])
            .fragment_table(48_000, &["hd_1080"], vec![FragmentRun::new(1, 0, 3000)])
            .build();

        let index = parse_bootstrap(&data, Some("hd")).unwrap();
        assert_eq!(index.quality_modifier.as_deref(), Some("hd"));
        assert_eq!(index.segment_runs[0].fragments_per_segment, 7);
        assert_eq!(index.table_timescale, 90_000);
        assert_eq!(index.fragment_runs[0].duration, 2000);

        // No quality requested: the first table of each list wins.
        let index = parse_bootstrap(&data, None).unwrap();
        assert_eq!(index.segment_runs[0].fragments_per_segment, 5);
        assert_eq!(index.table_timescale, 1000);

        assert_matches!(
            parse_bootstrap(&data, Some("uhd")),
            Err(Error::InvalidBootstrap(_))
        );
    }

    #[test]
    fn test_unrequested_quality_is_not_a_modifier() {
        let data = vod_writer().quality("high").build();
        let index = parse_bootstrap(&data, None).unwrap();
        assert_eq!(index.qualities, vec!["high".to_string()]);
        assert_eq!(index.quality_modifier, None);
    }

    #[test]
    fn test_rejects_wrong_top_level_tag() {
        let mut data = vod_writer().build();
        data[4..8].copy_from_slice(b"afra");
        assert_matches!(
            parse_bootstrap(&data, None),
            Err(Error::UnexpectedBox { .. })
        );
    }

    #[test]
    fn test_rejects_truncated_bootstrap() {
        let data = vod_writer().build();
        // Declared length still says full size.
        let truncated = &data[..data.len() - 1];
        assert_matches!(
            parse_bootstrap(truncated, None),
            Err(Error::BoxOverrun { .. })
        );

        // Every prefix must fail cleanly.
        for len in 0..data.len() {
            assert!(parse_bootstrap(&data[..len], None).is_err());
        }
    }

    #[test]
    fn test_rejects_overlong_sub_box() {
        let mut data = vod_writer().build();
        let pos = data
            .windows(4)
            .position(|w| w == b"afrt")
            .expect("afrt present");
        // Bump the afrt length field past the end of the abst.
        data[pos - 1] = data[pos - 1].wrapping_add(50);
        assert_matches!(
            parse_bootstrap(&data, None),
            Err(Error::BoxOverrun { .. })
        );
    }

    #[test]
    fn test_rejects_too_many_servers() {
        let mut writer = BootstrapWriter::new(1000)
            .fragment_table(1000, &[], vec![FragmentRun::new(1, 0, 2000)]);
        for i in 0..=MAX_SERVERS {
            writer = writer.server(&format!("http://s{i}"));
        }
        assert_matches!(
            parse_bootstrap(&writer.build(), None),
            Err(Error::LimitExceeded {
                what: "server entries",
                count: 11,
                max: 10
            })
        );
    }

    #[test]
    fn test_rejects_too_many_segment_runs() {
        let runs = (0..=MAX_SEGMENT_RUNS as u32)
            .map(|i| SegmentRun {
                first_segment: i + 1,
                fragments_per_segment: 1,
            })
            .collect();
        let data = BootstrapWriter::new(1000)
            .segment_table(&[], runs)
            .fragment_table(1000, &[], vec![FragmentRun::new(1, 0, 2000)])
            .build();
        assert_matches!(
            parse_bootstrap(&data, None),
            Err(Error::LimitExceeded {
                what: "segment runs",
                ..
            })
        );
    }

    #[test]
    fn test_rejects_zero_table_timescale() {
        let data = BootstrapWriter::new(1000)
            .fragment_table(0, &[], vec![FragmentRun::new(1, 0, 2000)])
            .build();
        assert_matches!(
            parse_bootstrap(&data, None),
            Err(Error::InvalidBootstrap(_))
        );
    }

    #[test]
    fn test_rejects_out_of_order_runs() {
        let data = BootstrapWriter::new(1000)
            .fragment_table(
                1000,
                &[],
                vec![FragmentRun::new(10, 0, 2000), FragmentRun::new(5, 0, 2000)],
            )
            .build();
        assert_matches!(
            parse_bootstrap(&data, None),
            Err(Error::InvalidBootstrap(_))
        );
    }

    #[test]
    fn test_numbering_reset_after_discontinuity() {
        let data = BootstrapWriter::new(1000)
            .movie_id("movie")
            .fragment_table(
                1000,
                &[],
                vec![
                    FragmentRun::new(100, 0, 1000),
                    FragmentRun::discontinuity(103, 3000, Discontinuity::FragmentNumbering),
                    FragmentRun::new(1, 3000, 1000),
                ],
            )
            .build();
        let index = parse_bootstrap(&data, None).unwrap();
        assert_eq!(index.fragment_runs.len(), 3);

        let mode = SourceMode::Vod { duration_secs: 10 };
        let mut previous = None;
        let mut scheduled = Vec::new();
        for _ in 0..4 {
            let chunk = next_chunk(&index, mode, previous.as_ref()).unwrap();
            scheduled.push((chunk.fragment_number, chunk.timestamp));
            previous = Some(chunk);
        }
        assert_eq!(scheduled, vec![(100, 0), (101, 1000), (102, 2000), (1, 3000)]);
    }

    #[test]
    fn test_rejects_out_of_order_runs_after_reset() {
        let data = BootstrapWriter::new(1000)
            .fragment_table(
                1000,
                &[],
                vec![
                    FragmentRun::new(100, 0, 1000),
                    FragmentRun::discontinuity(103, 3000, Discontinuity::FragmentNumbering),
                    FragmentRun::new(10, 3000, 1000),
                    FragmentRun::new(5, 13_000, 1000),
                ],
            )
            .build();
        assert_matches!(
            parse_bootstrap(&data, None),
            Err(Error::InvalidBootstrap(_))
        );
    }

    #[test]
    fn test_missing_segment_table_is_allowed() {
        let data = BootstrapWriter::new(1000)
            .fragment_table(1000, &[], vec![FragmentRun::new(1, 0, 2000)])
            .build();
        let index = parse_bootstrap(&data, None).unwrap();
        assert!(index.segment_runs.is_empty());
    }
}
