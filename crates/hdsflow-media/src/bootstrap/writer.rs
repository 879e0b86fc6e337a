//! Bootstrap (`abst`) serialization.

use super::{FragmentRun, SegmentRun, StreamIndex};
use bytes::{BufMut, BytesMut};

struct SegmentTable {
    qualities: Vec<String>,
    runs: Vec<SegmentRun>,
}

struct FragmentTable {
    timescale: u32,
    qualities: Vec<String>,
    runs: Vec<FragmentRun>,
}

/// Builder for bootstrap boxes.
///
/// Produces the exact layout [`parse_bootstrap`](super::parse_bootstrap) reads,
/// including multiple quality-tagged sub-tables.
pub struct BootstrapWriter {
    bootstrap_version: u32,
    profile: u8,
    live: bool,
    update: bool,
    timescale: u32,
    current_media_time: u64,
    movie_id: String,
    servers: Vec<String>,
    qualities: Vec<String>,
    segment_tables: Vec<SegmentTable>,
    fragment_tables: Vec<FragmentTable>,
}

impl BootstrapWriter {
    /// Create a new builder with the given container timescale.
    pub fn new(timescale: u32) -> Self {
        Self {
            bootstrap_version: 1,
            profile: 0,
            live: false,
            update: false,
            timescale,
            current_media_time: 0,
            movie_id: String::new(),
            servers: Vec::new(),
            qualities: Vec::new(),
            segment_tables: Vec::new(),
            fragment_tables: Vec::new(),
        }
    }

    /// Builder pre-filled from a decoded index, with one sub-table of each kind.
    pub fn from_index(index: &StreamIndex) -> Self {
        let qualities: Vec<&str> = index.quality_modifier.as_deref().into_iter().collect();
        let mut writer = Self::new(index.timescale)
            .bootstrap_version(index.bootstrap_version)
            .live(index.live)
            .current_media_time(index.live_current_time)
            .movie_id(&index.movie_id);
        writer.profile = index.profile;
        writer.update = index.update;
        writer.servers = index.servers.clone();
        writer.qualities = index.qualities.clone();
        if !index.segment_runs.is_empty() {
            writer = writer.segment_table(&qualities, index.segment_runs.clone());
        }
        writer.fragment_table(index.table_timescale, &qualities, index.fragment_runs.clone())
    }

    pub fn bootstrap_version(mut self, version: u32) -> Self {
        self.bootstrap_version = version;
        self
    }

    pub fn live(mut self, live: bool) -> Self {
        self.live = live;
        self
    }

    /// Set the live edge in container timescale units.
    pub fn current_media_time(mut self, time: u64) -> Self {
        self.current_media_time = time;
        self
    }

    pub fn movie_id(mut self, id: &str) -> Self {
        self.movie_id = id.to_string();
        self
    }

    /// Append a server base URL.
    pub fn server(mut self, url: &str) -> Self {
        self.servers.push(url.to_string());
        self
    }

    /// Append a top-level quality entry.
    pub fn quality(mut self, quality: &str) -> Self {
        self.qualities.push(quality.to_string());
        self
    }

    /// Append an `asrt` sub-table.
    pub fn segment_table(mut self, qualities: &[&str], runs: Vec<SegmentRun>) -> Self {
        self.segment_tables.push(SegmentTable {
            qualities: qualities.iter().map(|q| q.to_string()).collect(),
            runs,
        });
        self
    }

    /// Append an `afrt` sub-table.
    pub fn fragment_table(mut self, timescale: u32, qualities: &[&str], runs: Vec<FragmentRun>) -> Self {
        self.fragment_tables.push(FragmentTable {
            timescale,
            qualities: qualities.iter().map(|q| q.to_string()).collect(),
            runs,
        });
        self
    }

    /// Build the `abst` box.
    pub fn build(self) -> Vec<u8> {
        let mut buf = BytesMut::with_capacity(256);

        let abst_start = begin_box(&mut buf, b"abst");
        buf.put_u32(0); // version/flags
        buf.put_u32(self.bootstrap_version);
        let flags = (self.profile << 6) | ((self.live as u8) << 5) | ((self.update as u8) << 4);
        buf.put_u8(flags);
        buf.put_u32(self.timescale);
        buf.put_u64(self.current_media_time);
        buf.put_u64(0); // SMPTE time code offset
        put_cstr(&mut buf, &self.movie_id);

        put_string_list(&mut buf, &self.servers);
        put_string_list(&mut buf, &self.qualities);

        put_cstr(&mut buf, ""); // DRM data
        put_cstr(&mut buf, ""); // metadata

        buf.put_u8(self.segment_tables.len() as u8);
        for table in &self.segment_tables {
            write_asrt(&mut buf, table);
        }

        buf.put_u8(self.fragment_tables.len() as u8);
        for table in &self.fragment_tables {
            write_afrt(&mut buf, table);
        }

        end_box(&mut buf, abst_start);
        buf.to_vec()
    }
}

fn write_asrt(buf: &mut BytesMut, table: &SegmentTable) {
    let start = begin_box(buf, b"asrt");
    buf.put_u32(0); // version/flags
    put_string_list(buf, &table.qualities);
    buf.put_u32(table.runs.len() as u32);
    for run in &table.runs {
        buf.put_u32(run.first_segment);
        buf.put_u32(run.fragments_per_segment);
    }
    end_box(buf, start);
}

fn write_afrt(buf: &mut BytesMut, table: &FragmentTable) {
    let start = begin_box(buf, b"afrt");
    buf.put_u32(0); // version/flags
    buf.put_u32(table.timescale);
    put_string_list(buf, &table.qualities);
    buf.put_u32(table.runs.len() as u32);
    for run in &table.runs {
        buf.put_u32(run.fragment_number_start);
        buf.put_u64(run.timestamp);
        buf.put_u32(run.duration);
        if run.duration == 0 {
            buf.put_u8(run.discontinuity.map(|d| d.as_u8()).unwrap_or(0));
        }
    }
    end_box(buf, start);
}

fn begin_box(buf: &mut BytesMut, tag: &[u8; 4]) -> usize {
    let start = buf.len();
    buf.put_u32(0); // placeholder
    buf.put_slice(tag);
    start
}

fn end_box(buf: &mut BytesMut, start: usize) {
    let size = (buf.len() - start) as u32;
    buf[start..start + 4].copy_from_slice(&size.to_be_bytes());
}

fn put_cstr(buf: &mut BytesMut, s: &str) {
    buf.put_slice(s.as_bytes());
    buf.put_u8(0);
}

fn put_string_list(buf: &mut BytesMut, items: &[String]) {
    buf.put_u8(items.len() as u8);
    for item in items {
        put_cstr(buf, item);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_box_sizes_are_patched() {
        let data = BootstrapWriter::new(1000)
            .segment_table(
                &[],
                vec![SegmentRun {
                    first_segment: 1,
                    fragments_per_segment: 1,
                }],
            )
            .fragment_table(1000, &[], vec![FragmentRun::new(1, 0, 1000)])
            .build();

        let abst_len = u32::from_be_bytes([data[0], data[1], data[2], data[3]]) as usize;
        assert_eq!(abst_len, data.len());
        assert_eq!(&data[4..8], b"abst");

        let asrt = data.windows(4).position(|w| w == b"asrt").unwrap() - 4;
        let asrt_len = u32::from_be_bytes([data[asrt], data[asrt + 1], data[asrt + 2], data[asrt + 3]]);
        // header + version/flags + quality count + run count + one run
        assert_eq!(asrt_len, 8 + 4 + 1 + 4 + 8);
    }

    #[test]
    fn test_live_flag_bit() {
        let data = BootstrapWriter::new(1000).live(true).build();
        // size(4) + tag(4) + version/flags(4) + bootstrap version(4)
        assert_eq!(data[16], 0x20);
    }
}
