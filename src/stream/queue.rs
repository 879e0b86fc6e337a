//! Ordered chunk arena shared by the fetch, refresh and read sides.

use bytes::Bytes;
use hdsflow_media::{next_chunk, ChunkSpec, SourceMode, StreamIndex};
use std::collections::VecDeque;
use std::ops::Range;

/// Monotonic chunk handle; ids of consecutive chunks differ by one.
pub type ChunkId = u64;

/// Download state of a chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkState {
    Scheduled,
    Downloading,
    Ready,
    Failed,
}

/// One scheduled fragment and, once fetched, its raw bytes.
#[derive(Debug)]
pub struct Chunk {
    id: ChunkId,
    spec: ChunkSpec,
    state: ChunkState,
    data: Option<Bytes>,
    payload: Range<usize>,
    read_pos: usize,
    failure: Option<String>,
}

impl Chunk {
    fn new(id: ChunkId, spec: ChunkSpec) -> Self {
        Self {
            id,
            spec,
            state: ChunkState::Scheduled,
            data: None,
            payload: 0..0,
            read_pos: 0,
            failure: None,
        }
    }

    pub fn id(&self) -> ChunkId {
        self.id
    }

    pub fn spec(&self) -> &ChunkSpec {
        &self.spec
    }

    pub fn state(&self) -> ChunkState {
        self.state
    }

    /// Why the fetch failed, for `Failed` chunks.
    pub fn failure(&self) -> Option<&str> {
        self.failure.as_deref()
    }

    pub fn payload_len(&self) -> usize {
        self.payload.len()
    }

    /// Ready and every payload byte handed out.
    pub fn is_drained(&self) -> bool {
        self.state == ChunkState::Ready && self.read_pos >= self.payload.len()
    }

    /// Undelivered payload bytes. Shares the fetched buffer, no copy.
    pub fn unread(&self) -> Option<Bytes> {
        let data = self.data.as_ref()?;
        let start = self.payload.start + self.read_pos;
        Some(data.slice(start..self.payload.end))
    }
}

/// Append-at-tail, retire-at-head sequence of chunks for one variant.
///
/// Generation always continues from the last scheduled [`ChunkSpec`], which is
/// remembered even after that chunk has been retired, so numbering stays
/// contiguous.
#[derive(Debug)]
pub struct ChunkQueue {
    mode: SourceMode,
    chunks: VecDeque<Chunk>,
    next_id: ChunkId,
    fetch_cursor: ChunkId,
    read_cursor: ChunkId,
    tail: Option<ChunkSpec>,
    stall: Option<String>,
}

impl ChunkQueue {
    pub fn new(mode: SourceMode) -> Self {
        Self {
            mode,
            chunks: VecDeque::new(),
            next_id: 0,
            fetch_cursor: 0,
            read_cursor: 0,
            tail: None,
            stall: None,
        }
    }

    pub fn mode(&self) -> SourceMode {
        self.mode
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    pub fn head(&self) -> Option<&Chunk> {
        self.chunks.front()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Chunk> {
        self.chunks.iter()
    }

    pub fn get(&self, id: ChunkId) -> Option<&Chunk> {
        self.position(id).map(|pos| &self.chunks[pos])
    }

    /// Last scheduled chunk, retired or not.
    pub fn tail(&self) -> Option<&ChunkSpec> {
        self.tail.as_ref()
    }

    pub fn fetch_cursor(&self) -> ChunkId {
        self.fetch_cursor
    }

    pub fn read_cursor(&self) -> ChunkId {
        self.read_cursor
    }

    /// The chunk the reader is positioned on.
    pub fn reading(&self) -> Option<&Chunk> {
        self.get(self.read_cursor)
    }

    /// The `eof` chunk has been scheduled; nothing follows it.
    pub fn is_complete(&self) -> bool {
        self.tail.is_some_and(|tail| tail.eof)
    }

    /// The reader has consumed the `eof` chunk.
    pub fn is_finished(&self) -> bool {
        self.is_complete() && self.reading().is_none()
    }

    /// Last scheduling failure, cleared by the next successful append.
    pub fn stall(&self) -> Option<&str> {
        self.stall.as_deref()
    }

    /// Media duration held from head to tail, in table-timescale units.
    pub fn buffered(&self) -> u64 {
        self.chunks.iter().map(|chunk| chunk.spec.duration).sum()
    }

    fn position(&self, id: ChunkId) -> Option<usize> {
        let front = self.chunks.front()?.id;
        let pos = usize::try_from(id.checked_sub(front)?).ok()?;
        (pos < self.chunks.len()).then_some(pos)
    }

    fn chunk_mut(&mut self, id: ChunkId) -> Option<&mut Chunk> {
        let pos = self.position(id)?;
        self.chunks.get_mut(pos)
    }

    fn schedule(&mut self, index: &StreamIndex) -> hdsflow_media::Result<ChunkSpec> {
        next_chunk(index, self.mode, self.tail.as_ref()).map_err(|e| {
            self.stall = Some(e.to_string());
            e
        })
    }

    fn push(&mut self, spec: ChunkSpec) -> ChunkId {
        let id = self.next_id;
        self.next_id += 1;
        self.chunks.push_back(Chunk::new(id, spec));
        self.tail = Some(spec);
        self.stall = None;
        id
    }

    /// Schedule one chunk after the tail. `Ok(None)` once the tail is `eof`.
    pub fn append_generated(
        &mut self,
        index: &StreamIndex,
    ) -> hdsflow_media::Result<Option<ChunkId>> {
        if self.is_complete() {
            return Ok(None);
        }
        let spec = self.schedule(index)?;
        Ok(Some(self.push(spec)))
    }

    /// Append until `target_secs` of media are buffered or the `eof` chunk is
    /// scheduled. Returns the number of chunks appended.
    pub fn ensure_lookahead(
        &mut self,
        index: &StreamIndex,
        target_secs: u64,
    ) -> hdsflow_media::Result<usize> {
        let target = target_secs.saturating_mul(index.table_timescale as u64);
        let mut buffered = self.buffered();
        let mut appended = 0;

        while buffered < target {
            let Some(id) = self.append_generated(index)? else {
                break;
            };
            buffered += self.get(id).map_or(0, |chunk| chunk.spec.duration);
            appended += 1;
        }

        Ok(appended)
    }

    /// Append every chunk starting at or before the live edge of `index`.
    /// An empty queue starts at the edge itself.
    pub fn extend_to_live_edge(&mut self, index: &StreamIndex) -> hdsflow_media::Result<usize> {
        let edge = index.live_edge();
        let mut appended = 0;

        while !self.is_complete() {
            let spec = self.schedule(index)?;
            if self.tail.is_some() && spec.timestamp > edge {
                break;
            }
            self.push(spec);
            appended += 1;
        }

        Ok(appended)
    }

    /// Claim the first unfetched chunk at or after the fetch cursor.
    pub fn start_next_fetch(&mut self) -> Option<(ChunkId, ChunkSpec)> {
        let cursor = self.fetch_cursor;
        let chunk = self
            .chunks
            .iter_mut()
            .find(|chunk| chunk.id >= cursor && chunk.state == ChunkState::Scheduled)?;
        chunk.state = ChunkState::Downloading;
        Some((chunk.id, chunk.spec))
    }

    /// Hand the fetched bytes to the chunk and mark it `Ready`.
    ///
    /// Returns `false` if the chunk is no longer queued.
    pub fn complete_fetch(&mut self, id: ChunkId, data: Bytes, payload: Range<usize>) -> bool {
        let Some(chunk) = self.chunk_mut(id) else {
            return false;
        };
        chunk.payload = payload.start.min(data.len())..payload.end.min(data.len());
        chunk.data = Some(data);
        chunk.read_pos = 0;
        chunk.state = ChunkState::Ready;
        self.fetch_cursor = self.fetch_cursor.max(id + 1);
        true
    }

    /// Mark a chunk `Failed`. It is never retried.
    pub fn fail_fetch(&mut self, id: ChunkId, reason: String) -> bool {
        let Some(chunk) = self.chunk_mut(id) else {
            return false;
        };
        chunk.state = ChunkState::Failed;
        chunk.failure = Some(reason);
        self.fetch_cursor = self.fetch_cursor.max(id + 1);
        true
    }

    /// Record `len` bytes delivered from the chunk under the read cursor.
    ///
    /// A drained chunk moves the read cursor on. VOD retires it right away;
    /// live leaves it to [`prune_consumed`](Self::prune_consumed). Returns
    /// `true` when the chunk was drained.
    pub fn consume(&mut self, len: usize) -> bool {
        let id = self.read_cursor;
        let Some(chunk) = self.chunk_mut(id) else {
            return false;
        };
        chunk.read_pos = (chunk.read_pos + len).min(chunk.payload.len());
        if !chunk.is_drained() {
            return false;
        }

        self.read_cursor = id + 1;
        if !self.mode.is_live() {
            self.retire_head();
        }
        true
    }

    /// Remove the head chunk and release its buffer.
    pub fn retire_head(&mut self) -> Option<Chunk> {
        let head = self.chunks.front()?;
        if head.id >= self.read_cursor && !head.is_drained() {
            return None;
        }
        self.chunks.pop_front()
    }

    /// Retire head chunks that were delivered and have a successor.
    pub fn prune_consumed(&mut self) -> usize {
        let mut retired = 0;
        while self.chunks.len() > 1 {
            let Some(head) = self.chunks.front() else {
                break;
            };
            if !head.is_drained() || head.id >= self.read_cursor {
                break;
            }
            self.chunks.pop_front();
            retired += 1;
        }
        retired
    }
}
