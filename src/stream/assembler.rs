use super::{ChunkState, Shared};
use bytes::Bytes;
use tracing::trace;

/// Pull side of the pipeline: FLV preamble first, then fragment payloads in
/// order.
///
/// Payload bytes are copied outside the lock. The chunk's buffer is shared
/// through [`Bytes`], so retiring the chunk meanwhile cannot invalidate it.
pub(crate) struct OutputAssembler {
    header: Bytes,
    header_pos: usize,
    lookahead_secs: u64,
}

impl OutputAssembler {
    pub(crate) fn new(header: Bytes, lookahead_secs: u64) -> Self {
        Self {
            header,
            header_pos: 0,
            lookahead_secs,
        }
    }

    /// Preamble bytes still to deliver.
    pub(crate) fn header_pending(&self) -> bool {
        self.header_pos < self.header.len()
    }

    fn read_header(&mut self, buf: &mut [u8]) -> usize {
        let pending = &self.header[self.header_pos..];
        let len = pending.len().min(buf.len());
        buf[..len].copy_from_slice(&pending[..len]);
        self.header_pos += len;
        len
    }

    pub(crate) fn read(&mut self, shared: &Shared, buf: &mut [u8]) -> usize {
        let mut written = self.read_header(buf);

        while written < buf.len() {
            let unread = {
                let state = shared.state.lock();
                match state.queue.reading() {
                    Some(chunk) if chunk.state() == ChunkState::Ready => chunk.unread(),
                    _ => None,
                }
            };
            let Some(unread) = unread else {
                break;
            };

            let len = unread.len().min(buf.len() - written);
            buf[written..written + len].copy_from_slice(&unread[..len]);
            written += len;

            let mut state = shared.state.lock();
            if state.queue.consume(len) {
                trace!(cursor = state.queue.read_cursor(), "Chunk drained");
                if state.maintain(self.lookahead_secs) > 0 {
                    shared.fetch_cv.notify_one();
                }
            }
        }

        written
    }
}
