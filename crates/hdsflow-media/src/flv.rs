//! FLV stream preamble.
//!
//! Fragment payloads are FLV tags, so the assembled byte stream only needs the
//! fixed file header and, optionally, an `onMetaData` script tag in front.

use bytes::{BufMut, Bytes, BytesMut};

/// File header: signature, version 1, audio+video flags, 9-byte header length,
/// followed by the zero `PreviousTagSize0` field.
pub const FILE_HEADER: [u8; 13] = [b'F', b'L', b'V', 1, 5, 0, 0, 0, 9, 0, 0, 0, 0];

/// Tag header (11 bytes) plus trailing previous-tag-size field (4 bytes).
pub const TAG_OVERHEAD: usize = 15;

/// Script data tag type.
pub const TAG_TYPE_SCRIPT: u8 = 0x12;

/// AMF0 object-end marker that terminates a valid metadata payload.
pub const AMF_OBJECT_END: [u8; 3] = [0x00, 0x00, 0x09];

/// Largest payload a tag's 24-bit size field can describe.
const MAX_TAG_PAYLOAD: usize = 0x00FF_FFFF;

/// Whether `payload` looks like a complete AMF metadata object.
pub fn is_valid_metadata(payload: &[u8]) -> bool {
    !payload.is_empty() && payload.len() <= MAX_TAG_PAYLOAD && payload.ends_with(&AMF_OBJECT_END)
}

/// Length of the preamble [`write_header`] produces for `metadata`.
pub fn header_len(metadata: Option<&[u8]>) -> usize {
    match metadata.filter(|m| is_valid_metadata(m)) {
        Some(payload) => FILE_HEADER.len() + TAG_OVERHEAD + payload.len(),
        None => FILE_HEADER.len(),
    }
}

/// Write the file header and, when `metadata` is a valid AMF payload, one
/// script tag carrying it.
///
/// Invalid metadata is dropped rather than producing a malformed tag.
pub fn write_header(metadata: Option<&[u8]>) -> Bytes {
    let mut buf = BytesMut::with_capacity(header_len(metadata));
    buf.put_slice(&FILE_HEADER);

    match metadata {
        Some(payload) if is_valid_metadata(payload) => {
            buf.put_u8(TAG_TYPE_SCRIPT);
            buf.put_uint(payload.len() as u64, 3);
            buf.put_uint(0, 3); // timestamp
            buf.put_u8(0); // timestamp extension
            buf.put_uint(0, 3); // stream id
            buf.put_slice(payload);
            buf.put_u32((TAG_OVERHEAD - 4 + payload.len()) as u32);
        }
        Some(payload) => {
            tracing::debug!(len = payload.len(), "Ignoring invalid metadata packet");
        }
        None => {}
    }

    buf.freeze()
}
