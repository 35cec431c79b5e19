//! Static MP4 probe over an initial buffer.
//!
//! Decides whether a byte stream is a progressive MP4 this demuxer can
//! handle, and locates the `moov` box relative to `ftyp`.

use crate::bytes::ByteReader;
use crate::mp4::boxes::{FTYP, MOOV};
use tracing::debug;

/// Result of probing the first buffer of a stream.
#[derive(Copy, Clone, Debug, Default)]
pub struct ProbeResult {
    /// True when the stream starts with a well-formed `ftyp`.
    pub matched: bool,
    /// Offset just past the `ftyp` box.
    pub data_offset: u32,
    /// Bytes between `ftyp` and `moov` (boxes this demuxer skips).
    pub raw_data_size: u32,
    /// `data_offset + raw_data_size`; start of `moov` when it was found
    /// inside the probed buffer.
    pub info_offset: u32,
    pub has_audio: bool,
    pub has_video: bool,
}

/// Probe an initial buffer.
///
/// The scan only ever reads box headers, so a `moov` that starts beyond
/// the buffer simply leaves `info_offset` at the last header this buffer
/// could prove; the stream driver re-checks the box type there once more
/// data has arrived.
pub fn probe(data: &[u8]) -> ProbeResult {
    let r = ByteReader::new(data);

    let header_ok = r
        .read_u32(0)
        .ok()
        .zip(r.read_fourcc(4).ok())
        .filter(|&(size, fourcc)| fourcc == FTYP && size >= 8);
    let Some((ftyp_size, _)) = header_ok else {
        return ProbeResult::default();
    };

    let data_offset = ftyp_size;
    let mut offset = ftyp_size as u64;

    // Walk sibling headers until moov or until the buffer runs out.
    while let (Ok(size), Ok(fourcc)) = (
        r.read_u32(offset as usize),
        r.read_fourcc(offset as usize + 4),
    ) {
        if fourcc == MOOV {
            break;
        }
        if size < 8 {
            break;
        }
        offset += size as u64;
    }

    let raw_data_size = (offset.saturating_sub(data_offset as u64)) as u32;
    debug!(
        "probe: ftyp size={}, raw data size={}, moov expected at {}",
        data_offset,
        raw_data_size,
        data_offset + raw_data_size
    );

    ProbeResult {
        matched: true,
        data_offset,
        raw_data_size,
        info_offset: data_offset + raw_data_size,
        // Track composition is unknown until moov; overrides may force
        // either flag later.
        has_audio: false,
        has_video: true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_box(fourcc: &[u8; 4], payload: &[u8]) -> Vec<u8> {
        let mut buf = Vec::new();
        buf.extend_from_slice(&((payload.len() + 8) as u32).to_be_bytes());
        buf.extend_from_slice(fourcc);
        buf.extend_from_slice(payload);
        buf
    }

    #[test]
    fn ftyp_followed_by_moov() {
        let mut data = make_box(b"ftyp", &[0u8; 16]); // 24 bytes
        data.extend_from_slice(&make_box(b"moov", &[0u8; 64]));

        let p = probe(&data);
        assert!(p.matched);
        assert_eq!(p.data_offset, 24);
        assert_eq!(p.raw_data_size, 0);
        assert_eq!(p.info_offset, 24);
        assert!(p.has_video);
        assert!(!p.has_audio);
    }

    #[test]
    fn free_box_between_ftyp_and_moov() {
        let mut data = make_box(b"ftyp", &[0u8; 16]);
        data.extend_from_slice(&make_box(b"free", &[0u8; 32]));
        data.extend_from_slice(&make_box(b"moov", &[0u8; 8]));

        let p = probe(&data);
        assert!(p.matched);
        assert_eq!(p.data_offset, 24);
        assert_eq!(p.raw_data_size, 40);
        assert_eq!(p.info_offset, 64);
    }

    #[test]
    fn rejects_stream_without_ftyp() {
        // 40 bytes whose type tag reads "isom" instead of "ftyp".
        let mut data = vec![0u8; 40];
        data[0..4].copy_from_slice(&40u32.to_be_bytes());
        data[4..8].copy_from_slice(b"isom");

        let p = probe(&data);
        assert!(!p.matched);
    }

    #[test]
    fn rejects_tiny_buffer() {
        assert!(!probe(&[0u8; 6]).matched);
        assert!(!probe(&[]).matched);
    }
}
