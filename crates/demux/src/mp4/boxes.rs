//! ISO BMFF box (atom) parsing over byte slices.
//!
//! Walks the box hierarchy of progressive MP4 files — ftyp, moov, trak,
//! mdia, minf, stbl and the sample table leaves — and decodes each
//! recognized leaf into a typed record.
//!
//! Reference: ISO 14496-12 (ISO Base Media File Format) and
//! ISO 14496-15 (AVC sample entries).

use tracing::{debug, trace};
use vf_common::{DemuxError, DemuxResult};

use crate::bytes::ByteReader;

// ─── Box FourCC constants ────────────────────────────────────────────

/// Convert 4 ASCII bytes to a u32 FourCC code.
const fn fourcc(a: u8, b: u8, c: u8, d: u8) -> u32 {
    ((a as u32) << 24) | ((b as u32) << 16) | ((c as u32) << 8) | (d as u32)
}

pub const FTYP: u32 = fourcc(b'f', b't', b'y', b'p');
pub const MOOV: u32 = fourcc(b'm', b'o', b'o', b'v');
pub const MVHD: u32 = fourcc(b'm', b'v', b'h', b'd');
pub const TRAK: u32 = fourcc(b't', b'r', b'a', b'k');
pub const TKHD: u32 = fourcc(b't', b'k', b'h', b'd');
pub const EDTS: u32 = fourcc(b'e', b'd', b't', b's');
pub const ELST: u32 = fourcc(b'e', b'l', b's', b't');
pub const MDIA: u32 = fourcc(b'm', b'd', b'i', b'a');
pub const MDHD: u32 = fourcc(b'm', b'd', b'h', b'd');
pub const MINF: u32 = fourcc(b'm', b'i', b'n', b'f');
pub const STBL: u32 = fourcc(b's', b't', b'b', b'l');
pub const STSD: u32 = fourcc(b's', b't', b's', b'd');
pub const STSC: u32 = fourcc(b's', b't', b's', b'c');
pub const STSZ: u32 = fourcc(b's', b't', b's', b'z');
pub const STCO: u32 = fourcc(b's', b't', b'c', b'o');
pub const STTS: u32 = fourcc(b's', b't', b't', b's');
pub const MDAT: u32 = fourcc(b'm', b'd', b'a', b't');
pub const AVC1: u32 = fourcc(b'a', b'v', b'c', b'1');
pub const AVCC: u32 = fourcc(b'a', b'v', b'c', b'C');

/// Containers the walker recurses into (body starts 8 bytes past the
/// box start).
const CONTAINERS: [u32; 6] = [MOOV, TRAK, MDIA, MINF, STBL, EDTS];

pub fn is_container(box_type: u32) -> bool {
    CONTAINERS.contains(&box_type)
}

/// Convert a FourCC u32 to a human-readable string for logging.
pub fn fourcc_to_string(cc: u32) -> String {
    cc.to_be_bytes()
        .iter()
        .map(|&b| {
            if b.is_ascii_graphic() || b == b' ' {
                b as char
            } else {
                '?'
            }
        })
        .collect()
}

// ─── Box header & walker ────────────────────────────────────────────

/// A parsed box header: 4-byte big-endian inclusive size + 4-byte type.
///
/// 64-bit extended sizes (size == 1) and to-end-of-file sizes (size == 0)
/// are not part of the progressive profile this demuxer accepts; both
/// fall under the `size < 8` rejection.
#[derive(Copy, Clone, Debug)]
pub struct BoxHeader {
    pub box_type: u32,
    /// Total box size including the 8-byte header.
    pub size: u32,
    /// Offset of the box start within the parsed slice.
    pub offset: usize,
}

impl BoxHeader {
    pub fn body_start(&self) -> usize {
        self.offset + 8
    }

    pub fn body_size(&self) -> usize {
        self.size as usize - 8
    }

    pub fn end(&self) -> usize {
        self.offset + self.size as usize
    }
}

/// Read one box header at `offset`, validating it against `end`.
pub fn read_box_header(data: &[u8], offset: usize, end: usize) -> DemuxResult<BoxHeader> {
    let r = ByteReader::new(data);
    let size = r.read_u32(offset)?;
    let box_type = r.read_fourcc(offset + 4)?;

    if size < 8 {
        return Err(DemuxError::InvalidStructure {
            offset: offset as u64,
            reason: format!(
                "box '{}' has invalid size {} (less than header)",
                fourcc_to_string(box_type),
                size
            ),
        });
    }
    if offset + size as usize > end {
        return Err(DemuxError::InvalidStructure {
            offset: offset as u64,
            reason: format!(
                "box '{}' (size {}) overflows its parent (end {})",
                fourcc_to_string(box_type),
                size,
                end
            ),
        });
    }

    trace!(
        "box '{}' at offset {}, size {}",
        fourcc_to_string(box_type),
        offset,
        size
    );

    Ok(BoxHeader {
        box_type,
        size,
        offset,
    })
}

/// Iterate sibling boxes in `data[start..end]`, handing each header to
/// the visitor. The visitor decides whether to recurse into container
/// bodies (typically by calling `walk` again on the body range).
pub fn walk<F>(data: &[u8], start: usize, end: usize, visit: &mut F) -> DemuxResult<()>
where
    F: FnMut(&BoxHeader, &[u8]) -> DemuxResult<()>,
{
    let mut offset = start;
    while offset < end {
        let header = read_box_header(data, offset, end)?;
        visit(&header, &data[header.body_start()..header.end()])?;
        offset = header.end();
    }
    Ok(())
}

// ─── Leaf records ───────────────────────────────────────────────────

/// Parsed ftyp (File Type) box.
#[derive(Clone, Debug)]
pub struct FtypBox {
    pub major_brand: u32,
    pub minor_version: u32,
    pub compatible_brands: Vec<u32>,
}

/// Parsed mvhd (Movie Header) box — movie timescale and duration.
#[derive(Copy, Clone, Debug)]
pub struct MvhdBox {
    pub timescale: u32,
    pub duration: u32,
}

/// Parsed tkhd (Track Header) box — just the track id; everything else
/// the video path needs comes from the SPS.
#[derive(Copy, Clone, Debug)]
pub struct TkhdBox {
    pub track_id: u32,
}

/// Parsed mdhd (Media Header) box — media timescale and duration.
#[derive(Copy, Clone, Debug)]
pub struct MdhdBox {
    pub timescale: u32,
    pub duration: u32,
}

/// One edit-list entry.
#[derive(Copy, Clone, Debug)]
pub struct ElstEntry {
    pub segment_duration: u32,
    pub media_time: u32,
    pub media_rate_int: u16,
    pub media_rate_frac: u16,
}

/// Parsed elst (Edit List) box.
#[derive(Clone, Debug, Default)]
pub struct ElstBox {
    pub entries: Vec<ElstEntry>,
}

/// The avc1 sample entry extracted from stsd, with the raw nested avcC.
#[derive(Clone, Debug)]
pub struct Avc1Entry {
    pub width: u16,
    pub height: u16,
    pub frame_count: u16,
    pub depth: u16,
    /// Raw AVCDecoderConfigurationRecord bytes (avcC body).
    pub avcc: Vec<u8>,
}

/// stsc (Sample to Chunk) entry. Run-length encoded: an entry applies
/// from its `first_chunk` up to the next entry's `first_chunk - 1`.
#[derive(Copy, Clone, Debug)]
pub struct StscEntry {
    /// First chunk number (1-based).
    pub first_chunk: u32,
    pub samples_per_chunk: u32,
    pub sample_description_index: u32,
}

/// Parsed stsz (Sample Size) box.
#[derive(Clone, Debug)]
pub struct StszBox {
    /// If non-zero, all samples share this size.
    pub default_sample_size: u32,
    /// Total sample count.
    pub sample_count: u32,
    /// Individual sample sizes (empty when `default_sample_size > 0`).
    pub sample_sizes: Vec<u32>,
}

impl StszBox {
    /// Size of the given 0-based sample.
    pub fn size_of(&self, sample_idx: usize) -> Option<u32> {
        if self.default_sample_size > 0 {
            (sample_idx < self.sample_count as usize).then_some(self.default_sample_size)
        } else {
            self.sample_sizes.get(sample_idx).copied()
        }
    }
}

/// stts (Decoding Time to Sample) entry.
#[derive(Copy, Clone, Debug)]
pub struct SttsEntry {
    pub sample_count: u32,
    pub sample_delta: u32,
}

/// Every recognized leaf box as one tagged sum, so trak collection is a
/// single match.
#[derive(Clone, Debug)]
pub enum LeafBox {
    Ftyp(FtypBox),
    Mvhd(MvhdBox),
    Tkhd(TkhdBox),
    Mdhd(MdhdBox),
    Elst(ElstBox),
    Stsd(Avc1Entry),
    Stsc(Vec<StscEntry>),
    Stsz(StszBox),
    Stco(Vec<u64>),
    Stts(Vec<SttsEntry>),
    /// Unrecognized box, advanced past by size.
    Skipped(u32),
}

/// Decode a leaf box body into its typed record.
pub fn parse_leaf(box_type: u32, body: &[u8]) -> DemuxResult<LeafBox> {
    match box_type {
        FTYP => Ok(LeafBox::Ftyp(parse_ftyp(body)?)),
        MVHD => Ok(LeafBox::Mvhd(parse_mvhd(body)?)),
        TKHD => Ok(LeafBox::Tkhd(parse_tkhd(body)?)),
        MDHD => Ok(LeafBox::Mdhd(parse_mdhd(body)?)),
        ELST => Ok(LeafBox::Elst(parse_elst(body)?)),
        STSD => Ok(LeafBox::Stsd(parse_stsd(body)?)),
        STSC => Ok(LeafBox::Stsc(parse_stsc(body)?)),
        STSZ => Ok(LeafBox::Stsz(parse_stsz(body)?)),
        STCO => Ok(LeafBox::Stco(parse_stco(body)?)),
        STTS => Ok(LeafBox::Stts(parse_stts(body)?)),
        other => {
            trace!("skipping unrecognized box '{}'", fourcc_to_string(other));
            Ok(LeafBox::Skipped(other))
        }
    }
}

// ─── Leaf parsers ───────────────────────────────────────────────────

/// Parse an ftyp body: major brand, minor version, compatible brands.
pub fn parse_ftyp(body: &[u8]) -> DemuxResult<FtypBox> {
    let r = ByteReader::new(body);
    let major_brand = r.read_fourcc(0)?;
    let minor_version = r.read_u32(4)?;

    let mut compatible_brands = Vec::with_capacity((body.len().saturating_sub(8)) / 4);
    let mut offset = 8;
    while offset + 4 <= body.len() {
        compatible_brands.push(r.read_fourcc(offset)?);
        offset += 4;
    }

    debug!(
        "ftyp: major_brand='{}', minor_version={}, {} compatible brands",
        fourcc_to_string(major_brand),
        minor_version,
        compatible_brands.len()
    );

    Ok(FtypBox {
        major_brand,
        minor_version,
        compatible_brands,
    })
}

fn require_version0(body: &[u8], name: &str) -> DemuxResult<()> {
    let version = ByteReader::new(body).read_u8(0)?;
    if version != 0 {
        return Err(DemuxError::InvalidStructure {
            offset: 0,
            reason: format!("{name} version {version} is not supported"),
        });
    }
    Ok(())
}

/// Parse an mvhd body (version 0): timescale and duration.
pub fn parse_mvhd(body: &[u8]) -> DemuxResult<MvhdBox> {
    require_version0(body, "mvhd")?;
    let r = ByteReader::new(body);
    // version/flags (4) + creation (4) + modification (4)
    let timescale = r.read_u32(12)?;
    let duration = r.read_u32(16)?;

    debug!("mvhd: timescale={}, duration={}", timescale, duration);
    Ok(MvhdBox {
        timescale,
        duration,
    })
}

/// Parse a tkhd body. The track-id offset depends on the version: 12 for
/// v0 (32-bit times), 20 for v1 (64-bit times).
pub fn parse_tkhd(body: &[u8]) -> DemuxResult<TkhdBox> {
    let r = ByteReader::new(body);
    let version = r.read_u8(0)?;
    let track_id = match version {
        0 => r.read_u32(12)?,
        1 => r.read_u32(20)?,
        v => {
            return Err(DemuxError::InvalidStructure {
                offset: 0,
                reason: format!("tkhd version {v} is not supported"),
            })
        }
    };

    debug!("tkhd: track_id={}", track_id);
    Ok(TkhdBox { track_id })
}

/// Parse an mdhd body (version 0): media timescale and duration.
pub fn parse_mdhd(body: &[u8]) -> DemuxResult<MdhdBox> {
    require_version0(body, "mdhd")?;
    let r = ByteReader::new(body);
    let timescale = r.read_u32(12)?;
    let duration = r.read_u32(16)?;

    debug!("mdhd: timescale={}, duration={}", timescale, duration);
    Ok(MdhdBox {
        timescale,
        duration,
    })
}

/// Parse an elst body (version 0).
pub fn parse_elst(body: &[u8]) -> DemuxResult<ElstBox> {
    require_version0(body, "elst")?;
    let r = ByteReader::new(body);
    let entry_count = r.read_u32(4)? as usize;

    let mut entries = Vec::with_capacity(entry_count);
    let mut offset = 8;
    for _ in 0..entry_count {
        entries.push(ElstEntry {
            segment_duration: r.read_u32(offset)?,
            media_time: r.read_u32(offset + 4)?,
            media_rate_int: r.read_u16(offset + 8)?,
            media_rate_frac: r.read_u16(offset + 10)?,
        });
        offset += 12;
    }

    debug!("elst: {} entries", entries.len());
    Ok(ElstBox { entries })
}

/// Fixed part of a VisualSampleEntry before the nested config boxes
/// (ISO 14496-15): reserved(6) + data_ref_index(2) + pre_defined(16) +
/// width(2) + height(2) + resolution(8) + reserved(4) + frame_count(2) +
/// compressor_name(32) + depth(2) + pre_defined(2).
const VISUAL_SAMPLE_ENTRY_SIZE: usize = 78;

/// Parse an stsd body: exactly one avc1 sample entry with a nested avcC.
///
/// Anything other than avc1 is rejected — this demuxer only realizes the
/// AVC video path.
pub fn parse_stsd(body: &[u8]) -> DemuxResult<Avc1Entry> {
    require_version0(body, "stsd")?;
    let r = ByteReader::new(body);
    let entry_count = r.read_u32(4)?;
    if entry_count == 0 {
        return Err(DemuxError::InvalidStructure {
            offset: 0,
            reason: "stsd has no sample entries".into(),
        });
    }
    if entry_count > 1 {
        debug!("stsd: {} entries, using the first", entry_count);
    }

    let entry = read_box_header(body, 8, body.len())?;
    if entry.box_type != AVC1 {
        return Err(DemuxError::UnsupportedCodec(fourcc_to_string(
            entry.box_type,
        )));
    }

    let base = entry.body_start();
    let width = r.read_u16(base + 24)?;
    let height = r.read_u16(base + 26)?;
    let frame_count = r.read_u16(base + 40)?;
    let depth = r.read_u16(base + 74)?;

    debug!(
        "avc1 sample entry: {}x{}, frame_count={}, depth={}",
        width, height, frame_count, depth
    );

    // The nested config boxes (avcC, plus optional pasp/btrt/colr) follow
    // the fixed fields.
    let mut avcc = None;
    let mut offset = base + VISUAL_SAMPLE_ENTRY_SIZE;
    while offset < entry.end() {
        let sub = read_box_header(body, offset, entry.end())?;
        if sub.box_type == AVCC {
            avcc = Some(body[sub.body_start()..sub.end()].to_vec());
        }
        offset = sub.end();
    }

    let avcc = avcc.ok_or_else(|| DemuxError::InvalidStructure {
        offset: entry.offset as u64,
        reason: "avc1 sample entry carries no avcC box".into(),
    })?;

    Ok(Avc1Entry {
        width,
        height,
        frame_count,
        depth,
        avcc,
    })
}

/// Parse an stsc body.
pub fn parse_stsc(body: &[u8]) -> DemuxResult<Vec<StscEntry>> {
    require_version0(body, "stsc")?;
    let r = ByteReader::new(body);
    let entry_count = r.read_u32(4)? as usize;

    let mut entries = Vec::with_capacity(entry_count);
    let mut offset = 8;
    for _ in 0..entry_count {
        entries.push(StscEntry {
            first_chunk: r.read_u32(offset)?,
            samples_per_chunk: r.read_u32(offset + 4)?,
            sample_description_index: r.read_u32(offset + 8)?,
        });
        offset += 12;
    }

    debug!("stsc: {} entries", entries.len());
    Ok(entries)
}

/// Parse an stsz body: either a constant size or one size per sample.
pub fn parse_stsz(body: &[u8]) -> DemuxResult<StszBox> {
    require_version0(body, "stsz")?;
    let r = ByteReader::new(body);
    let default_sample_size = r.read_u32(4)?;
    let sample_count = r.read_u32(8)?;

    let sample_sizes = if default_sample_size == 0 {
        let mut sizes = Vec::with_capacity(sample_count as usize);
        let mut offset = 12;
        for _ in 0..sample_count {
            sizes.push(r.read_u32(offset)?);
            offset += 4;
        }
        sizes
    } else {
        Vec::new()
    };

    debug!(
        "stsz: {} samples, default_size={}",
        sample_count, default_sample_size
    );

    Ok(StszBox {
        default_sample_size,
        sample_count,
        sample_sizes,
    })
}

/// Parse an stco body: 32-bit chunk offsets, widened for arithmetic.
pub fn parse_stco(body: &[u8]) -> DemuxResult<Vec<u64>> {
    require_version0(body, "stco")?;
    let r = ByteReader::new(body);
    let entry_count = r.read_u32(4)? as usize;

    let mut offsets = Vec::with_capacity(entry_count);
    let mut offset = 8;
    for _ in 0..entry_count {
        offsets.push(r.read_u32(offset)? as u64);
        offset += 4;
    }

    debug!("stco: {} chunk offsets", offsets.len());
    Ok(offsets)
}

/// Parse an stts body.
pub fn parse_stts(body: &[u8]) -> DemuxResult<Vec<SttsEntry>> {
    require_version0(body, "stts")?;
    let r = ByteReader::new(body);
    let entry_count = r.read_u32(4)? as usize;

    let mut entries = Vec::with_capacity(entry_count);
    let mut offset = 8;
    for _ in 0..entry_count {
        entries.push(SttsEntry {
            sample_count: r.read_u32(offset)?,
            sample_delta: r.read_u32(offset + 4)?,
        });
        offset += 8;
    }

    debug!("stts: {} entries", entries.len());
    Ok(entries)
}

// ─── Tests ──────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    /// Helper: build a box from fourcc + payload.
    fn make_box(fourcc: &[u8; 4], payload: &[u8]) -> Vec<u8> {
        let mut buf = Vec::new();
        buf.extend_from_slice(&((payload.len() + 8) as u32).to_be_bytes());
        buf.extend_from_slice(fourcc);
        buf.extend_from_slice(payload);
        buf
    }

    /// Helper: full-box payload (version + flags + body).
    fn full_box_payload(version: u8, body: &[u8]) -> Vec<u8> {
        let mut buf = vec![version, 0, 0, 0];
        buf.extend_from_slice(body);
        buf
    }

    #[test]
    fn header_rejects_undersized_box() {
        let mut data = make_box(b"free", &[]);
        data[0..4].copy_from_slice(&4u32.to_be_bytes());
        let err = read_box_header(&data, 0, data.len()).unwrap_err();
        assert!(matches!(err, DemuxError::InvalidStructure { .. }));
    }

    #[test]
    fn header_rejects_overflowing_box() {
        let data = make_box(b"free", &[0u8; 4]);
        // Parent claimed to end before the box does.
        let err = read_box_header(&data, 0, 10).unwrap_err();
        assert!(matches!(err, DemuxError::InvalidStructure { .. }));
    }

    #[test]
    fn walk_visits_siblings_in_order() {
        let mut data = make_box(b"free", &[1, 2, 3]);
        data.extend_from_slice(&make_box(b"skip", &[4]));

        let mut seen = Vec::new();
        walk(&data, 0, data.len(), &mut |header, body| {
            seen.push((fourcc_to_string(header.box_type), body.len()));
            Ok(())
        })
        .unwrap();

        assert_eq!(seen, vec![("free".to_string(), 3), ("skip".to_string(), 1)]);
    }

    #[test]
    fn container_and_leaf_classification() {
        for cc in [MOOV, TRAK, MDIA, MINF, STBL, EDTS] {
            assert!(is_container(cc));
        }
        for cc in [FTYP, MVHD, STSD, MDAT, AVC1] {
            assert!(!is_container(cc));
        }
    }

    #[test]
    fn parses_ftyp_brands() {
        let mut payload = Vec::new();
        payload.extend_from_slice(b"isom");
        payload.extend_from_slice(&512u32.to_be_bytes());
        payload.extend_from_slice(b"isomavc1");

        let ftyp = parse_ftyp(&payload).unwrap();
        assert_eq!(ftyp.major_brand.to_be_bytes(), *b"isom");
        assert_eq!(ftyp.minor_version, 512);
        assert_eq!(ftyp.compatible_brands.len(), 2);
        assert_eq!(ftyp.compatible_brands[1].to_be_bytes(), *b"avc1");
    }

    #[test]
    fn parses_mvhd_v0() {
        let mut body = Vec::new();
        body.extend_from_slice(&0u32.to_be_bytes()); // creation
        body.extend_from_slice(&0u32.to_be_bytes()); // modification
        body.extend_from_slice(&1000u32.to_be_bytes()); // timescale
        body.extend_from_slice(&60_000u32.to_be_bytes()); // duration
        let payload = full_box_payload(0, &body);

        let mvhd = parse_mvhd(&payload).unwrap();
        assert_eq!(mvhd.timescale, 1000);
        assert_eq!(mvhd.duration, 60_000);
    }

    #[test]
    fn mvhd_v1_is_rejected() {
        let payload = full_box_payload(1, &[0u8; 28]);
        assert!(parse_mvhd(&payload).is_err());
    }

    #[test]
    fn parses_tkhd_both_versions() {
        // v0: creation(4) + modification(4) + track_id(4)
        let mut body = vec![0u8; 8];
        body.extend_from_slice(&3u32.to_be_bytes());
        let payload = full_box_payload(0, &body);
        assert_eq!(parse_tkhd(&payload).unwrap().track_id, 3);

        // v1: creation(8) + modification(8) + track_id(4)
        let mut body = vec![0u8; 16];
        body.extend_from_slice(&7u32.to_be_bytes());
        let payload = full_box_payload(1, &body);
        assert_eq!(parse_tkhd(&payload).unwrap().track_id, 7);
    }

    #[test]
    fn parses_elst_entries() {
        let mut body = Vec::new();
        body.extend_from_slice(&2u32.to_be_bytes()); // entry_count
        for (dur, time) in [(1000u32, 9000u32), (500, 0)] {
            body.extend_from_slice(&dur.to_be_bytes());
            body.extend_from_slice(&time.to_be_bytes());
            body.extend_from_slice(&1u16.to_be_bytes());
            body.extend_from_slice(&0u16.to_be_bytes());
        }
        let payload = full_box_payload(0, &body);

        let elst = parse_elst(&payload).unwrap();
        assert_eq!(elst.entries.len(), 2);
        assert_eq!(elst.entries[0].media_time, 9000);
        assert_eq!(elst.entries[0].media_rate_int, 1);
        assert_eq!(elst.entries[1].segment_duration, 500);
    }

    #[test]
    fn parses_stsc_entries() {
        let mut body = Vec::new();
        body.extend_from_slice(&2u32.to_be_bytes());
        for (first, per, desc) in [(1u32, 2u32, 1u32), (3, 1, 1)] {
            body.extend_from_slice(&first.to_be_bytes());
            body.extend_from_slice(&per.to_be_bytes());
            body.extend_from_slice(&desc.to_be_bytes());
        }
        let payload = full_box_payload(0, &body);

        let stsc = parse_stsc(&payload).unwrap();
        assert_eq!(stsc.len(), 2);
        assert_eq!(stsc[0].first_chunk, 1);
        assert_eq!(stsc[0].samples_per_chunk, 2);
        assert_eq!(stsc[1].first_chunk, 3);
    }

    #[test]
    fn parses_stsz_explicit_sizes() {
        let mut body = Vec::new();
        body.extend_from_slice(&0u32.to_be_bytes()); // default size = 0
        body.extend_from_slice(&3u32.to_be_bytes()); // count
        for size in [100u32, 200, 150] {
            body.extend_from_slice(&size.to_be_bytes());
        }
        let payload = full_box_payload(0, &body);

        let stsz = parse_stsz(&payload).unwrap();
        assert_eq!(stsz.sample_count, 3);
        assert_eq!(stsz.sample_sizes, vec![100, 200, 150]);
        assert_eq!(stsz.size_of(1), Some(200));
        assert_eq!(stsz.size_of(3), None);
    }

    #[test]
    fn parses_stsz_constant_size() {
        let mut body = Vec::new();
        body.extend_from_slice(&256u32.to_be_bytes());
        body.extend_from_slice(&5u32.to_be_bytes());
        let payload = full_box_payload(0, &body);

        let stsz = parse_stsz(&payload).unwrap();
        assert_eq!(stsz.default_sample_size, 256);
        assert!(stsz.sample_sizes.is_empty());
        assert_eq!(stsz.size_of(4), Some(256));
        assert_eq!(stsz.size_of(5), None);
    }

    #[test]
    fn parses_stco_offsets() {
        let mut body = Vec::new();
        body.extend_from_slice(&3u32.to_be_bytes());
        for off in [100u32, 300, 500] {
            body.extend_from_slice(&off.to_be_bytes());
        }
        let payload = full_box_payload(0, &body);

        assert_eq!(parse_stco(&payload).unwrap(), vec![100, 300, 500]);
    }

    #[test]
    fn parses_stts_entries() {
        let mut body = Vec::new();
        body.extend_from_slice(&1u32.to_be_bytes());
        body.extend_from_slice(&30u32.to_be_bytes());
        body.extend_from_slice(&3000u32.to_be_bytes());
        let payload = full_box_payload(0, &body);

        let stts = parse_stts(&payload).unwrap();
        assert_eq!(stts.len(), 1);
        assert_eq!(stts[0].sample_count, 30);
        assert_eq!(stts[0].sample_delta, 3000);
    }

    /// Build an avc1 sample entry box with a nested avcC body.
    fn make_avc1_entry(width: u16, height: u16, avcc_body: &[u8]) -> Vec<u8> {
        let mut entry = vec![0u8; VISUAL_SAMPLE_ENTRY_SIZE];
        entry[24..26].copy_from_slice(&width.to_be_bytes());
        entry[26..28].copy_from_slice(&height.to_be_bytes());
        entry[40..42].copy_from_slice(&1u16.to_be_bytes()); // frame_count
        entry[74..76].copy_from_slice(&24u16.to_be_bytes()); // depth
        entry.extend_from_slice(&make_box(b"avcC", avcc_body));
        make_box(b"avc1", &entry)
    }

    #[test]
    fn parses_stsd_with_avc1() {
        let avcc_body = [1u8, 0x64, 0x00, 0x1f, 0xff];
        let mut body = Vec::new();
        body.extend_from_slice(&1u32.to_be_bytes()); // entry_count
        body.extend_from_slice(&make_avc1_entry(1920, 1080, &avcc_body));
        let payload = full_box_payload(0, &body);

        let entry = parse_stsd(&payload).unwrap();
        assert_eq!(entry.width, 1920);
        assert_eq!(entry.height, 1080);
        assert_eq!(entry.frame_count, 1);
        assert_eq!(entry.depth, 24);
        assert_eq!(entry.avcc, avcc_body);
    }

    #[test]
    fn stsd_rejects_non_avc1() {
        let mut body = Vec::new();
        body.extend_from_slice(&1u32.to_be_bytes());
        body.extend_from_slice(&make_box(b"hev1", &[0u8; VISUAL_SAMPLE_ENTRY_SIZE]));
        let payload = full_box_payload(0, &body);

        let err = parse_stsd(&payload).unwrap_err();
        match err {
            DemuxError::UnsupportedCodec(name) => assert_eq!(name, "hev1"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn stsd_requires_avcc() {
        let mut body = Vec::new();
        body.extend_from_slice(&1u32.to_be_bytes());
        body.extend_from_slice(&make_box(b"avc1", &[0u8; VISUAL_SAMPLE_ENTRY_SIZE]));
        let payload = full_box_payload(0, &body);

        assert!(parse_stsd(&payload).is_err());
    }

    #[test]
    fn parse_leaf_dispatches_and_skips() {
        let mut body = Vec::new();
        body.extend_from_slice(&0u32.to_be_bytes());
        body.extend_from_slice(&0u32.to_be_bytes());
        let payload = full_box_payload(0, &body);
        assert!(matches!(
            parse_leaf(STTS, &payload).unwrap(),
            LeafBox::Stts(_)
        ));

        let unknown = fourcc(b'u', b'd', b't', b'a');
        assert!(matches!(
            parse_leaf(unknown, &[]).unwrap(),
            LeafBox::Skipped(cc) if cc == unknown
        ));
    }
}
