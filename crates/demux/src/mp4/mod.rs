//! Streaming MP4 demuxer.
//!
//! Consumes byte chunks pushed by a loader, walks the `moov` tree for
//! the video track, resolves the sample tables, and emits metadata plus
//! NAL-framed samples through the event sink. There is no seeking: the
//! loader window is the only view of the stream.

pub mod avc;
pub mod boxes;
pub mod sample;

use tracing::{debug, info, warn};
use vf_common::{
    DemuxError, DemuxResult, DemuxerConfig, MediaInfo, TrackBuffer, VideoMetaBuilder, VideoSample,
};

use crate::events::{DemuxerEvent, EventSink, TrackKind};
use crate::nal;
use crate::probe::probe;
use crate::sps;
use crate::traits::ChunkConsumer;
use avc::AvcDecoderConfig;
use boxes::{
    fourcc_to_string, is_container, parse_ftyp, parse_leaf, read_box_header, walk, Avc1Entry,
    ElstBox, LeafBox, MdhdBox, StscEntry, StszBox, SttsEntry, MOOV, MVHD, TRAK,
};
use sample::SampleTable;

/// A first chunk must be larger than this before parsing starts.
const MIN_FIRST_CHUNK: usize = 36;

/// Track id pre-assigned to the video track stub; mvhd aliases it into
/// the metadata record and every trak's tkhd is matched against it.
const VIDEO_TRACK_ID: u32 = 1;

/// Lifecycle of one demux session.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum DemuxerState {
    WaitingForHeader,
    FtypParsed,
    MoovPending,
    TablesReady,
    Dispatching,
    Complete,
    Error,
}

/// Sample tables and timing collected from one trak subtree.
#[derive(Default)]
struct TrakTables {
    /// None until tkhd is seen; Some(false) turns the rest of the trak
    /// into a skip.
    matched: Option<bool>,
    mdhd: Option<MdhdBox>,
    elst: Option<ElstBox>,
    avc1: Option<Avc1Entry>,
    stsc: Option<Vec<StscEntry>>,
    stsz: Option<StszBox>,
    stco: Option<Vec<u64>>,
    stts: Option<Vec<SttsEntry>>,
}

/// Push-based MP4 demuxer for a single session.
pub struct Mp4Demuxer {
    config: DemuxerConfig,
    state: DemuxerState,
    aborted: bool,

    /// Bytes still to discard before the next top-level box header.
    skip_bytes: u64,

    meta: VideoMetaBuilder,
    media_info: MediaInfo,
    media_info_dispatched: bool,
    metadata_dispatched: bool,

    sample_table: Option<SampleTable>,
    nalu_length_size: u8,
    /// `timestamp_base` converted to mdhd ticks.
    timestamp_base_ticks: i64,
    /// Next flat-table index to extract.
    next_sample: usize,

    video_track: TrackBuffer,
    /// Never populated (the audio path is not realized) but handed to
    /// the sink so the dispatch contract carries both tracks.
    audio_track: TrackBuffer,
}

impl Mp4Demuxer {
    pub fn new(config: DemuxerConfig) -> Self {
        let mut media_info = MediaInfo::default();
        if let Some(v) = config.has_video_override {
            media_info.has_video = v;
        }
        if let Some(a) = config.has_audio_override {
            media_info.has_audio = a;
        }

        Self {
            config,
            state: DemuxerState::WaitingForHeader,
            aborted: false,
            skip_bytes: 0,
            meta: VideoMetaBuilder::new(),
            media_info,
            media_info_dispatched: false,
            metadata_dispatched: false,
            sample_table: None,
            nalu_length_size: 4,
            timestamp_base_ticks: 0,
            next_sample: 0,
            video_track: TrackBuffer::new(VIDEO_TRACK_ID),
            audio_track: TrackBuffer::new(VIDEO_TRACK_ID + 1),
        }
    }

    pub fn state(&self) -> DemuxerState {
        self.state
    }

    /// Request cancellation; observed on the next `parse_chunks` entry.
    pub fn abort(&mut self) {
        self.aborted = true;
    }

    /// Release every accumulator. Terminal regardless of state.
    pub fn destroy(&mut self) {
        self.meta = VideoMetaBuilder::new();
        self.sample_table = None;
        self.video_track.clear();
        self.audio_track.clear();
        self.next_sample = 0;
        self.state = DemuxerState::Complete;
    }

    /// The loader hit end-of-stream early: flush what is buffered and
    /// finish with whatever metadata was produced.
    pub fn eof(&mut self, sink: &mut dyn EventSink) {
        if !matches!(self.state, DemuxerState::Error) {
            self.dispatch_samples(sink);
            self.state = DemuxerState::Complete;
        }
    }

    /// Feed one chunk of the stream. `byte_start` is the absolute offset
    /// of `chunk[0]`. Returns the number of bytes consumed; the loader
    /// must re-deliver the rest.
    pub fn parse_chunks(
        &mut self,
        chunk: &[u8],
        byte_start: u64,
        sink: &mut dyn EventSink,
    ) -> usize {
        if self.aborted {
            debug!("abort observed, terminating session");
            self.state = DemuxerState::Complete;
            return chunk.len();
        }
        if matches!(self.state, DemuxerState::Complete | DemuxerState::Error) {
            return chunk.len();
        }

        let mut consumed = 0usize;

        if self.state == DemuxerState::WaitingForHeader {
            match self.parse_header(chunk, byte_start) {
                Ok(None) => return 0,
                Ok(Some(used)) => consumed = used,
                Err(e) => {
                    self.fail(sink, e);
                    return consumed;
                }
            }
        }

        if matches!(
            self.state,
            DemuxerState::FtypParsed | DemuxerState::MoovPending
        ) {
            match self.parse_moov_phase(chunk, byte_start, consumed, sink) {
                Ok(ParseProgress::NeedMoreData(used)) => return used,
                Ok(ParseProgress::Advanced(used)) => consumed = used,
                Err(e) => {
                    self.fail(sink, e);
                    return consumed;
                }
            }
        }

        if self.state == DemuxerState::Dispatching {
            match self.extract_samples(chunk, byte_start, consumed) {
                Ok(used) => consumed = used,
                Err(e) => {
                    self.fail(sink, e);
                    return consumed;
                }
            }
            self.dispatch_samples(sink);
        }

        consumed
    }

    // ── Phase 1: probe + ftyp ───────────────────────────────────────

    /// Returns the consumed byte count, or None when the chunk is still
    /// too small to start.
    fn parse_header(&mut self, chunk: &[u8], byte_start: u64) -> DemuxResult<Option<usize>> {
        if byte_start != 0 {
            return Err(DemuxError::InvalidStructure {
                offset: byte_start,
                reason: "stream did not start at byte 0".into(),
            });
        }
        if chunk.len() <= MIN_FIRST_CHUNK {
            return Ok(None);
        }

        let p = probe(chunk);
        if !p.matched {
            return Err(DemuxError::InvalidStructure {
                offset: 0,
                reason: "not an MP4 stream: no ftyp box at offset 0".into(),
            });
        }
        if chunk.len() < p.data_offset as usize {
            // ftyp itself is still incomplete.
            return Ok(None);
        }

        self.media_info.has_video = self.config.has_video_override.unwrap_or(p.has_video);
        self.media_info.has_audio = self.config.has_audio_override.unwrap_or(p.has_audio);

        let ftyp_header = read_box_header(chunk, 0, chunk.len())?;
        let ftyp = parse_ftyp(&chunk[ftyp_header.body_start()..ftyp_header.end()])?;
        info!(
            "MP4 stream: major_brand='{}', moov expected at {}",
            fourcc_to_string(ftyp.major_brand),
            p.info_offset
        );

        self.state = DemuxerState::FtypParsed;
        Ok(Some(p.data_offset as usize))
    }

    // ── Phase 2: moov ───────────────────────────────────────────────

    fn parse_moov_phase(
        &mut self,
        chunk: &[u8],
        byte_start: u64,
        mut consumed: usize,
        sink: &mut dyn EventSink,
    ) -> DemuxResult<ParseProgress> {
        // Finish discarding a box that spilled past earlier windows.
        if self.skip_bytes > 0 {
            let take = (self.skip_bytes).min((chunk.len() - consumed) as u64) as usize;
            consumed += take;
            self.skip_bytes -= take as u64;
            if consumed == chunk.len() {
                self.state = DemuxerState::MoovPending;
                return Ok(ParseProgress::NeedMoreData(consumed));
            }
        }

        loop {
            let avail = &chunk[consumed..];
            if avail.len() < 8 {
                self.state = DemuxerState::MoovPending;
                return Ok(ParseProgress::NeedMoreData(consumed));
            }

            let header = read_box_header(avail, 0, usize::MAX)?;
            let size = header.size as usize;

            if header.box_type == MOOV {
                if avail.len() < size {
                    // Wait with moov unconsumed until it is whole.
                    self.state = DemuxerState::MoovPending;
                    return Ok(ParseProgress::NeedMoreData(consumed));
                }
                self.parse_moov(&avail[..size], sink)?;
                consumed += size;
                self.state = DemuxerState::Dispatching;
                return Ok(ParseProgress::Advanced(consumed));
            }

            debug!(
                "skipping top-level box '{}' ({} bytes) before moov",
                fourcc_to_string(header.box_type),
                size
            );
            if avail.len() >= size {
                consumed += size;
            } else {
                self.skip_bytes = (size - avail.len()) as u64;
                self.state = DemuxerState::MoovPending;
                return Ok(ParseProgress::NeedMoreData(chunk.len()));
            }
        }
    }

    /// Walk a complete moov box and derive tables + metadata.
    fn parse_moov(&mut self, moov: &[u8], sink: &mut dyn EventSink) -> DemuxResult<()> {
        let header = read_box_header(moov, 0, moov.len())?;
        let body = &moov[header.body_start()..header.end()];

        let mut tables: Option<TrakTables> = None;

        walk(body, 0, body.len(), &mut |child, child_body| {
            match child.box_type {
                MVHD => {
                    if let LeafBox::Mvhd(mvhd) = parse_leaf(MVHD, child_body)? {
                        self.meta.track_id = Some(VIDEO_TRACK_ID);
                        self.meta.timescale = Some(mvhd.timescale);
                        self.meta.duration = Some(mvhd.duration);

                        if mvhd.timescale == 0 {
                            return Err(DemuxError::InvalidStructure {
                                offset: child.offset as u64,
                                reason: "mvhd timescale is zero".into(),
                            });
                        }
                        let derived_ms =
                            mvhd.duration as u64 * 1000 / mvhd.timescale as u64;
                        self.media_info.duration_ms = Some(
                            self.config
                                .duration_override
                                .map(u64::from)
                                .unwrap_or(derived_ms),
                        );
                    }
                    Ok(())
                }
                TRAK => {
                    let mut acc = TrakTables::default();
                    collect_trak(child_body, VIDEO_TRACK_ID, &mut acc)?;
                    match acc.matched {
                        Some(true) if tables.is_none() => tables = Some(acc),
                        Some(true) => {
                            warn!("multiple traks match the video track id, using the first")
                        }
                        _ => debug!("skipping non-video trak"),
                    }
                    Ok(())
                }
                other => {
                    debug!("skipping moov child '{}'", fourcc_to_string(other));
                    Ok(())
                }
            }
        })?;

        let tables = tables.ok_or(DemuxError::NoVideoTrack)?;
        self.apply_trak_tables(tables)?;
        self.state = DemuxerState::TablesReady;

        let meta = self.meta.finalize()?;
        info!(
            "video track ready: {}x{} {} @ {} fps, {} samples",
            meta.present_width,
            meta.present_height,
            meta.codec,
            meta.frame_rate.fps,
            self.sample_table.as_ref().map_or(0, |t| t.samples.len())
        );

        if !self.metadata_dispatched {
            self.metadata_dispatched = true;
            sink.on_event(DemuxerEvent::TrackMetadata {
                track: TrackKind::Video,
                meta,
            });
        }
        self.maybe_emit_media_info(sink);
        Ok(())
    }

    /// Turn the collected trak boxes into the flat sample table and the
    /// finalized metadata fields.
    fn apply_trak_tables(&mut self, t: TrakTables) -> DemuxResult<()> {
        fn require<T>(v: Option<T>, name: &str) -> DemuxResult<T> {
            v.ok_or_else(|| DemuxError::InvalidStructure {
                offset: 0,
                reason: format!("video trak missing {name}"),
            })
        }

        let mdhd = require(t.mdhd, "mdhd")?;
        let avc1 = require(t.avc1, "stsd/avc1")?;
        let stsc = require(t.stsc, "stsc")?;
        let stsz = require(t.stsz, "stsz")?;
        let stco = require(t.stco, "stco")?;
        let stts = require(t.stts, "stts")?;

        if mdhd.timescale == 0 {
            return Err(DemuxError::InvalidStructure {
                offset: 0,
                reason: "mdhd timescale is zero".into(),
            });
        }

        self.meta.timescale_mdhd = Some(mdhd.timescale);
        self.meta.duration_mdhd = Some(mdhd.duration);

        let timescale_mvhd = self.meta.timescale.unwrap_or(mdhd.timescale);
        let table = SampleTable::build(
            &stsc,
            &stsz,
            &stco,
            &stts,
            t.elst.as_ref(),
            timescale_mvhd,
            mdhd.timescale,
        )?;

        let implied_chunks = chunks_implied_by(&stsc, &stsz);
        if implied_chunks != stco.len() as u64 {
            warn!(
                "stsc implies {} chunks but stco lists {}",
                implied_chunks,
                stco.len()
            );
        }

        self.timestamp_base_ticks =
            self.config.timestamp_base as i64 * mdhd.timescale as i64 / 1000;

        self.parse_avc_config(&avc1)?;
        self.sample_table = Some(table);
        self.next_sample = 0;
        Ok(())
    }

    /// Validate the avcC record and derive the SPS-based metadata.
    fn parse_avc_config(&mut self, avc1: &Avc1Entry) -> DemuxResult<()> {
        let cfg = AvcDecoderConfig::parse(&avc1.avcc)?;
        self.nalu_length_size = cfg.nalu_length_size;

        let sps = sps::parse_sps(&cfg.sps).ok_or_else(|| {
            DemuxError::Malformed("MP4: Invalid AVCDecoderConfigurationRecord".into())
        })?;

        let frame_rate = if !sps.frame_rate.fixed || sps.frame_rate.is_degenerate() {
            debug!(
                "SPS carries no usable timing, substituting {} fps",
                vf_common::FrameRate::DEFAULT_23_976.fps
            );
            vf_common::FrameRate::DEFAULT_23_976
        } else {
            sps.frame_rate
        };

        self.meta.codec_width = Some(sps.codec_width);
        self.meta.codec_height = Some(sps.codec_height);
        self.meta.present_width = Some(sps.present_width);
        self.meta.present_height = Some(sps.present_height);
        self.meta.profile = Some(sps.profile_string.clone());
        self.meta.level = Some(sps.level_string.clone());
        self.meta.bit_depth = Some(sps.bit_depth);
        self.meta.chroma_format = Some(sps.chroma_format.clone());
        self.meta.sar_ratio = Some(sps.sar_ratio);
        self.meta.frame_rate = Some(frame_rate);
        self.meta.avcc = Some(cfg.raw.clone());
        self.meta.codec = Some(cfg.codec.clone());

        self.media_info.video_codec = Some(cfg.codec);
        self.media_info.width = Some(sps.present_width);
        self.media_info.height = Some(sps.present_height);
        self.media_info.fps = Some(frame_rate.fps);
        self.media_info.profile = Some(sps.profile_string);
        self.media_info.level = Some(sps.level_string);
        self.media_info.chroma_format = Some(sps.chroma_format);
        self.media_info.sar = Some(sps.sar_ratio);
        self.media_info.ref_frames = Some(sps.ref_frames);
        Ok(())
    }

    // ── Phase 3: sample extraction ──────────────────────────────────

    /// Pull every sample whose byte range is fully inside the current
    /// window, in decode order.
    fn extract_samples(
        &mut self,
        chunk: &[u8],
        byte_start: u64,
        mut consumed: usize,
    ) -> DemuxResult<usize> {
        let Some(table) = self.sample_table.as_ref() else {
            return Ok(consumed);
        };
        let window_end = byte_start + chunk.len() as u64;

        while self.next_sample < table.samples.len() {
            let s = table.samples[self.next_sample];

            if s.file_offset < byte_start + consumed as u64 {
                return Err(DemuxError::InvalidStructure {
                    offset: s.file_offset,
                    reason: format!(
                        "sample {} at offset {} precedes the parse position \
                         (non-streamable MP4 layout)",
                        self.next_sample, s.file_offset
                    ),
                });
            }
            if s.file_offset + s.size as u64 > window_end {
                // Not fully available; consume any gap before it so the
                // loader only re-delivers sample bytes.
                let start_rel = (s.file_offset.min(window_end) - byte_start) as usize;
                consumed = consumed.max(start_rel);
                return Ok(consumed);
            }

            let rel = (s.file_offset - byte_start) as usize;
            let data = &chunk[rel..rel + s.size as usize];
            if let Some((units, is_keyframe)) =
                nal::split_sample(data, self.nalu_length_size, s.dts)
            {
                self.video_track.push(VideoSample {
                    dts: s.dts + self.timestamp_base_ticks,
                    pts: s.pts + self.timestamp_base_ticks,
                    cts: s.cts,
                    length: s.size,
                    is_keyframe,
                    units,
                });
            }
            consumed = rel + s.size as usize;
            self.next_sample += 1;
        }

        debug!("all {} samples extracted", table.samples.len());
        self.state = DemuxerState::Complete;
        Ok(chunk.len())
    }

    /// Hand buffered samples to the sink, if metadata went out already.
    fn dispatch_samples(&mut self, sink: &mut dyn EventSink) {
        if self.metadata_dispatched
            && (!self.video_track.is_empty() || !self.audio_track.is_empty())
        {
            sink.on_event(DemuxerEvent::DataAvailable {
                audio: self.audio_track.drain(),
                video: self.video_track.drain(),
            });
        }
    }

    /// Emit MediaInfo once, the first time it is complete.
    fn maybe_emit_media_info(&mut self, sink: &mut dyn EventSink) {
        if !self.media_info_dispatched && self.media_info.is_complete() {
            self.media_info_dispatched = true;
            sink.on_event(DemuxerEvent::MediaInfo(self.media_info.clone()));
        }
    }

    fn fail(&mut self, sink: &mut dyn EventSink, err: DemuxError) {
        warn!("demux session failed: {err}");
        self.state = DemuxerState::Error;
        sink.on_event(DemuxerEvent::Error {
            kind: err.kind(),
            info: err.to_string(),
        });
    }
}

impl ChunkConsumer for Mp4Demuxer {
    fn on_data_arrival(
        &mut self,
        chunk: &[u8],
        byte_start: u64,
        sink: &mut dyn EventSink,
    ) -> usize {
        self.parse_chunks(chunk, byte_start, sink)
    }
}

/// Outcome of one parse step inside a chunk.
enum ParseProgress {
    /// The phase finished; parsing continues within this chunk.
    Advanced(usize),
    /// Parsing must pause until the loader delivers more bytes.
    NeedMoreData(usize),
}

/// Recursively collect the leaf boxes of one trak subtree.
///
/// The first leaf checked is tkhd: a non-matching track id turns the
/// remainder of the subtree into a skip, so foreign traks are never
/// deep-parsed (an mp4a stsd must not raise UnsupportedCodec).
fn collect_trak(body: &[u8], expected_id: u32, acc: &mut TrakTables) -> DemuxResult<()> {
    walk(body, 0, body.len(), &mut |header, child_body| {
        if acc.matched == Some(false) {
            return Ok(());
        }
        if is_container(header.box_type) {
            return collect_trak(child_body, expected_id, acc);
        }
        match parse_leaf(header.box_type, child_body)? {
            LeafBox::Tkhd(tkhd) => {
                let matches = tkhd.track_id == expected_id;
                if !matches {
                    debug!(
                        "trak id {} does not match video track id {}, skipping",
                        tkhd.track_id, expected_id
                    );
                }
                acc.matched = Some(matches);
            }
            LeafBox::Mdhd(m) => acc.mdhd = Some(m),
            LeafBox::Elst(e) => acc.elst = Some(e),
            LeafBox::Stsd(e) => acc.avc1 = Some(e),
            LeafBox::Stsc(e) => acc.stsc = Some(e),
            LeafBox::Stsz(e) => acc.stsz = Some(e),
            LeafBox::Stco(e) => acc.stco = Some(e),
            LeafBox::Stts(e) => acc.stts = Some(e),
            LeafBox::Ftyp(_) | LeafBox::Mvhd(_) | LeafBox::Skipped(_) => {}
        }
        Ok(())
    })
}

/// Total chunk count implied by expanding stsc against the sample count.
fn chunks_implied_by(stsc: &[StscEntry], stsz: &StszBox) -> u64 {
    let mut remaining = stsz.sample_count as u64;
    let mut chunks = 0u64;
    for (i, entry) in stsc.iter().enumerate() {
        let span_end = stsc
            .get(i + 1)
            .map(|next| next.first_chunk as u64)
            .unwrap_or(u64::MAX);
        let mut chunk = entry.first_chunk as u64;
        let spc = entry.samples_per_chunk.max(1) as u64;
        while chunk < span_end && remaining > 0 {
            remaining = remaining.saturating_sub(spc);
            chunks += 1;
            chunk += 1;
        }
        if remaining == 0 {
            break;
        }
    }
    chunks
}
