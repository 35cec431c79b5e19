//! Media records flowing out of the demuxer — NAL units, samples, track
//! buffers, and the accumulated metadata/info records.

use serde::{Deserialize, Serialize};

use crate::error::{DemuxError, DemuxResult};
use crate::types::{FrameRate, Rational};

/// A single H.264 NAL unit as carried inside an MP4 sample.
///
/// `data` keeps the original length prefix in front of the payload, so a
/// remuxer can re-emit the sample bytes without re-framing.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NalUnit {
    /// NAL unit type (low 5 bits of the first payload byte).
    pub nal_type: u8,
    /// Length prefix + payload.
    pub data: Vec<u8>,
}

/// One coded video frame, split into its NAL units.
#[derive(Clone, Debug)]
pub struct VideoSample {
    /// Decode timestamp in media-timescale ticks. Signed: edit lists can
    /// shift the first samples below zero.
    pub dts: i64,
    /// Presentation timestamp in media-timescale ticks.
    pub pts: i64,
    /// Composition offset (pts - dts).
    pub cts: i64,
    /// Total byte length of the sample data.
    pub length: u32,
    /// True when the sample contains an IDR NAL unit.
    pub is_keyframe: bool,
    /// NAL units in bitstream order.
    pub units: Vec<NalUnit>,
}

/// Accumulating sample list for one track, drained on each dispatch.
#[derive(Clone, Debug, Default)]
pub struct TrackBuffer {
    pub track_id: u32,
    pub samples: Vec<VideoSample>,
    /// Total byte length of all buffered samples.
    pub byte_length: u32,
}

impl TrackBuffer {
    pub fn new(track_id: u32) -> Self {
        Self {
            track_id,
            samples: Vec::new(),
            byte_length: 0,
        }
    }

    pub fn push(&mut self, sample: VideoSample) {
        self.byte_length += sample.length;
        self.samples.push(sample);
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Take the buffered samples, leaving the buffer empty for reuse.
    pub fn drain(&mut self) -> TrackBuffer {
        TrackBuffer {
            track_id: self.track_id,
            samples: std::mem::take(&mut self.samples),
            byte_length: std::mem::replace(&mut self.byte_length, 0),
        }
    }

    pub fn clear(&mut self) {
        self.samples.clear();
        self.byte_length = 0;
    }
}

/// Finalized metadata for the video track, emitted once per session.
#[derive(Clone, Debug)]
pub struct VideoMeta {
    pub track_id: u32,
    /// Movie timescale (from mvhd).
    pub timescale: u32,
    /// Movie duration in mvhd ticks.
    pub duration: u32,
    /// Media timescale (from mdhd); sample timestamps use this rate.
    pub timescale_mdhd: u32,
    /// Media duration in mdhd ticks.
    pub duration_mdhd: u32,
    /// Coded frame size (from the SPS, before cropping/SAR).
    pub codec_width: u32,
    pub codec_height: u32,
    /// Display size (after SAR scaling).
    pub present_width: u32,
    pub present_height: u32,
    pub profile: String,
    pub level: String,
    pub bit_depth: u8,
    pub chroma_format: String,
    pub sar_ratio: Rational,
    pub frame_rate: FrameRate,
    /// Nominal per-sample duration in mdhd ticks.
    pub ref_sample_duration: f64,
    /// Raw AVCDecoderConfigurationRecord bytes.
    pub avcc: Vec<u8>,
    /// RFC 6381 codec string, e.g. `avc1.64001f`.
    pub codec: String,
}

/// Incremental accumulator for [`VideoMeta`].
///
/// The record is filled by several box parsers (mvhd, mdhd, stsd/avcC,
/// SPS); every field stays optional until `finalize()`.
#[derive(Clone, Debug, Default)]
pub struct VideoMetaBuilder {
    pub track_id: Option<u32>,
    pub timescale: Option<u32>,
    pub duration: Option<u32>,
    pub timescale_mdhd: Option<u32>,
    pub duration_mdhd: Option<u32>,
    pub codec_width: Option<u32>,
    pub codec_height: Option<u32>,
    pub present_width: Option<u32>,
    pub present_height: Option<u32>,
    pub profile: Option<String>,
    pub level: Option<String>,
    pub bit_depth: Option<u8>,
    pub chroma_format: Option<String>,
    pub sar_ratio: Option<Rational>,
    pub frame_rate: Option<FrameRate>,
    pub avcc: Option<Vec<u8>>,
    pub codec: Option<String>,
}

impl VideoMetaBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Produce the immutable record, or fail naming the first missing field.
    pub fn finalize(&self) -> DemuxResult<VideoMeta> {
        fn take<T: Clone>(field: &Option<T>, name: &str) -> DemuxResult<T> {
            field.clone().ok_or_else(|| DemuxError::InvalidStructure {
                offset: 0,
                reason: format!("video track metadata incomplete: missing {name}"),
            })
        }

        let timescale_mdhd = take(&self.timescale_mdhd, "mdhd timescale")?;
        let frame_rate = take(&self.frame_rate, "frame rate")?;
        let ref_sample_duration =
            timescale_mdhd as f64 * (frame_rate.fps_den as f64 / frame_rate.fps_num as f64);

        Ok(VideoMeta {
            track_id: take(&self.track_id, "track id")?,
            timescale: take(&self.timescale, "mvhd timescale")?,
            duration: take(&self.duration, "mvhd duration")?,
            timescale_mdhd,
            duration_mdhd: take(&self.duration_mdhd, "mdhd duration")?,
            codec_width: take(&self.codec_width, "codec width")?,
            codec_height: take(&self.codec_height, "codec height")?,
            present_width: take(&self.present_width, "present width")?,
            present_height: take(&self.present_height, "present height")?,
            profile: take(&self.profile, "profile")?,
            level: take(&self.level, "level")?,
            bit_depth: take(&self.bit_depth, "bit depth")?,
            chroma_format: take(&self.chroma_format, "chroma format")?,
            sar_ratio: take(&self.sar_ratio, "sample aspect ratio")?,
            frame_rate,
            ref_sample_duration,
            avcc: take(&self.avcc, "avcC record")?,
            codec: take(&self.codec, "codec string")?,
        })
    }
}

/// Media information record, emitted once all required fields are known.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MediaInfo {
    pub mime_type: String,
    /// Total duration in milliseconds, if known.
    pub duration_ms: Option<u64>,
    pub has_audio: bool,
    pub has_video: bool,
    pub audio_codec: Option<String>,
    pub video_codec: Option<String>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub fps: Option<f64>,
    pub profile: Option<String>,
    pub level: Option<String>,
    pub chroma_format: Option<String>,
    pub sar: Option<Rational>,
    pub ref_frames: Option<u32>,
}

impl Default for MediaInfo {
    fn default() -> Self {
        Self {
            mime_type: "video/mp4".into(),
            duration_ms: None,
            has_audio: false,
            has_video: true,
            audio_codec: None,
            video_codec: None,
            width: None,
            height: None,
            fps: None,
            profile: None,
            level: None,
            chroma_format: None,
            sar: None,
            ref_frames: None,
        }
    }
}

impl MediaInfo {
    /// True once every field the declared track set requires is populated.
    pub fn is_complete(&self) -> bool {
        let video_ok = !self.has_video
            || (self.video_codec.is_some()
                && self.width.is_some()
                && self.height.is_some()
                && self.fps.is_some());
        let audio_ok = !self.has_audio || self.audio_codec.is_some();
        self.duration_ms.is_some() && video_ok && audio_ok
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(dts: i64, len: u32) -> VideoSample {
        VideoSample {
            dts,
            pts: dts,
            cts: 0,
            length: len,
            is_keyframe: false,
            units: vec![],
        }
    }

    #[test]
    fn track_buffer_push_and_drain() {
        let mut buf = TrackBuffer::new(1);
        assert!(buf.is_empty());

        buf.push(sample(0, 100));
        buf.push(sample(3000, 250));
        assert_eq!(buf.samples.len(), 2);
        assert_eq!(buf.byte_length, 350);

        let drained = buf.drain();
        assert_eq!(drained.track_id, 1);
        assert_eq!(drained.samples.len(), 2);
        assert_eq!(drained.byte_length, 350);
        assert!(buf.is_empty());
        assert_eq!(buf.byte_length, 0);
    }

    #[test]
    fn builder_finalize_requires_all_fields() {
        let mut b = VideoMetaBuilder::new();
        assert!(b.finalize().is_err());

        b.track_id = Some(1);
        b.timescale = Some(1000);
        b.duration = Some(10_000);
        b.timescale_mdhd = Some(90_000);
        b.duration_mdhd = Some(900_000);
        b.codec_width = Some(1920);
        b.codec_height = Some(1080);
        b.present_width = Some(1920);
        b.present_height = Some(1080);
        b.profile = Some("High".into());
        b.level = Some("4.0".into());
        b.bit_depth = Some(8);
        b.chroma_format = Some("4:2:0".into());
        b.sar_ratio = Some(Rational::ONE);
        b.frame_rate = Some(FrameRate::new(30000, 1001, true));
        b.avcc = Some(vec![1, 0x64, 0, 0x1f]);
        b.codec = Some("avc1.64001f".into());

        let meta = b.finalize().unwrap();
        assert_eq!(meta.track_id, 1);
        assert_eq!(meta.timescale_mdhd, 90_000);
        // 90000 * 1001 / 30000 = 3003 ticks per frame
        assert!((meta.ref_sample_duration - 3003.0).abs() < 1e-6);
    }

    #[test]
    fn builder_finalize_names_missing_field() {
        let b = VideoMetaBuilder::new();
        let err = b.finalize().unwrap_err().to_string();
        assert!(err.contains("mdhd timescale"));
    }

    #[test]
    fn media_info_completeness() {
        let mut info = MediaInfo::default();
        assert!(!info.is_complete());

        info.duration_ms = Some(10_000);
        info.video_codec = Some("avc1.42c01e".into());
        info.width = Some(320);
        info.height = Some(240);
        info.fps = Some(24.0);
        assert!(info.is_complete());

        // Declaring audio without an audio codec blocks completion.
        info.has_audio = true;
        assert!(!info.is_complete());
        info.audio_codec = Some("mp4a.40.2".into());
        assert!(info.is_complete());
    }
}
