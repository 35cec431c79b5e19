//! Demuxer/loader configuration.

use serde::{Deserialize, Serialize};

/// Options recognized by the streaming pipeline.
///
/// The demuxer consumes the override and timestamp fields;
/// `reuse_redirected_url` is carried through for the loader.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DemuxerConfig {
    /// Loader-only: keep fetching from a redirected URL instead of the
    /// original one on reconnect.
    pub reuse_redirected_url: bool,
    /// Replaces the derived duration in `MediaInfo`, in milliseconds.
    pub duration_override: Option<u32>,
    /// Force the audio-presence flag, overriding what probing determined.
    pub has_audio_override: Option<bool>,
    /// Force the video-presence flag, overriding what probing determined.
    pub has_video_override: Option<bool>,
    /// Added to all output timestamps, in milliseconds.
    pub timestamp_base: u32,
}

impl Default for DemuxerConfig {
    fn default() -> Self {
        Self {
            reuse_redirected_url: false,
            duration_override: None,
            has_audio_override: None,
            has_video_override: None,
            timestamp_base: 0,
        }
    }
}
