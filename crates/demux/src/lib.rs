//! `vf-demux` — Streaming MP4 (ISO BMFF) demuxer.
//!
//! Consumes a growing byte stream pushed by a loader and emits media
//! info, AVC decoder configuration, and timestamped video samples split
//! into NAL units, ready for a downstream remuxer.
//!
//! No FFmpeg dependency — fully custom parser.

pub mod bytes;
pub mod events;
pub mod mp4;
pub mod nal;
pub mod probe;
pub mod sps;
pub mod traits;
