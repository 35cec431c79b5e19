//! Demuxer → consumer event channel.
//!
//! The demuxer reports everything through one sum type delivered
//! synchronously while a chunk is being parsed; the host matches on the
//! variants and dispatches.

use vf_common::{ErrorKind, MediaInfo, TrackBuffer, VideoMeta};

/// Everything the demuxer can tell its consumer.
#[derive(Clone, Debug)]
pub enum DemuxerEvent {
    /// The media-information record became complete.
    MediaInfo(MediaInfo),
    /// Decoder-level track metadata, emitted exactly once per session.
    TrackMetadata {
        track: TrackKind,
        meta: VideoMeta,
    },
    /// New samples are buffered; the sink takes ownership of both drains.
    DataAvailable {
        audio: TrackBuffer,
        video: TrackBuffer,
    },
    /// Fatal failure; the session is over.
    Error { kind: ErrorKind, info: String },
}

/// Which elementary stream an event refers to.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum TrackKind {
    Video,
    Audio,
}

/// Receiver for demuxer events.
pub trait EventSink {
    fn on_event(&mut self, event: DemuxerEvent);
}

/// Simple sink that records every event, mainly for tests and tooling.
#[derive(Default)]
pub struct EventCollector {
    pub events: Vec<DemuxerEvent>,
}

impl EventSink for EventCollector {
    fn on_event(&mut self, event: DemuxerEvent) {
        self.events.push(event);
    }
}

impl EventCollector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count events matching a predicate.
    pub fn count(&self, pred: impl Fn(&DemuxerEvent) -> bool) -> usize {
        self.events.iter().filter(|e| pred(*e)).count()
    }
}
