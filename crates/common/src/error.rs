//! Central error types for the engine (thiserror-based).

use thiserror::Error;

/// Demuxer/container parsing errors.
#[derive(Error, Debug)]
pub enum DemuxError {
    /// A read past the end of the available byte window.
    #[error("Buffer underflow at offset {offset}: needed {needed} bytes, {available} available")]
    BufferUnderflow {
        offset: usize,
        needed: usize,
        available: usize,
    },

    /// A box violates MP4 structural rules (bad size, wrong version, …).
    #[error("Invalid box at offset {offset}: {reason}")]
    InvalidStructure { offset: u64, reason: String },

    /// The flat sample table does not add up against stsz.
    #[error("Sample count mismatch: built {built} samples, stsz declares {expected}")]
    SampleCountMismatch { built: usize, expected: usize },

    /// Malformed payload with a preformatted message (codec
    /// configuration records and similar).
    #[error("{0}")]
    Malformed(String),

    /// The stsd sample entry is not an avc1 entry.
    #[error("Unsupported codec '{0}'")]
    UnsupportedCodec(String),

    /// The moov contains no trak matching the video track id.
    #[error("No video track found")]
    NoVideoTrack,

    /// A failure propagated from the loader or another collaborator.
    #[error("{0}")]
    Exception(String),
}

/// Coarse error classification surfaced on the event channel.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    /// Violation of MP4 structural rules.
    FormatError,
    /// The file uses a codec this demuxer does not handle.
    CodecUnsupported,
    /// Unexpected failure, typically propagated from the loader.
    Exception,
}

impl DemuxError {
    /// Classify this error for the event channel.
    pub fn kind(&self) -> ErrorKind {
        match self {
            DemuxError::UnsupportedCodec(_) => ErrorKind::CodecUnsupported,
            DemuxError::Exception(_) => ErrorKind::Exception,
            _ => ErrorKind::FormatError,
        }
    }
}

/// Convenience Result type for demux operations.
pub type DemuxResult<T> = Result<T, DemuxError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_kind_classification() {
        let e = DemuxError::InvalidStructure {
            offset: 16,
            reason: "size < 8".into(),
        };
        assert_eq!(e.kind(), ErrorKind::FormatError);

        let e = DemuxError::UnsupportedCodec("hev1".into());
        assert_eq!(e.kind(), ErrorKind::CodecUnsupported);

        let e = DemuxError::Exception("loader aborted".into());
        assert_eq!(e.kind(), ErrorKind::Exception);

        let e = DemuxError::SampleCountMismatch {
            built: 4,
            expected: 5,
        };
        assert_eq!(e.kind(), ErrorKind::FormatError);

        let e = DemuxError::Malformed("MP4: Invalid AVCDecoderConfigurationRecord".into());
        assert_eq!(e.kind(), ErrorKind::FormatError);
        assert_eq!(e.to_string(), "MP4: Invalid AVCDecoderConfigurationRecord");
    }

    #[test]
    fn error_display_contains_context() {
        let e = DemuxError::BufferUnderflow {
            offset: 100,
            needed: 4,
            available: 2,
        };
        let msg = e.to_string();
        assert!(msg.contains("100"));
        assert!(msg.contains("needed 4"));
    }
}
