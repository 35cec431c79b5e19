//! Loader → demuxer contract.

use crate::events::EventSink;

/// A consumer of byte chunks pushed by a loader.
///
/// The loader wires its data-arrival callback to `on_data_arrival` and is
/// responsible for re-delivering unconsumed bytes: when the return value
/// is less than `chunk.len()`, the tail must be prepended to the next
/// delivery, with `byte_start` updated to the absolute offset of the new
/// first byte.
pub trait ChunkConsumer {
    /// Feed one chunk. `byte_start` is the absolute stream offset of
    /// `chunk[0]`. Returns the number of bytes consumed.
    fn on_data_arrival(
        &mut self,
        chunk: &[u8],
        byte_start: u64,
        sink: &mut dyn EventSink,
    ) -> usize;
}
