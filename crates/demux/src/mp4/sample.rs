//! Sample table resolution — combines the compact stsc/stsz/stco/stts
//! tables into one flat record per sample: file byte range plus decode
//! and presentation timestamps.

use tracing::{debug, warn};
use vf_common::{DemuxError, DemuxResult};

use crate::mp4::boxes::{ElstBox, StscEntry, StszBox, SttsEntry};

/// One sample in decode order, fully resolved.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct FlatSample {
    /// 0-based chunk the sample lives in.
    pub chunk_index: u32,
    /// 0-based position within that chunk.
    pub index_in_chunk: u32,
    /// Absolute byte offset of the sample data in the stream.
    pub file_offset: u64,
    /// Byte size of the sample data.
    pub size: u32,
    /// Decode timestamp in mdhd ticks; negative when an edit list shifts
    /// the media backwards.
    pub dts: i64,
    /// Presentation timestamp. Without ctts support, equal to dts.
    pub pts: i64,
    /// Composition offset, always 0 here.
    pub cts: i64,
}

/// The flat sample table for the video track.
#[derive(Clone, Debug)]
pub struct SampleTable {
    /// Samples in decode order; length equals `stsz.sample_count`.
    pub samples: Vec<FlatSample>,
    /// Media timescale the timestamps are expressed in.
    pub timescale: u32,
}

impl SampleTable {
    /// Resolve the four compact tables (plus an optional edit list) into
    /// the flat per-sample table.
    ///
    /// `timescale_mvhd`/`timescale_mdhd` are needed to rescale the edit
    /// list's movie-timescale media time into media ticks.
    pub fn build(
        stsc: &[StscEntry],
        stsz: &StszBox,
        stco: &[u64],
        stts: &[SttsEntry],
        elst: Option<&ElstBox>,
        timescale_mvhd: u32,
        timescale_mdhd: u32,
    ) -> DemuxResult<Self> {
        validate_stsc(stsc)?;

        let sample_count = stsz.sample_count as usize;
        let mut samples = Vec::with_capacity(sample_count);

        // Walk chunks in order; the offset cursor starts at each chunk's
        // stco base and advances by sample size.
        let mut sample_idx = 0usize;
        'chunks: for (chunk_index, &chunk_offset) in stco.iter().enumerate() {
            let spc = samples_per_chunk(stsc, chunk_index as u32 + 1);
            let mut cursor = chunk_offset;

            for index_in_chunk in 0..spc {
                if sample_idx >= sample_count {
                    warn!(
                        "chunk {} unreachable: all {} samples already mapped",
                        chunk_index + 1,
                        sample_count
                    );
                    break 'chunks;
                }

                let size = stsz.size_of(sample_idx).ok_or_else(|| {
                    DemuxError::SampleCountMismatch {
                        built: sample_idx,
                        expected: sample_count,
                    }
                })?;

                samples.push(FlatSample {
                    chunk_index: chunk_index as u32,
                    index_in_chunk,
                    file_offset: cursor,
                    size,
                    dts: 0,
                    pts: 0,
                    cts: 0,
                });
                cursor += size as u64;
                sample_idx += 1;
            }
        }

        if samples.len() != sample_count {
            return Err(DemuxError::SampleCountMismatch {
                built: samples.len(),
                expected: sample_count,
            });
        }

        apply_timing(&mut samples, stts, elst, timescale_mvhd, timescale_mdhd);

        debug!(
            "sample table: {} samples over {} chunks, timescale={}",
            samples.len(),
            stco.len(),
            timescale_mdhd
        );

        Ok(SampleTable {
            samples,
            timescale: timescale_mdhd,
        })
    }
}

/// stsc entries must be strictly ascending by first_chunk.
fn validate_stsc(stsc: &[StscEntry]) -> DemuxResult<()> {
    for pair in stsc.windows(2) {
        if pair[1].first_chunk <= pair[0].first_chunk {
            return Err(DemuxError::InvalidStructure {
                offset: 0,
                reason: format!(
                    "stsc entries not strictly ascending: {} then {}",
                    pair[0].first_chunk, pair[1].first_chunk
                ),
            });
        }
    }
    Ok(())
}

/// Samples in the given chunk (1-based chunk number).
///
/// The run-length table is consulted lazily per chunk instead of being
/// expanded into a per-chunk array: the applicable entry is the last one
/// whose `first_chunk` does not exceed the chunk number.
fn samples_per_chunk(stsc: &[StscEntry], chunk_number: u32) -> u32 {
    let mut spc = 0;
    for entry in stsc {
        if entry.first_chunk <= chunk_number {
            spc = entry.samples_per_chunk;
        } else {
            break;
        }
    }
    spc
}

/// Assign DTS/PTS from the stts run-length deltas, shifted by the edit
/// list's media time when present.
fn apply_timing(
    samples: &mut [FlatSample],
    stts: &[SttsEntry],
    elst: Option<&ElstBox>,
    timescale_mvhd: u32,
    timescale_mdhd: u32,
) {
    let start_offset = edit_list_offset(elst, timescale_mvhd, timescale_mdhd);

    let declared: u64 = stts.iter().map(|e| e.sample_count as u64).sum();
    if declared != samples.len() as u64 {
        warn!(
            "stts covers {} samples but the table has {}; padding with the last delta",
            declared,
            samples.len()
        );
    }

    let mut time: i64 = 0;
    let mut idx = 0usize;
    for entry in stts {
        for _ in 0..entry.sample_count {
            if idx >= samples.len() {
                return;
            }
            let dts = time - start_offset;
            samples[idx].dts = dts;
            samples[idx].pts = dts;
            samples[idx].cts = 0;
            time += entry.sample_delta as i64;
            idx += 1;
        }
    }

    // Best-effort continuation when stts falls short.
    let last_delta = stts.last().map(|e| e.sample_delta as i64).unwrap_or(0);
    while idx < samples.len() {
        let dts = time - start_offset;
        samples[idx].dts = dts;
        samples[idx].pts = dts;
        time += last_delta;
        idx += 1;
    }
}

/// Media-time shift from the first edit-list entry, in mdhd ticks.
fn edit_list_offset(elst: Option<&ElstBox>, timescale_mvhd: u32, timescale_mdhd: u32) -> i64 {
    let Some(first) = elst.and_then(|e| e.entries.first()) else {
        return 0;
    };
    if timescale_mvhd == 0 {
        warn!("elst present but mvhd timescale is 0; ignoring edit list");
        return 0;
    }
    first.media_time as i64 * timescale_mdhd as i64 / timescale_mvhd as i64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mp4::boxes::ElstEntry;

    fn stsc(entries: &[(u32, u32)]) -> Vec<StscEntry> {
        entries
            .iter()
            .map(|&(first_chunk, samples_per_chunk)| StscEntry {
                first_chunk,
                samples_per_chunk,
                sample_description_index: 1,
            })
            .collect()
    }

    fn stsz(sizes: &[u32]) -> StszBox {
        StszBox {
            default_sample_size: 0,
            sample_count: sizes.len() as u32,
            sample_sizes: sizes.to_vec(),
        }
    }

    fn stts(entries: &[(u32, u32)]) -> Vec<SttsEntry> {
        entries
            .iter()
            .map(|&(sample_count, sample_delta)| SttsEntry {
                sample_count,
                sample_delta,
            })
            .collect()
    }

    #[test]
    fn single_chunk_single_sample() {
        let table = SampleTable::build(
            &stsc(&[(1, 1)]),
            &stsz(&[1024]),
            &[2048],
            &stts(&[(1, 3000)]),
            None,
            1000,
            90_000,
        )
        .unwrap();

        assert_eq!(table.samples.len(), 1);
        let s = table.samples[0];
        assert_eq!(s.file_offset, 2048);
        assert_eq!(s.size, 1024);
        assert_eq!(s.dts, 0);
        assert_eq!(s.pts, 0);
        assert_eq!(s.cts, 0);
        assert_eq!(table.timescale, 90_000);
    }

    #[test]
    fn run_length_stsc_multi_chunk_offsets() {
        // Chunks 1-2 carry 2 samples each, chunk 3 carries 1; chunk 4 is
        // unreachable given 5 total samples.
        let table = SampleTable::build(
            &stsc(&[(1, 2), (3, 1)]),
            &stsz(&[50, 50, 50, 50, 50]),
            &[100, 300, 500, 600],
            &stts(&[(5, 512)]),
            None,
            1000,
            90_000,
        )
        .unwrap();

        let offsets: Vec<u64> = table.samples.iter().map(|s| s.file_offset).collect();
        assert_eq!(offsets, vec![100, 150, 300, 350, 500]);

        assert_eq!(table.samples[1].chunk_index, 0);
        assert_eq!(table.samples[1].index_in_chunk, 1);
        assert_eq!(table.samples[4].chunk_index, 2);
        assert_eq!(table.samples[4].index_in_chunk, 0);
    }

    #[test]
    fn constant_sample_size_mode() {
        let table = SampleTable::build(
            &stsc(&[(1, 3)]),
            &StszBox {
                default_sample_size: 256,
                sample_count: 3,
                sample_sizes: vec![],
            },
            &[2000],
            &stts(&[(3, 1000)]),
            None,
            1000,
            1000,
        )
        .unwrap();

        let offsets: Vec<u64> = table.samples.iter().map(|s| s.file_offset).collect();
        assert_eq!(offsets, vec![2000, 2256, 2512]);
        assert!(table.samples.iter().all(|s| s.size == 256));
    }

    #[test]
    fn stts_runs_assign_decode_times() {
        let table = SampleTable::build(
            &stsc(&[(1, 4)]),
            &stsz(&[10, 10, 10, 10]),
            &[0],
            &stts(&[(2, 1000), (2, 2000)]),
            None,
            1000,
            1000,
        )
        .unwrap();

        let dts: Vec<i64> = table.samples.iter().map(|s| s.dts).collect();
        assert_eq!(dts, vec![0, 1000, 2000, 4000]);
        // Decode-monotonic.
        assert!(dts.windows(2).all(|w| w[1] >= w[0]));
    }

    #[test]
    fn edit_list_shifts_dts_negative() {
        let elst = ElstBox {
            entries: vec![ElstEntry {
                segment_duration: 0,
                media_time: 9000,
                media_rate_int: 1,
                media_rate_frac: 0,
            }],
        };

        let table = SampleTable::build(
            &stsc(&[(1, 1)]),
            &stsz(&[100]),
            &[0],
            &stts(&[(1, 3000)]),
            Some(&elst),
            1000,
            90_000,
        )
        .unwrap();

        // 9000 media-time ticks at mvhd 1000 rescaled to mdhd 90000.
        assert_eq!(table.samples[0].dts, -810_000);
        assert_eq!(table.samples[0].pts, -810_000);
    }

    #[test]
    fn sample_count_mismatch_is_fatal() {
        // stsc maps only 1 sample per chunk over 1 chunk, but stsz
        // declares 3 samples.
        let err = SampleTable::build(
            &stsc(&[(1, 1)]),
            &stsz(&[10, 10, 10]),
            &[0],
            &stts(&[(3, 100)]),
            None,
            1000,
            1000,
        )
        .unwrap_err();

        assert!(matches!(
            err,
            DemuxError::SampleCountMismatch {
                built: 1,
                expected: 3
            }
        ));
    }

    #[test]
    fn descending_stsc_is_rejected() {
        let err = SampleTable::build(
            &stsc(&[(3, 1), (1, 2)]),
            &stsz(&[10]),
            &[0],
            &stts(&[(1, 100)]),
            None,
            1000,
            1000,
        )
        .unwrap_err();
        assert!(matches!(err, DemuxError::InvalidStructure { .. }));
    }

    #[test]
    fn short_stts_pads_with_last_delta() {
        let table = SampleTable::build(
            &stsc(&[(1, 3)]),
            &stsz(&[10, 10, 10]),
            &[0],
            &stts(&[(2, 500)]),
            None,
            1000,
            1000,
        )
        .unwrap();

        let dts: Vec<i64> = table.samples.iter().map(|s| s.dts).collect();
        assert_eq!(dts, vec![0, 500, 1000]);
    }
}
