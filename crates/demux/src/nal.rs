//! NAL unit framing — splits length-prefixed sample data into NAL units
//! and detects IDR keyframes.

use tracing::warn;
use vf_common::NalUnit;

/// NAL unit type for H.264.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum H264NalType {
    Slice,
    SliceA,
    SliceB,
    SliceC,
    Idr,
    Sei,
    Sps,
    Pps,
    Aud,
    EndSeq,
    EndStream,
    FillerData,
    Other(u8),
}

impl From<u8> for H264NalType {
    fn from(val: u8) -> Self {
        match val & 0x1F {
            1 => Self::Slice,
            2 => Self::SliceA,
            3 => Self::SliceB,
            4 => Self::SliceC,
            5 => Self::Idr,
            6 => Self::Sei,
            7 => Self::Sps,
            8 => Self::Pps,
            9 => Self::Aud,
            10 => Self::EndSeq,
            11 => Self::EndStream,
            12 => Self::FillerData,
            other => Self::Other(other),
        }
    }
}

/// NAL unit type number for an IDR slice.
pub const NAL_TYPE_IDR: u8 = 5;

/// Split one sample's bytes into its NAL units.
///
/// `length_size` is the prefix width from avcC (3 or 4 bytes). Each
/// returned unit keeps its length prefix in `data`. Returns the units and
/// the keyframe flag, or `None` when a declared NAL size overruns the
/// sample — the whole sample is dropped in that case.
pub fn split_sample(data: &[u8], length_size: u8, dts: i64) -> Option<(Vec<NalUnit>, bool)> {
    let ls = length_size as usize;
    let mut units = Vec::new();
    let mut is_keyframe = false;
    let mut offset = 0usize;

    while offset < data.len() {
        if offset + ls > data.len() {
            warn!("Malformed Nalus near timestamp {dts}, NaluSize > DataSize!");
            return None;
        }

        let mut nal_size = 0usize;
        for &b in &data[offset..offset + ls] {
            nal_size = (nal_size << 8) | b as usize;
        }

        if nal_size > data.len() - offset - ls {
            warn!("Malformed Nalus near timestamp {dts}, NaluSize > DataSize!");
            return None;
        }
        if nal_size == 0 {
            warn!("Malformed Nalus near timestamp {dts}, zero-length unit");
            return None;
        }

        let nal_type = data[offset + ls] & 0x1F;
        if nal_type == NAL_TYPE_IDR {
            is_keyframe = true;
        }

        units.push(NalUnit {
            nal_type,
            data: data[offset..offset + ls + nal_size].to_vec(),
        });
        offset += ls + nal_size;
    }

    Some((units, is_keyframe))
}
