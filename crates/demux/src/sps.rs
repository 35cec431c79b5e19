//! H.264 Sequence Parameter Set parsing.
//!
//! Pure function over the SPS bytes (NAL header included): profile,
//! level, chroma format, bit depth, coded and display resolution, sample
//! aspect ratio, and VUI timing. Reference: ITU-T H.264, sections 7.3.2.1
//! and E.1.1.

use vf_common::{FrameRate, Rational};

/// Everything the demuxer needs out of an SPS.
#[derive(Clone, Debug)]
pub struct SpsInfo {
    pub profile_idc: u8,
    pub level_idc: u8,
    pub profile_string: String,
    pub level_string: String,
    pub chroma_format_idc: u32,
    pub chroma_format: String,
    pub bit_depth: u8,
    /// max_num_ref_frames.
    pub ref_frames: u32,
    /// Coded size, before SAR scaling.
    pub codec_width: u32,
    pub codec_height: u32,
    /// Display size, after SAR scaling.
    pub present_width: u32,
    pub present_height: u32,
    pub sar_ratio: Rational,
    pub frame_rate: FrameRate,
}

/// Bit-granular reader over RBSP bytes.
struct BitReader<'a> {
    data: &'a [u8],
    bit_pos: usize,
}

impl<'a> BitReader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, bit_pos: 0 }
    }

    fn read_bit(&mut self) -> Option<u8> {
        let byte_pos = self.bit_pos / 8;
        if byte_pos >= self.data.len() {
            return None;
        }
        let bit_offset = 7 - (self.bit_pos % 8);
        let bit = (self.data[byte_pos] >> bit_offset) & 1;
        self.bit_pos += 1;
        Some(bit)
    }

    fn read_bits(&mut self, count: usize) -> Option<u32> {
        let mut value = 0u32;
        for _ in 0..count {
            value = (value << 1) | self.read_bit()? as u32;
        }
        Some(value)
    }

    /// Unsigned Exp-Golomb.
    fn read_ue(&mut self) -> Option<u32> {
        let mut zeros = 0usize;
        while self.read_bit()? == 0 {
            zeros += 1;
            if zeros > 31 {
                return None;
            }
        }
        let mut value = 0u32;
        if zeros > 0 {
            value = self.read_bits(zeros)?;
        }
        Some((1u32 << zeros) - 1 + value)
    }

    /// Signed Exp-Golomb.
    fn read_se(&mut self) -> Option<i32> {
        let code_num = self.read_ue()? as i32;
        let sign = if code_num % 2 == 0 { -1 } else { 1 };
        Some(((code_num + 1) / 2) * sign)
    }
}

/// Strip emulation-prevention bytes (00 00 03 → 00 00).
fn ebsp_to_rbsp(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len());
    let mut i = 0;
    while i < data.len() {
        if i + 2 < data.len() && data[i] == 0 && data[i + 1] == 0 && data[i + 2] == 3 {
            out.push(0);
            out.push(0);
            i += 3;
            continue;
        }
        out.push(data[i]);
        i += 1;
    }
    out
}

fn skip_scaling_list(r: &mut BitReader<'_>, size: usize) -> Option<()> {
    let mut last_scale = 8i32;
    let mut next_scale = 8i32;
    for _ in 0..size {
        if next_scale != 0 {
            let delta = r.read_se()?;
            next_scale = (last_scale + delta + 256) % 256;
        }
        if next_scale != 0 {
            last_scale = next_scale;
        }
    }
    Some(())
}

/// Profiles that carry the chroma/bit-depth block (high profiles).
const HIGH_PROFILE_IDCS: [u8; 12] = [100, 110, 122, 244, 44, 83, 86, 118, 128, 138, 139, 134];

fn profile_string(profile_idc: u8) -> String {
    match profile_idc {
        66 => "Baseline",
        77 => "Main",
        88 => "Extended",
        100 => "High",
        110 => "High10",
        122 => "High422",
        244 => "High444",
        _ => "Unknown",
    }
    .to_string()
}

fn level_string(level_idc: u8) -> String {
    format!("{}.{}", level_idc / 10, level_idc % 10)
}

fn chroma_format_string(chroma_format_idc: u32) -> String {
    match chroma_format_idc {
        0 => "4:0:0",
        1 => "4:2:0",
        2 => "4:2:2",
        3 => "4:4:4",
        _ => "Unknown",
    }
    .to_string()
}

/// Sample aspect ratios, H.264 Table E-1, indexed by aspect_ratio_idc.
fn sar_from_idc(idc: u32, r: &mut BitReader<'_>) -> Option<Rational> {
    let (num, den) = match idc {
        1 => (1, 1),
        2 => (12, 11),
        3 => (10, 11),
        4 => (16, 11),
        5 => (40, 33),
        6 => (24, 11),
        7 => (20, 11),
        8 => (32, 11),
        9 => (80, 33),
        10 => (18, 11),
        11 => (15, 11),
        12 => (64, 33),
        13 => (160, 99),
        14 => (4, 3),
        15 => (3, 2),
        16 => (2, 1),
        255 => {
            let w = r.read_bits(16)?;
            let h = r.read_bits(16)?;
            (w, h)
        }
        _ => (1, 1),
    };
    if den == 0 {
        return Some(Rational::ONE);
    }
    Some(Rational::new(num, den))
}

/// Parse an SPS NAL unit (header byte included).
///
/// Returns `None` when the bitstream is too short or malformed; the
/// caller decides how to degrade.
pub fn parse_sps(sps: &[u8]) -> Option<SpsInfo> {
    if sps.len() < 4 {
        return None;
    }

    let rbsp = ebsp_to_rbsp(&sps[1..]);
    let mut r = BitReader::new(&rbsp);

    let profile_idc = r.read_bits(8)? as u8;
    r.read_bits(8)?; // constraint flags + reserved
    let level_idc = r.read_bits(8)? as u8;
    r.read_ue()?; // seq_parameter_set_id

    let mut chroma_format_idc = 1u32;
    let mut bit_depth = 8u8;

    if HIGH_PROFILE_IDCS.contains(&profile_idc) {
        chroma_format_idc = r.read_ue()?;
        if chroma_format_idc == 3 {
            r.read_bits(1)?; // separate_colour_plane_flag
        }
        bit_depth = r.read_ue()? as u8 + 8; // bit_depth_luma_minus8
        r.read_ue()?; // bit_depth_chroma_minus8
        r.read_bits(1)?; // qpprime_y_zero_transform_bypass_flag
        if r.read_bits(1)? == 1 {
            let count = if chroma_format_idc == 3 { 12 } else { 8 };
            for i in 0..count {
                if r.read_bits(1)? == 1 {
                    skip_scaling_list(&mut r, if i < 6 { 16 } else { 64 })?;
                }
            }
        }
    }

    r.read_ue()?; // log2_max_frame_num_minus4
    let pic_order_cnt_type = r.read_ue()?;
    if pic_order_cnt_type == 0 {
        r.read_ue()?; // log2_max_pic_order_cnt_lsb_minus4
    } else if pic_order_cnt_type == 1 {
        r.read_bits(1)?; // delta_pic_order_always_zero_flag
        r.read_se()?;
        r.read_se()?;
        let cycle = r.read_ue()?;
        for _ in 0..cycle {
            r.read_se()?;
        }
    }

    let ref_frames = r.read_ue()?; // max_num_ref_frames
    r.read_bits(1)?; // gaps_in_frame_num_value_allowed_flag

    let pic_width_in_mbs_minus1 = r.read_ue()?;
    let pic_height_in_map_units_minus1 = r.read_ue()?;
    let frame_mbs_only_flag = r.read_bits(1)?;
    if frame_mbs_only_flag == 0 {
        r.read_bits(1)?; // mb_adaptive_frame_field_flag
    }
    r.read_bits(1)?; // direct_8x8_inference_flag

    let mut crop_left = 0u32;
    let mut crop_right = 0u32;
    let mut crop_top = 0u32;
    let mut crop_bottom = 0u32;
    if r.read_bits(1)? == 1 {
        crop_left = r.read_ue()?;
        crop_right = r.read_ue()?;
        crop_top = r.read_ue()?;
        crop_bottom = r.read_ue()?;
    }

    // VUI: sample aspect ratio and timing.
    let mut sar_ratio = Rational::ONE;
    let mut frame_rate = FrameRate {
        fixed: false,
        fps: 0.0,
        fps_num: 0,
        fps_den: 0,
    };

    if r.read_bits(1)? == 1 {
        if r.read_bits(1)? == 1 {
            let idc = r.read_bits(8)?;
            sar_ratio = sar_from_idc(idc, &mut r)?;
        }
        if r.read_bits(1)? == 1 {
            r.read_bits(1)?; // overscan_appropriate_flag
        }
        if r.read_bits(1)? == 1 {
            r.read_bits(4)?; // video_format + full_range
            if r.read_bits(1)? == 1 {
                r.read_bits(24)?; // colour primaries / transfer / matrix
            }
        }
        if r.read_bits(1)? == 1 {
            r.read_ue()?;
            r.read_ue()?;
        }
        if r.read_bits(1)? == 1 {
            let num_units_in_tick = r.read_bits(32)?;
            let time_scale = r.read_bits(32)?;
            let fixed = r.read_bits(1)? == 1;
            if num_units_in_tick > 0 && time_scale > 0 {
                // One frame spans two field ticks.
                let fps_den = num_units_in_tick.saturating_mul(2);
                frame_rate = FrameRate::new(time_scale, fps_den, fixed);
            }
        }
    }

    let crop_unit_x = match chroma_format_idc {
        0 | 3 => 1,
        _ => 2,
    };
    let crop_unit_y = match chroma_format_idc {
        0 | 3 => 2 - frame_mbs_only_flag,
        _ => 2 * (2 - frame_mbs_only_flag),
    };

    let mut codec_width = (pic_width_in_mbs_minus1 + 1) * 16;
    let mut codec_height = (pic_height_in_map_units_minus1 + 1) * 16;
    if frame_mbs_only_flag == 0 {
        codec_height *= 2;
    }
    codec_width = codec_width.saturating_sub((crop_left + crop_right) * crop_unit_x);
    codec_height = codec_height.saturating_sub((crop_top + crop_bottom) * crop_unit_y);

    let present_width = if sar_ratio.num != sar_ratio.den {
        let scaled = codec_width as u64 * sar_ratio.num as u64;
        scaled.div_ceil(sar_ratio.den as u64) as u32
    } else {
        codec_width
    };

    Some(SpsInfo {
        profile_idc,
        level_idc,
        profile_string: profile_string(profile_idc),
        level_string: level_string(level_idc),
        chroma_format_idc,
        chroma_format: chroma_format_string(chroma_format_idc),
        bit_depth,
        ref_frames,
        codec_width,
        codec_height,
        present_width,
        present_height: codec_height,
        sar_ratio,
        frame_rate,
    })
}
