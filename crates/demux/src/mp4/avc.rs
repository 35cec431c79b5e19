//! AVCDecoderConfigurationRecord parsing (ISO 14496-15, section 5.2.4).

use tracing::{debug, warn};
use vf_common::{DemuxError, DemuxResult};

use crate::bytes::ByteReader;

/// Validated avcC contents, with the raw record retained for the
/// downstream remuxer.
#[derive(Clone, Debug)]
pub struct AvcDecoderConfig {
    pub profile_indication: u8,
    pub profile_compatibility: u8,
    pub level_indication: u8,
    /// Byte width of NAL length prefixes in samples; 3 or 4.
    pub nalu_length_size: u8,
    /// First Sequence Parameter Set, NAL header included.
    pub sps: Vec<u8>,
    pub sps_count: u8,
    pub pps_count: u8,
    /// RFC 6381 codec string, e.g. `avc1.64001f`.
    pub codec: String,
    /// The complete raw record bytes.
    pub raw: Vec<u8>,
}

impl AvcDecoderConfig {
    /// Parse and validate a raw AVCDecoderConfigurationRecord.
    pub fn parse(data: &[u8]) -> DemuxResult<Self> {
        let r = ByteReader::new(data);

        if data.len() < 7 || r.read_u8(0)? != 1 || r.read_u8(1)? == 0 {
            return Err(DemuxError::Malformed(
                "MP4: Invalid AVCDecoderConfigurationRecord".into(),
            ));
        }

        let profile_indication = r.read_u8(1)?;
        let profile_compatibility = r.read_u8(2)?;
        let level_indication = r.read_u8(3)?;

        let nalu_length_size = (r.read_u8(4)? & 0x03) + 1;
        if nalu_length_size != 3 && nalu_length_size != 4 {
            return Err(DemuxError::Malformed(format!(
                "MP4: Strange NaluLengthSizeMinusOne: {}",
                nalu_length_size - 1
            )));
        }

        let sps_count = r.read_u8(5)? & 0x1F;
        if sps_count == 0 {
            return Err(DemuxError::Malformed(
                "MP4: Invalid AVCDecoderConfigurationRecord: No SPS".into(),
            ));
        }
        if sps_count > 1 {
            warn!("MP4: SPS count = {}, using the first", sps_count);
        }

        let mut offset = 6usize;
        let mut sps = Vec::new();
        for i in 0..sps_count {
            let len = r.read_u16(offset)? as usize;
            offset += 2;
            if i == 0 {
                sps = r.slice(offset, len)?.to_vec();
            }
            offset += len;
        }

        let pps_count = r.read_u8(offset)?;
        offset += 1;
        if pps_count == 0 {
            return Err(DemuxError::Malformed(
                "MP4: Invalid AVCDecoderConfigurationRecord: No PPS".into(),
            ));
        }
        for _ in 0..pps_count {
            let len = r.read_u16(offset)? as usize;
            offset += 2;
            r.slice(offset, len)?;
            offset += len;
        }

        if sps.len() < 4 {
            return Err(DemuxError::Malformed(
                "MP4: Invalid AVCDecoderConfigurationRecord".into(),
            ));
        }
        let codec = format!("avc1.{:02x}{:02x}{:02x}", sps[1], sps[2], sps[3]);

        debug!(
            "avcC: profile={}, level={}, nalu_length_size={}, {} SPS, {} PPS, codec={}",
            profile_indication,
            level_indication,
            nalu_length_size,
            sps_count,
            pps_count,
            codec
        );

        Ok(AvcDecoderConfig {
            profile_indication,
            profile_compatibility,
            level_indication,
            nalu_length_size,
            sps,
            sps_count,
            pps_count,
            codec,
            raw: data.to_vec(),
        })
    }
}
