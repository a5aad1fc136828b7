//! ADIF 流头 (ISO 14496-3 1.A.2.1).
//!
//! 仅出现在裸 AAC 流的最开头, 其后紧跟字节对齐的 raw_data_block 序列.

use aacdec_core::bitreader::BitReader;
use aacdec_core::{AacError, AacResult};

use super::pce::ProgramConfigElement;

/// ADIF 签名
pub const ADIF_ID: &[u8; 4] = b"ADIF";

/// 一个 PCE 条目
#[derive(Debug, Clone, PartialEq)]
pub struct AdifProgram {
    /// 仅恒定码率流携带
    pub buffer_fullness: Option<u32>,
    pub pce: ProgramConfigElement,
}

/// ADIF 头
#[derive(Debug, Clone, PartialEq)]
pub struct AdifHeader {
    pub copyright_id: Option<[u8; 9]>,
    pub original_copy: bool,
    pub home: bool,
    /// bitstream_type: false 为恒定码率
    pub variable_rate: bool,
    pub bitrate: u32,
    pub programs: Vec<AdifProgram>,
    /// 头部占用字节数 (已对齐)
    pub header_len: usize,
}

impl AdifHeader {
    /// 数据是否以 ADIF 签名开头
    pub fn is_present(data: &[u8]) -> bool {
        data.starts_with(ADIF_ID)
    }

    /// 解析 ADIF 头
    pub fn parse(data: &[u8]) -> AacResult<Self> {
        if !Self::is_present(data) {
            return Err(AacError::malformed("AAC: 缺少 ADIF 签名"));
        }
        let mut br = BitReader::new(data);
        br.skip_bits(32)?;

        let copyright_id = if br.read_flag()? {
            let mut id = [0u8; 9];
            for b in id.iter_mut() {
                *b = br.read_bits(8)? as u8;
            }
            Some(id)
        } else {
            None
        };
        let original_copy = br.read_flag()?;
        let home = br.read_flag()?;
        let variable_rate = br.read_flag()?;
        let bitrate = br.read_bits(23)?;
        let count = br.read_bits(4)? as usize + 1;

        let mut programs = Vec::with_capacity(count);
        for _ in 0..count {
            let buffer_fullness = if variable_rate {
                None
            } else {
                Some(br.read_bits(20)?)
            };
            let pce = ProgramConfigElement::parse(&mut br)?;
            programs.push(AdifProgram {
                buffer_fullness,
                pce,
            });
        }
        br.align_to_byte();

        Ok(Self {
            copyright_id,
            original_copy,
            home,
            variable_rate,
            bitrate,
            programs,
            header_len: br.byte_position(),
        })
    }

    /// 第一个 PCE, 决定流的声道排列
    pub fn program(&self) -> Option<&ProgramConfigElement> {
        self.programs.first().map(|p| &p.pce)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::aac::pce::PceChannelElement;
    use aacdec_core::bitwriter::BitWriter;

    /// 恒定码率、无版权号的 ADIF 头
    pub(crate) fn write_adif_header(bw: &mut BitWriter, pce: &ProgramConfigElement) {
        bw.write_bytes(ADIF_ID);
        bw.write_flag(false);
        bw.write_flag(false);
        bw.write_flag(false);
        bw.write_flag(false);
        bw.write_bits(128_000, 23);
        bw.write_bits(0, 4);
        bw.write_bits(6144, 20);
        pce.write(bw);
        bw.align_to_byte();
    }

    pub(crate) fn mono_pce() -> ProgramConfigElement {
        ProgramConfigElement {
            instance_tag: 0,
            object_type: 1,
            sample_frequency_index: 3,
            front: vec![PceChannelElement {
                is_cpe: false,
                tag: 0,
            }],
            side: vec![],
            back: vec![],
            lfe: vec![],
            assoc_data: vec![],
            coupling: vec![],
            mono_mixdown: None,
            stereo_mixdown: None,
            matrix_mixdown: None,
            comment: vec![],
        }
    }

    #[test]
    fn test_解析_adif_头() {
        let mut bw = BitWriter::new();
        write_adif_header(&mut bw, &mono_pce());
        let len = bw.bits_written() / 8;
        bw.write_bits(0xE0, 8);
        let data = bw.finish();

        assert!(AdifHeader::is_present(&data));
        let header = AdifHeader::parse(&data).unwrap();
        assert_eq!(header.bitrate, 128_000);
        assert!(!header.variable_rate);
        assert_eq!(header.programs.len(), 1);
        assert_eq!(header.programs[0].buffer_fullness, Some(6144));
        assert_eq!(header.program(), Some(&mono_pce()));
        assert_eq!(header.header_len, len);
    }

    #[test]
    fn test_版权号与可变码率() {
        let mut bw = BitWriter::new();
        bw.write_bytes(ADIF_ID);
        bw.write_flag(true);
        bw.write_bytes(b"COPYRIGHT");
        bw.write_flag(true);
        bw.write_flag(false);
        bw.write_flag(true);
        bw.write_bits(64_000, 23);
        bw.write_bits(0, 4);
        mono_pce().write(&mut bw);
        let data = bw.finish();

        let header = AdifHeader::parse(&data).unwrap();
        assert_eq!(header.copyright_id, Some(*b"COPYRIGHT"));
        assert!(header.original_copy && header.variable_rate);
        assert_eq!(header.programs[0].buffer_fullness, None);
    }

    #[test]
    fn test_非_adif_数据() {
        assert!(!AdifHeader::is_present(&[0xFF, 0xF1]));
        assert!(matches!(
            AdifHeader::parse(b"ADTS"),
            Err(AacError::MalformedElement(_))
        ));
        assert!(matches!(
            AdifHeader::parse(b"ADIF"),
            Err(AacError::EndOfStream)
        ));
    }
}
