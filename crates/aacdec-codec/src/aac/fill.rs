//! 填充元素 (FIL) 与扩展负载 (ISO 14496-3 4.4.2.7).
//!
//! 支持的负载: 填充数据、辅助数据元素、动态范围控制 (DRC) 信息、SBR 数据 (按位保留, 由 SBR 解码器解析).
//! 未知负载按声明长度跳过.

use aacdec_core::bitreader::BitReader;
use aacdec_core::{AacError, AacResult};

const EXT_FILL: u32 = 0x0;
const EXT_FILL_DATA: u32 = 0x1;
const EXT_DATA_ELEMENT: u32 = 0x2;
const EXT_DYNAMIC_RANGE: u32 = 0xB;
const EXT_SBR_DATA: u32 = 0xD;
const EXT_SBR_DATA_CRC: u32 = 0xE;

/// 辅助数据元素版本 ANC_DATA
const ANC_DATA: u32 = 0;

/// DRC 排除掩码的声道数上限
const MAX_DRC_CHANNELS: usize = 64;

/// 动态范围控制信息
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DynamicRangeInfo {
    pub pce_instance_tag: Option<u8>,
    /// 逐输出声道的排除标志
    pub excluded_channels: Vec<bool>,
    pub interpolation_scheme: u8,
    /// 各 DRC 频带上边界 (以 4 条谱线为单位, 含)
    pub band_tops: Vec<u8>,
    pub prog_ref_level: Option<u8>,
    /// 各频带 (是否衰减, 控制值)
    pub gains: Vec<(bool, u8)>,
}

impl DynamicRangeInfo {
    /// 解析 dynamic_range_info, 返回 (信息, 占用字节数)
    ///
    /// 字节数包含前面 4 位的负载类型.
    fn parse(br: &mut BitReader) -> AacResult<(Self, usize)> {
        let mut info = Self::default();
        let mut n = 1;
        let mut num_bands = 1;

        if br.read_flag()? {
            info.pce_instance_tag = Some(br.read_bits(4)? as u8);
            br.skip_bits(4)?;
            n += 1;
        }
        if br.read_flag()? {
            loop {
                for _ in 0..7 {
                    info.excluded_channels.push(br.read_flag()?);
                }
                n += 1;
                if info.excluded_channels.len() >= MAX_DRC_CHANNELS - 7 || !br.read_flag()? {
                    break;
                }
            }
        }
        if br.read_flag()? {
            let band_incr = br.read_bits(4)? as usize;
            info.interpolation_scheme = br.read_bits(4)? as u8;
            n += 1;
            num_bands += band_incr;
            for _ in 0..num_bands {
                info.band_tops.push(br.read_bits(8)? as u8);
                n += 1;
            }
        } else {
            info.band_tops.push(255);
        }
        if br.read_flag()? {
            info.prog_ref_level = Some(br.read_bits(7)? as u8);
            br.skip_bits(1)?;
            n += 1;
        }
        for _ in 0..num_bands {
            let cut = br.read_flag()?;
            let ctl = br.read_bits(7)? as u8;
            info.gains.push((cut, ctl));
            n += 1;
        }
        Ok((info, n))
    }

    /// 某输出声道是否被排除
    pub fn is_excluded(&self, channel: usize) -> bool {
        self.excluded_channels.get(channel).copied().unwrap_or(false)
    }
}

/// 一个扩展负载
#[derive(Debug, Clone, PartialEq)]
pub enum ExtensionPayload {
    /// 填充 (EXT_FILL / EXT_FILL_DATA)
    Fill,
    /// 辅助数据元素
    DataElement(Vec<u8>),
    DynamicRange(DynamicRangeInfo),
    /// SBR 增强数据, 由其前一个声道元素的 SBR 解码器解析
    Sbr {
        crc: bool,
        /// 去掉 CRC 后的负载, 高位在前
        data: Vec<u8>,
        /// `data` 中的有效位数
        bits: usize,
    },
    /// 未识别的负载类型
    Unknown(u8),
}

/// 解析 FIL 元素 (不含 3 位元素标识)
pub fn parse_fill_element(br: &mut BitReader) -> AacResult<Vec<ExtensionPayload>> {
    let mut count = br.read_bits(4)? as usize;
    if count == 15 {
        count += br.read_bits(8)? as usize;
        count -= 1;
    }
    parse_payloads(br, count)
}

/// 依次解析总长 `count` 字节的扩展负载
pub fn parse_payloads(br: &mut BitReader, mut count: usize) -> AacResult<Vec<ExtensionPayload>> {
    let mut payloads = Vec::new();
    while count > 0 {
        let (payload, used) = parse_extension_payload(br, count)?;
        if used > count {
            return Err(AacError::malformed(format!(
                "AAC: 扩展负载越界 (使用 {used} 字节, 剩余 {count} 字节)"
            )));
        }
        count -= used;
        payloads.push(payload);
    }
    Ok(payloads)
}

/// 解析单个 extension_payload, 返回 (负载, 占用字节数)
fn parse_extension_payload(br: &mut BitReader, count: usize) -> AacResult<(ExtensionPayload, usize)> {
    let start = br.bits_read();
    let kind = br.read_bits(4)?;
    match kind {
        EXT_DYNAMIC_RANGE => {
            let (info, n) = DynamicRangeInfo::parse(br)?;
            Ok((ExtensionPayload::DynamicRange(info), n))
        }
        EXT_SBR_DATA | EXT_SBR_DATA_CRC => {
            let crc = kind == EXT_SBR_DATA_CRC;
            if crc {
                br.skip_bits(10)?;
            }
            let bits = (start + count * 8)
                .checked_sub(br.bits_read())
                .ok_or_else(|| AacError::malformed("AAC: SBR 负载过短"))?;
            let mut data = br.read_byte_vec(bits / 8)?;
            let rest = (bits % 8) as u32;
            if rest > 0 {
                data.push((br.read_bits(rest)? << (8 - rest)) as u8);
            }
            Ok((ExtensionPayload::Sbr { crc, data, bits }, count))
        }
        EXT_DATA_ELEMENT => {
            let version = br.read_bits(4)?;
            if version != ANC_DATA {
                skip_to(br, start, count)?;
                return Ok((ExtensionPayload::Unknown(kind as u8), count));
            }
            let mut loops = 0;
            let mut len = 0usize;
            loop {
                let part = br.read_bits(8)? as usize;
                loops += 1;
                len += part;
                if part != 255 {
                    break;
                }
            }
            let data = br.read_byte_vec(len)?;
            Ok((ExtensionPayload::DataElement(data), 1 + loops + len))
        }
        EXT_FILL | EXT_FILL_DATA => {
            skip_to(br, start, count)?;
            Ok((ExtensionPayload::Fill, count))
        }
        _ => {
            skip_to(br, start, count)?;
            Ok((ExtensionPayload::Unknown(kind as u8), count))
        }
    }
}

/// 跳到负载起点之后第 `count` 字节处
fn skip_to(br: &mut BitReader, start: usize, count: usize) -> AacResult<()> {
    let target = start + count * 8;
    let read = br.bits_read();
    if read > target {
        return Err(AacError::malformed("AAC: 扩展负载超出声明长度"));
    }
    br.skip_bits_usize(target - read)
}

#[cfg(test)]
mod tests {
    use super::*;
    use aacdec_core::bitwriter::BitWriter;

    #[test]
    fn test_填充负载() {
        let mut bw = BitWriter::new();
        bw.write_bits(3, 4); // count
        bw.write_bits(EXT_FILL, 4);
        bw.write_bits(0, 4);
        bw.write_bits(0xA5A5, 16);
        bw.write_bits(0x7, 3);
        let data = bw.finish();
        let mut br = BitReader::new(&data);
        let payloads = parse_fill_element(&mut br).unwrap();
        assert_eq!(payloads, vec![ExtensionPayload::Fill]);
        assert_eq!(br.bits_read(), 28);
        assert_eq!(br.read_bits(3).unwrap(), 0x7);
    }

    #[test]
    fn test_长度转义() {
        let mut bw = BitWriter::new();
        bw.write_bits(15, 4);
        bw.write_bits(3, 8); // 15 + 3 - 1 = 17
        bw.write_bits(EXT_FILL_DATA, 4);
        for _ in 0..17 * 8 - 4 {
            bw.write_bit(1);
        }
        let data = bw.finish();
        let mut br = BitReader::new(&data);
        parse_fill_element(&mut br).unwrap();
        assert_eq!(br.bits_read(), 12 + 17 * 8);
    }

    /// 写出 DRC 负载: 两个频带, 无 PCE 标签, 无排除声道, 无节目参考电平
    fn write_two_band_drc(bw: &mut BitWriter) {
        bw.write_bits(EXT_DYNAMIC_RANGE, 4);
        bw.write_flag(false); // pce_tag_present
        bw.write_flag(false); // excluded_chns_present
        bw.write_flag(true); // drc_bands_present
        bw.write_bits(1, 4); // band_incr → 2 个频带
        bw.write_bits(0, 4);
        bw.write_bits(63, 8);
        bw.write_bits(255, 8);
        bw.write_flag(false); // prog_ref_level_present
        bw.write_flag(true);
        bw.write_bits(24, 7);
        bw.write_flag(false);
        bw.write_bits(12, 7);
    }

    #[test]
    fn test_drc_负载() {
        let mut bw = BitWriter::new();
        bw.write_bits(6, 4);
        write_two_band_drc(&mut bw);
        let data = bw.finish();
        let mut br = BitReader::new(&data);
        let payloads = parse_fill_element(&mut br).unwrap();
        let ExtensionPayload::DynamicRange(drc) = &payloads[0] else {
            panic!("应为 DRC 负载");
        };
        assert_eq!(drc.band_tops, vec![63, 255]);
        assert_eq!(drc.gains, vec![(true, 24), (false, 12)]);
        assert_eq!(drc.prog_ref_level, None);
        assert_eq!(br.bits_read(), 4 + 6 * 8);

        // 负载实际占 6 字节, 声明只有 4 字节
        let mut bw = BitWriter::new();
        bw.write_bits(4, 4);
        write_two_band_drc(&mut bw);
        let data = bw.finish();
        let mut br = BitReader::new(&data);
        assert!(matches!(
            parse_fill_element(&mut br),
            Err(AacError::MalformedElement(_))
        ));
    }

    #[test]
    fn test_drc_排除声道与参考电平() {
        let mut bw = BitWriter::new();
        bw.write_bits(5, 4);
        bw.write_bits(EXT_DYNAMIC_RANGE, 4);
        bw.write_flag(true); // pce_tag_present
        bw.write_bits(3, 4);
        bw.write_bits(0, 4);
        bw.write_flag(true); // excluded_chns_present
        bw.write_bits(0b0100000, 7);
        bw.write_flag(false); // additional_excluded_chns
        bw.write_flag(false); // drc_bands_present
        bw.write_flag(true); // prog_ref_level_present
        bw.write_bits(80, 7);
        bw.write_bits(0, 1);
        bw.write_flag(true);
        bw.write_bits(8, 7);
        let data = bw.finish();
        let mut br = BitReader::new(&data);
        let payloads = parse_fill_element(&mut br).unwrap();
        let ExtensionPayload::DynamicRange(drc) = &payloads[0] else {
            panic!("应为 DRC 负载");
        };
        assert_eq!(drc.pce_instance_tag, Some(3));
        assert!(drc.is_excluded(1) && !drc.is_excluded(0) && !drc.is_excluded(40));
        assert_eq!(drc.band_tops, vec![255]);
        assert_eq!(drc.prog_ref_level, Some(80));
        assert_eq!(drc.gains, vec![(true, 8)]);
        assert_eq!(br.bits_read(), 4 + 5 * 8);
    }

    #[test]
    fn test_数据元素() {
        let mut bw = BitWriter::new();
        bw.write_bits(5, 4);
        bw.write_bits(EXT_DATA_ELEMENT, 4);
        bw.write_bits(ANC_DATA, 4);
        bw.write_bits(3, 8);
        bw.write_bytes(b"abc");
        let data = bw.finish();
        let mut br = BitReader::new(&data);
        let payloads = parse_fill_element(&mut br).unwrap();
        assert_eq!(payloads, vec![ExtensionPayload::DataElement(b"abc".to_vec())]);
    }

    #[test]
    fn test_sbr_负载按位保留() {
        let mut bw = BitWriter::new();
        bw.write_bits(4, 4);
        bw.write_bits(EXT_SBR_DATA, 4);
        bw.write_bits(0b1011, 4);
        bw.write_bits(0xC3, 8);
        bw.write_bits(0x5A, 8);
        bw.write_bits(0x9, 4);
        bw.write_bits(0, 4);
        let data = bw.finish();
        let mut br = BitReader::new(&data);
        let payloads = parse_fill_element(&mut br).unwrap();
        let ExtensionPayload::Sbr { crc, data, bits } = &payloads[0] else {
            panic!("应为 SBR 负载");
        };
        assert!(!crc);
        assert_eq!(*bits, 28);
        assert_eq!(data, &[0xBC, 0x35, 0xA9, 0x00]);
        assert_eq!(br.bits_read(), 4 + 32);
    }

    #[test]
    fn test_sbr_crc_不计入负载() {
        let mut bw = BitWriter::new();
        bw.write_bits(3, 4);
        bw.write_bits(EXT_SBR_DATA_CRC, 4);
        bw.write_bits(0x3FF, 10);
        bw.write_bits(0b10_1010_1111, 10);
        let data = bw.finish();
        let mut br = BitReader::new(&data);
        let payloads = parse_fill_element(&mut br).unwrap();
        let ExtensionPayload::Sbr { crc, data, bits } = &payloads[0] else {
            panic!("应为 SBR 负载");
        };
        assert!(*crc);
        assert_eq!(*bits, 10);
        assert_eq!(data, &[0xAB, 0xC0]);
    }

    #[test]
    fn test_负载截断() {
        let mut bw = BitWriter::new();
        bw.write_bits(10, 4);
        bw.write_bits(EXT_FILL, 4);
        let data = bw.finish();
        let mut br = BitReader::new(&data);
        assert!(matches!(
            parse_fill_element(&mut br),
            Err(AacError::EndOfStream)
        ));
    }
}
