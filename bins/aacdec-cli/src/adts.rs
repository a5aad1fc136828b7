//! ADTS 裸流拆帧.
//!
//! # ADTS 帧结构
//! ```text
//! 固定头部:
//!   syncword (12) = 0xFFF, ID (1), layer (2) = 0, protection_absent (1),
//!   profile (2), sampling_frequency_index (4), private_bit (1),
//!   channel_configuration (3), original_copy (1), home (1)
//! 可变头部:
//!   copyright_id_bit (1), copyright_id_start (1), frame_length (13),
//!   adts_buffer_fullness (11), number_of_raw_data_blocks_in_frame (2)
//! 仅当 protection_absent = 0:
//!   多块帧的块起始位置 (16 × (块数 - 1)), CRC (16)
//! ```

use aacdec_codec::DecoderConfig;
use aacdec_core::AacResult;
use aacdec_core::bitreader::BitReader;
use tracing::debug;

/// 拆帧时最多向后搜索的字节数
const MAX_SYNC_SEARCH: usize = 65536;

/// ADTS 帧头
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdtsHeader {
    /// ID 位: true 为 MPEG-2
    pub mpeg2: bool,
    /// 0=Main, 1=LC, 2=SSR, 3=LTP
    pub profile: u8,
    pub sampling_frequency_index: u8,
    pub channel_configuration: u8,
    /// 含头部的整帧字节数
    pub frame_length: usize,
    pub buffer_fullness: u16,
    /// 帧内 raw_data_block 个数
    pub raw_blocks: usize,
    pub has_crc: bool,
}

impl AdtsHeader {
    /// 解析帧头, 不是合法 ADTS 头时返回 None
    pub fn parse(data: &[u8]) -> Option<Self> {
        if data.len() < 7 {
            return None;
        }
        let mut br = BitReader::new(data);
        if read(&mut br, 12)? != 0xFFF {
            return None;
        }
        let mpeg2 = read(&mut br, 1)? == 1;
        if read(&mut br, 2)? != 0 {
            return None;
        }
        let has_crc = read(&mut br, 1)? == 0;
        let profile = read(&mut br, 2)? as u8;
        let sampling_frequency_index = read(&mut br, 4)? as u8;
        read(&mut br, 1)?; // private_bit
        let channel_configuration = read(&mut br, 3)? as u8;
        read(&mut br, 4)?; // original_copy, home, copyright_id_bit, copyright_id_start
        let frame_length = read(&mut br, 13)? as usize;
        let buffer_fullness = read(&mut br, 11)? as u16;
        let raw_blocks = read(&mut br, 2)? as usize + 1;

        let header = Self {
            mpeg2,
            profile,
            sampling_frequency_index,
            channel_configuration,
            frame_length,
            buffer_fullness,
            raw_blocks,
            has_crc,
        };
        if sampling_frequency_index >= 13 || frame_length <= header.header_len() {
            return None;
        }
        Some(header)
    }

    /// 头部字节数
    ///
    /// 有 CRC 时包括 (块数 - 1) 项块起始位置与 2 字节 CRC.
    pub fn header_len(&self) -> usize {
        if self.has_crc {
            7 + 2 * self.raw_blocks
        } else {
            7
        }
    }

    /// 等价的 2 字节 AudioSpecificConfig
    pub fn audio_specific_config(&self) -> [u8; 2] {
        let object_type = self.profile + 1;
        let sfi = self.sampling_frequency_index;
        [
            (object_type << 3) | (sfi >> 1),
            ((sfi & 1) << 7) | (self.channel_configuration << 3),
        ]
    }

    /// 由帧头构造流配置
    ///
    /// 声道配置 0 时声道排列由首帧的 PCE 给出.
    pub fn decoder_config(&self) -> AacResult<DecoderConfig> {
        DecoderConfig::decode(&self.audio_specific_config())
    }
}

fn read(br: &mut BitReader, n: u32) -> Option<u32> {
    br.read_bits(n).ok()
}

/// 一个 ADTS 帧
#[derive(Debug, Clone, Copy)]
pub struct AdtsFrame<'a> {
    pub header: AdtsHeader,
    /// 帧在输入中的字节偏移
    pub offset: usize,
    /// 含头部的整帧
    pub data: &'a [u8],
}

impl<'a> AdtsFrame<'a> {
    /// 头部之后的负载
    pub fn payload(&self) -> &'a [u8] {
        &self.data[self.header.header_len()..]
    }
}

/// 跳过 ID3v2 标签, 返回音频数据起点
pub fn skip_id3v2(data: &[u8]) -> usize {
    if data.len() < 10 || &data[..3] != b"ID3" {
        return 0;
    }
    // syncsafe 整数
    let size = data[6..10]
        .iter()
        .fold(0usize, |acc, &b| (acc << 7) | usize::from(b & 0x7F));
    debug!("ADTS: 跳过 ID3v2 标签, 大小 {size}");
    (10 + size).min(data.len())
}

/// 从 `from` 开始寻找下一个帧头
///
/// 若紧随其后还有数据, 要求下一帧也以同步字开头, 避免负载中的伪同步.
pub fn find_sync(data: &[u8], from: usize) -> Option<(usize, AdtsHeader)> {
    let end = data.len().min(from.saturating_add(MAX_SYNC_SEARCH));
    (from..end).find_map(|pos| {
        let header = AdtsHeader::parse(&data[pos..])?;
        let next = pos + header.frame_length;
        let confirmed = match data.get(next..next + 2) {
            Some(sync) => sync[0] == 0xFF && sync[1] & 0xF6 == 0xF0,
            None => next <= data.len(),
        };
        confirmed.then_some((pos, header))
    })
}

/// 逐帧遍历 ADTS 数据
pub struct AdtsReader<'a> {
    data: &'a [u8],
    pos: usize,
    /// 为重新同步跳过的字节数
    pub skipped: usize,
}

impl<'a> AdtsReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            pos: skip_id3v2(data),
            data,
            skipped: 0,
        }
    }
}

impl<'a> Iterator for AdtsReader<'a> {
    type Item = AdtsFrame<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        let (offset, header) = find_sync(self.data, self.pos)?;
        if offset != self.pos {
            debug!("ADTS: 在 {} 处重新同步, 跳过 {} 字节", offset, offset - self.pos);
            self.skipped += offset - self.pos;
        }
        self.pos = offset + header.frame_length;
        Some(AdtsFrame {
            header,
            offset,
            data: &self.data[offset..offset + header.frame_length],
        })
    }
}

/// 按 raw_data_block 拆分多块帧的负载
///
/// 有 CRC 时按头部的块起始位置拆分, 并去掉每块之后的 2 字节 CRC;
/// 无 CRC 时只能靠解码器报告的消耗字节数推进, 返回 None.
pub fn split_raw_blocks<'a>(frame: &AdtsFrame<'a>) -> Option<Vec<&'a [u8]>> {
    let header = &frame.header;
    let payload = frame.payload();
    if header.raw_blocks == 1 {
        return Some(vec![payload]);
    }
    if !header.has_crc {
        return None;
    }
    let table = &frame.data[7..7 + 2 * (header.raw_blocks - 1)];
    let mut starts = vec![0usize];
    starts.extend(
        table
            .chunks_exact(2)
            .map(|b| usize::from(u16::from_be_bytes([b[0], b[1]]))),
    );
    starts
        .iter()
        .enumerate()
        .map(|(i, &start)| {
            let end = starts.get(i + 1).copied().unwrap_or(payload.len());
            payload.get(start..end.checked_sub(2)?)
        })
        .collect()
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use aacdec_core::bitwriter::BitWriter;

    /// 7 字节固定与可变头部之后紧跟 `rest`
    fn write_frame(sfi: u8, channels: u8, crc: bool, raw_blocks: u32, rest: &[u8]) -> Vec<u8> {
        let mut bw = BitWriter::new();
        bw.write_bits(0xFFF, 12);
        bw.write_bits(0, 1);
        bw.write_bits(0, 2);
        bw.write_flag(!crc);
        bw.write_bits(1, 2); // LC
        bw.write_bits(u32::from(sfi), 4);
        bw.write_bits(0, 1);
        bw.write_bits(u32::from(channels), 3);
        bw.write_bits(0, 4);
        bw.write_bits((7 + rest.len()) as u32, 13);
        bw.write_bits(0x7FF, 11);
        bw.write_bits(raw_blocks - 1, 2);
        bw.write_bytes(rest);
        bw.finish()
    }

    /// 无 CRC, 单块的 AAC LC 帧
    pub(crate) fn adts_frame(sfi: u8, channels: u8, payload: &[u8]) -> Vec<u8> {
        write_frame(sfi, channels, false, 1, payload)
    }

    #[test]
    fn test_解析帧头() {
        let frame = adts_frame(4, 2, &[0x21, 0x00, 0xE0]);
        let header = AdtsHeader::parse(&frame).unwrap();
        assert_eq!(header.profile, 1);
        assert_eq!(header.sampling_frequency_index, 4);
        assert_eq!(header.channel_configuration, 2);
        assert_eq!(header.frame_length, 10);
        assert_eq!(header.raw_blocks, 1);
        assert!(!header.has_crc && !header.mpeg2);
        assert_eq!(header.header_len(), 7);
        // LC, 44100, 立体声
        assert_eq!(header.audio_specific_config(), [0x12, 0x10]);
        let config = header.decoder_config().unwrap();
        assert_eq!(config.channel_count(), 2);
    }

    #[test]
    fn test_非法帧头() {
        assert!(AdtsHeader::parse(&[0xFF, 0xF1, 0x50]).is_none());
        let mut frame = adts_frame(4, 2, &[0xE0]);
        frame[2] = (frame[2] & 0xC3) | (13 << 2);
        assert!(AdtsHeader::parse(&frame).is_none());
        assert!(AdtsHeader::parse(&[0x00; 16]).is_none());
    }

    #[test]
    fn test_跳过垃圾数据与_id3() {
        let mut data = b"ID3\x04\x00\x00\x00\x00\x00\x02".to_vec();
        data.extend_from_slice(&[0xAA, 0xBB]);
        let first = skip_id3v2(&data);
        assert_eq!(first, 12);
        data.extend_from_slice(&[0x12, 0xFF, 0x00]);
        let frame = adts_frame(3, 1, &[0x00, 0x00, 0xE0]);
        data.extend_from_slice(&frame);
        data.extend_from_slice(&frame);

        let mut reader = AdtsReader::new(&data);
        let frames: Vec<_> = reader.by_ref().collect();
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].offset, 15);
        assert_eq!(frames[0].payload(), &[0x00, 0x00, 0xE0]);
        assert_eq!(reader.skipped, 3);
    }

    #[test]
    fn test_多块负载拆分() {
        // 位置表 [4], 表 CRC, 块 0 = [1, 2] + CRC, 块 1 = [3] + CRC
        let rest = [0x00, 0x04, 0xEE, 0xEE, 1, 2, 0xC0, 0xC1, 3, 0xC2, 0xC3];
        let data = write_frame(4, 1, true, 2, &rest);
        let header = AdtsHeader::parse(&data).unwrap();
        assert_eq!(header.raw_blocks, 2);
        assert_eq!(header.header_len(), 11);
        let frame = AdtsReader::new(&data).next().unwrap();
        let blocks = split_raw_blocks(&frame).unwrap();
        assert_eq!(blocks, vec![&[1u8, 2][..], &[3u8][..]]);

        let data = write_frame(4, 1, false, 2, &[1, 2, 3]);
        let frame = AdtsReader::new(&data).next().unwrap();
        assert!(split_raw_blocks(&frame).is_none());
        assert_eq!(frame.payload(), &[1, 2, 3]);
    }
}
