//! 比特流写入器.
//!
//! 与 [`BitReader`](crate::bitreader::BitReader) 对应, 按大端位序 (MSB first) 写入.
//! 用于生成音频特定配置 (AudioSpecificConfig) 记录, 以及在测试中构造码流.

/// 比特流写入器
///
/// # 示例
/// ```
/// use aacdec_core::bitwriter::BitWriter;
///
/// let mut bw = BitWriter::new();
/// bw.write_bits(0b00010, 5); // AAC LC
/// bw.write_bits(4, 4);       // 44100 Hz
/// bw.write_bits(2, 4);       // 立体声
/// bw.write_bits(0, 3);
/// assert_eq!(bw.finish(), vec![0x12, 0x10]);
/// ```
pub struct BitWriter {
    /// 输出缓冲区
    data: Vec<u8>,
    /// 当前字节 (正在填充)
    current_byte: u8,
    /// 当前字节中已填充的位数 (0-7)
    bit_count: u8,
}

impl BitWriter {
    /// 创建新的比特流写入器
    pub fn new() -> Self {
        Self {
            data: Vec::new(),
            current_byte: 0,
            bit_count: 0,
        }
    }

    /// 获取已写入的总位数
    pub fn bits_written(&self) -> usize {
        self.data.len() * 8 + self.bit_count as usize
    }

    /// 写入 1 个位
    pub fn write_bit(&mut self, bit: u32) {
        self.current_byte = (self.current_byte << 1) | (bit & 1) as u8;
        self.bit_count += 1;
        if self.bit_count >= 8 {
            self.data.push(self.current_byte);
            self.current_byte = 0;
            self.bit_count = 0;
        }
    }

    /// 写入布尔标志
    pub fn write_flag(&mut self, flag: bool) {
        self.write_bit(u32::from(flag));
    }

    /// 写入 N 个位 (最多 32 位)
    ///
    /// 值的低 N 位被写入, 高位在前.
    pub fn write_bits(&mut self, value: u32, n: u32) {
        debug_assert!(n <= 32, "write_bits: n={} 超过 32 位", n);

        let mut remaining = n;
        while remaining > 0 {
            let available = 8 - self.bit_count as u32;
            let to_write = remaining.min(available);

            let shift = remaining - to_write;
            let mask = (1u32 << to_write) - 1;
            let bits = ((value >> shift) & mask) as u8;

            self.current_byte = if to_write >= 8 {
                bits
            } else {
                (self.current_byte << to_write) | bits
            };
            self.bit_count += to_write as u8;

            if self.bit_count >= 8 {
                self.data.push(self.current_byte);
                self.current_byte = 0;
                self.bit_count = 0;
            }

            remaining -= to_write;
        }
    }

    /// 写入一元编码: `count` 个 `!stop_bit`, 然后一个 `stop_bit`
    pub fn write_unary(&mut self, count: u32, stop_bit: u32) {
        let fill = 1 - (stop_bit & 1);
        for _ in 0..count {
            self.write_bit(fill);
        }
        self.write_bit(stop_bit & 1);
    }

    /// 写入完整字节
    pub fn write_bytes(&mut self, bytes: &[u8]) {
        if self.bit_count == 0 {
            self.data.extend_from_slice(bytes);
        } else {
            for &b in bytes {
                self.write_bits(u32::from(b), 8);
            }
        }
    }

    /// 对齐到字节边界 (用 0 填充)
    pub fn align_to_byte(&mut self) {
        if self.bit_count > 0 {
            let pad = 8 - self.bit_count;
            self.current_byte <<= pad;
            self.data.push(self.current_byte);
            self.current_byte = 0;
            self.bit_count = 0;
        }
    }

    /// 完成写入, 返回字节数据 (不足一字节时补 0)
    pub fn finish(mut self) -> Vec<u8> {
        self.align_to_byte();
        self.data
    }
}

impl Default for BitWriter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bitreader::BitReader;

    #[test]
    fn test_跨字节写入() {
        let mut bw = BitWriter::new();
        bw.write_bits(0xFFF, 12); // ADTS syncword
        bw.write_bits(0b0001, 4);
        bw.write_bits(0xFF00FF00, 32);
        assert_eq!(bw.bits_written(), 48);
        assert_eq!(bw.finish(), vec![0xFF, 0xF1, 0xFF, 0x00, 0xFF, 0x00]);
    }

    #[test]
    fn test_escape_前缀与对齐() {
        // escape 码前缀: N 个 1 后跟一个 0
        let mut bw = BitWriter::new();
        bw.write_unary(3, 0);
        bw.align_to_byte();
        bw.write_bytes(b"ID");
        assert_eq!(bw.finish(), vec![0b1110_0000, b'I', b'D']);
    }

    #[test]
    fn test_非对齐字节与读取器一致() {
        let mut bw = BitWriter::new();
        bw.write_bits(0b101, 3);
        bw.write_flag(true);
        bw.write_bytes(&[0xA5, 0x3C]);
        bw.write_bit(1);
        let data = bw.finish();
        assert_eq!(data.len(), 3);

        let mut br = BitReader::new(&data);
        assert_eq!(br.read_bits(3).unwrap(), 0b101);
        assert!(br.read_flag().unwrap());
        assert_eq!(br.read_byte_vec(2).unwrap(), vec![0xA5, 0x3C]);
        assert!(br.read_flag().unwrap());
        // 补齐的 3 个零位
        assert_eq!(br.bits_left(), 3);
        assert_eq!(br.read_bits(3).unwrap(), 0);
    }
}
