//! 比特流读取器.
//!
//! 按大端位序 (MSB first) 从一帧字节缓冲区中读取数据, 是语法解析与 Huffman 解码的基础.
//!
//! 任何超出缓冲区末尾的读取都返回 [`AacError::EndOfStream`], 不会越界访问.

use crate::{AacError, AacResult};

/// 比特流读取器
///
/// # 示例
/// ```
/// use aacdec_core::bitreader::BitReader;
///
/// let data = [0b10110001, 0b01010101];
/// let mut br = BitReader::new(&data);
/// assert_eq!(br.read_bits(4).unwrap(), 0b1011);
/// assert_eq!(br.read_bits(4).unwrap(), 0b0001);
/// assert_eq!(br.read_bits(8).unwrap(), 0b01010101);
/// assert!(br.read_bit().is_err());
/// ```
#[derive(Clone)]
pub struct BitReader<'a> {
    /// 源数据
    data: &'a [u8],
    /// 当前字节索引
    byte_pos: usize,
    /// 当前字节中的位位置 (0-7, 0 表示最高位)
    bit_pos: u8,
}

impl<'a> BitReader<'a> {
    /// 创建新的比特流读取器
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            byte_pos: 0,
            bit_pos: 0,
        }
    }

    /// 获取已读取的总位数
    pub fn bits_read(&self) -> usize {
        self.byte_pos * 8 + self.bit_pos as usize
    }

    /// 获取剩余可读位数
    pub fn bits_left(&self) -> usize {
        if self.byte_pos >= self.data.len() {
            return 0;
        }
        (self.data.len() - self.byte_pos) * 8 - self.bit_pos as usize
    }

    /// 是否已到达末尾
    pub fn is_eof(&self) -> bool {
        self.bits_left() == 0
    }

    /// 读取 1 个位
    pub fn read_bit(&mut self) -> AacResult<u32> {
        if self.byte_pos >= self.data.len() {
            return Err(AacError::EndOfStream);
        }

        let bit = (self.data[self.byte_pos] >> (7 - self.bit_pos)) & 1;
        self.bit_pos += 1;
        if self.bit_pos >= 8 {
            self.bit_pos = 0;
            self.byte_pos += 1;
        }

        Ok(u32::from(bit))
    }

    /// 读取 1 个位并转换为布尔值
    pub fn read_flag(&mut self) -> AacResult<bool> {
        Ok(self.read_bit()? != 0)
    }

    /// 读取 N 个位 (最多 32 位)
    ///
    /// 剩余位数不足 N 时返回 [`AacError::EndOfStream`], 游标保持不动.
    pub fn read_bits(&mut self, n: u32) -> AacResult<u32> {
        if n == 0 {
            return Ok(0);
        }
        if n > 32 {
            return Err(AacError::InvalidArgument(format!(
                "read_bits: n={} 超过 32 位",
                n,
            )));
        }
        if (n as usize) > self.bits_left() {
            return Err(AacError::EndOfStream);
        }

        let mut result: u32 = 0;
        let mut remaining = n;

        while remaining > 0 {
            let available = 8 - self.bit_pos as u32;
            let to_read = remaining.min(available);

            let shift = available - to_read;
            let mask = ((1u32 << to_read) - 1) as u8;
            let bits = (self.data[self.byte_pos] >> shift) & mask;

            result = (result << to_read) | u32::from(bits);

            self.bit_pos += to_read as u8;
            if self.bit_pos >= 8 {
                self.bit_pos = 0;
                self.byte_pos += 1;
            }
            remaining -= to_read;
        }

        Ok(result)
    }

    /// 读取一元编码值
    ///
    /// 统计 `stop_bit` 之前出现的相反位个数, 例如 `read_unary(0)` 从 `1110...` 得到 3.
    pub fn read_unary(&mut self, stop_bit: u32) -> AacResult<u32> {
        let stop = stop_bit & 1;
        let mut count = 0u32;
        loop {
            let bit = self.read_bit()?;
            if bit == stop {
                return Ok(count);
            }
            count += 1;
        }
    }

    /// 窥视 N 个位 (不移动位置)
    pub fn peek_bits(&self, n: u32) -> AacResult<u32> {
        let mut probe = self.clone();
        probe.read_bits(n)
    }

    /// 窥视 N 个位, 不足部分以 0 填充
    ///
    /// Huffman 查表时使用: 即使剩余位数少于最长码长, 也能完成前缀匹配,
    /// 随后由 [`skip_bits`](Self::skip_bits) 按实际码长消费, 码字越界时在那里报错.
    pub fn peek_bits_padded(&self, n: u32) -> u32 {
        debug_assert!(n <= 32);
        let left = self.bits_left();
        if (n as usize) <= left {
            return self.peek_bits(n).unwrap_or(0);
        }
        let avail = left as u32;
        let head = self.peek_bits(avail).unwrap_or(0);
        if avail == 0 { 0 } else { head << (n - avail) }
    }

    /// 跳过 N 个位
    pub fn skip_bits(&mut self, n: u32) -> AacResult<()> {
        self.skip_bits_usize(n as usize)
    }

    /// 跳过任意数量的位
    pub fn skip_bits_usize(&mut self, n: usize) -> AacResult<()> {
        if n > self.bits_left() {
            return Err(AacError::EndOfStream);
        }

        let total_bits = self.bit_pos as usize + n;
        self.byte_pos += total_bits / 8;
        self.bit_pos = (total_bits % 8) as u8;

        Ok(())
    }

    /// 对齐到下一个字节边界
    ///
    /// 如果当前已在字节边界, 则不做任何事.
    pub fn align_to_byte(&mut self) {
        if self.bit_pos > 0 {
            self.bit_pos = 0;
            self.byte_pos += 1;
        }
    }

    /// 获取当前字节位置
    pub fn byte_position(&self) -> usize {
        self.byte_pos
    }

    /// 从当前位置读取原始字节切片
    ///
    /// 仅在字节对齐时可用.
    pub fn read_bytes(&mut self, n: usize) -> AacResult<&'a [u8]> {
        if self.bit_pos != 0 {
            return Err(AacError::InvalidArgument("read_bytes 需要字节对齐".into()));
        }

        let end = self.byte_pos + n;
        if end > self.data.len() {
            return Err(AacError::EndOfStream);
        }

        let slice = &self.data[self.byte_pos..end];
        self.byte_pos = end;
        Ok(slice)
    }

    /// 读取 N 个字节, 不要求字节对齐
    pub fn read_byte_vec(&mut self, n: usize) -> AacResult<Vec<u8>> {
        if n * 8 > self.bits_left() {
            return Err(AacError::EndOfStream);
        }
        if self.bit_pos == 0 {
            return self.read_bytes(n).map(<[u8]>::to_vec);
        }
        (0..n).map(|_| self.read_bits(8).map(|b| b as u8)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_读取_asc_字段() {
        // AAC LC, 44100 Hz, 立体声
        let data = [0x12, 0x10];
        let mut br = BitReader::new(&data);
        assert_eq!(br.read_bits(5).unwrap(), 2);
        assert_eq!(br.read_bits(4).unwrap(), 4);
        assert_eq!(br.read_bits(4).unwrap(), 2);
        assert_eq!(br.bits_read(), 13);
        assert!(!br.read_flag().unwrap());
        br.skip_bits(2).unwrap();
        assert!(br.is_eof());
    }

    #[test]
    fn test_32_位读取() {
        let data = [0xFF, 0xF1, 0x50, 0x80, 0x01];
        let mut br = BitReader::new(&data);
        assert_eq!(br.read_bits(32).unwrap(), 0xFFF1_5080);
        assert_eq!(br.read_bits(8).unwrap(), 0x01);
    }

    #[test]
    fn test_越界读取返回流结束() {
        let data = [0xAB];
        let mut br = BitReader::new(&data);
        br.read_bits(5).unwrap();
        assert!(matches!(br.read_bits(4), Err(AacError::EndOfStream)));
        // 失败的读取不移动游标
        assert_eq!(br.bits_left(), 3);
        assert_eq!(br.read_bits(3).unwrap(), 0b011);
        assert!(matches!(br.read_bit(), Err(AacError::EndOfStream)));
        assert!(matches!(br.skip_bits(1), Err(AacError::EndOfStream)));
    }

    #[test]
    fn test_escape_前缀() {
        // 3 个 1 后跟 0, 随后是 7 位的 escape 尾部
        let data = [0b1110_1010, 0b1010_0000];
        let mut br = BitReader::new(&data);
        assert_eq!(br.read_unary(0).unwrap(), 3);
        assert_eq!(br.read_bits(7).unwrap(), 0b1010101);
        let mut ones = BitReader::new(&[0xFF]);
        assert!(ones.read_unary(0).is_err());
    }

    #[test]
    fn test_窥视不移动游标() {
        let data = [0b1011_0001];
        let mut br = BitReader::new(&data);
        assert_eq!(br.peek_bits(4).unwrap(), 0b1011);
        assert_eq!(br.read_bits(4).unwrap(), 0b1011);
        assert!(br.peek_bits(5).is_err());
        assert_eq!(br.bits_left(), 4);
    }

    #[test]
    fn test_码表查找补零窥视() {
        let data = [0b1011_0001];
        let mut br = BitReader::new(&data);
        br.read_bits(5).unwrap();
        // 剩余 001, 补零到 6 位
        assert_eq!(br.peek_bits_padded(6), 0b001000);
        br.read_bits(3).unwrap();
        assert_eq!(br.peek_bits_padded(9), 0);
    }

    #[test]
    fn test_字节对齐后读取字节() {
        // DSE / fill 元素: 对齐后取原始字节
        let data = [0b1010_0000, 0x01, 0x02, 0x03];
        let mut br = BitReader::new(&data);
        br.read_bits(3).unwrap();
        assert!(br.read_bytes(1).is_err());
        br.align_to_byte();
        assert_eq!(br.byte_position(), 1);
        assert_eq!(br.read_bytes(2).unwrap(), &[0x01, 0x02]);
        assert!(matches!(br.read_bytes(2), Err(AacError::EndOfStream)));
        br.align_to_byte();
        assert_eq!(br.byte_position(), 3);
    }

    #[test]
    fn test_非对齐读取字节() {
        let data = [0b1010_1010, 0b1111_0000, 0b0000_1111];
        let mut br = BitReader::new(&data);
        br.skip_bits(4).unwrap();
        assert_eq!(br.read_byte_vec(2).unwrap(), vec![0b1010_1111, 0b0000_0000]);
        assert!(matches!(br.read_byte_vec(1), Err(AacError::EndOfStream)));
        assert_eq!(br.bits_left(), 4);
    }
}
