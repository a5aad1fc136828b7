//! AAC 无损 (Huffman) 解码.
//!
//! 码本以多级前缀查找表的形式构建: 每级先 `peek` 固定位数查表, 命中叶子后只消费实际码长,
//! 命中子表则消费本级位数并进入下一级. 剩余位数不足时 `peek` 以 0 补齐,
//! 真正越界的码字在消费时报 [`AacError::EndOfStream`].
//!
//! 所有码本在进程内只构建一次, 可被任意数量的解码器实例共享.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use aacdec_core::bitreader::BitReader;
use aacdec_core::{AacError, AacResult};

use super::codebooks::*;

/// 首级查找表位数
pub(crate) const ROOT_BITS: u32 = 9;

/// ESC 前缀中 1 的最大个数 (对应最大值 8191)
const MAX_ESC_PREFIX: u32 = 8;

#[derive(Debug, Clone, Copy)]
enum VlcEntry {
    /// 未被任何码字覆盖
    Invalid,
    /// 叶子: 符号值与本级剩余码长
    Symbol { value: u16, len: u8 },
    /// 子表: 起始偏移与子表位数
    Subtable { offset: u32, bits: u8 },
}

/// 多级前缀查找表
pub struct Vlc {
    table: Vec<VlcEntry>,
    root_bits: u32,
}

impl Vlc {
    /// 从 (码字, 码长, 符号) 列表构建查找表
    pub fn new(codes: &[(u32, u8, u16)], root_bits: u32) -> Self {
        let mut table = Vec::new();
        fill_level(&mut table, codes, root_bits);
        Self { table, root_bits }
    }

    /// 解码一个符号
    pub fn decode(&self, br: &mut BitReader) -> AacResult<u16> {
        let mut offset = 0usize;
        let mut bits = self.root_bits;
        loop {
            let idx = br.peek_bits_padded(bits) as usize;
            match self.table[offset + idx] {
                VlcEntry::Symbol { value, len } => {
                    br.skip_bits(u32::from(len))?;
                    return Ok(value);
                }
                VlcEntry::Subtable { offset: sub, bits: sub_bits } => {
                    br.skip_bits(bits)?;
                    offset = sub as usize;
                    bits = u32::from(sub_bits);
                }
                VlcEntry::Invalid => {
                    return Err(AacError::malformed("AAC: 无效的 Huffman 码字"));
                }
            }
        }
    }
}

/// 构建一级查找表, 返回其起始偏移
fn fill_level(table: &mut Vec<VlcEntry>, codes: &[(u32, u8, u16)], bits: u32) -> usize {
    let offset = table.len();
    table.resize(offset + (1usize << bits), VlcEntry::Invalid);

    let mut longer: BTreeMap<u32, Vec<(u32, u8, u16)>> = BTreeMap::new();
    for &(code, len, value) in codes {
        let len32 = u32::from(len);
        if len32 <= bits {
            let shift = bits - len32;
            let start = (code << shift) as usize;
            for slot in &mut table[offset + start..offset + start + (1usize << shift)] {
                *slot = VlcEntry::Symbol { value, len };
            }
        } else {
            let rest = len32 - bits;
            let prefix = code >> rest;
            let suffix = code & ((1u32 << rest) - 1);
            longer
                .entry(prefix)
                .or_default()
                .push((suffix, rest as u8, value));
        }
    }

    for (prefix, group) in longer {
        let max_len = group.iter().map(|e| u32::from(e.1)).max().unwrap_or(1);
        let sub_bits = max_len.min(bits);
        let sub = fill_level(table, &group, sub_bits);
        table[offset + prefix as usize] = VlcEntry::Subtable {
            offset: sub as u32,
            bits: sub_bits as u8,
        };
    }
    offset
}

// ============================================================
// 频谱码本
// ============================================================

/// 频谱码本 (码本 1-11)
pub struct SpectralCodebook {
    vlc: Vlc,
    /// 每个符号对应的值元组
    values: Vec<[i16; 4]>,
    /// 维度 (4=quad, 2=pair)
    pub dim: usize,
    /// 值不含符号, 非零值后跟符号位
    unsigned: bool,
    /// ESC 码本 (码本 11)
    escape: bool,
}

impl SpectralCodebook {
    fn build(
        codes: &[u16],
        bits: &[u8],
        dim: usize,
        modulo: usize,
        offset: i16,
        unsigned: bool,
        escape: bool,
    ) -> Self {
        let entries: Vec<(u32, u8, u16)> = codes
            .iter()
            .zip(bits)
            .enumerate()
            .map(|(i, (&c, &b))| (u32::from(c), b, i as u16))
            .collect();
        let values = (0..codes.len())
            .map(|i| index_to_values(i, dim, modulo, offset))
            .collect();
        Self {
            vlc: Vlc::new(&entries, ROOT_BITS),
            values,
            dim,
            unsigned,
            escape,
        }
    }

    /// 解码一组 (2 或 4 个) 量化值, 写入 `out[..dim]`
    ///
    /// 码流顺序: 码字, 全部符号位, 然后各值的 ESC 序列.
    pub fn decode_values(&self, br: &mut BitReader, out: &mut [i32]) -> AacResult<()> {
        let idx = self.vlc.decode(br)? as usize;
        let raw = self
            .values
            .get(idx)
            .ok_or_else(|| AacError::malformed("AAC: 频谱 Huffman 索引越界"))?;

        for i in 0..self.dim {
            out[i] = i32::from(raw[i]);
        }
        if self.unsigned {
            for v in out.iter_mut().take(self.dim) {
                if *v != 0 && br.read_flag()? {
                    *v = -*v;
                }
            }
        }
        if self.escape {
            for v in out.iter_mut().take(self.dim) {
                if v.unsigned_abs() == 16 {
                    let mag = read_escape(br)?;
                    *v = if *v < 0 { -mag } else { mag };
                }
            }
        }
        Ok(())
    }
}

/// 读取 ESC 序列: N 个 1, 一个 0, 然后 N+4 位尾数
fn read_escape(br: &mut BitReader) -> AacResult<i32> {
    let prefix = br.read_unary(0)?;
    if prefix > MAX_ESC_PREFIX {
        return Err(AacError::malformed("AAC: ESC 前缀过长"));
    }
    let n = prefix + 4;
    let mantissa = br.read_bits(n)? as i32;
    Ok((1 << n) + mantissa)
}

/// 将线性索引转换为值元组
///
/// 例: 码本 7 (dim=2, mod=8, offset=0): index=9 → [1, 1]
fn index_to_values(idx: usize, dim: usize, modulo: usize, offset: i16) -> [i16; 4] {
    let mut vals = [0i16; 4];
    let mut rest = idx;
    for slot in vals[..dim].iter_mut().rev() {
        *slot = (rest % modulo) as i16 + offset;
        rest /= modulo;
    }
    vals
}

// ============================================================
// 码本集合
// ============================================================

/// 全部 AAC Huffman 码本
pub struct Codebooks {
    scalefactor: Vlc,
    spectral: [SpectralCodebook; 11],
}

static CODEBOOKS: LazyLock<Codebooks> = LazyLock::new(Codebooks::build);

/// 进程级共享的码本集合
pub fn codebooks() -> &'static Codebooks {
    &CODEBOOKS
}

impl Codebooks {
    fn build() -> Self {
        let sf: Vec<(u32, u8, u16)> = SF_TABLE
            .iter()
            .map(|&(code, len, idx)| (code, len, idx as u16))
            .collect();
        Self {
            scalefactor: Vlc::new(&sf, ROOT_BITS),
            spectral: [
                SpectralCodebook::build(&CODES_1, &BITS_1, 4, 3, -1, false, false),
                SpectralCodebook::build(&CODES_2, &BITS_2, 4, 3, -1, false, false),
                SpectralCodebook::build(&CODES_3, &BITS_3, 4, 3, 0, true, false),
                SpectralCodebook::build(&CODES_4, &BITS_4, 4, 3, 0, true, false),
                SpectralCodebook::build(&CODES_5, &BITS_5, 2, 9, -4, false, false),
                SpectralCodebook::build(&CODES_6, &BITS_6, 2, 9, -4, false, false),
                SpectralCodebook::build(&CODES_7, &BITS_7, 2, 8, 0, true, false),
                SpectralCodebook::build(&CODES_8, &BITS_8, 2, 8, 0, true, false),
                SpectralCodebook::build(&CODES_9, &BITS_9, 2, 13, 0, true, false),
                SpectralCodebook::build(&CODES_10, &BITS_10, 2, 13, 0, true, false),
                SpectralCodebook::build(&CODES_11, &BITS_11, 2, 17, 0, true, true),
            ],
        }
    }

    /// 解码一个比例因子差分值 (-60..=60)
    pub fn decode_scalefactor_delta(&self, br: &mut BitReader) -> AacResult<i32> {
        Ok(i32::from(self.scalefactor.decode(br)?) - 60)
    }

    /// 获取频谱码本 (1-11)
    pub fn spectral(&self, cb: u8) -> AacResult<&SpectralCodebook> {
        match cb {
            1..=11 => Ok(&self.spectral[usize::from(cb) - 1]),
            _ => Err(AacError::malformed(format!("AAC: 非频谱码本 {cb}"))),
        }
    }
}
