//! 与采样率相关的静态表: 采样率索引、比例因子频带划分、TNS/预测频带上限.

/// 采样率索引表 (ISO 14496-3 Table 1.18), 索引 13/14 保留, 15 表示显式采样率
pub const AAC_SAMPLE_RATES: [u32; 13] = [
    96000, 88200, 64000, 48000, 44100, 32000, 24000, 22050, 16000, 12000, 11025, 8000, 7350,
];

/// 显式采样率映射到采样率索引的下限阈值
const RATE_INDEX_THRESHOLDS: [u32; 12] = [
    92017, 75132, 55426, 46009, 37566, 27713, 23004, 18783, 13856, 11502, 9391, 0,
];

/// 将任意采样率映射到最接近的标准索引 (用于选择频带表)
pub fn rate_to_index(rate: u32) -> usize {
    RATE_INDEX_THRESHOLDS
        .iter()
        .position(|&min| rate >= min)
        .unwrap_or(11)
}

/// 精确匹配采样率索引
pub fn exact_rate_index(rate: u32) -> Option<usize> {
    AAC_SAMPLE_RATES.iter().position(|&r| r == rate)
}

/// 主档次预测可用的最大频带数
pub const PRED_SFB_MAX: [usize; 13] = [33, 33, 38, 40, 40, 40, 41, 41, 37, 37, 37, 34, 34];

/// 长窗口 TNS 最大频带数
pub const TNS_MAX_BANDS_LONG: [usize; 13] = [31, 31, 34, 40, 42, 51, 46, 46, 42, 42, 42, 39, 39];

/// 短窗口 TNS 最大频带数
pub const TNS_MAX_BANDS_SHORT: [usize; 13] = [9, 9, 10, 14, 14, 14, 14, 14, 14, 14, 14, 14, 14];

const SWB_OFFSET_96K_LONG: [u16; 42] = [
    0, 4, 8, 12, 16, 20, 24, 28, 32, 36, 40, 44, 48, 52, 56, 64, 72, 80, 88, 96, 108, 120, 132,
    144, 156, 172, 188, 212, 240, 276, 320, 384, 448, 512, 576, 640, 704, 768, 832, 896, 960,
    1024,
];

const SWB_OFFSET_64K_LONG: [u16; 48] = [
    0, 4, 8, 12, 16, 20, 24, 28, 32, 36, 40, 44, 48, 52, 56, 64, 72, 80, 88, 100, 112, 124, 140,
    156, 172, 192, 216, 240, 268, 304, 344, 384, 424, 464, 504, 544, 584, 624, 664, 704, 744, 784,
    824, 864, 904, 944, 984, 1024,
];

const SWB_OFFSET_48K_LONG: [u16; 50] = [
    0, 4, 8, 12, 16, 20, 24, 28, 32, 36, 40, 48, 56, 64, 72, 80, 88, 96, 108, 120, 132, 144, 160,
    176, 196, 216, 240, 264, 292, 320, 352, 384, 416, 448, 480, 512, 544, 576, 608, 640, 672, 704,
    736, 768, 800, 832, 864, 896, 928, 1024,
];

const SWB_OFFSET_32K_LONG: [u16; 52] = [
    0, 4, 8, 12, 16, 20, 24, 28, 32, 36, 40, 48, 56, 64, 72, 80, 88, 96, 108, 120, 132, 144, 160,
    176, 196, 216, 240, 264, 292, 320, 352, 384, 416, 448, 480, 512, 544, 576, 608, 640, 672, 704,
    736, 768, 800, 832, 864, 896, 928, 960, 992, 1024,
];

const SWB_OFFSET_24K_LONG: [u16; 48] = [
    0, 4, 8, 12, 16, 20, 24, 28, 32, 36, 40, 44, 52, 60, 68, 76, 84, 92, 100, 108, 116, 124, 136,
    148, 160, 172, 188, 204, 220, 240, 260, 284, 308, 336, 364, 396, 432, 468, 508, 552, 600, 652,
    704, 768, 832, 896, 960, 1024,
];

const SWB_OFFSET_16K_LONG: [u16; 44] = [
    0, 8, 16, 24, 32, 40, 48, 56, 64, 72, 80, 88, 100, 112, 124, 136, 148, 160, 172, 184, 196, 212,
    228, 244, 260, 280, 300, 320, 344, 368, 396, 424, 456, 492, 532, 572, 616, 664, 716, 772, 832,
    896, 960, 1024,
];

const SWB_OFFSET_8K_LONG: [u16; 41] = [
    0, 12, 24, 36, 48, 60, 72, 84, 96, 108, 120, 132, 144, 156, 172, 188, 204, 220, 236, 252, 268,
    288, 308, 328, 348, 372, 396, 420, 448, 476, 508, 544, 580, 620, 664, 712, 764, 820, 880, 944,
    1024,
];

const SWB_OFFSET_64K_SHORT: [u16; 13] = [0, 4, 8, 12, 16, 20, 24, 32, 40, 48, 64, 92, 128];
const SWB_OFFSET_48K_SHORT: [u16; 15] = [0, 4, 8, 12, 16, 20, 28, 36, 44, 56, 68, 80, 96, 112, 128];
const SWB_OFFSET_24K_SHORT: [u16; 16] =
    [0, 4, 8, 12, 16, 20, 24, 28, 36, 44, 52, 64, 76, 92, 108, 128];
const SWB_OFFSET_16K_SHORT: [u16; 16] =
    [0, 4, 8, 12, 16, 20, 24, 28, 32, 40, 48, 60, 72, 88, 108, 128];
const SWB_OFFSET_8K_SHORT: [u16; 16] =
    [0, 4, 8, 12, 16, 20, 24, 28, 36, 44, 52, 60, 72, 88, 108, 128];

/// 按采样率索引排列的 (长窗口, 短窗口) 频带表
const SWB_TABLES: [(&[u16], &[u16]); 13] = [
    (&SWB_OFFSET_96K_LONG, &SWB_OFFSET_64K_SHORT),
    (&SWB_OFFSET_96K_LONG, &SWB_OFFSET_64K_SHORT),
    (&SWB_OFFSET_64K_LONG, &SWB_OFFSET_64K_SHORT),
    (&SWB_OFFSET_48K_LONG, &SWB_OFFSET_48K_SHORT),
    (&SWB_OFFSET_48K_LONG, &SWB_OFFSET_48K_SHORT),
    (&SWB_OFFSET_32K_LONG, &SWB_OFFSET_48K_SHORT),
    (&SWB_OFFSET_24K_LONG, &SWB_OFFSET_24K_SHORT),
    (&SWB_OFFSET_24K_LONG, &SWB_OFFSET_24K_SHORT),
    (&SWB_OFFSET_16K_LONG, &SWB_OFFSET_16K_SHORT),
    (&SWB_OFFSET_16K_LONG, &SWB_OFFSET_16K_SHORT),
    (&SWB_OFFSET_16K_LONG, &SWB_OFFSET_16K_SHORT),
    (&SWB_OFFSET_8K_LONG, &SWB_OFFSET_8K_SHORT),
    (&SWB_OFFSET_8K_LONG, &SWB_OFFSET_8K_SHORT),
];

/// 一个流的比例因子频带划分 (长/短窗口)
///
/// 960 点帧由 1024 点表在 960/120 处截断得到.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BandLayout {
    /// 采样率索引 (0..=12)
    pub rate_index: usize,
    /// 长窗口频带边界, 长度 = 频带数 + 1
    pub long: Vec<usize>,
    /// 短窗口频带边界
    pub short: Vec<usize>,
    /// 长窗口长度 (1024 或 960)
    pub frame_length: usize,
}

impl BandLayout {
    pub fn new(rate_index: usize, frame_length: usize) -> Self {
        let (long, short) = SWB_TABLES[rate_index.min(12)];
        Self {
            rate_index: rate_index.min(12),
            long: truncate_bands(long, frame_length),
            short: truncate_bands(short, frame_length / 8),
            frame_length,
        }
    }

    /// 长窗口频带数
    pub fn num_long_bands(&self) -> usize {
        self.long.len() - 1
    }

    /// 短窗口频带数
    pub fn num_short_bands(&self) -> usize {
        self.short.len() - 1
    }

    /// 短窗口长度
    pub fn short_length(&self) -> usize {
        self.frame_length / 8
    }
}

fn truncate_bands(table: &[u16], limit: usize) -> Vec<usize> {
    let mut out: Vec<usize> = table
        .iter()
        .map(|&v| usize::from(v))
        .take_while(|&v| v < limit)
        .collect();
    out.push(limit);
    out
}
