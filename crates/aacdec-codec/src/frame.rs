//! 解码后的音频帧.

use aacdec_core::ChannelLayout;

use crate::packet::NOPTS_VALUE;

/// 音频帧
///
/// 交错排列的有符号 16 位采样.
#[derive(Debug, Clone)]
pub struct AudioFrame {
    /// 交错采样数据
    pub samples: Vec<i16>,
    /// 本帧包含的采样数 (每声道)
    pub nb_samples: u32,
    /// 采样率 (Hz)
    pub sample_rate: u32,
    /// 声道布局
    pub channel_layout: ChannelLayout,
    /// 显示时间戳 (以采样为单位)
    pub pts: i64,
    /// 帧时长 (以采样为单位)
    pub duration: i64,
}

impl AudioFrame {
    pub fn new(nb_samples: u32, sample_rate: u32, channel_layout: ChannelLayout) -> Self {
        Self {
            samples: vec![0; nb_samples as usize * channel_layout.channels as usize],
            nb_samples,
            sample_rate,
            channel_layout,
            pts: NOPTS_VALUE,
            duration: i64::from(nb_samples),
        }
    }

    /// 小端字节序列
    pub fn to_le_bytes(&self) -> Vec<u8> {
        self.samples.iter().flat_map(|s| s.to_le_bytes()).collect()
    }
}
