//! 音频声道布局定义.
//!
//! [`ChannelPosition`] 描述单个输出声道的扬声器位置, [`ChannelLayout`] 是位置集合的掩码形式.
//! AAC 的输出声道顺序由解码器按元素出现顺序给出, 布局只用于描述.

use bitflags::bitflags;
use std::fmt;

bitflags! {
    /// 声道位掩码, 每个位代表一个扬声器位置
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ChannelMask: u64 {
        /// 前方左声道
        const FRONT_LEFT            = 1 << 0;
        /// 前方右声道
        const FRONT_RIGHT           = 1 << 1;
        /// 前方中央声道
        const FRONT_CENTER          = 1 << 2;
        /// 低频效果 (LFE)
        const LOW_FREQUENCY         = 1 << 3;
        /// 后方左声道
        const BACK_LEFT             = 1 << 4;
        /// 后方右声道
        const BACK_RIGHT            = 1 << 5;
        /// 前方中左声道
        const FRONT_LEFT_OF_CENTER  = 1 << 6;
        /// 前方中右声道
        const FRONT_RIGHT_OF_CENTER = 1 << 7;
        /// 后方中央声道
        const BACK_CENTER           = 1 << 8;
        /// 侧方左声道
        const SIDE_LEFT             = 1 << 9;
        /// 侧方右声道
        const SIDE_RIGHT            = 1 << 10;
    }
}

/// 单个声道的扬声器位置
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChannelPosition {
    FrontCenter,
    FrontLeft,
    FrontRight,
    FrontLeftOfCenter,
    FrontRightOfCenter,
    SideLeft,
    SideRight,
    BackLeft,
    BackRight,
    BackCenter,
    LowFrequency,
    /// 位置未知 (PCE 中超出常规布局的声道)
    Unknown,
}

impl ChannelPosition {
    /// 对应的掩码位
    pub fn mask(self) -> ChannelMask {
        match self {
            Self::FrontCenter => ChannelMask::FRONT_CENTER,
            Self::FrontLeft => ChannelMask::FRONT_LEFT,
            Self::FrontRight => ChannelMask::FRONT_RIGHT,
            Self::FrontLeftOfCenter => ChannelMask::FRONT_LEFT_OF_CENTER,
            Self::FrontRightOfCenter => ChannelMask::FRONT_RIGHT_OF_CENTER,
            Self::SideLeft => ChannelMask::SIDE_LEFT,
            Self::SideRight => ChannelMask::SIDE_RIGHT,
            Self::BackLeft => ChannelMask::BACK_LEFT,
            Self::BackRight => ChannelMask::BACK_RIGHT,
            Self::BackCenter => ChannelMask::BACK_CENTER,
            Self::LowFrequency => ChannelMask::LOW_FREQUENCY,
            Self::Unknown => ChannelMask::empty(),
        }
    }
}

/// 声道布局
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChannelLayout {
    /// 声道数量
    pub channels: u32,
    /// 声道位掩码
    pub mask: ChannelMask,
}

impl ChannelLayout {
    /// 单声道
    pub const MONO: Self = Self {
        channels: 1,
        mask: ChannelMask::FRONT_CENTER,
    };

    /// 立体声 (左右)
    pub const STEREO: Self = Self {
        channels: 2,
        mask: ChannelMask::FRONT_LEFT.union(ChannelMask::FRONT_RIGHT),
    };

    /// 5.1 环绕声
    pub const SURROUND_5_1: Self = Self {
        channels: 6,
        mask: ChannelMask::FRONT_LEFT
            .union(ChannelMask::FRONT_RIGHT)
            .union(ChannelMask::FRONT_CENTER)
            .union(ChannelMask::LOW_FREQUENCY)
            .union(ChannelMask::BACK_LEFT)
            .union(ChannelMask::BACK_RIGHT),
    };

    /// 由逐声道位置构建布局
    pub fn from_positions(positions: &[ChannelPosition]) -> Self {
        let mask = positions
            .iter()
            .fold(ChannelMask::empty(), |acc, p| acc | p.mask());
        Self {
            channels: positions.len() as u32,
            mask,
        }
    }
}

impl fmt::Display for ChannelLayout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Self::MONO => write!(f, "mono"),
            Self::STEREO => write!(f, "stereo"),
            Self::SURROUND_5_1 => write!(f, "5.1"),
            _ => write!(f, "{}ch", self.channels),
        }
    }
}
