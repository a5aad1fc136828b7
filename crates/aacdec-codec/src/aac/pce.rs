//! 节目配置元素 (Program Config Element, ISO 14496-3 4.4.1.1).
//!
//! PCE 描述声道数量与排列, 可出现在 AudioSpecificConfig (声道配置 0)、ADIF 头部或帧内.

use serde::Serialize;

use aacdec_core::bitreader::BitReader;
use aacdec_core::bitwriter::BitWriter;
use aacdec_core::{AacError, AacResult, ChannelPosition};

/// PCE 中引用的一个声道元素
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PceChannelElement {
    /// true 表示 CPE, 否则为 SCE
    pub is_cpe: bool,
    /// 元素实例标签
    pub tag: u8,
}

/// 耦合声道元素引用
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PceCouplingElement {
    /// 是否为独立切换 CCE
    pub independently_switched: bool,
    pub tag: u8,
}

/// 矩阵混音参数
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MatrixMixdown {
    pub index: u8,
    pub pseudo_surround: bool,
}

/// 节目配置元素
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ProgramConfigElement {
    pub instance_tag: u8,
    /// 2 位 profile 字段 (对象类型 - 1)
    pub object_type: u8,
    pub sample_frequency_index: u8,
    pub front: Vec<PceChannelElement>,
    pub side: Vec<PceChannelElement>,
    pub back: Vec<PceChannelElement>,
    pub lfe: Vec<u8>,
    pub assoc_data: Vec<u8>,
    pub coupling: Vec<PceCouplingElement>,
    pub mono_mixdown: Option<u8>,
    pub stereo_mixdown: Option<u8>,
    pub matrix_mixdown: Option<MatrixMixdown>,
    pub comment: Vec<u8>,
}

impl ProgramConfigElement {
    /// 解析 PCE
    ///
    /// 注释字段前的字节对齐以 `br` 的起点为基准, 调用方需保证起点即码流起点.
    pub fn parse(br: &mut BitReader) -> AacResult<Self> {
        let instance_tag = br.read_bits(4)? as u8;
        let object_type = br.read_bits(2)? as u8;
        let sample_frequency_index = br.read_bits(4)? as u8;
        let num_front = br.read_bits(4)? as usize;
        let num_side = br.read_bits(4)? as usize;
        let num_back = br.read_bits(4)? as usize;
        let num_lfe = br.read_bits(2)? as usize;
        let num_assoc = br.read_bits(3)? as usize;
        let num_cc = br.read_bits(4)? as usize;

        let mono_mixdown = if br.read_flag()? {
            Some(br.read_bits(4)? as u8)
        } else {
            None
        };
        let stereo_mixdown = if br.read_flag()? {
            Some(br.read_bits(4)? as u8)
        } else {
            None
        };
        let matrix_mixdown = if br.read_flag()? {
            Some(MatrixMixdown {
                index: br.read_bits(2)? as u8,
                pseudo_surround: br.read_flag()?,
            })
        } else {
            None
        };

        let front = read_channel_elements(br, num_front)?;
        let side = read_channel_elements(br, num_side)?;
        let back = read_channel_elements(br, num_back)?;
        let lfe = (0..num_lfe)
            .map(|_| br.read_bits(4).map(|v| v as u8))
            .collect::<AacResult<Vec<_>>>()?;
        let assoc_data = (0..num_assoc)
            .map(|_| br.read_bits(4).map(|v| v as u8))
            .collect::<AacResult<Vec<_>>>()?;
        let mut coupling = Vec::with_capacity(num_cc);
        for _ in 0..num_cc {
            coupling.push(PceCouplingElement {
                independently_switched: br.read_flag()?,
                tag: br.read_bits(4)? as u8,
            });
        }

        br.align_to_byte();
        let comment_len = br.read_bits(8)? as usize;
        let comment = br.read_bytes(comment_len)?.to_vec();

        let pce = Self {
            instance_tag,
            object_type,
            sample_frequency_index,
            front,
            side,
            back,
            lfe,
            assoc_data,
            coupling,
            mono_mixdown,
            stereo_mixdown,
            matrix_mixdown,
            comment,
        };
        if pce.channel_count() == 0 {
            return Err(AacError::malformed("AAC: PCE 未声明任何声道"));
        }
        Ok(pce)
    }

    /// 写出 PCE (与 [`parse`](Self::parse) 对称)
    pub fn write(&self, bw: &mut BitWriter) {
        bw.write_bits(u32::from(self.instance_tag), 4);
        bw.write_bits(u32::from(self.object_type), 2);
        bw.write_bits(u32::from(self.sample_frequency_index), 4);
        bw.write_bits(self.front.len() as u32, 4);
        bw.write_bits(self.side.len() as u32, 4);
        bw.write_bits(self.back.len() as u32, 4);
        bw.write_bits(self.lfe.len() as u32, 2);
        bw.write_bits(self.assoc_data.len() as u32, 3);
        bw.write_bits(self.coupling.len() as u32, 4);
        for mix in [self.mono_mixdown, self.stereo_mixdown] {
            bw.write_flag(mix.is_some());
            if let Some(v) = mix {
                bw.write_bits(u32::from(v), 4);
            }
        }
        bw.write_flag(self.matrix_mixdown.is_some());
        if let Some(m) = self.matrix_mixdown {
            bw.write_bits(u32::from(m.index), 2);
            bw.write_flag(m.pseudo_surround);
        }
        for e in self.front.iter().chain(&self.side).chain(&self.back) {
            bw.write_flag(e.is_cpe);
            bw.write_bits(u32::from(e.tag), 4);
        }
        for &tag in self.lfe.iter().chain(&self.assoc_data) {
            bw.write_bits(u32::from(tag), 4);
        }
        for c in &self.coupling {
            bw.write_flag(c.independently_switched);
            bw.write_bits(u32::from(c.tag), 4);
        }
        bw.align_to_byte();
        bw.write_bits(self.comment.len() as u32, 8);
        bw.write_bytes(&self.comment);
    }

    /// 输出声道数
    pub fn channel_count(&self) -> usize {
        let pairs = |list: &[PceChannelElement]| -> usize {
            list.iter().map(|e| if e.is_cpe { 2 } else { 1 }).sum()
        };
        pairs(&self.front) + pairs(&self.side) + pairs(&self.back) + self.lfe.len()
    }

    /// 按 front, side, back, LFE 顺序给出各输出声道的位置
    pub fn channel_positions(&self) -> Vec<ChannelPosition> {
        use ChannelPosition::*;
        let mut out = Vec::with_capacity(self.channel_count());
        let mut front_pairs = 0;
        let mut front_center = false;
        for e in &self.front {
            if e.is_cpe {
                let pair = if front_pairs == 0 {
                    [FrontLeft, FrontRight]
                } else if front_pairs == 1 {
                    [FrontLeftOfCenter, FrontRightOfCenter]
                } else {
                    [Unknown, Unknown]
                };
                front_pairs += 1;
                out.extend(pair);
            } else {
                out.push(if front_center { Unknown } else { FrontCenter });
                front_center = true;
            }
        }
        for e in &self.side {
            if e.is_cpe {
                out.extend([SideLeft, SideRight]);
            } else {
                out.push(Unknown);
            }
        }
        for e in &self.back {
            if e.is_cpe {
                out.extend([BackLeft, BackRight]);
            } else {
                out.push(BackCenter);
            }
        }
        out.extend(self.lfe.iter().map(|_| LowFrequency));
        out
    }
}

fn read_channel_elements(br: &mut BitReader, count: usize) -> AacResult<Vec<PceChannelElement>> {
    let mut out = Vec::with_capacity(count);
    for _ in 0..count {
        out.push(PceChannelElement {
            is_cpe: br.read_flag()?,
            tag: br.read_bits(4)? as u8,
        });
    }
    Ok(out)
}
