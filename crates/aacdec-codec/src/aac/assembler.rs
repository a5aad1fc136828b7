//! 输出组装: 元素到输出声道的映射、动态范围控制与交错 PCM.

use aacdec_core::{AacError, AacResult};

use super::config::{ChannelConfiguration, DecoderConfig};
use super::fill::DynamicRangeInfo;
use super::ics::IcsInfo;
use super::syntax::ElementId;
use super::tables::BandLayout;

/// 一个声道元素在输出中的位置
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelSlot {
    pub kind: ElementId,
    pub tag: u8,
    /// 第一个输出声道的序号
    pub first_channel: usize,
}

impl ChannelSlot {
    pub fn width(&self) -> usize {
        if self.kind == ElementId::Cpe { 2 } else { 1 }
    }
}

/// 声道元素 → 输出声道映射
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelMap {
    slots: Vec<ChannelSlot>,
    channels: usize,
}

impl ChannelMap {
    /// 按规范元素顺序或 PCE 的 front/side/back/LFE 顺序建立映射
    pub fn from_config(config: &DecoderConfig) -> Self {
        use ElementId::*;
        let mut elements: Vec<(ElementId, u8)> = Vec::new();
        match (&config.pce, config.channel_configuration) {
            (Some(pce), ChannelConfiguration::Pce) => {
                for e in pce.front.iter().chain(&pce.side).chain(&pce.back) {
                    elements.push((if e.is_cpe { Cpe } else { Sce }, e.tag));
                }
                elements.extend(pce.lfe.iter().map(|&tag| (Lfe, tag)));
            }
            (_, configuration) => {
                elements.extend_from_slice(match configuration {
                    ChannelConfiguration::Pce => &[],
                    ChannelConfiguration::Mono => &[(Sce, 0)],
                    ChannelConfiguration::Stereo => &[(Cpe, 0)],
                    ChannelConfiguration::Three => &[(Sce, 0), (Cpe, 0)],
                    ChannelConfiguration::Four => &[(Sce, 0), (Cpe, 0), (Sce, 1)],
                    ChannelConfiguration::Five => &[(Sce, 0), (Cpe, 0), (Cpe, 1)],
                    ChannelConfiguration::FiveOne => &[(Sce, 0), (Cpe, 0), (Cpe, 1), (Lfe, 0)],
                    ChannelConfiguration::SevenOne => {
                        &[(Sce, 0), (Cpe, 0), (Cpe, 1), (Cpe, 2), (Lfe, 0)]
                    }
                });
            }
        }

        let mut slots = Vec::with_capacity(elements.len());
        let mut channels = 0;
        for (kind, tag) in elements {
            let slot = ChannelSlot {
                kind,
                tag,
                first_channel: channels,
            };
            channels += slot.width();
            slots.push(slot);
        }
        Self { slots, channels }
    }

    pub fn channel_count(&self) -> usize {
        self.channels
    }

    pub fn slots(&self) -> &[ChannelSlot] {
        &self.slots
    }

    /// 为帧内元素分配输出位置, 返回槽位序号
    ///
    /// 优先匹配同类同标签的空闲槽位, 否则取同类的下一个空闲槽位;
    /// 都没有说明帧内声道数超出配置.
    pub fn resolve(&self, kind: ElementId, tag: u8, used: &mut [bool]) -> AacResult<usize> {
        let free = |i: &usize| !used[*i] && self.slots[*i].kind == kind;
        let index = (0..self.slots.len())
            .filter(free)
            .find(|&i| self.slots[i].tag == tag)
            .or_else(|| (0..self.slots.len()).find(free))
            .ok_or_else(|| {
                AacError::malformed(format!(
                    "AAC: 元素 {kind:?}#{tag} 超出配置的 {} 个声道",
                    self.channels
                ))
            })?;
        used[index] = true;
        Ok(index)
    }
}

/// 按 DRC 信息缩放一个声道的频谱
pub fn apply_drc(
    spec: &mut [f32],
    info: &IcsInfo,
    layout: &BandLayout,
    drc: &DynamicRangeInfo,
    cut: f32,
    boost: f32,
) {
    let frame_length = layout.frame_length;
    let win_len = info.window_length(layout);
    let mut bottom = 0;
    for (i, &(is_cut, ctl)) in drc.gains.iter().enumerate() {
        let top = match drc.band_tops.get(i) {
            Some(&t) => (4 * (usize::from(t) + 1)).min(frame_length),
            None => frame_length,
        };
        let exponent = f32::from(ctl) / 24.0;
        let factor = if is_cut {
            2.0f32.powf(-exponent * cut)
        } else {
            2.0f32.powf(exponent * boost)
        };
        let (lo, hi) = (
            bottom * win_len / frame_length,
            top * win_len / frame_length,
        );
        for w in 0..info.num_windows() {
            let base = w * win_len;
            spec[base + lo..base + hi].iter_mut().for_each(|v| *v *= factor);
        }
        bottom = top;
    }
}

/// 交错 16 位 PCM
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PcmBuffer {
    pub samples: Vec<i16>,
    pub channels: usize,
    pub sample_rate: u32,
    pub big_endian: bool,
}

impl PcmBuffer {
    /// 把逐声道浮点输出 (±32768 量程) 舍入、饱和并交错
    pub fn interleave(outputs: &[Vec<f32>], sample_rate: u32, big_endian: bool) -> Self {
        let channels = outputs.len();
        let len = outputs.first().map_or(0, Vec::len);
        let mut samples = Vec::with_capacity(len * channels);
        for n in 0..len {
            samples.extend(outputs.iter().map(|ch| to_i16(ch[n])));
        }
        Self {
            samples,
            channels,
            sample_rate,
            big_endian,
        }
    }

    pub fn samples_per_channel(&self) -> usize {
        if self.channels == 0 {
            0
        } else {
            self.samples.len() / self.channels
        }
    }

    /// 按格式描述的字节序输出
    pub fn to_bytes(&self) -> Vec<u8> {
        if self.big_endian {
            self.samples.iter().flat_map(|s| s.to_be_bytes()).collect()
        } else {
            self.samples.iter().flat_map(|s| s.to_le_bytes()).collect()
        }
    }
}

fn to_i16(v: f32) -> i16 {
    v.round().clamp(-32768.0, 32767.0) as i16
}
