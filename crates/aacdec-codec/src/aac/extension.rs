//! 带宽扩展阶段.
//!
//! 当对外采样率为核心采样率的 2 倍时, 每个声道元素的核心输出经 [`SbrDecoder`]
//! 做 QMF 分析、高频重建与合成; 没有 SBR 数据的元素只做 QMF 上采样,
//! 保证 PCM 缓冲与 [`super::AudioFormat`] 一致. 启用 PS 时单声道元素合成出右声道.

use log::debug;

use super::DecoderOptions;
use super::config::{ChannelConfiguration, DecoderConfig};
use super::fill::ExtensionPayload;
use super::sbr::SbrDecoder;
use super::syntax::{ElementId, RawDataBlock, SyntacticElement};

/// 对外采样率相对核心采样率的倍数 (1 或 2)
///
/// 显式 SBR 信令给出 2 倍扩展采样率时加倍; 否则对非 ER、单声道、
/// 低于 24 kHz 的流启发式加倍.
pub fn rate_multiplier(config: &DecoderConfig, options: &DecoderOptions) -> u32 {
    if !options.bandwidth_extension {
        return 1;
    }
    let core = config.sample_frequency.hz;
    if config.extension.sbr && config.extension.sample_rate == Some(2 * core) {
        return 2;
    }
    if !config.is_error_resilient()
        && config.channel_configuration == ChannelConfiguration::Mono
        && core < 24000
    {
        return 2;
    }
    1
}

/// PS 信令下是否把单声道核心合成为立体声
pub fn upmix_parametric_stereo(config: &DecoderConfig, options: &DecoderOptions) -> bool {
    options.bandwidth_extension
        && !options.downmix_ps
        && config.extension.ps
        && config.channel_count() == 1
}

/// 各声道元素的 SBR/PS 状态
#[derive(Debug, Clone)]
pub struct ExtensionState {
    sbr: SbrDecoder,
}

impl ExtensionState {
    pub fn new(config: &DecoderConfig, options: &DecoderOptions) -> Self {
        Self {
            sbr: SbrDecoder::new(
                config.sample_frequency.hz,
                config.frame_length,
                upmix_parametric_stereo(config, options),
            ),
        }
    }

    /// 解析帧内 SBR 数据; FIL 中的 SBR 负载属于其前一个 SCE/CPE
    ///
    /// LFE 不做高频重建, 只做 QMF 上采样.
    pub fn observe(&mut self, block: &RawDataBlock) {
        let mut owner: Option<(ElementId, u8, usize)> = None;
        for element in &block.elements {
            match element {
                SyntacticElement::Single { tag, .. } => owner = Some((ElementId::Sce, *tag, 1)),
                SyntacticElement::Pair { tag, .. } => owner = Some((ElementId::Cpe, *tag, 2)),
                SyntacticElement::Lfe { .. } => owner = None,
                SyntacticElement::Fill(payloads) => {
                    for payload in payloads {
                        let ExtensionPayload::Sbr { data, bits, .. } = payload else {
                            continue;
                        };
                        match owner {
                            Some((kind, tag, channels)) => {
                                self.sbr.feed(kind, tag, channels, data, *bits);
                            }
                            None => debug!("AAC: SBR 数据之前没有 SCE/CPE, 忽略"),
                        }
                    }
                }
                _ => {}
            }
        }
    }

    /// 把一个声道元素的核心输出换成 2 倍采样率的输出, PS 时返回右声道
    pub fn synthesize(&mut self, kind: ElementId, tag: u8, channels: &mut [Vec<f32>]) -> Option<Vec<f32>> {
        self.sbr.process(kind, tag, channels)
    }

    /// 指定元素当前生效的 SBR 头
    #[cfg(test)]
    pub fn sbr_header(&self, kind: ElementId, tag: u8) -> Option<&super::sbr::bitstream::SbrHeader> {
        self.sbr.header(kind, tag)
    }

    pub fn reset(&mut self) {
        self.sbr.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aac::config::Profile;

    #[test]
    fn test_采样率倍数() {
        let options = DecoderOptions::default();
        let mono = DecoderConfig::create(2, 22050, 1).unwrap();
        assert_eq!(rate_multiplier(&mono, &options), 2);
        let stereo = DecoderConfig::create(2, 22050, 2).unwrap();
        assert_eq!(rate_multiplier(&stereo, &options), 1);
        let high = DecoderConfig::create(2, 44100, 1).unwrap();
        assert_eq!(rate_multiplier(&high, &options), 1);
        let off = DecoderOptions {
            bandwidth_extension: false,
            ..DecoderOptions::default()
        };
        assert_eq!(rate_multiplier(&mono, &off), 1);

        let mut er = DecoderConfig::create(17, 16000, 1).unwrap();
        assert_eq!(er.profile, Profile::ErAacLc);
        assert_eq!(rate_multiplier(&er, &options), 1);
        er.extension.sbr = true;
        er.extension.sample_rate = Some(32000);
        assert_eq!(rate_multiplier(&er, &options), 2);
    }

    #[test]
    fn test_ps_复制为立体声() {
        let mut config = DecoderConfig::create(2, 24000, 1).unwrap();
        let options = DecoderOptions::default();
        assert!(!upmix_parametric_stereo(&config, &options));
        config.extension.ps = true;
        assert!(upmix_parametric_stereo(&config, &options));
        let downmix = DecoderOptions {
            downmix_ps: true,
            ..DecoderOptions::default()
        };
        assert!(!upmix_parametric_stereo(&config, &downmix));
    }
}
