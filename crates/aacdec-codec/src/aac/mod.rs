//! MPEG-2/4 AAC 解码器.
//!
//! 支持 AAC Main / LC / LTP, 以及 ER AAC LC / LTP (不含差错恢复工具).
//! 对外采样率为核心 2 倍时经 SBR 重建高频, PS 合成立体声 (见 [`extension`], [`sbr`]).
//!
//! # 解码流程
//! 1. (仅首帧) 检测 ADIF 头, 用其 PCE 覆盖流配置
//! 2. 解析 raw_data_block 的全部语法元素; 失败则丢弃本帧, 不触碰跨帧状态
//! 3. 元素 → 输出声道映射
//! 4. 逐元素: 反量化、PNS、M/S、主档次预测、强度立体声
//! 5. 逐声道 (LFE, CCE, CPE, SCE 顺序): 耦合、LTP、TNS、DRC、滤波器组
//! 6. 扩展阶段 (SBR 高频重建, PS 立体声合成) 与交错输出

pub mod adif;
pub mod assembler;
mod codebooks;
pub mod config;
pub mod coupling;
pub mod extension;
pub mod fill;
pub mod filterbank;
mod huffman;
pub mod ics;
pub mod mdct;
pub mod pce;
pub mod prediction;
pub mod sbr;
pub mod spectral;
pub mod state;
pub mod syntax;
pub mod tables;
pub mod tns;


use log::{debug, warn};
use serde::{Deserialize, Serialize};

use aacdec_core::bitreader::BitReader;
use aacdec_core::{AacError, AacResult, ChannelLayout};

use crate::decoder::Decoder;
use crate::frame::AudioFrame;
use crate::packet::{NOPTS_VALUE, Packet};

use adif::AdifHeader;
use assembler::{ChannelMap, apply_drc};
use coupling::{apply_dependent, apply_independent, coupled_channels};
use extension::{ExtensionState, rate_multiplier, upmix_parametric_stereo};
use fill::{DynamicRangeInfo, ExtensionPayload};
use filterbank::Filterbank;
use ics::{ChannelStream, ParseContext};
use prediction::{apply_long_term_prediction, apply_main_prediction};
use spectral::{
    NoiseGenerator, apply_intensity_stereo, apply_mid_side, correlate_noise, dequantize,
};
use state::ChannelState;
use syntax::{
    ChannelPair, CouplingElement, CouplingPoint, ElementId, MAX_INSTANCES, RawDataBlock,
    SyntacticElement,
};
use tables::BandLayout;
use tns::{TnsMode, apply_tns};

pub use assembler::PcmBuffer;
pub use config::{ChannelConfiguration, DecoderConfig, Profile, can_decode};
pub use syntax::DataStreamElement;

/// 运行时选项
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DecoderOptions {
    /// 启用扩展阶段 (采样率加倍与 PS 复制)
    pub bandwidth_extension: bool,
    /// 应用帧内 DRC 信息
    pub apply_drc: bool,
    /// DRC 衰减比例 [0, 1]
    pub drc_cut: f32,
    /// DRC 提升比例 [0, 1]
    pub drc_boost: f32,
    /// PS 信令下保持单声道输出
    pub downmix_ps: bool,
}

impl Default for DecoderOptions {
    fn default() -> Self {
        Self {
            bandwidth_extension: true,
            apply_drc: false,
            drc_cut: 1.0,
            drc_boost: 1.0,
            downmix_ps: false,
        }
    }
}

/// 对外音频格式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioFormat {
    pub sample_rate: u32,
    pub bit_depth: u16,
    pub channels: u16,
    pub signed: bool,
    pub big_endian: bool,
}

/// 成功解码的一帧
#[derive(Debug, Clone)]
pub struct DecodedFrame {
    pub pcm: PcmBuffer,
    /// 本次调用消耗的字节数 (含 ADIF 头)
    pub consumed: usize,
    /// 帧内的数据流元素
    pub data_streams: Vec<DataStreamElement>,
}

/// 单帧解码结果
#[derive(Debug)]
pub enum FrameOutcome {
    Decoded(DecodedFrame),
    /// 帧级错误, 本帧无输出
    Dropped(AacError),
}

/// 帧内声道元素及其输出位置
enum Planned<'a> {
    Single {
        kind: ElementId,
        tag: u8,
        channel: usize,
        stream: &'a ChannelStream,
    },
    Pair {
        tag: u8,
        channel: usize,
        pair: &'a ChannelPair,
    },
    Coupling {
        tag: u8,
        element: &'a CouplingElement,
    },
}

/// 单个声道的重建任务
struct ChannelJob<'a> {
    kind: ElementId,
    tag: u8,
    /// 元素内声道序号
    index: usize,
    /// 输出声道序号; CCE 为其标签
    target: usize,
    stream: &'a ChannelStream,
    /// CCE 的耦合点
    point: Option<CouplingPoint>,
}

/// AAC 解码器
pub struct AacDecoder {
    config: DecoderConfig,
    options: DecoderOptions,
    layout: BandLayout,
    channel_map: ChannelMap,
    /// 逐输出声道状态, 首次用到时分配
    states: Vec<Option<ChannelState>>,
    /// 按标签索引的 CCE 状态
    cce_states: Vec<Option<ChannelState>>,
    filterbank: Filterbank,
    noise: NoiseGenerator,
    extension: ExtensionState,
    frames_decoded: u64,
    /// 是否已有帧成功解码 (之后声道排列不再改变)
    started: bool,
    pending: Option<AudioFrame>,
    flushing: bool,
    next_pts: i64,
}

impl AacDecoder {
    pub fn new(config: DecoderConfig, options: DecoderOptions) -> AacResult<Self> {
        if config.frame_length != 1024 && config.frame_length != 960 {
            return Err(AacError::config(format!(
                "AAC: 不支持的帧长 {}",
                config.frame_length
            )));
        }
        let options = DecoderOptions {
            drc_cut: options.drc_cut.clamp(0.0, 1.0),
            drc_boost: options.drc_boost.clamp(0.0, 1.0),
            ..options
        };
        let layout = BandLayout::new(config.sample_frequency.index, config.frame_length);
        let channel_map = ChannelMap::from_config(&config);
        let filterbank = Filterbank::new(config.frame_length);
        debug!(
            "AAC: 创建解码器 {:?}, {} Hz, {} 声道, 帧长 {}",
            config.profile,
            config.sample_frequency.hz,
            channel_map.channel_count(),
            config.frame_length
        );
        let extension = ExtensionState::new(&config, &options);
        Ok(Self {
            states: vec![None; channel_map.channel_count()],
            cce_states: vec![None; MAX_INSTANCES],
            config,
            options,
            layout,
            channel_map,
            filterbank,
            noise: NoiseGenerator::default(),
            extension,
            frames_decoded: 0,
            started: false,
            pending: None,
            flushing: false,
            next_pts: 0,
        })
    }

    /// 由 AudioSpecificConfig 创建, 使用默认选项
    pub fn from_audio_specific_config(data: &[u8]) -> AacResult<Self> {
        Self::new(DecoderConfig::decode(data)?, DecoderOptions::default())
    }

    /// 由显式参数创建, 使用默认选项
    pub fn from_parameters(object_type: u32, frequency: u32, channels: u32) -> AacResult<Self> {
        Self::new(
            DecoderConfig::create(object_type, frequency, channels)?,
            DecoderOptions::default(),
        )
    }

    pub fn config(&self) -> &DecoderConfig {
        &self.config
    }

    pub fn options(&self) -> &DecoderOptions {
        &self.options
    }

    /// 已调用 [`decode_frame`](Self::decode_frame) 的次数 (含失败)
    pub fn frames_decoded(&self) -> u64 {
        self.frames_decoded
    }

    /// 对外格式
    ///
    /// 采样率可能是核心采样率的 2 倍, 见 [`extension::rate_multiplier`].
    pub fn audio_format(&self) -> AudioFormat {
        let channels = if upmix_parametric_stereo(&self.config, &self.options) {
            2
        } else {
            self.config.channel_count()
        };
        AudioFormat {
            sample_rate: self.config.sample_frequency.hz
                * rate_multiplier(&self.config, &self.options),
            bit_depth: 16,
            channels: channels as u16,
            signed: true,
            big_endian: false,
        }
    }

    /// 输出声道布局
    pub fn channel_layout(&self) -> ChannelLayout {
        if upmix_parametric_stereo(&self.config, &self.options) {
            ChannelLayout::STEREO
        } else {
            self.config.channel_layout()
        }
    }

    /// 解码一帧
    ///
    /// 只有流级错误 (profile 不可解码等) 返回 `Err`, 且每次调用都会返回;
    /// 帧级错误以 [`FrameOutcome::Dropped`] 返回, 解码器可继续使用.
    pub fn decode_frame(&mut self, data: &[u8]) -> AacResult<FrameOutcome> {
        self.frames_decoded += 1;
        self.check_decodable()?;

        let mut offset = 0;
        if self.frames_decoded == 1 && AdifHeader::is_present(data) {
            let header = match AdifHeader::parse(data) {
                Ok(header) => header,
                Err(e) if e.is_frame_level() => return Ok(self.drop_frame(e)),
                Err(e) => return Err(e),
            };
            debug!(
                "AAC: ADIF 头 {} 字节, 码率 {}, {} 个 PCE",
                header.header_len,
                header.bitrate,
                header.programs.len()
            );
            if let Some(pce) = header.program() {
                self.config.set_audio_decoder_info(pce.clone())?;
                self.reconfigure();
                self.check_decodable()?;
            }
            offset = header.header_len;
        }

        match self.decode_block(&data[offset..]) {
            Ok(mut frame) => {
                frame.consumed += offset;
                self.started = true;
                Ok(FrameOutcome::Decoded(frame))
            }
            Err(e) if e.is_frame_level() => Ok(self.drop_frame(e)),
            Err(e) => Err(e),
        }
    }

    fn drop_frame(&self, err: AacError) -> FrameOutcome {
        debug!("AAC: 第 {} 帧无输出: {err}", self.frames_decoded);
        FrameOutcome::Dropped(err)
    }

    fn check_decodable(&self) -> AacResult<()> {
        if !can_decode(self.config.profile) {
            return Err(AacError::config(format!(
                "AAC: 不支持解码 {:?}",
                self.config.profile
            )));
        }
        if self.config.resilience.any() {
            return Err(AacError::config("AAC: 不支持差错恢复工具"));
        }
        Ok(())
    }

    /// 声道排列或采样率改变后重建映射与状态
    fn reconfigure(&mut self) {
        let config = &self.config;
        self.layout = BandLayout::new(config.sample_frequency.index, config.frame_length);
        self.channel_map = ChannelMap::from_config(&self.config);
        self.states = vec![None; self.channel_map.channel_count()];
        self.cce_states = vec![None; MAX_INSTANCES];
        self.extension = ExtensionState::new(&self.config, &self.options);
    }

    fn decode_block(&mut self, data: &[u8]) -> AacResult<DecodedFrame> {
        let mut br = BitReader::new(data);
        let ctx = ParseContext {
            profile: self.config.profile,
            layout: &self.layout,
        };
        let block = if self.config.is_error_resilient() {
            RawDataBlock::parse_er(&mut br, &ctx, self.config.channel_configuration)?
        } else {
            RawDataBlock::parse(&mut br, &ctx)?
        };
        debug!(
            "AAC: 第 {} 帧 [{}], {} 字节",
            self.frames_decoded,
            block.summary(),
            block.consumed
        );

        let in_band_pce = block.elements.iter().find_map(|e| match e {
            SyntacticElement::Program(pce) => Some(pce),
            _ => None,
        });
        if let Some(pce) = in_band_pce {
            if self.config.pce.as_ref() != Some(pce) {
                if self.started {
                    warn!("AAC: 首帧之后出现不同的 PCE, 忽略");
                } else {
                    debug!("AAC: 采用帧内 PCE, {} 声道", pce.channel_count());
                    self.config.adopt_channel_layout(pce.clone());
                    self.reconfigure();
                }
            }
        }

        // 先完成全部分配, 失败时不修改状态
        let plan = self.plan(&block)?;
        let doubled = rate_multiplier(&self.config, &self.options) == 2;
        if doubled {
            self.extension.observe(&block);
        }
        let drc = block.payloads().find_map(|p| match p {
            ExtensionPayload::DynamicRange(info) => Some(info),
            _ => None,
        });
        let mut outputs = self.reconstruct(&plan, drc);

        let right = if doubled {
            self.synthesize(&plan, &mut outputs)
        } else {
            None
        };
        if upmix_parametric_stereo(&self.config, &self.options) {
            if let Some(right) = right.or_else(|| outputs.first().cloned()) {
                outputs.push(right);
            }
        }

        let format = self.audio_format();
        let pcm = PcmBuffer::interleave(&outputs, format.sample_rate, format.big_endian);
        let data_streams = block
            .elements
            .iter()
            .filter_map(|e| match e {
                SyntacticElement::DataStream(dse) => Some(dse.clone()),
                _ => None,
            })
            .collect();
        Ok(DecodedFrame {
            pcm,
            consumed: block.consumed,
            data_streams,
        })
    }

    /// 逐声道元素做 SBR 合成, 输出换成 2 倍长度; 返回 PS 合成的右声道
    fn synthesize(&mut self, plan: &[Planned], outputs: &mut [Vec<f32>]) -> Option<Vec<f32>> {
        let n = self.config.frame_length;
        let mut upsampled = vec![vec![0.0f32; 2 * n]; outputs.len()];
        let mut right = None;
        for planned in plan {
            let (kind, tag, channel, count) = match planned {
                Planned::Single {
                    kind, tag, channel, ..
                } => (*kind, *tag, *channel, 1),
                Planned::Pair { tag, channel, .. } => (ElementId::Cpe, *tag, *channel, 2),
                Planned::Coupling { .. } => continue,
            };
            let Some(slice) = outputs.get_mut(channel..channel + count) else {
                continue;
            };
            let mut channels: Vec<Vec<f32>> = slice.iter_mut().map(std::mem::take).collect();
            if let Some(r) = self.extension.synthesize(kind, tag, &mut channels) {
                right.get_or_insert(r);
            }
            for (dst, src) in upsampled[channel..].iter_mut().zip(channels) {
                *dst = src;
            }
        }
        for (out, up) in outputs.iter_mut().zip(upsampled) {
            *out = up;
        }
        right
    }

    /// 为帧内声道元素分配输出位置
    fn plan<'a>(&self, block: &'a RawDataBlock) -> AacResult<Vec<Planned<'a>>> {
        let mut used = vec![false; self.channel_map.slots().len()];
        let mut plan = Vec::with_capacity(block.elements.len());
        for element in &block.elements {
            let (kind, tag) = match element {
                SyntacticElement::Single { tag, .. } => (ElementId::Sce, *tag),
                SyntacticElement::Pair { tag, .. } => (ElementId::Cpe, *tag),
                SyntacticElement::Lfe { tag, .. } => (ElementId::Lfe, *tag),
                SyntacticElement::Coupling { tag, element } => {
                    plan.push(Planned::Coupling {
                        tag: *tag,
                        element: element.as_ref(),
                    });
                    continue;
                }
                _ => continue,
            };
            let slot = self.channel_map.resolve(kind, tag, &mut used)?;
            let channel = self.channel_map.slots()[slot].first_channel;
            plan.push(match element {
                SyntacticElement::Pair { pair, .. } => Planned::Pair {
                    tag,
                    channel,
                    pair: pair.as_ref(),
                },
                SyntacticElement::Single { stream, .. } | SyntacticElement::Lfe { stream, .. } => {
                    Planned::Single {
                        kind,
                        tag,
                        channel,
                        stream: stream.as_ref(),
                    }
                }
                _ => continue,
            });
        }
        Ok(plan)
    }

    /// 频谱重建与滤波器组, 返回逐输出声道的时域样本
    fn reconstruct(
        &mut self,
        plan: &[Planned],
        drc: Option<&DynamicRangeInfo>,
    ) -> Vec<Vec<f32>> {
        let n = self.config.frame_length;
        let profile = self.config.profile;
        let layout = &self.layout;
        let channels = self.channel_map.channel_count();
        let mut spectra = vec![vec![0.0f32; n]; channels];
        let mut cce_spectra = vec![Vec::new(); MAX_INSTANCES];

        // 逐元素: 反量化与声道对处理
        let mut jobs: Vec<ChannelJob> = Vec::new();
        let mut couplings: Vec<(usize, &CouplingElement)> = Vec::new();
        for planned in plan {
            match *planned {
                Planned::Single {
                    kind,
                    tag,
                    channel,
                    stream,
                } => {
                    let spec = &mut spectra[channel];
                    dequantize(stream, layout, &mut self.noise, spec);
                    let state = lazy_state(&mut self.states[channel], n, profile);
                    apply_main_prediction(&stream.info, layout, spec, &mut state.predictors);
                    jobs.push(ChannelJob {
                        kind,
                        tag,
                        index: 0,
                        target: channel,
                        stream,
                        point: None,
                    });
                }
                Planned::Pair { tag, channel, pair } => {
                    let (head, tail) = spectra.split_at_mut(channel + 1);
                    let (left, right) = (&mut head[channel], &mut tail[0]);
                    dequantize(&pair.left, layout, &mut self.noise, left);
                    dequantize(&pair.right, layout, &mut self.noise, right);
                    correlate_noise(pair, layout, left, right);
                    apply_mid_side(pair, layout, left, right);
                    let sides = [(&pair.left, &mut *left), (&pair.right, &mut *right)];
                    for (i, (stream, spec)) in sides.into_iter().enumerate() {
                        let state = lazy_state(&mut self.states[channel + i], n, profile);
                        apply_main_prediction(&stream.info, layout, spec, &mut state.predictors);
                    }
                    apply_intensity_stereo(pair, layout, left, right);
                    for (index, stream) in [&pair.left, &pair.right].into_iter().enumerate() {
                        jobs.push(ChannelJob {
                            kind: ElementId::Cpe,
                            tag,
                            index,
                            target: channel + index,
                            stream,
                            point: None,
                        });
                    }
                }
                Planned::Coupling { tag, element } => {
                    let t = usize::from(tag);
                    let spec = &mut cce_spectra[t];
                    spec.resize(n, 0.0);
                    dequantize(&element.stream, layout, &mut self.noise, spec);
                    let state = lazy_state(&mut self.cce_states[t], n, profile);
                    let info = &element.stream.info;
                    apply_main_prediction(info, layout, spec, &mut state.predictors);
                    couplings.push((t, element));
                    jobs.push(ChannelJob {
                        kind: ElementId::Cce,
                        tag,
                        index: 0,
                        target: t,
                        stream: &element.stream,
                        point: Some(element.point),
                    });
                }
            }
        }

        // 逐声道: 耦合、LTP、TNS、DRC、滤波器组
        let skip_dependent = matches!(profile, Profile::AacLtp | Profile::ErAacLtp);
        if skip_dependent
            && couplings
                .iter()
                .any(|(_, c)| c.point != CouplingPoint::AfterImdct)
        {
            debug!("AAC: LTP 档次下忽略频域耦合");
        }
        let mut outputs = vec![vec![0.0f32; n]; channels];
        let mut cce_outputs = vec![Vec::new(); MAX_INSTANCES];
        for kind in [ElementId::Lfe, ElementId::Cce, ElementId::Cpe, ElementId::Sce] {
            for job in jobs.iter().filter(|j| j.kind == kind) {
                let is_cce = kind == ElementId::Cce;
                let info = &job.stream.info;
                let couple = !is_cce && kind != ElementId::Lfe;
                let mut spec = std::mem::take(if is_cce {
                    &mut cce_spectra[job.target]
                } else {
                    &mut spectra[job.target]
                });
                let state = if is_cce {
                    lazy_state(&mut self.cce_states[job.target], n, profile)
                } else {
                    lazy_state(&mut self.states[job.target], n, profile)
                };

                if couple && !skip_dependent {
                    apply_coupling(
                        CouplingPoint::BeforeTns,
                        job,
                        &couplings,
                        layout,
                        &cce_spectra,
                        &mut spec,
                    );
                }
                if let Some(ltp) = &info.ltp {
                    apply_long_term_prediction(
                        info,
                        ltp,
                        job.stream.tns.as_ref(),
                        layout,
                        state,
                        &mut self.filterbank,
                        &mut spec,
                    );
                }
                if let Some(tns) = &job.stream.tns {
                    apply_tns(&mut spec, tns, info, layout, TnsMode::Synthesis);
                }
                if couple && !skip_dependent {
                    apply_coupling(
                        CouplingPoint::BetweenTnsAndImdct,
                        job,
                        &couplings,
                        layout,
                        &cce_spectra,
                        &mut spec,
                    );
                }
                if let Some(drc) = drc.filter(|_| self.options.apply_drc && !is_cce) {
                    if !drc.is_excluded(job.target) {
                        let (cut, boost) = (self.options.drc_cut, self.options.drc_boost);
                        apply_drc(&mut spec, info, layout, drc, cut, boost);
                    }
                }

                let mut out = vec![0.0f32; n];
                if !is_cce || job.point == Some(CouplingPoint::AfterImdct) {
                    self.filterbank.synthesize(&spec, info, state, &mut out);
                    state.update_ltp_history(&out);
                }
                if couple {
                    apply_coupling(
                        CouplingPoint::AfterImdct,
                        job,
                        &couplings,
                        layout,
                        &cce_outputs,
                        &mut out,
                    );
                }

                if is_cce {
                    cce_spectra[job.target] = spec;
                    cce_outputs[job.target] = out;
                } else {
                    spectra[job.target] = spec;
                    outputs[job.target] = out;
                }
            }
        }
        outputs
    }
}

/// 首次使用时分配声道状态
fn lazy_state(slot: &mut Option<ChannelState>, n: usize, profile: Profile) -> &mut ChannelState {
    slot.get_or_insert_with(|| ChannelState::new(n, profile))
}

/// 把帧内位于 `point` 的 CCE 叠加到目标声道
fn apply_coupling(
    point: CouplingPoint,
    job: &ChannelJob,
    couplings: &[(usize, &CouplingElement)],
    layout: &BandLayout,
    sources: &[Vec<f32>],
    dest: &mut [f32],
) {
    let is_cpe = job.kind == ElementId::Cpe;
    for &(tag, element) in couplings.iter().filter(|(_, c)| c.point == point) {
        let src = &sources[tag];
        if src.is_empty() {
            continue;
        }
        for (ch, gain_index) in coupled_channels(element, is_cpe, job.tag) {
            if ch != job.index {
                continue;
            }
            if point == CouplingPoint::AfterImdct {
                apply_independent(element, gain_index, src, dest);
            } else {
                apply_dependent(element, layout, gain_index, src, dest);
            }
        }
    }
}

impl Decoder for AacDecoder {
    fn name(&self) -> &str {
        "aac"
    }

    fn send_packet(&mut self, packet: &Packet) -> AacResult<()> {
        if packet.is_empty() {
            self.flushing = true;
            return Ok(());
        }
        if self.pending.is_some() {
            return Err(AacError::NeedMoreData);
        }

        match self.decode_frame(&packet.data)? {
            FrameOutcome::Decoded(decoded) => {
                let format = self.audio_format();
                let nb_samples = decoded.pcm.samples_per_channel() as u32;
                let layout = self.channel_layout();
                let mut frame = AudioFrame::new(nb_samples, format.sample_rate, layout);
                frame.samples = decoded.pcm.samples;
                frame.pts = if packet.pts == NOPTS_VALUE {
                    self.next_pts
                } else {
                    packet.pts
                };
                self.next_pts = frame.pts + frame.duration;
                self.pending = Some(frame);
            }
            FrameOutcome::Dropped(err) => {
                warn!("AAC: 丢弃第 {} 帧: {err}", self.frames_decoded);
            }
        }
        Ok(())
    }

    fn receive_frame(&mut self) -> AacResult<AudioFrame> {
        if let Some(frame) = self.pending.take() {
            Ok(frame)
        } else if self.flushing {
            Err(AacError::Eof)
        } else {
            Err(AacError::NeedMoreData)
        }
    }

    fn flush(&mut self) {
        for state in self.states.iter_mut().chain(&mut self.cce_states).flatten() {
            state.reset();
        }
        self.noise.reset();
        self.extension.reset();
        self.pending = None;
        self.flushing = false;
    }
}
