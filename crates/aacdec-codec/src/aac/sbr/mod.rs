//! 频带复制 (SBR) 与参数立体声 (PS) 合成.
//!
//! 每个声道元素一个 [`SbrDecoder`] 状态: FIL 中的 SBR 负载先经 [`SbrDecoder::feed`]
//! 解析, 核心输出再经 [`SbrDecoder::process`] 做 32 子带 QMF 分析、高频重建与
//! 64 子带 QMF 合成, 得到 2 倍采样率的输出. 没有 SBR 数据的元素只做 QMF 上采样.
//!
//! 输出相对核心输出的延迟为 [`OUTPUT_DELAY`] 个输出样本.

pub mod bitstream;
pub mod frequency;
pub mod hf;
pub mod ps;
pub mod qmf;
mod tables;

use std::collections::HashMap;

use aacdec_core::bitreader::BitReader;
use aacdec_core::{AacError, AacResult};
use log::debug;

use super::syntax::ElementId;
use bitstream::{ChannelHistory, ParseContext, SbrFrame, SbrHeader, parse_data};
use frequency::FrequencyTables;
use hf::{Envelopes, HfChannel, HfContext, T_HF_ADJ, T_HF_GEN, dequantize};
use ps::{ParametricStereo, PsParameters};
use qmf::{ANALYSIS_BANDS, Cplx, QmfAnalysis, QmfRow, QmfSynthesis, SYNTHESIS_BANDS};

/// QMF 分析 + 合成的延迟加上 6 个时隙的 HF 对齐, 单位为输出样本
pub const OUTPUT_DELAY: usize = 578 + 6 * SYNTHESIS_BANDS;

/// PS 需要的前视时隙数
const LOOKAHEAD: usize = 6;

const EMPTY_ROW: QmfRow = [Cplx::new(0.0, 0.0); SYNTHESIS_BANDS];

/// 一个声道的 QMF 与 HF 状态
#[derive(Debug, Clone)]
struct SbrChannel {
    analysis: QmfAnalysis,
    synthesis: QmfSynthesis,
    /// 上一帧分析输出的最后 T_HF_GEN 个时隙
    w_tail: Vec<QmfRow>,
    /// 上一帧的 HF 输出, 含越过帧尾的部分
    y_prev: Vec<QmfRow>,
    hf: HfChannel,
}

impl SbrChannel {
    fn new(time_slots: usize) -> Self {
        let slots = 2 * time_slots;
        Self {
            analysis: QmfAnalysis::default(),
            synthesis: QmfSynthesis::default(),
            w_tail: vec![EMPTY_ROW; T_HF_GEN],
            y_prev: vec![EMPTY_ROW; slots + LOOKAHEAD],
            hf: HfChannel::new(time_slots),
        }
    }
}

/// 单声道元素的 PS 状态, 右声道有独立的合成滤波器组
#[derive(Debug, Clone)]
struct PsChannel {
    params: PsParameters,
    stereo: ParametricStereo,
    synthesis: QmfSynthesis,
}

/// 一个声道元素的 SBR 状态
#[derive(Debug, Clone)]
struct SbrElement {
    header: Option<SbrHeader>,
    tables: Option<FrequencyTables>,
    /// 频带表已重建, 下一帧不使用平滑历史
    reset: bool,
    /// 本帧解析出的数据, 合成后清空
    frame: Option<(SbrFrame, Vec<Envelopes>)>,
    history: Vec<ChannelHistory>,
    channels: Vec<SbrChannel>,
    ps: Option<PsChannel>,
    kx_prev: usize,
    m_prev: usize,
}

impl SbrElement {
    fn new(channels: usize, time_slots: usize, ps: bool) -> Self {
        Self {
            header: None,
            tables: None,
            reset: false,
            frame: None,
            history: vec![ChannelHistory::default(); channels],
            channels: (0..channels).map(|_| SbrChannel::new(time_slots)).collect(),
            ps: (ps && channels == 1).then(|| PsChannel {
                params: PsParameters::default(),
                stereo: ParametricStereo::new(2 * time_slots),
                synthesis: QmfSynthesis::default(),
            }),
            kx_prev: ANALYSIS_BANDS,
            m_prev: 0,
        }
    }

    /// 关闭高频重建, 之后只做 QMF 上采样, 直到收到新的 SBR 头
    fn turn_off(&mut self) {
        self.header = None;
        self.tables = None;
        self.frame = None;
    }

    fn read(&mut self, br: &mut BitReader, bits: usize, sample_rate: u32, time_slots: usize) -> AacResult<()> {
        if br.read_flag()? {
            let header = SbrHeader::parse(br)?;
            if self.header != Some(header) || self.tables.is_none() {
                if self.header.is_none_or(|old| old.spectrum_differs(&header)) {
                    self.reset = true;
                    self.history.fill(ChannelHistory::default());
                }
                self.tables = Some(FrequencyTables::derive(&header, sample_rate)?);
                debug!("SBR: 新的头部 {header:?}");
            }
            self.header = Some(header);
        }

        let (Some(header), Some(tables)) = (&self.header, &self.tables) else {
            return Ok(());
        };
        let ctx = ParseContext {
            header,
            tables,
            time_slots,
        };
        let ps = self.ps.as_mut().map(|ps| &mut ps.params);
        let frame = parse_data(br, &ctx, &self.history, ps)?;
        if br.bits_read() > bits {
            return Err(AacError::malformed(format!(
                "SBR: 负载读取越界 ({} > {bits} 位)",
                br.bits_read()
            )));
        }
        self.history = frame.channels.iter().map(|ch| ch.history()).collect();
        let envelopes = dequantize(&frame);
        self.frame = Some((frame, envelopes));
        Ok(())
    }

    fn process(&mut self, outputs: &mut [Vec<f32>], time_slots: usize) -> Option<Vec<f32>> {
        let slots = 2 * time_slots;
        let frame = self.frame.take();
        if frame.is_none() && self.header.is_some() {
            debug!("SBR: 本帧缺少 SBR 数据, 关闭高频重建");
            self.turn_off();
        }
        let active = match (&frame, &self.header, &self.tables) {
            (Some(frame), Some(header), Some(tables)) => Some((frame, header, tables)),
            _ => None,
        };
        let (kx, m) = active.map_or((ANALYSIS_BANDS, 0), |(_, _, t)| (t.kx, t.m));

        let mut right = None;
        for (ch, out) in outputs.iter_mut().enumerate() {
            let Some(state) = self.channels.get_mut(ch) else {
                break;
            };
            let t_last_prev = state.hf.t_env_last();

            let mut w = vec![EMPTY_ROW; slots];
            for (row, chunk) in w.iter_mut().zip(out.chunks_exact(ANALYSIS_BANDS)) {
                state.analysis.process(chunk, row);
            }

            // X_low: 前 T_HF_GEN 行来自上一帧
            let mut x_low = vec![EMPTY_ROW; slots + T_HF_GEN];
            for (dst, src) in x_low.iter_mut().zip(&state.w_tail) {
                dst[..self.kx_prev].copy_from_slice(&src[..self.kx_prev]);
            }
            for (dst, src) in x_low[T_HF_GEN..].iter_mut().zip(&w) {
                dst[..kx].copy_from_slice(&src[..kx]);
            }
            state.w_tail.copy_from_slice(&w[slots - T_HF_GEN..]);

            let mut y = vec![EMPTY_ROW; slots + LOOKAHEAD];
            match active {
                Some(((frame, envelopes), header, tables)) => {
                    let ctx = HfContext {
                        header,
                        tables,
                        reset: self.reset,
                    };
                    state.hf.process(&ctx, &frame.channels[ch], &envelopes[ch], &x_low, &mut y);
                }
                None => state.hf.bypass(time_slots),
            }

            // 拼接低频与高频; 上一帧越过帧尾的 HF 先输出
            let i_temp = (2 * t_last_prev).saturating_sub(slots);
            let mut x = vec![EMPTY_ROW; slots + LOOKAHEAD];
            for (i, row) in x.iter_mut().enumerate() {
                let low = &x_low[i + T_HF_ADJ];
                if i < i_temp {
                    let (k0, k1) = (self.kx_prev, self.kx_prev + self.m_prev);
                    row[..k0].copy_from_slice(&low[..k0]);
                    row[k0..k1].copy_from_slice(&state.y_prev[i + slots][k0..k1]);
                } else {
                    row[..kx].copy_from_slice(&low[..kx]);
                    if i < slots {
                        row[kx..kx + m].copy_from_slice(&y[i][kx..kx + m]);
                    }
                }
            }
            state.y_prev = y;

            if let Some(ps) = self.ps.as_mut() {
                let mut x_right = x.clone();
                if ps.params.started() {
                    ps.stereo.apply(&ps.params, &mut x, &mut x_right, kx + m);
                }
                let mut pcm = vec![0.0f32; slots * SYNTHESIS_BANDS];
                synthesize(&mut ps.synthesis, &x_right[..slots], &mut pcm);
                right = Some(pcm);
            }
            let mut pcm = vec![0.0f32; slots * SYNTHESIS_BANDS];
            synthesize(&mut state.synthesis, &x[..slots], &mut pcm);
            *out = pcm;
        }

        if active.is_some() {
            self.reset = false;
        }
        self.kx_prev = kx;
        self.m_prev = m;
        right
    }
}

fn synthesize(synthesis: &mut QmfSynthesis, rows: &[QmfRow], out: &mut [f32]) {
    for (row, chunk) in rows.iter().zip(out.chunks_exact_mut(SYNTHESIS_BANDS)) {
        synthesis.process(row, chunk);
    }
}

/// 按 (元素类型, 标签) 索引的 SBR 状态
#[derive(Debug, Clone)]
pub struct SbrDecoder {
    /// 输出 (2 倍核心) 采样率
    sample_rate: u32,
    /// 每帧 SBR 时隙数
    time_slots: usize,
    /// 单声道元素是否合成 PS 右声道
    parametric_stereo: bool,
    elements: HashMap<(u8, u8), SbrElement>,
}

impl SbrDecoder {
    pub fn new(core_rate: u32, frame_length: usize, parametric_stereo: bool) -> Self {
        Self {
            sample_rate: 2 * core_rate,
            time_slots: frame_length / (2 * ANALYSIS_BANDS),
            parametric_stereo,
            elements: HashMap::new(),
        }
    }

    fn element(&mut self, kind: ElementId, tag: u8, channels: usize) -> &mut SbrElement {
        let (time_slots, ps) = (self.time_slots, self.parametric_stereo && kind == ElementId::Sce);
        let element = self
            .elements
            .entry((kind as u8, tag))
            .or_insert_with(|| SbrElement::new(channels, time_slots, ps));
        if element.channels.len() != channels {
            *element = SbrElement::new(channels, time_slots, ps);
        }
        element
    }

    /// 解析属于某声道元素的 SBR 负载
    ///
    /// `data` 不含 CRC, 共 `bits` 位. 负载损坏时该元素关闭高频重建,
    /// 本帧仍按 QMF 上采样输出.
    pub fn feed(&mut self, kind: ElementId, tag: u8, channels: usize, data: &[u8], bits: usize) {
        let (sample_rate, time_slots) = (self.sample_rate, self.time_slots);
        let element = self.element(kind, tag, channels);
        let mut br = BitReader::new(data);
        if let Err(err) = element.read(&mut br, bits, sample_rate, time_slots) {
            debug!("SBR: 元素 {kind:?}#{tag} 的负载无效: {err}");
            element.turn_off();
        }
    }

    /// 把一个声道元素的核心输出 (每声道 N 个样本) 替换为 2N 个样本
    ///
    /// 单声道元素启用 PS 时返回右声道.
    pub fn process(&mut self, kind: ElementId, tag: u8, outputs: &mut [Vec<f32>]) -> Option<Vec<f32>> {
        let time_slots = self.time_slots;
        self.element(kind, tag, outputs.len()).process(outputs, time_slots)
    }

    /// 某元素当前生效的 SBR 头
    pub fn header(&self, kind: ElementId, tag: u8) -> Option<&SbrHeader> {
        self.elements.get(&(kind as u8, tag))?.header.as_ref()
    }

    pub fn reset(&mut self) {
        self.elements.clear();
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use aacdec_core::bitwriter::BitWriter;
    use bitstream::tests::{default_setup, write_flat_single};
    use std::f64::consts::PI;

    fn write_header(bw: &mut BitWriter, header: &SbrHeader) {
        bw.write_flag(true);
        bw.write_flag(header.amp_res);
        bw.write_bits(u32::from(header.start_freq), 4);
        bw.write_bits(u32::from(header.stop_freq), 4);
        bw.write_bits(u32::from(header.xover_band), 3);
        bw.write_bits(0, 2);
        bw.write_flag(false);
        bw.write_flag(false);
    }

    /// 带头部的单声道 SBR 负载, 包络值 `env`, 噪声底 `noise`
    pub(crate) fn payload(env: u32, noise: u32) -> (Vec<u8>, usize) {
        let (header, tables) = default_setup();
        let mut bw = BitWriter::new();
        write_header(&mut bw, &header);
        write_flat_single(&mut bw, &tables, env, noise);
        let bits = bw.bits_written();
        (bw.finish(), bits)
    }

    fn sine(freq: f64, rate: f64, len: usize, offset: usize) -> Vec<f32> {
        (0..len)
            .map(|n| (8000.0 * (2.0 * PI * freq * (n + offset) as f64 / rate).sin()) as f32)
            .collect()
    }

    /// 22.05 kHz 核心: 输出 44.1 kHz
    fn decoder() -> SbrDecoder {
        SbrDecoder::new(22050, 1024, false)
    }

    #[test]
    fn test_无数据时上采样保持正弦() {
        let mut sbr = decoder();
        let mut output = Vec::new();
        for frame in 0..4 {
            let mut channels = vec![sine(1000.0, 22050.0, 1024, frame * 1024)];
            assert!(sbr.process(ElementId::Sce, 0, &mut channels).is_none());
            assert_eq!(channels[0].len(), 2048);
            output.extend_from_slice(&channels[0]);
        }
        for n in 4096..8192 {
            let t = n as f64 - OUTPUT_DELAY as f64;
            let expected = 8000.0 * (2.0 * PI * 1000.0 * t / 44100.0).sin();
            assert!((f64::from(output[n]) - expected).abs() < 30.0, "n={n}: {} vs {expected}", output[n]);
        }
    }

    /// 输出中 [lo, hi) Hz 的能量 (逐点 DFT)
    fn band_energy(pcm: &[f32], lo: f64, hi: f64) -> f64 {
        let n = pcm.len() as f64;
        let mut energy = 0.0;
        let mut f = lo;
        while f < hi {
            let (mut re, mut im) = (0.0, 0.0);
            for (i, &v) in pcm.iter().enumerate() {
                let w = 2.0 * PI * f * i as f64 / 44100.0;
                re += f64::from(v) * w.cos();
                im -= f64::from(v) * w.sin();
            }
            energy += (re * re + im * im) / n;
            f += 100.0;
        }
        energy
    }

    /// 确定性的宽带噪声
    fn noise(len: usize, seed: u32) -> Vec<f32> {
        let mut state = seed;
        (0..len)
            .map(|_| {
                state = state.wrapping_mul(1_103_515_245).wrapping_add(12345);
                ((state >> 16) as f32 / 32768.0 - 1.0) * 2000.0
            })
            .collect()
    }

    #[test]
    fn test_sbr_重建高频() {
        let (header, tables) = default_setup();
        let sbr_hi = (tables.kx + tables.m) as f64 * 44100.0 / 128.0;
        assert!(sbr_hi > 14000.0);

        let mut sbr = decoder();
        let mut plain = decoder();
        let (data, bits) = payload(40, 30);
        let (mut last, mut last_plain) = (Vec::new(), Vec::new());
        for frame in 0..3 {
            sbr.feed(ElementId::Sce, 0, 1, &data, bits);
            let mut channels = vec![noise(1024, frame)];
            sbr.process(ElementId::Sce, 0, &mut channels);
            last = channels.remove(0);

            let mut channels = vec![noise(1024, frame)];
            plain.process(ElementId::Sce, 0, &mut channels);
            last_plain = channels.remove(0);
        }
        assert_eq!(sbr.header(ElementId::Sce, 0), Some(&header));

        // 核心带宽 11025 Hz 以上只有重建的高频
        let high = band_energy(&last[..1024], 12000.0, sbr_hi - 400.0);
        let gap = band_energy(&last[..1024], sbr_hi + 1000.0, 22000.0);
        let plain_high = band_energy(&last_plain[..1024], 12000.0, sbr_hi - 400.0);
        assert!(high > 1000.0 * gap.max(1.0), "high={high} gap={gap}");
        assert!(high > 1000.0 * plain_high.max(1.0), "high={high} plain={plain_high}");
    }

    #[test]
    fn test_缺少数据时关闭() {
        let mut sbr = decoder();
        let (data, bits) = payload(40, 30);
        sbr.feed(ElementId::Sce, 0, 1, &data, bits);
        let mut channels = vec![vec![0.0f32; 1024]];
        sbr.process(ElementId::Sce, 0, &mut channels);
        assert!(sbr.header(ElementId::Sce, 0).is_some());

        let mut channels = vec![vec![0.0f32; 1024]];
        sbr.process(ElementId::Sce, 0, &mut channels);
        assert!(sbr.header(ElementId::Sce, 0).is_none());
        assert_eq!(channels[0].len(), 2048);
    }

    #[test]
    fn test_损坏负载关闭重建() {
        let mut sbr = decoder();
        let (data, bits) = payload(40, 30);
        sbr.feed(ElementId::Sce, 0, 1, &data, bits);
        assert!(sbr.header(ElementId::Sce, 0).is_some());
        // 声明长度短于实际读取
        sbr.feed(ElementId::Sce, 0, 1, &data, 20);
        assert!(sbr.header(ElementId::Sce, 0).is_none());
    }

    #[test]
    fn test_ps_未启动时右声道等于左声道() {
        let mut sbr = SbrDecoder::new(22050, 1024, true);
        let mut channels = vec![sine(500.0, 22050.0, 1024, 0)];
        let right = sbr.process(ElementId::Sce, 0, &mut channels).unwrap();
        assert_eq!(right, channels[0]);
    }

    #[test]
    fn test_960_帧长() {
        let mut sbr = SbrDecoder::new(24000, 960, false);
        let mut channels = vec![vec![100.0f32; 960], vec![-100.0f32; 960]];
        assert!(sbr.process(ElementId::Cpe, 0, &mut channels).is_none());
        assert_eq!(channels[0].len(), 1920);
        assert_eq!(channels[1].len(), 1920);
    }
}
