//! SBR 高频重建 (ISO/IEC 14496-3 4.6.18.6, 4.6.18.7).
//!
//! 低频 QMF 子带经二阶线性预测去色后复制到高频 (HF 生成), 再按传输的
//! 包络、噪声底与附加正弦调整能量 (HF 调整). 跨帧状态保存在 [`HfChannel`].

use std::sync::OnceLock;

use super::bitstream::{ChannelData, MAX_NOISE_BANDS, SbrFrame, SbrHeader};
use super::frequency::FrequencyTables;
use super::qmf::{Cplx, QmfRow, SYNTHESIS_BANDS};

/// X_low 在当前帧前补的历史时隙数
pub const T_HF_GEN: usize = 8;
/// 包络时间边界相对 X_low 的偏移
pub const T_HF_ADJ: usize = 2;

const NOISE_FLOOR_OFFSET: f32 = 6.0;
const MAX_ENERGY: f32 = 1e20;
const LIM_GAIN: [f32; 4] = [0.707_95, 1.0, 1.412_54, 1e10];
const MAX_GAIN: f32 = 1e5;
const MAX_BOOST: f32 = 1.584_893_2;
const CHIRP: [f32; 4] = [0.0, 0.75, 0.9, 0.98];
const SMOOTH_LEN: usize = 4;
const H_SMOOTH: [f32; SMOOTH_LEN + 1] = [
    0.333_333_33,
    0.301_502_83,
    0.218_169_5,
    0.115_163_83,
    0.031_830_5,
];
const NOISE_TABLE_LEN: usize = 512;

/// 噪声表: 确定性伪随机复数序列, 平均能量为 1
fn noise_table() -> &'static [Cplx] {
    static TABLE: OnceLock<Vec<Cplx>> = OnceLock::new();
    TABLE.get_or_init(|| {
        let mut seed = 0x1234_5678u32;
        let mut next = || {
            seed = seed.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
            (seed >> 8) as f32 / (1u32 << 23) as f32 - 1.0
        };
        let mut table: Vec<Cplx> = (0..NOISE_TABLE_LEN)
            .map(|_| Cplx::new(next(), next()))
            .collect();
        let energy = table.iter().map(|v| v.norm_sqr()).sum::<f32>() / NOISE_TABLE_LEN as f32;
        let scale = energy.sqrt().recip();
        for v in &mut table {
            *v *= scale;
        }
        table
    })
}

/// 一个声道反量化后的包络能量与噪声底
#[derive(Debug, Clone, Default)]
pub struct Envelopes {
    pub env: Vec<Vec<f32>>,
    pub noise: Vec<Vec<f32>>,
}

/// 包络与噪声底反量化; 耦合声道对由电平与平衡值还原左右声道
pub fn dequantize(frame: &SbrFrame) -> Vec<Envelopes> {
    if frame.coupled && frame.channels.len() == 2 {
        let (left, right) = (&frame.channels[0], &frame.channels[1]);
        let (alpha, pan) = if left.grid.amp_res { (1.0, 12.0) } else { (0.5, 24.0) };
        let mut out = [Envelopes::default(), Envelopes::default()];
        for (l, r) in left.env.iter().zip(&right.env) {
            let (mut el, mut er) = (Vec::with_capacity(l.len()), Vec::with_capacity(l.len()));
            for (&ql, &qr) in l.iter().zip(r) {
                let level = clamp_energy((alpha * ql as f32 + 7.0).exp2());
                let ratio = (alpha * (pan - qr as f32)).exp2();
                let e = level / (1.0 + ratio);
                el.push(e);
                er.push(e * ratio);
            }
            out[0].env.push(el);
            out[1].env.push(er);
        }
        for (l, r) in left.noise.iter().zip(&right.noise) {
            let (mut ql_out, mut qr_out) = (Vec::with_capacity(l.len()), Vec::with_capacity(l.len()));
            for (&ql, &qr) in l.iter().zip(r) {
                let level = (NOISE_FLOOR_OFFSET + 1.0 - ql as f32).exp2();
                let ratio = (12.0 - qr as f32).exp2();
                let q = level / (1.0 + ratio);
                ql_out.push(q);
                qr_out.push(q * ratio);
            }
            out[0].noise.push(ql_out);
            out[1].noise.push(qr_out);
        }
        return out.into();
    }

    frame
        .channels
        .iter()
        .map(|ch| {
            let alpha = if ch.grid.amp_res { 1.0 } else { 0.5 };
            Envelopes {
                env: ch
                    .env
                    .iter()
                    .map(|row| {
                        row.iter()
                            .map(|&q| clamp_energy((alpha * q as f32 + 6.0).exp2()))
                            .collect()
                    })
                    .collect(),
                noise: ch
                    .noise
                    .iter()
                    .map(|row| row.iter().map(|&q| (NOISE_FLOOR_OFFSET - q as f32).exp2()).collect())
                    .collect(),
            }
        })
        .collect()
}

fn clamp_energy(e: f32) -> f32 {
    if e > MAX_ENERGY { 0.0 } else { e }
}

/// 二阶复数线性预测系数 (α0, α1); `x` 为一个子带的 X_low
fn predict(x: &[Cplx], slots: usize) -> (Cplx, Cplx) {
    let zero = Cplx::default();
    let phi = |i: usize, j: usize| -> Cplx {
        (0..slots + 6)
            .map(|n| x[n + T_HF_ADJ - i] * x[n + T_HF_ADJ - j].conj())
            .sum()
    };
    let (p01, p02, p12) = (phi(0, 1), phi(0, 2), phi(1, 2));
    let p11 = phi(1, 1).re;
    let p22 = phi(2, 2).re;

    let d = p22 * p11 - p12.norm_sqr() / (1.0 + 1e-6);
    let a1 = if d == 0.0 { zero } else { (p01 * p12 - p02 * p11) / d };
    let a0 = if p11 == 0.0 { zero } else { -(p01 + a1 * p12.conj()) / p11 };
    if a0.norm_sqr() >= 16.0 || a1.norm_sqr() >= 16.0 {
        (zero, zero)
    } else {
        (a0, a1)
    }
}

/// 按本帧与上一帧的逆滤波模式更新带宽扩展系数
fn chirp(bw: &mut [f32; MAX_NOISE_BANDS], invf: &[u8; MAX_NOISE_BANDS], invf_prev: &[u8; MAX_NOISE_BANDS], n_q: usize) {
    for i in 0..n_q {
        let target = if invf[i] + invf_prev[i] == 1 {
            0.6
        } else {
            CHIRP[usize::from(invf[i] & 3)]
        };
        let new = if target < bw[i] {
            0.75 * target + 0.25 * bw[i]
        } else {
            0.906_25 * target + 0.093_75 * bw[i]
        };
        bw[i] = if new < 0.015_625 { 0.0 } else { new };
    }
}

/// 一个包络内逐 SBR 子带的调整参数
#[derive(Debug, Clone)]
struct Adjust {
    gain: Vec<f32>,
    q_m: Vec<f32>,
    s_m: Vec<f32>,
}

/// HF 重建所需的每帧上下文
pub struct HfContext<'a> {
    pub header: &'a SbrHeader,
    pub tables: &'a FrequencyTables,
    /// 频带表刚刚重建, 平滑历史不可用
    pub reset: bool,
}

/// 一个声道跨帧的 HF 状态
#[derive(Debug, Clone)]
pub struct HfChannel {
    bw: [f32; MAX_NOISE_BANDS],
    /// 上一帧最后一个包络的结束边界 (时隙)
    t_env_last: usize,
    /// 上一帧瞬态落在帧尾, 本帧首个包络视为瞬态
    transient_at_end: bool,
    /// 上一帧最后一个包络的附加正弦位置, 按 SBR 子带
    sine_prev: [bool; SYNTHESIS_BANDS],
    g_hist: [[f32; SYNTHESIS_BANDS]; SMOOTH_LEN],
    q_hist: [[f32; SYNTHESIS_BANDS]; SMOOTH_LEN],
    index_noise: usize,
    index_sine: usize,
}

impl HfChannel {
    pub fn new(time_slots: usize) -> Self {
        Self {
            bw: [0.0; MAX_NOISE_BANDS],
            t_env_last: time_slots,
            transient_at_end: false,
            sine_prev: [false; SYNTHESIS_BANDS],
            g_hist: [[0.0; SYNTHESIS_BANDS]; SMOOTH_LEN],
            q_hist: [[0.0; SYNTHESIS_BANDS]; SMOOTH_LEN],
            index_noise: 0,
            index_sine: 0,
        }
    }

    pub fn t_env_last(&self) -> usize {
        self.t_env_last
    }

    /// 无 SBR 数据的帧: 只保留时间对齐信息
    pub fn bypass(&mut self, time_slots: usize) {
        self.t_env_last = time_slots;
        self.transient_at_end = false;
    }

    /// 由 `x_low` (slots + 8 个时隙) 生成高频并写入 `y` 的 SBR 子带
    pub fn process(
        &mut self,
        ctx: &HfContext,
        data: &ChannelData,
        envelopes: &Envelopes,
        x_low: &[QmfRow],
        y: &mut [QmfRow],
    ) {
        let tables = ctx.tables;
        let (kx, m) = (tables.kx, tables.m);
        let grid = &data.grid;
        let slots = x_low.len() - T_HF_GEN;
        let num_env = grid.num_env();
        let at_end = self.transient_at_end;
        let transient = |e: usize| grid.transient == Some(e) || (e == 0 && at_end);

        chirp(&mut self.bw, &data.invf, &data.invf_prev, tables.n_noise());
        let x_high = self.generate(tables, grid.t_env[0], grid.end(), x_low, slots);

        // 映射、能量估计与增益
        let mut adjust = Vec::with_capacity(num_env);
        let mut sine = [false; SYNTHESIS_BANDS];
        for e in 0..num_env {
            let bands = tables.bands(grid.freq_res[e]);
            let mut e_orig = vec![0.0f32; m];
            for (b, w) in bands.windows(2).enumerate() {
                e_orig[w[0] - kx..w[1] - kx].fill(envelopes.env[e][b]);
            }
            let floor = usize::from(grid.num_noise() > 1 && grid.t_env[e] >= grid.t_noise[1]);
            let mut q_orig = vec![0.0f32; m];
            for (b, w) in tables.noise.windows(2).enumerate() {
                q_orig[w[0] - kx..w[1] - kx].fill(envelopes.noise[floor][b]);
            }

            sine = [false; SYNTHESIS_BANDS];
            for (b, w) in tables.high.windows(2).enumerate() {
                let mid = (w[0] + w[1]) / 2 - kx;
                let active = grid.transient.is_none_or(|l_a| e >= l_a) || self.sine_prev[mid];
                sine[mid] = data.harmonics[b] && active;
            }
            let mut s_band = vec![false; m];
            for w in bands.windows(2) {
                let present = sine[w[0] - kx..w[1] - kx].iter().any(|&s| s);
                s_band[w[0] - kx..w[1] - kx].fill(present);
            }

            let e_curr = estimate(ctx.header.interpol_freq, bands, kx, &x_high, grid.t_env[e], grid.t_env[e + 1]);
            let delta = !transient(e);
            adjust.push(gains(ctx.header, tables, &e_orig, &q_orig, &e_curr, &sine, &s_band, delta));
        }
        self.sine_prev = sine;

        self.assemble(ctx, data, &adjust, &x_high, y, transient);

        self.t_env_last = grid.end();
        self.transient_at_end = grid.transient == Some(num_env);
    }

    /// 逆滤波 + 复制, 返回 X_high[k - kx][时隙]
    fn generate(&self, tables: &FrequencyTables, t_start: usize, t_end: usize, x_low: &[QmfRow], slots: usize) -> Vec<Vec<Cplx>> {
        let (kx, m) = (tables.kx, tables.m);
        let rows = x_low.len();
        let mut x_high = vec![vec![Cplx::default(); rows]; m];
        let mut columns: Vec<Option<(Vec<Cplx>, Cplx, Cplx)>> = vec![None; kx];

        let mut k = kx;
        for patch in &tables.patches {
            for p in patch.source..patch.source + patch.len {
                if k >= kx + m {
                    break;
                }
                let (col, a0, a1) = columns[p].get_or_insert_with(|| {
                    let col: Vec<Cplx> = x_low.iter().map(|row| row[p]).collect();
                    let (a0, a1) = predict(&col, slots);
                    (col, a0, a1)
                });
                let g = tables
                    .noise
                    .partition_point(|&b| b <= k)
                    .saturating_sub(1)
                    .min(tables.n_noise() - 1);
                let bw = self.bw[g];
                let (c0, c1) = (*a0 * bw, *a1 * (bw * bw));
                let out = &mut x_high[k - kx];
                for i in 2 * t_start + T_HF_ADJ..2 * t_end + T_HF_ADJ {
                    out[i] = col[i] + col[i - 1] * c0 + col[i - 2] * c1;
                }
                k += 1;
            }
        }
        x_high
    }

    fn assemble(
        &mut self,
        ctx: &HfContext,
        data: &ChannelData,
        adjust: &[Adjust],
        x_high: &[Vec<Cplx>],
        y: &mut [QmfRow],
        transient: impl Fn(usize) -> bool,
    ) {
        let (kx, m) = (ctx.tables.kx, ctx.tables.m);
        let grid = &data.grid;
        let smoothing = !ctx.header.smoothing_mode;
        let t0 = 2 * grid.t_env[0];
        let t_end = 2 * grid.end();

        // 行 i + SMOOTH_LEN 对应时隙 i, 前 SMOOTH_LEN 行为上一帧尾部
        let mut g_temp = vec![[0.0f32; SYNTHESIS_BANDS]; t_end + SMOOTH_LEN];
        let mut q_temp = g_temp.clone();
        for j in 0..SMOOTH_LEN {
            if ctx.reset {
                g_temp[t0 + j][..m].copy_from_slice(&adjust[0].gain);
                q_temp[t0 + j][..m].copy_from_slice(&adjust[0].q_m);
            } else {
                g_temp[t0 + j] = self.g_hist[j];
                q_temp[t0 + j] = self.q_hist[j];
            }
        }
        for (e, adj) in adjust.iter().enumerate() {
            for i in 2 * grid.t_env[e]..2 * grid.t_env[e + 1] {
                g_temp[i + SMOOTH_LEN][..m].copy_from_slice(&adj.gain);
                q_temp[i + SMOOTH_LEN][..m].copy_from_slice(&adj.q_m);
            }
        }

        let noise = noise_table();
        let mut index_noise = self.index_noise;
        let mut index_sine = self.index_sine;
        for (e, adj) in adjust.iter().enumerate() {
            let is_transient = transient(e);
            for i in 2 * grid.t_env[e]..2 * grid.t_env[e + 1] {
                let (mut g_filt, mut q_filt) = ([0.0f32; SYNTHESIS_BANDS], [0.0f32; SYNTHESIS_BANDS]);
                if smoothing && !is_transient {
                    for (j, h) in H_SMOOTH.iter().enumerate() {
                        let row = i + SMOOTH_LEN - j;
                        for b in 0..m {
                            g_filt[b] += g_temp[row][b] * h;
                            q_filt[b] += q_temp[row][b] * h;
                        }
                    }
                } else {
                    g_filt[..m].copy_from_slice(&adj.gain);
                    q_filt[..m].copy_from_slice(&adj.q_m);
                }

                let row = &mut y[i];
                for b in 0..m {
                    let k = kx + b;
                    let mut v = x_high[b][i + T_HF_ADJ] * g_filt[b];
                    let idx = (index_noise + b + 1) & (NOISE_TABLE_LEN - 1);
                    let s = adj.s_m[b];
                    if s != 0.0 {
                        let sign = if (k & 1) == 0 { s } else { -s };
                        v += match index_sine {
                            0 => Cplx::new(s, 0.0),
                            1 => Cplx::new(0.0, sign),
                            2 => Cplx::new(-s, 0.0),
                            _ => Cplx::new(0.0, -sign),
                        };
                    } else if !is_transient {
                        v += noise[idx] * q_filt[b];
                    }
                    row[k] = v;
                }
                index_noise = (index_noise + m) & (NOISE_TABLE_LEN - 1);
                index_sine = (index_sine + 1) & 3;
            }
        }
        self.index_noise = index_noise;
        self.index_sine = index_sine;

        for j in 0..SMOOTH_LEN {
            self.g_hist[j] = g_temp[t_end + j];
            self.q_hist[j] = q_temp[t_end + j];
        }
    }
}

/// 当前 HF 能量, 按子带或按包络频带平均
fn estimate(interpol_freq: bool, bands: &[usize], kx: usize, x_high: &[Vec<Cplx>], t_start: usize, t_stop: usize) -> Vec<f32> {
    let lo = 2 * t_start + T_HF_ADJ;
    let hi = 2 * t_stop + T_HF_ADJ;
    let energy = |b: usize| x_high[b][lo..hi].iter().map(|v| v.norm_sqr()).sum::<f32>();
    let span = (hi - lo) as f32;
    let mut e_curr = vec![0.0f32; x_high.len()];
    if interpol_freq {
        for (b, e) in e_curr.iter_mut().enumerate() {
            *e = energy(b) / span;
        }
    } else {
        for w in bands.windows(2) {
            let range = w[0] - kx..w[1] - kx;
            let mean = range.clone().map(energy).sum::<f32>() / (span * range.len() as f32);
            e_curr[range].fill(mean);
        }
    }
    e_curr
}

/// 逐限幅频带计算增益、噪声与正弦电平
#[allow(clippy::too_many_arguments)]
fn gains(
    header: &SbrHeader,
    tables: &FrequencyTables,
    e_orig: &[f32],
    q_orig: &[f32],
    e_curr: &[f32],
    sine: &[bool],
    s_band: &[bool],
    delta: bool,
) -> Adjust {
    let m = e_orig.len();
    let kx = tables.kx;
    let mut adj = Adjust {
        gain: vec![0.0; m],
        q_m: vec![0.0; m],
        s_m: vec![0.0; m],
    };
    let noise_weight = if delta { 1.0 } else { 0.0 };
    let lim_gain = LIM_GAIN[usize::from(header.limiter_gains & 3)];

    for w in tables.limiter.windows(2) {
        let range = w[0] - kx..w[1] - kx;
        for b in range.clone() {
            let temp = e_orig[b] / (1.0 + q_orig[b]);
            adj.q_m[b] = (temp * q_orig[b]).sqrt();
            adj.s_m[b] = if sine[b] { temp.sqrt() } else { 0.0 };
            let gain = if s_band[b] {
                e_orig[b] * q_orig[b] / ((1.0 + e_curr[b]) * (1.0 + q_orig[b]))
            } else {
                e_orig[b] / ((1.0 + e_curr[b]) * (1.0 + q_orig[b] * noise_weight))
            };
            adj.gain[b] = gain.sqrt() + f32::MIN_POSITIVE;
        }

        let target: f32 = e_orig[range.clone()].iter().sum();
        let current: f32 = e_curr[range.clone()].iter().sum();
        let gain_max = (lim_gain * ((f32::EPSILON + target) / (f32::EPSILON + current)).sqrt()).min(MAX_GAIN);
        for b in range.clone() {
            adj.q_m[b] = adj.q_m[b].min(adj.q_m[b] * gain_max / adj.gain[b]);
            adj.gain[b] = adj.gain[b].min(gain_max);
        }

        let achieved: f32 = range
            .clone()
            .map(|b| {
                let noise = if delta && adj.s_m[b] == 0.0 { adj.q_m[b] * adj.q_m[b] } else { 0.0 };
                e_curr[b] * adj.gain[b] * adj.gain[b] + adj.s_m[b] * adj.s_m[b] + noise
            })
            .sum();
        let boost = ((f32::EPSILON + target) / (f32::EPSILON + achieved)).sqrt().min(MAX_BOOST);
        for b in range {
            adj.gain[b] *= boost;
            adj.q_m[b] *= boost;
            adj.s_m[b] *= boost;
        }
    }
    adj
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aac::sbr::bitstream::tests::default_setup;
    use crate::aac::sbr::bitstream::{FrameClass, Grid};

    fn flat_data(tables: &FrequencyTables, env: i32, noise: i32) -> ChannelData {
        ChannelData {
            grid: Grid {
                class: FrameClass::FixFix,
                t_env: vec![0, 16],
                t_noise: vec![0, 16],
                freq_res: vec![true],
                amp_res: false,
                transient: None,
            },
            invf: [0; MAX_NOISE_BANDS],
            invf_prev: [0; MAX_NOISE_BANDS],
            env: vec![vec![env; tables.n_high()]],
            noise: vec![vec![noise; tables.n_noise()]],
            harmonics: vec![false; tables.n_high()],
        }
    }

    /// 幅度恒为 100 的旋转相位输入
    fn rotating_low(slots: usize) -> Vec<QmfRow> {
        (0..slots + T_HF_GEN)
            .map(|n| {
                std::array::from_fn(|k| {
                    let phase = 0.4 * n as f32 + 1.3 * k as f32;
                    Cplx::new(phase.cos(), phase.sin()) * 100.0
                })
            })
            .collect()
    }

    #[test]
    fn test_单声道反量化() {
        let (_, tables) = default_setup();
        let frame = SbrFrame {
            channels: vec![flat_data(&tables, 40, 30)],
            coupled: false,
        };
        let env = dequantize(&frame);
        assert!((env[0].env[0][0] / 2f32.powi(26) - 1.0).abs() < 1e-6);
        assert!((env[0].noise[0][0] / 2f32.powi(-24) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_耦合声道平衡居中() {
        let (_, tables) = default_setup();
        let left = flat_data(&tables, 20, 10);
        let right = flat_data(&tables, 24, 12);
        let frame = SbrFrame {
            channels: vec![left, right],
            coupled: true,
        };
        let env = dequantize(&frame);
        // 平衡值等于声像偏移时左右均分
        let expected = 2f32.powi(17) / 2.0;
        assert!((env[0].env[0][0] - expected).abs() < 1.0);
        assert!((env[1].env[0][0] - expected).abs() < 1.0);
        let expected = 2f32.powi(-3) / 2.0;
        assert!((env[0].noise[0][0] - expected).abs() < 1e-6);
        assert!((env[1].noise[0][0] - expected).abs() < 1e-6);
    }

    #[test]
    fn test_二阶预测还原双音() {
        let (z1, z2) = (Cplx::from_polar(1.0, 0.3), Cplx::from_polar(1.0, -1.1));
        let x: Vec<Cplx> = (0..40).map(|n| z1.powi(n) + z2.powi(n)).collect();
        let (a0, a1) = predict(&x, 32);
        assert!((a0 + z1 + z2).norm() < 1e-2, "{a0}");
        assert!((a1 - z1 * z2).norm() < 1e-2, "{a1}");
    }

    #[test]
    fn test_带宽扩展系数平滑() {
        let mut bw = [0.0; MAX_NOISE_BANDS];
        chirp(&mut bw, &[3; 5], &[3; 5], 2);
        assert!((bw[0] - 0.888_125).abs() < 1e-6);
        assert_eq!(bw[2], 0.0);
        chirp(&mut bw, &[0; 5], &[1; 5], 2);
        assert!((bw[1] - (0.75 * 0.6 + 0.25 * 0.888_125)).abs() < 1e-6);
    }

    #[test]
    fn test_包络能量达到目标() {
        let (header, tables) = default_setup();
        let data = flat_data(&tables, 40, 30);
        let frame = SbrFrame {
            channels: vec![data.clone()],
            coupled: false,
        };
        let envelopes = dequantize(&frame);
        let ctx = HfContext {
            header: &header,
            tables: &tables,
            reset: true,
        };
        let mut hf = HfChannel::new(16);
        let x_low = rotating_low(32);
        let mut y = vec![[Cplx::default(); SYNTHESIS_BANDS]; 38];
        hf.process(&ctx, &data, &envelopes[0], &x_low, &mut y);

        let target = 2f32.powi(26);
        for k in tables.kx..tables.kx + tables.m {
            let mean = y[..32].iter().map(|row| row[k].norm_sqr()).sum::<f32>() / 32.0;
            assert!((mean / target - 1.0).abs() < 0.01, "k={k}: {mean}");
        }
        // 低频不动
        assert_eq!(y[0][0], Cplx::default());
        assert_eq!(hf.t_env_last(), 16);
    }

    #[test]
    fn test_附加正弦落在频带中点() {
        let (header, tables) = default_setup();
        let mut data = flat_data(&tables, 40, 30);
        let band = 3;
        data.harmonics[band] = true;
        let frame = SbrFrame {
            channels: vec![data.clone()],
            coupled: false,
        };
        let envelopes = dequantize(&frame);
        let ctx = HfContext {
            header: &header,
            tables: &tables,
            reset: true,
        };
        let mut hf = HfChannel::new(16);
        let mut y = vec![[Cplx::default(); SYNTHESIS_BANDS]; 38];
        hf.process(&ctx, &data, &envelopes[0], &rotating_low(32), &mut y);

        let target = 2f32.powi(26);
        let (lo, hi) = (tables.high[band], tables.high[band + 1]);
        let mid = (lo + hi) / 2;
        for k in lo..hi {
            let mean = y[..32].iter().map(|row| row[k].norm_sqr()).sum::<f32>() / 32.0;
            if k == mid {
                assert!(mean > 0.9 * target && mean < 2.6 * target, "{mean}");
            } else {
                assert!(mean < 0.01 * target, "k={k}: {mean}");
            }
        }
    }

    #[test]
    fn test_噪声表能量归一() {
        let table = noise_table();
        assert_eq!(table.len(), NOISE_TABLE_LEN);
        let energy = table.iter().map(|v| v.norm_sqr()).sum::<f32>() / NOISE_TABLE_LEN as f32;
        assert!((energy - 1.0).abs() < 1e-4);
    }
}
