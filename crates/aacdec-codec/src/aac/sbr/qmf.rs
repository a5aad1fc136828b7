//! SBR 复数 QMF 滤波器组: 32 子带分析, 64 子带合成.
//!
//! 原型为 640 点 Kaiser 加窗 sinc 低通, 每 128 点变号一次, 幅度归一到
//! 分析 → 合成直通增益为 1. 整条链路的延迟为 578 个输出样本.

use std::f64::consts::PI;
use std::sync::OnceLock;

use rustfft::num_complex::Complex;

use crate::aac::filterbank::bessel_i0;

pub type Cplx = Complex<f32>;

/// 分析子带数
pub const ANALYSIS_BANDS: usize = 32;
/// 合成子带数
pub const SYNTHESIS_BANDS: usize = 64;

/// 一个 QMF 时隙的全部子带
pub type QmfRow = [Cplx; SYNTHESIS_BANDS];

const PROTO_LEN: usize = 640;
const KAISER_BETA: f64 = 9.0;
/// 截止角频率 (单位 π/128), 使 π/128 处响应为 -3 dB
const CUTOFF: f64 = 1.210_405_543_754_309_5;

struct QmfTables {
    window: Vec<f32>,
    /// [k * 64 + n]
    analysis: Vec<Cplx>,
    /// [n * 64 + k], 已含 1/64
    synthesis: Vec<Cplx>,
}

fn tables() -> &'static QmfTables {
    static TABLES: OnceLock<QmfTables> = OnceLock::new();
    TABLES.get_or_init(|| {
        let wc = CUTOFF * PI / 128.0;
        let half = (PROTO_LEN / 2) as f64;
        let norm = bessel_i0(KAISER_BETA);
        let mut proto = vec![0.0f64; PROTO_LEN];
        for (n, p) in proto.iter_mut().enumerate().skip(1) {
            let d = n as f64 - half;
            let sinc = if d == 0.0 {
                wc / PI
            } else {
                (wc * d).sin() / (PI * d)
            };
            let r = d / half;
            *p = sinc * bessel_i0(KAISER_BETA * (1.0 - r * r).max(0.0).sqrt()) / norm;
        }
        let gain = 64.0 * std::f64::consts::SQRT_2 / proto.iter().sum::<f64>();
        let window = proto
            .iter()
            .enumerate()
            .map(|(n, p)| {
                let sign = if (n / 128) % 2 == 0 { 1.0 } else { -1.0 };
                (p * gain * sign) as f32
            })
            .collect();

        let mut analysis = Vec::with_capacity(ANALYSIS_BANDS * 64);
        for k in 0..ANALYSIS_BANDS {
            for n in 0..64 {
                let phase = PI / 64.0 * (k as f64 + 0.5) * (2.0 * n as f64 - 0.5);
                analysis.push(Complex::new((2.0 * phase.cos()) as f32, (2.0 * phase.sin()) as f32));
            }
        }
        let mut synthesis = Vec::with_capacity(128 * SYNTHESIS_BANDS);
        for n in 0..128 {
            for k in 0..SYNTHESIS_BANDS {
                let phase = PI / 128.0 * (k as f64 + 0.5) * (2.0 * n as f64 - 255.0);
                synthesis.push(Complex::new(
                    (phase.cos() / 64.0) as f32,
                    (phase.sin() / 64.0) as f32,
                ));
            }
        }
        QmfTables {
            window,
            analysis,
            synthesis,
        }
    })
}

/// 分析滤波器组, 每次消费 32 个时域样本
#[derive(Debug, Clone)]
pub struct QmfAnalysis {
    x: Vec<f32>,
}

impl Default for QmfAnalysis {
    fn default() -> Self {
        Self {
            x: vec![0.0; PROTO_LEN / 2],
        }
    }
}

impl QmfAnalysis {
    pub fn reset(&mut self) {
        self.x.fill(0.0);
    }

    pub fn process(&mut self, input: &[f32], out: &mut [Cplx]) {
        let t = tables();
        let len = self.x.len();
        self.x.copy_within(0..len - ANALYSIS_BANDS, ANALYSIS_BANDS);
        for (dst, &s) in self.x.iter_mut().zip(input[..ANALYSIS_BANDS].iter().rev()) {
            *dst = s;
        }
        let mut u = [0.0f32; 64];
        for (n, u) in u.iter_mut().enumerate() {
            *u = (0..5)
                .map(|j| self.x[n + 64 * j] * t.window[2 * (n + 64 * j)])
                .sum();
        }
        for (k, out) in out[..ANALYSIS_BANDS].iter_mut().enumerate() {
            *out = t.analysis[k * 64..(k + 1) * 64]
                .iter()
                .zip(&u)
                .map(|(&w, &u)| w * u)
                .sum();
        }
    }
}

/// 合成滤波器组, 每次产出 64 个时域样本
#[derive(Debug, Clone)]
pub struct QmfSynthesis {
    v: Vec<f32>,
}

impl Default for QmfSynthesis {
    fn default() -> Self {
        Self {
            v: vec![0.0; 2 * PROTO_LEN],
        }
    }
}

impl QmfSynthesis {
    pub fn reset(&mut self) {
        self.v.fill(0.0);
    }

    pub fn process(&mut self, x: &[Cplx], out: &mut [f32]) {
        let t = tables();
        let len = self.v.len();
        self.v.copy_within(0..len - 128, 128);
        for n in 0..128 {
            let row = &t.synthesis[n * SYNTHESIS_BANDS..(n + 1) * SYNTHESIS_BANDS];
            self.v[n] = x[..SYNTHESIS_BANDS]
                .iter()
                .zip(row)
                .map(|(a, b)| a.re * b.re - a.im * b.im)
                .sum();
        }
        for (k, out) in out[..SYNTHESIS_BANDS].iter_mut().enumerate() {
            let mut acc = 0.0f32;
            for n in 0..5 {
                acc += self.v[256 * n + k] * t.window[128 * n + k];
                acc += self.v[256 * n + 192 + k] * t.window[128 * n + 64 + k];
            }
            *out = acc;
        }
    }
}
