//! 基于 FFT 的 MDCT / IMDCT.
//!
//! 两者都归约为长度 M 的 DCT-IV, 后者用 M/2 点复数 FFT 计算.
//! IMDCT 输出 2M 个未加窗样本, 缩放 1/M; MDCT 缩放 2, 与 IMDCT 互为逆 (配合 TDAC 窗).

use std::f64::consts::PI;
use std::sync::Arc;

use rustfft::num_complex::Complex;
use rustfft::{Fft, FftPlanner};

/// 长度固定的 MDCT 变换器, 内部缓冲复用
pub struct Mdct {
    /// 频谱系数个数 M
    len: usize,
    fft: Arc<dyn Fft<f32>>,
    pre: Vec<Complex<f32>>,
    post: Vec<Complex<f32>>,
    buf: Vec<Complex<f32>>,
    scratch: Vec<Complex<f32>>,
    fold: Vec<f32>,
    dct: Vec<f32>,
}

impl std::fmt::Debug for Mdct {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Mdct").field("len", &self.len).finish()
    }
}

impl Mdct {
    /// 创建 M 点变换 (M 为偶数)
    pub fn new(len: usize) -> Self {
        debug_assert!(len >= 2 && len % 2 == 0);
        let half = len / 2;
        let mut planner = FftPlanner::new();
        let fft = planner.plan_fft_forward(half);
        let m = len as f64;
        let pre = (0..half)
            .map(|n| {
                let angle = -PI * (4 * n + 1) as f64 / (4.0 * m);
                Complex::new(angle.cos() as f32, angle.sin() as f32)
            })
            .collect();
        let post = (0..half)
            .map(|k| {
                let angle = -PI * k as f64 / m;
                Complex::new(angle.cos() as f32, angle.sin() as f32)
            })
            .collect();
        let scratch = vec![Complex::new(0.0, 0.0); fft.get_inplace_scratch_len()];
        Self {
            len,
            fft,
            pre,
            post,
            buf: vec![Complex::new(0.0, 0.0); half],
            scratch,
            fold: vec![0.0; len],
            dct: vec![0.0; len],
        }
    }

    /// 频谱系数个数
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// DCT-IV: `self.dct[k] = Σ x[n]·cos(π/M·(n+½)(k+½))`
    fn dct4(&mut self, input: &[f32]) {
        let m = self.len;
        let half = m / 2;
        for (n, slot) in self.buf.iter_mut().enumerate() {
            *slot = Complex::new(input[2 * n], input[m - 1 - 2 * n]) * self.pre[n];
        }
        self.fft.process_with_scratch(&mut self.buf, &mut self.scratch);
        for k in 0..half {
            let u = self.buf[k] * self.post[k];
            self.dct[2 * k] = u.re;
            self.dct[m - 1 - 2 * k] = -u.im;
        }
    }

    /// IMDCT: M 个系数 → 2M 个时域样本
    pub fn imdct(&mut self, input: &[f32], output: &mut [f32]) {
        let m = self.len;
        debug_assert_eq!(input.len(), m);
        debug_assert_eq!(output.len(), 2 * m);
        if input.iter().all(|&v| v == 0.0) {
            output.fill(0.0);
            return;
        }
        self.dct4(input);
        let scale = 1.0 / m as f32;
        let half = m / 2;
        for n in 0..half {
            output[n] = self.dct[n + half] * scale;
        }
        for n in half..3 * half {
            output[n] = -self.dct[3 * half - 1 - n] * scale;
        }
        for n in 3 * half..2 * m {
            output[n] = -self.dct[n - 3 * half] * scale;
        }
    }

    /// MDCT: 2M 个 (已加窗) 时域样本 → M 个系数
    pub fn mdct(&mut self, input: &[f32], output: &mut [f32]) {
        let m = self.len;
        debug_assert_eq!(input.len(), 2 * m);
        debug_assert_eq!(output.len(), m);
        let half = m / 2;
        let mut fold = std::mem::take(&mut self.fold);
        for (i, f) in fold.iter_mut().enumerate() {
            *f = if i < half {
                -input[3 * half - 1 - i] - input[i + 3 * half]
            } else {
                input[i - half] - input[3 * half - 1 - i]
            };
        }
        self.dct4(&fold);
        self.fold = fold;
        for (o, &d) in output.iter_mut().zip(&self.dct) {
            *o = 2.0 * d;
        }
    }
}
