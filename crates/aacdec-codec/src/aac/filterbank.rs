//! 合成滤波器组: 窗函数、IMDCT 与重叠相加.
//!
//! 帧长 N (1024 或 960), 短窗长度 N/8. 长窗序列的分段点:
//! `(N - N/8) / 2`, 其后依次加 N/8、N、N/8 (1024 帧为 448/576/1472/1600).

use std::sync::OnceLock;

use log::debug;

use super::ics::{IcsInfo, WindowSequence, WindowShape};
use super::mdct::Mdct;
use super::state::ChannelState;

/// 一种帧长下的全部窗表 (长度均为 2 倍变换长度)
#[derive(Debug)]
pub struct WindowSet {
    pub long_sine: Vec<f32>,
    pub long_kbd: Vec<f32>,
    pub short_sine: Vec<f32>,
    pub short_kbd: Vec<f32>,
}

impl WindowSet {
    fn build(frame_length: usize) -> Self {
        let short = frame_length / 8;
        Self {
            long_sine: build_sine_window(2 * frame_length),
            long_kbd: build_kbd_window(2 * frame_length, 4.0),
            short_sine: build_sine_window(2 * short),
            short_kbd: build_kbd_window(2 * short, 6.0),
        }
    }

    /// 进程级共享窗表
    pub fn get(frame_length: usize) -> &'static WindowSet {
        static W1024: OnceLock<WindowSet> = OnceLock::new();
        static W960: OnceLock<WindowSet> = OnceLock::new();
        if frame_length == 960 {
            W960.get_or_init(|| Self::build(960))
        } else {
            W1024.get_or_init(|| Self::build(1024))
        }
    }

    pub fn long(&self, shape: WindowShape) -> &[f32] {
        match shape {
            WindowShape::Sine => &self.long_sine,
            WindowShape::Kbd => &self.long_kbd,
        }
    }

    pub fn short(&self, shape: WindowShape) -> &[f32] {
        match shape {
            WindowShape::Sine => &self.short_sine,
            WindowShape::Kbd => &self.short_kbd,
        }
    }
}

/// 构建 sine 窗.
pub fn build_sine_window(len: usize) -> Vec<f32> {
    (0..len)
        .map(|i| (std::f64::consts::PI / len as f64 * (i as f64 + 0.5)).sin() as f32)
        .collect()
}

/// 构建 KBD 窗.
///
/// 原型为长度 len/2 + 1 的 Kaiser 窗, 前半窗为其累积和的归一化平方根.
pub fn build_kbd_window(len: usize, alpha: f64) -> Vec<f32> {
    let half = len / 2;
    let proto: Vec<f64> = (0..=half)
        .map(|i| {
            let x = 2.0 * i as f64 / half as f64 - 1.0;
            bessel_i0(alpha * std::f64::consts::PI * (1.0 - x * x).max(0.0).sqrt())
        })
        .collect();
    let total: f64 = proto.iter().sum();

    let mut window = vec![0.0f32; len];
    let mut running = 0.0f64;
    for i in 0..half {
        running += proto[i];
        let w = (running / total).sqrt() as f32;
        window[i] = w;
        window[len - 1 - i] = w;
    }
    window
}

/// 第一类修正贝塞尔函数 I0.
pub fn bessel_i0(x: f64) -> f64 {
    let mut sum = 1.0f64;
    let mut term = 1.0f64;
    let half = x * 0.5;
    let mut k = 1.0f64;
    loop {
        term *= (half * half) / (k * k);
        sum += term;
        if term < 1e-12 * sum || k > 50.0 {
            break;
        }
        k += 1.0;
    }
    sum
}

/// 当前序列是否能接在上一序列之后
fn is_valid_transition(prev: WindowSequence, cur: WindowSequence) -> bool {
    use WindowSequence::*;
    match prev {
        OnlyLong | LongStop => matches!(cur, OnlyLong | LongStart),
        LongStart | EightShort => matches!(cur, EightShort | LongStop),
    }
}

/// 滤波器组, 每个解码器实例一份
#[derive(Debug)]
pub struct Filterbank {
    frame_length: usize,
    windows: &'static WindowSet,
    long: Mdct,
    short: Mdct,
    time: Vec<f32>,
    short_time: Vec<f32>,
    windowed: Vec<f32>,
}

impl Filterbank {
    pub fn new(frame_length: usize) -> Self {
        let short = frame_length / 8;
        Self {
            frame_length,
            windows: WindowSet::get(frame_length),
            long: Mdct::new(frame_length),
            short: Mdct::new(short),
            time: vec![0.0; 2 * frame_length],
            short_time: vec![0.0; 2 * short],
            windowed: vec![0.0; 2 * frame_length],
        }
    }

    pub fn frame_length(&self) -> usize {
        self.frame_length
    }

    /// 长窗序列中短窗区段的起点 (1024 帧为 448)
    fn short_start(&self) -> usize {
        (self.frame_length - self.frame_length / 8) / 2
    }

    /// 频谱 → `frame_length` 个输出样本, 并更新重叠缓冲与窗状态
    pub fn synthesize(
        &mut self,
        spec: &[f32],
        info: &IcsInfo,
        state: &mut ChannelState,
        out: &mut [f32],
    ) {
        let n = self.frame_length;
        let s = n / 8;
        let a = self.short_start();
        let seq = info.window_sequence;
        let shape = info.window_shape;
        let prev_shape = state.prev_shape;
        if !is_valid_transition(state.prev_sequence, seq) {
            debug!(
                "AAC: 窗序列跳变 {:?} -> {:?}",
                state.prev_sequence, seq
            );
        }

        let win = self.windows;
        let long_prev = win.long(prev_shape);
        let long_cur = win.long(shape);
        let short_prev = win.short(prev_shape);
        let short_cur = win.short(shape);
        self.windowed.fill(0.0);

        if seq.is_short() {
            for w in 0..8 {
                self.short.imdct(&spec[w * s..(w + 1) * s], &mut self.short_time);
                let rising = if w == 0 { short_prev } else { short_cur };
                let base = a + w * s;
                for i in 0..s {
                    self.windowed[base + i] += self.short_time[i] * rising[i];
                    self.windowed[base + s + i] += self.short_time[s + i] * short_cur[s + i];
                }
            }
        } else {
            self.long.imdct(&spec[..n], &mut self.time);
            let (t, w) = (&self.time, &mut self.windowed);
            match seq {
                WindowSequence::LongStop => {
                    for i in a..a + s {
                        w[i] = t[i] * short_prev[i - a];
                    }
                    w[a + s..n].copy_from_slice(&t[a + s..n]);
                }
                _ => {
                    for i in 0..n {
                        w[i] = t[i] * long_prev[i];
                    }
                }
            }
            match seq {
                WindowSequence::LongStart => {
                    let c = n + a;
                    w[n..c].copy_from_slice(&t[n..c]);
                    for i in c..c + s {
                        w[i] = t[i] * short_cur[s + i - c];
                    }
                }
                _ => {
                    for i in n..2 * n {
                        w[i] = t[i] * long_cur[i];
                    }
                }
            }
        }

        for (i, o) in out.iter_mut().take(n).enumerate() {
            *o = state.overlap[i] + self.windowed[i];
        }
        state.overlap.copy_from_slice(&self.windowed[n..]);
        state.prev_sequence = seq;
        state.prev_shape = shape;
    }

    /// LTP 用正向变换: 对 2N 点时域估计加窗后做 MDCT
    pub fn analyze(
        &mut self,
        time: &mut [f32],
        info: &IcsInfo,
        prev_shape: WindowShape,
        out: &mut [f32],
    ) {
        let n = self.frame_length;
        let s = n / 8;
        let a = self.short_start();
        let win = self.windows;
        if info.window_sequence == WindowSequence::LongStop {
            time[..a].fill(0.0);
            let short_prev = win.short(prev_shape);
            for i in 0..s {
                time[a + i] *= short_prev[i];
            }
        } else {
            let long_prev = win.long(prev_shape);
            for i in 0..n {
                time[i] *= long_prev[i];
            }
        }
        if info.window_sequence == WindowSequence::LongStart {
            let c = n + a;
            let short_cur = win.short(info.window_shape);
            for i in 0..s {
                time[c + i] *= short_cur[s + i];
            }
            time[c + s..].fill(0.0);
        } else {
            let long_cur = win.long(info.window_shape);
            for i in n..2 * n {
                time[i] *= long_cur[i];
            }
        }
        self.long.mdct(time, out);
    }
}
