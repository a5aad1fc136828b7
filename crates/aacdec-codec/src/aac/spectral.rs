//! AAC 频谱重建: 脉冲恢复、反量化、PNS 与声道对立体声处理.

use std::borrow::Cow;
use std::sync::OnceLock;

use super::ics::{ChannelStream, INTENSITY_HCB, INTENSITY_HCB2, NOISE_HCB, ZERO_HCB};
use super::syntax::{ChannelPair, MsMask};
use super::tables::BandLayout;

/// |q|^(4/3) 查表范围
const IQ_TABLE_SIZE: usize = 8192;

/// |q|^(4/3) 表, 首次使用时构建
fn iq_table() -> &'static [f32] {
    static TABLE: OnceLock<Vec<f32>> = OnceLock::new();
    TABLE.get_or_init(|| {
        (0..IQ_TABLE_SIZE)
            .map(|i| (i as f64).powf(4.0 / 3.0) as f32)
            .collect()
    })
}

/// sign(q)·|q|^(4/3)
pub fn inverse_quantize(q: i32) -> f32 {
    let abs = q.unsigned_abs() as usize;
    let v = match iq_table().get(abs) {
        Some(&v) => v,
        // 脉冲叠加后可能略超出 8191
        None => (abs as f32).powf(4.0 / 3.0),
    };
    if q < 0 { -v } else { v }
}

/// 比例因子增益 2^((sf - 100) / 4)
fn scalefactor_gain(sf: i32) -> f32 {
    2.0f32.powf(0.25 * (sf - 100) as f32)
}

/// PNS 噪声源 (线性同余), 流级共享
#[derive(Debug, Clone)]
pub struct NoiseGenerator {
    state: u32,
}

impl Default for NoiseGenerator {
    fn default() -> Self {
        Self { state: 0x1f2e3d4c }
    }
}

impl NoiseGenerator {
    pub fn next_sample(&mut self) -> f32 {
        self.state = self
            .state
            .wrapping_mul(1_664_525)
            .wrapping_add(1_013_904_223);
        (self.state as i32) as f32
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// 脉冲恢复 + 反量化 + 噪声替代, 结果写入 `out` (长度为帧长)
///
/// 强度立体声频带置零, 由 [`apply_intensity_stereo`] 填充.
pub fn dequantize(
    stream: &ChannelStream,
    layout: &BandLayout,
    noise: &mut NoiseGenerator,
    out: &mut [f32],
) {
    out.fill(0.0);
    let mut quant = Cow::Borrowed(stream.quant.as_slice());
    if let Some(pulse) = &stream.pulse {
        let q = quant.to_mut();
        for (&pos, &amp) in pulse.positions.iter().zip(&pulse.amplitudes) {
            if q[pos] > 0 {
                q[pos] += amp;
            } else {
                q[pos] -= amp;
            }
        }
    }

    let info = &stream.info;
    let offsets = info.band_offsets(layout);
    let win_len = info.window_length(layout);
    for (g, (first, len)) in info.groups().enumerate() {
        for sfb in 0..info.max_sfb {
            let (start, end) = (offsets[sfb], offsets[sfb + 1]);
            let sf = stream.scalefactors[g][sfb];
            match stream.band_types[g][sfb] {
                ZERO_HCB | INTENSITY_HCB | INTENSITY_HCB2 => {}
                NOISE_HCB => {
                    let target = 2.0f32.powf(0.25 * sf as f32);
                    for w in first..first + len {
                        let band = &mut out[w * win_len + start..w * win_len + end];
                        let mut energy = 0.0f32;
                        for v in band.iter_mut() {
                            *v = noise.next_sample();
                            energy += *v * *v;
                        }
                        if energy > 0.0 {
                            let scale = target / energy.sqrt();
                            band.iter_mut().for_each(|v| *v *= scale);
                        }
                    }
                }
                _ => {
                    let gain = scalefactor_gain(sf);
                    for w in first..first + len {
                        let base = w * win_len;
                        for k in start..end {
                            out[base + k] = inverse_quantize(quant[base + k]) * gain;
                        }
                    }
                }
            }
        }
    }
}

/// 对一个声道对内的每个频带调用 `f(窗口起点 + 频带起点, 频带终点, 组号, 频带号)`
fn for_each_pair_band(
    pair: &ChannelPair,
    layout: &BandLayout,
    mut f: impl FnMut(usize, usize, usize, usize),
) {
    let info = &pair.right.info;
    let offsets = info.band_offsets(layout);
    let win_len = info.window_length(layout);
    for (g, (first, len)) in info.groups().enumerate() {
        for sfb in 0..info.max_sfb {
            for w in first..first + len {
                let base = w * win_len;
                f(base + offsets[sfb], base + offsets[sfb + 1], g, sfb);
            }
        }
    }
}

/// M/S 标记的噪声频带: 右声道复用左声道的噪声, 按各自能量缩放
pub fn correlate_noise(
    pair: &ChannelPair,
    layout: &BandLayout,
    left: &[f32],
    right: &mut [f32],
) {
    if !pair.common_window || pair.ms_mask == MsMask::Off {
        return;
    }
    for_each_pair_band(pair, layout, |start, end, g, sfb| {
        if pair.left.band_types[g][sfb] == NOISE_HCB
            && pair.right.band_types[g][sfb] == NOISE_HCB
            && pair.ms_mask.is_set(g, sfb)
        {
            let diff = pair.right.scalefactors[g][sfb] - pair.left.scalefactors[g][sfb];
            let scale = 2.0f32.powf(0.25 * diff as f32);
            for k in start..end {
                right[k] = left[k] * scale;
            }
        }
    });
}

/// M/S 反变换: L = M + S, R = M - S; 噪声与强度频带跳过
pub fn apply_mid_side(
    pair: &ChannelPair,
    layout: &BandLayout,
    left: &mut [f32],
    right: &mut [f32],
) {
    if !pair.common_window || pair.ms_mask == MsMask::Off {
        return;
    }
    for_each_pair_band(pair, layout, |start, end, g, sfb| {
        if !pair.ms_mask.is_set(g, sfb)
            || pair.left.band_types[g][sfb] >= NOISE_HCB
            || pair.right.band_types[g][sfb] >= NOISE_HCB
        {
            return;
        }
        for k in start..end {
            let (m, s) = (left[k], right[k]);
            left[k] = m + s;
            right[k] = m - s;
        }
    });
}

/// 强度立体声: 右声道由左声道按 0.5^(pos/4) 缩放得到
///
/// 码本 14 反相; ms_mask_present 为 1 时 M/S 标记再反相一次.
pub fn apply_intensity_stereo(
    pair: &ChannelPair,
    layout: &BandLayout,
    left: &[f32],
    right: &mut [f32],
) {
    for_each_pair_band(pair, layout, |start, end, g, sfb| {
        let cb = pair.right.band_types[g][sfb];
        if cb != INTENSITY_HCB && cb != INTENSITY_HCB2 {
            return;
        }
        let mut sign = if cb == INTENSITY_HCB2 { -1.0f32 } else { 1.0 };
        if matches!(pair.ms_mask, MsMask::PerBand(_)) && pair.ms_mask.is_set(g, sfb) {
            sign = -sign;
        }
        let position = pair.right.scalefactors[g][sfb].clamp(-155, 100);
        let scale = sign * 0.5f32.powf(0.25 * position as f32);
        for k in start..end {
            right[k] = left[k] * scale;
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aac::config::Profile;
    use crate::aac::ics::ParseContext;
    use crate::aac::ics::tests::write_simple_ics;
    use aacdec_core::bitreader::BitReader;
    use aacdec_core::bitwriter::BitWriter;

    fn simple_stream(global_gain: u32, bands: u32, quad_idx: usize) -> ChannelStream {
        let layout = BandLayout::new(4, 1024);
        let mut bw = BitWriter::new();
        write_simple_ics(&mut bw, global_gain, bands, quad_idx, true);
        let data = bw.finish();
        let mut br = BitReader::new(&data);
        let ctx = ParseContext {
            profile: Profile::AacLc,
            layout: &layout,
        };
        ChannelStream::parse(&mut br, &ctx, None).unwrap()
    }

    #[test]
    fn test_反量化公式() {
        assert_eq!(inverse_quantize(0), 0.0);
        assert_eq!(inverse_quantize(1), 1.0);
        assert!((inverse_quantize(-8) + 16.0).abs() < 1e-4);
        assert!((inverse_quantize(9000) - 9000f32.powf(4.0 / 3.0)).abs() < 1.0);
    }

    #[test]
    fn test_比例因子缩放() {
        let layout = BandLayout::new(4, 1024);
        // sf = 104 → 增益 2
        let stream = simple_stream(104, 2, 80);
        let mut out = vec![0.0; 1024];
        dequantize(&stream, &layout, &mut NoiseGenerator::default(), &mut out);
        assert!(out[..8].iter().all(|&v| (v - 2.0).abs() < 1e-6));
        assert!(out[8..].iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_脉冲恢复() {
        let layout = BandLayout::new(4, 1024);
        let mut stream = simple_stream(100, 2, 80);
        stream.pulse = Some(crate::aac::ics::PulseData {
            positions: vec![1, 5],
            amplitudes: vec![7, 3],
        });
        let mut out = vec![0.0; 1024];
        dequantize(&stream, &layout, &mut NoiseGenerator::default(), &mut out);
        assert!((out[1] - 16.0).abs() < 1e-4);
        assert!((out[5] - inverse_quantize(4)).abs() < 1e-4);
    }

    #[test]
    fn test_噪声能量() {
        let layout = BandLayout::new(4, 1024);
        let mut stream = simple_stream(100, 2, 80);
        stream.band_types[0][1] = NOISE_HCB;
        stream.scalefactors[0][1] = 8;
        let mut out = vec![0.0; 1024];
        dequantize(&stream, &layout, &mut NoiseGenerator::default(), &mut out);
        let energy: f32 = out[4..8].iter().map(|v| v * v).sum();
        assert!((energy.sqrt() - 4.0).abs() < 1e-3);
    }

    fn pair(ms_mask: MsMask, right_types: u8) -> ChannelPair {
        let left = simple_stream(100, 2, 80);
        let mut right = simple_stream(100, 2, 40);
        right.band_types[0][..2].fill(right_types);
        ChannelPair {
            common_window: true,
            ms_mask,
            left,
            right,
        }
    }

    #[test]
    fn test_ms_全频带() {
        let layout = BandLayout::new(4, 1024);
        let p = pair(MsMask::All, 1);
        let mut left = vec![3.0f32; 1024];
        let mut right = vec![1.0f32; 1024];
        apply_mid_side(&p, &layout, &mut left, &mut right);
        assert_eq!(&left[..8], &[4.0; 8]);
        assert_eq!(&right[..8], &[2.0; 8]);
        // max_sfb 之外不处理
        assert_eq!(left[8], 3.0);
    }

    #[test]
    fn test_强度立体声() {
        let layout = BandLayout::new(4, 1024);
        let mut p = pair(MsMask::Off, INTENSITY_HCB2);
        p.right.scalefactors[0][0] = 4;
        p.right.scalefactors[0][1] = 0;
        let left = vec![8.0f32; 1024];
        let mut right = vec![0.0f32; 1024];
        apply_intensity_stereo(&p, &layout, &left, &mut right);
        assert_eq!(&right[..4], &[-4.0; 4]);
        assert_eq!(&right[4..8], &[-8.0; 4]);

        let mut mask = Box::new([[false; 64]; 8]);
        mask[0][0] = true;
        p.ms_mask = MsMask::PerBand(mask);
        apply_intensity_stereo(&p, &layout, &left, &mut right);
        assert_eq!(&right[..4], &[4.0; 4]);
    }
}
