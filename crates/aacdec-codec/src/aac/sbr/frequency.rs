//! SBR 频带表推导 (ISO/IEC 14496-3 4.6.18.3).
//!
//! 由 SBR 头与输出采样率得到主频带表、高/低分辨率包络频带、噪声频带、
//! 限幅频带以及高频生成用的复制块 (patch). 只在 SBR 头变化时重新推导.

use aacdec_core::{AacError, AacResult};

use super::bitstream::SbrHeader;

/// 各输出采样率下 k0 的偏移 (bs_start_freq 索引)
#[rustfmt::skip]
const START_OFFSETS: [[i32; 16]; 6] = [
    [-8, -7, -6, -5, -4, -3, -2, -1,  0,  1,  2,  3,  4,  5,  6,  7], // 16000
    [-5, -4, -3, -2, -1,  0,  1,  2,  3,  4,  5,  6,  7,  9, 11, 13], // 22050
    [-5, -3, -2, -1,  0,  1,  2,  3,  4,  5,  6,  7,  9, 11, 13, 16], // 24000
    [-6, -4, -2, -1,  0,  1,  2,  3,  4,  5,  6,  7,  9, 11, 13, 16], // 32000
    [-4, -2, -1,  0,  1,  2,  3,  4,  5,  6,  7,  9, 11, 13, 16, 20], // 44100 - 64000
    [-2, -1,  0,  1,  2,  3,  4,  5,  6,  7,  9, 11, 13, 16, 20, 24], // > 64000
];

/// 限幅频带每倍频程的频带数 (1.2, 2, 3), 已按 2^(0.49/x) 折算
const LIMITER_WARP: [f32; 3] = [1.327_151_7, 1.185_092_8, 1.119_871_6];

/// 最多复制块数
const MAX_PATCHES: usize = 6;

/// 一个复制块: 从低频 `source` 起的 `len` 个子带复制到高频
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Patch {
    pub source: usize,
    pub len: usize,
}

/// 推导出的全部频带表; 表中数值均为 QMF 子带序号
#[derive(Debug, Clone, PartialEq)]
pub struct FrequencyTables {
    pub k0: usize,
    pub k2: usize,
    pub master: Vec<usize>,
    pub high: Vec<usize>,
    pub low: Vec<usize>,
    pub noise: Vec<usize>,
    pub limiter: Vec<usize>,
    pub patches: Vec<Patch>,
    /// 第一个 SBR 子带
    pub kx: usize,
    /// SBR 子带数
    pub m: usize,
}

impl FrequencyTables {
    pub fn derive(header: &SbrHeader, sample_rate: u32) -> AacResult<Self> {
        let (k0, k2, master) = master_table(header, sample_rate)?;
        let xover = usize::from(header.xover_band);
        if xover >= master.len() - 1 {
            return Err(AacError::malformed(format!(
                "SBR: 交越频带 {xover} 超出主频带表 ({} 个频带)",
                master.len() - 1
            )));
        }

        let high = master[xover..].to_vec();
        let n_high = high.len() - 1;
        let kx = high[0];
        let m = high[n_high] - kx;
        if kx + m > 64 {
            return Err(AacError::malformed("SBR: 截止频率过高"));
        }
        if kx > 32 {
            return Err(AacError::malformed("SBR: 起始频率过高"));
        }

        let n_low = (n_high + 1) >> 1;
        let odd = n_high & 1;
        let mut low = Vec::with_capacity(n_low + 1);
        low.push(high[0]);
        for k in 1..=n_low {
            low.push(high[2 * k - odd]);
        }

        let n_q = (f32::from(header.noise_bands) * (k2 as f32 / kx as f32).log2())
            .round_ties_even()
            .max(1.0) as usize;
        if n_q > 5 {
            return Err(AacError::malformed(format!("SBR: 噪声频带过多 ({n_q})")));
        }
        let mut noise = Vec::with_capacity(n_q + 1);
        noise.push(low[0]);
        let mut idx = 0;
        for k in 1..=n_q {
            idx += (n_low - idx) / (n_q + 1 - k);
            noise.push(low[idx]);
        }

        let patches = build_patches(&master, k0, kx, m, sample_rate)?;
        let limiter = limiter_table(&low, &patches, kx, header.limiter_bands);

        Ok(Self {
            k0,
            k2,
            master,
            high,
            low,
            noise,
            limiter,
            patches,
            kx,
            m,
        })
    }

    /// 高分辨率包络频带数
    pub fn n_high(&self) -> usize {
        self.high.len() - 1
    }

    /// 低分辨率包络频带数
    pub fn n_low(&self) -> usize {
        self.low.len() - 1
    }

    /// 噪声频带数
    pub fn n_noise(&self) -> usize {
        self.noise.len() - 1
    }

    /// 指定分辨率的包络频带边界
    pub fn bands(&self, high_res: bool) -> &[usize] {
        if high_res { &self.high } else { &self.low }
    }

    pub fn num_bands(&self, high_res: bool) -> usize {
        self.bands(high_res).len() - 1
    }
}

fn offset_row(sample_rate: u32) -> AacResult<&'static [i32; 16]> {
    let row = match sample_rate {
        16000 => 0,
        22050 => 1,
        24000 => 2,
        32000 => 3,
        44100 | 48000 | 64000 => 4,
        88200 | 96000 | 128000 | 176400 | 192000 => 5,
        _ => {
            return Err(AacError::Unsupported(format!(
                "SBR: 不支持的输出采样率 {sample_rate}"
            )));
        }
    };
    Ok(&START_OFFSETS[row])
}

/// 把 [start, stop) 按几何级数分成 `count` 段, 返回各段宽度
fn geometric_widths(start: usize, stop: usize, count: usize) -> Vec<i32> {
    let base = (stop as f32 / start as f32).powf(1.0 / count as f32);
    let mut prod = start as f32;
    let mut previous = start as i32;
    let mut widths = Vec::with_capacity(count);
    for _ in 0..count.saturating_sub(1) {
        prod *= base;
        let present = prod.round_ties_even() as i32;
        widths.push(present - previous);
        previous = present;
    }
    widths.push(stop as i32 - previous);
    widths
}

/// 宽度累加成边界表, 出现非正宽度时报错
fn accumulate(start: usize, widths: &[i32]) -> AacResult<Vec<usize>> {
    let mut bands = Vec::with_capacity(widths.len() + 1);
    let mut acc = start;
    bands.push(acc);
    for &w in widths {
        if w <= 0 {
            return Err(AacError::malformed(format!("SBR: 主频带宽度非法 ({w})")));
        }
        acc += w as usize;
        bands.push(acc);
    }
    Ok(bands)
}

/// 主频带表, 返回 (k0, k2, f_master)
fn master_table(header: &SbrHeader, sample_rate: u32) -> AacResult<(usize, usize, Vec<usize>)> {
    let offsets = offset_row(sample_rate)?;
    let base: u32 = match sample_rate {
        ..32000 => 3000,
        32000..64000 => 4000,
        _ => 5000,
    };
    let start_min = ((base << 7) + (sample_rate >> 1)) / sample_rate;
    let stop_min = ((base << 8) + (sample_rate >> 1)) / sample_rate;

    let k0 = start_min as i32 + offsets[usize::from(header.start_freq)];
    if k0 <= 0 {
        return Err(AacError::malformed("SBR: 起始子带非法"));
    }
    let k0 = k0 as usize;
    let k2 = match header.stop_freq {
        0..=13 => {
            let mut widths = geometric_widths(stop_min as usize, 64, 13);
            widths.sort_unstable();
            let extra: i32 = widths[..usize::from(header.stop_freq)].iter().sum();
            (stop_min as i32 + extra).max(0) as usize
        }
        14 => 2 * k0,
        _ => 3 * k0,
    }
    .min(64);

    let max_span = match sample_rate {
        ..=32000 => 48,
        44100 => 35,
        _ => 32,
    };
    if k2 <= k0 || k2 - k0 > max_span {
        return Err(AacError::malformed(format!(
            "SBR: QMF 子带范围非法 (k0={k0}, k2={k2})"
        )));
    }

    if header.freq_scale == 0 {
        let dk = if header.alter_scale { 2 } else { 1 };
        let n_master = ((k2 - k0 + (dk & 2)) >> dk) << 1;
        if n_master == 0 {
            return Err(AacError::malformed("SBR: 主频带表为空"));
        }
        let mut widths = vec![dk as i32; n_master];
        let diff = (k2 - k0) as i32 - (n_master * dk) as i32;
        if diff < 0 {
            widths[0] -= 1;
            if diff < -1 && n_master > 1 {
                widths[1] -= 1;
            }
        } else if diff > 0 {
            widths[n_master - 1] += 1;
        }
        return Ok((k0, k2, accumulate(k0, &widths)?));
    }

    let half_bands = 7 - i32::from(header.freq_scale);
    let two_regions = 49 * k2 > 110 * k0;
    let k1 = if two_regions { 2 * k0 } else { k2 };

    let bands_0 = (half_bands as f32 * (k1 as f32 / k0 as f32).log2()).round_ties_even() as i32 * 2;
    if bands_0 <= 0 {
        return Err(AacError::malformed(format!("SBR: 首区频带数非法 ({bands_0})")));
    }
    let mut widths_0 = geometric_widths(k0, k1, bands_0 as usize);
    widths_0.sort_unstable();
    let mut master = accumulate(k0, &widths_0)?;

    if two_regions {
        let warp = if header.alter_scale { 1.0 / 1.3 } else { 1.0 };
        let bands_1 = (half_bands as f32 * warp * (k2 as f32 / k1 as f32).log2())
            .round_ties_even() as i32
            * 2;
        if bands_1 <= 0 {
            return Err(AacError::malformed(format!("SBR: 次区频带数非法 ({bands_1})")));
        }
        let mut widths_1 = geometric_widths(k1, k2, bands_1 as usize);
        let max_0 = widths_0.last().copied().unwrap_or(0);
        let min_1 = widths_1.iter().copied().min().unwrap_or(0);
        if min_1 < max_0 {
            widths_1.sort_unstable();
            let last = widths_1.len() - 1;
            let change = (max_0 - widths_1[0]).min((widths_1[last] - widths_1[0]) >> 1);
            widths_1[0] += change;
            widths_1[last] -= change;
        }
        widths_1.sort_unstable();
        let region_1 = accumulate(k1, &widths_1)?;
        master.extend_from_slice(&region_1[1..]);
    }
    Ok((k0, k2, master))
}

/// 复制块: 把低频子带搬到 [kx, kx + m)
fn build_patches(
    master: &[usize],
    k0: usize,
    kx: usize,
    m: usize,
    sample_rate: u32,
) -> AacResult<Vec<Patch>> {
    let n_master = master.len() - 1;
    let goal = (((1000u32 << 11) + (sample_rate >> 1)) / sample_rate) as usize;
    let mut k = if goal < kx + m {
        master.iter().position(|&f| f >= goal).unwrap_or(n_master)
    } else {
        n_master
    };

    let mut patches = Vec::new();
    let mut msb = k0;
    let mut usb = kx;
    let mut last = None;
    loop {
        if last == Some((k, msb)) {
            return Err(AacError::malformed("SBR: 无法构造复制块"));
        }
        last = Some((k, msb));

        // 在 k 及以下找第一个不超过可复制上限的主频带边界
        let mut i = k;
        let (sb, odd) = loop {
            let sb = master[i];
            let odd = (sb + k0) & 1;
            if i == 0 || sb as i64 <= (k0 + msb) as i64 - 1 - odd as i64 {
                break (sb, odd);
            }
            i -= 1;
        };

        if patches.len() >= MAX_PATCHES {
            return Err(AacError::malformed("SBR: 复制块过多"));
        }
        let len = sb.saturating_sub(usb);
        if len > 0 {
            let source = (k0 as i64 - odd as i64 - len as i64).max(0) as usize;
            if source == 0 && k0 < odd + len {
                return Err(AacError::malformed("SBR: 复制块源超出低频范围"));
            }
            patches.push(Patch { source, len });
            usb = sb;
            msb = sb;
        } else {
            msb = kx;
        }

        if master[k] - sb < 3 {
            k = n_master;
        }
        if sb == kx + m {
            break;
        }
    }

    if patches.len() > 1 && patches.last().is_some_and(|p| p.len < 3) {
        patches.pop();
    }
    Ok(patches)
}

/// 限幅频带表: 低分辨率边界与复制块边界合并后, 去掉过窄的频带
fn limiter_table(low: &[usize], patches: &[Patch], kx: usize, limiter_bands: u8) -> Vec<usize> {
    let n_low = low.len() - 1;
    if limiter_bands == 0 {
        return vec![low[0], low[n_low]];
    }
    let warp = LIMITER_WARP[usize::from(limiter_bands) - 1];

    let mut borders = Vec::with_capacity(patches.len() + 1);
    borders.push(kx);
    for p in patches {
        borders.push(borders[borders.len() - 1] + p.len);
    }

    let mut lim = low.to_vec();
    if patches.len() > 1 {
        lim.extend_from_slice(&borders[1..patches.len()]);
    }
    lim.sort_unstable();

    let is_border = |v: usize| borders.contains(&v);
    let mut count = lim.len() - 1;
    let mut out = 0;
    let mut inp = 1;
    while out < count {
        if lim[inp] as f32 >= lim[out] as f32 * warp {
            out += 1;
            lim[out] = lim[inp];
            inp += 1;
        } else if lim[inp] == lim[out] || !is_border(lim[inp]) {
            inp += 1;
            count -= 1;
        } else if !is_border(lim[out]) {
            lim[out] = lim[inp];
            inp += 1;
            count -= 1;
        } else {
            out += 1;
            lim[out] = lim[inp];
            inp += 1;
        }
    }
    lim.truncate(count + 1);
    lim
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header(start_freq: u8, stop_freq: u8, xover_band: u8) -> SbrHeader {
        SbrHeader {
            start_freq,
            stop_freq,
            xover_band,
            ..SbrHeader::default()
        }
    }

    fn assert_increasing(name: &str, table: &[usize]) {
        for pair in table.windows(2) {
            assert!(pair[0] < pair[1], "{name} 非递增: {table:?}");
        }
    }

    #[test]
    fn test_线性主频带表() {
        // 44.1 kHz: start_min = 12, k0 = 12 + 2 = 14; stop_freq 14 → k2 = 28
        let h = SbrHeader {
            freq_scale: 0,
            alter_scale: false,
            ..header(5, 14, 0)
        };
        let t = FrequencyTables::derive(&h, 44100).unwrap();
        assert_eq!((t.k0, t.k2), (14, 28));
        let expected: Vec<usize> = (14..=28).collect();
        assert_eq!(t.master, expected);
        assert_eq!((t.kx, t.m), (14, 14));
    }

    #[test]
    fn test_对数主频带表() {
        let t = FrequencyTables::derive(&header(5, 9, 0), 44100).unwrap();
        assert_eq!(t.k0, 14);
        assert_eq!(t.master[0], t.k0);
        assert_eq!(*t.master.last().unwrap(), t.k2);
        assert_increasing("master", &t.master);
        // 频带宽度单调不减
        let widths: Vec<usize> = t.master.windows(2).map(|w| w[1] - w[0]).collect();
        for pair in widths.windows(2) {
            assert!(pair[0] <= pair[1], "{widths:?}");
        }
    }

    #[test]
    fn test_派生表一致() {
        for (sr, start, stop, xover) in [
            (44100, 5, 9, 0),
            (48000, 7, 5, 1),
            (32000, 3, 9, 2),
            (24000, 0, 6, 0),
        ] {
            let t = FrequencyTables::derive(&header(start, stop, xover), sr).unwrap();
            assert_increasing("high", &t.high);
            assert_increasing("low", &t.low);
            assert_increasing("noise", &t.noise);
            assert_increasing("limiter", &t.limiter);
            assert_eq!(t.low[0], t.kx);
            assert_eq!(*t.low.last().unwrap(), t.kx + t.m);
            assert_eq!(*t.noise.last().unwrap(), t.kx + t.m);
            assert_eq!(t.limiter[0], t.kx);
            assert_eq!(*t.limiter.last().unwrap(), t.kx + t.m);
            assert_eq!(t.n_low(), (t.n_high() + 1) / 2);
            assert!((1..=5).contains(&t.n_noise()));

            // 复制块覆盖全部 SBR 子带, 且源在 kx 以下
            let covered: usize = t.patches.iter().map(|p| p.len).sum();
            assert!(covered <= t.m);
            for p in &t.patches {
                assert!(p.source + p.len <= t.kx, "{sr}: {p:?} kx={}", t.kx);
            }
        }
    }

    #[test]
    fn test_交越频带越界() {
        let t = FrequencyTables::derive(&header(5, 9, 0), 44100).unwrap();
        assert_eq!(t.master.len() - 1, 16);
        assert!(matches!(
            FrequencyTables::derive(&header(5, 9, 16), 44100),
            Err(AacError::MalformedElement(_))
        ));
    }

    #[test]
    fn test_44k_默认头的各表() {
        let t = FrequencyTables::derive(&header(5, 9, 0), 44100).unwrap();
        assert_eq!((t.k0, t.k2, t.kx, t.m), (14, 47, 14, 33));
        assert_eq!(
            t.master,
            vec![14, 15, 16, 17, 18, 19, 20, 22, 24, 26, 28, 30, 33, 36, 39, 43, 47]
        );
        assert_eq!(t.low, vec![14, 16, 18, 20, 24, 28, 33, 39, 47]);
        assert_eq!(t.noise, vec![14, 18, 28, 47]);
        assert_eq!(t.limiter, vec![14, 18, 26, 36, 47]);
        assert_eq!(
            t.patches,
            vec![
                Patch { source: 2, len: 12 },
                Patch { source: 4, len: 10 },
                Patch { source: 2, len: 11 },
            ]
        );
    }

    #[test]
    fn test_不支持的采样率() {
        assert!(FrequencyTables::derive(&header(5, 9, 0), 14700).is_err());
    }

    #[test]
    fn test_关闭限幅频带() {
        let h = SbrHeader {
            limiter_bands: 0,
            ..header(5, 9, 0)
        };
        let t = FrequencyTables::derive(&h, 44100).unwrap();
        assert_eq!(t.limiter, vec![t.kx, t.kx + t.m]);
    }
}
