//! 时域噪声整形 (TNS).

use super::ics::{IcsInfo, TnsData};
use super::tables::{BandLayout, TNS_MAX_BANDS_LONG, TNS_MAX_BANDS_SHORT};

/// 滤波方向
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TnsMode {
    /// 解码端全极点滤波
    Synthesis,
    /// 全零滤波 (LTP 预测频谱)
    Analysis,
}

/// 将 TNS 反射系数转换为 LPC 系数.
fn compute_lpc(coefs: &[f32]) -> [f32; 20] {
    let mut lpc = [0.0f32; 20];
    if coefs.is_empty() {
        return lpc;
    }
    lpc[0] = coefs[0];
    for i in 1..coefs.len() {
        let r = coefs[i];
        for j in 0..(i / 2) {
            let tmp = r * lpc[j];
            lpc[j] += r * lpc[i - 1 - j];
            lpc[i - 1 - j] += tmp;
        }
        if i % 2 != 0 {
            let j = i / 2;
            lpc[j] += r * lpc[j];
        }
        lpc[i] = r;
    }
    lpc
}

/// 在频域上应用 TNS 滤波.
pub fn apply_tns(
    spec: &mut [f32],
    tns: &TnsData,
    info: &IcsInfo,
    layout: &BandLayout,
    mode: TnsMode,
) {
    let short = info.window_sequence.is_short();
    let max_bands = if short {
        TNS_MAX_BANDS_SHORT[layout.rate_index]
    } else {
        TNS_MAX_BANDS_LONG[layout.rate_index]
    };
    let mmm = max_bands.min(info.max_sfb);
    let offsets = info.band_offsets(layout);
    let num_bands = info.num_bands(layout);
    let win_len = info.window_length(layout);

    for (w, filters) in tns.windows.iter().enumerate() {
        let window = &mut spec[w * win_len..(w + 1) * win_len];
        let mut bottom = num_bands;
        for filter in filters {
            let top = bottom;
            bottom = top.saturating_sub(filter.length);
            let order = filter.order;
            if order == 0 {
                continue;
            }
            let start = offsets[bottom.min(mmm)];
            let end = offsets[top.min(mmm)];
            if end <= start {
                continue;
            }
            let lpc = compute_lpc(&filter.coef[..order]);
            let band = &mut window[start..end];
            if filter.descending {
                band.reverse();
            }
            match mode {
                TnsMode::Synthesis => {
                    for m in 0..band.len() {
                        let mut acc = band[m];
                        for i in 1..=m.min(order) {
                            acc -= band[m - i] * lpc[i - 1];
                        }
                        band[m] = acc;
                    }
                }
                TnsMode::Analysis => {
                    let mut state = [0.0f32; 21];
                    for v in band.iter_mut() {
                        let x = *v;
                        let mut acc = x;
                        for i in 1..=order {
                            acc += state[i - 1] * lpc[i - 1];
                        }
                        state.copy_within(0..order - 1, 1);
                        state[0] = x;
                        *v = acc;
                    }
                }
            }
            if filter.descending {
                band.reverse();
            }
        }
    }
}
