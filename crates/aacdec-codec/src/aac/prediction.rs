//! 主档次后向自适应预测与长时预测 (LTP).

use super::filterbank::Filterbank;
use super::ics::{IcsInfo, LtpData, MAX_LTP_BANDS, MAX_PREDICTORS, TnsData};
use super::state::{ChannelState, PredictorState};
use super::tables::{BandLayout, PRED_SFB_MAX};
use super::tns::{TnsMode, apply_tns};

/// 舍入到 16 位尾数 (就近, 平局远离零)
fn flt16_round(v: f32) -> f32 {
    f32::from_bits((v.to_bits().wrapping_add(0x0000_8000)) & 0xFFFF_0000)
}

/// 舍入到 16 位尾数 (就近, 平局取偶)
fn flt16_even(v: f32) -> f32 {
    let bits = v.to_bits();
    f32::from_bits(bits.wrapping_add(0x0000_7FFF + ((bits >> 16) & 1)) & 0xFFFF_0000)
}

/// 截断到 16 位尾数
fn flt16_trunc(v: f32) -> f32 {
    f32::from_bits(v.to_bits() & 0xFFFF_0000)
}

/// 单个频点的二阶格型预测; `output` 为 false 时只更新状态
fn predict(ps: &mut PredictorState, coef: &mut f32, output: bool) {
    const A: f32 = 0.953_125;
    const ALPHA: f32 = 0.906_25;

    let (r0, r1) = (ps.r0, ps.r1);
    let k1 = if ps.var0 > 1.0 {
        ps.cor0 * flt16_even(A / ps.var0)
    } else {
        0.0
    };
    let k2 = if ps.var1 > 1.0 {
        ps.cor1 * flt16_even(A / ps.var1)
    } else {
        0.0
    };

    let pv = flt16_round(k1 * r0 + k2 * r1);
    if output {
        *coef += pv;
    }

    let e0 = *coef;
    let e1 = e0 - k1 * r0;
    ps.cor1 = flt16_trunc(ALPHA * ps.cor1 + r1 * e1);
    ps.var1 = flt16_trunc(ALPHA * ps.var1 + 0.5 * (r1 * r1 + e1 * e1));
    ps.cor0 = flt16_trunc(ALPHA * ps.cor0 + r0 * e0);
    ps.var0 = flt16_trunc(ALPHA * ps.var0 + 0.5 * (r0 * r0 + e0 * e0));
    ps.r1 = flt16_trunc(A * (r0 - k1 * e0));
    ps.r0 = flt16_trunc(A * e0);
}

/// 主档次预测
///
/// 长窗口下对 PRED_SFB_MAX 以内的频点逐点运行预测器, 仅 prediction_used 的频带输出;
/// 短窗口复位全部预测器.
pub fn apply_main_prediction(
    info: &IcsInfo,
    layout: &BandLayout,
    spec: &mut [f32],
    predictors: &mut [PredictorState],
) {
    if predictors.is_empty() {
        return;
    }
    if info.window_sequence.is_short() {
        predictors.iter_mut().for_each(PredictorState::reset);
        return;
    }

    let offsets = &layout.long;
    let bands = PRED_SFB_MAX[layout.rate_index].min(offsets.len() - 1);
    for sfb in 0..bands {
        let used = info
            .prediction
            .as_ref()
            .is_some_and(|p| p.used.get(sfb).copied().unwrap_or(false));
        for k in offsets[sfb]..offsets[sfb + 1].min(MAX_PREDICTORS) {
            predict(&mut predictors[k], &mut spec[k], used);
        }
    }

    if let Some(group) = info.prediction.as_ref().and_then(|p| p.reset_group) {
        for ps in predictors.iter_mut().skip(usize::from(group) - 1).step_by(30) {
            ps.reset();
        }
    }
}

/// 长时预测: 由 LTP 历史估计当前帧频谱并叠加到启用的频带上
pub fn apply_long_term_prediction(
    info: &IcsInfo,
    ltp: &LtpData,
    tns: Option<&TnsData>,
    layout: &BandLayout,
    state: &ChannelState,
    filterbank: &mut Filterbank,
    spec: &mut [f32],
) {
    if info.window_sequence.is_short() || state.ltp_history.is_empty() {
        return;
    }
    let n = filterbank.frame_length();
    let mut estimate = vec![0.0f32; 2 * n];
    let count = if ltp.lag < n { ltp.lag + n } else { 2 * n };
    for (i, e) in estimate.iter_mut().take(count).enumerate() {
        if let Some(src) = (i + 2 * n).checked_sub(ltp.lag) {
            if let Some(&h) = state.ltp_history.get(src) {
                *e = h * ltp.coef;
            }
        }
    }

    let mut predicted = vec![0.0f32; n];
    filterbank.analyze(&mut estimate, info, state.prev_shape, &mut predicted);
    if let Some(tns) = tns {
        apply_tns(&mut predicted, tns, info, layout, TnsMode::Analysis);
    }

    let offsets = &layout.long;
    let bands = info.max_sfb.min(MAX_LTP_BANDS);
    for sfb in (0..bands).filter(|&sfb| ltp.used.get(sfb).copied().unwrap_or(false)) {
        for k in offsets[sfb]..offsets[sfb + 1] {
            spec[k] += predicted[k];
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aac::config::Profile;
    use crate::aac::ics::{MainPrediction, WindowSequence, WindowShape};

    fn long_info(prediction: Option<MainPrediction>) -> IcsInfo {
        IcsInfo {
            window_sequence: WindowSequence::OnlyLong,
            window_shape: WindowShape::Sine,
            max_sfb: 40,
            num_window_groups: 1,
            window_group_length: [1, 0, 0, 0, 0, 0, 0, 0],
            prediction,
            ltp: None,
            ltp_second: None,
        }
    }

    #[test]
    fn test_16位舍入() {
        assert_eq!(flt16_trunc(1.000_001), 1.0);
        assert_eq!(flt16_round(1.0), 1.0);
        let v = f32::from_bits(0x3F80_8000);
        assert_eq!(flt16_round(v).to_bits(), 0x3F81_0000);
        assert_eq!(flt16_even(v).to_bits(), 0x3F80_0000);
    }

    #[test]
    fn test_预测器收敛到常量输入() {
        let layout = BandLayout::new(4, 1024);
        let mut predictors = vec![PredictorState::default(); MAX_PREDICTORS];
        let info = long_info(Some(MainPrediction {
            reset_group: None,
            used: vec![true; 40],
        }));
        // 预测误差为零时, 编码端送零残差, 解码端应重建出稳定信号
        let mut last = 0.0;
        for _ in 0..50 {
            let mut spec = vec![0.0f32; 1024];
            spec[0] = 100.0;
            apply_main_prediction(&info, &layout, &mut spec, &mut predictors);
            last = spec[0];
        }
        assert!(last > 100.0);
        assert!(predictors[0].var0 > 1.0);
    }

    #[test]
    fn test_短窗口复位全部预测器() {
        let layout = BandLayout::new(4, 1024);
        let mut predictors = vec![PredictorState::default(); MAX_PREDICTORS];
        predictors[10].r0 = 5.0;
        let mut info = long_info(None);
        info.window_sequence = WindowSequence::EightShort;
        apply_main_prediction(&info, &layout, &mut [0.0; 1024], &mut predictors);
        assert_eq!(predictors[10], PredictorState::default());
    }

    #[test]
    fn test_复位组() {
        let layout = BandLayout::new(4, 1024);
        let mut predictors = vec![PredictorState::default(); MAX_PREDICTORS];
        let info = long_info(Some(MainPrediction {
            reset_group: Some(2),
            used: vec![false; 40],
        }));
        let mut spec = vec![50.0f32; 1024];
        apply_main_prediction(&info, &layout, &mut spec, &mut predictors);
        // 未启用预测时频谱不变, 但状态已更新
        assert_eq!(spec[0], 50.0);
        assert_ne!(predictors[0], PredictorState::default());
        assert_eq!(predictors[1], PredictorState::default());
        assert_eq!(predictors[31], PredictorState::default());
    }

    #[test]
    fn test_ltp_全零历史不改变频谱() {
        let layout = BandLayout::new(4, 1024);
        let state = ChannelState::new(1024, Profile::AacLtp);
        let mut fb = Filterbank::new(1024);
        let mut info = long_info(None);
        let ltp = LtpData {
            lag: 600,
            coef: 0.9,
            used: vec![true; 40],
        };
        info.ltp = Some(ltp.clone());
        let mut spec = vec![1.0f32; 1024];
        apply_long_term_prediction(&info, &ltp, None, &layout, &state, &mut fb, &mut spec);
        assert!(spec.iter().all(|&v| v == 1.0));
    }

    #[test]
    fn test_ltp_预测叠加() {
        let layout = BandLayout::new(4, 1024);
        let mut state = ChannelState::new(1024, Profile::AacLtp);
        for (i, h) in state.ltp_history.iter_mut().enumerate() {
            *h = 1000.0 * (i as f32 * 0.05).sin();
        }
        let mut fb = Filterbank::new(1024);
        let info = long_info(None);
        let mut ltp = LtpData {
            lag: 1024,
            coef: 1.0,
            used: vec![false; 40],
        };
        ltp.used[1] = true;
        let mut spec = vec![0.0f32; 1024];
        apply_long_term_prediction(&info, &ltp, None, &layout, &state, &mut fb, &mut spec);
        assert!(spec[..4].iter().all(|&v| v == 0.0));
        assert!(spec[4..8].iter().any(|&v| v != 0.0));
        assert!(spec[8..].iter().all(|&v| v == 0.0));
    }
}
