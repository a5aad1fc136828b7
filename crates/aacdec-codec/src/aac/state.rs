//! 跨帧的逐声道状态.

use super::config::Profile;
use super::ics::{MAX_PREDICTORS, WindowSequence, WindowShape};

/// 主档次单个频点的预测器状态
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PredictorState {
    pub r0: f32,
    pub r1: f32,
    pub cor0: f32,
    pub cor1: f32,
    pub var0: f32,
    pub var1: f32,
}

impl Default for PredictorState {
    fn default() -> Self {
        Self {
            r0: 0.0,
            r1: 0.0,
            cor0: 0.0,
            cor1: 0.0,
            var0: 1.0,
            var1: 1.0,
        }
    }
}

impl PredictorState {
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// 单个声道的跨帧状态
///
/// 只在整帧解析成功后才被修改.
#[derive(Debug, Clone)]
pub struct ChannelState {
    /// 上一帧 IMDCT 后半段 (已加窗)
    pub overlap: Vec<f32>,
    pub prev_sequence: WindowSequence,
    pub prev_shape: WindowShape,
    /// 主档次预测器, 其它档次为空
    pub predictors: Vec<PredictorState>,
    /// LTP 历史: 前两帧输出 + 当前帧重叠部分, 其它档次为空
    pub ltp_history: Vec<f32>,
}

impl ChannelState {
    pub fn new(frame_length: usize, profile: Profile) -> Self {
        let predictors = if profile == Profile::AacMain {
            vec![PredictorState::default(); MAX_PREDICTORS]
        } else {
            Vec::new()
        };
        let ltp_history = if matches!(profile, Profile::AacLtp | Profile::ErAacLtp) {
            vec![0.0; 3 * frame_length]
        } else {
            Vec::new()
        };
        Self {
            overlap: vec![0.0; frame_length],
            prev_sequence: WindowSequence::OnlyLong,
            prev_shape: WindowShape::Sine,
            predictors,
            ltp_history,
        }
    }

    pub fn frame_length(&self) -> usize {
        self.overlap.len()
    }

    /// 清空全部历史 (seek 后使用)
    pub fn reset(&mut self) {
        self.overlap.fill(0.0);
        self.prev_sequence = WindowSequence::OnlyLong;
        self.prev_shape = WindowShape::Sine;
        self.predictors.iter_mut().for_each(PredictorState::reset);
        self.ltp_history.fill(0.0);
    }

    /// 滤波器组输出后更新 LTP 历史
    pub fn update_ltp_history(&mut self, output: &[f32]) {
        if self.ltp_history.is_empty() {
            return;
        }
        let n = self.frame_length();
        self.ltp_history.copy_within(n..2 * n, 0);
        self.ltp_history[n..2 * n].copy_from_slice(&output[..n]);
        self.ltp_history[2 * n..].copy_from_slice(&self.overlap);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_按档次分配历史() {
        let lc = ChannelState::new(1024, Profile::AacLc);
        assert!(lc.predictors.is_empty() && lc.ltp_history.is_empty());
        let main = ChannelState::new(1024, Profile::AacMain);
        assert_eq!(main.predictors.len(), MAX_PREDICTORS);
        let ltp = ChannelState::new(960, Profile::AacLtp);
        assert_eq!(ltp.ltp_history.len(), 2880);
    }

    #[test]
    fn test_ltp_历史移位() {
        let mut state = ChannelState::new(4, Profile::AacLtp);
        state.overlap.copy_from_slice(&[9.0; 4]);
        state.update_ltp_history(&[1.0; 4]);
        state.update_ltp_history(&[2.0; 4]);
        assert_eq!(&state.ltp_history[..4], &[1.0; 4]);
        assert_eq!(&state.ltp_history[4..8], &[2.0; 4]);
        assert_eq!(&state.ltp_history[8..], &[9.0; 4]);
    }

    #[test]
    fn test_重置() {
        let mut state = ChannelState::new(1024, Profile::AacMain);
        state.overlap[0] = 1.0;
        state.prev_shape = WindowShape::Kbd;
        state.predictors[5].r0 = 3.0;
        state.reset();
        assert_eq!(state.overlap[0], 0.0);
        assert_eq!(state.prev_shape, WindowShape::Sine);
        assert_eq!(state.predictors[5], PredictorState::default());
    }
}
