//! 单声道流 (individual_channel_stream) 语法解析.
//!
//! 包括 ics_info、section_data、scale_factor_data、pulse_data、tns_data 与频谱数据.
//! 这里只产出量化值与边信息, 反量化等运算在 [`super::spectral`] 中完成.

use log::debug;

use aacdec_core::bitreader::BitReader;
use aacdec_core::{AacError, AacResult};

use super::config::Profile;
use super::huffman::codebooks;
use super::tables::{BandLayout, PRED_SFB_MAX};

pub const ZERO_HCB: u8 = 0;
pub const ESC_HCB: u8 = 11;
pub const RESERVED_HCB: u8 = 12;
pub const NOISE_HCB: u8 = 13;
pub const INTENSITY_HCB2: u8 = 14;
pub const INTENSITY_HCB: u8 = 15;

/// 单个窗口组内比例因子频带数上限
pub const MAX_BANDS: usize = 64;
/// LTP 可用的长窗口频带数上限
pub const MAX_LTP_BANDS: usize = 40;
/// 主档次预测器数量
pub const MAX_PREDICTORS: usize = 672;

/// LTP 系数表
pub const LTP_COEF: [f32; 8] = [
    0.570829, 0.696616, 0.813004, 0.911304, 0.984900, 1.067894, 1.194601, 1.369533,
];

/// 窗口序列
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WindowSequence {
    #[default]
    OnlyLong,
    LongStart,
    EightShort,
    LongStop,
}

impl WindowSequence {
    pub fn from_bits(bits: u32) -> Self {
        match bits & 3 {
            0 => Self::OnlyLong,
            1 => Self::LongStart,
            2 => Self::EightShort,
            _ => Self::LongStop,
        }
    }

    pub fn is_short(self) -> bool {
        self == Self::EightShort
    }

    pub fn num_windows(self) -> usize {
        if self.is_short() { 8 } else { 1 }
    }
}

/// 窗形状
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WindowShape {
    #[default]
    Sine,
    Kbd,
}

/// 主档次预测边信息
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MainPrediction {
    /// 预测器复位组 (1..=30)
    pub reset_group: Option<u8>,
    /// 逐频带 prediction_used
    pub used: Vec<bool>,
}

impl MainPrediction {
    fn parse(br: &mut BitReader, max_sfb: usize, rate_index: usize) -> AacResult<Self> {
        let reset_group = if br.read_flag()? {
            let group = br.read_bits(5)? as u8;
            if group == 0 || group > 30 {
                return Err(AacError::malformed(format!(
                    "AAC: 预测器复位组 {group} 无效"
                )));
            }
            Some(group)
        } else {
            None
        };
        let bands = max_sfb.min(PRED_SFB_MAX[rate_index]);
        let used = (0..bands)
            .map(|_| br.read_flag())
            .collect::<AacResult<Vec<_>>>()?;
        Ok(Self { reset_group, used })
    }
}

/// 长时预测 (LTP) 边信息
#[derive(Debug, Clone, PartialEq)]
pub struct LtpData {
    pub lag: usize,
    pub coef: f32,
    /// 逐频带 ltp_long_used
    pub used: Vec<bool>,
}

impl LtpData {
    fn parse(br: &mut BitReader, max_sfb: usize) -> AacResult<Self> {
        let lag = br.read_bits(11)? as usize;
        let coef = LTP_COEF[br.read_bits(3)? as usize];
        let used = (0..max_sfb.min(MAX_LTP_BANDS))
            .map(|_| br.read_flag())
            .collect::<AacResult<Vec<_>>>()?;
        Ok(Self { lag, coef, used })
    }
}

/// 解析时需要的流级上下文
#[derive(Debug, Clone, Copy)]
pub struct ParseContext<'a> {
    pub profile: Profile,
    pub layout: &'a BandLayout,
}

impl ParseContext<'_> {
    /// ER 语法: TNS 数据位于 gain control 之后
    fn er_syntax(&self) -> bool {
        matches!(self.profile, Profile::ErAacLc | Profile::ErAacLtp)
    }
}

/// ics_info
#[derive(Debug, Clone, PartialEq)]
pub struct IcsInfo {
    pub window_sequence: WindowSequence,
    pub window_shape: WindowShape,
    pub max_sfb: usize,
    pub num_window_groups: usize,
    pub window_group_length: [usize; 8],
    pub prediction: Option<MainPrediction>,
    pub ltp: Option<LtpData>,
    /// 公共窗口 CPE 中第二声道的 LTP 数据
    pub ltp_second: Option<LtpData>,
}

impl IcsInfo {
    pub fn parse(br: &mut BitReader, ctx: &ParseContext, common_window: bool) -> AacResult<Self> {
        if br.read_flag()? {
            debug!("AAC: ics_info 保留位被置位");
        }
        let window_sequence = WindowSequence::from_bits(br.read_bits(2)?);
        let window_shape = if br.read_flag()? {
            WindowShape::Kbd
        } else {
            WindowShape::Sine
        };
        let mut info = Self {
            window_sequence,
            window_shape,
            max_sfb: 0,
            num_window_groups: 1,
            window_group_length: [1, 0, 0, 0, 0, 0, 0, 0],
            prediction: None,
            ltp: None,
            ltp_second: None,
        };

        if window_sequence.is_short() {
            info.max_sfb = br.read_bits(4)? as usize;
            let grouping = br.read_bits(7)?;
            for i in 0..7 {
                if grouping & (1 << (6 - i)) != 0 {
                    info.window_group_length[info.num_window_groups - 1] += 1;
                } else {
                    info.num_window_groups += 1;
                    info.window_group_length[info.num_window_groups - 1] = 1;
                }
            }
        } else {
            info.max_sfb = br.read_bits(6)? as usize;
            if br.read_flag()? {
                match ctx.profile {
                    Profile::AacMain => {
                        info.prediction = Some(MainPrediction::parse(
                            br,
                            info.max_sfb,
                            ctx.layout.rate_index,
                        )?);
                    }
                    Profile::AacLtp | Profile::ErAacLtp => {
                        if br.read_flag()? {
                            info.ltp = Some(LtpData::parse(br, info.max_sfb)?);
                        }
                        if common_window && br.read_flag()? {
                            info.ltp_second = Some(LtpData::parse(br, info.max_sfb)?);
                        }
                    }
                    other => {
                        return Err(AacError::malformed(format!(
                            "AAC: {other:?} 不支持预测数据"
                        )));
                    }
                }
            }
        }

        let num_bands = info.num_bands(ctx.layout);
        if info.max_sfb > num_bands {
            return Err(AacError::malformed(format!(
                "AAC: max_sfb {} 超过频带数 {num_bands}",
                info.max_sfb
            )));
        }
        Ok(info)
    }

    pub fn num_windows(&self) -> usize {
        self.window_sequence.num_windows()
    }

    /// 当前窗口类型的频带边界
    pub fn band_offsets<'a>(&self, layout: &'a BandLayout) -> &'a [usize] {
        if self.window_sequence.is_short() {
            &layout.short
        } else {
            &layout.long
        }
    }

    pub fn num_bands(&self, layout: &BandLayout) -> usize {
        self.band_offsets(layout).len() - 1
    }

    /// 单个窗口的频谱长度
    pub fn window_length(&self, layout: &BandLayout) -> usize {
        if self.window_sequence.is_short() {
            layout.short_length()
        } else {
            layout.frame_length
        }
    }

    /// 各窗口组的 (起始窗口, 窗口数)
    pub fn groups(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        let mut start = 0;
        self.window_group_length[..self.num_window_groups]
            .iter()
            .map(move |&len| {
                let group = (start, len);
                start += len;
                group
            })
    }
}

/// 脉冲数据, 位置已换算为频谱下标
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PulseData {
    pub positions: Vec<usize>,
    pub amplitudes: Vec<i32>,
}

impl PulseData {
    fn parse(br: &mut BitReader, offsets: &[usize]) -> AacResult<Self> {
        let count = br.read_bits(2)? as usize + 1;
        let start_sfb = br.read_bits(6)? as usize;
        let num_bands = offsets.len() - 1;
        if start_sfb >= num_bands {
            return Err(AacError::malformed(format!(
                "AAC: 脉冲起始频带 {start_sfb} 越界"
            )));
        }
        let limit = offsets[num_bands];
        let mut pos = offsets[start_sfb];
        let mut positions = Vec::with_capacity(count);
        let mut amplitudes = Vec::with_capacity(count);
        for _ in 0..count {
            pos += br.read_bits(5)? as usize;
            if pos >= limit {
                return Err(AacError::malformed("AAC: 脉冲位置越界"));
            }
            positions.push(pos);
            amplitudes.push(br.read_bits(4)? as i32);
        }
        Ok(Self {
            positions,
            amplitudes,
        })
    }
}

/// 单个 TNS 滤波器
#[derive(Debug, Clone, PartialEq)]
pub struct TnsFilter {
    /// 覆盖的频带数
    pub length: usize,
    pub order: usize,
    /// 自高频向低频滤波
    pub descending: bool,
    /// 反射系数
    pub coef: [f32; 20],
}

/// tns_data, 每个窗口一组滤波器
#[derive(Debug, Clone, PartialEq)]
pub struct TnsData {
    pub windows: Vec<Vec<TnsFilter>>,
}

impl TnsData {
    fn parse(br: &mut BitReader, info: &IcsInfo, profile: Profile) -> AacResult<Self> {
        let short = info.window_sequence.is_short();
        let (filt_bits, length_bits, order_bits) = if short { (1, 4, 3) } else { (2, 6, 5) };
        let max_order = if short {
            7
        } else if profile == Profile::AacMain {
            20
        } else {
            12
        };

        let mut windows = Vec::with_capacity(info.num_windows());
        for _ in 0..info.num_windows() {
            let n_filt = br.read_bits(filt_bits)? as usize;
            let mut filters = Vec::with_capacity(n_filt);
            if n_filt > 0 {
                let coef_res = br.read_bits(1)? + 3;
                for _ in 0..n_filt {
                    let length = br.read_bits(length_bits)? as usize;
                    let order = br.read_bits(order_bits)? as usize;
                    if order > max_order {
                        return Err(AacError::malformed(format!(
                            "AAC: TNS 阶数 {order} 超过上限 {max_order}"
                        )));
                    }
                    let mut filter = TnsFilter {
                        length,
                        order,
                        descending: false,
                        coef: [0.0; 20],
                    };
                    if order > 0 {
                        filter.descending = br.read_flag()?;
                        let compress = br.read_bits(1)?;
                        let coef_len = coef_res - compress;
                        for c in filter.coef.iter_mut().take(order) {
                            let raw = br.read_bits(coef_len)?;
                            *c = tns_coef(raw, coef_len, coef_res);
                        }
                    }
                    filters.push(filter);
                }
            }
            windows.push(filters);
        }
        Ok(Self { windows })
    }
}

/// 将 `coef_len` 位有符号 TNS 系数索引换算为反射系数
fn tns_coef(raw: u32, coef_len: u32, coef_res: u32) -> f32 {
    let shift = 32 - coef_len;
    let value = ((raw << shift) as i32 >> shift) as f64;
    let half = f64::from(1u32 << (coef_res - 1));
    let iqfac = if value >= 0.0 {
        (half - 0.5) / std::f64::consts::FRAC_PI_2
    } else {
        (half + 0.5) / std::f64::consts::FRAC_PI_2
    };
    (value / iqfac).sin() as f32
}

/// 一个已解析的单声道流
#[derive(Debug, Clone)]
pub struct ChannelStream {
    pub global_gain: u8,
    pub info: IcsInfo,
    /// 各窗口组各频带的码本
    pub band_types: [[u8; MAX_BANDS]; 8],
    /// 比例因子 / 强度位置 / 噪声能量, 含义由码本决定
    pub scalefactors: [[i32; MAX_BANDS]; 8],
    pub pulse: Option<PulseData>,
    pub tns: Option<TnsData>,
    /// 量化频谱, 短窗口按窗口依次排列
    pub quant: Vec<i32>,
}

impl ChannelStream {
    /// 解析 individual_channel_stream
    ///
    /// `common` 为公共窗口 CPE 已读出的 ics_info.
    pub fn parse(
        br: &mut BitReader,
        ctx: &ParseContext,
        common: Option<&IcsInfo>,
    ) -> AacResult<Self> {
        let global_gain = br.read_bits(8)? as u8;
        let info = match common {
            Some(info) => info.clone(),
            None => IcsInfo::parse(br, ctx, false)?,
        };
        let mut stream = Self {
            global_gain,
            info,
            band_types: [[ZERO_HCB; MAX_BANDS]; 8],
            scalefactors: [[0; MAX_BANDS]; 8],
            pulse: None,
            tns: None,
            quant: vec![0; ctx.layout.frame_length],
        };

        stream.parse_section_data(br)?;
        stream.parse_scalefactors(br)?;

        if br.read_flag()? {
            if stream.info.window_sequence.is_short() {
                return Err(AacError::malformed("AAC: 短窗口不允许脉冲数据"));
            }
            stream.pulse = Some(PulseData::parse(br, &ctx.layout.long)?);
        }
        let tns_present = br.read_flag()?;
        if tns_present && !ctx.er_syntax() {
            stream.tns = Some(TnsData::parse(br, &stream.info, ctx.profile)?);
        }
        if br.read_flag()? {
            return Err(AacError::Unsupported("AAC: gain control (SSR) 数据".into()));
        }
        if tns_present && ctx.er_syntax() {
            stream.tns = Some(TnsData::parse(br, &stream.info, ctx.profile)?);
        }

        stream.parse_spectral_data(br, ctx.layout)?;
        Ok(stream)
    }

    fn parse_section_data(&mut self, br: &mut BitReader) -> AacResult<()> {
        let sect_bits = if self.info.window_sequence.is_short() { 3 } else { 5 };
        let sect_esc = (1u32 << sect_bits) - 1;
        let max_sfb = self.info.max_sfb;

        for g in 0..self.info.num_window_groups {
            let mut k = 0;
            while k < max_sfb {
                let cb = br.read_bits(4)? as u8;
                if cb == RESERVED_HCB {
                    return Err(AacError::malformed(format!(
                        "AAC: 组 {g} 频带 {k} 使用保留码本 12"
                    )));
                }
                let mut end = k;
                loop {
                    let incr = br.read_bits(sect_bits)?;
                    end += incr as usize;
                    if end > max_sfb {
                        return Err(AacError::malformed(format!(
                            "AAC: section 越过 max_sfb ({end} > {max_sfb})"
                        )));
                    }
                    if incr != sect_esc {
                        break;
                    }
                }
                self.band_types[g][k..end].fill(cb);
                k = end;
            }
        }
        Ok(())
    }

    fn parse_scalefactors(&mut self, br: &mut BitReader) -> AacResult<()> {
        let cbs = codebooks();
        let global_gain = i32::from(self.global_gain);
        let mut sf = global_gain;
        let mut noise = global_gain - 90;
        let mut position = 0i32;
        let mut first_noise = true;

        for g in 0..self.info.num_window_groups {
            for sfb in 0..self.info.max_sfb {
                self.scalefactors[g][sfb] = match self.band_types[g][sfb] {
                    ZERO_HCB => 0,
                    INTENSITY_HCB | INTENSITY_HCB2 => {
                        // 累加值保留原值, 只裁剪存储的位置
                        position += cbs.decode_scalefactor_delta(br)?;
                        let clipped = position.clamp(-155, 100);
                        if clipped != position {
                            debug!("AAC: 强度位置 {position} 越界, 裁剪为 {clipped}");
                        }
                        clipped
                    }
                    NOISE_HCB => {
                        if first_noise {
                            first_noise = false;
                            noise += br.read_bits(9)? as i32 - 256;
                        } else {
                            noise += cbs.decode_scalefactor_delta(br)?;
                        }
                        if !(-100..=155).contains(&noise) {
                            return Err(AacError::malformed(format!(
                                "AAC: 噪声能量 {noise} 越界"
                            )));
                        }
                        noise
                    }
                    _ => {
                        sf += cbs.decode_scalefactor_delta(br)?;
                        if !(0..=255).contains(&sf) {
                            return Err(AacError::malformed(format!(
                                "AAC: 比例因子 {sf} 越界"
                            )));
                        }
                        sf
                    }
                };
            }
        }
        Ok(())
    }

    fn parse_spectral_data(&mut self, br: &mut BitReader, layout: &BandLayout) -> AacResult<()> {
        let cbs = codebooks();
        let offsets = self.info.band_offsets(layout);
        let win_len = self.info.window_length(layout);
        let mut values = [0i32; 4];

        let groups: Vec<(usize, usize)> = self.info.groups().collect();
        for (g, (first_win, group_len)) in groups.into_iter().enumerate() {
            for sfb in 0..self.info.max_sfb {
                let cb = self.band_types[g][sfb];
                if matches!(cb, ZERO_HCB | NOISE_HCB | INTENSITY_HCB | INTENSITY_HCB2) {
                    continue;
                }
                let book = cbs.spectral(cb)?;
                let (start, end) = (offsets[sfb], offsets[sfb + 1]);
                for w in first_win..first_win + group_len {
                    let base = w * win_len;
                    let mut k = start;
                    while k < end {
                        book.decode_values(br, &mut values)?;
                        let n = book.dim.min(end - k);
                        self.quant[base + k..base + k + n].copy_from_slice(&values[..n]);
                        k += book.dim;
                    }
                }
            }
        }
        Ok(())
    }

    /// 窗口 `w` 所属的窗口组
    pub fn group_of_window(&self, w: usize) -> usize {
        self.info
            .groups()
            .position(|(start, len)| w >= start && w < start + len)
            .unwrap_or(0)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::aac::huffman::tests::{write_scalefactor_delta, write_spectral_codeword};
    use aacdec_core::bitwriter::BitWriter;

    pub(crate) fn layout_44k() -> BandLayout {
        BandLayout::new(4, 1024)
    }

    /// 写出长窗口 ics_info (无预测)
    pub(crate) fn write_long_ics_info(bw: &mut BitWriter, max_sfb: u32) {
        bw.write_bits(0, 1);
        bw.write_bits(0, 2);
        bw.write_bits(0, 1);
        bw.write_bits(max_sfb, 6);
        bw.write_bits(0, 1);
    }

    /// 写出一个长窗口 ICS: 前 `bands` 个频带用码本 1, 每个频谱值为 `quad_idx` 对应的四元组,
    /// 比例因子全部等于 global_gain
    pub(crate) fn write_simple_ics(
        bw: &mut BitWriter,
        global_gain: u32,
        bands: u32,
        quad_idx: usize,
        with_info: bool,
    ) {
        let layout = layout_44k();
        bw.write_bits(global_gain, 8);
        if with_info {
            write_long_ics_info(bw, bands);
        }
        if bands > 0 {
            bw.write_bits(1, 4);
            bw.write_bits(bands, 5);
        }
        for _ in 0..bands {
            write_scalefactor_delta(bw, 0);
        }
        bw.write_bits(0, 3); // pulse, tns, gain control
        for sfb in 0..bands as usize {
            let width = layout.long[sfb + 1] - layout.long[sfb];
            for _ in 0..width / 4 {
                write_spectral_codeword(bw, 1, quad_idx);
            }
        }
    }

    fn ctx(profile: Profile, layout: &BandLayout) -> ParseContext<'_> {
        ParseContext { profile, layout }
    }

    #[test]
    fn test_全零长窗口() {
        let layout = layout_44k();
        let mut bw = BitWriter::new();
        write_simple_ics(&mut bw, 100, 0, 0, true);
        let data = bw.finish();
        let mut br = BitReader::new(&data);
        let stream = ChannelStream::parse(&mut br, &ctx(Profile::AacLc, &layout), None).unwrap();
        assert_eq!(stream.info.max_sfb, 0);
        assert!(stream.quant.iter().all(|&q| q == 0));
    }

    #[test]
    fn test_码本1_频谱值() {
        let layout = layout_44k();
        let mut bw = BitWriter::new();
        // 索引 80 → [2, 2, 2, 2] - 1 = [1, 1, 1, 1]
        write_simple_ics(&mut bw, 100, 2, 80, true);
        let data = bw.finish();
        let mut br = BitReader::new(&data);
        let stream = ChannelStream::parse(&mut br, &ctx(Profile::AacLc, &layout), None).unwrap();
        assert_eq!(stream.band_types[0][0], 1);
        assert_eq!(stream.scalefactors[0][1], 100);
        assert!(stream.quant[..8].iter().all(|&q| q == 1));
        assert!(stream.quant[8..].iter().all(|&q| q == 0));
    }

    #[test]
    fn test_短窗口分组() {
        let layout = layout_44k();
        let mut bw = BitWriter::new();
        bw.write_bits(0, 1);
        bw.write_bits(2, 2);
        bw.write_bits(1, 1);
        bw.write_bits(0, 4);
        bw.write_bits(0b1101011, 7);
        let data = bw.finish();
        let mut br = BitReader::new(&data);
        let info = IcsInfo::parse(&mut br, &ctx(Profile::AacLc, &layout), false).unwrap();
        assert_eq!(info.window_shape, WindowShape::Kbd);
        assert_eq!(info.num_window_groups, 3);
        assert_eq!(&info.window_group_length[..3], &[3, 2, 3]);
        let groups: Vec<_> = info.groups().collect();
        assert_eq!(groups, vec![(0, 3), (3, 2), (5, 3)]);
    }

    #[test]
    fn test_max_sfb_越界() {
        let layout = layout_44k();
        let mut bw = BitWriter::new();
        write_long_ics_info(&mut bw, 50);
        let data = bw.finish();
        let mut br = BitReader::new(&data);
        assert!(matches!(
            IcsInfo::parse(&mut br, &ctx(Profile::AacLc, &layout), false),
            Err(AacError::MalformedElement(_))
        ));
    }

    #[test]
    fn test_lc_不允许预测数据() {
        let layout = layout_44k();
        let mut bw = BitWriter::new();
        bw.write_bits(0, 4);
        bw.write_bits(10, 6);
        bw.write_bits(1, 1);
        let data = bw.finish();
        let mut br = BitReader::new(&data);
        assert!(matches!(
            IcsInfo::parse(&mut br, &ctx(Profile::AacLc, &layout), false),
            Err(AacError::MalformedElement(_))
        ));
    }

    #[test]
    fn test_ltp_数据() {
        let layout = layout_44k();
        let mut bw = BitWriter::new();
        bw.write_bits(0, 4);
        bw.write_bits(3, 6);
        bw.write_bits(1, 1); // predictor_data_present
        bw.write_bits(1, 1); // ltp_data_present
        bw.write_bits(1500, 11);
        bw.write_bits(4, 3);
        bw.write_bits(0b101, 3);
        bw.write_bits(0, 1); // 第二声道无 LTP
        let data = bw.finish();
        let mut br = BitReader::new(&data);
        let info = IcsInfo::parse(&mut br, &ctx(Profile::AacLtp, &layout), true).unwrap();
        let ltp = info.ltp.unwrap();
        assert_eq!(ltp.lag, 1500);
        assert_eq!(ltp.coef, LTP_COEF[4]);
        assert_eq!(ltp.used, vec![true, false, true]);
        assert!(info.ltp_second.is_none());
    }

    #[test]
    fn test_主档次预测复位组() {
        let layout = layout_44k();
        let mut bw = BitWriter::new();
        bw.write_bits(0, 4);
        bw.write_bits(2, 6);
        bw.write_bits(1, 1);
        bw.write_bits(1, 1);
        bw.write_bits(31, 5);
        let data = bw.finish();
        let mut br = BitReader::new(&data);
        assert!(IcsInfo::parse(&mut br, &ctx(Profile::AacMain, &layout), false).is_err());
    }

    #[test]
    fn test_保留码本12() {
        let layout = layout_44k();
        let mut bw = BitWriter::new();
        bw.write_bits(100, 8);
        write_long_ics_info(&mut bw, 1);
        bw.write_bits(12, 4);
        bw.write_bits(1, 5);
        let data = bw.finish();
        let mut br = BitReader::new(&data);
        assert!(matches!(
            ChannelStream::parse(&mut br, &ctx(Profile::AacLc, &layout), None),
            Err(AacError::MalformedElement(_))
        ));
    }

    #[test]
    fn test_section_越过_max_sfb() {
        let layout = layout_44k();
        let mut bw = BitWriter::new();
        bw.write_bits(100, 8);
        write_long_ics_info(&mut bw, 2);
        bw.write_bits(1, 4);
        bw.write_bits(3, 5);
        let data = bw.finish();
        let mut br = BitReader::new(&data);
        assert!(ChannelStream::parse(&mut br, &ctx(Profile::AacLc, &layout), None).is_err());
    }

    #[test]
    fn test_噪声与强度比例因子() {
        let layout = layout_44k();
        let mut bw = BitWriter::new();
        bw.write_bits(120, 8);
        write_long_ics_info(&mut bw, 3);
        bw.write_bits(u32::from(NOISE_HCB), 4);
        bw.write_bits(2, 5);
        bw.write_bits(u32::from(INTENSITY_HCB), 4);
        bw.write_bits(1, 5);
        bw.write_bits(260, 9); // 噪声: 120 - 90 + 4
        write_scalefactor_delta(&mut bw, -3);
        write_scalefactor_delta(&mut bw, 7);
        bw.write_bits(0, 3);
        let data = bw.finish();
        let mut br = BitReader::new(&data);
        let s = ChannelStream::parse(&mut br, &ctx(Profile::AacLc, &layout), None).unwrap();
        assert_eq!(&s.scalefactors[0][..3], &[34, 31, 7]);
    }

    #[test]
    fn test_强度位置越界裁剪() {
        let layout = layout_44k();
        let mut bw = BitWriter::new();
        bw.write_bits(100, 8);
        write_long_ics_info(&mut bw, 3);
        bw.write_bits(u32::from(INTENSITY_HCB), 4);
        bw.write_bits(3, 5);
        write_scalefactor_delta(&mut bw, 60);
        write_scalefactor_delta(&mut bw, 60);
        write_scalefactor_delta(&mut bw, -30);
        bw.write_bits(0, 3);
        let data = bw.finish();
        let mut br = BitReader::new(&data);
        let s = ChannelStream::parse(&mut br, &ctx(Profile::AacLc, &layout), None).unwrap();
        // 120 裁剪为 100, 累加器仍从 120 继续
        assert_eq!(&s.scalefactors[0][..3], &[60, 100, 90]);
    }

    #[test]
    fn test_比例因子越界() {
        let layout = layout_44k();
        let mut bw = BitWriter::new();
        bw.write_bits(250, 8);
        write_long_ics_info(&mut bw, 1);
        bw.write_bits(1, 4);
        bw.write_bits(1, 5);
        write_scalefactor_delta(&mut bw, 10);
        let data = bw.finish();
        let mut br = BitReader::new(&data);
        assert!(matches!(
            ChannelStream::parse(&mut br, &ctx(Profile::AacLc, &layout), None),
            Err(AacError::MalformedElement(_))
        ));
    }

    #[test]
    fn test_脉冲数据() {
        let mut bw = BitWriter::new();
        bw.write_bits(1, 2); // 2 个脉冲
        bw.write_bits(2, 6);
        bw.write_bits(3, 5);
        bw.write_bits(5, 4);
        bw.write_bits(4, 5);
        bw.write_bits(2, 4);
        let data = bw.finish();
        let mut br = BitReader::new(&data);
        let layout = layout_44k();
        let pulse = PulseData::parse(&mut br, &layout.long).unwrap();
        assert_eq!(pulse.positions, vec![11, 15]);
        assert_eq!(pulse.amplitudes, vec![5, 2]);
    }

    #[test]
    fn test_tns_系数() {
        // 4 位分辨率: 索引 0 → 0, 7 → sin(7 / (7.5 / (π/2)))
        assert_eq!(tns_coef(0, 4, 4), 0.0);
        let expect = (7.0f64 / (7.5 / std::f64::consts::FRAC_PI_2)).sin() as f32;
        assert!((tns_coef(7, 4, 4) - expect).abs() < 1e-6);
        // 负值使用 iqfac_m
        let expect = (-8.0f64 / (8.5 / std::f64::consts::FRAC_PI_2)).sin() as f32;
        assert!((tns_coef(8, 4, 4) - expect).abs() < 1e-6);
        // 压缩: 3 位读出, 仍按 4 位分辨率换算
        assert!(tns_coef(0b111, 3, 4) < 0.0);
    }

    #[test]
    fn test_tns_阶数越界() {
        let info = IcsInfo {
            window_sequence: WindowSequence::OnlyLong,
            window_shape: WindowShape::Sine,
            max_sfb: 10,
            num_window_groups: 1,
            window_group_length: [1, 0, 0, 0, 0, 0, 0, 0],
            prediction: None,
            ltp: None,
            ltp_second: None,
        };
        let mut bw = BitWriter::new();
        bw.write_bits(1, 2);
        bw.write_bits(0, 1);
        bw.write_bits(10, 6);
        bw.write_bits(13, 5);
        let data = bw.finish();
        let mut br = BitReader::new(&data);
        assert!(matches!(
            TnsData::parse(&mut br, &info, Profile::AacLc),
            Err(AacError::MalformedElement(_))
        ));
        // 主档次允许 13 阶, 此处因系数不足而耗尽
        let mut br = BitReader::new(&data);
        assert!(matches!(
            TnsData::parse(&mut br, &info, Profile::AacMain),
            Err(AacError::EndOfStream)
        ));
    }
}
