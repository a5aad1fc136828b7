//! 参数立体声 (ISO/IEC 14496-3 8.6.4).
//!
//! 按基线 20 频带配置合成: 10/34 频带参数映射到 20 频带, IPD/OPD 只解析.
//! 混合分析借用 SBR 输出的 6 个前视时隙, 不额外引入延迟.

use std::sync::OnceLock;

use aacdec_core::bitreader::BitReader;
use aacdec_core::{AacError, AacResult};
use log::debug;

use super::qmf::{Cplx, QmfRow, SYNTHESIS_BANDS};
use super::tables::{Codebook, ps_codebooks};

/// 含补齐的最后一个包络
const MAX_ENVELOPES: usize = 5;
const MAX_PAR: usize = 34;
const NR_IIDICC_PAR: [usize; 6] = [10, 20, 34, 10, 20, 34];
const NR_IPDOPD_PAR: [usize; 6] = [5, 11, 17, 5, 11, 17];
/// [frame_class][num_env_idx]
const NUM_ENV: [[usize; 4]; 2] = [[0, 1, 2, 4], [1, 2, 3, 4]];

type ParRow = [i32; MAX_PAR];

/// 跨帧保存的 PS 参数
#[derive(Debug, Clone)]
pub struct PsParameters {
    started: bool,
    enable_iid: bool,
    iid_fine: bool,
    nr_iid: usize,
    enable_icc: bool,
    nr_icc: usize,
    enable_ext: bool,
    nr_ipdopd: usize,
    num_env: usize,
    num_env_prev: usize,
    /// 包络结束时隙, border[0] = -1
    border: [i32; MAX_ENVELOPES + 1],
    iid: [ParRow; MAX_ENVELOPES],
    icc: [ParRow; MAX_ENVELOPES],
    ipd: [ParRow; MAX_ENVELOPES],
    opd: [ParRow; MAX_ENVELOPES],
}

impl Default for PsParameters {
    fn default() -> Self {
        Self {
            started: false,
            enable_iid: false,
            iid_fine: false,
            nr_iid: 20,
            enable_icc: false,
            nr_icc: 20,
            enable_ext: false,
            nr_ipdopd: 11,
            num_env: 0,
            num_env_prev: 0,
            border: [-1; MAX_ENVELOPES + 1],
            iid: [[0; MAX_PAR]; MAX_ENVELOPES],
            icc: [[0; MAX_PAR]; MAX_ENVELOPES],
            ipd: [[0; MAX_PAR]; MAX_ENVELOPES],
            opd: [[0; MAX_PAR]; MAX_ENVELOPES],
        }
    }
}

impl PsParameters {
    /// 是否已有有效的 PS 数据
    pub fn started(&self) -> bool {
        self.started
    }

    pub fn num_env(&self) -> usize {
        self.num_env
    }

    /// 解析 ps_data, 返回消耗的位数
    ///
    /// 参数非法时清零参数并跳过 `bits_left` 位, 只有码流耗尽才返回错误.
    pub fn read(&mut self, br: &mut BitReader, bits_left: usize, slots: usize) -> AacResult<usize> {
        let start = br.bits_read();
        match self.read_data(br, slots) {
            Ok(()) => {
                self.started = true;
                Ok(br.bits_read() - start)
            }
            Err(AacError::EndOfStream) => Err(AacError::EndOfStream),
            Err(err) => {
                debug!("PS: {err}, 参数清零");
                self.started = false;
                for rows in [&mut self.iid, &mut self.icc, &mut self.ipd, &mut self.opd] {
                    *rows = [[0; MAX_PAR]; MAX_ENVELOPES];
                }
                let used = br.bits_read() - start;
                if used < bits_left {
                    br.skip_bits_usize(bits_left - used)?;
                }
                Ok(used.max(bits_left))
            }
        }
    }

    fn read_data(&mut self, br: &mut BitReader, slots: usize) -> AacResult<()> {
        if br.read_flag()? {
            self.enable_iid = br.read_flag()?;
            if self.enable_iid {
                let mode = read_mode(br, "IID")?;
                self.nr_iid = NR_IIDICC_PAR[mode];
                self.iid_fine = mode > 2;
                self.nr_ipdopd = NR_IPDOPD_PAR[mode];
            }
            self.enable_icc = br.read_flag()?;
            if self.enable_icc {
                self.nr_icc = NR_IIDICC_PAR[read_mode(br, "ICC")?];
            }
            self.enable_ext = br.read_flag()?;
        }

        let variable = br.read_flag()?;
        self.num_env_prev = self.num_env;
        self.num_env = NUM_ENV[usize::from(variable)][br.read_bits(2)? as usize];
        let last_slot = slots as i32 - 1;
        self.border[0] = -1;
        for e in 1..=self.num_env {
            self.border[e] = if variable {
                br.read_bits(5)? as i32
            } else {
                (e * slots / self.num_env) as i32 - 1
            };
            if self.border[e] < self.border[e - 1] || self.border[e] > last_slot {
                return Err(AacError::malformed(format!(
                    "PS: 包络边界非法 {:?}",
                    &self.border[..=e]
                )));
            }
        }

        let books = ps_codebooks();
        if self.enable_iid {
            let book = if self.iid_fine { &books.iid_fine } else { &books.iid_coarse };
            for e in 0..self.num_env {
                let dt = br.read_flag()?;
                let prev = self.prev_envelope(e);
                read_par(br, &book[usize::from(dt)], &mut self.iid, e, prev, dt, self.nr_iid, None)?;
                self.check_iid(e)?;
            }
        } else {
            self.iid = [[0; MAX_PAR]; MAX_ENVELOPES];
        }
        if self.enable_icc {
            for e in 0..self.num_env {
                let dt = br.read_flag()?;
                let prev = self.prev_envelope(e);
                read_par(br, &books.icc[usize::from(dt)], &mut self.icc, e, prev, dt, self.nr_icc, None)?;
                self.check_icc(e)?;
            }
        } else {
            self.icc = [[0; MAX_PAR]; MAX_ENVELOPES];
        }

        if self.enable_ext {
            let mut size = br.read_bits(4)? as usize;
            if size == 15 {
                size += br.read_bits(8)? as usize;
            }
            let mut left = (size * 8) as isize;
            while left > 7 {
                let id = br.read_bits(2)?;
                left -= 2 + self.read_extension(br, id)? as isize;
            }
            if left < 0 {
                return Err(AacError::malformed("PS: 扩展数据读取越界"));
            }
            br.skip_bits_usize(left as usize)?;
        }

        // 最后一个包络未到帧尾时补一个沿用参数的包络
        if self.num_env == 0 || self.border[self.num_env] < last_slot {
            let source = match self.num_env {
                0 => self.num_env_prev.checked_sub(1),
                n => Some(n - 1),
            };
            let e = self.num_env;
            if let Some(src) = source.filter(|&s| s != e) {
                for rows in [&mut self.iid, &mut self.icc, &mut self.ipd, &mut self.opd] {
                    rows[e] = rows[src];
                }
            }
            if self.enable_iid {
                self.check_iid(e)?;
            }
            if self.enable_icc {
                self.check_icc(e)?;
            }
            self.num_env += 1;
            self.border[self.num_env] = last_slot;
        }
        Ok(())
    }

    /// IPD/OPD 扩展 (ps_extension_id 0); 其余标识不消耗数据
    fn read_extension(&mut self, br: &mut BitReader, id: u32) -> AacResult<usize> {
        if id != 0 {
            return Ok(0);
        }
        let start = br.bits_read();
        if br.read_flag()? {
            let books = ps_codebooks();
            for e in 0..self.num_env {
                let prev = self.prev_envelope(e);
                let dt = br.read_flag()?;
                read_par(br, &books.ipd[usize::from(dt)], &mut self.ipd, e, prev, dt, self.nr_ipdopd, Some(7))?;
                let dt = br.read_flag()?;
                read_par(br, &books.opd[usize::from(dt)], &mut self.opd, e, prev, dt, self.nr_ipdopd, Some(7))?;
            }
        }
        br.skip_bits(1)?;
        Ok(br.bits_read() - start)
    }

    fn prev_envelope(&self, e: usize) -> usize {
        match e {
            0 => self.num_env_prev.saturating_sub(1),
            e => e - 1,
        }
    }

    fn check_iid(&self, e: usize) -> AacResult<()> {
        let limit = if self.iid_fine { 15 } else { 7 };
        match self.iid[e][..self.nr_iid].iter().find(|v| v.abs() > limit) {
            Some(v) => Err(AacError::malformed(format!("PS: IID {v} 越界"))),
            None => Ok(()),
        }
    }

    fn check_icc(&self, e: usize) -> AacResult<()> {
        match self.icc[e][..self.nr_icc].iter().find(|v| !(0..=7).contains(*v)) {
            Some(v) => Err(AacError::malformed(format!("PS: ICC {v} 越界"))),
            None => Ok(()),
        }
    }

    /// 第 e 个包络映射到 20 个参数频带的 (IID, ICC)
    fn mapped(&self, e: usize) -> ([i32; NR_PAR_BANDS], [i32; NR_PAR_BANDS]) {
        (remap_20(&self.iid[e], self.nr_iid), remap_20(&self.icc[e], self.nr_icc))
    }
}

fn read_mode(br: &mut BitReader, what: &str) -> AacResult<usize> {
    let mode = br.read_bits(3)? as usize;
    if mode > 5 {
        return Err(AacError::malformed(format!("PS: {what} 模式 {mode} 非法")));
    }
    Ok(mode)
}

/// 读一个包络的参数; 频率差分从 0 累加, 时间差分相对 `prev` 包络
#[allow(clippy::too_many_arguments)]
fn read_par(
    br: &mut BitReader,
    book: &Codebook,
    rows: &mut [ParRow; MAX_ENVELOPES],
    e: usize,
    prev: usize,
    dt: bool,
    count: usize,
    mask: Option<i32>,
) -> AacResult<()> {
    let mut acc = 0;
    for b in 0..count {
        let diff = book.decode(br)?;
        let mut v = if dt { rows[prev][b] + diff } else { acc + diff };
        if let Some(mask) = mask {
            v &= mask;
        }
        acc = v;
        rows[e][b] = v;
    }
    Ok(())
}

const NR_PAR_BANDS: usize = 20;

fn remap_20(row: &ParRow, count: usize) -> [i32; NR_PAR_BANDS] {
    let mut out = [0i32; NR_PAR_BANDS];
    match count {
        10 => {
            for (b, &v) in row[..10].iter().enumerate() {
                out[2 * b] = v;
                out[2 * b + 1] = v;
            }
        }
        34 => {
            let p = row;
            out[0] = (2 * p[0] + p[1]) / 3;
            out[1] = (p[1] + 2 * p[2]) / 3;
            out[2] = (2 * p[3] + p[4]) / 3;
            out[3] = (p[4] + 2 * p[5]) / 3;
            out[4] = (p[6] + p[7]) / 2;
            out[5] = (p[8] + p[9]) / 2;
            out[6] = p[10];
            out[7] = p[11];
            out[8] = (p[12] + p[13]) / 2;
            out[9] = (p[14] + p[15]) / 2;
            out[10] = p[16];
            out[11] = p[17];
            out[12] = p[18];
            out[13] = p[19];
            out[14] = (p[20] + p[21]) / 2;
            out[15] = (p[22] + p[23]) / 2;
            out[16] = (p[24] + p[25]) / 2;
            out[17] = (p[26] + p[27]) / 2;
            out[18] = (p[28] + p[29] + p[30] + p[31]) / 4;
            out[19] = (p[32] + p[33]) / 2;
        }
        _ => out.copy_from_slice(&row[..NR_PAR_BANDS]),
    }
    out
}

// ============================================================
// 合成
// ============================================================

/// 混合子带数: QMF 子带 0 分 6 个, 1/2 各分 2 个, 其余 61 个直通
const NR_BANDS: usize = 71;
/// 经全通滤波去相关的混合子带数
const NR_ALLPASS_BANDS: usize = 30;
/// 此后改用 1 个时隙延迟
const SHORT_DELAY_BAND: usize = 42;
const MAX_DELAY: usize = 14;
const AP_LINKS: usize = 3;
const AP_HISTORY: usize = 5;
const HYBRID_TAPS: usize = 13;
/// 混合滤波器中心相对窗口起点的偏移
const HYBRID_CENTER: usize = 6;
const MAX_SLOTS: usize = 32;

const PEAK_DECAY: f32 = 0.765_928_34;
const A_SMOOTH: f32 = 0.25;
const TRANSIENT_IMPACT: f32 = 1.5;
const DECAY_SLOPE: f32 = 0.05;
const DECAY_CUTOFF: f32 = 10.0;
const ALLPASS_COEF: [f32; AP_LINKS] = [0.651_439_05, 0.564_718_1, 0.489_541_66];
const FRACTIONAL_DELAY: [f64; AP_LINKS] = [0.43, 0.75, 0.347];
const FRACTIONAL_DELAY_GAIN: f64 = 0.39;
/// 前 10 个混合子带的中心频率 (单位 1/8 QMF 子带)
const F_CENTER_20: [f64; 10] = [-3.0, -1.0, 1.0, 3.0, 5.0, 7.0, 10.0, 14.0, 18.0, 22.0];

/// 8 子带复数原型滤波器前半部分 (对称)
const G0_8: [f64; 7] = [
    0.007_460_829_498_12,
    0.022_704_209_498_25,
    0.045_468_659_304_73,
    0.072_661_139_295_91,
    0.098_851_085_752_64,
    0.117_937_105_672_17,
    0.125,
];
/// 2 子带实数原型滤波器前半部分
const G1_2: [f32; 7] = [
    0.0,
    0.018_994_875,
    0.0,
    -0.072_931_39,
    0.0,
    0.305_966_3,
    0.5,
];

/// 混合子带 → 参数频带
#[rustfmt::skip]
const K_TO_I: [usize; NR_BANDS] = [
     1,  0,  0,  1,  2,  3,  4,  5,  6,  7,  8,  9, 10, 11, 12, 13, 14, 14, 15, 15,
    15, 16, 16, 16, 16, 17, 17, 17, 17, 17, 18, 18, 18, 18, 18, 18, 18, 18, 18, 18,
    18, 18, 18, 18, 18, 18, 18, 18, 18, 18, 18, 19, 19, 19, 19, 19, 19, 19, 19, 19,
    19, 19, 19, 19, 19, 19, 19, 19, 19, 19, 19,
];

/// IID 量化级 (dB): 粗 15 级, 细 31 级
const IID_COARSE_DB: [f64; 15] = [
    -25.0, -18.0, -14.0, -10.0, -7.0, -4.0, -2.0, 0.0, 2.0, 4.0, 7.0, 10.0, 14.0, 18.0, 25.0,
];
const IID_FINE_DB: [f64; 31] = [
    -50.0, -45.0, -40.0, -35.0, -30.0, -25.0, -22.0, -19.0, -16.0, -13.0, -10.0, -8.0, -6.0,
    -4.0, -2.0, 0.0, 2.0, 4.0, 6.0, 8.0, 10.0, 13.0, 16.0, 19.0, 22.0, 25.0, 30.0, 35.0, 40.0,
    45.0, 50.0,
];
/// ICC 反量化值
const ICC_INVQ: [f64; 8] = [1.0, 0.937, 0.84118, 0.60092, 0.36764, 0.0, -0.589, -1.0];

/// 混合矩阵 [h11, h12, h21, h22]
type Mixing = [f32; 4];

struct PsTables {
    /// [iid 索引 * 8 + icc]
    mixing: Vec<Mixing>,
    phi_fract: [Cplx; NR_ALLPASS_BANDS],
    q_fract: [[Cplx; AP_LINKS]; NR_ALLPASS_BANDS],
    /// 8 子带复数滤波器, 按输入窗口正向排列
    hybrid8: [[Cplx; HYBRID_TAPS]; 8],
}

fn tables() -> &'static PsTables {
    static TABLES: OnceLock<PsTables> = OnceLock::new();
    TABLES.get_or_init(|| {
        let mut mixing = Vec::with_capacity(46 * 8);
        for db in IID_COARSE_DB.iter().chain(&IID_FINE_DB) {
            let c = 10f64.powf(db / 20.0);
            let c1 = std::f64::consts::SQRT_2 / (1.0 + c * c).sqrt();
            let c2 = c * c1;
            for rho in ICC_INVQ {
                let alpha = 0.5 * rho.acos();
                let beta = alpha * (c1 - c2) * std::f64::consts::FRAC_1_SQRT_2;
                mixing.push([
                    (c2 * (beta + alpha).cos()) as f32,
                    (c1 * (beta - alpha).cos()) as f32,
                    (c2 * (beta + alpha).sin()) as f32,
                    (c1 * (beta - alpha).sin()) as f32,
                ]);
            }
        }

        let polar = |theta: f64| Cplx::new(theta.cos() as f32, theta.sin() as f32);
        let mut phi_fract = [Cplx::default(); NR_ALLPASS_BANDS];
        let mut q_fract = [[Cplx::default(); AP_LINKS]; NR_ALLPASS_BANDS];
        for k in 0..NR_ALLPASS_BANDS {
            let f_center = F_CENTER_20
                .get(k)
                .map_or(k as f64 - 6.5, |f| f / 8.0);
            phi_fract[k] = polar(-std::f64::consts::PI * FRACTIONAL_DELAY_GAIN * f_center);
            for (m, q) in q_fract[k].iter_mut().enumerate() {
                *q = polar(-std::f64::consts::PI * FRACTIONAL_DELAY[m] * f_center);
            }
        }

        let mut hybrid8 = [[Cplx::default(); HYBRID_TAPS]; 8];
        for (q, filter) in hybrid8.iter_mut().enumerate() {
            for (n, tap) in filter.iter_mut().enumerate() {
                let g = G0_8[n.min(HYBRID_TAPS - 1 - n)];
                let theta = 2.0 * std::f64::consts::PI * (q as f64 + 0.5) * (n as f64 - 6.0) / 8.0;
                *tap = polar(-theta) * g as f32;
            }
        }
        PsTables {
            mixing,
            phi_fract,
            q_fract,
            hybrid8,
        }
    })
}

/// 单位混合矩阵: 左右声道都取单声道信号
const IDENTITY: Mixing = [1.0, 1.0, 0.0, 0.0];

/// PS 合成状态
#[derive(Debug, Clone)]
pub struct ParametricStereo {
    slots: usize,
    /// QMF 子带 0..3 的混合分析输入: 6 个历史 + slots + 6 个前视
    hybrid_in: [Vec<Cplx>; 3],
    peak_decay: [f32; NR_PAR_BANDS],
    power_smooth: [f32; NR_PAR_BANDS],
    diff_smooth: [f32; NR_PAR_BANDS],
    /// 逐混合子带: MAX_DELAY 个历史 + slots
    delay: Vec<Vec<Cplx>>,
    /// 逐全通子带逐级: AP_HISTORY 个历史 + slots
    ap_delay: Vec<[Vec<Cplx>; AP_LINKS]>,
    /// 上一包络末尾的混合矩阵
    h_prev: [Mixing; NR_PAR_BANDS],
    mono: Vec<Vec<Cplx>>,
    side: Vec<Vec<Cplx>>,
}

impl ParametricStereo {
    pub fn new(slots: usize) -> Self {
        let slots = slots.min(MAX_SLOTS);
        let hybrid = || vec![Cplx::default(); slots + 2 * HYBRID_CENTER];
        Self {
            slots,
            hybrid_in: [hybrid(), hybrid(), hybrid()],
            peak_decay: [0.0; NR_PAR_BANDS],
            power_smooth: [0.0; NR_PAR_BANDS],
            diff_smooth: [0.0; NR_PAR_BANDS],
            delay: vec![vec![Cplx::default(); MAX_DELAY + slots]; NR_BANDS],
            ap_delay: (0..NR_ALLPASS_BANDS)
                .map(|_| std::array::from_fn(|_| vec![Cplx::default(); AP_HISTORY + slots]))
                .collect(),
            h_prev: [IDENTITY; NR_PAR_BANDS],
            mono: vec![vec![Cplx::default(); slots]; NR_BANDS],
            side: vec![vec![Cplx::default(); slots]; NR_BANDS],
        }
    }

    pub fn reset(&mut self) {
        *self = Self::new(self.slots);
    }

    /// 由单声道 QMF 时隙生成左右声道
    ///
    /// `left` 至少含 slots + 6 个时隙, 前 slots 个被替换为左声道;
    /// `right` 的前 slots 个时隙写入右声道. `top` 为有效 QMF 子带上界.
    pub fn apply(&mut self, params: &PsParameters, left: &mut [QmfRow], right: &mut [QmfRow], top: usize) {
        let top = (top + NR_BANDS - SYNTHESIS_BANDS).min(NR_BANDS);
        for line in &mut self.delay[top..] {
            line.fill(Cplx::default());
        }
        for links in self.ap_delay.iter_mut().skip(top) {
            for line in links {
                line.fill(Cplx::default());
            }
        }

        self.hybrid_analysis(left);
        self.decorrelate();
        self.mix(params);
        self.hybrid_synthesis(left, right);
    }

    fn hybrid_analysis(&mut self, x: &[QmfRow]) {
        let slots = self.slots;
        let t = tables();
        for (band, buf) in self.hybrid_in.iter_mut().enumerate() {
            for (dst, row) in buf[HYBRID_CENTER..].iter_mut().zip(x) {
                *dst = row[band];
            }
        }
        let s = &mut self.mono;
        for n in 0..slots {
            let win = &self.hybrid_in[0][n..n + HYBRID_TAPS];
            let mut q8 = [Cplx::default(); 8];
            for (out, filter) in q8.iter_mut().zip(&t.hybrid8) {
                *out = win.iter().zip(filter).map(|(a, b)| a * b).sum();
            }
            s[0][n] = q8[6];
            s[1][n] = q8[7];
            s[2][n] = q8[0];
            s[3][n] = q8[1];
            s[4][n] = q8[2] + q8[5];
            s[5][n] = q8[3] + q8[4];

            // QMF 子带 1 频谱倒置, 高低两半对调
            for (band, base, reversed) in [(1, 6, true), (2, 8, false)] {
                let win = &self.hybrid_in[band][n..n + HYBRID_TAPS];
                let center = win[HYBRID_CENTER] * G1_2[6];
                let side: Cplx = [1, 3, 5]
                    .iter()
                    .map(|&j| (win[j] + win[HYBRID_TAPS - 1 - j]) * G1_2[j])
                    .sum();
                let (low, high) = (center + side, center - side);
                let (a, b) = if reversed { (high, low) } else { (low, high) };
                s[base][n] = a;
                s[base + 1][n] = b;
            }
            for k in 3..SYNTHESIS_BANDS {
                s[k + 7][n] = x[n][k];
            }
        }
        for buf in &mut self.hybrid_in {
            buf.copy_within(slots..slots + HYBRID_CENTER, 0);
        }
    }

    fn decorrelate(&mut self) {
        let slots = self.slots;
        let t = tables();
        let mut power = [[0.0f32; MAX_SLOTS]; NR_PAR_BANDS];
        for (k, band) in self.mono.iter().enumerate() {
            for (p, s) in power[K_TO_I[k]].iter_mut().zip(band) {
                *p += s.norm_sqr();
            }
        }

        // 瞬态检测
        let mut gain = [[1.0f32; MAX_SLOTS]; NR_PAR_BANDS];
        for i in 0..NR_PAR_BANDS {
            for n in 0..slots {
                let p = power[i][n];
                self.peak_decay[i] = (PEAK_DECAY * self.peak_decay[i]).max(p);
                self.power_smooth[i] += A_SMOOTH * (p - self.power_smooth[i]);
                self.diff_smooth[i] += A_SMOOTH * (self.peak_decay[i] - p - self.diff_smooth[i]);
                let denom = TRANSIENT_IMPACT * self.diff_smooth[i];
                if denom > self.power_smooth[i] {
                    gain[i][n] = self.power_smooth[i] / denom;
                }
            }
        }

        for k in 0..NR_BANDS {
            let delay = &mut self.delay[k];
            delay.copy_within(slots..slots + MAX_DELAY, 0);
            delay[MAX_DELAY..].copy_from_slice(&self.mono[k]);
            let g = &gain[K_TO_I[k]];
            let d = &mut self.side[k];
            if k < NR_ALLPASS_BANDS {
                let decay = (1.0 - DECAY_SLOPE * (k as f32 - DECAY_CUTOFF)).clamp(0.0, 1.0);
                let links = &mut self.ap_delay[k];
                for line in links.iter_mut() {
                    line.copy_within(slots..slots + AP_HISTORY, 0);
                }
                for n in 0..slots {
                    let mut x = delay[MAX_DELAY - 2 + n] * t.phi_fract[k];
                    for (m, line) in links.iter_mut().enumerate() {
                        let a = ALLPASS_COEF[m] * decay;
                        let y = line[n + 2 - m] * t.q_fract[k][m] - x * a;
                        line[n + AP_HISTORY] = x + y * a;
                        x = y;
                    }
                    d[n] = x * g[n];
                }
            } else {
                let lag = if k < SHORT_DELAY_BAND { MAX_DELAY } else { 1 };
                for n in 0..slots {
                    d[n] = delay[MAX_DELAY - lag + n] * g[n];
                }
            }
        }
    }

    /// 逐包络插值混合矩阵, 单声道与去相关信号混成左右声道
    fn mix(&mut self, params: &PsParameters) {
        let t = tables();
        let fine_offset = if params.iid_fine { 23 } else { 0 };
        for e in 0..params.num_env {
            let (iid, icc) = params.mapped(e);
            let mut h_next = [IDENTITY; NR_PAR_BANDS];
            for (b, h) in h_next.iter_mut().enumerate() {
                let row = (iid[b] + 7 + fine_offset) as usize;
                *h = t.mixing[row * 8 + icc[b] as usize];
            }
            let start = params.border[e];
            let stop = params.border[e + 1];
            let width = 1.0 / (stop - start).max(1) as f32;
            for k in 0..NR_BANDS {
                let b = K_TO_I[k];
                let mut h = self.h_prev[b];
                let step: [f32; 4] = std::array::from_fn(|i| (h_next[b][i] - h[i]) * width);
                for n in (start + 1) as usize..=stop as usize {
                    for (v, s) in h.iter_mut().zip(&step) {
                        *v += s;
                    }
                    let (l, r) = (self.mono[k][n], self.side[k][n]);
                    self.mono[k][n] = l * h[0] + r * h[2];
                    self.side[k][n] = l * h[1] + r * h[3];
                }
            }
            self.h_prev = h_next;
        }
    }

    fn hybrid_synthesis(&self, left: &mut [QmfRow], right: &mut [QmfRow]) {
        for (bands, out) in [(&self.mono, left), (&self.side, right)] {
            for (n, row) in out.iter_mut().take(self.slots).enumerate() {
                row[0] = bands[..6].iter().map(|b| b[n]).sum();
                row[1] = bands[6][n] + bands[7][n];
                row[2] = bands[8][n] + bands[9][n];
                for k in 3..SYNTHESIS_BANDS {
                    row[k] = bands[k + 7][n];
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aac::sbr::tables::tests::write_value;
    use crate::aac::sbr::tables::{ICC_DF, IID_DF_COARSE, IID_DT_COARSE};
    use aacdec_core::bitwriter::BitWriter;

    /// 写出 ps_data: 20 频带粗量化 IID, 固定单包络, 每频带相同的 (iid, icc)
    fn write_uniform(bw: &mut BitWriter, iid: i32, icc: i32) {
        bw.write_flag(true); // header
        bw.write_flag(true); // enable_iid
        bw.write_bits(1, 3); // 20 频带粗量化
        bw.write_flag(true); // enable_icc
        bw.write_bits(1, 3);
        bw.write_flag(false); // enable_ext
        bw.write_flag(false); // 固定边界
        bw.write_bits(1, 2); // 1 个包络
        bw.write_flag(false); // iid 频率差分
        write_value(bw, &IID_DF_COARSE, 14, iid);
        for _ in 1..20 {
            write_value(bw, &IID_DF_COARSE, 14, 0);
        }
        bw.write_flag(false);
        write_value(bw, &ICC_DF, 7, icc);
        for _ in 1..20 {
            write_value(bw, &ICC_DF, 7, 0);
        }
    }

    fn parse(data: &[u8]) -> (PsParameters, usize) {
        let mut params = PsParameters::default();
        let mut br = BitReader::new(data);
        let used = params.read(&mut br, data.len() * 8, 32).unwrap();
        (params, used)
    }

    #[test]
    fn test_参数解析() {
        let mut bw = BitWriter::new();
        write_uniform(&mut bw, 3, 2);
        let written = bw.bits_written();
        let data = bw.finish();
        let (params, used) = parse(&data);
        assert_eq!(used, written);
        assert!(params.started());
        assert_eq!(params.num_env(), 1);
        assert_eq!(params.border[..2], [-1, 31]);
        let (iid, icc) = params.mapped(0);
        assert_eq!(iid, [3; 20]);
        assert_eq!(icc, [2; 20]);
    }

    #[test]
    fn test_时间差分与补齐包络() {
        let mut bw = BitWriter::new();
        write_uniform(&mut bw, 2, 0);
        // 第二帧: 无头, 可变边界 1 个包络止于 15, 时间差分 +1
        bw.write_flag(false);
        bw.write_flag(true);
        bw.write_bits(0, 2);
        bw.write_bits(15, 5);
        bw.write_flag(true);
        for _ in 0..20 {
            write_value(&mut bw, &IID_DT_COARSE, 14, 1);
        }
        bw.write_flag(false);
        for _ in 0..20 {
            write_value(&mut bw, &ICC_DF, 7, 0);
        }
        let data = bw.finish();
        let mut params = PsParameters::default();
        let mut br = BitReader::new(&data);
        params.read(&mut br, 1000, 32).unwrap();
        params.read(&mut br, 1000, 32).unwrap();
        // 补出的第二个包络沿用第一个, 止于帧尾
        assert_eq!(params.num_env(), 2);
        assert_eq!(params.border[..3], [-1, 15, 31]);
        assert_eq!(params.mapped(0).0, [3; 20]);
        assert_eq!(params.mapped(1).0, [3; 20]);
    }

    #[test]
    fn test_越界参数清零并跳过() {
        let mut bw = BitWriter::new();
        bw.write_flag(true);
        bw.write_flag(true);
        bw.write_bits(1, 3);
        bw.write_flag(false);
        bw.write_flag(false);
        bw.write_flag(false);
        bw.write_bits(1, 2);
        bw.write_flag(false);
        // 累加到 8, 超出粗量化范围
        for _ in 0..2 {
            write_value(&mut bw, &IID_DF_COARSE, 14, 4);
        }
        for _ in 0..40 {
            bw.write_bit(0);
        }
        let data = bw.finish();
        let mut params = PsParameters::default();
        let mut br = BitReader::new(&data);
        let used = params.read(&mut br, 60, 32).unwrap();
        assert_eq!(used, 60);
        assert_eq!(br.bits_read(), 60);
        assert!(!params.started());
        assert_eq!(params.iid[0], [0; MAX_PAR]);
    }

    #[test]
    fn test_34_频带映射() {
        let row: ParRow = std::array::from_fn(|i| i as i32);
        let out = remap_20(&row, 34);
        assert_eq!(out[0], 1 / 3);
        assert_eq!(out[1], 5 / 3);
        assert_eq!(out[6], 10);
        assert_eq!(out[18], (28 + 29 + 30 + 31) / 4);
        let out = remap_20(&row, 10);
        assert_eq!(out[..4], [0, 0, 1, 1]);
        assert_eq!(out[19], 9);
    }

    fn tone_rows(slots: usize) -> Vec<QmfRow> {
        (0..slots + HYBRID_CENTER)
            .map(|n| {
                std::array::from_fn(|k| {
                    if k < 20 {
                        let phase = 0.3 * n as f32 + 0.7 * k as f32;
                        Cplx::new(phase.cos(), phase.sin()) * 100.0
                    } else {
                        Cplx::default()
                    }
                })
            })
            .collect()
    }

    #[test]
    fn test_零参数时左右等于输入() {
        let mut bw = BitWriter::new();
        write_uniform(&mut bw, 0, 0);
        let data = bw.finish();
        let (params, _) = parse(&data);

        let mut ps = ParametricStereo::new(32);
        for _ in 0..3 {
            let input = tone_rows(32);
            let mut left = input.clone();
            let mut right = vec![[Cplx::default(); SYNTHESIS_BANDS]; 32];
            ps.apply(&params, &mut left, &mut right, 20);
            for n in 0..32 {
                for k in 0..SYNTHESIS_BANDS {
                    let diff_l = (left[n][k] - input[n][k]).norm();
                    let diff_r = (right[n][k] - input[n][k]).norm();
                    assert!(diff_l < 1e-2 && diff_r < 1e-2, "n={n} k={k}: {diff_l} {diff_r}");
                }
            }
        }
    }

    #[test]
    fn test_强度差偏向左声道() {
        let mut bw = BitWriter::new();
        write_uniform(&mut bw, 7, 0);
        let data = bw.finish();
        let (params, _) = parse(&data);

        let mut ps = ParametricStereo::new(32);
        let mut energy = (0.0f32, 0.0f32);
        for _ in 0..4 {
            let mut left = tone_rows(32);
            let mut right = vec![[Cplx::default(); SYNTHESIS_BANDS]; 32];
            ps.apply(&params, &mut left, &mut right, 20);
            energy = (0.0, 0.0);
            for n in 0..32 {
                for k in 0..SYNTHESIS_BANDS {
                    energy.0 += left[n][k].norm_sqr();
                    energy.1 += right[n][k].norm_sqr();
                }
            }
        }
        // +25 dB
        assert!(energy.0 > 100.0 * energy.1, "{energy:?}");
    }
}
