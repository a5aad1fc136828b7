//! SBR 负载语法: 头部、时间网格、包络与噪声底 (ISO/IEC 14496-3 4.4.2.8).
//!
//! 包络与噪声底按差分解码为量化值, 差分上下文 ([`ChannelHistory`]) 跨帧保存.

use aacdec_core::bitreader::BitReader;
use aacdec_core::{AacError, AacResult};

use super::frequency::FrequencyTables;
use super::ps::PsParameters;
use super::tables::sbr_codebooks;

/// sbr_extension 中的 PS 标识
const EXTENSION_ID_PS: u32 = 2;

/// VARVAR 帧的包络数上限
const MAX_ENVELOPES: usize = 5;
const MAX_ENV_VALUE: i32 = 127;
const MAX_NOISE_VALUE: i32 = 30;
/// 逆滤波模式个数上限 (噪声频带数上限)
pub const MAX_NOISE_BANDS: usize = 5;

/// SBR 头部
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SbrHeader {
    pub amp_res: bool,
    pub start_freq: u8,
    pub stop_freq: u8,
    pub xover_band: u8,
    pub freq_scale: u8,
    pub alter_scale: bool,
    pub noise_bands: u8,
    pub limiter_bands: u8,
    pub limiter_gains: u8,
    pub interpol_freq: bool,
    pub smoothing_mode: bool,
}

impl Default for SbrHeader {
    /// bs_header_extra 未出现时的取值
    fn default() -> Self {
        Self {
            amp_res: false,
            start_freq: 0,
            stop_freq: 0,
            xover_band: 0,
            freq_scale: 2,
            alter_scale: true,
            noise_bands: 2,
            limiter_bands: 2,
            limiter_gains: 2,
            interpol_freq: true,
            smoothing_mode: true,
        }
    }
}

impl SbrHeader {
    pub fn parse(br: &mut BitReader) -> AacResult<Self> {
        let mut header = Self {
            amp_res: br.read_flag()?,
            start_freq: br.read_bits(4)? as u8,
            stop_freq: br.read_bits(4)? as u8,
            xover_band: br.read_bits(3)? as u8,
            ..Self::default()
        };
        br.skip_bits(2)?;
        let extra_1 = br.read_flag()?;
        let extra_2 = br.read_flag()?;
        if extra_1 {
            header.freq_scale = br.read_bits(2)? as u8;
            header.alter_scale = br.read_flag()?;
            header.noise_bands = br.read_bits(2)? as u8;
        }
        if extra_2 {
            header.limiter_bands = br.read_bits(2)? as u8;
            header.limiter_gains = br.read_bits(2)? as u8;
            header.interpol_freq = br.read_flag()?;
            header.smoothing_mode = br.read_flag()?;
        }
        Ok(header)
    }

    /// 频带划分参数是否不同 (不同则需重置 SBR)
    pub fn spectrum_differs(&self, other: &Self) -> bool {
        (
            self.start_freq,
            self.stop_freq,
            self.xover_band,
            self.freq_scale,
            self.alter_scale,
            self.noise_bands,
        ) != (
            other.start_freq,
            other.stop_freq,
            other.xover_band,
            other.freq_scale,
            other.alter_scale,
            other.noise_bands,
        )
    }
}

/// 帧类型: 首尾边界是否可变
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameClass {
    FixFix,
    FixVar,
    VarFix,
    VarVar,
}

impl FrameClass {
    fn from_bits(bits: u32) -> Self {
        match bits & 3 {
            0 => Self::FixFix,
            1 => Self::FixVar,
            2 => Self::VarFix,
            _ => Self::VarVar,
        }
    }

    /// 尾边界可变 (FIXVAR / VARVAR)
    fn variable_trail(self) -> bool {
        matches!(self, Self::FixVar | Self::VarVar)
    }
}

/// bs_pointer 的位数, 按包络数索引
const POINTER_BITS: [u32; MAX_ENVELOPES + 1] = [0, 1, 2, 2, 3, 3];

/// 一个声道一帧的时间网格; 边界以时隙 (2 个 QMF 时隙) 为单位
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Grid {
    pub class: FrameClass,
    /// 包络边界, 共 num_env + 1 个
    pub t_env: Vec<usize>,
    /// 噪声底边界, 共 num_noise + 1 个
    pub t_noise: Vec<usize>,
    /// 各包络是否为高频率分辨率
    pub freq_res: Vec<bool>,
    /// 包络量化步长是否为 3.0 dB
    pub amp_res: bool,
    /// 瞬态包络序号 l_A
    pub transient: Option<usize>,
}

impl Grid {
    pub fn num_env(&self) -> usize {
        self.freq_res.len()
    }

    pub fn num_noise(&self) -> usize {
        self.t_noise.len() - 1
    }

    /// 最后一个包络的结束边界
    pub fn end(&self) -> usize {
        self.t_env[self.num_env()]
    }

    fn parse(br: &mut BitReader, amp_res: bool, time_slots: usize) -> AacResult<Self> {
        let class = FrameClass::from_bits(br.read_bits(2)?);
        let mut pointer = 0usize;
        let (t_env, freq_res) = match class {
            FrameClass::FixFix => {
                let num_env = 1usize << br.read_bits(2)?;
                if num_env > 4 {
                    return Err(AacError::malformed(format!(
                        "SBR: FIXFIX 帧包络数 {num_env} 过多"
                    )));
                }
                let step = (time_slots + num_env / 2) / num_env;
                let mut t_env: Vec<usize> = (0..num_env).map(|e| e * step).collect();
                t_env.push(time_slots);
                let res = br.read_flag()?;
                (t_env, vec![res; num_env])
            }
            FrameClass::FixVar => {
                let end = time_slots + br.read_bits(2)? as usize;
                let num_rel = br.read_bits(2)? as usize;
                let num_env = num_rel + 1;
                let mut t_env = vec![0usize; num_env + 1];
                t_env[num_env] = end;
                read_trailing_borders(br, &mut t_env, num_rel)?;
                pointer = br.read_bits(POINTER_BITS[num_env])? as usize;
                let mut freq_res = vec![false; num_env];
                for res in freq_res.iter_mut().rev() {
                    *res = br.read_flag()?;
                }
                (t_env, freq_res)
            }
            FrameClass::VarFix => {
                let start = br.read_bits(2)? as usize;
                let num_rel = br.read_bits(2)? as usize;
                let num_env = num_rel + 1;
                let mut t_env = vec![start; num_env + 1];
                t_env[num_env] = time_slots;
                read_leading_borders(br, &mut t_env, num_rel)?;
                pointer = br.read_bits(POINTER_BITS[num_env])? as usize;
                let freq_res = (0..num_env)
                    .map(|_| br.read_flag())
                    .collect::<AacResult<Vec<_>>>()?;
                (t_env, freq_res)
            }
            FrameClass::VarVar => {
                let start = br.read_bits(2)? as usize;
                let end = time_slots + br.read_bits(2)? as usize;
                let num_lead = br.read_bits(2)? as usize;
                let num_trail = br.read_bits(2)? as usize;
                let num_env = num_lead + num_trail + 1;
                if num_env > MAX_ENVELOPES {
                    return Err(AacError::malformed(format!(
                        "SBR: VARVAR 帧包络数 {num_env} 过多"
                    )));
                }
                let mut t_env = vec![start; num_env + 1];
                t_env[num_env] = end;
                read_leading_borders(br, &mut t_env, num_lead)?;
                read_trailing_borders(br, &mut t_env, num_trail)?;
                pointer = br.read_bits(POINTER_BITS[num_env])? as usize;
                let freq_res = (0..num_env)
                    .map(|_| br.read_flag())
                    .collect::<AacResult<Vec<_>>>()?;
                (t_env, freq_res)
            }
        };

        let num_env = freq_res.len();
        if pointer > num_env + 1 {
            return Err(AacError::malformed(format!(
                "SBR: bs_pointer {pointer} 超出边界表"
            )));
        }
        if t_env.windows(2).any(|w| w[0] >= w[1]) {
            return Err(AacError::malformed(format!(
                "SBR: 包络边界不严格递增 {t_env:?}"
            )));
        }

        let mut t_noise = vec![t_env[0]];
        if num_env > 1 {
            let middle = match class {
                FrameClass::FixFix => num_env / 2,
                FrameClass::FixVar | FrameClass::VarVar => {
                    num_env - pointer.saturating_sub(1).max(1)
                }
                FrameClass::VarFix => match pointer {
                    0 => 1,
                    1 => num_env - 1,
                    p => p - 1,
                },
            };
            t_noise.push(t_env[middle]);
        }
        t_noise.push(t_env[num_env]);

        let transient = match class {
            c if c.variable_trail() && pointer > 0 => Some(num_env + 1 - pointer),
            FrameClass::VarFix if pointer > 1 => Some(pointer - 1),
            _ => None,
        };

        Ok(Self {
            class,
            t_env,
            t_noise,
            freq_res,
            amp_res: amp_res && !(class == FrameClass::FixFix && num_env == 1),
            transient,
        })
    }
}

/// 从首边界向后累加相对边界
fn read_leading_borders(br: &mut BitReader, t_env: &mut [usize], count: usize) -> AacResult<()> {
    for i in 0..count {
        t_env[i + 1] = t_env[i] + 2 * br.read_bits(2)? as usize + 2;
    }
    Ok(())
}

/// 从尾边界向前扣除相对边界
fn read_trailing_borders(br: &mut BitReader, t_env: &mut [usize], count: usize) -> AacResult<()> {
    let last = t_env.len() - 1;
    for i in 0..count {
        let rel = 2 * br.read_bits(2)? as usize + 2;
        t_env[last - 1 - i] = t_env[last - i]
            .checked_sub(rel)
            .ok_or_else(|| AacError::malformed("SBR: 相对边界越过帧首"))?;
    }
    Ok(())
}

/// 跨帧保存的差分解码上下文
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChannelHistory {
    /// 上一帧最后一个包络的量化值
    pub env: Vec<i32>,
    pub env_high_res: bool,
    /// 上一帧最后一个噪声底的量化值
    pub noise: Vec<i32>,
    /// 上一帧的逆滤波模式
    pub invf: [u8; MAX_NOISE_BANDS],
}

/// 一个声道一帧的 SBR 数据
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelData {
    pub grid: Grid,
    pub invf: [u8; MAX_NOISE_BANDS],
    pub invf_prev: [u8; MAX_NOISE_BANDS],
    /// 逐包络的量化包络值; 耦合声道对的第二声道为平衡值
    pub env: Vec<Vec<i32>>,
    /// 逐噪声底的量化值
    pub noise: Vec<Vec<i32>>,
    /// 逐高分辨率频带的附加正弦标志
    pub harmonics: Vec<bool>,
}

impl ChannelData {
    /// 本帧结束后的差分上下文
    pub fn history(&self) -> ChannelHistory {
        let last = self.grid.num_env() - 1;
        ChannelHistory {
            env: self.env[last].clone(),
            env_high_res: self.grid.freq_res[last],
            noise: self.noise[self.grid.num_noise() - 1].clone(),
            invf: self.invf,
        }
    }
}

/// 一个声道元素一帧的 SBR 数据
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SbrFrame {
    pub channels: Vec<ChannelData>,
    /// 声道对是否以平衡方式耦合编码
    pub coupled: bool,
}

/// 解析 sbr_data 所需的上下文
pub struct ParseContext<'a> {
    pub header: &'a SbrHeader,
    pub tables: &'a FrequencyTables,
    /// 每帧时隙数 (1024 帧为 16, 960 帧为 15)
    pub time_slots: usize,
}

/// 解析 sbr_single_channel_element 或 sbr_channel_pair_element
///
/// `history` 为各声道的差分上下文, 长度决定元素类型. PS 数据写入 `ps`.
pub fn parse_data(
    br: &mut BitReader,
    ctx: &ParseContext,
    history: &[ChannelHistory],
    ps: Option<&mut PsParameters>,
) -> AacResult<SbrFrame> {
    let frame = if history.len() == 2 {
        parse_pair(br, ctx, history)?
    } else {
        parse_single(br, ctx, &history[0])?
    };
    read_extended_data(br, ps, ctx.time_slots)?;
    Ok(frame)
}

fn parse_single(br: &mut BitReader, ctx: &ParseContext, history: &ChannelHistory) -> AacResult<SbrFrame> {
    if br.read_flag()? {
        br.skip_bits(4)?;
    }
    let grid = Grid::parse(br, ctx.header.amp_res, ctx.time_slots)?;
    let (df_env, df_noise) = read_dtdf(br, &grid)?;
    let invf = read_invf(br, ctx.tables)?;
    let env = read_envelope(br, ctx.tables, &grid, &df_env, history, false)?;
    let noise = read_noise(br, ctx.tables, &df_noise, history, false)?;
    let harmonics = read_harmonics(br, ctx.tables)?;
    Ok(SbrFrame {
        channels: vec![ChannelData {
            grid,
            invf,
            invf_prev: history.invf,
            env,
            noise,
            harmonics,
        }],
        coupled: false,
    })
}

fn parse_pair(br: &mut BitReader, ctx: &ParseContext, history: &[ChannelHistory]) -> AacResult<SbrFrame> {
    if br.read_flag()? {
        br.skip_bits(8)?;
    }
    let coupled = br.read_flag()?;
    let tables = ctx.tables;
    let (left, right) = if coupled {
        let grid = Grid::parse(br, ctx.header.amp_res, ctx.time_slots)?;
        let (df_env_l, df_noise_l) = read_dtdf(br, &grid)?;
        let (df_env_r, df_noise_r) = read_dtdf(br, &grid)?;
        let invf = read_invf(br, tables)?;
        let env_l = read_envelope(br, tables, &grid, &df_env_l, &history[0], false)?;
        let noise_l = read_noise(br, tables, &df_noise_l, &history[0], false)?;
        let env_r = read_envelope(br, tables, &grid, &df_env_r, &history[1], true)?;
        let noise_r = read_noise(br, tables, &df_noise_r, &history[1], true)?;
        (
            (grid.clone(), invf, env_l, noise_l),
            (grid, invf, env_r, noise_r),
        )
    } else {
        let grid_l = Grid::parse(br, ctx.header.amp_res, ctx.time_slots)?;
        let grid_r = Grid::parse(br, ctx.header.amp_res, ctx.time_slots)?;
        let (df_env_l, df_noise_l) = read_dtdf(br, &grid_l)?;
        let (df_env_r, df_noise_r) = read_dtdf(br, &grid_r)?;
        let invf_l = read_invf(br, tables)?;
        let invf_r = read_invf(br, tables)?;
        let env_l = read_envelope(br, tables, &grid_l, &df_env_l, &history[0], false)?;
        let env_r = read_envelope(br, tables, &grid_r, &df_env_r, &history[1], false)?;
        let noise_l = read_noise(br, tables, &df_noise_l, &history[0], false)?;
        let noise_r = read_noise(br, tables, &df_noise_r, &history[1], false)?;
        ((grid_l, invf_l, env_l, noise_l), (grid_r, invf_r, env_r, noise_r))
    };
    let harmonics_l = read_harmonics(br, tables)?;
    let harmonics_r = read_harmonics(br, tables)?;

    let channels = [(left, harmonics_l), (right, harmonics_r)]
        .into_iter()
        .zip(history)
        .map(|(((grid, invf, env, noise), harmonics), h)| ChannelData {
            grid,
            invf,
            invf_prev: h.invf,
            env,
            noise,
            harmonics,
        })
        .collect();
    Ok(SbrFrame { channels, coupled })
}

/// 逐包络、逐噪声底的差分方向 (true 为时间差分)
fn read_dtdf(br: &mut BitReader, grid: &Grid) -> AacResult<(Vec<bool>, Vec<bool>)> {
    let env = (0..grid.num_env())
        .map(|_| br.read_flag())
        .collect::<AacResult<Vec<_>>>()?;
    let noise = (0..grid.num_noise())
        .map(|_| br.read_flag())
        .collect::<AacResult<Vec<_>>>()?;
    Ok((env, noise))
}

fn read_invf(br: &mut BitReader, tables: &FrequencyTables) -> AacResult<[u8; MAX_NOISE_BANDS]> {
    let mut invf = [0u8; MAX_NOISE_BANDS];
    for mode in invf.iter_mut().take(tables.n_noise()) {
        *mode = br.read_bits(2)? as u8;
    }
    Ok(invf)
}

fn read_envelope(
    br: &mut BitReader,
    tables: &FrequencyTables,
    grid: &Grid,
    df: &[bool],
    history: &ChannelHistory,
    balance: bool,
) -> AacResult<Vec<Vec<i32>>> {
    let books = sbr_codebooks();
    let (start_bits, book) = match (balance, grid.amp_res) {
        (false, false) => (7, &books.env_1_5),
        (false, true) => (6, &books.env_3_0),
        (true, false) => (6, &books.env_bal_1_5),
        (true, true) => (5, &books.env_bal_3_0),
    };
    let delta = if balance { 2 } else { 1 };
    let odd = tables.n_high() & 1;

    let mut envelopes: Vec<Vec<i32>> = Vec::with_capacity(grid.num_env());
    for (e, &high) in grid.freq_res.iter().enumerate() {
        let n = tables.num_bands(high);
        let mut values = Vec::with_capacity(n);
        if df[e] {
            let (prev, prev_high) = match e {
                0 => (&history.env[..], history.env_high_res),
                _ => (&envelopes[e - 1][..], grid.freq_res[e - 1]),
            };
            for j in 0..n {
                // 分辨率不同时映射到覆盖同一频率的频带
                let k = match (high, prev_high) {
                    (a, b) if a == b => j,
                    (true, false) => (j + odd) >> 1,
                    _ if j == 0 => 0,
                    _ => 2 * j - odd,
                };
                let base = prev.get(k).copied().unwrap_or(0);
                values.push(base + delta * book[1].decode(br)?);
            }
        } else {
            values.push(delta * br.read_bits(start_bits)? as i32);
            for j in 1..n {
                let v = values[j - 1] + delta * book[0].decode(br)?;
                values.push(v);
            }
        }
        if let Some(v) = values.iter().find(|v| !(0..=MAX_ENV_VALUE).contains(*v)) {
            return Err(AacError::malformed(format!("SBR: 包络值 {v} 越界")));
        }
        envelopes.push(values);
    }
    Ok(envelopes)
}

fn read_noise(
    br: &mut BitReader,
    tables: &FrequencyTables,
    df: &[bool],
    history: &ChannelHistory,
    balance: bool,
) -> AacResult<Vec<Vec<i32>>> {
    let books = sbr_codebooks();
    let (freq_book, time_book) = if balance {
        (&books.env_bal_3_0[0], &books.noise_bal)
    } else {
        (&books.env_3_0[0], &books.noise)
    };
    let delta = if balance { 2 } else { 1 };
    let n = tables.n_noise();

    let mut floors: Vec<Vec<i32>> = Vec::with_capacity(df.len());
    for (i, &dt) in df.iter().enumerate() {
        let mut values = Vec::with_capacity(n);
        if dt {
            let prev = if i == 0 { &history.noise[..] } else { &floors[i - 1][..] };
            for j in 0..n {
                let base = prev.get(j).copied().unwrap_or(0);
                values.push(base + delta * time_book.decode(br)?);
            }
        } else {
            values.push(delta * br.read_bits(5)? as i32);
            for j in 1..n {
                let v = values[j - 1] + delta * freq_book.decode(br)?;
                values.push(v);
            }
        }
        if let Some(v) = values.iter().find(|v| !(0..=MAX_NOISE_VALUE).contains(*v)) {
            return Err(AacError::malformed(format!("SBR: 噪声底 {v} 越界")));
        }
        floors.push(values);
    }
    Ok(floors)
}

fn read_harmonics(br: &mut BitReader, tables: &FrequencyTables) -> AacResult<Vec<bool>> {
    let n = tables.n_high();
    if !br.read_flag()? {
        return Ok(vec![false; n]);
    }
    (0..n).map(|_| br.read_flag()).collect()
}

/// bs_extended_data: PS 数据交给 `ps`, 其余扩展跳过
fn read_extended_data(
    br: &mut BitReader,
    mut ps: Option<&mut PsParameters>,
    time_slots: usize,
) -> AacResult<()> {
    if !br.read_flag()? {
        return Ok(());
    }
    let mut size = br.read_bits(4)? as usize;
    if size == 15 {
        size += br.read_bits(8)? as usize;
    }
    let mut left = size * 8;
    while left > 7 {
        let id = br.read_bits(2)?;
        left -= 2;
        match ps.as_deref_mut() {
            Some(params) if id == EXTENSION_ID_PS => {
                let used = params.read(br, left, 2 * time_slots)?;
                left = left.checked_sub(used).ok_or_else(|| {
                    AacError::malformed("SBR: 扩展数据读取越界")
                })?;
            }
            _ => {
                br.skip_bits_usize(left)?;
                left = 0;
            }
        }
    }
    br.skip_bits_usize(left)
}
