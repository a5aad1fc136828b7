//! raw_data_block 语法解析 (ISO 14496-3 4.4.2.1).
//!
//! 循环读取 3 位元素标识直到 END, 每种元素对应一个解析例程.
//! ER 流没有元素标识, 元素顺序由声道配置固定.

use log::debug;

use aacdec_core::bitreader::BitReader;
use aacdec_core::{AacError, AacResult};

use super::config::ChannelConfiguration;
use super::fill::{ExtensionPayload, parse_fill_element, parse_payloads};
use super::huffman::codebooks;
use super::ics::{ChannelStream, IcsInfo, MAX_BANDS, ParseContext, ZERO_HCB};
use super::pce::ProgramConfigElement;

/// 同类元素实例数上限
pub const MAX_INSTANCES: usize = 16;

/// CCE 增益量化步长, 由 gain_element_scale 选择
const CCE_SCALE: [f32; 4] = [1.090_507_7, 1.189_207_1, std::f32::consts::SQRT_2, 2.0];

/// 元素标识 (3 位)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElementId {
    Sce,
    Cpe,
    Cce,
    Lfe,
    Dse,
    Pce,
    Fil,
    End,
}

impl ElementId {
    pub fn from_bits(bits: u32) -> AacResult<Self> {
        Ok(match bits {
            0 => Self::Sce,
            1 => Self::Cpe,
            2 => Self::Cce,
            3 => Self::Lfe,
            4 => Self::Dse,
            5 => Self::Pce,
            6 => Self::Fil,
            7 => Self::End,
            _ => return Err(AacError::malformed(format!("AAC: 未知元素标识 {bits}"))),
        })
    }
}

/// M/S 掩码
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MsMask {
    Off,
    PerBand(Box<[[bool; MAX_BANDS]; 8]>),
    All,
}

impl MsMask {
    /// 窗口组 `g` 的频带 `sfb` 是否使用 M/S
    pub fn is_set(&self, g: usize, sfb: usize) -> bool {
        match self {
            Self::Off => false,
            Self::PerBand(mask) => mask[g][sfb],
            Self::All => true,
        }
    }
}

/// 声道对元素
#[derive(Debug, Clone)]
pub struct ChannelPair {
    pub common_window: bool,
    pub ms_mask: MsMask,
    pub left: ChannelStream,
    pub right: ChannelStream,
}

/// 耦合点
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CouplingPoint {
    BeforeTns,
    BetweenTnsAndImdct,
    AfterImdct,
}

/// CCE 作用的目标元素
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CouplingTarget {
    pub is_cpe: bool,
    pub tag: u8,
    /// 0: 两声道共用一组增益, 1: 仅右, 2: 仅左 (SCE 目标恒为 2), 3: 两声道各自增益
    pub ch_select: u8,
}

/// 耦合声道元素
#[derive(Debug, Clone)]
pub struct CouplingElement {
    pub point: CouplingPoint,
    pub targets: Vec<CouplingTarget>,
    pub stream: ChannelStream,
    /// 每组增益按 `g * MAX_BANDS + sfb` 排列; 时域耦合只用下标 0
    pub gains: Vec<Vec<f32>>,
}

/// 数据流元素
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataStreamElement {
    pub tag: u8,
    pub data: Vec<u8>,
}

/// 一个已解析的语法元素
#[derive(Debug, Clone)]
pub enum SyntacticElement {
    Single { tag: u8, stream: Box<ChannelStream> },
    Pair { tag: u8, pair: Box<ChannelPair> },
    Lfe { tag: u8, stream: Box<ChannelStream> },
    Coupling { tag: u8, element: Box<CouplingElement> },
    DataStream(DataStreamElement),
    Program(ProgramConfigElement),
    Fill(Vec<ExtensionPayload>),
}

impl SyntacticElement {
    fn id(&self) -> ElementId {
        match self {
            Self::Single { .. } => ElementId::Sce,
            Self::Pair { .. } => ElementId::Cpe,
            Self::Lfe { .. } => ElementId::Lfe,
            Self::Coupling { .. } => ElementId::Cce,
            Self::DataStream(_) => ElementId::Dse,
            Self::Program(_) => ElementId::Pce,
            Self::Fill(_) => ElementId::Fil,
        }
    }

    /// 是否为输出声道元素 (SCE/CPE/LFE)
    pub fn is_channel_element(&self) -> bool {
        matches!(
            self,
            Self::Single { .. } | Self::Pair { .. } | Self::Lfe { .. }
        )
    }
}

/// 一帧解析结果
#[derive(Debug, Clone)]
pub struct RawDataBlock {
    pub elements: Vec<SyntacticElement>,
    /// 字节对齐后消耗的字节数
    pub consumed: usize,
}

impl RawDataBlock {
    /// 解析 raw_data_block
    pub fn parse(br: &mut BitReader, ctx: &ParseContext) -> AacResult<Self> {
        let start = br.byte_position();
        let mut elements: Vec<SyntacticElement> = Vec::new();
        let mut counts = [0usize; 8];
        let mut seen: Vec<(ElementId, u8)> = Vec::new();
        loop {
            let id = ElementId::from_bits(br.read_bits(3)?)?;
            let element = match id {
                ElementId::End => break,
                ElementId::Sce | ElementId::Lfe => {
                    let tag = read_instance_tag(br, id, &mut seen)?;
                    let stream = Box::new(ChannelStream::parse(br, ctx, None)?);
                    if id == ElementId::Sce {
                        SyntacticElement::Single { tag, stream }
                    } else {
                        SyntacticElement::Lfe { tag, stream }
                    }
                }
                ElementId::Cpe => {
                    let tag = read_instance_tag(br, id, &mut seen)?;
                    SyntacticElement::Pair {
                        tag,
                        pair: Box::new(parse_channel_pair(br, ctx)?),
                    }
                }
                ElementId::Cce => {
                    let tag = read_instance_tag(br, id, &mut seen)?;
                    SyntacticElement::Coupling {
                        tag,
                        element: Box::new(parse_coupling_element(br, ctx)?),
                    }
                }
                ElementId::Dse => SyntacticElement::DataStream(parse_data_stream(br)?),
                ElementId::Pce => {
                    if elements.iter().any(SyntacticElement::is_channel_element) {
                        return Err(AacError::malformed("AAC: PCE 出现在声道元素之后"));
                    }
                    SyntacticElement::Program(ProgramConfigElement::parse(br)?)
                }
                ElementId::Fil => SyntacticElement::Fill(parse_fill_element(br)?),
            };
            counts[id as usize] += 1;
            if counts[id as usize] > MAX_INSTANCES && id != ElementId::Fil {
                return Err(AacError::malformed(format!(
                    "AAC: {id:?} 元素超过 {MAX_INSTANCES} 个"
                )));
            }
            elements.push(element);
        }
        br.align_to_byte();
        Ok(Self {
            elements,
            consumed: br.byte_position() - start,
        })
    }

    /// 解析 ER raw_data_block
    ///
    /// 元素顺序由声道配置决定, 不含元素标识与实例标签. 其后的剩余字节按扩展负载尽力解析.
    pub fn parse_er(
        br: &mut BitReader,
        ctx: &ParseContext,
        configuration: ChannelConfiguration,
    ) -> AacResult<Self> {
        use ElementId::*;
        let order: &[ElementId] = match configuration {
            ChannelConfiguration::Mono => &[Sce],
            ChannelConfiguration::Stereo => &[Cpe],
            ChannelConfiguration::Three => &[Sce, Cpe],
            ChannelConfiguration::Four => &[Sce, Cpe, Sce],
            ChannelConfiguration::Five => &[Sce, Cpe, Cpe],
            ChannelConfiguration::FiveOne => &[Sce, Cpe, Cpe, Lfe],
            ChannelConfiguration::SevenOne => &[Sce, Cpe, Cpe, Cpe, Lfe],
            ChannelConfiguration::Pce => {
                return Err(AacError::malformed("AAC: ER 流不支持声道配置 0"));
            }
        };

        let start = br.byte_position();
        let mut tags = [0u8; 8];
        let mut elements = Vec::with_capacity(order.len() + 1);
        for &id in order {
            let tag = tags[id as usize];
            tags[id as usize] += 1;
            elements.push(match id {
                Cpe => SyntacticElement::Pair {
                    tag,
                    pair: Box::new(parse_channel_pair(br, ctx)?),
                },
                Lfe => SyntacticElement::Lfe {
                    tag,
                    stream: Box::new(ChannelStream::parse(br, ctx, None)?),
                },
                _ => SyntacticElement::Single {
                    tag,
                    stream: Box::new(ChannelStream::parse(br, ctx, None)?),
                },
            });
        }

        br.align_to_byte();
        let trailing = br.bits_left() / 8;
        if trailing > 0 {
            let mut probe = br.clone();
            match parse_payloads(&mut probe, trailing) {
                Ok(payloads) => elements.push(SyntacticElement::Fill(payloads)),
                Err(e) => debug!("AAC: 忽略 ER 帧尾 {trailing} 字节: {e}"),
            }
            br.skip_bits_usize(trailing * 8)?;
        }
        Ok(Self {
            elements,
            consumed: br.byte_position() - start,
        })
    }

    /// 帧内全部扩展负载
    pub fn payloads(&self) -> impl Iterator<Item = &ExtensionPayload> {
        self.elements.iter().flat_map(|e| match e {
            SyntacticElement::Fill(p) => p.as_slice(),
            _ => &[],
        })
    }

    /// 各类元素计数, 用于日志
    pub fn summary(&self) -> String {
        self.elements
            .iter()
            .map(|e| format!("{:?}", e.id()))
            .collect::<Vec<_>>()
            .join(",")
    }
}

fn parse_channel_pair(br: &mut BitReader, ctx: &ParseContext) -> AacResult<ChannelPair> {
    let common_window = br.read_flag()?;
    let mut info = None;
    let mut ms_mask = MsMask::Off;
    if common_window {
        let common = IcsInfo::parse(br, ctx, true)?;
        ms_mask = match br.read_bits(2)? {
            0 => MsMask::Off,
            1 => {
                let mut mask = Box::new([[false; MAX_BANDS]; 8]);
                for row in mask.iter_mut().take(common.num_window_groups) {
                    for used in row.iter_mut().take(common.max_sfb) {
                        *used = br.read_flag()?;
                    }
                }
                MsMask::PerBand(mask)
            }
            2 => MsMask::All,
            _ => return Err(AacError::malformed("AAC: 保留的 ms_mask_present 值 3")),
        };
        info = Some(common);
    }

    let left = ChannelStream::parse(br, ctx, info.as_ref())?;
    let right_info = info.map(|mut i| {
        i.ltp = i.ltp_second.take();
        i
    });
    let right = ChannelStream::parse(br, ctx, right_info.as_ref())?;
    Ok(ChannelPair {
        common_window,
        ms_mask,
        left,
        right,
    })
}

fn parse_coupling_element(br: &mut BitReader, ctx: &ParseContext) -> AacResult<CouplingElement> {
    let independently_switched = br.read_flag()?;
    let num_coupled = br.read_bits(3)? as usize + 1;
    let mut targets = Vec::with_capacity(num_coupled);
    let mut num_gains = 0;
    for _ in 0..num_coupled {
        num_gains += 1;
        let is_cpe = br.read_flag()?;
        let tag = br.read_bits(4)? as u8;
        let ch_select = if is_cpe {
            let sel = br.read_bits(2)? as u8;
            if sel == 3 {
                num_gains += 1;
            }
            sel
        } else {
            2
        };
        targets.push(CouplingTarget {
            is_cpe,
            tag,
            ch_select,
        });
    }
    let domain_after_tns = br.read_flag()?;
    let point = if independently_switched {
        CouplingPoint::AfterImdct
    } else if domain_after_tns {
        CouplingPoint::BetweenTnsAndImdct
    } else {
        CouplingPoint::BeforeTns
    };
    let sign = br.read_flag()?;
    let scale = CCE_SCALE[br.read_bits(2)? as usize];

    let stream = ChannelStream::parse(br, ctx, None)?;
    let cbs = codebooks();
    let mut gains = Vec::with_capacity(num_gains);
    for c in 0..num_gains {
        let mut common_gain = true;
        let mut gain = 0i32;
        let mut cache = 1.0f32;
        if c > 0 {
            common_gain = point == CouplingPoint::AfterImdct || br.read_flag()?;
            if common_gain {
                gain = cbs.decode_scalefactor_delta(br)?;
                cache = scale.powi(-gain);
            }
        }
        if point == CouplingPoint::AfterImdct {
            gains.push(vec![cache]);
            continue;
        }
        let mut list = vec![0.0f32; 8 * MAX_BANDS];
        for g in 0..stream.info.num_window_groups {
            for sfb in 0..stream.info.max_sfb {
                if stream.band_types[g][sfb] == ZERO_HCB {
                    continue;
                }
                if !common_gain {
                    let delta = cbs.decode_scalefactor_delta(br)?;
                    if delta != 0 {
                        gain += delta;
                        let mut t = gain;
                        let mut s = 1.0f32;
                        if sign {
                            if t & 1 != 0 {
                                s = -1.0;
                            }
                            t >>= 1;
                        }
                        cache = scale.powi(-t) * s;
                    }
                }
                list[g * MAX_BANDS + sfb] = cache;
            }
        }
        gains.push(list);
    }

    Ok(CouplingElement {
        point,
        targets,
        stream,
        gains,
    })
}

/// 读取实例标签; 同一帧内同类元素的标签不得重复
fn read_instance_tag(
    br: &mut BitReader,
    id: ElementId,
    seen: &mut Vec<(ElementId, u8)>,
) -> AacResult<u8> {
    let tag = br.read_bits(4)? as u8;
    if seen.contains(&(id, tag)) {
        return Err(AacError::malformed(format!(
            "AAC: {id:?} 实例标签 {tag} 重复"
        )));
    }
    seen.push((id, tag));
    Ok(tag)
}

/// 数据流元素; 读取器以帧起点为字节对齐基准
fn parse_data_stream(br: &mut BitReader) -> AacResult<DataStreamElement> {
    let tag = br.read_bits(4)? as u8;
    let align = br.read_flag()?;
    let mut count = br.read_bits(8)? as usize;
    if count == 255 {
        count += br.read_bits(8)? as usize;
    }
    if align {
        br.align_to_byte();
    }
    let data = br.read_byte_vec(count)?;
    Ok(DataStreamElement { tag, data })
}
