//! 流配置: AudioSpecificConfig 解析与生成 (ISO 14496-3 1.6.2.1).
//!
//! [`DecoderConfig`] 保存 profile、采样率、声道配置与帧长. 三种构造途径:
//! 解析配置记录 ([`DecoderConfig::decode`])、显式参数 ([`DecoderConfig::create`]),
//! 以及由 ADIF/帧内 PCE 覆盖 ([`DecoderConfig::set_audio_decoder_info`]).

use serde::{Deserialize, Serialize};

use aacdec_core::bitreader::BitReader;
use aacdec_core::bitwriter::BitWriter;
use aacdec_core::{AacError, AacResult, ChannelLayout, ChannelPosition};

use super::pce::ProgramConfigElement;
use super::tables::{AAC_SAMPLE_RATES, exact_rate_index, rate_to_index};

/// MPEG-4 音频对象类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Profile {
    AacMain,
    AacLc,
    AacSsr,
    AacLtp,
    Sbr,
    AacScalable,
    TwinVq,
    Celp,
    Hvxc,
    Ttsi,
    MainSynthetic,
    WavetableSynthesis,
    GeneralMidi,
    AlgorithmicSynthesis,
    ErAacLc,
    ErAacLtp,
    ErAacScalable,
    ErTwinVq,
    ErBsac,
    ErAacLd,
    ErCelp,
    ErHvxc,
    ErHiln,
    ErParametric,
    Ssc,
    Ps,
    MpegSurround,
    Layer1,
    Layer2,
    Layer3,
    Dst,
    Als,
    Sls,
    SlsNonCore,
    ErAacEld,
    SmrSimple,
    SmrMain,
    Usac,
}

/// (对象类型编号, profile) 对照表
const PROFILES: [(u32, Profile); 38] = [
    (1, Profile::AacMain),
    (2, Profile::AacLc),
    (3, Profile::AacSsr),
    (4, Profile::AacLtp),
    (5, Profile::Sbr),
    (6, Profile::AacScalable),
    (7, Profile::TwinVq),
    (8, Profile::Celp),
    (9, Profile::Hvxc),
    (12, Profile::Ttsi),
    (13, Profile::MainSynthetic),
    (14, Profile::WavetableSynthesis),
    (15, Profile::GeneralMidi),
    (16, Profile::AlgorithmicSynthesis),
    (17, Profile::ErAacLc),
    (19, Profile::ErAacLtp),
    (20, Profile::ErAacScalable),
    (21, Profile::ErTwinVq),
    (22, Profile::ErBsac),
    (23, Profile::ErAacLd),
    (24, Profile::ErCelp),
    (25, Profile::ErHvxc),
    (26, Profile::ErHiln),
    (27, Profile::ErParametric),
    (28, Profile::Ssc),
    (29, Profile::Ps),
    (30, Profile::MpegSurround),
    (32, Profile::Layer1),
    (33, Profile::Layer2),
    (34, Profile::Layer3),
    (35, Profile::Dst),
    (36, Profile::Als),
    (37, Profile::Sls),
    (38, Profile::SlsNonCore),
    (39, Profile::ErAacEld),
    (40, Profile::SmrSimple),
    (41, Profile::SmrMain),
    (42, Profile::Usac),
];

impl Profile {
    /// 由对象类型编号构造, 未定义的编号返回配置错误
    pub fn from_object_type(object_type: u32) -> AacResult<Self> {
        PROFILES
            .iter()
            .find(|(n, _)| *n == object_type)
            .map(|&(_, p)| p)
            .ok_or_else(|| AacError::config(format!("AAC: 无法识别的对象类型 {object_type}")))
    }

    /// 对象类型编号
    pub fn object_type(self) -> u32 {
        PROFILES
            .iter()
            .find(|(_, p)| *p == self)
            .map_or(0, |&(n, _)| n)
    }

    /// 是否为差错恢复 (ER) 对象类型
    pub fn is_error_resilient(self) -> bool {
        self.object_type() >= 17
    }

    /// 是否使用 GASpecificConfig 语法
    fn has_ga_specific_config(self) -> bool {
        matches!(self.object_type(), 1..=4 | 6 | 7 | 17 | 19..=23)
    }
}

/// 本解码器是否能解码该 profile 的核心层
pub fn can_decode(profile: Profile) -> bool {
    matches!(
        profile,
        Profile::AacMain
            | Profile::AacLc
            | Profile::AacLtp
            | Profile::Sbr
            | Profile::Ps
            | Profile::ErAacLc
            | Profile::ErAacLtp
    )
}

/// 采样率
///
/// 标准表中的采样率记录其索引; 显式采样率额外记录最接近的索引, 用于选择频带表.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SampleFrequency {
    /// 采样率 (Hz)
    pub hz: u32,
    /// 频带表索引 (0..=12)
    pub index: usize,
    /// 是否不在标准表中 (编码时需要显式 24 位采样率)
    pub explicit: bool,
}

impl SampleFrequency {
    /// 由 4 位采样率索引构造
    pub fn from_index(index: u32) -> AacResult<Self> {
        let hz = AAC_SAMPLE_RATES
            .get(index as usize)
            .copied()
            .ok_or_else(|| AacError::config(format!("AAC: 保留的采样率索引 {index}")))?;
        Ok(Self {
            hz,
            index: index as usize,
            explicit: false,
        })
    }

    /// 由采样率构造
    pub fn from_hz(hz: u32) -> AacResult<Self> {
        if hz == 0 || hz >= 1 << 24 {
            return Err(AacError::config(format!("AAC: 无效采样率 {hz}")));
        }
        Ok(match exact_rate_index(hz) {
            Some(index) => Self {
                hz,
                index,
                explicit: false,
            },
            None => Self {
                hz,
                index: rate_to_index(hz),
                explicit: true,
            },
        })
    }

    fn read(br: &mut BitReader) -> AacResult<Self> {
        let index = br.read_bits(4)?;
        if index == 15 {
            Self::from_hz(br.read_bits(24)?)
        } else {
            Self::from_index(index)
        }
    }

    fn write(&self, bw: &mut BitWriter) {
        if self.explicit {
            bw.write_bits(15, 4);
            bw.write_bits(self.hz, 24);
        } else {
            bw.write_bits(self.index as u32, 4);
        }
    }
}

/// 声道配置 (ISO 14496-3 Table 1.19)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChannelConfiguration {
    /// 由 PCE 定义
    Pce,
    Mono,
    Stereo,
    Three,
    Four,
    Five,
    FiveOne,
    SevenOne,
}

impl ChannelConfiguration {
    pub fn from_index(index: u32) -> AacResult<Self> {
        Ok(match index {
            0 => Self::Pce,
            1 => Self::Mono,
            2 => Self::Stereo,
            3 => Self::Three,
            4 => Self::Four,
            5 => Self::Five,
            6 => Self::FiveOne,
            7 => Self::SevenOne,
            _ => return Err(AacError::config(format!("AAC: 保留的声道配置 {index}"))),
        })
    }

    /// 由声道数推导声道配置 (8 声道对应配置 7)
    pub fn from_channel_count(channels: u32) -> AacResult<Self> {
        match channels {
            1..=6 => Self::from_index(channels),
            8 => Ok(Self::SevenOne),
            _ => Err(AacError::config(format!(
                "AAC: 无法用标准声道配置表示 {channels} 声道"
            ))),
        }
    }

    pub fn index(self) -> u32 {
        self as u32
    }

    /// 声道数 (PCE 配置返回 0)
    pub fn channel_count(self) -> usize {
        match self {
            Self::Pce => 0,
            Self::SevenOne => 8,
            other => other.index() as usize,
        }
    }

    /// 按规范元素顺序排列的声道位置
    pub fn positions(self) -> &'static [ChannelPosition] {
        use ChannelPosition::*;
        match self {
            Self::Pce => &[],
            Self::Mono => &[FrontCenter],
            Self::Stereo => &[FrontLeft, FrontRight],
            Self::Three => &[FrontCenter, FrontLeft, FrontRight],
            Self::Four => &[FrontCenter, FrontLeft, FrontRight, BackCenter],
            Self::Five => &[FrontCenter, FrontLeft, FrontRight, BackLeft, BackRight],
            Self::FiveOne => &[
                FrontCenter,
                FrontLeft,
                FrontRight,
                BackLeft,
                BackRight,
                LowFrequency,
            ],
            Self::SevenOne => &[
                FrontCenter,
                FrontLeftOfCenter,
                FrontRightOfCenter,
                FrontLeft,
                FrontRight,
                BackLeft,
                BackRight,
                LowFrequency,
            ],
        }
    }
}

/// 带宽扩展 (SBR/PS) 信令
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtensionSignal {
    /// 是否显式声明 SBR
    pub sbr: bool,
    /// 是否显式声明 PS
    pub ps: bool,
    /// 扩展层输出采样率
    pub sample_rate: Option<u32>,
}

/// ER 差错恢复工具标志
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResilienceFlags {
    pub section_data: bool,
    pub scalefactor_data: bool,
    pub spectral_data: bool,
}

impl ResilienceFlags {
    pub fn any(&self) -> bool {
        self.section_data || self.scalefactor_data || self.spectral_data
    }
}

/// 解码器流配置
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DecoderConfig {
    /// 核心层 profile (显式 SBR/PS 时为其承载的核心对象类型)
    pub profile: Profile,
    pub sample_frequency: SampleFrequency,
    pub channel_configuration: ChannelConfiguration,
    /// 每声道每帧采样数: 1024 或 960
    pub frame_length: usize,
    /// 声道配置 0 或 ADIF/帧内覆盖时的 PCE
    pub pce: Option<ProgramConfigElement>,
    pub extension: ExtensionSignal,
    pub depends_on_core_coder: bool,
    pub core_coder_delay: u16,
    pub resilience: ResilienceFlags,
    /// ER 对象类型的 epConfig
    pub ep_config: u8,
}

impl DecoderConfig {
    /// 解析 AudioSpecificConfig
    pub fn decode(data: &[u8]) -> AacResult<Self> {
        if data.is_empty() {
            return Err(AacError::config("AAC: 配置记录为空"));
        }
        let mut br = BitReader::new(data);
        Self::parse(&mut br).map_err(|e| match e {
            AacError::EndOfStream => AacError::config("AAC: 配置记录被截断"),
            AacError::MalformedElement(msg) => AacError::config(msg),
            other => other,
        })
    }

    fn parse(br: &mut BitReader) -> AacResult<Self> {
        let mut object_type = read_object_type(br)?;
        let sample_frequency = SampleFrequency::read(br)?;
        let channel_configuration = ChannelConfiguration::from_index(br.read_bits(4)?)?;

        let mut extension = ExtensionSignal::default();
        if object_type == 5 || object_type == 29 {
            extension.sbr = true;
            extension.ps = object_type == 29;
            extension.sample_rate = Some(SampleFrequency::read(br)?.hz);
            object_type = read_object_type(br)?;
            if object_type == 22 {
                br.skip_bits(4)?;
            }
        }

        let profile = Profile::from_object_type(object_type)?;
        if !profile.has_ga_specific_config() {
            return Err(AacError::config(format!(
                "AAC: 不支持的 profile {profile:?} (对象类型 {object_type})"
            )));
        }

        let mut config = Self {
            profile,
            sample_frequency,
            channel_configuration,
            frame_length: 1024,
            pce: None,
            extension,
            depends_on_core_coder: false,
            core_coder_delay: 0,
            resilience: ResilienceFlags::default(),
            ep_config: 0,
        };
        config.parse_ga_specific_config(br, object_type)?;

        if profile.is_error_resilient() {
            config.ep_config = br.read_bits(2)? as u8;
            if config.ep_config != 0 {
                return Err(AacError::config(format!(
                    "AAC: 不支持的 epConfig {}",
                    config.ep_config
                )));
            }
        }

        if !config.extension.sbr && br.bits_left() >= 16 {
            config.parse_sync_extension(br)?;
        }
        Ok(config)
    }

    fn parse_ga_specific_config(&mut self, br: &mut BitReader, object_type: u32) -> AacResult<()> {
        if br.read_flag()? {
            self.frame_length = 960;
        }
        self.depends_on_core_coder = br.read_flag()?;
        if self.depends_on_core_coder {
            self.core_coder_delay = br.read_bits(14)? as u16;
        }
        let extension_flag = br.read_flag()?;
        if self.channel_configuration == ChannelConfiguration::Pce {
            self.pce = Some(ProgramConfigElement::parse(br)?);
        }
        if object_type == 6 || object_type == 20 {
            br.skip_bits(3)?; // layerNr
        }
        if extension_flag {
            if object_type == 22 {
                br.skip_bits(16)?; // numOfSubFrame + layer_length
            }
            if matches!(object_type, 17 | 19 | 20 | 23) {
                self.resilience = ResilienceFlags {
                    section_data: br.read_flag()?,
                    scalefactor_data: br.read_flag()?,
                    spectral_data: br.read_flag()?,
                };
            }
            br.skip_bits(1)?; // extensionFlag3
        }
        Ok(())
    }

    /// 后向兼容的 SBR/PS 信令 (syncExtensionType 0x2B7 / 0x548)
    fn parse_sync_extension(&mut self, br: &mut BitReader) -> AacResult<()> {
        if br.read_bits(11)? != 0x2B7 {
            return Ok(());
        }
        let ext_object_type = read_object_type(br)?;
        if ext_object_type != 5 {
            return Ok(());
        }
        self.extension.sbr = br.read_flag()?;
        if self.extension.sbr {
            self.extension.sample_rate = Some(SampleFrequency::read(br)?.hz);
            if br.bits_left() >= 12 && br.read_bits(11)? == 0x548 {
                self.extension.ps = br.read_flag()?;
            }
        }
        Ok(())
    }

    /// 由显式参数构造
    ///
    /// `object_type` 为 5 (SBR) 或 29 (PS) 时核心层为 AAC LC, 扩展层采样率为核心的 2 倍.
    pub fn create(object_type: u32, frequency: u32, channels: u32) -> AacResult<Self> {
        if frequency == 0 || channels == 0 {
            return Err(AacError::config(format!(
                "AAC: 显式参数无效 (采样率 {frequency}, 声道数 {channels})"
            )));
        }
        let mut profile = Profile::from_object_type(object_type)?;
        let mut sample_frequency = SampleFrequency::from_hz(frequency)?;
        let mut extension = ExtensionSignal::default();
        if matches!(profile, Profile::Sbr | Profile::Ps) {
            extension = ExtensionSignal {
                sbr: true,
                ps: profile == Profile::Ps,
                sample_rate: Some(frequency),
            };
            sample_frequency = SampleFrequency::from_hz(frequency / 2)?;
            profile = Profile::AacLc;
        }
        Ok(Self {
            profile,
            sample_frequency,
            channel_configuration: ChannelConfiguration::from_channel_count(channels)?,
            frame_length: 1024,
            pce: None,
            extension,
            depends_on_core_coder: false,
            core_coder_delay: 0,
            resilience: ResilienceFlags::default(),
            ep_config: 0,
        })
    }

    /// 生成规范的 AudioSpecificConfig
    pub fn encode_configuration(
        profile: Profile,
        frequency: u32,
        channel_configuration: ChannelConfiguration,
        frame_length: usize,
    ) -> AacResult<Vec<u8>> {
        if frame_length != 1024 && frame_length != 960 {
            return Err(AacError::InvalidArgument(format!(
                "AAC: 帧长 {frame_length} 无效"
            )));
        }
        if !profile.has_ga_specific_config() {
            return Err(AacError::InvalidArgument(format!(
                "AAC: 无法为 {profile:?} 生成配置记录"
            )));
        }
        if channel_configuration == ChannelConfiguration::Pce {
            return Err(AacError::InvalidArgument(
                "AAC: 声道配置 0 需要 PCE, 请使用 DecoderConfig::encode".into(),
            ));
        }
        let config = Self {
            profile,
            sample_frequency: SampleFrequency::from_hz(frequency)?,
            channel_configuration,
            frame_length,
            pce: None,
            extension: ExtensionSignal::default(),
            depends_on_core_coder: false,
            core_coder_delay: 0,
            resilience: ResilienceFlags::default(),
            ep_config: 0,
        };
        Ok(config.encode())
    }

    /// 将当前配置写为 AudioSpecificConfig
    pub fn encode(&self) -> Vec<u8> {
        let mut bw = BitWriter::new();
        let object_type = self.profile.object_type();
        if self.extension.sbr {
            write_object_type(&mut bw, if self.extension.ps { 29 } else { 5 });
            self.sample_frequency.write(&mut bw);
            bw.write_bits(self.channel_configuration.index(), 4);
            let ext_rate = self.extension.sample_rate.unwrap_or(self.sample_frequency.hz * 2);
            match SampleFrequency::from_hz(ext_rate) {
                Ok(sf) => sf.write(&mut bw),
                Err(_) => self.sample_frequency.write(&mut bw),
            }
            write_object_type(&mut bw, object_type);
        } else {
            write_object_type(&mut bw, object_type);
            self.sample_frequency.write(&mut bw);
            bw.write_bits(self.channel_configuration.index(), 4);
        }

        bw.write_flag(self.frame_length == 960);
        bw.write_flag(self.depends_on_core_coder);
        if self.depends_on_core_coder {
            bw.write_bits(u32::from(self.core_coder_delay), 14);
        }
        let extension_flag = self.resilience.any();
        bw.write_flag(extension_flag);
        if self.channel_configuration == ChannelConfiguration::Pce {
            if let Some(pce) = &self.pce {
                pce.write(&mut bw);
            }
        }
        if extension_flag {
            bw.write_flag(self.resilience.section_data);
            bw.write_flag(self.resilience.scalefactor_data);
            bw.write_flag(self.resilience.spectral_data);
            bw.write_flag(false);
        }
        if self.profile.is_error_resilient() {
            bw.write_bits(u32::from(self.ep_config), 2);
        }
        bw.finish()
    }

    /// 由 PCE 覆盖配置 (ADIF 头部)
    ///
    /// PCE 同时决定 profile、采样率与声道排列.
    pub fn set_audio_decoder_info(&mut self, pce: ProgramConfigElement) -> AacResult<()> {
        self.profile = Profile::from_object_type(u32::from(pce.object_type) + 1)?;
        self.sample_frequency = SampleFrequency::from_index(u32::from(pce.sample_frequency_index))?;
        self.adopt_channel_layout(pce);
        Ok(())
    }

    /// 仅采用 PCE 的声道排列 (帧内 PCE)
    pub fn adopt_channel_layout(&mut self, pce: ProgramConfigElement) {
        self.channel_configuration = ChannelConfiguration::Pce;
        self.pce = Some(pce);
    }

    /// 输出声道数
    pub fn channel_count(&self) -> usize {
        match &self.pce {
            Some(pce) if self.channel_configuration == ChannelConfiguration::Pce => {
                pce.channel_count()
            }
            _ => self.channel_configuration.channel_count(),
        }
    }

    /// 按输出顺序排列的声道位置
    pub fn channel_positions(&self) -> Vec<ChannelPosition> {
        match &self.pce {
            Some(pce) if self.channel_configuration == ChannelConfiguration::Pce => {
                pce.channel_positions()
            }
            _ => self.channel_configuration.positions().to_vec(),
        }
    }

    /// 核心层声道布局
    pub fn channel_layout(&self) -> ChannelLayout {
        ChannelLayout::from_positions(&self.channel_positions())
    }

    /// 是否为差错恢复流
    pub fn is_error_resilient(&self) -> bool {
        self.profile.is_error_resilient()
    }
}

fn read_object_type(br: &mut BitReader) -> AacResult<u32> {
    let ot = br.read_bits(5)?;
    if ot == 31 {
        Ok(32 + br.read_bits(6)?)
    } else {
        Ok(ot)
    }
}

fn write_object_type(bw: &mut BitWriter, object_type: u32) {
    if object_type >= 31 {
        bw.write_bits(31, 5);
        bw.write_bits(object_type - 32, 6);
    } else {
        bw.write_bits(object_type, 5);
    }
}
