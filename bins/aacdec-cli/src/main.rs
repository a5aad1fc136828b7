//! aacdec - AAC 解码命令行工具
//!
//! 读取 ADTS 或 ADIF 裸流, 输出 16 位 WAV 或裸 PCM; `--probe` 只打印流配置.

mod adts;
mod logging;
mod wav;

use std::fs;
use std::path::{Path, PathBuf};
use std::process;

use anyhow::{Context, bail};
use bytes::Bytes;
use clap::Parser;
use serde::Serialize;
use tracing::{debug, info, warn};

use aacdec_codec::aac::adif::AdifHeader;
use aacdec_codec::{
    AacDecoder, AudioFormat, Decoder, DecoderConfig, DecoderOptions, FrameOutcome, Packet,
};
use aacdec_core::AacError;

use adts::{AdtsReader, find_sync, skip_id3v2, split_raw_blocks};
use wav::PcmSink;

#[derive(Parser, Debug)]
#[command(name = "aacdec", version, about = "纯 Rust AAC 解码工具")]
struct Cli {
    /// 输入文件路径 (ADTS 或 ADIF)
    #[arg(short, long)]
    input: PathBuf,

    /// 输出文件路径
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// 输出无头部的 16 位小端 PCM 而不是 WAV
    #[arg(long)]
    raw: bool,

    /// 只打印流配置与输出格式 (JSON)
    #[arg(long)]
    probe: bool,

    /// 关闭带宽扩展阶段, 按核心采样率输出
    #[arg(long = "no-sbr")]
    no_sbr: bool,

    /// 应用帧内动态范围控制
    #[arg(long)]
    drc: bool,

    /// 日志级别 (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

/// 输入封装
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum InputKind {
    Adts,
    /// ADIF 头的起点
    Adif(usize),
}

#[derive(Serialize)]
struct ProbeOutput<'a> {
    config: &'a DecoderConfig,
    format: AudioFormat,
}

fn main() {
    let cli = Cli::parse();
    if let Err(e) = logging::init("aacdec", cli.verbose) {
        eprintln!("警告: 日志初始化失败: {e:#}");
    }

    if let Err(e) = run(&cli) {
        eprintln!("错误: {e:#}");
        process::exit(1);
    }
}

fn run(cli: &Cli) -> anyhow::Result<()> {
    let data = fs::read(&cli.input)
        .with_context(|| format!("无法读取输入文件 '{}'", cli.input.display()))?;
    let kind = detect_input(&data)?;
    let config = initial_config(&data, kind)?;
    let options = DecoderOptions {
        bandwidth_extension: !cli.no_sbr,
        apply_drc: cli.drc,
        ..DecoderOptions::default()
    };
    let mut decoder = AacDecoder::new(config, options)?;

    if cli.probe {
        let probe = ProbeOutput {
            config: decoder.config(),
            format: decoder.audio_format(),
        };
        println!("{}", serde_json::to_string_pretty(&probe)?);
        return Ok(());
    }

    let Some(output) = cli.output.as_deref() else {
        bail!("必须指定输出文件 (-o <输出文件>) 或 --probe");
    };
    info!(
        "输入: {} ({:?}), 输出: {}",
        cli.input.display(),
        kind,
        output.display()
    );

    let mut session = Session::new(output, cli.raw);
    match kind {
        InputKind::Adts => decode_adts(&data, &mut decoder, &mut session)?,
        InputKind::Adif(start) => {
            decode_blocks(&mut decoder, &data[start..], &mut session)?;
        }
    }

    let dropped = decoder.frames_decoded().saturating_sub(session.frames);
    info!(
        "解码完成: 输出 {} 帧, 丢弃 {} 帧, 每声道 {} 个样本",
        session.frames, dropped, session.samples_per_channel
    );
    session.finish(decoder.audio_format())
}

/// 判断输入是 ADIF 还是 ADTS
fn detect_input(data: &[u8]) -> anyhow::Result<InputKind> {
    let start = skip_id3v2(data);
    if AdifHeader::is_present(&data[start..]) {
        return Ok(InputKind::Adif(start));
    }
    if find_sync(data, start).is_some() {
        return Ok(InputKind::Adts);
    }
    bail!("输入既不是 ADTS 也不是 ADIF 流")
}

/// 由首个 ADTS 帧头或 ADIF 头构造流配置
fn initial_config(data: &[u8], kind: InputKind) -> anyhow::Result<DecoderConfig> {
    match kind {
        InputKind::Adts => {
            let (offset, header) =
                find_sync(data, skip_id3v2(data)).context("未找到有效的 ADTS 帧")?;
            debug!("ADTS: 首帧位于 {offset}, {header:?}");
            Ok(header.decoder_config()?)
        }
        InputKind::Adif(start) => {
            let header = AdifHeader::parse(&data[start..])?;
            let pce = header.program().context("ADIF 头不含 PCE")?;
            // profile, 采样率与声道排列全部由 PCE 覆盖
            let mut config = DecoderConfig::create(2, 44100, 1)?;
            config.set_audio_decoder_info(pce.clone())?;
            Ok(config)
        }
    }
}

/// 逐 ADTS 帧经 [`Decoder`] 接口解码
fn decode_adts(
    data: &[u8],
    decoder: &mut AacDecoder,
    session: &mut Session,
) -> anyhow::Result<()> {
    let mut reader = AdtsReader::new(data);
    for frame in reader.by_ref() {
        match split_raw_blocks(&frame) {
            Some(blocks) => {
                for block in blocks {
                    let mut packet = Packet::from_data(Bytes::copy_from_slice(block));
                    packet.pos = frame.offset as i64;
                    decoder.send_packet(&packet)?;
                    drain(decoder, session)?;
                }
            }
            None => decode_blocks(decoder, frame.payload(), session)?,
        }
    }
    if reader.skipped > 0 {
        warn!("ADTS: 重新同步共跳过 {} 字节", reader.skipped);
    }

    decoder.send_packet(&Packet::empty())?;
    drain(decoder, session)
}

/// 取出解码器中的全部帧
fn drain(decoder: &mut AacDecoder, session: &mut Session) -> anyhow::Result<()> {
    loop {
        match decoder.receive_frame() {
            Ok(frame) => {
                let channels = frame.channel_layout.channels as u16;
                session.write(&frame.samples, frame.sample_rate, channels)?;
            }
            Err(AacError::NeedMoreData | AacError::Eof) => return Ok(()),
            Err(e) => return Err(e.into()),
        }
    }
}

/// 连续的 raw_data_block, 按解码器报告的消耗字节数推进
///
/// 一块被丢弃后无法定位下一块, 放弃剩余数据.
fn decode_blocks(
    decoder: &mut AacDecoder,
    data: &[u8],
    session: &mut Session,
) -> anyhow::Result<()> {
    let mut offset = 0;
    while offset < data.len() {
        match decoder.decode_frame(&data[offset..])? {
            FrameOutcome::Decoded(frame) => {
                let pcm = &frame.pcm;
                session.write(&pcm.samples, pcm.sample_rate, pcm.channels as u16)?;
                offset += frame.consumed;
            }
            FrameOutcome::Dropped(err) => {
                warn!(
                    "第 {} 帧 (偏移 {offset}) 丢弃: {err}, 放弃剩余 {} 字节",
                    decoder.frames_decoded(),
                    data.len() - offset
                );
                break;
            }
        }
    }
    Ok(())
}

/// 输出文件及统计, 首帧到达时才创建文件
struct Session {
    path: PathBuf,
    raw: bool,
    sink: Option<PcmSink>,
    /// 首帧的 (采样率, 声道数)
    format: Option<(u32, u16)>,
    frames: u64,
    samples_per_channel: u64,
}

impl Session {
    fn new(path: &Path, raw: bool) -> Self {
        Self {
            path: path.to_path_buf(),
            raw,
            sink: None,
            format: None,
            frames: 0,
            samples_per_channel: 0,
        }
    }

    fn write(&mut self, samples: &[i16], sample_rate: u32, channels: u16) -> anyhow::Result<()> {
        self.frames += 1;
        match self.format {
            None => self.open(sample_rate, channels)?,
            Some(format) if format != (sample_rate, channels) => {
                warn!(
                    "第 {} 帧格式变为 {sample_rate} Hz / {channels} 声道, 与输出文件不一致, 跳过",
                    self.frames
                );
                return Ok(());
            }
            Some(_) => {}
        }
        if let Some(sink) = self.sink.as_mut() {
            sink.write(samples)
                .with_context(|| format!("写入 '{}' 失败", self.path.display()))?;
        }
        if channels > 0 {
            self.samples_per_channel += (samples.len() / usize::from(channels)) as u64;
        }
        Ok(())
    }

    fn open(&mut self, sample_rate: u32, channels: u16) -> anyhow::Result<()> {
        let sink = PcmSink::create(&self.path, self.raw, sample_rate, channels)
            .with_context(|| format!("无法创建输出文件 '{}'", self.path.display()))?;
        self.sink = Some(sink);
        self.format = Some((sample_rate, channels));
        Ok(())
    }

    /// 没有任何帧时按解码器格式写出空文件
    fn finish(mut self, fallback: AudioFormat) -> anyhow::Result<()> {
        if self.sink.is_none() {
            warn!("没有解码出任何帧");
            self.open(fallback.sample_rate, fallback.channels)?;
        }
        if let Some(sink) = self.sink.take() {
            sink.finish()
                .with_context(|| format!("写入 '{}' 失败", self.path.display()))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use adts::tests::adts_frame;

    #[test]
    fn test_命令行参数() {
        let cli = Cli::parse_from(["aacdec", "-i", "in.aac", "-o", "out.wav", "--no-sbr", "-vv"]);
        assert_eq!(cli.input, PathBuf::from("in.aac"));
        assert!(cli.no_sbr && !cli.drc && !cli.raw && !cli.probe);
        assert_eq!(cli.verbose, 2);
    }

    #[test]
    fn test_识别输入封装() {
        let frame = adts_frame(4, 1, &[0xE0]);
        assert_eq!(detect_input(&frame).unwrap(), InputKind::Adts);
        let mut adif = b"ID3\x04\x00\x00\x00\x00\x00\x00".to_vec();
        adif.extend_from_slice(b"ADIF");
        assert_eq!(detect_input(&adif).unwrap(), InputKind::Adif(10));
        assert!(detect_input(b"RIFF....WAVE").is_err());
    }

    #[test]
    fn test_adts_解码为_wav() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("in.aac");
        let output = dir.path().join("out.wav");
        // 单声道 48 kHz, 3 帧只含 END 的静音帧
        let mut data = Vec::new();
        for _ in 0..3 {
            data.extend_from_slice(&adts_frame(3, 1, &[0xE0]));
        }
        fs::write(&input, &data).unwrap();

        let cli = Cli::parse_from([
            "aacdec",
            "-i",
            input.to_str().unwrap(),
            "-o",
            output.to_str().unwrap(),
        ]);
        run(&cli).unwrap();
        let wav = fs::read(&output).unwrap();
        assert_eq!(&wav[..4], b"RIFF");
        assert_eq!(wav.len(), 44 + 3 * 1024 * 2);
        assert!(wav[44..].iter().all(|&b| b == 0));
    }

    #[test]
    fn test_坏帧被跳过() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("in.aac");
        let output = dir.path().join("out.pcm");
        let mut data = adts_frame(3, 1, &[0xE0]);
        // CPE 超出单声道配置
        data.extend_from_slice(&adts_frame(3, 1, &[0x20, 0x00]));
        data.extend_from_slice(&adts_frame(3, 1, &[0xE0]));
        fs::write(&input, &data).unwrap();

        let cli = Cli::parse_from([
            "aacdec",
            "-i",
            input.to_str().unwrap(),
            "-o",
            output.to_str().unwrap(),
            "--raw",
        ]);
        run(&cli).unwrap();
        assert_eq!(fs::read(&output).unwrap().len(), 2 * 1024 * 2);
    }
}
