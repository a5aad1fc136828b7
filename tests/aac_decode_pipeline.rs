//! AAC 解码管线集成测试.
//!
//! 只通过公开接口驱动解码器:
//! AudioSpecificConfig / 显式参数 → AacDecoder → 交错 PCM
//!
//! 测试帧全部用 BitWriter 现场合成, 不依赖样本文件.

use aacdec::codec::aac::adif::{ADIF_ID, AdifHeader};
use aacdec::codec::aac::pce::{PceChannelElement, ProgramConfigElement};
use aacdec::codec::{
    AacDecoder, Decoder, DecoderConfig, DecoderOptions, FrameOutcome, Packet,
};
use aacdec::core::bitreader::BitReader;
use aacdec::core::bitwriter::BitWriter;
use aacdec::core::{AacError, ErrorKind};

// ============================================================
// 辅助函数
// ============================================================

fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// 写出 SCE 的 individual_channel_stream: 前 `bands` 个频带全部为 +1
///
/// 适用于 44.1/48 kHz, 这两种采样率下前 4 个频带各 4 条谱线.
fn write_tone_sce(bw: &mut BitWriter, tag: u32, bands: u32) {
    assert!(bands <= 4);
    bw.write_bits(0, 3);
    bw.write_bits(tag, 4);
    bw.write_bits(160, 8); // global_gain
    bw.write_bits(0, 1);
    bw.write_bits(0, 2); // ONLY_LONG_SEQUENCE
    bw.write_bits(0, 1);
    bw.write_bits(bands, 6);
    bw.write_bits(0, 1);
    if bands > 0 {
        bw.write_bits(1, 4);
        bw.write_bits(bands, 5);
    }
    for _ in 0..bands {
        bw.write_bits(0, 1);
    }
    bw.write_bits(0, 3);
    for _ in 0..bands {
        bw.write_bits(0x7F4, 11);
    }
}

fn tone_frame(bands: u32) -> Vec<u8> {
    let mut bw = BitWriter::new();
    write_tone_sce(&mut bw, 0, bands);
    bw.write_bits(7, 3);
    bw.finish()
}

fn mono_pce(frequency_index: u8) -> ProgramConfigElement {
    ProgramConfigElement {
        instance_tag: 0,
        object_type: 1,
        sample_frequency_index: frequency_index,
        front: vec![PceChannelElement {
            is_cpe: false,
            tag: 0,
        }],
        side: vec![],
        back: vec![],
        lfe: vec![],
        assoc_data: vec![],
        coupling: vec![],
        mono_mixdown: None,
        stereo_mixdown: None,
        matrix_mixdown: None,
        comment: vec![],
    }
}

fn expect_decoded(outcome: FrameOutcome) -> aacdec::codec::aac::DecodedFrame {
    match outcome {
        FrameOutcome::Decoded(frame) => frame,
        FrameOutcome::Dropped(err) => panic!("帧被丢弃: {err}"),
    }
}

// ============================================================
// 配置与格式
// ============================================================

#[test]
fn test_asc_创建解码器() {
    init_logger();
    // LC, 48000 Hz, 立体声
    let mut decoder = AacDecoder::from_audio_specific_config(&[0x11, 0x90]).unwrap();
    let format = decoder.audio_format();
    assert_eq!(format.sample_rate, 48000);
    assert_eq!(format.channels, 2);
    assert_eq!(format.bit_depth, 16);
    assert!(format.signed && !format.big_endian);

    // 只有 END 的帧: 全部声道输出静音
    let frame = expect_decoded(decoder.decode_frame(&[0xE0]).unwrap());
    assert_eq!(frame.consumed, 1);
    assert_eq!(frame.pcm.channels, 2);
    assert_eq!(frame.pcm.samples.len(), 2048);
    assert!(frame.pcm.samples.iter().all(|&s| s == 0));
}

#[test]
fn test_不可解码的配置() {
    init_logger();
    assert!(matches!(
        DecoderConfig::create(0, 44100, 2),
        Err(AacError::Configuration(_))
    ));

    let ssr = DecoderConfig::create(3, 44100, 2).unwrap();
    let mut decoder = AacDecoder::new(ssr, DecoderOptions::default()).unwrap();
    for _ in 0..2 {
        let err = decoder.decode_frame(&[0xE0]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Fatal);
    }
    assert_eq!(decoder.frames_decoded(), 2);

    // ER AAC LC, 44100 Hz, 单声道, 启用 section data 差错恢复
    let mut bw = BitWriter::new();
    bw.write_bits(17, 5);
    bw.write_bits(4, 4);
    bw.write_bits(1, 4);
    bw.write_bits(0, 1); // frameLengthFlag
    bw.write_bits(0, 1); // dependsOnCoreCoder
    bw.write_bits(1, 1); // extensionFlag
    bw.write_bits(1, 1); // aacSectionDataResilienceFlag
    bw.write_bits(0, 1);
    bw.write_bits(0, 1);
    bw.write_bits(0, 1); // extensionFlag3
    bw.write_bits(0, 2); // epConfig
    let asc = bw.finish();
    let config = DecoderConfig::decode(&asc).unwrap();
    assert!(config.resilience.section_data);
    let mut decoder = AacDecoder::new(config, DecoderOptions::default()).unwrap();
    assert!(matches!(
        decoder.decode_frame(&[0x00; 8]),
        Err(AacError::Configuration(_))
    ));
}

#[test]
fn test_选项关闭带宽扩展() {
    init_logger();
    let config = DecoderConfig::create(2, 16000, 1).unwrap();
    let doubled = AacDecoder::new(config.clone(), DecoderOptions::default()).unwrap();
    assert_eq!(doubled.audio_format().sample_rate, 32000);

    let options = DecoderOptions {
        bandwidth_extension: false,
        ..DecoderOptions::default()
    };
    let mut plain = AacDecoder::new(config, options).unwrap();
    assert_eq!(plain.audio_format().sample_rate, 16000);
    let frame = expect_decoded(plain.decode_frame(&[0xE0]).unwrap());
    assert_eq!(frame.pcm.samples_per_channel(), 1024);
}

// ============================================================
// 解码
// ============================================================

#[test]
fn test_单音帧解码确定性() {
    init_logger();
    let frame = tone_frame(4);
    let decode_three = || {
        let mut decoder = AacDecoder::from_parameters(2, 48000, 1).unwrap();
        (0..3)
            .map(|_| expect_decoded(decoder.decode_frame(&frame).unwrap()).pcm.samples)
            .collect::<Vec<_>>()
    };
    let a = decode_three();
    let b = decode_three();
    assert_eq!(a, b);
    assert!(a.iter().all(|s| s.len() == 1024));
    assert!(a[1].iter().any(|&s| s != 0));
    // 稳态: 第 2, 3 帧输入相同, 重叠部分也相同
    assert_eq!(a[1], a[2]);
}

#[test]
fn test_adif_流逐帧推进() {
    init_logger();
    let mut bw = BitWriter::new();
    bw.write_bytes(ADIF_ID);
    bw.write_bits(0, 1); // copyright_id_present
    bw.write_bits(0, 1);
    bw.write_bits(0, 1);
    bw.write_bits(1, 1); // 可变码率
    bw.write_bits(96_000, 23);
    bw.write_bits(0, 4);
    mono_pce(3).write(&mut bw);
    bw.align_to_byte();
    write_tone_sce(&mut bw, 0, 2);
    bw.write_bits(7, 3);
    bw.align_to_byte();
    write_tone_sce(&mut bw, 0, 2);
    bw.write_bits(7, 3);
    let data = bw.finish();

    let header = AdifHeader::parse(&data).unwrap();
    assert_eq!(header.programs[0].pce.channel_count(), 1);

    // 显式配置为立体声, ADIF 的 PCE 优先
    let mut decoder = AacDecoder::from_parameters(2, 44100, 2).unwrap();
    let mut offset = 0;
    let mut frames = 0;
    while offset < data.len() {
        let frame = expect_decoded(decoder.decode_frame(&data[offset..]).unwrap());
        assert_eq!(frame.pcm.channels, 1);
        assert_eq!(frame.pcm.sample_rate, 48000);
        assert!(frame.consumed > 0);
        offset += frame.consumed;
        frames += 1;
    }
    assert_eq!(offset, data.len());
    assert_eq!(frames, 2);
}

#[test]
fn test_pce_写出再解析() {
    let mut pce = mono_pce(4);
    pce.front.push(PceChannelElement {
        is_cpe: true,
        tag: 1,
    });
    pce.side.push(PceChannelElement {
        is_cpe: true,
        tag: 2,
    });
    pce.lfe.push(0);
    pce.comment = b"aacdec".to_vec();

    let mut bw = BitWriter::new();
    pce.write(&mut bw);
    let data = bw.finish();
    let parsed = ProgramConfigElement::parse(&mut BitReader::new(&data)).unwrap();
    assert_eq!(parsed, pce);
    assert_eq!(parsed.channel_count(), 6);
}

#[test]
fn test_截断帧不中断解码() {
    init_logger();
    let frame = tone_frame(4);
    let mut decoder = AacDecoder::from_parameters(2, 48000, 1).unwrap();
    for len in 0..frame.len() {
        match decoder.decode_frame(&frame[..len]).unwrap() {
            FrameOutcome::Dropped(err) => assert_eq!(err.kind(), ErrorKind::FrameLevel),
            FrameOutcome::Decoded(_) => panic!("截断到 {len} 字节仍解码成功"),
        }
    }
    assert_eq!(decoder.frames_decoded(), frame.len() as u64);
    expect_decoded(decoder.decode_frame(&frame).unwrap());
}

// ============================================================
// 流式接口
// ============================================================

#[test]
fn test_decoder_trait_收发与冲刷() {
    init_logger();
    let mut decoder = AacDecoder::from_parameters(2, 48000, 1).unwrap();
    assert_eq!(decoder.name(), "aac");

    let mut total = 0u32;
    for i in 0..4 {
        let mut packet = Packet::from_data(tone_frame(4));
        packet.pts = i * 1024;
        decoder.send_packet(&packet).unwrap();
        let frame = decoder.receive_frame().unwrap();
        assert_eq!(frame.pts, i * 1024);
        assert_eq!(frame.sample_rate, 48000);
        assert_eq!(frame.to_le_bytes().len(), frame.samples.len() * 2);
        total += frame.nb_samples;
    }
    assert_eq!(total, 4 * 1024);

    decoder.send_packet(&Packet::empty()).unwrap();
    assert!(matches!(decoder.receive_frame(), Err(AacError::Eof)));

    // 冲刷后可继续送包
    decoder.flush();
    decoder.send_packet(&Packet::from_data(tone_frame(4))).unwrap();
    assert!(decoder.receive_frame().is_ok());
}
