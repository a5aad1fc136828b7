//! # aacdec-codec
//!
//! MPEG-2/4 AAC 解码器, 将 raw_data_block 解码为交错 16 位 PCM.
//!
//! ## 使用示例
//!
//! ```rust
//! use aacdec_codec::aac::{AacDecoder, DecoderConfig, DecoderOptions, FrameOutcome};
//!
//! // AAC LC, 44100 Hz, 立体声
//! let config = DecoderConfig::decode(&[0x12, 0x10]).unwrap();
//! let mut decoder = AacDecoder::new(config, DecoderOptions::default()).unwrap();
//! assert_eq!(decoder.audio_format().sample_rate, 44100);
//!
//! // 空帧: CPE 缺失时仅含 END 元素, 输出静音
//! match decoder.decode_frame(&[0xE0]).unwrap() {
//!     FrameOutcome::Decoded(frame) => assert_eq!(frame.pcm.samples_per_channel(), 1024),
//!     FrameOutcome::Dropped(err) => panic!("{err}"),
//! }
//! ```

pub mod aac;
pub mod decoder;
pub mod frame;
pub mod packet;

pub use aac::{AacDecoder, AudioFormat, DecoderConfig, DecoderOptions, FrameOutcome, PcmBuffer};
pub use decoder::Decoder;
pub use frame::AudioFrame;
pub use packet::Packet;
