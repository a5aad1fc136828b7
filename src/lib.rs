//! # aacdec
//!
//! 纯 Rust 实现的 MPEG-2/4 AAC 解码器.
//!
//! 支持 AAC Main / LC / LTP 与 ER AAC LC / LTP 的核心层解码:
//! - **语法解析**: AudioSpecificConfig, PCE, ADIF, raw_data_block 全部元素
//! - **频谱重建**: 反量化, PNS, M/S, 强度立体声, 预测, TNS, 耦合声道
//! - **滤波器组**: IMDCT 与加窗重叠相加, 输出交错 16 位 PCM
//!
//! # 快速开始
//!
//! ```rust
//! use aacdec::codec::{AacDecoder, FrameOutcome};
//!
//! // AAC LC, 44100 Hz, 单声道
//! let mut decoder = AacDecoder::from_parameters(2, 44100, 1).unwrap();
//! if let FrameOutcome::Decoded(frame) = decoder.decode_frame(&[0xE0]).unwrap() {
//!     assert_eq!(frame.pcm.samples_per_channel(), 1024);
//! }
//! ```
//!
//! # Crate 结构
//!
//! | Crate | 功能 |
//! |-------|------|
//! | `aacdec-core` | 比特流读写, 错误类型, 声道布局 |
//! | `aacdec-codec` | AAC 解码器 |

/// 核心类型与工具
pub use aacdec_core as core;

/// AAC 解码器
pub use aacdec_codec as codec;

/// 获取版本号
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
