//! # aacdec-core
//!
//! AAC 解码器核心库, 提供比特流读写、错误类型与声道布局等基础设施.
//!
//! 上层的 `aacdec-codec` 只依赖本 crate 提供的基础类型.

pub mod bitreader;
pub mod bitwriter;
pub mod channel_layout;
pub mod error;

// 重导出常用类型
pub use channel_layout::{ChannelLayout, ChannelMask, ChannelPosition};
pub use error::{AacError, AacResult, ErrorKind};
