//! 统一错误类型定义.
//!
//! 所有 aacdec crate 共用的错误类型. 错误分为两类:
//! - 流级 (致命): 配置错误、参数错误, 解码器实例无法继续工作;
//! - 帧级 (可恢复): 比特流耗尽、语法元素损坏, 仅丢弃当前帧.

use thiserror::Error;

/// AAC 解码统一错误类型
#[derive(Debug, Error)]
pub enum AacError {
    /// 配置错误: 不支持/无法识别的 profile, 损坏的配置记录, 构造参数无效
    #[error("配置错误: {0}")]
    Configuration(String),

    /// 比特流在语法元素或码字解析完成前耗尽
    #[error("比特流已耗尽")]
    EndOfStream,

    /// 语法元素损坏: 非法元素标签、码本越界、边信息自相矛盾
    #[error("语法元素损坏: {0}")]
    MalformedElement(String),

    /// 帧内出现了本解码器未实现的工具
    #[error("不支持的特性: {0}")]
    Unsupported(String),

    /// 无效参数
    #[error("无效参数: {0}")]
    InvalidArgument(String),

    /// I/O 错误
    #[error("I/O 错误: {0}")]
    Io(#[from] std::io::Error),

    /// 数据不足, 需要更多输入
    #[error("数据不足, 需要更多输入")]
    NeedMoreData,

    /// 解码器已排空
    #[error("已到达流末尾")]
    Eof,
}

/// 错误的影响范围
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// 流级错误, 解码器实例不可继续使用
    Fatal,
    /// 帧级错误, 仅影响当前帧
    FrameLevel,
}

impl AacError {
    /// 错误的影响范围
    ///
    /// `NeedMoreData` / `Eof` 属于流控信号, 归为帧级.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Configuration(_) | Self::InvalidArgument(_) | Self::Io(_) => ErrorKind::Fatal,
            Self::EndOfStream
            | Self::MalformedElement(_)
            | Self::Unsupported(_)
            | Self::NeedMoreData
            | Self::Eof => ErrorKind::FrameLevel,
        }
    }

    /// 是否为帧级 (可恢复) 错误
    pub fn is_frame_level(&self) -> bool {
        self.kind() == ErrorKind::FrameLevel
    }

    /// 构造语法错误的便捷函数
    pub fn malformed(msg: impl Into<String>) -> Self {
        Self::MalformedElement(msg.into())
    }

    /// 构造配置错误的便捷函数
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }
}

/// 统一 Result 类型
pub type AacResult<T> = Result<T, AacError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_错误分类() {
        assert_eq!(AacError::config("x").kind(), ErrorKind::Fatal);
        assert_eq!(AacError::EndOfStream.kind(), ErrorKind::FrameLevel);
        assert!(AacError::malformed("bad tag").is_frame_level());
        assert!(!AacError::InvalidArgument("n".into()).is_frame_level());
    }

    #[test]
    fn test_错误信息() {
        let err = AacError::malformed("AAC: 码本 12 保留");
        assert_eq!(err.to_string(), "语法元素损坏: AAC: 码本 12 保留");
    }
}
