//! 流式解码器 trait 定义.

use aacdec_core::AacResult;

use crate::frame::AudioFrame;
use crate::packet::Packet;

/// 流式解码器 trait
///
/// 解码流程:
/// 1. 调用 `send_packet()` 送入一个 raw_data_block
/// 2. 调用 `receive_frame()` 取出解码后的帧
/// 3. 送入空包表示输入结束, 之后 `receive_frame()` 返回 `Eof`
pub trait Decoder: Send {
    /// 获取解码器名称
    fn name(&self) -> &str;

    /// 送入一个压缩数据包
    ///
    /// - `Ok(())`: 数据包已接受 (解码失败的帧被记录并丢弃, 同样返回 Ok)
    /// - `Err(NeedMoreData)`: 上一帧尚未取出
    /// - `Err(Configuration)`: 流级错误, 解码器不可继续使用
    fn send_packet(&mut self, packet: &Packet) -> AacResult<()>;

    /// 取出一帧解码数据
    ///
    /// - `Err(NeedMoreData)`: 需要送入更多数据包
    /// - `Err(Eof)`: 已刷新且所有帧已取出
    fn receive_frame(&mut self) -> AacResult<AudioFrame>;

    /// 刷新解码器, 清空跨帧状态
    ///
    /// 用于 seek 后重置.
    fn flush(&mut self);
}
