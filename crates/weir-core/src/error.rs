use std::{io, net::SocketAddr};

use thiserror::Error;

/// 传输层建立阶段的结构化错误。
///
/// # 设计背景（Why）
/// - 连接一旦建立，硬 I/O 错误走“终结事件”通道（`RemoteClose`），不再
///   以 `Result` 穿越连接边界；而绑定、发起建连、接受连接这些**建立期**
///   操作发生在连接存在之前，必须把失败原因结构化地交还调用方。
///
/// # 契约说明（What）
/// - 每个变体都保留触发失败的底层 `io::Error` 与相关地址，便于上层
///   打点与重试决策；重试本身不属于本层职责。
#[derive(Debug, Error)]
pub enum TransportError {
    /// 绑定监听地址失败。
    #[error("bind {addr} failed: {source}")]
    Bind {
        /// 目标地址。
        addr: SocketAddr,
        /// 底层错误。
        #[source]
        source: io::Error,
    },

    /// 创建或发起客户端连接失败。
    #[error("connect {addr} failed: {source}")]
    Connect {
        /// 目标地址。
        addr: SocketAddr,
        /// 底层错误。
        #[source]
        source: io::Error,
    },

    /// 接受新连接失败。
    #[error("accept failed: {source}")]
    Accept {
        /// 底层错误。
        #[source]
        source: io::Error,
    },

    /// 设置套接字选项失败。
    #[error("socket option failed: {source}")]
    SocketOption {
        /// 底层错误。
        #[source]
        source: io::Error,
    },
}
