#![deny(unsafe_code)]
#![doc = r#"
# weir-transport-tcp

## 设计动机（Why）
- 为 `weir-core` 的连接引擎提供真实的非阻塞 TCP 载体：客户端建连走
  `connect + EINPROGRESS`，服务端走 `bind/listen/accept` 三段式；核心
  状态机只认 [`weir_core::TransportSocket`] 这条窄边界，本 crate 负责把
  `socket2` 的原始套接字适配到这条边界之上。

## 核心契约（What）
- 所有套接字在进入连接引擎之前都已切换为非阻塞模式；
- `EINPROGRESS` 与 `WouldBlock` 是流控信号而非错误，建连结果由可写就绪
  时的 `SO_ERROR` 查询裁决；
- 建立期失败（绑定、发起建连、接受）以 [`weir_core::TransportError`]
  结构化返回，建立之后的硬错误统一走连接的终结事件通道。

## 风险与考量（Trade-offs）
- 本 crate 不内置事件循环：就绪通知由上层（poll/epoll 封装或测试的
  轮询泵）驱动，监听器与连接都只暴露 `on_*_ready` 形态的入口。
"#]

pub mod listener;
pub mod socket;

pub use listener::TcpAcceptor;
pub use socket::TcpSocket;
