#![deny(unsafe_code)]
#![doc = r#"
# weir-core

## 设计动机（Why）
- **定位**：提供一个事件驱动的传输层连接核心——由外部事件循环投递就绪
  通知，连接在回调中完成非阻塞读写、过滤链分发与水位背压。
- **架构角色**：协议层（编解码、路由）坐落在读/写过滤链之上；事件循环、
  监听器、统计后端均为外部协作者，本 crate 只约定它们的窄接口。
- **设计理念**：强调“单线程协作式调度 + 重入安全”。过滤器或观察者可以在
  回调内部反向调用连接（例如直接 `close()`），分发循环通过显式的
  “仍然打开”检查在每次外部回调之后重新判定自身状态，而不是假设对象
  在嵌套调用后原封不动。

## 核心契约（What）
- **输入条件**：所有连接方法均由同一事件循环线程驱动；方法自身从不阻塞
  在 I/O 上——`write()` 立即返回，`connect()` 仅发起异步建连；
- **输出保障**：`Connected` 先于读过滤器的 `on_new_connection`；每条连接
  终结时恰好广播一次 `LocalClose` 或 `RemoteClose`；水位回调按边沿触发，
  同一状态内不重复通知；
- **失败语义**：`WouldBlock` 是流控信号而非错误；硬 I/O 错误将连接转入
  `Closed` 并广播终结事件；契约违规（读禁用计数为负、对已关闭套接字调用
  `connect()`）直接断言失败，属于调用方缺陷而非环境问题。

## 实现策略（How）
- **缓冲**：以 [`bytes::BytesMut`] 为底层可增长字节存储，之上包一层
  [`buffer::watermark::WatermarkBuffer`] 负责高低水位边沿通知；
- **过滤链**：读/写过滤器以注册顺序迭代，`StopIteration` 短路本轮分发，
  未消费字节保留到下一轮并从 0 号过滤器重新开始；
- **背压**：写缓冲越过高水位时通知上游减速，回落到低水位以下时通知恢复；
  读侧以同一数值上限约束单轮读入分块，并在过滤器膨胀缓冲时自动暂停读取。

## 风险与考量（Trade-offs）
- **锁纪律**：连接内部以互斥锁保护状态，但所有过滤器/观察者回调都在锁
  释放后调用；注册到 [`dispatch::EventScheduler`] 的实现不得在
  `update_interest` 内反向调用连接，否则会自锁；
- **单连接单线程**：类型满足 `Send + Sync` 以便跨线程移交，但并发驱动
  同一连接不在契约之内——就绪回调必须串行。
"#]

pub mod buffer;
pub mod connection;
pub mod dispatch;
pub mod error;
pub mod filter;
pub mod listener;
pub mod stats;
pub mod transport;

pub use buffer::{Buffer, watermark::WatermarkBuffer};
pub use connection::{CloseType, Connection, ConnectionEvent, ConnectionState};
pub use dispatch::{EventScheduler, InterestSet, NullEventScheduler};
pub use error::TransportError;
pub use filter::{ConnectionCallbacks, Filter, FilterStatus, ReadFilter, WriteFilter};
pub use listener::ListenerCallbacks;
pub use stats::{BufferStats, Counter, Gauge};
pub use transport::{IoOutcome, TransportSocket};
