use std::{io, net::SocketAddr};

/// 单次非阻塞套接字操作的结果。
///
/// # 设计背景（Why）
/// - 早期实现直接透传 `io::Result<usize>`，调用方不得不到处比对
///   `ErrorKind::WouldBlock`；统一枚举后，“暂时不可读写”与“硬错误”在
///   类型上分离，连接状态机可以据此走不同分支。
///
/// # 契约说明（What）
/// - `Done(n)`：本次操作实际搬运了 `n` 个字节（`n > 0`）。
/// - `WouldBlock`：套接字暂不可读/写，等待下一次就绪通知重试；不是错误。
/// - `EndOfStream`：对端有序关闭（仅读方向产生）。
/// - `Err`：不可恢复的 I/O 错误，连接应当终结。
#[derive(Debug)]
pub enum IoOutcome {
    /// 实际读/写的字节数。
    Done(usize),
    /// 套接字暂不可用，等待下一次就绪通知。
    WouldBlock,
    /// 对端关闭了写方向（读到 EOF）。
    EndOfStream,
    /// 硬 I/O 错误。
    Err(io::Error),
}

impl IoOutcome {
    /// 将读操作的 `io::Result` 规整为 `IoOutcome`，`Ok(0)` 视为对端关闭。
    pub fn from_read(result: io::Result<usize>) -> Self {
        match result {
            Ok(0) => IoOutcome::EndOfStream,
            Ok(n) => IoOutcome::Done(n),
            Err(err) => Self::from_error(err),
        }
    }

    /// 将写操作的 `io::Result` 规整为 `IoOutcome`。
    pub fn from_write(result: io::Result<usize>) -> Self {
        match result {
            Ok(n) => IoOutcome::Done(n),
            Err(err) => Self::from_error(err),
        }
    }

    fn from_error(err: io::Error) -> Self {
        match err.kind() {
            // Interrupted 归并到 WouldBlock：下一轮就绪通知会重试。
            io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted => IoOutcome::WouldBlock,
            _ => IoOutcome::Err(err),
        }
    }
}

/// 连接所依赖的套接字边界。
///
/// # 设计背景（Why）
/// - 连接状态机只关心“读了多少、写了多少、建连结果如何”，不关心套接字
///   的具体来源（TCP、测试桩、未来的 UDS）；以对象安全 trait 划界后，
///   核心逻辑可以在无真实网络的测试中被完整驱动。
///
/// # 契约说明（What）
/// - 所有方法均为非阻塞：`read`/`write` 在无法立即完成时返回
///   [`IoOutcome::WouldBlock`]；
/// - `begin_connect` 仅发起建连，“进行中”（`EINPROGRESS`）一律视为成功
///   返回，真正的结果由后续可写就绪时的 [`take_connect_result`] 给出；
/// - `take_connect_result` 返回 `Ok(())` 表示建连完成，
///   `ErrorKind::WouldBlock` 表示仍在进行中，其余错误为建连失败；
/// - `close` 幂等；关闭后 `is_open` 返回 `false`，读写返回错误与否由
///   实现决定，连接层不会在关闭后继续调用。
///
/// [`take_connect_result`]: TransportSocket::take_connect_result
pub trait TransportSocket: Send + Sync {
    /// 非阻塞读取至多 `buf.len()` 字节。
    fn read(&self, buf: &mut [u8]) -> IoOutcome;

    /// 非阻塞写出 `buf` 的前缀，返回实际接受的字节数。
    fn write(&self, buf: &[u8]) -> IoOutcome;

    /// 发起非阻塞建连；“进行中”不算失败。
    fn begin_connect(&self) -> io::Result<()>;

    /// 查询异步建连的结果（例如读取 `SO_ERROR`）。
    fn take_connect_result(&self) -> io::Result<()>;

    /// 关闭套接字，幂等。
    fn close(&self);

    /// 套接字是否仍然打开。
    fn is_open(&self) -> bool;

    /// 本地地址（若可获取）。
    fn local_address(&self) -> Option<SocketAddr>;

    /// 对端地址（若可获取）。
    fn remote_address(&self) -> Option<SocketAddr>;
}
