use std::io::{self, Read, Write};
use std::net::SocketAddr;

use parking_lot::Mutex;
use socket2::{Domain, Protocol, SockAddr, Socket, Type};
use weir_core::{IoOutcome, TransportError, TransportSocket};

/// 非阻塞 TCP 套接字，[`weir_core::TransportSocket`] 的真实实现。
///
/// # 契约说明（What）
/// - 客户端经 [`client`](Self::client) 构造后处于未连接状态，由连接核心
///   调用 `begin_connect` 发起建连；服务端经
///   [`from_accepted`](Self::from_accepted) 包装已三次握手完成的套接字。
/// - `close` 幂等：取走内部套接字并随丢弃释放文件描述符，此后所有 I/O
///   返回 `NotConnected`。
pub struct TcpSocket {
    inner: Mutex<Option<Socket>>,
    peer: SocketAddr,
}

impl TcpSocket {
    /// 创建一个指向 `addr` 的非阻塞客户端套接字，尚未发起建连。
    pub fn client(addr: SocketAddr) -> Result<Self, TransportError> {
        let socket = Socket::new(Domain::for_address(addr), Type::STREAM, Some(Protocol::TCP))
            .map_err(|source| TransportError::Connect { addr, source })?;
        socket
            .set_nonblocking(true)
            .map_err(|source| TransportError::SocketOption { source })?;
        Ok(Self {
            inner: Mutex::new(Some(socket)),
            peer: addr,
        })
    }

    /// 包装一条监听器接受的连接，切换为非阻塞模式。
    pub fn from_accepted(socket: Socket, peer: SocketAddr) -> Result<Self, TransportError> {
        socket
            .set_nonblocking(true)
            .map_err(|source| TransportError::SocketOption { source })?;
        Ok(Self {
            inner: Mutex::new(Some(socket)),
            peer,
        })
    }

    /// 开关 Nagle 算法。
    pub fn set_no_delay(&self, enabled: bool) -> Result<(), TransportError> {
        let guard = self.inner.lock();
        match guard.as_ref() {
            Some(socket) => socket
                .set_tcp_nodelay(enabled)
                .map_err(|source| TransportError::SocketOption { source }),
            None => Err(TransportError::SocketOption {
                source: io::ErrorKind::NotConnected.into(),
            }),
        }
    }
}

impl TransportSocket for TcpSocket {
    fn read(&self, buf: &mut [u8]) -> IoOutcome {
        let guard = self.inner.lock();
        match guard.as_ref() {
            Some(mut socket) => IoOutcome::from_read(socket.read(buf)),
            None => IoOutcome::Err(io::ErrorKind::NotConnected.into()),
        }
    }

    fn write(&self, buf: &[u8]) -> IoOutcome {
        let guard = self.inner.lock();
        match guard.as_ref() {
            Some(mut socket) => IoOutcome::from_write(socket.write(buf)),
            None => IoOutcome::Err(io::ErrorKind::NotConnected.into()),
        }
    }

    fn begin_connect(&self) -> io::Result<()> {
        let guard = self.inner.lock();
        let Some(socket) = guard.as_ref() else {
            return Err(io::ErrorKind::NotConnected.into());
        };
        match socket.connect(&SockAddr::from(self.peer)) {
            Ok(()) => Ok(()),
            // 非阻塞建连的正常路径：结果由后续可写就绪揭晓。
            Err(err)
                if err.raw_os_error() == Some(libc::EINPROGRESS)
                    || err.kind() == io::ErrorKind::WouldBlock =>
            {
                Ok(())
            }
            Err(err) => Err(err),
        }
    }

    fn take_connect_result(&self) -> io::Result<()> {
        let guard = self.inner.lock();
        let Some(socket) = guard.as_ref() else {
            return Err(io::ErrorKind::NotConnected.into());
        };
        if let Some(err) = socket.take_error()? {
            return Err(err);
        }
        // SO_ERROR 为 0 不足以区分“已完成”与“仍在进行”，再以对端地址判定。
        match socket.peer_addr() {
            Ok(_) => Ok(()),
            Err(err) if err.kind() == io::ErrorKind::NotConnected => {
                Err(io::ErrorKind::WouldBlock.into())
            }
            Err(err) => Err(err),
        }
    }

    fn close(&self) {
        self.inner.lock().take();
    }

    fn is_open(&self) -> bool {
        self.inner.lock().is_some()
    }

    fn local_address(&self) -> Option<SocketAddr> {
        self.inner
            .lock()
            .as_ref()
            .and_then(|socket| socket.local_addr().ok())
            .and_then(|addr| addr.as_socket())
    }

    fn remote_address(&self) -> Option<SocketAddr> {
        Some(self.peer)
    }
}
