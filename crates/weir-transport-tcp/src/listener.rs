use std::io;
use std::net::SocketAddr;

use socket2::{Domain, Protocol, SockAddr, Socket, Type};
use weir_core::{Connection, ListenerCallbacks, TransportError};

use crate::socket::TcpSocket;

const LISTEN_BACKLOG: i32 = 128;

/// 非阻塞 TCP 监听器：accept 就绪时批量收割连接并交给回调。
///
/// # 契约说明（What）
/// - [`bind`](Self::bind) 完成 `socket/bind/listen` 三段式并切换非阻塞；
///   地址端口 0 时以 [`local_address`](Self::local_address) 取回实际端口。
/// - [`on_accept_ready`](Self::on_accept_ready) 在一次就绪中循环接受直到
///   `WouldBlock`，每条连接包装成服务端模式的 [`Connection`]（已是
///   `Open`）、套用统一的缓冲上限后移交回调。
pub struct TcpAcceptor {
    socket: Socket,
    local: SocketAddr,
    per_connection_buffer_limit: usize,
}

impl TcpAcceptor {
    /// 绑定并开始监听 `addr`。
    pub fn bind(addr: SocketAddr) -> Result<Self, TransportError> {
        let socket = Socket::new(Domain::for_address(addr), Type::STREAM, Some(Protocol::TCP))
            .map_err(|source| TransportError::Bind { addr, source })?;
        socket
            .set_reuse_address(true)
            .map_err(|source| TransportError::SocketOption { source })?;
        socket
            .bind(&SockAddr::from(addr))
            .map_err(|source| TransportError::Bind { addr, source })?;
        socket
            .listen(LISTEN_BACKLOG)
            .map_err(|source| TransportError::Bind { addr, source })?;
        socket
            .set_nonblocking(true)
            .map_err(|source| TransportError::SocketOption { source })?;
        let local = socket
            .local_addr()
            .map_err(|source| TransportError::Bind { addr, source })?
            .as_socket()
            .ok_or_else(|| TransportError::Bind {
                addr,
                source: io::ErrorKind::InvalidInput.into(),
            })?;
        tracing::debug!(target: "weir::listener", %local, "监听已就绪");
        Ok(Self {
            socket,
            local,
            per_connection_buffer_limit: 0,
        })
    }

    /// 实际监听地址。
    pub fn local_address(&self) -> SocketAddr {
        self.local
    }

    /// 为之后接受的每条连接统一设置缓冲上限，0 表示不限制。
    pub fn set_per_connection_buffer_limit(&mut self, limit: usize) {
        self.per_connection_buffer_limit = limit;
    }

    /// accept 就绪入口：循环收割直到暂无新连接。
    pub fn on_accept_ready(&self, callbacks: &dyn ListenerCallbacks) -> Result<(), TransportError> {
        loop {
            match self.socket.accept() {
                Ok((stream, peer)) => {
                    let peer = peer.as_socket().ok_or_else(|| TransportError::Accept {
                        source: io::ErrorKind::InvalidInput.into(),
                    })?;
                    let socket = TcpSocket::from_accepted(stream, peer)?;
                    let connection = Connection::new_server(Box::new(socket));
                    if self.per_connection_buffer_limit > 0 {
                        connection.set_buffer_limits(self.per_connection_buffer_limit);
                    }
                    tracing::trace!(target: "weir::listener", %peer, "接受新连接");
                    callbacks.on_new_connection(connection);
                }
                Err(err)
                    if matches!(
                        err.kind(),
                        io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted
                    ) =>
                {
                    return Ok(());
                }
                Err(source) => return Err(TransportError::Accept { source }),
            }
        }
    }
}
