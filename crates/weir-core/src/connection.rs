use std::{io, net::SocketAddr, sync::Arc};

use parking_lot::Mutex;

use crate::buffer::{Buffer, watermark::WatermarkBuffer};
use crate::dispatch::{EventScheduler, InterestSet, NullEventScheduler};
use crate::filter::{ConnectionCallbacks, Filter, FilterManager, FilterStatus, ReadFilter, WriteFilter};
use crate::stats::{BufferStats, update_buffer_stats};
use crate::transport::{IoOutcome, TransportSocket};

/// 无缓冲上限时单轮读取的分块大小。
pub const DEFAULT_READ_CHUNK: usize = 16 * 1024;

/// 连接生命周期状态。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectionState {
    /// 客户端已发起建连，等待可写就绪揭晓结果。
    Connecting,
    /// 双向可用。
    Open,
    /// 本端已请求关闭，正在排空写缓冲。
    Closing,
    /// 已终结，不再产生任何事件。
    Closed,
}

/// 广播给连接观察者的生命周期事件。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectionEvent {
    /// 建连完成（仅客户端路径产生）。
    Connected,
    /// 本端发起的关闭已生效。
    LocalClose,
    /// 对端关闭或硬 I/O 错误导致的终结。
    RemoteClose,
}

/// `close()` 的排空策略。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CloseType {
    /// 尽力冲刷一次后立即关闭，不等待对端接收剩余字节。
    NoFlush,
    /// 有滞留字节时先转入 `Closing` 排空，排空完成后再关闭。
    FlushWrite,
}

/// 水位缓冲登记的待派发边沿信号。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum WatermarkSignal {
    AboveHigh,
    BelowLow,
}

type SignalQueue = Arc<Mutex<Vec<WatermarkSignal>>>;

struct ConnectionCore {
    state: ConnectionState,
    read_buffer: WatermarkBuffer,
    write_buffer: WatermarkBuffer,
    read_disable_count: u32,
    buffer_limit: usize,
    buffer_stats: Option<BufferStats>,
    previous_read_len: u64,
    previous_write_len: u64,
    close_after_flush: bool,
    watermark_read_disabled: bool,
    scheduler: Arc<dyn EventScheduler>,
}

impl ConnectionCore {
    /// 按当前状态重算兴趣集并覆盖式登记。
    fn sync_interest(&self) {
        let interest = InterestSet {
            read: self.state == ConnectionState::Open && self.read_disable_count == 0,
            write: self.state == ConnectionState::Connecting
                || self.close_after_flush
                || !self.write_buffer.is_empty(),
        };
        self.scheduler.update_interest(interest);
    }

    /// 把写缓冲尽力排向套接字，返回是否遭遇硬错误。
    fn drain_to_socket(&mut self, socket: &dyn TransportSocket) -> bool {
        let mut total_written = 0u64;
        let mut fatal = false;
        while !self.write_buffer.is_empty() {
            match self.write_buffer.write_to(socket) {
                IoOutcome::Done(0) | IoOutcome::WouldBlock => break,
                IoOutcome::Done(n) => total_written += n as u64,
                IoOutcome::EndOfStream | IoOutcome::Err(_) => {
                    fatal = true;
                    break;
                }
            }
        }
        self.record_write(total_written);
        fatal
    }

    /// 读方向统计同步：`delta` 为本轮新读入的字节数。
    fn record_read(&mut self, delta: u64) {
        if let Some(stats) = &self.buffer_stats {
            update_buffer_stats(
                delta,
                self.read_buffer.len() as u64,
                &mut self.previous_read_len,
                stats.rx_total.as_ref(),
                stats.rx_current.as_ref(),
            );
        }
    }

    /// 写方向统计同步：`delta` 为本轮实际写出的字节数。
    fn record_write(&mut self, delta: u64) {
        if let Some(stats) = &self.buffer_stats {
            update_buffer_stats(
                delta,
                self.write_buffer.len() as u64,
                &mut self.previous_write_len,
                stats.tx_total.as_ref(),
                stats.tx_current.as_ref(),
            );
        }
    }

    /// 终结时把两个方向的驻留计量归零。
    fn record_closed(&mut self) {
        if let Some(stats) = &self.buffer_stats {
            update_buffer_stats(
                0,
                0,
                &mut self.previous_read_len,
                stats.rx_total.as_ref(),
                stats.rx_current.as_ref(),
            );
            update_buffer_stats(
                0,
                0,
                &mut self.previous_write_len,
                stats.tx_total.as_ref(),
                stats.tx_current.as_ref(),
            );
        }
    }
}

struct ConnectionInner {
    socket: Box<dyn TransportSocket>,
    core: Mutex<ConnectionCore>,
    filter_manager: FilterManager,
    callbacks: Mutex<Vec<Arc<dyn ConnectionCallbacks>>>,
    write_signals: SignalQueue,
    read_signals: SignalQueue,
}

impl Drop for ConnectionInner {
    fn drop(&mut self) {
        self.socket.close();
    }
}

/// 事件驱动的传输层连接：非阻塞 I/O、过滤链分发与水位背压的汇合点。
///
/// # 设计背景（Why）
/// - 连接自身不拥有事件循环，只通过 [`EventScheduler`] 登记兴趣、由外部
///   在就绪时回调 [`on_read_ready`](Self::on_read_ready) /
///   [`on_write_ready`](Self::on_write_ready)；这让核心状态机可以在纯内存
///   测试中被完整驱动。
/// - 句柄为 `Clone`（内部 `Arc` 共享），过滤器、观察者与事件循环各持一份
///   而无需生命周期耦合。
///
/// # 契约说明（What）
/// - 生命周期：客户端 `Connecting → Open`，任一状态可经 `close()` 或对端
///   行为进入 `Closed`；终结时恰好广播一次 `LocalClose` 或 `RemoteClose`，
///   此后连接保持惰性。
/// - `Connected` 先于读过滤器的 `on_new_connection`，二者都先于首批
///   `on_data`。
/// - `read_disable` 按计数叠加，只有计数回到 0 才恢复读取；计数下穿 0
///   属于调用方缺陷，直接断言失败。
///
/// # 逻辑解析（How）
/// - 内部状态由单把互斥锁保护；所有过滤器、观察者与水位回调都在锁释放后
///   调用，因此回调内反向调用连接（包括 `close()`）不会死锁；
/// - 水位缓冲的边沿回调只向信号队列登记，实际派发统一发生在每个公开方法
///   收尾处的信号冲刷阶段，保证观察者看到的是操作完成后的稳定状态。
pub struct Connection {
    inner: Arc<ConnectionInner>,
}

impl Clone for Connection {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("state", &self.state())
            .field("local", &self.local_address())
            .field("remote", &self.remote_address())
            .finish()
    }
}

enum ConnectStep {
    Established,
    Pending,
    Failed,
    AlreadyOpen,
    Terminated,
}

enum ReadStep {
    Continue,
    DispatchFull,
    Stop,
}

impl Connection {
    /// 以客户端模式包装套接字：初始 `Connecting`，随后调用
    /// [`connect`](Self::connect) 发起建连。
    pub fn new_client(socket: Box<dyn TransportSocket>) -> Self {
        Self::build(socket, ConnectionState::Connecting)
    }

    /// 以服务端模式包装一条已接受的连接：初始即为 `Open`。
    pub fn new_server(socket: Box<dyn TransportSocket>) -> Self {
        Self::build(socket, ConnectionState::Open)
    }

    fn build(socket: Box<dyn TransportSocket>, state: ConnectionState) -> Self {
        let write_signals: SignalQueue = Arc::new(Mutex::new(Vec::new()));
        let read_signals: SignalQueue = Arc::new(Mutex::new(Vec::new()));

        let write_buffer = Self::signal_buffer(&write_signals);
        let read_buffer = Self::signal_buffer(&read_signals);

        let core = ConnectionCore {
            state,
            read_buffer,
            write_buffer,
            read_disable_count: 0,
            buffer_limit: 0,
            buffer_stats: None,
            previous_read_len: 0,
            previous_write_len: 0,
            close_after_flush: false,
            watermark_read_disabled: false,
            scheduler: Arc::new(NullEventScheduler),
        };

        Self {
            inner: Arc::new(ConnectionInner {
                socket,
                core: Mutex::new(core),
                filter_manager: FilterManager::new(),
                callbacks: Mutex::new(Vec::new()),
                write_signals,
                read_signals,
            }),
        }
    }

    /// 构造只向队列登记信号的水位缓冲，派发推迟到锁外。
    fn signal_buffer(queue: &SignalQueue) -> WatermarkBuffer {
        let above = Arc::clone(queue);
        let below = Arc::clone(queue);
        WatermarkBuffer::new(
            Box::new(move || above.lock().push(WatermarkSignal::AboveHigh)),
            Box::new(move || below.lock().push(WatermarkSignal::BelowLow)),
        )
    }

    /// 挂接事件循环并立即按当前状态登记兴趣。
    pub fn set_event_scheduler(&self, scheduler: Arc<dyn EventScheduler>) {
        let core = &mut *self.inner.core.lock();
        core.scheduler = scheduler;
        core.sync_interest();
    }

    /// 注册生命周期观察者。
    pub fn add_connection_callbacks(&self, callbacks: Arc<dyn ConnectionCallbacks>) {
        self.inner.callbacks.lock().push(callbacks);
    }

    /// 追加读过滤器。
    pub fn add_read_filter(&self, filter: Arc<dyn ReadFilter>) {
        self.inner.filter_manager.add_read_filter(filter);
    }

    /// 追加写过滤器。
    pub fn add_write_filter(&self, filter: Arc<dyn WriteFilter>) {
        self.inner.filter_manager.add_write_filter(filter);
    }

    /// 追加双向过滤器。
    pub fn add_filter(&self, filter: Arc<dyn Filter>) {
        self.inner.filter_manager.add_filter(filter);
    }

    /// 当前状态快照。
    pub fn state(&self) -> ConnectionState {
        self.inner.core.lock().state
    }

    /// 当前缓冲上限，0 表示未启用。
    pub fn buffer_limit(&self) -> usize {
        self.inner.core.lock().buffer_limit
    }

    /// 写缓冲是否处于高水位之上。
    pub fn above_high_watermark(&self) -> bool {
        self.inner.core.lock().write_buffer.is_above_high_watermark()
    }

    /// 传输层未做协议协商，恒为空串。
    pub fn next_protocol(&self) -> String {
        String::new()
    }

    /// 本地地址（若可获取）。
    pub fn local_address(&self) -> Option<SocketAddr> {
        self.inner.socket.local_address()
    }

    /// 对端地址（若可获取）。
    pub fn remote_address(&self) -> Option<SocketAddr> {
        self.inner.socket.remote_address()
    }

    /// 绑定缓冲统计后端；此后读写与终结路径都会同步计数。
    pub fn set_buffer_stats(&self, stats: BufferStats) {
        self.inner.core.lock().buffer_stats = Some(stats);
    }

    /// 设置读写缓冲的共同上限：读侧约束单轮读入量，写侧作为高水位阈值。
    pub fn set_buffer_limits(&self, limit: usize) {
        {
            let core = &mut *self.inner.core.lock();
            core.buffer_limit = limit;
            core.read_buffer.set_watermarks(limit);
            core.write_buffer.set_watermarks(limit);
        }
        self.flush_watermark_signals();
    }

    /// 发起异步建连。
    ///
    /// 仅允许在客户端初始状态调用；“进行中”视为成功，真正结果由随后的
    /// 可写就绪揭晓。立刻失败的建连直接终结连接并广播 `RemoteClose`。
    pub fn connect(&self) {
        assert!(self.inner.socket.is_open(), "connect 需要一个仍然打开的套接字");
        {
            let core = self.inner.core.lock();
            assert_eq!(
                core.state,
                ConnectionState::Connecting,
                "connect 仅适用于客户端初始状态"
            );
        }
        match self.inner.socket.begin_connect() {
            Ok(()) => {
                tracing::trace!(target: "weir::connection", "建连已发起，等待可写就绪");
                self.inner.core.lock().sync_interest();
            }
            Err(err) => {
                tracing::debug!(target: "weir::connection", error = %err, "建连立即失败");
                self.close_socket(ConnectionEvent::RemoteClose);
            }
        }
    }

    /// 可写就绪入口：先裁决建连结果，再冲刷写缓冲。
    pub fn on_write_ready(&self) {
        let step = {
            let core = &mut *self.inner.core.lock();
            match core.state {
                ConnectionState::Connecting => match self.inner.socket.take_connect_result() {
                    Ok(()) => {
                        core.state = ConnectionState::Open;
                        core.sync_interest();
                        ConnectStep::Established
                    }
                    Err(err) if err.kind() == io::ErrorKind::WouldBlock => ConnectStep::Pending,
                    Err(_) => ConnectStep::Failed,
                },
                ConnectionState::Closed => ConnectStep::Terminated,
                _ => ConnectStep::AlreadyOpen,
            }
        };

        match step {
            ConnectStep::Pending | ConnectStep::Terminated => return,
            ConnectStep::Failed => {
                self.close_socket(ConnectionEvent::RemoteClose);
                return;
            }
            ConnectStep::Established => {
                tracing::trace!(target: "weir::connection", "建连完成");
                self.raise_event(ConnectionEvent::Connected);
                self.inner
                    .filter_manager
                    .on_new_connection(&|| self.state() == ConnectionState::Open);
            }
            ConnectStep::AlreadyOpen => {}
        }
        self.flush_write_buffer();
    }

    /// 可读就绪入口：按缓冲上限分块读入并驱动过滤链。
    ///
    /// 上限启用时单轮最多读入 `limit - len` 字节，缓冲填满即触发一次
    /// 分发；过滤器若不消费（`StopIteration`），缓冲保持满载，本轮结束，
    /// 避免空转。对端关闭或硬错误在分发完已读字节后终结连接。
    pub fn on_read_ready(&self) {
        let mut terminal: Option<ConnectionEvent> = None;
        let mut pending_dispatch = false;
        let mut dispatched_mid_cycle = false;

        loop {
            let step = {
                let core = &mut *self.inner.core.lock();
                if core.state != ConnectionState::Open || core.read_disable_count > 0 {
                    ReadStep::Stop
                } else {
                    let len = core.read_buffer.len();
                    let max = if core.buffer_limit == 0 {
                        DEFAULT_READ_CHUNK
                    } else {
                        core.buffer_limit.saturating_sub(len)
                    };
                    if max == 0 {
                        ReadStep::DispatchFull
                    } else {
                        match core.read_buffer.read_from(self.inner.socket.as_ref(), max) {
                            IoOutcome::Done(n) => {
                                core.record_read(n as u64);
                                pending_dispatch = true;
                                if core.buffer_limit != 0
                                    && core.read_buffer.len() >= core.buffer_limit
                                {
                                    ReadStep::DispatchFull
                                } else {
                                    ReadStep::Continue
                                }
                            }
                            IoOutcome::WouldBlock => ReadStep::Stop,
                            IoOutcome::EndOfStream => {
                                terminal = Some(ConnectionEvent::RemoteClose);
                                ReadStep::Stop
                            }
                            IoOutcome::Err(err) => {
                                tracing::debug!(target: "weir::connection", error = %err, "读路径硬错误");
                                terminal = Some(ConnectionEvent::RemoteClose);
                                ReadStep::Stop
                            }
                        }
                    }
                }
            };

            match step {
                ReadStep::Continue => continue,
                ReadStep::DispatchFull => {
                    pending_dispatch = false;
                    dispatched_mid_cycle = true;
                    self.dispatch_read();
                    let still_full = {
                        let core = self.inner.core.lock();
                        core.state != ConnectionState::Open
                            || (core.buffer_limit != 0
                                && core.read_buffer.len() >= core.buffer_limit)
                    };
                    if still_full {
                        break;
                    }
                }
                ReadStep::Stop => break,
            }
        }

        // 本轮没有读到新字节也要分发存量：读重新启用后补发的就绪事件
        // 只携带上一轮 `StopIteration` 留下的字节，套接字本身是空的。
        let leftover_pending = !dispatched_mid_cycle && {
            let core = self.inner.core.lock();
            core.state == ConnectionState::Open
                && core.read_disable_count == 0
                && !core.read_buffer.is_empty()
        };
        if pending_dispatch || leftover_pending {
            self.dispatch_read();
        }
        self.flush_watermark_signals();
        if let Some(event) = terminal {
            self.close_socket(event);
        }
    }

    /// 把出站数据送入写过滤链，通过后滞留到写缓冲并登记可写兴趣。
    ///
    /// 任何状态下都立即返回；`Connecting` 期间的写入先行缓冲，建连完成
    /// 后随首次可写就绪一并冲刷。写过滤器返回 `StopIteration` 时数据留在
    /// 调用方缓冲中，由过滤器自行决定后续如何续传。
    pub fn write(&self, data: &mut Buffer) {
        if !self.is_writable_state() {
            return;
        }
        let status = self
            .inner
            .filter_manager
            .on_write(data, &|| self.is_writable_state());
        if status == FilterStatus::StopIteration {
            return;
        }
        {
            let core = &mut *self.inner.core.lock();
            match core.state {
                ConnectionState::Open => {
                    core.write_buffer.move_from(data);
                    core.sync_interest();
                    core.scheduler.activate(InterestSet::WRITE);
                }
                ConnectionState::Connecting => {
                    core.write_buffer.move_from(data);
                    core.sync_interest();
                }
                _ => return,
            }
        }
        self.flush_watermark_signals();
    }

    /// 按计数叠加地禁用/恢复读取。
    ///
    /// 兴趣集只在计数跨越 0↔1 边界时变更；恢复到 0 且读缓冲仍有存量时
    /// 主动补发一次可读派发，消化滞留字节。
    pub fn read_disable(&self, disable: bool) {
        let core = &mut *self.inner.core.lock();
        if disable {
            core.read_disable_count += 1;
            if core.read_disable_count == 1 {
                core.sync_interest();
            }
        } else {
            assert!(core.read_disable_count > 0, "read_disable 计数不能下穿 0");
            core.read_disable_count -= 1;
            if core.read_disable_count == 0 {
                core.sync_interest();
                if !core.read_buffer.is_empty() {
                    core.scheduler.activate(InterestSet::READ);
                }
            }
        }
    }

    /// 当前读禁用计数，测试与诊断用。
    pub fn read_disable_count(&self) -> u32 {
        self.inner.core.lock().read_disable_count
    }

    /// 请求关闭连接。
    ///
    /// - [`CloseType::NoFlush`]：对写缓冲做一次尽力冲刷后立即终结，广播
    ///   `LocalClose`；
    /// - [`CloseType::FlushWrite`]：写缓冲为空时等同立即关闭；有滞留字节
    ///   时转入 `Closing`，停止读取、只保留写兴趣，排空后终结。
    pub fn close(&self, close_type: CloseType) {
        enum CloseStep {
            Now,
            Deferred,
            Ignore,
        }

        let step = {
            let core = &mut *self.inner.core.lock();
            match (core.state, close_type) {
                (ConnectionState::Closed, _) => CloseStep::Ignore,
                (ConnectionState::Closing, CloseType::FlushWrite) => CloseStep::Ignore,
                (_, CloseType::NoFlush) => {
                    // 尽力而为：能写多少写多少，失败也照常关闭。
                    let _ = core.drain_to_socket(self.inner.socket.as_ref());
                    CloseStep::Now
                }
                (_, CloseType::FlushWrite) => {
                    if core.write_buffer.is_empty() {
                        CloseStep::Now
                    } else {
                        core.state = ConnectionState::Closing;
                        core.close_after_flush = true;
                        core.sync_interest();
                        core.scheduler.activate(InterestSet::WRITE);
                        CloseStep::Deferred
                    }
                }
            }
        };

        self.flush_watermark_signals();
        if matches!(step, CloseStep::Now) {
            self.close_socket(ConnectionEvent::LocalClose);
        }
    }

    fn is_writable_state(&self) -> bool {
        matches!(
            self.state(),
            ConnectionState::Open | ConnectionState::Connecting
        )
    }

    /// 冲刷写缓冲；排空且处于延迟关闭时终结连接。
    fn flush_write_buffer(&self) {
        let terminal = {
            let core = &mut *self.inner.core.lock();
            if core.state == ConnectionState::Closed {
                None
            } else if core.drain_to_socket(self.inner.socket.as_ref()) {
                Some(ConnectionEvent::RemoteClose)
            } else if core.close_after_flush && core.write_buffer.is_empty() {
                Some(ConnectionEvent::LocalClose)
            } else {
                core.sync_interest();
                None
            }
        };
        self.flush_watermark_signals();
        if let Some(event) = terminal {
            self.close_socket(event);
        }
    }

    /// 取出读缓冲交给过滤链，分发结束后放回并同步统计。
    fn dispatch_read(&self) {
        let mut buffer = {
            let core = &mut *self.inner.core.lock();
            if core.state != ConnectionState::Open {
                return;
            }
            core.read_buffer.take_inner()
        };

        self.inner
            .filter_manager
            .on_read(&mut buffer, &|| self.state() == ConnectionState::Open);

        {
            let core = &mut *self.inner.core.lock();
            core.read_buffer.restore_inner(buffer);
            // 分发中被关闭的连接已在终结路径归零统计，不再回填。
            if core.state != ConnectionState::Closed {
                core.record_read(0);
            }
        }
        self.flush_watermark_signals();
    }

    /// 终结连接：幂等，恰好广播一次终结事件。
    fn close_socket(&self, event: ConnectionEvent) {
        {
            let core = &mut *self.inner.core.lock();
            if core.state == ConnectionState::Closed {
                return;
            }
            core.state = ConnectionState::Closed;
            core.close_after_flush = false;
            core.record_closed();
            core.scheduler.update_interest(InterestSet::NONE);
        }
        tracing::trace!(target: "weir::connection", ?event, "连接终结");
        self.inner.socket.close();
        self.raise_event(event);
    }

    /// 向全部观察者广播事件；回调期间不持有任何内部锁。
    fn raise_event(&self, event: ConnectionEvent) {
        let callbacks: Vec<Arc<dyn ConnectionCallbacks>> = self.inner.callbacks.lock().clone();
        for callback in callbacks {
            callback.on_event(event);
        }
    }

    /// 派发积压的水位边沿信号。
    ///
    /// 写侧信号转成观察者的高低水位回调；读侧信号驱动内部读禁用开关，
    /// 在过滤器滞留字节把读缓冲顶过阈值时暂停读取、回落后恢复。回调内
    /// 引发的新信号会在下一轮循环继续派发。
    fn flush_watermark_signals(&self) {
        loop {
            let write_batch: Vec<WatermarkSignal> =
                std::mem::take(&mut *self.inner.write_signals.lock());
            let read_batch: Vec<WatermarkSignal> =
                std::mem::take(&mut *self.inner.read_signals.lock());
            if write_batch.is_empty() && read_batch.is_empty() {
                return;
            }

            for signal in write_batch {
                let callbacks: Vec<Arc<dyn ConnectionCallbacks>> =
                    self.inner.callbacks.lock().clone();
                for callback in callbacks {
                    match signal {
                        WatermarkSignal::AboveHigh => {
                            callback.on_above_write_buffer_high_watermark();
                        }
                        WatermarkSignal::BelowLow => {
                            callback.on_below_write_buffer_low_watermark();
                        }
                    }
                }
            }

            for signal in read_batch {
                match signal {
                    WatermarkSignal::AboveHigh => {
                        let engage = {
                            let core = &mut *self.inner.core.lock();
                            if core.state == ConnectionState::Open && !core.watermark_read_disabled
                            {
                                core.watermark_read_disabled = true;
                                true
                            } else {
                                false
                            }
                        };
                        if engage {
                            self.read_disable(true);
                        }
                    }
                    WatermarkSignal::BelowLow => {
                        let release = {
                            let core = &mut *self.inner.core.lock();
                            if core.watermark_read_disabled {
                                core.watermark_read_disabled = false;
                                true
                            } else {
                                false
                            }
                        };
                        if release {
                            self.read_disable(false);
                        }
                    }
                }
            }
        }
    }
}
