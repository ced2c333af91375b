use super::Buffer;
use crate::transport::{IoOutcome, TransportSocket};

/// 水位边沿回调。绑定后由缓冲区在阈值穿越时调用。
pub type WatermarkCallback = Box<dyn FnMut() + Send>;

/// 带高低水位通知的缓冲区装饰器。
///
/// # 设计背景（Why）
/// - 写缓冲无限增长会把慢对端的问题放大成本进程的内存问题；以“高水位
///   减速、低水位恢复”的边沿信号约束上游生产者，是写路径背压的根基。
///
/// # 契约说明（What）
/// - `set_watermarks(high)` 采用 `low = high / 2`，保证 `high > 0` 时
///   严格有 `low < high`；`high == 0` 关闭水位功能。
/// - 越过高水位（长度 **大于** `high`）且此前处于低位态时，触发一次
///   “高于高水位”回调；回落到低水位（长度 **不大于** `low`）且此前
///   处于高位态时，触发一次“低于低水位”回调。
/// - 边沿按**操作**评估：一次追加/排空只在操作完成后对最终长度判定一次，
///   不会因中间字节逐个穿越阈值而多次回调。
/// - 调整水位会按新阈值重新归类当前长度：把上限缩到当前长度之下，即使
///   没有新增字节也会触发“高于高水位”；反向放宽同理。
///
/// # 风险提示（Trade-offs）
/// - 回调在缓冲区操作内部同步执行，绑定方若需要重入安全（例如回调中
///   反向关闭连接），应当只做信号登记、把实际处理挪到操作之外。
pub struct WatermarkBuffer {
    inner: Buffer,
    high: usize,
    low: usize,
    above_high: bool,
    on_above_high: WatermarkCallback,
    on_below_low: WatermarkCallback,
}

impl WatermarkBuffer {
    /// 以一对边沿回调构造缓冲区，初始不设水位。
    pub fn new(on_above_high: WatermarkCallback, on_below_low: WatermarkCallback) -> Self {
        Self {
            inner: Buffer::new(),
            high: 0,
            low: 0,
            above_high: false,
            on_above_high,
            on_below_low,
        }
    }

    /// 当前字节数。
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    /// 是否为空。
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// 当前高水位，0 表示未启用。
    pub fn high_watermark(&self) -> usize {
        self.high
    }

    /// 是否处于“高于高水位”状态。
    pub fn is_above_high_watermark(&self) -> bool {
        self.above_high
    }

    /// 调整水位并按新阈值重新归类当前长度。
    pub fn set_watermarks(&mut self, high: usize) {
        if high == 0 {
            self.high = 0;
            self.low = 0;
        } else {
            self.high = high;
            self.low = high / 2;
        }
        self.check_high_watermark();
        self.check_low_watermark();
    }

    /// 追加字节。
    pub fn add(&mut self, bytes: &[u8]) {
        self.inner.add(bytes);
        self.check_high_watermark();
    }

    /// 从 `other` 整体搬移内容到末尾。
    pub fn move_from(&mut self, other: &mut Buffer) {
        self.inner.move_from(other);
        self.check_high_watermark();
    }

    /// 丢弃开头 `n` 个字节。
    pub fn drain(&mut self, n: usize) {
        self.inner.drain(n);
        self.check_low_watermark();
    }

    /// 从套接字读入至多 `max` 字节。
    pub fn read_from(&mut self, socket: &dyn TransportSocket, max: usize) -> IoOutcome {
        let outcome = self.inner.read_from(socket, max);
        self.check_high_watermark();
        outcome
    }

    /// 向套接字写出前缀，按实际写出量排空。
    pub fn write_to(&mut self, socket: &dyn TransportSocket) -> IoOutcome {
        let outcome = self.inner.write_to(socket);
        self.check_low_watermark();
        outcome
    }

    /// 取出内层缓冲交给过滤链分发；期间水位判定暂停。
    ///
    /// 与 [`restore_inner`](Self::restore_inner) 成对使用：取出与放回
    /// 合并视作一次操作，放回时按最终长度统一评估边沿。
    pub fn take_inner(&mut self) -> Buffer {
        std::mem::take(&mut self.inner)
    }

    /// 放回分发后的内层缓冲并重新评估水位。
    pub fn restore_inner(&mut self, buffer: Buffer) {
        self.inner = buffer;
        self.check_high_watermark();
        self.check_low_watermark();
    }

    fn check_high_watermark(&mut self) {
        if !self.above_high && self.high > 0 && self.inner.len() > self.high {
            self.above_high = true;
            (self.on_above_high)();
        }
    }

    fn check_low_watermark(&mut self) {
        // 释放条件取 `len <= low`：`high == 1` 时 `low == 0`，严格小于
        // 永远不可能成立，高位态会被永久锁死。
        if self.above_high && (self.high == 0 || self.inner.len() <= self.low) {
            self.above_high = false;
            (self.on_below_low)();
        }
    }
}

impl std::fmt::Debug for WatermarkBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WatermarkBuffer")
            .field("len", &self.inner.len())
            .field("high", &self.high)
            .field("low", &self.low)
            .field("above_high", &self.above_high)
            .finish()
    }
}
