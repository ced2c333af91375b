use bytes::{Buf, BytesMut};

use crate::transport::{IoOutcome, TransportSocket};

pub mod watermark;

/// 可增长的字节缓冲区，连接读写路径的基础原语。
///
/// # 设计背景（Why）
/// - 连接核心只依赖四类操作：追加、排空、从另一缓冲整体搬移、以及为系统
///   调用提供线性化视图；其余能力（引用计数、分片）刻意不暴露，避免过滤
///   器之间出现共享可变别名。
///
/// # 契约说明（What）
/// - 缓冲区始终由当前持有它的组件独占；`move_from` 转移的是字节内容，
///   不是缓冲对象本身的所有权。
/// - `drain(n)` 超过当前长度属于调用方缺陷，直接断言失败。
///
/// # 风险提示（Trade-offs）
/// - 底层 [`BytesMut`] 保持内容连续，`as_slice` 为 O(1)；代价是跨缓冲
///   搬移在区间不相邻时退化为一次拷贝。
#[derive(Debug, Default)]
pub struct Buffer {
    data: BytesMut,
}

impl Buffer {
    /// 构造空缓冲区。
    pub fn new() -> Self {
        Self {
            data: BytesMut::new(),
        }
    }

    /// 以给定字节构造缓冲区，测试与示例常用。
    pub fn from_slice(bytes: &[u8]) -> Self {
        let mut buffer = Self::new();
        buffer.add(bytes);
        buffer
    }

    /// 当前字节数。
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// 是否为空。
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// 追加字节。
    pub fn add(&mut self, bytes: &[u8]) {
        self.data.extend_from_slice(bytes);
    }

    /// 将 `other` 的全部内容搬移到本缓冲末尾，`other` 随之清空。
    pub fn move_from(&mut self, other: &mut Buffer) {
        if self.data.is_empty() {
            self.data = other.data.split();
        } else {
            self.data.unsplit(other.data.split());
        }
    }

    /// 丢弃开头 `n` 个字节。
    pub fn drain(&mut self, n: usize) {
        assert!(n <= self.data.len(), "drain 超出缓冲区长度");
        self.data.advance(n);
    }

    /// 线性化只读视图，供系统调用或过滤器检视。
    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    /// 从套接字读入至多 `max` 字节并追加到末尾。
    pub fn read_from(&mut self, socket: &dyn TransportSocket, max: usize) -> IoOutcome {
        let old_len = self.data.len();
        self.data.resize(old_len + max, 0);
        let outcome = socket.read(&mut self.data[old_len..]);
        match outcome {
            IoOutcome::Done(n) => {
                self.data.truncate(old_len + n);
                IoOutcome::Done(n)
            }
            other => {
                self.data.truncate(old_len);
                other
            }
        }
    }

    /// 将缓冲前缀写入套接字，按实际接受的字节数排空。
    pub fn write_to(&mut self, socket: &dyn TransportSocket) -> IoOutcome {
        let outcome = socket.write(&self.data);
        if let IoOutcome::Done(n) = outcome {
            self.data.advance(n);
        }
        outcome
    }
}
