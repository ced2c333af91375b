use std::sync::Arc;

use parking_lot::Mutex;

use crate::buffer::Buffer;
use crate::connection::ConnectionEvent;

/// 过滤器单次调用的结果，决定链路是否继续向后传播。
///
/// # 契约说明（What）
/// - `Continue`：交给下一个过滤器（或最终投递到套接字缓冲）。
/// - `StopIteration`：短路本轮链路；缓冲中未消费的字节保留，待下一轮
///   事件到来时从 0 号过滤器重新分发。`StopIteration` 是流控手段，
///   不是错误——想终结连接的过滤器应显式调用 `close()`。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FilterStatus {
    /// 继续传播。
    Continue,
    /// 短路本轮传播。
    StopIteration,
}

/// 读过滤器：入站字节与连接建立事件的消费方。
///
/// # 设计背景（Why）
/// - 读/写能力拆成两个单一职责 trait，双向过滤器通过 [`Filter`] 组合，
///   避免继承菱形；方法以 `&self` 调用，内部状态由实现自带的互斥
///   结构管理，便于以 `Arc<dyn ReadFilter>` 在注册表中共享。
///
/// # 契约说明（What）
/// - `on_new_connection`：连接进入活跃态后、首批 `on_data` 之前恰好
///   调用一次（注册顺序）；返回 `StopIteration` 会暂停后续过滤器的
///   初始化与本轮数据分发。
/// - `on_data`：持有共享缓冲的独占可变引用，可排空、改写或原样保留；
///   保留的字节在下一轮与新读入的字节合并后重新从链头分发。
///
/// # 风险提示（Trade-offs）
/// - 回调内允许反向调用连接（包括 `close()`）；链路在每次回调后检查
///   连接存活状态并放弃剩余迭代，实现方无需自行防护。
pub trait ReadFilter: Send + Sync {
    /// 连接建立通知，默认放行。
    fn on_new_connection(&self) -> FilterStatus {
        FilterStatus::Continue
    }

    /// 处理入站数据。
    fn on_data(&self, data: &mut Buffer) -> FilterStatus;
}

/// 写过滤器：出站字节进入套接字缓冲之前的拦截点。
pub trait WriteFilter: Send + Sync {
    /// 处理出站数据，语义与读侧 `on_data` 对称。
    fn on_write(&self, data: &mut Buffer) -> FilterStatus;
}

/// 双向过滤器，经 [`add_filter`](crate::connection::Connection::add_filter)
/// 同时挂入读写两条链。
pub trait Filter: ReadFilter + WriteFilter {}

/// 连接生命周期观察者。
///
/// # 契约说明（What）
/// - `on_event`：`Connected` 至多一次；`LocalClose`/`RemoteClose` 合计
///   恰好一次，此后不再有任何事件。
/// - 水位回调按边沿触发：写缓冲越过高水位通知一次，回落到低水位
///   通知一次；默认实现为空操作。
pub trait ConnectionCallbacks: Send + Sync {
    /// 生命周期事件。
    fn on_event(&self, event: ConnectionEvent);

    /// 写缓冲越过高水位，上游应减速。
    fn on_above_write_buffer_high_watermark(&self) {}

    /// 写缓冲回落到低水位之下，上游可恢复。
    fn on_below_write_buffer_low_watermark(&self) {}
}

struct ReadFilterEntry {
    filter: Arc<dyn ReadFilter>,
    initialized: bool,
}

/// 有序过滤器注册表与链路驱动。
///
/// # 逻辑解析（How）
/// - 注册表以互斥锁保护，迭代前先做快照，因此回调内再注册过滤器不会
///   死锁，也不会影响本轮链路；
/// - 每个读过滤器带 `initialized` 标记，`on_read` 在分发数据前为尚未
///   初始化的过滤器补发 `on_new_connection`——服务端 accept 路径与
///   “在 `Connected` 观察者里才挂过滤器”的惯用法都依赖这一点；
/// - 每一步回调之间都询问 `still_open`，连接在回调内被关闭时立即放弃
///   剩余迭代。
#[derive(Default)]
pub struct FilterManager {
    read_filters: Mutex<Vec<ReadFilterEntry>>,
    write_filters: Mutex<Vec<Arc<dyn WriteFilter>>>,
}

impl FilterManager {
    /// 构造空注册表。
    pub fn new() -> Self {
        Self::default()
    }

    /// 追加读过滤器。
    pub fn add_read_filter(&self, filter: Arc<dyn ReadFilter>) {
        self.read_filters.lock().push(ReadFilterEntry {
            filter,
            initialized: false,
        });
    }

    /// 追加写过滤器。
    pub fn add_write_filter(&self, filter: Arc<dyn WriteFilter>) {
        self.write_filters.lock().push(filter);
    }

    /// 追加双向过滤器：同一实例同时挂入读写两条链。
    pub fn add_filter(&self, filter: Arc<dyn Filter>) {
        let read: Arc<dyn ReadFilter> = filter.clone();
        let write: Arc<dyn WriteFilter> = filter;
        self.add_read_filter(read);
        self.add_write_filter(write);
    }

    /// 为所有尚未初始化的读过滤器补发 `on_new_connection`。
    pub fn on_new_connection(&self, still_open: &dyn Fn() -> bool) -> FilterStatus {
        loop {
            let next = {
                let mut entries = self.read_filters.lock();
                match entries.iter_mut().find(|entry| !entry.initialized) {
                    Some(entry) => {
                        // 先标记再回调：过滤器重入触发的分发不会重复初始化。
                        entry.initialized = true;
                        Some(entry.filter.clone())
                    }
                    None => None,
                }
            };
            let Some(filter) = next else {
                return FilterStatus::Continue;
            };
            if !still_open() {
                return FilterStatus::StopIteration;
            }
            if filter.on_new_connection() == FilterStatus::StopIteration {
                return FilterStatus::StopIteration;
            }
        }
    }

    /// 将读缓冲依注册顺序分发给读过滤器。
    pub fn on_read(&self, buffer: &mut Buffer, still_open: &dyn Fn() -> bool) {
        if self.on_new_connection(still_open) == FilterStatus::StopIteration {
            return;
        }
        let snapshot: Vec<Arc<dyn ReadFilter>> = self
            .read_filters
            .lock()
            .iter()
            .map(|entry| entry.filter.clone())
            .collect();
        for filter in snapshot {
            if !still_open() {
                return;
            }
            if filter.on_data(buffer) == FilterStatus::StopIteration {
                return;
            }
        }
    }

    /// 将出站缓冲依注册顺序交给写过滤器。
    pub fn on_write(&self, buffer: &mut Buffer, still_open: &dyn Fn() -> bool) -> FilterStatus {
        let snapshot: Vec<Arc<dyn WriteFilter>> = self.write_filters.lock().clone();
        for filter in snapshot {
            if !still_open() {
                return FilterStatus::StopIteration;
            }
            if filter.on_write(buffer) == FilterStatus::StopIteration {
                return FilterStatus::StopIteration;
            }
        }
        FilterStatus::Continue
    }
}
