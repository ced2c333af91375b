use std::sync::Arc;

/// 单调递增计数器，统计后端的窄接口。
///
/// 连接只会调用 `add`，从不清零；聚合、导出均由外部后端负责。
pub trait Counter: Send + Sync {
    /// 累加 `value`。
    fn add(&self, value: u64);
}

/// 可增减的计量表。
///
/// 连接只做对称的 `add`/`sub`，从不直接置位；一个完整的
/// 写入-冲刷-排空周期结束后增减必然相抵。
pub trait Gauge: Send + Sync {
    /// 增加 `value`。
    fn add(&self, value: u64);

    /// 减少 `value`。
    fn sub(&self, value: u64);
}

/// 连接缓冲的统计绑定：累计流量计数器 + 驻留字节计量表。
///
/// # 契约说明（What）
/// - `rx_total`/`tx_total`：自连接建立以来读入/写出的总字节数，单调递增。
/// - `rx_current`/`tx_current`：当前滞留在读/写缓冲中的字节数。
/// - 默认不绑定（连接不产生任何统计调用），由
///   [`Connection::set_buffer_stats`](crate::connection::Connection::set_buffer_stats)
///   显式安装。
#[derive(Clone)]
pub struct BufferStats {
    /// 读入总量。
    pub rx_total: Arc<dyn Counter>,
    /// 读缓冲当前驻留量。
    pub rx_current: Arc<dyn Gauge>,
    /// 写出总量。
    pub tx_total: Arc<dyn Counter>,
    /// 写缓冲当前驻留量。
    pub tx_current: Arc<dyn Gauge>,
}

/// 按“增量 + 最新缓冲长度”同步一对计数器/计量表。
///
/// # 契约说明（What）
/// - `delta` 为本轮实际搬运的字节数，为正时累加进 `counter`；
/// - `gauge` 始终被调整到 `new_len`，调整量相对 `previous_len` 计算，
///   随后回写 `previous_len`。
///
/// # 逻辑解析（How）
/// - 调用方在每轮 I/O 或分发结束后调用一次；由于只比较首尾长度，
///   中间的多次部分读写不会造成多余的计量抖动。
pub fn update_buffer_stats(
    delta: u64,
    new_len: u64,
    previous_len: &mut u64,
    counter: &dyn Counter,
    gauge: &dyn Gauge,
) {
    if delta > 0 {
        counter.add(delta);
    }
    if new_len > *previous_len {
        gauge.add(new_len - *previous_len);
    } else if new_len < *previous_len {
        gauge.sub(*previous_len - new_len);
    }
    *previous_len = new_len;
}
