use crate::connection::Connection;

/// 监听器向上交付新连接的回调边界。
///
/// # 契约说明（What）
/// - 监听器在 accept 就绪时把原始套接字包装成服务端模式的
///   [`Connection`]（状态已是 `Open`），随后调用 `on_new_connection`
///   移交所有权；
/// - 接收方通常在回调内注册连接观察者与读过滤器——读过滤器的
///   `on_new_connection` 会在首批数据分发前由过滤链补发，晚注册不会
///   错过初始化。
pub trait ListenerCallbacks: Send + Sync {
    /// 移交一条新建立的服务端连接。
    fn on_new_connection(&self, connection: Connection);
}
