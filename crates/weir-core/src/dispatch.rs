/// 就绪兴趣集：连接希望事件循环关注的方向。
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct InterestSet {
    /// 关注可读就绪。
    pub read: bool,
    /// 关注可写就绪。
    pub write: bool,
}

impl InterestSet {
    /// 不关注任何方向。
    pub const NONE: Self = Self {
        read: false,
        write: false,
    };

    /// 仅关注可读。
    pub const READ: Self = Self {
        read: true,
        write: false,
    };

    /// 仅关注可写。
    pub const WRITE: Self = Self {
        read: false,
        write: true,
    };
}

/// 事件循环为单个连接提供的就绪登记边界。
///
/// # 设计背景（Why）
/// - 事件循环本体（poll/epoll 封装、定时器、run/exit 生命周期）是外部
///   协作者；连接只消费其中最窄的一条能力——“调整我关注的就绪方向，
///   或者主动给我补发一次就绪”。以独立 trait 划界后，单元测试可以用
///   记录桩完整验证连接的兴趣迁移，而无需真实事件循环。
///
/// # 契约说明（What）
/// - `update_interest`：以水平语义覆盖式登记兴趣；读禁用计数跨越 0↔1、
///   写缓冲在空与非空之间变化时，连接都会调用一次。
/// - `activate`：要求事件循环在下一轮派发时无条件回调对应方向的就绪
///   入口（用于 `write()` 之后尽快获得冲刷机会、读重新启用后消化存量）。
///
/// # 前置/后置条件（Contract）
/// - **前置**：实现不得在这两个方法内同步反向调用连接，否则会与连接的
///   内部锁互锁；
/// - **后置**：`update_interest(NONE)` 之后不得再投递就绪回调。
pub trait EventScheduler: Send + Sync {
    /// 覆盖式登记兴趣集。
    fn update_interest(&self, interest: InterestSet);

    /// 主动触发一次就绪派发。
    fn activate(&self, interest: InterestSet);
}

/// 空调度器：不登记、不派发，供尚未挂接事件循环的连接与测试使用。
#[derive(Clone, Copy, Debug, Default)]
pub struct NullEventScheduler;

impl EventScheduler for NullEventScheduler {
    fn update_interest(&self, _interest: InterestSet) {}

    fn activate(&self, _interest: InterestSet) {}
}
