//! 连接状态机的行为测试：生命周期、流控、统计与水位背压。


mod lifecycle;
mod watermarks;
