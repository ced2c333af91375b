//! 连接层水位背压：写侧边沿通知、阈值重归类与读侧自动暂停。

use std::sync::Arc;

use weir_core::{Buffer, Connection, InterestSet};

use crate::support::{
    FakeSocket, InflateFilter, RecordingCallbacks, RecordingScheduler, WriteMode, count_of,
    new_log,
};

#[test]
fn write_watermark_edges_notify_observers_once() {
    let socket = FakeSocket::new();
    let log = new_log();
    let connection = Connection::new_server(Box::new(socket.clone()));
    connection.add_connection_callbacks(Arc::new(RecordingCallbacks { log: log.clone() }));
    connection.set_buffer_limits(10);

    socket.set_write_mode(WriteMode::WouldBlock);
    let mut data = Buffer::from_slice(&[b'a'; 11]);
    connection.write(&mut data);
    assert_eq!(count_of(&log, "watermark:above"), 1, "越过高水位通知一次");

    let mut more = Buffer::from_slice(b"b");
    connection.write(&mut more);
    assert_eq!(count_of(&log, "watermark:above"), 1, "高位态内追加不得重复通知");

    socket.set_write_mode(WriteMode::AcceptAll);
    connection.on_write_ready();
    assert_eq!(count_of(&log, "watermark:below"), 1, "排空到低水位之下通知一次");
}

#[test]
fn shrinking_limits_reclassify_buffered_data() {
    let socket = FakeSocket::new();
    let log = new_log();
    let connection = Connection::new_server(Box::new(socket.clone()));
    connection.add_connection_callbacks(Arc::new(RecordingCallbacks { log: log.clone() }));

    socket.set_write_mode(WriteMode::WouldBlock);
    let mut data = Buffer::from_slice(b"hello");
    connection.write(&mut data);

    // 上限缩到 5 字节存量之下：无新字节也要通知高水位。
    connection.set_buffer_limits(2);
    assert_eq!(
        (count_of(&log, "watermark:above"), count_of(&log, "watermark:below")),
        (1, 0)
    );

    // 5 介于低水位 3 与高水位 6 之间：双向都不通知。
    connection.set_buffer_limits(6);
    assert_eq!(
        (count_of(&log, "watermark:above"), count_of(&log, "watermark:below")),
        (1, 0)
    );

    // 放宽到低水位 7 之上：存量落回低位态。
    connection.set_buffer_limits(15);
    assert_eq!(
        (count_of(&log, "watermark:above"), count_of(&log, "watermark:below")),
        (1, 1)
    );

    // 已处于低位态：不再重复通知。
    connection.set_buffer_limits(10);
    assert_eq!(
        (count_of(&log, "watermark:above"), count_of(&log, "watermark:below")),
        (1, 1)
    );
}

#[test]
fn minimal_buffer_limit_releases_after_full_drain() {
    let socket = FakeSocket::new();
    let log = new_log();
    let connection = Connection::new_server(Box::new(socket.clone()));
    connection.add_connection_callbacks(Arc::new(RecordingCallbacks { log: log.clone() }));
    connection.set_buffer_limits(1);

    socket.set_write_mode(WriteMode::WouldBlock);
    let mut data = Buffer::from_slice(b"ab");
    connection.write(&mut data);
    assert_eq!(count_of(&log, "watermark:above"), 1);
    assert!(connection.above_high_watermark());

    // 低水位为 0：排空到底必须释放高位态，而不是永久滞留。
    socket.set_write_mode(WriteMode::AcceptAll);
    connection.on_write_ready();
    assert_eq!(count_of(&log, "watermark:below"), 1, "彻底排空后必须通知恢复");
    assert!(!connection.above_high_watermark());
}

#[test]
fn read_side_inflation_pauses_reading_until_limits_release() {
    let socket = FakeSocket::new();
    let scheduler = Arc::new(RecordingScheduler::default());
    let connection = Connection::new_server(Box::new(socket.clone()));
    connection.set_event_scheduler(scheduler.clone());
    connection.set_buffer_limits(8);
    connection.add_read_filter(Arc::new(InflateFilter { extra: 100 }));

    socket.push_data(b"x");
    connection.on_read_ready();

    assert_eq!(
        connection.read_disable_count(),
        1,
        "过滤器把读缓冲顶过阈值后自动暂停读取"
    );
    let interest = scheduler.last_interest().unwrap();
    assert!(!interest.read, "暂停期间不再关注可读就绪");

    // 关闭水位后存量被重新归类为低位态，自动恢复读取。
    connection.set_buffer_limits(0);
    assert_eq!(connection.read_disable_count(), 0);
    let interest = scheduler.last_interest().unwrap();
    assert!(interest.read);
    assert!(
        scheduler.activated(InterestSet::READ),
        "恢复读取且有存量时补发一次可读派发"
    );
}
