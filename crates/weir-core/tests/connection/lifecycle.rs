//! 建连、终结与事件广播次序。

use std::io;
use std::sync::Arc;

use parking_lot::Mutex;
use weir_core::{
    Buffer, CloseType, Connection, ConnectionEvent, ConnectionState, InterestSet,
};

use crate::support::{
    CloseOnEvent, FakeSocket, LogReadFilter, ReadScript, RecordingCallbacks, RecordingScheduler,
    SinkFilter, WriteMode, entries, new_log,
};

#[test]
fn connected_event_precedes_filter_initialization() {
    let socket = FakeSocket::new();
    let log = new_log();
    let connection = Connection::new_client(Box::new(socket.clone()));
    connection.add_connection_callbacks(Arc::new(RecordingCallbacks { log: log.clone() }));
    connection.add_read_filter(Arc::new(LogReadFilter {
        name: "f",
        log: log.clone(),
    }));

    connection.connect();
    assert_eq!(connection.state(), ConnectionState::Connecting);
    connection.on_write_ready();

    assert_eq!(connection.state(), ConnectionState::Open);
    assert_eq!(
        entries(&log),
        ["event:Connected", "f:new"],
        "观察者先于过滤器得知建连完成"
    );
}

#[test]
fn closing_inside_connected_callback_is_reentrant_safe() {
    let socket = FakeSocket::new();
    let log = new_log();
    let connection = Connection::new_client(Box::new(socket.clone()));

    let closer = Arc::new(CloseOnEvent {
        log: log.clone(),
        trigger: ConnectionEvent::Connected,
        close_type: CloseType::NoFlush,
        connection: Mutex::new(None),
    });
    *closer.connection.lock() = Some(connection.clone());
    connection.add_connection_callbacks(closer);
    connection.add_read_filter(Arc::new(LogReadFilter {
        name: "f",
        log: log.clone(),
    }));

    connection.connect();
    connection.on_write_ready();

    assert_eq!(
        entries(&log),
        ["event:Connected", "event:LocalClose"],
        "回调内关闭应跳过过滤器初始化，且终结事件恰好一次"
    );
    assert_eq!(connection.state(), ConnectionState::Closed);

    // 终结后的就绪回调保持惰性。
    connection.on_write_ready();
    connection.on_read_ready();
    assert_eq!(entries(&log).len(), 2, "终结后不得再有任何事件");
}

#[test]
fn pending_connect_waits_for_next_writable() {
    let socket = FakeSocket::new();
    let log = new_log();
    socket.push_connect_result(Err(io::ErrorKind::WouldBlock.into()));
    let connection = Connection::new_client(Box::new(socket.clone()));
    connection.add_connection_callbacks(Arc::new(RecordingCallbacks { log: log.clone() }));

    connection.connect();
    connection.on_write_ready();
    assert_eq!(connection.state(), ConnectionState::Connecting, "结果未揭晓时保持建连中");
    assert!(entries(&log).is_empty());

    connection.on_write_ready();
    assert_eq!(connection.state(), ConnectionState::Open);
    assert_eq!(entries(&log), ["event:Connected"]);
}

#[test]
fn failed_connect_raises_remote_close() {
    let socket = FakeSocket::new();
    let log = new_log();
    socket.push_connect_result(Err(io::ErrorKind::ConnectionRefused.into()));
    let connection = Connection::new_client(Box::new(socket.clone()));
    connection.add_connection_callbacks(Arc::new(RecordingCallbacks { log: log.clone() }));

    connection.connect();
    connection.on_write_ready();

    assert_eq!(entries(&log), ["event:RemoteClose"]);
    assert_eq!(connection.state(), ConnectionState::Closed);
}

#[test]
#[should_panic(expected = "connect 需要一个仍然打开的套接字")]
fn connect_on_closed_socket_is_a_caller_bug() {
    let socket = FakeSocket::new();
    let connection = Connection::new_client(Box::new(socket.clone()));
    socket.force_close();
    connection.connect();
}

#[test]
fn eof_dispatches_buffered_bytes_before_remote_close() {
    let socket = FakeSocket::new();
    let log = new_log();
    let connection = Connection::new_server(Box::new(socket.clone()));
    connection.add_connection_callbacks(Arc::new(RecordingCallbacks { log: log.clone() }));
    let sink = Arc::new(SinkFilter::default());
    connection.add_read_filter(sink.clone());

    socket.push_data(b"tail");
    socket.push_read(ReadScript::Eof);
    connection.on_read_ready();

    assert_eq!(sink.chunks.lock().as_slice(), [b"tail".to_vec()], "EOF 前的字节必须先行分发");
    assert_eq!(entries(&log), ["event:RemoteClose"]);

    connection.on_read_ready();
    assert_eq!(entries(&log).len(), 1, "终结事件恰好一次");
}

#[test]
fn read_error_terminates_with_remote_close() {
    let socket = FakeSocket::new();
    let log = new_log();
    let connection = Connection::new_server(Box::new(socket.clone()));
    connection.add_connection_callbacks(Arc::new(RecordingCallbacks { log: log.clone() }));

    socket.push_read(ReadScript::Fail(io::ErrorKind::ConnectionReset));
    connection.on_read_ready();

    assert_eq!(entries(&log), ["event:RemoteClose"]);
    assert_eq!(connection.state(), ConnectionState::Closed);
}

#[test]
fn write_error_terminates_with_remote_close() {
    let socket = FakeSocket::new();
    let log = new_log();
    let connection = Connection::new_server(Box::new(socket.clone()));
    connection.add_connection_callbacks(Arc::new(RecordingCallbacks { log: log.clone() }));

    socket.set_write_mode(WriteMode::Fail(io::ErrorKind::BrokenPipe));
    let mut data = Buffer::from_slice(b"x");
    connection.write(&mut data);
    connection.on_write_ready();

    assert_eq!(entries(&log), ["event:RemoteClose"]);
    assert_eq!(connection.state(), ConnectionState::Closed);
}

#[test]
fn flush_write_close_drains_before_local_close() {
    let socket = FakeSocket::new();
    let log = new_log();
    let scheduler = Arc::new(RecordingScheduler::default());
    let connection = Connection::new_server(Box::new(socket.clone()));
    connection.set_event_scheduler(scheduler.clone());
    connection.add_connection_callbacks(Arc::new(RecordingCallbacks { log: log.clone() }));

    socket.set_write_mode(WriteMode::WouldBlock);
    let mut data = Buffer::from_slice(b"data");
    connection.write(&mut data);
    connection.close(CloseType::FlushWrite);

    assert_eq!(connection.state(), ConnectionState::Closing);
    assert!(entries(&log).is_empty(), "排空完成前不得广播终结事件");
    let interest = scheduler.last_interest().unwrap();
    assert!(!interest.read && interest.write, "延迟关闭只保留写兴趣");
    assert!(scheduler.activated(InterestSet::WRITE));

    // 重复的延迟关闭请求是幂等的。
    connection.close(CloseType::FlushWrite);
    assert_eq!(connection.state(), ConnectionState::Closing);

    socket.set_write_mode(WriteMode::AcceptAll);
    connection.on_write_ready();

    assert_eq!(socket.written(), b"data");
    assert_eq!(entries(&log), ["event:LocalClose"]);
    assert_eq!(connection.state(), ConnectionState::Closed);
}

#[test]
fn flush_write_with_empty_buffer_closes_immediately() {
    let socket = FakeSocket::new();
    let log = new_log();
    let connection = Connection::new_server(Box::new(socket.clone()));
    connection.add_connection_callbacks(Arc::new(RecordingCallbacks { log: log.clone() }));

    connection.close(CloseType::FlushWrite);

    assert_eq!(entries(&log), ["event:LocalClose"]);
    assert_eq!(connection.state(), ConnectionState::Closed);
}

#[test]
fn no_flush_close_makes_one_best_effort_flush() {
    let socket = FakeSocket::new();
    let log = new_log();
    let connection = Connection::new_server(Box::new(socket.clone()));
    connection.add_connection_callbacks(Arc::new(RecordingCallbacks { log: log.clone() }));

    socket.set_write_mode(WriteMode::Budget(2));
    let mut data = Buffer::from_slice(b"hello");
    connection.write(&mut data);
    connection.close(CloseType::NoFlush);

    assert_eq!(socket.written(), b"he", "立即关闭前尽力写出一次");
    assert_eq!(entries(&log), ["event:LocalClose"]);
    assert_eq!(connection.state(), ConnectionState::Closed);
}

#[test]
fn writes_before_established_flush_after_connect() {
    let socket = FakeSocket::new();
    let log = new_log();
    let connection = Connection::new_client(Box::new(socket.clone()));
    connection.add_connection_callbacks(Arc::new(RecordingCallbacks { log: log.clone() }));

    connection.connect();
    let mut data = Buffer::from_slice(b"early");
    connection.write(&mut data);
    assert!(data.is_empty(), "建连期间的写入应先行缓冲");
    assert!(socket.written().is_empty());

    connection.on_write_ready();
    assert_eq!(entries(&log), ["event:Connected"]);
    assert_eq!(socket.written(), b"early", "建连完成后随首次可写就绪冲刷");
}
