//! Integration tests for pattern-matched requests
//!
//! A mock device answers newline-terminated commands; the session matches
//! its replies against request patterns.

mod common;

use common::*;
use devlink::{LineDecoder, Pattern, Session, SessionError, SessionEvent, SessionState};
use std::time::Duration;

fn projector(line: &str) -> Action {
    match line {
        "PING" => Action::Reply("OK\n".into()),
        "BAD" => Action::Reply("ERR 3\n".into()),
        "VOL?" => Action::Reply("VOL=42\n".into()),
        "STATUS" => Action::Reply("BUSY\nOK\n".into()),
        "GO" => Action::Reply("OK\n".into()),
        "DROP" => Action::Hangup,
        _ => Action::Ignore,
    }
}

async fn connected_session(device: &MockDevice, response_timeout: Duration) -> Session {
    let session = Session::builder()
        .with_event_queue()
        .endpoint(device.host(), device.port())
        .decoder(LineDecoder::new())
        .response_timeout(response_timeout)
        .idle_timeout(Duration::ZERO)
        .reconnect_interval(Duration::ZERO)
        .build()
        .await
        .unwrap();
    session.connect().await.unwrap();
    session
}

#[tokio::test]
async fn test_success_pattern_resolves() {
    verbose_println!("Testing OK reply...");

    let device = MockDevice::with_responder(projector).await;
    let session = connected_session(&device, Duration::from_secs(2)).await;

    let reply = session
        .request_str("PING\n", "OK", Some("ERR"))
        .await
        .unwrap();

    verbose_println!("  reply: {:?}", reply);
    assert_eq!(reply.as_str(), "OK");
    assert_eq!(reply.frame.as_bytes(), b"OK");
    assert_eq!(session.metrics().outstanding_requests, 0);
}

#[tokio::test]
async fn test_failure_pattern_rejects() {
    verbose_println!("Testing ERR reply...");

    let device = MockDevice::with_responder(projector).await;
    let session = connected_session(&device, Duration::from_secs(2)).await;

    let err = session
        .request_str("BAD\n", "OK", Some(r"ERR \d+"))
        .await
        .unwrap_err();

    let rejection = err.rejection().expect("should be a rejection");
    assert_eq!(rejection.as_str(), "ERR 3");
    assert!(session.is_connected());
}

#[tokio::test]
async fn test_capture_groups() {
    let device = MockDevice::with_responder(projector).await;
    let session = connected_session(&device, Duration::from_secs(2)).await;

    let reply = session
        .request("VOL?\n", Pattern::new(r"VOL=(\d+)").unwrap(), None)
        .await
        .unwrap();

    assert_eq!(reply.get(1), Some("42"));
}

#[tokio::test]
async fn test_unrelated_frames_are_skipped() {
    let device = MockDevice::with_responder(projector).await;
    let session = connected_session(&device, Duration::from_secs(2)).await;

    let reply = session
        .request_str("STATUS\n", "^OK$", Some("^ERR"))
        .await
        .unwrap();
    assert_eq!(reply.as_str(), "OK");

    // Both frames still reach the data surface
    let events = events_until(&session, Duration::from_secs(1), |e| {
        matches!(e, SessionEvent::Data(f) if f.as_bytes() == b"OK")
    })
    .await;
    assert_eq!(kinds(&events), vec!["connect", "data", "data"]);
}

#[tokio::test]
async fn test_request_times_out() {
    verbose_println!("Testing request deadline...");

    let device = MockDevice::with_responder(projector).await;
    let session = connected_session(&device, Duration::from_millis(150)).await;

    let started = std::time::Instant::now();
    let err = session
        .request_str("SILENT\n", "OK", Some("ERR"))
        .await
        .unwrap_err();

    assert!(matches!(err, SessionError::RequestTimeout { .. }));
    assert!(started.elapsed() >= Duration::from_millis(140));
    // Request deadlines never touch the connection
    assert!(session.is_connected());
    assert_eq!(session.metrics().timeout_count, 0);
}

#[tokio::test]
async fn test_overlapping_patterns_settle_from_one_frame() {
    verbose_println!("Testing overlapping patterns...");

    let device = MockDevice::with_responder(projector).await;
    let session = connected_session(&device, Duration::from_secs(2)).await;

    let (waiting, trigger) = tokio::join!(session.request_str("WAIT\n", "O.", None), async {
        tokio::time::sleep(Duration::from_millis(30)).await;
        session.request_str("GO\n", "OK", None).await
    });

    assert_eq!(waiting.unwrap().as_str(), "OK");
    assert_eq!(trigger.unwrap().as_str(), "OK");
    assert_eq!(session.metrics().frames_received, 1);
}

#[tokio::test]
async fn test_settled_request_ignores_later_frames() {
    let device = MockDevice::with_responder(projector).await;
    let session = connected_session(&device, Duration::from_millis(200)).await;

    session.request_str("PING\n", "OK", None).await.unwrap();
    assert!(eventually(Duration::from_secs(1), || device.live_connections() == 1).await);
    device.push("OK\n");

    // The settled request's deadline passes without side effects
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert!(session.is_connected());
    assert_eq!(session.metrics().outstanding_requests, 0);
    assert_eq!(session.metrics().frames_received, 2);
}

#[tokio::test]
async fn test_request_requires_connection() {
    let device = MockDevice::with_responder(projector).await;
    let session = Session::builder()
        .with_event_queue()
        .endpoint(device.host(), device.port())
        .build()
        .await
        .unwrap();

    let result = session.request_str("PING\n", "OK", None).await;
    assert!(matches!(result, Err(SessionError::NotConnected)));
}

#[tokio::test]
async fn test_invalid_pattern() {
    let device = MockDevice::with_responder(projector).await;
    let session = connected_session(&device, Duration::from_secs(1)).await;

    let result = session.request_str("PING\n", "(OK", None).await;
    assert!(matches!(result, Err(SessionError::InvalidPattern(_))));
}

#[tokio::test]
async fn test_disconnect_detaches_pending_requests() {
    verbose_println!("Testing request across a reconnect...");

    let device = MockDevice::with_responder(projector).await;
    let session = Session::builder()
        .with_event_queue()
        .endpoint(device.host(), device.port())
        .decoder(LineDecoder::new())
        .response_timeout(Duration::from_millis(400))
        .idle_timeout(Duration::ZERO)
        .reconnect_interval(Duration::from_millis(50))
        .build()
        .await
        .unwrap();
    session.connect().await.unwrap();

    let (result, _) = tokio::join!(session.request_str("DROP\n", "OK", None), async {
        // Wait for the reconnect, then answer on the new connection
        assert!(eventually(Duration::from_secs(1), || device.accepted() == 2).await);
        assert!(eventually(Duration::from_secs(1), || session.is_connected()).await);
        assert!(eventually(Duration::from_secs(1), || device.live_connections() == 1).await);
        device.push("OK\n");
    });

    assert!(matches!(result, Err(SessionError::RequestTimeout { .. })));
    assert!(session.metrics().frames_received >= 1);
}

#[tokio::test]
async fn test_concurrent_requests_from_tasks() {
    let device = MockDevice::with_responder(|line| match line.strip_prefix("ECHO ") {
        Some(word) => Action::Reply(format!("ACK {}\n", word)),
        None => Action::Ignore,
    })
    .await;
    let session = std::sync::Arc::new(connected_session(&device, Duration::from_secs(2)).await);

    let mut handles = Vec::new();
    for i in 0..5 {
        let session = std::sync::Arc::clone(&session);
        handles.push(tokio::spawn(async move {
            let reply = session
                .request(
                    format!("ECHO w{}\n", i),
                    Pattern::literal(&format!("ACK w{}", i)).unwrap(),
                    None,
                )
                .await
                .unwrap();
            reply.matched
        }));
    }

    for (i, handle) in handles.into_iter().enumerate() {
        assert_eq!(handle.await.unwrap(), format!("ACK w{}", i));
    }
}

#[tokio::test]
async fn test_deadlines_fire_while_write_is_stalled() {
    verbose_println!("Testing a device that stops reading...");

    let session = Session::builder()
        .with_event_queue()
        .endpoint("projector.local", 4999)
        .transport(Unread::new(16))
        .response_timeout(Duration::from_millis(200))
        .reconnect_interval(Duration::ZERO)
        .build()
        .await
        .unwrap();
    session.connect().await.unwrap();

    let started = std::time::Instant::now();
    let result = tokio::time::timeout(
        Duration::from_secs(2),
        session.request_str(vec![b'X'; 64], "OK", None),
    )
    .await
    .expect("request deadline must fire while the write is blocked");

    let err = result.unwrap_err();
    assert!(matches!(err, SessionError::RequestTimeout { .. }));
    assert!(err.is_timeout());
    assert!(started.elapsed() < Duration::from_secs(1));

    // No bytes move, so the idle deadline drops the connection
    let events = events_until(&session, Duration::from_secs(2), |e| {
        matches!(e, SessionEvent::Close)
    })
    .await;
    assert_eq!(kinds(&events), vec!["connect", "timeout", "error", "close"]);
    assert!(matches!(
        &events[2],
        SessionEvent::Error(e) if matches!(e, SessionError::IdleTimeout { .. })
    ));
    assert_eq!(session.state(), SessionState::Idle);
    assert_eq!(session.metrics().bytes_sent, 16);
}

#[tokio::test]
async fn test_close_is_bounded_while_write_is_stalled() {
    let session = Session::builder()
        .with_event_queue()
        .endpoint("projector.local", 4999)
        .transport(Unread::new(16))
        .response_timeout(Duration::from_millis(200))
        .idle_timeout(Duration::ZERO)
        .reconnect_interval(Duration::ZERO)
        .build()
        .await
        .unwrap();
    session.connect().await.unwrap();

    let (sent, closed) = tokio::join!(session.send(vec![b'X'; 64]), async {
        tokio::time::sleep(Duration::from_millis(50)).await;
        tokio::time::timeout(Duration::from_secs(2), session.close()).await
    });

    closed
        .expect("close must not wait on a blocked write")
        .unwrap();
    assert!(matches!(sent, Err(SessionError::ConnectionClosed)));
    assert_eq!(session.state(), SessionState::Idle);
    assert_eq!(kinds(&drain_events(&session)), vec!["connect", "close"]);
}
