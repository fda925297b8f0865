//! End-to-end tests for the capture → buffer → throttle → delivery pipeline
//!
//! Delivery is exercised against a loopback HTTP stub on a real TCP socket,
//! so these tests cover the full request path: wire payload, forced
//! Content-Type, status interpretation, and prune-on-success.

use std::collections::HashMap;
use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::mpsc;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use chrono::{TimeZone, Utc};
use tempfile::TempDir;
use waypost_core::db::StateStore;
use waypost_core::delivery::WireSample;
use waypost_core::{
    FailureKind, FlushOutcome, Sample, SkipReason, Tracker, TrackingConfig, TriggerKind,
};

// ============================================
// Test harness
// ============================================

fn tracker_over(store: Arc<StateStore>, min_interval_secs: u64) -> Tracker {
    Tracker::with_store(
        store,
        &TrackingConfig {
            min_interval_secs,
            request_timeout_secs: 5,
        },
    )
    .expect("failed to build tracker")
}

fn memory_tracker(min_interval_secs: u64) -> Tracker {
    let store = Arc::new(StateStore::open_in_memory().unwrap());
    store.migrate().unwrap();
    tracker_over(store, min_interval_secs)
}

fn sample(n: i64) -> Sample {
    Sample::new(
        n as f64 + 0.5,
        (n * 2) as f64 + 0.25,
        Utc.timestamp_opt(1_700_000_000 + n, 0).unwrap(),
    )
}

/// Spawn a one-shot-per-response HTTP stub. Each accepted connection is
/// answered with the next status from `responses`; the raw request text
/// (head + body) is pushed into the returned channel before responding.
fn spawn_server(responses: Vec<u16>) -> (String, mpsc::Receiver<String>) {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let base_url = format!("http://{}", listener.local_addr().unwrap());
    let (tx, rx) = mpsc::channel();

    thread::spawn(move || {
        for status in responses {
            let Ok((mut stream, _)) = listener.accept() else {
                return;
            };
            stream
                .set_read_timeout(Some(Duration::from_secs(10)))
                .ok();
            let request = read_request(&mut stream);
            let _ = tx.send(request);

            let reason = if (200..300).contains(&status) {
                "OK"
            } else {
                "Error"
            };
            let response = format!(
                "HTTP/1.1 {} {}\r\nContent-Length: 0\r\nConnection: close\r\n\r\n",
                status, reason
            );
            let _ = stream.write_all(response.as_bytes());
        }
    });

    (base_url, rx)
}

/// Spawn a stub that reads one request, then stalls for `delay` before
/// answering 200.
fn spawn_slow_server(delay: Duration) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let base_url = format!("http://{}", listener.local_addr().unwrap());

    thread::spawn(move || {
        if let Ok((mut stream, _)) = listener.accept() {
            stream
                .set_read_timeout(Some(Duration::from_secs(10)))
                .ok();
            let _ = read_request(&mut stream);
            thread::sleep(delay);
            let _ = stream
                .write_all(b"HTTP/1.1 200 OK\r\nContent-Length: 0\r\nConnection: close\r\n\r\n");
        }
    });

    base_url
}

/// Read one full HTTP request (head plus Content-Length body) off a stream
fn read_request(stream: &mut TcpStream) -> String {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];

    loop {
        if let Some(head_end) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            let head = String::from_utf8_lossy(&buf[..head_end]);
            let content_length = head
                .lines()
                .find_map(|line| {
                    let (name, value) = line.split_once(':')?;
                    if name.eq_ignore_ascii_case("content-length") {
                        value.trim().parse::<usize>().ok()
                    } else {
                        None
                    }
                })
                .unwrap_or(0);
            if buf.len() >= head_end + 4 + content_length {
                break;
            }
        }

        match stream.read(&mut chunk) {
            Ok(0) => break,
            Ok(n) => buf.extend_from_slice(&chunk[..n]),
            Err(_) => break,
        }
    }

    String::from_utf8_lossy(&buf).to_string()
}

fn body_of(request: &str) -> &str {
    request
        .split_once("\r\n\r\n")
        .map(|(_, body)| body)
        .unwrap_or("")
}

fn decode_body(request: &str) -> Vec<WireSample> {
    serde_json::from_str(body_of(request)).expect("request body should be a wire batch")
}

// ============================================
// Delivery scenarios
// ============================================

#[tokio::test]
async fn test_failed_delivery_preserves_buffer_and_retry_sends_grown_batch() {
    let (url, requests) = spawn_server(vec![500, 200]);
    let tracker = memory_tracker(0);
    tracker.configure(&url, HashMap::new()).await.unwrap();

    // First capture: server rejects with 500, batch must survive untouched.
    let outcome = tracker
        .on_sample_captured(sample(0), TriggerKind::SignificantChange)
        .await
        .unwrap();
    assert_eq!(outcome, FlushOutcome::Failed(FailureKind::Status(500)));
    assert_eq!(tracker.buffered().await.unwrap(), vec![sample(0)]);

    let first = requests.recv_timeout(Duration::from_secs(1)).unwrap();
    assert_eq!(decode_body(&first).len(), 1);

    // Second capture: the retry carries the grown batch, 200 empties it.
    let outcome = tracker
        .on_sample_captured(sample(1), TriggerKind::SignificantChange)
        .await
        .unwrap();
    assert_eq!(outcome, FlushOutcome::Delivered { sent: 2 });
    assert!(tracker.buffered().await.unwrap().is_empty());

    let second = requests.recv_timeout(Duration::from_secs(1)).unwrap();
    let batch = decode_body(&second);
    assert_eq!(batch.len(), 2);
    assert_eq!(batch[0], WireSample::from_sample(&sample(0)));
    assert_eq!(batch[1], WireSample::from_sample(&sample(1)));
}

#[tokio::test]
async fn test_wire_format_and_forced_content_type() {
    let (url, requests) = spawn_server(vec![200]);
    let tracker = memory_tracker(0);

    let mut headers = HashMap::new();
    headers.insert("Content-Type".to_string(), "text/plain".to_string());
    headers.insert("X-Device-Id".to_string(), "dev-7".to_string());
    tracker.configure(&url, headers).await.unwrap();

    let captured_at = Utc.timestamp_opt(1_700_000_000, 0).unwrap();
    let outcome = tracker
        .on_sample_captured(
            Sample::new(48.2082, -16.3738, captured_at),
            TriggerKind::PeriodicRefresh,
        )
        .await
        .unwrap();
    assert_eq!(outcome, FlushOutcome::Delivered { sent: 1 });

    let request = requests.recv_timeout(Duration::from_secs(1)).unwrap();
    let head = request.to_ascii_lowercase();

    // The forced Content-Type wins over the configured one.
    assert!(head.contains("content-type: application/json"));
    assert!(!head.contains("text/plain"));
    // Configured headers ride along.
    assert!(head.contains("x-device-id: dev-7"));

    let batch = decode_body(&request);
    assert_eq!(batch.len(), 1);
    assert_eq!(batch[0].lat, "48.2082");
    assert_eq!(batch[0].long, "-16.3738");
    assert_eq!(batch[0].timestamp, "2023-11-14T22:13:20+00:00");
}

#[tokio::test]
async fn test_force_flush_twice_is_idempotent() {
    let (url, requests) = spawn_server(vec![200, 200]);
    let tracker = memory_tracker(3600);

    // Seed the buffer before any target exists, so nothing is delivered yet.
    tracker.set_enabled(true).await.unwrap();
    tracker
        .on_sample_captured(sample(0), TriggerKind::SignificantChange)
        .await
        .unwrap();
    tracker.configure(&url, HashMap::new()).await.unwrap();

    let first = tracker.force_flush(None).await.unwrap();
    assert_eq!(first, FlushOutcome::Delivered { sent: 1 });

    // No new captures in between: the second flush must short-circuit on
    // the empty buffer, not re-send.
    let second = tracker.force_flush(None).await.unwrap();
    assert_eq!(second, FlushOutcome::Skipped(SkipReason::EmptyBuffer));

    requests.recv_timeout(Duration::from_secs(1)).unwrap();
    assert!(requests.try_recv().is_err());
}

#[tokio::test]
async fn test_throttled_capture_issues_no_request() {
    let (url, requests) = spawn_server(vec![200, 200]);
    let tracker = memory_tracker(3600);
    tracker.configure(&url, HashMap::new()).await.unwrap();

    let first = tracker
        .on_sample_captured(sample(0), TriggerKind::SignificantChange)
        .await
        .unwrap();
    assert_eq!(first, FlushOutcome::Delivered { sent: 1 });
    requests.recv_timeout(Duration::from_secs(1)).unwrap();

    // Well inside the interval: buffered, no HTTP.
    let second = tracker
        .on_sample_captured(sample(1), TriggerKind::SignificantChange)
        .await
        .unwrap();
    assert_eq!(second, FlushOutcome::Skipped(SkipReason::Throttled));
    assert_eq!(tracker.buffered().await.unwrap(), vec![sample(1)]);
    assert!(requests.try_recv().is_err());
}

#[tokio::test]
async fn test_deadline_expiry_leaves_buffer_pending() {
    let url = spawn_slow_server(Duration::from_secs(1));
    let tracker = memory_tracker(3600);

    tracker.set_enabled(true).await.unwrap();
    tracker
        .on_sample_captured(sample(0), TriggerKind::PushWake)
        .await
        .unwrap();
    tracker.configure(&url, HashMap::new()).await.unwrap();

    // The stub stalls for a full second; the forced flush is given 100ms.
    let outcome = tracker
        .force_flush(Some(Duration::from_millis(100)))
        .await
        .unwrap();

    assert_eq!(outcome, FlushOutcome::Failed(FailureKind::Transport));
    assert_eq!(tracker.buffered().await.unwrap(), vec![sample(0)]);
}

// ============================================
// Durability across restart
// ============================================

#[tokio::test]
async fn test_state_survives_process_restart() {
    let dir = TempDir::new().unwrap();
    let db_path = dir.path().join("state.db");

    // "First launch": capture one sample with no target configured.
    {
        let store = Arc::new(StateStore::open(&db_path).unwrap());
        store.migrate().unwrap();
        let tracker = tracker_over(store, 3600);

        tracker.set_enabled(true).await.unwrap();
        let outcome = tracker
            .on_sample_captured(sample(0), TriggerKind::SignificantChange)
            .await
            .unwrap();
        assert_eq!(outcome, FlushOutcome::Skipped(SkipReason::NotConfigured));
    }

    // "Relaunch": buffer, enabled flag and throttle state all came back.
    let store = Arc::new(StateStore::open(&db_path).unwrap());
    store.migrate().unwrap();
    let tracker = tracker_over(store, 3600);

    assert!(tracker.is_enabled().await.unwrap());
    assert_eq!(tracker.buffered().await.unwrap(), vec![sample(0)]);

    // The pre-restart attempt still counts against the throttle budget.
    let outcome = tracker
        .on_sample_captured(sample(1), TriggerKind::SignificantChange)
        .await
        .unwrap();
    assert_eq!(outcome, FlushOutcome::Skipped(SkipReason::Throttled));

    // A forced flush drains everything buffered across both "launches".
    let (url, requests) = spawn_server(vec![200]);
    tracker.configure(&url, HashMap::new()).await.unwrap();

    let outcome = tracker.force_flush(None).await.unwrap();
    assert_eq!(outcome, FlushOutcome::Delivered { sent: 2 });
    assert!(tracker.buffered().await.unwrap().is_empty());

    let request = requests.recv_timeout(Duration::from_secs(1)).unwrap();
    let batch = decode_body(&request);
    assert_eq!(batch[0], WireSample::from_sample(&sample(0)));
    assert_eq!(batch[1], WireSample::from_sample(&sample(1)));
}
