use marlinx::core::types::{OrderSide, StreamEvent};
use marlinx::kernel::LineFramer;
use marlinx::RequestChannel;
use rust_decimal::Decimal;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::timeout;

const RECV_DEADLINE: Duration = Duration::from_secs(5);

struct Harness {
    channel: RequestChannel,
    outbound: mpsc::UnboundedReceiver<String>,
    events: mpsc::UnboundedReceiver<StreamEvent>,
    connected: Arc<AtomicBool>,
}

fn harness_with_timeout(reply_timeout: Duration) -> Harness {
    let (out_tx, out_rx) = mpsc::unbounded_channel();
    let (ev_tx, ev_rx) = mpsc::unbounded_channel();
    let connected = Arc::new(AtomicBool::new(true));

    let channel = RequestChannel::new(
        out_tx,
        LineFramer::new(20 << 20),
        Arc::clone(&connected),
        ev_tx,
        reply_timeout,
    );

    Harness {
        channel,
        outbound: out_rx,
        events: ev_rx,
        connected,
    }
}

fn harness() -> Harness {
    harness_with_timeout(Duration::from_secs(30))
}

async fn next_frame(harness: &mut Harness) -> Value {
    let line = timeout(RECV_DEADLINE, harness.outbound.recv())
        .await
        .expect("timed out waiting for frame")
        .expect("writer side closed");
    assert!(line.ends_with('\n'), "frame not newline terminated: {:?}", line);
    serde_json::from_str(line.trim_end()).expect("frame is not valid JSON")
}

async fn next_event(harness: &mut Harness) -> StreamEvent {
    timeout(RECV_DEADLINE, harness.events.recv())
        .await
        .expect("timed out waiting for event")
        .expect("event side closed")
}

#[tokio::test]
async fn test_id_assignment_monotonic_from_seed() {
    let mut h = harness();

    for _ in 0..5 {
        h.channel.market_list().unwrap();
    }

    let mut previous = None;
    for i in 0..5 {
        let frame = next_frame(&mut h).await;
        let id = frame["id"].as_u64().unwrap();
        assert_eq!(id, 4_000_000_000 + i);
        if let Some(prev) = previous {
            assert!(id > prev);
        }
        previous = Some(id);
    }
}

#[tokio::test]
async fn test_concurrent_sends_assign_unique_ids() {
    let mut h = harness();
    let channel = Arc::new(h.channel);

    let tasks: Vec<_> = (0..4)
        .map(|_| {
            let channel = Arc::clone(&channel);
            tokio::spawn(async move {
                for _ in 0..25 {
                    channel.market_list().unwrap();
                }
            })
        })
        .collect();
    futures::future::join_all(tasks).await;

    let mut ids = std::collections::HashSet::new();
    while let Ok(line) = h.outbound.try_recv() {
        let frame: Value = serde_json::from_str(line.trim_end()).unwrap();
        ids.insert(frame["id"].as_u64().unwrap());
    }
    assert_eq!(ids.len(), 100);
}

#[tokio::test]
async fn test_order_query_exact_frame() {
    let mut h = harness();
    h.channel.order_query("BTC/USD", 0, 10).unwrap();

    let line = timeout(RECV_DEADLINE, h.outbound.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(
        line,
        "{\"method\":\"order.query\",\"params\":[\"BTC/USD\",0,10],\"id\":4000000000}\n"
    );
}

#[tokio::test]
async fn test_reply_correlates_to_caller_args() {
    let mut h = harness();
    h.channel.state_subscribe("BTC/USD").unwrap();

    let frame = next_frame(&mut h).await;
    let id = frame["id"].as_u64().unwrap();

    h.channel
        .ingest(&format!("{{\"id\":{},\"error\":null,\"result\":\"success\"}}\n", id));

    match next_event(&mut h).await {
        StreamEvent::Data(data) => {
            assert_eq!(data.method.as_deref(), Some("state.subscribe"));
            assert_eq!(data.args, Some(json!("BTC/USD")));
            assert_eq!(data.json["result"], json!("success"));
        }
        other => panic!("expected Data event, got {:?}", other),
    }

    assert!(h.channel.pending().is_empty());
}

#[tokio::test]
async fn test_unknown_reply_id_does_not_route() {
    let mut h = harness();
    h.channel.ingest("{\"id\":123,\"result\":1}\n");

    match next_event(&mut h).await {
        StreamEvent::Data(data) => {
            assert_eq!(data.method, None);
            assert_eq!(data.args, None);
        }
        other => panic!("expected Data event, got {:?}", other),
    }
}

#[tokio::test]
async fn test_push_carries_its_own_method() {
    let mut h = harness();
    h.channel
        .ingest("{\"method\":\"price.update\",\"params\":[\"BTC/USD\",\"8000\"]}\n");

    match next_event(&mut h).await {
        StreamEvent::Data(data) => {
            assert_eq!(data.method.as_deref(), Some("price.update"));
            assert_eq!(data.args, None);
            assert_eq!(data.json["params"][0], json!("BTC/USD"));
        }
        other => panic!("expected Data event, got {:?}", other),
    }
}

#[tokio::test]
async fn test_error_forms_normalize_identically() {
    let mut h = harness();

    h.channel
        .ingest("{\"id\":1,\"error\":[10,\"Insufficient balance\"]}\n");
    h.channel
        .ingest("{\"id\":2,\"error\":{\"code\":10,\"message\":\"Insufficient balance\"}}\n");

    let first = match next_event(&mut h).await {
        StreamEvent::RemoteError(err) => err,
        other => panic!("expected RemoteError, got {:?}", other),
    };
    let second = match next_event(&mut h).await {
        StreamEvent::RemoteError(err) => err,
        other => panic!("expected RemoteError, got {:?}", other),
    };

    assert_eq!(first, second);
    assert_eq!(first.code, 10);
    assert_eq!(first.message, "Insufficient balance");
}

#[tokio::test]
async fn test_invalid_json_line_dropped_batch_continues() {
    let mut h = harness();
    h.channel
        .ingest("this is not json\n{\"method\":\"asset.update\",\"params\":[]}\n");

    match next_event(&mut h).await {
        StreamEvent::Data(data) => {
            assert_eq!(data.method.as_deref(), Some("asset.update"));
        }
        other => panic!("expected Data event, got {:?}", other),
    }
    assert!(h.events.try_recv().is_err());
}

#[tokio::test]
async fn test_reply_timeout_evicts_and_notifies() {
    let mut h = harness_with_timeout(Duration::from_millis(30));
    h.channel.order_query("BTC/USD", 0, 10).unwrap();

    let frame = next_frame(&mut h).await;
    let id = frame["id"].as_u64().unwrap();

    match next_event(&mut h).await {
        StreamEvent::ReplyTimeout {
            id: timed_out,
            method,
            args,
        } => {
            assert_eq!(timed_out, id);
            assert_eq!(method, "order.query");
            assert_eq!(args, Some(json!("BTC/USD")));
        }
        other => panic!("expected ReplyTimeout, got {:?}", other),
    }

    assert!(h.channel.pending().was_dropped(id));
    assert!(h.channel.pending().is_empty());
}

#[tokio::test]
async fn test_reply_in_time_cancels_eviction() {
    let mut h = harness_with_timeout(Duration::from_millis(100));
    h.channel.asset_list().unwrap();

    let frame = next_frame(&mut h).await;
    let id = frame["id"].as_u64().unwrap();
    h.channel
        .ingest(&format!("{{\"id\":{},\"error\":null,\"result\":[]}}\n", id));

    match next_event(&mut h).await {
        StreamEvent::Data(_) => {}
        other => panic!("expected Data event, got {:?}", other),
    }

    tokio::time::sleep(Duration::from_millis(250)).await;
    assert!(!h.channel.pending().was_dropped(id));
    assert!(h.events.try_recv().is_err());
}

#[tokio::test]
async fn test_send_while_disconnected_is_noop() {
    let mut h = harness();
    h.connected.store(false, Ordering::SeqCst);

    h.channel.market_list().unwrap();

    assert!(h.outbound.try_recv().is_err());
    assert!(h.channel.pending().is_empty());
}

#[tokio::test]
async fn test_helper_wire_contracts() {
    let mut h = harness();
    let start = chrono::DateTime::from_timestamp(1_500_000_000, 0).unwrap();
    let end = chrono::DateTime::from_timestamp(1_500_086_400, 0).unwrap();
    let amount: Decimal = "0.5".parse().unwrap();
    let price: Decimal = "8000".parse().unwrap();

    h.channel
        .depth_subscribe("BTC/USD", 20, "0.01")
        .unwrap();
    h.channel
        .kline_query("BTC/USD", start, end, 3600, None)
        .unwrap();
    h.channel
        .order_put_limit("BTC/USD", OrderSide::Buy, amount, price, "web")
        .unwrap();
    h.channel.business_withdraw("BTC", amount).unwrap();
    h.channel.auth_register("bc1qaddress", 3600).unwrap();

    let frame = next_frame(&mut h).await;
    assert_eq!(frame["method"], json!("depth.subscribe"));
    assert_eq!(frame["params"], json!(["BTC/USD", 20, "0.01"]));

    let frame = next_frame(&mut h).await;
    assert_eq!(frame["method"], json!("kline.query"));
    assert_eq!(
        frame["params"],
        json!(["BTC/USD", 1_500_000_000, 1_500_086_400, 3600])
    );

    let frame = next_frame(&mut h).await;
    assert_eq!(frame["method"], json!("order.put_limit"));
    assert_eq!(frame["params"], json!(["BTC/USD", 2, "0.5", "8000", "web"]));

    let frame = next_frame(&mut h).await;
    assert_eq!(frame["method"], json!("business.withdraw"));
    assert_eq!(frame["params"], json!(["BTC", "0.5"]));

    let frame = next_frame(&mut h).await;
    assert_eq!(frame["method"], json!("auth.register"));
    assert_eq!(frame["params"], json!(["bc1qaddress", 3600]));
}
