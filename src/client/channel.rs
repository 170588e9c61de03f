use crate::core::errors::StreamError;
use crate::core::types::{DataEvent, OrderSide, RemoteError, Request, StreamEvent};
use crate::kernel::framer::LineFramer;
use crate::kernel::pending::PendingRequests;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{error, warn};

/// First automatically assigned request id. Seeded high so assigned ids
/// never collide with externally meaningful small ids; the handshake uses a
/// fixed `null` id outside this range entirely.
const REQUEST_ID_SEED: u64 = 4_000_000_000;

/// Outbound construction, inbound framing and dispatch for one session.
///
/// Created by `SessionStream` once the version handshake completes, torn
/// down with the transport. All inbound chunks are fed through `ingest` by
/// the session's I/O task, strictly in arrival order.
pub struct RequestChannel {
    outbound: mpsc::UnboundedSender<String>,
    pending: PendingRequests,
    framer: Mutex<LineFramer>,
    next_id: AtomicU64,
    connected: Arc<AtomicBool>,
    events: mpsc::UnboundedSender<StreamEvent>,
}

impl RequestChannel {
    pub fn new(
        outbound: mpsc::UnboundedSender<String>,
        framer: LineFramer,
        connected: Arc<AtomicBool>,
        events: mpsc::UnboundedSender<StreamEvent>,
        reply_timeout: Duration,
    ) -> Self {
        Self {
            outbound,
            pending: PendingRequests::new(reply_timeout, events.clone()),
            framer: Mutex::new(framer),
            next_id: AtomicU64::new(REQUEST_ID_SEED),
            connected,
            events,
        }
    }

    /// The in-flight request table.
    pub fn pending(&self) -> &PendingRequests {
        &self.pending
    }

    /// Serializes and writes one request frame.
    ///
    /// Assigns the next id when the caller did not supply one. The pending
    /// entry is stored before the write so no reply can ever be processed
    /// ahead of it. A send while disconnected is a no-op, not a queued
    /// retry; the caller re-issues after reconnecting if it needs delivery.
    pub fn send(&self, mut request: Request) -> Result<(), StreamError> {
        if !self.connected.load(Ordering::SeqCst) {
            return Ok(());
        }

        let id = match request.id {
            Some(id) => id,
            None => {
                let id = self.next_id.fetch_add(1, Ordering::SeqCst);
                request.id = Some(id);
                id
            }
        };

        let line = format!("{}\n", serde_json::to_string(&request)?);
        self.pending.put(id, request);

        if self.outbound.send(line).is_err() {
            warn!("writer task gone, frame dropped");
        }

        Ok(())
    }

    /// Feeds one raw inbound chunk through the framer and dispatches every
    /// complete line. The chunk is fully framed before any line's side
    /// effects run, so a handler issuing a new `send` cannot interleave with
    /// partially framed data.
    pub fn ingest(&self, chunk: &str) {
        let lines = {
            let mut framer = self.framer.lock().unwrap_or_else(PoisonError::into_inner);
            framer.push(chunk)
        };

        for line in lines {
            self.dispatch_line(&line);
        }
    }

    pub(crate) fn dispatch_line(&self, line: &str) {
        let json: Value = match serde_json::from_str(line) {
            Ok(json) => json,
            Err(_) => {
                error!("Parse stream failed, data: {}", line.trim());
                return;
            }
        };

        // A present-but-null error field is a successful reply.
        if let Some(raw) = json.get("error") {
            if !raw.is_null() {
                match RemoteError::deserialize(raw) {
                    Ok(err) => {
                        error!(code = err.code, message = %err.message, "Receive error");
                        let _ = self.events.send(StreamEvent::RemoteError(err));
                    }
                    Err(_) => error!("Malformed error field, data: {}", line.trim()),
                }
                return;
            }
        }

        let id = json.get("id").and_then(Value::as_u64);
        let entry = id.and_then(|id| self.pending.remove(id));

        if let Some(id) = id {
            if entry.is_none() {
                // No request context survives a correlation miss; the method
                // below degrades to whatever the message itself carries.
                warn!(id, "reply for unknown request id");
            }
        }

        let method = json
            .get("method")
            .and_then(Value::as_str)
            .map(str::to_string)
            .or_else(|| entry.as_ref().map(|request| request.method.clone()));
        let args = entry.and_then(|request| request.args);

        let _ = self.events.send(StreamEvent::Data(DataEvent { method, json, args }));
    }
}

/// Typed wrappers over `send`, one per engine procedure. Wire method names
/// and parameter order are load-bearing; `args` is the caller payload routed
/// back with the reply.
impl RequestChannel {
    pub fn market_list(&self) -> Result<(), StreamError> {
        self.send(Request::new("market.list", json!([])))
    }

    pub fn asset_list(&self) -> Result<(), StreamError> {
        self.send(Request::new("asset.list", json!([])))
    }

    pub fn asset_query(&self, assets: &[String]) -> Result<(), StreamError> {
        self.send(Request::new("asset.query", json!([assets])))
    }

    pub fn asset_subscribe(&self, assets: &[String]) -> Result<(), StreamError> {
        self.send(Request::new("asset.subscribe", json!([assets])))
    }

    pub fn asset_unsubscribe(&self) -> Result<(), StreamError> {
        self.send(Request::new("asset.unsubscribe", json!([])))
    }

    pub fn state_subscribe(&self, market: &str) -> Result<(), StreamError> {
        self.send(Request::new("state.subscribe", json!([market])).with_args(json!(market)))
    }

    pub fn state_unsubscribe(&self) -> Result<(), StreamError> {
        self.send(Request::new("state.unsubscribe", json!([])))
    }

    pub fn deals_subscribe(&self, markets: &[String]) -> Result<(), StreamError> {
        self.send(Request::new("deals.subscribe", json!([markets])).with_args(json!(markets)))
    }

    pub fn deals_unsubscribe(&self) -> Result<(), StreamError> {
        self.send(Request::new("deals.unsubscribe", json!([])))
    }

    pub fn price_subscribe(&self, markets: &[String]) -> Result<(), StreamError> {
        self.send(Request::new("price.subscribe", json!([markets])).with_args(json!(markets)))
    }

    pub fn price_unsubscribe(&self) -> Result<(), StreamError> {
        self.send(Request::new("price.unsubscribe", json!([])))
    }

    /// `interval` is the engine's price aggregation step, e.g. `"0.01"`.
    pub fn depth_subscribe(
        &self,
        market: &str,
        limit: u32,
        interval: &str,
    ) -> Result<(), StreamError> {
        self.send(
            Request::new("depth.subscribe", json!([market, limit, interval]))
                .with_args(json!(market)),
        )
    }

    pub fn depth_unsubscribe(&self) -> Result<(), StreamError> {
        self.send(Request::new("depth.unsubscribe", json!([])))
    }

    pub fn kline_query(
        &self,
        market: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        period: u32,
        args: Option<Value>,
    ) -> Result<(), StreamError> {
        let mut request = Request::new(
            "kline.query",
            json!([market, start.timestamp(), end.timestamp(), period]),
        );
        request.args = args;
        self.send(request)
    }

    pub fn kline_subscribe(&self, market: &str, period: u32) -> Result<(), StreamError> {
        self.send(Request::new("kline.subscribe", json!([market, period])).with_args(json!(market)))
    }

    pub fn kline_unsubscribe(&self) -> Result<(), StreamError> {
        self.send(Request::new("kline.unsubscribe", json!([])))
    }

    pub fn order_query(&self, market: &str, offset: u32, limit: u32) -> Result<(), StreamError> {
        self.send(
            Request::new("order.query", json!([market, offset, limit])).with_args(json!(market)),
        )
    }

    pub fn order_history(
        &self,
        market: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        offset: u32,
        limit: u32,
        args: Option<Value>,
    ) -> Result<(), StreamError> {
        let mut request = Request::new(
            "order.history",
            json!([market, start.timestamp(), end.timestamp(), offset, limit]),
        );
        request.args = args;
        self.send(request)
    }

    pub fn order_subscribe(&self, markets: &[String]) -> Result<(), StreamError> {
        self.send(Request::new("order.subscribe", json!([markets])).with_args(json!(markets)))
    }

    pub fn order_unsubscribe(&self) -> Result<(), StreamError> {
        self.send(Request::new("order.unsubscribe", json!([])))
    }

    pub fn order_cancel(
        &self,
        market: &str,
        order_id: u64,
        args: Option<Value>,
    ) -> Result<(), StreamError> {
        let mut request = Request::new("order.cancel", json!([market, order_id]));
        request.args = args;
        self.send(request)
    }

    pub fn order_deals(
        &self,
        order_id: u64,
        offset: u32,
        limit: u32,
        args: Option<Value>,
    ) -> Result<(), StreamError> {
        let mut request = Request::new("order.deals", json!([order_id, offset, limit]));
        request.args = args;
        self.send(request)
    }

    /// Amounts and prices travel as strings; the engine does exact decimal
    /// arithmetic on its side.
    pub fn order_put_limit(
        &self,
        market: &str,
        side: OrderSide,
        amount: Decimal,
        price: Decimal,
        source: &str,
    ) -> Result<(), StreamError> {
        self.send(Request::new(
            "order.put_limit",
            json!([
                market,
                side.to_wire(),
                amount.to_string(),
                price.to_string(),
                source
            ]),
        ))
    }

    pub fn order_put_market(
        &self,
        market: &str,
        side: OrderSide,
        amount: Decimal,
        source: &str,
    ) -> Result<(), StreamError> {
        self.send(Request::new(
            "order.put_market",
            json!([market, side.to_wire(), amount.to_string(), source]),
        ))
    }

    pub fn business_deposit(&self, asset: &str, args: Option<Value>) -> Result<(), StreamError> {
        let mut request = Request::new("business.deposit", json!([asset]));
        request.args = args;
        self.send(request)
    }

    pub fn business_withdraw(&self, asset: &str, amount: Decimal) -> Result<(), StreamError> {
        self.send(Request::new(
            "business.withdraw",
            json!([asset, amount.to_string()]),
        ))
    }

    pub fn business_reload(&self, asset: &str, args: Option<Value>) -> Result<(), StreamError> {
        let mut request = Request::new("business.reload", json!([asset]));
        request.args = args;
        self.send(request)
    }

    pub fn business_history(
        &self,
        asset: &str,
        business: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        offset: u32,
        limit: u32,
        args: Option<Value>,
    ) -> Result<(), StreamError> {
        let mut request = Request::new(
            "business.history",
            json!([
                asset,
                business,
                start.timestamp(),
                end.timestamp(),
                offset,
                limit
            ]),
        );
        request.args = args;
        self.send(request)
    }

    pub fn auth_register(&self, address: &str, period: u32) -> Result<(), StreamError> {
        self.send(Request::new("auth.register", json!([address, period])))
    }

    pub fn auth_signature(&self, id: u64, signature: &str) -> Result<(), StreamError> {
        self.send(Request::new("auth.signature", json!([id, signature])))
    }
}
