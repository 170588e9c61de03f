use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// One outbound call.
///
/// `args` is an opaque caller payload used to route the matching reply back
/// to the caller; it is never written to the wire.
#[derive(Debug, Clone, Serialize)]
pub struct Request {
    pub method: String,
    pub params: Value,
    pub id: Option<u64>,
    #[serde(skip)]
    pub args: Option<Value>,
}

impl Request {
    pub fn new(method: impl Into<String>, params: Value) -> Self {
        Self {
            method: method.into(),
            params,
            id: None,
            args: None,
        }
    }

    pub fn with_args(mut self, args: Value) -> Self {
        self.args = Some(args);
        self
    }
}

/// Error payload of a reply, normalized from either the object form
/// `{"code": 10, "message": "..."}` or the array form `[10, "..."]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteError {
    pub code: i64,
    pub message: String,
}

impl<'de> Deserialize<'de> for RemoteError {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Repr {
            Object { code: i64, message: String },
            Pair(i64, String),
        }

        Ok(match Repr::deserialize(deserializer)? {
            Repr::Object { code, message } | Repr::Pair(code, message) => {
                RemoteError { code, message }
            }
        })
    }
}

impl fmt::Display for RemoteError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} - {}", self.code, self.message)
    }
}

/// Unified payload of a dispatched inbound message.
///
/// `method` is taken from the message itself for pushes, or from the stored
/// request for replies. `None` means the reply correlated to no pending
/// request and carried no method of its own.
#[derive(Debug, Clone)]
pub struct DataEvent {
    pub method: Option<String>,
    pub json: Value,
    pub args: Option<Value>,
}

/// Everything the session surfaces to its consumer.
#[derive(Debug, Clone)]
pub enum StreamEvent {
    Connected { version: String },
    Disconnected,
    Logout,
    TransportError(String),
    RemoteError(RemoteError),
    Data(DataEvent),
    ReplyTimeout {
        id: u64,
        method: String,
        args: Option<Value>,
    },
}

/// Order side, encoded on the wire the way the engine expects: sell = 1, buy = 2.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderSide {
    Sell,
    Buy,
}

impl OrderSide {
    pub const fn to_wire(self) -> u8 {
        match self {
            OrderSide::Sell => 1,
            OrderSide::Buy => 2,
        }
    }
}

impl fmt::Display for OrderSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrderSide::Sell => write!(f, "sell"),
            OrderSide::Buy => write!(f, "buy"),
        }
    }
}
