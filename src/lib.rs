pub mod client;
pub mod core;
pub mod kernel;

pub use client::{RequestChannel, SessionState, SessionStream};
pub use crate::core::{config::StreamConfig, errors::StreamError, types::*};
pub use kernel::{Endpoint, Transport, TransportFactory, WsTransportFactory};
