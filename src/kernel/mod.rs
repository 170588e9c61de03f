/// Transport kernel - the protocol-agnostic plumbing under the client.
///
/// The kernel carries no knowledge of engine procedures. It is organized
/// around three pieces:
///
/// - `Transport`: the raw socket boundary, created fresh per connection by a
///   `TransportFactory` (`TungsteniteTransport` is the default)
/// - `LineFramer`: newline framing with a fail-fast backpressure cap
/// - `PendingRequests`: the id-to-request table with per-entry expiry
///
/// Everything here is trait-based or self-contained so the client layer can
/// be exercised against scripted transports in tests.
pub mod framer;
pub mod pending;
pub mod transport;

// Re-export key types for convenience
pub use framer::LineFramer;
pub use pending::PendingRequests;
pub use transport::{Endpoint, Transport, TransportFactory, TungsteniteTransport, WsTransportFactory};
