/*!
 * Tether — a unified asynchronous client facade over two low-level
 * transports: a reliable-datagram backend (UDP) and a stream backend
 * (WebSocket over TCP, optionally with TLS).
 *
 * Callers hold one object with one contract: initialize with a notification
 * sink, request connect/close asynchronously, send opaque byte messages, and
 * query connection state. The calling thread never blocks on I/O, and
 * transport callbacks never re-enter user code concurrently.
 *
 * # Module structure
 *
 * - `client` — the public facade: init/exit lifecycle, send, state snapshot
 * - `control` — the lifecycle serializer and transport worker management
 * - `callback` — sink notification delivery on a dedicated thread
 * - `endpoint` — connect target parsing: `udp://`, `ws://`, `wss://`
 * - `transport/` — the backend capability and its two adapters
 * - `sink` — the consumer-supplied notification interface
 * - `error` — initialization error type
 */

mod callback;
mod client;
mod control;
mod endpoint;
mod error;
mod sink;
mod transport;

#[cfg(test)]
mod testing;

// ---------------------------------------------------------------------------
// Re-exports
// ---------------------------------------------------------------------------

pub use client::Client;
pub use endpoint::Endpoint;
pub use error::ClientError;
pub use sink::Sink;
pub use transport::Transport;
