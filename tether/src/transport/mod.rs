/*!
 * Transport layer — the backend capability and its two adapters.
 *
 * - `websocket` — stream backend: blocking WebSocket client, plain or TLS
 * - `datagram` — reliable-datagram backend: UDP with readiness polling
 *
 * The concrete variant is selected once, from the endpoint, at construction
 * time; the rest of the client only ever sees `dyn Transport`.
 */

pub(crate) mod datagram;
pub(crate) mod websocket;

use std::sync::Arc;

use crate::control::SessionNotifier;
use crate::endpoint::Endpoint;
use crate::sink::Sink;

use datagram::DatagramTransport;
use websocket::WebSocketTransport;

// ---------------------------------------------------------------------------
// Transport — the capability the dispatch engine drives
// ---------------------------------------------------------------------------

/**
 * An opaque backend providing connect/close/send over a concrete network
 * protocol.
 *
 * Threading contract:
 * - `run` blocks for the lifetime of one session and is only ever executed
 *   on the single transport worker thread.
 * - `connect_request` and `close_request` are non-blocking intent changes,
 *   issued only from the control dispatcher thread. `connect_request` arms
 *   the next `run`; it is idempotent. `close_request` makes an in-progress
 *   `run` return within a bounded time.
 * - `send` and `is_connected` are safe from any thread while `run` executes.
 *   `send` reports failure as `false`, never as a panic.
 *
 * Faults inside `run` are reported through the sink (`on_error`) and by
 * returning; they never propagate out of the worker.
 */
pub trait Transport: Send + Sync {
    /// Arms the next connect attempt. Fire-and-forget, idempotent.
    fn connect_request(&self);

    /// Requests that the current session end; an in-progress `run` returns
    /// within a bounded time.
    fn close_request(&self);

    /// Sends one opaque message. `false` on any failure or when no session
    /// is up.
    fn send(&self, data: &[u8]) -> bool;

    /// Cheap thread-safe snapshot of the session state.
    fn is_connected(&self) -> bool;

    /// Performs the armed connect attempt and blocks driving the session
    /// until `close_request`, a peer close, or a failure.
    fn run(&self);
}

// ---------------------------------------------------------------------------
// Factory
// ---------------------------------------------------------------------------

/**
 * Builds the backend the endpoint selects.
 */
pub(crate) fn create(
    endpoint: &Endpoint,
    sink: Arc<dyn Sink>,
    notifier: Arc<SessionNotifier>,
) -> Arc<dyn Transport> {
    match endpoint {
        Endpoint::Datagram { host, port } => {
            Arc::new(DatagramTransport::new(host.clone(), *port, sink, notifier))
        }
        Endpoint::Stream { url, secure } => {
            Arc::new(WebSocketTransport::new(url.clone(), *secure, sink, notifier))
        }
    }
}
