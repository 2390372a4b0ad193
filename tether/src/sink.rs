/*!
 * The consumer-supplied notification target.
 *
 * A `Sink` receives every observable outcome of the client's work:
 * connection lifecycle transitions, transport faults, and inbound messages.
 * The client holds the sink behind an `Arc` and shares it with its internal
 * threads; it never takes ownership of the consumer's state.
 */

/**
 * Callback interface for connection lifecycle and data events.
 *
 * Threading: `on_connect` and `on_close` are delivered from the client's
 * callback dispatcher thread, one at a time, in the order the transitions
 * happened. `on_error` and `on_recv` are delivered directly from the
 * transport worker thread. A sink implementation may call back into
 * `connect()`, `close()` or `send()` from any of these callbacks without
 * risking a deadlock.
 */
pub trait Sink: Send + Sync {
    /// The connection is established.
    fn on_connect(&self);

    /// The connection ended: local close, remote close, or a failed
    /// connect attempt.
    fn on_close(&self);

    /// A transport operation failed. `action` names the operation
    /// (`"connect"`, `"send"`, `"recv"`); the failure is not fatal to the
    /// client and does not by itself close the connection.
    fn on_error(&self, action: &str, message: &str);

    /// A message arrived. `is_binary` is false for WebSocket text frames;
    /// datagram payloads are always binary. Empty payloads are never
    /// delivered.
    fn on_recv(&self, data: &[u8], is_binary: bool);
}
