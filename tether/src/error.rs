/*!
 * Initialization errors.
 *
 * Only `Client::init` fails with a `Result` — everything that can go wrong
 * after initialization is reported through the sink (`on_error`, `on_close`)
 * or as a `false` return from `send`.
 */

use std::io;

use thiserror::Error;

/**
 * Errors surfaced by [`Client::init`](crate::Client::init).
 *
 * Either the connect target was rejected, or one of the two dispatcher
 * threads could not be started. In both cases the client is rolled back to
 * its uninitialized state before the error is returned.
 */
#[derive(Debug, Error)]
pub enum ClientError {
    /// The connect target was empty or not understood.
    #[error("invalid endpoint: {0}")]
    InvalidEndpoint(String),

    /// A dispatcher thread could not be started.
    #[error("failed to start the {thread} thread")]
    ThreadStart {
        /// Which thread failed to start.
        thread: &'static str,
        /// The underlying spawn failure.
        #[source]
        source: io::Error,
    },
}
