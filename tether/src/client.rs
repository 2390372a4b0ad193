/**
 * The client facade — the public object callers hold.
 *
 * Lifecycle:
 * 1. The caller builds a `Client` (no I/O, no threads).
 * 2. `init(sink, endpoint)` validates the target, selects the backend, and
 *    starts the two dispatcher threads. Re-initialization is safe: `init`
 *    performs an implicit `exit` first.
 * 3. `connect()` / `close()` enqueue commands and return immediately; the
 *    control dispatcher does the actual work and the sink hears about the
 *    outcome on the callback dispatcher thread.
 * 4. `send()` and `is_connected()` go straight to the transport and a
 *    shared flag; they never touch the queues and never block on them.
 * 5. `exit()` (also run on drop) stops both dispatchers, forces any live
 *    session down, and joins every thread.
 */
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use crossbeam_channel::Sender;

use crate::callback::CallbackDispatcher;
use crate::control::{ControlDispatcher, ControlMsg, SessionNotifier};
use crate::endpoint::Endpoint;
use crate::error::ClientError;
use crate::sink::Sink;
use crate::transport::{self, Transport};

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/**
 * A connection client over one of the supported backends.
 *
 * `connect`, `close`, `send` and `is_connected` take `&self` and are safe to
 * call from any thread, including from inside sink callbacks. `init` and
 * `exit` need `&mut self`; `exit` must not be called from a sink callback
 * (it joins the thread the callback runs on).
 *
 * # Example
 * ```ignore
 * let mut client = tether::Client::new();
 * client.init(sink, tether::Endpoint::parse("ws://127.0.0.1:9000")?)?;
 * client.connect();              // sink.on_connect() fires when established
 * client.send(b"hello");
 * client.close();                // sink.on_close() fires when down
 * client.exit();
 * ```
 */
pub struct Client {
    /// Running state; `None` before `init` and after `exit`.
    inner: Option<Active>,
}

/**
 * Everything that exists only while the client is initialized.
 */
struct Active {
    /// Shared shutdown flag for both dispatchers.
    stop: Arc<AtomicBool>,

    /// Connection snapshot; written only by the control dispatcher.
    connected: Arc<AtomicBool>,

    /// The backend selected at `init`. `send` reads it directly.
    transport: Arc<dyn Transport>,

    /// Producer side of the control queue.
    commands: Sender<ControlMsg>,

    /// Control dispatcher thread.
    control: JoinHandle<()>,

    /// Callback dispatcher thread.
    callback: JoinHandle<()>,
}

impl Client {
    /**
     * Creates an uninitialized client. Construction does no I/O.
     */
    pub fn new() -> Self {
        Self { inner: None }
    }

    /**
     * Initializes the client against the given endpoint.
     *
     * Always re-initializes cleanly — an already-initialized client is shut
     * down first. On any failure the client is rolled back to its
     * uninitialized state and no thread is left running.
     *
     * # Arguments
     * * `sink` — The notification target; shared with the client's threads.
     * * `endpoint` — The connect target; selects the backend variant.
     */
    pub fn init(&mut self, sink: Arc<dyn Sink>, endpoint: Endpoint) -> Result<(), ClientError> {
        endpoint.validate()?;
        self.init_with(sink, move |sink, notifier| {
            transport::create(&endpoint, sink, notifier)
        })
    }

    /**
     * The init body, generic over transport construction so tests can
     * substitute a scripted transport.
     */
    pub(crate) fn init_with<F>(&mut self, sink: Arc<dyn Sink>, build: F) -> Result<(), ClientError>
    where
        F: FnOnce(Arc<dyn Sink>, Arc<SessionNotifier>) -> Arc<dyn Transport>,
    {
        /*
         * Implicit exit: re-init on a live client tears the old instance
         * down completely before anything new starts.
         */
        self.exit();

        let stop = Arc::new(AtomicBool::new(false));
        let connected = Arc::new(AtomicBool::new(false));

        /*
         * Two queues: commands (caller + transport signals → control
         * dispatcher) and events (control dispatcher → callback
         * dispatcher). Unbounded, because a burst of connect/close calls
         * is processed as that many sequential operations, never dropped.
         */
        let (commands, command_rx) = crossbeam_channel::unbounded();
        let (events, event_rx) = crossbeam_channel::unbounded();

        let notifier = Arc::new(SessionNotifier::new(commands.clone()));
        let transport = build(Arc::clone(&sink), Arc::clone(&notifier));

        let callback = CallbackDispatcher::spawn(event_rx, Arc::clone(&sink), Arc::clone(&stop))
            .map_err(|source| ClientError::ThreadStart {
                thread: "callback dispatcher",
                source,
            })?;

        let control = match ControlDispatcher::spawn(
            command_rx,
            commands.clone(),
            events,
            Arc::clone(&transport),
            notifier,
            sink,
            Arc::clone(&connected),
            Arc::clone(&stop),
        ) {
            Ok(handle) => handle,
            Err(source) => {
                /*
                 * Roll back the callback dispatcher: the failed spawn
                 * dropped the event sender, so raising the stop flag and
                 * joining is enough.
                 */
                stop.store(true, Ordering::SeqCst);
                if callback.join().is_err() {
                    eprintln!("[tether] callback dispatcher terminated abnormally");
                }
                return Err(ClientError::ThreadStart {
                    thread: "control dispatcher",
                    source,
                });
            }
        };

        self.inner = Some(Active {
            stop,
            connected,
            transport,
            commands,
            control,
            callback,
        });

        Ok(())
    }

    /**
     * Shuts the client down: stops both dispatcher threads, forces any live
     * session closed, joins everything. Idempotent; safe to call on an
     * uninitialized client. Afterwards the client is back to its pre-`init`
     * state and may be initialized again.
     */
    pub fn exit(&mut self) {
        let Some(active) = self.inner.take() else { return };

        /*
         * Shutdown order: stop flag first, then the wake (the sentinel
         * doubles as the queue signal), then the joins. The control thread
         * joins the transport worker itself before exiting, and its exit
         * disconnects the event queue, which wakes the callback thread.
         */
        active.stop.store(true, Ordering::SeqCst);
        let _ = active.commands.send(ControlMsg::Shutdown);

        if active.control.join().is_err() {
            eprintln!("[tether] control dispatcher terminated abnormally");
        }
        if active.callback.join().is_err() {
            eprintln!("[tether] callback dispatcher terminated abnormally");
        }
    }

    /**
     * Requests a connection. Returns immediately; the outcome arrives at
     * the sink (`on_connect`, or `on_error` + `on_close` on failure).
     * Requesting a connect while connected closes the current session and
     * establishes a new one. No-op if not initialized.
     */
    pub fn connect(&self) {
        if let Some(active) = self.inner.as_ref() {
            let _ = active.commands.send(ControlMsg::Connect);
        }
    }

    /**
     * Requests a disconnect. Returns immediately; `on_close` arrives once
     * the session is down. No-op if not initialized or never connected.
     */
    pub fn close(&self) {
        if let Some(active) = self.inner.as_ref() {
            let _ = active.commands.send(ControlMsg::Close);
        }
    }

    /**
     * Sends a message, synchronously, directly against the transport.
     *
     * # Returns
     * `false` if the client is not initialized, not connected, or `data` is
     * empty; otherwise the transport's own result. A `false` from the
     * transport is not fatal — the connection stays up and no sink callback
     * fires.
     */
    pub fn send(&self, data: &[u8]) -> bool {
        let Some(active) = self.inner.as_ref() else {
            return false;
        };

        if data.is_empty() || !active.connected.load(Ordering::SeqCst) {
            return false;
        }

        active.transport.send(data)
    }

    /**
     * Snapshot of the connection state. Never blocks; the flag is written
     * only by the control dispatcher as it observes transport outcomes.
     */
    pub fn is_connected(&self) -> bool {
        self.inner
            .as_ref()
            .is_some_and(|active| active.connected.load(Ordering::SeqCst))
    }
}

impl Default for Client {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Client {
    /// Dropping an initialized client performs a full `exit`.
    fn drop(&mut self) {
        self.exit();
    }
}
