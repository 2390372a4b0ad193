/*!
 * Shared test fixtures: a scripted transport, a recording sink, and a
 * polling wait helper. Compiled for tests only.
 */
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

use crate::control::SessionNotifier;
use crate::sink::Sink;
use crate::transport::Transport;

// ---------------------------------------------------------------------------
// MockTransport
// ---------------------------------------------------------------------------

/**
 * A transport whose `run` connects instantly (or fails, when scripted) and
 * then blocks on a condvar gate until `close_request` — the same shape as a
 * real session loop, with no I/O.
 *
 * Instrumentation: total run count, a high-water mark of concurrently live
 * runs (the "at most one worker" property), and every payload passed to
 * `send`.
 */
pub(crate) struct MockTransport {
    notifier: Arc<SessionNotifier>,

    /// When true, `run` returns immediately without reporting up.
    fail_connect: bool,

    connected: AtomicBool,
    pending: AtomicBool,

    /// Close flag behind the gate's mutex, paired with the condvar.
    gate: Mutex<bool>,
    signal: Condvar,

    runs: AtomicUsize,
    live: AtomicUsize,
    max_live: AtomicUsize,
    sent: Mutex<Vec<Vec<u8>>>,
}

impl MockTransport {
    pub(crate) fn new(notifier: Arc<SessionNotifier>, fail_connect: bool) -> Self {
        Self {
            notifier,
            fail_connect,
            connected: AtomicBool::new(false),
            pending: AtomicBool::new(false),
            gate: Mutex::new(false),
            signal: Condvar::new(),
            runs: AtomicUsize::new(0),
            live: AtomicUsize::new(0),
            max_live: AtomicUsize::new(0),
            sent: Mutex::new(Vec::new()),
        }
    }

    /// Number of times `run` actually started a session attempt.
    pub(crate) fn runs(&self) -> usize {
        self.runs.load(Ordering::SeqCst)
    }

    /// Highest number of `run` invocations alive at the same time.
    pub(crate) fn max_live(&self) -> usize {
        self.max_live.load(Ordering::SeqCst)
    }

    /// Every payload passed to `send` while connected.
    pub(crate) fn sent(&self) -> Vec<Vec<u8>> {
        self.sent.lock().expect("sent lock").clone()
    }
}

impl Transport for MockTransport {
    fn connect_request(&self) {
        self.pending.store(true, Ordering::SeqCst);
        if let Ok(mut closing) = self.gate.lock() {
            *closing = false;
        }
    }

    fn close_request(&self) {
        if let Ok(mut closing) = self.gate.lock() {
            *closing = true;
        }
        self.signal.notify_all();
    }

    fn send(&self, data: &[u8]) -> bool {
        if !self.connected.load(Ordering::SeqCst) {
            return false;
        }
        self.sent.lock().expect("sent lock").push(data.to_vec());
        true
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn run(&self) {
        if !self.pending.swap(false, Ordering::SeqCst) {
            return;
        }

        self.runs.fetch_add(1, Ordering::SeqCst);
        let live = self.live.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_live.fetch_max(live, Ordering::SeqCst);

        if !self.fail_connect {
            self.connected.store(true, Ordering::SeqCst);
            self.notifier.notify_connected();

            /* Block like a real run loop, until close_request opens the
             * gate. The timeout only bounds damage from a broken test. */
            if let Ok(guard) = self.gate.lock() {
                let _ = self
                    .signal
                    .wait_timeout_while(guard, Duration::from_secs(10), |closing| !*closing);
            }

            self.connected.store(false, Ordering::SeqCst);
        }

        self.live.fetch_sub(1, Ordering::SeqCst);
    }
}

// ---------------------------------------------------------------------------
// RecordingSink
// ---------------------------------------------------------------------------

/**
 * Everything a sink can observe, in arrival order.
 */
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum SinkEvent {
    Connected,
    Closed,
    Error(String, String),
    Received(Vec<u8>, bool),
}

/**
 * A sink that records every callback, plus the name of the thread that
 * delivered each lifecycle callback.
 */
pub(crate) struct RecordingSink {
    events: Mutex<Vec<SinkEvent>>,
    lifecycle_threads: Mutex<Vec<Option<String>>>,
}

impl RecordingSink {
    pub(crate) fn new() -> Self {
        Self {
            events: Mutex::new(Vec::new()),
            lifecycle_threads: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn events(&self) -> Vec<SinkEvent> {
        self.events.lock().expect("events lock").clone()
    }

    pub(crate) fn connect_count(&self) -> usize {
        self.count(|event| matches!(event, SinkEvent::Connected))
    }

    pub(crate) fn close_count(&self) -> usize {
        self.count(|event| matches!(event, SinkEvent::Closed))
    }

    pub(crate) fn error_count(&self) -> usize {
        self.count(|event| matches!(event, SinkEvent::Error(_, _)))
    }

    /// Payloads from `on_recv`, in arrival order.
    pub(crate) fn received(&self) -> Vec<Vec<u8>> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                SinkEvent::Received(data, _) => Some(data),
                _ => None,
            })
            .collect()
    }

    /// Thread names that delivered `on_connect` / `on_close`.
    pub(crate) fn lifecycle_threads(&self) -> Vec<Option<String>> {
        self.lifecycle_threads
            .lock()
            .expect("threads lock")
            .clone()
    }

    fn count(&self, predicate: impl Fn(&SinkEvent) -> bool) -> usize {
        self.events().iter().filter(|event| predicate(event)).count()
    }

    fn record(&self, event: SinkEvent) {
        self.events.lock().expect("events lock").push(event);
    }

    fn record_lifecycle_thread(&self) {
        let name = std::thread::current().name().map(str::to_string);
        self.lifecycle_threads
            .lock()
            .expect("threads lock")
            .push(name);
    }
}

impl Sink for RecordingSink {
    fn on_connect(&self) {
        self.record_lifecycle_thread();
        self.record(SinkEvent::Connected);
    }

    fn on_close(&self) {
        self.record_lifecycle_thread();
        self.record(SinkEvent::Closed);
    }

    fn on_error(&self, action: &str, message: &str) {
        self.record(SinkEvent::Error(action.to_string(), message.to_string()));
    }

    fn on_recv(&self, data: &[u8], is_binary: bool) {
        self.record(SinkEvent::Received(data.to_vec(), is_binary));
    }
}

// ---------------------------------------------------------------------------
// wait_until
// ---------------------------------------------------------------------------

/**
 * Polls `condition` until it holds or `timeout` elapses.
 */
pub(crate) fn wait_until<F: Fn() -> bool>(timeout: Duration, condition: F) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    condition()
}
