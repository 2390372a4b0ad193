/**
 * Callback dispatcher — delivers lifecycle notifications to the sink from
 * its own thread.
 *
 * Lifecycle events are produced by the control dispatcher only; delivering
 * them from a separate thread means a sink implementation can call straight
 * back into `connect()`, `close()` or `send()` without deadlocking against
 * the control dispatcher, and callback ordering always matches event
 * production order (FIFO, single consumer).
 */
use std::io;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::Receiver;

use crate::sink::Sink;

// ---------------------------------------------------------------------------
// LifecycleEvent
// ---------------------------------------------------------------------------

/**
 * A connection state transition, produced by the control dispatcher and
 * consumed by the callback dispatcher.
 */
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum LifecycleEvent {
    /// The connection is established; delivered as `Sink::on_connect`.
    Connected,
    /// The connection ended; delivered as `Sink::on_close`.
    Closed,
}

// ---------------------------------------------------------------------------
// CallbackDispatcher
// ---------------------------------------------------------------------------

/**
 * Handle-less dispatcher type; `spawn` returns the thread handle and the
 * thread runs until the stop flag is observed or the event queue
 * disconnects (the control dispatcher dropping its sender on exit).
 */
pub(crate) struct CallbackDispatcher;

impl CallbackDispatcher {
    /**
     * Spawns the callback dispatcher thread.
     *
     * # Arguments
     * * `events` — The receiving end of the lifecycle event queue.
     * * `sink` — The consumer's notification target.
     * * `stop` — Shared shutdown flag, checked before each delivery.
     */
    pub(crate) fn spawn(
        events: Receiver<LifecycleEvent>,
        sink: Arc<dyn Sink>,
        stop: Arc<AtomicBool>,
    ) -> io::Result<JoinHandle<()>> {
        thread::Builder::new()
            .name("tether-callback".into())
            .spawn(move || {
                let result = catch_unwind(AssertUnwindSafe(|| {
                    Self::run_loop(&events, sink.as_ref(), &stop);
                }));

                if result.is_err() {
                    eprintln!("[tether] callback dispatcher panicked; sink notifications stopped");
                }
            })
    }

    /**
     * The delivery loop.
     *
     * The stop flag is observed before pulling the next event; an event
     * already pulled is always delivered, so nothing is silently dropped
     * once dequeued. Events still queued when the flag is raised are
     * discarded with the queue itself.
     */
    fn run_loop(events: &Receiver<LifecycleEvent>, sink: &dyn Sink, stop: &AtomicBool) {
        loop {
            if stop.load(Ordering::SeqCst) {
                break;
            }

            let Ok(event) = events.recv() else { break };

            match event {
                LifecycleEvent::Connected => sink.on_connect(),
                LifecycleEvent::Closed => sink.on_close(),
            }
        }
    }
}
