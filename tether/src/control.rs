/**
 * Control dispatcher — the lifecycle serializer and owner of the transport
 * worker thread.
 *
 * Architecture overview:
 *
 * ```text
 *  ┌─────────────┐     control queue      ┌──────────────────┐
 *  │  Caller      │ ── Connect/Close ───► │ Control thread    │──┐
 *  │  (any thread)│                       │ (single consumer) │  │ spawns/joins
 *  └─────────────┘              ┌───────► └───────┬──────────┘  ▼
 *                               │                 │        ┌────────────┐
 *                        Up/Down signals          │        │ Transport   │
 *                               │          LifecycleEvent  │ worker      │
 *                        ┌──────┴──────┐          │        │ (blocking   │
 *                        │ Transport    │         ▼        │  run loop)  │
 *                        │ run loop     │   callback queue  └────────────┘
 *                        └─────────────┘
 * ```
 *
 * Everything that mutates the transport — arming a connect attempt, closing,
 * starting and joining the worker thread — happens on this one thread, so no
 * two lifecycle operations can ever race on the transport handle. The same
 * queue carries caller commands and transport outcome signals, which makes
 * the observable event order match the actual operation order.
 */
use std::io;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{Receiver, Sender};

use crate::callback::LifecycleEvent;
use crate::sink::Sink;
use crate::transport::Transport;

// ---------------------------------------------------------------------------
// ControlMsg — everything the control queue carries
// ---------------------------------------------------------------------------

/**
 * Messages consumed by the control dispatcher.
 *
 * `Connect` and `Close` come from the caller via the facade. `Up` and `Down`
 * are outcome signals from the transport side, tagged with the generation of
 * the connect attempt that produced them so signals from a superseded
 * attempt can be discarded. `Shutdown` is the final teardown sentinel from
 * `exit()`; commands queued ahead of it are still drained first.
 */
pub(crate) enum ControlMsg {
    /// Caller requested a connection (`Client::connect`).
    Connect,
    /// Caller requested a disconnect (`Client::close`).
    Close,
    /// The transport session came up; payload is the attempt generation.
    Up(u64),
    /// The transport worker finished; payload is the attempt generation.
    Down(u64),
    /// Final teardown request from `Client::exit`.
    Shutdown,
}

// ---------------------------------------------------------------------------
// SessionNotifier — how a transport reports its session coming up
// ---------------------------------------------------------------------------

/**
 * Handle given to a transport at construction time, used from inside its
 * blocking `run()` to report that the session is established.
 *
 * The dispatcher stamps the current attempt generation into the notifier
 * right before spawning each worker; only the worker thread can reach
 * `notify_connected`, so the stamp is always the generation of the attempt
 * that is actually running.
 */
pub(crate) struct SessionNotifier {
    /// Sender side of the control queue.
    signals: Sender<ControlMsg>,

    /// Generation of the attempt currently allowed to report.
    generation: AtomicU64,
}

impl SessionNotifier {
    pub(crate) fn new(signals: Sender<ControlMsg>) -> Self {
        Self {
            signals,
            generation: AtomicU64::new(0),
        }
    }

    /// Stamps the generation of the next attempt. Dispatcher thread only.
    fn set_generation(&self, generation: u64) {
        self.generation.store(generation, Ordering::SeqCst);
    }

    /// Called by a transport once its session is live.
    pub(crate) fn notify_connected(&self) {
        let generation = self.generation.load(Ordering::SeqCst);
        let _ = self.signals.send(ControlMsg::Up(generation));
    }
}

// ---------------------------------------------------------------------------
// ControlDispatcher
// ---------------------------------------------------------------------------

/**
 * The single consumer of the control queue.
 *
 * Owns the one transport worker `JoinHandle` that may exist at a time; the
 * handle is always joined before being discarded or replaced, which is the
 * invariant keeping two threads from ever driving the same transport.
 */
pub(crate) struct ControlDispatcher {
    /// Receiving end of the control queue.
    commands: Receiver<ControlMsg>,

    /// Sender handed to each worker so it can report `Down` when done.
    signals: Sender<ControlMsg>,

    /// Producer side of the callback dispatcher's queue.
    events: Sender<LifecycleEvent>,

    /// The single transport instance. Mutating calls (`connect_request`,
    /// `close_request`) are made from this thread only.
    transport: Arc<dyn Transport>,

    /// Generation stamp shared with the transport.
    notifier: Arc<SessionNotifier>,

    /// Consumer sink, for faults that have no queue to travel through.
    sink: Arc<dyn Sink>,

    /// Facade-visible connection flag; written here, read anywhere.
    connected: Arc<AtomicBool>,

    /// Shared shutdown flag; a `Connect` observed after it is raised is
    /// treated as a close.
    stop: Arc<AtomicBool>,

    /// Handle of the live worker thread, if any.
    worker: Option<JoinHandle<()>>,

    /// Generation of the most recently started attempt.
    generation: u64,
}

impl ControlDispatcher {
    /**
     * Spawns the control dispatcher thread.
     *
     * # Arguments
     * * `commands` — Receiving end of the control queue.
     * * `signals` — Sender side of the same queue, cloned into workers.
     * * `events` — Producer side of the callback queue.
     * * `transport` — The transport instance selected at `init`.
     * * `notifier` — The generation stamp shared with `transport`.
     * * `sink` — The consumer sink, for worker-spawn faults.
     * * `connected` — The facade's connection flag.
     * * `stop` — The shared shutdown flag.
     */
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn spawn(
        commands: Receiver<ControlMsg>,
        signals: Sender<ControlMsg>,
        events: Sender<LifecycleEvent>,
        transport: Arc<dyn Transport>,
        notifier: Arc<SessionNotifier>,
        sink: Arc<dyn Sink>,
        connected: Arc<AtomicBool>,
        stop: Arc<AtomicBool>,
    ) -> io::Result<JoinHandle<()>> {
        let dispatcher = Self {
            commands,
            signals,
            events,
            transport,
            notifier,
            sink,
            connected,
            stop,
            worker: None,
            generation: 0,
        };

        thread::Builder::new()
            .name("tether-control".into())
            .spawn(move || {
                let result = catch_unwind(AssertUnwindSafe(move || dispatcher.run_loop()));

                if result.is_err() {
                    eprintln!("[tether] control dispatcher panicked; lifecycle processing stopped");
                }
            })
    }

    /**
     * The dispatch loop: block on the queue, process messages in strict
     * enqueue order, tear down on the shutdown sentinel or on queue
     * disconnection.
     */
    fn run_loop(mut self) {
        loop {
            let Ok(message) = self.commands.recv() else { break };

            match message {
                ControlMsg::Connect => self.handle_connect(),
                ControlMsg::Close => self.handle_close(),
                ControlMsg::Up(generation) => self.handle_up(generation),
                ControlMsg::Down(generation) => self.handle_down(generation),
                ControlMsg::Shutdown => break,
            }
        }

        self.teardown();
    }

    /**
     * A `Connect` command.
     *
     * Already connected → close-then-reconnect: the current session is
     * closed (with its `Closed` notification) before the fresh attempt
     * starts. Not connected → any leftover worker is stopped and joined
     * first, then a fresh attempt starts. After the stop flag is raised the
     * command degrades to a close notification; no new work is started
     * during teardown.
     */
    fn handle_connect(&mut self) {
        if self.stop.load(Ordering::SeqCst) {
            self.emit(LifecycleEvent::Closed);
            return;
        }

        if self.connected.load(Ordering::SeqCst) {
            self.disconnect();
        } else if let Some(handle) = self.worker.take() {
            /*
             * A previous attempt is unresolved or just finished. Ask the
             * transport to bail out so the join is bounded, then reclaim
             * the thread before starting over.
             */
            if !handle.is_finished() {
                self.transport.close_request();
            }
            Self::join_worker(handle);
        }

        self.start_worker();
    }

    /**
     * A `Close` command: only a live connection produces work (and a
     * `Closed` notification). Closing while unconnected is a no-op; an
     * unresolved connect attempt is left to report its own outcome.
     */
    fn handle_close(&mut self) {
        if self.connected.load(Ordering::SeqCst) {
            self.disconnect();
        }
    }

    /**
     * An `Up` signal from the transport: the session is established.
     * Stale generations are attempts that were already replaced or closed;
     * their signals are dropped.
     */
    fn handle_up(&mut self, generation: u64) {
        if generation != self.generation || self.connected.load(Ordering::SeqCst) {
            return;
        }

        self.connected.store(true, Ordering::SeqCst);
        self.emit(LifecycleEvent::Connected);
    }

    /**
     * A `Down` signal: the worker for the given attempt finished, whether
     * because the connect failed, the peer closed, or a local close made
     * the run loop return. Exactly one `Closed` is produced per attempt —
     * locally closed attempts were already reported by `disconnect` and
     * their generation retired, so their `Down` lands in the stale branch.
     */
    fn handle_down(&mut self, generation: u64) {
        if generation != self.generation {
            return;
        }

        if let Some(handle) = self.worker.take() {
            Self::join_worker(handle);
        }

        self.connected.store(false, Ordering::SeqCst);
        self.emit(LifecycleEvent::Closed);
    }

    /**
     * Stops the current session: close the transport, reclaim the worker
     * thread, retire the attempt generation, notify.
     */
    fn disconnect(&mut self) {
        self.transport.close_request();

        if let Some(handle) = self.worker.take() {
            Self::join_worker(handle);
        }

        /* Outcome signals still queued from this attempt are now stale. */
        self.generation += 1;

        self.connected.store(false, Ordering::SeqCst);
        self.emit(LifecycleEvent::Closed);
    }

    /**
     * Starts a fresh connect attempt: stamp a new generation, arm the
     * transport, spawn the worker that drives the blocking run loop.
     *
     * The transport is armed here rather than on the worker: every connect
     * and close intent change happens on this thread, in program order, so
     * a close aimed at a worker that has not been scheduled yet cannot be
     * overtaken by that worker arming itself.
     */
    fn start_worker(&mut self) {
        self.generation += 1;
        self.notifier.set_generation(self.generation);
        self.transport.connect_request();

        let generation = self.generation;
        let transport = Arc::clone(&self.transport);
        let signals = self.signals.clone();

        let spawned = thread::Builder::new()
            .name("tether-transport".into())
            .spawn(move || {
                /*
                 * Backend faults must never escape the worker. A panicking
                 * run loop still produces its Down signal, so the attempt
                 * always resolves.
                 */
                let result = catch_unwind(AssertUnwindSafe(|| transport.run()));

                if result.is_err() {
                    eprintln!("[tether] transport worker panicked");
                }

                let _ = signals.send(ControlMsg::Down(generation));
            });

        match spawned {
            Ok(handle) => self.worker = Some(handle),
            Err(err) => {
                self.sink
                    .on_error("connect", &format!("failed to start transport worker: {err}"));
                self.emit(LifecycleEvent::Closed);
            }
        }
    }

    /**
     * Final teardown: force any live session down, reclaim the worker, and
     * report the close if a connection was up. Runs exactly once, when the
     * dispatch loop ends.
     */
    fn teardown(&mut self) {
        if let Some(handle) = self.worker.take() {
            self.transport.close_request();
            Self::join_worker(handle);
        }

        if self.connected.swap(false, Ordering::SeqCst) {
            self.emit(LifecycleEvent::Closed);
        }
    }

    fn emit(&self, event: LifecycleEvent) {
        let _ = self.events.send(event);
    }

    fn join_worker(handle: JoinHandle<()>) {
        if handle.join().is_err() {
            eprintln!("[tether] transport worker terminated abnormally");
        }
    }
}
