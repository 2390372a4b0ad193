/*!
 * Reliable-datagram backend: UDP with readiness polling.
 *
 * Uses `mio` for the poll loop so `close_request` can interrupt a blocked
 * wait through a waker instead of relying on timeouts alone. The session is
 * considered up once the socket is bound and connected to the peer; the
 * wire-level session protocol is the backend's own business and out of
 * scope here.
 *
 * `send()` writes directly on the connected socket — UDP sends are atomic
 * per datagram, so unlike the stream backend no outgoing queue is needed.
 */
use std::io::ErrorKind;
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr, ToSocketAddrs};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use mio::net::UdpSocket;
use mio::{Events, Interest, Poll, Token, Waker};

use super::Transport;
use crate::control::SessionNotifier;
use crate::sink::Sink;

const WAKE: Token = Token(0);
const SOCKET: Token = Token(1);

/// Poll timeout; backstop for the close flag when the waker is gone.
const POLL_TIMEOUT: Duration = Duration::from_millis(100);

/// Largest datagram the backend accepts (the UDP payload maximum).
const RECV_BUFFER: usize = 64 * 1024;

// ---------------------------------------------------------------------------
// DatagramTransport
// ---------------------------------------------------------------------------

/**
 * UDP adapter. The socket and waker exist only while a session runs; they
 * are published into shared slots so `send` and `close_request` can reach
 * them from other threads.
 */
pub(crate) struct DatagramTransport {
    host: String,
    port: u16,

    /// Receives `on_recv` / `on_error` directly from the poll loop.
    sink: Arc<dyn Sink>,

    /// Reports the session coming up to the control dispatcher.
    notifier: Arc<SessionNotifier>,

    connected: AtomicBool,
    pending: AtomicBool,
    closing: AtomicBool,

    /// Live socket, for `send`; `None` between sessions.
    socket: Mutex<Option<Arc<UdpSocket>>>,

    /// Live waker, for `close_request`; `None` between sessions.
    waker: Mutex<Option<Arc<Waker>>>,
}

impl DatagramTransport {
    pub(crate) fn new(
        host: String,
        port: u16,
        sink: Arc<dyn Sink>,
        notifier: Arc<SessionNotifier>,
    ) -> Self {
        Self {
            host,
            port,
            sink,
            notifier,
            connected: AtomicBool::new(false),
            pending: AtomicBool::new(false),
            closing: AtomicBool::new(false),
            socket: Mutex::new(None),
            waker: Mutex::new(None),
        }
    }

    /**
     * Resolves the peer, binds an ephemeral local socket of the matching
     * address family, connects it, and wires up the poll registration.
     */
    fn open_session(&self) -> Result<(Poll, Arc<UdpSocket>, Arc<Waker>), String> {
        let remote = resolve(&self.host, self.port)?;
        let local: SocketAddr = if remote.is_ipv4() {
            (Ipv4Addr::UNSPECIFIED, 0).into()
        } else {
            (Ipv6Addr::UNSPECIFIED, 0).into()
        };

        let mut socket = UdpSocket::bind(local).map_err(|err| format!("bind: {err}"))?;
        socket
            .connect(remote)
            .map_err(|err| format!("connect {remote}: {err}"))?;

        let poll = Poll::new().map_err(|err| format!("poll: {err}"))?;
        poll.registry()
            .register(&mut socket, SOCKET, Interest::READABLE)
            .map_err(|err| format!("register: {err}"))?;
        let waker =
            Waker::new(poll.registry(), WAKE).map_err(|err| format!("waker: {err}"))?;

        Ok((poll, Arc::new(socket), Arc::new(waker)))
    }

    /**
     * The readiness loop: deliver inbound datagrams until the close flag is
     * raised (the waker interrupts the wait; the poll timeout is only the
     * backstop).
     */
    fn poll_loop(&self, poll: &mut Poll, socket: &UdpSocket) {
        let mut events = Events::with_capacity(16);
        let mut buffer = vec![0u8; RECV_BUFFER];

        while !self.closing.load(Ordering::SeqCst) {
            if let Err(err) = poll.poll(&mut events, Some(POLL_TIMEOUT)) {
                if err.kind() == ErrorKind::Interrupted {
                    continue;
                }
                self.sink.on_error("recv", &err.to_string());
                break;
            }

            for event in events.iter() {
                if event.token() == SOCKET {
                    self.drain(socket, &mut buffer);
                }
                /* WAKE carries no data; the loop condition re-checks the
                 * close flag. */
            }
        }
    }

    /**
     * Reads until the socket would block — the poll is edge-style, so every
     * readable event must be drained completely.
     */
    fn drain(&self, socket: &UdpSocket, buffer: &mut [u8]) {
        loop {
            match socket.recv(buffer) {
                Ok(len) => {
                    if len > 0 {
                        self.sink.on_recv(&buffer[..len], true);
                    }
                }
                Err(ref err) if err.kind() == ErrorKind::WouldBlock => break,
                Err(err) => {
                    /* e.g. a port-unreachable bounce; the session stays up */
                    self.sink.on_error("recv", &err.to_string());
                    break;
                }
            }
        }
    }
}

impl Transport for DatagramTransport {
    fn connect_request(&self) {
        self.pending.store(true, Ordering::SeqCst);
        self.closing.store(false, Ordering::SeqCst);
    }

    fn close_request(&self) {
        self.closing.store(true, Ordering::SeqCst);

        let waker = match self.waker.lock() {
            Ok(slot) => slot.as_ref().map(Arc::clone),
            Err(_) => None,
        };
        if let Some(waker) = waker {
            if let Err(err) = waker.wake() {
                eprintln!("[tether] failed to wake datagram poll: {err}");
            }
        }
    }

    fn send(&self, data: &[u8]) -> bool {
        if data.is_empty() || !self.connected.load(Ordering::SeqCst) {
            return false;
        }

        let socket = match self.socket.lock() {
            Ok(slot) => slot.as_ref().map(Arc::clone),
            Err(_) => None,
        };
        let Some(socket) = socket else {
            return false;
        };

        match socket.send(data) {
            Ok(written) => written == data.len(),
            Err(ref err) if err.kind() == ErrorKind::WouldBlock => false,
            Err(err) => {
                self.sink.on_error("send", &err.to_string());
                false
            }
        }
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn run(&self) {
        if !self.pending.swap(false, Ordering::SeqCst) {
            return;
        }
        if self.closing.load(Ordering::SeqCst) {
            return;
        }

        let (mut poll, socket, waker) = match self.open_session() {
            Ok(session) => session,
            Err(message) => {
                self.sink.on_error("connect", &message);
                return;
            }
        };

        /* Publish before reporting up, same as the stream backend. */
        if let Ok(mut slot) = self.socket.lock() {
            *slot = Some(Arc::clone(&socket));
        }
        if let Ok(mut slot) = self.waker.lock() {
            *slot = Some(Arc::clone(&waker));
        }
        self.connected.store(true, Ordering::SeqCst);
        self.notifier.notify_connected();

        self.poll_loop(&mut poll, &socket);

        self.connected.store(false, Ordering::SeqCst);
        if let Ok(mut slot) = self.socket.lock() {
            *slot = None;
        }
        if let Ok(mut slot) = self.waker.lock() {
            *slot = None;
        }
    }
}

// ---------------------------------------------------------------------------
// Internal helpers
// ---------------------------------------------------------------------------

fn resolve(host: &str, port: u16) -> Result<SocketAddr, String> {
    let mut addrs = (host, port)
        .to_socket_addrs()
        .map_err(|err| format!("resolve {host}:{port}: {err}"))?;
    addrs
        .next()
        .ok_or_else(|| format!("no addresses for {host}:{port}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::Client;
    use crate::endpoint::Endpoint;
    use crate::testing::{wait_until, RecordingSink};
    use std::thread;

    /**
     * A loopback peer that echoes the first datagram back to its sender.
     */
    fn spawn_echo_peer() -> (u16, thread::JoinHandle<()>) {
        let socket = std::net::UdpSocket::bind("127.0.0.1:0").expect("bind");
        let port = socket.local_addr().expect("local addr").port();
        socket
            .set_read_timeout(Some(Duration::from_secs(10)))
            .expect("read timeout");

        let handle = thread::spawn(move || {
            let mut buffer = [0u8; 2048];
            if let Ok((len, peer)) = socket.recv_from(&mut buffer) {
                let _ = socket.send_to(&buffer[..len], peer);
            }
        });

        (port, handle)
    }

    /**
     * Full round trip through the real backend against a loopback echo
     * peer: connect, send, receive the echo, close.
     */
    #[test]
    fn test_echo_round_trip() {
        let (port, peer) = spawn_echo_peer();
        let sink = Arc::new(RecordingSink::new());
        let mut client = Client::new();

        client
            .init(sink.clone(), Endpoint::datagram("127.0.0.1", port))
            .expect("init should succeed");

        client.connect();
        assert!(wait_until(Duration::from_secs(10), || sink.connect_count() == 1));
        assert!(client.is_connected());

        assert!(client.send(b"ping"));
        assert!(wait_until(Duration::from_secs(10), || {
            sink.received() == vec![b"ping".to_vec()]
        }));

        client.close();
        assert!(wait_until(Duration::from_secs(10), || sink.close_count() == 1));
        assert!(!client.is_connected());

        client.exit();
        let _ = peer.join();
    }

    /**
     * `close()` interrupts an idle poll promptly — no datagram ever flows.
     */
    #[test]
    fn test_close_interrupts_idle_poll() {
        let (port, peer) = spawn_echo_peer();
        let sink = Arc::new(RecordingSink::new());
        let mut client = Client::new();

        client
            .init(sink.clone(), Endpoint::datagram("127.0.0.1", port))
            .expect("init should succeed");

        client.connect();
        assert!(wait_until(Duration::from_secs(10), || client.is_connected()));

        client.close();
        assert!(wait_until(Duration::from_secs(10), || sink.close_count() == 1));

        client.exit();
        drop(peer); // echo thread times out on its own
    }
}
