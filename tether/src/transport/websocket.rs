/*!
 * Stream backend: a blocking WebSocket client over TCP, plain or TLS.
 *
 * Uses `tungstenite` — the blocking flavor, no async runtime. The transport
 * worker is already a dedicated background thread, so blocking I/O with a
 * short read timeout is all the scheduling this backend needs.
 *
 * Session shape:
 * - `run()` dials with a bounded TCP connect timeout, performs the
 *   WebSocket (and, for `wss://`, TLS) handshake, then loops: drain the
 *   outgoing queue, check the close flag, read one frame.
 * - The socket's read timeout doubles as the poll interval, bounding both
 *   close latency and outgoing-send latency.
 * - `send()` never touches the socket; it enqueues onto the outgoing queue
 *   that the session loop drains. That keeps the socket single-threaded
 *   while `send` stays callable from anywhere.
 */
use std::io::ErrorKind;
use std::net::{TcpStream, ToSocketAddrs};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crossbeam_channel::{Receiver, Sender};
use tungstenite::protocol::frame::coding::CloseCode;
use tungstenite::protocol::CloseFrame;
use tungstenite::stream::MaybeTlsStream;
use tungstenite::{Message, WebSocket};

use super::Transport;
use crate::control::SessionNotifier;
use crate::sink::Sink;

/// Upper bound on establishing the TCP connection.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Socket read timeout while the WebSocket/TLS handshake runs.
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// Socket read timeout during the session loop; bounds how long a close
/// request or a queued outgoing message can wait.
const POLL_INTERVAL: Duration = Duration::from_millis(10);

type Socket = WebSocket<MaybeTlsStream<TcpStream>>;

// ---------------------------------------------------------------------------
// WebSocketTransport
// ---------------------------------------------------------------------------

/**
 * WebSocket adapter. One instance lives for the whole client lifetime and
 * is driven through any number of sessions; the socket itself exists only
 * inside `run()`.
 */
pub(crate) struct WebSocketTransport {
    /// Target URL; the scheme was validated at endpoint construction.
    url: String,

    /// Whether this is the TLS variant, fixed at construction.
    secure: bool,

    /// Receives `on_recv` / `on_error` directly from the session loop.
    sink: Arc<dyn Sink>,

    /// Reports the session coming up to the control dispatcher.
    notifier: Arc<SessionNotifier>,

    /// Session state snapshot.
    connected: AtomicBool,

    /// Set by `connect_request`, consumed by the next `run`.
    pending: AtomicBool,

    /// Set by `close_request`, observed by the session loop.
    closing: AtomicBool,

    /// Producer side of the per-session outgoing queue; `None` between
    /// sessions.
    outgoing: Mutex<Option<Sender<Vec<u8>>>>,
}

impl WebSocketTransport {
    pub(crate) fn new(
        url: String,
        secure: bool,
        sink: Arc<dyn Sink>,
        notifier: Arc<SessionNotifier>,
    ) -> Self {
        Self {
            url,
            secure,
            sink,
            notifier,
            connected: AtomicBool::new(false),
            pending: AtomicBool::new(false),
            closing: AtomicBool::new(false),
            outgoing: Mutex::new(None),
        }
    }

    /**
     * Establishes the TCP connection and performs the handshake, returning
     * a socket already configured with the session-loop read timeout.
     */
    fn dial(&self) -> Result<Socket, String> {
        let (host, port) = authority(&self.url, self.secure)?;
        let addrs = (host.as_str(), port)
            .to_socket_addrs()
            .map_err(|err| format!("resolve {host}:{port}: {err}"))?;

        let mut stream = None;
        let mut last_error = format!("no addresses for {host}:{port}");
        for addr in addrs {
            match TcpStream::connect_timeout(&addr, CONNECT_TIMEOUT) {
                Ok(tcp) => {
                    stream = Some(tcp);
                    break;
                }
                Err(err) => last_error = format!("connect {addr}: {err}"),
            }
        }
        let Some(stream) = stream else {
            return Err(last_error);
        };

        stream
            .set_read_timeout(Some(HANDSHAKE_TIMEOUT))
            .map_err(|err| err.to_string())?;
        let _ = stream.set_nodelay(true);

        /* Plain or TLS is decided by the URL scheme; default TLS policy. */
        let (mut socket, _response) =
            tungstenite::client_tls(self.url.as_str(), stream).map_err(|err| err.to_string())?;

        set_read_timeout(&mut socket, POLL_INTERVAL);
        Ok(socket)
    }

    /**
     * One session: read frames to the sink, drain outgoing messages, honor
     * the close flag. Returns when the session is over, for any reason.
     */
    fn session_loop(&self, socket: &mut Socket, outgoing: &Receiver<Vec<u8>>) {
        loop {
            if self.closing.load(Ordering::SeqCst) {
                let _ = socket.close(Some(CloseFrame {
                    code: CloseCode::Away,
                    reason: "".into(),
                }));
                let _ = socket.flush();
                break;
            }

            while let Ok(payload) = outgoing.try_recv() {
                match socket.send(Message::Binary(payload)) {
                    Ok(()) => {}
                    /* WouldBlock keeps the frame buffered; the next read
                     * or flush inside tungstenite retries it. */
                    Err(tungstenite::Error::Io(ref err)) if is_idle(err) => {}
                    Err(err) => self.sink.on_error("send", &err.to_string()),
                }
            }

            match socket.read() {
                Ok(Message::Binary(data)) => {
                    if !data.is_empty() {
                        self.sink.on_recv(&data, true);
                    }
                }
                Ok(Message::Text(text)) => {
                    if !text.is_empty() {
                        self.sink.on_recv(text.as_bytes(), false);
                    }
                }
                Ok(Message::Close(_)) => break,
                Ok(_) => {} // ping/pong are answered inside tungstenite
                Err(tungstenite::Error::Io(ref err)) if is_idle(err) => {}
                Err(tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed) => {
                    break
                }
                Err(err) => {
                    self.sink.on_error("recv", &err.to_string());
                    break;
                }
            }
        }
    }
}

impl Transport for WebSocketTransport {
    fn connect_request(&self) {
        self.pending.store(true, Ordering::SeqCst);
        self.closing.store(false, Ordering::SeqCst);
    }

    fn close_request(&self) {
        self.closing.store(true, Ordering::SeqCst);
    }

    fn send(&self, data: &[u8]) -> bool {
        if data.is_empty() || !self.connected.load(Ordering::SeqCst) {
            return false;
        }

        if let Ok(slot) = self.outgoing.lock() {
            if let Some(sender) = slot.as_ref() {
                return sender.send(data.to_vec()).is_ok();
            }
        }
        false
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

        let mut socket = match self.dial() {
            Ok(socket) => socket,
            Err(message) => {
                self.sink.on_error("connect", &message);
                return;
            }
        };

        /*
         * Publish the outgoing queue and the connected flag before
         * reporting up, so a sink that reacts to on_connect with an
         * immediate send() finds a working path.
         */
        let (sender, receiver) = crossbeam_channel::unbounded();
        if let Ok(mut slot) = self.outgoing.lock() {
            *slot = Some(sender);
        }
        self.connected.store(true, Ordering::SeqCst);
        self.notifier.notify_connected();

        self.session_loop(&mut socket, &receiver);

        self.connected.store(false, Ordering::SeqCst);
        if let Ok(mut slot) = self.outgoing.lock() {
            *slot = None;
        }
    }
}

// ---------------------------------------------------------------------------
// Internal helpers
// ---------------------------------------------------------------------------

/**
 * Extracts host and port from the URL's authority section, defaulting the
 * port by scheme when absent.
 */
fn authority(url: &str, secure: bool) -> Result<(String, u16), String> {
    let rest = url.split_once("://").map(|(_, rest)| rest).unwrap_or(url);
    let authority = rest.split('/').next().unwrap_or_default();
    if authority.is_empty() {
        return Err(format!("no host in {url:?}"));
    }

    match authority.rsplit_once(':') {
        Some((host, port)) => {
            let port: u16 = port.parse().map_err(|_| format!("bad port in {url:?}"))?;
            Ok((host.to_string(), port))
        }
        None => Ok((authority.to_string(), if secure { 443 } else { 80 })),
    }
}

/// A read that only means "nothing to do yet" under a read timeout.
fn is_idle(err: &std::io::Error) -> bool {
    matches!(err.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut)
}

/**
 * Applies a read timeout to the TCP stream underneath the WebSocket,
 * through the TLS layer when present.
 */
fn set_read_timeout(socket: &mut Socket, timeout: Duration) {
    let result = match socket.get_mut() {
        MaybeTlsStream::Plain(stream) => stream.set_read_timeout(Some(timeout)),
        MaybeTlsStream::NativeTls(stream) => stream.get_ref().set_read_timeout(Some(timeout)),
        _ => Ok(()),
    };

    if let Err(err) = result {
        eprintln!("[tether] failed to set websocket read timeout: {err}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::Client;
    use crate::endpoint::Endpoint;
    use crate::testing::{wait_until, RecordingSink};
    use std::net::TcpListener;
    use std::thread;

    /**
     * Accepts one WebSocket connection on a loopback port and echoes every
     * data frame until the peer closes.
     */
    fn spawn_echo_server() -> (u16, thread::JoinHandle<()>) {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
        let port = listener.local_addr().expect("local addr").port();

        let handle = thread::spawn(move || {
            let Ok((stream, _)) = listener.accept() else {
                return;
            };
            let Ok(mut socket) = tungstenite::accept(stream) else {
                return;
            };
            loop {
                match socket.read() {
                    Ok(message @ (Message::Binary(_) | Message::Text(_))) => {
                        if socket.send(message).is_err() {
                            break;
                        }
                    }
                    Ok(Message::Close(_)) | Err(_) => break,
                    Ok(_) => {}
                }
            }
        });

        (port, handle)
    }

    /**
     * Full round trip through the real backend against a loopback echo
     * server: connect, send binary, receive the echo, close.
     */
    #[test]
    fn test_echo_round_trip() {
        let (port, server) = spawn_echo_server();
        let sink = Arc::new(RecordingSink::new());
        let mut client = Client::new();

        client
            .init(sink.clone(), Endpoint::stream("127.0.0.1", port, false))
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
        let _ = server.join();
        assert_eq!(sink.error_count(), 0);
    }

    /**
     * A connect against a port nobody listens on resolves into
     * `on_error("connect", ...)` plus exactly one `on_close`.
     */
    #[test]
    fn test_refused_connect_reports_error_and_close() {
        /* Bind-then-drop to get a port that is very likely unused. */
        let port = {
            let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
            listener.local_addr().expect("local addr").port()
        };

        let sink = Arc::new(RecordingSink::new());
        let mut client = Client::new();
        client
            .init(sink.clone(), Endpoint::stream("127.0.0.1", port, false))
            .expect("init should succeed");

        client.connect();
        assert!(wait_until(Duration::from_secs(10), || sink.close_count() == 1));
        assert_eq!(sink.connect_count(), 0);
        assert!(sink.error_count() >= 1);

        client.exit();
    }

    /**
     * Authority extraction handles paths, default ports, and bad ports.
     */
    #[test]
    fn test_authority_extraction() {
        assert_eq!(
            authority("ws://example.com:9000", false).expect("explicit port"),
            ("example.com".to_string(), 9000)
        );
        assert_eq!(
            authority("ws://example.com/live", false).expect("default plain"),
            ("example.com".to_string(), 80)
        );
        assert_eq!(
            authority("wss://example.com", true).expect("default secure"),
            ("example.com".to_string(), 443)
        );
        assert!(authority("ws://example.com:nope", false).is_err());
        assert!(authority("ws://", false).is_err());
    }
}
