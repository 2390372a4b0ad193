/**
 * Minimal interactive harness for the tether client.
 *
 * Point it at a server and type lines to send them:
 *
 *   cargo run -p tether_demo -- ws://127.0.0.1:9000
 *   cargo run -p tether_demo -- wss://echo.example.com
 *   cargo run -p tether_demo -- udp://127.0.0.1:9000
 *
 * `quit` (or EOF) exits.
 */
use std::io::BufRead;
use std::sync::Arc;

use tether::{Client, Endpoint, Sink};

/**
 * A sink that prints every notification. Lifecycle callbacks arrive on the
 * client's callback thread, data and errors on its transport thread — all
 * of them just print here.
 */
struct PrintSink;

impl Sink for PrintSink {
    fn on_connect(&self) {
        println!("[demo] connected");
    }

    fn on_close(&self) {
        println!("[demo] closed");
    }

    fn on_error(&self, action: &str, message: &str) {
        println!("[demo] {action} failed: {message}");
    }

    fn on_recv(&self, data: &[u8], is_binary: bool) {
        if is_binary {
            println!("[demo] received {} bytes", data.len());
        } else {
            println!("[demo] received: {}", String::from_utf8_lossy(data));
        }
    }
}

fn main() {
    let target = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "ws://127.0.0.1:9000".to_string());

    let endpoint = match Endpoint::parse(&target) {
        Ok(endpoint) => endpoint,
        Err(err) => {
            eprintln!("[demo] {err}");
            return;
        }
    };

    let mut client = Client::new();
    if let Err(err) = client.init(Arc::new(PrintSink), endpoint) {
        eprintln!("[demo] init failed: {err}");
        return;
    }

    println!("[demo] connecting to {target} — type to send, `quit` to exit");
    client.connect();

    /*
     * Reconnect policy deliberately lives out here with the caller: react
     * to `closed` however the application wants; the client only reports.
     */
    let stdin = std::io::stdin();
    for line in stdin.lock().lines() {
        let Ok(line) = line else { break };
        if line == "quit" {
            break;
        }
        if line.is_empty() {
            continue;
        }
        if !client.send(line.as_bytes()) {
            println!("[demo] send failed (not connected yet?)");
        }
    }

    client.exit();
}
