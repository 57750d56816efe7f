//! Shared test helpers, in the teacher's style: real loopback sockets
//! driven from a background thread, no mocking (spec.md §8 scenarios are
//! written the same way — a worker thread opens the socket, the test
//! thread drives the reactor with `run_once`).

use std::net::TcpStream;
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Connects to `127.0.0.1:<port>` on a background thread and runs
/// `action` against the stream once connected. Gives the reactor's
/// listening socket a short head start so the connect doesn't race
/// `add_server`.
pub fn spawn_client(port: u16, action: impl FnOnce(TcpStream) + Send + 'static) -> JoinHandle<()> {
    thread::spawn(move || {
        thread::sleep(Duration::from_millis(50));
        let stream = TcpStream::connect(("127.0.0.1", port)).expect("client connect");
        action(stream);
    })
}
