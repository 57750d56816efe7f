//! Basic HTTP server serving a fixed response, built directly on the
//! reactor (spec.md explicitly puts HTTP framing out of scope — this
//! demo does the bare minimum line-matching itself).
//!
//! Usage: RUST_LOG=info cargo run --example http_server
//! Test with: curl http://localhost:8080

use log::info;
use woodpecker_reactor::{Reactor, ServerDescriptor};

fn main() -> std::io::Result<()> {
    env_logger::init();

    let mut reactor: Reactor<()> = Reactor::create().map_err(std::io::Error::other)?;

    let descriptor = ServerDescriptor::new(1, 8080)
        .did_accept(Box::new(|_reactor, server_id, peer_id, addr, _ctx| {
            info!("server {server_id}: peer {peer_id} connected from {addr}");
        }))
        .did_receive_data(Box::new(|reactor, _server_id, peer_id, data, _ctx| {
            let request = String::from_utf8_lossy(data);
            let response: &[u8] = if request.starts_with("GET") {
                b"HTTP/1.1 200 OK\r\n\r\nHello World!"
            } else {
                b"HTTP/1.1 404 Not Found\r\n\r\n"
            };
            let _ = reactor.write_to_peer(peer_id, response);
        }));

    reactor
        .add_server(descriptor)
        .map_err(std::io::Error::other)?;

    reactor.run()
}
