//! Real-time chat server that broadcasts every received message to all
//! connected peers.
//!
//! Usage: RUST_LOG=info cargo run --example broadcast_server
//! Connect with: telnet localhost 8080

use log::info;
use woodpecker_reactor::{Reactor, ServerDescriptor};

fn main() -> std::io::Result<()> {
    env_logger::init();

    let mut reactor: Reactor<()> = Reactor::create().map_err(std::io::Error::other)?;

    let descriptor = ServerDescriptor::new(1, 8080)
        .did_accept(Box::new(|_reactor, server_id, peer_id, addr, _ctx| {
            info!("server {server_id}: peer {peer_id} connected from {addr}");
        }))
        .did_receive_data(Box::new(|reactor, server_id, peer_id, data, _ctx| {
            let message = format!("[peer_{peer_id}] {}", String::from_utf8_lossy(data));
            reactor.broadcast_to_server(server_id, message.as_bytes());
        }))
        .peer_did_disconnect(Box::new(|_reactor, server_id, peer_id, _ctx| {
            info!("server {server_id}: peer {peer_id} disconnected");
        }));

    reactor
        .add_server(descriptor)
        .map_err(std::io::Error::other)?;

    reactor.run()
}
