//! Echo server that sends back whatever a peer sends.
//!
//! Usage: RUST_LOG=info cargo run --example echo_server

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
            if let Err(err) = reactor.write_to_peer(peer_id, data) {
                log::warn!("server {server_id}: echo to peer {peer_id} failed: {err}");
            }
        }))
        .peer_did_disconnect(Box::new(|_reactor, server_id, peer_id, _ctx| {
            info!("server {server_id}: peer {peer_id} disconnected");
        }));

    reactor
        .add_server(descriptor)
        .map_err(std::io::Error::other)?;

    reactor.run()
}
