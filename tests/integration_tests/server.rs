//! Server subsystem scenarios from spec.md §8.

use std::io::{Read, Write};
use std::net::Shutdown;

use woodpecker_reactor::{Reactor, ServerDescriptor};

use crate::common::spawn_client;

#[derive(Default)]
struct Accepted {
    server_id: Option<u16>,
    peer_id: Option<u16>,
}

#[test]
fn server_accept_lifecycle_reports_server_and_peer_ids() {
    let mut reactor: Reactor<Accepted> = Reactor::create().unwrap();
    let descriptor =
        ServerDescriptor::new(1, 5355).did_accept(Box::new(|_r, server_id, peer_id, _addr, ctx| {
            ctx.server_id = Some(server_id);
            ctx.peer_id = Some(peer_id);
        }));
    reactor.add_server(descriptor).unwrap();

    let client = spawn_client(5355, |stream| {
        drop(stream);
    });

    reactor.run_once(1000).unwrap();
    client.join().unwrap();

    assert_eq!(reactor.context().server_id, Some(1));
    let peer_id = reactor.context().peer_id.expect("did_accept should have fired");
    assert_ne!(peer_id, woodpecker_reactor::RESERVED_STOP_ID);
}

#[derive(Default)]
struct ReceivedBytes {
    data: Vec<u8>,
}

#[test]
fn server_receives_exact_bytes() {
    let mut reactor: Reactor<ReceivedBytes> = Reactor::create().unwrap();
    let descriptor = ServerDescriptor::new(1, 5356).did_receive_data(Box::new(
        |_r, _server_id, _peer_id, data, ctx: &mut ReceivedBytes| {
            ctx.data.extend_from_slice(data);
        },
    ));
    reactor.add_server(descriptor).unwrap();

    let payload: [u8; 10] = [0, 1, 2, 3, 4, 5, 6, 7, 8, 9];
    let client = spawn_client(5356, move |mut stream| {
        stream.write_all(&payload).unwrap();
        // Keep the stream open until the reactor has had a chance to
        // read it; dropping immediately could race the dispatch.
        std::thread::sleep(std::time::Duration::from_millis(200));
    });

    // One dispatch for the accept, one for the data (spec.md §8
    // scenario 6: "dispatch twice").
    reactor.run_once(1000).unwrap();
    reactor.run_once(1000).unwrap();
    client.join().unwrap();

    assert_eq!(reactor.context().data, vec![0, 1, 2, 3, 4, 5, 6, 7, 8, 9]);
}

#[derive(Default)]
struct Disconnect {
    server_id: Option<u16>,
    accepted_peer_id: Option<u16>,
    disconnected_peer_id: Option<u16>,
}

#[test]
fn peer_disconnect_reports_same_peer_id_seen_at_accept() {
    let mut reactor: Reactor<Disconnect> = Reactor::create().unwrap();
    let descriptor = ServerDescriptor::new(1, 5357)
        .did_accept(Box::new(|_r, server_id, peer_id, _addr, ctx: &mut Disconnect| {
            ctx.server_id = Some(server_id);
            ctx.accepted_peer_id = Some(peer_id);
        }))
        .peer_did_disconnect(Box::new(|_r, server_id, peer_id, ctx: &mut Disconnect| {
            ctx.server_id = Some(server_id);
            ctx.disconnected_peer_id = Some(peer_id);
        }));
    reactor.add_server(descriptor).unwrap();

    let client = spawn_client(5357, |stream| {
        stream.shutdown(Shutdown::Both).unwrap();
    });

    reactor.run_once(1000).unwrap();
    reactor.run_once(1000).unwrap();
    client.join().unwrap();

    assert_eq!(reactor.context().server_id, Some(1));
    assert_eq!(
        reactor.context().disconnected_peer_id,
        reactor.context().accepted_peer_id
    );
}

#[test]
fn echoed_bytes_round_trip_through_write_to_peer() {
    let mut reactor: Reactor<()> = Reactor::create().unwrap();
    let descriptor = ServerDescriptor::new(1, 5358).did_receive_data(Box::new(
        |r, _server_id, peer_id, data, _ctx| {
            let _ = r.write_to_peer(peer_id, data);
        },
    ));
    reactor.add_server(descriptor).unwrap();

    let (tx, rx) = std::sync::mpsc::channel();
    let client = spawn_client(5358, move |mut stream| {
        stream.write_all(b"ping").unwrap();
        let mut buf = [0u8; 4];
        stream.read_exact(&mut buf).unwrap();
        tx.send(buf).unwrap();
    });

    reactor.run_once(1000).unwrap(); // accept
    reactor.run_once(1000).unwrap(); // read + echo write
    client.join().unwrap();

    assert_eq!(&rx.recv().unwrap(), b"ping");
}

#[test]
fn removing_a_server_closes_its_peers() {
    let mut reactor: Reactor<()> = Reactor::create().unwrap();
    reactor.add_server(ServerDescriptor::new(1, 5359)).unwrap();

    let client = spawn_client(5359, |stream| {
        std::thread::sleep(std::time::Duration::from_millis(200));
        drop(stream);
    });

    reactor.run_once(1000).unwrap();
    assert_eq!(reactor.peer_ids_for_server(1).len(), 1);

    reactor.remove_server(1);
    assert!(!reactor.has_server(1));
    assert!(
        reactor.peer_ids_for_server(1).is_empty(),
        "remove_server must drop every peer it owns before deactivating itself"
    );

    client.join().unwrap();
}
