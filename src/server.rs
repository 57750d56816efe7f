//! Server subsystem (spec.md §4.4): accept loop, peer lifecycle,
//! non-blocking reads, disconnect detection.
//!
//! `std::net::TcpListener`/`TcpStream` already give non-blocking
//! sockets, bind, and listen without hand-rolled `socket`/`bind`/`listen`
//! FFI, matching the teacher crate's choice to build `BroadCastSrv` and
//! `EpollServer` directly on `std::net` rather than raw sockets — the
//! parts of the syscall surface this crate hand-rolls (`src/backend/`)
//! are exactly the parts `std` doesn't expose (epoll/kqueue, timerfd,
//! eventfd). `std`'s listener does not let a caller pick the backlog
//! explicitly, so `listen(SOMAXCONN)` from spec.md §6 is the platform
//! default backlog rather than an explicit syscall argument — noted in
//! DESIGN.md.

use std::io::{self, ErrorKind, Read, Write};
use std::net::TcpListener;
use std::os::fd::AsRawFd;

use log::{debug, error, info, warn};

use crate::backend::{Backend, Token};
use crate::error::{ReactorError, Result};
use crate::record::ServerDescriptor;
use crate::record::{Kind, PeerPayload, Slot, PEER_BUFFER_SIZE};
use crate::reactor::{Reactor, ServerPayload};

impl<C: Default> Reactor<C> {
    pub fn has_server(&self, id: u16) -> bool {
        self.servers.contains(id)
    }

    /// Binds `127.0.0.1:<port>` non-blocking and registers it for read
    /// readiness. On any failure the fd is closed and the record released
    /// before returning (spec.md §7, error #2).
    pub fn add_server(&mut self, descriptor: ServerDescriptor<C>) -> Result<()> {
        let ServerDescriptor {
            id,
            port,
            should_accept,
            did_accept,
            did_receive_data,
            peer_did_disconnect,
        } = descriptor;

        if self.servers.contains(id) {
            warn!("duplicate server registration rejected: id={id}");
            return Err(ReactorError::DuplicateId { kind: Kind::Server.as_str(), id });
        }

        let listener =
            TcpListener::bind(("127.0.0.1", port)).map_err(|source| ReactorError::Syscall {
                operation: "bind listening socket",
                source,
            })?;
        if let Err(source) = listener.set_nonblocking(true) {
            return Err(ReactorError::Syscall {
                operation: "set listener non-blocking",
                source,
            });
        }

        let payload = ServerPayload {
            listener,
            port,
            should_accept,
            did_accept,
            did_receive_data,
            peer_did_disconnect,
        };
        let idx = self
            .servers
            .insert(id, Slot::new(Kind::Server, id, payload))
            .expect("duplicate already checked above");

        let fd = self
            .servers
            .get(idx)
            .expect("just inserted")
            .payload
            .listener
            .as_raw_fd();
        let token = Token::new(Kind::Server, idx);
        if let Err(source) = self.backend.register_read(fd, token) {
            self.servers.forget_id(id);
            self.servers.free_slot(idx);
            return Err(ReactorError::Syscall {
                operation: "register listening socket",
                source,
            });
        }

        Ok(())
    }

    /// Drops every peer owned by this server (spec.md ownership invariant
    /// 3: "removing a server closes all its peers before deactivating
    /// itself"), then unregisters and deactivates the server itself.
    /// Idempotent: a no-op if `id` is absent (spec.md §8).
    pub fn remove_server(&mut self, id: u16) {
        let Some(server_idx) = self.servers.forget_id(id) else {
            return;
        };

        let peer_ids: Vec<u16> = self
            .peers
            .iter()
            .filter(|(_, slot)| slot.payload.server_id == id)
            .map(|(_, slot)| slot.id)
            .collect();
        for peer_id in peer_ids {
            // Same steps as a disconnect, minus the disconnect callback.
            if let Some(peer_idx) = self.peers.forget_id(peer_id) {
                if let Some(slot) = self.peers.get_mut(peer_idx) {
                    slot.active = false;
                    slot.deactivation_pending = true;
                }
                self.deferred_free.push((Kind::Peer, peer_idx));
            }
        }

        let fd = self
            .servers
            .get(server_idx)
            .map(|s| s.payload.listener.as_raw_fd());
        if let Some(fd) = fd {
            // This deletes the *read* registration for the listening fd.
            // (spec.md §9: a historical variant posted an EVFILT_USER
            // delete here instead, a latent bug this crate does not
            // reproduce.)
            if let Err(err) = self.backend.unregister_read(fd) {
                warn!("failed to unregister listening socket id={id}: {err}");
            }
        }

        if let Some(slot) = self.servers.get_mut(server_idx) {
            slot.active = false;
            slot.deactivation_pending = true;
        }
        self.deferred_free.push((Kind::Server, server_idx));
    }

    pub(crate) fn handle_server_readable(&mut self, server_idx: u32) {
        let Some(server_slot) = self.servers.get_mut(server_idx) else {
            return;
        };
        let server_id = server_slot.id;

        let accepted = server_slot.payload.listener.accept();
        let (stream, addr) = match accepted {
            Ok(pair) => pair,
            Err(err) if err.kind() == ErrorKind::WouldBlock => return,
            Err(err) => {
                // A racing hangup between readiness and accept; log and
                // ignore (spec.md §4.4 step 1).
                debug!("accept() on server id={server_id} failed: {err}");
                return;
            }
        };

        let mut should_accept_cb = self
            .servers
            .get_mut(server_idx)
            .and_then(|s| s.payload.should_accept.take());
        let allow = if let Some(cb) = should_accept_cb.as_mut() {
            let mut context = std::mem::take(&mut self.context);
            let allow = cb(self, server_id, addr, &mut context);
            self.context = context;
            allow
        } else {
            true
        };
        if let Some(slot) = self.servers.get_mut(server_idx) {
            slot.payload.should_accept = should_accept_cb;
        }

        if !allow {
            drop(stream);
            return;
        }

        if let Err(err) = stream.set_nonblocking(true) {
            error!("failed to set peer non-blocking: {err}");
            return;
        }

        let peer_id = self.allocate_peer_id();
        let fd = stream.as_raw_fd();
        let payload = PeerPayload {
            stream,
            server_id,
            buffer: None,
        };
        let peer_idx = match self
            .peers
            .insert(peer_id, Slot::new(Kind::Peer, peer_id, payload))
        {
            Some(idx) => idx,
            None => {
                error!("peer id allocator produced a colliding id {peer_id}");
                return;
            }
        };

        let token = Token::new(Kind::Peer, peer_idx);
        if let Err(err) = self.backend.register_read(fd, token) {
            error!("failed to register accepted peer: {err}");
            self.peers.forget_id(peer_id);
            self.peers.free_slot(peer_idx);
            return;
        }

        let mut did_accept_cb = self
            .servers
            .get_mut(server_idx)
            .and_then(|s| s.payload.did_accept.take());
        if let Some(cb) = did_accept_cb.as_mut() {
            let mut context = std::mem::take(&mut self.context);
            cb(self, server_id, peer_id, addr, &mut context);
            self.context = context;
        }
        if let Some(slot) = self.servers.get_mut(server_idx) {
            slot.payload.did_accept = did_accept_cb;
        }
    }

    pub(crate) fn handle_peer_readable(&mut self, peer_idx: u32) {
        let Some(peer_slot) = self.peers.get_mut(peer_idx) else {
            return;
        };
        let peer_id = peer_slot.id;
        let server_id = peer_slot.payload.server_id;

        if peer_slot.payload.buffer.is_none() {
            peer_slot.payload.buffer = Some(vec![0u8; PEER_BUFFER_SIZE]);
        }

        let mut buffer = peer_slot.payload.buffer.take().expect("just populated");
        let read_result = peer_slot.payload.stream.read(&mut buffer);

        match read_result {
            Ok(0) => {
                if let Some(slot) = self.peers.get_mut(peer_idx) {
                    slot.payload.buffer = Some(buffer);
                }
                self.handle_peer_disconnect(peer_idx);
            }
            Ok(n) => {
                let data = buffer[..n].to_vec();
                if let Some(slot) = self.peers.get_mut(peer_idx) {
                    slot.payload.buffer = Some(buffer);
                }
                self.invoke_did_receive_data(server_id, peer_id, &data);
            }
            Err(err) if err.kind() == ErrorKind::WouldBlock => {
                if let Some(slot) = self.peers.get_mut(peer_idx) {
                    slot.payload.buffer = Some(buffer);
                }
            }
            Err(err) => {
                debug!("read error on peer id={peer_id}: {err}, dropping peer");
                if let Some(slot) = self.peers.get_mut(peer_idx) {
                    slot.payload.buffer = Some(buffer);
                }
                self.handle_peer_disconnect(peer_idx);
            }
        }
    }

    /// Peers inherit `didReceiveData`/`peerDidDisconnect` from their
    /// owning server at accept time (spec.md §3); realized here as a
    /// lookup-by-`server_id` back into the server's own boxed closure
    /// (see the doc comment on `PeerPayload`).
    fn invoke_did_receive_data(&mut self, server_id: u16, peer_id: u16, data: &[u8]) {
        let Some(server_idx) = self.servers.index_of(server_id) else {
            return;
        };
        let mut callback = self
            .servers
            .get_mut(server_idx)
            .and_then(|s| s.payload.did_receive_data.take());
        let Some(cb) = callback.as_mut() else {
            return;
        };

        let mut context = std::mem::take(&mut self.context);
        cb(self, server_id, peer_id, data, &mut context);
        self.context = context;

        if let Some(slot) = self.servers.get_mut(server_idx) {
            slot.payload.did_receive_data = callback;
        }
    }

    pub(crate) fn handle_peer_disconnect(&mut self, peer_idx: u32) {
        let Some(peer_id) = self.peers.get(peer_idx).map(|s| s.id) else {
            return;
        };
        let server_id = self
            .peers
            .get(peer_idx)
            .map(|s| s.payload.server_id)
            .unwrap_or_default();

        self.peers.forget_id(peer_id);

        if let Some(server_idx) = self.servers.index_of(server_id) {
            let mut callback = self
                .servers
                .get_mut(server_idx)
                .and_then(|s| s.payload.peer_did_disconnect.take());
            if let Some(cb) = callback.as_mut() {
                let mut context = std::mem::take(&mut self.context);
                cb(self, server_id, peer_id, &mut context);
                self.context = context;
            }
            if let Some(slot) = self.servers.get_mut(server_idx) {
                slot.payload.peer_did_disconnect = callback;
            }
        }

        if let Some(slot) = self.peers.get_mut(peer_idx) {
            slot.active = false;
            slot.deactivation_pending = true;
        }
        self.deferred_free.push((Kind::Peer, peer_idx));
        info!("peer id={peer_id} on server id={server_id} disconnected");
    }

    /// Writes `data` to one accepted peer's socket. Outbound write
    /// readiness is out of scope (spec.md §9: "declared in callback types
    /// but never wired") — this writes directly against the non-blocking
    /// socket and surfaces `WouldBlock` to the caller rather than
    /// buffering or waiting for an event.
    pub fn write_to_peer(&mut self, peer_id: u16, data: &[u8]) -> io::Result<usize> {
        let Some(slot) = self.peers.get_by_id_mut(peer_id) else {
            return Err(io::Error::new(ErrorKind::NotFound, "unknown peer id"));
        };
        slot.payload.stream.write(data)
    }

    /// Ids of every peer currently owned by `server_id`, in slab order.
    pub fn peer_ids_for_server(&self, server_id: u16) -> Vec<u16> {
        self.peers
            .iter()
            .filter(|(_, slot)| slot.payload.server_id == server_id && !slot.skip_in_dispatch())
            .map(|(_, slot)| slot.id)
            .collect()
    }

    /// Writes `data` to every peer currently owned by `server_id`,
    /// skipping (and logging) any individual peer whose write fails.
    pub fn broadcast_to_server(&mut self, server_id: u16, data: &[u8]) {
        for peer_id in self.peer_ids_for_server(server_id) {
            if let Err(err) = self.write_to_peer(peer_id, data) {
                if err.kind() != ErrorKind::WouldBlock {
                    debug!("broadcast write to peer id={peer_id} failed: {err}");
                }
            }
        }
    }

    pub(crate) fn allocate_peer_id(&mut self) -> u16 {
        loop {
            let candidate = self.next_peer_id;
            self.next_peer_id = self.next_peer_id.wrapping_add(1);
            if candidate != crate::reactor::RESERVED_STOP_ID && !self.peers.contains(candidate) {
                return candidate;
            }
        }
    }
}
