//! Event records: the kind-tagged, reactor-owned state behind every
//! registered source (spec.md §3 "Event record" / "Data model").
//!
//! Callbacks are stored as `Option<Box<dyn FnMut(...)>>` rather than called
//! through a raw context pointer (spec.md §9 design note: "the context
//! pointer then disappears into the closure environment"). The `Option`
//! wrapper lets the dispatcher temporarily take a callback out of its
//! record before invoking it — necessary because invoking the callback
//! needs `&mut Reactor<C>`, which would otherwise alias the `&mut self`
//! borrow already reaching into the record that holds the callback.

use std::net::{SocketAddr, TcpListener, TcpStream};

use crate::reactor::Reactor;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Kind {
    Server,
    Peer,
    Timer,
    User,
}

impl Kind {
    pub(crate) fn as_str(self) -> &'static str {
        match self {
            Kind::Server => "server",
            Kind::Peer => "peer",
            Kind::Timer => "timer",
            Kind::User => "user event",
        }
    }
}

pub type ShouldAccept<C> = Box<dyn FnMut(&mut Reactor<C>, u16, SocketAddr, &mut C) -> bool>;
pub type DidAccept<C> = Box<dyn FnMut(&mut Reactor<C>, u16, u16, SocketAddr, &mut C)>;
pub type DidReceiveData<C> = Box<dyn FnMut(&mut Reactor<C>, u16, u16, &[u8], &mut C)>;
pub type PeerDidDisconnect<C> = Box<dyn FnMut(&mut Reactor<C>, u16, u16, &mut C)>;
pub type TimerFired<C> = Box<dyn FnMut(&mut Reactor<C>, u16, &mut C)>;
pub type UserEventFired<C> = Box<dyn FnMut(&mut Reactor<C>, u16, &mut C)>;

/// Receive buffer size for peer reads (spec.md §3: "a heap-allocated
/// receive buffer (1024 bytes)").
pub const PEER_BUFFER_SIZE: usize = 1024;

/// Descriptor passed to `add_server`. The four callbacks are all optional,
/// per spec.md §3.
pub struct ServerDescriptor<C> {
    pub id: u16,
    pub port: u16,
    pub should_accept: Option<ShouldAccept<C>>,
    pub did_accept: Option<DidAccept<C>>,
    pub did_receive_data: Option<DidReceiveData<C>>,
    pub peer_did_disconnect: Option<PeerDidDisconnect<C>>,
}

impl<C> ServerDescriptor<C> {
    pub fn new(id: u16, port: u16) -> Self {
        ServerDescriptor {
            id,
            port,
            should_accept: None,
            did_accept: None,
            did_receive_data: None,
            peer_did_disconnect: None,
        }
    }

    pub fn should_accept(mut self, cb: ShouldAccept<C>) -> Self {
        self.should_accept = Some(cb);
        self
    }

    pub fn did_accept(mut self, cb: DidAccept<C>) -> Self {
        self.did_accept = Some(cb);
        self
    }

    pub fn did_receive_data(mut self, cb: DidReceiveData<C>) -> Self {
        self.did_receive_data = Some(cb);
        self
    }

    pub fn peer_did_disconnect(mut self, cb: PeerDidDisconnect<C>) -> Self {
        self.peer_did_disconnect = Some(cb);
        self
    }
}

pub(crate) struct ServerPayload<C> {
    pub listener: TcpListener,
    pub port: u16,
    pub should_accept: Option<ShouldAccept<C>>,
    pub did_accept: Option<DidAccept<C>>,
    pub did_receive_data: Option<DidReceiveData<C>>,
    pub peer_did_disconnect: Option<PeerDidDisconnect<C>>,
}

/// A peer's `didReceiveData`/`peerDidDisconnect` callbacks are "inherited
/// at accept time" (spec.md §3) from its owning server. Since `FnMut`
/// closures aren't `Clone`, that inheritance is realized here as a
/// lookup by `server_id` back into the server's own boxed closures at
/// dispatch time, rather than a literal per-peer copy — there is still
/// exactly one closure per server, invoked once per matching peer event.
pub(crate) struct PeerPayload {
    pub stream: TcpStream,
    pub server_id: u16,
    pub buffer: Option<Vec<u8>>,
}

pub(crate) struct TimerPayload<C> {
    pub interval_ms: u64,
    pub timer_fired: Option<TimerFired<C>>,
    /// Only populated on the epoll backend; kqueue carries the interval
    /// in the kernel filter itself and consumes no extra descriptor.
    pub timer_fd: Option<i32>,
}

pub(crate) struct UserPayload<C> {
    pub user_event_fired: Option<UserEventFired<C>>,
    /// Only populated on the epoll backend.
    pub event_fd: Option<i32>,
}

/// One registered source. Holds the kind, the caller-supplied id, the
/// active/deactivation-pending flags required by spec.md's ownership
/// invariant 4, and a kind-specific payload.
///
/// Spec.md describes one tagged-union record type for all four kinds;
/// here each of the four registries is monomorphized over its own
/// concrete payload type (`ServerPayload<C>`, `PeerPayload`, ...)
/// instead of matching on an enum on every access — the kind is already
/// known from which registry a slot lives in, and each registry's
/// `Backend` token carries the kind tag needed to route a `SlotEvent`
/// back to the right registry in the first place. `kind` is kept on the
/// record itself anyway since it's free and useful for logging.
pub(crate) struct Slot<T> {
    pub kind: Kind,
    pub id: u16,
    pub active: bool,
    pub deactivation_pending: bool,
    pub payload: T,
}

impl<T> Slot<T> {
    pub fn new(kind: Kind, id: u16, payload: T) -> Self {
        Slot {
            kind,
            id,
            active: true,
            deactivation_pending: false,
            payload,
        }
    }

    pub fn skip_in_dispatch(&self) -> bool {
        !self.active || self.deactivation_pending
    }
}
