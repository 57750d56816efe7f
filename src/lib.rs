//! A portable, single-threaded reactor multiplexing interval timers,
//! user-triggered wakeups, and TCP listening servers/peers over kqueue
//! (BSD/Darwin) or epoll (Linux), selected at compile time.
//!
//! The public surface is [`Reactor`]: create one, register servers,
//! timers, and user events, then call [`Reactor::run`]. Everything else
//! in this crate — [`config`], [`controller`], [`logging`] — is ambient
//! application plumbing built on top of the reactor's public API, not a
//! dependency the reactor itself carries.

mod backend;
pub mod config;
pub mod controller;
pub mod error;
pub mod logging;
mod reactor;
mod record;
mod registry;
mod server;

pub use error::{ReactorError, Result};
pub use reactor::{Reactor, RESERVED_STOP_ID};
pub use record::{
    DidAccept, DidReceiveData, Kind, PeerDidDisconnect, ServerDescriptor, ShouldAccept,
    TimerFired, UserEventFired, PEER_BUFFER_SIZE,
};
