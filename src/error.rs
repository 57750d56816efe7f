//! Error taxonomy for the handful of reactor calls that report failure to
//! the caller (spec.md §7). Everything else is absorbed locally with a log
//! entry, per the propagation policy: a lost peer manifests as
//! `peer_did_disconnect`, a refused registration manifests as `has_*`
//! returning false.

use std::io;

/// Errors returned from the small set of reactor calls that can fail
/// visibly: creating the reactor and registering a source.
#[derive(thiserror::Error, Debug)]
pub enum ReactorError {
    /// `add_X(id)` was called with an id already registered for that kind.
    #[error("id {id} is already registered as a {kind}")]
    DuplicateId { kind: &'static str, id: u16 },

    /// `add_user_event` was called with the reserved stop-wakeup id.
    #[error("id 0xFFFF is reserved for the reactor's internal stop wakeup")]
    ReservedId,

    /// A syscall failed while standing up a new registration (socket,
    /// bind, listen, epoll_ctl/kevent, timerfd_create, eventfd, ...). Any
    /// descriptor opened for the attempt has already been closed and any
    /// partial record released before this is returned.
    #[error("{operation} failed: {source}")]
    Syscall {
        operation: &'static str,
        #[source]
        source: io::Error,
    },

    /// The OS multiplexor (kqueue/epoll) itself could not be created;
    /// the reactor could not come into existence.
    #[error("failed to create backend readiness facility: {0}")]
    BackendUnavailable(#[source] io::Error),
}

pub type Result<T> = std::result::Result<T, ReactorError>;
