//! The Backend abstraction (spec.md §4.1): the narrowest contract both
//! kqueue and epoll can satisfy. Selected at compile time by target OS,
//! exactly as spec.md §9 requires ("abstract the backend behind the
//! minimal contract... resist the temptation to expose OS-specific
//! options through the reactor API").

use std::io;

use crate::record::Kind;

#[cfg(target_os = "linux")]
mod epoll;
#[cfg(target_os = "linux")]
pub(crate) use epoll::EpollBackend as PlatformBackend;

#[cfg(any(
    target_os = "macos",
    target_os = "ios",
    target_os = "freebsd",
    target_os = "openbsd",
    target_os = "netbsd",
    target_os = "dragonfly"
))]
mod kqueue;
#[cfg(any(
    target_os = "macos",
    target_os = "ios",
    target_os = "freebsd",
    target_os = "openbsd",
    target_os = "netbsd",
    target_os = "dragonfly"
))]
pub(crate) use kqueue::KqueueBackend as PlatformBackend;

/// Up to this many readiness notifications are returned by one backend
/// wait (spec.md §4.1: "a tunable batch size: small values preserve
/// fairness across kinds, since each batch drains deferred frees before
/// the next wait").
pub(crate) const BATCH_SIZE: usize = 5;

/// Opaque token attached at registration time and recovered from a
/// `SlotEvent`. Packs the kind tag and the slab slot index so the
/// dispatcher can recover the record in O(1) without a table scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Token {
    pub kind: Kind,
    pub index: u32,
}

impl Token {
    pub fn new(kind: Kind, index: u32) -> Self {
        Token { kind, index }
    }

    pub fn encode(self) -> u64 {
        let kind_bits: u64 = match self.kind {
            Kind::Server => 0,
            Kind::Peer => 1,
            Kind::Timer => 2,
            Kind::User => 3,
        };
        (kind_bits << 32) | (self.index as u64)
    }

    pub fn decode(raw: u64) -> Self {
        let kind = match raw >> 32 {
            0 => Kind::Server,
            1 => Kind::Peer,
            2 => Kind::Timer,
            _ => Kind::User,
        };
        Token {
            kind,
            index: (raw & 0xFFFF_FFFF) as u32,
        }
    }
}

/// What kind of readiness a `SlotEvent` represents (spec.md §4.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Filter {
    Read,
    Timer,
    User,
}

/// One translated readiness notification.
#[derive(Debug, Clone, Copy)]
pub(crate) struct SlotEvent {
    pub filter: Filter,
    pub eof: bool,
    pub token: Token,
}

/// The OS-specific readiness primitive. A `Reactor` owns exactly one of
/// these, selected at compile time.
pub(crate) trait Backend {
    fn wait(&mut self, timeout_ms: i64) -> io::Result<Vec<SlotEvent>>;

    fn register_read(&mut self, fd: i32, token: Token) -> io::Result<()>;
    fn unregister_read(&mut self, fd: i32) -> io::Result<()>;

    /// Registers a new periodic timer. Returns the extra descriptor the
    /// backend had to allocate to do it (epoll only — kqueue's timer
    /// filter needs no extra fd).
    fn register_timer(&mut self, token: Token, interval_ms: u64) -> io::Result<Option<i32>>;
    fn unregister_timer(&mut self, token: Token, timer_fd: Option<i32>) -> io::Result<()>;

    /// Registers a new user (wakeup) event. Returns the extra descriptor
    /// the backend had to allocate (epoll only).
    fn register_user(&mut self, token: Token) -> io::Result<Option<i32>>;
    fn trigger_user(&mut self, token: Token, event_fd: Option<i32>) -> io::Result<()>;
    fn unregister_user(&mut self, token: Token, event_fd: Option<i32>) -> io::Result<()>;

    /// Called by the dispatcher right after delivering a `Filter::Timer`
    /// event, so the backend can drain whatever accompanying descriptor
    /// it used to signal the firing (epoll: read-and-discard the 8-byte
    /// timerfd counter; kqueue: no-op, the filter is self-contained).
    fn acknowledge_timer(&mut self, timer_fd: Option<i32>) -> io::Result<()>;

    /// Called by the dispatcher right after delivering a `Filter::User`
    /// event (epoll: read-and-discard the eventfd counter; kqueue:
    /// re-arm via `EV_CLEAR` semantics, which require no action here
    /// since the kernel already cleared the filter on delivery).
    fn acknowledge_user(&mut self, event_fd: Option<i32>) -> io::Result<()>;
}

pub(crate) fn create_platform_backend() -> io::Result<PlatformBackend> {
    PlatformBackend::create()
}
