//! The reactor itself: the `run`/`run_once` dispatch loop (spec.md §4.3),
//! timers (§4.5), user events (§4.6), stop (§4.7), and the context pointer
//! (§4.8, realized here as a generic `C` rather than a raw pointer — see
//! DESIGN.md). Server/peer registration and the accept/read/disconnect
//! paths live in `server.rs` as an additional `impl` block on `Reactor`.

use std::io;

use log::{debug, warn};

use crate::backend::{create_platform_backend, Backend, Filter, PlatformBackend, Token};
use crate::error::{ReactorError, Result};
use crate::record::{Kind, Slot, TimerFired, TimerPayload, UserEventFired, UserPayload};
use crate::registry::KindRegistry;

pub(crate) use crate::record::{PeerPayload, ServerPayload};

/// Reserved id for the internal stop wakeup (spec.md §3: "The value
/// `0xFFFF` is reserved for the internal stop wakeup").
pub const RESERVED_STOP_ID: u16 = 0xFFFF;

/// The event loop. Generic over `C`, the type of the single shared
/// callback context threaded to every callback (spec.md §4.8).
pub struct Reactor<C = ()> {
    pub(crate) backend: PlatformBackend,
    pub(crate) servers: KindRegistry<Slot<ServerPayload<C>>>,
    pub(crate) peers: KindRegistry<Slot<PeerPayload>>,
    pub(crate) timers: KindRegistry<Slot<TimerPayload<C>>>,
    pub(crate) users: KindRegistry<Slot<UserPayload<C>>>,
    pub(crate) deferred_free: Vec<(Kind, u32)>,
    pub(crate) next_peer_id: u16,
    keep_running: bool,
    context: C,
}

impl<C: Default> Reactor<C> {
    /// Opens the OS multiplexor and wires up the reserved stop wakeup.
    /// Fails fatally on error (spec.md §7, error #5).
    pub fn create() -> Result<Self> {
        let backend = create_platform_backend().map_err(ReactorError::BackendUnavailable)?;

        let mut reactor = Reactor {
            backend,
            servers: KindRegistry::new(),
            peers: KindRegistry::new(),
            timers: KindRegistry::new(),
            users: KindRegistry::new(),
            deferred_free: Vec::new(),
            next_peer_id: 0,
            keep_running: true,
            context: C::default(),
        };

        reactor
            .add_user_event_unchecked(RESERVED_STOP_ID, Some(Box::new(|r: &mut Reactor<C>, _id, _ctx: &mut C| {
                r.keep_running = false;
            })))
            .map_err(|e| ReactorError::Syscall {
                operation: "register internal stop wakeup",
                source: io::Error::other(e.to_string()),
            })?;

        Ok(reactor)
    }

    /// Closes every source still registered and releases the backend
    /// (spec.md §6: `create() / destroy()`). Consuming `self` and letting
    /// it fall out of scope is enough to run `Drop`, which does the actual
    /// teardown; this method exists only to give that teardown an
    /// explicit, discoverable name matching the spec's external interface.
    pub fn destroy(self) {}

    /// Sets the single shared context threaded to every callback.
    /// Ownership of the pointee is the caller's in spirit — in this
    /// generic realization the reactor simply stores the value by value
    /// and hands out `&mut C` for the duration of each callback.
    pub fn set_callback_context(&mut self, context: C) {
        self.context = context;
    }

    pub fn context(&self) -> &C {
        &self.context
    }

    pub fn context_mut(&mut self) -> &mut C {
        &mut self.context
    }

    /// `run_once(-1)` in a loop until `stop()` triggers the reserved user
    /// event (spec.md §4.3).
    pub fn run(&mut self) -> io::Result<()> {
        while self.keep_running {
            self.run_once(-1)?;
        }
        Ok(())
    }

    /// Blocks on the backend up to `timeout_ms` (-1 = indefinite, 0 =
    /// poll), translates readiness into typed dispatch, then drains the
    /// deferred-free list.
    pub fn run_once(&mut self, timeout_ms: i64) -> io::Result<()> {
        let batch = self.backend.wait(timeout_ms)?;
        debug!("run_once: dispatching {} event(s)", batch.len());
        for slot_event in batch {
            self.dispatch_one(slot_event);
        }
        self.drain_deferred();
        Ok(())
    }

    /// Triggers the reserved stop wakeup. Safe to call from any callback
    /// on the reactor thread (spec.md §4.7) — it never races the dispatch
    /// loop because it only flips `keep_running` on the next wakeup.
    pub fn stop(&mut self) {
        self.trigger_user_event(RESERVED_STOP_ID);
    }

    fn dispatch_one(&mut self, event: crate::backend::SlotEvent) {
        let idx = event.token.index;
        match (event.filter, event.token.kind) {
            (Filter::Read, Kind::Server) => {
                if self.servers.get(idx).is_none_or(|s| s.skip_in_dispatch()) {
                    return;
                }
                self.handle_server_readable(idx);
            }
            (Filter::Read, Kind::Peer) => {
                if self.peers.get(idx).is_none_or(|s| s.skip_in_dispatch()) {
                    return;
                }
                if event.eof {
                    self.handle_peer_disconnect(idx);
                } else {
                    self.handle_peer_readable(idx);
                }
            }
            (Filter::Timer, Kind::Timer) => {
                if self.timers.get(idx).is_none_or(|s| s.skip_in_dispatch()) {
                    return;
                }
                let timer_fd = self.timers.get(idx).and_then(|s| s.payload.timer_fd);
                if let Err(err) = self.backend.acknowledge_timer(timer_fd) {
                    warn!("failed to acknowledge timer fd: {err}");
                }
                self.invoke_timer_fired(idx);
            }
            (Filter::User, Kind::User) => {
                if self.users.get(idx).is_none_or(|s| s.skip_in_dispatch()) {
                    return;
                }
                let event_fd = self.users.get(idx).and_then(|s| s.payload.event_fd);
                if let Err(err) = self.backend.acknowledge_user(event_fd) {
                    warn!("failed to acknowledge user event fd: {err}");
                }
                self.invoke_user_event_fired(idx);
            }
            (filter, kind) => {
                // spec.md §7 error #4: unexpected filter returned by the
                // backend for this token's kind. Log and skip; the source
                // is left untouched for the next wait.
                warn!("unexpected filter {filter:?} for {kind:?} token, skipping");
            }
        }
    }

    fn invoke_timer_fired(&mut self, idx: u32) {
        let Some(slot) = self.timers.get_mut(idx) else {
            return;
        };
        let id = slot.id;
        let Some(mut callback) = slot.payload.timer_fired.take() else {
            return;
        };

        let mut context = std::mem::take(&mut self.context);
        callback(self, id, &mut context);
        self.context = context;

        if let Some(slot) = self.timers.get_mut(idx) {
            slot.payload.timer_fired = Some(callback);
        }
    }

    fn invoke_user_event_fired(&mut self, idx: u32) {
        let Some(slot) = self.users.get_mut(idx) else {
            return;
        };
        let id = slot.id;
        let Some(mut callback) = slot.payload.user_event_fired.take() else {
            return;
        };

        let mut context = std::mem::take(&mut self.context);
        callback(self, id, &mut context);
        self.context = context;

        if let Some(slot) = self.users.get_mut(idx) {
            slot.payload.user_event_fired = Some(callback);
        }
    }

    /// Drains the deferred-free list: closes any owned descriptors that
    /// weren't already closed by their specific `remove_*` call, and
    /// releases the slab slot (spec.md §4.3 step 3).
    fn drain_deferred(&mut self) {
        if self.deferred_free.is_empty() {
            return;
        }
        for (kind, idx) in std::mem::take(&mut self.deferred_free) {
            match kind {
                Kind::Server => {
                    self.servers.free_slot(idx);
                }
                Kind::Peer => {
                    self.peers.free_slot(idx);
                }
                Kind::Timer => {
                    self.timers.free_slot(idx);
                }
                Kind::User => {
                    self.users.free_slot(idx);
                }
            }
        }
    }

    // -- Timers (spec.md §4.5) --------------------------------------

    pub fn has_timer(&self, id: u16) -> bool {
        self.timers.contains(id)
    }

    pub fn add_timer(
        &mut self,
        id: u16,
        interval_ms: u64,
        callback: Option<TimerFired<C>>,
    ) -> Result<()> {
        if self.timers.contains(id) {
            warn!("duplicate timer registration rejected: id={id}");
            return Err(ReactorError::DuplicateId { kind: Kind::Timer.as_str(), id });
        }

        let payload = TimerPayload {
            interval_ms,
            timer_fired: callback,
            timer_fd: None,
        };
        let idx = self
            .timers
            .insert(id, Slot::new(Kind::Timer, id, payload))
            .expect("duplicate already checked above");

        let token = Token::new(Kind::Timer, idx);
        match self.backend.register_timer(token, interval_ms) {
            Ok(timer_fd) => {
                if let Some(slot) = self.timers.get_mut(idx) {
                    slot.payload.timer_fd = timer_fd;
                }
                Ok(())
            }
            Err(source) => {
                self.timers.forget_id(id);
                self.timers.free_slot(idx);
                Err(ReactorError::Syscall {
                    operation: "register timer",
                    source,
                })
            }
        }
    }

    /// Idempotent: a no-op if `id` is absent (spec.md §8).
    pub fn remove_timer(&mut self, id: u16) {
        let Some(idx) = self.timers.forget_id(id) else {
            return;
        };
        let timer_fd = self.timers.get(idx).and_then(|s| s.payload.timer_fd);
        let token = Token::new(Kind::Timer, idx);
        if let Err(err) = self.backend.unregister_timer(token, timer_fd) {
            warn!("failed to unregister timer id={id}: {err}");
        }
        if let Some(slot) = self.timers.get_mut(idx) {
            slot.active = false;
            slot.deactivation_pending = true;
        }
        self.deferred_free.push((Kind::Timer, idx));
    }

    // -- User events (spec.md §4.6) ----------------------------------

    pub fn has_user_event(&self, id: u16) -> bool {
        self.users.contains(id)
    }

    pub fn add_user_event(&mut self, id: u16, callback: Option<UserEventFired<C>>) -> Result<()> {
        if id == RESERVED_STOP_ID {
            warn!("rejected attempt to register the reserved stop wakeup id");
            return Err(ReactorError::ReservedId);
        }
        self.add_user_event_unchecked(id, callback)
    }

    pub(crate) fn add_user_event_unchecked(
        &mut self,
        id: u16,
        callback: Option<UserEventFired<C>>,
    ) -> Result<()> {
        if self.users.contains(id) {
            warn!("duplicate user event registration rejected: id={id}");
            return Err(ReactorError::DuplicateId {
                kind: Kind::User.as_str(),
                id,
            });
        }

        let payload = UserPayload {
            user_event_fired: callback,
            event_fd: None,
        };
        let idx = self
            .users
            .insert(id, Slot::new(Kind::User, id, payload))
            .expect("duplicate already checked above");

        let token = Token::new(Kind::User, idx);
        match self.backend.register_user(token) {
            Ok(event_fd) => {
                if let Some(slot) = self.users.get_mut(idx) {
                    slot.payload.event_fd = event_fd;
                }
                Ok(())
            }
            Err(source) => {
                self.users.forget_id(id);
                self.users.free_slot(idx);
                Err(ReactorError::Syscall {
                    operation: "register user event",
                    source,
                })
            }
        }
    }

    /// Idempotent: a no-op if `id` is absent (spec.md §8).
    pub fn remove_user_event(&mut self, id: u16) {
        let Some(idx) = self.users.forget_id(id) else {
            return;
        };
        let event_fd = self.users.get(idx).and_then(|s| s.payload.event_fd);
        let token = Token::new(Kind::User, idx);
        if let Err(err) = self.backend.unregister_user(token, event_fd) {
            warn!("failed to unregister user event id={id}: {err}");
        }
        if let Some(slot) = self.users.get_mut(idx) {
            slot.active = false;
            slot.deactivation_pending = true;
        }
        self.deferred_free.push((Kind::User, idx));
    }

    /// Coalescing: N consecutive triggers between two dispatches produce
    /// exactly one callback invocation, since the kernel-level user
    /// filter (kqueue `EVFILT_USER`/epoll `eventfd`) itself coalesces.
    pub fn trigger_user_event(&mut self, id: u16) {
        let Some(idx) = self.users.index_of(id) else {
            warn!("trigger_user_event on unregistered id={id}");
            return;
        };
        let event_fd = self.users.get(idx).and_then(|s| s.payload.event_fd);
        let token = Token::new(Kind::User, idx);
        if let Err(err) = self.backend.trigger_user(token, event_fd) {
            warn!("failed to trigger user event id={id}: {err}");
        }
    }
}

/// Closes every file descriptor the reactor still owns (spec.md §6
/// `destroy()`; ownership invariant 2: "every owned file descriptor is
/// closed exactly once, on deactivation"). Listening sockets and peer
/// streams close themselves via `TcpListener`/`TcpStream`'s own `Drop`,
/// and the backend's own `Drop` (`src/backend/epoll.rs`,
/// `src/backend/kqueue.rs`) closes the epoll/kqueue fd itself; what's
/// left is the extra descriptor the epoll backend allocates per timer
/// (`timerfd`) and per user event (`eventfd`) — including the reserved
/// stop wakeup `Reactor::create` registers for every reactor. Sources
/// already removed via `remove_timer`/`remove_user_event`
/// (`deactivation_pending`) were already closed there and are skipped
/// here to avoid closing the same descriptor twice.
impl<C> Drop for Reactor<C> {
    fn drop(&mut self) {
        let timer_idxs: Vec<u32> = self
            .timers
            .iter()
            .filter(|(_, slot)| !slot.deactivation_pending)
            .map(|(idx, _)| idx)
            .collect();
        for idx in timer_idxs {
            let timer_fd = self.timers.get(idx).and_then(|s| s.payload.timer_fd);
            let token = Token::new(Kind::Timer, idx);
            if let Err(err) = self.backend.unregister_timer(token, timer_fd) {
                warn!("failed to unregister timer during teardown: {err}");
            }
        }

        let user_idxs: Vec<u32> = self
            .users
            .iter()
            .filter(|(_, slot)| !slot.deactivation_pending)
            .map(|(idx, _)| idx)
            .collect();
        for idx in user_idxs {
            let event_fd = self.users.get(idx).and_then(|s| s.payload.event_fd);
            let token = Token::new(Kind::User, idx);
            if let Err(err) = self.backend.unregister_user(token, event_fd) {
                warn!("failed to unregister user event during teardown: {err}");
            }
        }
    }
}
