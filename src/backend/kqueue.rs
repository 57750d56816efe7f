//! kqueue backend (spec.md §4.1 "kqueue mapping"): timers ride
//! `EVFILT_TIMER` with `NOTE_CRITICAL` (a kqueue timer is intrinsically
//! periodic — no extra fd), user events ride `EVFILT_USER` with
//! `EV_CLEAR` (triggered via `NOTE_TRIGGER`), and server/peer readiness
//! rides `EVFILT_READ` with hangup surfaced as `EV_EOF`.
//!
//! FFI is hand-rolled, in the same spirit as the teacher's epoll bindings
//! and grounded in the pack's minimal-mio-style kqueue bindings (a
//! `kqueue()`/`kevent()` pair plus a `Kevent` struct matching the kernel
//! ABI) rather than pulling in `libc` for two functions and one struct.

use std::io;

use super::{Backend, Filter, SlotEvent, Token, BATCH_SIZE};

mod ffi {
    unsafe extern "C" {
        pub fn kqueue() -> i32;
        pub fn kevent(
            kq: i32,
            changelist: *const Kevent,
            nchanges: i32,
            eventlist: *mut Kevent,
            nevents: i32,
            timeout: *const TimeSpec,
        ) -> i32;
        pub fn close(fd: i32) -> i32;
    }

    #[repr(C)]
    #[derive(Clone, Copy, Default)]
    pub struct TimeSpec {
        pub tv_sec: isize,
        pub tv_nsec: isize,
    }

    impl TimeSpec {
        pub fn from_millis(millis: i64) -> Self {
            TimeSpec {
                tv_sec: (millis / 1000) as isize,
                tv_nsec: ((millis % 1000) * 1_000_000) as isize,
            }
        }
    }

    /// Matches `struct kevent` on Darwin/BSD (64-bit `ident`/`udata`).
    #[repr(C)]
    #[derive(Clone, Copy, Default)]
    pub struct Kevent {
        pub ident: u64,
        pub filter: i16,
        pub flags: u16,
        pub fflags: u32,
        pub data: i64,
        pub udata: u64,
    }

    pub const EVFILT_READ: i16 = -1;
    pub const EVFILT_TIMER: i16 = -7;
    pub const EVFILT_USER: i16 = -10;

    pub const EV_ADD: u16 = 0x0001;
    pub const EV_DELETE: u16 = 0x0002;
    pub const EV_CLEAR: u16 = 0x0020;
    pub const EV_EOF: u16 = 0x8000;

    /// Timer data is interpreted as milliseconds (the default unit
    /// without `NOTE_SECONDS`/`NOTE_USECONDS`/`NOTE_NSECONDS`).
    pub const NOTE_CRITICAL: u32 = 0x0020;
    pub const NOTE_TRIGGER: u32 = 0x0100_0000;
}

use ffi::{
    Kevent, TimeSpec, EVFILT_READ, EVFILT_TIMER, EVFILT_USER, EV_ADD, EV_CLEAR, EV_DELETE, EV_EOF,
    NOTE_CRITICAL, NOTE_TRIGGER,
};

pub(crate) struct KqueueBackend {
    kq_fd: i32,
}

impl KqueueBackend {
    pub fn create() -> io::Result<Self> {
        let kq_fd = unsafe { ffi::kqueue() };
        if kq_fd < 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(KqueueBackend { kq_fd })
    }

    fn apply(&self, change: Kevent) -> io::Result<()> {
        let changelist = [change];
        let mut eventlist = [Kevent::default()];
        let res = unsafe {
            ffi::kevent(
                self.kq_fd,
                changelist.as_ptr(),
                1,
                eventlist.as_mut_ptr(),
                0,
                std::ptr::null(),
            )
        };
        if res < 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }
}

impl Backend for KqueueBackend {
    fn wait(&mut self, timeout_ms: i64) -> io::Result<Vec<SlotEvent>> {
        let mut raw = [Kevent::default(); BATCH_SIZE];
        let timeout = if timeout_ms < 0 {
            None
        } else {
            Some(TimeSpec::from_millis(timeout_ms))
        };
        let timeout_ptr = match &timeout {
            Some(ts) => ts as *const TimeSpec,
            None => std::ptr::null(),
        };

        let n = unsafe {
            ffi::kevent(
                self.kq_fd,
                std::ptr::null(),
                0,
                raw.as_mut_ptr(),
                BATCH_SIZE as i32,
                timeout_ptr,
            )
        };
        if n < 0 {
            let err = io::Error::last_os_error();
            if err.kind() == io::ErrorKind::Interrupted {
                return Ok(Vec::new());
            }
            return Err(err);
        }

        let mut out = Vec::with_capacity(n as usize);
        for ev in &raw[..n as usize] {
            let filter = match ev.filter {
                EVFILT_TIMER => Filter::Timer,
                EVFILT_USER => Filter::User,
                _ => Filter::Read,
            };
            out.push(SlotEvent {
                filter,
                eof: ev.flags & EV_EOF != 0,
                token: Token::decode(ev.udata),
            });
        }
        Ok(out)
    }

    fn register_read(&mut self, fd: i32, token: Token) -> io::Result<()> {
        self.apply(Kevent {
            ident: fd as u64,
            filter: EVFILT_READ,
            flags: EV_ADD,
            fflags: 0,
            data: 0,
            udata: token.encode(),
        })
    }

    fn unregister_read(&mut self, fd: i32) -> io::Result<()> {
        self.apply(Kevent {
            ident: fd as u64,
            filter: EVFILT_READ,
            flags: EV_DELETE,
            fflags: 0,
            data: 0,
            udata: 0,
        })
    }

    fn register_timer(&mut self, token: Token, interval_ms: u64) -> io::Result<Option<i32>> {
        self.apply(Kevent {
            ident: token.index as u64,
            filter: EVFILT_TIMER,
            flags: EV_ADD | EV_CLEAR,
            fflags: NOTE_CRITICAL,
            data: interval_ms as i64,
            udata: token.encode(),
        })?;
        Ok(None)
    }

    fn unregister_timer(&mut self, token: Token, _timer_fd: Option<i32>) -> io::Result<()> {
        self.apply(Kevent {
            ident: token.index as u64,
            filter: EVFILT_TIMER,
            flags: EV_DELETE,
            fflags: 0,
            data: 0,
            udata: 0,
        })
    }

    fn register_user(&mut self, token: Token) -> io::Result<Option<i32>> {
        self.apply(Kevent {
            ident: token.index as u64,
            filter: EVFILT_USER,
            flags: EV_ADD | EV_CLEAR,
            fflags: 0,
            data: 0,
            udata: token.encode(),
        })?;
        Ok(None)
    }

    fn trigger_user(&mut self, token: Token, _event_fd: Option<i32>) -> io::Result<()> {
        self.apply(Kevent {
            ident: token.index as u64,
            filter: EVFILT_USER,
            flags: 0,
            fflags: NOTE_TRIGGER,
            data: 0,
            udata: token.encode(),
        })
    }

    fn unregister_user(&mut self, token: Token, _event_fd: Option<i32>) -> io::Result<()> {
        self.apply(Kevent {
            ident: token.index as u64,
            filter: EVFILT_USER,
            flags: EV_DELETE,
            fflags: 0,
            data: 0,
            udata: 0,
        })
    }

    fn acknowledge_timer(&mut self, _timer_fd: Option<i32>) -> io::Result<()> {
        Ok(())
    }

    fn acknowledge_user(&mut self, _event_fd: Option<i32>) -> io::Result<()> {
        // EV_CLEAR already reset the filter's state on delivery.
        Ok(())
    }
}

impl Drop for KqueueBackend {
    fn drop(&mut self) {
        unsafe { ffi::close(self.kq_fd) };
    }
}
