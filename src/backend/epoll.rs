//! epoll backend (spec.md §4.1 "epoll mapping"): one `epoll_fd`, plus a
//! `timerfd` per timer and an `eventfd` per user event, since epoll has no
//! first-class timer/user filter the way kqueue does.
//!
//! FFI is hand-rolled `extern "C"` declarations in the style the teacher
//! crate already uses for `epoll_create`/`epoll_ctl`/`epoll_wait`
//! (`src/ffi.rs`, `src/epoll.rs`), extended here with `timerfd_create`,
//! `timerfd_settime`, `eventfd`, `read` and `write` so the crate does not
//! need to pull in `libc` just for a handful of syscalls it already knows
//! how to declare by hand.

use std::io;

use super::{Backend, Filter, SlotEvent, Token, BATCH_SIZE};

mod ffi {
    unsafe extern "C" {
        pub fn epoll_create1(flags: i32) -> i32;
        pub fn epoll_ctl(epfd: i32, op: i32, fd: i32, event: *mut EpollEvent) -> i32;
        pub fn epoll_wait(epfd: i32, events: *mut EpollEvent, max_events: i32, timeout: i32)
        -> i32;
        pub fn close(fd: i32) -> i32;
        pub fn read(fd: i32, buf: *mut u8, count: usize) -> isize;
        pub fn write(fd: i32, buf: *const u8, count: usize) -> isize;

        pub fn timerfd_create(clockid: i32, flags: i32) -> i32;
        pub fn timerfd_settime(
            fd: i32,
            flags: i32,
            new_value: *const ItimerSpec,
            old_value: *mut ItimerSpec,
        ) -> i32;

        pub fn eventfd(initval: u32, flags: i32) -> i32;
    }

    /// Matches the kernel's `struct epoll_event`, which on x86_64/aarch64
    /// is declared `__attribute__((packed))` so the 8-byte `data` union
    /// doesn't pull in trailing padding.
    #[repr(C, packed)]
    #[derive(Clone, Copy)]
    pub struct EpollEvent {
        pub events: u32,
        pub data: u64,
    }

    #[repr(C)]
    #[derive(Clone, Copy)]
    pub struct TimeSpec {
        pub tv_sec: i64,
        pub tv_nsec: i64,
    }

    #[repr(C)]
    #[derive(Clone, Copy)]
    pub struct ItimerSpec {
        pub it_interval: TimeSpec,
        pub it_value: TimeSpec,
    }

    pub const EPOLL_CTL_ADD: i32 = 1;
    pub const EPOLL_CTL_DEL: i32 = 2;

    pub const EPOLLIN: u32 = 0x001;
    pub const EPOLLHUP: u32 = 0x010;
    pub const EPOLLRDHUP: u32 = 0x2000;

    pub const CLOCK_MONOTONIC: i32 = 1;
    pub const TFD_NONBLOCK: i32 = 0o4000;
    pub const EFD_NONBLOCK: i32 = 0o4000;
}

use ffi::{
    close, epoll_create1, epoll_ctl, epoll_wait, eventfd, read, timerfd_create, timerfd_settime,
    write, EpollEvent, ItimerSpec, TimeSpec, CLOCK_MONOTONIC, EFD_NONBLOCK, EPOLLHUP, EPOLLIN,
    EPOLLRDHUP, EPOLL_CTL_ADD, EPOLL_CTL_DEL, TFD_NONBLOCK,
};

pub(crate) struct EpollBackend {
    epoll_fd: i32,
}

impl EpollBackend {
    pub fn create() -> io::Result<Self> {
        let epoll_fd = unsafe { epoll_create1(0) };
        if epoll_fd < 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(EpollBackend { epoll_fd })
    }

    fn ctl(&self, op: i32, fd: i32, token: Token) -> io::Result<()> {
        let mut event = EpollEvent {
            events: EPOLLIN | EPOLLRDHUP,
            data: token.encode(),
        };
        let res = unsafe { epoll_ctl(self.epoll_fd, op, fd, &raw mut event) };
        if res < 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }

    fn ctl_del(&self, fd: i32) -> io::Result<()> {
        let mut event = EpollEvent { events: 0, data: 0 };
        let res = unsafe { epoll_ctl(self.epoll_fd, EPOLL_CTL_DEL, fd, &raw mut event) };
        if res < 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }
}

impl Backend for EpollBackend {
    fn wait(&mut self, timeout_ms: i64) -> io::Result<Vec<SlotEvent>> {
        let mut raw = [EpollEvent { events: 0, data: 0 }; BATCH_SIZE];
        let timeout = if timeout_ms < 0 {
            -1
        } else {
            timeout_ms.min(i32::MAX as i64) as i32
        };

        let n = unsafe { epoll_wait(self.epoll_fd, raw.as_mut_ptr(), BATCH_SIZE as i32, timeout) };
        if n < 0 {
            let err = io::Error::last_os_error();
            if err.kind() == io::ErrorKind::Interrupted {
                return Ok(Vec::new());
            }
            return Err(err);
        }

        let mut out = Vec::with_capacity(n as usize);
        for raw_event in &raw[..n as usize] {
            let events = raw_event.events;
            let eof = events & (EPOLLHUP | EPOLLRDHUP) != 0;
            let token = Token::decode(raw_event.data);
            let filter = match token.kind {
                crate::record::Kind::Timer => Filter::Timer,
                crate::record::Kind::User => Filter::User,
                _ => Filter::Read,
            };
            out.push(SlotEvent { filter, eof, token });
        }
        Ok(out)
    }

    fn register_read(&mut self, fd: i32, token: Token) -> io::Result<()> {
        self.ctl(EPOLL_CTL_ADD, fd, token)
    }

    fn unregister_read(&mut self, fd: i32) -> io::Result<()> {
        self.ctl_del(fd)
    }

    fn register_timer(&mut self, token: Token, interval_ms: u64) -> io::Result<Option<i32>> {
        let timer_fd = unsafe { timerfd_create(CLOCK_MONOTONIC, TFD_NONBLOCK) };
        if timer_fd < 0 {
            return Err(io::Error::last_os_error());
        }

        let spec = millis_to_timespec(interval_ms);
        let new_value = ItimerSpec {
            it_interval: spec,
            it_value: spec,
        };
        let res =
            unsafe { timerfd_settime(timer_fd, 0, &raw const new_value, std::ptr::null_mut()) };
        if res < 0 {
            let err = io::Error::last_os_error();
            unsafe { close(timer_fd) };
            return Err(err);
        }

        if let Err(err) = self.ctl(EPOLL_CTL_ADD, timer_fd, token) {
            unsafe { close(timer_fd) };
            return Err(err);
        }

        Ok(Some(timer_fd))
    }

    fn unregister_timer(&mut self, _token: Token, timer_fd: Option<i32>) -> io::Result<()> {
        if let Some(fd) = timer_fd {
            let _ = self.ctl_del(fd);
            unsafe { close(fd) };
        }
        Ok(())
    }

    fn register_user(&mut self, token: Token) -> io::Result<Option<i32>> {
        let event_fd = unsafe { eventfd(0, EFD_NONBLOCK) };
        if event_fd < 0 {
            return Err(io::Error::last_os_error());
        }

        if let Err(err) = self.ctl(EPOLL_CTL_ADD, event_fd, token) {
            unsafe { close(event_fd) };
            return Err(err);
        }

        Ok(Some(event_fd))
    }

    fn trigger_user(&mut self, _token: Token, event_fd: Option<i32>) -> io::Result<()> {
        if let Some(fd) = event_fd {
            let value: u64 = 1;
            let res = unsafe { write(fd, (&raw const value) as *const u8, 8) };
            if res < 0 {
                let err = io::Error::last_os_error();
                if err.kind() != io::ErrorKind::WouldBlock {
                    return Err(err);
                }
            }
        }
        Ok(())
    }

    fn unregister_user(&mut self, _token: Token, event_fd: Option<i32>) -> io::Result<()> {
        if let Some(fd) = event_fd {
            let _ = self.ctl_del(fd);
            unsafe { close(fd) };
        }
        Ok(())
    }

    fn acknowledge_timer(&mut self, timer_fd: Option<i32>) -> io::Result<()> {
        if let Some(fd) = timer_fd {
            let mut buf = [0u8; 8];
            let res = unsafe { read(fd, buf.as_mut_ptr(), 8) };
            if res < 0 {
                let err = io::Error::last_os_error();
                if err.kind() != io::ErrorKind::WouldBlock {
                    return Err(err);
                }
            }
        }
        Ok(())
    }

    fn acknowledge_user(&mut self, event_fd: Option<i32>) -> io::Result<()> {
        if let Some(fd) = event_fd {
            let mut buf = [0u8; 8];
            let res = unsafe { read(fd, buf.as_mut_ptr(), 8) };
            if res < 0 {
                let err = io::Error::last_os_error();
                if err.kind() != io::ErrorKind::WouldBlock {
                    return Err(err);
                }
            }
        }
        Ok(())
    }
}

fn millis_to_timespec(millis: u64) -> TimeSpec {
    TimeSpec {
        tv_sec: (millis / 1000) as i64,
        tv_nsec: ((millis % 1000) * 1_000_000) as i64,
    }
}

impl Drop for EpollBackend {
    fn drop(&mut self) {
        unsafe { close(self.epoll_fd) };
    }
}
