//! Async exit-wait future, supplementing the synchronous GetExitCode RPC
//! (§5 "suspension/blocking points").
//!
//! Built on a `pidfd` when the kernel supports it (checked once via
//! [`crate::check::pidfd_supported`]); the pidfd just needs to be
//! *visible*, not a parent relationship, so this works purely from the
//! reported PID without round-tripping through the spawner.

use crate::error::{Error, Result};
use crate::fd::Fd;
use crate::util::{pidfd_open, Pid};
use std::{
    pin::Pin,
    task::{Context, Poll},
};
use tokio::io::unix::AsyncFd;

pub struct WaitFuture {
    inner: AsyncFd<Fd>,
    pid: Pid,
}

impl WaitFuture {
    pub(crate) fn new(pid: Pid) -> Result<Self> {
        let raw = pidfd_open(pid).map_err(|e| {
            Error::Syscall {
                code: e.raw_os_error().unwrap_or(-1),
            }
        })?;
        let inner = AsyncFd::new(Fd::new(raw))?;
        Ok(WaitFuture { inner, pid })
    }

    pub fn pid(&self) -> Pid {
        self.pid
    }
}

impl std::future::Future for WaitFuture {
    /// Resolves once the pidfd becomes readable, i.e. the process has
    /// exited. The actual exit code still comes from the spawner via
    /// `GetExitCode` (only the real parent can reap it); this future
    /// just tells the caller when it's worth asking.
    type Output = Result<()>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = Pin::into_inner(self);
        this.inner.poll_read_ready(cx).map_ok(|_| ()).map_err(|e| Error::Transport { cause: e })
    }
}
