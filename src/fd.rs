//! Thin owned-fd wrapper used for sockets and pipe ends passed across
//! fork boundaries.

use std::{
    io,
    mem::ManuallyDrop,
    os::unix::prelude::{AsRawFd, RawFd},
};

pub struct Fd(RawFd);

impl AsRawFd for Fd {
    fn as_raw_fd(&self) -> RawFd {
        self.0
    }
}

impl Fd {
    pub fn new(inner: RawFd) -> Self {
        Fd(inner)
    }

    pub fn as_raw(&self) -> RawFd {
        self.0
    }

    /// Leaks the fd out of the wrapper without closing it, e.g. right
    /// before handing it to `execve`-less dispatch or SCM_RIGHTS framing.
    pub fn into_raw(self) -> RawFd {
        let this = ManuallyDrop::new(self);
        this.0
    }

    pub fn read(&self, buf: &mut [u8]) -> io::Result<usize> {
        nix::unistd::read(self.0, buf).map_err(cvt_error)
    }

    pub fn write(&self, buf: &[u8]) -> io::Result<usize> {
        nix::unistd::write(self.0, buf).map_err(cvt_error)
    }
}

impl Drop for Fd {
    fn drop(&mut self) {
        let _ = nix::unistd::close(self.0);
    }
}

pub(crate) fn cvt_error(n: nix::Error) -> io::Error {
    match n.as_errno() {
        Some(errno) => io::Error::from_raw_os_error(errno as i32),
        None => io::Error::new(io::ErrorKind::Other, n),
    }
}
