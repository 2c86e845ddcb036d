//! Stdio pipe plumbing between the spawner and the parent process.
//!
//! Each spawn creates three pipes. The subspawner keeps the child ends
//! (dup2'd onto fds 0/1/2), the spawner keeps the parent ends and hands
//! them to the caller over `SCM_RIGHTS` (§4.2).

use libc::c_void;
use std::{io, os::unix::io::RawFd};

pub struct ReadPipe(RawFd);

impl io::Read for ReadPipe {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let ret = unsafe { libc::read(self.0, buf.as_mut_ptr() as *mut c_void, buf.len()) };
        if ret == -1 {
            return Err(io::Error::last_os_error());
        }
        Ok(ret as usize)
    }
}

impl ReadPipe {
    pub(crate) fn new(fd: RawFd) -> Self {
        ReadPipe(fd)
    }

    pub fn as_raw_fd(&self) -> RawFd {
        self.0
    }
}

impl Drop for ReadPipe {
    fn drop(&mut self) {
        unsafe {
            libc::close(self.0);
        }
    }
}

pub struct WritePipe(RawFd);

impl WritePipe {
    pub(crate) fn new(fd: RawFd) -> Self {
        WritePipe(fd)
    }

    pub fn as_raw_fd(&self) -> RawFd {
        self.0
    }
}

impl io::Write for WritePipe {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let ret = unsafe { libc::write(self.0, buf.as_ptr() as *const c_void, buf.len()) };
        if ret == -1 {
            return Err(io::Error::last_os_error());
        }
        Ok(ret as usize)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Drop for WritePipe {
    fn drop(&mut self) {
        unsafe {
            libc::close(self.0);
        }
    }
}

/// A `pipe2(O_CLOEXEC)` pair, split into owned read/write halves.
pub(crate) struct PipePair {
    pub read: RawFd,
    pub write: RawFd,
}

pub(crate) fn new_pipe() -> io::Result<PipePair> {
    let mut ends = [0; 2];
    let ret = unsafe { libc::pipe2(ends.as_mut_ptr(), libc::O_CLOEXEC) };
    if ret == -1 {
        return Err(io::Error::last_os_error());
    }
    Ok(PipePair {
        read: ends[0],
        write: ends[1],
    })
}

/// The three standard stdio pipes created per-spawn. `*_parent` are kept by
/// the spawner and returned to the caller; `*_child` are dup2'd onto 0/1/2
/// in the subspawner before the sandbox construction sequence runs.
pub(crate) struct StdioPipes {
    pub stdin_child: RawFd,
    pub stdin_parent: RawFd,
    pub stdout_child: RawFd,
    pub stdout_parent: RawFd,
    pub stderr_child: RawFd,
    pub stderr_parent: RawFd,
}

pub(crate) fn new_stdio_pipes() -> io::Result<StdioPipes> {
    let stdin = new_pipe()?;
    let stdout = new_pipe()?;
    let stderr = new_pipe()?;
    Ok(StdioPipes {
        stdin_child: stdin.read,
        stdin_parent: stdin.write,
        stdout_child: stdout.write,
        stdout_parent: stdout.read,
        stderr_child: stderr.write,
        stderr_parent: stderr.read,
    })
}
