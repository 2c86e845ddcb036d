//! Small syscall helpers shared across the spawner, subspawner, and wait
//! paths.

use std::os::unix::io::RawFd;

pub type Pid = libc::pid_t;
pub type Uid = libc::uid_t;
pub type Gid = libc::gid_t;

pub(crate) fn pidfd_open(pid: Pid) -> std::io::Result<RawFd> {
    let res = unsafe { libc::syscall(434, pid, 0) };
    if res >= 0 {
        Ok(res as RawFd)
    } else {
        Err(std::io::Error::last_os_error())
    }
}

pub(crate) fn pidfd_send_signal(pid: Pid, signal: libc::c_int) -> std::io::Result<()> {
    let res =
        unsafe { libc::syscall(424, pid, signal, std::ptr::null::<libc::siginfo_t>(), 0_u32) };
    if res != -1 {
        Ok(())
    } else {
        Err(std::io::Error::last_os_error())
    }
}

pub(crate) fn last_errno() -> i32 {
    std::io::Error::last_os_error().raw_os_error().unwrap_or(-1)
}

/// Aborts the calling process after logging `syscall_name`'s failure. Used
/// only on paths inside the subspawner/child after the point of no return,
/// where returning a `Result` to anyone would be meaningless — the process
/// is about to be reaped by its PID-namespace init anyway.
pub(crate) fn die(syscall_name: &str, exit_code: i32) -> ! {
    let errno = last_errno();
    tracing::error!(syscall = syscall_name, errno, "fatal syscall failure in sandboxed child");
    unsafe {
        libc::_exit(exit_code);
    }
}

/// Exit code for sandbox construction step `step` (1-indexed, §4.3).
pub(crate) fn sandbox_step_exit_code(step: u8) -> i32 {
    64 + step as i32
}
