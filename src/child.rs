//! Child-side entry protocol (§4.4, §9 "clone-once, dispatch-many").
//!
//! Unlike a conventional fork+exec child, this subspawner never execs:
//! it forks from an already-preloaded address space and calls straight
//! into a registered Rust function.

use crate::fd::Fd;
use crate::registry::Registry;
use crate::util::die;
use std::os::unix::io::AsRawFd;

pub(crate) struct ChildIo {
    pub stdin: Fd,
    pub stdout: Fd,
    pub stderr: Fd,
}

/// Runs entirely inside the subspawner, after sandbox construction
/// (§4.3) has completed and right before the process becomes the
/// sandboxed child. Never returns: it either `process::exit`s with the
/// entry point's return code or dies with a dispatch-failure code.
pub(crate) fn dispatch(
    registry: &Registry,
    entry_point: &str,
    args: Vec<Vec<u8>>,
    io: ChildIo,
) -> ! {
    close_foreign_fds(&[io.stdin.as_raw_fd(), io.stdout.as_raw_fd(), io.stderr.as_raw_fd()]);

    // dup2 as late as possible so any panic up to this point still writes
    // to the subspawner's original stdio, not the sandboxed child's pipes.
    unsafe {
        libc::dup2(io.stdin.as_raw_fd(), libc::STDIN_FILENO);
        libc::dup2(io.stdout.as_raw_fd(), libc::STDOUT_FILENO);
        libc::dup2(io.stderr.as_raw_fd(), libc::STDERR_FILENO);
    }
    drop(io);

    let entry = match registry.lookup(entry_point) {
        Some(f) => f,
        None => {
            tracing::error!(entry_point, "no such entry point in registry");
            die("dispatch", 111);
        }
    };

    let code = entry(args);
    std::process::exit(code);
}

/// Closes every open fd above stderr except the ones the child itself is
/// about to dup2 onto 0/1/2 (§3 invariant: "child inherits no fds other
/// than its own stdio").
fn close_foreign_fds(keep: &[i32]) {
    let entries = match std::fs::read_dir("/proc/self/fd") {
        Ok(entries) => entries,
        Err(e) => {
            tracing::warn!(error = %e, "could not enumerate /proc/self/fd, skipping fd hygiene pass");
            return;
        }
    };
    for entry in entries.flatten() {
        let name = entry.file_name();
        let fd: i32 = match name.to_string_lossy().parse() {
            Ok(fd) => fd,
            Err(_) => continue,
        };
        if fd > 2 && !keep.contains(&fd) {
            unsafe {
                libc::close(fd);
            }
        }
    }
}
