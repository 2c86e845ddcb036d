//! Resource limits applied as sandbox construction step 6 (§4.3, §6).
//!
//! No cgroups here: every limit is a plain `setrlimit` on the sandboxed
//! process itself, enforced by the kernel without any outside watchdog.

use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy)]
pub struct ResourceLimits {
    /// RLIMIT_AS, bytes.
    pub address_space: u64,
    /// RLIMIT_NPROC, thread/process count.
    pub nproc: u64,
    /// RLIMIT_FSIZE, bytes.
    pub fsize: u64,
    /// RLIMIT_NOFILE, open fd count.
    pub nofile: u64,
}

impl Default for ResourceLimits {
    fn default() -> Self {
        ResourceLimits {
            address_space: 1 << 30,  // 1 GiB
            nproc: 100,
            fsize: 1 << 30, // 1 GiB
            nofile: 1024,
        }
    }
}

/// Applies `limits` to the calling process. Must run after the chroot
/// (step 4) and before capability drop leaves us unable to raise
/// `RLIMIT_NOFILE` past the hard cap we're about to set (step 6 itself
/// sets both soft and hard limits equal, so ordering relative to
/// capability drop does not matter here, only relative to steps 1-4).
pub(crate) fn apply(limits: &ResourceLimits, enable_coredumps: bool) -> Result<()> {
    set_rlimit(libc::RLIMIT_CORE, if enable_coredumps { u64::MAX } else { 0 })?;
    set_rlimit(libc::RLIMIT_AS, limits.address_space)?;
    set_rlimit(libc::RLIMIT_NPROC, limits.nproc)?;
    set_rlimit(libc::RLIMIT_FSIZE, limits.fsize)?;
    set_rlimit(libc::RLIMIT_NOFILE, limits.nofile)?;
    Ok(())
}

fn set_rlimit(resource: libc::c_uint, value: u64) -> Result<()> {
    let lim = libc::rlimit {
        rlim_cur: value,
        rlim_max: value,
    };
    let ret = unsafe { libc::setrlimit(resource, &lim) };
    if ret == -1 {
        return Err(Error::syscall(
            std::io::Error::last_os_error().raw_os_error().unwrap_or(-1),
        ));
    }
    Ok(())
}
