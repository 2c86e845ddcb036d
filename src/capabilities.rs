//! Capability drop — sandbox construction step 5 (§4.3).
//!
//! Clears the bounding, inherited, permitted, and effective sets and sets
//! `no_new_privs` so nothing downstream, including the entry point, can
//! regain privilege through a setuid binary.

use crate::error::{Error, Result};
use caps::{CapSet, Capability, CapsHashSet};

const STEP: u8 = 5;

/// Drops every capability this process holds. Must run after the chroot
/// (step 4) since changing root can itself require `CAP_SYS_CHROOT`.
pub(crate) fn drop_all() -> Result<()> {
    let empty: CapsHashSet = std::iter::empty::<Capability>().collect();
    for set in [
        CapSet::Effective,
        CapSet::Permitted,
        CapSet::Inheritable,
        CapSet::Bounding,
    ] {
        if let Err(e) = caps::set(None, set, &empty) {
            tracing::error!(error = %e, ?set, "failed to clear capability set");
            return Err(Error::SandboxSetup {
                step: STEP,
                exit_code: crate::util::sandbox_step_exit_code(STEP),
            });
        }
    }
    let ret = unsafe { libc::prctl(libc::PR_SET_NO_NEW_PRIVS, 1, 0, 0, 0) };
    if ret == -1 {
        let errno = std::io::Error::last_os_error();
        tracing::error!(error = %errno, "prctl(PR_SET_NO_NEW_PRIVS) failed");
        return Err(Error::syscall(errno.raw_os_error().unwrap_or(-1)));
    }
    Ok(())
}
