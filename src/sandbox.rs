//! Sandbox construction sequence (§4.3) — the seven steps a subspawner
//! runs on itself before dispatching to the entry point.
//!
//! Each stage consumes the previous one and returns the next, so the
//! step order is enforced by the type system rather than by convention:
//! there is no way to call `seccomp()` before `capabilities()` because
//! `Seccomp` only has an associated function taking `Limited`, and
//! `Limited` only comes from `CapsDropped::limits()`.

use crate::error::{Error, Result};
use crate::util::{die, sandbox_step_exit_code};
use crate::wire::SandboxConfig;
use crate::{capabilities, limits, network, seccomp};
use nix::sched::CloneFlags;
use std::path::Path;

const SANDBOX_UID: libc::uid_t = 0;

pub(crate) struct Unshared(());
pub(crate) struct Mapped(());
pub(crate) struct Networked(());
pub(crate) struct Chrooted(());
pub(crate) struct CapsDropped(());
pub(crate) struct LimitsApplied(());

/// Step 1: unshare user, PID, IPC, UTS, network, and mount namespaces in
/// one atomic call. Must run first — every later step depends on
/// already being inside the new namespaces.
pub(crate) fn unshare(allow_unsupported_mount_ns: bool) -> Result<Unshared> {
    const STEP: u8 = 1;
    let flags = CloneFlags::CLONE_NEWUSER
        | CloneFlags::CLONE_NEWPID
        | CloneFlags::CLONE_NEWIPC
        | CloneFlags::CLONE_NEWUTS
        | CloneFlags::CLONE_NEWNET;
    nix::sched::unshare(flags).map_err(|e| step_err(STEP, e))?;
    if let Err(e) = nix::sched::unshare(CloneFlags::CLONE_NEWNS) {
        if !allow_unsupported_mount_ns {
            return Err(step_err(STEP, e));
        }
        tracing::warn!("CLONE_NEWNS unsupported, continuing without a private mount namespace");
    }
    Ok(Unshared(()))
}

impl Unshared {
    /// Step 2: map a single inner UID 0 to the outer unprivileged euid,
    /// with `setgroups` disabled first. Requires the *caller* (not this
    /// process — it has no privilege left to do this itself) to have
    /// already written `/proc/<pid>/{uid,gid}_map`; this method just
    /// waits on `uid_mapping_done` for that write to land.
    pub(crate) fn wait_for_uid_mapping(self, uid_mapping_done: &crate::fd::Fd) -> Result<Mapped> {
        const STEP: u8 = 2;
        let mut buf = [0u8; 1];
        uid_mapping_done
            .read(&mut buf)
            .map_err(|_| Error::SandboxSetup {
                step: STEP,
                exit_code: sandbox_step_exit_code(STEP),
            })?;
        Ok(Mapped(()))
    }
}

/// Signals the caller that `unshare(CLONE_NEWUSER)` has already landed, so
/// it's safe to write `/proc/<this pid>/{uid,gid}_map` from the outside.
/// Without this handshake the caller can win the race and write the maps
/// before the namespace exists, which fails with EPERM against the
/// original user namespace.
fn signal_unshared(unshare_done: &crate::fd::Fd) -> Result<()> {
    const STEP: u8 = 1;
    unshare_done.write(b"U").map_err(|_| Error::SandboxSetup {
        step: STEP,
        exit_code: sandbox_step_exit_code(STEP),
    })?;
    Ok(())
}

/// Writes `/proc/<pid>/{uid,gid}_map` for `child_pid` from the parent side
/// of the fork, mapping inner UID 0 to this process's effective UID.
/// Called by the subspawner's caller (the spawner), not by the sandboxed
/// process itself — a process cannot write its own gid_map until
/// `setgroups` is set to "deny", which it must do from outside.
pub(crate) fn write_uid_gid_map(child_pid: libc::pid_t) -> Result<()> {
    let euid = nix::unistd::Uid::effective().as_raw();
    let mapping = format!("{} {} 1\n", SANDBOX_UID, euid);
    std::fs::write(format!("/proc/{}/setgroups", child_pid), "deny")?;
    std::fs::write(format!("/proc/{}/uid_map", child_pid), &mapping)?;
    std::fs::write(format!("/proc/{}/gid_map", child_pid), &mapping)?;
    Ok(())
}

impl Mapped {
    /// Step 3: create and address the veth pair (if `network` is set),
    /// otherwise just bring `lo` up.
    pub(crate) fn network(
        self,
        network: Option<&crate::wire::NetworkConfig>,
        parent_pid: libc::pid_t,
    ) -> Result<Networked> {
        network::setup(network, parent_pid)?;
        Ok(Networked(()))
    }
}

impl Networked {
    /// Step 4: `chroot` + `chdir("/")`. A no-op when `chroot_dir` is
    /// absent — the process stays in whatever root the namespace gave it.
    pub(crate) fn chroot(self, chroot_dir: Option<&Path>) -> Result<Chrooted> {
        const STEP: u8 = 4;
        if let Some(dir) = chroot_dir {
            nix::unistd::chroot(dir).map_err(|e| step_err(STEP, e))?;
            nix::unistd::chdir("/").map_err(|e| step_err(STEP, e))?;
        }
        Ok(Chrooted(()))
    }
}

impl Chrooted {
    /// Step 5: drop all capabilities and set `no_new_privs`, unless the
    /// request opted out.
    pub(crate) fn capabilities(self, drop_capabilities: bool) -> Result<CapsDropped> {
        if drop_capabilities {
            capabilities::drop_all()?;
        }
        Ok(CapsDropped(()))
    }
}

impl CapsDropped {
    /// Step 6: resource limits.
    pub(crate) fn limits(
        self,
        limits: &crate::limits::ResourceLimits,
        enable_coredumps: bool,
    ) -> Result<LimitsApplied> {
        limits::apply(limits, enable_coredumps)?;
        Ok(LimitsApplied(()))
    }
}

impl LimitsApplied {
    /// Step 7: install the seccomp-bpf filter, unless skipped. Last step
    /// by construction — there is no further stage to move to.
    pub(crate) fn seccomp(self, skip: bool) -> Result<()> {
        if !skip {
            seccomp::install()?;
        }
        Ok(())
    }
}

fn step_err(step: u8, e: nix::Error) -> Error {
    tracing::error!(step, error = %e, "sandbox construction step failed");
    Error::SandboxSetup {
        step,
        exit_code: sandbox_step_exit_code(step),
    }
}

/// Runs all seven steps in order inside the calling (subspawner) process.
/// On any failure, aborts the process with the step's exit code (§4.3,
/// §6) rather than returning — by this point there is no one left to
/// hand a `Result` to; the parent observes the failure via `waitpid`.
pub(crate) fn construct(
    config: &SandboxConfig,
    default_limits: &crate::limits::ResourceLimits,
    parent_pid: libc::pid_t,
    unshare_done: &crate::fd::Fd,
    uid_mapping_done: &crate::fd::Fd,
    allow_unsupported_mount_ns: bool,
) {
    let run = || -> Result<()> {
        let unshared = unshare(allow_unsupported_mount_ns)?;
        signal_unshared(unshare_done)?;
        unshared
            .wait_for_uid_mapping(uid_mapping_done)?
            .network(config.network.as_ref(), parent_pid)?
            .chroot(config.chroot_dir.as_deref())?
            .capabilities(config.drop_capabilities)?
            .limits(default_limits, config.enable_coredumps)?
            .seccomp(config.skip_sandbox_seccomp)
    };
    match run() {
        Ok(()) => {}
        Err(Error::SandboxSetup { exit_code, .. }) => die("sandbox construction", exit_code),
        Err(e) => {
            tracing::error!(error = %e, "sandbox construction failed outside the named steps");
            die("sandbox construction", sandbox_step_exit_code(1));
        }
    }
}
