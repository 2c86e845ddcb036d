//! Seccomp filter installation — sandbox construction step 7, the last
//! step because every earlier step may need syscalls this filter forbids
//! (§4.3).

use crate::error::{Error, Result};
use crate::util::sandbox_step_exit_code;
use seccompiler::{apply_filter, BpfProgram, SeccompAction, SeccompFilter, SeccompRule, TargetArch};
use std::convert::TryFrom;
use std::collections::BTreeMap;

const STEP: u8 = 7;

/// Syscalls needed to bring up and run the managed Rust runtime after
/// sandbox construction completes: process/memory management, the stdio
/// fds, signal delivery, and the primitives already used before this step
/// runs. Anything not on this list kills the process (deny-by-default).
macro_rules! allowed {
    ($($name:ident),* $(,)?) => {
        &[$(libc::$name as i64),*]
    };
}

const ALLOWED_SYSCALLS: &[i64] = allowed![
    SYS_read,
    SYS_write,
    SYS_readv,
    SYS_writev,
    SYS_close,
    SYS_exit,
    SYS_exit_group,
    SYS_brk,
    SYS_mmap,
    SYS_munmap,
    SYS_mprotect,
    SYS_mremap,
    SYS_madvise,
    SYS_rt_sigaction,
    SYS_rt_sigprocmask,
    SYS_rt_sigreturn,
    SYS_sigaltstack,
    SYS_futex,
    SYS_clock_gettime,
    SYS_clock_nanosleep,
    SYS_nanosleep,
    SYS_getrandom,
    SYS_openat,
    SYS_fstat,
    SYS_newfstatat,
    SYS_lseek,
    SYS_fcntl,
    SYS_ioctl,
    SYS_pread64,
    SYS_pwrite64,
    SYS_poll,
    SYS_ppoll,
    SYS_epoll_create1,
    SYS_epoll_ctl,
    SYS_epoll_wait,
    SYS_epoll_pwait,
    SYS_getpid,
    SYS_gettid,
    SYS_getuid,
    SYS_getgid,
    SYS_geteuid,
    SYS_getegid,
    SYS_sched_yield,
    SYS_sched_getaffinity,
    SYS_prctl,
    SYS_set_tid_address,
    SYS_set_robust_list,
    SYS_rseq,
    SYS_wait4,
    SYS_waitid,
    SYS_kill,
    SYS_tgkill,
    SYS_uname,
    SYS_sysinfo,
    SYS_restart_syscall,
    // Entry points are ordinary Rust functions, not `exec`'d binaries, so
    // this filter would not need `execve` at all — except the `forkspawn`
    // registry also supports exec-style entry points (see `forkspawn-cli`)
    // for running arbitrary sandboxed binaries, which needs it.
    SYS_execve,
];

fn filter_err<E: std::fmt::Display>(e: E) -> Error {
    tracing::error!(error = %e, "failed to build seccomp filter");
    Error::SandboxSetup {
        step: STEP,
        exit_code: sandbox_step_exit_code(STEP),
    }
}

fn build_program() -> Result<BpfProgram> {
    let mut rules = BTreeMap::new();
    for &nr in ALLOWED_SYSCALLS {
        rules.insert(nr, vec![SeccompRule::new(vec![]).map_err(filter_err)?]);
    }
    let filter = SeccompFilter::new(
        rules,
        SeccompAction::KillProcess,
        SeccompAction::Allow,
        TargetArch::x86_64,
    )
    .map_err(filter_err)?;
    BpfProgram::try_from(filter).map_err(filter_err)
}

/// Installs the filter in the calling process. There is no return path on
/// success other than the kernel enforcing it from here on; any syscall
/// not in [`ALLOWED_SYSCALLS`] kills the process.
pub(crate) fn install() -> Result<()> {
    let program = build_program()?;
    apply_filter(&program).map_err(filter_err)
}
