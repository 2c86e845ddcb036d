//! Startup feature probes (§4.1 "the spawner verifies kernel support
//! before reporting itself healthy").
//!
//! This crate has no cgroup concept, so the only thing worth probing
//! ahead of time is pidfd support — everything else in the sandbox
//! sequence either works or fails loudly at the step that needs it.

/// Storage for problems reported by [`check`].
#[derive(Debug, Default)]
pub struct CheckResult {
    warnings: Vec<String>,
    errors: Vec<String>,
}

impl CheckResult {
    pub(crate) fn warning(&mut self, message: &str) {
        self.warnings.push(message.to_string());
    }

    pub(crate) fn error(&mut self, message: &str) {
        self.errors.push(message.to_string());
    }

    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }

    pub fn errors(&self) -> &[String] {
        &self.errors
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }
}

impl std::fmt::Display for CheckResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.errors.is_empty() && self.warnings.is_empty() {
            return "OK".fmt(f);
        }
        if !self.errors.is_empty() {
            "Errors:\n".fmt(f)?;
            for err in &self.errors {
                writeln!(f, "\t{}", err)?;
            }
        }
        if !self.warnings.is_empty() {
            "Warnings:\n".fmt(f)?;
            for warn in &self.warnings {
                writeln!(f, "\t{}", warn)?;
            }
        }
        Ok(())
    }
}

/// Runs every startup probe. A returned [`CheckResult`] with
/// `has_errors() == false` means [`crate::SpawnerHandle::open`] will
/// probably succeed; warnings describe degraded-but-working modes (e.g.
/// no async exit notification).
pub fn check() -> CheckResult {
    let mut res = CheckResult::default();
    if !pidfd_supported() {
        res.warning("pidfd_open is not supported by this kernel; wait_for_exit will be unavailable");
    }
    res
}

/// Checks whether the kernel supports `pidfd_open`/`pidfd_send_signal`,
/// memoized for the lifetime of the process.
pub fn pidfd_supported() -> bool {
    static ONCE: once_cell::sync::Lazy<bool> = once_cell::sync::Lazy::new(|| {
        fn probe() -> std::io::Result<()> {
            let me = nix::unistd::Pid::parent();
            let pidfd = crate::util::pidfd_open(me.as_raw())?;
            let res = crate::util::pidfd_send_signal(pidfd, 0).or_else(|err| match err.kind() {
                std::io::ErrorKind::InvalidInput => Ok(()),
                _ => Err(err),
            });
            nix::unistd::close(pidfd).ok();
            res
        }
        probe().is_ok()
    });
    *ONCE
}

pub(crate) fn run_all_feature_checks() {
    let _ = pidfd_supported();
}
