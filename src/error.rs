//! Error taxonomy surfaced to the parent process.
//!
//! Every operation on [`crate::SpawnerHandle`] returns one of the variants
//! below. [`Error::poisons`] tells callers whether the originating handle
//! must be discarded (see `SpawnerHandle::poisoned`).

#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// The spawner exited (or was never reachable) before it accepted a
    /// single request. Detected as EOF on the control socket before the
    /// first reply.
    #[error("spawner failed to start: {reason}")]
    Startup { reason: String },

    /// A malformed frame, a short read, or an unexpected fd count was
    /// observed on the control socket. Poisons the handle.
    #[error("control protocol violated: {reason}")]
    Protocol { reason: String },

    /// `fork`/`clone` failed inside the spawner itself (ENOMEM, EAGAIN, ...).
    /// Does not poison the handle; the next spawn may succeed.
    #[error("spawner failed to fork a subspawner (errno {code})")]
    SpawnFork { code: i32 },

    /// The child exited before running user code. Observed by the caller
    /// via `waitpid` noticing an exit code in the 65..=71 range (§6).
    #[error("sandbox setup failed at step {step} (exit code {exit_code})")]
    SandboxSetup { step: u8, exit_code: i32 },

    /// I/O error on the control socket itself. Poisons the handle.
    #[error("control socket I/O error")]
    Transport {
        #[from]
        cause: std::io::Error,
    },

    /// A syscall used during sandbox construction returned an unexpected
    /// errno; carries the raw code for diagnostics.
    #[error("syscall failed (errno {code})")]
    Syscall { code: i32 },

    /// `chroot_dir` / `isolation_root` failed validation before the sandbox
    /// was ever entered.
    #[error("invalid sandbox configuration: {reason}")]
    InvalidConfig { reason: String },

    /// Operation attempted on a handle already marked poisoned.
    #[error("spawner handle is poisoned")]
    Poisoned,
}

impl Error {
    /// Whether observing this error should cause the owning
    /// [`crate::SpawnerHandle`] to become poisoned (§3 invariants).
    pub fn poisons(&self) -> bool {
        matches!(self, Error::Protocol { .. } | Error::Transport { .. })
    }

    pub(crate) fn syscall(code: i32) -> Self {
        Error::Syscall { code }
    }
}

impl From<nix::Error> for Error {
    fn from(err: nix::Error) -> Self {
        match err.as_errno() {
            Some(errno) => Error::Syscall { code: errno as i32 },
            None => Error::Syscall { code: -1 },
        }
    }
}

impl From<crate::protocol::IpcError> for Error {
    fn from(err: crate::protocol::IpcError) -> Self {
        match err {
            crate::protocol::IpcError::Serde(e) => Error::Protocol {
                reason: e.to_string(),
            },
            crate::protocol::IpcError::Syscall(e) => Error::from(e),
            crate::protocol::IpcError::Io(e) => Error::Transport { cause: e },
            crate::protocol::IpcError::Ancillary => Error::Protocol {
                reason: "unexpected ancillary data (fd count mismatch)".into(),
            },
            crate::protocol::IpcError::Eof => Error::Protocol {
                reason: "peer closed the control socket mid-frame".into(),
            },
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
