//! Parent-side handle to a spawner process (§3 "SpawnerHandle", §4.1).
//!
//! `SpawnerHandle` wraps a control socket to one forked-off spawner
//! process. Creating a second handle starts a second, fully independent
//! spawner.

use crate::error::{Error, Result};
use crate::pipe::{ReadPipe, WritePipe};
use crate::protocol::{IpcError, Socket};
use crate::settings::Settings;
use crate::util::Pid;
use crate::wait::WaitFuture;
use crate::wire::{Query, Reply, SandboxConfig, SpawnRequest};
use crate::zygote;
use nix::unistd::ForkResult;

/// A sandboxed child as handed back to the caller (§3 "ChildProcess").
/// All three fds are owned by the caller from this point on.
pub struct SpawnedChild {
    pub pid: Pid,
    pub stdin: WritePipe,
    pub stdout: ReadPipe,
    pub stderr: ReadPipe,
}

/// Owns the control socket to one spawner process. Either healthy or
/// poisoned (§3 invariants); once poisoned, every method returns
/// `Error::Poisoned` without touching the socket.
pub struct SpawnerHandle {
    sock: Socket,
    spawner_pid: Pid,
    poisoned: bool,
    handled_first_request: bool,
}

impl SpawnerHandle {
    /// Forks a spawner process that runs the control loop over `settings`'s
    /// registry, resetting its environment to `envs` first (§4.1 step 1).
    /// Preload itself can't fail here — the registry is already built and
    /// frozen before `open` is ever called (§9, "clone-once,
    /// dispatch-many") — so this only fails if the fork itself does.
    pub fn open(settings: Settings, envs: impl IntoIterator<Item = (String, String)>) -> Result<Self> {
        let (mut parent_sock, child_sock) = Socket::pair()?;

        match unsafe { nix::unistd::fork() }? {
            ForkResult::Child => {
                drop(parent_sock);
                reset_environment(envs);
                crate::check::run_all_feature_checks();
                zygote::run(child_sock, settings);
            }
            ForkResult::Parent { child } => {
                drop(child_sock);
                Ok(SpawnerHandle {
                    sock: parent_sock,
                    spawner_pid: child.as_raw(),
                    poisoned: false,
                    handled_first_request: false,
                })
            }
        }
    }

    fn check_poisoned(&self) -> Result<()> {
        if self.poisoned {
            return Err(Error::Poisoned);
        }
        Ok(())
    }

    fn request(&mut self, query: Query) -> Result<Reply> {
        self.check_poisoned()?;
        let outcome = self.sock.send(&query).and_then(|()| self.sock.recv::<Reply>());
        match outcome {
            Ok(reply) => {
                self.handled_first_request = true;
                Ok(reply)
            }
            Err(IpcError::Eof) if !self.handled_first_request => {
                self.poisoned = true;
                Err(Error::Startup {
                    reason: "spawner exited before handling its first request".into(),
                })
            }
            Err(e) => {
                let e: Error = e.into();
                if e.poisons() {
                    self.poisoned = true;
                }
                Err(e)
            }
        }
    }

    /// Issues one `SPAWN` request and waits for the matching
    /// `SPAWN_REPLY` (§4.2). The protocol is strictly request/response, so
    /// this call blocks until the spawner has forked the subspawner.
    /// `entry_point` is resolved against the registry `open` was given;
    /// `process_name` only sets the subspawner's cosmetic process title.
    pub fn spawn(
        &mut self,
        entry_point: impl Into<String>,
        args: Vec<Vec<u8>>,
        process_name: impl Into<String>,
        sandbox_config: SandboxConfig,
    ) -> Result<SpawnedChild> {
        let req = SpawnRequest {
            entry_point: entry_point.into(),
            args,
            process_name: process_name.into(),
            sandbox_config,
        };

        let reply = self.request(Query::Spawn(req))?;
        let spawn_reply = match reply {
            Reply::Spawn(r) => r,
            Reply::ExitCode(_) => {
                self.poisoned = true;
                return Err(Error::Protocol {
                    reason: "expected SPAWN_REPLY, got an exit-code reply".into(),
                });
            }
        };
        if spawn_reply.pid == 0 {
            return Err(Error::SpawnFork {
                code: spawn_reply.fork_errno,
            });
        }

        let fds = match self.sock.recv_fds(3) {
            Ok(fds) => fds,
            Err(e) => {
                self.poisoned = true;
                return Err(Error::from(e));
            }
        };
        let mut fds = fds.into_iter();
        let stdin = fds.next().ok_or_else(protocol_fd_error)?;
        let stdout = fds.next().ok_or_else(protocol_fd_error)?;
        let stderr = fds.next().ok_or_else(protocol_fd_error)?;

        Ok(SpawnedChild {
            pid: spawn_reply.pid,
            stdin: WritePipe::new(stdin.into_raw()),
            stdout: ReadPipe::new(stdout.into_raw()),
            stderr: ReadPipe::new(stderr.into_raw()),
        })
    }

    /// Asks the spawner for `pid`'s exit code (synchronous, §5 "the
    /// original parent performs waitpid" — routed through the spawner
    /// since it, not the caller, is `pid`'s real OS parent). Returns
    /// `None` while the child is still running.
    pub fn get_exit_code(&mut self, pid: Pid) -> Result<Option<i32>> {
        match self.request(Query::GetExitCode { pid })? {
            Reply::ExitCode(code) => Ok(code),
            Reply::Spawn(_) => {
                self.poisoned = true;
                Err(Error::Protocol {
                    reason: "expected an exit-code reply, got SPAWN_REPLY".into(),
                })
            }
        }
    }

    /// Async convenience future that resolves once `pid` has exited,
    /// ambient to and not a replacement for `get_exit_code` (§5).
    pub fn wait_for_exit(&self, pid: Pid) -> Result<WaitFuture> {
        WaitFuture::new(pid)
    }

    /// Closes the control socket and reaps the spawner process.
    pub fn close(mut self) -> Result<()> {
        self.check_poisoned()?;
        self.poisoned = true;
        self.reap();
        Ok(())
    }

    fn reap(&self) {
        let _ = nix::sys::wait::waitpid(nix::unistd::Pid::from_raw(self.spawner_pid), None);
    }
}

impl Drop for SpawnerHandle {
    fn drop(&mut self) {
        // Best-effort: a caller that drops the handle instead of calling
        // `close` shouldn't leave a zombie spawner process behind.
        let _ = nix::sys::wait::waitpid(
            nix::unistd::Pid::from_raw(self.spawner_pid),
            Some(nix::sys::wait::WaitPidFlag::WNOHANG),
        );
    }
}

fn protocol_fd_error() -> Error {
    Error::Protocol {
        reason: "SPAWN_REPLY did not carry all three stdio fds".into(),
    }
}

fn reset_environment(envs: impl IntoIterator<Item = (String, String)>) {
    for (key, _) in std::env::vars() {
        std::env::remove_var(key);
    }
    for (key, value) in envs {
        std::env::set_var(key, value);
    }
}
