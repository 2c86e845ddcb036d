//! The long-lived forkserver process (§4.1, §4.2): owns the preloaded
//! registry, forks one subspawner per `SPAWN`, and never runs user code
//! itself.

use crate::error::Result;
use crate::fd::Fd;
use crate::pipe;
use crate::protocol::{IpcError, Socket};
use crate::sandbox;
use crate::settings::Settings;
use crate::util::Pid;
use crate::child;
use crate::wire::{Query, Reply, SpawnReply, SpawnRequest};
use nix::sys::wait::{WaitPidFlag, WaitStatus};
use nix::unistd::ForkResult;

struct Task {
    pid: Pid,
    exit_code: Option<i32>,
}

/// Runs the control loop. Never returns: exits 0 on orderly socket EOF
/// (§4.1), nonzero on a malformed frame (no resync attempted).
pub(crate) fn run(mut sock: Socket, settings: Settings) -> ! {
    let mut tasks: Vec<Task> = Vec::new();
    loop {
        reap_finished(&mut tasks);
        let query: Query = match sock.recv() {
            Ok(q) => q,
            Err(IpcError::Eof) => std::process::exit(0),
            Err(e) => {
                tracing::error!(error = %e, "malformed control frame, exiting");
                std::process::exit(1);
            }
        };
        let outcome = match query {
            Query::Spawn(req) => process_spawn(&mut sock, &mut tasks, &settings, req),
            Query::GetExitCode { pid } => process_get_exit_code(&mut sock, &mut tasks, pid),
        };
        if let Err(e) = outcome {
            tracing::error!(error = %e, "control loop I/O error, exiting");
            std::process::exit(1);
        }
    }
}

fn process_spawn(
    sock: &mut Socket,
    tasks: &mut Vec<Task>,
    settings: &Settings,
    req: SpawnRequest,
) -> Result<()> {
    let stdio = pipe::new_stdio_pipes()?;
    let (uid_done_r, uid_done_w) = nix::unistd::pipe().map(|(r, w)| (Fd::new(r), Fd::new(w)))?;
    let (unshare_done_r, unshare_done_w) =
        nix::unistd::pipe().map(|(r, w)| (Fd::new(r), Fd::new(w)))?;

    let child = match unsafe { nix::unistd::fork() } {
        Ok(ForkResult::Child) => {
            // Subspawner: drop our copy of the write end first, or the
            // read below would never see EOF once the parent drops its own.
            drop(uid_done_w);
            drop(unshare_done_r);
            run_subspawner(settings, req, stdio, unshare_done_w, uid_done_r)
        }
        Ok(ForkResult::Parent { child }) => child,
        Err(e) => {
            // Transient (ENOMEM/EAGAIN) — doesn't poison the handle, the
            // caller may retry (§4.2, §7).
            close_stdio(&stdio);
            let errno = e.as_errno().map(|e| e as i32).unwrap_or(-1);
            tracing::warn!(errno, "fork failed while handling a spawn request");
            sock.send(&Reply::Spawn(SpawnReply {
                pid: 0,
                fork_errno: errno,
            }))?;
            return Ok(());
        }
    };

    unsafe {
        libc::close(stdio.stdin_child);
        libc::close(stdio.stdout_child);
        libc::close(stdio.stderr_child);
    }
    drop(unshare_done_w);

    // Only write the maps once the subspawner has actually unshared its
    // user namespace; writing against the wrong (outer) namespace fails
    // with EPERM. If the subspawner died before getting that far, this
    // read sees EOF and we skip the write — its own exit code already
    // reports the sandbox-setup failure.
    let mut buf = [0u8; 1];
    match unshare_done_r.read(&mut buf) {
        Ok(n) if n > 0 => {
            if let Err(e) = sandbox::write_uid_gid_map(child.as_raw()) {
                tracing::error!(error = %e, pid = child.as_raw(), "failed to write uid/gid map");
            }
        }
        _ => tracing::warn!(
            pid = child.as_raw(),
            "subspawner exited before unsharing; skipping uid/gid map"
        ),
    }
    drop(uid_done_w); // closing signals the waiting read end

    tasks.push(Task {
        pid: child.as_raw(),
        exit_code: None,
    });

    sock.send(&Reply::Spawn(SpawnReply {
        pid: child.as_raw(),
        fork_errno: 0,
    }))?;
    let fds = vec![
        Fd::new(stdio.stdin_parent),
        Fd::new(stdio.stdout_parent),
        Fd::new(stdio.stderr_parent),
    ];
    sock.send_fds(&fds)?;
    Ok(())
}

fn close_stdio(stdio: &pipe::StdioPipes) {
    unsafe {
        libc::close(stdio.stdin_child);
        libc::close(stdio.stdin_parent);
        libc::close(stdio.stdout_child);
        libc::close(stdio.stdout_parent);
        libc::close(stdio.stderr_child);
        libc::close(stdio.stderr_parent);
    }
}

fn run_subspawner(
    settings: &Settings,
    req: SpawnRequest,
    stdio: pipe::StdioPipes,
    unshare_done_w: Fd,
    uid_done_r: Fd,
) -> ! {
    unsafe {
        libc::close(stdio.stdin_parent);
        libc::close(stdio.stdout_parent);
        libc::close(stdio.stderr_parent);
    }
    set_process_name(&req.process_name);

    let parent_pid = unsafe { libc::getppid() };
    sandbox::construct(
        &req.sandbox_config,
        &settings.default_limits,
        parent_pid,
        &unshare_done_w,
        &uid_done_r,
        settings.allow_unsupported_mount_namespace,
    );

    child::dispatch(
        &settings.registry,
        &req.entry_point,
        req.args,
        child::ChildIo {
            stdin: Fd::new(stdio.stdin_child),
            stdout: Fd::new(stdio.stdout_child),
            stderr: Fd::new(stdio.stderr_child),
        },
    );
}

fn set_process_name(name: &str) {
    let mut buf = [0u8; 16];
    let bytes = name.as_bytes();
    let n = bytes.len().min(15);
    buf[..n].copy_from_slice(&bytes[..n]);
    unsafe {
        libc::prctl(libc::PR_SET_NAME, buf.as_ptr() as libc::c_ulong, 0, 0, 0);
    }
}

fn process_get_exit_code(sock: &mut Socket, tasks: &mut Vec<Task>, pid: Pid) -> Result<()> {
    if let Some(task) = tasks.iter().find(|t| t.pid == pid) {
        if let Some(code) = task.exit_code {
            sock.send(&Reply::ExitCode(Some(code)))?;
            return Ok(());
        }
    }
    let status = nix::sys::wait::waitpid(
        Some(nix::unistd::Pid::from_raw(pid)),
        Some(WaitPidFlag::WNOHANG),
    )?;
    let code = record_status(tasks, status);
    sock.send(&Reply::ExitCode(code))?;
    Ok(())
}

fn reap_finished(tasks: &mut [Task]) {
    loop {
        match nix::sys::wait::waitpid(None, Some(WaitPidFlag::WNOHANG)) {
            Ok(status @ (WaitStatus::Exited(..) | WaitStatus::Signaled(..))) => {
                record_status(tasks, status);
            }
            _ => break,
        }
    }
}

fn record_status(tasks: &mut [Task], status: WaitStatus) -> Option<i32> {
    match status {
        WaitStatus::Exited(pid, code) => {
            if let Some(t) = tasks.iter_mut().find(|t| t.pid == pid.as_raw()) {
                t.exit_code = Some(code);
            }
            Some(code)
        }
        WaitStatus::Signaled(pid, signal, _) => {
            let code = 128 + signal as i32;
            if let Some(t) = tasks.iter_mut().find(|t| t.pid == pid.as_raw()) {
                t.exit_code = Some(code);
            }
            Some(code)
        }
        _ => None,
    }
}
