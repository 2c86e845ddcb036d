//! End-to-end tests against real namespaces/seccomp. Gated with
//! `#[ignore]` since they need unprivileged user namespaces enabled on
//! the host (not true of every CI sandbox) — run explicitly with
//! `cargo test -- --ignored`. One process (the test) drives spawns
//! against another (the forkserver).

use forkspawn::{RegistryBuilder, SandboxConfig, Settings, SpawnerHandle};
use std::io::Read;

fn ret1(_args: Vec<Vec<u8>>) -> i32 {
    1
}

fn echo_args(args: Vec<Vec<u8>>) -> i32 {
    args.len() as i32
}

fn check_root(_args: Vec<Vec<u8>>) -> i32 {
    if std::path::Path::new("/this-should-not-exist-outside-chroot").exists() {
        1
    } else {
        0
    }
}

fn check_capabilities(_args: Vec<Vec<u8>>) -> i32 {
    match caps::read(None, caps::CapSet::Effective) {
        Ok(set) if set.is_empty() => 0,
        _ => 1,
    }
}

fn open_handle() -> SpawnerHandle {
    let registry = RegistryBuilder::new()
        .register("ret1", ret1)
        .register("echo_args", echo_args)
        .register("check_root", check_root)
        .register("check_capabilities", check_capabilities)
        .build();
    SpawnerHandle::open(Settings::new(registry), std::env::vars()).expect("spawner failed to start")
}

fn wait_for(handle: &mut SpawnerHandle, pid: libc::pid_t) -> i32 {
    loop {
        if let Some(code) = handle.get_exit_code(pid).expect("get_exit_code failed") {
            return code;
        }
    }
}

#[test]
#[ignore]
fn basic_spawn_returns_entry_point_code() {
    let mut handle = open_handle();
    let child = handle
        .spawn("ret1", vec![], "ret1-job", SandboxConfig::default())
        .expect("spawn failed");
    assert_eq!(wait_for(&mut handle, child.pid), 1);
    handle.close().unwrap();
}

#[test]
#[ignore]
fn args_are_delivered_to_the_entry_point() {
    let mut handle = open_handle();
    let args = vec![b"one".to_vec(), b"two".to_vec(), b"three".to_vec()];
    let child = handle
        .spawn("echo_args", args, "echo-job", SandboxConfig::default())
        .expect("spawn failed");
    assert_eq!(wait_for(&mut handle, child.pid), 3);
    handle.close().unwrap();
}

#[test]
#[ignore]
fn stdout_is_readable_by_the_parent() {
    let mut handle = open_handle();
    let child = handle
        .spawn("ret1", vec![], "stdio-job", SandboxConfig::default())
        .expect("spawn failed");
    let mut out = Vec::new();
    let mut stdout = child.stdout;
    stdout.read_to_end(&mut out).expect("read failed");
    assert!(out.is_empty(), "entry point writes nothing, pipe should just EOF");
    assert_eq!(wait_for(&mut handle, child.pid), 1);
    handle.close().unwrap();
}

#[test]
#[ignore]
fn chroot_confines_the_child() {
    std::fs::write("/this-should-not-exist-outside-chroot", b"marker").ok();
    let dir = tempfile::tempdir().unwrap();
    let mut handle = open_handle();
    let config = SandboxConfig {
        chroot_dir: Some(dir.path().to_path_buf()),
        ..SandboxConfig::default()
    };
    let child = handle
        .spawn("check_root", vec![], "chroot-job", config)
        .expect("spawn failed");
    assert_eq!(wait_for(&mut handle, child.pid), 0);
    handle.close().unwrap();
}

#[test]
#[ignore]
fn capabilities_are_dropped_by_default() {
    let mut handle = open_handle();
    let child = handle
        .spawn("check_capabilities", vec![], "caps-job", SandboxConfig::default())
        .expect("spawn failed");
    assert_eq!(wait_for(&mut handle, child.pid), 0);
    handle.close().unwrap();
}

#[test]
#[ignore]
fn killing_the_returned_pid_tears_down_the_subtree() {
    let mut handle = open_handle();
    let child = handle
        .spawn("ret1", vec![], "kill-job", SandboxConfig::default())
        .expect("spawn failed");
    nix::sys::signal::kill(
        nix::unistd::Pid::from_raw(child.pid),
        nix::sys::signal::Signal::SIGKILL,
    )
    .expect("kill failed");
    let code = wait_for(&mut handle, child.pid);
    assert_eq!(code, 128 + libc::SIGKILL);
    handle.close().unwrap();
}
