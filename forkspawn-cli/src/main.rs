//! Demonstration binary exercising the library end to end. Not part of
//! the supervisor protocol itself — it registers one entry point that
//! `execv`s the requested binary, so it can stand in for "run this
//! program sandboxed" during manual testing.

use anyhow::Context;
use clap::Clap;
use forkspawn::{NetworkConfig, Registry, RegistryBuilder, SandboxConfig, Settings, SpawnerHandle};
use std::io::{Read, Write};
use std::net::Ipv4Addr;

fn parse_env_item(src: &str) -> Result<(String, String), String> {
    let p = src.find('=').ok_or("env item doesn't look like KEY=VAL")?;
    Ok((src[..p].to_string(), src[p + 1..].to_string()))
}

#[derive(Clap, Debug)]
struct Opt {
    /// Full path of the executable to run inside the sandbox.
    #[clap(name = "bin")]
    executable: String,

    /// Extra argv entries (argv[0] is always `bin`).
    #[clap(short = 'a', long = "arg")]
    argv: Vec<String>,

    /// Environment variables (KEY=VAL) for the spawner process.
    #[clap(short = 'e', long, parse(try_from_str = parse_env_item))]
    env: Vec<(String, String)>,

    /// chroot root for the sandboxed child.
    #[clap(short = 'r', long = "root")]
    chroot_dir: Option<String>,

    /// Give the child a private veth pair instead of loopback-only
    /// networking. Format: kernel_veth,child_veth,kernel_ip,child_ip,gateway,prefix.
    #[clap(long = "network")]
    network: Option<String>,

    /// Skip the startup feature probe.
    #[clap(long)]
    skip_system_check: bool,

    /// Let the child keep its capabilities (off by default).
    #[clap(long)]
    keep_capabilities: bool,
}

fn parse_network(spec: &str) -> Result<NetworkConfig, String> {
    let parts: Vec<&str> = spec.split(',').collect();
    if parts.len() != 6 {
        return Err("--network expects kernel_veth,child_veth,kernel_ip,child_ip,gateway,prefix".into());
    }
    Ok(NetworkConfig {
        kernel_veth_name: parts[0].to_string(),
        child_veth_name: parts[1].to_string(),
        kernel_ipv4: parts[2].parse::<Ipv4Addr>().map_err(|e| e.to_string())?,
        child_ipv4: parts[3].parse::<Ipv4Addr>().map_err(|e| e.to_string())?,
        child_ipv4_gateway: parts[4].parse::<Ipv4Addr>().map_err(|e| e.to_string())?,
        prefix_len: parts[5].parse().map_err(|e: std::num::ParseIntError| e.to_string())?,
    })
}

/// `execv`s `args[0]` with `args[1..]` as its argv. Runs inside the
/// already-sandboxed subspawner, after the seccomp filter that
/// deliberately allows `execve` for this one registered entry point.
fn exec_entry(args: Vec<Vec<u8>>) -> i32 {
    if args.is_empty() {
        return 127;
    }
    let path = match std::ffi::CString::new(args[0].clone()) {
        Ok(p) => p,
        Err(_) => return 126,
    };
    let argv: Vec<std::ffi::CString> = args
        .iter()
        .map(|a| std::ffi::CString::new(a.clone()).unwrap_or_default())
        .collect();
    let mut argv_ptrs: Vec<*const libc::c_char> = argv.iter().map(|c| c.as_ptr()).collect();
    argv_ptrs.push(std::ptr::null());
    unsafe {
        libc::execv(path.as_ptr(), argv_ptrs.as_ptr());
    }
    127
}

fn build_registry() -> Registry {
    RegistryBuilder::new().register("exec", exec_entry).build()
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();
    let opt: Opt = Clap::parse();

    if !opt.skip_system_check {
        let res = forkspawn::check();
        for w in res.warnings() {
            eprintln!("warning: {}", w);
        }
        for e in res.errors() {
            eprintln!("error: {}", e);
        }
    }

    let network = opt
        .network
        .as_deref()
        .map(parse_network)
        .transpose()
        .map_err(|e| anyhow::anyhow!("invalid --network: {}", e))?;

    let settings = Settings::new(build_registry());
    let mut handle =
        SpawnerHandle::open(settings, opt.env.clone()).context("failed to start spawner")?;

    let sandbox_config = SandboxConfig {
        chroot_dir: opt.chroot_dir.map(Into::into),
        network,
        drop_capabilities: !opt.keep_capabilities,
        ..SandboxConfig::default()
    };

    let mut args = vec![opt.executable.clone().into_bytes()];
    args.extend(opt.argv.iter().map(|a| a.clone().into_bytes()));

    let mut child = handle
        .spawn("exec", args, "forkspawn-cli-child", sandbox_config)
        .context("spawn failed")?;
    drop(child.stdin);

    let pid = child.pid;
    let mut stdout_buf = Vec::new();
    let mut stderr_buf = Vec::new();
    let _ = child.stdout.read_to_end(&mut stdout_buf);
    let _ = child.stderr.read_to_end(&mut stderr_buf);
    std::io::stdout().write_all(&stdout_buf).ok();
    std::io::stderr().write_all(&stderr_buf).ok();

    if let Ok(wait) = handle.wait_for_exit(pid) {
        let _ = wait.await;
    }
    let exit_code = loop {
        if let Some(code) = handle.get_exit_code(pid).context("failed to read exit code")? {
            break code;
        }
    };
    println!("---> child process {} exited with code {} <---", pid, exit_code);
    handle.close().context("failed to close spawner handle")?;
    Ok(())
}
