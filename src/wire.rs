//! Wire types exchanged over the parent↔spawner control socket (§3, §4.5).

use serde::{Deserialize, Serialize};
use std::{net::Ipv4Addr, path::PathBuf};

/// One veth pair description for the sandbox's optional private network
/// (§4.3 step 3).
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct NetworkConfig {
    pub kernel_veth_name: String,
    pub child_veth_name: String,
    pub kernel_ipv4: Ipv4Addr,
    pub child_ipv4: Ipv4Addr,
    pub child_ipv4_gateway: Ipv4Addr,
    /// CIDR prefix length shared by `kernel_ipv4`/`child_ipv4` (24 or 30).
    pub prefix_len: u8,
}

/// Per-spawn sandbox policy. Defaults are the conservative values named in
/// §6; a caller opts out of a protection explicitly.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct SandboxConfig {
    /// Must reside on a filesystem distinct from `/`; not verified by this
    /// crate (documented precondition, §4.3 step 4).
    pub chroot_dir: Option<PathBuf>,
    pub network: Option<NetworkConfig>,
    pub drop_capabilities: bool,
    pub skip_sandbox_seccomp: bool,
    pub enable_coredumps: bool,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        SandboxConfig {
            chroot_dir: None,
            network: None,
            drop_capabilities: true,
            skip_sandbox_seccomp: false,
            enable_coredumps: false,
        }
    }
}

/// A request to spawn one sandboxed child, sent as the payload of a
/// `SPAWN` frame.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct SpawnRequest {
    /// Name resolved against the spawner's [`crate::registry::Registry`].
    pub entry_point: String,
    /// Opaque blobs handed verbatim to the entry point; the spawner never
    /// inspects them.
    pub args: Vec<Vec<u8>>,
    pub process_name: String,
    pub sandbox_config: SandboxConfig,
}

#[derive(Serialize, Deserialize, Debug)]
pub(crate) enum Query {
    Spawn(SpawnRequest),
    GetExitCode { pid: libc::pid_t },
}

/// Reply to a `Spawn` query. `pid == 0` means the fork itself failed; in
/// that case no fds accompany the reply (§4.2).
#[derive(Serialize, Deserialize, Debug)]
pub(crate) struct SpawnReply {
    pub pid: libc::pid_t,
    pub fork_errno: i32,
}

#[derive(Serialize, Deserialize, Debug)]
pub(crate) enum Reply {
    Spawn(SpawnReply),
    ExitCode(Option<i32>),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sandbox_config_default_matches_documented_policy() {
        let config = SandboxConfig::default();
        assert!(config.chroot_dir.is_none());
        assert!(config.network.is_none());
        assert!(config.drop_capabilities);
        assert!(!config.skip_sandbox_seccomp);
        assert!(!config.enable_coredumps);
    }
}
