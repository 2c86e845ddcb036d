//! Process-wide tunables that are not part of a per-spawn request.

use crate::limits::ResourceLimits;
use crate::registry::Registry;
use std::sync::Arc;

/// Configuration for one [`crate::Spawner`] instance. Unlike
/// [`crate::wire::SandboxConfig`], these values apply to every spawn made
/// through the instance and cannot be overridden per-request.
#[non_exhaustive]
#[derive(Clone)]
pub struct Settings {
    /// Entry points a spawned child is allowed to dispatch to, built once
    /// before the spawner forks off its first subspawner (§4.1 preload).
    pub registry: Arc<Registry>,

    /// Defaults applied to every sandbox unless a request overrides them.
    /// Mirrors the "Default resource limits" table (§6).
    pub default_limits: ResourceLimits,

    /// If set, `unshare`'s `CLONE_NEWNS` failure is logged and ignored
    /// instead of aborting sandbox construction. Needed under some nested
    /// container runtimes that forbid a further mount namespace.
    pub allow_unsupported_mount_namespace: bool,
}

impl Settings {
    pub fn new(registry: Registry) -> Self {
        Settings {
            registry: Arc::new(registry),
            default_limits: ResourceLimits::default(),
            allow_unsupported_mount_namespace: std::env::var_os(
                "FORKSPAWN_ALLOW_UNSUPPORTED_MOUNT_NS",
            )
            .is_some(),
        }
    }
}

impl std::fmt::Debug for Settings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Settings")
            .field("registry_len", &self.registry.len())
            .field("default_limits", &self.default_limits)
            .field(
                "allow_unsupported_mount_namespace",
                &self.allow_unsupported_mount_namespace,
            )
            .finish()
    }
}
