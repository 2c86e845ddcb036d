//! Forkserver-based supervisor for spawning sandboxed Linux child
//! processes.
//!
//! A long-lived **spawner** process preloads a registry of entry points
//! once; each call to [`SpawnerHandle::spawn`] forks a cheap subspawner
//! that inherits that preloaded state copy-on-write, builds a sandbox
//! around itself (fresh namespaces, dropped capabilities, a seccomp
//! filter, optional private network, optional chroot), and dispatches
//! straight into the requested entry point — no `exec` involved.
//!
//! ```no_run
//! use forkspawn::{RegistryBuilder, Settings, SandboxConfig, SpawnerHandle};
//!
//! fn echo(args: Vec<Vec<u8>>) -> i32 {
//!     args.len() as i32
//! }
//!
//! let registry = RegistryBuilder::new().register("echo", echo).build();
//! let settings = Settings::new(registry);
//! let mut handle = SpawnerHandle::open(settings, std::env::vars()).unwrap();
//! let child = handle
//!     .spawn("echo", vec![b"hi".to_vec()], "echo-job", SandboxConfig::default())
//!     .unwrap();
//! let code = loop {
//!     if let Some(code) = handle.get_exit_code(child.pid).unwrap() {
//!         break code;
//!     }
//! };
//! assert_eq!(code, 1);
//! ```

mod capabilities;
mod child;
mod check;
mod error;
mod fd;
mod limits;
mod network;
mod pipe;
mod protocol;
mod registry;
mod sandbox;
mod seccomp;
mod settings;
mod spawner;
mod util;
mod wait;
mod wire;
mod zygote;

pub use check::{check, CheckResult};
pub use error::{Error, Result};
pub use registry::{EntryPoint, Registry, RegistryBuilder};
pub use settings::Settings;
pub use spawner::{SpawnedChild, SpawnerHandle};
pub use wait::WaitFuture;
pub use wire::{NetworkConfig, SandboxConfig};

pub use limits::ResourceLimits;
