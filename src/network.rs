//! Network setup — sandbox construction step 3 (§4.3), run from inside the
//! freshly unshared user+network namespace before the chroot.
//!
//! Only runs when a [`crate::wire::NetworkConfig`] is present on the
//! request; otherwise the caller just brings `lo` up and moves on.

use crate::error::{Error, Result};
use crate::util::sandbox_step_exit_code;
use crate::wire::NetworkConfig;
use futures::TryStreamExt;
use rtnetlink::Handle;

const STEP: u8 = 3;

fn step_err<E: std::fmt::Display>(e: E) -> Error {
    tracing::error!(error = %e, "network namespace setup failed");
    Error::SandboxSetup {
        step: STEP,
        exit_code: sandbox_step_exit_code(STEP),
    }
}

/// Brings `lo` up and, if `config` is present, creates the veth pair,
/// hands the kernel side back to `parent_pid`, and addresses/routes the
/// child side. Blocks on a throwaway current-thread runtime: the caller
/// (subspawner) is not itself async, and spinning up a full reactor for
/// one ioctl sequence is wasteful.
pub(crate) fn setup(config: Option<&NetworkConfig>, parent_pid: libc::pid_t) -> Result<()> {
    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_io()
        .build()
        .map_err(step_err)?;
    rt.block_on(setup_async(config, parent_pid))
}

async fn setup_async(config: Option<&NetworkConfig>, parent_pid: libc::pid_t) -> Result<()> {
    let (connection, handle, _) = rtnetlink::new_connection().map_err(step_err)?;
    tokio::spawn(connection);

    bring_up_loopback(&handle).await?;

    if let Some(cfg) = config {
        setup_veth(&handle, cfg, parent_pid).await?;
    }
    Ok(())
}

async fn bring_up_loopback(handle: &Handle) -> Result<()> {
    let mut links = handle.link().get().match_name("lo".into()).execute();
    let lo = links
        .try_next()
        .await
        .map_err(step_err)?
        .ok_or_else(|| step_err("loopback interface not found in new netns"))?;
    handle
        .link()
        .set(lo.header.index)
        .up()
        .execute()
        .await
        .map_err(step_err)
}

async fn setup_veth(handle: &Handle, cfg: &NetworkConfig, parent_pid: libc::pid_t) -> Result<()> {
    handle
        .link()
        .add()
        .veth(cfg.kernel_veth_name.clone(), cfg.child_veth_name.clone())
        .execute()
        .await
        .map_err(step_err)?;

    let kernel_idx = link_index(handle, &cfg.kernel_veth_name).await?;
    let child_idx = link_index(handle, &cfg.child_veth_name).await?;

    // Move the host-side end back out to the parent's network namespace so
    // it can be bridged/NAT'd there (§6 deployment precondition).
    handle
        .link()
        .set(kernel_idx)
        .setns_by_pid(parent_pid as u32)
        .execute()
        .await
        .map_err(step_err)?;

    handle
        .address()
        .add(child_idx, cfg.child_ipv4.into(), cfg.prefix_len)
        .execute()
        .await
        .map_err(step_err)?;

    handle
        .link()
        .set(child_idx)
        .up()
        .execute()
        .await
        .map_err(step_err)?;

    handle
        .route()
        .add()
        .v4()
        .gateway(cfg.child_ipv4_gateway)
        .execute()
        .await
        .map_err(step_err)
}

async fn link_index(handle: &Handle, name: &str) -> Result<u32> {
    let mut links = handle.link().get().match_name(name.to_string()).execute();
    let link = links
        .try_next()
        .await
        .map_err(step_err)?
        .ok_or_else(|| step_err(format!("veth interface {} not found", name)))?;
    Ok(link.header.index)
}
