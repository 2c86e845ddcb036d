//! Framed control socket: a `SOCK_SEQPACKET` pair carrying length-prefixed
//! JSON frames plus out-of-band fd passing via `SCM_RIGHTS` (§4.5).

use crate::fd::Fd;
use nix::sys::{
    socket::{
        recvmsg, sendmsg, socketpair, AddressFamily, ControlMessage, ControlMessageOwned, MsgFlags,
        SockFlag, SockType,
    },
    uio::IoVec,
};
use serde::{de::DeserializeOwned, Serialize};

#[derive(thiserror::Error, Debug)]
pub enum IpcError {
    #[error("serialization error")]
    Serde(#[from] serde_json::Error),
    #[error("syscall failed")]
    Syscall(#[from] nix::Error),
    #[error("io error")]
    Io(#[from] std::io::Error),
    #[error("unexpected ancillary message")]
    Ancillary,
    #[error("peer closed the socket")]
    Eof,
}

pub const MAX_FD_COUNT: usize = 3;

/// One endpoint of the parent↔spawner control socket.
pub struct Socket {
    fd: Fd,
}

impl Socket {
    /// Creates the `socketpair` used between the parent and a freshly
    /// started spawner (§4.1), or between spawner and subspawner for the
    /// single SPAWN_REPLY exchange (§4.2).
    pub fn pair() -> Result<(Self, Self), IpcError> {
        let (a, b) = socketpair(
            AddressFamily::Unix,
            SockType::SeqPacket,
            None,
            SockFlag::SOCK_CLOEXEC,
        )?;
        Ok((Socket { fd: Fd::new(a) }, Socket { fd: Fd::new(b) }))
    }

    pub fn send<T: Serialize>(&mut self, message: &T) -> Result<(), IpcError> {
        let body = serde_json::to_vec(message)?;
        let len = (body.len() as u32).to_le_bytes();
        sendmsg(
            self.fd.as_raw(),
            &[IoVec::from_slice(&len)],
            &[],
            MsgFlags::empty(),
            None,
        )?;
        sendmsg(
            self.fd.as_raw(),
            &[IoVec::from_slice(&body)],
            &[],
            MsgFlags::empty(),
            None,
        )?;
        Ok(())
    }

    pub fn recv<T: DeserializeOwned>(&mut self) -> Result<T, IpcError> {
        let mut len_buf = [0u8; 4];
        let n = recvmsg(
            self.fd.as_raw(),
            &[IoVec::from_mut_slice(&mut len_buf)],
            None,
            MsgFlags::empty(),
        )?
        .bytes;
        if n == 0 {
            return Err(IpcError::Eof);
        }
        let len = u32::from_le_bytes(len_buf) as usize;

        let mut body = vec![0u8; len];
        let n = recvmsg(
            self.fd.as_raw(),
            &[IoVec::from_mut_slice(&mut body)],
            None,
            MsgFlags::empty(),
        )?
        .bytes;
        if n == 0 {
            return Err(IpcError::Eof);
        }
        Ok(serde_json::from_slice(&body)?)
    }

    /// Sends `fds` as their own `SCM_RIGHTS` message rather than riding
    /// along in the ancillary data of the preceding `Spawn` reply frame.
    /// Works because `SOCK_SEQPACKET` preserves message boundaries, but it
    /// is two `sendmsg`s instead of the one the wire description assumes.
    pub fn send_fds(&mut self, fds: &[Fd]) -> Result<(), IpcError> {
        assert!(fds.len() <= MAX_FD_COUNT);
        let raw_fds: Vec<_> = fds.iter().map(|fd| fd.as_raw()).collect();
        sendmsg(
            self.fd.as_raw(),
            &[IoVec::from_slice(b"_")],
            &[ControlMessage::ScmRights(&raw_fds)],
            MsgFlags::empty(),
            None,
        )?;
        Ok(())
    }

    pub fn recv_fds(&mut self, fd_count: usize) -> Result<Vec<Fd>, IpcError> {
        assert!(fd_count <= MAX_FD_COUNT);
        let mut buf = [0u8; 1];
        let mut cmsg_space = nix::cmsg_space!([std::os::unix::io::RawFd; MAX_FD_COUNT]);
        let msg = recvmsg(
            self.fd.as_raw(),
            &[IoVec::from_mut_slice(&mut buf)],
            Some(&mut cmsg_space),
            MsgFlags::empty(),
        )?;
        match msg.cmsgs().next().ok_or(IpcError::Ancillary)? {
            ControlMessageOwned::ScmRights(fds) if fds.len() == fd_count => {
                Ok(fds.into_iter().map(Fd::new).collect())
            }
            _ => Err(IpcError::Ancillary),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Serialize, Deserialize, PartialEq, Debug)]
    struct Ping {
        n: u32,
    }

    #[test]
    fn round_trips_a_frame() {
        let (mut a, mut b) = Socket::pair().unwrap();
        a.send(&Ping { n: 42 }).unwrap();
        let got: Ping = b.recv().unwrap();
        assert_eq!(got, Ping { n: 42 });
    }

    #[test]
    fn eof_on_closed_peer() {
        let (a, mut b) = Socket::pair().unwrap();
        drop(a);
        let err = b.recv::<Ping>().unwrap_err();
        assert!(matches!(err, IpcError::Eof));
    }
}
