use std::os::fd::{AsRawFd, FromRawFd, OwnedFd};
use std::time::Duration;

use anyhow::{Context, Result};
use bluer::Address;
use tokio::net::UnixStream;
use tracing::info;

// Bluetooth socket constants (from Linux kernel headers)
const AF_BLUETOOTH: libc::c_int = 31;
const BTPROTO_RFCOMM: libc::c_int = 3;
const SOL_RFCOMM: libc::c_int = 18;
const RFCOMM_LM: libc::c_int = 3;
const RFCOMM_LM_AUTH: libc::c_int = 0x02;
const RFCOMM_LM_ENCRYPT: libc::c_int = 0x04;

/// Link mode requested before connecting: the headset only talks over an
/// authenticated, encrypted link.
pub const LINK_MODE: libc::c_int = RFCOMM_LM_AUTH | RFCOMM_LM_ENCRYPT;

/// sockaddr_rc (from <bluetooth/rfcomm.h>)
#[repr(C)]
struct SockaddrRc {
    rc_family: u16,
    rc_bdaddr: [u8; 6], // little-endian
    rc_channel: u8,
}

/// Connect to `channel` on `address` with a raw RFCOMM socket.
///
/// The connect itself blocks until the RFCOMM DLC is up; the socket is then
/// switched to non-blocking mode and handed to tokio.
pub async fn connect(address: Address, channel: u8, timeout: Duration) -> Result<UnixStream> {
    info!("Connecting to {} on RFCOMM channel {}", address, channel);

    let fd = tokio::task::spawn_blocking(move || connect_blocking(address, channel, timeout))
        .await
        .context("spawn_blocking panicked")?
        .with_context(|| format!("RFCOMM connect to {} channel {}", address, channel))?;

    let stream = UnixStream::from_std(std::os::unix::net::UnixStream::from(fd))?;
    info!("Connected to {} on RFCOMM channel {}", address, channel);
    Ok(stream)
}

fn connect_blocking(address: Address, channel: u8, timeout: Duration) -> std::io::Result<OwnedFd> {
    // SAFETY: plain socket syscalls; the descriptor is owned by `fd` as soon
    // as it exists, so every early return closes it.
    unsafe {
        let raw = libc::socket(AF_BLUETOOTH, libc::SOCK_STREAM, BTPROTO_RFCOMM);
        if raw < 0 {
            return Err(std::io::Error::last_os_error());
        }
        let fd = OwnedFd::from_raw_fd(raw);

        let tv = libc::timeval {
            tv_sec: timeout.as_secs() as libc::time_t,
            tv_usec: timeout.subsec_micros() as libc::suseconds_t,
        };
        // SO_SNDTIMEO also bounds the blocking connect
        for opt in [libc::SO_SNDTIMEO, libc::SO_RCVTIMEO] {
            let ret = libc::setsockopt(
                fd.as_raw_fd(),
                libc::SOL_SOCKET,
                opt,
                &tv as *const _ as *const libc::c_void,
                std::mem::size_of::<libc::timeval>() as libc::socklen_t,
            );
            if ret < 0 {
                return Err(std::io::Error::last_os_error());
            }
        }

        let ret = libc::setsockopt(
            fd.as_raw_fd(),
            SOL_RFCOMM,
            RFCOMM_LM,
            &LINK_MODE as *const _ as *const libc::c_void,
            std::mem::size_of::<libc::c_int>() as libc::socklen_t,
        );
        if ret < 0 {
            return Err(std::io::Error::last_os_error());
        }

        let mut rc_bdaddr = address.0;
        rc_bdaddr.reverse();
        let addr = SockaddrRc {
            rc_family: AF_BLUETOOTH as u16,
            rc_bdaddr,
            rc_channel: channel,
        };
        let ret = libc::connect(
            fd.as_raw_fd(),
            &addr as *const _ as *const libc::sockaddr,
            std::mem::size_of::<SockaddrRc>() as libc::socklen_t,
        );
        if ret < 0 {
            return Err(std::io::Error::last_os_error());
        }

        let flags = libc::fcntl(fd.as_raw_fd(), libc::F_GETFL);
        if flags < 0 || libc::fcntl(fd.as_raw_fd(), libc::F_SETFL, flags | libc::O_NONBLOCK) < 0 {
            return Err(std::io::Error::last_os_error());
        }

        Ok(fd)
    }
}
