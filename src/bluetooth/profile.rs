use std::io;
use std::pin::Pin;
use std::task::{Context as TaskContext, Poll};
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use bluer::rfcomm::{Profile, ProfileHandle, Role, Stream};
use bluer::{Address, Session};
use futures::StreamExt;
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tracing::{debug, info};

use super::scanner::SONY_UUID;

/// RFCOMM stream obtained through a BlueZ profile connection.
///
/// Holds the profile registration; BlueZ tears the link down once the
/// profile is unregistered.
pub struct ProfileStream {
    stream: Pin<Box<Stream>>,
    _handle: ProfileHandle,
}

/// Client profile for the control service. The link must be authenticated,
/// matching the link mode set on raw sockets.
pub fn control_profile() -> Profile {
    Profile {
        uuid: SONY_UUID,
        role: Some(Role::Client),
        require_authentication: Some(true),
        require_authorization: Some(false),
        auto_connect: Some(false),
        ..Default::default()
    }
}

/// Connect to the Sony control service on `address`, letting BlueZ resolve
/// the RFCOMM channel from the device's SDP record.
pub async fn connect(session: &Session, address: Address, timeout: Duration) -> Result<ProfileStream> {
    let adapter = session.default_adapter().await?;
    let device = adapter.device(address)?;

    let mut handle = session
        .register_profile(control_profile())
        .await
        .context("registering RFCOMM profile")?;

    info!("Connecting to {} via service {}", address, SONY_UUID);
    let connect = async {
        device
            .connect_profile(&SONY_UUID)
            .await
            .with_context(|| format!("BlueZ could not connect {} to {}", SONY_UUID, address))
    };
    let incoming = async {
        handle
            .next()
            .await
            .ok_or_else(|| anyhow!("profile registration ended before a connection arrived"))
    };
    let ((), request) = tokio::time::timeout(timeout, futures::future::try_join(connect, incoming))
        .await
        .map_err(|_| anyhow!("timed out connecting to {} after {:?}", address, timeout))??;

    debug!("Profile connection request from {}", request.device());
    let stream = request.accept().context("accepting RFCOMM connection")?;
    info!("Connected to {} via profile", address);

    Ok(ProfileStream {
        stream: Box::pin(stream),
        _handle: handle,
    })
}

impl AsyncRead for ProfileStream {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut TaskContext<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        self.stream.as_mut().poll_read(cx, buf)
    }
}

impl AsyncWrite for ProfileStream {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut TaskContext<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        self.stream.as_mut().poll_write(cx, buf)
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut TaskContext<'_>) -> Poll<io::Result<()>> {
        self.stream.as_mut().poll_flush(cx)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut TaskContext<'_>) -> Poll<io::Result<()>> {
        self.stream.as_mut().poll_shutdown(cx)
    }
}
