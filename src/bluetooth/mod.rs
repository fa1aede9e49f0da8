pub mod connection;
pub mod profile;
pub mod scanner;

use std::time::Duration;

use anyhow::Result;
use bluer::{Address, Session};

use crate::session::ByteStream;

pub type BoxedStream = Box<dyn ByteStream>;

/// Open the control channel to `address`.
///
/// With an explicit `channel` a raw RFCOMM socket is used; otherwise BlueZ
/// looks the channel up through the service UUID.
pub async fn open(
    session: &Session,
    address: Address,
    channel: Option<u8>,
    timeout: Duration,
) -> Result<BoxedStream> {
    match channel {
        Some(channel) => Ok(Box::new(connection::connect(address, channel, timeout).await?)),
        None => Ok(Box::new(profile::connect(session, address, timeout).await?)),
    }
}
