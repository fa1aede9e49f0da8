use std::collections::HashSet;

use anyhow::{bail, Result};
use bluer::{Address, Session, Uuid};
use tracing::{debug, info};

/// Service UUID Sony headsets expose for the MDR control channel.
pub const SONY_UUID: Uuid = Uuid::from_u128(0x96cc203e_5068_46ad_b32d_e316f5e069ba);

/// A paired Bluetooth device.
#[derive(Debug, Clone)]
pub struct BluetoothDevice {
    pub name: String,
    pub address: Address,
    pub connected: bool,
}

/// List paired devices that advertise the Sony control service.
pub async fn list_sony_devices(session: &Session) -> Result<Vec<BluetoothDevice>> {
    let adapter = session.default_adapter().await?;
    adapter.set_powered(true).await?;

    let mut result = Vec::new();
    for addr in adapter.device_addresses().await? {
        let device = adapter.device(addr)?;
        if !device.is_paired().await? {
            continue;
        }

        let uuids = device.uuids().await?.unwrap_or_default();
        if !is_sony_device(&uuids) {
            continue;
        }

        let name = device.name().await?.unwrap_or_default();
        let connected = device.is_connected().await?;
        debug!("Found device: {} ({}), connected={}", name, addr, connected);
        result.push(BluetoothDevice {
            name,
            address: addr,
            connected,
        });
    }

    info!("Found {} paired Sony devices", result.len());
    Ok(result)
}

pub fn is_sony_device(uuids: &HashSet<Uuid>) -> bool {
    uuids.contains(&SONY_UUID)
}

/// Pick the single connected device, or explain why none can be chosen.
pub fn select_device(devices: &[BluetoothDevice]) -> Result<&BluetoothDevice> {
    let connected: Vec<&BluetoothDevice> = devices.iter().filter(|d| d.connected).collect();
    match connected.as_slice() {
        [device] => Ok(*device),
        [] if devices.is_empty() => {
            bail!("No paired Sony headset found. Pair the headset first or pass --mac")
        }
        [] => bail!("No Sony headset is connected. Connect it first or pass --mac"),
        several => {
            let list: Vec<String> = several
                .iter()
                .map(|d| format!("{} ({})", d.name, d.address))
                .collect();
            bail!(
                "Several Sony headsets are connected: {}. Choose one with --mac",
                list.join(", ")
            )
        }
    }
}
