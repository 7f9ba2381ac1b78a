//! BlueZ D-Bus backend for advertisement scanning.
//!
//! This backend uses the `bluer` crate to communicate with the BlueZ daemon
//! via D-Bus. It requires the `bluetoothd` daemon to be running.

use super::{ADVERTISEMENT_CHANNEL_BUFFER_SIZE, Advertisement, ScanError};
use bluer::{
    Adapter, AdapterEvent, AdapterProperty, Address, DiscoveryFilter, DiscoveryTransport, Session,
};
use futures::StreamExt;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

impl From<bluer::Error> for ScanError {
    fn from(err: bluer::Error) -> Self {
        ScanError::Bluetooth(err.to_string())
    }
}

/// Start scanning using the default BlueZ adapter.
///
/// Opening the session and adapter happens before returning, so a missing
/// daemon or adapter is reported to the caller. After that a background task
/// follows the adapter's power state: discovery runs while powered on and is
/// stopped when it powers off. Duplicate advertisements are requested from
/// BlueZ, every manufacturer data update becomes one [`Advertisement`].
pub async fn start_scan() -> Result<mpsc::Receiver<Advertisement>, ScanError> {
    let session = Session::new().await?;
    let adapter = session.default_adapter().await?;

    let (tx, rx) = mpsc::channel(ADVERTISEMENT_CHANNEL_BUFFER_SIZE);

    // Spawn a task that owns all Bluetooth state and runs the event loop
    tokio::spawn(async move {
        // Keep the D-Bus session alive by moving it into this task
        let _session = session;

        if let Err(e) = follow_adapter(&adapter, &tx).await {
            warn!(adapter = adapter.name(), error = %e, "BLE scanning stopped");
        }
    });

    Ok(rx)
}

/// Run discovery while the adapter is powered, until the receiver goes away.
async fn follow_adapter(
    adapter: &Adapter,
    tx: &mpsc::Sender<Advertisement>,
) -> Result<(), ScanError> {
    let mut adapter_events = Box::pin(adapter.events().await?);
    let mut powered = adapter.is_powered().await?;
    info!(adapter = adapter.name(), powered, "BLE adapter state");

    loop {
        if !powered {
            match adapter_events.next().await {
                Some(AdapterEvent::PropertyChanged(AdapterProperty::Powered(on))) => {
                    info!(adapter = adapter.name(), powered = on, "BLE adapter state");
                    powered = on;
                }
                Some(_) => {}
                None => return Ok(()),
            }
            continue;
        }

        adapter
            .set_discovery_filter(DiscoveryFilter {
                transport: DiscoveryTransport::Le,
                duplicate_data: true,
                ..Default::default()
            })
            .await?;

        // Dropping the discovery stream stops scanning.
        let mut discovery = Box::pin(adapter.discover_devices_with_changes().await?);
        info!(adapter = adapter.name(), "scanning started");

        loop {
            tokio::select! {
                event = discovery.next() => match event {
                    Some(AdapterEvent::DeviceAdded(address)) => {
                        for advertisement in read_advertisements(adapter, address).await {
                            if tx.send(advertisement).await.is_err() {
                                return Ok(());
                            }
                        }
                    }
                    Some(_) => {}
                    None => return Ok(()),
                },
                event = adapter_events.next() => match event {
                    Some(AdapterEvent::PropertyChanged(AdapterProperty::Powered(false))) => {
                        info!(adapter = adapter.name(), "adapter powered off, scanning stopped");
                        powered = false;
                        break;
                    }
                    Some(_) => {}
                    None => return Ok(()),
                },
            }
        }
    }
}

/// Read every manufacturer data entry of a discovered device.
///
/// Devices can vanish between discovery and the property read; such errors
/// only drop this one update.
async fn read_advertisements(adapter: &Adapter, address: Address) -> Vec<Advertisement> {
    let manufacturer_data = match adapter.device(address) {
        Ok(device) => device.manufacturer_data().await,
        Err(e) => Err(e),
    };

    match manufacturer_data {
        Ok(Some(data)) => data
            .iter()
            .map(|(company_id, bytes)| {
                Advertisement::from_parts(Some(address.to_string()), *company_id, bytes)
            })
            .collect(),
        Ok(None) => Vec::new(),
        Err(e) => {
            debug!(%address, error = %e, "failed to read manufacturer data");
            Vec::new()
        }
    }
}

