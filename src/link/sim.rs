//! # Simulated Transmitter
//!
//! A [`RadioLink`] that behaves like the real transmitter: it advertises the
//! configured name and service, accepts connections after a short delay and
//! streams calibration frames at a fixed rate.
//!
//! Used by the binary when no radio backend is available, and for manual
//! testing of reconnect behaviour via `frames_per_connection`.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval, sleep, MissedTickBehavior};
use tracing::{debug, info};

use super::transport::{DiscoveredPeripheral, LinkHandle, PeripheralId, RadioLink, ScanFilter};
use crate::config::{LinkConfig, SimulatorConfig};
use crate::error::{ReceiverError, Result};
use crate::protocol::{encode_frame, SampleKind};

/// Delay before the transmitter shows up in a scan
const ADVERTISE_DELAY: Duration = Duration::from_millis(1500);

/// Time taken to establish a link
const CONNECT_DELAY: Duration = Duration::from_millis(300);

/// A baseline frame is repeated every this many frames
const BASELINE_EVERY: u64 = 50;

/// Peak deviation of the simulated reading from the baseline, in volts
const READING_AMPLITUDE: f64 = 0.05;

/// Simulated peripheral identifier
const SIMULATED_ID: &str = "sim-0";

/// Build the `n`th frame of a simulated stream
///
/// Frame 0 and every [`BASELINE_EVERY`]th frame carry the baseline, the rest
/// carry the reference voltage. The reading oscillates around the baseline.
pub fn simulated_frame(config: &SimulatorConfig, n: u64) -> Bytes {
    let reading = config.baseline_v + READING_AMPLITUDE * (n as f64 * 0.2).sin();

    if n % BASELINE_EVERY == 0 {
        encode_frame(SampleKind::Baseline, config.baseline_v, reading)
    } else {
        encode_frame(SampleKind::Reference, config.reference_v, reading)
    }
}

/// In-process stand-in for the radio transport
pub struct SimulatedLink {
    config: SimulatorConfig,
    target_name: String,
    service_uuid: u16,
    characteristic_uuid: u16,
    connections: u64,
    streamer: Option<JoinHandle<()>>,
}

impl std::fmt::Debug for SimulatedLink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimulatedLink")
            .field("target_name", &self.target_name)
            .field("connections", &self.connections)
            .finish_non_exhaustive()
    }
}

impl SimulatedLink {
    /// Simulate the transmitter described by `link`.
    pub fn new(config: SimulatorConfig, link: &LinkConfig) -> Self {
        Self {
            config,
            target_name: link.target_name.clone(),
            service_uuid: link.service_uuid,
            characteristic_uuid: link.characteristic_uuid,
            connections: 0,
            streamer: None,
        }
    }

    fn stop_streaming(&mut self) {
        if let Some(streamer) = self.streamer.take() {
            streamer.abort();
        }
    }
}

#[async_trait]
impl RadioLink for SimulatedLink {
    async fn scan(&mut self, filter: &ScanFilter) -> Result<mpsc::Receiver<DiscoveredPeripheral>> {
        let (tx, rx) = mpsc::channel(4);

        if !filter.services.is_empty() && !filter.services.contains(&self.service_uuid) {
            return Ok(rx);
        }

        let advertisement = DiscoveredPeripheral {
            id: PeripheralId(SIMULATED_ID.to_string()),
            name: Some(self.target_name.clone()),
            services: vec![self.service_uuid],
            rssi: Some(-55),
        };

        tokio::spawn(async move {
            sleep(ADVERTISE_DELAY).await;
            if tx.send(advertisement).await.is_ok() {
                // Keep the scan open until the receiver is dropped
                tx.closed().await;
            }
        });

        Ok(rx)
    }

    async fn connect(&mut self, id: &PeripheralId) -> Result<LinkHandle> {
        sleep(CONNECT_DELAY).await;

        if id.0 != SIMULATED_ID {
            return Err(ReceiverError::Connection(format!("unknown peripheral {}", id)));
        }

        self.connections += 1;
        Ok(LinkHandle {
            peripheral: id.clone(),
            connection: self.connections,
        })
    }

    async fn subscribe(
        &mut self,
        handle: &LinkHandle,
        service: u16,
        characteristic: u16,
    ) -> Result<mpsc::Receiver<Bytes>> {
        if service != self.service_uuid || characteristic != self.characteristic_uuid {
            return Err(ReceiverError::Notification(format!(
                "characteristic {:#06x}/{:#06x} not found on {}",
                service, characteristic, handle.peripheral
            )));
        }

        self.stop_streaming();
        let (tx, rx) = mpsc::channel(64);
        let config = self.config.clone();
        let limit = config.frames_per_connection;

        self.streamer = Some(tokio::spawn(async move {
            let mut ticker = interval(Duration::from_millis(config.frame_interval_ms));
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            for n in 0.. {
                if limit > 0 && n >= limit {
                    info!("Simulated transmitter dropping link after {} frames", n);
                    break;
                }
                ticker.tick().await;
                if tx.send(simulated_frame(&config, n)).await.is_err() {
                    break;
                }
            }
        }));

        debug!("Simulated stream started (connection {})", handle.connection);
        Ok(rx)
    }

    async fn disconnect(&mut self, handle: &LinkHandle) {
        debug!("Simulated link {} released", handle.connection);
        self.stop_streaming();
    }
}

impl Drop for SimulatedLink {
    fn drop(&mut self) {
        self.stop_streaming();
    }
}
