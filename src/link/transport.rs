//! Trait abstraction for the radio link to enable testing

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::mpsc;

use crate::error::Result;

/// Platform identifier of a peripheral
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PeripheralId(pub String);

impl std::fmt::Display for PeripheralId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Advertisement seen during a scan
#[derive(Debug, Clone, PartialEq)]
pub struct DiscoveredPeripheral {
    /// Peripheral identifier used to connect
    pub id: PeripheralId,
    /// Advertised local name, if any
    pub name: Option<String>,
    /// Advertised 16-bit service UUIDs
    pub services: Vec<u16>,
    /// Signal strength in dBm
    pub rssi: Option<i16>,
}

/// Scan restrictions passed to the transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanFilter {
    /// Only report peripherals advertising one of these services
    pub services: Vec<u16>,
}

/// An established link
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkHandle {
    /// Connected peripheral
    pub peripheral: PeripheralId,
    /// Transport-specific connection number
    pub connection: u64,
}

/// Trait for radio link operations
///
/// Implementations report connect failures as `ReceiverError::Connection` and
/// subscribe failures as `ReceiverError::Notification`.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RadioLink: Send {
    /// Start scanning; dropping the receiver stops the scan.
    async fn scan(&mut self, filter: &ScanFilter) -> Result<mpsc::Receiver<DiscoveredPeripheral>>;

    /// Connect to a discovered peripheral.
    async fn connect(&mut self, id: &PeripheralId) -> Result<LinkHandle>;

    /// Subscribe to a characteristic; the receiver closing means the link is gone.
    async fn subscribe(
        &mut self,
        handle: &LinkHandle,
        service: u16,
        characteristic: u16,
    ) -> Result<mpsc::Receiver<Bytes>>;

    /// Release the link.
    async fn disconnect(&mut self, handle: &LinkHandle);
}
