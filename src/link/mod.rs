//! # Link Module
//!
//! Connection lifecycle to the wireless transmitter.
//!
//! This module handles:
//! - The radio transport abstraction and a simulated transmitter
//! - Scanning for the configured peripheral
//! - Connecting, subscribing to notifications and auto-reconnect
//! - Counting scan duration
//! - The handle used by the UI layer to drive and observe the receiver

pub mod state;
pub mod transport;
pub mod scan_timer;
pub mod handle;
pub mod manager;
pub mod sim;

pub use handle::ReceiverHandle;
pub use manager::ConnectionManager;
pub use sim::SimulatedLink;
pub use state::ConnectionState;
pub use transport::{DiscoveredPeripheral, LinkHandle, PeripheralId, RadioLink, ScanFilter};
