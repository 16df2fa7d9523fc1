//! # Connection Manager
//!
//! Owns the radio link and drives the discover/connect/receive/reconnect
//! cycle. Every notification received while connected is pushed through the
//! [`TelemetryPipeline`].
//!
//! The run loop is the only code that touches the pipeline. Commands from
//! [`ReceiverHandle`]s are served inside the same loop, between frames, while
//! scanning, and while a connect attempt is pending. Connect, subscribe and
//! notification failures never end the loop: they lead back to scanning.
//! Only `disconnect`, `shutdown` or a denied permission stop the retries.

use std::future::Future;
use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::{mpsc, watch};
use tokio::time::{sleep, timeout_at, Instant};
use tracing::{debug, error, info, warn};

use super::handle::{Command, ReceiverHandle};
use super::scan_timer::ScanTimer;
use super::state::ConnectionState;
use super::transport::{DiscoveredPeripheral, LinkHandle, PeripheralId, RadioLink, ScanFilter};
use crate::config::{Config, LinkConfig};
use crate::error::{ReceiverError, Result};
use crate::session::{CsvExporter, SessionLogger};
use crate::telemetry::{TelemetryPipeline, TelemetryWindow};

/// Capacity of the command queue
const COMMAND_QUEUE_SIZE: usize = 32;

/// Control decisions extracted from commands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Control {
    Start,
    Stop,
    Shutdown,
}

/// What happens once the link has been released
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AfterDisconnect {
    Reconnect,
    Idle,
    Exit,
}

/// Run-loop phase; carries the data each state needs
#[derive(Debug)]
enum Phase {
    Idle,
    Scanning { backoff: bool },
    Connecting(DiscoveredPeripheral),
    Connected { link: LinkHandle, frames: mpsc::Receiver<Bytes> },
    Disconnecting { link: LinkHandle, after: AfterDisconnect },
    Exit,
}

/// Outcome of one link operation raced against the deadline and commands
enum Step<T> {
    Done(T),
    TimedOut,
    Interrupted(Control),
}

/// Connection state machine over a [`RadioLink`]
pub struct ConnectionManager<L: RadioLink> {
    link: L,
    config: LinkConfig,
    state: ConnectionState,
    pipeline: TelemetryPipeline,
    commands: mpsc::Receiver<Command>,
    scan_timer: Option<ScanTimer>,
    scan_seconds: Arc<watch::Sender<u64>>,
    state_tx: watch::Sender<ConnectionState>,
    fault_tx: watch::Sender<Option<String>>,
}

impl<L: RadioLink> std::fmt::Debug for ConnectionManager<L> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("state", &self.state)
            .field("target", &self.config.target_name)
            .finish_non_exhaustive()
    }
}

impl<L: RadioLink> ConnectionManager<L> {
    /// Create a manager and the handle that controls it
    ///
    /// The manager does nothing until [`run`](Self::run) is awaited and a
    /// `connect` command arrives.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use telemetry_receiver::config::Config;
    /// use telemetry_receiver::link::{ConnectionManager, SimulatedLink};
    ///
    /// #[tokio::main]
    /// async fn main() -> anyhow::Result<()> {
    ///     let config = Config::default();
    ///     let link = SimulatedLink::new(config.simulator.clone(), &config.link);
    ///     let (manager, handle) = ConnectionManager::new(link, &config);
    ///
    ///     tokio::spawn(manager.run());
    ///     handle.connect().await?;
    ///     Ok(())
    /// }
    /// ```
    pub fn new(link: L, config: &Config) -> (Self, ReceiverHandle) {
        let window = TelemetryWindow::new(config.window.duration(), config.window.max_points);
        let exporter = CsvExporter::new(
            config.session.log_dir.clone(),
            config.session.file_prefix.clone(),
        );
        let pipeline = TelemetryPipeline::new(window, SessionLogger::new(exporter));

        let (commands_tx, commands) = mpsc::channel(COMMAND_QUEUE_SIZE);
        let (state_tx, state_rx) = watch::channel(ConnectionState::Idle);
        let (scan_seconds, scan_seconds_rx) = watch::channel(0);
        let (fault_tx, fault_rx) = watch::channel(None);

        let handle = ReceiverHandle::new(
            commands_tx,
            state_rx,
            pipeline.subscribe_readings(),
            pipeline.subscribe_logging(),
            scan_seconds_rx,
            fault_rx,
        );

        let manager = Self {
            link,
            config: config.link.clone(),
            state: ConnectionState::Idle,
            pipeline,
            commands,
            scan_timer: None,
            scan_seconds: Arc::new(scan_seconds),
            state_tx,
            fault_tx,
        };

        (manager, handle)
    }

    /// Current state.
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Run until shutdown
    ///
    /// Returns after a `shutdown` command, or once every [`ReceiverHandle`]
    /// has been dropped. The link is released before returning.
    pub async fn run(mut self) {
        info!("Connection manager ready (target: {})", self.config.target_name);
        let mut phase = Phase::Idle;

        loop {
            phase = match phase {
                Phase::Idle => self.idle().await,
                Phase::Scanning { backoff } => self.scan(backoff).await,
                Phase::Connecting(peripheral) => self.connect(peripheral).await,
                Phase::Connected { link, frames } => self.receive(link, frames).await,
                Phase::Disconnecting { link, after } => self.release(link, after).await,
                Phase::Exit => break,
            };
        }

        self.scan_timer = None;
        let stats = self.pipeline.stats();
        info!(
            "Connection manager stopped ({} frames accepted, {} rejected)",
            stats.accepted, stats.rejected
        );
    }

    async fn idle(&mut self) -> Phase {
        loop {
            let command = self.commands.recv().await;
            match Self::dispatch(&mut self.pipeline, command) {
                Some(Control::Start) => {
                    self.fault_tx.send_replace(None);
                    self.enter(ConnectionState::Scanning);
                    return Phase::Scanning { backoff: false };
                }
                Some(Control::Shutdown) => return Phase::Exit,
                Some(Control::Stop) | None => {}
            }
        }
    }

    async fn scan(&mut self, backoff: bool) -> Phase {
        if backoff {
            let delay = self.config.reconnect_interval();
            debug!("Retrying in {:?}", delay);
            if let Some(control) = self.pause(delay).await {
                return self.halt(control);
            }
        }

        let filter = ScanFilter {
            services: vec![self.config.service_uuid],
        };
        let mut results = match self.link.scan(&filter).await {
            Ok(results) => results,
            Err(e) => return self.link_failed(e),
        };
        info!("Scanning for {}...", self.config.target_name);

        let burst = sleep(self.config.scan_window());
        tokio::pin!(burst);

        loop {
            tokio::select! {
                found = results.recv() => match found {
                    Some(peripheral) if self.is_target(&peripheral) => {
                        info!(
                            "Found {} ({}, rssi {:?})",
                            self.config.target_name, peripheral.id, peripheral.rssi
                        );
                        self.enter(ConnectionState::Connecting);
                        return Phase::Connecting(peripheral);
                    }
                    Some(peripheral) => {
                        debug!("Ignoring peripheral {} ({:?})", peripheral.id, peripheral.name);
                    }
                    None => {
                        debug!("Scan ended without a match");
                        return Phase::Scanning { backoff: true };
                    }
                },
                command = self.commands.recv() => {
                    match Self::dispatch(&mut self.pipeline, command) {
                        Some(Control::Start) | None => {}
                        Some(control) => return self.halt(control),
                    }
                }
                _ = &mut burst => {
                    debug!("Scan window elapsed without a match, scanning again");
                    return Phase::Scanning { backoff: false };
                }
            }
        }
    }

    async fn connect(&mut self, peripheral: DiscoveredPeripheral) -> Phase {
        let deadline = Instant::now() + self.config.connect_timeout();
        let service = self.config.service_uuid;
        let characteristic = self.config.characteristic_uuid;

        let step = Self::race(
            self.link.connect(&peripheral.id),
            deadline,
            &mut self.commands,
            &mut self.pipeline,
        )
        .await;

        let link = match step {
            Step::Done(Ok(link)) => link,
            Step::Done(Err(e)) => return self.link_failed(e),
            Step::TimedOut => {
                let e = self.timeout_error(&peripheral.id);
                return self.link_failed(e);
            }
            Step::Interrupted(control) => {
                info!("Connection attempt to {} cancelled", peripheral.id);
                return self.halt(control);
            }
        };

        let step = Self::race(
            self.link.subscribe(&link, service, characteristic),
            deadline,
            &mut self.commands,
            &mut self.pipeline,
        )
        .await;

        let failure = match step {
            Step::Done(Ok(frames)) => {
                info!("Connected to {}, receiving telemetry", peripheral.id);
                self.enter(ConnectionState::Connected);
                return Phase::Connected { link, frames };
            }
            Step::Done(Err(e)) => Err(e),
            Step::TimedOut => Err(self.timeout_error(&peripheral.id)),
            Step::Interrupted(control) => Ok(control),
        };

        // Established but not subscribed: release before leaving Connecting
        self.link.disconnect(&link).await;
        debug!("Released link to {} before subscribing", peripheral.id);

        match failure {
            Err(e) => self.link_failed(e),
            Ok(control) => {
                info!("Connection attempt to {} cancelled", peripheral.id);
                self.halt(control)
            }
        }
    }

    async fn receive(&mut self, link: LinkHandle, mut frames: mpsc::Receiver<Bytes>) -> Phase {
        let after = loop {
            tokio::select! {
                frame = frames.recv() => match frame {
                    Some(frame) => {
                        self.pipeline.on_frame(&frame);
                    }
                    None => {
                        warn!("Link to {} lost", link.peripheral);
                        break AfterDisconnect::Reconnect;
                    }
                },
                command = self.commands.recv() => {
                    match Self::dispatch(&mut self.pipeline, command) {
                        Some(Control::Stop) => break AfterDisconnect::Idle,
                        Some(Control::Shutdown) => break AfterDisconnect::Exit,
                        Some(Control::Start) | None => {}
                    }
                }
            }
        };

        self.enter(ConnectionState::Disconnecting);
        Phase::Disconnecting { link, after }
    }

    async fn release(&mut self, link: LinkHandle, after: AfterDisconnect) -> Phase {
        self.link.disconnect(&link).await;
        info!("Released link to {}", link.peripheral);

        if self.config.reset_calibration_on_disconnect {
            debug!("Clearing calibration after disconnect");
            self.pipeline.reset_calibration();
        }

        match after {
            AfterDisconnect::Reconnect => {
                self.enter(ConnectionState::Scanning);
                Phase::Scanning { backoff: false }
            }
            AfterDisconnect::Idle => {
                self.enter(ConnectionState::Idle);
                Phase::Idle
            }
            AfterDisconnect::Exit => {
                self.enter(ConnectionState::Idle);
                Phase::Exit
            }
        }
    }

    /// Drive `operation` until it finishes, `deadline` passes, or a stop or
    /// shutdown command arrives. Other commands are served meanwhile.
    async fn race<F: Future>(
        operation: F,
        deadline: Instant,
        commands: &mut mpsc::Receiver<Command>,
        pipeline: &mut TelemetryPipeline,
    ) -> Step<F::Output> {
        let operation = timeout_at(deadline, operation);
        tokio::pin!(operation);

        loop {
            tokio::select! {
                result = &mut operation => {
                    return match result {
                        Ok(output) => Step::Done(output),
                        Err(_) => Step::TimedOut,
                    };
                }
                command = commands.recv() => {
                    match Self::dispatch(pipeline, command) {
                        Some(Control::Start) | None => {}
                        Some(control) => return Step::Interrupted(control),
                    }
                }
            }
        }
    }

    fn timeout_error(&self, id: &PeripheralId) -> ReceiverError {
        ReceiverError::Connection(format!(
            "timed out after {:?} connecting to {}",
            self.config.connect_timeout(),
            id
        ))
    }

    /// Wait for `delay` while serving commands; returns early on stop/shutdown.
    async fn pause(&mut self, delay: std::time::Duration) -> Option<Control> {
        let deadline = sleep(delay);
        tokio::pin!(deadline);

        loop {
            tokio::select! {
                _ = &mut deadline => return None,
                command = self.commands.recv() => {
                    match Self::dispatch(&mut self.pipeline, command) {
                        Some(Control::Start) | None => {}
                        Some(control) => return Some(control),
                    }
                }
            }
        }
    }

    /// Stop while no link is held.
    fn halt(&mut self, control: Control) -> Phase {
        self.enter(ConnectionState::Idle);
        match control {
            Control::Shutdown => Phase::Exit,
            Control::Start | Control::Stop => Phase::Idle,
        }
    }

    fn link_failed(&mut self, e: ReceiverError) -> Phase {
        if let ReceiverError::PermissionDenied(_) = e {
            error!("{}; not retrying", e);
            self.fault_tx.send_replace(Some(e.to_string()));
            self.enter(ConnectionState::Idle);
            return Phase::Idle;
        }

        warn!("{}", e);
        if self.state != ConnectionState::Scanning {
            self.enter(ConnectionState::Scanning);
        }
        Phase::Scanning { backoff: true }
    }

    fn is_target(&self, peripheral: &DiscoveredPeripheral) -> bool {
        peripheral.name.as_deref() == Some(self.config.target_name.as_str())
            && peripheral.services.contains(&self.config.service_uuid)
    }

    fn enter(&mut self, next: ConnectionState) {
        let current = self.state;
        if !current.can_transition_to(next) {
            warn!("Ignoring illegal transition {} -> {}", current, next);
            return;
        }

        if current == ConnectionState::Scanning {
            self.scan_timer = None;
        }
        if next == ConnectionState::Scanning {
            self.scan_timer = Some(ScanTimer::start(Arc::clone(&self.scan_seconds)));
        }

        debug!("Connection state {} -> {}", current, next);
        self.state = next;
        self.state_tx.send_replace(next);
    }

    /// Serve a command; returns the control decision for link commands.
    ///
    /// A closed command queue is treated as shutdown.
    fn dispatch(pipeline: &mut TelemetryPipeline, command: Option<Command>) -> Option<Control> {
        let Some(command) = command else {
            return Some(Control::Shutdown);
        };

        match command {
            Command::Connect => return Some(Control::Start),
            Command::Disconnect => return Some(Control::Stop),
            Command::Shutdown => return Some(Control::Shutdown),
            Command::StartSession(reply) => {
                let _ = reply.send(pipeline.start_session());
            }
            Command::StopSession(reply) => {
                let _ = reply.send(pipeline.stop_session());
            }
            Command::ExportLastSession(reply) => {
                let _ = reply.send(pipeline.export_last_session());
            }
            Command::WindowSnapshot(reply) => {
                let _ = reply.send(pipeline.window_snapshot());
            }
            Command::WindowSummary(reply) => {
                let _ = reply.send(pipeline.window_summary());
            }
            Command::DecodeStats(reply) => {
                let _ = reply.send(pipeline.stats());
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::link::transport::mocks::{transmitter, FakeLink};
    use crate::link::transport::MockRadioLink;
    use crate::session::SessionOutcome;
    use std::time::Duration;
    use tempfile::TempDir;
    use tokio::task::JoinHandle;

    const SERVICE: u16 = 0x181A;

    fn test_config(dir: &TempDir) -> Config {
        let mut config = Config::default();
        config.session.log_dir = dir.path().to_string_lossy().into_owned();
        config.link.scan_window_ms = 10_000;
        config.link.connect_timeout_ms = 500;
        config.link.reconnect_interval_ms = 100;
        config
    }

    fn spawn<L: RadioLink + 'static>(link: L, config: &Config) -> (ReceiverHandle, JoinHandle<()>) {
        let (manager, handle) = ConnectionManager::new(link, config);
        (handle, tokio::spawn(manager.run()))
    }

    async fn wait_for_state(handle: &ReceiverHandle, expected: ConnectionState) {
        let mut states = handle.watch_state();
        tokio::time::timeout(Duration::from_secs(60), states.wait_for(|s| *s == expected))
            .await
            .unwrap_or_else(|_| panic!("state {} not reached", expected))
            .unwrap();
    }

    async fn wait_for_reading(handle: &ReceiverHandle, reading: f64) {
        let mut readings = handle.watch_readings();
        tokio::time::timeout(
            Duration::from_secs(60),
            readings.wait_for(|r| r.reading == Some(reading)),
        )
        .await
        .unwrap_or_else(|_| panic!("reading {} not observed", reading))
        .unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_connects_and_derives_values() {
        let dir = TempDir::new().unwrap();
        let link = FakeLink::advertising(vec![transmitter("TRANSMITTER", vec![SERVICE])]);
        link.push_frame("B1.000000,1.005000");
        let (handle, task) = spawn(link.clone(), &test_config(&dir));

        handle.connect().await.unwrap();
        wait_for_state(&handle, ConnectionState::Connected).await;
        wait_for_reading(&handle, 1.005).await;

        let readings = handle.readings();
        assert_eq!(readings.baseline, Some(1.0));
        assert!((readings.value.unwrap() - 0.005).abs() < 1e-9);

        link.push_frame("not a frame");
        link.push_frame("V0.500000,1.005000");
        let mut updates = handle.watch_readings();
        updates
            .wait_for(|r| r.reference == Some(0.5))
            .await
            .unwrap();
        assert_eq!(handle.readings().baseline, Some(1.0));

        let stats = handle.decode_stats().await.unwrap();
        assert_eq!(stats.accepted, 2);
        assert_eq!(stats.rejected, 1);
        assert_eq!(handle.window_snapshot().await.unwrap().len(), 2);
        let summary = handle.window_summary().await.unwrap();
        assert_eq!(summary.points, 2);
        assert!((summary.latest.unwrap().value - 0.005).abs() < 1e-9);

        handle.shutdown().await.unwrap();
        task.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_link_loss_rescans_and_resets_scan_counter() {
        let dir = TempDir::new().unwrap();
        let link = FakeLink::default();
        let (handle, task) = spawn(link.clone(), &test_config(&dir));

        handle.connect().await.unwrap();
        wait_for_state(&handle, ConnectionState::Scanning).await;

        tokio::time::sleep(Duration::from_millis(3500)).await;
        assert_eq!(handle.scan_seconds(), 3);

        link.advertise_now(transmitter("TRANSMITTER", vec![SERVICE]));
        wait_for_state(&handle, ConnectionState::Connected).await;

        link.drop_link();
        wait_for_state(&handle, ConnectionState::Scanning).await;

        assert_eq!(handle.scan_seconds(), 0);
        assert_eq!(link.disconnects(), 1);

        handle.shutdown().await.unwrap();
        task.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_calibration_persists_across_reconnect() {
        let dir = TempDir::new().unwrap();
        let link = FakeLink::advertising(vec![transmitter("TRANSMITTER", vec![SERVICE])]);
        link.push_frame("B1.0,1.2");
        let (handle, task) = spawn(link.clone(), &test_config(&dir));

        handle.connect().await.unwrap();
        wait_for_reading(&handle, 1.2).await;

        link.drop_link();
        link.push_frame("V0.5,1.3");
        wait_for_reading(&handle, 1.3).await;
        assert_eq!(link.connects(), 2);
        assert_eq!(handle.readings().baseline, Some(1.0));

        handle.shutdown().await.unwrap();
        task.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_calibration_reset_policy() {
        let dir = TempDir::new().unwrap();
        let mut config = test_config(&dir);
        config.link.reset_calibration_on_disconnect = true;

        let link = FakeLink::advertising(vec![transmitter("TRANSMITTER", vec![SERVICE])]);
        link.push_frame("B1.0,1.2");
        let (handle, task) = spawn(link.clone(), &config);

        handle.connect().await.unwrap();
        wait_for_reading(&handle, 1.2).await;

        link.drop_link();
        link.push_frame("V0.5,1.3");
        wait_for_reading(&handle, 1.3).await;
        assert_eq!(link.connects(), 2);
        assert_eq!(handle.readings().baseline, None);
        assert_eq!(handle.readings().value, None);

        handle.shutdown().await.unwrap();
        task.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_failures_are_retried() {
        let dir = TempDir::new().unwrap();
        let link = FakeLink::advertising(vec![transmitter("TRANSMITTER", vec![SERVICE])]);
        link.set_connect_failures(2);
        let (handle, task) = spawn(link.clone(), &test_config(&dir));

        handle.connect().await.unwrap();
        wait_for_state(&handle, ConnectionState::Connected).await;

        assert_eq!(link.connects(), 3);
        assert_eq!(link.scans(), 3);

        handle.shutdown().await.unwrap();
        task.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_subscribe_failure_releases_link_and_retries() {
        let dir = TempDir::new().unwrap();
        let link = FakeLink::advertising(vec![transmitter("TRANSMITTER", vec![SERVICE])]);
        link.set_subscribe_failures(1);
        let (handle, task) = spawn(link.clone(), &test_config(&dir));

        handle.connect().await.unwrap();
        wait_for_state(&handle, ConnectionState::Connected).await;

        assert_eq!(link.connects(), 2);
        assert_eq!(link.disconnects(), 1);

        handle.shutdown().await.unwrap();
        task.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_timeout_releases_link() {
        let dir = TempDir::new().unwrap();
        let link = FakeLink::advertising(vec![transmitter("TRANSMITTER", vec![SERVICE])]);
        link.set_subscribe_stalls(1);
        let (handle, task) = spawn(link.clone(), &test_config(&dir));

        handle.connect().await.unwrap();
        wait_for_state(&handle, ConnectionState::Connecting).await;
        tokio::time::sleep(Duration::from_millis(550)).await;

        // Timed out and released; the retry then connects
        assert_eq!(link.disconnects(), 1);
        wait_for_state(&handle, ConnectionState::Connected).await;
        assert_eq!(link.connects(), 2);
        assert_eq!(link.disconnects(), 1);

        handle.shutdown().await.unwrap();
        task.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_disconnect_while_connecting_releases_link() {
        let dir = TempDir::new().unwrap();
        let link = FakeLink::advertising(vec![transmitter("TRANSMITTER", vec![SERVICE])]);
        link.set_subscribe_stalls(1);
        let (handle, task) = spawn(link.clone(), &test_config(&dir));

        handle.connect().await.unwrap();
        wait_for_state(&handle, ConnectionState::Connecting).await;
        handle.disconnect().await.unwrap();
        wait_for_state(&handle, ConnectionState::Idle).await;

        assert_eq!(link.connects(), 1);
        assert_eq!(link.disconnects(), 1);

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(handle.connection_state(), ConnectionState::Idle);
        assert_eq!(link.connects(), 1);

        handle.shutdown().await.unwrap();
        task.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_while_connecting_releases_link() {
        let dir = TempDir::new().unwrap();
        let link = FakeLink::advertising(vec![transmitter("TRANSMITTER", vec![SERVICE])]);
        link.set_subscribe_stalls(1);
        let (handle, task) = spawn(link.clone(), &test_config(&dir));

        handle.connect().await.unwrap();
        wait_for_state(&handle, ConnectionState::Connecting).await;
        handle.shutdown().await.unwrap();
        task.await.unwrap();

        assert_eq!(link.connects(), link.disconnects());
        assert_eq!(handle.connection_state(), ConnectionState::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn test_non_matching_peripherals_are_ignored() {
        let dir = TempDir::new().unwrap();
        let link = FakeLink::advertising(vec![
            transmitter("OTHER", vec![SERVICE]),
            transmitter("TRANSMITTER", vec![0x1234]),
        ]);
        let (handle, task) = spawn(link.clone(), &test_config(&dir));

        handle.connect().await.unwrap();
        tokio::time::sleep(Duration::from_secs(3)).await;

        assert_eq!(handle.connection_state(), ConnectionState::Scanning);
        assert_eq!(link.connects(), 0);

        handle.shutdown().await.unwrap();
        task.await.unwrap();
        assert_eq!(handle.connection_state(), ConnectionState::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let link = FakeLink::advertising(vec![transmitter("TRANSMITTER", vec![SERVICE])]);
        let (handle, task) = spawn(link.clone(), &test_config(&dir));

        handle.connect().await.unwrap();
        wait_for_state(&handle, ConnectionState::Connected).await;
        handle.connect().await.unwrap();
        tokio::time::sleep(Duration::from_secs(1)).await;

        assert_eq!(handle.connection_state(), ConnectionState::Connected);
        assert_eq!(link.scans(), 1);
        assert_eq!(link.connects(), 1);

        handle.shutdown().await.unwrap();
        task.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_disconnect_stays_idle() {
        let dir = TempDir::new().unwrap();
        let link = FakeLink::advertising(vec![transmitter("TRANSMITTER", vec![SERVICE])]);
        let (handle, task) = spawn(link.clone(), &test_config(&dir));

        handle.connect().await.unwrap();
        wait_for_state(&handle, ConnectionState::Connected).await;

        handle.disconnect().await.unwrap();
        wait_for_state(&handle, ConnectionState::Idle).await;
        tokio::time::sleep(Duration::from_secs(5)).await;

        assert_eq!(handle.connection_state(), ConnectionState::Idle);
        assert_eq!(link.scans(), 1);
        assert_eq!(link.disconnects(), 1);
        assert!(!link.is_subscribed());

        handle.shutdown().await.unwrap();
        task.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_disconnect_while_scanning_stops_counter() {
        let dir = TempDir::new().unwrap();
        let (handle, task) = spawn(FakeLink::default(), &test_config(&dir));

        handle.connect().await.unwrap();
        tokio::time::sleep(Duration::from_millis(2500)).await;
        handle.disconnect().await.unwrap();
        wait_for_state(&handle, ConnectionState::Idle).await;

        let frozen = handle.scan_seconds();
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(handle.scan_seconds(), frozen);

        handle.shutdown().await.unwrap();
        task.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_session_over_live_link() {
        let dir = TempDir::new().unwrap();
        let link = FakeLink::advertising(vec![transmitter("TRANSMITTER", vec![SERVICE])]);
        link.push_frame("B1.000000,1.000000");
        let (handle, task) = spawn(link.clone(), &test_config(&dir));

        handle.connect().await.unwrap();
        wait_for_reading(&handle, 1.0).await;

        handle.start_session().await.unwrap();
        assert!(handle.is_logging());
        assert!(matches!(
            handle.start_session().await,
            Err(ReceiverError::SessionAlreadyActive)
        ));

        for reading in ["1.010000", "1.020000", "1.030000"] {
            link.push_frame(&format!("V0.500000,{}", reading));
        }
        wait_for_reading(&handle, 1.03).await;

        let outcome = handle.stop_session().await.unwrap();
        assert!(!handle.is_logging());

        let SessionOutcome::Exported(path) = outcome else {
            panic!("Expected an export, got: {:?}", outcome);
        };
        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(contents.lines().count(), 8);
        assert_eq!(
            handle.export_last_session().await.unwrap(),
            SessionOutcome::Exported(path)
        );

        handle.shutdown().await.unwrap();
        task.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_session_while_idle() {
        let dir = TempDir::new().unwrap();
        let (handle, task) = spawn(FakeLink::default(), &test_config(&dir));

        handle.start_session().await.unwrap();
        assert_eq!(
            handle.stop_session().await.unwrap(),
            SessionOutcome::NothingLogged
        );
        assert!(matches!(
            handle.stop_session().await,
            Err(ReceiverError::SessionNotActive)
        ));

        handle.shutdown().await.unwrap();
        task.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropping_all_handles_stops_manager() {
        let dir = TempDir::new().unwrap();
        let link = FakeLink::advertising(vec![transmitter("TRANSMITTER", vec![SERVICE])]);
        let (handle, task) = spawn(link.clone(), &test_config(&dir));

        handle.connect().await.unwrap();
        wait_for_state(&handle, ConnectionState::Connected).await;
        drop(handle);

        task.await.unwrap();
        assert_eq!(link.disconnects(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_errors_keep_rescanning() {
        let dir = TempDir::new().unwrap();
        let mut link = MockRadioLink::new();
        link.expect_scan().returning(|_| {
            let (tx, rx) = mpsc::channel(4);
            tx.try_send(transmitter("TRANSMITTER", vec![SERVICE])).unwrap();
            Ok(rx)
        });
        link.expect_connect()
            .times(2..)
            .returning(|id| Err(ReceiverError::Connection(format!("{} unreachable", id))));
        link.expect_subscribe().never();
        link.expect_disconnect().never();

        let (handle, task) = spawn(link, &test_config(&dir));
        handle.connect().await.unwrap();
        tokio::time::sleep(Duration::from_millis(350)).await;

        assert_ne!(handle.connection_state(), ConnectionState::Connected);
        handle.shutdown().await.unwrap();
        task.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_permission_denied_is_not_retried() {
        let dir = TempDir::new().unwrap();
        let mut link = MockRadioLink::new();
        link.expect_scan()
            .times(1)
            .returning(|_| Err(ReceiverError::PermissionDenied("bluetooth scan".into())));

        let (handle, task) = spawn(link, &test_config(&dir));
        handle.connect().await.unwrap();
        wait_for_state(&handle, ConnectionState::Idle).await;
        tokio::time::sleep(Duration::from_secs(5)).await;

        assert_eq!(handle.connection_state(), ConnectionState::Idle);
        assert!(handle.fault().unwrap().contains("bluetooth scan"));

        handle.shutdown().await.unwrap();
        task.await.unwrap();
    }
}
