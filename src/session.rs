//! Scan session lifecycle.
//!
//! A session moves between [`ScanState::Idle`] and [`ScanState::Scanning`].
//! While scanning, a background task feeds platform events into the ingest
//! pipeline until one of four things happens: `stop()` is called, the
//! configured timeout elapses, the platform reports a failure, or the event
//! stream ends. Whatever the cause, the task stops the platform scanner
//! before the session is reported idle again.

use futures::StreamExt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{oneshot, watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::ble::permission::PermissionCheck;
use crate::ble::scanner::{PlatformScanner, ScanEvent, ScanEventStream};
use crate::config::ScanConfig;
use crate::ingest::IngestPipeline;

/// Scan session state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ScanState {
    /// No scan is running.
    #[default]
    Idle,
    /// A scan is running and advertisements are being ingested.
    Scanning,
}

impl ScanState {
    /// Check if a scan is running.
    pub fn is_scanning(&self) -> bool {
        matches!(self, Self::Scanning)
    }
}

impl std::fmt::Display for ScanState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "Idle"),
            Self::Scanning => write!(f, "Scanning"),
        }
    }
}

/// Why a running session was asked to stop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StopReason {
    /// `stop()` was called. Devices stay in the registry.
    Stop,
    /// The owner is going away. The registry is cleared once the platform
    /// scan has stopped.
    Teardown,
}

/// Handle to the running session task.
struct ActiveScan {
    stop_tx: oneshot::Sender<StopReason>,
    handle: JoinHandle<()>,
    /// Set once the task has left its event loop.
    ending: Arc<AtomicBool>,
}

impl ActiveScan {
    /// Whether the task is still ingesting events.
    fn is_running(&self) -> bool {
        !self.ending.load(Ordering::SeqCst) && !self.handle.is_finished()
    }
}

/// Controller that owns the scanning lifecycle.
///
/// At most one scan runs at a time: `start()` while scanning does nothing.
/// Failures to start are logged and leave the session idle rather than
/// being returned to the caller.
pub struct ScanSession {
    scanner: Arc<dyn PlatformScanner>,
    permission: Arc<dyn PermissionCheck>,
    pipeline: IngestPipeline,
    config: ScanConfig,
    /// Serializes start and stop.
    active: Mutex<Option<ActiveScan>>,
    state_tx: Arc<watch::Sender<ScanState>>,
    /// Incremented on every successful start.
    generation: Arc<AtomicU64>,
}

impl ScanSession {
    /// Create an idle session.
    pub fn new(
        scanner: Arc<dyn PlatformScanner>,
        permission: Arc<dyn PermissionCheck>,
        pipeline: IngestPipeline,
        config: ScanConfig,
    ) -> Self {
        let (state_tx, _) = watch::channel(ScanState::Idle);

        Self {
            scanner,
            permission,
            pipeline,
            config,
            active: Mutex::new(None),
            state_tx: Arc::new(state_tx),
            generation: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Start scanning.
    ///
    /// Does nothing if a scan is already running. If the permission check
    /// fails or the platform refuses to scan, the session stays idle.
    /// Returns the state after the call.
    pub async fn start(&self) -> ScanState {
        let mut active = self.active.lock().await;

        if let Some(scan) = active.take() {
            if scan.is_running() {
                *active = Some(scan);
                debug!("Already scanning, ignoring start request");
                return ScanState::Scanning;
            }
            // The previous session ended on its own and may still be
            // stopping the platform scan.
            if let Err(e) = scan.handle.await {
                warn!("Scan task ended abnormally: {}", e);
            }
        }

        if !self.permission.has_required_access().await {
            warn!("Bluetooth access not granted, scan not started");
            return ScanState::Idle;
        }

        let events = match self.scanner.start(&self.config.settings).await {
            Ok(events) => events,
            Err(e) => {
                warn!("Failed to start scan: {}", e);
                return ScanState::Idle;
            }
        };

        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        self.state_tx.send_replace(ScanState::Scanning);
        info!(
            "Scan session {} started (timeout {:?})",
            generation, self.config.timeout
        );

        let (stop_tx, stop_rx) = oneshot::channel();
        let ending = Arc::new(AtomicBool::new(false));
        let task = SessionTask {
            scanner: self.scanner.clone(),
            pipeline: self.pipeline.clone(),
            state_tx: self.state_tx.clone(),
            generation: self.generation.clone(),
            session: generation,
            ending: ending.clone(),
        };
        let deadline = Instant::now() + self.config.timeout;
        let handle = tokio::spawn(task.run(events, stop_rx, deadline));

        *active = Some(ActiveScan {
            stop_tx,
            handle,
            ending,
        });

        ScanState::Scanning
    }

    /// Stop scanning.
    ///
    /// Cancels the pending timeout and waits until the platform scanner has
    /// been stopped. Safe to call when idle.
    pub async fn stop(&self) {
        let mut active = self.active.lock().await;

        let Some(scan) = active.take() else {
            debug!("Not scanning, ignoring stop request");
            return;
        };

        // The task may already have ended on its own.
        let _ = scan.stop_tx.send(StopReason::Stop);
        if let Err(e) = scan.handle.await {
            warn!("Scan task ended abnormally: {}", e);
        }

        self.state_tx.send_replace(ScanState::Idle);
    }

    /// Remove every device from the registry. Independent of scan state.
    pub fn clear(&self) {
        self.pipeline.registry().clear();
    }

    /// Get the current state.
    pub fn state(&self) -> ScanState {
        *self.state_tx.borrow()
    }

    /// Check if a scan is running.
    pub fn is_scanning(&self) -> bool {
        self.state().is_scanning()
    }

    /// Subscribe to state changes.
    pub fn subscribe_state(&self) -> watch::Receiver<ScanState> {
        self.state_tx.subscribe()
    }

    /// Get the session configuration.
    pub fn config(&self) -> &ScanConfig {
        &self.config
    }

    /// Stop without waiting and clear the registry.
    ///
    /// Used where awaiting is impossible, such as `Drop`. A running task
    /// clears the registry again after stopping the platform scan, so
    /// events it ingested before seeing the signal are dropped as well.
    pub(crate) fn teardown(&mut self) {
        if let Some(scan) = self.active.get_mut().take() {
            let _ = scan.stop_tx.send(StopReason::Teardown);
        }
        self.pipeline.registry().clear();
    }
}

/// Background half of a scan session.
struct SessionTask {
    scanner: Arc<dyn PlatformScanner>,
    pipeline: IngestPipeline,
    state_tx: Arc<watch::Sender<ScanState>>,
    generation: Arc<AtomicU64>,
    session: u64,
    ending: Arc<AtomicBool>,
}

impl SessionTask {
    /// Ingest events until stopped, timed out, or failed.
    async fn run(
        self,
        mut events: ScanEventStream,
        mut stop_rx: oneshot::Receiver<StopReason>,
        deadline: Instant,
    ) {
        let session = self.session;
        let timeout = tokio::time::sleep_until(deadline);
        tokio::pin!(timeout);
        let mut teardown = false;

        loop {
            tokio::select! {
                biased;

                reason = &mut stop_rx => {
                    // A dropped sender means the owning session is gone.
                    teardown = matches!(reason, Ok(StopReason::Teardown));
                    debug!("Scan session {} stopped ({:?})", session, reason);
                    break;
                }
                _ = &mut timeout => {
                    info!("Scan session {} timed out", session);
                    break;
                }
                event = events.next() => match event {
                    Some(ScanEvent::Advertisement(advertisement)) => {
                        self.pipeline.ingest(advertisement);
                    }
                    Some(ScanEvent::Failed { reason }) => {
                        warn!("Scan session {} failed: {}", session, reason);
                        break;
                    }
                    None => {
                        debug!("Scan session {} event stream ended", session);
                        break;
                    }
                },
            }
        }

        self.ending.store(true, Ordering::SeqCst);
        drop(events);

        if let Err(e) = self.scanner.stop().await {
            warn!("Failed to stop scan: {}", e);
        }

        if teardown {
            self.pipeline.registry().clear();
        }

        // Only report idle if no newer session has started since.
        self.state_tx.send_if_modified(|state| {
            if self.generation.load(Ordering::SeqCst) == session && state.is_scanning() {
                *state = ScanState::Idle;
                true
            } else {
                false
            }
        });

        debug!("Scan session {} ended", session);
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::ble::advertising::RawAdvertisement;
    use crate::ble::permission::{AlwaysGranted, MockPermissionCheck};
    use crate::config::ScanSettings;
    use crate::error::{Error, Result};
    use crate::registry::DeviceRegistry;
    use async_trait::async_trait;
    use futures::channel::mpsc;
    use parking_lot::Mutex as SyncMutex;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    /// In-memory scanner whose events are pushed by the test.
    #[derive(Default)]
    pub(crate) struct FakeScanner {
        pub(crate) starts: AtomicUsize,
        pub(crate) stops: AtomicUsize,
        pub(crate) refuse: bool,
        /// How long `stop()` takes to return.
        pub(crate) stop_delay: Option<Duration>,
        settings: SyncMutex<Option<ScanSettings>>,
        sender: SyncMutex<Option<mpsc::UnboundedSender<ScanEvent>>>,
    }

    impl FakeScanner {
        pub(crate) fn refusing() -> Self {
            Self {
                refuse: true,
                ..Self::default()
            }
        }

        pub(crate) fn slow_to_stop(delay: Duration) -> Self {
            Self {
                stop_delay: Some(delay),
                ..Self::default()
            }
        }

        /// Settings passed to the most recent `start()`.
        pub(crate) fn last_settings(&self) -> Option<ScanSettings> {
            self.settings.lock().clone()
        }

        pub(crate) fn emit(&self, event: ScanEvent) -> bool {
            match self.sender.lock().as_ref() {
                Some(tx) => tx.unbounded_send(event).is_ok(),
                None => false,
            }
        }

        pub(crate) fn advertise(&self, advertisement: RawAdvertisement) -> bool {
            self.emit(ScanEvent::Advertisement(advertisement))
        }

        pub(crate) fn starts(&self) -> usize {
            self.starts.load(Ordering::SeqCst)
        }

        pub(crate) fn stops(&self) -> usize {
            self.stops.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl PlatformScanner for FakeScanner {
        async fn start(&self, settings: &ScanSettings) -> Result<ScanEventStream> {
            if self.refuse {
                return Err(Error::PermissionDenied);
            }
            self.starts.fetch_add(1, Ordering::SeqCst);
            *self.settings.lock() = Some(settings.clone());
            let (tx, rx) = mpsc::unbounded();
            *self.sender.lock() = Some(tx);
            Ok(rx.boxed())
        }

        async fn stop(&self) -> Result<()> {
            self.sender.lock().take();
            if let Some(delay) = self.stop_delay {
                tokio::time::sleep(delay).await;
            }
            self.stops.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn session_with(
        scanner: Arc<FakeScanner>,
        permission: Arc<dyn PermissionCheck>,
    ) -> (ScanSession, Arc<DeviceRegistry>) {
        session_with_config(scanner, permission, ScanConfig::default())
    }

    fn session_with_config(
        scanner: Arc<FakeScanner>,
        permission: Arc<dyn PermissionCheck>,
        config: ScanConfig,
    ) -> (ScanSession, Arc<DeviceRegistry>) {
        let registry = Arc::new(DeviceRegistry::default());
        let session = ScanSession::new(
            scanner,
            permission,
            IngestPipeline::new(registry.clone()),
            config,
        );
        (session, registry)
    }

    fn sht40(address: &str) -> RawAdvertisement {
        RawAdvertisement::new(address, "Sensor1").with_manufacturer_data(1, vec![5, 22, 5, 67, 3])
    }

    async fn wait_for_idle(session: &ScanSession) {
        let mut rx = session.subscribe_state();
        rx.wait_for(|state| *state == ScanState::Idle).await.unwrap();
    }

    async fn wait_for_devices(registry: &DeviceRegistry, count: usize) {
        let mut subscription = registry.subscribe();
        while let Some(snapshot) = subscription.recv().await {
            if snapshot.len() >= count {
                return;
            }
        }
    }

    #[tokio::test]
    async fn test_start_twice_runs_one_session() {
        let scanner = Arc::new(FakeScanner::default());
        let (session, _) = session_with(scanner.clone(), Arc::new(AlwaysGranted));

        assert_eq!(session.start().await, ScanState::Scanning);
        assert_eq!(session.start().await, ScanState::Scanning);
        assert_eq!(scanner.starts(), 1);

        session.stop().await;
    }

    #[tokio::test]
    async fn test_concurrent_starts_run_one_session() {
        let scanner = Arc::new(FakeScanner::default());
        let (session, _) = session_with(scanner.clone(), Arc::new(AlwaysGranted));

        let (a, b) = tokio::join!(session.start(), session.start());
        assert_eq!((a, b), (ScanState::Scanning, ScanState::Scanning));
        assert_eq!(scanner.starts(), 1);

        session.stop().await;
    }

    #[tokio::test]
    async fn test_stop_when_idle_is_noop() {
        let scanner = Arc::new(FakeScanner::default());
        let (session, _) = session_with(scanner.clone(), Arc::new(AlwaysGranted));

        session.stop().await;
        session.stop().await;

        assert_eq!(session.state(), ScanState::Idle);
        assert_eq!(scanner.stops(), 0);
    }

    #[tokio::test]
    async fn test_stop_stops_platform_scan() {
        let scanner = Arc::new(FakeScanner::default());
        let (session, _) = session_with(scanner.clone(), Arc::new(AlwaysGranted));

        session.start().await;
        session.stop().await;

        assert_eq!(session.state(), ScanState::Idle);
        assert_eq!(scanner.stops(), 1);
        assert!(!scanner.advertise(sht40("AA:BB")));
    }

    #[tokio::test]
    async fn test_permission_denied_stays_idle() {
        let scanner = Arc::new(FakeScanner::default());
        let mut permission = MockPermissionCheck::new();
        permission
            .expect_has_required_access()
            .times(1)
            .return_const(false);
        let (session, _) = session_with(scanner.clone(), Arc::new(permission));

        assert_eq!(session.start().await, ScanState::Idle);
        assert!(!session.is_scanning());
        assert_eq!(scanner.starts(), 0);
    }

    #[tokio::test]
    async fn test_platform_refusal_stays_idle() {
        let scanner = Arc::new(FakeScanner::refusing());
        let (session, _) = session_with(scanner.clone(), Arc::new(AlwaysGranted));

        assert_eq!(session.start().await, ScanState::Idle);
        assert_eq!(session.state(), ScanState::Idle);
    }

    #[tokio::test]
    async fn test_events_reach_registry() {
        let scanner = Arc::new(FakeScanner::default());
        let (session, registry) = session_with(scanner.clone(), Arc::new(AlwaysGranted));

        session.start().await;
        assert!(scanner.advertise(RawAdvertisement::new("AA:BB", "")));
        assert!(scanner.advertise(sht40("AA:BB")));
        assert!(scanner.advertise(sht40("CC:DD")));

        wait_for_devices(&registry, 2).await;
        session.stop().await;

        assert_eq!(registry.len(), 2);
        assert_eq!(
            registry.get("AA:BB").unwrap().sensor_kind,
            crate::SensorKind::Sht40
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_returns_to_idle() {
        let scanner = Arc::new(FakeScanner::default());
        let (session, _) = session_with(scanner.clone(), Arc::new(AlwaysGranted));

        session.start().await;
        tokio::time::sleep(Duration::from_secs(19)).await;
        assert!(session.is_scanning());

        tokio::time::sleep(Duration::from_secs(2)).await;
        wait_for_idle(&session).await;

        assert_eq!(session.state(), ScanState::Idle);
        assert_eq!(scanner.stops(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_cancels_timeout() {
        let scanner = Arc::new(FakeScanner::default());
        let (session, _) = session_with(scanner.clone(), Arc::new(AlwaysGranted));

        session.start().await;
        tokio::time::sleep(Duration::from_secs(5)).await;
        session.stop().await;

        // Restart and make sure the first session's deadline does not end it.
        session.start().await;
        tokio::time::sleep(Duration::from_secs(18)).await;
        assert!(session.is_scanning());
        assert_eq!(scanner.stops(), 1);

        session.stop().await;
        assert_eq!(scanner.stops(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_restart_after_timeout() {
        let scanner = Arc::new(FakeScanner::default());
        let (session, _) = session_with(scanner.clone(), Arc::new(AlwaysGranted));

        session.start().await;
        tokio::time::sleep(Duration::from_secs(21)).await;
        wait_for_idle(&session).await;

        assert_eq!(session.start().await, ScanState::Scanning);
        assert_eq!(scanner.starts(), 2);
        session.stop().await;
        assert_eq!(session.state(), ScanState::Idle);
    }

    #[tokio::test]
    async fn test_platform_failure_returns_to_idle() {
        let scanner = Arc::new(FakeScanner::default());
        let (session, _) = session_with(scanner.clone(), Arc::new(AlwaysGranted));

        session.start().await;
        assert!(scanner.emit(ScanEvent::Failed {
            reason: "radio off".to_string(),
        }));
        wait_for_idle(&session).await;

        assert_eq!(scanner.stops(), 1);
        // Stopping after the failure is still safe.
        session.stop().await;
        assert_eq!(scanner.stops(), 1);
    }

    #[tokio::test]
    async fn test_clear_while_scanning() {
        let scanner = Arc::new(FakeScanner::default());
        let (session, registry) = session_with(scanner.clone(), Arc::new(AlwaysGranted));

        session.start().await;
        scanner.advertise(sht40("AA:BB"));
        wait_for_devices(&registry, 1).await;

        session.clear();
        assert!(registry.is_empty());
        assert!(session.is_scanning());

        session.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_while_previous_session_is_stopping() {
        let scanner = Arc::new(FakeScanner::slow_to_stop(Duration::from_secs(5)));
        let (session, _) = session_with(scanner.clone(), Arc::new(AlwaysGranted));

        session.start().await;
        // Timed out at 20 s; the platform stop takes until 25 s.
        tokio::time::sleep(Duration::from_secs(21)).await;
        assert!(session.is_scanning());
        assert_eq!(scanner.stops(), 0);

        assert_eq!(session.start().await, ScanState::Scanning);
        assert_eq!(scanner.stops(), 1);
        assert_eq!(scanner.starts(), 2);
        assert!(session.is_scanning());

        // The new session still owns its full timeout.
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert!(session.is_scanning());

        session.stop().await;
        assert_eq!(scanner.stops(), 2);
        assert_eq!(session.state(), ScanState::Idle);
    }

    #[tokio::test]
    async fn test_settings_reach_platform_scanner() {
        let scanner = Arc::new(FakeScanner::default());
        let config = ScanConfig::default()
            .with_mode(crate::config::ScanMode::LowPower)
            .with_service(uuid::Uuid::from_u128(0x181A));
        let (session, _) =
            session_with_config(scanner.clone(), Arc::new(AlwaysGranted), config.clone());

        session.start().await;
        assert_eq!(scanner.last_settings(), Some(config.settings));

        session.stop().await;
    }

    #[tokio::test]
    async fn test_teardown_clears_after_platform_stop() {
        let scanner = Arc::new(FakeScanner::default());
        let (mut session, registry) = session_with(scanner.clone(), Arc::new(AlwaysGranted));
        let mut state = session.subscribe_state();

        session.start().await;
        for i in 0..8 {
            scanner.advertise(RawAdvertisement::new(format!("AA:{:02}", i), "Sensor"));
        }
        session.teardown();
        assert!(registry.is_empty());

        state.wait_for(|s| *s == ScanState::Idle).await.unwrap();
        assert_eq!(scanner.stops(), 1);
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_stop_keeps_devices() {
        let scanner = Arc::new(FakeScanner::default());
        let (session, registry) = session_with(scanner.clone(), Arc::new(AlwaysGranted));

        session.start().await;
        scanner.advertise(sht40("AA:BB"));
        wait_for_devices(&registry, 1).await;
        session.stop().await;

        assert_eq!(registry.len(), 1);
    }
}
