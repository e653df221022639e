//! Scan configuration.

use std::time::Duration;
use uuid::Uuid;

use crate::error::{Error, Result};

/// How long a scan session runs before it stops on its own.
pub const DEFAULT_SCAN_TIMEOUT: Duration = Duration::from_secs(20);

/// Default number of device snapshots buffered per subscriber.
pub const DEFAULT_SNAPSHOT_CAPACITY: usize = 32;

/// Radio duty cycle requested from the platform scanner.
///
/// The mode is a hint. [`BtleplugScanner`](crate::ble::BtleplugScanner)
/// always scans continuously because btleplug exposes no duty-cycle
/// control; other [`PlatformScanner`](crate::ble::PlatformScanner)
/// backends may honour it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ScanMode {
    /// Scan continuously. Highest power use, fastest discovery.
    #[default]
    LowLatency,
    /// Trade-off between discovery latency and power.
    Balanced,
    /// Scan in short windows to save power.
    LowPower,
}

/// Settings handed to the platform scanner when a session starts.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ScanSettings {
    /// Requested duty cycle. Advisory; see [`ScanMode`].
    pub mode: ScanMode,
    /// Only report peripherals advertising one of these services.
    ///
    /// Empty means no filter.
    pub services: Vec<Uuid>,
}

/// Configuration for a scan session.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ScanConfig {
    /// Automatic stop after this long.
    pub timeout: Duration,
    /// Settings passed to the platform scanner.
    pub settings: ScanSettings,
    /// Snapshots buffered per registry subscriber before it lags.
    pub snapshot_capacity: usize,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_SCAN_TIMEOUT,
            settings: ScanSettings::default(),
            snapshot_capacity: DEFAULT_SNAPSHOT_CAPACITY,
        }
    }
}

impl ScanConfig {
    /// Set the automatic stop timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the scan mode.
    pub fn with_mode(mut self, mode: ScanMode) -> Self {
        self.settings.mode = mode;
        self
    }

    /// Add a service UUID to the scan filter.
    pub fn with_service(mut self, service: Uuid) -> Self {
        self.settings.services.push(service);
        self
    }

    /// Set the per-subscriber snapshot buffer.
    pub fn with_snapshot_capacity(mut self, capacity: usize) -> Self {
        self.snapshot_capacity = capacity;
        self
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidParameter`] for a zero timeout or a zero
    /// snapshot capacity.
    pub fn validate(&self) -> Result<()> {
        if self.timeout.is_zero() {
            return Err(Error::InvalidParameter {
                name: "timeout".to_string(),
                value: format!("{:?}", self.timeout),
            });
        }
        if self.snapshot_capacity == 0 {
            return Err(Error::InvalidParameter {
                name: "snapshot_capacity".to_string(),
                value: self.snapshot_capacity.to_string(),
            });
        }
        Ok(())
    }
}
