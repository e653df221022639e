//! Permission and radio availability checks that gate scanning.

use async_trait::async_trait;
use btleplug::api::{Central, CentralState};
use btleplug::platform::Adapter;
use tracing::{debug, warn};

/// Check that must pass before a scan session may start.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PermissionCheck: Send + Sync {
    /// Whether the application currently has the access scanning needs,
    /// including a powered-on radio.
    async fn has_required_access(&self) -> bool;
}

/// Grants access whenever the adapter reports it is powered on.
///
/// Desktop platforms have no runtime permission prompt for BLE scanning;
/// an unauthorized process sees the adapter as unavailable instead.
#[derive(Clone)]
pub struct AdapterPermission {
    adapter: Adapter,
}

impl AdapterPermission {
    /// Create a check bound to an adapter.
    pub fn new(adapter: Adapter) -> Self {
        Self { adapter }
    }
}

#[async_trait]
impl PermissionCheck for AdapterPermission {
    async fn has_required_access(&self) -> bool {
        match self.adapter.adapter_state().await {
            Ok(CentralState::PoweredOn) => true,
            Ok(state) => {
                debug!("Bluetooth adapter not ready: {:?}", state);
                false
            }
            Err(e) => {
                warn!("Failed to query Bluetooth adapter state: {}", e);
                false
            }
        }
    }
}

/// Check that always passes.
///
/// Useful when the host application has already obtained consent.
#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysGranted;

#[async_trait]
impl PermissionCheck for AlwaysGranted {
    async fn has_required_access(&self) -> bool {
        true
    }
}
