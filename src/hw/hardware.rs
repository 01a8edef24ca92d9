use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc::{self, UnboundedReceiver};
use tracing::info;

use super::adapter::{AdapterEvent, BleAdapter};
use super::btleplug_backend::BtleplugBackend;
use super::fake_backend::{FakeBackend, FakeBackendConfig};
use crate::error::InteractionError;

/// Runtime BLE backend selection.
#[derive(Debug)]
pub(crate) enum HardwareBackend {
    Real,
    Fake(FakeBackendConfig),
}

/// Builds an injected hardware client for the selected runtime backend.
pub(crate) fn hardware_client_from_backend(backend: HardwareBackend) -> Box<dyn HardwareClient> {
    match backend {
        HardwareBackend::Real => Box::new(RealHardwareClient),
        HardwareBackend::Fake(config) => {
            info!("using fake BLE backend");
            Box::new(FakeHardwareClient { config })
        }
    }
}

/// Opens an adapter connection for a session driver.
#[async_trait]
pub trait HardwareClient: Send + Sync {
    /// Starts the adapter and returns its command handle and event stream.
    async fn open(self: Box<Self>) -> Result<AdapterConnection, InteractionError>;
}

/// An adapter command handle paired with the receiving end of its events.
pub struct AdapterConnection {
    adapter: Arc<dyn BleAdapter>,
    events: UnboundedReceiver<AdapterEvent>,
}

impl AdapterConnection {
    /// Pairs an adapter with its event receiver.
    #[must_use]
    pub fn new(adapter: Arc<dyn BleAdapter>, events: UnboundedReceiver<AdapterEvent>) -> Self {
        Self { adapter, events }
    }

    /// Splits the connection into its adapter and event receiver.
    #[must_use]
    pub fn into_parts(self) -> (Arc<dyn BleAdapter>, UnboundedReceiver<AdapterEvent>) {
        (self.adapter, self.events)
    }
}

impl std::fmt::Debug for AdapterConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdapterConnection").finish_non_exhaustive()
    }
}

#[derive(Debug)]
struct RealHardwareClient;

#[async_trait]
impl HardwareClient for RealHardwareClient {
    async fn open(self: Box<Self>) -> Result<AdapterConnection, InteractionError> {
        let (events_tx, events) = mpsc::unbounded_channel();
        let adapter = BtleplugBackend::new().await?.start(events_tx).await?;
        Ok(AdapterConnection::new(Arc::new(adapter), events))
    }
}

#[derive(Debug)]
struct FakeHardwareClient {
    config: FakeBackendConfig,
}

#[async_trait]
impl HardwareClient for FakeHardwareClient {
    async fn open(self: Box<Self>) -> Result<AdapterConnection, InteractionError> {
        let Self { config } = *self;
        let (events_tx, events) = mpsc::unbounded_channel();
        let adapter = FakeBackend::new(config, events_tx);
        Ok(AdapterConnection::new(Arc::new(adapter), events))
    }
}

/// Returns the hardware client backed by the system BLE adapter.
#[must_use]
pub fn real_hardware_client() -> Box<dyn HardwareClient> {
    hardware_client_from_backend(HardwareBackend::Real)
}

/// Returns a hardware client backed by the scripted fake adapter.
#[must_use]
pub fn fake_hardware_client(config: FakeBackendConfig) -> Box<dyn HardwareClient> {
    hardware_client_from_backend(HardwareBackend::Fake(config))
}
