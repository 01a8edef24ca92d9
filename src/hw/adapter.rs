use crate::advertisement::AdvertisementData;
use crate::error::AdapterFault;

use super::model::{CharacteristicInfo, PeripheralId, WriteMode};

/// One operation requested from a BLE adapter.
///
/// Every command except scanning is answered by exactly one [`AdapterEvent`].
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum AdapterCommand {
    Scan,
    StopScan,
    Connect(PeripheralId),
    Disconnect(PeripheralId),
    DiscoverServices(PeripheralId),
    DiscoverCharacteristics {
        peripheral: PeripheralId,
        service: String,
    },
    DiscoverDescriptors {
        peripheral: PeripheralId,
        characteristic: String,
    },
    SetNotify {
        peripheral: PeripheralId,
        characteristic: String,
        enabled: bool,
    },
    Write {
        peripheral: PeripheralId,
        characteristic: String,
        value: Vec<u8>,
        mode: WriteMode,
    },
    Read {
        peripheral: PeripheralId,
        characteristic: String,
    },
}

/// Push-style adapter callbacks.
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum AdapterEvent {
    Discovered {
        peripheral: PeripheralId,
        advertisement: AdvertisementData,
        rssi: Option<i16>,
    },
    Connected {
        peripheral: PeripheralId,
    },
    ConnectFailed {
        peripheral: PeripheralId,
        fault: AdapterFault,
    },
    /// `reason` is `None` for a requested disconnect.
    Disconnected {
        peripheral: PeripheralId,
        reason: Option<AdapterFault>,
    },
    ServicesDiscovered {
        peripheral: PeripheralId,
        result: Result<Vec<String>, AdapterFault>,
    },
    CharacteristicsDiscovered {
        peripheral: PeripheralId,
        service: String,
        result: Result<Vec<CharacteristicInfo>, AdapterFault>,
    },
    DescriptorsDiscovered {
        peripheral: PeripheralId,
        characteristic: String,
        result: Result<Vec<String>, AdapterFault>,
    },
    NotificationStateChanged {
        peripheral: PeripheralId,
        characteristic: String,
        result: Result<bool, AdapterFault>,
    },
    /// A read completion or an unsolicited notification.
    ValueUpdated {
        peripheral: PeripheralId,
        characteristic: String,
        result: Result<Vec<u8>, AdapterFault>,
    },
    /// Emitted for both write modes.
    WriteCompleted {
        peripheral: PeripheralId,
        characteristic: String,
        result: Result<(), AdapterFault>,
    },
}

impl AdapterEvent {
    /// Returns the peripheral this event belongs to.
    #[must_use]
    pub fn peripheral(&self) -> &PeripheralId {
        match self {
            Self::Discovered { peripheral, .. }
            | Self::Connected { peripheral }
            | Self::ConnectFailed { peripheral, .. }
            | Self::Disconnected { peripheral, .. }
            | Self::ServicesDiscovered { peripheral, .. }
            | Self::CharacteristicsDiscovered { peripheral, .. }
            | Self::DescriptorsDiscovered { peripheral, .. }
            | Self::NotificationStateChanged { peripheral, .. }
            | Self::ValueUpdated { peripheral, .. }
            | Self::WriteCompleted { peripheral, .. } => peripheral,
        }
    }

    /// Returns a short label for logging.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Discovered { .. } => "discovered",
            Self::Connected { .. } => "connected",
            Self::ConnectFailed { .. } => "connect_failed",
            Self::Disconnected { .. } => "disconnected",
            Self::ServicesDiscovered { .. } => "services_discovered",
            Self::CharacteristicsDiscovered { .. } => "characteristics_discovered",
            Self::DescriptorsDiscovered { .. } => "descriptors_discovered",
            Self::NotificationStateChanged { .. } => "notification_state_changed",
            Self::ValueUpdated { .. } => "value_updated",
            Self::WriteCompleted { .. } => "write_completed",
        }
    }
}

/// Injected BLE adapter capability.
///
/// Submitting never waits for the operation to finish; completions arrive on
/// the adapter's event channel.
pub trait BleAdapter: Send + Sync {
    /// Queues one command.
    ///
    /// # Errors
    ///
    /// Returns an error when the adapter can no longer accept commands.
    fn submit(&self, command: AdapterCommand) -> Result<(), AdapterFault>;

    fn scan(&self) -> Result<(), AdapterFault> {
        self.submit(AdapterCommand::Scan)
    }

    fn stop_scan(&self) -> Result<(), AdapterFault> {
        self.submit(AdapterCommand::StopScan)
    }

    fn connect(&self, peripheral: &PeripheralId) -> Result<(), AdapterFault> {
        self.submit(AdapterCommand::Connect(peripheral.clone()))
    }

    fn disconnect(&self, peripheral: &PeripheralId) -> Result<(), AdapterFault> {
        self.submit(AdapterCommand::Disconnect(peripheral.clone()))
    }

    fn discover_services(&self, peripheral: &PeripheralId) -> Result<(), AdapterFault> {
        self.submit(AdapterCommand::DiscoverServices(peripheral.clone()))
    }

    fn discover_characteristics(
        &self,
        peripheral: &PeripheralId,
        service: &str,
    ) -> Result<(), AdapterFault> {
        self.submit(AdapterCommand::DiscoverCharacteristics {
            peripheral: peripheral.clone(),
            service: service.to_string(),
        })
    }

    fn discover_descriptors(
        &self,
        peripheral: &PeripheralId,
        characteristic: &str,
    ) -> Result<(), AdapterFault> {
        self.submit(AdapterCommand::DiscoverDescriptors {
            peripheral: peripheral.clone(),
            characteristic: characteristic.to_string(),
        })
    }

    fn set_notify(
        &self,
        peripheral: &PeripheralId,
        characteristic: &str,
        enabled: bool,
    ) -> Result<(), AdapterFault> {
        self.submit(AdapterCommand::SetNotify {
            peripheral: peripheral.clone(),
            characteristic: characteristic.to_string(),
            enabled,
        })
    }

    fn write(
        &self,
        peripheral: &PeripheralId,
        characteristic: &str,
        value: Vec<u8>,
        mode: WriteMode,
    ) -> Result<(), AdapterFault> {
        self.submit(AdapterCommand::Write {
            peripheral: peripheral.clone(),
            characteristic: characteristic.to_string(),
            value,
            mode,
        })
    }

    fn read(&self, peripheral: &PeripheralId, characteristic: &str) -> Result<(), AdapterFault> {
        self.submit(AdapterCommand::Read {
            peripheral: peripheral.clone(),
            characteristic: characteristic.to_string(),
        })
    }
}
