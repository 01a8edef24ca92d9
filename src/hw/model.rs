use std::collections::BTreeSet;

use serde::Serialize;

use crate::advertisement::ParsedAdvertisement;

/// Adapter-assigned peripheral identifier.
#[derive(
    Debug,
    Clone,
    Eq,
    PartialEq,
    Hash,
    Ord,
    PartialOrd,
    Serialize,
    derive_more::Display,
    derive_more::From,
)]
#[serde(transparent)]
pub struct PeripheralId(String);

impl From<&str> for PeripheralId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl PeripheralId {
    /// Returns the identifier text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// A peripheral seen while scanning.
#[derive(Debug, Clone, Eq, PartialEq, Serialize)]
pub struct FoundDevice {
    peripheral: PeripheralId,
    name: String,
    rssi: Option<i16>,
    service_ids: BTreeSet<String>,
}

impl FoundDevice {
    /// Creates a discovered-device record from a parsed advertisement.
    pub(crate) fn new(
        peripheral: PeripheralId,
        advertisement: ParsedAdvertisement,
        rssi: Option<i16>,
    ) -> Self {
        Self {
            peripheral,
            name: advertisement.name().to_string(),
            rssi,
            service_ids: advertisement.service_ids().clone(),
        }
    }

    /// Returns the peripheral identifier.
    #[must_use]
    pub fn peripheral(&self) -> &PeripheralId {
        &self.peripheral
    }

    /// Returns the advertised local name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the latest observed RSSI value, if present.
    #[must_use]
    pub fn rssi(&self) -> Option<i16> {
        self.rssi
    }

    /// Returns the advertised service identifiers.
    #[must_use]
    pub fn service_ids(&self) -> &BTreeSet<String> {
        &self.service_ids
    }

    /// Returns whether the local name starts with a prefix.
    pub(crate) fn name_starts_with(&self, prefix: &str) -> bool {
        self.name.starts_with(prefix)
    }

    /// Folds a newer sighting of the same peripheral into this record.
    ///
    /// Advertisements and scan responses carry different fields, so a
    /// placeholder name or empty service list never erases known values.
    pub(crate) fn merge(&mut self, newer: Self) {
        if newer.name != crate::advertisement::UNNAMED_PERIPHERAL {
            self.name = newer.name;
        }
        if newer.rssi.is_some() {
            self.rssi = newer.rssi;
        }
        self.service_ids.extend(newer.service_ids);
    }
}

/// A characteristic description reported by characteristic discovery.
#[derive(Debug, Clone, Eq, PartialEq, Serialize)]
pub struct CharacteristicInfo {
    uuid: String,
    properties: Vec<String>,
}

impl CharacteristicInfo {
    /// Creates a characteristic description.
    #[must_use]
    pub fn new(uuid: impl Into<String>, properties: Vec<String>) -> Self {
        Self {
            uuid: uuid.into(),
            properties,
        }
    }

    /// Returns the characteristic UUID.
    #[must_use]
    pub fn uuid(&self) -> &str {
        &self.uuid
    }

    /// Returns property labels for this characteristic.
    #[must_use]
    pub fn properties(&self) -> &[String] {
        &self.properties
    }
}

/// BLE write acknowledgement mode.
#[derive(Debug, Clone, Copy, Eq, PartialEq, derive_more::Display)]
pub enum WriteMode {
    #[display("with_response")]
    WithResponse,
    #[display("without_response")]
    WithoutResponse,
}
