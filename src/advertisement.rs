use std::collections::{BTreeSet, HashMap};

use serde::Serialize;
use tracing::instrument;

use crate::protocol::normalise_uuid;

/// Name reported for peripherals that advertise no local name.
pub const UNNAMED_PERIPHERAL: &str = "N/A";

/// Standard advertisement payload keys.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub enum AdvertisementKey {
    /// Complete or shortened local name.
    LocalName,
    /// Advertised service identifiers.
    ServiceUuids,
    /// Manufacturer-specific data including the company identifier.
    ManufacturerData,
    /// Advertised transmit power.
    TxPowerLevel,
}

/// Value stored under one advertisement key.
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum AdvertisementValue {
    /// UTF-8 text.
    Text(String),
    /// List of identifiers.
    Identifiers(Vec<String>),
    /// Opaque bytes.
    Bytes(Vec<u8>),
    /// Signed integer.
    Integer(i64),
}

/// Raw advertisement payload keyed by standard advertisement keys.
pub type AdvertisementData = HashMap<AdvertisementKey, AdvertisementValue>;

/// Name and advertised services extracted from one advertisement.
#[derive(Debug, Clone, Eq, PartialEq, Serialize)]
pub struct ParsedAdvertisement {
    name: String,
    service_ids: BTreeSet<String>,
}

impl ParsedAdvertisement {
    /// Returns the advertised name, or [`UNNAMED_PERIPHERAL`].
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the normalised advertised service identifiers.
    #[must_use]
    pub fn service_ids(&self) -> &BTreeSet<String> {
        &self.service_ids
    }
}

/// Decodes raw advertisement payloads.
pub struct AdvertisementParser;

impl AdvertisementParser {
    /// Extracts the name and advertised services.
    ///
    /// Missing keys and values of the wrong shape fall back to the defaults;
    /// parsing never fails.
    ///
    /// ```
    /// use blinky::{AdvertisementData, AdvertisementParser};
    ///
    /// let parsed = AdvertisementParser::parse(&AdvertisementData::new());
    /// assert_eq!("N/A", parsed.name());
    /// assert!(parsed.service_ids().is_empty());
    /// ```
    #[must_use]
    #[instrument(skip(data), level = "trace", fields(keys = data.len()))]
    pub fn parse(data: &AdvertisementData) -> ParsedAdvertisement {
        let name = match data.get(&AdvertisementKey::LocalName) {
            Some(AdvertisementValue::Text(name)) => name.clone(),
            _ => UNNAMED_PERIPHERAL.to_string(),
        };
        let service_ids = match data.get(&AdvertisementKey::ServiceUuids) {
            Some(AdvertisementValue::Identifiers(ids)) => {
                ids.iter().map(|id| normalise_uuid(id)).collect()
            }
            _ => BTreeSet::new(),
        };

        ParsedAdvertisement { name, service_ids }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case::empty(AdvertisementData::new())]
    #[case::only_services(AdvertisementData::from([(
        AdvertisementKey::ServiceUuids,
        AdvertisementValue::Identifiers(vec!["180a".to_string()]),
    )]))]
    #[case::wrong_shape(AdvertisementData::from([(
        AdvertisementKey::LocalName,
        AdvertisementValue::Bytes(vec![0x42]),
    )]))]
    fn parse_defaults_missing_name(#[case] data: AdvertisementData) {
        assert_eq!(UNNAMED_PERIPHERAL, AdvertisementParser::parse(&data).name());
    }

    #[test]
    fn parse_normalises_and_deduplicates_service_ids() {
        let data = AdvertisementData::from([
            (
                AdvertisementKey::LocalName,
                AdvertisementValue::Text("Thingy".to_string()),
            ),
            (
                AdvertisementKey::ServiceUuids,
                AdvertisementValue::Identifiers(vec![
                    "FE59".to_string(),
                    "0000fe59-0000-1000-8000-00805f9b34fb".to_string(),
                    "EF680100-9B35-4933-9B10-52FFA9740042".to_string(),
                ]),
            ),
            (AdvertisementKey::TxPowerLevel, AdvertisementValue::Integer(4)),
        ]);

        let parsed = AdvertisementParser::parse(&data);

        assert_eq!("Thingy", parsed.name());
        assert_eq!(
            vec![
                "0000fe59-0000-1000-8000-00805f9b34fb",
                "ef680100-9b35-4933-9b10-52ffa9740042",
            ],
            parsed
                .service_ids()
                .iter()
                .map(String::as_str)
                .collect::<Vec<_>>()
        );
    }

    #[test]
    fn parse_ignores_services_of_wrong_shape() {
        let data = AdvertisementData::from([(
            AdvertisementKey::ServiceUuids,
            AdvertisementValue::Text("180a".to_string()),
        )]);
        assert!(AdvertisementParser::parse(&data).service_ids().is_empty());
    }
}
