use std::collections::HashMap;
use std::sync::LazyLock;

use serde_with::SerializeDisplay;
use strum_macros::{Display, EnumIter};

/// Bluetooth base UUID suffix used to expand 16-bit identifiers.
const BLUETOOTH_BASE_SUFFIX: &str = "-0000-1000-8000-00805f9b34fb";

/// Client characteristic configuration descriptor.
pub(crate) const CCCD_UUID: &str = "00002902-0000-1000-8000-00805f9b34fb";

/// Role of a discovered GATT service.
#[derive(Debug, Clone, Eq, PartialEq, Hash, derive_more::Display, SerializeDisplay)]
pub enum ServiceRole {
    /// Sound/microphone streaming service.
    #[display("sound")]
    Sound,
    /// Blinky/configuration service carrying the LED and button characteristics.
    #[display("config")]
    Config,
    /// Nordic UART service carrying the command Rx and response Tx characteristics.
    #[display("nordic_uart")]
    NordicUart,
    /// Environment sensor service.
    #[display("sensor")]
    Sensor,
    /// Device Information service.
    #[display("device_info")]
    DeviceInfo,
    /// Secure DFU service.
    #[display("secure_dfu")]
    SecureDfu,
    /// Any service missing from the well-known table, keyed by its normalised UUID.
    #[display("unknown({_0})")]
    Unknown(String),
}

impl ServiceRole {
    /// Returns whether the session discovers characteristics for this service.
    #[must_use]
    pub fn is_explored(&self) -> bool {
        matches!(self, Self::Sound | Self::Config | Self::NordicUart)
    }
}

/// Logical role of a bound characteristic.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, Ord, PartialOrd, EnumIter, Display, SerializeDisplay)]
pub enum CharacteristicRole {
    /// LED state, written with response and read back.
    #[strum(to_string = "led")]
    Led,
    /// Button state, notified by the peripheral.
    #[strum(to_string = "button")]
    Button,
    /// Raw PCM microphone samples.
    #[strum(to_string = "sound")]
    Sound,
    /// Command write target.
    #[strum(to_string = "rx")]
    Rx,
    /// Command response notify source.
    #[strum(to_string = "tx")]
    Tx,
    /// Firmware version string.
    #[strum(to_string = "firmware_version")]
    FirmwareVersion,
}

/// What discovery does with a characteristic once it is bound.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub(crate) enum DiscoveryFollowUp {
    /// Nothing further; the branch does not wait on this characteristic.
    None,
    /// Enable notifications and wait for the acknowledgement.
    EnableNotifications,
    /// Discover descriptors and wait for the configuration descriptor.
    InspectDescriptors,
}

impl CharacteristicRole {
    /// Returns whether the peripheral pushes values for this role.
    #[must_use]
    pub fn is_notify_source(self) -> bool {
        matches!(self, Self::Button | Self::Sound | Self::Tx)
    }

    pub(crate) fn follow_up(self) -> DiscoveryFollowUp {
        match self {
            Self::Button | Self::Tx => DiscoveryFollowUp::EnableNotifications,
            Self::Sound => DiscoveryFollowUp::InspectDescriptors,
            Self::Led | Self::Rx | Self::FirmwareVersion => DiscoveryFollowUp::None,
        }
    }
}

#[derive(Debug)]
struct ServiceEntry {
    uuid: &'static str,
    role: ServiceRole,
}

#[derive(Debug)]
struct CharacteristicEntry {
    service: ServiceRole,
    uuid: &'static str,
    role: CharacteristicRole,
}

static SERVICE_TABLE: [ServiceEntry; 10] = [
    ServiceEntry {
        uuid: "000018ff-0000-1000-8000-00805f9b34fb",
        role: ServiceRole::Sound,
    },
    ServiceEntry {
        uuid: "ef680500-9b35-4933-9b10-52ffa9740042",
        role: ServiceRole::Sound,
    },
    ServiceEntry {
        uuid: "6e400100-b5a3-f393-e0a9-e50e24dcca9e",
        role: ServiceRole::Config,
    },
    ServiceEntry {
        uuid: "00001523-1212-efde-1523-785feabcd123",
        role: ServiceRole::Config,
    },
    ServiceEntry {
        uuid: "6e400001-b5a3-f393-e0a9-e50e24dcca9e",
        role: ServiceRole::NordicUart,
    },
    ServiceEntry {
        uuid: "ef680200-9b35-4933-9b10-52ffa9740042",
        role: ServiceRole::Sensor,
    },
    ServiceEntry {
        uuid: "0000180a-0000-1000-8000-00805f9b34fb",
        role: ServiceRole::DeviceInfo,
    },
    ServiceEntry {
        uuid: "0000fe59-0000-1000-8000-00805f9b34fb",
        role: ServiceRole::SecureDfu,
    },
    ServiceEntry {
        uuid: "00001530-1212-efde-1523-785feabcd123",
        role: ServiceRole::SecureDfu,
    },
    ServiceEntry {
        uuid: "ef680100-9b35-4933-9b10-52ffa9740042",
        role: ServiceRole::Config,
    },
];

static CHARACTERISTIC_TABLE: [CharacteristicEntry; 10] = [
    CharacteristicEntry {
        service: ServiceRole::Sound,
        uuid: "00002aff-0000-1000-8000-00805f9b34fb",
        role: CharacteristicRole::Sound,
    },
    CharacteristicEntry {
        service: ServiceRole::Sound,
        uuid: "ef680504-9b35-4933-9b10-52ffa9740042",
        role: CharacteristicRole::Sound,
    },
    CharacteristicEntry {
        service: ServiceRole::Config,
        uuid: "6e400102-b5a3-f393-e0a9-e50e24dcca9e",
        role: CharacteristicRole::FirmwareVersion,
    },
    CharacteristicEntry {
        service: ServiceRole::Config,
        uuid: "6e400103-b5a3-f393-e0a9-e50e24dcca9e",
        role: CharacteristicRole::Led,
    },
    CharacteristicEntry {
        service: ServiceRole::Config,
        uuid: "6e400106-b5a3-f393-e0a9-e50e24dcca9e",
        role: CharacteristicRole::Button,
    },
    CharacteristicEntry {
        service: ServiceRole::Config,
        uuid: "00001524-1212-efde-1523-785feabcd123",
        role: CharacteristicRole::Button,
    },
    CharacteristicEntry {
        service: ServiceRole::Config,
        uuid: "00001525-1212-efde-1523-785feabcd123",
        role: CharacteristicRole::Led,
    },
    CharacteristicEntry {
        service: ServiceRole::NordicUart,
        uuid: "6e400002-b5a3-f393-e0a9-e50e24dcca9e",
        role: CharacteristicRole::Rx,
    },
    CharacteristicEntry {
        service: ServiceRole::NordicUart,
        uuid: "6e400003-b5a3-f393-e0a9-e50e24dcca9e",
        role: CharacteristicRole::Tx,
    },
    CharacteristicEntry {
        service: ServiceRole::Config,
        uuid: "ef680107-9b35-4933-9b10-52ffa9740042",
        role: CharacteristicRole::FirmwareVersion,
    },
];

/// Service roles keyed by normalised UUID.
static SERVICES_BY_UUID: LazyLock<HashMap<&'static str, ServiceRole>> = LazyLock::new(|| {
    SERVICE_TABLE
        .iter()
        .map(|entry| (entry.uuid, entry.role.clone()))
        .collect()
});

/// Characteristic roles keyed by owning service role and normalised UUID.
static CHARACTERISTICS_BY_UUID: LazyLock<HashMap<(ServiceRole, &'static str), CharacteristicRole>> =
    LazyLock::new(|| {
        CHARACTERISTIC_TABLE
            .iter()
            .map(|entry| ((entry.service.clone(), entry.uuid), entry.role))
            .collect()
    });

/// Normalises a UUID string to lowercase 128-bit form.
///
/// 16-bit and 32-bit short forms are expanded against the Bluetooth base UUID.
///
/// ```
/// assert_eq!(
///     "0000180a-0000-1000-8000-00805f9b34fb",
///     blinky::normalise_uuid("180A")
/// );
/// ```
#[must_use]
pub fn normalise_uuid(uuid: &str) -> String {
    let trimmed = uuid.trim().to_ascii_lowercase();
    let is_hex = trimmed.chars().all(|c| c.is_ascii_hexdigit());
    match trimmed.len() {
        4 if is_hex => format!("0000{trimmed}{BLUETOOTH_BASE_SUFFIX}"),
        8 if is_hex => format!("{trimmed}{BLUETOOTH_BASE_SUFFIX}"),
        _ => trimmed,
    }
}

/// Classifies a discovered service identifier.
#[must_use]
pub fn classify_service(uuid: &str) -> ServiceRole {
    let normalised = normalise_uuid(uuid);
    SERVICES_BY_UUID
        .get(normalised.as_str())
        .cloned()
        .unwrap_or(ServiceRole::Unknown(normalised))
}

/// Classifies a characteristic identifier within its owning service.
#[must_use]
pub fn classify_characteristic(service: &ServiceRole, uuid: &str) -> Option<CharacteristicRole> {
    let normalised = normalise_uuid(uuid);
    CHARACTERISTICS_BY_UUID
        .get(&(service.clone(), normalised.as_str()))
        .copied()
}

/// Returns whether a descriptor UUID is the client characteristic configuration descriptor.
pub(crate) fn is_cccd(uuid: &str) -> bool {
    normalise_uuid(uuid) == CCCD_UUID
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use rstest::rstest;
    use strum::IntoEnumIterator;

    use super::*;

    #[rstest]
    #[case("000018FF-0000-1000-8000-00805F9B34FB", ServiceRole::Sound)]
    #[case("6e400001-b5a3-f393-e0a9-e50e24dcca9e", ServiceRole::NordicUart)]
    #[case("180a", ServiceRole::DeviceInfo)]
    #[case("FE59", ServiceRole::SecureDfu)]
    fn classify_service_matches_case_insensitively(
        #[case] uuid: &str,
        #[case] expected: ServiceRole,
    ) {
        assert_eq!(expected, classify_service(uuid));
    }

    #[test]
    fn classify_service_preserves_unknown_identifier() {
        assert_eq!(
            ServiceRole::Unknown("0000abcd-0000-1000-8000-00805f9b34fb".to_string()),
            classify_service("ABCD")
        );
    }

    #[rstest]
    #[case(ServiceRole::Config, "00001525-1212-EFDE-1523-785FEABCD123", Some(CharacteristicRole::Led))]
    #[case(ServiceRole::NordicUart, "6e400002-b5a3-f393-e0a9-e50e24dcca9e", Some(CharacteristicRole::Rx))]
    #[case(ServiceRole::Sound, "2aff", Some(CharacteristicRole::Sound))]
    #[case(ServiceRole::Sound, "6e400002-b5a3-f393-e0a9-e50e24dcca9e", None)]
    fn classify_characteristic_is_scoped_to_service(
        #[case] service: ServiceRole,
        #[case] uuid: &str,
        #[case] expected: Option<CharacteristicRole>,
    ) {
        assert_eq!(expected, classify_characteristic(&service, uuid));
    }

    #[test]
    fn only_session_services_are_explored() {
        assert!(ServiceRole::Sound.is_explored());
        assert!(!ServiceRole::DeviceInfo.is_explored());
        assert!(!ServiceRole::Unknown("x".to_string()).is_explored());
    }

    #[test]
    fn cccd_matches_short_form() {
        assert!(is_cccd("2902"));
        assert!(!is_cccd("2901"));
    }

    #[test]
    fn every_role_has_a_well_known_identifier() {
        for role in CharacteristicRole::iter() {
            assert!(
                CHARACTERISTIC_TABLE.iter().any(|entry| entry.role == role),
                "no identifier for {role}"
            );
        }
    }
}
