use std::collections::{HashMap, HashSet};
use std::str::FromStr;
use std::sync::Mutex;

use bon::Builder;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, trace};

use super::adapter::{AdapterCommand, AdapterEvent, BleAdapter};
use super::model::{CharacteristicInfo, PeripheralId, WriteMode};
use crate::advertisement::{AdvertisementData, AdvertisementKey, AdvertisementValue};
use crate::error::{AdapterFault, FixtureError};
use crate::protocol::normalise_uuid;
use crate::utils::parse_hex;

const DEFAULT_FIRMWARE_VERSION: &str = "1.0.0";

const CONFIG_SERVICE: &str = "6e400100-b5a3-f393-e0a9-e50e24dcca9e";
const FIRMWARE_VERSION_CHARACTERISTIC: &str = "6e400102-b5a3-f393-e0a9-e50e24dcca9e";
const LED_CHARACTERISTIC: &str = "6e400103-b5a3-f393-e0a9-e50e24dcca9e";
const BUTTON_CHARACTERISTIC: &str = "6e400106-b5a3-f393-e0a9-e50e24dcca9e";
const UART_SERVICE: &str = "6e400001-b5a3-f393-e0a9-e50e24dcca9e";
const UART_RX_CHARACTERISTIC: &str = "6e400002-b5a3-f393-e0a9-e50e24dcca9e";
const UART_TX_CHARACTERISTIC: &str = "6e400003-b5a3-f393-e0a9-e50e24dcca9e";
const SOUND_SERVICE: &str = "000018ff-0000-1000-8000-00805f9b34fb";
const SOUND_CHARACTERISTIC: &str = "00002aff-0000-1000-8000-00805f9b34fb";
const DEVICE_INFO_SERVICE: &str = "0000180a-0000-1000-8000-00805f9b34fb";
const CCCD: &str = "00002902-0000-1000-8000-00805f9b34fb";

struct FakeCharacteristic {
    uuid: &'static str,
    properties: &'static [&'static str],
    notifies: bool,
}

struct FakeService {
    uuid: &'static str,
    characteristics: &'static [FakeCharacteristic],
}

/// GATT layout every fake peripheral exposes.
static FAKE_GATT: [FakeService; 4] = [
    FakeService {
        uuid: CONFIG_SERVICE,
        characteristics: &[
            FakeCharacteristic {
                uuid: FIRMWARE_VERSION_CHARACTERISTIC,
                properties: &["read"],
                notifies: false,
            },
            FakeCharacteristic {
                uuid: LED_CHARACTERISTIC,
                properties: &["read", "write"],
                notifies: false,
            },
            FakeCharacteristic {
                uuid: BUTTON_CHARACTERISTIC,
                properties: &["read", "notify"],
                notifies: true,
            },
        ],
    },
    FakeService {
        uuid: UART_SERVICE,
        characteristics: &[
            FakeCharacteristic {
                uuid: UART_RX_CHARACTERISTIC,
                properties: &["write"],
                notifies: false,
            },
            FakeCharacteristic {
                uuid: UART_TX_CHARACTERISTIC,
                properties: &["notify"],
                notifies: true,
            },
        ],
    },
    FakeService {
        uuid: SOUND_SERVICE,
        characteristics: &[FakeCharacteristic {
            uuid: SOUND_CHARACTERISTIC,
            properties: &["notify"],
            notifies: true,
        }],
    },
    FakeService {
        uuid: DEVICE_INFO_SERVICE,
        characteristics: &[],
    },
];

/// One scripted peripheral from a scan fixture.
#[derive(Debug, Clone, Eq, PartialEq)]
struct FixtureRecord {
    peripheral: PeripheralId,
    name: Option<String>,
    rssi: Option<i16>,
    services: Vec<String>,
}

impl FixtureRecord {
    fn advertisement(&self) -> AdvertisementData {
        let mut data = AdvertisementData::new();
        if let Some(name) = &self.name {
            data.insert(
                AdvertisementKey::LocalName,
                AdvertisementValue::Text(name.clone()),
            );
        }
        if !self.services.is_empty() {
            data.insert(
                AdvertisementKey::ServiceUuids,
                AdvertisementValue::Identifiers(self.services.clone()),
            );
        }
        data
    }
}

/// Parsed fake scan fixture records.
#[derive(Debug, Clone)]
pub struct ScanFixture {
    records: Vec<FixtureRecord>,
}

impl FromStr for ScanFixture {
    type Err = FixtureError;

    /// Parses `id|name|rssi|service,service;...`, with `-` for absent fields.
    fn from_str(value: &str) -> Result<Self, Self::Err> {
        if value.trim().is_empty() {
            return Err(FixtureError::EmptyFixture);
        }

        let records = value
            .split(';')
            .map(parse_scan_record)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { records })
    }
}

/// Parsed fake notification payload fixtures.
#[derive(Debug, Clone, Default, derive_more::Into)]
pub struct NotificationPayloads {
    payloads: Vec<Vec<u8>>,
}

impl FromStr for NotificationPayloads {
    type Err = FixtureError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        if value.trim().is_empty() {
            return Ok(Self::default());
        }
        let payloads = value
            .split(',')
            .map(parse_hex)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { payloads })
    }
}

/// Settings for constructing a fake BLE backend.
#[derive(Debug, Builder)]
pub struct FakeBackendConfig {
    scan_fixture: ScanFixture,
    /// PCM payloads pushed once Sound notifications are enabled.
    microphone: Option<NotificationPayloads>,
    /// Button payloads pushed after each button read.
    button: Option<NotificationPayloads>,
    #[builder(default = DEFAULT_FIRMWARE_VERSION.to_string(), into)]
    firmware_version: String,
}

#[derive(Debug)]
struct FakeState {
    records: Vec<FixtureRecord>,
    connected: HashSet<PeripheralId>,
    notifying: HashSet<(PeripheralId, String)>,
    led: HashMap<PeripheralId, u8>,
    microphone: Vec<Vec<u8>>,
    button: Vec<Vec<u8>>,
    firmware_version: String,
    commands: Vec<AdapterCommand>,
}

/// Scripted BLE adapter used in tests and non-hardware environments.
///
/// Every command is answered immediately on the event channel.
#[derive(Debug)]
pub struct FakeBackend {
    events: UnboundedSender<AdapterEvent>,
    state: Mutex<FakeState>,
}

impl FakeBackend {
    /// Creates a fake backend that emits completions on `events`.
    #[must_use]
    pub fn new(config: FakeBackendConfig, events: UnboundedSender<AdapterEvent>) -> Self {
        let FakeBackendConfig {
            scan_fixture,
            microphone,
            button,
            firmware_version,
        } = config;

        Self {
            events,
            state: Mutex::new(FakeState {
                records: scan_fixture.records,
                connected: HashSet::new(),
                notifying: HashSet::new(),
                led: HashMap::new(),
                microphone: microphone.map(Into::into).unwrap_or_default(),
                button: button.map(Into::into).unwrap_or_default(),
                firmware_version,
                commands: Vec::new(),
            }),
        }
    }

    /// Returns every command submitted so far, in order.
    #[must_use]
    pub fn recorded_commands(&self) -> Vec<AdapterCommand> {
        self.state
            .lock()
            .map(|state| state.commands.clone())
            .unwrap_or_default()
    }

    fn emit(&self, event: AdapterEvent) -> Result<(), AdapterFault> {
        trace!(kind = event.kind(), "fake backend emitting event");
        self.events
            .send(event)
            .map_err(|_| AdapterFault::new("adapter event channel closed"))
    }
}

impl BleAdapter for FakeBackend {
    fn submit(&self, command: AdapterCommand) -> Result<(), AdapterFault> {
        let events = {
            let mut state = self
                .state
                .lock()
                .map_err(|_| AdapterFault::new("fake backend state poisoned"))?;
            state.commands.push(command.clone());
            state.respond(command)
        };

        for event in events {
            self.emit(event)?;
        }
        Ok(())
    }
}

impl FakeState {
    fn respond(&mut self, command: AdapterCommand) -> Vec<AdapterEvent> {
        debug!(?command, "fake backend handling command");
        match command {
            AdapterCommand::Scan => self
                .records
                .iter()
                .map(|record| AdapterEvent::Discovered {
                    peripheral: record.peripheral.clone(),
                    advertisement: record.advertisement(),
                    rssi: record.rssi,
                })
                .collect(),
            AdapterCommand::StopScan => Vec::new(),
            AdapterCommand::Connect(peripheral) => {
                if self.records.iter().any(|record| record.peripheral == peripheral) {
                    self.connected.insert(peripheral.clone());
                    vec![AdapterEvent::Connected { peripheral }]
                } else {
                    vec![AdapterEvent::ConnectFailed {
                        peripheral,
                        fault: AdapterFault::new("peripheral is not in range"),
                    }]
                }
            }
            AdapterCommand::Disconnect(peripheral) => {
                self.connected.remove(&peripheral);
                self.notifying.retain(|(owner, _)| *owner != peripheral);
                vec![AdapterEvent::Disconnected {
                    peripheral,
                    reason: None,
                }]
            }
            AdapterCommand::DiscoverServices(peripheral) => {
                let result = self
                    .require_connected(&peripheral)
                    .map(|()| FAKE_GATT.iter().map(|service| service.uuid.to_string()).collect());
                vec![AdapterEvent::ServicesDiscovered { peripheral, result }]
            }
            AdapterCommand::DiscoverCharacteristics {
                peripheral,
                service,
            } => {
                let result = self.require_connected(&peripheral).and_then(|()| {
                    fake_service(&service)
                        .map(|found| {
                            found
                                .characteristics
                                .iter()
                                .map(|characteristic| {
                                    CharacteristicInfo::new(
                                        characteristic.uuid,
                                        characteristic
                                            .properties
                                            .iter()
                                            .map(ToString::to_string)
                                            .collect(),
                                    )
                                })
                                .collect()
                        })
                        .ok_or_else(|| AdapterFault::new("unknown service"))
                });
                vec![AdapterEvent::CharacteristicsDiscovered {
                    peripheral,
                    service,
                    result,
                }]
            }
            AdapterCommand::DiscoverDescriptors {
                peripheral,
                characteristic,
            } => {
                let result = self.require_connected(&peripheral).and_then(|()| {
                    fake_characteristic(&characteristic)
                        .map(|found| {
                            if found.notifies {
                                vec![CCCD.to_string()]
                            } else {
                                Vec::new()
                            }
                        })
                        .ok_or_else(|| AdapterFault::new("unknown characteristic"))
                });
                vec![AdapterEvent::DescriptorsDiscovered {
                    peripheral,
                    characteristic,
                    result,
                }]
            }
            AdapterCommand::SetNotify {
                peripheral,
                characteristic,
                enabled,
            } => self.set_notify(peripheral, characteristic, enabled),
            AdapterCommand::Write {
                peripheral,
                characteristic,
                value,
                mode,
            } => self.write(peripheral, characteristic, value, mode),
            AdapterCommand::Read {
                peripheral,
                characteristic,
            } => self.read(peripheral, characteristic),
        }
    }

    fn require_connected(&self, peripheral: &PeripheralId) -> Result<(), AdapterFault> {
        if self.connected.contains(peripheral) {
            Ok(())
        } else {
            Err(AdapterFault::new("peripheral is not connected"))
        }
    }

    fn set_notify(
        &mut self,
        peripheral: PeripheralId,
        characteristic: String,
        enabled: bool,
    ) -> Vec<AdapterEvent> {
        let result = self.require_connected(&peripheral).and_then(|()| {
            match fake_characteristic(&characteristic) {
                Some(found) if found.notifies => Ok(enabled),
                _ => Err(AdapterFault::new("characteristic does not support notifications")),
            }
        });

        let key = (peripheral.clone(), normalise_uuid(&characteristic));
        let mut events = Vec::new();
        let now_enabled = result.as_ref().is_ok_and(|state| *state);
        if result.is_ok() {
            if enabled {
                self.notifying.insert(key);
            } else {
                self.notifying.remove(&key);
            }
        }
        events.push(AdapterEvent::NotificationStateChanged {
            peripheral: peripheral.clone(),
            characteristic: characteristic.clone(),
            result,
        });

        if now_enabled && normalise_uuid(&characteristic) == SOUND_CHARACTERISTIC {
            events.extend(
                self.microphone
                    .iter()
                    .map(|payload| value_updated(&peripheral, SOUND_CHARACTERISTIC, payload)),
            );
        }
        events
    }

    fn write(
        &mut self,
        peripheral: PeripheralId,
        characteristic: String,
        value: Vec<u8>,
        mode: WriteMode,
    ) -> Vec<AdapterEvent> {
        trace!(%mode, payload_len = value.len(), "fake write");
        let normalised = normalise_uuid(&characteristic);
        let result = self.require_connected(&peripheral).and_then(|()| {
            match fake_characteristic(&normalised) {
                Some(found) if found.properties.contains(&"write") => Ok(()),
                _ => Err(AdapterFault::new("characteristic is not writable")),
            }
        });

        let accepted = result.is_ok();
        if accepted && normalised == LED_CHARACTERISTIC {
            self.led
                .insert(peripheral.clone(), value.first().copied().unwrap_or_default());
        }

        let mut events = Vec::new();
        events.push(AdapterEvent::WriteCompleted {
            peripheral: peripheral.clone(),
            characteristic,
            result,
        });

        let tx_key = (peripheral.clone(), UART_TX_CHARACTERISTIC.to_string());
        if accepted && normalised == UART_RX_CHARACTERISTIC && self.notifying.contains(&tx_key) {
            events.push(value_updated(&peripheral, UART_TX_CHARACTERISTIC, &value));
        }
        events
    }

    fn read(&mut self, peripheral: PeripheralId, characteristic: String) -> Vec<AdapterEvent> {
        let normalised = normalise_uuid(&characteristic);
        let result = self
            .require_connected(&peripheral)
            .and_then(|()| match normalised.as_str() {
                LED_CHARACTERISTIC => Ok(vec![self.led.get(&peripheral).copied().unwrap_or_default()]),
                BUTTON_CHARACTERISTIC => Ok(vec![0x00]),
                FIRMWARE_VERSION_CHARACTERISTIC => Ok(self.firmware_version.as_bytes().to_vec()),
                _ => Err(AdapterFault::new("characteristic is not readable")),
            });

        let delivered = result.is_ok();
        let mut events = vec![AdapterEvent::ValueUpdated {
            peripheral: peripheral.clone(),
            characteristic,
            result,
        }];

        let button_key = (peripheral.clone(), BUTTON_CHARACTERISTIC.to_string());
        if delivered && normalised == BUTTON_CHARACTERISTIC && self.notifying.contains(&button_key) {
            events.extend(
                self.button
                    .iter()
                    .map(|payload| value_updated(&peripheral, BUTTON_CHARACTERISTIC, payload)),
            );
        }
        events
    }
}

fn value_updated(peripheral: &PeripheralId, characteristic: &str, payload: &[u8]) -> AdapterEvent {
    AdapterEvent::ValueUpdated {
        peripheral: peripheral.clone(),
        characteristic: characteristic.to_string(),
        result: Ok(payload.to_vec()),
    }
}

fn fake_service(uuid: &str) -> Option<&'static FakeService> {
    let normalised = normalise_uuid(uuid);
    FAKE_GATT.iter().find(|service| service.uuid == normalised)
}

fn fake_characteristic(uuid: &str) -> Option<&'static FakeCharacteristic> {
    let normalised = normalise_uuid(uuid);
    FAKE_GATT
        .iter()
        .flat_map(|service| service.characteristics.iter())
        .find(|characteristic| characteristic.uuid == normalised)
}

fn parse_scan_record(raw_record: &str) -> Result<FixtureRecord, FixtureError> {
    let fields: Vec<&str> = raw_record.split('|').map(str::trim).collect();
    let [peripheral, name, rssi, services] = fields.as_slice() else {
        return Err(FixtureError::InvalidRecordFieldCount);
    };
    if peripheral.is_empty() {
        return Err(FixtureError::EmptyRecordField);
    }

    let name = (*name != "-" && !name.is_empty()).then(|| (*name).to_string());
    let rssi = if *rssi == "-" || rssi.is_empty() {
        None
    } else {
        Some(rssi.parse::<i16>()?)
    };
    let services = if *services == "-" || services.is_empty() {
        Vec::new()
    } else {
        services.split(',').map(|id| id.trim().to_string()).collect()
    };

    Ok(FixtureRecord {
        peripheral: PeripheralId::from(*peripheral),
        name,
        rssi,
        services,
    })
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use pretty_assertions::assert_eq;
    use rstest::rstest;
    use tokio::sync::mpsc::{UnboundedReceiver, unbounded_channel};

    use super::*;

    fn backend(fixture: &str) -> (FakeBackend, UnboundedReceiver<AdapterEvent>) {
        let (events, receiver) = unbounded_channel();
        let config = FakeBackendConfig::builder()
            .scan_fixture(fixture.parse().expect("fixture should parse"))
            .build();
        (FakeBackend::new(config, events), receiver)
    }

    fn drain(receiver: &mut UnboundedReceiver<AdapterEvent>) -> Vec<AdapterEvent> {
        std::iter::from_fn(|| receiver.try_recv().ok()).collect()
    }

    #[rstest]
    #[case("AA:BB|Blinky|-43|-", 1)]
    #[case("AA:BB|Blinky|-43|180a;CC:DD|-|-|-", 2)]
    fn scan_fixture_parses_records(#[case] fixture: &str, #[case] expected_count: usize) {
        let parsed: ScanFixture = fixture.parse().expect("fixture should parse");
        assert_eq!(expected_count, parsed.records.len());
    }

    #[rstest]
    #[case::too_few("AA:BB|Blinky|-43")]
    #[case::too_many("AA:BB|Blinky|-43|-|x")]
    fn scan_fixture_rejects_invalid_field_count(#[case] fixture: &str) {
        assert_matches!(
            fixture.parse::<ScanFixture>(),
            Err(FixtureError::InvalidRecordFieldCount)
        );
    }

    #[test]
    fn notification_payloads_reject_bad_hex() {
        assert_matches!(
            "0102,ZZ".parse::<NotificationPayloads>(),
            Err(FixtureError::InvalidHex(_))
        );
    }

    #[test]
    fn connect_to_unknown_peripheral_fails() {
        let (backend, mut receiver) = backend("AA:BB|Blinky|-43|-");
        backend
            .connect(&PeripheralId::from("EE:FF"))
            .expect("submit should succeed");

        assert_matches!(
            drain(&mut receiver).as_slice(),
            [AdapterEvent::ConnectFailed { .. }]
        );
    }

    #[test]
    fn rx_writes_echo_on_tx_once_notifying() {
        let (backend, mut receiver) = backend("AA:BB|Blinky|-43|-");
        let peripheral = PeripheralId::from("AA:BB");
        backend.connect(&peripheral).expect("connect should submit");
        backend
            .set_notify(&peripheral, UART_TX_CHARACTERISTIC, true)
            .expect("notify should submit");
        drain(&mut receiver);

        backend
            .write(
                &peripheral,
                UART_RX_CHARACTERISTIC,
                vec![0xAA, 0x55, 0x14, 0x00],
                WriteMode::WithResponse,
            )
            .expect("write should submit");

        let events = drain(&mut receiver);
        assert_eq!(2, events.len());
        assert_matches!(
            &events[1],
            AdapterEvent::ValueUpdated { characteristic, result: Ok(value), .. }
                if characteristic == UART_TX_CHARACTERISTIC && value == &vec![0xAA, 0x55, 0x14, 0x00]
        );
    }

    #[test]
    fn records_every_command() {
        let (backend, _receiver) = backend("AA:BB|Blinky|-43|-");
        backend.scan().expect("scan should submit");
        backend.stop_scan().expect("stop should submit");

        assert_eq!(
            vec![AdapterCommand::Scan, AdapterCommand::StopScan],
            backend.recorded_commands()
        );
    }
}
