use std::sync::{Arc, Mutex};

use assert_matches::assert_matches;
use async_trait::async_trait;
use blinky::{
    AdapterCommand, AdapterEvent, AdapterFault, AdvertisementData, AdvertisementKey,
    AdvertisementValue, AudioBuffer, AudioSink, BleAdapter,
    CharacteristicInfo, CharacteristicRole, CommandCodec, CommandKind, ConnectionState, DeviceTime,
    DfuError, DfuEvent, DiscoveryFailure, DiscoveryState, FirmwareImage, FirmwareUpdater,
    MicrophoneState, NotificationEvent, PeripheralId, SessionError, SessionHandle, SessionManager,
    Threshold, ThresholdHandler, TimeSyncHandler, WriteMode,
};
use pretty_assertions::assert_eq;
use time::macros::datetime;
use tokio::sync::mpsc::UnboundedSender;

const CONFIG_SERVICE: &str = "6e400100-b5a3-f393-e0a9-e50e24dcca9e";
const LED: &str = "6e400103-b5a3-f393-e0a9-e50e24dcca9e";
const BUTTON: &str = "6e400106-b5a3-f393-e0a9-e50e24dcca9e";
const UART_SERVICE: &str = "6e400001-b5a3-f393-e0a9-e50e24dcca9e";
const RX: &str = "6e400002-b5a3-f393-e0a9-e50e24dcca9e";
const TX: &str = "6e400003-b5a3-f393-e0a9-e50e24dcca9e";
const SOUND_SERVICE: &str = "000018ff-0000-1000-8000-00805f9b34fb";
const SOUND: &str = "00002aff-0000-1000-8000-00805f9b34fb";
const CCCD: &str = "2902";

/// Records commands and never answers; tests feed completions by hand.
#[derive(Debug, Default)]
struct RecordingAdapter {
    commands: Mutex<Vec<AdapterCommand>>,
}

impl RecordingAdapter {
    fn commands(&self) -> Vec<AdapterCommand> {
        self.commands.lock().expect("commands lock").clone()
    }

    fn writes(&self) -> Vec<(String, Vec<u8>)> {
        self.commands()
            .into_iter()
            .filter_map(|command| match command {
                AdapterCommand::Write {
                    characteristic,
                    value,
                    mode,
                    ..
                } => {
                    assert_eq!(WriteMode::WithResponse, mode);
                    Some((characteristic, value))
                }
                _ => None,
            })
            .collect()
    }

    fn count(&self, wanted: impl Fn(&AdapterCommand) -> bool) -> usize {
        self.commands().iter().filter(|command| wanted(command)).count()
    }
}

impl BleAdapter for RecordingAdapter {
    fn submit(&self, command: AdapterCommand) -> Result<(), AdapterFault> {
        self.commands.lock().expect("commands lock").push(command);
        Ok(())
    }
}

struct Harness {
    adapter: Arc<RecordingAdapter>,
    manager: SessionManager,
    peripheral: PeripheralId,
}

impl Harness {
    fn new() -> Self {
        let adapter = Arc::new(RecordingAdapter::default());
        let manager = SessionManager::new(adapter.clone(), CommandCodec::default());
        Self {
            adapter,
            manager,
            peripheral: PeripheralId::from("AA:BB:CC"),
        }
    }

    fn bind(&mut self) -> SessionHandle {
        self.manager.bind(&self.peripheral).expect("bind should succeed")
    }

    fn feed(&mut self, event: AdapterEvent) {
        self.manager.handle_event(event);
    }

    fn connected(&self) -> AdapterEvent {
        AdapterEvent::Connected {
            peripheral: self.peripheral.clone(),
        }
    }

    fn services(&self, services: &[&str]) -> AdapterEvent {
        AdapterEvent::ServicesDiscovered {
            peripheral: self.peripheral.clone(),
            result: Ok(services.iter().map(ToString::to_string).collect()),
        }
    }

    fn characteristics(&self, service: &str, uuids: &[&str]) -> AdapterEvent {
        AdapterEvent::CharacteristicsDiscovered {
            peripheral: self.peripheral.clone(),
            service: service.to_string(),
            result: Ok(uuids
                .iter()
                .map(|uuid| CharacteristicInfo::new(*uuid, vec!["notify".to_string()]))
                .collect()),
        }
    }

    fn notify_ack(&self, characteristic: &str, enabled: bool) -> AdapterEvent {
        AdapterEvent::NotificationStateChanged {
            peripheral: self.peripheral.clone(),
            characteristic: characteristic.to_string(),
            result: Ok(enabled),
        }
    }

    fn descriptors(&self, characteristic: &str, descriptors: &[&str]) -> AdapterEvent {
        AdapterEvent::DescriptorsDiscovered {
            peripheral: self.peripheral.clone(),
            characteristic: characteristic.to_string(),
            result: Ok(descriptors.iter().map(ToString::to_string).collect()),
        }
    }

    fn value(&self, characteristic: &str, bytes: &[u8]) -> AdapterEvent {
        AdapterEvent::ValueUpdated {
            peripheral: self.peripheral.clone(),
            characteristic: characteristic.to_string(),
            result: Ok(bytes.to_vec()),
        }
    }

    fn write_done(&self, characteristic: &str) -> AdapterEvent {
        AdapterEvent::WriteCompleted {
            peripheral: self.peripheral.clone(),
            characteristic: characteristic.to_string(),
            result: Ok(()),
        }
    }

    /// Drives a full discovery of the config, UART and sound services.
    fn ready(&mut self) -> SessionHandle {
        let handle = self.bind();
        let events = vec![
            self.connected(),
            self.services(&[CONFIG_SERVICE, UART_SERVICE, SOUND_SERVICE]),
            self.characteristics(CONFIG_SERVICE, &[LED, BUTTON]),
            self.characteristics(UART_SERVICE, &[RX, TX]),
            self.characteristics(SOUND_SERVICE, &[SOUND]),
            self.notify_ack(BUTTON, true),
            self.notify_ack(TX, true),
            self.descriptors(SOUND, &[CCCD]),
        ];
        for event in events {
            self.feed(event);
        }
        assert_eq!(
            &DiscoveryState::Ready,
            self.manager
                .session(&handle)
                .expect("session should exist")
                .discovery_state()
        );
        handle
    }
}

fn collect<T: Send + 'static>() -> (impl FnMut(T) + Send + 'static, Arc<Mutex<Vec<T>>>) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    (
        move |value: T| sink.lock().expect("collector lock").push(value),
        seen,
    )
}

#[derive(Debug)]
struct NamedSink {
    name: &'static str,
    log: Arc<Mutex<Vec<String>>>,
}

impl AudioSink for NamedSink {
    fn start(&mut self) {
        self.log.lock().expect("log lock").push(format!("{}:start", self.name));
    }

    fn schedule(&mut self, buffer: AudioBuffer) {
        self.log
            .lock()
            .expect("log lock")
            .push(format!("{}:{}", self.name, buffer.len()));
    }

    fn stop(&mut self) {
        self.log.lock().expect("log lock").push(format!("{}:stop", self.name));
    }
}

#[test]
fn binding_a_live_session_twice_connects_once() {
    let mut harness = Harness::new();

    let first = harness.bind();
    let second = harness.bind();

    assert_eq!(first, second);
    assert_eq!(
        1,
        harness
            .adapter
            .count(|command| matches!(command, AdapterCommand::Connect(_)))
    );
}

#[test]
fn binding_after_a_failed_discovery_starts_a_fresh_session() {
    let mut harness = Harness::new();
    harness.bind();
    let failed = AdapterEvent::ConnectFailed {
        peripheral: harness.peripheral.clone(),
        fault: AdapterFault::new("out of range"),
    };
    harness.feed(failed);

    let handle = harness.bind();

    let session = harness.manager.session(&handle).expect("session should exist");
    assert_eq!(&DiscoveryState::Idle, session.discovery_state());
    assert_eq!(ConnectionState::Connecting, session.connection_state());
    assert_eq!(
        2,
        harness
            .adapter
            .count(|command| matches!(command, AdapterCommand::Connect(_)))
    );
}

#[test]
fn discovery_enables_notify_sources_and_inspects_sound_descriptors() {
    let mut harness = Harness::new();
    harness.ready();

    let notified: Vec<_> = harness
        .adapter
        .commands()
        .into_iter()
        .filter_map(|command| match command {
            AdapterCommand::SetNotify { characteristic, .. } => Some(characteristic),
            _ => None,
        })
        .collect();
    assert_eq!(vec![BUTTON.to_string(), TX.to_string()], notified);
    assert_eq!(
        1,
        harness.adapter.count(|command| matches!(
            command,
            AdapterCommand::DiscoverDescriptors { characteristic, .. } if characteristic == SOUND
        ))
    );
}

#[test]
fn sibling_branches_in_any_order_produce_identical_bindings() {
    let mut in_order = Harness::new();
    in_order.ready();

    let mut reversed = Harness::new();
    let handle = reversed.bind();
    let events = vec![
        reversed.connected(),
        reversed.services(&[CONFIG_SERVICE, UART_SERVICE, SOUND_SERVICE]),
        reversed.characteristics(SOUND_SERVICE, &[SOUND]),
        reversed.descriptors(SOUND, &[CCCD]),
        reversed.characteristics(UART_SERVICE, &[TX, RX]),
        reversed.notify_ack(TX, true),
        reversed.characteristics(CONFIG_SERVICE, &[BUTTON, LED]),
        reversed.notify_ack(BUTTON, true),
    ];
    for event in events {
        reversed.feed(event);
    }

    let reversed_session = reversed.manager.session(&handle).expect("session should exist");
    let in_order_session = in_order
        .manager
        .session(&handle)
        .expect("session should exist");
    assert_eq!(&DiscoveryState::Ready, reversed_session.discovery_state());
    assert_eq!(in_order_session.bindings(), reversed_session.bindings());
    assert_eq!(5, reversed_session.bindings().len());
}

#[test]
fn disconnect_mid_discovery_fails_and_drops_stray_events() {
    let mut harness = Harness::new();
    let handle = harness.bind();
    let (on_error, errors) = collect();
    harness
        .manager
        .session_mut(&handle)
        .expect("session should exist")
        .set_error_callback(on_error);
    let events = vec![
        harness.connected(),
        harness.services(&[CONFIG_SERVICE, UART_SERVICE]),
        harness.characteristics(CONFIG_SERVICE, &[LED, BUTTON]),
    ];
    for event in events {
        harness.feed(event);
    }
    let disconnected = AdapterEvent::Disconnected {
        peripheral: harness.peripheral.clone(),
        reason: Some(AdapterFault::new("link lost")),
    };
    harness.feed(disconnected);
    let issued = harness.adapter.commands().len();

    let stray = harness.characteristics(UART_SERVICE, &[RX, TX]);
    harness.feed(stray);

    let session = harness.manager.session(&handle).expect("session should exist");
    assert_eq!(
        &DiscoveryState::Failed(DiscoveryFailure::Disconnected),
        session.discovery_state()
    );
    assert_eq!(ConnectionState::Disconnected, session.connection_state());
    assert!(session.bindings().is_empty());
    assert_eq!(issued, harness.adapter.commands().len());
    assert_eq!(
        vec![SessionError::Disconnected],
        *errors.lock().expect("errors lock")
    );
}

#[test]
fn events_for_unbound_peripherals_are_ignored() {
    let mut harness = Harness::new();
    let handle = harness.ready();

    let (on_led, states) = collect();
    harness
        .manager
        .session_mut(&handle)
        .expect("session should exist")
        .set_led_callback(on_led);
    let issued = harness.adapter.commands().len();

    harness.feed(AdapterEvent::ValueUpdated {
        peripheral: PeripheralId::from("11:22:33"),
        characteristic: LED.to_string(),
        result: Ok(vec![0x01]),
    });

    assert!(states.lock().expect("states lock").is_empty());
    assert_eq!(issued, harness.adapter.commands().len());
    assert!(
        harness
            .manager
            .session(&handle)
            .is_some_and(|session| session.is_ready())
    );
}

#[test]
fn rediscovery_updates_the_known_device_without_duplicating_it() {
    let mut harness = Harness::new();
    let named = AdvertisementData::from([(
        AdvertisementKey::LocalName,
        AdvertisementValue::Text("Nordic_Blinky".to_string()),
    )]);
    let services = AdvertisementData::from([(
        AdvertisementKey::ServiceUuids,
        AdvertisementValue::Identifiers(vec!["180A".to_string()]),
    )]);
    harness.feed(AdapterEvent::Discovered {
        peripheral: harness.peripheral.clone(),
        advertisement: named,
        rssi: Some(-60),
    });
    harness.feed(AdapterEvent::Discovered {
        peripheral: PeripheralId::from("AA:BB:CC"),
        advertisement: services,
        rssi: Some(-42),
    });

    let devices: Vec<_> = harness.manager.discovered_devices().collect();
    assert_eq!(1, devices.len());
    assert_eq!("Nordic_Blinky", devices[0].name());
    assert_eq!(Some(-42), devices[0].rssi());
    assert!(
        devices[0]
            .service_ids()
            .contains("0000180a-0000-1000-8000-00805f9b34fb")
    );
    assert_eq!(
        Some(&PeripheralId::from("AA:BB:CC")),
        harness
            .manager
            .find_device("Nordic")
            .map(|device| device.peripheral())
    );
}

#[test]
fn handles_for_the_same_peripheral_are_equal() {
    let mut harness = Harness::new();
    let first = harness.bind();
    let second = harness.bind();
    assert_eq!(first, second);
    assert_eq!(&PeripheralId::from("AA:BB:CC"), second.peripheral());
}

#[test]
fn led_write_is_read_back_into_the_led_callback() {
    let mut harness = Harness::new();
    let handle = harness.ready();
    let (on_led, states) = collect();
    let session = harness.manager.session_mut(&handle).expect("session should exist");
    session.set_led_callback(on_led);

    session.set_led(true).expect("led write should be submitted");
    let completed = harness.write_done(LED);
    harness.feed(completed);
    let echoed = harness.value(LED, &[0x01]);
    harness.feed(echoed);

    assert_eq!(vec![(LED.to_string(), vec![0x01])], harness.adapter.writes());
    assert_eq!(
        1,
        harness.adapter.count(|command| matches!(
            command,
            AdapterCommand::Read { characteristic, .. } if characteristic == LED
        ))
    );
    assert_eq!(vec![true], *states.lock().expect("states lock"));
}

#[test]
fn writes_to_one_characteristic_are_serialised() {
    let mut harness = Harness::new();
    let handle = harness.ready();
    let session = harness.manager.session_mut(&handle).expect("session should exist");

    session.set_led(true).expect("first write should be submitted");
    session.set_led(false).expect("second write should be queued");
    assert_eq!(1, harness.adapter.writes().len());

    let completed = harness.write_done(LED);
    harness.feed(completed);

    assert_eq!(
        vec![(LED.to_string(), vec![0x01]), (LED.to_string(), vec![0x00])],
        harness.adapter.writes()
    );
}

#[test]
fn led_before_discovery_is_not_ready() {
    let mut harness = Harness::new();
    let handle = harness.bind();
    let session = harness.manager.session_mut(&handle).expect("session should exist");

    assert_matches!(
        session.set_led(true),
        Err(SessionError::NotReady {
            role: CharacteristicRole::Led
        })
    );
    assert!(harness.adapter.writes().is_empty());
}

#[test]
fn set_time_writes_the_framed_clock_to_rx() {
    let mut harness = Harness::new();
    let handle = harness.ready();
    let session = harness.manager.session_mut(&handle).expect("session should exist");
    let now = DeviceTime::new(datetime!(2024-01-02 03:04:05 UTC)).expect("valid timestamp");

    TimeSyncHandler::sync_time(session, now).expect("set-time should be submitted");

    assert_eq!(
        vec![(
            RX.to_string(),
            vec![0xAA, 0x55, 0x10, 0x07, 0x14, 0x18, 0x01, 0x02, 0x03, 0x04, 0x05]
        )],
        harness.adapter.writes()
    );
}

#[test]
fn config_without_rx_is_not_bound() {
    let mut harness = Harness::new();
    let handle = harness.bind();
    let events = vec![
        harness.connected(),
        harness.services(&[CONFIG_SERVICE]),
        harness.characteristics(CONFIG_SERVICE, &[LED, BUTTON]),
        harness.notify_ack(BUTTON, true),
    ];
    for event in events {
        harness.feed(event);
    }
    let session = harness.manager.session_mut(&handle).expect("session should exist");
    assert!(session.is_ready());

    let result = ThresholdHandler::set_threshold(session, Threshold::from(5));

    assert_matches!(result, Err(SessionError::NotBound { peripheral }) if peripheral.as_str() == "AA:BB:CC");
    assert!(harness.adapter.writes().is_empty());
}

#[test]
fn tx_responses_are_decoded_and_malformed_frames_preserved() {
    let mut harness = Harness::new();
    let handle = harness.ready();
    let (on_response, responses) = collect::<NotificationEvent>();
    harness
        .manager
        .session_mut(&handle)
        .expect("session should exist")
        .set_config_response_callback(on_response);

    let echoed = harness.value(TX, &[0xAA, 0x55, 0x11, 0x02, 0x01, 0x05]);
    harness.feed(echoed);
    let truncated = harness.value(TX, &[0xAA, 0x55, 0x11, 0x05, 0x01]);
    harness.feed(truncated);
    let unframed = harness.value(TX, &[0x42]);
    harness.feed(unframed);

    assert_eq!(
        vec![
            NotificationEvent::ConfigResponse {
                command: CommandKind::SetThreshold,
                opcode: 0x11,
                payload: vec![0x01, 0x05],
            },
            NotificationEvent::Unknown {
                opcode: Some(0x11),
                bytes: vec![0xAA, 0x55, 0x11, 0x05, 0x01],
            },
            NotificationEvent::Unknown {
                opcode: None,
                bytes: vec![0x42],
            },
        ],
        *responses.lock().expect("responses lock")
    );
}

#[test]
fn button_notifications_reach_the_button_callback() {
    let mut harness = Harness::new();
    let handle = harness.ready();
    let (on_button, presses) = collect();
    harness
        .manager
        .session_mut(&handle)
        .expect("session should exist")
        .set_button_callback(on_button);

    for payload in [[0x01], [0x00]] {
        let event = harness.value(BUTTON, &payload);
        harness.feed(event);
    }

    assert_eq!(vec![true, false], *presses.lock().expect("presses lock"));
}

#[test]
fn starting_the_microphone_twice_stops_the_first_sink() {
    let mut harness = Harness::new();
    let handle = harness.ready();
    let log = Arc::new(Mutex::new(Vec::new()));
    let (on_first_ready, first_ready) = collect();
    let session = harness.manager.session_mut(&handle).expect("session should exist");
    session
        .start_microphone(
            Box::new(NamedSink {
                name: "first",
                log: Arc::clone(&log),
            }),
            on_first_ready,
        )
        .expect("microphone should start");
    assert_eq!(MicrophoneState::Starting, session.microphone_state());

    let enabled = harness.notify_ack(SOUND, true);
    harness.feed(enabled);
    let samples = harness.value(SOUND, &[0x00, 0x80, 0xFF, 0x7F]);
    harness.feed(samples);

    let (on_second_ready, second_ready) = collect();
    let session = harness.manager.session_mut(&handle).expect("session should exist");
    session
        .start_microphone(
            Box::new(NamedSink {
                name: "second",
                log: Arc::clone(&log),
            }),
            on_second_ready,
        )
        .expect("microphone should restart");
    assert_eq!(MicrophoneState::Active, session.microphone_state());
    assert!(session.has_audio_sink());

    assert_eq!(vec![true], *first_ready.lock().expect("ready lock"));
    assert_eq!(vec![true], *second_ready.lock().expect("ready lock"));
    assert_eq!(
        vec!["first:start", "first:2", "first:stop", "second:start"],
        *log.lock().expect("log lock")
    );
    assert_eq!(
        1,
        harness.adapter.count(|command| matches!(
            command,
            AdapterCommand::SetNotify { characteristic, enabled: true, .. } if characteristic == SOUND
        ))
    );
}

#[test]
fn disconnect_releases_the_microphone_sink() {
    let mut harness = Harness::new();
    let handle = harness.ready();
    let log = Arc::new(Mutex::new(Vec::new()));
    let session = harness.manager.session_mut(&handle).expect("session should exist");
    session
        .start_microphone(
            Box::new(NamedSink {
                name: "mic",
                log: Arc::clone(&log),
            }),
            |_| {},
        )
        .expect("microphone should start");
    let enabled = harness.notify_ack(SOUND, true);
    harness.feed(enabled);

    harness.feed(AdapterEvent::Disconnected {
        peripheral: harness.peripheral.clone(),
        reason: None,
    });

    let session = harness.manager.session(&handle).expect("session should exist");
    assert_eq!(MicrophoneState::Inactive, session.microphone_state());
    assert!(!session.has_audio_sink());
    assert_eq!(vec!["mic:start", "mic:stop"], *log.lock().expect("log lock"));
}

#[test]
fn microphone_samples_that_look_like_a_frame_stay_audio() {
    let mut harness = Harness::new();
    let handle = harness.ready();
    let log = Arc::new(Mutex::new(Vec::new()));
    let (on_response, responses) = collect::<NotificationEvent>();
    let session = harness.manager.session_mut(&handle).expect("session should exist");
    session.set_config_response_callback(on_response);
    session
        .start_microphone(
            Box::new(NamedSink {
                name: "mic",
                log: Arc::clone(&log),
            }),
            |_| {},
        )
        .expect("microphone should start");
    let enabled = harness.notify_ack(SOUND, true);
    harness.feed(enabled);

    let samples = harness.value(SOUND, &[0xAA, 0x55, 0x01, 0x00]);
    harness.feed(samples);

    assert_eq!(vec!["mic:start", "mic:2"], *log.lock().expect("log lock"));
    assert!(responses.lock().expect("responses lock").is_empty());
}

struct ScriptedUpdater {
    outcome: Result<(), &'static str>,
}

#[async_trait]
impl FirmwareUpdater for ScriptedUpdater {
    async fn start_update(
        &self,
        _peripheral: &PeripheralId,
        image: FirmwareImage,
        events: UnboundedSender<DfuEvent>,
    ) -> Result<(), DfuError> {
        let _ = events.send(DfuEvent::Started);
        let _ = events.send(DfuEvent::Progress {
            percent: 100,
            part: 1,
            total_parts: 1,
            average_speed: image.len() as f64,
        });
        match self.outcome {
            Ok(()) => {
                let _ = events.send(DfuEvent::Completed);
                Ok(())
            }
            Err(message) => Err(DfuError::Updater {
                message: message.to_string(),
            }),
        }
    }
}

fn firmware_image() -> FirmwareImage {
    FirmwareImage::from_bytes(b"PK\x03\x04firmware".to_vec()).expect("zip magic should validate")
}

async fn drain(mut events: tokio::sync::mpsc::UnboundedReceiver<DfuEvent>) -> Vec<DfuEvent> {
    let mut seen = Vec::new();
    while let Some(event) = events.recv().await {
        let terminal = event.is_terminal();
        seen.push(event);
        if terminal {
            break;
        }
    }
    seen
}

#[tokio::test]
async fn firmware_update_reports_progress_until_completion() {
    let mut harness = Harness::new();
    let handle = harness.ready();
    let session = harness.manager.session(&handle).expect("session should exist");

    let events = session
        .start_firmware_update(Arc::new(ScriptedUpdater { outcome: Ok(()) }), firmware_image())
        .expect("update should be handed off");

    let seen = drain(events).await;
    assert_eq!(3, seen.len());
    assert_eq!(Some(&DfuEvent::Started), seen.first());
    assert_eq!(Some(&DfuEvent::Completed), seen.last());
}

#[tokio::test]
async fn firmware_update_failure_is_reported_as_an_event() {
    let mut harness = Harness::new();
    let handle = harness.ready();
    let session = harness.manager.session(&handle).expect("session should exist");

    let events = session
        .start_firmware_update(
            Arc::new(ScriptedUpdater {
                outcome: Err("bootloader rejected image"),
            }),
            firmware_image(),
        )
        .expect("update should be handed off");

    let seen = drain(events).await;
    assert_matches!(
        seen.last(),
        Some(DfuEvent::Failed { message }) if message.contains("bootloader rejected image")
    );
}

#[tokio::test]
async fn firmware_update_requires_a_link() {
    let mut harness = Harness::new();
    let handle = harness.bind();
    harness.feed(AdapterEvent::Disconnected {
        peripheral: harness.peripheral.clone(),
        reason: None,
    });
    let session = harness.manager.session(&handle).expect("session should exist");

    let result = session
        .start_firmware_update(Arc::new(ScriptedUpdater { outcome: Ok(()) }), firmware_image());

    assert_matches!(result, Err(SessionError::Disconnected));
}

#[test]
fn firmware_update_outside_a_runtime_is_refused() {
    let mut harness = Harness::new();
    let handle = harness.ready();
    let session = harness.manager.session(&handle).expect("session should exist");

    let result = session
        .start_firmware_update(Arc::new(ScriptedUpdater { outcome: Ok(()) }), firmware_image());

    assert_matches!(result, Err(SessionError::NoRuntime));
}
