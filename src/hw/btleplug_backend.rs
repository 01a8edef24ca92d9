use std::collections::HashMap;
use std::pin::Pin;

use btleplug::api::{
    Central, CentralEvent, CharPropFlags, Characteristic, Manager as _, Peripheral as _,
    PeripheralProperties, ScanFilter, WriteType,
};
use btleplug::platform::{Adapter, Manager, Peripheral};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::task::{AbortHandle, JoinHandle};
use tokio_stream::{Stream, StreamExt};
use tracing::{debug, info, instrument, trace, warn};

use super::adapter::{AdapterCommand, AdapterEvent, BleAdapter};
use super::model::{CharacteristicInfo, PeripheralId, WriteMode};
use crate::advertisement::{AdvertisementData, AdvertisementKey, AdvertisementValue};
use crate::error::{AdapterFault, InteractionError};
use crate::protocol::normalise_uuid;

type CentralEvents = Pin<Box<dyn Stream<Item = CentralEvent> + Send>>;

/// Real BLE backend bound to the first system adapter.
#[derive(Debug)]
pub(crate) struct BtleplugBackend {
    manager: Manager,
}

impl BtleplugBackend {
    /// Creates the real BLE backend.
    pub(crate) async fn new() -> Result<Self, InteractionError> {
        let manager = Manager::new().await?;
        Ok(Self { manager })
    }

    /// Spawns the adapter worker and returns its command handle.
    #[instrument(skip(self, events), level = "debug")]
    pub(crate) async fn start(
        self,
        events: UnboundedSender<AdapterEvent>,
    ) -> Result<BtleplugAdapter, InteractionError> {
        let adapter = self
            .manager
            .adapters()
            .await?
            .into_iter()
            .next()
            .ok_or(InteractionError::NoAdapters)?;
        let adapter_name = adapter.adapter_info().await?;
        info!(adapter = %adapter_name, "using BLE adapter");

        let central_events = adapter.events().await?;
        let (commands, command_receiver) = mpsc::unbounded_channel();
        let worker = AdapterWorker {
            adapter,
            events,
            peripherals: HashMap::new(),
            forwarders: NotificationForwarders::default(),
        };
        tokio::spawn(worker.run(command_receiver, central_events));

        Ok(BtleplugAdapter { commands })
    }
}

/// Command handle for the btleplug worker task.
#[derive(Debug, Clone)]
pub(crate) struct BtleplugAdapter {
    commands: UnboundedSender<AdapterCommand>,
}

impl BleAdapter for BtleplugAdapter {
    fn submit(&self, command: AdapterCommand) -> Result<(), AdapterFault> {
        self.commands
            .send(command)
            .map_err(|_| AdapterFault::new("BLE adapter worker has stopped"))
    }
}

/// Owns the btleplug adapter and executes commands strictly in order.
struct AdapterWorker {
    adapter: Adapter,
    events: UnboundedSender<AdapterEvent>,
    peripherals: HashMap<PeripheralId, Peripheral>,
    forwarders: NotificationForwarders,
}

/// At most one notification-forwarding task per peripheral.
///
/// A peripheral's notification stream yields every value on each open
/// stream, so a stale forwarder would duplicate events after a reconnect.
#[derive(Debug, Default)]
struct NotificationForwarders {
    tasks: HashMap<PeripheralId, AbortHandle>,
}

impl NotificationForwarders {
    fn replace(&mut self, peripheral_id: PeripheralId, task: JoinHandle<()>) {
        if let Some(previous) = self.tasks.insert(peripheral_id, task.abort_handle()) {
            previous.abort();
        }
    }

    fn stop(&mut self, peripheral_id: &PeripheralId) {
        if let Some(task) = self.tasks.remove(peripheral_id) {
            trace!(peripheral = %peripheral_id, "stopping notification forwarder");
            task.abort();
        }
    }

    fn len(&self) -> usize {
        self.tasks.len()
    }
}

impl AdapterWorker {
    async fn run(
        mut self,
        mut commands: UnboundedReceiver<AdapterCommand>,
        mut central_events: CentralEvents,
    ) {
        loop {
            tokio::select! {
                maybe_command = commands.recv() => {
                    let Some(command) = maybe_command else {
                        debug!("adapter command channel closed; stopping worker");
                        break;
                    };
                    let events = self.execute(command).await;
                    if !self.emit_all(events) {
                        break;
                    }
                }
                maybe_event = central_events.next() => {
                    let Some(event) = maybe_event else {
                        debug!("central event stream ended; stopping worker");
                        break;
                    };
                    let events = self.on_central_event(event).await;
                    if !self.emit_all(events) {
                        break;
                    }
                }
            }
        }
    }

    fn emit_all(&self, events: Vec<AdapterEvent>) -> bool {
        for event in events {
            if self.events.send(event).is_err() {
                debug!("adapter event receiver dropped; stopping worker");
                return false;
            }
        }
        true
    }

    #[instrument(skip(self), level = "trace")]
    async fn on_central_event(&mut self, event: CentralEvent) -> Vec<AdapterEvent> {
        match event {
            CentralEvent::DeviceDiscovered(id) | CentralEvent::DeviceUpdated(id) => {
                let peripheral = match self.adapter.peripheral(&id).await {
                    Ok(peripheral) => peripheral,
                    Err(error) => {
                        debug!(?error, "failed to resolve discovered peripheral");
                        return Vec::new();
                    }
                };
                let properties = match peripheral.properties().await {
                    Ok(Some(properties)) => properties,
                    Ok(None) => return Vec::new(),
                    Err(error) => {
                        debug!(?error, "failed to read peripheral properties");
                        return Vec::new();
                    }
                };
                let peripheral_id = PeripheralId::from(id.to_string());
                self.peripherals.insert(peripheral_id.clone(), peripheral);
                vec![AdapterEvent::Discovered {
                    peripheral: peripheral_id,
                    advertisement: advertisement_from_properties(&properties),
                    rssi: properties.rssi,
                }]
            }
            CentralEvent::DeviceDisconnected(id) => {
                let peripheral_id = PeripheralId::from(id.to_string());
                self.forwarders.stop(&peripheral_id);
                vec![AdapterEvent::Disconnected {
                    peripheral: peripheral_id,
                    reason: Some(AdapterFault::new("link lost")),
                }]
            }
            other => {
                trace!(?other, "ignoring central event");
                Vec::new()
            }
        }
    }

    #[instrument(skip(self), level = "debug")]
    async fn execute(&mut self, command: AdapterCommand) -> Vec<AdapterEvent> {
        match command {
            AdapterCommand::Scan => {
                if let Err(error) = self.adapter.start_scan(ScanFilter::default()).await {
                    warn!(%error, "failed to start scan");
                }
                Vec::new()
            }
            AdapterCommand::StopScan => {
                if let Err(error) = self.adapter.stop_scan().await {
                    debug!(%error, "failed to stop scan cleanly");
                }
                Vec::new()
            }
            AdapterCommand::Connect(peripheral_id) => self.connect(peripheral_id).await,
            AdapterCommand::Disconnect(peripheral_id) => {
                self.forwarders.stop(&peripheral_id);
                let reason = match self.peripheral(&peripheral_id) {
                    Ok(peripheral) => peripheral.disconnect().await.err().map(AdapterFault::from),
                    Err(fault) => Some(fault),
                };
                vec![AdapterEvent::Disconnected {
                    peripheral: peripheral_id,
                    reason,
                }]
            }
            AdapterCommand::DiscoverServices(peripheral_id) => {
                let result = match self.peripheral(&peripheral_id) {
                    Ok(peripheral) => discover_services(peripheral).await,
                    Err(fault) => Err(fault),
                };
                vec![AdapterEvent::ServicesDiscovered {
                    peripheral: peripheral_id,
                    result,
                }]
            }
            AdapterCommand::DiscoverCharacteristics {
                peripheral: peripheral_id,
                service,
            } => {
                let result = self
                    .peripheral(&peripheral_id)
                    .and_then(|peripheral| characteristics_of(peripheral, &service));
                vec![AdapterEvent::CharacteristicsDiscovered {
                    peripheral: peripheral_id,
                    service,
                    result,
                }]
            }
            AdapterCommand::DiscoverDescriptors {
                peripheral: peripheral_id,
                characteristic,
            } => {
                let result = self
                    .peripheral(&peripheral_id)
                    .and_then(|peripheral| find_characteristic(peripheral, &characteristic))
                    .map(|found| {
                        found
                            .descriptors
                            .iter()
                            .map(|descriptor| descriptor.uuid.to_string())
                            .collect()
                    });
                vec![AdapterEvent::DescriptorsDiscovered {
                    peripheral: peripheral_id,
                    characteristic,
                    result,
                }]
            }
            AdapterCommand::SetNotify {
                peripheral: peripheral_id,
                characteristic,
                enabled,
            } => {
                let result = match self.target(&peripheral_id, &characteristic) {
                    Ok((peripheral, found)) => {
                        let outcome = if enabled {
                            peripheral.subscribe(&found).await
                        } else {
                            peripheral.unsubscribe(&found).await
                        };
                        outcome.map(|()| enabled).map_err(AdapterFault::from)
                    }
                    Err(fault) => Err(fault),
                };
                vec![AdapterEvent::NotificationStateChanged {
                    peripheral: peripheral_id,
                    characteristic,
                    result,
                }]
            }
            AdapterCommand::Write {
                peripheral: peripheral_id,
                characteristic,
                value,
                mode,
            } => {
                let write_type = match mode {
                    WriteMode::WithResponse => WriteType::WithResponse,
                    WriteMode::WithoutResponse => WriteType::WithoutResponse,
                };
                let result = match self.target(&peripheral_id, &characteristic) {
                    Ok((peripheral, found)) => peripheral
                        .write(&found, &value, write_type)
                        .await
                        .map_err(AdapterFault::from),
                    Err(fault) => Err(fault),
                };
                vec![AdapterEvent::WriteCompleted {
                    peripheral: peripheral_id,
                    characteristic,
                    result,
                }]
            }
            AdapterCommand::Read {
                peripheral: peripheral_id,
                characteristic,
            } => {
                let result = match self.target(&peripheral_id, &characteristic) {
                    Ok((peripheral, found)) => {
                        peripheral.read(&found).await.map_err(AdapterFault::from)
                    }
                    Err(fault) => Err(fault),
                };
                vec![AdapterEvent::ValueUpdated {
                    peripheral: peripheral_id,
                    characteristic,
                    result,
                }]
            }
        }
    }

    async fn connect(&mut self, peripheral_id: PeripheralId) -> Vec<AdapterEvent> {
        let peripheral = match self.peripheral(&peripheral_id) {
            Ok(peripheral) => peripheral.clone(),
            Err(fault) => {
                return vec![AdapterEvent::ConnectFailed {
                    peripheral: peripheral_id,
                    fault,
                }];
            }
        };

        let connected = match peripheral.is_connected().await {
            Ok(true) => Ok(()),
            Ok(false) => peripheral.connect().await,
            Err(error) => Err(error),
        };
        if let Err(error) = connected {
            return vec![AdapterEvent::ConnectFailed {
                peripheral: peripheral_id,
                fault: error.into(),
            }];
        }

        match peripheral.notifications().await {
            Ok(notifications) => {
                let task = tokio::spawn(forward_notifications(
                    peripheral_id.clone(),
                    notifications,
                    self.events.clone(),
                ));
                self.forwarders.replace(peripheral_id.clone(), task);
                trace!(forwarders = self.forwarders.len(), "notification forwarder started");
            }
            Err(error) => warn!(%error, "failed to open notification stream"),
        }

        info!(peripheral = %peripheral_id, "connected");
        vec![AdapterEvent::Connected {
            peripheral: peripheral_id,
        }]
    }

    fn peripheral(&self, peripheral_id: &PeripheralId) -> Result<&Peripheral, AdapterFault> {
        self.peripherals
            .get(peripheral_id)
            .ok_or_else(|| AdapterFault::new(format!("unknown peripheral `{peripheral_id}`")))
    }

    fn target(
        &self,
        peripheral_id: &PeripheralId,
        characteristic: &str,
    ) -> Result<(Peripheral, Characteristic), AdapterFault> {
        let peripheral = self.peripheral(peripheral_id)?;
        let found = find_characteristic(peripheral, characteristic)?;
        Ok((peripheral.clone(), found))
    }
}

async fn forward_notifications(
    peripheral_id: PeripheralId,
    mut notifications: Pin<Box<dyn Stream<Item = btleplug::api::ValueNotification> + Send>>,
    events: UnboundedSender<AdapterEvent>,
) {
    while let Some(notification) = notifications.next().await {
        let event = AdapterEvent::ValueUpdated {
            peripheral: peripheral_id.clone(),
            characteristic: notification.uuid.to_string(),
            result: Ok(notification.value),
        };
        if events.send(event).is_err() {
            break;
        }
    }
    trace!(peripheral = %peripheral_id, "notification stream ended");
}

async fn discover_services(peripheral: &Peripheral) -> Result<Vec<String>, AdapterFault> {
    peripheral.discover_services().await?;
    Ok(peripheral
        .services()
        .iter()
        .map(|service| service.uuid.to_string())
        .collect())
}

fn characteristics_of(
    peripheral: &Peripheral,
    service_uuid: &str,
) -> Result<Vec<CharacteristicInfo>, AdapterFault> {
    let wanted = normalise_uuid(service_uuid);
    let service = peripheral
        .services()
        .into_iter()
        .find(|service| service.uuid.to_string() == wanted)
        .ok_or_else(|| AdapterFault::new(format!("service `{wanted}` was not discovered")))?;

    Ok(service
        .characteristics
        .iter()
        .map(|characteristic| {
            CharacteristicInfo::new(
                characteristic.uuid.to_string(),
                property_labels(characteristic.properties),
            )
        })
        .collect())
}

fn find_characteristic(
    peripheral: &Peripheral,
    characteristic_uuid: &str,
) -> Result<Characteristic, AdapterFault> {
    let wanted = normalise_uuid(characteristic_uuid);
    peripheral
        .characteristics()
        .into_iter()
        .find(|characteristic| characteristic.uuid.to_string() == wanted)
        .ok_or_else(|| AdapterFault::new(format!("characteristic `{wanted}` was not discovered")))
}

fn property_labels(flags: CharPropFlags) -> Vec<String> {
    let labels: Vec<String> = flags
        .iter_names()
        .map(|(name, _)| name.to_lowercase())
        .collect();
    if labels.is_empty() {
        vec!["none".to_string()]
    } else {
        labels
    }
}

fn advertisement_from_properties(properties: &PeripheralProperties) -> AdvertisementData {
    let mut data = AdvertisementData::new();
    if let Some(name) = &properties.local_name {
        data.insert(
            AdvertisementKey::LocalName,
            AdvertisementValue::Text(name.clone()),
        );
    }
    if !properties.services.is_empty() {
        data.insert(
            AdvertisementKey::ServiceUuids,
            AdvertisementValue::Identifiers(
                properties.services.iter().map(ToString::to_string).collect(),
            ),
        );
    }
    if let Some((company_id, payload)) = properties
        .manufacturer_data
        .iter()
        .min_by_key(|(company_id, _)| **company_id)
    {
        let mut bytes = company_id.to_le_bytes().to_vec();
        bytes.extend_from_slice(payload);
        data.insert(
            AdvertisementKey::ManufacturerData,
            AdvertisementValue::Bytes(bytes),
        );
    }
    if let Some(tx_power) = properties.tx_power_level {
        data.insert(
            AdvertisementKey::TxPowerLevel,
            AdvertisementValue::Integer(i64::from(tx_power)),
        );
    }
    data
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use btleplug::api::bleuuid::uuid_from_u16;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    use super::*;
    use crate::advertisement::AdvertisementParser;

    #[test]
    fn advertisement_from_properties_maps_standard_fields() {
        let properties = PeripheralProperties {
            local_name: Some("Thingy".to_string()),
            services: vec![uuid_from_u16(0xFE59)],
            manufacturer_data: HashMap::from([(0x0059, vec![0x01, 0x02])]),
            tx_power_level: Some(-4),
            ..PeripheralProperties::default()
        };

        let data = advertisement_from_properties(&properties);

        assert_eq!(
            Some(&AdvertisementValue::Bytes(vec![0x59, 0x00, 0x01, 0x02])),
            data.get(&AdvertisementKey::ManufacturerData)
        );
        assert_eq!(
            Some(&AdvertisementValue::Integer(-4)),
            data.get(&AdvertisementKey::TxPowerLevel)
        );
        let parsed = AdvertisementParser::parse(&data);
        assert_eq!("Thingy", parsed.name());
        assert!(
            parsed
                .service_ids()
                .contains("0000fe59-0000-1000-8000-00805f9b34fb")
        );
    }

    /// Spawns a task that never finishes and reports when it is dropped.
    fn parked_task() -> (JoinHandle<()>, mpsc::UnboundedReceiver<()>) {
        let (alive, dropped) = mpsc::unbounded_channel::<()>();
        let task = tokio::spawn(async move {
            let _alive = alive;
            std::future::pending::<()>().await;
        });
        (task, dropped)
    }

    #[tokio::test]
    async fn reconnecting_replaces_the_previous_forwarder() {
        let mut forwarders = NotificationForwarders::default();
        let peripheral = PeripheralId::from("AA:BB:CC");
        let (first, mut first_dropped) = parked_task();
        let (second, mut second_dropped) = parked_task();

        forwarders.replace(peripheral.clone(), first);
        forwarders.replace(peripheral.clone(), second);

        assert_eq!(None, first_dropped.recv().await);
        assert_eq!(1, forwarders.len());
        assert_eq!(
            Err(mpsc::error::TryRecvError::Empty),
            second_dropped.try_recv()
        );
    }

    #[tokio::test]
    async fn stopping_aborts_the_forwarder_for_that_peripheral_only() {
        let mut forwarders = NotificationForwarders::default();
        let (blinky, mut blinky_dropped) = parked_task();
        let (thingy, mut thingy_dropped) = parked_task();
        forwarders.replace(PeripheralId::from("AA:BB:CC"), blinky);
        forwarders.replace(PeripheralId::from("DD:EE:FF"), thingy);

        forwarders.stop(&PeripheralId::from("AA:BB:CC"));
        forwarders.stop(&PeripheralId::from("11:22:33"));

        assert_eq!(None, blinky_dropped.recv().await);
        assert_eq!(1, forwarders.len());
        assert_eq!(
            Err(mpsc::error::TryRecvError::Empty),
            thingy_dropped.try_recv()
        );
    }

    #[test]
    fn advertisement_from_empty_properties_is_empty() {
        assert!(advertisement_from_properties(&PeripheralProperties::default()).is_empty());
    }

    #[rstest]
    #[case(CharPropFlags::empty(), vec!["none"])]
    #[case(CharPropFlags::READ | CharPropFlags::NOTIFY, vec!["read", "notify"])]
    fn property_labels_lowercase_flag_names(
        #[case] flags: CharPropFlags,
        #[case] expected: Vec<&str>,
    ) {
        assert_eq!(expected, property_labels(flags));
    }
}
