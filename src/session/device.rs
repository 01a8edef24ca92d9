use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::Arc;

use tokio::runtime::Handle;
use tokio::sync::mpsc::{self, UnboundedReceiver};
use tracing::{debug, info, instrument, trace, warn};

use super::discovery::{
    BindingTable, CharacteristicBinding, DiscoveryAction, DiscoveryEvent, DiscoveryFailure,
    DiscoveryMachine, DiscoveryState,
};
use super::microphone::{
    MicrophoneAction, MicrophoneSession, MicrophoneState, ReadyCallback, StoppedCallback,
};
use crate::audio::AudioSink;
use crate::dfu::{DfuEvent, FirmwareImage, FirmwareUpdater};
use crate::error::{AdapterFault, SessionError};
use crate::handlers::{CommandCodec, ConfigCommand};
use crate::hw::{AdapterEvent, BleAdapter, PeripheralId, WriteMode};
use crate::notification::NotificationEvent;
use crate::protocol::{CharacteristicRole, ServiceRole, normalise_uuid};

type StateCallback = Box<dyn FnMut(bool) + Send>;
type ResponseCallback = Box<dyn FnMut(NotificationEvent) + Send>;
type VersionCallback = Box<dyn FnMut(String) + Send>;
type ErrorCallback = Box<dyn FnMut(SessionError) + Send>;

/// Link state of the peripheral as seen by its session.
#[derive(Debug, Clone, Copy, Eq, PartialEq, derive_more::Display)]
pub enum ConnectionState {
    #[display("disconnected")]
    Disconnected,
    #[display("connecting")]
    Connecting,
    #[display("connected")]
    Connected,
    #[display("discovering_services")]
    DiscoveringServices,
    #[display("discovering_characteristics")]
    DiscoveringCharacteristics,
    #[display("ready")]
    Ready,
}

#[derive(Default)]
struct SessionCallbacks {
    button: Option<StateCallback>,
    led: Option<StateCallback>,
    config_response: Option<ResponseCallback>,
    firmware_version: Option<VersionCallback>,
    error: Option<ErrorCallback>,
}

/// One peripheral's discovery, bindings, writes and notification dispatch.
///
/// Every operation returns immediately after queueing adapter work; results
/// arrive through [`DeviceSession::handle_event`] and the registered
/// callbacks. Each callback slot holds one handler and setting it again
/// replaces the previous one.
pub struct DeviceSession {
    peripheral: PeripheralId,
    adapter: Arc<dyn BleAdapter>,
    codec: CommandCodec,
    connection: ConnectionState,
    discovery: DiscoveryMachine,
    writes: HashMap<String, VecDeque<Vec<u8>>>,
    microphone: MicrophoneSession,
    callbacks: SessionCallbacks,
}

impl fmt::Debug for DeviceSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceSession")
            .field("peripheral", &self.peripheral)
            .field("connection", &self.connection)
            .field("discovery", self.discovery.state())
            .field("microphone", &self.microphone)
            .finish_non_exhaustive()
    }
}

impl DeviceSession {
    /// Creates an idle session for a peripheral.
    #[must_use]
    pub fn new(peripheral: PeripheralId, adapter: Arc<dyn BleAdapter>, codec: CommandCodec) -> Self {
        Self {
            peripheral,
            adapter,
            codec,
            connection: ConnectionState::Disconnected,
            discovery: DiscoveryMachine::new(),
            writes: HashMap::new(),
            microphone: MicrophoneSession::default(),
            callbacks: SessionCallbacks::default(),
        }
    }

    #[must_use]
    pub fn peripheral(&self) -> &PeripheralId {
        &self.peripheral
    }

    #[must_use]
    pub fn connection_state(&self) -> ConnectionState {
        self.connection
    }

    #[must_use]
    pub fn discovery_state(&self) -> &DiscoveryState {
        self.discovery.state()
    }

    #[must_use]
    pub fn bindings(&self) -> &BindingTable {
        self.discovery.bindings()
    }

    /// Returns discovered services with their classified roles.
    #[must_use]
    pub fn services(&self) -> &[(String, ServiceRole)] {
        self.discovery.services()
    }

    #[must_use]
    pub fn microphone_state(&self) -> MicrophoneState {
        self.microphone.state()
    }

    /// Returns whether a microphone sink is currently held.
    #[must_use]
    pub fn has_audio_sink(&self) -> bool {
        self.microphone.has_sink()
    }

    #[must_use]
    pub fn is_ready(&self) -> bool {
        *self.discovery.state() == DiscoveryState::Ready
    }

    /// Returns whether discovery failed; such a session accepts no events.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self.discovery.state(), DiscoveryState::Failed(_))
    }

    pub fn set_button_callback(&mut self, handler: impl FnMut(bool) + Send + 'static) {
        self.callbacks.button = Some(Box::new(handler));
    }

    pub fn remove_button_callback(&mut self) {
        self.callbacks.button = None;
    }

    pub fn set_led_callback(&mut self, handler: impl FnMut(bool) + Send + 'static) {
        self.callbacks.led = Some(Box::new(handler));
    }

    pub fn remove_led_callback(&mut self) {
        self.callbacks.led = None;
    }

    /// Receives every decoded Tx notification.
    pub fn set_config_response_callback(
        &mut self,
        handler: impl FnMut(NotificationEvent) + Send + 'static,
    ) {
        self.callbacks.config_response = Some(Box::new(handler));
    }

    pub fn remove_config_response_callback(&mut self) {
        self.callbacks.config_response = None;
    }

    pub fn set_firmware_version_callback(&mut self, handler: impl FnMut(String) + Send + 'static) {
        self.callbacks.firmware_version = Some(Box::new(handler));
    }

    pub fn remove_firmware_version_callback(&mut self) {
        self.callbacks.firmware_version = None;
    }

    /// Receives transport failures that ended an operation.
    pub fn set_error_callback(&mut self, handler: impl FnMut(SessionError) + Send + 'static) {
        self.callbacks.error = Some(Box::new(handler));
    }

    pub fn remove_error_callback(&mut self) {
        self.callbacks.error = None;
    }

    /// Requests the link. A session that is already connecting or connected
    /// is left alone.
    ///
    /// # Errors
    ///
    /// Returns an error when the adapter rejects the request.
    #[instrument(skip(self), fields(peripheral = %self.peripheral), level = "debug")]
    pub fn connect(&mut self) -> Result<(), SessionError> {
        if self.connection != ConnectionState::Disconnected {
            trace!(state = %self.connection, "connect ignored");
            return Ok(());
        }
        self.adapter.connect(&self.peripheral)?;
        self.connection = ConnectionState::Connecting;
        Ok(())
    }

    /// Requests the link be dropped.
    ///
    /// # Errors
    ///
    /// Returns an error when the adapter rejects the request.
    pub fn disconnect(&mut self) -> Result<(), SessionError> {
        self.adapter.disconnect(&self.peripheral)?;
        Ok(())
    }

    /// Writes the LED state with response; the value is read back once the
    /// write completes.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::NotReady`] when no LED characteristic is bound.
    #[instrument(skip(self), fields(peripheral = %self.peripheral), level = "debug")]
    pub fn set_led(&mut self, on: bool) -> Result<(), SessionError> {
        let characteristic = self.require(CharacteristicRole::Led)?.characteristic().to_string();
        self.enqueue_write(characteristic, vec![u8::from(on)])
    }

    /// Requests the LED state; delivered to the LED callback.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::NotReady`] when no LED characteristic is bound.
    pub fn read_led_state(&mut self) -> Result<(), SessionError> {
        self.read_role(CharacteristicRole::Led)
    }

    /// Requests the button state; delivered to the button callback.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::NotReady`] when no button characteristic is bound.
    pub fn read_button_state(&mut self) -> Result<(), SessionError> {
        self.read_role(CharacteristicRole::Button)
    }

    /// Requests the firmware version string; delivered to its callback.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::NotReady`] when no firmware version
    /// characteristic is bound.
    pub fn read_firmware_version(&mut self) -> Result<(), SessionError> {
        self.read_role(CharacteristicRole::FirmwareVersion)
    }

    /// Encodes a configuration command and writes it to the Rx characteristic.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::NotBound`] when no Rx characteristic has been
    /// discovered, or a codec error when the command has no opcode.
    #[instrument(skip(self), fields(peripheral = %self.peripheral, kind = %command.kind()), level = "debug")]
    pub fn send_config_command(&mut self, command: ConfigCommand) -> Result<(), SessionError> {
        let Some(rx) = self.discovery.bindings().get(CharacteristicRole::Rx) else {
            return Err(SessionError::NotBound {
                peripheral: self.peripheral.clone(),
            });
        };
        let characteristic = rx.characteristic().to_string();
        let frame = self.codec.encode(&command)?;
        debug!(%frame, "sending config frame");
        self.enqueue_write(characteristic, frame.to_bytes())
    }

    /// Starts streaming microphone audio into `sink`.
    ///
    /// `on_ready` receives `true` once notifications are enabled. Starting
    /// again while streaming stops and releases the current sink before the
    /// new one is started.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::NotReady`] when no Sound characteristic is
    /// bound; `on_ready` is not invoked in that case.
    #[instrument(skip_all, fields(peripheral = %self.peripheral), level = "debug")]
    pub fn start_microphone(
        &mut self,
        sink: Box<dyn AudioSink>,
        on_ready: impl FnOnce(bool) + Send + 'static,
    ) -> Result<(), SessionError> {
        self.require(CharacteristicRole::Sound)?;
        let on_ready: ReadyCallback = Box::new(on_ready);
        let action = self.microphone.start(sink, on_ready);
        self.apply_microphone_action(action);
        Ok(())
    }

    /// Stops microphone streaming. Stopping an inactive microphone reports
    /// success immediately.
    #[instrument(skip_all, fields(peripheral = %self.peripheral), level = "debug")]
    pub fn stop_microphone(&mut self, on_stopped: impl FnOnce(bool) + Send + 'static) {
        let on_stopped: StoppedCallback = Box::new(on_stopped);
        let action = self.microphone.stop(on_stopped);
        self.apply_microphone_action(action);
    }

    /// Hands the peripheral and image to a firmware updater.
    ///
    /// Progress and the terminal outcome arrive on the returned channel.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Disconnected`] when the peripheral is not linked
    /// and [`SessionError::NoRuntime`] when called outside a Tokio runtime.
    pub fn start_firmware_update(
        &self,
        updater: Arc<dyn FirmwareUpdater>,
        image: FirmwareImage,
    ) -> Result<UnboundedReceiver<DfuEvent>, SessionError> {
        if self.connection == ConnectionState::Disconnected {
            return Err(SessionError::Disconnected);
        }
        let runtime = Handle::try_current().map_err(|_| SessionError::NoRuntime)?;
        let (events, receiver) = mpsc::unbounded_channel();
        let peripheral = self.peripheral.clone();
        info!(%peripheral, image_len = image.len(), "handing off firmware update");
        runtime.spawn(async move {
            if let Err(error) = updater.start_update(&peripheral, image, events.clone()).await {
                warn!(%peripheral, %error, "firmware update failed");
                let _ = events.send(DfuEvent::Failed {
                    message: error.to_string(),
                });
            }
        });
        Ok(receiver)
    }

    /// Routes one adapter event for this peripheral.
    #[instrument(skip_all, fields(peripheral = %self.peripheral, kind = event.kind()), level = "trace")]
    pub fn handle_event(&mut self, event: AdapterEvent) {
        match event {
            AdapterEvent::Discovered { .. } => {}
            AdapterEvent::Connected { .. } => {
                self.connection = ConnectionState::Connected;
                self.advance_discovery(DiscoveryEvent::Connected);
            }
            AdapterEvent::ConnectFailed { fault, .. } => {
                self.connection = ConnectionState::Disconnected;
                self.advance_discovery(DiscoveryEvent::ConnectFailed(fault));
            }
            AdapterEvent::Disconnected { reason, .. } => self.on_disconnected(reason),
            AdapterEvent::ServicesDiscovered { result, .. } => {
                self.advance_discovery(DiscoveryEvent::ServicesDiscovered(result));
            }
            AdapterEvent::CharacteristicsDiscovered {
                service, result, ..
            } => {
                self.advance_discovery(DiscoveryEvent::CharacteristicsDiscovered {
                    service,
                    result,
                });
            }
            AdapterEvent::DescriptorsDiscovered {
                characteristic,
                result,
                ..
            } => {
                self.advance_discovery(DiscoveryEvent::DescriptorsDiscovered {
                    characteristic,
                    result,
                });
            }
            AdapterEvent::NotificationStateChanged {
                characteristic,
                result,
                ..
            } => self.on_notification_state(&normalise_uuid(&characteristic), result),
            AdapterEvent::ValueUpdated {
                characteristic,
                result,
                ..
            } => self.on_value(&normalise_uuid(&characteristic), result),
            AdapterEvent::WriteCompleted {
                characteristic,
                result,
                ..
            } => self.on_write_completed(&normalise_uuid(&characteristic), result),
        }
    }

    fn require(&self, role: CharacteristicRole) -> Result<&CharacteristicBinding, SessionError> {
        self.discovery.bindings().get(role).ok_or_else(|| {
            warn!(peripheral = %self.peripheral, %role, "characteristic not bound yet");
            SessionError::NotReady { role }
        })
    }

    fn read_role(&mut self, role: CharacteristicRole) -> Result<(), SessionError> {
        let characteristic = self.require(role)?.characteristic().to_string();
        self.adapter.read(&self.peripheral, &characteristic)?;
        Ok(())
    }

    fn report(&mut self, error: SessionError) {
        warn!(peripheral = %self.peripheral, %error, "session operation failed");
        if let Some(callback) = self.callbacks.error.as_mut() {
            callback(error);
        }
    }

    fn advance_discovery(&mut self, event: DiscoveryEvent) {
        let was_terminal = self.discovery.state().is_terminal();
        let actions = self.discovery.on_event(event);
        for action in actions {
            if let Err(fault) = self.submit_discovery_action(action) {
                self.discovery.fail(DiscoveryFailure::Adapter(fault));
                break;
            }
        }
        self.sync_connection_state(was_terminal);
    }

    fn submit_discovery_action(&self, action: DiscoveryAction) -> Result<(), AdapterFault> {
        trace!(?action, "issuing discovery request");
        match action {
            DiscoveryAction::DiscoverServices => self.adapter.discover_services(&self.peripheral),
            DiscoveryAction::DiscoverCharacteristics(service) => {
                self.adapter.discover_characteristics(&self.peripheral, &service)
            }
            DiscoveryAction::DiscoverDescriptors(characteristic) => self
                .adapter
                .discover_descriptors(&self.peripheral, &characteristic),
            DiscoveryAction::EnableNotifications(characteristic) => {
                self.adapter
                    .set_notify(&self.peripheral, &characteristic, true)
            }
        }
    }

    fn sync_connection_state(&mut self, was_terminal: bool) {
        let next = match self.discovery.state() {
            DiscoveryState::Idle => return,
            DiscoveryState::ServicesRequested | DiscoveryState::ServicesDiscovered => {
                ConnectionState::DiscoveringServices
            }
            DiscoveryState::CharacteristicsRequested
            | DiscoveryState::CharacteristicsDiscovered
            | DiscoveryState::DescriptorsRequested => ConnectionState::DiscoveringCharacteristics,
            DiscoveryState::Ready => ConnectionState::Ready,
            DiscoveryState::Failed(_) => ConnectionState::Disconnected,
        };
        self.connection = next;

        if was_terminal {
            return;
        }
        match self.discovery.state().clone() {
            DiscoveryState::Ready => {
                info!(peripheral = %self.peripheral, bindings = self.discovery.bindings().len(), "session ready");
            }
            DiscoveryState::Failed(failure) => {
                self.writes.clear();
                self.microphone.teardown();
                if failure != DiscoveryFailure::Disconnected
                    && let Err(fault) = self.adapter.disconnect(&self.peripheral)
                {
                    debug!(%fault, "failed to release link after discovery failure");
                }
                self.report(SessionError::from(&failure));
            }
            _ => {}
        }
    }

    fn on_disconnected(&mut self, reason: Option<AdapterFault>) {
        let was_terminal = self.discovery.state().is_terminal();
        let was_ready = self.is_ready();
        self.discovery.on_event(DiscoveryEvent::Disconnected);
        self.writes.clear();
        self.microphone.teardown();
        self.connection = ConnectionState::Disconnected;

        match reason {
            Some(fault) if !was_terminal || was_ready => {
                warn!(peripheral = %self.peripheral, %fault, "peripheral disconnected");
                self.report(SessionError::Disconnected);
            }
            Some(_) => {}
            None => info!(peripheral = %self.peripheral, "peripheral disconnected"),
        }
    }

    fn on_notification_state(&mut self, characteristic: &str, result: Result<bool, AdapterFault>) {
        let is_sound = self.discovery.bindings().role_for(characteristic)
            == Some(CharacteristicRole::Sound);
        if !is_sound || self.microphone.state() == MicrophoneState::Inactive {
            self.advance_discovery(DiscoveryEvent::NotificationStateChanged {
                characteristic: characteristic.to_string(),
                result,
            });
            return;
        }

        if let Err(fault) = &result {
            self.report(SessionError::WriteFailed {
                characteristic: characteristic.to_string(),
                reason: fault.clone(),
            });
        }
        let action = self.microphone.on_notify_ack(result);
        self.apply_microphone_action(action);
    }

    fn apply_microphone_action(&mut self, action: Option<MicrophoneAction>) {
        let Some(action) = action else {
            return;
        };
        let enabled = action == MicrophoneAction::EnableNotifications;
        let submitted = match self.discovery.bindings().get(CharacteristicRole::Sound) {
            Some(binding) => {
                self.adapter
                    .set_notify(&self.peripheral, binding.characteristic(), enabled)
            }
            None => Err(AdapterFault::new("sound characteristic is no longer bound")),
        };
        if let Err(fault) = submitted {
            debug!(%fault, enabled, "microphone toggle was not submitted");
            let follow_up = self.microphone.on_notify_ack(Err(fault));
            self.apply_microphone_action(follow_up);
        }
    }

    fn on_value(&mut self, characteristic: &str, result: Result<Vec<u8>, AdapterFault>) {
        let bytes = match result {
            Ok(bytes) => bytes,
            Err(reason) => {
                self.report(SessionError::ReadFailed {
                    characteristic: characteristic.to_string(),
                    reason,
                });
                return;
            }
        };
        let Some(role) = self.discovery.bindings().role_for(characteristic) else {
            trace!(characteristic, "value for unbound characteristic dropped");
            return;
        };

        let event = self.codec.decode(&bytes, role);
        trace!(%role, ?event, "decoded notification");
        self.dispatch(event);
    }

    fn dispatch(&mut self, event: NotificationEvent) {
        match event {
            NotificationEvent::LedState(on) => match self.callbacks.led.as_mut() {
                Some(callback) => callback(on),
                None => trace!(on, "no LED callback registered"),
            },
            NotificationEvent::ButtonChanged(pressed) => match self.callbacks.button.as_mut() {
                Some(callback) => callback(pressed),
                None => trace!(pressed, "no button callback registered"),
            },
            NotificationEvent::SoundSamples(samples) => {
                self.microphone.deliver(&samples);
            }
            NotificationEvent::FirmwareVersion(version) => {
                match self.callbacks.firmware_version.as_mut() {
                    Some(callback) => callback(version),
                    None => trace!(%version, "no firmware version callback registered"),
                }
            }
            response @ (NotificationEvent::ConfigResponse { .. }
            | NotificationEvent::Unknown { .. }) => {
                match self.callbacks.config_response.as_mut() {
                    Some(callback) => callback(response),
                    None => trace!(?response, "no config response callback registered"),
                }
            }
        }
    }

    fn enqueue_write(&mut self, characteristic: String, value: Vec<u8>) -> Result<(), SessionError> {
        let queue = self.writes.entry(characteristic.clone()).or_default();
        queue.push_back(value);
        if queue.len() > 1 {
            trace!(%characteristic, queued = queue.len(), "write queued behind in-flight write");
            return Ok(());
        }
        self.submit_head(&characteristic)
    }

    /// Submits the head of a characteristic's queue. A rejected submission is
    /// dropped so the queue never stalls.
    fn submit_head(&mut self, characteristic: &str) -> Result<(), SessionError> {
        let Some(value) = self
            .writes
            .get(characteristic)
            .and_then(|queue| queue.front())
            .cloned()
        else {
            return Ok(());
        };

        match self
            .adapter
            .write(&self.peripheral, characteristic, value, WriteMode::WithResponse)
        {
            Ok(()) => Ok(()),
            Err(reason) => {
                if let Some(queue) = self.writes.get_mut(characteristic) {
                    queue.pop_front();
                }
                Err(SessionError::WriteFailed {
                    characteristic: characteristic.to_string(),
                    reason,
                })
            }
        }
    }

    fn on_write_completed(&mut self, characteristic: &str, result: Result<(), AdapterFault>) {
        let finished = self
            .writes
            .get_mut(characteristic)
            .and_then(VecDeque::pop_front);
        if finished.is_none() {
            trace!(characteristic, "write completion without a pending write");
            return;
        }

        match result {
            Ok(()) => {
                if self.discovery.bindings().role_for(characteristic) == Some(CharacteristicRole::Led)
                    && let Err(fault) = self.adapter.read(&self.peripheral, characteristic)
                {
                    self.report(SessionError::ReadFailed {
                        characteristic: characteristic.to_string(),
                        reason: fault,
                    });
                }
            }
            Err(reason) => self.report(SessionError::WriteFailed {
                characteristic: characteristic.to_string(),
                reason,
            }),
        }

        while self
            .writes
            .get(characteristic)
            .is_some_and(|queue| !queue.is_empty())
        {
            match self.submit_head(characteristic) {
                Ok(()) => break,
                Err(error) => self.report(error),
            }
        }
    }
}
