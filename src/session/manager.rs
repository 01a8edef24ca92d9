use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use tracing::{debug, info, instrument, trace, warn};

use super::device::{ConnectionState, DeviceSession};
use crate::advertisement::AdvertisementParser;
use crate::error::SessionError;
use crate::handlers::CommandCodec;
use crate::hw::{AdapterEvent, BleAdapter, FoundDevice, PeripheralId};

/// Identifies a bound session by its peripheral.
///
/// Two handles are equal exactly when their adapter-assigned identifiers are.
#[derive(Debug, Clone, Eq, PartialEq, Hash)]
pub struct SessionHandle {
    peripheral: PeripheralId,
}

impl SessionHandle {
    #[must_use]
    pub fn peripheral(&self) -> &PeripheralId {
        &self.peripheral
    }
}

/// Owns every device session created through one adapter and routes adapter
/// events to them.
pub struct SessionManager {
    adapter: Arc<dyn BleAdapter>,
    codec: CommandCodec,
    sessions: HashMap<PeripheralId, DeviceSession>,
    discovered: BTreeMap<PeripheralId, FoundDevice>,
}

impl std::fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionManager")
            .field("sessions", &self.sessions)
            .field("discovered", &self.discovered.len())
            .finish_non_exhaustive()
    }
}

impl SessionManager {
    #[must_use]
    pub fn new(adapter: Arc<dyn BleAdapter>, codec: CommandCodec) -> Self {
        Self {
            adapter,
            codec,
            sessions: HashMap::new(),
            discovered: BTreeMap::new(),
        }
    }

    /// Starts scanning for advertisements.
    ///
    /// # Errors
    ///
    /// Returns an error when the adapter rejects the request.
    pub fn scan(&self) -> Result<(), SessionError> {
        self.adapter.scan()?;
        Ok(())
    }

    /// Stops scanning.
    ///
    /// # Errors
    ///
    /// Returns an error when the adapter rejects the request.
    pub fn stop_scan(&self) -> Result<(), SessionError> {
        self.adapter.stop_scan()?;
        Ok(())
    }

    /// Returns discovered devices ordered by peripheral identifier.
    pub fn discovered_devices(&self) -> impl Iterator<Item = &FoundDevice> {
        self.discovered.values()
    }

    /// Returns the first discovered device whose name starts with `prefix`.
    #[must_use]
    pub fn find_device(&self, prefix: &str) -> Option<&FoundDevice> {
        self.discovered_devices()
            .find(|device| device.name_starts_with(prefix))
    }

    /// Binds a session to a peripheral and starts discovery.
    ///
    /// Binding a peripheral whose session is still live returns the existing
    /// handle without restarting discovery. A session whose discovery failed
    /// is replaced.
    ///
    /// # Errors
    ///
    /// Returns an error when the adapter rejects the connect request.
    #[instrument(skip(self), level = "debug")]
    pub fn bind(&mut self, peripheral: &PeripheralId) -> Result<SessionHandle, SessionError> {
        let handle = SessionHandle {
            peripheral: peripheral.clone(),
        };
        if let Some(existing) = self.sessions.get(peripheral)
            && !existing.is_terminal()
        {
            debug!(%peripheral, "session already bound");
            return Ok(handle);
        }

        let mut session =
            DeviceSession::new(peripheral.clone(), Arc::clone(&self.adapter), self.codec.clone());
        session.connect()?;
        if self.sessions.insert(peripheral.clone(), session).is_some() {
            info!(%peripheral, "replaced failed session");
        }
        Ok(handle)
    }

    /// Drops a session, disconnecting it first if the link is still up.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::NotBound`] when no session exists.
    pub fn release(&mut self, handle: &SessionHandle) -> Result<(), SessionError> {
        let mut session = self
            .sessions
            .remove(handle.peripheral())
            .ok_or_else(|| SessionError::NotBound {
                peripheral: handle.peripheral().clone(),
            })?;
        if session.connection_state() == ConnectionState::Disconnected {
            return Ok(());
        }
        session.disconnect()
    }

    #[must_use]
    pub fn session(&self, handle: &SessionHandle) -> Option<&DeviceSession> {
        self.sessions.get(handle.peripheral())
    }

    /// Returns the session for a handle.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::NotBound`] when no session exists.
    pub fn session_mut(
        &mut self,
        handle: &SessionHandle,
    ) -> Result<&mut DeviceSession, SessionError> {
        self.sessions
            .get_mut(handle.peripheral())
            .ok_or_else(|| SessionError::NotBound {
                peripheral: handle.peripheral().clone(),
            })
    }

    /// Routes one adapter event.
    ///
    /// Events for unknown or failed sessions are dropped before any handler
    /// is looked up.
    pub fn handle_event(&mut self, event: AdapterEvent) {
        match event {
            AdapterEvent::Discovered {
                peripheral,
                advertisement,
                rssi,
            } => {
                let parsed = AdvertisementParser::parse(&advertisement);
                self.record_discovery(FoundDevice::new(peripheral, parsed, rssi));
            }
            other => self.route(other),
        }
    }

    fn record_discovery(&mut self, device: FoundDevice) {
        match self.discovered.get_mut(device.peripheral()) {
            Some(known) => known.merge(device),
            None => {
                debug!(peripheral = %device.peripheral(), name = device.name(), "discovered peripheral");
                self.discovered.insert(device.peripheral().clone(), device);
            }
        }
    }

    fn route(&mut self, event: AdapterEvent) {
        let Some(session) = self.sessions.get_mut(event.peripheral()) else {
            trace!(peripheral = %event.peripheral(), kind = event.kind(), "event for unbound peripheral dropped");
            return;
        };
        if session.is_terminal() {
            if let AdapterEvent::Disconnected { .. } = event {
                debug!(peripheral = %event.peripheral(), "disconnect for torn-down session dropped");
            } else {
                warn!(
                    peripheral = %event.peripheral(),
                    kind = event.kind(),
                    "event for torn-down session dropped"
                );
            }
            return;
        }
        session.handle_event(event);
    }
}
