use std::time::Duration;

use tokio::sync::mpsc::UnboundedReceiver;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument};

use super::discovery::DiscoveryState;
use super::manager::{SessionHandle, SessionManager};
use crate::error::{InteractionError, SessionError};
use crate::handlers::CommandCodec;
use crate::hw::{AdapterConnection, AdapterEvent, FoundDevice, PeripheralId};

/// Single consumer of an adapter's event stream.
///
/// Every session event is applied from here, one at a time, so no two events
/// for the same session are ever processed concurrently.
#[derive(Debug)]
pub struct SessionDriver {
    manager: SessionManager,
    events: UnboundedReceiver<AdapterEvent>,
    cancel: CancellationToken,
}

enum Pumped {
    Event(AdapterEvent),
    Deadline,
}

impl SessionDriver {
    #[must_use]
    pub fn new(connection: AdapterConnection, codec: CommandCodec) -> Self {
        let (adapter, events) = connection.into_parts();
        Self {
            manager: SessionManager::new(adapter, codec),
            events,
            cancel: CancellationToken::new(),
        }
    }

    /// Returns a token that aborts any wait in progress when cancelled.
    #[must_use]
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    #[must_use]
    pub fn manager(&self) -> &SessionManager {
        &self.manager
    }

    pub fn manager_mut(&mut self) -> &mut SessionManager {
        &mut self.manager
    }

    /// Scans for `duration` and returns devices whose name starts with `prefix`.
    ///
    /// # Errors
    ///
    /// Returns an error if the scan cannot start, the wait is cancelled or
    /// the event stream closes.
    #[instrument(skip(self), level = "debug")]
    pub async fn scan_for(
        &mut self,
        prefix: &str,
        duration: Duration,
    ) -> Result<Vec<FoundDevice>, InteractionError> {
        self.manager.scan()?;
        let pumped = self.pump_for(duration).await;
        self.manager.stop_scan()?;
        pumped?;

        Ok(self
            .manager
            .discovered_devices()
            .filter(|device| device.name_starts_with(prefix))
            .cloned()
            .collect())
    }

    /// Scans until a device whose name starts with `prefix` appears.
    ///
    /// # Errors
    ///
    /// Returns [`InteractionError::NoMatchingDevice`] when none appears in time.
    #[instrument(skip(self), level = "debug")]
    pub async fn find_first(
        &mut self,
        prefix: &str,
        timeout: Duration,
    ) -> Result<FoundDevice, InteractionError> {
        self.find_where(|device| device.name_starts_with(prefix), prefix, timeout)
            .await
    }

    /// Scans until the given peripheral advertises.
    ///
    /// # Errors
    ///
    /// Returns [`InteractionError::NoMatchingDevice`] when it does not appear in time.
    #[instrument(skip(self), fields(peripheral = %peripheral), level = "debug")]
    pub async fn find_peripheral(
        &mut self,
        peripheral: &PeripheralId,
        timeout: Duration,
    ) -> Result<FoundDevice, InteractionError> {
        self.find_where(
            |device| device.peripheral() == peripheral,
            peripheral.as_str(),
            timeout,
        )
        .await
    }

    async fn find_where<F>(
        &mut self,
        matches: F,
        label: &str,
        timeout: Duration,
    ) -> Result<FoundDevice, InteractionError>
    where
        F: Fn(&FoundDevice) -> bool,
    {
        self.manager.scan()?;
        let waited = self
            .pump_until(
                |manager| manager.discovered_devices().any(&matches),
                timeout,
                "discover a device",
            )
            .await;
        self.manager.stop_scan()?;

        match waited {
            Ok(()) | Err(InteractionError::Timeout { .. }) => self
                .manager
                .discovered_devices()
                .find(|device| matches(device))
                .cloned()
                .ok_or_else(|| InteractionError::NoMatchingDevice {
                    prefix: label.to_string(),
                }),
            Err(error) => Err(error),
        }
    }

    /// Binds a session and waits until discovery reaches a terminal state.
    ///
    /// # Errors
    ///
    /// Returns the discovery failure, or a timeout when discovery stalls.
    #[instrument(skip(self), fields(peripheral = %peripheral), level = "debug")]
    pub async fn connect(
        &mut self,
        peripheral: &PeripheralId,
        timeout: Duration,
    ) -> Result<SessionHandle, InteractionError> {
        let handle = self.manager.bind(peripheral)?;
        self.pump_until(
            |manager| {
                manager
                    .session(&handle)
                    .is_none_or(|session| session.discovery_state().is_terminal())
            },
            timeout,
            "complete discovery",
        )
        .await?;

        let session = self
            .manager
            .session(&handle)
            .ok_or_else(|| SessionError::NotBound {
                peripheral: peripheral.clone(),
            })?;
        match session.discovery_state() {
            DiscoveryState::Failed(failure) => Err(SessionError::from(failure).into()),
            _ => Ok(handle),
        }
    }

    /// Applies events for `duration`.
    ///
    /// # Errors
    ///
    /// Returns an error if cancelled or if the event stream closes.
    pub async fn pump_for(&mut self, duration: Duration) -> Result<(), InteractionError> {
        let deadline = Instant::now() + duration;
        loop {
            match self.next_event(Some(deadline)).await? {
                Pumped::Event(event) => self.manager.handle_event(event),
                Pumped::Deadline => return Ok(()),
            }
        }
    }

    /// Waits for and applies exactly one event.
    ///
    /// # Errors
    ///
    /// Returns an error if cancelled or if the event stream closes.
    pub async fn pump_next(&mut self) -> Result<(), InteractionError> {
        if let Pumped::Event(event) = self.next_event(None).await? {
            self.manager.handle_event(event);
        }
        Ok(())
    }

    /// Applies events until `done` holds.
    ///
    /// # Errors
    ///
    /// Returns [`InteractionError::Timeout`] naming `operation` when `done`
    /// does not hold within `timeout`.
    pub async fn pump_until<F>(
        &mut self,
        mut done: F,
        timeout: Duration,
        operation: &'static str,
    ) -> Result<(), InteractionError>
    where
        F: FnMut(&SessionManager) -> bool,
    {
        let deadline = Instant::now() + timeout;
        loop {
            if done(&self.manager) {
                return Ok(());
            }
            match self.next_event(Some(deadline)).await? {
                Pumped::Event(event) => self.manager.handle_event(event),
                Pumped::Deadline => {
                    debug!(operation, "wait timed out");
                    return Err(InteractionError::Timeout {
                        operation,
                        after: timeout,
                    });
                }
            }
        }
    }

    async fn next_event(&mut self, deadline: Option<Instant>) -> Result<Pumped, InteractionError> {
        let expired = async {
            match deadline {
                Some(deadline) => tokio::time::sleep_until(deadline).await,
                None => std::future::pending().await,
            }
        };
        tokio::select! {
            () = self.cancel.cancelled() => Err(InteractionError::Cancelled),
            () = expired => Ok(Pumped::Deadline),
            event = self.events.recv() => event
                .map(Pumped::Event)
                .ok_or(InteractionError::EventStreamClosed),
        }
    }
}
