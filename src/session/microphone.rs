use std::fmt;

use tracing::{debug, trace};

use crate::audio::{AudioSink, reassemble};
use crate::error::AdapterFault;

/// Invoked once with whether microphone streaming started.
pub type ReadyCallback = Box<dyn FnOnce(bool) + Send>;
/// Invoked once with whether microphone streaming stopped cleanly.
pub type StoppedCallback = Box<dyn FnOnce(bool) + Send>;

/// Microphone streaming lifecycle.
#[derive(Debug, Clone, Copy, Eq, PartialEq, derive_more::Display)]
pub enum MicrophoneState {
    #[display("inactive")]
    Inactive,
    #[display("starting")]
    Starting,
    #[display("active")]
    Active,
    #[display("stopping")]
    Stopping,
}

/// Notification toggles the lifecycle needs issued on the Sound characteristic.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub(crate) enum MicrophoneAction {
    EnableNotifications,
    DisableNotifications,
}

struct PendingStart {
    sink: Box<dyn AudioSink>,
    on_ready: ReadyCallback,
}

impl PendingStart {
    fn cancel(self) {
        (self.on_ready)(false);
    }
}

/// Owns the audio sink for one peripheral.
///
/// At most one sink is alive at a time: a replaced sink is stopped and
/// dropped before its successor is started.
pub(crate) struct MicrophoneSession {
    state: MicrophoneState,
    pending: Option<PendingStart>,
    sink: Option<Box<dyn AudioSink>>,
    on_stopped: Vec<StoppedCallback>,
    restart: Option<PendingStart>,
}

impl fmt::Debug for MicrophoneSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MicrophoneSession")
            .field("state", &self.state)
            .field("has_sink", &self.sink.is_some())
            .field("restart_queued", &self.restart.is_some())
            .finish_non_exhaustive()
    }
}

impl Default for MicrophoneSession {
    fn default() -> Self {
        Self {
            state: MicrophoneState::Inactive,
            pending: None,
            sink: None,
            on_stopped: Vec::new(),
            restart: None,
        }
    }
}

impl MicrophoneSession {
    pub(crate) fn state(&self) -> MicrophoneState {
        self.state
    }

    pub(crate) fn has_sink(&self) -> bool {
        self.sink.is_some()
    }

    fn transition(&mut self, next: MicrophoneState) {
        debug!(from = %self.state, to = %next, "microphone state changed");
        self.state = next;
    }

    pub(crate) fn start(
        &mut self,
        sink: Box<dyn AudioSink>,
        on_ready: ReadyCallback,
    ) -> Option<MicrophoneAction> {
        let request = PendingStart { sink, on_ready };
        match self.state {
            MicrophoneState::Inactive => {
                self.pending = Some(request);
                self.transition(MicrophoneState::Starting);
                Some(MicrophoneAction::EnableNotifications)
            }
            MicrophoneState::Starting => {
                if let Some(superseded) = self.pending.replace(request) {
                    superseded.cancel();
                }
                None
            }
            MicrophoneState::Active => {
                if let Some(mut previous) = self.sink.take() {
                    previous.stop();
                }
                let PendingStart { mut sink, on_ready } = request;
                sink.start();
                self.sink = Some(sink);
                debug!("replaced active microphone sink");
                on_ready(true);
                None
            }
            MicrophoneState::Stopping => {
                if let Some(superseded) = self.restart.replace(request) {
                    superseded.cancel();
                }
                None
            }
        }
    }

    pub(crate) fn stop(&mut self, on_stopped: StoppedCallback) -> Option<MicrophoneAction> {
        match self.state {
            MicrophoneState::Inactive => {
                on_stopped(true);
                None
            }
            MicrophoneState::Starting => {
                if let Some(pending) = self.pending.take() {
                    pending.cancel();
                }
                self.on_stopped.push(on_stopped);
                self.transition(MicrophoneState::Stopping);
                Some(MicrophoneAction::DisableNotifications)
            }
            MicrophoneState::Active => {
                if let Some(mut sink) = self.sink.take() {
                    sink.stop();
                }
                self.on_stopped.push(on_stopped);
                self.transition(MicrophoneState::Stopping);
                Some(MicrophoneAction::DisableNotifications)
            }
            MicrophoneState::Stopping => {
                if let Some(queued) = self.restart.take() {
                    queued.cancel();
                }
                self.on_stopped.push(on_stopped);
                None
            }
        }
    }

    /// Applies the adapter's answer to the last notification toggle.
    pub(crate) fn on_notify_ack(
        &mut self,
        result: Result<bool, AdapterFault>,
    ) -> Option<MicrophoneAction> {
        match (self.state, result) {
            (MicrophoneState::Starting, Ok(true)) => {
                if let Some(PendingStart { mut sink, on_ready }) = self.pending.take() {
                    sink.start();
                    self.sink = Some(sink);
                    self.transition(MicrophoneState::Active);
                    on_ready(true);
                }
                None
            }
            (MicrophoneState::Starting, Err(_)) => {
                self.transition(MicrophoneState::Inactive);
                if let Some(pending) = self.pending.take() {
                    pending.cancel();
                }
                None
            }
            (MicrophoneState::Stopping, outcome @ (Ok(false) | Err(_))) => {
                let clean = outcome.is_ok();
                self.transition(MicrophoneState::Inactive);
                for on_stopped in self.on_stopped.drain(..) {
                    on_stopped(clean);
                }
                let queued = self.restart.take()?;
                self.start(queued.sink, queued.on_ready)
            }
            (state, result) => {
                trace!(%state, ?result, "ignoring stale microphone acknowledgement");
                None
            }
        }
    }

    /// Schedules decoded samples on the active sink.
    ///
    /// Returns `false` when no sink is active and the samples were dropped.
    pub(crate) fn deliver(&mut self, samples: &[i16]) -> bool {
        match (self.state, self.sink.as_mut()) {
            (MicrophoneState::Active, Some(sink)) => {
                sink.schedule(reassemble(samples));
                true
            }
            _ => {
                trace!(state = %self.state, samples = samples.len(), "dropping microphone samples");
                false
            }
        }
    }

    /// Releases everything on disconnect.
    pub(crate) fn teardown(&mut self) {
        if self.state != MicrophoneState::Inactive {
            self.transition(MicrophoneState::Inactive);
        }
        if let Some(pending) = self.pending.take() {
            pending.cancel();
        }
        if let Some(queued) = self.restart.take() {
            queued.cancel();
        }
        if let Some(mut sink) = self.sink.take() {
            sink.stop();
        }
        for on_stopped in self.on_stopped.drain(..) {
            on_stopped(true);
        }
    }
}
