use std::io;

use anyhow::Result;
use serde::Serialize;
use tracing::{debug, instrument};

use crate::app::{ConnectedSession, SessionHandler, callback_channel};
use crate::hw::FoundDevice;
use crate::protocol::{CharacteristicRole, ServiceRole};
use crate::session::DeviceSession;

use super::Output;
use super::ui::InspectReportView;

/// What discovery found on a connected peripheral.
#[derive(Debug, Clone, Serialize)]
pub(crate) struct InspectReport {
    pub(crate) device: FoundDevice,
    pub(crate) connection_state: String,
    pub(crate) discovery_state: String,
    pub(crate) firmware_version: Option<String>,
    pub(crate) services: Vec<ServiceEntry>,
    pub(crate) bindings: Vec<BindingEntry>,
}

#[derive(Debug, Clone, Serialize)]
pub(crate) struct ServiceEntry {
    pub(crate) uuid: String,
    pub(crate) role: ServiceRole,
}

#[derive(Debug, Clone, Serialize)]
pub(crate) struct BindingEntry {
    pub(crate) role: CharacteristicRole,
    pub(crate) service: ServiceRole,
    pub(crate) characteristic: String,
}

impl InspectReport {
    pub(crate) fn new(
        device: &FoundDevice,
        session: &DeviceSession,
        firmware_version: Option<String>,
    ) -> Self {
        let services = session
            .services()
            .iter()
            .map(|(uuid, role)| ServiceEntry {
                uuid: uuid.clone(),
                role: role.clone(),
            })
            .collect();
        let bindings = session
            .bindings()
            .iter()
            .map(|(role, binding)| BindingEntry {
                role,
                service: binding.service().clone(),
                characteristic: binding.characteristic().to_string(),
            })
            .collect();

        Self {
            device: device.clone(),
            connection_state: session.connection_state().to_string(),
            discovery_state: session.discovery_state().to_string(),
            firmware_version,
            services,
            bindings,
        }
    }
}

/// Executes the `inspect` command.
#[instrument(skip_all, level = "info")]
pub(crate) async fn run<W>(handler: SessionHandler, mut output: Output<'_, W>) -> Result<()>
where
    W: io::Write,
{
    let mut connected = handler.connect().await?;
    let firmware_version = read_firmware_version(&mut connected).await;
    let report = InspectReport::new(connected.device(), connected.session()?, firmware_version);
    connected.close()?;

    let painter = output.painter();
    output.emit(&report, &InspectReportView::new(&report, &painter))
}

/// Best-effort firmware version probe; inspect still reports discovery
/// results when it fails.
async fn read_firmware_version(connected: &mut ConnectedSession) -> Option<String> {
    let session = connected.session_mut().ok()?;
    if session
        .bindings()
        .get(CharacteristicRole::FirmwareVersion)
        .is_none()
    {
        debug!("no firmware version characteristic bound");
        return None;
    }

    let (on_version, mut versions) = callback_channel();
    session.set_firmware_version_callback(on_version);
    if let Err(error) = session.read_firmware_version() {
        debug!(%error, "firmware version read rejected");
        return None;
    }

    let waited = connected
        .wait_until(|| !versions.is_empty(), "read the firmware version")
        .await;
    if let Ok(session) = connected.session_mut() {
        session.remove_firmware_version_callback();
    }
    match waited {
        Ok(()) => versions.try_recv().ok(),
        Err(error) => {
            debug!(%error, "firmware version probe failed during inspect");
            None
        }
    }
}
