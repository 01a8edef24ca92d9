use std::io;

use anyhow::Result;
use clap::{Args, Subcommand};
use serde::Serialize;
use time::OffsetDateTime;
use tracing::{debug, instrument};

use crate::app::{SessionHandler, callback_channel};
use crate::error::InteractionError;
use crate::handlers::{
    CommandKind, DeviceTime, EventLogHandler, PairingCode, PairingCodeHandler, Threshold,
    ThresholdHandler, TimeSyncHandler, Udi, UdiHandler,
};
use crate::notification::NotificationEvent;
use crate::session::DeviceSession;
use crate::utils::format_hex;

use super::Output;
use super::ui::ConfigReportView;

/// Arguments for the `config` command.
#[derive(Debug, Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    action: ConfigAction,
}

impl ConfigArgs {
    #[must_use]
    pub fn new(action: ConfigAction) -> Self {
        Self { action }
    }
}

/// Configuration command to send.
#[derive(Debug, Clone, Subcommand)]
pub enum ConfigAction {
    /// Set the device clock to the current local time.
    SetTime,
    /// Set the sound-trigger threshold (0-255).
    Threshold { value: Threshold },
    /// Set the pairing code (up to six digits).
    PairingCode { code: PairingCode },
    /// Set the unique device identifier.
    Udi { udi: Udi },
    /// Request the stored event log.
    EventLog,
}

/// The command sent and the first response the peripheral returned.
#[derive(Debug, Clone, Eq, PartialEq, Serialize)]
pub(crate) struct ConfigReport {
    pub(crate) sent: CommandKind,
    pub(crate) response_command: Option<CommandKind>,
    pub(crate) response_opcode: Option<u8>,
    pub(crate) response_payload: String,
}

impl ConfigReport {
    fn new(sent: CommandKind, response: NotificationEvent) -> Self {
        let (response_command, response_opcode, payload) = match response {
            NotificationEvent::ConfigResponse {
                command,
                opcode,
                payload,
            } => (Some(command), Some(opcode), payload),
            NotificationEvent::Unknown { opcode, bytes } => (None, opcode, bytes),
            other => {
                debug!(?other, "unexpected event on the response channel");
                (None, None, Vec::new())
            }
        };

        Self {
            sent,
            response_command,
            response_opcode,
            response_payload: format_hex(&payload),
        }
    }
}

/// Executes the `config` command.
#[instrument(skip(handler, output), level = "info")]
pub(crate) async fn run<W>(
    handler: SessionHandler,
    args: &ConfigArgs,
    mut output: Output<'_, W>,
) -> Result<()>
where
    W: io::Write,
{
    let mut connected = handler.connect().await?;

    let (on_response, mut responses) = callback_channel();
    let session = connected.session_mut()?;
    session.set_config_response_callback(on_response);
    let sent = send(session, &args.action)?;
    connected
        .wait_until(|| !responses.is_empty(), "receive a configuration response")
        .await?;
    let response = responses
        .try_recv()
        .map_err(|_| InteractionError::EventStreamClosed)?;
    connected.close()?;

    let report = ConfigReport::new(sent, response);
    let painter = output.painter();
    output.emit(&report, &ConfigReportView::new(&report, &painter))
}

fn send(session: &mut DeviceSession, action: &ConfigAction) -> Result<CommandKind> {
    let kind = match *action {
        ConfigAction::SetTime => {
            TimeSyncHandler::sync_time(session, DeviceTime::new(local_now())?)?;
            CommandKind::SetTime
        }
        ConfigAction::Threshold { value } => {
            ThresholdHandler::set_threshold(session, value)?;
            CommandKind::SetThreshold
        }
        ConfigAction::PairingCode { code } => {
            PairingCodeHandler::set_pairing_code(session, code)?;
            CommandKind::SetPairingCode
        }
        ConfigAction::Udi { udi } => {
            UdiHandler::set_udi(session, udi)?;
            CommandKind::SetUdi
        }
        ConfigAction::EventLog => {
            EventLogHandler::request_event_log(session)?;
            CommandKind::RequestEventLog
        }
    };
    Ok(kind)
}

fn local_now() -> OffsetDateTime {
    OffsetDateTime::now_local().unwrap_or_else(|error| {
        debug!(%error, "local offset unavailable, using UTC");
        OffsetDateTime::now_utc()
    })
}
