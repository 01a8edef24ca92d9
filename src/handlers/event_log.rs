use tracing::instrument;

use crate::error::SessionError;
use crate::session::DeviceSession;

use super::ConfigCommand;

/// Handler for event log requests.
pub struct EventLogHandler;

impl EventLogHandler {
    pub(crate) fn payload_for() -> Vec<u8> {
        Vec::new()
    }

    /// Asks the device to replay its event log on the response characteristic.
    ///
    /// # Errors
    ///
    /// Returns an error when the command cannot be encoded or no command
    /// characteristic is bound.
    #[instrument(skip(session), level = "debug")]
    pub fn request_event_log(session: &mut DeviceSession) -> Result<(), SessionError> {
        session.send_config_command(ConfigCommand::RequestEventLog)
    }
}
