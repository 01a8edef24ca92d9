use tracing::instrument;

use crate::notification::{NotificationEvent, NotificationHandler};
use crate::protocol::CharacteristicRole;

use super::{
    CommandFrame, CommandKind, DeviceTime, EventLogHandler, FrameCodecError, OpcodeTable,
    PairingCode, PairingCodeHandler, Threshold, ThresholdHandler, TimeSyncHandler, Udi,
    UdiHandler,
};

/// One configuration command with validated parameters.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum ConfigCommand {
    SetTime(DeviceTime),
    SetThreshold(Threshold),
    SetPairingCode(PairingCode),
    SetUdi(Udi),
    RequestEventLog,
}

impl ConfigCommand {
    /// Returns the command kind used for opcode lookup.
    #[must_use]
    pub fn kind(&self) -> CommandKind {
        match self {
            Self::SetTime(_) => CommandKind::SetTime,
            Self::SetThreshold(_) => CommandKind::SetThreshold,
            Self::SetPairingCode(_) => CommandKind::SetPairingCode,
            Self::SetUdi(_) => CommandKind::SetUdi,
            Self::RequestEventLog => CommandKind::RequestEventLog,
        }
    }

    fn payload(&self) -> Vec<u8> {
        match *self {
            Self::SetTime(time) => TimeSyncHandler::payload_for(time),
            Self::SetThreshold(threshold) => ThresholdHandler::payload_for(threshold),
            Self::SetPairingCode(code) => PairingCodeHandler::payload_for(code),
            Self::SetUdi(udi) => UdiHandler::payload_for(udi),
            Self::RequestEventLog => EventLogHandler::payload_for(),
        }
    }
}

/// Encodes outgoing configuration frames and decodes inbound payloads for
/// one device family.
#[derive(Debug, Clone, Default, Eq, PartialEq)]
pub struct CommandCodec {
    opcodes: OpcodeTable,
}

impl CommandCodec {
    /// Creates a codec for the given opcode table.
    #[must_use]
    pub fn new(opcodes: OpcodeTable) -> Self {
        Self { opcodes }
    }

    /// Returns the active opcode table.
    #[must_use]
    pub fn opcodes(&self) -> &OpcodeTable {
        &self.opcodes
    }

    /// Encodes a configuration command.
    ///
    /// # Errors
    ///
    /// Returns an error when the family has no opcode for the command or the
    /// payload does not fit in one frame.
    ///
    /// ```
    /// use blinky::{CommandCodec, ConfigCommand, Threshold};
    ///
    /// let frame = CommandCodec::default().encode(&ConfigCommand::SetThreshold(Threshold::from(9)))?;
    /// assert_eq!(vec![0xAA, 0x55, 0x11, 0x02, 0x01, 0x09], frame.to_bytes());
    /// # Ok::<(), blinky::FrameCodecError>(())
    /// ```
    #[instrument(skip(self), level = "trace", fields(command = %command.kind()))]
    pub fn encode(&self, command: &ConfigCommand) -> Result<CommandFrame, FrameCodecError> {
        let kind = command.kind();
        let opcode = self
            .opcodes
            .opcode_for(kind)
            .ok_or(FrameCodecError::UnsupportedCommand { command: kind })?;
        CommandFrame::new(opcode, command.payload())
    }

    /// Encodes the set-time command.
    ///
    /// # Errors
    ///
    /// Returns an error when the family has no set-time opcode.
    pub fn encode_set_system_time(&self, now: DeviceTime) -> Result<CommandFrame, FrameCodecError> {
        self.encode(&ConfigCommand::SetTime(now))
    }

    /// Encodes the set-threshold command.
    ///
    /// # Errors
    ///
    /// Returns an error when the family has no set-threshold opcode.
    pub fn encode_set_threshold(&self, value: Threshold) -> Result<CommandFrame, FrameCodecError> {
        self.encode(&ConfigCommand::SetThreshold(value))
    }

    /// Decodes an inbound payload received on a characteristic bound to `role`.
    #[must_use]
    pub fn decode(&self, raw: &[u8], role: CharacteristicRole) -> NotificationEvent {
        NotificationHandler::decode(raw, role, &self.opcodes)
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use pretty_assertions::assert_eq;
    use rstest::rstest;
    use time::macros::datetime;

    use super::*;

    #[test]
    fn encode_set_system_time_matches_wire_layout() {
        let now = DeviceTime::new(datetime!(2024-01-02 03:04:05 UTC))
            .expect("test timestamp should be valid");
        let frame = CommandCodec::default()
            .encode_set_system_time(now)
            .expect("set-time should encode");
        insta::assert_snapshot!(frame.to_string(), @"AA 55 10 07 14 18 01 02 03 04 05");
    }

    #[rstest]
    #[case(0)]
    #[case(1)]
    #[case(128)]
    #[case(255)]
    fn threshold_survives_decode(#[case] value: u8) {
        let codec = CommandCodec::default();
        let frame = codec
            .encode_set_threshold(Threshold::from(value))
            .expect("threshold should encode");

        let decoded = codec.decode(&frame.to_bytes(), CharacteristicRole::Tx);

        assert_matches!(
            decoded,
            NotificationEvent::ConfigResponse { command: CommandKind::SetThreshold, opcode: 0x11, payload }
                if payload == vec![0x01, value]
        );
    }

    #[test]
    fn request_event_log_has_empty_payload() {
        let frame = CommandCodec::default()
            .encode(&ConfigCommand::RequestEventLog)
            .expect("event log request should encode");
        assert_eq!(vec![0xAA, 0x55, 0x14, 0x00], frame.to_bytes());
    }

    #[test]
    fn encode_rejects_commands_missing_from_family() {
        let opcodes = OpcodeTable::new([(CommandKind::SetThreshold, 0x31)])
            .expect("single assignment is valid");
        let result = CommandCodec::new(opcodes).encode(&ConfigCommand::RequestEventLog);
        assert_matches!(
            result,
            Err(FrameCodecError::UnsupportedCommand { command: CommandKind::RequestEventLog })
        );
    }

    #[test]
    fn encode_uses_family_opcode() {
        let opcodes = OpcodeTable::new([(CommandKind::SetThreshold, 0x31)])
            .expect("single assignment is valid");
        let frame = CommandCodec::new(opcodes)
            .encode_set_threshold(Threshold::from(2))
            .expect("threshold should encode");
        assert_eq!(0x31, frame.opcode());
    }
}
