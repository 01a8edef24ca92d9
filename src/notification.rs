use tracing::{debug, instrument};

use crate::audio::pcm16_from_le_bytes;
use crate::handlers::{CommandFrame, CommandKind, FrameCodecError, OpcodeTable};
use crate::protocol::CharacteristicRole;

/// Typed events decoded from characteristic values.
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum NotificationEvent {
    /// LED state echoed by the peripheral.
    LedState(bool),
    /// Button state; `true` while pressed.
    ButtonChanged(bool),
    /// Raw microphone PCM samples.
    SoundSamples(Vec<i16>),
    /// Firmware version string.
    FirmwareVersion(String),
    /// Well-formed configuration response with a known opcode.
    ConfigResponse {
        command: CommandKind,
        opcode: u8,
        payload: Vec<u8>,
    },
    /// Payload the engine does not understand, preserved as received.
    Unknown { opcode: Option<u8>, bytes: Vec<u8> },
}

/// Decodes characteristic values into typed events.
pub struct NotificationHandler;

impl NotificationHandler {
    /// Decodes one payload received on a characteristic bound to `role`.
    ///
    /// Only Tx payloads opening with `AA 55` are configuration frames. Frames
    /// with an unknown opcode or an inconsistent length degrade to
    /// [`NotificationEvent::Unknown`]. Other payloads are interpreted per role,
    /// so PCM samples that happen to start with the preamble stay audio.
    #[instrument(skip(payload, opcodes), level = "trace", fields(payload_len = payload.len()))]
    pub fn decode(
        payload: &[u8],
        role: CharacteristicRole,
        opcodes: &OpcodeTable,
    ) -> NotificationEvent {
        match (role, payload) {
            (CharacteristicRole::Tx, bytes) if CommandFrame::has_preamble(bytes) => {
                Self::decode_frame(bytes, opcodes)
            }
            (CharacteristicRole::Led, [state, ..]) => NotificationEvent::LedState(*state == 0x01),
            (CharacteristicRole::Button, [state, ..]) => {
                NotificationEvent::ButtonChanged(*state == 0x01)
            }
            (CharacteristicRole::Sound, bytes) => {
                NotificationEvent::SoundSamples(pcm16_from_le_bytes(bytes))
            }
            (CharacteristicRole::FirmwareVersion, bytes) => NotificationEvent::FirmwareVersion(
                String::from_utf8_lossy(bytes).trim_end_matches('\0').to_string(),
            ),
            _ => NotificationEvent::Unknown {
                opcode: None,
                bytes: payload.to_vec(),
            },
        }
    }

    fn decode_frame(payload: &[u8], opcodes: &OpcodeTable) -> NotificationEvent {
        match CommandFrame::parse(payload) {
            Ok(frame) => match opcodes.command_for(frame.opcode()) {
                Some(command) => NotificationEvent::ConfigResponse {
                    command,
                    opcode: frame.opcode(),
                    payload: frame.payload().to_vec(),
                },
                None => NotificationEvent::Unknown {
                    opcode: Some(frame.opcode()),
                    bytes: payload.to_vec(),
                },
            },
            Err(error) => {
                debug!(%error, "recovering undecodable configuration frame");
                let opcode = match error {
                    FrameCodecError::MalformedFrame { opcode, .. } => Some(opcode),
                    _ => None,
                };
                NotificationEvent::Unknown {
                    opcode,
                    bytes: payload.to_vec(),
                }
            }
        }
    }
}
