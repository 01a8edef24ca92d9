use std::fmt;

use thiserror::Error;

use super::CommandKind;

/// Fixed preamble that opens every configuration frame.
pub const FRAME_PREAMBLE: [u8; 2] = [0xAA, 0x55];
const FRAME_HEADER_LEN: usize = 4;
const FRAME_MAX_PAYLOAD_LEN: usize = u8::MAX as usize;

/// Errors returned by frame encoding and decoding.
#[derive(Debug, Error, Clone, Eq, PartialEq)]
pub enum FrameCodecError {
    /// The payload does not fit in the one-byte length field.
    #[error("frame payload is too large: {payload_len} bytes exceeds max {max_payload_len}")]
    PayloadTooLarge {
        payload_len: usize,
        max_payload_len: usize,
    },
    /// The bytes do not start with `AA 55`.
    #[error("frame does not start with the AA 55 preamble")]
    MissingPreamble,
    /// The bytes end before the opcode and length fields.
    #[error("frame is too short: expected at least 4 bytes, got {actual}")]
    FrameTooShort { actual: usize },
    /// The declared payload length disagrees with the bytes present.
    #[error(
        "malformed frame for opcode {opcode:#04x}: declared {declared} payload bytes but {actual} are present"
    )]
    MalformedFrame {
        opcode: u8,
        declared: usize,
        actual: usize,
    },
    /// The active opcode table has no opcode for the command.
    #[error("command `{command}` has no opcode in the active opcode table")]
    UnsupportedCommand { command: CommandKind },
}

/// One `AA 55 <opcode> <len> <payload>` configuration frame.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct CommandFrame {
    opcode: u8,
    payload: Vec<u8>,
}

impl CommandFrame {
    /// Creates a frame, validating the payload length.
    ///
    /// # Errors
    ///
    /// Returns an error when the payload exceeds 255 bytes.
    ///
    /// ```
    /// use blinky::CommandFrame;
    ///
    /// let frame = CommandFrame::new(0x11, vec![0x01, 0x40])?;
    /// assert_eq!(vec![0xAA, 0x55, 0x11, 0x02, 0x01, 0x40], frame.to_bytes());
    /// # Ok::<(), blinky::FrameCodecError>(())
    /// ```
    pub fn new(opcode: u8, payload: Vec<u8>) -> Result<Self, FrameCodecError> {
        if payload.len() > FRAME_MAX_PAYLOAD_LEN {
            return Err(FrameCodecError::PayloadTooLarge {
                payload_len: payload.len(),
                max_payload_len: FRAME_MAX_PAYLOAD_LEN,
            });
        }

        Ok(Self { opcode, payload })
    }

    /// Parses a complete frame.
    ///
    /// Never indexes past the bytes present: a length field that disagrees
    /// with the remaining byte count is reported as
    /// [`FrameCodecError::MalformedFrame`].
    ///
    /// # Errors
    ///
    /// Returns an error when the preamble is missing, the header is truncated,
    /// or the declared length does not match.
    pub fn parse(bytes: &[u8]) -> Result<Self, FrameCodecError> {
        match bytes {
            [0xAA, 0x55, opcode, declared, payload @ ..] => {
                let declared = usize::from(*declared);
                if declared != payload.len() {
                    return Err(FrameCodecError::MalformedFrame {
                        opcode: *opcode,
                        declared,
                        actual: payload.len(),
                    });
                }
                Ok(Self {
                    opcode: *opcode,
                    payload: payload.to_vec(),
                })
            }
            [0xAA, 0x55, ..] => Err(FrameCodecError::FrameTooShort {
                actual: bytes.len(),
            }),
            _ => Err(FrameCodecError::MissingPreamble),
        }
    }

    /// Returns whether the bytes open with the configuration preamble.
    #[must_use]
    pub fn has_preamble(bytes: &[u8]) -> bool {
        bytes.starts_with(&FRAME_PREAMBLE)
    }

    /// Returns the opcode byte.
    #[must_use]
    pub fn opcode(&self) -> u8 {
        self.opcode
    }

    /// Returns the payload bytes.
    #[must_use]
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Serialises the frame to wire bytes.
    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(FRAME_HEADER_LEN + self.payload.len());
        bytes.extend_from_slice(&FRAME_PREAMBLE);
        bytes.push(self.opcode);
        // `new` caps the payload at u8::MAX.
        bytes.push(u8::try_from(self.payload.len()).unwrap_or(u8::MAX));
        bytes.extend_from_slice(&self.payload);
        bytes
    }
}

impl fmt::Display for CommandFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&crate::utils::format_hex(&self.to_bytes()))
    }
}
