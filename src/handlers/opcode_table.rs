use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use strum::IntoEnumIterator;
use strum_macros::{Display, EnumIter};
use thiserror::Error;

/// Commands the engine can construct.
#[derive(
    Debug, Clone, Copy, Eq, PartialEq, Hash, EnumIter, Display, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum CommandKind {
    /// Set the device clock.
    #[strum(to_string = "set_time")]
    SetTime,
    /// Set the sound-trigger threshold.
    #[strum(to_string = "set_threshold")]
    SetThreshold,
    /// Set the pairing code.
    #[strum(to_string = "set_pairing_code")]
    SetPairingCode,
    /// Set the unique device identifier.
    #[strum(to_string = "set_udi")]
    SetUdi,
    /// Request the stored event log.
    #[strum(to_string = "request_event_log")]
    RequestEventLog,
}

impl CommandKind {
    const fn default_opcode(self) -> u8 {
        match self {
            Self::SetTime => 0x10,
            Self::SetThreshold => 0x11,
            Self::SetPairingCode => 0x12,
            Self::SetUdi => 0x13,
            Self::RequestEventLog => 0x14,
        }
    }
}

/// Errors returned while building an opcode table.
#[derive(Debug, Error)]
pub enum OpcodeTableError {
    #[error("opcode table is not a valid JSON object of command names to opcodes")]
    Json(#[from] serde_json::Error),
    #[error("opcode {opcode:#04x} is assigned to both `{first}` and `{second}`")]
    DuplicateOpcode {
        opcode: u8,
        first: CommandKind,
        second: CommandKind,
    },
}

/// Opcode assignments for one device family.
///
/// Families may omit commands they do not support.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct OpcodeTable {
    by_command: HashMap<CommandKind, u8>,
}

impl Default for OpcodeTable {
    fn default() -> Self {
        Self {
            by_command: CommandKind::iter()
                .map(|command| (command, command.default_opcode()))
                .collect(),
        }
    }
}

impl OpcodeTable {
    /// Builds a table from explicit assignments.
    ///
    /// # Errors
    ///
    /// Returns an error when two commands share an opcode.
    pub fn new(
        assignments: impl IntoIterator<Item = (CommandKind, u8)>,
    ) -> Result<Self, OpcodeTableError> {
        let by_command: HashMap<CommandKind, u8> = assignments.into_iter().collect();

        let mut by_opcode: HashMap<u8, CommandKind> = HashMap::with_capacity(by_command.len());
        for (command, opcode) in &by_command {
            if let Some(first) = by_opcode.insert(*opcode, *command) {
                return Err(OpcodeTableError::DuplicateOpcode {
                    opcode: *opcode,
                    first,
                    second: *command,
                });
            }
        }

        Ok(Self { by_command })
    }

    /// Parses a JSON object such as `{"set_time": 16, "set_threshold": 17}`.
    ///
    /// # Errors
    ///
    /// Returns an error for malformed JSON, unknown command names, or duplicate opcodes.
    ///
    /// ```
    /// use blinky::{CommandKind, OpcodeTable};
    ///
    /// let table = OpcodeTable::from_json(r#"{"set_threshold": 33}"#)?;
    /// assert_eq!(Some(0x21), table.opcode_for(CommandKind::SetThreshold));
    /// assert_eq!(None, table.opcode_for(CommandKind::SetTime));
    /// # Ok::<(), blinky::OpcodeTableError>(())
    /// ```
    pub fn from_json(raw: &str) -> Result<Self, OpcodeTableError> {
        let assignments: HashMap<CommandKind, u8> = serde_json::from_str(raw)?;
        Self::new(assignments)
    }

    /// Returns the opcode for a command, if this family supports it.
    #[must_use]
    pub fn opcode_for(&self, command: CommandKind) -> Option<u8> {
        self.by_command.get(&command).copied()
    }

    /// Returns the command assigned to an opcode, if any.
    #[must_use]
    pub fn command_for(&self, opcode: u8) -> Option<CommandKind> {
        self.by_command
            .iter()
            .find_map(|(command, assigned)| (*assigned == opcode).then_some(*command))
    }
}
