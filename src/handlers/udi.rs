use std::str::FromStr;

use tracing::instrument;

use crate::error::SessionError;
use crate::session::DeviceSession;

use super::validation::parse_decimal;
use super::{ConfigCommand, ValidationError};

const MAX_UDI_DIGITS: usize = 20;

/// Unique device identifier assigned by the host.
#[derive(Debug, Clone, Copy, Eq, PartialEq, derive_more::Display)]
pub struct Udi(u64);

impl Udi {
    /// Returns the numeric identifier.
    #[must_use]
    pub fn value(self) -> u64 {
        self.0
    }
}

impl FromStr for Udi {
    type Err = ValidationError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        parse_decimal("udi", raw, MAX_UDI_DIGITS).map(Self)
    }
}

/// Handler for UDI commands.
pub struct UdiHandler;

impl UdiHandler {
    pub(crate) fn payload_for(udi: Udi) -> Vec<u8> {
        udi.value().to_be_bytes().to_vec()
    }

    /// Sends the set-UDI command.
    ///
    /// # Errors
    ///
    /// Returns an error when the command cannot be encoded or no command
    /// characteristic is bound.
    #[instrument(skip(session), level = "debug", fields(udi = udi.value()))]
    pub fn set_udi(session: &mut DeviceSession, udi: Udi) -> Result<(), SessionError> {
        session.send_config_command(ConfigCommand::SetUdi(udi))
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn payload_for_is_eight_big_endian_bytes() {
        let udi: Udi = "4294967296".parse().expect("valid udi should parse");
        assert_eq!(
            vec![0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x00],
            UdiHandler::payload_for(udi)
        );
    }

    #[test]
    fn udi_rejects_overflow() {
        assert_matches!(
            "18446744073709551616".parse::<Udi>(),
            Err(ValidationError::NotNumeric { field: "udi", .. })
        );
    }
}
