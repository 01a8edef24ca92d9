use std::str::FromStr;

use tracing::instrument;

use crate::error::SessionError;
use crate::session::DeviceSession;

use super::validation::parse_decimal;
use super::{ConfigCommand, ValidationError};

const MAX_PAIRING_CODE_DIGITS: usize = 6;

/// Pairing code of up to six decimal digits.
#[derive(Debug, Clone, Copy, Eq, PartialEq, derive_more::Display)]
#[display("{_0:06}")]
pub struct PairingCode(u32);

impl PairingCode {
    /// Returns the numeric code.
    #[must_use]
    pub fn value(self) -> u32 {
        self.0
    }
}

impl FromStr for PairingCode {
    type Err = ValidationError;

    /// ```
    /// use blinky::PairingCode;
    ///
    /// let code: PairingCode = "004213".parse()?;
    /// assert_eq!(4213, code.value());
    /// assert_eq!("004213", code.to_string());
    /// # Ok::<(), blinky::ValidationError>(())
    /// ```
    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let value = parse_decimal("pairing code", raw, MAX_PAIRING_CODE_DIGITS)?;
        // Six digits always fit.
        Ok(Self(u32::try_from(value).unwrap_or(u32::MAX)))
    }
}

/// Handler for pairing code commands.
pub struct PairingCodeHandler;

impl PairingCodeHandler {
    pub(crate) fn payload_for(code: PairingCode) -> Vec<u8> {
        code.value().to_be_bytes().to_vec()
    }

    /// Sends the set-pairing-code command.
    ///
    /// # Errors
    ///
    /// Returns an error when the command cannot be encoded or no command
    /// characteristic is bound.
    #[instrument(skip(session, code), level = "debug")]
    pub fn set_pairing_code(
        session: &mut DeviceSession,
        code: PairingCode,
    ) -> Result<(), SessionError> {
        session.send_config_command(ConfigCommand::SetPairingCode(code))
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn payload_for_is_big_endian() {
        let code: PairingCode = "123456".parse().expect("valid code should parse");
        assert_eq!(vec![0x00, 0x01, 0xE2, 0x40], PairingCodeHandler::payload_for(code));
    }

    #[test]
    fn pairing_code_rejects_letters() {
        assert_matches!(
            "12ab56".parse::<PairingCode>(),
            Err(ValidationError::NotNumeric { field: "pairing code", .. })
        );
    }

    #[test]
    fn pairing_code_rejects_seven_digits() {
        assert_matches!(
            "1234567".parse::<PairingCode>(),
            Err(ValidationError::TooManyDigits { max_digits: 6, .. })
        );
    }
}
