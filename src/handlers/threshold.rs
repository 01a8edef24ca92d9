use std::str::FromStr;

use tracing::instrument;

use crate::error::SessionError;
use crate::session::DeviceSession;

use super::validation::parse_decimal;
use super::{ConfigCommand, ValidationError};

const THRESHOLD_SELECTOR: u8 = 0x01;

/// Sound-trigger threshold byte.
#[derive(Debug, Clone, Copy, Eq, PartialEq, derive_more::Display, derive_more::From)]
pub struct Threshold(u8);

impl Threshold {
    /// Returns the threshold byte.
    #[must_use]
    pub fn value(self) -> u8 {
        self.0
    }
}

impl FromStr for Threshold {
    type Err = ValidationError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let value = parse_decimal("threshold", raw, 3)?;
        u8::try_from(value)
            .map(Self)
            .map_err(|_| ValidationError::OutOfRange {
                field: "threshold",
                value,
                min: 0,
                max: u64::from(u8::MAX),
            })
    }
}

/// Handler for threshold commands.
pub struct ThresholdHandler;

impl ThresholdHandler {
    pub(crate) fn payload_for(threshold: Threshold) -> Vec<u8> {
        vec![THRESHOLD_SELECTOR, threshold.value()]
    }

    /// Sends the set-threshold command.
    ///
    /// # Errors
    ///
    /// Returns an error when the command cannot be encoded or no command
    /// characteristic is bound.
    #[instrument(skip(session), level = "debug", fields(threshold = threshold.value()))]
    pub fn set_threshold(
        session: &mut DeviceSession,
        threshold: Threshold,
    ) -> Result<(), SessionError> {
        session.send_config_command(ConfigCommand::SetThreshold(threshold))
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case("0", 0)]
    #[case("64", 64)]
    #[case("255", 255)]
    fn threshold_parses_byte_range(#[case] raw: &str, #[case] expected: u8) {
        let threshold: Threshold = raw.parse().expect("valid threshold should parse");
        assert_eq!(expected, threshold.value());
    }

    #[test]
    fn threshold_rejects_values_above_a_byte() {
        assert_matches!(
            "256".parse::<Threshold>(),
            Err(ValidationError::OutOfRange { value: 256, max: 255, .. })
        );
    }

    #[test]
    fn payload_for_prefixes_selector() {
        assert_eq!(vec![0x01, 0x7F], ThresholdHandler::payload_for(Threshold::from(0x7F)));
    }
}
