use time::OffsetDateTime;
use tracing::instrument;

use crate::error::SessionError;
use crate::session::DeviceSession;

use super::{ConfigCommand, ValidationError};

const MIN_YEAR: i32 = 0;
const MAX_YEAR: i32 = 25_599;

/// Wall-clock time accepted by the device clock.
///
/// Years are split into a century byte and a two-digit year byte, so only
/// years `0..=25599` are representable.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct DeviceTime(OffsetDateTime);

impl DeviceTime {
    /// Validates a timestamp for the device clock.
    ///
    /// # Errors
    ///
    /// Returns an error for negative years.
    ///
    /// ```
    /// use blinky::DeviceTime;
    /// use time::macros::datetime;
    ///
    /// let time = DeviceTime::new(datetime!(2024-01-02 03:04:05 UTC))?;
    /// assert_eq!(2024, time.timestamp().year());
    /// # Ok::<(), blinky::ValidationError>(())
    /// ```
    pub fn new(timestamp: OffsetDateTime) -> Result<Self, ValidationError> {
        let year = timestamp.year();
        if !(MIN_YEAR..=MAX_YEAR).contains(&year) {
            return Err(ValidationError::YearOutOfRange { year });
        }

        Ok(Self(timestamp))
    }

    /// Returns the wrapped timestamp.
    #[must_use]
    pub fn timestamp(self) -> OffsetDateTime {
        self.0
    }
}

/// Handler for device clock updates.
pub struct TimeSyncHandler;

impl TimeSyncHandler {
    /// `[century, yy, MM, dd, hh, mm, ss]`, each a plain numeric byte.
    pub(crate) fn payload_for(time: DeviceTime) -> Vec<u8> {
        let timestamp = time.timestamp();
        let year = timestamp.year();
        // `DeviceTime::new` bounds the year to 0..=25599.
        let century = u8::try_from(year.div_euclid(100)).unwrap_or(u8::MAX);
        let two_digit_year = u8::try_from(year.rem_euclid(100)).unwrap_or_default();

        vec![
            century,
            two_digit_year,
            u8::from(timestamp.month()),
            timestamp.day(),
            timestamp.hour(),
            timestamp.minute(),
            timestamp.second(),
        ]
    }

    /// Sends the set-time command.
    ///
    /// # Errors
    ///
    /// Returns an error when the command cannot be encoded or no command
    /// characteristic is bound.
    #[instrument(
        skip(session),
        level = "debug",
        fields(unix_timestamp = time.timestamp().unix_timestamp())
    )]
    pub fn sync_time(session: &mut DeviceSession, time: DeviceTime) -> Result<(), SessionError> {
        session.send_config_command(ConfigCommand::SetTime(time))
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use pretty_assertions::assert_eq;
    use time::macros::datetime;

    use super::*;

    #[test]
    fn payload_for_splits_calendar_fields() {
        let time = DeviceTime::new(datetime!(2024-01-02 03:04:05 UTC))
            .expect("test timestamp should be valid");
        assert_eq!(
            vec![0x14, 0x18, 0x01, 0x02, 0x03, 0x04, 0x05],
            TimeSyncHandler::payload_for(time)
        );
    }

    #[test]
    fn payload_for_handles_century_boundary() {
        let time = DeviceTime::new(datetime!(1999-12-31 23:59:59 UTC))
            .expect("test timestamp should be valid");
        assert_eq!(
            vec![19, 99, 12, 31, 23, 59, 59],
            TimeSyncHandler::payload_for(time)
        );
    }

    #[test]
    fn new_rejects_negative_years() {
        let result = DeviceTime::new(datetime!(-0001-01-01 00:00:00 UTC));
        assert_matches!(result, Err(ValidationError::YearOutOfRange { year: -1 }));
    }
}
