use thiserror::Error;

/// Errors returned when caller-supplied command parameters are invalid.
#[derive(Debug, Error, Clone, Eq, PartialEq)]
pub enum ValidationError {
    /// The input was not a plain decimal number.
    #[error("{field} `{value}` is not a decimal number")]
    NotNumeric { field: &'static str, value: String },
    /// The number was outside the accepted range.
    #[error("{field} {value} is out of range ({min}..={max})")]
    OutOfRange {
        field: &'static str,
        value: u64,
        min: u64,
        max: u64,
    },
    /// The decimal string had more digits than the field allows.
    #[error("{field} `{value}` has more than {max_digits} digits")]
    TooManyDigits {
        field: &'static str,
        value: String,
        max_digits: usize,
    },
    /// The calendar year cannot be split into century and year bytes.
    #[error("year {year} cannot be encoded as century and year bytes")]
    YearOutOfRange { year: i32 },
}

/// Parses a decimal string into a `u64`, rejecting signs, blanks and separators.
pub(crate) fn parse_decimal(
    field: &'static str,
    raw: &str,
    max_digits: usize,
) -> Result<u64, ValidationError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() || !trimmed.bytes().all(|byte| byte.is_ascii_digit()) {
        return Err(ValidationError::NotNumeric {
            field,
            value: raw.to_string(),
        });
    }
    if trimmed.len() > max_digits {
        return Err(ValidationError::TooManyDigits {
            field,
            value: raw.to_string(),
            max_digits,
        });
    }

    trimmed
        .parse::<u64>()
        .map_err(|_| ValidationError::NotNumeric {
            field,
            value: raw.to_string(),
        })
}
