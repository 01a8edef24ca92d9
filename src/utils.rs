/// Formats bytes as uppercase hexadecimal pairs separated by spaces.
pub(crate) fn format_hex(bytes: &[u8]) -> String {
    if bytes.is_empty() {
        return "<empty>".to_string();
    }

    bytes
        .iter()
        .map(|value| hex::encode_upper([*value]))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Parses whitespace-tolerant hexadecimal text into bytes.
pub(crate) fn parse_hex(raw_value: &str) -> Result<Vec<u8>, hex::FromHexError> {
    let cleaned: String = raw_value.chars().filter(|c| !c.is_whitespace()).collect();
    hex::decode(cleaned)
}

/// Formats an optional RSSI for terminal output.
pub(crate) fn format_rssi(rssi: Option<i16>) -> String {
    match rssi {
        Some(value) => value.to_string(),
        None => "-".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn format_hex_handles_empty_payload() {
        assert_eq!("<empty>", format_hex(&[]));
    }

    #[test]
    fn format_hex_formats_uppercase_pairs() {
        assert_eq!("AA 55 10 FF", format_hex(&[0xAA, 0x55, 0x10, 0xFF]));
    }

    #[test]
    fn parse_hex_ignores_whitespace() {
        assert_eq!(vec![0xAA, 0x55, 0x01], parse_hex("AA 55\t01").unwrap_or_default());
    }

    #[test]
    fn parse_hex_rejects_odd_length() {
        assert_matches!(parse_hex("ABC"), Err(hex::FromHexError::OddLength));
    }

    #[test]
    fn format_rssi_handles_unknown() {
        assert_eq!("-", format_rssi(None));
    }
}
