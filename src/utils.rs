use crate::error::ArgumentError;

/// Formats bytes as uppercase hexadecimal pairs separated by spaces.
pub(crate) fn format_hex(bytes: &[u8]) -> String {
    if bytes.is_empty() {
        return "<empty>".to_string();
    }

    bytes
        .iter()
        .map(|value| format!("{value:02X}"))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Decodes a contiguous hexadecimal string such as `0102AA`.
pub(crate) fn parse_hex(value: &str) -> Result<Vec<u8>, ArgumentError> {
    Ok(hex::decode(value.trim())?)
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    use super::*;

    #[test]
    fn format_hex_handles_empty_payload() {
        assert_eq!("<empty>", format_hex(&[]));
    }

    #[test]
    fn format_hex_formats_uppercase_pairs() {
        assert_eq!("05 00 A1 FF", format_hex(&[0x05, 0x00, 0xA1, 0xFF]));
    }

    #[rstest]
    #[case("0102AA", vec![0x01, 0x02, 0xAA])]
    #[case("deadBEEF", vec![0xDE, 0xAD, 0xBE, 0xEF])]
    #[case("", vec![])]
    fn parse_hex_decodes_pairs(#[case] raw: &str, #[case] expected: Vec<u8>) {
        assert_eq!(expected, parse_hex(raw).expect("hex should decode"));
    }

    #[test]
    fn parse_hex_rejects_odd_length() {
        assert_matches!(parse_hex("ABC"), Err(ArgumentError::InvalidHexLength));
    }

    #[test]
    fn parse_hex_rejects_non_hex() {
        assert_matches!(
            parse_hex("01ZZ"),
            Err(ArgumentError::InvalidHexByte { value: 'Z' })
        );
    }
}
