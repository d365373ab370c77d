use base64::prelude::*;

/// Decoding failure for hex-encoded input.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InvalidHex {
    #[error("hex string has odd length ({0})")]
    OddLength(usize),

    #[error("invalid hex character {0:?} at offset {1}")]
    InvalidChar(char, usize),
}

pub(crate) fn base64url<T: ?Sized + AsRef<[u8]>>(input: &T) -> String {
    BASE64_URL_SAFE_NO_PAD.encode(input)
}

pub(crate) fn base64url_decode(input: &str) -> Result<Vec<u8>, base64::DecodeError> {
    BASE64_URL_SAFE_NO_PAD.decode(input)
}

pub(crate) fn hex_to_bytes(hex: &str) -> Result<Vec<u8>, InvalidHex> {
    if hex.len() % 2 != 0 {
        return Err(InvalidHex::OddLength(hex.len()));
    }

    let raw = hex.as_bytes();
    let mut bytes = Vec::with_capacity(raw.len() / 2);

    for i in (0..raw.len()).step_by(2) {
        let hi = hex_val(raw[i], i)?;
        let lo = hex_val(raw[i + 1], i + 1)?;
        bytes.push((hi << 4) | lo);
    }

    Ok(bytes)
}

fn hex_val(byte: u8, offset: usize) -> Result<u8, InvalidHex> {
    match byte {
        b'0'..=b'9' => Ok(byte - b'0'),
        b'a'..=b'f' => Ok(byte - b'a' + 10),
        b'A'..=b'F' => Ok(byte - b'A' + 10),
        _ => Err(InvalidHex::InvalidChar(byte as char, offset)),
    }
}

pub(crate) fn bytes_to_hex(bytes: &[u8]) -> String {
    bytes.iter().map(|byte| format!("{byte:02x}")).collect()
}

/// Path segment for renewal info lookups: `base64url(AKI) "." base64url(serial)`,
/// both supplied as hex.
pub(crate) fn renewal_identifier(aki_hex: &str, serial_hex: &str) -> Result<String, InvalidHex> {
    let aki = hex_to_bytes(aki_hex)?;
    let serial = hex_to_bytes(serial_hex)?;
    Ok(format!("{}.{}", base64url(&aki), base64url(&serial)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base64url_is_unpadded_and_url_safe() {
        // 0xfb 0xef 0xbe encodes to chars that standard base64 would emit as "++++"
        assert_eq!(base64url(&[0xfb, 0xef, 0xbe]), "----");
        assert_eq!(base64url(""), "");
        assert_eq!(base64url("f"), "Zg");
        assert!(!base64url("fo").contains('='));
    }

    #[test]
    fn base64url_round_trips() {
        let cases: &[&[u8]] = &[b"", b"f", b"fo", b"foo", &[0xfb, 0xef, 0xbe], &[0xff; 33]];
        for &bytes in cases {
            assert_eq!(base64url_decode(&base64url(bytes)).unwrap(), bytes);
        }
    }

    #[test]
    fn hex_round_trips_lowercased() {
        for hex in ["", "00", "abcdef0123", "ABCDEF0123"] {
            let bytes = hex_to_bytes(hex).unwrap();
            assert_eq!(bytes_to_hex(&bytes), hex.to_lowercase());
        }
    }

    #[test]
    fn hex_rejects_odd_length() {
        assert_eq!(hex_to_bytes("abc"), Err(InvalidHex::OddLength(3)));
    }

    #[test]
    fn hex_rejects_non_hex_chars() {
        assert_eq!(hex_to_bytes("zz"), Err(InvalidHex::InvalidChar('z', 0)));
        assert_eq!(hex_to_bytes("a-"), Err(InvalidHex::InvalidChar('-', 1)));
    }

    #[test]
    fn renewal_identifier_encodes_both_parts() {
        assert_eq!(renewal_identifier("abcd", "0102").unwrap(), "q80.AQI");
        assert!(renewal_identifier("abc", "0102").is_err());
    }
}
