use base64::engine::general_purpose::{STANDARD, STANDARD_NO_PAD};
use base64::Engine;

/// Base64-encode `data` using the standard alphabet with `=` padding.
#[must_use]
pub fn encode(data: &[u8]) -> String {
    STANDARD.encode(data)
}

/// Decode a base64-encoded field payload.
///
/// Per the wire format, decoding terminates at the first `=` pad
/// character — everything from that point on is ignored rather than
/// validated. The output length is therefore a function of the
/// *unpadded* prefix length: `floor(prefix_len * 3 / 4)` bytes.
///
/// Malformed input (characters outside the base64 alphabet before the
/// first `=`) yields an empty result rather than panicking; callers that
/// need to distinguish malformed input from an intentionally empty blob
/// should validate the field before calling this.
#[must_use]
pub fn decode(encoded: &str) -> Vec<u8> {
    let end = encoded.as_bytes().iter().position(|&b| b == b'=').unwrap_or(encoded.len());
    STANDARD_NO_PAD.decode(&encoded.as_bytes()[..end]).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_arbitrary_byte_sequences() {
        for len in 0..40 {
            let data: Vec<u8> = (0..len).map(|i| (i * 7 + 3) as u8).collect();
            let encoded = encode(&data);
            assert_eq!(decode(&encoded), data, "len={len}");
        }
    }

    #[test]
    fn hello_world_example() {
        let data = b"Hello";
        let encoded = encode(data);
        assert_eq!(encoded, "SGVsbG8=");
        assert_eq!(decode(&encoded), data);
        assert_eq!(decode(&encoded).len(), 5);
    }

    #[test]
    fn decode_terminates_at_first_pad() {
        // Trailing garbage after the pad character must be ignored.
        assert_eq!(decode("SGVsbG8=garbage"), b"Hello");
    }
}
