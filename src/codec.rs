// src/codec.rs
//
// Base64 for cover image chunks. The companion app emits standard RFC 4648
// alphabet with padding, but some firmwares inject line breaks and the odd
// corrupted pair mid-stream, so the decoder is deliberately lenient: it strips
// whitespace and skips an unrecognizable quad instead of failing the whole
// chunk. A registry codec would reject those inputs outright.

const ALPHABET: &[u8; 64] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789+/";

const INVALID: u8 = 0xff;

/// Reverse lookup for the standard alphabet; 0xff marks invalid bytes.
const fn build_reverse_table() -> [u8; 256] {
    let mut table = [INVALID; 256];
    let mut i = 0;
    while i < 64 {
        table[ALPHABET[i] as usize] = i as u8;
        i += 1;
    }
    table
}

const REVERSE: [u8; 256] = build_reverse_table();

/// Decode base64, tolerating whitespace and skipping invalid quads.
///
/// Trailing `=` padding (0, 1 or 2 characters) determines the expected output
/// length; a quad whose first two characters are unrecognized contributes
/// nothing. Output never exceeds the length implied by the input.
pub fn decode_base64(input: &str) -> Vec<u8> {
    let cleaned: Vec<u8> = input
        .bytes()
        .filter(|b| !b.is_ascii_whitespace())
        .collect();
    let len = cleaned.len();
    if len == 0 {
        return Vec::new();
    }

    let mut padding = 0usize;
    if cleaned[len - 1] == b'=' {
        padding += 1;
    }
    if len >= 2 && cleaned[len - 2] == b'=' {
        padding += 1;
    }

    let capacity = (len * 3 / 4).saturating_sub(padding);
    let mut out = Vec::with_capacity(capacity);

    let mut i = 0;
    while i < len {
        let quad = &cleaned[i..(i + 4).min(len)];
        i += 4;

        let e1 = quad.first().map_or(INVALID, |&b| REVERSE[b as usize]);
        let e2 = quad.get(1).map_or(INVALID, |&b| REVERSE[b as usize]);
        if e1 == INVALID || e2 == INVALID {
            // Unrecognizable pair: skip the quad, keep decoding.
            continue;
        }
        let e3 = quad.get(2).map_or(INVALID, |&b| REVERSE[b as usize]);
        let e4 = quad.get(3).map_or(INVALID, |&b| REVERSE[b as usize]);

        if out.len() < capacity {
            out.push((e1 << 2) | (e2 >> 4));
        }
        if e3 != INVALID && out.len() < capacity {
            out.push(((e2 & 0x0f) << 4) | (e3 >> 2));
        }
        if e4 != INVALID && out.len() < capacity {
            out.push(((e3 & 0x03) << 6) | (e4 & 0x3f));
        }
    }

    out
}

/// Encode bytes as standard padded base64.
pub fn encode_base64(input: &[u8]) -> String {
    let mut out = String::with_capacity(input.len().div_ceil(3) * 4);
    for chunk in input.chunks(3) {
        let b0 = chunk[0] as u32;
        let b1 = chunk.get(1).copied().unwrap_or(0) as u32;
        let b2 = chunk.get(2).copied().unwrap_or(0) as u32;
        let triple = (b0 << 16) | (b1 << 8) | b2;

        out.push(ALPHABET[(triple >> 18) as usize & 0x3f] as char);
        out.push(ALPHABET[(triple >> 12) as usize & 0x3f] as char);
        out.push(if chunk.len() > 1 {
            ALPHABET[(triple >> 6) as usize & 0x3f] as char
        } else {
            '='
        });
        out.push(if chunk.len() > 2 {
            ALPHABET[triple as usize & 0x3f] as char
        } else {
            '='
        });
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_padding_variants() {
        // Lengths 0..=3 cover every mod-4 padding shape.
        for payload in [&b""[..], b"f", b"fo", b"foo"] {
            let encoded = encode_base64(payload);
            assert_eq!(decode_base64(&encoded), payload);
        }
    }

    #[test]
    fn round_trip_binary() {
        let bytes: Vec<u8> = (0u8..=255).collect();
        assert_eq!(decode_base64(&encode_base64(&bytes)), bytes);
    }

    #[test]
    fn known_vectors() {
        assert_eq!(encode_base64(b"foobar"), "Zm9vYmFy");
        assert_eq!(decode_base64("Zm9vYmE="), b"fooba");
        assert_eq!(decode_base64("Zm8="), b"fo");
    }

    #[test]
    fn whitespace_is_ignored() {
        assert_eq!(decode_base64("Zm9v\r\nYmFy"), b"foobar");
        assert_eq!(decode_base64("  Z m 9 v "), b"foo");
    }

    #[test]
    fn invalid_quad_is_skipped_not_fatal() {
        // Middle quad is garbage; surrounding quads still decode.
        let decoded = decode_base64("Zm9v!!!!YmFy");
        assert_eq!(&decoded[..3], b"foo");
        assert_eq!(&decoded[3..6], b"bar");
    }

    #[test]
    fn empty_input() {
        assert!(decode_base64("").is_empty());
        assert!(decode_base64("\n\n").is_empty());
    }
}
