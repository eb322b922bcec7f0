// Digest text codec module
// Encodes and decodes raw digest bytes per RFC 4648, independent of algorithm

use data_encoding::{BASE32, BASE32HEX, BASE64, BASE64URL, HEXLOWER, HEXLOWER_PERMISSIVE, HEXUPPER};

use crate::algorithm::Algorithm;
use crate::error::HashKeepError;

/// Text encoding scheme for digest bytes.
///
/// Base16 case is a property of encoding only; decoding hex is always
/// case-insensitive. The other four schemes follow RFC 4648 padding exactly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub enum DigestEncoding {
    Base16,
    Base16Lower,
    Base32,
    Base32Hex,
    Base64,
    Base64Url,
}

impl DigestEncoding {
    /// All encodings in detection probe order.
    pub const ALL: [DigestEncoding; 6] = [
        DigestEncoding::Base16,
        DigestEncoding::Base16Lower,
        DigestEncoding::Base32,
        DigestEncoding::Base32Hex,
        DigestEncoding::Base64,
        DigestEncoding::Base64Url,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            DigestEncoding::Base16 | DigestEncoding::Base16Lower => "Base16",
            DigestEncoding::Base32 => "Base32",
            DigestEncoding::Base32Hex => "Base32HEX",
            DigestEncoding::Base64 => "Base64",
            DigestEncoding::Base64Url => "Base64URL",
        }
    }

    /// Parse an encoding name as given on the command line.
    pub fn from_name(name: &str) -> Option<DigestEncoding> {
        match name.to_lowercase().as_str() {
            "base16" | "hex" => Some(DigestEncoding::Base16Lower),
            "base16upper" | "hexupper" => Some(DigestEncoding::Base16),
            "base32" => Some(DigestEncoding::Base32),
            "base32hex" => Some(DigestEncoding::Base32Hex),
            "base64" => Some(DigestEncoding::Base64),
            "base64url" => Some(DigestEncoding::Base64Url),
            _ => None,
        }
    }

    /// Alphabet used by this encoding, padding excluded.
    fn alphabet(&self) -> &'static str {
        match self {
            DigestEncoding::Base16 => "0123456789ABCDEF",
            DigestEncoding::Base16Lower => "0123456789abcdef",
            DigestEncoding::Base32 => "ABCDEFGHIJKLMNOPQRSTUVWXYZ234567",
            DigestEncoding::Base32Hex => "0123456789ABCDEFGHIJKLMNOPQRSTUV",
            DigestEncoding::Base64 => {
                "ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789+/"
            }
            DigestEncoding::Base64Url => {
                "ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789-_"
            }
        }
    }

    /// Encode raw digest bytes to text.
    pub fn encode(&self, bytes: &[u8]) -> String {
        match self {
            DigestEncoding::Base16 => HEXUPPER.encode(bytes),
            DigestEncoding::Base16Lower => HEXLOWER.encode(bytes),
            DigestEncoding::Base32 => BASE32.encode(bytes),
            DigestEncoding::Base32Hex => BASE32HEX.encode(bytes),
            DigestEncoding::Base64 => BASE64.encode(bytes),
            DigestEncoding::Base64Url => BASE64URL.encode(bytes),
        }
    }

    /// Decode digest text to raw bytes. Fails on characters outside the
    /// alphabet or wrong padding. Hex decoding accepts either case.
    pub fn decode(&self, text: &str) -> Result<Vec<u8>, HashKeepError> {
        let result = match self {
            DigestEncoding::Base16 | DigestEncoding::Base16Lower => {
                HEXLOWER_PERMISSIVE.decode(text.as_bytes())
            }
            DigestEncoding::Base32 => BASE32.decode(text.as_bytes()),
            DigestEncoding::Base32Hex => BASE32HEX.decode(text.as_bytes()),
            DigestEncoding::Base64 => BASE64.decode(text.as_bytes()),
            DigestEncoding::Base64Url => BASE64URL.decode(text.as_bytes()),
        };
        result.map_err(|e| HashKeepError::MalformedDigestText {
            text: text.to_string(),
            reason: e.to_string(),
        })
    }

    /// Decode digest text and enforce the fixed digest width of `algorithm`.
    pub fn decode_digest(&self, text: &str, algorithm: Algorithm) -> Result<Vec<u8>, HashKeepError> {
        let bytes = self.decode(text)?;
        if bytes.len() != algorithm.digest_size() {
            return Err(HashKeepError::MalformedDigestText {
                text: text.to_string(),
                reason: format!(
                    "decoded to {} bytes, {} expects {}",
                    bytes.len(),
                    algorithm.name(),
                    algorithm.digest_size()
                ),
            });
        }
        Ok(bytes)
    }

    /// Probe all encodings for one whose alphabet fits `text` and whose decoded
    /// output is `width` bytes. Returns the first match in probe order.
    pub fn detect(text: &str, width: usize) -> Option<DigestEncoding> {
        for encoding in DigestEncoding::ALL {
            let alphabet = encoding.alphabet();
            let fits = text.chars().all(|c| c == '=' || alphabet.contains(c));
            if !fits {
                continue;
            }
            if let Ok(bytes) = encoding.decode(text) {
                if bytes.len() == width {
                    return Some(encoding);
                }
            }
        }
        None
    }
}

impl Default for DigestEncoding {
    fn default() -> Self {
        DigestEncoding::Base16Lower
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // RFC 4648 test vectors
    const INPUTS: [&[u8]; 7] = [b"", b"f", b"fo", b"foo", b"foob", b"fooba", b"foobar"];

    #[test]
    fn base32_matches_rfc_vectors() {
        let expected = ["", "MY======", "MZXQ====", "MZXW6===", "MZXW6YQ=", "MZXW6YTB", "MZXW6YTBOI======"];
        for (input, want) in INPUTS.iter().zip(expected) {
            assert_eq!(DigestEncoding::Base32.encode(input), want);
        }
    }

    #[test]
    fn base64_matches_rfc_vectors() {
        let expected = ["", "Zg==", "Zm8=", "Zm9v", "Zm9vYg==", "Zm9vYmE=", "Zm9vYmFy"];
        for (input, want) in INPUTS.iter().zip(expected) {
            assert_eq!(DigestEncoding::Base64.encode(input), want);
        }
    }

    #[test]
    fn hex_decode_is_case_insensitive() {
        let upper = DigestEncoding::Base16.decode("DEADBEEF").unwrap();
        let lower = DigestEncoding::Base16.decode("deadbeef").unwrap();
        assert_eq!(upper, lower);
        assert_eq!(upper, vec![0xde, 0xad, 0xbe, 0xef]);
    }

    #[test]
    fn decode_rejects_bad_alphabet_and_padding() {
        assert!(DigestEncoding::Base16.decode("zz").is_err());
        assert!(DigestEncoding::Base32.decode("MY=====").is_err());
        assert!(DigestEncoding::Base64.decode("Zg=").is_err());
    }

    #[test]
    fn decode_digest_enforces_width() {
        let text = DigestEncoding::Base16Lower.encode(&[0u8; 16]);
        assert!(DigestEncoding::Base16Lower
            .decode_digest(&text, Algorithm::Md5)
            .is_ok());
        assert!(DigestEncoding::Base16Lower
            .decode_digest(&text, Algorithm::Sha1)
            .is_err());
    }

    #[test]
    fn detect_finds_matching_scheme() {
        let digest = [7u8; 20];
        for encoding in DigestEncoding::ALL {
            let text = encoding.encode(&digest);
            let found = DigestEncoding::detect(&text, 20).unwrap();
            assert_eq!(found.decode(&text).unwrap(), digest);
        }
        assert_eq!(DigestEncoding::detect("not a digest!", 20), None);
    }
}
