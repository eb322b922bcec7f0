// Hash algorithm identifiers
// Names, digest widths, and checksum file conventions per algorithm

use serde::Serialize;

/// Shortest digest text accepted by the checksum file parser.
/// Lines whose digest field is shorter than this are treated as noise.
pub const MIN_DIGEST_TEXT_LEN: usize = 8;

/// Identifier for a hash algorithm.
///
/// The enumeration covers every algorithm a checksum file may carry, including
/// ones the built-in hasher cannot compute (Tth, Aich); the format engine still
/// needs their digest widths to parse and round-trip legacy files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum Algorithm {
    Crc32,
    Md4,
    Md5,
    Sha1,
    Sha224,
    Sha256,
    Sha384,
    Sha512,
    Ripemd160,
    Whirlpool,
    Tiger,
    Ed2k,
    Tth,
    Aich,
}

impl Algorithm {
    /// All known algorithms, in stable declaration order.
    pub const ALL: [Algorithm; 14] = [
        Algorithm::Crc32,
        Algorithm::Md4,
        Algorithm::Md5,
        Algorithm::Sha1,
        Algorithm::Sha224,
        Algorithm::Sha256,
        Algorithm::Sha384,
        Algorithm::Sha512,
        Algorithm::Ripemd160,
        Algorithm::Whirlpool,
        Algorithm::Tiger,
        Algorithm::Ed2k,
        Algorithm::Tth,
        Algorithm::Aich,
    ];

    /// Canonical display name, as written in checksum file headers and type marks.
    pub fn name(&self) -> &'static str {
        match self {
            Algorithm::Crc32 => "CRC32",
            Algorithm::Md4 => "MD4",
            Algorithm::Md5 => "MD5",
            Algorithm::Sha1 => "SHA1",
            Algorithm::Sha224 => "SHA224",
            Algorithm::Sha256 => "SHA256",
            Algorithm::Sha384 => "SHA384",
            Algorithm::Sha512 => "SHA512",
            Algorithm::Ripemd160 => "RIPEMD160",
            Algorithm::Whirlpool => "WHIRLPOOL",
            Algorithm::Tiger => "TIGER",
            Algorithm::Ed2k => "ED2K",
            Algorithm::Tth => "TTH",
            Algorithm::Aich => "AICH",
        }
    }

    /// Fixed digest size in bytes.
    pub fn digest_size(&self) -> usize {
        match self {
            Algorithm::Crc32 => 4,
            Algorithm::Md4 | Algorithm::Md5 | Algorithm::Ed2k => 16,
            Algorithm::Sha1 | Algorithm::Ripemd160 | Algorithm::Aich => 20,
            Algorithm::Tiger | Algorithm::Tth => 24,
            Algorithm::Sha224 => 28,
            Algorithm::Sha256 => 32,
            Algorithm::Sha384 => 48,
            Algorithm::Sha512 | Algorithm::Whirlpool => 64,
        }
    }

    /// Favorable file extension for a checksum file of this algorithm.
    pub fn extension(&self) -> &'static str {
        match self {
            Algorithm::Crc32 => "sfv",
            Algorithm::Md4 => "md4",
            Algorithm::Md5 => "md5",
            Algorithm::Sha1 => "sha1",
            Algorithm::Sha256 => "sha256",
            Algorithm::Sha512 => "sha512",
            _ => "hash",
        }
    }

    /// Parse an algorithm from its name. Case-insensitive; tolerates the
    /// dashed spellings ("SHA-256", "ripemd-160") found in the wild.
    pub fn from_name(name: &str) -> Option<Algorithm> {
        let folded: String = name
            .chars()
            .filter(|c| *c != '-' && *c != '_')
            .collect::<String>()
            .to_uppercase();
        Algorithm::ALL.iter().copied().find(|a| a.name() == folded)
    }

    /// All algorithms whose digest width matches `len` bytes, in declaration
    /// order. Several widths are ambiguous (16 bytes fits MD4, MD5, and ED2K);
    /// callers disambiguate with type marks or an active-algorithm hint.
    pub fn detect(len: usize) -> Vec<Algorithm> {
        Algorithm::ALL
            .iter()
            .copied()
            .filter(|a| a.digest_size() == len)
            .collect()
    }
}

impl std::fmt::Display for Algorithm {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_name_accepts_dashed_spellings() {
        assert_eq!(Algorithm::from_name("sha-256"), Some(Algorithm::Sha256));
        assert_eq!(Algorithm::from_name("SHA256"), Some(Algorithm::Sha256));
        assert_eq!(Algorithm::from_name("ripemd-160"), Some(Algorithm::Ripemd160));
        assert_eq!(Algorithm::from_name("nonsense"), None);
    }

    #[test]
    fn detect_reports_ambiguous_widths_in_order() {
        assert_eq!(
            Algorithm::detect(16),
            vec![Algorithm::Md4, Algorithm::Md5, Algorithm::Ed2k]
        );
        assert_eq!(Algorithm::detect(4), vec![Algorithm::Crc32]);
        assert!(Algorithm::detect(17).is_empty());
    }
}
