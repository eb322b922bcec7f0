// Hash computation module
// Streaming hasher backends and file digest computation

use std::fs::File;
use std::io::Read;
use std::path::Path;

use md5::Digest;
use memmap2::Mmap;

use crate::algorithm::Algorithm;
use crate::error::HashKeepError;
use crate::record::DigestValue;

// Files below this size are memory mapped instead of read through a buffer
const MMAP_THRESHOLD: u64 = 2 * 1024 * 1024 * 1024; // 2GB

// ED2K hashes files in fixed parts, MD4 per part
const ED2K_PART_SIZE: usize = 9_728_000;

/// Trait for streaming hash backends
pub trait Hasher: Send {
    /// Update the hasher with new data
    fn update(&mut self, data: &[u8]);

    /// Finalize the hash and return the raw digest bytes
    fn finalize(self: Box<Self>) -> Vec<u8>;
}

// Generic wrapper over the RustCrypto digest trait; covers MD4, MD5, the SHA
// family, RIPEMD-160, Whirlpool, and Tiger
struct DigestHasher<D: Digest>(D);

impl<D: Digest + Send> Hasher for DigestHasher<D> {
    fn update(&mut self, data: &[u8]) {
        Digest::update(&mut self.0, data);
    }

    fn finalize(self: Box<Self>) -> Vec<u8> {
        Digest::finalize(self.0).to_vec()
    }
}

// CRC32 wrapper; SFV files render the checksum big-endian
struct Crc32Hasher(crc32fast::Hasher);

impl Hasher for Crc32Hasher {
    fn update(&mut self, data: &[u8]) {
        self.0.update(data);
    }

    fn finalize(self: Box<Self>) -> Vec<u8> {
        self.0.finalize().to_be_bytes().to_vec()
    }
}

// ED2K: MD4 over 9,728,000-byte parts; a file spanning more than one part
// hashes to MD4 of the concatenated part digests, a single-part file hashes
// to the part digest itself
struct Ed2kHasher {
    part: md4::Md4,
    part_len: usize,
    part_digests: Vec<u8>,
}

impl Ed2kHasher {
    fn new() -> Self {
        Self {
            part: md4::Md4::new(),
            part_len: 0,
            part_digests: Vec::new(),
        }
    }

    fn close_part(&mut self) {
        let done = std::mem::replace(&mut self.part, md4::Md4::new());
        self.part_digests.extend_from_slice(&Digest::finalize(done));
        self.part_len = 0;
    }
}

impl Hasher for Ed2kHasher {
    fn update(&mut self, mut data: &[u8]) {
        while !data.is_empty() {
            let room = ED2K_PART_SIZE - self.part_len;
            let take = room.min(data.len());
            Digest::update(&mut self.part, &data[..take]);
            self.part_len += take;
            data = &data[take..];
            if self.part_len == ED2K_PART_SIZE {
                self.close_part();
            }
        }
    }

    fn finalize(mut self: Box<Self>) -> Vec<u8> {
        if self.part_digests.is_empty() {
            // single part, covers the empty file too
            return Digest::finalize(self.part).to_vec();
        }
        if self.part_len > 0 {
            self.close_part();
        }
        let mut outer = md4::Md4::new();
        Digest::update(&mut outer, &self.part_digests);
        Digest::finalize(outer).to_vec()
    }
}

/// Get a streaming hasher for the given algorithm.
///
/// TTH and AICH are parse-only: checksum files carrying them round-trip, but
/// there is no backend to compute fresh digests.
pub fn make_hasher(algorithm: Algorithm) -> Result<Box<dyn Hasher>, HashKeepError> {
    match algorithm {
        Algorithm::Crc32 => Ok(Box::new(Crc32Hasher(crc32fast::Hasher::new()))),
        Algorithm::Md4 => Ok(Box::new(DigestHasher(md4::Md4::new()))),
        Algorithm::Md5 => Ok(Box::new(DigestHasher(md5::Md5::new()))),
        Algorithm::Sha1 => Ok(Box::new(DigestHasher(sha1::Sha1::new()))),
        Algorithm::Sha224 => Ok(Box::new(DigestHasher(sha2::Sha224::new()))),
        Algorithm::Sha256 => Ok(Box::new(DigestHasher(sha2::Sha256::new()))),
        Algorithm::Sha384 => Ok(Box::new(DigestHasher(sha2::Sha384::new()))),
        Algorithm::Sha512 => Ok(Box::new(DigestHasher(sha2::Sha512::new()))),
        Algorithm::Ripemd160 => Ok(Box::new(DigestHasher(ripemd::Ripemd160::new()))),
        Algorithm::Whirlpool => Ok(Box::new(DigestHasher(whirlpool::Whirlpool::new()))),
        Algorithm::Tiger => Ok(Box::new(DigestHasher(tiger::Tiger::new()))),
        Algorithm::Ed2k => Ok(Box::new(Ed2kHasher::new())),
        Algorithm::Tth | Algorithm::Aich => Err(HashKeepError::UnsupportedAlgorithm {
            algorithm: algorithm.name().to_string(),
        }),
    }
}

/// True if fresh digests can be computed for this algorithm.
pub fn is_computable(algorithm: Algorithm) -> bool {
    !matches!(algorithm, Algorithm::Tth | Algorithm::Aich)
}

/// File digest computation with streaming I/O.
///
/// Files below 2GB are memory mapped to skip the copy through a read buffer;
/// larger files and mmap failures fall back to buffered reads.
pub struct FileHasher {
    buffer_size: usize,
}

impl FileHasher {
    /// Default 1MB read buffer
    pub fn new() -> Self {
        Self {
            buffer_size: 1024 * 1024,
        }
    }

    pub fn with_buffer_size(buffer_size: usize) -> Self {
        Self { buffer_size }
    }

    /// Compute one digest over an in-memory buffer.
    pub fn compute_bytes(
        &self,
        data: &[u8],
        algorithm: Algorithm,
    ) -> Result<DigestValue, HashKeepError> {
        let mut hasher = make_hasher(algorithm)?;
        hasher.update(data);
        Ok(DigestValue::new(algorithm, hasher.finalize()))
    }

    /// Compute one digest for a file.
    pub fn compute(&self, path: &Path, algorithm: Algorithm) -> Result<DigestValue, HashKeepError> {
        let mut digests = self.compute_many(path, &[algorithm])?;
        Ok(digests.remove(0))
    }

    /// Compute several digests for a file in a single read pass.
    pub fn compute_many(
        &self,
        path: &Path,
        algorithms: &[Algorithm],
    ) -> Result<Vec<DigestValue>, HashKeepError> {
        let mut hashers: Vec<(Algorithm, Box<dyn Hasher>)> = Vec::with_capacity(algorithms.len());
        for &algorithm in algorithms {
            hashers.push((algorithm, make_hasher(algorithm)?));
        }

        let file = File::open(path).map_err(|e| {
            HashKeepError::from_io_error(e, "reading", Some(path.to_path_buf()))
        })?;
        let file_size = file
            .metadata()
            .map_err(|e| {
                HashKeepError::from_io_error(e, "reading metadata", Some(path.to_path_buf()))
            })?
            .len();

        if file_size > 0 && file_size < MMAP_THRESHOLD {
            match unsafe { Mmap::map(&file) } {
                Ok(mmap) => {
                    for (_, hasher) in &mut hashers {
                        hasher.update(&mmap[..]);
                    }
                }
                Err(_) => self.hash_buffered(&mut hashers, file, path)?,
            }
        } else {
            self.hash_buffered(&mut hashers, file, path)?;
        }

        Ok(hashers
            .into_iter()
            .map(|(algorithm, hasher)| DigestValue::new(algorithm, hasher.finalize()))
            .collect())
    }

    fn hash_buffered(
        &self,
        hashers: &mut [(Algorithm, Box<dyn Hasher>)],
        mut file: File,
        path: &Path,
    ) -> Result<(), HashKeepError> {
        let mut buffer = vec![0u8; self.buffer_size];
        loop {
            let bytes_read = file.read(&mut buffer).map_err(|e| {
                HashKeepError::from_io_error(e, "reading", Some(path.to_path_buf()))
            })?;
            if bytes_read == 0 {
                break;
            }
            for (_, hasher) in hashers.iter_mut() {
                hasher.update(&buffer[..bytes_read]);
            }
        }
        Ok(())
    }
}

impl Default for FileHasher {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hex_of(data: &[u8], algorithm: Algorithm) -> String {
        FileHasher::new()
            .compute_bytes(data, algorithm)
            .unwrap()
            .to_hex()
    }

    #[test]
    fn known_test_vectors() {
        assert_eq!(hex_of(b"abc", Algorithm::Md4), "a448017aaf21d8525fc10ae87aa6729d");
        assert_eq!(hex_of(b"abc", Algorithm::Md5), "900150983cd24fb0d6963f7d28e17f72");
        assert_eq!(
            hex_of(b"abc", Algorithm::Sha1),
            "a9993e364706816aba3e25717850c26c9cd0d89d"
        );
        assert_eq!(
            hex_of(b"abc", Algorithm::Sha256),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
        assert_eq!(
            hex_of(b"abc", Algorithm::Ripemd160),
            "8eb208f7e05d987a9b044a8e98c6b087f15a0bfc"
        );
    }

    #[test]
    fn crc32_is_big_endian() {
        // standard CRC-32 check value
        assert_eq!(hex_of(b"123456789", Algorithm::Crc32), "cbf43926");
    }

    #[test]
    fn digest_widths_match_declarations() {
        for algorithm in Algorithm::ALL {
            if !is_computable(algorithm) {
                continue;
            }
            let digest = FileHasher::new().compute_bytes(b"x", algorithm).unwrap();
            assert_eq!(digest.bytes.len(), algorithm.digest_size(), "{}", algorithm);
        }
    }

    #[test]
    fn ed2k_single_part_equals_md4() {
        let data = b"under one part";
        assert_eq!(hex_of(data, Algorithm::Ed2k), hex_of(data, Algorithm::Md4));
    }

    #[test]
    fn ed2k_multi_part_differs_from_plain_md4() {
        let data = vec![0xabu8; super::ED2K_PART_SIZE + 1];
        let ed2k = hex_of(&data, Algorithm::Ed2k);
        assert_ne!(ed2k, hex_of(&data, Algorithm::Md4));
        // streaming in chunks gives the same result
        let mut hasher = make_hasher(Algorithm::Ed2k).unwrap();
        for chunk in data.chunks(100_000) {
            hasher.update(chunk);
        }
        let streamed = DigestValue::new(Algorithm::Ed2k, hasher.finalize());
        assert_eq!(streamed.to_hex(), ed2k);
    }

    #[test]
    fn parse_only_algorithms_are_rejected() {
        assert!(make_hasher(Algorithm::Tth).is_err());
        assert!(make_hasher(Algorithm::Aich).is_err());
        assert!(!is_computable(Algorithm::Aich));
        assert!(is_computable(Algorithm::Sha512));
    }

    #[test]
    fn compute_many_single_pass_matches_individual() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.bin");
        std::fs::write(&path, b"hello hasher").unwrap();

        let hasher = FileHasher::new();
        let many = hasher
            .compute_many(&path, &[Algorithm::Md5, Algorithm::Sha1])
            .unwrap();
        assert_eq!(many[0], hasher.compute(&path, Algorithm::Md5).unwrap());
        assert_eq!(many[1], hasher.compute(&path, Algorithm::Sha1).unwrap());
    }

    #[test]
    fn missing_file_is_inaccessible() {
        let err = FileHasher::new()
            .compute(Path::new("/no/such/file"), Algorithm::Md5)
            .unwrap_err();
        assert!(matches!(err, HashKeepError::FileInaccessible { .. }));
    }
}
