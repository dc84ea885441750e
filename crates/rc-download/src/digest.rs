//! Content digests used to verify downloaded files.

use std::fmt;
use std::io;

use serde::{Deserialize, Serialize};
use sha1::Sha1;
use sha2::{Digest, Sha256};
use tokio::io::{AsyncRead, AsyncReadExt};

const BUF_SIZE: usize = 64 * 1024;

/// Hash algorithm of the declared digests, fixed per deployment
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DigestAlgorithm {
    /// What Mojang's version and asset manifests declare
    #[default]
    Sha1,
    Sha256,
}

impl fmt::Display for DigestAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DigestAlgorithm::Sha1 => f.write_str("sha1"),
            DigestAlgorithm::Sha256 => f.write_str("sha256"),
        }
    }
}

enum Hasher {
    Sha1(Sha1),
    Sha256(Sha256),
}

impl Hasher {
    fn update(&mut self, data: &[u8]) {
        match self {
            Hasher::Sha1(h) => h.update(data),
            Hasher::Sha256(h) => h.update(data),
        }
    }

    fn finalize_hex(self) -> String {
        match self {
            Hasher::Sha1(h) => hex::encode(h.finalize()),
            Hasher::Sha256(h) => hex::encode(h.finalize()),
        }
    }
}

/// Lowercase hex digest of a stream plus the number of bytes it held
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComputedDigest {
    pub hex: String,
    pub len: u64,
}

impl DigestAlgorithm {
    fn hasher(self) -> Hasher {
        match self {
            DigestAlgorithm::Sha1 => Hasher::Sha1(Sha1::new()),
            DigestAlgorithm::Sha256 => Hasher::Sha256(Sha256::new()),
        }
    }

    /// Length in hex characters of a digest produced by this algorithm
    pub fn hex_len(self) -> usize {
        match self {
            DigestAlgorithm::Sha1 => 40,
            DigestAlgorithm::Sha256 => 64,
        }
    }

    /// Digest of everything `reader` yields, read in bounded chunks
    pub async fn compute<R>(self, mut reader: R) -> io::Result<ComputedDigest>
    where
        R: AsyncRead + Unpin,
    {
        let mut hasher = self.hasher();
        let mut buf = vec![0u8; BUF_SIZE];
        let mut len = 0u64;
        loop {
            let n = reader.read(&mut buf).await?;
            if n == 0 {
                break;
            }
            hasher.update(&buf[..n]);
            len += n as u64;
        }
        Ok(ComputedDigest {
            hex: hasher.finalize_hex(),
            len,
        })
    }

    /// Digest of an in-memory buffer
    pub fn digest_bytes(self, data: &[u8]) -> String {
        let mut hasher = self.hasher();
        hasher.update(data);
        hasher.finalize_hex()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_sha1_known_content() {
        let digest = DigestAlgorithm::Sha1.compute(&b"hello\n"[..]).await.unwrap();
        assert_eq!(digest.hex, "f572d396fae9206628714fb2ce00f72e94f2258f");
        assert_eq!(digest.len, 6);
    }

    #[tokio::test]
    async fn test_sha256_empty() {
        let digest = DigestAlgorithm::Sha256.compute(&b""[..]).await.unwrap();
        assert_eq!(
            digest.hex,
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
        assert_eq!(digest.len, 0);
    }

    #[test]
    fn test_digest_bytes_matches_hex_len() {
        for algorithm in [DigestAlgorithm::Sha1, DigestAlgorithm::Sha256] {
            assert_eq!(algorithm.digest_bytes(b"abc").len(), algorithm.hex_len());
        }
    }
}
