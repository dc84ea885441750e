use std::io;
use std::path::Path;
use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, instrument, warn};

use crate::digest::DigestAlgorithm;
use crate::sink::ByteSink;
use crate::task::DownloadTask;

/// Why a file on disk does not match what was declared
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize)]
pub enum InvalidReason {
    /// Usually a truncated transfer
    #[error("size mismatch: expected {expected} bytes, found {actual}")]
    SizeMismatch { expected: u64, actual: u64 },

    /// Corruption or a stale mirror
    #[error("digest mismatch: expected {expected}, found {actual}")]
    DigestMismatch { expected: String, actual: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verification {
    Valid,
    Invalid(InvalidReason),
}

impl Verification {
    pub fn is_valid(&self) -> bool {
        matches!(self, Verification::Valid)
    }
}

/// Checks written files against their declared size and digest.
///
/// The digest is computed over the bytes read back from the sink, not the
/// bytes that went through the network stream, so a short or corrupt write
/// is caught as well.
#[derive(Clone)]
pub struct Verifier {
    sink: Arc<dyn ByteSink>,
    algorithm: DigestAlgorithm,
}

impl std::fmt::Debug for Verifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Verifier")
            .field("algorithm", &self.algorithm)
            .finish_non_exhaustive()
    }
}

impl Verifier {
    pub fn new(sink: Arc<dyn ByteSink>, algorithm: DigestAlgorithm) -> Self {
        Self { sink, algorithm }
    }

    pub fn algorithm(&self) -> DigestAlgorithm {
        self.algorithm
    }

    /// Compare the file at `save_path` with `declared_size` and
    /// `declared_digest`. Both must match; a size mismatch is reported in
    /// preference to a digest mismatch. An empty `declared_digest` checks
    /// the size only.
    #[instrument(skip(self), fields(algorithm = %self.algorithm))]
    pub async fn verify(
        &self,
        save_path: &Path,
        declared_size: u64,
        declared_digest: &str,
    ) -> io::Result<Verification> {
        let reader = self.sink.open_for_read(save_path).await?;
        let computed = self.algorithm.compute(reader).await?;

        if computed.len != declared_size {
            warn!(expected = declared_size, actual = computed.len, "Size mismatch");
            return Ok(Verification::Invalid(InvalidReason::SizeMismatch {
                expected: declared_size,
                actual: computed.len,
            }));
        }

        if !declared_digest.is_empty() && !computed.hex.eq_ignore_ascii_case(declared_digest) {
            warn!(expected = declared_digest, actual = %computed.hex, "Digest mismatch");
            return Ok(Verification::Invalid(InvalidReason::DigestMismatch {
                expected: declared_digest.to_ascii_lowercase(),
                actual: computed.hex,
            }));
        }

        debug!("File verified");
        Ok(Verification::Valid)
    }

    /// [`verify`](Self::verify) with the task's own declarations
    pub async fn verify_task(&self, task: &DownloadTask) -> io::Result<Verification> {
        self.verify(&task.save_path, task.declared_size, &task.declared_digest)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::FsSink;

    const HELLO_SHA1: &str = "f572d396fae9206628714fb2ce00f72e94f2258f";

    fn verifier() -> Verifier {
        Verifier::new(Arc::new(FsSink), DigestAlgorithm::Sha1)
    }

    #[tokio::test]
    async fn test_valid_file_and_reverify_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hello.txt");
        std::fs::write(&path, b"hello\n").unwrap();

        let verifier = verifier();
        for _ in 0..2 {
            assert_eq!(
                verifier.verify(&path, 6, HELLO_SHA1).await.unwrap(),
                Verification::Valid
            );
        }
    }

    #[tokio::test]
    async fn test_uppercase_declared_digest_matches() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hello.txt");
        std::fs::write(&path, b"hello\n").unwrap();

        let result = verifier()
            .verify(&path, 6, &HELLO_SHA1.to_ascii_uppercase())
            .await
            .unwrap();
        assert!(result.is_valid());
    }

    #[tokio::test]
    async fn test_size_mismatch_is_distinct_from_digest_mismatch() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hello.txt");
        std::fs::write(&path, b"hello\n").unwrap();

        let verifier = verifier();
        assert_eq!(
            verifier.verify(&path, 1024, HELLO_SHA1).await.unwrap(),
            Verification::Invalid(InvalidReason::SizeMismatch {
                expected: 1024,
                actual: 6
            })
        );

        let wrong = "0".repeat(40);
        assert!(matches!(
            verifier.verify(&path, 6, &wrong).await.unwrap(),
            Verification::Invalid(InvalidReason::DigestMismatch { .. })
        ));
    }

    #[tokio::test]
    async fn test_empty_digest_checks_size_only() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hello.txt");
        std::fs::write(&path, b"hello\n").unwrap();

        assert!(verifier().verify(&path, 6, "").await.unwrap().is_valid());
    }

    #[tokio::test]
    async fn test_missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(
            verifier()
                .verify(&dir.path().join("absent"), 0, "")
                .await
                .is_err()
        );
    }
}
