use std::time::Duration;

use crate::digest::DigestAlgorithm;

/// Hard upper bound on parallel downloads, whatever the caller asks for
pub const MAX_CONCURRENCY_CEILING: usize = 16;

/// Download engine configuration
#[derive(Debug, Clone)]
pub struct DownloadConfig {
    /// Workers used by [`crate::DownloadOrchestrator::run`]
    pub max_concurrency: usize,
    /// Largest slice written to the sink between progress events and
    /// cancellation checks
    pub chunk_size: usize,
    pub backoff_base: Duration,
    pub backoff_cap: Duration,
    pub digest: DigestAlgorithm,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            max_concurrency: 4,
            chunk_size: 64 * 1024,
            backoff_base: Duration::from_millis(500),
            backoff_cap: Duration::from_secs(30),
            digest: DigestAlgorithm::Sha1,
        }
    }
}

impl DownloadConfig {
    /// Delay before the attempt following retry number `retry_count`:
    /// `backoff_base * 2^retry_count`, capped at `backoff_cap`.
    pub fn backoff(&self, retry_count: u32) -> Duration {
        let factor = 1u32 << retry_count.min(16);
        self.backoff_base.saturating_mul(factor).min(self.backoff_cap)
    }

    /// Worker count actually used for a requested concurrency
    pub fn clamp_concurrency(requested: usize) -> usize {
        requested.clamp(1, MAX_CONCURRENCY_CEILING)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_doubles_and_caps() {
        let config = DownloadConfig::default();
        assert_eq!(config.backoff(0), Duration::from_millis(500));
        assert_eq!(config.backoff(1), Duration::from_secs(1));
        assert_eq!(config.backoff(2), Duration::from_secs(2));
        assert_eq!(config.backoff(10), Duration::from_secs(30));
        assert_eq!(config.backoff(u32::MAX), Duration::from_secs(30));
    }

    #[test]
    fn test_concurrency_is_clamped() {
        assert_eq!(DownloadConfig::clamp_concurrency(0), 1);
        assert_eq!(DownloadConfig::clamp_concurrency(4), 4);
        assert_eq!(DownloadConfig::clamp_concurrency(500), MAX_CONCURRENCY_CEILING);
    }
}
