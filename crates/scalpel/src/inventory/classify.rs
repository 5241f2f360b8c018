//! Reduce one camera's file sizes to a status code and a size in MB.

use scalpel_db::StatusCode;
use serde::Serialize;

/// Decimal megabyte.
pub const BYTES_PER_MB: u64 = 1_000_000;
pub const DEFAULT_THRESHOLD_MB: u64 = 200;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Classification {
    pub status: StatusCode,
    /// `floor(sum(sizes) / 1_000_000)`
    pub size_mb: u64,
}

pub fn threshold_bytes(threshold_mb: u64) -> u64 {
    threshold_mb.saturating_mul(BYTES_PER_MB)
}

/// Complete if any file reaches the threshold, Incomplete if files exist but
/// all are smaller, Missing if there are none.
pub fn classify(sizes: &[u64], threshold_bytes: u64) -> Classification {
    let status = if sizes.is_empty() {
        StatusCode::Missing
    } else if sizes.iter().any(|&s| s >= threshold_bytes) {
        StatusCode::Complete
    } else {
        StatusCode::Incomplete
    };

    let total: u128 = sizes.iter().map(|&s| u128::from(s)).sum();
    let size_mb = u64::try_from(total / u128::from(BYTES_PER_MB)).unwrap_or(u64::MAX);

    Classification { status, size_mb }
}
