//! Per-transfer counters.

use std::ops::AddAssign;

/// Statistics for one transfer
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TransferStats {
    /// Files sent or written
    pub files: u64,

    /// File content bytes (frame overhead excluded)
    pub bytes: u64,

    /// Files whose stream closed mid-chunk and were kept partial
    pub truncated: u64,
}

impl TransferStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_file(&mut self, bytes: u64) {
        self.files += 1;
        self.bytes += bytes;
    }
}

impl AddAssign for TransferStats {
    fn add_assign(&mut self, other: Self) {
        self.files += other.files;
        self.bytes += other.bytes;
        self.truncated += other.truncated;
    }
}
