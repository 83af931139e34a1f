//! Run progress reporting.
//!
//! A record pass reports through [`RunProgress`]: the expected record
//! count up front, one tick per record, the running counters after each
//! batch, and a closing line. The CLI renders these on a terminal bar
//! and prints every batch's counters to stdout; library callers and tests
//! get [`NoProgress`] unless they attach their own.

use std::sync::Arc;

use crate::report::BatchTally;

/// Receives progress from a resolve, audit or improve pass.
pub trait RunProgress: Send + Sync {
    /// Number of records the pass expects to visit.
    fn start(&self, total: u64);

    /// `records` more records visited.
    fn advance(&self, records: u64);

    /// Running counters after a batch has been written.
    fn batch(&self, tally: &BatchTally);

    /// The pass is over.
    fn finish(&self, message: &str);
}

/// Ignores everything.
pub struct NoProgress;

impl RunProgress for NoProgress {
    fn start(&self, _total: u64) {}
    fn advance(&self, _records: u64) {}
    fn batch(&self, _tally: &BatchTally) {}
    fn finish(&self, _message: &str) {}
}

#[must_use]
pub fn no_progress() -> Arc<dyn RunProgress> {
    Arc::new(NoProgress)
}
