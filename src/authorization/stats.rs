//! Running totals for authorization calls.

use std::sync::atomic::{AtomicU64, Ordering};

/// Counters updated by every authorization call.
#[derive(Debug, Default)]
pub struct AuthorizationStatistics {
    processed: AtomicU64,
    approved: AtomicU64,
    declined: AtomicU64,
    errors: AtomicU64,
    connection_errors: AtomicU64,
}

/// Point-in-time copy of [`AuthorizationStatistics`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StatisticsSnapshot {
    /// Calls that created a transaction.
    pub processed: u64,
    /// Approved outcomes.
    pub approved: u64,
    /// Declined outcomes.
    pub declined: u64,
    /// `RETRY`, unknown codes and missing responses.
    pub errors: u64,
    /// Disconnected, failed liveness checks and failed sends.
    pub connection_errors: u64,
}

impl AuthorizationStatistics {
    pub(crate) fn record_processed(&self) { self.processed.fetch_add(1, Ordering::Relaxed); }

    pub(crate) fn record_approved(&self) { self.approved.fetch_add(1, Ordering::Relaxed); }

    pub(crate) fn record_declined(&self) { self.declined.fetch_add(1, Ordering::Relaxed); }

    pub(crate) fn record_error(&self) { self.errors.fetch_add(1, Ordering::Relaxed); }

    pub(crate) fn record_connection_error(&self) {
        self.connection_errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Read every counter.
    #[must_use]
    pub fn snapshot(&self) -> StatisticsSnapshot {
        StatisticsSnapshot {
            processed: self.processed.load(Ordering::Relaxed),
            approved: self.approved.load(Ordering::Relaxed),
            declined: self.declined.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
            connection_errors: self.connection_errors.load(Ordering::Relaxed),
        }
    }
}
