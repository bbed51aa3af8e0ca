//! Aggregate root contract and optimistic concurrency.

use crate::error::{DomainError, DomainResult};
use crate::id::AggregateId;

/// Aggregate root marker + minimal interface.
///
/// Aggregates are plain mutable business objects: command methods validate,
/// mutate state and record domain events. Persistence keys them by
/// `(AGGREGATE_TYPE, id)`; versions are tracked by the unit of work, not by the
/// aggregate itself.
pub trait AggregateRoot {
    /// Stable type name used as the persistence partition (e.g. `identity.account`).
    const AGGREGATE_TYPE: &'static str;

    /// Returns the aggregate identifier.
    fn id(&self) -> AggregateId;
}

/// Optimistic concurrency expectation for an aggregate.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ExpectedVersion {
    /// Skip version checking (useful for idempotent commands, migrations, etc.).
    Any,
    /// Require the aggregate to be at an exact version (`0` = must not exist yet).
    Exact(u64),
}

impl ExpectedVersion {
    pub fn matches(self, actual: u64) -> bool {
        match self {
            ExpectedVersion::Any => true,
            ExpectedVersion::Exact(v) => v == actual,
        }
    }

    pub fn check(self, actual: u64) -> DomainResult<()> {
        if self.matches(actual) {
            Ok(())
        } else {
            Err(DomainError::conflict(format!(
                "optimistic concurrency check failed (expected: {self:?}, actual: {actual})"
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_version_conflicts_on_mismatch() {
        assert!(ExpectedVersion::Exact(2).check(2).is_ok());
        assert!(matches!(
            ExpectedVersion::Exact(0).check(1),
            Err(DomainError::Conflict(_))
        ));
        assert!(ExpectedVersion::Any.matches(42));
    }
}
