//! Harness error taxonomy

use forkbench_ipc::FailureKind;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Why a descriptor (or one of its forks) produced no result.
///
/// Errors are scoped to a single descriptor; siblings keep running.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "kind", content = "message")]
pub enum HarnessError {
    /// Fixture construction failed; the descriptor is aborted, never retried
    #[serde(rename = "FixtureInitError")]
    #[error("fixture initialization failed: {0}")]
    FixtureInit(String),

    /// The workload returned an error or panicked during a measured call
    #[serde(rename = "WorkloadError")]
    #[error("workload failed: {0}")]
    Workload(String),

    /// An isolated fork crashed, timed out or broke the protocol
    #[serde(rename = "ForkFailure")]
    #[error("fork failed: {0}")]
    ForkFailure(String),

    /// No usable measurement sample was recorded
    #[serde(rename = "InsufficientSamples")]
    #[error("insufficient samples: {0}")]
    InsufficientSamples(String),
}

impl HarnessError {
    /// Stable taxonomy name shown in reports
    pub fn kind(&self) -> &'static str {
        match self {
            HarnessError::FixtureInit(_) => "FixtureInitError",
            HarnessError::Workload(_) => "WorkloadError",
            HarnessError::ForkFailure(_) => "ForkFailure",
            HarnessError::InsufficientSamples(_) => "InsufficientSamples",
        }
    }

    /// The message without the taxonomy prefix
    pub fn message(&self) -> &str {
        match self {
            HarnessError::FixtureInit(m)
            | HarnessError::Workload(m)
            | HarnessError::ForkFailure(m)
            | HarnessError::InsufficientSamples(m) => m,
        }
    }

    /// Deterministic failures end the descriptor; running more forks would
    /// only repeat them.
    pub fn is_fatal(&self) -> bool {
        matches!(self, HarnessError::FixtureInit(_) | HarnessError::Workload(_))
    }

    /// Rebuild an error reported by a fork process
    pub fn from_failure(kind: FailureKind, message: String) -> Self {
        match kind {
            FailureKind::FixtureInit => HarnessError::FixtureInit(message),
            FailureKind::Workload => HarnessError::Workload(message),
            FailureKind::UnknownBenchmark | FailureKind::InvalidConfig => {
                HarnessError::ForkFailure(message)
            }
        }
    }

    /// Wire category for sending this error from a fork process
    pub fn failure_kind(&self) -> FailureKind {
        match self {
            HarnessError::FixtureInit(_) => FailureKind::FixtureInit,
            HarnessError::Workload(_) => FailureKind::Workload,
            HarnessError::ForkFailure(_) | HarnessError::InsufficientSamples(_) => {
                FailureKind::InvalidConfig
            }
        }
    }
}

/// Turn a caught panic payload into a message
pub(crate) fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "Unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_names() {
        assert_eq!(HarnessError::FixtureInit("x".into()).kind(), "FixtureInitError");
        assert_eq!(HarnessError::Workload("x".into()).kind(), "WorkloadError");
        assert_eq!(HarnessError::ForkFailure("x".into()).kind(), "ForkFailure");
        assert_eq!(
            HarnessError::InsufficientSamples("x".into()).kind(),
            "InsufficientSamples"
        );
    }

    #[test]
    fn test_failure_roundtrip() {
        let err = HarnessError::Workload("boom".into());
        assert_eq!(
            HarnessError::from_failure(err.failure_kind(), err.message().to_string()),
            err
        );
        assert!(matches!(
            HarnessError::from_failure(FailureKind::UnknownBenchmark, "nope".into()),
            HarnessError::ForkFailure(_)
        ));
    }

    #[test]
    fn test_fatal() {
        assert!(HarnessError::FixtureInit(String::new()).is_fatal());
        assert!(!HarnessError::ForkFailure(String::new()).is_fatal());
    }
}
