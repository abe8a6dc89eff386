//! Per-binding outcomes of dual-mode operations.

use serde::{Deserialize, Serialize};

use crate::errors::{Graph4jError, Result};
use crate::types::BindingName;

/// Why one binding's branch of an operation failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BindingFailure {
    pub binding: BindingName,
    pub reason: String,
    /// Whether the failure was a transient store outage.
    pub transient: bool,
}

impl BindingFailure {
    pub fn new(binding: BindingName, err: &Graph4jError) -> Self {
        Self {
            binding,
            reason: err.to_string(),
            transient: err.is_transient(),
        }
    }
}

/// Outcome of one operation issued against both bindings.
///
/// A failure on one side is never hidden by success on the other.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum DualResult<T> {
    /// Both bindings succeeded.
    Both { fast: T, quality: T },
    /// Exactly one binding succeeded.
    Partial {
        succeeded: BindingName,
        value: T,
        failure: BindingFailure,
    },
    /// Neither binding succeeded.
    Neither {
        fast: BindingFailure,
        quality: BindingFailure,
    },
}

impl<T> DualResult<T> {
    pub fn from_pair(fast: Result<T>, quality: Result<T>) -> Self {
        match (fast, quality) {
            (Ok(fast), Ok(quality)) => DualResult::Both { fast, quality },
            (Ok(value), Err(e)) => DualResult::Partial {
                succeeded: BindingName::Fast,
                value,
                failure: BindingFailure::new(BindingName::Quality, &e),
            },
            (Err(e), Ok(value)) => DualResult::Partial {
                succeeded: BindingName::Quality,
                value,
                failure: BindingFailure::new(BindingName::Fast, &e),
            },
            (Err(f), Err(q)) => DualResult::Neither {
                fast: BindingFailure::new(BindingName::Fast, &f),
                quality: BindingFailure::new(BindingName::Quality, &q),
            },
        }
    }

    pub fn is_complete(&self) -> bool {
        matches!(self, DualResult::Both { .. })
    }

    pub fn is_partial(&self) -> bool {
        matches!(self, DualResult::Partial { .. })
    }

    /// The successful value for `binding`, if it succeeded.
    pub fn get(&self, binding: BindingName) -> Option<&T> {
        match (self, binding) {
            (DualResult::Both { fast, .. }, BindingName::Fast) => Some(fast),
            (DualResult::Both { quality, .. }, BindingName::Quality) => Some(quality),
            (DualResult::Partial { succeeded, value, .. }, b) if *succeeded == b => Some(value),
            _ => None,
        }
    }

    pub fn fast(&self) -> Option<&T> {
        self.get(BindingName::Fast)
    }

    pub fn quality(&self) -> Option<&T> {
        self.get(BindingName::Quality)
    }

    pub fn failures(&self) -> Vec<&BindingFailure> {
        match self {
            DualResult::Both { .. } => Vec::new(),
            DualResult::Partial { failure, .. } => vec![failure],
            DualResult::Neither { fast, quality } => vec![fast, quality],
        }
    }
}
