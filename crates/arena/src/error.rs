//! Standalone error types for stratum-arena
//!
//! Uses thiserror for clean, idiomatic Rust error definitions.

use thiserror::Error;

use crate::zone::ZoneSet;

#[cfg(feature = "logging")]
use tracing::{error, warn};

// ============================================================================
// Main Error Types
// ============================================================================

/// Arena allocation errors
#[must_use = "errors should be handled"]
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ArenaError {
    // --- Commitment ---
    #[error(
        "Commit limit exceeded: {committed} bytes committed, {requested} more requested, limit {limit}"
    )]
    CommitLimitExceeded {
        committed: usize,
        requested: usize,
        limit: usize,
    },

    // --- Growth ---
    #[error("Arena growth failed: {reason}")]
    GrowthFailed { reason: String },

    // --- Placement ---
    #[error("No free span of {size} bytes in zones {zones}")]
    ResourceExhausted { size: usize, zones: ZoneSet },

    // --- Configuration ---
    #[error("Invalid configuration: {reason}")]
    InvalidConfig { reason: String },

    // --- General ---
    #[error("Invalid operation: {reason}")]
    InvalidOperation { reason: String },

    #[error("Size overflow during operation: {operation}")]
    SizeOverflow { operation: String },
}

impl ArenaError {
    /// Check if error is retryable
    ///
    /// Commit-limit failures clear when memory is freed or the limit is
    /// raised; exhaustion clears when memory is freed.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::CommitLimitExceeded { .. } | Self::ResourceExhausted { .. }
        )
    }

    /// Get error code for categorization
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::CommitLimitExceeded { .. } => "ARENA:COMMIT:LIMIT",
            Self::GrowthFailed { .. } => "ARENA:GROW:FAILED",
            Self::ResourceExhausted { .. } => "ARENA:RESOURCE:EXHAUSTED",
            Self::InvalidConfig { .. } => "ARENA:CONFIG:INVALID",
            Self::InvalidOperation { .. } => "ARENA:INVALID_OP",
            Self::SizeOverflow { .. } => "ARENA:SIZE:OVERFLOW",
        }
    }

    // ============================================================================
    // Convenience Constructors
    // ============================================================================

    /// Create commit limit exceeded error
    pub fn commit_limit(committed: usize, requested: usize, limit: usize) -> Self {
        #[cfg(feature = "logging")]
        warn!(
            committed,
            requested, limit, "allocation refused by commit limit"
        );

        Self::CommitLimitExceeded {
            committed,
            requested,
            limit,
        }
    }

    /// Create growth failed error
    pub fn growth_failed(reason: impl Into<String>) -> Self {
        let reason = reason.into();

        #[cfg(feature = "logging")]
        warn!(%reason, "arena growth failed");

        Self::GrowthFailed { reason }
    }

    /// Create resource exhausted error
    pub fn exhausted(size: usize, zones: ZoneSet) -> Self {
        Self::ResourceExhausted { size, zones }
    }

    /// Create invalid config error
    pub fn invalid_config(reason: &str) -> Self {
        Self::InvalidConfig {
            reason: reason.to_string(),
        }
    }

    /// Create invalid operation error
    pub fn invalid_operation(reason: impl Into<String>) -> Self {
        let reason = reason.into();

        #[cfg(feature = "logging")]
        error!(%reason, "invalid arena operation");

        Self::InvalidOperation { reason }
    }

    /// Create size overflow error
    pub fn size_overflow(operation: &str) -> Self {
        Self::SizeOverflow {
            operation: operation.to_string(),
        }
    }

    /// Check if this is a commit limit error
    #[must_use]
    pub fn is_commit_limit(&self) -> bool {
        matches!(self, Self::CommitLimitExceeded { .. })
    }
}

// ============================================================================
// Result Types
// ============================================================================

/// Result type for arena operations
pub type ArenaResult<T> = core::result::Result<T, ArenaError>;

/// Generic result type alias
pub type Result<T> = ArenaResult<T>;

// ============================================================================
// Tests
// ============================================================================
