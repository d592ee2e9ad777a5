//! Error types for Lotkeeper
//!
//! Provides a unified error type for all operations.
//!
//! Every Allocation Engine failure maps to a stable, enumerable variant so a
//! caller can branch on the kind without parsing message text. Cache and
//! counter failures never appear here: they are logged and swallowed at the
//! coordinator boundary.

use thiserror::Error;

/// Result type alias using ParkError
pub type Result<T> = std::result::Result<T, ParkError>;

/// Unified error type for Lotkeeper operations
#[derive(Debug, Error)]
pub enum ParkError {
    // -------------------------------------------------------------------------
    // Client Errors
    // -------------------------------------------------------------------------
    /// Malformed or missing input; no mutation was attempted
    #[error("validation failed: {0}")]
    Validation(String),

    /// A referenced entity does not exist
    #[error("{entity} {id} not found")]
    NotFound {
        /// Entity table name ("lot", "spot", "reservation", "user")
        entity: &'static str,
        /// Identifier that failed to resolve
        id: u64,
    },

    /// Current state precludes the operation
    #[error("conflict: {0}")]
    Conflict(String),

    /// Caller is neither the owner nor privileged
    #[error("access denied")]
    AccessDenied,

    // -------------------------------------------------------------------------
    // Allocation Errors
    // -------------------------------------------------------------------------
    /// The lot has no free slots
    #[error("lot {lot_id} has no free slots")]
    NoCapacity {
        /// Lot that was full
        lot_id: u64,
    },

    /// The requesting user already holds an active reservation
    #[error("user {user_id} already holds active reservation {reservation_id}")]
    AlreadyActive {
        /// User that made the request
        user_id: u64,
        /// The reservation blocking the request
        reservation_id: u64,
    },

    /// An explicitly chosen spot is not available
    #[error("spot {spot_id} is not available")]
    NotAvailable {
        /// Spot that was requested
        spot_id: u64,
    },

    /// A supplied time interval has end before (or at) start
    #[error("interval end must be after start")]
    InvalidInterval,

    // -------------------------------------------------------------------------
    // Invariant Errors
    // -------------------------------------------------------------------------
    /// An invariant that must always hold was found false.
    ///
    /// Surfaced loudly, never silently repaired: the free-slot counter and
    /// the spot rows disagree, or a reservation references dangling state.
    #[error("inventory corruption detected: {0}")]
    Corruption(String),
}

impl ParkError {
    /// Shorthand for a `NotFound` against the lot table
    pub fn lot_not_found(id: u64) -> Self {
        ParkError::NotFound { entity: "lot", id }
    }

    /// Shorthand for a `NotFound` against the spot table
    pub fn spot_not_found(id: u64) -> Self {
        ParkError::NotFound { entity: "spot", id }
    }

    /// Shorthand for a `NotFound` against the reservation table
    pub fn reservation_not_found(id: u64) -> Self {
        ParkError::NotFound {
            entity: "reservation",
            id,
        }
    }

    /// Shorthand for a `NotFound` against the user table
    pub fn user_not_found(id: u64) -> Self {
        ParkError::NotFound { entity: "user", id }
    }
}
