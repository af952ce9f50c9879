//! Kernel outcome taxonomy.
//!
//! ```text
//! KernelError
//!   ├── Rejected(Rejection)        typed, non-fatal decision
//!   │     ├── Validation           bad input; retry with corrected input
//!   │     ├── Policy               role / ownership denial; never auto-retried
//!   │     └── StateConflict        re-read current state before acting again
//!   └── Storage(StorageFailure)    persistence unavailable
//!         ├── op = Read            safe to retry
//!         └── op = Write           must not be retried blindly
//! ```

use std::fmt;

use psk_policy::DenyReason;

use crate::order::OrderTransitionError;
use crate::pet::PetTransitionError;

// ---------------------------------------------------------------------------
// Rejection
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectionClass {
    Validation,
    Policy,
    StateConflict,
}

/// A typed refusal. Returned as a value; no state was changed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    // Policy
    NotAuthenticated,
    InsufficientRole,
    NotOwner,

    // Validation
    NotFound,
    InvalidQuantity,
    InvalidInput(String),

    // State conflict
    PetUnavailable,
    PetAlreadyOrdered,
    OrderFinalized,
    NotCancellable,
    ApprovalRequired,
    RelistRequiresAdmin,
    IllegalTransition {
        entity: &'static str,
        from: &'static str,
        to: &'static str,
    },
    PetHasActiveOrder,
    UserHasActiveOrders,
    UsernameTaken,
}

impl Rejection {
    pub fn class(&self) -> RejectionClass {
        match self {
            Rejection::NotAuthenticated | Rejection::InsufficientRole | Rejection::NotOwner => {
                RejectionClass::Policy
            }
            Rejection::NotFound | Rejection::InvalidQuantity | Rejection::InvalidInput(_) => {
                RejectionClass::Validation
            }
            _ => RejectionClass::StateConflict,
        }
    }

    /// HTTP status a transport layer should answer with.
    pub fn status_code(&self) -> u16 {
        match self {
            Rejection::NotAuthenticated => 401,
            Rejection::InsufficientRole | Rejection::NotOwner | Rejection::RelistRequiresAdmin => 403,
            Rejection::NotFound => 404,
            Rejection::UsernameTaken => 409,
            _ => 400,
        }
    }

    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            Rejection::NotAuthenticated => "NOT_AUTHENTICATED",
            Rejection::InsufficientRole => "INSUFFICIENT_ROLE",
            Rejection::NotOwner => "NOT_OWNER",
            Rejection::NotFound => "NOT_FOUND",
            Rejection::InvalidQuantity => "INVALID_QUANTITY",
            Rejection::InvalidInput(_) => "INVALID_INPUT",
            Rejection::PetUnavailable => "PET_UNAVAILABLE",
            Rejection::PetAlreadyOrdered => "PET_ALREADY_ORDERED",
            Rejection::OrderFinalized => "ORDER_FINALIZED",
            Rejection::NotCancellable => "NOT_CANCELLABLE",
            Rejection::ApprovalRequired => "APPROVAL_REQUIRED",
            Rejection::RelistRequiresAdmin => "RELIST_REQUIRES_ADMIN",
            Rejection::IllegalTransition { .. } => "ILLEGAL_TRANSITION",
            Rejection::PetHasActiveOrder => "PET_HAS_ACTIVE_ORDER",
            Rejection::UserHasActiveOrders => "USER_HAS_ACTIVE_ORDERS",
            Rejection::UsernameTaken => "USERNAME_TAKEN",
        }
    }
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rejection::InvalidInput(msg) => write!(f, "{}: {}", self.code(), msg),
            Rejection::IllegalTransition { entity, from, to } => {
                write!(f, "{}: {} {} -> {}", self.code(), entity, from, to)
            }
            other => f.write_str(other.code()),
        }
    }
}

impl std::error::Error for Rejection {}

impl From<DenyReason> for Rejection {
    fn from(r: DenyReason) -> Self {
        match r {
            DenyReason::NotAuthenticated => Rejection::NotAuthenticated,
            DenyReason::InsufficientRole => Rejection::InsufficientRole,
            DenyReason::NotOwner => Rejection::NotOwner,
        }
    }
}

impl From<PetTransitionError> for Rejection {
    fn from(e: PetTransitionError) -> Self {
        match e {
            PetTransitionError::RelistRequiresAdmin => Rejection::RelistRequiresAdmin,
            PetTransitionError::Illegal { from, to } => Rejection::IllegalTransition {
                entity: "pet",
                from: from.as_str(),
                to: to.as_str(),
            },
        }
    }
}

impl From<OrderTransitionError> for Rejection {
    fn from(e: OrderTransitionError) -> Self {
        match e {
            OrderTransitionError::Finalized => Rejection::OrderFinalized,
            OrderTransitionError::NotCancellable { .. } => Rejection::NotCancellable,
            OrderTransitionError::ApprovalRequired => Rejection::ApprovalRequired,
            OrderTransitionError::Illegal { from, to } => Rejection::IllegalTransition {
                entity: "order",
                from: from.as_str(),
                to: to.as_str(),
            },
        }
    }
}

// ---------------------------------------------------------------------------
// Storage
// ---------------------------------------------------------------------------

/// Error surfaced by a persistence collaborator.
#[derive(Debug)]
pub enum StorageError {
    /// Backend unreachable or the statement failed.
    Unavailable(anyhow::Error),
    /// A data-level constraint refused the write (e.g. the one-active-order
    /// index). The kernel maps known constraints to rejections.
    Conflict { constraint: String },
}

impl StorageError {
    pub fn unavailable(e: impl Into<anyhow::Error>) -> Self {
        StorageError::Unavailable(e.into())
    }
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageError::Unavailable(e) => write!(f, "storage unavailable: {e:#}"),
            StorageError::Conflict { constraint } => {
                write!(f, "storage constraint violated: {constraint}")
            }
        }
    }
}

impl std::error::Error for StorageError {}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpKind {
    Read,
    Write,
}

/// Storage error tagged with the kind of operation that hit it.
#[derive(Debug)]
pub struct StorageFailure {
    pub op: OpKind,
    pub source: StorageError,
}

impl StorageFailure {
    pub fn read(source: StorageError) -> Self {
        Self {
            op: OpKind::Read,
            source,
        }
    }

    pub fn write(source: StorageError) -> Self {
        Self {
            op: OpKind::Write,
            source,
        }
    }

    /// Reads may be retried. A failed write may already have committed, so
    /// it is never retryable without idempotency protection.
    pub fn retryable(&self) -> bool {
        self.op == OpKind::Read
    }
}

impl fmt::Display for StorageFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let op = match self.op {
            OpKind::Read => "read",
            OpKind::Write => "write",
        };
        write!(f, "STORAGE_FAILURE ({op}): {}", self.source)
    }
}

impl std::error::Error for StorageFailure {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.source)
    }
}

// ---------------------------------------------------------------------------
// KernelError
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub enum KernelError {
    Rejected(Rejection),
    Storage(StorageFailure),
}

impl KernelError {
    pub fn rejection(&self) -> Option<&Rejection> {
        match self {
            KernelError::Rejected(r) => Some(r),
            KernelError::Storage(_) => None,
        }
    }

    pub fn status_code(&self) -> u16 {
        match self {
            KernelError::Rejected(r) => r.status_code(),
            KernelError::Storage(_) => 503,
        }
    }
}

impl fmt::Display for KernelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KernelError::Rejected(r) => write!(f, "REJECTED: {r}"),
            KernelError::Storage(s) => write!(f, "{s}"),
        }
    }
}

impl std::error::Error for KernelError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            KernelError::Rejected(r) => Some(r),
            KernelError::Storage(s) => Some(s),
        }
    }
}

impl From<Rejection> for KernelError {
    fn from(r: Rejection) -> Self {
        KernelError::Rejected(r)
    }
}

impl From<DenyReason> for KernelError {
    fn from(r: DenyReason) -> Self {
        KernelError::Rejected(r.into())
    }
}

impl From<PetTransitionError> for KernelError {
    fn from(e: PetTransitionError) -> Self {
        KernelError::Rejected(e.into())
    }
}

impl From<OrderTransitionError> for KernelError {
    fn from(e: OrderTransitionError) -> Self {
        KernelError::Rejected(e.into())
    }
}
