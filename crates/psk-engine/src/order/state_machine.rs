//! Order status transitions
//!
//! ```text
//!   placed ──► approved ──► delivered (terminal)
//!     │  └──────────────────────▲
//!     │   only when approval is optional
//!     └──► (row deleted)  cancel, placed only
//! ```

use psk_schemas::OrderStatus;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OrderTransitionError {
    /// The order is `delivered`; nothing moves it again.
    Finalized,
    /// Cancel requested on an order that is no longer `placed`.
    NotCancellable { from: OrderStatus },
    /// `placed -> delivered` while approval is mandatory.
    ApprovalRequired,
    Illegal { from: OrderStatus, to: OrderStatus },
}

impl std::fmt::Display for OrderTransitionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OrderTransitionError::Finalized => write!(f, "order is delivered"),
            OrderTransitionError::NotCancellable { from } => {
                write!(f, "order in status {from} cannot be cancelled")
            }
            OrderTransitionError::ApprovalRequired => {
                write!(f, "order must be approved before delivery")
            }
            OrderTransitionError::Illegal { from, to } => {
                write!(f, "illegal order transition: {from} -> {to}")
            }
        }
    }
}

impl std::error::Error for OrderTransitionError {}

/// Order transition table, parameterized by whether `approved` is mandatory.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OrderLifecycle {
    pub require_approval: bool,
}

impl OrderLifecycle {
    pub fn new(require_approval: bool) -> Self {
        Self { require_approval }
    }

    /// Check `from -> to`. Returns the target status when legal.
    pub fn advance(
        &self,
        from: OrderStatus,
        to: OrderStatus,
    ) -> Result<OrderStatus, OrderTransitionError> {
        use OrderStatus::*;

        if from.is_terminal() {
            return Err(OrderTransitionError::Finalized);
        }
        match (from, to) {
            (Placed, Approved) | (Approved, Delivered) => Ok(to),
            (Placed, Delivered) if self.require_approval => {
                Err(OrderTransitionError::ApprovalRequired)
            }
            (Placed, Delivered) => Ok(to),
            _ => Err(OrderTransitionError::Illegal { from, to }),
        }
    }

    /// Cancellation deletes the row and is allowed only from `placed`.
    pub fn check_cancel(&self, from: OrderStatus) -> Result<(), OrderTransitionError> {
        match from {
            OrderStatus::Placed => Ok(()),
            other => Err(OrderTransitionError::NotCancellable { from: other }),
        }
    }
}
