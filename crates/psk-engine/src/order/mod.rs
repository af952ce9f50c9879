//! Order lifecycle rules.
//!
//! The transition table lives here; the kernel applies it inside a store
//! transaction alongside the matching pet transition.

pub mod state_machine;

pub use state_machine::{OrderLifecycle, OrderTransitionError};
