//! Pet status state machine.
//!
//! Pure transition logic. Callers hold the row lock; nothing here does I/O.

pub mod state_machine;

pub use state_machine::{can_delete, transition, Actor, PetTransitionError};
