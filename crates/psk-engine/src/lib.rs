//! psk-engine
//!
//! Pet state machine, order lifecycle and the [`StoreKernel`] that applies
//! both atomically against a persistence collaborator.
//!
//! - [`pet`]: pure pet status transitions
//! - [`order`]: pure order status transitions
//! - [`store`]: `StoreBackend` / `StoreTx` traits
//! - [`memory`]: in-process store used by tests and local runs
//! - [`kernel`]: policy-gated operations; the only writer of pet/order state

pub mod error;
pub mod kernel;
pub mod memory;
pub mod order;
pub mod pet;
pub mod store;

pub use error::{KernelError, OpKind, Rejection, RejectionClass, StorageError, StorageFailure};
pub use kernel::{CancelledOrder, PlaceOrder, StoreKernel};
pub use memory::{MemoryStore, MemoryTx, StoreState};
pub use order::{OrderLifecycle, OrderTransitionError};
pub use pet::{can_delete, transition, Actor, PetTransitionError};
pub use store::{
    StoreBackend, StoreResult, StoreTx, ACTIVE_ORDER_CONSTRAINT, USERNAME_CONSTRAINT,
};
