//! Pet state machine
//!
//! # State diagram
//!
//! ```text
//!              order placed (system)
//!   available ─────────────────────► pending
//!       ▲      ◄─────────────────────   │
//!       │      placed order cancelled   │ order delivered (system)
//!       │                               ▼
//!       └──────────── relist ─────────  sold
//!                   (admin only)
//! ```
//!
//! Same-state requests are no-ops for any actor. Every other pair is
//! rejected with [`PetTransitionError::Illegal`].

use psk_schemas::{Order, Pet, PetStatus, Principal, Role};

/// Who is requesting a pet status change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Actor<'a> {
    /// The order engine, as a side effect of an order transition.
    System,
    /// A caller changing status directly.
    Principal(&'a Principal),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PetTransitionError {
    /// `sold -> available` requested by a non-admin principal.
    RelistRequiresAdmin,
    Illegal { from: PetStatus, to: PetStatus },
}

impl std::fmt::Display for PetTransitionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PetTransitionError::RelistRequiresAdmin => {
                write!(f, "relisting a sold pet requires the admin role")
            }
            PetTransitionError::Illegal { from, to } => {
                write!(f, "illegal pet transition: {from} -> {to}")
            }
        }
    }
}

impl std::error::Error for PetTransitionError {}

/// Apply a status change to `pet`, returning the updated pet.
///
/// # Errors
/// [`PetTransitionError`] when `(pet.status, to, actor)` is not in the table.
/// The input pet is untouched on error.
pub fn transition(pet: &Pet, to: PetStatus, actor: Actor<'_>) -> Result<Pet, PetTransitionError> {
    let from = pet.status;
    if from == to {
        return Ok(pet.clone());
    }

    match (from, to, actor) {
        (PetStatus::Available, PetStatus::Pending, Actor::System)
        | (PetStatus::Pending, PetStatus::Available, Actor::System)
        | (PetStatus::Pending, PetStatus::Sold, Actor::System) => {}
        (PetStatus::Sold, PetStatus::Available, Actor::Principal(p)) => {
            if p.role != Role::Admin {
                return Err(PetTransitionError::RelistRequiresAdmin);
            }
        }
        _ => return Err(PetTransitionError::Illegal { from, to }),
    }

    let mut next = pet.clone();
    next.status = to;
    Ok(next)
}

/// A pet may be deleted only while no active order references it.
pub fn can_delete(active_order: Option<&Order>) -> bool {
    !active_order.map(|o| o.status.is_active()).unwrap_or(false)
}
