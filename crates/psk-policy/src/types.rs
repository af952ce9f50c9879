use std::fmt;

use anyhow::{anyhow, Result};
use psk_schemas::UserId;

/// Every operation the kernel exposes, public or gated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Operation {
    GetPet,
    FindPetsByStatus,
    FindPetsByTags,
    GetInventory,
    AddPet,
    UpdatePet,
    DeletePet,
    RelistPet,
    PlaceOrder,
    GetOrder,
    UpdateOrderStatus,
    CancelOrder,
    RegisterUser,
    Login,
    GetUser,
    UpdateUser,
    DeleteUser,
}

impl Operation {
    pub const ALL: [Operation; 17] = [
        Operation::GetPet,
        Operation::FindPetsByStatus,
        Operation::FindPetsByTags,
        Operation::GetInventory,
        Operation::AddPet,
        Operation::UpdatePet,
        Operation::DeletePet,
        Operation::RelistPet,
        Operation::PlaceOrder,
        Operation::GetOrder,
        Operation::UpdateOrderStatus,
        Operation::CancelOrder,
        Operation::RegisterUser,
        Operation::Login,
        Operation::GetUser,
        Operation::UpdateUser,
        Operation::DeleteUser,
    ];

    /// Config key for this operation (snake_case).
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::GetPet => "get_pet",
            Operation::FindPetsByStatus => "find_pets_by_status",
            Operation::FindPetsByTags => "find_pets_by_tags",
            Operation::GetInventory => "get_inventory",
            Operation::AddPet => "add_pet",
            Operation::UpdatePet => "update_pet",
            Operation::DeletePet => "delete_pet",
            Operation::RelistPet => "relist_pet",
            Operation::PlaceOrder => "place_order",
            Operation::GetOrder => "get_order",
            Operation::UpdateOrderStatus => "update_order_status",
            Operation::CancelOrder => "cancel_order",
            Operation::RegisterUser => "register_user",
            Operation::Login => "login",
            Operation::GetUser => "get_user",
            Operation::UpdateUser => "update_user",
            Operation::DeleteUser => "delete_user",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        let key = s.trim();
        Operation::ALL
            .iter()
            .copied()
            .find(|op| op.as_str() == key)
            .ok_or_else(|| anyhow!("unknown policy operation: {}", key))
    }

    pub(crate) fn index(&self) -> usize {
        *self as usize
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The resource an operation targets, as far as ownership is concerned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceRef {
    /// No owned instance (collections, pets, inventory, registration).
    Unowned,
    /// An instance owned by a user, e.g. an order's `user_id`.
    OwnedBy(UserId),
    /// A user profile; owned by the user it describes.
    Profile(UserId),
}

impl ResourceRef {
    pub fn owner(&self) -> Option<UserId> {
        match self {
            ResourceRef::Unowned => None,
            ResourceRef::OwnedBy(id) | ResourceRef::Profile(id) => Some(*id),
        }
    }
}

/// Why a principal was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DenyReason {
    /// Absent or invalid credential on a gated operation.
    NotAuthenticated,
    /// Role is below every role in the operation's allowed set.
    InsufficientRole,
    /// Ownership-gated operation on a resource the principal does not own.
    NotOwner,
}

impl fmt::Display for DenyReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DenyReason::NotAuthenticated => write!(f, "POLICY_DENIED: not authenticated"),
            DenyReason::InsufficientRole => write!(f, "POLICY_DENIED: insufficient role"),
            DenyReason::NotOwner => write!(f, "POLICY_DENIED: not the owner of this resource"),
        }
    }
}

/// Policy output. Denial is a normal outcome, not an error.
#[must_use]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Allow,
    Deny(DenyReason),
}

impl Decision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Decision::Allow)
    }

    pub fn into_result(self) -> std::result::Result<(), DenyReason> {
        match self {
            Decision::Allow => Ok(()),
            Decision::Deny(reason) => Err(reason),
        }
    }
}
