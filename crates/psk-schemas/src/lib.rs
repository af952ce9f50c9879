//! psk-schemas
//!
//! Shared data model for the petstore kernel: principals, pets, orders and
//! users. Plain data plus wire-string parsing; no business rules live here.
//! Transition legality is owned by `psk-engine`, permission decisions by
//! `psk-policy`.

use std::collections::BTreeMap;
use std::fmt;

use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Identifiers
// ---------------------------------------------------------------------------

/// Pet row identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PetId(pub i64);

/// Order row identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrderId(pub i64);

/// User row identifier. Also the identity carried by a [`Principal`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub i64);

impl fmt::Display for PetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for OrderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Role / Principal
// ---------------------------------------------------------------------------

/// Role of an authenticated actor.
///
/// Variant order is the permission hierarchy:
/// `Guest < Customer < StoreOwner < Admin`. A role satisfies a gate for any
/// role at or below it. The hierarchy grants permissions only; it never
/// implies data inheritance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Guest,
    Customer,
    StoreOwner,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Guest => "guest",
            Role::Customer => "customer",
            Role::StoreOwner => "store_owner",
            Role::Admin => "admin",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s.trim() {
            "guest" => Ok(Role::Guest),
            "customer" => Ok(Role::Customer),
            "store_owner" => Ok(Role::StoreOwner),
            "admin" => Ok(Role::Admin),
            other => Err(anyhow!("invalid role: {}", other)),
        }
    }

    /// True when this role sits at or above `required` in the hierarchy.
    pub fn includes(&self, required: Role) -> bool {
        *self >= required
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The authenticated actor performing an operation.
///
/// Resolved per call by the auth collaborator and never persisted by the
/// kernel. An absent or invalid credential resolves to [`Principal::guest`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    pub id: UserId,
    pub role: Role,
}

impl Principal {
    pub fn new(id: UserId, role: Role) -> Self {
        Self { id, role }
    }

    /// Unauthenticated caller. Carries the reserved id 0.
    pub fn guest() -> Self {
        Self {
            id: UserId(0),
            role: Role::Guest,
        }
    }

    pub fn is_guest(&self) -> bool {
        self.role == Role::Guest
    }
}

// ---------------------------------------------------------------------------
// Pet
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PetStatus {
    Available,
    Pending,
    Sold,
}

impl PetStatus {
    pub const ALL: [PetStatus; 3] = [PetStatus::Available, PetStatus::Pending, PetStatus::Sold];

    pub fn as_str(&self) -> &'static str {
        match self {
            PetStatus::Available => "available",
            PetStatus::Pending => "pending",
            PetStatus::Sold => "sold",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s.trim() {
            "available" => Ok(PetStatus::Available),
            "pending" => Ok(PetStatus::Pending),
            "sold" => Ok(PetStatus::Sold),
            other => Err(anyhow!("invalid pet status: {}", other)),
        }
    }
}

impl fmt::Display for PetStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    pub id: i64,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tag {
    pub id: i64,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pet {
    pub id: PetId,
    pub name: String,
    pub category: Option<Category>,
    #[serde(default)]
    pub tags: Vec<Tag>,
    #[serde(default)]
    pub photo_urls: Vec<String>,
    pub status: PetStatus,
}

impl Pet {
    pub fn has_any_tag(&self, names: &[String]) -> bool {
        self.tags.iter().any(|t| names.iter().any(|n| n == &t.name))
    }
}

/// Insert payload for a new pet. Status is not accepted: new pets always
/// start `available`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewPet {
    pub name: String,
    pub category: Option<Category>,
    #[serde(default)]
    pub tags: Vec<Tag>,
    #[serde(default)]
    pub photo_urls: Vec<String>,
}

/// Partial update for a pet's descriptive fields.
///
/// `status` is optional; when present it is checked against the pet state
/// machine rather than written directly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PetUpdate {
    pub id: PetId,
    pub name: Option<String>,
    pub category: Option<Category>,
    pub tags: Option<Vec<Tag>>,
    pub photo_urls: Option<Vec<String>>,
    pub status: Option<PetStatus>,
}

impl PetUpdate {
    pub fn new(id: PetId) -> Self {
        Self {
            id,
            name: None,
            category: None,
            tags: None,
            photo_urls: None,
            status: None,
        }
    }
}

/// Pet counts per status. Every status is present, zero-filled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Inventory {
    pub counts: BTreeMap<PetStatus, i64>,
}

impl Inventory {
    pub fn from_counts<I>(counts: I) -> Self
    where
        I: IntoIterator<Item = (PetStatus, i64)>,
    {
        let mut map: BTreeMap<PetStatus, i64> = PetStatus::ALL.iter().map(|s| (*s, 0)).collect();
        for (status, n) in counts {
            *map.entry(status).or_insert(0) += n;
        }
        Self { counts: map }
    }

    pub fn count(&self, status: PetStatus) -> i64 {
        self.counts.get(&status).copied().unwrap_or(0)
    }
}

// ---------------------------------------------------------------------------
// Order
// ---------------------------------------------------------------------------

/// Persisted order status. Cancellation deletes the row, so there is no
/// cancelled variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Placed,
    Approved,
    Delivered,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Placed => "placed",
            OrderStatus::Approved => "approved",
            OrderStatus::Delivered => "delivered",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s.trim() {
            "placed" => Ok(OrderStatus::Placed),
            "approved" => Ok(OrderStatus::Approved),
            "delivered" => Ok(OrderStatus::Delivered),
            other => Err(anyhow!("invalid order status: {}", other)),
        }
    }

    /// An active order holds its pet: `placed` or `approved`.
    pub fn is_active(&self) -> bool {
        matches!(self, OrderStatus::Placed | OrderStatus::Approved)
    }

    /// Returns `true` if no further transitions are possible.
    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderStatus::Delivered)
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub pet_id: PetId,
    /// Owner. Immutable after creation.
    pub user_id: UserId,
    pub quantity: i32,
    pub status: OrderStatus,
    pub ship_date: Option<DateTime<Utc>>,
    pub complete: bool,
}

/// Insert payload for a new order row (always `placed`, quantity 1).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewOrder {
    pub pet_id: PetId,
    pub user_id: UserId,
    pub quantity: i32,
    pub ship_date: Option<DateTime<Utc>>,
}

// ---------------------------------------------------------------------------
// User
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub username: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub role: Role,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewUser {
    pub username: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    /// Defaults to `customer` when absent.
    pub role: Option<Role>,
}

impl NewUser {
    pub fn customer(username: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            first_name: None,
            last_name: None,
            email: None,
            phone: None,
            role: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserUpdate {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub role: Option<Role>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_hierarchy_is_ordered() {
        assert!(Role::Admin.includes(Role::StoreOwner));
        assert!(Role::StoreOwner.includes(Role::Customer));
        assert!(Role::Customer.includes(Role::Guest));
        assert!(!Role::Customer.includes(Role::StoreOwner));
        assert!(!Role::Guest.includes(Role::Customer));
    }

    #[test]
    fn status_strings_parse_back() {
        for s in PetStatus::ALL {
            assert_eq!(PetStatus::parse(s.as_str()).unwrap(), s);
        }
        assert!(OrderStatus::parse("cancelled").is_err());
        assert!(Role::parse("root").is_err());
    }

    #[test]
    fn active_order_statuses() {
        assert!(OrderStatus::Placed.is_active());
        assert!(OrderStatus::Approved.is_active());
        assert!(!OrderStatus::Delivered.is_active());
        assert!(OrderStatus::Delivered.is_terminal());
    }

    #[test]
    fn inventory_is_zero_filled() {
        let inv = Inventory::from_counts([(PetStatus::Sold, 2)]);
        assert_eq!(inv.count(PetStatus::Available), 0);
        assert_eq!(inv.count(PetStatus::Pending), 0);
        assert_eq!(inv.count(PetStatus::Sold), 2);

        let v = serde_json::to_value(&inv).unwrap();
        assert_eq!(v["sold"], 2);
        assert_eq!(v["available"], 0);
    }

    #[test]
    fn wire_format_uses_snake_case() {
        let v = serde_json::to_value(Role::StoreOwner).unwrap();
        assert_eq!(v, "store_owner");
        let p: PetStatus = serde_json::from_str("\"pending\"").unwrap();
        assert_eq!(p, PetStatus::Pending);
    }
}
