//! StoreKernel: the single writer of pet, order and user state.
//!
//! Every operation follows the same shape:
//!
//! 1. role gate (no I/O for refused principals)
//! 2. cheap input validation
//! 3. for writes: `begin`, lock the rows the decision depends on, ownership
//!    gate on the loaded owner, state-machine checks, writes, `commit`
//! 4. for reads: retried storage call, then ownership gate
//!
//! A rejection returned from inside a transaction drops the tx, which
//! discards anything staged before it.

use std::future::Future;

use chrono::{DateTime, Utc};
use psk_config::{KernelConfig, StorageConfig};
use psk_policy::{authorize, role_gate, Operation, PolicyTable, ResourceRef};
use psk_schemas::{
    Inventory, NewOrder, NewPet, NewUser, Order, OrderId, OrderStatus, Pet, PetId, PetStatus,
    PetUpdate, Principal, Role, User, UserUpdate,
};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::error::{KernelError, Rejection, StorageError, StorageFailure};
use crate::order::OrderLifecycle;
use crate::pet::{self, Actor};
use crate::store::{
    StoreBackend, StoreResult, StoreTx, ACTIVE_ORDER_CONSTRAINT, USERNAME_CONSTRAINT,
};

/// Request to place an order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaceOrder {
    pub pet_id: PetId,
    pub quantity: i32,
    pub ship_date: Option<DateTime<Utc>>,
}

impl PlaceOrder {
    /// The only valid request shape: one pet, no ship date.
    pub fn one(pet_id: PetId) -> Self {
        Self {
            pet_id,
            quantity: 1,
            ship_date: None,
        }
    }
}

/// Result of a cancellation: the order as it was before deletion, and the
/// pet after it was released.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CancelledOrder {
    pub order: Order,
    pub pet: Pet,
}

pub struct StoreKernel<S> {
    store: S,
    policy: PolicyTable,
    lifecycle: OrderLifecycle,
    storage: StorageConfig,
}

impl<S: StoreBackend> StoreKernel<S> {
    /// Kernel with the standard policy table and default lifecycle.
    pub fn new(store: S) -> Self {
        Self {
            store,
            policy: PolicyTable::standard(),
            lifecycle: OrderLifecycle::default(),
            storage: StorageConfig::default(),
        }
    }

    pub fn from_config(store: S, cfg: &KernelConfig) -> anyhow::Result<Self> {
        Ok(Self {
            store,
            policy: cfg.policy_table()?,
            lifecycle: OrderLifecycle::new(cfg.order.require_approval),
            storage: cfg.storage.clone(),
        })
    }

    pub fn with_lifecycle(mut self, lifecycle: OrderLifecycle) -> Self {
        self.lifecycle = lifecycle;
        self
    }

    pub fn with_storage(mut self, storage: StorageConfig) -> Self {
        self.storage = storage;
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    // -----------------------------------------------------------------------
    // Pets
    // -----------------------------------------------------------------------

    pub async fn get_pet(&self, principal: &Principal, id: PetId) -> Result<Pet, KernelError> {
        let res: Result<Pet, KernelError> = async {
            self.gate(principal, Operation::GetPet)?;
            self.read("get_pet", || self.store.get_pet(id))
                .await?
                .ok_or(Rejection::NotFound.into())
        }
        .await;
        observe(Operation::GetPet, principal, res)
    }

    pub async fn find_pets_by_status(
        &self,
        principal: &Principal,
        statuses: &[PetStatus],
    ) -> Result<Vec<Pet>, KernelError> {
        let res: Result<Vec<Pet>, KernelError> = async {
            self.gate(principal, Operation::FindPetsByStatus)?;
            if statuses.is_empty() {
                return Err(Rejection::InvalidInput("at least one status is required".into()).into());
            }
            self.read("find_pets_by_status", || {
                self.store.find_pets_by_status(statuses)
            })
            .await
        }
        .await;
        observe(Operation::FindPetsByStatus, principal, res)
    }

    pub async fn find_pets_by_tags(
        &self,
        principal: &Principal,
        tags: &[String],
    ) -> Result<Vec<Pet>, KernelError> {
        let res: Result<Vec<Pet>, KernelError> = async {
            self.gate(principal, Operation::FindPetsByTags)?;
            if tags.is_empty() {
                return Ok(Vec::new());
            }
            self.read("find_pets_by_tags", || self.store.find_pets_by_tags(tags))
                .await
        }
        .await;
        observe(Operation::FindPetsByTags, principal, res)
    }

    pub async fn inventory(&self, principal: &Principal) -> Result<Inventory, KernelError> {
        let res: Result<Inventory, KernelError> = async {
            self.gate(principal, Operation::GetInventory)?;
            let counts = self
                .read("pet_status_counts", || self.store.pet_status_counts())
                .await?;
            Ok(Inventory::from_counts(counts))
        }
        .await;
        observe(Operation::GetInventory, principal, res)
    }

    /// New pets always start `available`.
    pub async fn add_pet(&self, principal: &Principal, new: NewPet) -> Result<Pet, KernelError> {
        let res: Result<Pet, KernelError> = async {
            self.gate(principal, Operation::AddPet)?;
            if new.name.trim().is_empty() {
                return Err(Rejection::InvalidInput("pet name is required".into()).into());
            }

            let mut tx = self.store.begin().await.map_err(write_failure)?;
            let pet = tx.insert_pet(&new).await.map_err(write_failure)?;
            tx.commit().await.map_err(write_failure)?;

            info!(pet_id = %pet.id, user_id = %principal.id, role = %principal.role, "pet added");
            Ok(pet)
        }
        .await;
        observe(Operation::AddPet, principal, res)
    }

    /// Update descriptive fields. A requested status goes through the pet
    /// state machine with the caller as actor, so only a same-state no-op or
    /// an admin relist can succeed.
    pub async fn update_pet(
        &self,
        principal: &Principal,
        update: PetUpdate,
    ) -> Result<Pet, KernelError> {
        let res: Result<Pet, KernelError> = async {
            self.gate(principal, Operation::UpdatePet)?;
            if matches!(&update.name, Some(n) if n.trim().is_empty()) {
                return Err(Rejection::InvalidInput("pet name must not be empty".into()).into());
            }

            let mut tx = self.store.begin().await.map_err(write_failure)?;
            let current = tx
                .lock_pet(update.id)
                .await
                .map_err(write_failure)?
                .ok_or(Rejection::NotFound)?;

            let mut next = match update.status {
                Some(to) => pet::transition(&current, to, Actor::Principal(principal))?,
                None => current.clone(),
            };
            if let Some(name) = update.name {
                next.name = name;
            }
            if let Some(category) = update.category {
                next.category = Some(category);
            }
            if let Some(tags) = update.tags {
                next.tags = tags;
            }
            if let Some(photo_urls) = update.photo_urls {
                next.photo_urls = photo_urls;
            }

            tx.update_pet(&next).await.map_err(write_failure)?;
            tx.commit().await.map_err(write_failure)?;

            if current.status != next.status {
                info!(pet_id = %next.id, user_id = %principal.id, from = %current.status, to = %next.status, "pet relisted");
            } else {
                info!(pet_id = %next.id, user_id = %principal.id, "pet updated");
            }
            Ok(next)
        }
        .await;
        observe(Operation::UpdatePet, principal, res)
    }

    /// `sold -> available`, admin only.
    pub async fn relist_pet(&self, principal: &Principal, id: PetId) -> Result<Pet, KernelError> {
        let res: Result<Pet, KernelError> = async {
            self.gate(principal, Operation::RelistPet)?;

            let mut tx = self.store.begin().await.map_err(write_failure)?;
            let current = tx
                .lock_pet(id)
                .await
                .map_err(write_failure)?
                .ok_or(Rejection::NotFound)?;
            let next = pet::transition(&current, PetStatus::Available, Actor::Principal(principal))?;
            if next.status != current.status {
                tx.update_pet(&next).await.map_err(write_failure)?;
                tx.commit().await.map_err(write_failure)?;
                info!(pet_id = %id, user_id = %principal.id, "pet relisted");
            }
            Ok(next)
        }
        .await;
        observe(Operation::RelistPet, principal, res)
    }

    /// Delete a pet and its order history. Refused while an active order
    /// holds the pet.
    pub async fn delete_pet(&self, principal: &Principal, id: PetId) -> Result<(), KernelError> {
        let res: Result<(), KernelError> = async {
            self.gate(principal, Operation::DeletePet)?;

            let mut tx = self.store.begin().await.map_err(write_failure)?;
            tx.lock_pet(id)
                .await
                .map_err(write_failure)?
                .ok_or(Rejection::NotFound)?;
            let active = tx
                .find_active_order_for_pet(id)
                .await
                .map_err(write_failure)?;
            if !pet::can_delete(active.as_ref()) {
                return Err(Rejection::PetHasActiveOrder.into());
            }
            tx.delete_pet(id).await.map_err(write_failure)?;
            tx.commit().await.map_err(write_failure)?;

            info!(pet_id = %id, user_id = %principal.id, "pet deleted");
            Ok(())
        }
        .await;
        observe(Operation::DeletePet, principal, res)
    }

    // -----------------------------------------------------------------------
    // Orders
    // -----------------------------------------------------------------------

    /// Claim an available pet for `principal`.
    ///
    /// Availability is re-checked under the pet row lock, so of two
    /// concurrent calls on one pet exactly one succeeds.
    pub async fn place_order(
        &self,
        principal: &Principal,
        req: PlaceOrder,
    ) -> Result<Order, KernelError> {
        let res: Result<Order, KernelError> = async {
            self.gate(principal, Operation::PlaceOrder)?;
            if req.quantity != 1 {
                return Err(Rejection::InvalidQuantity.into());
            }

            let mut tx = self.store.begin().await.map_err(write_failure)?;
            let current = tx
                .lock_pet(req.pet_id)
                .await
                .map_err(write_failure)?
                .ok_or(Rejection::NotFound)?;
            if current.status != PetStatus::Available {
                return Err(Rejection::PetUnavailable.into());
            }
            if tx
                .find_active_order_for_pet(req.pet_id)
                .await
                .map_err(write_failure)?
                .is_some()
            {
                return Err(Rejection::PetAlreadyOrdered.into());
            }

            let order = tx
                .insert_order(&NewOrder {
                    pet_id: req.pet_id,
                    user_id: principal.id,
                    quantity: req.quantity,
                    ship_date: req.ship_date,
                })
                .await
                .map_err(write_failure)?;
            let claimed = pet::transition(&current, PetStatus::Pending, Actor::System)?;
            tx.update_pet(&claimed).await.map_err(write_failure)?;
            tx.commit().await.map_err(write_failure)?;

            info!(order_id = %order.id, pet_id = %order.pet_id, user_id = %order.user_id, "order placed");
            Ok(order)
        }
        .await;
        observe(Operation::PlaceOrder, principal, res)
    }

    pub async fn get_order(&self, principal: &Principal, id: OrderId) -> Result<Order, KernelError> {
        let res: Result<Order, KernelError> = async {
            self.gate(principal, Operation::GetOrder)?;
            let order = self
                .read("get_order", || self.store.get_order(id))
                .await?
                .ok_or(Rejection::NotFound)?;
            self.check_owner(principal, Operation::GetOrder, ResourceRef::OwnedBy(order.user_id))?;
            Ok(order)
        }
        .await;
        observe(Operation::GetOrder, principal, res)
    }

    /// Move an order forward. Delivery marks the order complete and the pet
    /// sold in the same transaction.
    pub async fn update_order_status(
        &self,
        principal: &Principal,
        id: OrderId,
        to: OrderStatus,
    ) -> Result<Order, KernelError> {
        let res: Result<Order, KernelError> = async {
            self.gate(principal, Operation::UpdateOrderStatus)?;

            let mut tx = self.store.begin().await.map_err(write_failure)?;
            let seen = tx
                .read_order(id)
                .await
                .map_err(write_failure)?
                .ok_or(Rejection::NotFound)?;
            self.check_owner(
                principal,
                Operation::UpdateOrderStatus,
                ResourceRef::OwnedBy(seen.user_id),
            )?;
            let (current, mut order) = lock_pet_then_order(&mut *tx, &seen).await?;
            let from = order.status;
            order.status = self.lifecycle.advance(from, to)?;

            if order.status == OrderStatus::Delivered {
                let sold = pet::transition(&current, PetStatus::Sold, Actor::System)?;
                tx.update_pet(&sold).await.map_err(write_failure)?;
                order.complete = true;
            }
            tx.update_order(&order).await.map_err(write_failure)?;
            tx.commit().await.map_err(write_failure)?;

            info!(order_id = %order.id, pet_id = %order.pet_id, user_id = %principal.id, from = %from, to = %order.status, "order status updated");
            Ok(order)
        }
        .await;
        observe(Operation::UpdateOrderStatus, principal, res)
    }

    /// Delete a `placed` order and release its pet.
    pub async fn cancel_order(
        &self,
        principal: &Principal,
        id: OrderId,
    ) -> Result<CancelledOrder, KernelError> {
        let res: Result<CancelledOrder, KernelError> = async {
            self.gate(principal, Operation::CancelOrder)?;

            let mut tx = self.store.begin().await.map_err(write_failure)?;
            let seen = tx
                .read_order(id)
                .await
                .map_err(write_failure)?
                .ok_or(Rejection::NotFound)?;
            self.check_owner(principal, Operation::CancelOrder, ResourceRef::OwnedBy(seen.user_id))?;
            let (current, order) = lock_pet_then_order(&mut *tx, &seen).await?;
            self.lifecycle.check_cancel(order.status)?;

            let released = pet::transition(&current, PetStatus::Available, Actor::System)?;
            tx.delete_order(order.id).await.map_err(write_failure)?;
            tx.update_pet(&released).await.map_err(write_failure)?;
            tx.commit().await.map_err(write_failure)?;

            info!(order_id = %order.id, pet_id = %order.pet_id, user_id = %principal.id, "order cancelled");
            Ok(CancelledOrder {
                order,
                pet: released,
            })
        }
        .await;
        observe(Operation::CancelOrder, principal, res)
    }

    // -----------------------------------------------------------------------
    // Users
    // -----------------------------------------------------------------------

    /// Register a user. Anyone may register a customer; only an admin may
    /// register a higher role.
    pub async fn register_user(
        &self,
        principal: &Principal,
        new: NewUser,
    ) -> Result<User, KernelError> {
        let res: Result<User, KernelError> = async {
            self.gate(principal, Operation::RegisterUser)?;
            if new.username.trim().is_empty() {
                return Err(Rejection::InvalidInput("username is required".into()).into());
            }
            let role = new.role.unwrap_or(Role::Customer);
            if role == Role::Guest {
                return Err(Rejection::InvalidInput("guest is not a registrable role".into()).into());
            }
            if role != Role::Customer && principal.role != Role::Admin {
                return Err(Rejection::InsufficientRole.into());
            }

            let mut tx = self.store.begin().await.map_err(write_failure)?;
            if tx
                .lock_user(&new.username)
                .await
                .map_err(write_failure)?
                .is_some()
            {
                return Err(Rejection::UsernameTaken.into());
            }
            let user = tx.insert_user(&new, role).await.map_err(write_failure)?;
            tx.commit().await.map_err(write_failure)?;

            info!(user_id = %user.id, role = %user.role, "user registered");
            Ok(user)
        }
        .await;
        observe(Operation::RegisterUser, principal, res)
    }

    pub async fn get_user(&self, principal: &Principal, username: &str) -> Result<User, KernelError> {
        let res: Result<User, KernelError> = async {
            self.gate(principal, Operation::GetUser)?;
            let user = self
                .read("get_user", || self.store.get_user_by_username(username))
                .await?
                .ok_or(Rejection::NotFound)?;
            self.check_owner(principal, Operation::GetUser, ResourceRef::Profile(user.id))?;
            Ok(user)
        }
        .await;
        observe(Operation::GetUser, principal, res)
    }

    /// Update profile fields. Changing `role` is admin only.
    pub async fn update_user(
        &self,
        principal: &Principal,
        username: &str,
        update: UserUpdate,
    ) -> Result<User, KernelError> {
        let res: Result<User, KernelError> = async {
            self.gate(principal, Operation::UpdateUser)?;

            let mut tx = self.store.begin().await.map_err(write_failure)?;
            let mut user = tx
                .lock_user(username)
                .await
                .map_err(write_failure)?
                .ok_or(Rejection::NotFound)?;
            self.check_owner(principal, Operation::UpdateUser, ResourceRef::Profile(user.id))?;

            if let Some(role) = update.role {
                if role != user.role && principal.role != Role::Admin {
                    return Err(Rejection::InsufficientRole.into());
                }
                if role == Role::Guest {
                    return Err(Rejection::InvalidInput("guest is not an assignable role".into()).into());
                }
                user.role = role;
            }
            if update.first_name.is_some() {
                user.first_name = update.first_name;
            }
            if update.last_name.is_some() {
                user.last_name = update.last_name;
            }
            if update.email.is_some() {
                user.email = update.email;
            }
            if update.phone.is_some() {
                user.phone = update.phone;
            }

            tx.update_user(&user).await.map_err(write_failure)?;
            tx.commit().await.map_err(write_failure)?;

            info!(user_id = %user.id, role = %user.role, "user updated");
            Ok(user)
        }
        .await;
        observe(Operation::UpdateUser, principal, res)
    }

    /// Delete a user. Refused while the user owns an active order; delivered
    /// orders stay as history.
    pub async fn delete_user(&self, principal: &Principal, username: &str) -> Result<(), KernelError> {
        let res: Result<(), KernelError> = async {
            self.gate(principal, Operation::DeleteUser)?;

            let mut tx = self.store.begin().await.map_err(write_failure)?;
            let user = tx
                .lock_user(username)
                .await
                .map_err(write_failure)?
                .ok_or(Rejection::NotFound)?;
            self.check_owner(principal, Operation::DeleteUser, ResourceRef::Profile(user.id))?;
            let active = tx
                .count_active_orders_for_user(user.id)
                .await
                .map_err(write_failure)?;
            if active > 0 {
                return Err(Rejection::UserHasActiveOrders.into());
            }
            tx.delete_user(user.id).await.map_err(write_failure)?;
            tx.commit().await.map_err(write_failure)?;

            info!(user_id = %user.id, by = %principal.id, "user deleted");
            Ok(())
        }
        .await;
        observe(Operation::DeleteUser, principal, res)
    }

    // -----------------------------------------------------------------------
    // Internals
    // -----------------------------------------------------------------------

    fn gate(&self, principal: &Principal, op: Operation) -> Result<(), KernelError> {
        role_gate(&self.policy, principal, op).into_result()?;
        Ok(())
    }

    fn check_owner(
        &self,
        principal: &Principal,
        op: Operation,
        resource: ResourceRef,
    ) -> Result<(), KernelError> {
        authorize(&self.policy, principal, op, resource).into_result()?;
        Ok(())
    }

    /// Run a read, retrying storage failures with linear backoff.
    async fn read<T, F, Fut>(&self, what: &'static str, mut call: F) -> Result<T, KernelError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = StoreResult<T>>,
    {
        let mut attempt: u32 = 0;
        loop {
            match call().await {
                Ok(v) => return Ok(v),
                Err(e) if attempt < self.storage.read_retry_attempts => {
                    attempt += 1;
                    warn!(op = what, attempt, error = %e, "storage read failed; retrying");
                    tokio::time::sleep(self.storage.backoff(attempt)).await;
                }
                Err(e) => return Err(KernelError::Storage(StorageFailure::read(e))),
            }
        }
    }
}

/// Lock the pet of an order already read without a lock, then lock the
/// order itself. The order may have been cancelled, or its pet deleted,
/// between the read and the locks; both surface as `NotFound`.
async fn lock_pet_then_order(
    tx: &mut dyn StoreTx,
    seen: &Order,
) -> Result<(Pet, Order), KernelError> {
    let pet = tx
        .lock_pet(seen.pet_id)
        .await
        .map_err(write_failure)?
        .ok_or(Rejection::NotFound)?;
    let order = tx
        .lock_order(seen.id)
        .await
        .map_err(write_failure)?
        .filter(|o| o.pet_id == pet.id)
        .ok_or(Rejection::NotFound)?;
    Ok((pet, order))
}

/// Map a storage error raised inside a write path. Known constraint
/// violations become the rejection they guard; everything else is a
/// non-retryable write failure.
fn write_failure(e: StorageError) -> KernelError {
    match &e {
        StorageError::Conflict { constraint } if constraint == ACTIVE_ORDER_CONSTRAINT => {
            Rejection::PetAlreadyOrdered.into()
        }
        StorageError::Conflict { constraint } if constraint == USERNAME_CONSTRAINT => {
            Rejection::UsernameTaken.into()
        }
        _ => KernelError::Storage(StorageFailure::write(e)),
    }
}

fn observe<T>(
    op: Operation,
    principal: &Principal,
    res: Result<T, KernelError>,
) -> Result<T, KernelError> {
    match &res {
        Err(KernelError::Rejected(r)) => {
            debug!(op = op.as_str(), user_id = %principal.id, role = %principal.role, reason = %r, "rejected");
        }
        Err(KernelError::Storage(s)) => {
            warn!(op = op.as_str(), user_id = %principal.id, error = %s, "storage failure");
        }
        Ok(_) => {}
    }
    res
}
