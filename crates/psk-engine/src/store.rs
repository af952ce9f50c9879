//! Persistence collaborator traits.
//!
//! [`StoreBackend`] serves plain reads and opens transactions. Every
//! multi-step write runs inside one [`StoreTx`]: the kernel locks the rows
//! it decides on, re-checks preconditions, writes, then calls
//! [`StoreTx::commit`]. Dropping a tx without committing discards it.
//!
//! Implementations must make `lock_*` exclusive for the life of the tx, so
//! two transactions that lock the same pet serialize.
//!
//! Lock order: the pet row first, then its order row. A writer that starts
//! from an order id uses [`StoreTx::read_order`] to find the pet, locks the
//! pet, then locks and re-reads the order. The pet lock covers every order
//! of that pet, so order lookups by pet take no lock of their own.

use psk_schemas::{
    NewOrder, NewPet, NewUser, Order, OrderId, Pet, PetId, PetStatus, Role, User, UserId,
};

use crate::error::StorageError;

/// Name of the data-level guard allowing one active order per pet.
pub const ACTIVE_ORDER_CONSTRAINT: &str = "uq_orders_active_pet";
/// Name of the unique index on `users.username`.
pub const USERNAME_CONSTRAINT: &str = "uq_users_username";

pub type StoreResult<T> = Result<T, StorageError>;

#[async_trait::async_trait]
pub trait StoreBackend: Send + Sync {
    async fn get_pet(&self, id: PetId) -> StoreResult<Option<Pet>>;

    /// Pets whose status is any of `statuses`, ordered by id.
    async fn find_pets_by_status(&self, statuses: &[PetStatus]) -> StoreResult<Vec<Pet>>;

    /// Pets carrying at least one tag named in `tags`, ordered by id.
    async fn find_pets_by_tags(&self, tags: &[String]) -> StoreResult<Vec<Pet>>;

    /// `(status, count)` for every status with at least one pet.
    async fn pet_status_counts(&self) -> StoreResult<Vec<(PetStatus, i64)>>;

    async fn get_order(&self, id: OrderId) -> StoreResult<Option<Order>>;

    async fn get_user_by_username(&self, username: &str) -> StoreResult<Option<User>>;

    async fn begin(&self) -> StoreResult<Box<dyn StoreTx>>;
}

#[async_trait::async_trait]
pub trait StoreTx: Send {
    /// Load and exclusively lock a pet row.
    async fn lock_pet(&mut self, id: PetId) -> StoreResult<Option<Pet>>;

    /// The order in `placed` or `approved` that references `pet_id`, if any.
    /// Takes no row lock; callers hold the pet lock.
    async fn find_active_order_for_pet(&mut self, pet_id: PetId) -> StoreResult<Option<Order>>;

    /// Order row without a lock, to learn which pet to lock first.
    async fn read_order(&mut self, id: OrderId) -> StoreResult<Option<Order>>;

    /// Load and exclusively lock an order row. Take the pet lock first.
    async fn lock_order(&mut self, id: OrderId) -> StoreResult<Option<Order>>;

    async fn lock_user(&mut self, username: &str) -> StoreResult<Option<User>>;

    async fn count_active_orders_for_user(&mut self, user_id: UserId) -> StoreResult<i64>;

    /// Insert a pet with status `available`.
    async fn insert_pet(&mut self, pet: &NewPet) -> StoreResult<Pet>;

    async fn update_pet(&mut self, pet: &Pet) -> StoreResult<()>;

    /// Delete a pet together with every order that references it.
    async fn delete_pet(&mut self, id: PetId) -> StoreResult<()>;

    /// Insert an order in status `placed`.
    ///
    /// Fails with [`StorageError::Conflict`] naming
    /// [`ACTIVE_ORDER_CONSTRAINT`] if the pet already has an active order.
    async fn insert_order(&mut self, order: &NewOrder) -> StoreResult<Order>;

    async fn update_order(&mut self, order: &Order) -> StoreResult<()>;

    async fn delete_order(&mut self, id: OrderId) -> StoreResult<()>;

    /// Fails with [`StorageError::Conflict`] naming [`USERNAME_CONSTRAINT`]
    /// on a duplicate username.
    async fn insert_user(&mut self, user: &NewUser, role: Role) -> StoreResult<User>;

    async fn update_user(&mut self, user: &User) -> StoreResult<()>;

    async fn delete_user(&mut self, id: UserId) -> StoreResult<()>;

    async fn commit(self: Box<Self>) -> StoreResult<()>;
}
