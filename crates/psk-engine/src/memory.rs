//! In-process store.
//!
//! One `tokio::sync::Mutex` guards the whole state. A transaction holds the
//! owned guard until it commits or drops, staging writes on a working copy
//! that replaces the guarded state on commit.

use std::collections::BTreeMap;
use std::sync::Arc;

use psk_schemas::{
    NewOrder, NewPet, NewUser, Order, OrderId, OrderStatus, Pet, PetId, PetStatus, Role, User,
    UserId,
};
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::error::StorageError;
use crate::store::{
    StoreBackend, StoreResult, StoreTx, ACTIVE_ORDER_CONSTRAINT, USERNAME_CONSTRAINT,
};

/// Full contents of a [`MemoryStore`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoreState {
    pub pets: BTreeMap<PetId, Pet>,
    pub orders: BTreeMap<OrderId, Order>,
    pub users: BTreeMap<UserId, User>,
    last_pet_id: i64,
    last_order_id: i64,
    last_user_id: i64,
}

impl StoreState {
    fn next_pet_id(&mut self) -> PetId {
        self.last_pet_id += 1;
        PetId(self.last_pet_id)
    }

    fn next_order_id(&mut self) -> OrderId {
        self.last_order_id += 1;
        OrderId(self.last_order_id)
    }

    fn next_user_id(&mut self) -> UserId {
        self.last_user_id += 1;
        UserId(self.last_user_id)
    }

    fn active_order_for_pet(&self, pet_id: PetId) -> Option<&Order> {
        self.orders
            .values()
            .find(|o| o.pet_id == pet_id && o.status.is_active())
    }

    /// Orders referencing `pet_id`, oldest first.
    pub fn orders_for_pet(&self, pet_id: PetId) -> Vec<&Order> {
        self.orders.values().filter(|o| o.pet_id == pet_id).collect()
    }

    fn insert_pet_row(&mut self, pet: &NewPet, status: PetStatus) -> Pet {
        let id = self.next_pet_id();
        let row = Pet {
            id,
            name: pet.name.clone(),
            category: pet.category.clone(),
            tags: pet.tags.clone(),
            photo_urls: pet.photo_urls.clone(),
            status,
        };
        self.pets.insert(id, row.clone());
        row
    }

    fn insert_order_row(&mut self, order: &NewOrder, status: OrderStatus) -> StoreResult<Order> {
        if status.is_active() && self.active_order_for_pet(order.pet_id).is_some() {
            return Err(StorageError::Conflict {
                constraint: ACTIVE_ORDER_CONSTRAINT.to_string(),
            });
        }
        let id = self.next_order_id();
        let row = Order {
            id,
            pet_id: order.pet_id,
            user_id: order.user_id,
            quantity: order.quantity,
            status,
            ship_date: order.ship_date,
            complete: status == OrderStatus::Delivered,
        };
        self.orders.insert(id, row.clone());
        Ok(row)
    }

    fn insert_user_row(&mut self, user: &NewUser, role: Role) -> StoreResult<User> {
        if self.users.values().any(|u| u.username == user.username) {
            return Err(StorageError::Conflict {
                constraint: USERNAME_CONSTRAINT.to_string(),
            });
        }
        let id = self.next_user_id();
        let row = User {
            id,
            username: user.username.clone(),
            first_name: user.first_name.clone(),
            last_name: user.last_name.clone(),
            email: user.email.clone(),
            phone: user.phone.clone(),
            role,
        };
        self.users.insert(id, row.clone());
        Ok(row)
    }
}

#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<StoreState>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of the current committed state.
    pub async fn snapshot(&self) -> StoreState {
        self.state.lock().await.clone()
    }

    /// Insert a pet directly with any status. Fixture use only; bypasses the
    /// kernel and its transition rules.
    pub async fn seed_pet(&self, pet: NewPet, status: PetStatus) -> Pet {
        self.state.lock().await.insert_pet_row(&pet, status)
    }

    /// Insert a user directly with any role.
    pub async fn seed_user(&self, username: &str, role: Role) -> StoreResult<User> {
        self.state
            .lock()
            .await
            .insert_user_row(&NewUser::customer(username), role)
    }

    /// Insert an order directly with any status. The pet's status is not
    /// touched.
    pub async fn seed_order(&self, order: NewOrder, status: OrderStatus) -> StoreResult<Order> {
        self.state.lock().await.insert_order_row(&order, status)
    }
}

#[async_trait::async_trait]
impl StoreBackend for MemoryStore {
    async fn get_pet(&self, id: PetId) -> StoreResult<Option<Pet>> {
        Ok(self.state.lock().await.pets.get(&id).cloned())
    }

    async fn find_pets_by_status(&self, statuses: &[PetStatus]) -> StoreResult<Vec<Pet>> {
        let st = self.state.lock().await;
        Ok(st
            .pets
            .values()
            .filter(|p| statuses.contains(&p.status))
            .cloned()
            .collect())
    }

    async fn find_pets_by_tags(&self, tags: &[String]) -> StoreResult<Vec<Pet>> {
        let st = self.state.lock().await;
        Ok(st
            .pets
            .values()
            .filter(|p| p.has_any_tag(tags))
            .cloned()
            .collect())
    }

    async fn pet_status_counts(&self) -> StoreResult<Vec<(PetStatus, i64)>> {
        let st = self.state.lock().await;
        let mut counts: BTreeMap<PetStatus, i64> = BTreeMap::new();
        for p in st.pets.values() {
            *counts.entry(p.status).or_insert(0) += 1;
        }
        Ok(counts.into_iter().collect())
    }

    async fn get_order(&self, id: OrderId) -> StoreResult<Option<Order>> {
        Ok(self.state.lock().await.orders.get(&id).cloned())
    }

    async fn get_user_by_username(&self, username: &str) -> StoreResult<Option<User>> {
        let st = self.state.lock().await;
        Ok(st.users.values().find(|u| u.username == username).cloned())
    }

    async fn begin(&self) -> StoreResult<Box<dyn StoreTx>> {
        let guard = Arc::clone(&self.state).lock_owned().await;
        let work = guard.clone();
        Ok(Box::new(MemoryTx { guard, work }))
    }
}

/// Transaction over a [`MemoryStore`]. Holds the store lock until commit
/// or drop.
pub struct MemoryTx {
    guard: OwnedMutexGuard<StoreState>,
    work: StoreState,
}

#[async_trait::async_trait]
impl StoreTx for MemoryTx {
    async fn lock_pet(&mut self, id: PetId) -> StoreResult<Option<Pet>> {
        Ok(self.work.pets.get(&id).cloned())
    }

    async fn find_active_order_for_pet(&mut self, pet_id: PetId) -> StoreResult<Option<Order>> {
        Ok(self.work.active_order_for_pet(pet_id).cloned())
    }

    async fn read_order(&mut self, id: OrderId) -> StoreResult<Option<Order>> {
        Ok(self.work.orders.get(&id).cloned())
    }

    async fn lock_order(&mut self, id: OrderId) -> StoreResult<Option<Order>> {
        Ok(self.work.orders.get(&id).cloned())
    }

    async fn lock_user(&mut self, username: &str) -> StoreResult<Option<User>> {
        Ok(self
            .work
            .users
            .values()
            .find(|u| u.username == username)
            .cloned())
    }

    async fn count_active_orders_for_user(&mut self, user_id: UserId) -> StoreResult<i64> {
        let n = self
            .work
            .orders
            .values()
            .filter(|o| o.user_id == user_id && o.status.is_active())
            .count();
        Ok(n as i64)
    }

    async fn insert_pet(&mut self, pet: &NewPet) -> StoreResult<Pet> {
        Ok(self.work.insert_pet_row(pet, PetStatus::Available))
    }

    async fn update_pet(&mut self, pet: &Pet) -> StoreResult<()> {
        match self.work.pets.get_mut(&pet.id) {
            Some(row) => {
                *row = pet.clone();
                Ok(())
            }
            None => Err(StorageError::unavailable(anyhow::anyhow!(
                "update_pet: pet {} vanished inside tx",
                pet.id
            ))),
        }
    }

    async fn delete_pet(&mut self, id: PetId) -> StoreResult<()> {
        self.work.orders.retain(|_, o| o.pet_id != id);
        self.work.pets.remove(&id);
        Ok(())
    }

    async fn insert_order(&mut self, order: &NewOrder) -> StoreResult<Order> {
        self.work.insert_order_row(order, OrderStatus::Placed)
    }

    async fn update_order(&mut self, order: &Order) -> StoreResult<()> {
        match self.work.orders.get_mut(&order.id) {
            Some(row) => {
                *row = order.clone();
                Ok(())
            }
            None => Err(StorageError::unavailable(anyhow::anyhow!(
                "update_order: order {} vanished inside tx",
                order.id
            ))),
        }
    }

    async fn delete_order(&mut self, id: OrderId) -> StoreResult<()> {
        self.work.orders.remove(&id);
        Ok(())
    }

    async fn insert_user(&mut self, user: &NewUser, role: Role) -> StoreResult<User> {
        self.work.insert_user_row(user, role)
    }

    async fn update_user(&mut self, user: &User) -> StoreResult<()> {
        match self.work.users.get_mut(&user.id) {
            Some(row) => {
                *row = user.clone();
                Ok(())
            }
            None => Err(StorageError::unavailable(anyhow::anyhow!(
                "update_user: user {} vanished inside tx",
                user.id
            ))),
        }
    }

    async fn delete_user(&mut self, id: UserId) -> StoreResult<()> {
        self.work.users.remove(&id);
        Ok(())
    }

    async fn commit(self: Box<Self>) -> StoreResult<()> {
        let MemoryTx { mut guard, work } = *self;
        *guard = work;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_pet(name: &str) -> NewPet {
        NewPet {
            name: name.into(),
            ..NewPet::default()
        }
    }

    #[tokio::test]
    async fn dropped_tx_discards_writes() {
        let store = MemoryStore::new();
        {
            let mut tx = store.begin().await.unwrap();
            tx.insert_pet(&new_pet("ghost")).await.unwrap();
        }
        assert!(store.snapshot().await.pets.is_empty());
    }

    #[tokio::test]
    async fn committed_tx_is_visible() {
        let store = MemoryStore::new();
        let mut tx = store.begin().await.unwrap();
        let pet = tx.insert_pet(&new_pet("rex")).await.unwrap();
        tx.commit().await.unwrap();
        assert_eq!(store.get_pet(pet.id).await.unwrap().unwrap().status, PetStatus::Available);
    }

    #[tokio::test]
    async fn second_active_order_hits_constraint() {
        let store = MemoryStore::new();
        let pet = store.seed_pet(new_pet("rex"), PetStatus::Available).await;
        let order = NewOrder {
            pet_id: pet.id,
            user_id: UserId(7),
            quantity: 1,
            ship_date: None,
        };
        store.seed_order(order.clone(), OrderStatus::Placed).await.unwrap();
        let mut tx = store.begin().await.unwrap();
        match tx.insert_order(&order).await {
            Err(StorageError::Conflict { constraint }) => {
                assert_eq!(constraint, ACTIVE_ORDER_CONSTRAINT)
            }
            other => panic!("expected conflict, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn duplicate_username_hits_constraint() {
        let store = MemoryStore::new();
        store.seed_user("ann", Role::Customer).await.unwrap();
        let err = store.seed_user("ann", Role::Admin).await.unwrap_err();
        assert!(matches!(err, StorageError::Conflict { .. }));
    }

    #[tokio::test]
    async fn delete_pet_cascades_to_orders() {
        let store = MemoryStore::new();
        let pet = store.seed_pet(new_pet("rex"), PetStatus::Sold).await;
        store
            .seed_order(
                NewOrder {
                    pet_id: pet.id,
                    user_id: UserId(7),
                    quantity: 1,
                    ship_date: None,
                },
                OrderStatus::Delivered,
            )
            .await
            .unwrap();
        let mut tx = store.begin().await.unwrap();
        tx.delete_pet(pet.id).await.unwrap();
        tx.commit().await.unwrap();
        let snap = store.snapshot().await;
        assert!(snap.pets.is_empty());
        assert!(snap.orders.is_empty());
    }
}
