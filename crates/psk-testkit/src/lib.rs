//! psk-testkit
//!
//! Fixtures for scenario tests: principals, seeded in-memory stores, a
//! status-invariant checker, [`FlakyStore`], a backend wrapper that
//! injects storage failures, and [`RecordingStore`], which logs the
//! transaction calls the kernel makes.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::{bail, Result};
use psk_config::{load_layered_yaml, KernelConfig};
use psk_engine::{
    MemoryStore, StorageError, StoreBackend, StoreKernel, StoreResult, StoreState, StoreTx,
};
use psk_schemas::{
    NewOrder, NewPet, NewUser, Order, OrderId, OrderStatus, Pet, PetId, PetStatus, Principal,
    Role, Tag, User, UserId,
};

// ---------------------------------------------------------------------------
// Principals
// ---------------------------------------------------------------------------

pub fn customer(id: i64) -> Principal {
    Principal::new(UserId(id), Role::Customer)
}

pub fn store_owner(id: i64) -> Principal {
    Principal::new(UserId(id), Role::StoreOwner)
}

pub fn admin(id: i64) -> Principal {
    Principal::new(UserId(id), Role::Admin)
}

// ---------------------------------------------------------------------------
// Pets and stores
// ---------------------------------------------------------------------------

pub fn new_pet(name: &str) -> NewPet {
    NewPet {
        name: name.to_string(),
        ..NewPet::default()
    }
}

pub fn tagged_pet(name: &str, tags: &[&str]) -> NewPet {
    NewPet {
        name: name.to_string(),
        tags: tags
            .iter()
            .enumerate()
            .map(|(i, t)| Tag {
                id: i as i64 + 1,
                name: t.to_string(),
            })
            .collect(),
        ..NewPet::default()
    }
}

/// Store seeded with one pet per `(name, status)`, in order.
pub async fn seeded_store(pets: &[(&str, PetStatus)]) -> (MemoryStore, Vec<Pet>) {
    let store = MemoryStore::new();
    let mut out = Vec::with_capacity(pets.len());
    for (name, status) in pets {
        out.push(store.seed_pet(new_pet(name), *status).await);
    }
    (store, out)
}

/// Kernel over a fresh store holding `n` available pets.
pub async fn kernel_with_available(n: usize) -> (StoreKernel<MemoryStore>, MemoryStore, Vec<Pet>) {
    let names: Vec<String> = (1..=n).map(|i| format!("pet-{i}")).collect();
    let layout: Vec<(&str, PetStatus)> = names
        .iter()
        .map(|s| (s.as_str(), PetStatus::Available))
        .collect();
    let (store, pets) = seeded_store(&layout).await;
    (StoreKernel::new(store.clone()), store, pets)
}

/// Load layered YAML files into a typed kernel config.
pub fn load_kernel_config(paths: &[&str]) -> Result<KernelConfig> {
    let loaded = load_layered_yaml(paths)?;
    KernelConfig::from_loaded(&loaded)
}

// ---------------------------------------------------------------------------
// Invariants
// ---------------------------------------------------------------------------

/// Check the pet/order consistency rules over a full store snapshot:
///
/// - at most one active order per pet
/// - a pet with an active order is `pending`; a `pending` pet has one
/// - a `sold` pet's most recent order is `delivered`
/// - every order has quantity 1 and `complete == (status == delivered)`
/// - every order references an existing pet
pub fn check_invariants(state: &StoreState) -> Result<()> {
    for order in state.orders.values() {
        if order.quantity != 1 {
            bail!("order {} has quantity {}", order.id, order.quantity);
        }
        if order.complete != (order.status == OrderStatus::Delivered) {
            bail!("order {} complete flag disagrees with status {}", order.id, order.status);
        }
        if !state.pets.contains_key(&order.pet_id) {
            bail!("order {} references missing pet {}", order.id, order.pet_id);
        }
    }

    for pet in state.pets.values() {
        let orders = state.orders_for_pet(pet.id);
        let active: Vec<&&Order> = orders.iter().filter(|o| o.status.is_active()).collect();
        if active.len() > 1 {
            bail!("pet {} has {} active orders", pet.id, active.len());
        }
        match (pet.status, active.len()) {
            (PetStatus::Pending, 1) => {}
            (PetStatus::Pending, _) => bail!("pet {} is pending with no active order", pet.id),
            (status, 1) => bail!("pet {} is {} but has an active order", pet.id, status),
            (PetStatus::Sold, _) => {
                let latest = orders.iter().max_by_key(|o| o.id);
                if latest.map(|o| o.status) != Some(OrderStatus::Delivered) {
                    bail!("pet {} is sold but its latest order is not delivered", pet.id);
                }
            }
            (PetStatus::Available, _) => {}
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// FlakyStore
// ---------------------------------------------------------------------------

/// Wraps a backend and fails reads or `begin` on demand.
///
/// Counters record every call that reached the wrapper, failed or not, so a
/// test can assert how many attempts the kernel made.
pub struct FlakyStore<S> {
    inner: S,
    fail_reads: AtomicU32,
    fail_begin: AtomicBool,
    read_calls: AtomicU32,
    begin_calls: AtomicU32,
}

impl<S: StoreBackend> FlakyStore<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            fail_reads: AtomicU32::new(0),
            fail_begin: AtomicBool::new(false),
            read_calls: AtomicU32::new(0),
            begin_calls: AtomicU32::new(0),
        }
    }

    /// The next `n` reads fail with `StorageError::Unavailable`.
    pub fn fail_next_reads(&self, n: u32) {
        self.fail_reads.store(n, Ordering::SeqCst);
    }

    /// While set, every `begin` fails.
    pub fn fail_begin(&self, on: bool) {
        self.fail_begin.store(on, Ordering::SeqCst);
    }

    pub fn read_calls(&self) -> u32 {
        self.read_calls.load(Ordering::SeqCst)
    }

    pub fn begin_calls(&self) -> u32 {
        self.begin_calls.load(Ordering::SeqCst)
    }

    fn tick_read(&self) -> StoreResult<()> {
        self.read_calls.fetch_add(1, Ordering::SeqCst);
        let injected = self
            .fail_reads
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if injected {
            return Err(StorageError::unavailable(anyhow::anyhow!(
                "injected read failure"
            )));
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl<S: StoreBackend> StoreBackend for FlakyStore<S> {
    async fn get_pet(&self, id: PetId) -> StoreResult<Option<Pet>> {
        self.tick_read()?;
        self.inner.get_pet(id).await
    }

    async fn find_pets_by_status(&self, statuses: &[PetStatus]) -> StoreResult<Vec<Pet>> {
        self.tick_read()?;
        self.inner.find_pets_by_status(statuses).await
    }

    async fn find_pets_by_tags(&self, tags: &[String]) -> StoreResult<Vec<Pet>> {
        self.tick_read()?;
        self.inner.find_pets_by_tags(tags).await
    }

    async fn pet_status_counts(&self) -> StoreResult<Vec<(PetStatus, i64)>> {
        self.tick_read()?;
        self.inner.pet_status_counts().await
    }

    async fn get_order(&self, id: OrderId) -> StoreResult<Option<Order>> {
        self.tick_read()?;
        self.inner.get_order(id).await
    }

    async fn get_user_by_username(&self, username: &str) -> StoreResult<Option<User>> {
        self.tick_read()?;
        self.inner.get_user_by_username(username).await
    }

    async fn begin(&self) -> StoreResult<Box<dyn StoreTx>> {
        self.begin_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_begin.load(Ordering::SeqCst) {
            return Err(StorageError::unavailable(anyhow::anyhow!(
                "injected begin failure"
            )));
        }
        self.inner.begin().await
    }
}

// ---------------------------------------------------------------------------
// RecordingStore
// ---------------------------------------------------------------------------

/// Wraps a backend and appends the name of every transaction call to a
/// shared journal. `begin` and `commit` are journaled too.
pub struct RecordingStore<S> {
    inner: S,
    journal: Arc<Mutex<Vec<&'static str>>>,
}

impl<S: StoreBackend> RecordingStore<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            journal: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Calls recorded so far, oldest first.
    pub fn journal(&self) -> Vec<&'static str> {
        match self.journal.lock() {
            Ok(j) => j.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn clear(&self) {
        match self.journal.lock() {
            Ok(mut j) => j.clear(),
            Err(poisoned) => poisoned.into_inner().clear(),
        }
    }
}

fn record(journal: &Mutex<Vec<&'static str>>, call: &'static str) {
    match journal.lock() {
        Ok(mut j) => j.push(call),
        Err(poisoned) => poisoned.into_inner().push(call),
    }
}

#[async_trait::async_trait]
impl<S: StoreBackend> StoreBackend for RecordingStore<S> {
    async fn get_pet(&self, id: PetId) -> StoreResult<Option<Pet>> {
        self.inner.get_pet(id).await
    }

    async fn find_pets_by_status(&self, statuses: &[PetStatus]) -> StoreResult<Vec<Pet>> {
        self.inner.find_pets_by_status(statuses).await
    }

    async fn find_pets_by_tags(&self, tags: &[String]) -> StoreResult<Vec<Pet>> {
        self.inner.find_pets_by_tags(tags).await
    }

    async fn pet_status_counts(&self) -> StoreResult<Vec<(PetStatus, i64)>> {
        self.inner.pet_status_counts().await
    }

    async fn get_order(&self, id: OrderId) -> StoreResult<Option<Order>> {
        self.inner.get_order(id).await
    }

    async fn get_user_by_username(&self, username: &str) -> StoreResult<Option<User>> {
        self.inner.get_user_by_username(username).await
    }

    async fn begin(&self) -> StoreResult<Box<dyn StoreTx>> {
        record(&self.journal, "begin");
        let inner = self.inner.begin().await?;
        Ok(Box::new(RecordingTx {
            inner,
            journal: Arc::clone(&self.journal),
        }))
    }
}

struct RecordingTx {
    inner: Box<dyn StoreTx>,
    journal: Arc<Mutex<Vec<&'static str>>>,
}

impl RecordingTx {
    fn note(&self, call: &'static str) {
        record(&self.journal, call);
    }
}

#[async_trait::async_trait]
impl StoreTx for RecordingTx {
    async fn lock_pet(&mut self, id: PetId) -> StoreResult<Option<Pet>> {
        self.note("lock_pet");
        self.inner.lock_pet(id).await
    }

    async fn find_active_order_for_pet(&mut self, pet_id: PetId) -> StoreResult<Option<Order>> {
        self.note("find_active_order_for_pet");
        self.inner.find_active_order_for_pet(pet_id).await
    }

    async fn read_order(&mut self, id: OrderId) -> StoreResult<Option<Order>> {
        self.note("read_order");
        self.inner.read_order(id).await
    }

    async fn lock_order(&mut self, id: OrderId) -> StoreResult<Option<Order>> {
        self.note("lock_order");
        self.inner.lock_order(id).await
    }

    async fn lock_user(&mut self, username: &str) -> StoreResult<Option<User>> {
        self.note("lock_user");
        self.inner.lock_user(username).await
    }

    async fn count_active_orders_for_user(&mut self, user_id: UserId) -> StoreResult<i64> {
        self.note("count_active_orders_for_user");
        self.inner.count_active_orders_for_user(user_id).await
    }

    async fn insert_pet(&mut self, pet: &NewPet) -> StoreResult<Pet> {
        self.note("insert_pet");
        self.inner.insert_pet(pet).await
    }

    async fn update_pet(&mut self, pet: &Pet) -> StoreResult<()> {
        self.note("update_pet");
        self.inner.update_pet(pet).await
    }

    async fn delete_pet(&mut self, id: PetId) -> StoreResult<()> {
        self.note("delete_pet");
        self.inner.delete_pet(id).await
    }

    async fn insert_order(&mut self, order: &NewOrder) -> StoreResult<Order> {
        self.note("insert_order");
        self.inner.insert_order(order).await
    }

    async fn update_order(&mut self, order: &Order) -> StoreResult<()> {
        self.note("update_order");
        self.inner.update_order(order).await
    }

    async fn delete_order(&mut self, id: OrderId) -> StoreResult<()> {
        self.note("delete_order");
        self.inner.delete_order(id).await
    }

    async fn insert_user(&mut self, user: &NewUser, role: Role) -> StoreResult<User> {
        self.note("insert_user");
        self.inner.insert_user(user, role).await
    }

    async fn update_user(&mut self, user: &User) -> StoreResult<()> {
        self.note("update_user");
        self.inner.update_user(user).await
    }

    async fn delete_user(&mut self, id: UserId) -> StoreResult<()> {
        self.note("delete_user");
        self.inner.delete_user(id).await
    }

    async fn commit(self: Box<Self>) -> StoreResult<()> {
        self.note("commit");
        self.inner.commit().await
    }
}
