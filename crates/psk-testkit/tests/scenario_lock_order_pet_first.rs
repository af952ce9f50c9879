//! Scenario: writers lock the pet row before any order row
//!
//! # Invariants under test
//!
//! 1. Every write path that touches both a pet and its order takes the pet
//!    lock first. Two transactions on one pet therefore queue on the same
//!    row and cannot wait on each other in a cycle.
//! 2. Order lookups by pet happen under the pet lock.
//! 3. A writer starting from an order id reads it without a lock, locks
//!    the pet, then locks the order.

use psk_engine::{PlaceOrder, StoreKernel};
use psk_schemas::{OrderStatus, PetStatus};
use psk_testkit::{admin, customer, seeded_store, store_owner, RecordingStore};

fn assert_pet_locked_first(journal: &[&str]) {
    let first_pet_lock = journal
        .iter()
        .position(|c| *c == "lock_pet")
        .unwrap_or_else(|| panic!("no pet lock in {journal:?}"));
    for (i, call) in journal.iter().enumerate() {
        if matches!(*call, "lock_order" | "find_active_order_for_pet") {
            assert!(
                i > first_pet_lock,
                "{call} at {i} precedes the pet lock at {first_pet_lock}: {journal:?}"
            );
        }
    }
}

#[tokio::test]
async fn place_and_delete_check_orders_under_pet_lock() {
    let (store, pets) = seeded_store(&[("rex", PetStatus::Available)]).await;
    let recording = RecordingStore::new(store);
    let kernel = StoreKernel::new(recording);

    kernel
        .place_order(&customer(1), PlaceOrder::one(pets[0].id))
        .await
        .unwrap();
    assert_pet_locked_first(&kernel.store().journal());

    kernel.store().clear();
    let _ = kernel.delete_pet(&store_owner(50), pets[0].id).await;
    assert_pet_locked_first(&kernel.store().journal());
}

#[tokio::test]
async fn cancel_locks_pet_before_order() {
    let (store, pets) = seeded_store(&[("rex", PetStatus::Available)]).await;
    let kernel = StoreKernel::new(RecordingStore::new(store.clone()));
    let order = kernel
        .place_order(&customer(1), PlaceOrder::one(pets[0].id))
        .await
        .unwrap();

    kernel.store().clear();
    kernel.cancel_order(&customer(1), order.id).await.unwrap();
    let journal = kernel.store().journal();
    assert_eq!(
        journal,
        vec!["begin", "read_order", "lock_pet", "lock_order", "delete_order", "update_pet", "commit"]
    );
    assert_eq!(
        store.snapshot().await.pets[&pets[0].id].status,
        PetStatus::Available
    );
}

#[tokio::test]
async fn status_updates_lock_pet_before_order() {
    let (store, pets) = seeded_store(&[("rex", PetStatus::Available)]).await;
    let kernel = StoreKernel::new(RecordingStore::new(store.clone()));
    let order = kernel
        .place_order(&customer(1), PlaceOrder::one(pets[0].id))
        .await
        .unwrap();

    kernel.store().clear();
    kernel
        .update_order_status(&store_owner(50), order.id, OrderStatus::Approved)
        .await
        .unwrap();
    assert_pet_locked_first(&kernel.store().journal());

    kernel.store().clear();
    kernel
        .update_order_status(&admin(99), order.id, OrderStatus::Delivered)
        .await
        .unwrap();
    let journal = kernel.store().journal();
    assert_pet_locked_first(&journal);
    assert_eq!(journal.first(), Some(&"begin"));
    assert_eq!(journal.get(1), Some(&"read_order"));
    assert_eq!(
        store.snapshot().await.pets[&pets[0].id].status,
        PetStatus::Sold
    );
}

#[tokio::test]
async fn non_owner_is_refused_before_any_lock() {
    let (store, pets) = seeded_store(&[("rex", PetStatus::Available)]).await;
    let kernel = StoreKernel::new(RecordingStore::new(store));
    let order = kernel
        .place_order(&customer(1), PlaceOrder::one(pets[0].id))
        .await
        .unwrap();

    kernel.store().clear();
    assert!(kernel.cancel_order(&customer(2), order.id).await.is_err());
    assert!(!kernel.store().journal().contains(&"lock_pet"));
}
