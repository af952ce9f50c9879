//! Scenario: place then cancel
//!
//! # Invariant under test
//!
//! Cancelling a `placed` order deletes the row and returns the pet to
//! `available` in the same transaction. Nothing of the order remains.

use psk_engine::{MemoryStore, PlaceOrder, Rejection, StoreKernel};
use psk_schemas::{NewPet, OrderStatus, PetStatus, Principal, Role, UserId};

#[tokio::test]
async fn cancel_restores_pet_and_removes_order() {
    let store = MemoryStore::new();
    let pet = store
        .seed_pet(
            NewPet {
                name: "rex".into(),
                ..NewPet::default()
            },
            PetStatus::Available,
        )
        .await;
    let kernel = StoreKernel::new(store.clone());
    let customer1 = Principal::new(UserId(1), Role::Customer);

    let order = kernel
        .place_order(&customer1, PlaceOrder::one(pet.id))
        .await
        .unwrap();
    assert_eq!(order.pet_id, pet.id);
    assert_eq!(order.user_id, customer1.id);
    assert_eq!(order.status, OrderStatus::Placed);
    assert_eq!(store.snapshot().await.pets[&pet.id].status, PetStatus::Pending);

    let cancelled = kernel.cancel_order(&customer1, order.id).await.unwrap();
    assert_eq!(cancelled.order.id, order.id);
    assert_eq!(cancelled.pet.status, PetStatus::Available);

    let snap = store.snapshot().await;
    assert!(snap.orders.is_empty());
    assert_eq!(snap.pets[&pet.id].status, PetStatus::Available);

    let err = kernel.get_order(&customer1, order.id).await.unwrap_err();
    assert_eq!(err.rejection(), Some(&Rejection::NotFound));
}

#[tokio::test]
async fn pet_can_be_ordered_again_after_cancel() {
    let store = MemoryStore::new();
    let pet = store
        .seed_pet(
            NewPet {
                name: "rex".into(),
                ..NewPet::default()
            },
            PetStatus::Available,
        )
        .await;
    let kernel = StoreKernel::new(store);
    let a = Principal::new(UserId(1), Role::Customer);
    let b = Principal::new(UserId(2), Role::Customer);

    let first = kernel.place_order(&a, PlaceOrder::one(pet.id)).await.unwrap();
    kernel.cancel_order(&a, first.id).await.unwrap();
    let second = kernel.place_order(&b, PlaceOrder::one(pet.id)).await.unwrap();
    assert_ne!(first.id, second.id);
    assert_eq!(second.user_id, b.id);
}
