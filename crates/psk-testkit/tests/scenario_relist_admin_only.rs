//! Scenario: relisting a sold pet
//!
//! # Invariants under test
//!
//! 1. A store owner asking for `sold -> available` through `update_pet` is
//!    refused with `RelistRequiresAdmin`; the dedicated relist operation is
//!    closed to them by the role gate.
//! 2. An admin relist succeeds and the pet can be ordered again.

use psk_engine::{PlaceOrder, Rejection, StoreKernel};
use psk_schemas::{PetStatus, PetUpdate};
use psk_testkit::{admin, customer, seeded_store, store_owner};

#[tokio::test]
async fn only_admin_relists() {
    let (store, pets) = seeded_store(&[("rex", PetStatus::Sold)]).await;
    let kernel = StoreKernel::new(store.clone());
    let pet_id = pets[0].id;

    let mut upd = PetUpdate::new(pet_id);
    upd.status = Some(PetStatus::Available);
    let err = kernel.update_pet(&store_owner(50), upd).await.unwrap_err();
    assert_eq!(err.rejection(), Some(&Rejection::RelistRequiresAdmin));
    assert_eq!(err.status_code(), 403);

    let err = kernel.relist_pet(&store_owner(50), pet_id).await.unwrap_err();
    assert_eq!(err.rejection(), Some(&Rejection::InsufficientRole));
    assert_eq!(store.snapshot().await.pets[&pet_id].status, PetStatus::Sold);

    let pet = kernel.relist_pet(&admin(99), pet_id).await.unwrap();
    assert_eq!(pet.status, PetStatus::Available);

    kernel
        .place_order(&customer(1), PlaceOrder::one(pet_id))
        .await
        .unwrap();
}

#[tokio::test]
async fn relist_of_pending_pet_is_illegal() {
    let (store, pets) = seeded_store(&[("rex", PetStatus::Available)]).await;
    let kernel = StoreKernel::new(store);
    kernel
        .place_order(&customer(1), PlaceOrder::one(pets[0].id))
        .await
        .unwrap();

    let err = kernel.relist_pet(&admin(99), pets[0].id).await.unwrap_err();
    assert!(matches!(
        err.rejection(),
        Some(Rejection::IllegalTransition { entity: "pet", from: "pending", to: "available" })
    ));
}
