//! Scenario: pet/order consistency holds across a mixed workload
//!
//! # Invariants under test
//!
//! After every kernel call, successful or rejected:
//! - at most one active order references any pet
//! - a pet is `pending` iff it has an active order
//! - a `sold` pet's latest order is `delivered`

use psk_engine::{PlaceOrder, Rejection};
use psk_schemas::OrderStatus;
use psk_testkit::{admin, check_invariants, customer, kernel_with_available, store_owner};

#[tokio::test]
async fn invariants_hold_after_every_step() {
    let (kernel, store, pets) = kernel_with_available(3).await;
    let owner = store_owner(50);
    let root = admin(99);

    // pet 0: placed -> approved -> delivered -> relisted -> placed again
    let o1 = kernel
        .place_order(&customer(1), PlaceOrder::one(pets[0].id))
        .await
        .unwrap();
    check_invariants(&store.snapshot().await).unwrap();

    let err = kernel
        .place_order(&customer(2), PlaceOrder::one(pets[0].id))
        .await
        .unwrap_err();
    assert_eq!(err.rejection(), Some(&Rejection::PetUnavailable));
    check_invariants(&store.snapshot().await).unwrap();

    kernel
        .update_order_status(&owner, o1.id, OrderStatus::Approved)
        .await
        .unwrap();
    check_invariants(&store.snapshot().await).unwrap();

    kernel
        .update_order_status(&owner, o1.id, OrderStatus::Delivered)
        .await
        .unwrap();
    check_invariants(&store.snapshot().await).unwrap();

    kernel.relist_pet(&root, pets[0].id).await.unwrap();
    check_invariants(&store.snapshot().await).unwrap();

    kernel
        .place_order(&customer(2), PlaceOrder::one(pets[0].id))
        .await
        .unwrap();
    check_invariants(&store.snapshot().await).unwrap();

    // pet 1: placed -> cancelled
    let o2 = kernel
        .place_order(&customer(3), PlaceOrder::one(pets[1].id))
        .await
        .unwrap();
    kernel.cancel_order(&customer(3), o2.id).await.unwrap();
    check_invariants(&store.snapshot().await).unwrap();

    // pet 2: direct delivery, then delete
    let o3 = kernel
        .place_order(&customer(4), PlaceOrder::one(pets[2].id))
        .await
        .unwrap();
    kernel
        .update_order_status(&owner, o3.id, OrderStatus::Delivered)
        .await
        .unwrap();
    kernel.delete_pet(&owner, pets[2].id).await.unwrap();
    check_invariants(&store.snapshot().await).unwrap();

    let snap = store.snapshot().await;
    assert_eq!(snap.pets.len(), 2);
    assert_eq!(snap.orders.len(), 2);
}
