//! Scenario: two customers race for one pet
//!
//! # Invariant under test
//!
//! `place_order` re-checks availability under the pet row lock. Of N
//! concurrent calls on the same available pet exactly one succeeds; every
//! other caller is refused with `PetUnavailable` or `PetAlreadyOrdered`, and
//! the store ends with one active order and a `pending` pet.

use std::sync::Arc;

use psk_engine::{KernelError, MemoryStore, PlaceOrder, Rejection, StoreKernel};
use psk_schemas::{NewPet, PetStatus, Principal, Role, UserId};

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn exactly_one_concurrent_order_wins() {
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
    let kernel = Arc::new(StoreKernel::new(store.clone()));

    let mut handles = Vec::new();
    for uid in 1..=8 {
        let k = Arc::clone(&kernel);
        let pet_id = pet.id;
        handles.push(tokio::spawn(async move {
            let who = Principal::new(UserId(uid), Role::Customer);
            k.place_order(&who, PlaceOrder::one(pet_id)).await
        }));
    }

    let mut wins = 0;
    for h in handles {
        match h.await.expect("task panicked") {
            Ok(_) => wins += 1,
            Err(KernelError::Rejected(Rejection::PetUnavailable))
            | Err(KernelError::Rejected(Rejection::PetAlreadyOrdered)) => {}
            Err(other) => panic!("unexpected outcome: {other}"),
        }
    }
    assert_eq!(wins, 1, "exactly one place_order must succeed");

    let snap = store.snapshot().await;
    let active: Vec<_> = snap
        .orders
        .values()
        .filter(|o| o.pet_id == pet.id && o.status.is_active())
        .collect();
    assert_eq!(active.len(), 1);
    assert_eq!(snap.pets[&pet.id].status, PetStatus::Pending);
}
