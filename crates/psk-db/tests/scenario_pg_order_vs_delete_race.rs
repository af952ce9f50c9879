//! Scenario: order writers racing `delete_pet` on one pet, against Postgres
//!
//! # Invariants under test
//!
//! 1. `cancel_order` and `delete_pet` started together on a pet with a
//!    placed order never fail with a storage error. The cancel always
//!    succeeds; the delete either succeeds (it ran second) or is refused
//!    with `PetHasActiveOrder` (it ran first).
//! 2. The same holds for delivery racing `delete_pet`.
//! 3. Afterwards the pet is gone, or its status matches the winning order
//!    write: `available` after a cancel, `sold` after a delivery.
//!
//! DB-backed test, skipped if PSK_DATABASE_URL is not set.

use std::sync::Arc;

use psk_db::PgStore;
use psk_engine::{KernelError, PlaceOrder, Rejection, StoreBackend, StoreKernel, StoreTx};
use psk_schemas::{NewPet, OrderStatus, PetStatus, Principal, Role, UserId};

const ROUNDS: i64 = 40;

async fn kernel() -> anyhow::Result<Option<Arc<StoreKernel<PgStore>>>> {
    if std::env::var(psk_db::ENV_DB_URL).is_err() {
        eprintln!("SKIP: PSK_DATABASE_URL not set");
        return Ok(None);
    }
    let pool = psk_db::connect_from_env().await?;
    psk_db::migrate(&pool).await?;
    Ok(Some(Arc::new(StoreKernel::new(PgStore::new(pool)))))
}

async fn pet_with_placed_order(
    kernel: &StoreKernel<PgStore>,
    buyer: &Principal,
) -> anyhow::Result<(psk_schemas::Pet, psk_schemas::Order)> {
    let mut tx = kernel.store().begin().await?;
    let pet = tx
        .insert_pet(&NewPet {
            name: "pg-race".into(),
            ..NewPet::default()
        })
        .await?;
    tx.commit().await?;
    let order = kernel.place_order(buyer, PlaceOrder::one(pet.id)).await?;
    Ok((pet, order))
}

fn deleted_or_refused(res: Result<(), KernelError>) -> bool {
    match res {
        Ok(()) => true,
        Err(KernelError::Rejected(Rejection::PetHasActiveOrder)) => false,
        Err(other) => panic!("delete_pet: unexpected outcome: {other}"),
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn cancel_racing_delete_never_fails_on_storage() -> anyhow::Result<()> {
    let Some(kernel) = kernel().await? else {
        return Ok(());
    };
    let owner = Principal::new(UserId(3_000), Role::StoreOwner);

    for round in 0..ROUNDS {
        let buyer = Principal::new(UserId(3_100 + round), Role::Customer);
        let (pet, order) = pet_with_placed_order(&kernel, &buyer).await?;

        let k1 = Arc::clone(&kernel);
        let cancel = tokio::spawn(async move { k1.cancel_order(&buyer, order.id).await });
        let k2 = Arc::clone(&kernel);
        let delete = tokio::spawn(async move { k2.delete_pet(&owner, pet.id).await });

        match cancel.await? {
            Ok(c) => assert_eq!(c.pet.status, PetStatus::Available),
            Err(other) => panic!("cancel_order: unexpected outcome: {other}"),
        }
        let deleted = deleted_or_refused(delete.await?);

        let after = kernel.store().get_pet(pet.id).await?;
        match (deleted, after) {
            (true, None) => {}
            (false, Some(p)) => assert_eq!(p.status, PetStatus::Available),
            (deleted, after) => panic!("round {round}: deleted={deleted} but pet is {after:?}"),
        }
        assert!(kernel.store().get_order(order.id).await?.is_none());
    }
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn delivery_racing_delete_never_fails_on_storage() -> anyhow::Result<()> {
    let Some(kernel) = kernel().await? else {
        return Ok(());
    };
    let owner = Principal::new(UserId(4_000), Role::StoreOwner);

    for round in 0..ROUNDS {
        let buyer = Principal::new(UserId(4_100 + round), Role::Customer);
        let (pet, order) = pet_with_placed_order(&kernel, &buyer).await?;

        let k1 = Arc::clone(&kernel);
        let deliver = tokio::spawn(async move {
            k1.update_order_status(&owner, order.id, OrderStatus::Delivered)
                .await
        });
        let k2 = Arc::clone(&kernel);
        let delete = tokio::spawn(async move { k2.delete_pet(&owner, pet.id).await });

        match deliver.await? {
            Ok(o) => {
                assert_eq!(o.status, OrderStatus::Delivered);
                assert!(o.complete);
            }
            Err(other) => panic!("update_order_status: unexpected outcome: {other}"),
        }
        let deleted = deleted_or_refused(delete.await?);

        let after = kernel.store().get_pet(pet.id).await?;
        match (deleted, after) {
            (true, None) => assert!(kernel.store().get_order(order.id).await?.is_none()),
            (false, Some(p)) => assert_eq!(p.status, PetStatus::Sold),
            (deleted, after) => panic!("round {round}: deleted={deleted} but pet is {after:?}"),
        }
    }
    Ok(())
}
