//! Scenario: the strict config overlay reshapes kernel behaviour
//!
//! # Invariants under test
//!
//! Loading `config/base.yaml` + `config/strict.yaml`:
//! 1. makes `find_pets_by_status` customer-only (guests get
//!    `NotAuthenticated`);
//! 2. makes `approved` mandatory before `delivered`.

use psk_engine::{PlaceOrder, Rejection, StoreKernel};
use psk_policy::{principal_for, StaticTokenAuthenticator};
use psk_schemas::{OrderStatus, PetStatus};
use psk_testkit::{customer, load_kernel_config, seeded_store, store_owner};

const BASE: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/../../config/base.yaml");
const STRICT: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/../../config/strict.yaml");

#[tokio::test]
async fn strict_overlay_applies() {
    let cfg = load_kernel_config(&[BASE, STRICT]).unwrap();
    assert!(cfg.order.require_approval);

    let (store, pets) = seeded_store(&[("rex", PetStatus::Available)]).await;
    let kernel = StoreKernel::from_config(store, &cfg).unwrap();

    let auth = StaticTokenAuthenticator::new().with_token("tok-ann", customer(1));
    let guest = principal_for(&auth, None);
    let ann = principal_for(&auth, Some("Bearer tok-ann"));

    let err = kernel
        .find_pets_by_status(&guest, &[PetStatus::Available])
        .await
        .unwrap_err();
    assert_eq!(err.rejection(), Some(&Rejection::NotAuthenticated));
    assert_eq!(
        kernel
            .find_pets_by_status(&ann, &[PetStatus::Available])
            .await
            .unwrap()
            .len(),
        1
    );

    let order = kernel
        .place_order(&ann, PlaceOrder::one(pets[0].id))
        .await
        .unwrap();
    let err = kernel
        .update_order_status(&store_owner(50), order.id, OrderStatus::Delivered)
        .await
        .unwrap_err();
    assert_eq!(err.rejection(), Some(&Rejection::ApprovalRequired));
}

#[tokio::test]
async fn base_config_keeps_defaults() {
    let cfg = load_kernel_config(&[BASE]).unwrap();
    assert!(!cfg.order.require_approval);
    let (store, pets) = seeded_store(&[("rex", PetStatus::Available)]).await;
    let kernel = StoreKernel::from_config(store, &cfg).unwrap();

    let order = kernel
        .place_order(&customer(1), PlaceOrder::one(pets[0].id))
        .await
        .unwrap();
    let done = kernel
        .update_order_status(&store_owner(50), order.id, OrderStatus::Delivered)
        .await
        .unwrap();
    assert!(done.complete);
}
