use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::Subcommand;
use psk_db::PgStore;
use psk_engine::{PlaceOrder, StoreKernel};
use psk_schemas::{OrderId, OrderStatus, PetId, Principal};

use super::{kernel_err, print_json};

#[derive(Subcommand)]
pub enum OrderCmd {
    /// Place an order for an available pet.
    Place {
        #[arg(long)]
        pet_id: i64,

        #[arg(long, default_value_t = 1)]
        quantity: i32,

        /// RFC 3339 timestamp.
        #[arg(long)]
        ship_date: Option<String>,
    },

    Get {
        #[arg(long)]
        id: i64,
    },

    /// Move an order to approved | delivered (store_owner/admin).
    Status {
        #[arg(long)]
        id: i64,

        #[arg(long)]
        to: String,
    },

    /// Cancel a placed order.
    Cancel {
        #[arg(long)]
        id: i64,
    },
}

pub async fn run(kernel: &StoreKernel<PgStore>, principal: &Principal, cmd: OrderCmd) -> Result<()> {
    match cmd {
        OrderCmd::Place {
            pet_id,
            quantity,
            ship_date,
        } => {
            let ship_date = ship_date
                .map(|s| {
                    DateTime::parse_from_rfc3339(&s)
                        .map(|d| d.with_timezone(&Utc))
                        .with_context(|| format!("invalid --ship-date: {s}"))
                })
                .transpose()?;
            let req = PlaceOrder {
                pet_id: PetId(pet_id),
                quantity,
                ship_date,
            };
            let order = kernel
                .place_order(principal, req)
                .await
                .map_err(kernel_err)?;
            print_json(&order)?;
        }
        OrderCmd::Get { id } => {
            let order = kernel
                .get_order(principal, OrderId(id))
                .await
                .map_err(kernel_err)?;
            print_json(&order)?;
        }
        OrderCmd::Status { id, to } => {
            let to = OrderStatus::parse(&to)?;
            let order = kernel
                .update_order_status(principal, OrderId(id), to)
                .await
                .map_err(kernel_err)?;
            print_json(&order)?;
        }
        OrderCmd::Cancel { id } => {
            let cancelled = kernel
                .cancel_order(principal, OrderId(id))
                .await
                .map_err(kernel_err)?;
            print_json(&cancelled)?;
        }
    }
    Ok(())
}
