use anyhow::Result;
use clap::Subcommand;
use psk_db::PgStore;
use psk_engine::StoreKernel;
use psk_schemas::{Category, NewPet, PetId, PetStatus, PetUpdate, Principal, Tag};

use super::{kernel_err, print_json};

#[derive(Subcommand)]
pub enum PetCmd {
    /// Add a pet (store_owner/admin). Starts available.
    Add {
        #[arg(long)]
        name: String,

        #[arg(long)]
        category: Option<String>,

        /// Repeatable.
        #[arg(long = "tag")]
        tags: Vec<String>,

        /// Repeatable.
        #[arg(long = "photo-url")]
        photo_urls: Vec<String>,
    },

    Get {
        #[arg(long)]
        id: i64,
    },

    /// Find pets by status (repeatable --status).
    Find {
        #[arg(long = "status", required = true)]
        statuses: Vec<String>,
    },

    /// Find pets carrying any of the given tags.
    FindByTags {
        #[arg(long = "tag", required = true)]
        tags: Vec<String>,
    },

    /// Rename a pet (store_owner/admin).
    Rename {
        #[arg(long)]
        id: i64,

        #[arg(long)]
        name: String,
    },

    /// Relist a sold pet (admin).
    Relist {
        #[arg(long)]
        id: i64,
    },

    /// Delete a pet with no active order (store_owner/admin).
    Delete {
        #[arg(long)]
        id: i64,
    },
}

pub async fn run(kernel: &StoreKernel<PgStore>, principal: &Principal, cmd: PetCmd) -> Result<()> {
    match cmd {
        PetCmd::Add {
            name,
            category,
            tags,
            photo_urls,
        } => {
            let new = NewPet {
                name,
                category: category.map(|name| Category { id: 0, name }),
                tags: tags
                    .into_iter()
                    .map(|name| Tag { id: 0, name })
                    .collect(),
                photo_urls,
            };
            let pet = kernel.add_pet(principal, new).await.map_err(kernel_err)?;
            print_json(&pet)?;
        }
        PetCmd::Get { id } => {
            let pet = kernel
                .get_pet(principal, PetId(id))
                .await
                .map_err(kernel_err)?;
            print_json(&pet)?;
        }
        PetCmd::Find { statuses } => {
            let parsed = statuses
                .iter()
                .map(|s| PetStatus::parse(s))
                .collect::<Result<Vec<_>>>()?;
            let pets = kernel
                .find_pets_by_status(principal, &parsed)
                .await
                .map_err(kernel_err)?;
            print_json(&pets)?;
        }
        PetCmd::FindByTags { tags } => {
            let pets = kernel
                .find_pets_by_tags(principal, &tags)
                .await
                .map_err(kernel_err)?;
            print_json(&pets)?;
        }
        PetCmd::Rename { id, name } => {
            let mut upd = PetUpdate::new(PetId(id));
            upd.name = Some(name);
            let pet = kernel
                .update_pet(principal, upd)
                .await
                .map_err(kernel_err)?;
            print_json(&pet)?;
        }
        PetCmd::Relist { id } => {
            let pet = kernel
                .relist_pet(principal, PetId(id))
                .await
                .map_err(kernel_err)?;
            print_json(&pet)?;
        }
        PetCmd::Delete { id } => {
            kernel
                .delete_pet(principal, PetId(id))
                .await
                .map_err(kernel_err)?;
            println!("deleted_pet_id={id}");
        }
    }
    Ok(())
}
