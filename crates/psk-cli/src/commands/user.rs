use anyhow::Result;
use clap::Subcommand;
use psk_db::PgStore;
use psk_engine::StoreKernel;
use psk_schemas::{NewUser, Principal, Role, UserUpdate};

use super::{kernel_err, print_json};

#[derive(Subcommand)]
pub enum UserCmd {
    /// Register a user. Non-admins may only register customers.
    Register {
        #[arg(long)]
        username: String,

        #[arg(long)]
        email: Option<String>,

        /// Role for the new account (admin only above customer).
        #[arg(long = "new-role")]
        new_role: Option<String>,
    },

    Get {
        #[arg(long)]
        username: String,
    },

    /// Change a user's role (admin).
    SetRole {
        #[arg(long)]
        username: String,

        #[arg(long = "new-role")]
        new_role: String,
    },

    /// Delete a user with no active orders.
    Delete {
        #[arg(long)]
        username: String,
    },
}

pub async fn run(kernel: &StoreKernel<PgStore>, principal: &Principal, cmd: UserCmd) -> Result<()> {
    match cmd {
        UserCmd::Register {
            username,
            email,
            new_role,
        } => {
            let mut new = NewUser::customer(username);
            new.email = email;
            new.role = new_role.as_deref().map(Role::parse).transpose()?;
            let user = kernel
                .register_user(principal, new)
                .await
                .map_err(kernel_err)?;
            print_json(&user)?;
        }
        UserCmd::Get { username } => {
            let user = kernel
                .get_user(principal, &username)
                .await
                .map_err(kernel_err)?;
            print_json(&user)?;
        }
        UserCmd::SetRole { username, new_role } => {
            let update = UserUpdate {
                role: Some(Role::parse(&new_role)?),
                ..UserUpdate::default()
            };
            let user = kernel
                .update_user(principal, &username, update)
                .await
                .map_err(kernel_err)?;
            print_json(&user)?;
        }
        UserCmd::Delete { username } => {
            kernel
                .delete_user(principal, &username)
                .await
                .map_err(kernel_err)?;
            println!("deleted_username={username}");
        }
    }
    Ok(())
}
