use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use psk_config::{
    load_layered_yaml, report_unused_keys, resolve_secrets, KernelConfig, UnusedKeyPolicy,
};
use psk_db::{PgPool, PgStore};
use psk_engine::StoreKernel;
use psk_schemas::{Principal, Role, UserId};

mod commands;

use commands::{OrderCmd, PetCmd, UserCmd};

#[derive(Parser)]
#[command(name = "psk")]
#[command(about = "Petstore kernel operator CLI", long_about = None)]
struct Cli {
    /// Layered config paths in merge order. Defaults apply when omitted.
    #[arg(long = "config", global = true)]
    config_paths: Vec<String>,

    /// Acting user id. Omit to act as guest.
    #[arg(long = "as-user", global = true)]
    as_user: Option<i64>,

    /// Acting role (customer | store_owner | admin). Requires --as-user.
    #[arg(long, global = true, requires = "as_user")]
    role: Option<String>,

    #[command(subcommand)]
    cmd: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Database commands
    Db {
        #[command(subcommand)]
        cmd: DbCmd,
    },

    /// Compute layered config hash + print canonical JSON
    ConfigHash {
        /// Paths in merge order (base -> overlays)
        #[arg(required = true)]
        paths: Vec<String>,

        /// Fail when the merged config has keys the kernel never reads.
        #[arg(long, default_value_t = false)]
        strict: bool,
    },

    /// Pet commands
    Pet {
        #[command(subcommand)]
        cmd: PetCmd,
    },

    /// Pet counts per status
    Inventory,

    /// Order commands
    Order {
        #[command(subcommand)]
        cmd: OrderCmd,
    },

    /// User commands
    User {
        #[command(subcommand)]
        cmd: UserCmd,
    },
}

#[derive(Subcommand)]
enum DbCmd {
    Status,
    /// Apply SQL migrations.
    Migrate,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env.local if present (dev convenience).
    let _ = dotenvy::from_filename(".env.local");

    init_tracing();

    let cli = Cli::parse();

    match cli.cmd {
        Commands::ConfigHash { paths, strict } => {
            let path_refs: Vec<&str> = paths.iter().map(|s| s.as_str()).collect();
            let loaded = load_layered_yaml(&path_refs)?;
            let policy = if strict {
                UnusedKeyPolicy::Fail
            } else {
                UnusedKeyPolicy::Warn
            };
            let report = report_unused_keys(&loaded.config_json, policy)?;
            // Validate the typed view too, so a bad override fails here.
            KernelConfig::from_loaded(&loaded)?.policy_table()?;

            println!("config_hash={}", loaded.config_hash);
            for k in &report.unused_leaf_pointers {
                println!("unused_key={k}");
            }
            println!("{}", loaded.canonical_json);
        }

        Commands::Db { cmd } => {
            let cfg = load_config(&cli.config_paths)?;
            let pool = connect(&cfg).await?;
            match cmd {
                DbCmd::Status => {
                    let s = psk_db::status(&pool).await?;
                    println!("db_ok={} has_pets_table={}", s.ok, s.has_pets_table);
                }
                DbCmd::Migrate => {
                    psk_db::migrate(&pool).await?;
                    println!("migrations_applied=true");
                }
            }
        }

        Commands::Pet { cmd } => {
            let principal = principal_from_flags(cli.as_user, cli.role.as_deref())?;
            let kernel = kernel(&cli.config_paths).await?;
            commands::pet::run(&kernel, &principal, cmd).await?;
        }

        Commands::Inventory => {
            let principal = principal_from_flags(cli.as_user, cli.role.as_deref())?;
            let kernel = kernel(&cli.config_paths).await?;
            let inv = kernel
                .inventory(&principal)
                .await
                .map_err(commands::kernel_err)?;
            commands::print_json(&inv)?;
        }

        Commands::Order { cmd } => {
            let principal = principal_from_flags(cli.as_user, cli.role.as_deref())?;
            let kernel = kernel(&cli.config_paths).await?;
            commands::order::run(&kernel, &principal, cmd).await?;
        }

        Commands::User { cmd } => {
            let principal = principal_from_flags(cli.as_user, cli.role.as_deref())?;
            let kernel = kernel(&cli.config_paths).await?;
            commands::user::run(&kernel, &principal, cmd).await?;
        }
    }

    Ok(())
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .with_writer(std::io::stderr)
        .init();
}

fn load_config(paths: &[String]) -> Result<KernelConfig> {
    if paths.is_empty() {
        return Ok(KernelConfig::default());
    }
    let path_refs: Vec<&str> = paths.iter().map(|s| s.as_str()).collect();
    let loaded = load_layered_yaml(&path_refs)?;
    tracing::info!(config_hash = %loaded.config_hash, "config loaded");
    KernelConfig::from_loaded(&loaded)
}

async fn connect(cfg: &KernelConfig) -> Result<PgPool> {
    let secrets = resolve_secrets(cfg)?;
    psk_db::connect(&secrets.database_url, cfg.db.max_connections).await
}

async fn kernel(paths: &[String]) -> Result<StoreKernel<PgStore>> {
    let cfg = load_config(paths)?;
    let pool = connect(&cfg).await?;
    StoreKernel::from_config(PgStore::new(pool), &cfg).context("kernel setup failed")
}

/// The CLI trusts its operator: identity comes from flags, not credentials.
fn principal_from_flags(as_user: Option<i64>, role: Option<&str>) -> Result<Principal> {
    let Some(id) = as_user else {
        return Ok(Principal::guest());
    };
    let role = match role {
        Some(r) => Role::parse(r)?,
        None => Role::Customer,
    };
    Ok(Principal::new(UserId(id), role))
}
