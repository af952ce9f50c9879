//! psk-db
//!
//! Postgres persistence collaborator for the petstore kernel.
//!
//! - [`connect`] / [`connect_from_env`], [`migrate`], [`status`]: bootstrap
//! - [`PgStore`]: `StoreBackend` over a `PgPool`
//! - [`PgTx`]: one `READ COMMITTED` transaction; `lock_*` take
//!   `SELECT ... FOR UPDATE` row locks held until commit or rollback,
//!   always pet before order

mod rows;

use anyhow::{Context, Result};
use psk_engine::{StorageError, StoreBackend, StoreResult, StoreTx};
use psk_schemas::{
    NewOrder, NewPet, NewUser, Order, OrderId, Pet, PetId, PetStatus, Role, User, UserId,
};
use sqlx::postgres::PgPoolOptions;
use sqlx::types::Json;
use sqlx::{Postgres, Transaction};
use tracing::info;

pub use sqlx::postgres::PgPool;

use rows::{order_from_row, pet_from_row, user_from_row, ORDER_COLUMNS, PET_COLUMNS, USER_COLUMNS};

pub const ENV_DB_URL: &str = "PSK_DATABASE_URL";

/// Connect to Postgres using PSK_DATABASE_URL.
pub async fn connect_from_env() -> Result<PgPool> {
    let url = std::env::var(ENV_DB_URL).with_context(|| format!("missing env var {ENV_DB_URL}"))?;
    connect(&url, 10).await
}

pub async fn connect(url: &str, max_connections: u32) -> Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(max_connections)
        .connect(url)
        .await
        .context("failed to connect to Postgres")?;
    Ok(pool)
}

/// Run embedded SQLx migrations.
pub async fn migrate(pool: &PgPool) -> Result<()> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .context("db migrate failed")?;
    info!("db migrations applied");
    Ok(())
}

#[derive(Debug, Clone)]
pub struct DbStatus {
    pub ok: bool,
    pub has_pets_table: bool,
}

/// Connectivity plus schema presence.
pub async fn status(pool: &PgPool) -> Result<DbStatus> {
    let (one,): (i32,) = sqlx::query_as::<_, (i32,)>("select 1")
        .fetch_one(pool)
        .await
        .context("status connectivity query failed")?;

    let (exists,): (bool,) = sqlx::query_as::<_, (bool,)>(
        r#"
        select exists (
            select 1
            from information_schema.tables
            where table_schema='public' and table_name='pets'
        )
        "#,
    )
    .fetch_one(pool)
    .await
    .context("status table-exists query failed")?;

    Ok(DbStatus {
        ok: one == 1,
        has_pets_table: exists,
    })
}

/// Map a sqlx error. A named unique violation (23505) becomes
/// [`StorageError::Conflict`]; everything else is unavailability.
fn storage_err(e: sqlx::Error, what: &'static str) -> StorageError {
    if let sqlx::Error::Database(db_err) = &e {
        if db_err.code().as_deref() == Some("23505") {
            if let Some(constraint) = db_err.constraint() {
                return StorageError::Conflict {
                    constraint: constraint.to_string(),
                };
            }
        }
    }
    StorageError::unavailable(anyhow::Error::new(e).context(what))
}

fn decode_err(e: anyhow::Error) -> StorageError {
    StorageError::Unavailable(e.context("row decode failed"))
}

fn status_strings(statuses: &[PetStatus]) -> Vec<String> {
    statuses.iter().map(|s| s.as_str().to_string()).collect()
}

// ---------------------------------------------------------------------------
// PgStore
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl StoreBackend for PgStore {
    async fn get_pet(&self, id: PetId) -> StoreResult<Option<Pet>> {
        let row = sqlx::query(&format!("select {PET_COLUMNS} from pets where id = $1"))
            .bind(id.0)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| storage_err(e, "get_pet failed"))?;
        row.map(|r| pet_from_row(&r)).transpose().map_err(decode_err)
    }

    async fn find_pets_by_status(&self, statuses: &[PetStatus]) -> StoreResult<Vec<Pet>> {
        let rows = sqlx::query(&format!(
            "select {PET_COLUMNS} from pets where status = any($1) order by id"
        ))
        .bind(status_strings(statuses))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| storage_err(e, "find_pets_by_status failed"))?;
        rows.iter()
            .map(pet_from_row)
            .collect::<Result<Vec<_>>>()
            .map_err(decode_err)
    }

    async fn find_pets_by_tags(&self, tags: &[String]) -> StoreResult<Vec<Pet>> {
        let rows = sqlx::query(&format!(
            r#"
            select {PET_COLUMNS}
            from pets
            where exists (
                select 1 from jsonb_array_elements(tags) t
                where t->>'name' = any($1)
            )
            order by id
            "#
        ))
        .bind(tags.to_vec())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| storage_err(e, "find_pets_by_tags failed"))?;
        rows.iter()
            .map(pet_from_row)
            .collect::<Result<Vec<_>>>()
            .map_err(decode_err)
    }

    async fn pet_status_counts(&self) -> StoreResult<Vec<(PetStatus, i64)>> {
        let rows: Vec<(String, i64)> = sqlx::query_as(
            "select status, count(*)::bigint from pets group by status order by status",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| storage_err(e, "pet_status_counts failed"))?;
        rows.into_iter()
            .map(|(s, n)| PetStatus::parse(&s).map(|st| (st, n)))
            .collect::<Result<Vec<_>>>()
            .map_err(decode_err)
    }

    async fn get_order(&self, id: OrderId) -> StoreResult<Option<Order>> {
        let row = sqlx::query(&format!("select {ORDER_COLUMNS} from orders where id = $1"))
            .bind(id.0)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| storage_err(e, "get_order failed"))?;
        row.map(|r| order_from_row(&r)).transpose().map_err(decode_err)
    }

    async fn get_user_by_username(&self, username: &str) -> StoreResult<Option<User>> {
        let row = sqlx::query(&format!("select {USER_COLUMNS} from users where username = $1"))
            .bind(username)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| storage_err(e, "get_user_by_username failed"))?;
        row.map(|r| user_from_row(&r)).transpose().map_err(decode_err)
    }

    async fn begin(&self) -> StoreResult<Box<dyn StoreTx>> {
        let tx = self
            .pool
            .begin()
            .await
            .map_err(|e| storage_err(e, "begin failed"))?;
        Ok(Box::new(PgTx { tx }))
    }
}

// ---------------------------------------------------------------------------
// PgTx
// ---------------------------------------------------------------------------

/// Dropping without [`StoreTx::commit`] rolls the transaction back.
pub struct PgTx {
    tx: Transaction<'static, Postgres>,
}

#[async_trait::async_trait]
impl StoreTx for PgTx {
    async fn lock_pet(&mut self, id: PetId) -> StoreResult<Option<Pet>> {
        let row = sqlx::query(&format!(
            "select {PET_COLUMNS} from pets where id = $1 for update"
        ))
        .bind(id.0)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(|e| storage_err(e, "lock_pet failed"))?;
        row.map(|r| pet_from_row(&r)).transpose().map_err(decode_err)
    }

    async fn find_active_order_for_pet(&mut self, pet_id: PetId) -> StoreResult<Option<Order>> {
        let row = sqlx::query(&format!(
            r#"
            select {ORDER_COLUMNS}
            from orders
            where pet_id = $1 and status in ('placed','approved')
            "#
        ))
        .bind(pet_id.0)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(|e| storage_err(e, "find_active_order_for_pet failed"))?;
        row.map(|r| order_from_row(&r)).transpose().map_err(decode_err)
    }

    async fn read_order(&mut self, id: OrderId) -> StoreResult<Option<Order>> {
        let row = sqlx::query(&format!("select {ORDER_COLUMNS} from orders where id = $1"))
            .bind(id.0)
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(|e| storage_err(e, "read_order failed"))?;
        row.map(|r| order_from_row(&r)).transpose().map_err(decode_err)
    }

    async fn lock_order(&mut self, id: OrderId) -> StoreResult<Option<Order>> {
        let row = sqlx::query(&format!(
            "select {ORDER_COLUMNS} from orders where id = $1 for update"
        ))
        .bind(id.0)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(|e| storage_err(e, "lock_order failed"))?;
        row.map(|r| order_from_row(&r)).transpose().map_err(decode_err)
    }

    async fn lock_user(&mut self, username: &str) -> StoreResult<Option<User>> {
        let row = sqlx::query(&format!(
            "select {USER_COLUMNS} from users where username = $1 for update"
        ))
        .bind(username)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(|e| storage_err(e, "lock_user failed"))?;
        row.map(|r| user_from_row(&r)).transpose().map_err(decode_err)
    }

    async fn count_active_orders_for_user(&mut self, user_id: UserId) -> StoreResult<i64> {
        let (n,): (i64,) = sqlx::query_as(
            r#"
            select count(*)::bigint
            from orders
            where user_id = $1 and status in ('placed','approved')
            "#,
        )
        .bind(user_id.0)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(|e| storage_err(e, "count_active_orders_for_user failed"))?;
        Ok(n)
    }

    async fn insert_pet(&mut self, pet: &NewPet) -> StoreResult<Pet> {
        let row = sqlx::query(&format!(
            r#"
            insert into pets (name, category, tags, photo_urls, status)
            values ($1, $2, $3, $4, 'available')
            returning {PET_COLUMNS}
            "#
        ))
        .bind(&pet.name)
        .bind(pet.category.as_ref().map(Json))
        .bind(Json(&pet.tags))
        .bind(Json(&pet.photo_urls))
        .fetch_one(&mut *self.tx)
        .await
        .map_err(|e| storage_err(e, "insert_pet failed"))?;
        pet_from_row(&row).map_err(decode_err)
    }

    async fn update_pet(&mut self, pet: &Pet) -> StoreResult<()> {
        sqlx::query(
            r#"
            update pets
            set name = $2, category = $3, tags = $4, photo_urls = $5, status = $6
            where id = $1
            "#,
        )
        .bind(pet.id.0)
        .bind(&pet.name)
        .bind(pet.category.as_ref().map(Json))
        .bind(Json(&pet.tags))
        .bind(Json(&pet.photo_urls))
        .bind(pet.status.as_str())
        .execute(&mut *self.tx)
        .await
        .map_err(|e| storage_err(e, "update_pet failed"))?;
        Ok(())
    }

    async fn delete_pet(&mut self, id: PetId) -> StoreResult<()> {
        sqlx::query("delete from orders where pet_id = $1")
            .bind(id.0)
            .execute(&mut *self.tx)
            .await
            .map_err(|e| storage_err(e, "delete_pet orders failed"))?;
        sqlx::query("delete from pets where id = $1")
            .bind(id.0)
            .execute(&mut *self.tx)
            .await
            .map_err(|e| storage_err(e, "delete_pet failed"))?;
        Ok(())
    }

    async fn insert_order(&mut self, order: &NewOrder) -> StoreResult<Order> {
        let row = sqlx::query(&format!(
            r#"
            insert into orders (pet_id, user_id, quantity, status, ship_date, complete)
            values ($1, $2, $3, 'placed', $4, false)
            returning {ORDER_COLUMNS}
            "#
        ))
        .bind(order.pet_id.0)
        .bind(order.user_id.0)
        .bind(order.quantity)
        .bind(order.ship_date)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(|e| storage_err(e, "insert_order failed"))?;
        order_from_row(&row).map_err(decode_err)
    }

    async fn update_order(&mut self, order: &Order) -> StoreResult<()> {
        sqlx::query(
            r#"
            update orders
            set status = $2, ship_date = $3, complete = $4
            where id = $1
            "#,
        )
        .bind(order.id.0)
        .bind(order.status.as_str())
        .bind(order.ship_date)
        .bind(order.complete)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| storage_err(e, "update_order failed"))?;
        Ok(())
    }

    async fn delete_order(&mut self, id: OrderId) -> StoreResult<()> {
        sqlx::query("delete from orders where id = $1")
            .bind(id.0)
            .execute(&mut *self.tx)
            .await
            .map_err(|e| storage_err(e, "delete_order failed"))?;
        Ok(())
    }

    async fn insert_user(&mut self, user: &NewUser, role: Role) -> StoreResult<User> {
        let row = sqlx::query(&format!(
            r#"
            insert into users (username, first_name, last_name, email, phone, role)
            values ($1, $2, $3, $4, $5, $6)
            returning {USER_COLUMNS}
            "#
        ))
        .bind(&user.username)
        .bind(&user.first_name)
        .bind(&user.last_name)
        .bind(&user.email)
        .bind(&user.phone)
        .bind(role.as_str())
        .fetch_one(&mut *self.tx)
        .await
        .map_err(|e| storage_err(e, "insert_user failed"))?;
        user_from_row(&row).map_err(decode_err)
    }

    async fn update_user(&mut self, user: &User) -> StoreResult<()> {
        sqlx::query(
            r#"
            update users
            set first_name = $2, last_name = $3, email = $4, phone = $5, role = $6
            where id = $1
            "#,
        )
        .bind(user.id.0)
        .bind(&user.first_name)
        .bind(&user.last_name)
        .bind(&user.email)
        .bind(&user.phone)
        .bind(user.role.as_str())
        .execute(&mut *self.tx)
        .await
        .map_err(|e| storage_err(e, "update_user failed"))?;
        Ok(())
    }

    async fn delete_user(&mut self, id: UserId) -> StoreResult<()> {
        sqlx::query("delete from users where id = $1")
            .bind(id.0)
            .execute(&mut *self.tx)
            .await
            .map_err(|e| storage_err(e, "delete_user failed"))?;
        Ok(())
    }

    async fn commit(self: Box<Self>) -> StoreResult<()> {
        self.tx
            .commit()
            .await
            .map_err(|e| storage_err(e, "commit failed"))
    }
}
