//! Row decoding. Enum columns are text; descriptive pet fields are jsonb.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use psk_schemas::{
    Category, Order, OrderId, OrderStatus, Pet, PetId, PetStatus, Role, Tag, User, UserId,
};
use sqlx::postgres::PgRow;
use sqlx::types::Json;
use sqlx::Row;

pub(crate) const PET_COLUMNS: &str = "id, name, category, tags, photo_urls, status";
pub(crate) const ORDER_COLUMNS: &str = "id, pet_id, user_id, quantity, status, ship_date, complete";
pub(crate) const USER_COLUMNS: &str = "id, username, first_name, last_name, email, phone, role";

pub(crate) fn pet_from_row(row: &PgRow) -> Result<Pet> {
    let category: Option<Json<Category>> = row.try_get("category").context("pets.category")?;
    let tags: Json<Vec<Tag>> = row.try_get("tags").context("pets.tags")?;
    let photo_urls: Json<Vec<String>> = row.try_get("photo_urls").context("pets.photo_urls")?;
    let status: String = row.try_get("status").context("pets.status")?;

    Ok(Pet {
        id: PetId(row.try_get("id").context("pets.id")?),
        name: row.try_get("name").context("pets.name")?,
        category: category.map(|c| c.0),
        tags: tags.0,
        photo_urls: photo_urls.0,
        status: PetStatus::parse(&status)?,
    })
}

pub(crate) fn order_from_row(row: &PgRow) -> Result<Order> {
    let status: String = row.try_get("status").context("orders.status")?;
    let ship_date: Option<DateTime<Utc>> = row.try_get("ship_date").context("orders.ship_date")?;

    Ok(Order {
        id: OrderId(row.try_get("id").context("orders.id")?),
        pet_id: PetId(row.try_get("pet_id").context("orders.pet_id")?),
        user_id: UserId(row.try_get("user_id").context("orders.user_id")?),
        quantity: row.try_get("quantity").context("orders.quantity")?,
        status: OrderStatus::parse(&status)?,
        ship_date,
        complete: row.try_get("complete").context("orders.complete")?,
    })
}

pub(crate) fn user_from_row(row: &PgRow) -> Result<User> {
    let role: String = row.try_get("role").context("users.role")?;

    Ok(User {
        id: UserId(row.try_get("id").context("users.id")?),
        username: row.try_get("username").context("users.username")?,
        first_name: row.try_get("first_name").context("users.first_name")?,
        last_name: row.try_get("last_name").context("users.last_name")?,
        email: row.try_get("email").context("users.email")?,
        phone: row.try_get("phone").context("users.phone")?,
        role: Role::parse(&role)?,
    })
}
