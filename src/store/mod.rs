//! Persistence seam for users, products, carts and orders.
//!
//! Everything that must be atomic goes through a [`StoreTx`]: locks taken
//! inside a transaction are held until [`StoreTx::commit`] or until the
//! transaction is dropped, and dropping without committing discards every
//! staged write.

use std::collections::HashMap;

use async_trait::async_trait;
use uuid::Uuid;

use crate::{
    error::AppResult,
    models::{CartLine, Order, Product, User},
};

pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

#[async_trait]
pub trait Store: Send + Sync {
    async fn begin(&self) -> AppResult<Box<dyn StoreTx>>;

    async fn find_user_by_email(&self, email: &str) -> AppResult<Option<User>>;

    async fn find_product(&self, id: Uuid) -> AppResult<Option<Product>>;

    /// Catalog page ordered by id. Returns the page and the total number of products.
    async fn list_products(&self, limit: u64, offset: u64) -> AppResult<(Vec<Product>, u64)>;

    /// Loads the order together with all of its lines.
    async fn find_order(&self, id: Uuid) -> AppResult<Option<Order>>;

    /// Newest first. Returns the page and the total number of orders.
    async fn list_orders_for_user(
        &self,
        user_id: Uuid,
        limit: u64,
        offset: u64,
    ) -> AppResult<(Vec<Order>, u64)>;

    /// Cart lines joined with their products, most recently updated first.
    async fn cart_lines(&self, user_id: Uuid) -> AppResult<Vec<(CartLine, Product)>>;

    async fn find_cart_line(&self, id: Uuid) -> AppResult<Option<CartLine>>;

    async fn update_cart_line(&self, line: &CartLine) -> AppResult<()>;

    async fn delete_cart_lines(&self, ids: &[Uuid]) -> AppResult<u64>;

    async fn clear_cart(&self, user_id: Uuid) -> AppResult<u64>;
}

#[async_trait]
pub trait StoreTx: Send {
    /// Exclusively locks every product in `ids`, in ascending id order, in a
    /// single call. Ids that do not exist are absent from the result.
    async fn lock_products(&mut self, ids: &[Uuid]) -> AppResult<HashMap<Uuid, Product>>;

    /// Persists the stock of a product locked by this transaction.
    async fn save_stock(&mut self, product: &Product) -> AppResult<()>;

    async fn lock_cart_line(&mut self, user_id: Uuid, product_id: Uuid)
    -> AppResult<Option<CartLine>>;

    /// Inserts a new line. If a concurrent caller created the same
    /// (user, product) line first, the quantities are added together.
    async fn insert_cart_line(&mut self, line: &CartLine) -> AppResult<CartLine>;

    async fn update_cart_line(&mut self, line: &CartLine) -> AppResult<()>;

    /// Persists the order and all of its lines.
    async fn insert_order(&mut self, order: &Order) -> AppResult<()>;

    async fn lock_order(&mut self, id: Uuid) -> AppResult<Option<Order>>;

    /// Persists status and delivery timestamp of an order locked by this transaction.
    async fn save_order_status(&mut self, order: &Order) -> AppResult<()>;

    async fn commit(self: Box<Self>) -> AppResult<()>;
}
