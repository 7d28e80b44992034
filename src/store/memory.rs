//! In-process store with the same locking contract as the Postgres one.
//!
//! Every product and order sits behind its own `tokio` mutex. A transaction
//! keeps the owned guards it acquired and stages its writes next to them;
//! commit copies the staged values into the guarded rows, drop throws them
//! away. Cart lines share one mutex.
//!
//! Plain reads never take a row mutex. They go to a copy of the last
//! committed rows, the way Postgres readers never wait on `FOR UPDATE`.

use std::{collections::HashMap, sync::Arc, time::Duration};

use anyhow::anyhow;
use async_trait::async_trait;
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};
use uuid::Uuid;

use crate::{
    error::{AppError, AppResult},
    models::{CartLine, Order, Product, User},
    store::{Store, StoreTx},
};

type Cart = HashMap<Uuid, CartLine>;

#[derive(Default)]
struct Tables {
    users: RwLock<HashMap<Uuid, User>>,
    products: RwLock<HashMap<Uuid, Arc<Mutex<Product>>>>,
    orders: RwLock<HashMap<Uuid, Arc<Mutex<Order>>>>,
    carts: Arc<Mutex<Cart>>,
    committed_products: RwLock<HashMap<Uuid, Product>>,
    committed_orders: RwLock<HashMap<Uuid, Order>>,
}

#[derive(Clone)]
pub struct MemoryStore {
    tables: Arc<Tables>,
    lock_timeout: Duration,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new(Duration::from_secs(5))
    }
}

impl MemoryStore {
    pub fn new(lock_timeout: Duration) -> Self {
        Self {
            tables: Arc::new(Tables::default()),
            lock_timeout,
        }
    }

    pub async fn insert_user(&self, user: User) {
        self.tables.users.write().await.insert(user.id, user);
    }

    pub async fn insert_product(&self, product: Product) {
        self.tables
            .committed_products
            .write()
            .await
            .insert(product.id, product.clone());
        self.tables
            .products
            .write()
            .await
            .insert(product.id, Arc::new(Mutex::new(product)));
    }

    /// Catalog price change; waits for any transaction holding the product.
    pub async fn set_price(&self, id: Uuid, price: i64) -> AppResult<()> {
        let mut product = self.lock_product(id).await?;
        product.price = price;
        self.publish_product(&product).await;
        Ok(())
    }

    pub async fn set_stock(&self, id: Uuid, stock: i32) -> AppResult<()> {
        if stock < 0 {
            return Err(AppError::Validation("stock cannot be negative".into()));
        }
        let mut product = self.lock_product(id).await?;
        product.stock = stock;
        self.publish_product(&product).await;
        Ok(())
    }

    async fn publish_product(&self, product: &Product) {
        self.tables
            .committed_products
            .write()
            .await
            .insert(product.id, product.clone());
    }

    async fn lock_product(&self, id: Uuid) -> AppResult<OwnedMutexGuard<Product>> {
        let cell = self.tables.products.read().await.get(&id).cloned();
        let cell = cell.ok_or(AppError::ProductNotFound(id))?;
        acquire(cell, self.lock_timeout).await
    }
}

async fn acquire<T: Send + 'static>(
    cell: Arc<Mutex<T>>,
    timeout: Duration,
) -> AppResult<OwnedMutexGuard<T>> {
    tokio::time::timeout(timeout, cell.lock_owned())
        .await
        .map_err(|_| AppError::LockTimeout)
}

#[async_trait]
impl Store for MemoryStore {
    async fn begin(&self) -> AppResult<Box<dyn StoreTx>> {
        Ok(Box::new(MemoryTx {
            tables: self.tables.clone(),
            lock_timeout: self.lock_timeout,
            products: HashMap::new(),
            stock: HashMap::new(),
            cart: None,
            cart_writes: Vec::new(),
            orders: HashMap::new(),
            order_writes: HashMap::new(),
            new_orders: Vec::new(),
        }))
    }

    async fn find_user_by_email(&self, email: &str) -> AppResult<Option<User>> {
        let users = self.tables.users.read().await;
        Ok(users.values().find(|u| u.email == email).cloned())
    }

    async fn find_product(&self, id: Uuid) -> AppResult<Option<Product>> {
        Ok(self.tables.committed_products.read().await.get(&id).cloned())
    }

    async fn list_products(&self, limit: u64, offset: u64) -> AppResult<(Vec<Product>, u64)> {
        let mut products: Vec<Product> = self
            .tables
            .committed_products
            .read()
            .await
            .values()
            .cloned()
            .collect();
        products.sort_by_key(|product| product.id);
        let total = products.len() as u64;
        let page = products
            .into_iter()
            .skip(offset as usize)
            .take(limit as usize)
            .collect();
        Ok((page, total))
    }

    async fn find_order(&self, id: Uuid) -> AppResult<Option<Order>> {
        Ok(self.tables.committed_orders.read().await.get(&id).cloned())
    }

    async fn list_orders_for_user(
        &self,
        user_id: Uuid,
        limit: u64,
        offset: u64,
    ) -> AppResult<(Vec<Order>, u64)> {
        let mut orders: Vec<Order> = self
            .tables
            .committed_orders
            .read()
            .await
            .values()
            .filter(|order| order.user_id == user_id)
            .cloned()
            .collect();
        orders.sort_by(|a, b| b.ordered_at.cmp(&a.ordered_at));
        let total = orders.len() as u64;
        let page = orders
            .into_iter()
            .skip(offset as usize)
            .take(limit as usize)
            .collect();
        Ok((page, total))
    }

    async fn cart_lines(&self, user_id: Uuid) -> AppResult<Vec<(CartLine, Product)>> {
        let mut lines: Vec<CartLine> = self
            .tables
            .carts
            .lock()
            .await
            .values()
            .filter(|line| line.user_id == user_id)
            .cloned()
            .collect();
        lines.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));

        let mut joined = Vec::with_capacity(lines.len());
        for line in lines {
            if let Some(product) = self.find_product(line.product_id).await? {
                joined.push((line, product));
            }
        }
        Ok(joined)
    }

    async fn find_cart_line(&self, id: Uuid) -> AppResult<Option<CartLine>> {
        Ok(self.tables.carts.lock().await.get(&id).cloned())
    }

    async fn update_cart_line(&self, line: &CartLine) -> AppResult<()> {
        let mut cart = self.tables.carts.lock().await;
        match cart.get_mut(&line.id) {
            Some(existing) => {
                *existing = line.clone();
                Ok(())
            }
            None => Err(AppError::CartLineNotFound(line.id)),
        }
    }

    async fn delete_cart_lines(&self, ids: &[Uuid]) -> AppResult<u64> {
        let mut cart = self.tables.carts.lock().await;
        let removed = ids.iter().filter(|id| cart.remove(*id).is_some()).count();
        Ok(removed as u64)
    }

    async fn clear_cart(&self, user_id: Uuid) -> AppResult<u64> {
        let mut cart = self.tables.carts.lock().await;
        let before = cart.len();
        cart.retain(|_, line| line.user_id != user_id);
        Ok((before - cart.len()) as u64)
    }
}

pub struct MemoryTx {
    tables: Arc<Tables>,
    lock_timeout: Duration,
    products: HashMap<Uuid, OwnedMutexGuard<Product>>,
    stock: HashMap<Uuid, i32>,
    cart: Option<OwnedMutexGuard<Cart>>,
    cart_writes: Vec<CartLine>,
    orders: HashMap<Uuid, OwnedMutexGuard<Order>>,
    order_writes: HashMap<Uuid, Order>,
    new_orders: Vec<Order>,
}

impl MemoryTx {
    async fn lock_cart(&mut self) -> AppResult<()> {
        if self.cart.is_none() {
            let guard = acquire(self.tables.carts.clone(), self.lock_timeout).await?;
            self.cart = Some(guard);
        }
        Ok(())
    }

    fn current_cart_line(&self, user_id: Uuid, product_id: Uuid) -> Option<CartLine> {
        let is_match = |line: &&CartLine| line.user_id == user_id && line.product_id == product_id;
        self.cart_writes
            .iter()
            .rev()
            .find(is_match)
            .or_else(|| self.cart.as_ref().and_then(|cart| cart.values().find(is_match)))
            .cloned()
    }

    fn current_order(&self, id: Uuid) -> Option<Order> {
        self.order_writes
            .get(&id)
            .cloned()
            .or_else(|| self.orders.get(&id).map(|guard| (**guard).clone()))
    }
}

#[async_trait]
impl StoreTx for MemoryTx {
    async fn lock_products(&mut self, ids: &[Uuid]) -> AppResult<HashMap<Uuid, Product>> {
        let mut sorted = ids.to_vec();
        sorted.sort_unstable();
        sorted.dedup();

        let mut locked = HashMap::with_capacity(sorted.len());
        for id in sorted {
            if !self.products.contains_key(&id) {
                let cell = self.tables.products.read().await.get(&id).cloned();
                let Some(cell) = cell else {
                    continue;
                };
                let guard = acquire(cell, self.lock_timeout).await?;
                self.products.insert(id, guard);
            }
            if let Some(guard) = self.products.get(&id) {
                let mut product = (**guard).clone();
                if let Some(stock) = self.stock.get(&id) {
                    product.stock = *stock;
                }
                locked.insert(id, product);
            }
        }
        Ok(locked)
    }

    async fn save_stock(&mut self, product: &Product) -> AppResult<()> {
        if !self.products.contains_key(&product.id) {
            return Err(AppError::Internal(anyhow!(
                "product {} is not locked by this transaction",
                product.id
            )));
        }
        if product.stock < 0 {
            return Err(AppError::Internal(anyhow!(
                "stock of product {} would become negative",
                product.id
            )));
        }
        self.stock.insert(product.id, product.stock);
        Ok(())
    }

    async fn lock_cart_line(
        &mut self,
        user_id: Uuid,
        product_id: Uuid,
    ) -> AppResult<Option<CartLine>> {
        self.lock_cart().await?;
        Ok(self.current_cart_line(user_id, product_id))
    }

    async fn insert_cart_line(&mut self, line: &CartLine) -> AppResult<CartLine> {
        self.lock_cart().await?;
        let stored = match self.current_cart_line(line.user_id, line.product_id) {
            Some(mut existing) => {
                existing.quantity += line.quantity;
                existing.updated_at = line.updated_at;
                existing
            }
            None => line.clone(),
        };
        self.cart_writes.push(stored.clone());
        Ok(stored)
    }

    async fn update_cart_line(&mut self, line: &CartLine) -> AppResult<()> {
        self.lock_cart().await?;
        self.cart_writes.push(line.clone());
        Ok(())
    }

    async fn insert_order(&mut self, order: &Order) -> AppResult<()> {
        self.new_orders.push(order.clone());
        Ok(())
    }

    async fn lock_order(&mut self, id: Uuid) -> AppResult<Option<Order>> {
        if !self.orders.contains_key(&id) {
            let cell = self.tables.orders.read().await.get(&id).cloned();
            let Some(cell) = cell else {
                return Ok(None);
            };
            let guard = acquire(cell, self.lock_timeout).await?;
            self.orders.insert(id, guard);
        }
        Ok(self.current_order(id))
    }

    async fn save_order_status(&mut self, order: &Order) -> AppResult<()> {
        if !self.orders.contains_key(&order.id) {
            return Err(AppError::Internal(anyhow!(
                "order {} is not locked by this transaction",
                order.id
            )));
        }
        self.order_writes.insert(order.id, order.clone());
        Ok(())
    }

    async fn commit(self: Box<Self>) -> AppResult<()> {
        let mut tx = *self;

        if !tx.stock.is_empty() {
            let mut committed = tx.tables.committed_products.write().await;
            for (id, stock) in tx.stock.drain() {
                if let Some(product) = tx.products.get_mut(&id) {
                    product.stock = stock;
                    committed.insert(id, (**product).clone());
                }
            }
        }

        if let Some(cart) = tx.cart.as_mut() {
            for line in tx.cart_writes.drain(..) {
                cart.insert(line.id, line);
            }
        }

        if !tx.order_writes.is_empty() || !tx.new_orders.is_empty() {
            let mut committed = tx.tables.committed_orders.write().await;
            for (id, order) in tx.order_writes.drain() {
                if let Some(guard) = tx.orders.get_mut(&id) {
                    committed.insert(id, order.clone());
                    **guard = order;
                }
            }
            if !tx.new_orders.is_empty() {
                let mut orders = tx.tables.orders.write().await;
                for order in tx.new_orders.drain(..) {
                    committed.insert(order.id, order.clone());
                    orders.insert(order.id, Arc::new(Mutex::new(order)));
                }
            }
        }

        Ok(())
    }
}
