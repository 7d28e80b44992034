//! Stock mutations. Every function runs inside the caller's transaction and
//! only touches products that transaction has locked.

use std::collections::{BTreeSet, HashMap};

use uuid::Uuid;

use crate::{error::AppResult, models::Product, store::StoreTx};

/// Locks every distinct id in one call, in ascending order.
pub async fn lock_and_fetch(
    tx: &mut dyn StoreTx,
    ids: impl IntoIterator<Item = Uuid>,
) -> AppResult<HashMap<Uuid, Product>> {
    let ids: Vec<Uuid> = ids.into_iter().collect::<BTreeSet<_>>().into_iter().collect();
    tracing::debug!(count = ids.len(), "locking products");
    tx.lock_products(&ids).await
}

pub async fn decrement(tx: &mut dyn StoreTx, product: &mut Product, quantity: i32) -> AppResult<()> {
    product.decrease_stock(quantity)?;
    tx.save_stock(product).await
}

/// Compensation for a cancelled order.
pub async fn increase(tx: &mut dyn StoreTx, product: &mut Product, quantity: i32) -> AppResult<()> {
    product.increase_stock(quantity)?;
    tx.save_stock(product).await
}
