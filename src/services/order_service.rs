use chrono::Utc;
use uuid::Uuid;

use crate::{
    dto::orders::{PlaceOrderRequest, UpdateOrderStatusRequest},
    error::{AppError, AppResult},
    middleware::auth::{AuthUser, ensure_admin, ensure_owner, ensure_owner_or_admin},
    models::{Order, OrderLine, OrderStatus, ensure_positive},
    response::Page,
    routes::params::Pagination,
    services::{inventory, notification::OrderCreated, resolve_user},
    state::AppState,
    store::StoreTx,
};

/// Places an order atomically: every requested product is locked up front,
/// stock is decremented, prices are snapshotted and the order is stored in
/// one transaction. The `OrderCreated` event goes out only after commit.
pub async fn place_order(
    state: &AppState,
    user: &AuthUser,
    payload: PlaceOrderRequest,
) -> AppResult<Order> {
    if payload.items.is_empty() {
        return Err(AppError::Validation(
            "order must contain at least one item".into(),
        ));
    }
    for item in &payload.items {
        ensure_positive(item.quantity)?;
    }
    payload.shipping.validate()?;

    let customer = resolve_user(state, user).await?;

    let mut tx = state.store.begin().await?;
    let mut products =
        inventory::lock_and_fetch(tx.as_mut(), payload.items.iter().map(|i| i.product_id))
            .await?;

    if let Some(missing) = payload
        .items
        .iter()
        .find(|item| !products.contains_key(&item.product_id))
    {
        return Err(AppError::ProductNotFound(missing.product_id));
    }

    let mut lines = Vec::with_capacity(payload.items.len());
    for item in &payload.items {
        let product = products
            .get_mut(&item.product_id)
            .ok_or(AppError::ProductNotFound(item.product_id))?;
        inventory::decrement(tx.as_mut(), product, item.quantity).await?;
        lines.push(OrderLine::snapshot(product, item.quantity)?);
    }

    let order = Order::place(&customer, payload.shipping, lines, Utc::now())?;
    tx.insert_order(&order).await?;
    tx.commit().await?;

    tracing::info!(
        order_id = %order.id,
        user = %order.user_email,
        total = order.total_amount,
        lines = order.lines.len(),
        "order placed"
    );
    state.events.publish(OrderCreated::from(&order));

    Ok(order)
}

pub async fn get_order(state: &AppState, user: &AuthUser, order_id: Uuid) -> AppResult<Order> {
    let order = state
        .store
        .find_order(order_id)
        .await?
        .ok_or(AppError::OrderNotFound(order_id))?;
    ensure_owner_or_admin(user, &order.user_email)?;
    Ok(order)
}

pub async fn list_my_orders(
    state: &AppState,
    user: &AuthUser,
    pagination: Pagination,
) -> AppResult<Page<Order>> {
    let customer = resolve_user(state, user).await?;
    let (page, per_page, offset) = pagination.normalize();
    let (items, total) = state
        .store
        .list_orders_for_user(customer.id, per_page as u64, offset as u64)
        .await?;
    Ok(Page {
        items,
        page,
        per_page,
        total: total as i64,
    })
}

/// Owner-initiated cancellation. Status flip and stock restore commit together.
pub async fn cancel_order(state: &AppState, user: &AuthUser, order_id: Uuid) -> AppResult<Order> {
    let mut tx = state.store.begin().await?;
    let mut order = tx
        .lock_order(order_id)
        .await?
        .ok_or(AppError::OrderNotFound(order_id))?;
    ensure_owner(user, &order.user_email)?;

    order.cancel()?;
    restore_stock(tx.as_mut(), &order).await?;
    tx.save_order_status(&order).await?;
    tx.commit().await?;

    tracing::info!(order_id = %order.id, user = %user.email, "order cancelled");
    Ok(order)
}

pub async fn update_order_status(
    state: &AppState,
    user: &AuthUser,
    order_id: Uuid,
    payload: UpdateOrderStatusRequest,
) -> AppResult<Order> {
    ensure_admin(user)?;

    let mut tx = state.store.begin().await?;
    let mut order = tx
        .lock_order(order_id)
        .await?
        .ok_or(AppError::OrderNotFound(order_id))?;

    let from = order.status;
    order.change_status(payload.status, Utc::now())?;
    if order.status == OrderStatus::Cancelled {
        restore_stock(tx.as_mut(), &order).await?;
    }
    tx.save_order_status(&order).await?;
    tx.commit().await?;

    tracing::info!(
        order_id = %order.id,
        from = %from,
        to = %order.status,
        admin = %user.email,
        "order status changed"
    );
    Ok(order)
}

async fn restore_stock(tx: &mut dyn StoreTx, order: &Order) -> AppResult<()> {
    let mut products =
        inventory::lock_and_fetch(tx, order.lines.iter().map(|line| line.product_id)).await?;
    for line in &order.lines {
        let product = products
            .get_mut(&line.product_id)
            .ok_or(AppError::ProductNotFound(line.product_id))?;
        inventory::increase(tx, product, line.quantity).await?;
    }
    Ok(())
}
