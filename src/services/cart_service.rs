use chrono::Utc;
use uuid::Uuid;

use crate::{
    dto::{
        cart::AddToCartRequest,
        orders::{OrderItemRequest, PlaceOrderRequest},
    },
    error::{AppError, AppResult},
    middleware::auth::AuthUser,
    models::{CartItemView, CartLine, CartSummary, Order, ShippingInfo, ensure_positive},
    response::Page,
    routes::params::Pagination,
    services::{order_service, resolve_user},
    state::AppState,
};

/// Adds `quantity` of a product, merging into the existing line if there is one.
pub async fn add_or_increase(
    state: &AppState,
    user: &AuthUser,
    payload: AddToCartRequest,
) -> AppResult<CartLine> {
    ensure_positive(payload.quantity)?;
    let customer = resolve_user(state, user).await?;
    state
        .store
        .find_product(payload.product_id)
        .await?
        .ok_or(AppError::ProductNotFound(payload.product_id))?;

    let now = Utc::now();
    let mut tx = state.store.begin().await?;
    let line = match tx.lock_cart_line(customer.id, payload.product_id).await? {
        Some(mut line) => {
            line.increase(payload.quantity, now)?;
            tx.update_cart_line(&line).await?;
            line
        }
        None => {
            let line = CartLine::new(customer.id, payload.product_id, payload.quantity, now)?;
            tx.insert_cart_line(&line).await?
        }
    };
    tx.commit().await?;

    tracing::info!(
        user = %customer.email,
        product_id = %line.product_id,
        quantity = line.quantity,
        "cart line saved"
    );
    Ok(line)
}

pub async fn set_quantity(
    state: &AppState,
    user: &AuthUser,
    line_id: Uuid,
    quantity: i32,
) -> AppResult<CartLine> {
    ensure_positive(quantity)?;
    let mut line = owned_line(state, user, line_id).await?;
    line.set_quantity(quantity, Utc::now())?;
    state.store.update_cart_line(&line).await?;

    tracing::info!(line_id = %line.id, quantity, "cart line updated");
    Ok(line)
}

pub async fn remove(state: &AppState, user: &AuthUser, line_id: Uuid) -> AppResult<()> {
    let line = owned_line(state, user, line_id).await?;
    state.store.delete_cart_lines(&[line.id]).await?;

    tracing::info!(line_id = %line.id, user = %user.email, "cart line removed");
    Ok(())
}

pub async fn clear(state: &AppState, user: &AuthUser) -> AppResult<u64> {
    let customer = resolve_user(state, user).await?;
    let removed = state.store.clear_cart(customer.id).await?;

    tracing::info!(user = %customer.email, removed, "cart cleared");
    Ok(removed)
}

pub async fn list_cart(
    state: &AppState,
    user: &AuthUser,
    pagination: Pagination,
) -> AppResult<Page<CartItemView>> {
    let (page, per_page, offset) = pagination.normalize();
    let views = cart_views(state, user).await?;
    let total = views.len() as i64;
    let items = views
        .into_iter()
        .skip(offset as usize)
        .take(per_page as usize)
        .collect();
    Ok(Page {
        items,
        page,
        per_page,
        total,
    })
}

pub async fn summarize(state: &AppState, user: &AuthUser) -> AppResult<CartSummary> {
    CartSummary::from_lines(cart_views(state, user).await?)
}

/// Drops every line asking for more than the product currently has.
pub async fn remove_out_of_stock(state: &AppState, user: &AuthUser) -> AppResult<u64> {
    let stale: Vec<Uuid> = cart_views(state, user)
        .await?
        .into_iter()
        .filter(|line| !line.stock_available)
        .map(|line| line.id)
        .collect();
    if stale.is_empty() {
        return Ok(0);
    }
    let removed = state.store.delete_cart_lines(&stale).await?;

    tracing::info!(user = %user.email, removed, "out of stock cart lines removed");
    Ok(removed)
}

/// Places an order for the whole cart. The cart itself is emptied by the
/// post-order cleanup worker, not here.
pub async fn checkout(
    state: &AppState,
    user: &AuthUser,
    shipping: ShippingInfo,
) -> AppResult<Order> {
    let summary = summarize(state, user).await?;
    if summary.lines.is_empty() {
        return Err(AppError::CartEmpty);
    }
    if summary.has_out_of_stock_line {
        return Err(AppError::CartHasOutOfStockLines);
    }

    let items = summary
        .lines
        .iter()
        .map(|line| OrderItemRequest {
            product_id: line.product_id,
            quantity: line.quantity,
        })
        .collect();
    order_service::place_order(state, user, PlaceOrderRequest { items, shipping }).await
}

async fn cart_views(state: &AppState, user: &AuthUser) -> AppResult<Vec<CartItemView>> {
    let customer = resolve_user(state, user).await?;
    let rows = state.store.cart_lines(customer.id).await?;
    rows.iter()
        .map(|(line, product)| CartItemView::new(line, product))
        .collect()
}

async fn owned_line(state: &AppState, user: &AuthUser, line_id: Uuid) -> AppResult<CartLine> {
    let customer = resolve_user(state, user).await?;
    let line = state
        .store
        .find_cart_line(line_id)
        .await?
        .ok_or(AppError::CartLineNotFound(line_id))?;
    if line.user_id != customer.id {
        return Err(AppError::AccessDenied);
    }
    Ok(line)
}
