use axum::{
    Json, Router,
    extract::{Path, Query, State},
    routing::{delete, get, patch, post},
};
use uuid::Uuid;

use crate::{
    dto::{
        cart::{AddToCartRequest, CartList, RemovedCount, UpdateCartItemRequest},
        orders::CheckoutRequest,
    },
    error::AppResult,
    middleware::auth::AuthUser,
    models::{CartLine, CartSummary, Order},
    response::{ApiResponse, Meta},
    routes::params::Pagination,
    services::cart_service,
    state::AppState,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(cart_list).post(add_to_cart).delete(clear_cart))
        .route("/summary", get(cart_summary))
        .route("/out-of-stock", delete(remove_out_of_stock))
        .route("/checkout", post(checkout))
        .route("/{id}", patch(update_cart_item).delete(remove_from_cart))
}

#[utoipa::path(
    get,
    path = "/api/cart",
    params(
        ("page" = Option<i64>, Query, description = "Page number, default 1"),
        ("per_page" = Option<i64>, Query, description = "Items per page, default 20")
    ),
    responses(
        (status = 200, description = "List cart items for current user", body = ApiResponse<CartList>)
    ),
    security(("bearer_auth" = [])),
    tag = "Cart"
)]
pub async fn cart_list(
    State(state): State<AppState>,
    user: AuthUser,
    Query(pagination): Query<Pagination>,
) -> AppResult<Json<ApiResponse<CartList>>> {
    let page = cart_service::list_cart(&state, &user, pagination).await?;
    let meta = page.meta();
    let data = CartList { items: page.items };
    Ok(Json(ApiResponse::success("OK", data, Some(meta))))
}

#[utoipa::path(
    post,
    path = "/api/cart",
    request_body = AddToCartRequest,
    responses(
        (status = 200, description = "Add or increase cart item", body = ApiResponse<CartLine>),
        (status = 400, description = "Invalid quantity"),
        (status = 404, description = "Product not found"),
    ),
    security(("bearer_auth" = [])),
    tag = "Cart"
)]
pub async fn add_to_cart(
    State(state): State<AppState>,
    user: AuthUser,
    Json(payload): Json<AddToCartRequest>,
) -> AppResult<Json<ApiResponse<CartLine>>> {
    let line = cart_service::add_or_increase(&state, &user, payload).await?;
    Ok(Json(ApiResponse::success("OK", line, None)))
}

#[utoipa::path(
    patch,
    path = "/api/cart/{id}",
    params(("id" = Uuid, Path, description = "Cart item ID")),
    request_body = UpdateCartItemRequest,
    responses(
        (status = 200, description = "Quantity updated", body = ApiResponse<CartLine>),
        (status = 403, description = "Cart item belongs to another user"),
        (status = 404, description = "Cart item not found"),
    ),
    security(("bearer_auth" = [])),
    tag = "Cart"
)]
pub async fn update_cart_item(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateCartItemRequest>,
) -> AppResult<Json<ApiResponse<CartLine>>> {
    let line = cart_service::set_quantity(&state, &user, id, payload.quantity).await?;
    Ok(Json(ApiResponse::success("OK", line, None)))
}

#[utoipa::path(
    delete,
    path = "/api/cart/{id}",
    params(("id" = Uuid, Path, description = "Cart item ID")),
    responses(
        (status = 200, description = "OK", body = ApiResponse<serde_json::Value>),
        (status = 404, description = "Cart item not found"),
    ),
    security(("bearer_auth" = [])),
    tag = "Cart"
)]
pub async fn remove_from_cart(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<serde_json::Value>>> {
    cart_service::remove(&state, &user, id).await?;
    Ok(Json(ApiResponse::success(
        "Removed from cart",
        serde_json::json!({}),
        Some(Meta::empty()),
    )))
}

#[utoipa::path(
    delete,
    path = "/api/cart",
    responses((status = 200, description = "Cart cleared", body = ApiResponse<RemovedCount>)),
    security(("bearer_auth" = [])),
    tag = "Cart"
)]
pub async fn clear_cart(
    State(state): State<AppState>,
    user: AuthUser,
) -> AppResult<Json<ApiResponse<RemovedCount>>> {
    let removed = cart_service::clear(&state, &user).await?;
    Ok(Json(ApiResponse::success(
        "Cart cleared",
        RemovedCount { removed },
        None,
    )))
}

#[utoipa::path(
    get,
    path = "/api/cart/summary",
    responses((status = 200, description = "Cart totals at current prices", body = ApiResponse<CartSummary>)),
    security(("bearer_auth" = [])),
    tag = "Cart"
)]
pub async fn cart_summary(
    State(state): State<AppState>,
    user: AuthUser,
) -> AppResult<Json<ApiResponse<CartSummary>>> {
    let summary = cart_service::summarize(&state, &user).await?;
    Ok(Json(ApiResponse::success("OK", summary, None)))
}

#[utoipa::path(
    delete,
    path = "/api/cart/out-of-stock",
    responses((status = 200, description = "Lines exceeding stock removed", body = ApiResponse<RemovedCount>)),
    security(("bearer_auth" = [])),
    tag = "Cart"
)]
pub async fn remove_out_of_stock(
    State(state): State<AppState>,
    user: AuthUser,
) -> AppResult<Json<ApiResponse<RemovedCount>>> {
    let removed = cart_service::remove_out_of_stock(&state, &user).await?;
    Ok(Json(ApiResponse::success(
        "OK",
        RemovedCount { removed },
        None,
    )))
}

#[utoipa::path(
    post,
    path = "/api/cart/checkout",
    request_body = CheckoutRequest,
    responses(
        (status = 200, description = "Order placed from cart", body = ApiResponse<Order>),
        (status = 400, description = "Cart is empty"),
        (status = 409, description = "Cart has items exceeding stock"),
    ),
    security(("bearer_auth" = [])),
    tag = "Cart"
)]
pub async fn checkout(
    State(state): State<AppState>,
    user: AuthUser,
    Json(payload): Json<CheckoutRequest>,
) -> AppResult<Json<ApiResponse<Order>>> {
    let order = cart_service::checkout(&state, &user, payload.shipping).await?;
    Ok(Json(ApiResponse::success("Order placed", order, None)))
}
