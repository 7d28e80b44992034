use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

use crate::{
    models::OrderStatus,
    response::{ApiResponse, Meta},
};

#[derive(Debug, Error)]
pub enum AppError {
    #[error("User not found: {0}")]
    UserNotFound(String),

    #[error("Product not found: {0}")]
    ProductNotFound(Uuid),

    #[error("Order not found: {0}")]
    OrderNotFound(Uuid),

    #[error("Cart item not found: {0}")]
    CartLineNotFound(Uuid),

    #[error("Insufficient stock for product {product_id}: requested {requested}, available {available}")]
    InsufficientStock {
        product_id: Uuid,
        requested: i32,
        available: i32,
    },

    #[error("Quantity must be greater than 0, got {0}")]
    InvalidQuantity(i32),

    #[error("Order cannot move from {from} to {to}")]
    InvalidOrderStatus { from: OrderStatus, to: OrderStatus },

    #[error("Access denied")]
    AccessDenied,

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Cart is empty")]
    CartEmpty,

    #[error("Cart has items exceeding available stock")]
    CartHasOutOfStockLines,

    #[error("Bad Request {0}")]
    Validation(String),

    #[error("Could not acquire lock, try again")]
    LockTimeout,

    #[error("ORM error")]
    OrmError(#[from] sea_orm::DbErr),

    #[error("Internal Server Error")]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    /// Stable machine-readable code, safe to match on from clients.
    pub fn code(&self) -> &'static str {
        match self {
            AppError::UserNotFound(_) => "USER_NOT_FOUND",
            AppError::ProductNotFound(_) => "PRODUCT_NOT_FOUND",
            AppError::OrderNotFound(_) => "ORDER_NOT_FOUND",
            AppError::CartLineNotFound(_) => "CART_ITEM_NOT_FOUND",
            AppError::InsufficientStock { .. } => "INSUFFICIENT_STOCK",
            AppError::InvalidQuantity(_) => "INVALID_QUANTITY",
            AppError::InvalidOrderStatus { .. } => "INVALID_ORDER_STATUS",
            AppError::AccessDenied => "ACCESS_DENIED",
            AppError::Unauthorized(_) => "UNAUTHORIZED",
            AppError::CartEmpty => "CART_EMPTY",
            AppError::CartHasOutOfStockLines => "CART_ITEM_OUT_OF_STOCK",
            AppError::Validation(_) => "INVALID_INPUT",
            AppError::LockTimeout => "LOCK_TIMEOUT",
            AppError::OrmError(_) | AppError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AppError::UserNotFound(_)
            | AppError::ProductNotFound(_)
            | AppError::OrderNotFound(_)
            | AppError::CartLineNotFound(_) => StatusCode::NOT_FOUND,
            AppError::InvalidQuantity(_) | AppError::CartEmpty | AppError::Validation(_) => {
                StatusCode::BAD_REQUEST
            }
            AppError::InsufficientStock { .. }
            | AppError::InvalidOrderStatus { .. }
            | AppError::CartHasOutOfStockLines => StatusCode::CONFLICT,
            AppError::AccessDenied => StatusCode::FORBIDDEN,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::LockTimeout => StatusCode::SERVICE_UNAVAILABLE,
            AppError::OrmError(_) | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// True for failures a caller may retry unchanged.
    pub fn is_retryable(&self) -> bool {
        matches!(self, AppError::LockTimeout)
    }
}

#[derive(Serialize)]
struct ErrorData {
    code: &'static str,
    error: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!(error = ?self, "internal error");
        }

        let body = ApiResponse {
            message: self.to_string(),
            data: Some(ErrorData {
                code: self.code(),
                error: self.to_string(),
            }),
            meta: Some(Meta::empty()),
        };

        (status, axum::Json(body)).into_response()
    }
}

pub type AppResult<T> = Result<T, AppError>;
