use crate::{
    error::{AppError, AppResult},
    middleware::auth::AuthUser,
    models::User,
    state::AppState,
};

pub mod cart_service;
pub mod inventory;
pub mod notification;
pub mod order_service;
pub mod product_service;

/// Loads the stored user behind an authenticated caller.
pub(crate) async fn resolve_user(state: &AppState, user: &AuthUser) -> AppResult<User> {
    state
        .store
        .find_user_by_email(&user.email)
        .await?
        .ok_or_else(|| AppError::UserNotFound(user.email.clone()))
}
