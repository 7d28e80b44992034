use crate::{
    error::AppResult,
    models::Product,
    response::Page,
    routes::params::Pagination,
    state::AppState,
};

/// Read-only catalog listing, ordered by product id.
pub async fn list_products(state: &AppState, pagination: Pagination) -> AppResult<Page<Product>> {
    let (page, per_page, offset) = pagination.normalize();
    let (items, total) = state
        .store
        .list_products(per_page as u64, offset as u64)
        .await?;
    Ok(Page {
        items,
        page,
        per_page,
        total: total as i64,
    })
}
