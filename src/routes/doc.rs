use utoipa::{
    Modify, OpenApi,
    openapi::{
        self,
        OpenApi as OpenApiSpec,
        security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    },
};
use utoipa_scalar::{Scalar, Servable};

use crate::{
    dto::{
        cart::{AddToCartRequest, CartList, RemovedCount, UpdateCartItemRequest},
        orders::{
            CheckoutRequest, OrderItemRequest, OrderList, PlaceOrderRequest,
            UpdateOrderStatusRequest,
        },
        products::ProductList,
    },
    models::{
        CartItemView, CartLine, CartSummary, Order, OrderLine, OrderStatus, Product, ShippingInfo,
    },
    response::{ApiResponse, Meta},
    routes::{admin, cart, health, orders, params, products},
};

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "bearer_auth",
            SecurityScheme::Http(
                HttpBuilder::new()
                    .scheme(HttpAuthScheme::Bearer)
                    .bearer_format("JWT")
                    .build(),
            ),
        );
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(
        health::health_check,
        cart::cart_list,
        cart::add_to_cart,
        cart::update_cart_item,
        cart::remove_from_cart,
        cart::clear_cart,
        cart::cart_summary,
        cart::remove_out_of_stock,
        cart::checkout,
        orders::list_orders,
        orders::place_order,
        orders::get_order,
        orders::cancel_order,
        products::list_products,
        admin::update_order_status
    ),
    components(
        schemas(
            CartLine,
            CartItemView,
            CartSummary,
            Order,
            OrderLine,
            OrderStatus,
            ShippingInfo,
            AddToCartRequest,
            UpdateCartItemRequest,
            RemovedCount,
            CartList,
            CheckoutRequest,
            OrderItemRequest,
            PlaceOrderRequest,
            UpdateOrderStatusRequest,
            OrderList,
            Product,
            ProductList,
            params::Pagination,
            Meta,
            ApiResponse<Order>,
            ApiResponse<OrderList>,
            ApiResponse<ProductList>,
            ApiResponse<CartList>,
            ApiResponse<CartSummary>
        )
    ),
    security(
        ("bearer_auth" = [])
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "Health", description = "Health check endpoint"),
        (name = "Cart", description = "Cart endpoints"),
        (name = "Orders", description = "Order placement and tracking"),
        (name = "Products", description = "Read-only product catalog"),
        (name = "Admin", description = "Admin endpoints"),
    )
)]
pub struct ApiDoc;

pub fn scalar_docs() -> Scalar<OpenApiSpec> {
    Scalar::with_url("/docs", ApiDoc::openapi())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_route_is_documented() {
        let spec = ApiDoc::openapi();
        for path in [
            "/health",
            "/api/cart",
            "/api/cart/{id}",
            "/api/cart/summary",
            "/api/cart/out-of-stock",
            "/api/cart/checkout",
            "/api/orders",
            "/api/orders/{id}",
            "/api/orders/{id}/cancel",
            "/api/products",
            "/api/admin/orders/{id}/status",
        ] {
            assert!(spec.paths.paths.contains_key(path), "missing {path}");
        }
    }
}
