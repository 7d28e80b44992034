mod common;

use axum::{
    Router,
    body::{Body, to_bytes},
    http::{Method, Request, StatusCode, header},
};
use axum_commerce_api::{dto::auth::Claims, routes::create_app};
use common::{JWT_SECRET, TestApp};
use jsonwebtoken::{EncodingKey, Header, encode};
use serde_json::{Value, json};
use tower::ServiceExt;

fn bearer(email: &str, role: &str) -> String {
    let claims = Claims {
        sub: email.to_string(),
        role: role.to_string(),
        exp: (chrono::Utc::now().timestamp() + 3600) as usize,
    };
    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(JWT_SECRET.as_bytes()),
    )
    .unwrap();
    format!("Bearer {token}")
}

async fn send(
    app: &Router,
    method: Method,
    uri: &str,
    auth: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(auth) = auth {
        builder = builder.header(header::AUTHORIZATION, auth);
    }
    let request = match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, json)
}

#[tokio::test]
async fn health_and_unknown_paths() {
    let test = TestApp::new();
    let app = create_app(test.state.clone());

    let (status, body) = send(&app, Method::GET, "/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["status"], "ok");

    let (status, body) = send(&app, Method::GET, "/nope", None, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["data"]["path"], "/nope");
}

#[tokio::test]
async fn requests_without_valid_token_are_unauthorized() {
    let test = TestApp::new();
    let app = create_app(test.state.clone());

    let (status, body) = send(&app, Method::GET, "/api/orders", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["data"]["code"], "UNAUTHORIZED");

    let (status, _) = send(
        &app,
        Method::GET,
        "/api/orders",
        Some("Bearer not-a-jwt"),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn order_lifecycle_over_http() {
    let test = TestApp::new();
    let product = test.product("Hoodie", 5500, 3).await;
    test.user("http@example.com").await;
    test.admin("ops@example.com").await;
    let app = create_app(test.state.clone());
    let user = bearer("http@example.com", "user");
    let admin = bearer("ops@example.com", "admin");

    let shipping = json!({ "address": "1 Crab St", "phone": "010", "name": "Ferris" });

    let (status, body) = send(
        &app,
        Method::POST,
        "/api/orders",
        Some(&user),
        Some(json!({
            "items": [{ "product_id": product.id, "quantity": 5 }],
            "shipping": shipping,
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["data"]["code"], "INSUFFICIENT_STOCK");

    let (status, body) = send(
        &app,
        Method::POST,
        "/api/orders",
        Some(&user),
        Some(json!({
            "items": [{ "product_id": product.id, "quantity": 2 }],
            "shipping": shipping,
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["status"], "PENDING");
    assert_eq!(body["data"]["total_amount"], 11000);
    let order_id = body["data"]["id"].as_str().unwrap().to_string();

    let (status, body) = send(&app, Method::GET, "/api/orders", Some(&user), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["meta"]["total"], 1);

    let (status, body) = send(
        &app,
        Method::PATCH,
        &format!("/api/admin/orders/{order_id}/status"),
        Some(&user),
        Some(json!({ "status": "SHIPPED" })),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["data"]["code"], "ACCESS_DENIED");

    let (status, _) = send(
        &app,
        Method::PATCH,
        &format!("/api/admin/orders/{order_id}/status"),
        Some(&admin),
        Some(json!({ "status": "SHIPPED" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = send(
        &app,
        Method::POST,
        &format!("/api/orders/{order_id}/cancel"),
        Some(&user),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["data"]["code"], "INVALID_ORDER_STATUS");
    assert_eq!(test.stock_of(product.id).await, 1);
}

#[tokio::test]
async fn cart_endpoints_round_trip() {
    let test = TestApp::new();
    let product = test.product("Mug", 1200, 10).await;
    test.user("cart-http@example.com").await;
    let app = create_app(test.state.clone());
    let user = bearer("cart-http@example.com", "user");

    let (status, body) = send(
        &app,
        Method::POST,
        "/api/cart",
        Some(&user),
        Some(json!({ "product_id": product.id, "quantity": 0 })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["data"]["code"], "INVALID_QUANTITY");

    for _ in 0..2 {
        let (status, _) = send(
            &app,
            Method::POST,
            "/api/cart",
            Some(&user),
            Some(json!({ "product_id": product.id, "quantity": 2 })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
    }

    let (status, body) = send(&app, Method::GET, "/api/cart/summary", Some(&user), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["total_items"], 1);
    assert_eq!(body["data"]["total_amount"], 4800);

    let (status, body) = send(&app, Method::GET, "/api/cart", Some(&user), None).await;
    assert_eq!(status, StatusCode::OK);
    let line_id = body["data"]["items"][0]["id"].as_str().unwrap().to_string();

    let (status, body) = send(
        &app,
        Method::PATCH,
        &format!("/api/cart/{line_id}"),
        Some(&user),
        Some(json!({ "quantity": 1 })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["quantity"], 1);

    let (status, body) = send(
        &app,
        Method::POST,
        "/api/cart/checkout",
        Some(&user),
        Some(json!({ "shipping": { "address": "1 Crab St", "phone": "010", "name": "Ferris" } })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["total_amount"], 1200);
    assert_eq!(test.sink.events().len(), 1);

    let (status, body) = send(&app, Method::DELETE, "/api/cart", Some(&user), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["removed"], 1);
}

#[tokio::test]
async fn product_catalog_is_public_and_paged_by_id() {
    let test = TestApp::new();
    let mut ids = Vec::new();
    for name in ["Mug", "Shirt", "Cap"] {
        ids.push(test.product(name, 1000, 5).await.id.to_string());
    }
    ids.sort();
    let app = create_app(test.state.clone());

    let (status, body) = send(&app, Method::GET, "/api/products?page=1&per_page=2", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["meta"]["total"], 3);
    assert_eq!(body["data"]["items"][0]["id"], ids[0].as_str());
    assert_eq!(body["data"]["items"][1]["id"], ids[1].as_str());

    let (status, body) = send(&app, Method::GET, "/api/products?page=2&per_page=2", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["items"][0]["id"], ids[2].as_str());
}

#[tokio::test]
async fn page_far_past_the_end_is_empty() {
    let test = TestApp::new();
    test.product("Mug", 1000, 5).await;
    test.user("pager@example.com").await;
    let app = create_app(test.state.clone());
    let user = bearer("pager@example.com", "user");

    let uri = format!("/api/orders?page={}&per_page=100", i64::MAX);
    let (status, body) = send(&app, Method::GET, &uri, Some(&user), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["items"].as_array().map(Vec::len), Some(0));

    let uri = format!("/api/products?page={}&per_page=100", i64::MAX);
    let (status, body) = send(&app, Method::GET, &uri, None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["meta"]["total"], 1);
    assert_eq!(body["data"]["items"].as_array().map(Vec::len), Some(0));
}
