mod common;

use axum_commerce_api::{
    dto::orders::{OrderItemRequest, PlaceOrderRequest, UpdateOrderStatusRequest},
    error::AppError,
    models::OrderStatus,
    routes::params::Pagination,
    services::order_service,
};
use common::{TestApp, shipping};
use uuid::Uuid;

fn request(items: &[(Uuid, i32)]) -> PlaceOrderRequest {
    PlaceOrderRequest {
        items: items
            .iter()
            .map(|&(product_id, quantity)| OrderItemRequest {
                product_id,
                quantity,
            })
            .collect(),
        shipping: shipping(),
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_orders_never_oversell() -> anyhow::Result<()> {
    let app = TestApp::new();
    let product = app.product("Limited Print", 1000, 10).await;
    let alice = app.user("alice@example.com").await;
    let bob = app.user("bob@example.com").await;

    let mut handles = Vec::new();
    for user in [alice, bob] {
        let state = app.state.clone();
        let req = request(&[(product.id, 6)]);
        handles.push(tokio::spawn(async move {
            order_service::place_order(&state, &user, req).await
        }));
    }

    let mut placed = 0;
    let mut rejected = 0;
    for handle in handles {
        match handle.await? {
            Ok(_) => placed += 1,
            Err(AppError::InsufficientStock {
                requested: 6,
                available: 4,
                ..
            }) => rejected += 1,
            Err(other) => panic!("unexpected error: {other}"),
        }
    }
    assert_eq!((placed, rejected), (1, 1));
    assert_eq!(app.stock_of(product.id).await, 4);
    assert_eq!(app.sink.events().len(), 1);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn overlapping_product_sets_in_opposite_order_do_not_deadlock() -> anyhow::Result<()> {
    let app = TestApp::new();
    let a = app.product("A", 100, 1000).await;
    let b = app.product("B", 100, 1000).await;
    let user = app.user("buyer@example.com").await;

    let mut handles = Vec::new();
    for i in 0..20 {
        let state = app.state.clone();
        let user = user.clone();
        let items = if i % 2 == 0 {
            [(a.id, 1), (b.id, 1)]
        } else {
            [(b.id, 1), (a.id, 1)]
        };
        let req = request(&items);
        handles.push(tokio::spawn(async move {
            order_service::place_order(&state, &user, req).await
        }));
    }
    for handle in handles {
        handle.await??;
    }

    assert_eq!(app.stock_of(a.id).await, 980);
    assert_eq!(app.stock_of(b.id).await, 980);
    Ok(())
}

#[tokio::test]
async fn order_keeps_prices_from_placement_time() -> anyhow::Result<()> {
    let app = TestApp::new();
    let p1 = app.product("Mug", 100, 10).await;
    let p2 = app.product("Shirt", 200, 10).await;
    let user = app.user("snap@example.com").await;

    let order =
        order_service::place_order(&app.state, &user, request(&[(p1.id, 2), (p2.id, 1)])).await?;
    assert_eq!(order.total_amount, 400);
    assert_eq!(order.status, OrderStatus::Pending);
    assert_eq!(order.user_email, "snap@example.com");

    app.store.set_price(p1.id, 999).await?;

    let stored = order_service::get_order(&app.state, &user, order.id).await?;
    assert_eq!(stored.total_amount, 400);
    assert_eq!(stored.lines[0].unit_price, 100);
    assert_eq!(stored.lines[0].product_name, "Mug");
    Ok(())
}

#[tokio::test]
async fn unknown_product_aborts_everything() -> anyhow::Result<()> {
    let app = TestApp::new();
    let known = app.product("Known", 100, 5).await;
    let user = app.user("abort@example.com").await;
    let missing = Uuid::new_v4();

    let err = order_service::place_order(&app.state, &user, request(&[(known.id, 2), (missing, 1)]))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::ProductNotFound(id) if id == missing));

    assert_eq!(app.stock_of(known.id).await, 5);
    let page = order_service::list_my_orders(&app.state, &user, Pagination::default()).await?;
    assert_eq!(page.total, 0);
    assert!(app.sink.events().is_empty());
    Ok(())
}

#[tokio::test]
async fn insufficient_stock_on_a_later_line_rolls_back_earlier_decrements() -> anyhow::Result<()> {
    let app = TestApp::new();
    let plenty = app.product("Plenty", 100, 10).await;
    let scarce = app.product("Scarce", 100, 1).await;
    let user = app.user("rollback@example.com").await;

    let err =
        order_service::place_order(&app.state, &user, request(&[(plenty.id, 3), (scarce.id, 2)]))
            .await
            .unwrap_err();
    assert!(matches!(err, AppError::InsufficientStock { .. }));
    assert_eq!(err.code(), "INSUFFICIENT_STOCK");

    assert_eq!(app.stock_of(plenty.id).await, 10);
    assert_eq!(app.stock_of(scarce.id).await, 1);
    assert!(app.sink.events().is_empty());
    Ok(())
}

#[tokio::test]
async fn invalid_input_is_rejected_before_touching_stock() {
    let app = TestApp::new();
    let product = app.product("Pen", 10, 3).await;
    let user = app.user("input@example.com").await;

    let err = order_service::place_order(&app.state, &user, request(&[(product.id, 0)]))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::InvalidQuantity(0)));

    let err = order_service::place_order(&app.state, &user, request(&[]))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));

    let mut blank = request(&[(product.id, 1)]);
    blank.shipping.address = " ".into();
    let err = order_service::place_order(&app.state, &user, blank)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));

    assert_eq!(app.stock_of(product.id).await, 3);
}

#[tokio::test]
async fn unknown_caller_is_rejected() {
    let app = TestApp::new();
    let product = app.product("Pen", 10, 3).await;
    let ghost = axum_commerce_api::middleware::auth::AuthUser {
        email: "ghost@example.com".into(),
        role: axum_commerce_api::models::Role::User,
    };
    let err = order_service::place_order(&app.state, &ghost, request(&[(product.id, 1)]))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::UserNotFound(_)));
    assert_eq!(app.stock_of(product.id).await, 3);
}

#[tokio::test]
async fn repeated_product_ids_become_separate_lines() -> anyhow::Result<()> {
    let app = TestApp::new();
    let product = app.product("Sticker", 50, 5).await;
    let user = app.user("repeat@example.com").await;

    let order =
        order_service::place_order(&app.state, &user, request(&[(product.id, 2), (product.id, 3)]))
            .await?;
    assert_eq!(order.lines.len(), 2);
    assert_eq!(order.total_amount, 250);
    assert_eq!(app.stock_of(product.id).await, 0);
    Ok(())
}

#[tokio::test]
async fn event_is_published_after_commit_with_order_facts() -> anyhow::Result<()> {
    let app = TestApp::new();
    let product = app.product("Cap", 700, 2).await;
    let user = app.user("event@example.com").await;

    let order = order_service::place_order(&app.state, &user, request(&[(product.id, 2)])).await?;

    let events = app.sink.events();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].order_id, order.id);
    assert_eq!(events[0].user_email, "event@example.com");
    assert_eq!(events[0].total_amount, 1400);

    // The order the event names is already visible.
    let stored = order_service::get_order(&app.state, &user, events[0].order_id).await?;
    assert_eq!(stored.id, order.id);
    Ok(())
}

#[tokio::test]
async fn cancellation_restores_stock() -> anyhow::Result<()> {
    let app = TestApp::new();
    let a = app.product("A", 100, 10).await;
    let b = app.product("B", 100, 10).await;
    let user = app.user("cancel@example.com").await;

    let order =
        order_service::place_order(&app.state, &user, request(&[(a.id, 3), (b.id, 4)])).await?;
    assert_eq!(app.stock_of(a.id).await, 7);
    assert_eq!(app.stock_of(b.id).await, 6);

    let cancelled = order_service::cancel_order(&app.state, &user, order.id).await?;
    assert_eq!(cancelled.status, OrderStatus::Cancelled);
    assert_eq!(app.stock_of(a.id).await, 10);
    assert_eq!(app.stock_of(b.id).await, 10);

    // A second cancel is an invalid transition and restores nothing.
    let err = order_service::cancel_order(&app.state, &user, order.id)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::InvalidOrderStatus { .. }));
    assert_eq!(app.stock_of(a.id).await, 10);
    Ok(())
}

#[tokio::test]
async fn shipped_order_cannot_be_cancelled() -> anyhow::Result<()> {
    let app = TestApp::new();
    let product = app.product("Lamp", 100, 5).await;
    let user = app.user("shipped@example.com").await;
    let admin = app.admin("ops@example.com").await;

    let order = order_service::place_order(&app.state, &user, request(&[(product.id, 2)])).await?;
    order_service::update_order_status(
        &app.state,
        &admin,
        order.id,
        UpdateOrderStatusRequest {
            status: OrderStatus::Shipped,
        },
    )
    .await?;

    let err = order_service::cancel_order(&app.state, &user, order.id)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        AppError::InvalidOrderStatus {
            from: OrderStatus::Shipped,
            to: OrderStatus::Cancelled
        }
    ));
    assert_eq!(app.stock_of(product.id).await, 3);
    let stored = order_service::get_order(&app.state, &user, order.id).await?;
    assert_eq!(stored.status, OrderStatus::Shipped);
    Ok(())
}

#[tokio::test]
async fn only_the_owner_may_cancel_or_read() -> anyhow::Result<()> {
    let app = TestApp::new();
    let product = app.product("Book", 100, 5).await;
    let owner = app.user("owner@example.com").await;
    let other = app.user("other@example.com").await;
    let admin = app.admin("admin@example.com").await;

    let order = order_service::place_order(&app.state, &owner, request(&[(product.id, 1)])).await?;

    assert!(matches!(
        order_service::get_order(&app.state, &other, order.id).await,
        Err(AppError::AccessDenied)
    ));
    assert!(matches!(
        order_service::cancel_order(&app.state, &other, order.id).await,
        Err(AppError::AccessDenied)
    ));
    assert_eq!(app.stock_of(product.id).await, 4);

    let seen_by_admin = order_service::get_order(&app.state, &admin, order.id).await?;
    assert_eq!(seen_by_admin.id, order.id);

    assert!(matches!(
        order_service::get_order(&app.state, &owner, Uuid::new_v4()).await,
        Err(AppError::OrderNotFound(_))
    ));
    Ok(())
}

#[tokio::test]
async fn admin_status_changes_follow_the_state_machine() -> anyhow::Result<()> {
    let app = TestApp::new();
    let product = app.product("Desk", 100, 5).await;
    let user = app.user("buyer@example.com").await;
    let admin = app.admin("ops@example.com").await;
    let change = |status| UpdateOrderStatusRequest { status };

    let order = order_service::place_order(&app.state, &user, request(&[(product.id, 2)])).await?;

    assert!(matches!(
        order_service::update_order_status(&app.state, &user, order.id, change(OrderStatus::Confirmed))
            .await,
        Err(AppError::AccessDenied)
    ));

    let delivered =
        order_service::update_order_status(&app.state, &admin, order.id, change(OrderStatus::Delivered))
            .await?;
    assert!(delivered.delivered_at.is_some());

    assert!(matches!(
        order_service::update_order_status(&app.state, &admin, order.id, change(OrderStatus::Pending))
            .await,
        Err(AppError::InvalidOrderStatus { .. })
    ));

    let refunded =
        order_service::update_order_status(&app.state, &admin, order.id, change(OrderStatus::Refunded))
            .await?;
    assert_eq!(refunded.status, OrderStatus::Refunded);
    // Refunds keep stock as it is.
    assert_eq!(app.stock_of(product.id).await, 3);

    assert!(matches!(
        order_service::update_order_status(&app.state, &admin, order.id, change(OrderStatus::Shipped))
            .await,
        Err(AppError::InvalidOrderStatus { .. })
    ));
    Ok(())
}

#[tokio::test]
async fn admin_cancellation_restores_stock() -> anyhow::Result<()> {
    let app = TestApp::new();
    let product = app.product("Chair", 100, 5).await;
    let user = app.user("buyer@example.com").await;
    let admin = app.admin("ops@example.com").await;

    let order = order_service::place_order(&app.state, &user, request(&[(product.id, 5)])).await?;
    assert_eq!(app.stock_of(product.id).await, 0);

    let cancelled = order_service::update_order_status(
        &app.state,
        &admin,
        order.id,
        UpdateOrderStatusRequest {
            status: OrderStatus::Cancelled,
        },
    )
    .await?;
    assert_eq!(cancelled.status, OrderStatus::Cancelled);
    assert_eq!(app.stock_of(product.id).await, 5);
    Ok(())
}

#[tokio::test]
async fn my_orders_are_listed_newest_first() -> anyhow::Result<()> {
    let app = TestApp::new();
    let product = app.product("Gum", 10, 100).await;
    let user = app.user("history@example.com").await;
    let other = app.user("someone@example.com").await;

    let mut placed = Vec::new();
    for qty in 1..=3 {
        placed.push(
            order_service::place_order(&app.state, &user, request(&[(product.id, qty)]))
                .await?
                .id,
        );
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    }
    order_service::place_order(&app.state, &other, request(&[(product.id, 1)])).await?;

    let first = order_service::list_my_orders(&app.state, &user, Pagination::new(1, 2)).await?;
    assert_eq!(first.total, 3);
    assert!(first.has_next());
    let ids: Vec<_> = first.items.iter().map(|o| o.id).collect();
    assert_eq!(ids, vec![placed[2], placed[1]]);

    let second = order_service::list_my_orders(&app.state, &user, Pagination::new(2, 2)).await?;
    assert_eq!(second.items.len(), 1);
    assert_eq!(second.items[0].id, placed[0]);
    Ok(())
}
