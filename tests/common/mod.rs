#![allow(dead_code)]

use std::{
    sync::{Arc, Mutex},
    time::Duration,
};

use axum_commerce_api::{
    middleware::auth::AuthUser,
    models::{Product, Role, ShippingInfo, User},
    services::notification::{OrderCreated, OrderEventSink},
    state::AppState,
    store::{MemoryStore, Store},
};
use chrono::Utc;
use uuid::Uuid;

pub const JWT_SECRET: &str = "test-secret";

/// Keeps every published event so tests can assert on what was emitted.
#[derive(Default)]
pub struct RecordingSink {
    events: Mutex<Vec<OrderCreated>>,
}

impl RecordingSink {
    pub fn events(&self) -> Vec<OrderCreated> {
        self.events.lock().unwrap().clone()
    }
}

impl OrderEventSink for RecordingSink {
    fn publish(&self, event: OrderCreated) {
        self.events.lock().unwrap().push(event);
    }
}

pub struct TestApp {
    pub state: AppState,
    pub store: Arc<MemoryStore>,
    pub sink: Arc<RecordingSink>,
}

impl TestApp {
    pub fn new() -> Self {
        let store = Arc::new(MemoryStore::new(Duration::from_secs(2)));
        let sink = Arc::new(RecordingSink::default());
        let dyn_store: Arc<dyn Store> = store.clone();
        let state = AppState::new(dyn_store, sink.clone(), JWT_SECRET);
        Self { state, store, sink }
    }

    pub async fn user(&self, email: &str) -> AuthUser {
        self.user_with_role(email, Role::User).await
    }

    pub async fn admin(&self, email: &str) -> AuthUser {
        self.user_with_role(email, Role::Admin).await
    }

    async fn user_with_role(&self, email: &str, role: Role) -> AuthUser {
        self.store
            .insert_user(User {
                id: Uuid::new_v4(),
                email: email.to_string(),
                role,
                created_at: Utc::now(),
            })
            .await;
        AuthUser {
            email: email.to_string(),
            role,
        }
    }

    pub async fn product(&self, name: &str, price: i64, stock: i32) -> Product {
        let product = Product {
            id: Uuid::new_v4(),
            name: name.to_string(),
            price,
            stock,
            external_id: None,
            created_at: Utc::now(),
        };
        self.store.insert_product(product.clone()).await;
        product
    }

    pub async fn stock_of(&self, id: Uuid) -> i32 {
        self.store.find_product(id).await.unwrap().unwrap().stock
    }
}

pub fn shipping() -> ShippingInfo {
    ShippingInfo {
        address: "1 Crab Street, Rustville".into(),
        phone: "010-1234-5678".into(),
        name: "Ferris".into(),
    }
}
