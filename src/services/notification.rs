//! Post-order side effects. Events are published only after the order's
//! transaction has committed; consumers never report back to the caller.

use std::sync::Arc;

use serde::Serialize;
use tokio::{sync::mpsc, task::JoinHandle};
use uuid::Uuid;

use crate::{
    error::{AppError, AppResult},
    models::Order,
    store::Store,
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OrderCreated {
    pub order_id: Uuid,
    pub user_email: String,
    pub total_amount: i64,
}

impl From<&Order> for OrderCreated {
    fn from(order: &Order) -> Self {
        Self {
            order_id: order.id,
            user_email: order.user_email.clone(),
            total_amount: order.total_amount,
        }
    }
}

pub trait OrderEventSink: Send + Sync {
    /// Must not block and must not fail the caller.
    fn publish(&self, event: OrderCreated);
}

#[derive(Debug, Clone)]
pub struct ChannelEventSink {
    tx: mpsc::UnboundedSender<OrderCreated>,
}

impl OrderEventSink for ChannelEventSink {
    fn publish(&self, event: OrderCreated) {
        if let Err(err) = self.tx.send(event) {
            tracing::warn!(
                order_id = %err.0.order_id,
                "cart cleanup worker is gone, order event dropped"
            );
        }
    }
}

/// Clears the buyer's cart once their order exists.
pub struct CartCleanupWorker {
    store: Arc<dyn Store>,
}

impl CartCleanupWorker {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Starts the worker. It stops after every sender is dropped and the
    /// queue is drained.
    pub fn spawn(store: Arc<dyn Store>) -> (ChannelEventSink, JoinHandle<()>) {
        let (tx, mut rx) = mpsc::unbounded_channel::<OrderCreated>();
        let worker = Self::new(store);
        let handle = tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                worker.handle(event).await;
            }
            tracing::debug!("cart cleanup worker stopped");
        });
        (ChannelEventSink { tx }, handle)
    }

    pub async fn handle(&self, event: OrderCreated) {
        match self.clear_cart(&event).await {
            Ok(removed) => tracing::info!(
                order_id = %event.order_id,
                user = %event.user_email,
                removed,
                "cart cleared after order"
            ),
            Err(err) => tracing::warn!(
                order_id = %event.order_id,
                user = %event.user_email,
                error = %err,
                "cart cleanup failed"
            ),
        }
    }

    async fn clear_cart(&self, event: &OrderCreated) -> AppResult<u64> {
        let user = self
            .store
            .find_user_by_email(&event.user_email)
            .await?
            .ok_or_else(|| AppError::UserNotFound(event.user_email.clone()))?;
        self.store.clear_cart(user.id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    #[tokio::test]
    async fn unknown_user_is_swallowed() {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::default());
        let (sink, handle) = CartCleanupWorker::spawn(store);
        sink.publish(OrderCreated {
            order_id: Uuid::new_v4(),
            user_email: "ghost@example.com".into(),
            total_amount: 0,
        });
        drop(sink);
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn publishing_after_worker_exit_does_not_panic() {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::default());
        let (sink, handle) = CartCleanupWorker::spawn(store);
        handle.abort();
        let _ = handle.await;
        sink.publish(OrderCreated {
            order_id: Uuid::new_v4(),
            user_email: "late@example.com".into(),
            total_amount: 10,
        });
    }
}
