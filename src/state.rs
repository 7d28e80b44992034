use std::sync::Arc;

use crate::{services::notification::OrderEventSink, store::Store};

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn Store>,
    pub events: Arc<dyn OrderEventSink>,
    pub jwt_secret: Arc<str>,
}

impl AppState {
    pub fn new(
        store: Arc<dyn Store>,
        events: Arc<dyn OrderEventSink>,
        jwt_secret: impl Into<Arc<str>>,
    ) -> Self {
        Self {
            store,
            events,
            jwt_secret: jwt_secret.into(),
        }
    }
}
