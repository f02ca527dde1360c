use std::sync::Arc;

use sqlx::{Pool, Postgres};

use crate::{jwt::SessionKeys, storage::FsBlobStore};

mod handlers;
mod rejection;
mod routes;

pub use rejection::handle_rejection;
pub use routes::routes;

/// Shared by every request handler.
pub struct AppState {
    pub pool: Pool<Postgres>,
    pub keys: Arc<SessionKeys>,
    pub blobs: FsBlobStore,
}

impl AppState {
    pub fn new(pool: Pool<Postgres>, keys: SessionKeys, blobs: FsBlobStore) -> Arc<Self> {
        Arc::new(Self {
            pool,
            keys: Arc::new(keys),
            blobs,
        })
    }
}
