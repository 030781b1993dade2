//! Membership persistence boundary.
//!
//! One synchronous trait, an in-memory implementation for tests/dev and a
//! Postgres implementation for production.

pub mod in_memory;
pub mod postgres;
pub mod r#trait;

use std::sync::Arc;

use sqlx::postgres::PgPoolOptions;
use tracing::info;

pub use in_memory::InMemoryMembershipStore;
pub use postgres::PostgresMembershipStore;
pub use r#trait::{MEMBER_AGGREGATE_TYPE, MembershipStore, StoreError, reassign_members};

use crate::config::MemberhubConfig;

/// Build the store selected by configuration.
///
/// `USE_PERSISTENT_STORES=true` connects to `DATABASE_URL` and runs
/// migrations; otherwise an empty in-memory store is returned.
pub async fn connect_store(config: &MemberhubConfig) -> Result<Arc<dyn MembershipStore>, StoreError> {
    if !config.use_persistent_stores {
        info!("using in-memory membership store");
        return Ok(Arc::new(InMemoryMembershipStore::new()));
    }

    let database_url = config.database_url.as_deref().ok_or_else(|| {
        StoreError::Backend("DATABASE_URL must be set when USE_PERSISTENT_STORES=true".to_string())
    })?;

    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .connect(database_url)
        .await
        .map_err(|e| StoreError::Backend(format!("failed to connect to Postgres: {e}")))?;

    let store = PostgresMembershipStore::new(pool);
    store.migrate().await?;
    info!("using Postgres membership store");
    Ok(Arc::new(store))
}
