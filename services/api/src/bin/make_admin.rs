//! services/api/src/bin/make_admin.rs
//!
//! Promotes an existing account to the admin role: `make_admin <email>`.

use api_lib::{adapters::DbAdapter, config::Config, error::ApiError};
use sqlx::postgres::PgPoolOptions;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use visnovel_core::domain::Role;
use visnovel_core::ports::DatabaseService;

#[tokio::main]
async fn main() -> Result<(), ApiError> {
    let email = std::env::args()
        .nth(1)
        .map(|e| e.trim().to_lowercase())
        .filter(|e| !e.is_empty())
        .ok_or_else(|| ApiError::Internal("Usage: make_admin <email>".to_string()))?;

    let config = Config::from_env()?;
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(config.log_level.to_string()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let db_pool = PgPoolOptions::new()
        .max_connections(1)
        .connect(&config.database_url)
        .await?;
    let db = DbAdapter::new(db_pool);

    let user = db.set_user_role(&email, Role::Admin).await?;
    info!(user_id = %user.id, email = %user.email, "User is now an admin");
    Ok(())
}
