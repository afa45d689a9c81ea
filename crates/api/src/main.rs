use std::sync::Arc;

use anyhow::Context;

use billfold_api::{build_app, AppServices, CacheConfig};
use billfold_store::PgBillStore;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    billfold_observability::init();

    let bind_addr = std::env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".to_string());

    let services = match std::env::var("DATABASE_URL") {
        Ok(dsn) => {
            let pool = sqlx::PgPool::connect(&dsn)
                .await
                .context("failed to connect to Postgres")?;
            Arc::new(AppServices::new(
                Arc::new(PgBillStore::new(pool)),
                CacheConfig::default(),
            ))
        }
        Err(_) => {
            tracing::warn!("DATABASE_URL not set; using in-memory store");
            Arc::new(AppServices::in_memory())
        }
    };

    let app = build_app(services);

    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("failed to bind {bind_addr}"))?;
    tracing::info!("listening on {}", listener.local_addr()?);

    axum::serve(listener, app).await?;
    Ok(())
}
