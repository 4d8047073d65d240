//! Example server: loads model and resource config from `CONFIG_PATH` (default `demos/shop`),
//! stores records in PostgreSQL when `DATABASE_URL` is set and in memory otherwise, and mounts
//! the resources under `MOUNT_PATH`. With PostgreSQL the tables must already exist: one
//! `{app}_{model}` table per model and one `{table}_{field}` link table per many-to-many field.

use resource_api::{
    app_router, load_from_dir, resolve, AppState, MemoryStore, PgStore, RecordStore, Requestor,
    Settings, Site,
};
use serde_json::Value;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("resource_api=info")))
        .init();

    let settings = Settings::from_env();
    let config_dir = settings.config_path.clone().unwrap_or_else(|| "demos/shop".into());
    let config = load_from_dir(&config_dir).await?;
    let mut resolved = resolve(&config)?;
    resolved.attach_property("shop.product", "on_sale", |record| {
        Value::Bool(record.get("sale_price").is_some_and(|v| !v.is_null()))
    })?;

    let store: Arc<dyn RecordStore> = match &settings.database_url {
        Some(url) => {
            let store = PgStore::connect(url).await?.with_models(resolved.models());
            store.ping().await?;
            Arc::new(store)
        }
        None => {
            tracing::warn!("DATABASE_URL not set, records are kept in memory");
            Arc::new(MemoryStore::new())
        }
    };

    let mut site = Site::new(&settings.site_name).with_mount_path(&settings.mount_path);
    if let Some(base) = &settings.base_url {
        site = site.with_base_url(base);
    }
    for descriptor in resolved.into_descriptors()? {
        site.register(descriptor);
    }
    let state = AppState {
        registry: Arc::new(site.freeze()?),
        store,
    };

    // No authentication in the demo: every request acts as a superuser.
    let app = app_router(state, settings.max_body_bytes)
        .layer(axum::Extension(Requestor::superuser("demo")));

    let listener = TcpListener::bind(&settings.bind_addr).await?;
    tracing::info!("listening on {}", listener.local_addr()?);
    axum::serve(listener, app).await?;
    Ok(())
}
