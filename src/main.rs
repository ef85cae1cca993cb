use std::sync::Arc;

use axum::http::{HeaderName, HeaderValue, Method};
use tokio::net::TcpListener;
use tower_http::cors::{AllowHeaders, AllowMethods, AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use ui_analyzer::adapters::{DatabaseAdapter, MemoryDatabaseAdapter};
use ui_analyzer::plugins::{AuthPlugin, PaymentsPlugin, SubscriptionsPlugin, UsersPlugin};
use ui_analyzer::{
    AppBuilder, AppConfig, AxumIntegration, HttpCheckoutGateway, HttpGatewayConfig, UiAnalyzer,
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = AppConfig::from_env()?;

    #[cfg(feature = "postgres")]
    if let Ok(url) = std::env::var("DATABASE_URL") {
        let database = ui_analyzer::adapters::SqlxAdapter::new(&url).await?;
        database.migrate().await?;
        tracing::info!("Using PostgreSQL storage");
        return serve(build(config, database).await?).await;
    }

    tracing::warn!("Using in-memory storage; data is lost on restart");
    serve(build(config, MemoryDatabaseAdapter::new()).await?).await
}

async fn build<DB: DatabaseAdapter>(
    config: AppConfig,
    database: DB,
) -> Result<UiAnalyzer<DB>, Box<dyn std::error::Error>> {
    let mut builder = AppBuilder::new(config);
    if let Some(gateway_config) = HttpGatewayConfig::from_env() {
        builder = builder.gateway(HttpCheckoutGateway::new(gateway_config)?);
    }

    let app = builder
        .database(database)
        .plugin(AuthPlugin::new())
        .plugin(SubscriptionsPlugin::new())
        .plugin(PaymentsPlugin::new())
        .plugin(UsersPlugin::new())
        .build()
        .await?;
    Ok(app)
}

async fn serve<DB: DatabaseAdapter>(app: UiAnalyzer<DB>) -> Result<(), Box<dyn std::error::Error>> {
    let bind_addr = std::env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:3001".to_string());
    let cors = cors_layer(&app.config().frontend_url);

    let router = Arc::new(app)
        .axum_router()
        .layer(cors)
        .layer(TraceLayer::new_for_http());

    let listener = TcpListener::bind(&bind_addr).await?;
    tracing::info!(addr = %bind_addr, "Listening");
    axum::serve(listener, router)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("Shutting down");
        })
        .await?;

    Ok(())
}

/// Origins come from `CORS_ORIGINS` (comma-separated), defaulting to the frontend URL.
fn cors_layer(frontend_url: &str) -> CorsLayer {
    let origins: Vec<HeaderValue> = std::env::var("CORS_ORIGINS")
        .unwrap_or_else(|_| frontend_url.to_string())
        .split(',')
        .filter_map(|origin| HeaderValue::from_str(origin.trim()).ok())
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods(AllowMethods::list([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ]))
        .allow_headers(AllowHeaders::list([
            HeaderName::from_static("content-type"),
            HeaderName::from_static("authorization"),
        ]))
        .allow_credentials(true)
}
