use axum::{routing::get, Router};
use serde_json::{json, Value};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use catalyst_api::{cache, config, database, handlers, queue};

#[tokio::main]
async fn main() {
    // Load .env if present so cargo run picks up DATABASE_URL, REDIS_URL, etc.
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt::init();

    let config = config::config();
    tracing::info!("Starting Catalyst API in {:?} mode", config.environment);

    let redis_url =
        std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string());

    if let Err(e) = database::init_pool().await {
        panic!("database init failed: {}", e);
    }
    if let Err(e) = cache::init_store(&redis_url).await {
        panic!("cache init failed: {}", e);
    }
    if let Err(e) = queue::init_queue(&redis_url).await {
        panic!("queue init failed: {}", e);
    }

    let app = app();

    // Allow tests or deployments to override port via env
    let port = std::env::var("CATALYST_API_PORT")
        .ok()
        .or_else(|| std::env::var("PORT").ok())
        .and_then(|s| s.parse::<u16>().ok())
        .unwrap_or(3000);

    let bind_addr = format!("0.0.0.0:{}", port);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .unwrap_or_else(|e| panic!("failed to bind {}: {}", bind_addr, e));

    tracing::info!("Catalyst API listening on http://{}", bind_addr);

    axum::serve(listener, app).await.expect("server");
}

fn app() -> Router {
    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .merge(handlers::auth::routes())
        .merge(handlers::organizations::routes())
        .merge(handlers::workspaces::routes())
        .merge(handlers::barriers::routes())
        .merge(handlers::behaviours::routes())
        .merge(handlers::outcomes::routes())
        .merge(handlers::solutions::routes())
        .merge(handlers::knowledge::routes())
        .merge(handlers::collaterals::routes())
        .merge(handlers::proposals::routes())
        .merge(handlers::prevalence::routes())
        .merge(handlers::reference::routes())
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

async fn root() -> axum::response::Json<Value> {
    let version = env!("CARGO_PKG_VERSION");

    axum::response::Json(json!({
        "message": "Catalyst API",
        "data": {
            "name": "Catalyst API",
            "version": version,
            "endpoints": {
                "auth": "/auth/* (signup, login, password reset)",
                "organizations": "/organizations (protected)",
                "workspaces": "/workspaces (protected)",
                "content": "/barriers, /behaviours, /outcomes, /solutions, /knowledge, /collaterals, /proposals, /prevalence (protected)",
            }
        }
    }))
}

async fn health() -> impl axum::response::IntoResponse {
    let now = chrono::Utc::now();

    match database::pool::health_check().await {
        Ok(_) => (
            axum::http::StatusCode::OK,
            axum::response::Json(json!({
                "message": "ok",
                "data": {
                    "status": "ok",
                    "timestamp": now,
                    "database": "ok"
                }
            })),
        ),
        Err(e) => (
            axum::http::StatusCode::SERVICE_UNAVAILABLE,
            axum::response::Json(json!({
                "message": "database unavailable",
                "data": {
                    "status": "degraded",
                    "timestamp": now,
                    "database_error": e.to_string()
                }
            })),
        ),
    }
}
