//! services/api/src/bin/api.rs

use api_lib::{
    adapters::{LogNotifier, MemoryStore, PgStore, StaticIdentity},
    config::{Config, StoreBackend},
    error::ApiError,
    scheduler::spawn_due_scans,
    web::{
        clear_data_handler, create_item_handler, delete_item_handler, export_backup_handler,
        import_backup_handler, import_schedule_handler, middleware::require_auth,
        patch_item_handler, rest::ApiDoc, shared_note_handler, shared_schedule_handler,
        state::AppState, toggle_task_handler,
    },
};
use axum::{
    http::{
        header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE},
        Method,
    },
    middleware as axum_middleware,
    routing::{delete, get, patch, post},
    Router,
};
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use studydesk_core::ports::{DocumentStore, IdentityProvider, NotificationSink};
use tower_http::cors::{Any, CorsLayer};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[tokio::main]
async fn main() -> Result<(), ApiError> {
    // --- 1. Load Configuration & Set Up Logging ---
    let config = Arc::new(Config::from_env()?);
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(config.log_level.to_string()))
        .with(tracing_subscriber::fmt::layer())
        .init();
    info!("Configuration loaded. Starting server...");

    // --- 2. Initialize the Document Store ---
    let store: Arc<dyn DocumentStore> = match config.store_backend {
        StoreBackend::Postgres => {
            let database_url = config
                .database_url
                .as_ref()
                .ok_or_else(|| ApiError::Internal("DATABASE_URL is required".to_string()))?;
            info!("Connecting to database...");
            let pool = PgPoolOptions::new()
                .max_connections(5)
                .connect(database_url)
                .await?;
            let store = PgStore::new(pool);
            info!("Running database migrations...");
            store.run_migrations().await?;
            info!("Database migrations complete.");
            Arc::new(store)
        }
        StoreBackend::Memory => {
            info!("Using the volatile in-memory store.");
            Arc::new(MemoryStore::new())
        }
    };

    // --- 3. Initialize the Identity Provider ---
    let identity_map = StaticIdentity::from_file(&config.identity_tokens_path)?;
    let known_users = identity_map.user_ids();
    let identity: Arc<dyn IdentityProvider> = Arc::new(identity_map);

    // --- 4. Start the Due-Item Schedulers ---
    // One live session and scan loop per known user; the sessions are held
    // for the lifetime of the process so the scans keep running.
    let sink: Arc<dyn NotificationSink> = Arc::new(LogNotifier);
    let due_sessions = spawn_due_scans(
        store.clone(),
        known_users,
        sink,
        config.due_scan_interval,
        config.due_lookahead,
    )
    .await?;
    info!("due-item scans running for {} user(s)", due_sessions.len());

    // --- 5. Build the Shared AppState ---
    let app_state = Arc::new(AppState {
        store,
        identity,
        config: config.clone(),
    });

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::PATCH, Method::DELETE, Method::OPTIONS])
        .allow_headers([AUTHORIZATION, CONTENT_TYPE, ACCEPT]);

    // --- 6. Create the Web Router ---
    // Public routes (no auth required)
    let public_routes = Router::new()
        .route("/share/notes/{note_id}", get(shared_note_handler))
        .route("/share/schedules/{user_id}", get(shared_schedule_handler));

    // Protected routes (auth required)
    let protected_routes = Router::new()
        .route("/items", post(create_item_handler))
        .route(
            "/items/{kind}/{id}",
            patch(patch_item_handler).delete(delete_item_handler),
        )
        .route("/tasks/{id}/toggle", post(toggle_task_handler))
        .route("/backup", get(export_backup_handler).post(import_backup_handler))
        .route("/data", delete(clear_data_handler))
        .route("/schedule/import", post(import_schedule_handler))
        .layer(axum_middleware::from_fn_with_state(
            app_state.clone(),
            require_auth,
        ));

    // Combine API routes
    let api_router = Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .layer(cors)
        .with_state(app_state);

    // Merge the API router with the Swagger UI router for a complete application.
    let app = Router::new()
        .merge(api_router)
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()));

    // --- 7. Start the Server ---
    info!("Starting server on {}", config.bind_address);
    info!(
        "Swagger UI available at http://{}/swagger-ui",
        config.bind_address
    );
    let listener = tokio::net::TcpListener::bind(&config.bind_address).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
