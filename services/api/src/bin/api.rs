//! services/api/src/bin/api.rs

use api_lib::{
    adapters::{
        summary::SummaryCache, CachedSummarizer, CloudflareImageStrategy, DbAdapter,
        EpubBookSource, LocalFileStore, OpenAiSummaryAdapter, PlaceholderImageStrategy,
    },
    config::Config,
    error::ApiError,
    web::{
        annotations, auth, images, novels, require_admin, require_auth, rest::ApiDoc, sharing,
        state::AppState, users,
    },
};
use async_openai::{config::OpenAIConfig, Client};
use axum::http::{
    header::{ACCEPT, CONTENT_TYPE},
    HeaderValue, Method,
};
use axum::{
    extract::DefaultBodyLimit,
    middleware as axum_middleware,
    routing::{delete, get, patch, post},
    Router,
};
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;
use visnovel_core::ports::{ImageStrategy, SummaryService};
use visnovel_core::{BoundedCache, ImageChain, Paginator};

#[tokio::main]
async fn main() -> Result<(), ApiError> {
    // --- 1. Load Configuration & Set Up Logging ---
    let config = Arc::new(Config::from_env()?);
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(config.log_level.to_string()))
        .with(tracing_subscriber::fmt::layer())
        .init();
    info!("Configuration loaded. Starting server...");

    // --- 2. Connect to Database & Run Migrations ---
    info!("Connecting to database...");
    let db_pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&config.database_url)
        .await?;
    let db_adapter = Arc::new(DbAdapter::new(db_pool.clone()));
    info!("Running database migrations...");
    db_adapter.run_migrations().await?;
    info!("Database migrations complete.");

    tokio::fs::create_dir_all(config.novels_dir()).await?;
    tokio::fs::create_dir_all(config.images_dir()).await?;

    // --- 3. Initialize Service Adapters ---
    let store = Arc::new(LocalFileStore::new());
    let paginator = Arc::new(Paginator::new(
        store.clone(),
        Arc::new(EpubBookSource::new()),
        config.pagination,
        BoundedCache::new(config.index_cache_capacity),
        BoundedCache::new(config.index_cache_capacity),
    ));

    let summary_model: Option<Arc<dyn SummaryService>> = match &config.openai_api_key {
        Some(api_key) => {
            let client = Client::with_config(OpenAIConfig::new().with_api_key(api_key));
            let adapter = OpenAiSummaryAdapter::new(client, config.summary_model.clone());
            Some(Arc::new(adapter) as Arc<dyn SummaryService>)
        }
        None => {
            warn!("OPENAI_API_KEY is not set; image prompts will use truncated page text");
            None
        }
    };
    let summarizer = Arc::new(CachedSummarizer::new(
        summary_model,
        SummaryCache::new(config.summary_cache_capacity),
    ));

    let mut strategies: Vec<Arc<dyn ImageStrategy>> = Vec::new();
    match &config.cloudflare {
        Some(credentials) => {
            let cloudflare = CloudflareImageStrategy::new(credentials)
                .map_err(|e| ApiError::Internal(format!("Cloudflare client: {}", e)))?;
            strategies.push(Arc::new(cloudflare));
        }
        None => warn!("Cloudflare credentials are not set; only placeholder images will be generated"),
    }
    strategies.push(Arc::new(PlaceholderImageStrategy::new()));
    let image_chain = ImageChain::new(strategies);
    info!(strategies = ?image_chain.strategy_names(), "Image strategy chain ready");

    // --- 4. Build the Shared AppState ---
    let app_state = Arc::new(AppState {
        db: db_adapter,
        config: config.clone(),
        store,
        paginator,
        summarizer,
        image_chain,
    });

    let origin = config.cors_origin.parse::<HeaderValue>().map_err(|e| {
        ApiError::Internal(format!("Invalid CORS origin '{}': {}", config.cors_origin, e))
    })?;
    let cors = CorsLayer::new()
        .allow_origin(origin)
        .allow_credentials(true)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([CONTENT_TYPE, ACCEPT]);

    // --- 5. Create the Web Router ---
    // Public routes (no auth required)
    let public_routes = Router::new()
        .route("/auth/signup", post(auth::signup_handler))
        .route("/auth/login", post(auth::login_handler))
        .route("/auth/logout", post(auth::logout_handler))
        .route("/share/{share_id}", get(sharing::get_shared_handler));

    // Protected routes (auth required)
    let protected_routes = Router::new()
        .route(
            "/novels",
            post(novels::upload_novel_handler).get(novels::list_novels_handler),
        )
        .route(
            "/novels/{id}",
            get(novels::get_novel_handler).delete(novels::delete_novel_handler),
        )
        .route("/novels/{id}/page/{page}", get(novels::get_page_handler))
        .route("/novels/{id}/bookmarks", post(novels::add_bookmark_handler))
        .route(
            "/novels/{id}/bookmarks/{bookmark_id}",
            delete(novels::remove_bookmark_handler),
        )
        .route("/novels/{id}/notes", post(novels::add_note_handler))
        .route(
            "/novels/{id}/notes/{note_id}",
            patch(novels::update_note_handler).delete(novels::delete_note_handler),
        )
        .route("/novels/{id}/progress", patch(novels::update_progress_handler))
        .route(
            "/annotations/novels/{novel_id}",
            get(annotations::list_annotations_handler)
                .post(annotations::create_annotation_handler),
        )
        .route(
            "/annotations/novels/{novel_id}/pages/{page}",
            get(annotations::list_page_annotations_handler),
        )
        .route(
            "/annotations/{id}",
            patch(annotations::update_annotation_handler)
                .delete(annotations::delete_annotation_handler),
        )
        .route(
            "/images/{novel_id}/page/{page}",
            post(images::generate_image_handler).get(images::list_page_images_handler),
        )
        .route("/share/user/all", get(sharing::list_my_shares_handler))
        .route(
            "/share/novels/{novel_id}/passage",
            post(sharing::share_passage_handler),
        )
        .route(
            "/share/novels/{novel_id}/progress",
            post(sharing::share_progress_handler),
        )
        .route("/share/{share_id}", delete(sharing::delete_shared_handler))
        .route(
            "/users/profile",
            get(users::get_profile_handler).patch(users::update_profile_handler),
        )
        .route(
            "/users/stats",
            get(users::get_stats_handler).patch(users::update_stats_handler),
        )
        .route(
            "/users/preferences",
            get(users::get_preferences_handler).patch(users::update_preferences_handler),
        )
        .layer(axum_middleware::from_fn_with_state(
            app_state.clone(),
            require_auth,
        ));

    // Admin routes (auth, then the admin role)
    let admin_routes = Router::new()
        .route("/novels/admin/all", get(novels::admin_list_novels_handler))
        .route("/images/logs", get(images::list_image_logs_handler))
        .route("/users/all", get(users::list_users_handler))
        .route("/users/{user_id}", delete(users::delete_user_handler))
        .layer(axum_middleware::from_fn(require_admin))
        .layer(axum_middleware::from_fn_with_state(
            app_state.clone(),
            require_auth,
        ));

    // Combine API routes
    let api_router = Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .merge(admin_routes)
        .layer(DefaultBodyLimit::max(config.max_upload_bytes))
        .with_state(app_state);

    // Merge the API router with the uploads and the Swagger UI for a complete application.
    let app = Router::new()
        .nest("/api", api_router)
        .nest_service("/uploads", ServeDir::new(&config.upload_dir))
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .layer(cors);

    // --- 6. Start the Server ---
    info!("Starting server on {}", config.bind_address);
    info!(
        "Swagger UI available at http://{}/swagger-ui",
        config.bind_address
    );
    let listener = tokio::net::TcpListener::bind(&config.bind_address).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
