//! services/api/src/bin/api.rs

use api_lib::{
    adapters::{PgNotifier, PgStore},
    config::Config,
    error::ApiError,
    web::{
        availability::{
            add_rule_handler, block_date_handler, remove_rule_handler, set_policy_handler,
            unblock_date_handler,
        },
        rest::{
            cancel_booking_handler, complete_booking_handler, create_booking_handler,
            list_slots_handler, submit_review_handler, ApiDoc,
        },
        state::AppState,
        verification::{decide_verification_handler, submit_verification_handler},
        wallet::{add_funds_handler, get_wallet_handler},
        reconcile_identity,
    },
};
use axum::{
    http::{
        header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE},
        HeaderValue, Method,
    },
    middleware as axum_middleware,
    routing::{delete, get, post, put},
    Router,
};
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
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

    // --- 2. Connect to Database & Run Migrations ---
    info!("Connecting to database...");
    let db_pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&config.database_url)
        .await?;
    let store = Arc::new(PgStore::new(db_pool.clone()));
    info!("Running database migrations...");
    store.run_migrations().await?;
    info!("Database migrations complete.");

    // --- 3. Build the Shared AppState ---
    let notifier = Arc::new(PgNotifier::new(db_pool));
    let app_state = Arc::new(AppState::new(config.clone(), store, notifier));

    let cors = CorsLayer::new()
        .allow_origin(
            config
                .cors_allowed_origin
                .parse::<HeaderValue>()
                .map_err(|e| ApiError::Internal(format!("Invalid CORS origin: {e}")))?,
        )
        .allow_credentials(true)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE, Method::OPTIONS])
        .allow_headers([AUTHORIZATION, CONTENT_TYPE, ACCEPT]);

    // --- 4. Create the Web Router ---
    // Every route sits behind identity reconciliation; the external
    // identity provider has already authenticated the caller.
    let api_router = Router::new()
        .route("/providers/{provider_id}/slots", get(list_slots_handler))
        .route("/bookings", post(create_booking_handler))
        .route("/bookings/{booking_id}/cancel", post(cancel_booking_handler))
        .route(
            "/bookings/{booking_id}/complete",
            post(complete_booking_handler),
        )
        .route("/reviews", post(submit_review_handler))
        .route("/availability/rules", post(add_rule_handler))
        .route("/availability/rules/{rule_id}", delete(remove_rule_handler))
        .route("/availability/blocked-dates", post(block_date_handler))
        .route(
            "/availability/blocked-dates/{date}",
            delete(unblock_date_handler),
        )
        .route("/availability/policy", put(set_policy_handler))
        .route("/wallet", get(get_wallet_handler))
        .route("/wallet/funds", post(add_funds_handler))
        .route("/verifications", post(submit_verification_handler))
        .route(
            "/verifications/{request_id}/decision",
            post(decide_verification_handler),
        )
        .layer(axum_middleware::from_fn_with_state(
            app_state.clone(),
            reconcile_identity,
        ))
        .layer(cors)
        .with_state(app_state);

    // Merge the API router with the Swagger UI router for a complete application.
    let app = Router::new()
        .merge(api_router)
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()));

    // --- 5. Start the Server ---
    info!("Starting server on {}", config.bind_address);
    info!(
        "Swagger UI available at http://{}/swagger-ui",
        config.bind_address
    );
    let listener = tokio::net::TcpListener::bind(&config.bind_address).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
