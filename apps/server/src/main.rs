mod config;
mod db;
mod error;
mod handlers;
mod models;
mod rate_limit;
mod scheduling;
mod store;

use axum::{
    middleware::from_fn_with_state,
    routing::{get, post, put},
    Router,
};
use sqlx::sqlite::SqlitePoolOptions;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use config::Config;
use db::SqliteStore;
use rate_limit::{rate_limit, RateLimiter, Tier};
use scheduling::{AvailabilityPolicy, ScheduleService};
use store::{Clock, SystemClock};

/// Shared application state accessible from all handlers.
pub struct AppState {
    pub store: SqliteStore,
    pub schedule: ScheduleService,
    /// Salon-local wall clock.
    pub clock: Arc<dyn Clock>,
    pub policy: AvailabilityPolicy,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(store: SqliteStore, clock: Arc<dyn Clock>, policy: AvailabilityPolicy) -> Self {
        Self {
            schedule: ScheduleService::new(Arc::new(store.clone())),
            store,
            clock,
            policy,
            started_at: Instant::now(),
        }
    }
}

/// Rate limit cleanup interval (seconds).
const RATE_LIMIT_CLEANUP_SECS: u64 = 300;

/// All API routes, grouped by rate limit tier.
pub fn router(state: Arc<AppState>, limiter: RateLimiter) -> Router {
    // 1. No limit: health check
    let no_limit_routes = Router::new().route("/api/health", get(handlers::health::health));

    // 2. Public: schedule, catalogue, customer booking list
    let public_routes = Router::new()
        .route("/api/services", get(handlers::client::list_services))
        .route("/api/schedule/day", get(handlers::client::schedule_day))
        .route("/api/schedule/range", get(handlers::client::schedule_range))
        .route(
            "/api/available-times",
            get(handlers::client::available_times),
        )
        .route("/api/slots/validate", post(handlers::client::validate_slot))
        .route("/api/bookings", get(handlers::client::my_bookings))
        .route(
            "/api/bookings/{id}/cancel",
            post(handlers::client::cancel_booking),
        )
        .layer(from_fn_with_state(
            (limiter.clone(), Tier::Public),
            rate_limit,
        ));

    // 3. Booking creation: strictest limit
    let booking_routes = Router::new()
        .route("/api/bookings", post(handlers::client::create_booking))
        .layer(from_fn_with_state(
            (limiter.clone(), Tier::Booking),
            rate_limit,
        ));

    // 4. Admin
    let admin_routes = Router::new()
        .route(
            "/api/admin/weekly-schedule",
            get(handlers::admin::get_weekly_schedule).put(handlers::admin::put_weekly_schedule),
        )
        .route("/api/admin/overrides", get(handlers::admin::list_overrides))
        .route(
            "/api/admin/overrides/{date}",
            put(handlers::admin::put_override).delete(handlers::admin::delete_override),
        )
        .route(
            "/api/admin/services",
            get(handlers::admin::list_all_services).post(handlers::admin::create_service),
        )
        .route(
            "/api/admin/services/{id}",
            put(handlers::admin::update_service),
        )
        .route("/api/admin/bookings", get(handlers::admin::list_bookings))
        .route(
            "/api/admin/bookings/{id}/status",
            post(handlers::admin::update_booking_status),
        )
        .layer(from_fn_with_state(
            (limiter.clone(), Tier::Admin),
            rate_limit,
        ));

    Router::new()
        .merge(no_limit_routes)
        .merge(public_routes)
        .merge(booking_routes)
        .merge(admin_routes)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn cors_layer(origin: Option<&str>) -> anyhow::Result<CorsLayer> {
    let cors = match origin {
        Some(origin) => CorsLayer::new()
            .allow_origin(AllowOrigin::exact(origin.parse()?))
            .allow_methods(Any)
            .allow_headers(Any),
        None => CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any),
    };
    Ok(cors)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env().add_directive("info".parse()?))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()?;
    tracing::info!(
        policy = %config.booking_check_policy,
        utc_offset = %config.utc_offset,
        "configuration loaded"
    );

    // ── Database ──
    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect(&config.database_url)
        .await?;

    db::run_migrations(&pool).await?;

    let state = Arc::new(AppState::new(
        SqliteStore::new(pool),
        Arc::new(SystemClock::new(config.utc_offset)),
        config.booking_check_policy,
    ));

    // ── Rate limiter + background cleanup ──
    let rate_limiter = RateLimiter::with_default_tiers();
    let cleanup_limiter = rate_limiter.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(RATE_LIMIT_CLEANUP_SECS));
        loop {
            interval.tick().await;
            cleanup_limiter.cleanup();
        }
    });

    let app = router(state, rate_limiter).layer(cors_layer(config.cors_origin.as_deref())?);

    let addr = format!("{}:{}", config.host, config.port);
    tracing::info!("Salon booking server starting on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}
