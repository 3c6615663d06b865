// GDD Tracker API v0.1
use axum::{
    routing::{get, post, put},
    Router,
};
use sqlx::postgres::PgPoolOptions;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::RwLock;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

mod config;
mod db;
mod errors;
mod helpers;
mod routes;
mod services;

use config::AppConfig;
use db::store::{PgTimeSeriesStore, TimeSeriesStore};
use routes::AppState;
use services::met::MetClient;
use services::poller::{PollerContext, PollerState, SharedPollerState};
use services::GddEngine;

/// Maximum number of connections in the database pool.
const DB_POOL_MAX_CONNECTIONS: u32 = 10;
/// Minimum number of connections kept alive in the database pool.
const DB_POOL_MIN_CONNECTIONS: u32 = 2;

/// OpenAPI document for the GDD Tracker API.
#[derive(OpenApi)]
#[openapi(
    info(
        title = "GDD Tracker API",
        version = "0.1.0",
        description = "Growing-degree-day tracking for grassland farms and fields. \
            Ingests sensor temperature readings, fetches MET Norway forecasts for \
            each sensor, accumulates daily degree days since the sensor's reset date \
            and projects the date the field reaches its optimal GDD for cutting.",
        license(name = "MIT"),
    ),
    tags(
        (name = "Health", description = "Service health check"),
        (name = "Farms", description = "Farms and the farm dashboard"),
        (name = "Fields", description = "Fields, sensor registration and dashboards"),
        (name = "Sensors", description = "Degree-day totals, series and cutting dates"),
        (name = "Readings", description = "Sensor reading ingestion"),
        (name = "Poller", description = "Background forecast poller status"),
    ),
    paths(
        routes::health::health_check,
        routes::farms::list_farms,
        routes::farms::create_farm,
        routes::farms::get_farm_dashboard,
        routes::fields::list_fields,
        routes::fields::create_field,
        routes::fields::create_sensor,
        routes::fields::get_field_dashboard,
        routes::sensors::get_gdd_total,
        routes::sensors::get_gdd_series,
        routes::sensors::get_cutting_date,
        routes::sensors::reset_sensor,
        routes::readings::ingest_readings,
        routes::poller::get_poller_status,
    ),
    components(
        schemas(
            routes::health::HealthResponse,
            routes::farms::FarmResponse,
            routes::farms::CreateFarmRequest,
            services::dashboard::FarmDashboard,
            services::dashboard::FarmFieldSummary,
            routes::fields::FieldResponse,
            routes::fields::CreateFieldRequest,
            routes::fields::CreateSensorRequest,
            routes::fields::SensorResponse,
            services::dashboard::FieldDashboard,
            services::dashboard::FieldSensor,
            services::dashboard::GraphPoint,
            routes::sensors::GddTotalResponse,
            routes::sensors::GddSeriesResponse,
            services::accumulation::CumulativePoint,
            routes::sensors::CuttingDateResponse,
            routes::sensors::ResetRequest,
            routes::sensors::ResetResponse,
            routes::readings::IngestResponse,
            services::ingest::RejectedLine,
            services::poller::PollerState,
            services::poller::SensorPollStatus,
            errors::ErrorResponse,
        )
    )
)]
struct ApiDoc;

#[tokio::main]
async fn main() {
    let config = AppConfig::from_env();

    // Initialize tracing
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "gdd_tracker_api=debug,tower_http=debug".into());
    let registry = tracing_subscriber::registry().with(filter);
    if config.log_json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }

    // Set up database connection pool
    let pool = PgPoolOptions::new()
        .max_connections(DB_POOL_MAX_CONNECTIONS)
        .min_connections(DB_POOL_MIN_CONNECTIONS)
        .connect(&config.database_url)
        .await
        .expect("Failed to connect to database");

    // Run migrations
    sqlx::migrate!()
        .run(&pool)
        .await
        .expect("Failed to run database migrations");

    tracing::info!("Database migrations completed");

    // Degree-day engine over the Postgres time-series store
    let store: Arc<dyn TimeSeriesStore> = Arc::new(PgTimeSeriesStore::new(pool.clone()));
    let engine = GddEngine::new(
        store,
        config.gdd_base_temperature_c,
        config.forecast_horizon_days,
    );
    tracing::info!(
        "GDD engine ready (base temperature {}°C, horizon {} days)",
        config.gdd_base_temperature_c,
        config.forecast_horizon_days
    );

    let met_client = MetClient::new(&config.met_api_url, &config.met_user_agent)
        .expect("Failed to create api.met.no client");

    let app_state = AppState {
        pool: pool.clone(),
        engine: engine.clone(),
    };

    // Create shared poller state and spawn background poller
    let poller_state: SharedPollerState = Arc::new(RwLock::new(PollerState::new()));
    tokio::spawn(services::poller::run_poller(PollerContext {
        pool: pool.clone(),
        met_client,
        engine,
        state: poller_state.clone(),
        interval_secs: config.forecast_interval_secs,
        concurrency: config.poller_concurrency,
    }));

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([
            axum::http::Method::GET,
            axum::http::Method::POST,
            axum::http::Method::PUT,
        ])
        .allow_headers(Any);

    // Build router
    let farm_routes = Router::new()
        .route(
            "/api/v1/farms",
            get(routes::farms::list_farms).post(routes::farms::create_farm),
        )
        .route(
            "/api/v1/farms/dashboard",
            get(routes::farms::get_farm_dashboard),
        )
        .with_state(app_state.clone());

    let field_routes = Router::new()
        .route(
            "/api/v1/fields",
            get(routes::fields::list_fields).post(routes::fields::create_field),
        )
        .route(
            "/api/v1/fields/:field_id/sensors",
            post(routes::fields::create_sensor),
        )
        .route(
            "/api/v1/fields/:field_id/dashboard",
            get(routes::fields::get_field_dashboard),
        )
        .with_state(app_state.clone());

    // One parameter name per segment: `:sensor` is a serial, except for reset (UUID)
    let sensor_routes = Router::new()
        .route(
            "/api/v1/sensors/:sensor/gdd",
            get(routes::sensors::get_gdd_total),
        )
        .route(
            "/api/v1/sensors/:sensor/gdd/series",
            get(routes::sensors::get_gdd_series),
        )
        .route(
            "/api/v1/sensors/:sensor/cutting-date",
            get(routes::sensors::get_cutting_date),
        )
        .route(
            "/api/v1/sensors/:sensor/reset",
            put(routes::sensors::reset_sensor),
        )
        .with_state(app_state.clone());

    let reading_routes = Router::new()
        .route(
            "/api/v1/readings",
            post(routes::readings::ingest_readings),
        )
        .with_state(app_state);

    // Health check uses PgPool to verify DB connectivity
    let health_routes = Router::new()
        .route("/api/v1/health", get(routes::health::health_check))
        .with_state(pool);

    // Poller status uses SharedPollerState
    let poller_routes = Router::new()
        .route(
            "/api/v1/poller/status",
            get(routes::poller::get_poller_status),
        )
        .with_state(poller_state);

    let app = Router::new()
        .merge(health_routes)
        .merge(farm_routes)
        .merge(field_routes)
        .merge(sensor_routes)
        .merge(reading_routes)
        .merge(poller_routes)
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .layer(TraceLayer::new_for_http())
        .layer(cors);

    // Start server
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!("API server listening on {}", addr);
    tracing::info!(
        "Swagger UI available at http://localhost:{}/swagger-ui/",
        config.port
    );

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind TCP listener");
    axum::serve(listener, app)
        .await
        .expect("Server terminated unexpectedly");
}
