use axum::{Router, routing::get};
use guard_service::{
    api::{
        self,
        handler::{assignment, attribution, availability, parameters, replacement},
        state::GuardAppState,
    },
    domain::{
        assignment::AssignmentRepository,
        availability::AvailabilityRepository,
        config::ServiceConfig,
        escalation::EscalationEngine,
        notification::NotificationDispatcher,
        parameters::ParametersRepository,
        replacement::ReplacementRepository,
        roster::RosterClient,
        service::GuardService,
    },
    infrastructure::{
        cache::{client::RedisCache, roster::CachedRosterClient},
        circuit_breaker::{CircuitBreakerDispatcher, CircuitBreakerRosterClient},
        escalation_worker::spawn_escalation_worker,
        health_check::{HealthCheckConfig, spawn_health_check},
        memory::InMemoryStore,
        notification::{HttpNotificationDispatcher, LogNotificationDispatcher},
        postgres::{
            PgAssignmentRepository, PgAvailabilityRepository, PgParametersRepository,
            PgReplacementRepository,
        },
        roster_client::HttpRosterClient,
    },
};
use sqlx::postgres::PgPoolOptions;
use std::{env, net::SocketAddr, sync::Arc};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_governor::{
    GovernorLayer, governor::GovernorConfigBuilder, key_extractor::SmartIpKeyExtractor,
};
use tower_http::trace::{DefaultOnRequest, DefaultOnResponse, TraceLayer};
use tracing::Level;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[derive(OpenApi)]
#[openapi(
    paths(
        attribution::run_attribution,
        assignment::list,
        assignment::create,
        assignment::cancel,
        availability::declare,
        availability::generate,
        availability::reset,
        replacement::flag_gap,
        replacement::list,
        replacement::get,
        replacement::accept,
        replacement::decline,
        replacement::expire,
        replacement::cancel,
        parameters::get,
        parameters::put,
    ),
    tags(
        (name = "Attribution", description = "Weekly automatic guard attribution"),
        (name = "Assignments", description = "Guard bookings"),
        (name = "Availability", description = "Member availability declarations"),
        (name = "Replacements", description = "Replacement escalation"),
        (name = "Parameters", description = "Tenant attribution settings"),
    )
)]
struct ApiDoc;

struct Repositories {
    availability: Arc<dyn AvailabilityRepository>,
    assignment: Arc<dyn AssignmentRepository>,
    replacement: Arc<dyn ReplacementRepository>,
    parameters: Arc<dyn ParametersRepository>,
}

async fn build_repositories() -> Repositories {
    let backend = env::var("STORAGE_BACKEND").unwrap_or_else(|_| "postgres".to_string());

    if backend == "memory" {
        tracing::warn!("Using in-memory storage, nothing survives a restart");
        let store = Arc::new(InMemoryStore::new());
        return Repositories {
            availability: store.clone(),
            assignment: store.clone(),
            replacement: store.clone(),
            parameters: store,
        };
    }

    let database_url = env::var("DATABASE_URL").expect("DATABASE_URL must be set");
    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&database_url)
        .await
        .expect("Failed to establish connection into Postgres");

    sqlx::migrate!()
        .run(&pool)
        .await
        .expect("Failed to run database migrations");

    Repositories {
        availability: Arc::new(PgAvailabilityRepository::new(pool.clone())),
        assignment: Arc::new(PgAssignmentRepository::new(pool.clone())),
        replacement: Arc::new(PgReplacementRepository::new(pool.clone())),
        parameters: Arc::new(PgParametersRepository::new(pool)),
    }
}

#[tokio::main]
async fn main() {
    let _guard = shared::telemetry::init_telemetry("guard-service");

    let port = env::var("SERVER_PORT").unwrap_or_else(|_| "8082".to_string());
    let roster_service_url =
        env::var("ROSTER_SERVICE_URL").unwrap_or_else(|_| "http://localhost:8080".to_string());
    let config_path = env::var("GUARD_CONFIG_PATH").unwrap_or_else(|_| "guard.toml".to_string());
    let config = ServiceConfig::load(&config_path).expect("Failed to load guard service config");

    let repos = build_repositories().await;

    let (breaker_client, breaker) = CircuitBreakerRosterClient::new(
        Arc::new(HttpRosterClient::new(roster_service_url.clone())),
        config.roster_circuit_breaker.clone(),
    );
    let breaker_client: Arc<dyn RosterClient> = Arc::new(breaker_client);
    let roster: Arc<dyn RosterClient> = match env::var("REDIS_URL") {
        Ok(redis_url) => {
            let cache = RedisCache::new(&redis_url, "guard-service")
                .await
                .expect("Failed to connect to Redis");
            Arc::new(CachedRosterClient::new(
                breaker_client,
                cache,
                config.cache.clone(),
            ))
        }
        Err(_) => breaker_client,
    };

    let notifier: Arc<dyn NotificationDispatcher> = match env::var("NOTIFICATION_SERVICE_URL") {
        Ok(url) => Arc::new(CircuitBreakerDispatcher::new(
            Arc::new(HttpNotificationDispatcher::new(url)),
            config.notification_circuit_breaker.clone(),
        )),
        Err(_) => {
            tracing::warn!("NOTIFICATION_SERVICE_URL not set, offers are only logged");
            Arc::new(LogNotificationDispatcher)
        }
    };

    let escalation = EscalationEngine::new(
        roster.clone(),
        repos.availability.clone(),
        repos.assignment.clone(),
        repos.replacement,
        repos.parameters.clone(),
        notifier,
        &config,
    );
    let guard_service = Arc::new(GuardService::new(
        roster,
        repos.availability,
        repos.assignment,
        repos.parameters,
        escalation.clone(),
        &config,
    ));

    let cancel_token = CancellationToken::new();
    let task_tracker = escalation.task_tracker().clone();
    spawn_escalation_worker(
        escalation.clone(),
        config.escalation.tick(),
        &task_tracker,
        cancel_token.clone(),
    );
    spawn_health_check(
        HealthCheckConfig::from_settings(&config.health_check, &roster_service_url),
        breaker,
        escalation,
        &task_tracker,
        cancel_token.clone(),
    );

    let state = Arc::new(GuardAppState::new(guard_service));

    let governor_conf = GovernorConfigBuilder::default()
        .per_second(2)
        .burst_size(10)
        .key_extractor(SmartIpKeyExtractor)
        .use_headers()
        .finish()
        .expect("Failed to build governor config");

    let app = Router::new()
        .route(
            "/headpat",
            get(|| async {
                axum::Json(shared::responses::HeadpatResponse {
                    message: "nyaa~! all systems operational, senpai! (=^-w-^=)",
                })
            }),
        )
        .merge(api::routes(state))
        // Swagger UI
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        // Rate limiting (per-IP, 2 req/s with burst of 10)
        .layer(GovernorLayer::new(governor_conf))
        // tracing log (turn request into info level)
        .layer(
            TraceLayer::new_for_http()
                .on_request(DefaultOnRequest::new().level(Level::INFO))
                .on_response(
                    DefaultOnResponse::new()
                        .level(Level::INFO)
                        .latency_unit(tower_http::LatencyUnit::Millis),
                ),
        );

    tracing::info!("guard-service listening on 0.0.0.0:{port}");

    let listener = TcpListener::bind(format!("0.0.0.0:{port}"))
        .await
        .expect("Failed to bind");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shared::shutdown::shutdown_signal())
    .await
    .expect("Oppsie! Server crashed!");

    // Server stopped accepting new requests; stop the timers and wait for in-flight escalations
    cancel_token.cancel();
    task_tracker.close();
    tracing::info!("Waiting for background tasks to finish...");
    if tokio::time::timeout(
        shared::shutdown::DEFAULT_SHUTDOWN_TIMEOUT,
        task_tracker.wait(),
    )
    .await
    .is_err()
    {
        tracing::warn!("Shutdown timeout reached, some background tasks may not have finished");
    }
    tracing::info!("guard-service shut down");
}
