//! HTTP handlers for the Ferry server.
//!
//! A thin API over the router: subscription CRUD, event ingestion and a
//! health check, plus the periodic heartbeat sweep and cache eviction.

use crate::config::Config;
use crate::metrics;
use anyhow::{Context, Result};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, TimeDelta, Utc};
use ferry_core::{
    InMemoryLiveRoutes, InMemoryStore, LocalTimestampMap, NoTopology, RouteError,
    Router as EventRouter, StaticTopology, Subscription, SubscriptionError, SubscriptionManager,
    TopologyResolver,
};
use ferry_delivery::{DeliveryPipeline, HeartbeatScheduler, HttpTransport, Transport};
use ferry_model::{Event, SituationUpdate, VehicleJourneyUpdate};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

/// Shared server state.
pub struct AppState {
    /// Subscription lifecycle.
    pub manager: SubscriptionManager,
    /// The event router.
    pub router: EventRouter,
    /// Live routes refreshed from incoming vehicle journeys.
    pub live_routes: Arc<InMemoryLiveRoutes>,
    /// Push delivery.
    pub pipeline: DeliveryPipeline,
    /// Heartbeat and termination sweep.
    pub scheduler: HeartbeatScheduler,
}

impl AppState {
    /// Create new app state pushing through the given transport.
    ///
    /// # Errors
    ///
    /// Returns an error if the configured topology file cannot be loaded.
    pub fn new(config: &Config, transport: Arc<dyn Transport>) -> Result<Self> {
        let store = Arc::new(InMemoryStore::new());
        let live_routes = Arc::new(InMemoryLiveRoutes::new());
        let topology = load_topology(config)?;

        let router = EventRouter::with_config(
            store.clone(),
            topology,
            live_routes.clone(),
            Arc::new(LocalTimestampMap::new()),
            config.router_config(),
        );
        let pipeline = DeliveryPipeline::new(
            SubscriptionManager::new(store, Arc::new(LocalTimestampMap::new())),
            transport,
            &config.delivery_config(),
        );
        let scheduler = HeartbeatScheduler::new(pipeline.clone(), &config.scheduler_config());

        Ok(Self {
            manager: pipeline.manager().clone(),
            router,
            live_routes,
            pipeline,
            scheduler,
        })
    }
}

fn load_topology(config: &Config) -> Result<Arc<dyn TopologyResolver>> {
    let Some(path) = &config.topology.file else {
        return Ok(Arc::new(NoTopology));
    };
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read topology file: {}", path.display()))?;
    let topology = StaticTopology::from_json(&contents)
        .with_context(|| format!("Failed to parse topology file: {}", path.display()))?;
    info!(stations = topology.station_count(), "Loaded topology");
    Ok(Arc::new(topology))
}

/// Run the HTTP server.
///
/// # Errors
///
/// Returns an error if the server fails to start.
pub async fn run_server(config: Config) -> Result<()> {
    let transport = HttpTransport::with_timeout(config.delivery_config().request_timeout)?;
    let state = Arc::new(AppState::new(&config, Arc::new(transport))?);

    // Start metrics server if enabled
    if config.metrics.enabled {
        if let Err(e) = metrics::start_metrics_server(config.metrics.port) {
            error!("Failed to start metrics server: {}", e);
        }
    }

    spawn_maintenance(&state, config.evict_interval(), config.live_route_ttl());

    let addr = config.bind_addr()?;
    let listener = TcpListener::bind(addr).await?;
    info!("Ferry server listening on {}", addr);

    axum::serve(listener, app(Arc::clone(&state)))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!(in_flight = state.pipeline.pool().in_flight(), "Draining pushes");
    state.pipeline.drained().await;
    Ok(())
}

/// Build the API router.
pub fn app(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/subscriptions", get(list_subscriptions).post(save_subscription))
        .route("/subscriptions/enveloped", post(subscribe_enveloped))
        .route(
            "/subscriptions/:id",
            get(get_subscription).delete(delete_subscription),
        )
        .route("/events/situations", post(post_situation))
        .route("/events/journeys", post(post_journey))
        .route("/admin/reload", post(reload_subscriptions))
        .with_state(state)
}

/// Spawn the heartbeat sweep and the dedup and live route eviction tickers.
fn spawn_maintenance(state: &Arc<AppState>, evict_interval: Duration, live_route_ttl: Duration) {
    let live_route_ttl = TimeDelta::from_std(live_route_ttl).unwrap_or(TimeDelta::MAX);

    let sweep = Arc::clone(state);
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(sweep.scheduler.sweep_interval().max(MIN_TICK));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            let report = sweep.scheduler.run(Utc::now());
            if report.terminated > 0 || report.heartbeats > 0 {
                debug!(
                    terminated = report.terminated,
                    heartbeats = report.heartbeats,
                    "Heartbeat sweep"
                );
            }
        }
    });

    let evict = Arc::clone(state);
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(evict_interval.max(MIN_TICK));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            let now = Utc::now();
            let removed = evict.router.dedup().evict_expired(now);
            if removed > 0 {
                debug!(removed, "Evicted dedup entries");
            }
            if let Some(cutoff) = now.checked_sub_signed(live_route_ttl) {
                let removed = evict.live_routes.evict_older_than(cutoff);
                if removed > 0 {
                    debug!(removed, "Evicted live routes");
                }
            }
        }
    });
}

const MIN_TICK: Duration = Duration::from_millis(100);

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}

/// API errors.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Subscription(#[from] SubscriptionError),

    #[error(transparent)]
    Route(#[from] RouteError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::Subscription(SubscriptionError::NotFound(_)) => StatusCode::NOT_FOUND,
            ApiError::Subscription(SubscriptionError::Store(_)) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Subscription(_) | ApiError::Route(_) => StatusCode::BAD_REQUEST,
        };
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

/// Health check handler.
async fn health_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "node": state.pipeline.node(),
        "subscriptions": state.manager.store().len(),
        "pushesInFlight": state.pipeline.pool().in_flight(),
    }))
}

async fn list_subscriptions(State(state): State<Arc<AppState>>) -> Json<Vec<Subscription>> {
    Json(state.manager.list())
}

async fn save_subscription(
    State(state): State<Arc<AppState>>,
    Json(subscription): Json<Subscription>,
) -> Result<Json<Subscription>, ApiError> {
    Ok(Json(state.manager.add_or_update(subscription)?))
}

async fn subscribe_enveloped(
    State(state): State<Arc<AppState>>,
    Json(subscription): Json<Subscription>,
) -> Result<Json<Subscription>, ApiError> {
    Ok(Json(state.manager.subscribe_enveloped(subscription)?))
}

async fn reload_subscriptions(State(state): State<Arc<AppState>>) -> StatusCode {
    state.manager.reload();
    StatusCode::NO_CONTENT
}

async fn get_subscription(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Subscription>, ApiError> {
    state
        .manager
        .get(&id)
        .map(Json)
        .ok_or_else(|| SubscriptionError::NotFound(id).into())
}

async fn delete_subscription(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    match state.manager.remove(&id)? {
        Some(_) => Ok(StatusCode::NO_CONTENT),
        None => Err(SubscriptionError::NotFound(id).into()),
    }
}

async fn post_situation(
    State(state): State<Arc<AppState>>,
    Json(situation): Json<SituationUpdate>,
) -> Result<impl IntoResponse, ApiError> {
    route_event(&state, situation.into(), Utc::now())
}

async fn post_journey(
    State(state): State<Arc<AppState>>,
    Json(journey): Json<VehicleJourneyUpdate>,
) -> Result<impl IntoResponse, ApiError> {
    // Match against the route known before this update
    let now = Utc::now();
    let response = route_event(&state, journey.clone().into(), now)?;
    state.live_routes.update(&journey, now);
    Ok(response)
}

fn route_event(
    state: &AppState,
    event: Event,
    now: DateTime<Utc>,
) -> Result<(StatusCode, Json<serde_json::Value>), ApiError> {
    let kind = event.kind().to_string();
    metrics::record_event(&kind);

    let outgoing = state.router.route(&event, now).map_err(|e| {
        metrics::record_rejected(&kind);
        warn!(kind = %kind, error = %e, "Rejected event");
        e
    })?;
    let queued = state.pipeline.notify_all(outgoing);

    Ok((StatusCode::ACCEPTED, Json(json!({ "queued": queued }))))
}
