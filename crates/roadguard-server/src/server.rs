use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    Router, middleware,
    routing::{get, post},
};
use roadguard_core::FeedBroadcaster;
use roadguard_db_memory::InMemoryEventStore;
use roadguard_notifications::{
    AlertComposer, NotificationDispatcher, NotificationError, StaticContactDirectory,
};
use roadguard_storage::{DynEventStore, EventedStore};
use tokio::sync::watch;
use tower_http::{compression::CompressionLayer, cors::CorsLayer, trace::TraceLayer};

use crate::{
    config::AppConfig,
    escalation::{EscalationScheduler, IntervalTicker},
    feed, handlers,
    lifecycle::LifecycleController,
    middleware as app_middleware,
    notify::InitialNotifier,
};

/// Shared handles for request handlers.
#[derive(Clone)]
pub struct AppState {
    pub controller: Arc<LifecycleController>,
    pub broadcaster: Arc<FeedBroadcaster>,
    pub dispatcher: NotificationDispatcher,
    pub scheduler: Arc<EscalationScheduler>,
    pub config: Arc<AppConfig>,
}

impl AppState {
    /// Wire the in-memory store, feed, notification transports and
    /// scheduler from configuration.
    pub fn from_config(config: AppConfig) -> Result<Self, NotificationError> {
        let broadcaster = Arc::new(FeedBroadcaster::with_capacity(config.feed.capacity));
        let store: DynEventStore = Arc::new(EventedStore::new(
            InMemoryEventStore::new(),
            broadcaster.clone(),
        ));

        let dispatcher =
            NotificationDispatcher::from_config(&config.notifications.provider_config())?;
        let directory = StaticContactDirectory::new(config.directory.contacts());
        tracing::info!(users = directory.len(), "Contact directory loaded");

        let notifier = Arc::new(InitialNotifier::new(
            store.clone(),
            Arc::new(directory),
            dispatcher.clone(),
            AlertComposer::new(config.notifications.templates.clone()),
        ));

        Ok(Self::new(store, broadcaster, notifier, config))
    }

    /// Assemble state around an existing store and notifier.
    ///
    /// `broadcaster` must be the one the store publishes to.
    pub fn new(
        store: DynEventStore,
        broadcaster: Arc<FeedBroadcaster>,
        notifier: Arc<InitialNotifier>,
        config: AppConfig,
    ) -> Self {
        let scheduler = Arc::new(EscalationScheduler::new(
            store.clone(),
            config.escalation.deadline(),
            config.escalation.batch_limit,
        ));
        let dispatcher = notifier.dispatcher().clone();
        Self {
            controller: Arc::new(LifecycleController::new(store, notifier)),
            broadcaster,
            dispatcher,
            scheduler,
            config: Arc::new(config),
        }
    }
}

pub fn build_app(state: AppState) -> Router {
    let body_limit = state.config.server.body_limit_bytes;
    Router::new()
        // Health and info endpoints
        .route("/", get(handlers::root))
        .route("/healthz", get(handlers::healthz))
        .route("/readyz", get(handlers::readyz))
        // Reports and lifecycle
        .route("/report-accident", post(handlers::report_accident))
        .route("/events", get(handlers::list_events))
        .route("/events/{id}", get(handlers::get_event))
        .route("/events/{id}/ack", post(handlers::acknowledge_event))
        .route("/events/{id}/assign", post(handlers::assign_event))
        .route("/events/{id}/dispatch", post(handlers::dispatch_event))
        .route("/events/user/{user_id}", get(handlers::events_by_user))
        .route("/notify-contacts", post(handlers::notify_contacts))
        // Live feed
        .route("/hospital-feed", get(feed::hospital_feed))
        .with_state(state)
        // Middleware stack (order: request id -> cors -> compression -> trace -> body limit)
        .layer(middleware::from_fn(app_middleware::request_id))
        .layer(CorsLayer::permissive())
        .layer(CompressionLayer::new())
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|req: &axum::http::Request<_>| {
                    use tracing::field::Empty;
                    let req_id = req
                        .extensions()
                        .get::<axum::http::HeaderValue>()
                        .or_else(|| req.headers().get(app_middleware::REQUEST_ID_HEADER))
                        .and_then(|v| v.to_str().ok())
                        .unwrap_or("")
                        .to_string();
                    tracing::info_span!(
                        "http.request",
                        http.method = %req.method(),
                        http.target = %req.uri(),
                        http.status_code = Empty,
                        request_id = %req_id
                    )
                })
                .on_response(
                    |res: &axum::http::Response<_>,
                     latency: std::time::Duration,
                     span: &tracing::Span| {
                        span.record(
                            "http.status_code",
                            tracing::field::display(res.status().as_u16()),
                        );
                        tracing::info!(
                            http.status = %res.status().as_u16(),
                            elapsed_ms = %latency.as_millis(),
                            "request handled"
                        );
                    },
                ),
        )
        .layer(axum::extract::DefaultBodyLimit::max(body_limit))
}

pub struct RoadguardServer {
    addr: SocketAddr,
    state: AppState,
}

pub struct ServerBuilder {
    addr: SocketAddr,
    config: AppConfig,
    state: Option<AppState>,
}

impl Default for ServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ServerBuilder {
    pub fn new() -> Self {
        let cfg = AppConfig::default();
        Self {
            addr: cfg.addr(),
            config: cfg,
            state: None,
        }
    }

    pub fn with_addr(mut self, addr: SocketAddr) -> Self {
        self.addr = addr;
        self
    }

    pub fn with_config(mut self, cfg: AppConfig) -> Self {
        self.addr = cfg.addr();
        self.config = cfg;
        self
    }

    /// Use prebuilt state instead of building it from the configuration.
    pub fn with_state(mut self, state: AppState) -> Self {
        self.state = Some(state);
        self
    }

    pub fn build(self) -> Result<RoadguardServer, NotificationError> {
        let state = match self.state {
            Some(state) => state,
            None => AppState::from_config(self.config)?,
        };
        Ok(RoadguardServer {
            addr: self.addr,
            state,
        })
    }
}

impl RoadguardServer {
    pub fn state(&self) -> &AppState {
        &self.state
    }

    /// Serve until Ctrl-C, running the escalation scheduler alongside.
    pub async fn run(self) -> anyhow::Result<()> {
        let listener = tokio::net::TcpListener::bind(self.addr).await?;
        tracing::info!("listening on {}", self.addr);
        self.serve(listener, shutdown_signal()).await
    }

    /// Serve on an already bound listener until `shutdown` resolves.
    pub async fn serve<F>(self, listener: tokio::net::TcpListener, shutdown: F) -> anyhow::Result<()>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let (stop_tx, stop_rx) = watch::channel(false);
        let escalation = &self.state.config.escalation;
        let scheduler = if escalation.enabled {
            Some(
                self.state
                    .scheduler
                    .clone()
                    .spawn(IntervalTicker::new(escalation.interval()), stop_rx),
            )
        } else {
            tracing::warn!("Escalation scheduler disabled by configuration");
            None
        };

        let app = build_app(self.state);
        let served = axum::serve(listener, app)
            .with_graceful_shutdown(shutdown)
            .await;

        let _ = stop_tx.send(true);
        if let Some(handle) = scheduler
            && let Err(e) = handle.await
        {
            tracing::error!(error = %e, "Escalation scheduler task failed");
        }
        served?;
        Ok(())
    }
}

async fn shutdown_signal() {
    // Wait for Ctrl+C
    let _ = tokio::signal::ctrl_c().await;
    tracing::info!("shutdown signal received");
}
