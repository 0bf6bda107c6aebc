//! HTTP API server with observability for the commerce core.
//!
//! Provides REST endpoints for order placement and both payment flows, plus
//! the provider webhook, with structured logging (tracing) and Prometheus
//! metrics. Every response carries an `x-request-id`.

pub mod config;
pub mod error;
pub mod identity;
pub mod routes;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use metrics_exporter_prometheus::PrometheusHandle;
use notifications::TaskQueue;
use orders::{Catalog, OrderCreationService};
use payments::{CredentialStore, PaymentGateway, PaymentService, WebhookVerifier};
use storage::Store;
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;

use config::Config;

/// Shared application state accessible from all handlers.
pub struct AppState<S: Store, G: PaymentGateway> {
    pub store: S,
    pub catalog: Catalog<S>,
    pub orders: OrderCreationService<S>,
    pub payments: PaymentService<S, G>,
}

impl<S: Store, G: PaymentGateway> AppState<S, G> {
    /// Wires the services over one store and one notification queue.
    pub fn new(
        store: S,
        queue: Arc<dyn TaskQueue>,
        gateway: G,
        credentials: CredentialStore,
        config: &Config,
    ) -> Self {
        Self {
            catalog: Catalog::new(store.clone(), config.catalog_ttl),
            orders: OrderCreationService::new(store.clone(), queue.clone()),
            payments: PaymentService::new(
                store.clone(),
                gateway,
                WebhookVerifier::new(credentials),
                queue,
                config.payment,
            ),
            store,
        }
    }
}

/// Creates the Axum application router with all routes and shared state.
pub fn create_app<S: Store, G: PaymentGateway>(
    state: Arc<AppState<S, G>>,
    metrics_handle: PrometheusHandle,
) -> Router {
    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics::render))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::health::check::<S, G>))
        .route("/orders", post(routes::orders::create::<S, G>))
        .route("/payments/charge", post(routes::payments::charge::<S, G>))
        .route("/payments/generate", post(routes::payments::generate::<S, G>))
        .route("/payments/confirm", post(routes::payments::confirm::<S, G>))
        .route(
            "/payments/{order_id}/status",
            get(routes::payments::status::<S, G>),
        )
        .route("/payments/webhook", post(routes::payments::webhook::<S, G>))
        .with_state(state)
        .merge(metrics_router)
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
                .layer(TraceLayer::new_for_http())
                .layer(PropagateRequestIdLayer::x_request_id())
                .layer(
                    CorsLayer::new()
                        .allow_origin(Any)
                        .allow_methods(Any)
                        .allow_headers(Any),
                ),
        )
}
