//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create the Axum Router: gateway middleware over an upstream forwarder
//! - Wire up middleware (tracing, concurrency limit, timeout)
//! - Start the quota sweeper and security event writer
//! - Serve plain TCP or TLS and shut down on the broadcast signal

use axum::{
    body::Body,
    extract::{Request, State},
    http::{
        uri::{Authority, Scheme},
        HeaderValue, StatusCode, Uri,
    },
    response::{IntoResponse, Response},
    Json, Router,
};
use axum_server::tls_rustls::RustlsConfig;
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client},
    rt::TokioExecutor,
};
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tower::limit::ConcurrencyLimitLayer;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

use crate::config::GatewayConfig;
use crate::error::GatewayError;
use crate::events::{run_writer, EventDispatcher, SecurityEvent, SecurityEventSink};
use crate::gateway::{gateway_middleware, Gateway};
use crate::http::request::RequestId;
use crate::lifecycle::Shutdown;
use crate::security::headers::X_REQUEST_ID;
use crate::security::quota::QuotaSweeper;

/// State for the upstream forwarding handler.
#[derive(Clone)]
pub struct UpstreamState {
    pub client: Client<HttpConnector, Body>,
    pub authority: Authority,
}

/// Standalone gateway server: every admitted request is forwarded upstream.
pub struct GatewayServer {
    router: Router,
    config: GatewayConfig,
    gateway: Gateway,
    sink: Arc<dyn SecurityEventSink>,
    events_rx: mpsc::Receiver<SecurityEvent>,
}

impl GatewayServer {
    /// Create a new server with the given configuration and event sink.
    pub fn new(config: GatewayConfig, sink: Arc<dyn SecurityEventSink>) -> Result<Self, GatewayError> {
        let (events, events_rx) = EventDispatcher::detached(config.events.channel_capacity);
        let gateway = Gateway::in_memory(&config, events)?;

        let authority = Authority::try_from(config.upstream.address.as_str()).map_err(|e| {
            GatewayError::internal(format!("invalid upstream address {}: {}", config.upstream.address, e))
        })?;
        let state = UpstreamState {
            client: Client::builder(TokioExecutor::new()).build(HttpConnector::new()),
            authority,
        };

        let router = Self::build_router(&config, gateway.clone(), state);
        Ok(Self {
            router,
            config,
            gateway,
            sink,
            events_rx,
        })
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    fn build_router(config: &GatewayConfig, gateway: Gateway, state: UpstreamState) -> Router {
        Router::new()
            .fallback(forward_upstream)
            .with_state(state)
            .layer(TimeoutLayer::new(Duration::from_secs(config.upstream.timeout_secs)))
            .layer(axum::middleware::from_fn_with_state(gateway, gateway_middleware))
            .layer(ConcurrencyLimitLayer::new(config.listener.max_connections))
            .layer(TraceLayer::new_for_http())
    }

    /// Run the server, accepting connections on the given listener.
    pub async fn run(self, listener: TcpListener, shutdown: Shutdown) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "Gateway server starting");

        let Self {
            router,
            config,
            gateway,
            sink,
            events_rx,
        } = self;
        let background = spawn_background(&config, &gateway, sink, events_rx, &shutdown);

        let app = router.into_make_service_with_connect_info::<SocketAddr>();
        let mut stop = shutdown.subscribe();
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = stop.recv().await;
            })
            .await?;

        background.finish().await;
        tracing::info!("Gateway server stopped");
        Ok(())
    }

    /// Run the server over TLS.
    pub async fn run_tls(
        self,
        addr: SocketAddr,
        tls: RustlsConfig,
        shutdown: Shutdown,
    ) -> Result<(), std::io::Error> {
        tracing::info!(address = %addr, "Gateway server starting (TLS)");

        let Self {
            router,
            config,
            gateway,
            sink,
            events_rx,
        } = self;
        let background = spawn_background(&config, &gateway, sink, events_rx, &shutdown);

        let handle = axum_server::Handle::new();
        let mut stop = shutdown.subscribe();
        let stopper = handle.clone();
        tokio::spawn(async move {
            let _ = stop.recv().await;
            stopper.graceful_shutdown(Some(Duration::from_secs(10)));
        });

        axum_server::bind_rustls(addr, tls)
            .handle(handle)
            .serve(router.into_make_service_with_connect_info::<SocketAddr>())
            .await?;

        background.finish().await;
        tracing::info!("Gateway server stopped");
        Ok(())
    }

    /// The fully layered router, for embedding or in-process tests.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    pub fn gateway(&self) -> &Gateway {
        &self.gateway
    }

    /// Get a reference to the config.
    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }
}

struct Background {
    sweeper: JoinHandle<()>,
    writer: JoinHandle<()>,
}

impl Background {
    async fn finish(self) {
        if let Err(e) = self.writer.await {
            tracing::error!(error = %e, "Security event writer task failed");
        }
        if let Err(e) = self.sweeper.await {
            tracing::error!(error = %e, "Quota sweeper task failed");
        }
    }
}

fn spawn_background(
    config: &GatewayConfig,
    gateway: &Gateway,
    sink: Arc<dyn SecurityEventSink>,
    events_rx: mpsc::Receiver<SecurityEvent>,
    shutdown: &Shutdown,
) -> Background {
    let sweeper = QuotaSweeper::new(
        gateway.quota_store(),
        Duration::from_secs(config.quota.sweep_interval_secs),
    );
    Background {
        sweeper: tokio::spawn(sweeper.run(shutdown.subscribe())),
        writer: tokio::spawn(run_writer(sink, events_rx, shutdown.subscribe())),
    }
}

/// Forward an admitted request to the configured upstream.
async fn forward_upstream(State(state): State<UpstreamState>, request: Request) -> Response {
    let (mut parts, body) = request.into_parts();

    let path_and_query = parts
        .uri
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or("/");
    let uri = match Uri::builder()
        .scheme(Scheme::HTTP)
        .authority(state.authority.as_str())
        .path_and_query(path_and_query)
        .build()
    {
        Ok(uri) => uri,
        Err(e) => {
            tracing::error!(error = %e, "Failed to build upstream URI");
            return bad_gateway();
        }
    };
    parts.uri = uri;

    // Propagate the gateway's correlation ID upstream.
    if let Some(RequestId(id)) = parts.extensions.get::<RequestId>().copied() {
        if let Ok(value) = HeaderValue::from_str(&id.to_string()) {
            parts.headers.insert(X_REQUEST_ID, value);
        }
    }

    match state.client.request(Request::from_parts(parts, body)).await {
        Ok(response) => {
            let (parts, body) = response.into_parts();
            Response::from_parts(parts, Body::new(body))
        }
        Err(e) => {
            tracing::warn!(upstream = %state.authority, error = %e, "Upstream request failed");
            bad_gateway()
        }
    }
}

fn bad_gateway() -> Response {
    (
        StatusCode::BAD_GATEWAY,
        Json(json!({ "error": "Upstream request failed" })),
    )
        .into_response()
}
