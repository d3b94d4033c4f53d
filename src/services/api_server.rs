// src/services/api_server.rs
//! HTTP surface of the SNAP envelope.
//!
//! Binds the request pipeline to axum routes:
//! - `POST /snap/v1.0/access-token/b2b` (service 73)
//! - `POST /snap/v1.0/transfer-va/inquiry` (service 24)
//! - `POST /snap/v1.0/transfer-va/payment` (service 25)
//! - `GET /` and `GET /robot.txt`
//!
//! Every response, including the plain-text ones, leaves with `X-Timestamp`
//! and `Cache-Control: no-store`.

use crate::models::error::ServiceCode;
use crate::services::pipeline::{InboundRequest, Pipeline, TransactionHandler};
use crate::services::response::{stamp_headers, SnapResponse};
use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, HeaderValue, Method, Uri},
    middleware,
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};

pub const TOKEN_PATH: &str = "/snap/v1.0/access-token/b2b";
pub const VA_INQUIRY_PATH: &str = "/snap/v1.0/transfer-va/inquiry";
pub const VA_PAYMENT_PATH: &str = "/snap/v1.0/transfer-va/payment";

/// Shared state of the HTTP server.
#[derive(Clone)]
pub struct ApiServer {
    pipeline: Arc<Pipeline>,
    inquiry: Arc<dyn TransactionHandler>,
    payment: Arc<dyn TransactionHandler>,
    cors_origins: Vec<String>,
}

impl ApiServer {
    /// # Arguments
    /// * `pipeline` - security envelope shared by every route
    /// * `inquiry` - business logic of the VA inquiry route
    /// * `payment` - business logic of the VA payment route
    /// * `cors_origins` - origins allowed to call from a browser
    pub fn new(
        pipeline: Pipeline,
        inquiry: Arc<dyn TransactionHandler>,
        payment: Arc<dyn TransactionHandler>,
        cors_origins: Vec<String>,
    ) -> Self {
        ApiServer {
            pipeline: Arc::new(pipeline),
            inquiry,
            payment,
            cors_origins,
        }
    }

    /// Builds the router without binding a socket.
    pub fn router(&self) -> Router {
        let allow_origin = if self.cors_origins.iter().any(|origin| origin == "*") {
            AllowOrigin::any()
        } else {
            let origins: Vec<HeaderValue> = self
                .cors_origins
                .iter()
                .filter_map(|origin| match HeaderValue::from_str(origin) {
                    Ok(value) => Some(value),
                    Err(_) => {
                        log::warn!("ignoring invalid CORS origin {:?}", origin);
                        None
                    }
                })
                .collect();
            AllowOrigin::list(origins)
        };
        let cors = CorsLayer::new()
            .allow_origin(allow_origin)
            .allow_methods([Method::GET, Method::POST])
            .allow_headers(Any);

        Router::new()
            .route("/", get(Self::banner_handler))
            .route("/robot.txt", get(Self::robots_handler))
            .route(TOKEN_PATH, post(Self::access_token_handler))
            .route(VA_INQUIRY_PATH, post(Self::va_inquiry_handler))
            .route(VA_PAYMENT_PATH, post(Self::va_payment_handler))
            .with_state(Arc::new(self.clone()))
            .layer(
                ServiceBuilder::new()
                    .layer(middleware::map_response(stamp_response))
                    .layer(cors),
            )
    }

    /// Binds `addr` and serves until the process is stopped.
    pub async fn run(&self, addr: SocketAddr) -> anyhow::Result<()> {
        let app = self.router();
        let listener = tokio::net::TcpListener::bind(addr).await?;
        log::info!("SNAP API listening on http://{}", listener.local_addr()?);
        axum::serve(listener, app).await?;
        Ok(())
    }

    async fn banner_handler() -> &'static str {
        "SNAP API"
    }

    async fn robots_handler() -> &'static str {
        "User-agent: *\nDisallow: /"
    }

    async fn access_token_handler(
        State(server): State<Arc<ApiServer>>,
        method: Method,
        uri: Uri,
        headers: HeaderMap,
        body: Bytes,
    ) -> SnapResponse {
        let request = inbound(method, uri, headers, body);
        server.pipeline.issue_token(&request).await
    }

    async fn va_inquiry_handler(
        State(server): State<Arc<ApiServer>>,
        method: Method,
        uri: Uri,
        headers: HeaderMap,
        body: Bytes,
    ) -> SnapResponse {
        let request = inbound(method, uri, headers, body);
        server
            .pipeline
            .transact(ServiceCode::VA_INQUIRY, &request, server.inquiry.as_ref())
            .await
    }

    async fn va_payment_handler(
        State(server): State<Arc<ApiServer>>,
        method: Method,
        uri: Uri,
        headers: HeaderMap,
        body: Bytes,
    ) -> SnapResponse {
        let request = inbound(method, uri, headers, body);
        server
            .pipeline
            .transact(ServiceCode::VA_PAYMENT, &request, server.payment.as_ref())
            .await
    }
}

fn inbound(method: Method, uri: Uri, headers: HeaderMap, body: Bytes) -> InboundRequest {
    InboundRequest {
        method,
        path: uri.path().to_string(),
        headers,
        body,
    }
}

async fn stamp_response(mut response: Response) -> impl IntoResponse {
    stamp_headers(response.headers_mut());
    response
}
