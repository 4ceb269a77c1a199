//! hyper-based accept loop and request handling

use super::{AppState, ServerError};
use crate::auth::session::SESSION_HEADER;
use crate::auth::AuthRequest;
use crate::metrics;
use crate::pipeline::AuthOutcome;
use bytes::Bytes;
use http_body_util::Full;
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::header::{HeaderName, HeaderValue};
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use std::collections::HashMap;
use std::convert::Infallible;
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tracing::{debug, error, info, warn};

/// Authenticating HTTP server
///
/// # Example
///
/// ```no_run
/// use authgate::domain::{AuthTypeRegistry, AuthenticationDomainRegistry};
/// use authgate::pipeline::AuthPipeline;
/// use authgate::repository::{ConfigurationRepository, InMemoryStore};
/// use authgate::server::{AppState, AuthServer};
/// use authgate::xff::XffResolver;
/// use std::sync::Arc;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let repository = Arc::new(ConfigurationRepository::new(Arc::new(InMemoryStore::new())));
/// let registry = Arc::new(AuthenticationDomainRegistry::new(
///     AuthTypeRegistry::with_builtins(repository),
/// ));
/// let state = AppState::new(
///     Arc::new(AuthPipeline::new(registry)),
///     Arc::new(XffResolver::new()),
/// );
///
/// let server = AuthServer::bind("127.0.0.1:0", state).await?;
/// println!("Server bound to: {}", server.local_addr());
/// server.run().await?;
/// # Ok(())
/// # }
/// ```
pub struct AuthServer {
    state: AppState,
    listener: TcpListener,
    local_addr: SocketAddr,
}

impl AuthServer {
    /// Bind to `address`. Port 0 lets the OS pick a port.
    pub async fn bind(address: &str, state: AppState) -> Result<Self, ServerError> {
        let addr: SocketAddr = address
            .parse()
            .map_err(|e| ServerError::BindError(format!("Invalid address: {}", e)))?;

        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| ServerError::BindError(format!("Failed to bind to {}: {}", addr, e)))?;

        // Actual bound address (important for port 0)
        let local_addr = listener
            .local_addr()
            .map_err(|e| ServerError::BindError(format!("Failed to get local address: {}", e)))?;

        info!("Server bound to {}", local_addr);

        Ok(Self {
            state,
            listener,
            local_addr,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Accept connections until the task is dropped.
    ///
    /// Each connection is served on its own task; connection errors are
    /// logged and do not stop the loop.
    pub async fn run(self) -> Result<(), ServerError> {
        info!("Starting server on {}", self.local_addr);

        loop {
            let (stream, peer_addr) = match self.listener.accept().await {
                Ok(conn) => conn,
                Err(e) => {
                    error!("Failed to accept connection: {}", e);
                    continue;
                }
            };

            let state = self.state.clone();

            tokio::spawn(async move {
                let io = TokioIo::new(stream);

                let service = service_fn(move |req| {
                    let state = state.clone();
                    async move { handle_request(req, state, peer_addr).await }
                });

                if let Err(e) = http1::Builder::new().serve_connection(io, service).await {
                    error!("Error serving connection from {}: {}", peer_addr, e);
                }
            });
        }
    }
}

/// Build an AuthRequest from hyper request headers.
///
/// Repeated headers are joined with `", "`.
fn build_auth_request(req: &Request<Incoming>, peer: SocketAddr) -> AuthRequest {
    let mut headers: HashMap<String, String> = HashMap::new();
    for (name, value) in req.headers() {
        if let Ok(v) = value.to_str() {
            headers
                .entry(name.as_str().to_ascii_lowercase())
                .and_modify(|existing| {
                    existing.push_str(", ");
                    existing.push_str(v);
                })
                .or_insert_with(|| v.to_string());
        }
    }

    AuthRequest {
        headers,
        query: req.uri().query().map(|q| q.to_string()),
        method: req.method().to_string(),
        path: req.uri().path().to_string(),
        remote_addr: Some(peer),
    }
}

async fn handle_request(
    req: Request<Incoming>,
    state: AppState,
    peer: SocketAddr,
) -> Result<Response<Full<Bytes>>, Infallible> {
    let path = req.uri().path().to_string();
    let method = req.method().clone();

    debug!("Handling {} {} from {}", method, path, peer);

    if method == Method::GET && path == "/health" {
        return Ok(text(StatusCode::OK, "application/json", r#"{"status":"ok"}"#));
    }

    if method == Method::GET && path == "/metrics" && state.metrics_enabled {
        return Ok(metrics_response());
    }

    let mut auth_request = build_auth_request(&req, peer);

    let client = match crate::xff::resolve_request(
        &state.xff.config(),
        peer,
        &mut auth_request,
    ) {
        Ok(client) => client,
        Err(e) => {
            warn!(peer = %peer, error = %e, "Rejecting request with unresolvable client address");
            metrics::record_error("xff");
            return Ok(text(StatusCode::FORBIDDEN, "text/plain", "Forbidden"));
        }
    };

    let response = match state.pipeline.authenticate(&auth_request).await {
        AuthOutcome::Authenticated {
            identity,
            session,
            domain,
        } => {
            info!(user = %identity.username, client = %client, "Request authenticated");
            let identity_name = identity.username.clone();
            let body = serde_json::json!({
                "user": identity.username,
                "roles": identity.roles,
                "domain": domain,
                "remote_addr": client.to_string(),
                "authenticated_at": chrono::Utc::now().to_rfc3339(),
            });

            let mut builder = Response::builder()
                .status(StatusCode::OK)
                .header("Content-Type", "application/json");
            if let Some(session) = session {
                match HeaderValue::from_str(&session.to_header_value()) {
                    Ok(value) => builder = builder.header(SESSION_HEADER, value),
                    Err(_) => warn!(user = %identity_name, "Session not representable as a header"),
                }
            }
            builder
                .body(Full::new(Bytes::from(body.to_string())))
                .expect("Failed to build identity response")
        }
        AuthOutcome::Challenged { domain, challenge } => {
            debug!(domain = %domain, "Challenging client");
            let mut builder = Response::builder()
                .status(StatusCode::UNAUTHORIZED)
                .header("Content-Type", "text/plain");
            match (
                HeaderName::from_bytes(challenge.header.as_bytes()),
                HeaderValue::from_str(&challenge.value),
            ) {
                (Ok(name), Ok(value)) => builder = builder.header(name, value),
                _ => error!(domain = %domain, "Challenge is not a valid HTTP header"),
            }
            builder
                .body(Full::new(Bytes::from("Unauthorized")))
                .expect("Failed to build 401 response")
        }
        AuthOutcome::Rejected => {
            warn!(client = %client, path = %path, "Authentication failed");
            text(StatusCode::UNAUTHORIZED, "text/plain", "Unauthorized")
        }
        AuthOutcome::Unavailable => text(
            StatusCode::SERVICE_UNAVAILABLE,
            "text/plain",
            "Authentication not initialized",
        ),
    };

    Ok(response)
}

fn metrics_response() -> Response<Full<Bytes>> {
    match metrics::render() {
        Ok((body, content_type)) => Response::builder()
            .status(StatusCode::OK)
            .header("Content-Type", content_type)
            .body(Full::new(Bytes::from(body)))
            .expect("Failed to build metrics response"),
        Err(e) => {
            error!("Failed to encode metrics: {}", e);
            text(
                StatusCode::INTERNAL_SERVER_ERROR,
                "text/plain",
                "Failed to encode metrics",
            )
        }
    }
}

fn text(status: StatusCode, content_type: &str, body: &'static str) -> Response<Full<Bytes>> {
    Response::builder()
        .status(status)
        .header("Content-Type", content_type)
        .body(Full::new(Bytes::from(body)))
        .expect("Failed to build response")
}
