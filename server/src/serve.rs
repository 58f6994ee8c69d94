use std::convert::Infallible;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use http_body_util::{BodyExt, LengthLimitError, Limited};
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::{Request, StatusCode};
use hyper_util::rt::{TokioIo, TokioTimer};
use hyper_util::service::TowerToHyperService;
use tokio::net::TcpListener;
use tower::{ServiceBuilder, service_fn};
use tracing::{debug, error, info, warn};

use crate::AppState;
use crate::error::ApiError;
use crate::handlers::http::utils::deliver_text;
use crate::handlers::http::{HttpResponse, Router};
use crate::tower_middle::TimeoutLayer;

/// Collects the body (bounded by `max_body_bytes`) and dispatches.
/// Never fails: handler errors become a 500.
pub async fn handle(
    req: Request<Incoming>,
    router: Arc<Router>,
    state: AppState,
) -> Result<HttpResponse, Infallible> {
    let (parts, body) = req.into_parts();

    let bytes = match Limited::new(body, state.limits.max_body_bytes).collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(e) if e.downcast_ref::<LengthLimitError>().is_some() => {
            warn!("{} {} body exceeds {} bytes", parts.method, parts.uri.path(), state.limits.max_body_bytes);
            return Ok(deliver_text(StatusCode::PAYLOAD_TOO_LARGE, "Request body too large"));
        }
        Err(e) => {
            warn!("Failed to read request body: {}", e);
            return Ok(deliver_text(StatusCode::BAD_REQUEST, "Invalid request"));
        }
    };

    let req = Request::from_parts(parts, bytes);
    let method = req.method().clone();
    let path = req.uri().path().to_string();

    match router.route(req, state).await {
        Ok(response) => {
            debug!("{} {} -> {}", method, path, response.status().as_u16());
            Ok(response)
        }
        Err(e) => {
            error!("{} {} failed: {:#}", method, path, e);
            Ok(ApiError::Internal(format!("{:#}", e)).to_response())
        }
    }
}

/// Accept loop. Every connection runs on its own task; every request goes
/// through the timeout layer. Returns once `shutdown` resolves.
pub async fn serve(
    listener: TcpListener,
    router: Arc<Router>,
    state: AppState,
    request_timeout: Duration,
    shutdown: impl Future<Output = ()>,
) -> Result<()> {
    tokio::pin!(shutdown);

    loop {
        let (stream, peer) = tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok(conn) => conn,
                Err(e) => {
                    warn!("Failed to accept connection: {}", e);
                    continue;
                }
            },
            _ = &mut shutdown => {
                info!("Shutdown requested; no longer accepting connections");
                break;
            }
        };

        let io = TokioIo::new(stream);
        let router = router.clone();
        let state = state.clone();

        let svc = ServiceBuilder::new()
            .layer(TimeoutLayer::new(request_timeout))
            .service(service_fn(move |req: Request<Incoming>| {
                handle(req, router.clone(), state.clone())
            }));

        tokio::task::spawn(async move {
            if let Err(err) = http1::Builder::new()
                .timer(TokioTimer::new())
                .serve_connection(io, TowerToHyperService::new(svc))
                .await
            {
                debug!("Error serving connection from {}: {:?}", peer, err);
            }
        });
    }

    Ok(())
}
