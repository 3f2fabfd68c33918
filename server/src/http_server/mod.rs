use std::net::SocketAddr;

use axum::{response::Response, Router};
use color_eyre::eyre::WrapErr;
use tokio::net::TcpListener;

pub(crate) mod api;
pub(crate) mod auth;
pub(crate) mod errors;
pub(crate) mod media;
pub(crate) mod repr;
pub(crate) mod routes;
pub(crate) mod trace;

#[cfg(test)]
pub(crate) mod test_helpers;

pub(crate) use errors::ServerError;

pub(crate) type ResponseResult<T = Response> = Result<T, ServerError>;

pub(crate) async fn run_server(routes: Router, port: u16) -> color_eyre::Result<()> {
    let tracer = trace::Tracer;
    let trace_layer = tower_http::trace::TraceLayer::new_for_http()
        .make_span_with(tracer)
        .on_response(tracer);

    let app = routes.layer(trace_layer);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!("Starting server on port {}", port);
    let listener = TcpListener::bind(&addr)
        .await
        .wrap_err("Failed to open port")?;

    let addr = listener.local_addr()?;
    tracing::info!("Listening on {}", addr);

    axum::serve(listener, app)
        .await
        .wrap_err("Failed to run server")
}
