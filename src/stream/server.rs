// SPDX-License-Identifier: GPL-3.0-only

//! HTTP surface: the MJPEG stream and the control routes
//!
//! | Method | Path                  | Response                          |
//! |--------|-----------------------|-----------------------------------|
//! | GET    | `/video_feed`         | `multipart/x-mixed-replace` JPEGs |
//! | POST   | `/camera/{index}`     | status text                       |
//! | POST   | `/recording/toggle`   | status text                       |
//! | POST   | `/snapshot`           | status text                       |
//! | POST   | `/stopwatch/start`    | `true` (tick enabled)             |
//! | POST   | `/stopwatch/stop`     | `false`                           |
//! | POST   | `/stopwatch/reset`    | `false`                           |
//! | POST   | `/stopwatch/tick`     | `MM:SS`                           |
//! | GET    | `/stopwatch`          | `MM:SS`                           |
//! | GET    | `/status`             | JSON                              |
//!
//! Device commands block on the capture lock, so they run on the blocking
//! thread pool.

use crate::constants::{PART_CONTENT_TYPE, STREAM_BOUNDARY, STREAM_CONTENT_TYPE};
use crate::control::{CaptureController, CaptureEngine, EngineStatus, status_text};
use crate::errors::{CaptureError, CaptureResult};
use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use bytes::{Bytes, BytesMut};
use std::convert::Infallible;
use std::fmt::Display;
use std::future::Future;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{debug, info, warn};

type SharedEngine = Arc<CaptureEngine>;

/// Frame one JPEG as a multipart part
pub fn multipart_part(jpeg: &[u8]) -> Bytes {
    let header = format!(
        "--{}\r\nContent-Type: {}\r\n\r\n",
        STREAM_BOUNDARY, PART_CONTENT_TYPE
    );
    let mut part = BytesMut::with_capacity(header.len() + jpeg.len() + 2);
    part.extend_from_slice(header.as_bytes());
    part.extend_from_slice(jpeg);
    part.extend_from_slice(b"\r\n");
    part.freeze()
}

/// Build the router for an engine
pub fn router(engine: SharedEngine) -> Router {
    Router::new()
        .route("/video_feed", get(video_feed))
        .route("/camera/{index}", post(switch_camera))
        .route("/recording/toggle", post(toggle_recording))
        .route("/snapshot", post(snapshot))
        .route("/stopwatch", get(stopwatch_display))
        .route("/stopwatch/start", post(stopwatch_start))
        .route("/stopwatch/stop", post(stopwatch_stop))
        .route("/stopwatch/reset", post(stopwatch_reset))
        .route("/stopwatch/tick", post(stopwatch_tick))
        .route("/status", get(status))
        .with_state(engine)
}

/// Serve until `shutdown` resolves
///
/// Open streams are ended when shutdown begins so graceful shutdown does
/// not wait on them forever.
pub async fn serve<F>(listener: TcpListener, engine: SharedEngine, shutdown: F) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let addr = listener.local_addr()?;
    info!(%addr, "Stream server listening");
    info!("Video feed: http://{}/video_feed", addr);

    let hub = Arc::clone(engine.hub());
    axum::serve(listener, router(engine))
        .with_graceful_shutdown(async move {
            shutdown.await;
            info!("Stream server shutting down");
            hub.close();
        })
        .await
}

/// Resolve on Ctrl+C or, on Unix, SIGTERM
///
/// The SIGTERM handler is registered before this returns, so a signal sent
/// afterwards no longer terminates the process and is seen by the future.
pub fn shutdown_signal() -> std::io::Result<impl Future<Output = ()> + Send + 'static> {
    #[cfg(unix)]
    let mut terminate =
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;

    Ok(async move {
        #[cfg(unix)]
        let terminate = async move {
            terminate.recv().await;
        };
        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            result = tokio::signal::ctrl_c() => match result {
                Ok(()) => info!("Received Ctrl+C"),
                Err(e) => warn!(error = %e, "Ctrl+C handler failed, shutting down"),
            },
            _ = terminate => info!("Received SIGTERM"),
        }
    })
}

async fn video_feed(State(engine): State<SharedEngine>) -> Response {
    let mut subscription = engine.hub().subscribe();
    debug!(id = subscription.id(), "Video feed requested");

    let parts = async_stream::stream! {
        while let Some(part) = subscription.next_part().await {
            yield Ok::<Bytes, Infallible>(part);
        }
    };

    (
        [
            (header::CONTENT_TYPE, STREAM_CONTENT_TYPE),
            (header::CACHE_CONTROL, "no-cache, no-store"),
        ],
        Body::from_stream(parts),
    )
        .into_response()
}

async fn switch_camera(State(engine): State<SharedEngine>, Path(index): Path<u32>) -> Response {
    command_response(run_command(engine, move |c| c.switch_device(index)).await)
}

async fn toggle_recording(State(engine): State<SharedEngine>) -> Response {
    command_response(run_command(engine, |c| c.toggle_recording()).await)
}

async fn snapshot(State(engine): State<SharedEngine>) -> Response {
    command_response(run_command(engine, |c| c.capture_snapshot()).await)
}

async fn stopwatch_start(State(engine): State<SharedEngine>) -> String {
    engine.stopwatch().start().to_string()
}

async fn stopwatch_stop(State(engine): State<SharedEngine>) -> String {
    engine.stopwatch().stop().to_string()
}

async fn stopwatch_reset(State(engine): State<SharedEngine>) -> String {
    engine.stopwatch().reset().to_string()
}

async fn stopwatch_tick(State(engine): State<SharedEngine>) -> String {
    engine.stopwatch().tick()
}

async fn stopwatch_display(State(engine): State<SharedEngine>) -> String {
    engine.stopwatch().display()
}

async fn status(State(engine): State<SharedEngine>) -> Json<EngineStatus> {
    Json(engine.status())
}

async fn run_command<T, F>(engine: SharedEngine, command: F) -> CaptureResult<T>
where
    T: Send + 'static,
    F: FnOnce(&CaptureController) -> CaptureResult<T> + Send + 'static,
{
    tokio::task::spawn_blocking(move || command(engine.controller().as_ref()))
        .await
        .unwrap_or_else(|e| Err(CaptureError::Io(format!("Command task failed: {}", e))))
}

fn command_response<T: Display>(result: CaptureResult<T>) -> Response {
    let code = match &result {
        Ok(_) => StatusCode::OK,
        Err(e) => error_status(e),
    };
    (code, status_text(&result)).into_response()
}

fn error_status(error: &CaptureError) -> StatusCode {
    if error.is_device_unavailable() {
        StatusCode::SERVICE_UNAVAILABLE
    } else {
        StatusCode::INTERNAL_SERVER_ERROR
    }
}
