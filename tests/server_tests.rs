// SPDX-License-Identifier: GPL-3.0-only

//! Integration tests for the HTTP stream and control routes

mod common;

use camstream::config::ServerConfig;
use camstream::control::CaptureEngine;
use camstream::stream;
use common::{FakeOpener, MemorySinkFactory, files_in, temp_dir};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

const TIMEOUT: Duration = Duration::from_secs(5);

struct TestServer {
    addr: SocketAddr,
    engine: Arc<CaptureEngine>,
    dir: PathBuf,
    stop: Option<oneshot::Sender<()>>,
    task: JoinHandle<std::io::Result<()>>,
}

impl TestServer {
    async fn start(cameras: &[u32]) -> Self {
        let dir = temp_dir("server");
        let config = ServerConfig {
            initial_camera: Some(0),
            output_dir: dir.clone(),
            ..ServerConfig::default()
        };
        let engine = Arc::new(
            CaptureEngine::start(config, FakeOpener::new(cameras), MemorySinkFactory::new())
                .unwrap(),
        );

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (stop, stopped) = oneshot::channel::<()>();
        let task = tokio::spawn(stream::serve(listener, Arc::clone(&engine), async move {
            let _ = stopped.await;
        }));

        Self {
            addr,
            engine,
            dir,
            stop: Some(stop),
            task,
        }
    }

    /// Send a request with an empty body and return (status, body)
    async fn request(&self, method: &str, path: &str) -> (u16, String) {
        let mut stream = TcpStream::connect(self.addr).await.unwrap();
        let request = format!(
            "{} {} HTTP/1.1\r\nHost: localhost\r\nContent-Length: 0\r\nConnection: close\r\n\r\n",
            method, path
        );
        stream.write_all(request.as_bytes()).await.unwrap();

        let mut response = Vec::new();
        tokio::time::timeout(TIMEOUT, stream.read_to_end(&mut response))
            .await
            .unwrap()
            .unwrap();

        let text = String::from_utf8_lossy(&response).to_string();
        let status = text[9..12].parse().unwrap();
        let body = text
            .split_once("\r\n\r\n")
            .map(|(_, body)| body.to_string())
            .unwrap_or_default();
        (status, body)
    }

    async fn shutdown(mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        tokio::time::timeout(TIMEOUT, self.task)
            .await
            .expect("server did not shut down")
            .unwrap()
            .unwrap();
        self.engine.shutdown();
    }
}

fn count(haystack: &[u8], needle: &[u8]) -> usize {
    haystack
        .windows(needle.len())
        .filter(|window| *window == needle)
        .count()
}

async fn open_feed(addr: SocketAddr) -> (TcpStream, Vec<u8>) {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream
        .write_all(b"GET /video_feed HTTP/1.1\r\nHost: localhost\r\n\r\n")
        .await
        .unwrap();

    // Read until two complete parts have arrived
    let mut received = Vec::new();
    let mut chunk = [0u8; 8192];
    tokio::time::timeout(TIMEOUT, async {
        while count(&received, b"--frame\r\nContent-Type: image/jpeg\r\n\r\n") < 3 {
            let n = stream.read(&mut chunk).await.unwrap();
            assert!(n > 0, "stream closed early");
            received.extend_from_slice(&chunk[..n]);
        }
    })
    .await
    .expect("timed out waiting for stream parts");

    (stream, received)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_video_feed_is_multipart_jpeg() {
    let server = TestServer::start(&[0]).await;

    let (stream, received) = open_feed(server.addr).await;
    let text = String::from_utf8_lossy(&received).to_lowercase();
    assert!(text.starts_with("http/1.1 200"));
    assert!(text.contains("content-type: multipart/x-mixed-replace; boundary=frame"));
    // JPEG start of image right after the part header
    assert!(count(&received, b"Content-Type: image/jpeg\r\n\r\n\xFF\xD8") >= 2);
    assert_eq!(server.engine.hub().subscriber_count(), 1);

    // Disconnecting removes the subscription
    drop(stream);
    let hub = Arc::clone(server.engine.hub());
    let gone = tokio::time::timeout(TIMEOUT, async move {
        while hub.subscriber_count() > 0 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await;
    assert!(gone.is_ok());

    server.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_shutdown_ends_open_streams() {
    let server = TestServer::start(&[0]).await;
    let (_stream, _) = open_feed(server.addr).await;

    server.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_switch_camera_status_texts() {
    let server = TestServer::start(&[0, 1]).await;

    assert_eq!(
        server.request("POST", "/camera/1").await,
        (200, "Switched to camera 1".to_string())
    );
    assert_eq!(
        server.request("POST", "/camera/1").await,
        (200, "Camera 1 already active".to_string())
    );

    let (status, body) = server.request("POST", "/camera/9").await;
    assert_eq!(status, 503);
    assert_eq!(body, "Camera 9 unavailable: No such device");

    // The failed switch left no device behind
    let (status, body) = server.request("POST", "/snapshot").await;
    assert_eq!(status, 503);
    assert_eq!(body, "No active camera");
    assert!(files_in(&server.dir).is_empty());

    let (status, _) = server.request("POST", "/camera/not-a-number").await;
    assert_eq!(status, 400);

    server.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_recording_and_snapshot_routes() {
    let server = TestServer::start(&[0]).await;

    assert_eq!(
        server.request("POST", "/recording/toggle").await,
        (200, "Recording started...".to_string())
    );
    assert_eq!(
        server.request("POST", "/recording/toggle").await,
        (200, "Recording stopped and saved.".to_string())
    );

    let (status, body) = server.request("POST", "/snapshot").await;
    assert_eq!(status, 200);
    assert!(body.starts_with("Picture saved as picture_"));
    let name = body.trim_start_matches("Picture saved as ");
    assert!(server.dir.join(name).exists());

    server.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_stopwatch_routes() {
    let server = TestServer::start(&[0]).await;

    assert_eq!(server.request("POST", "/stopwatch/start").await.1, "true");
    for _ in 0..3 {
        server.request("POST", "/stopwatch/tick").await;
    }
    assert_eq!(server.request("POST", "/stopwatch/stop").await.1, "false");
    assert_eq!(server.request("POST", "/stopwatch/start").await.1, "true");
    server.request("POST", "/stopwatch/tick").await;
    assert_eq!(server.request("POST", "/stopwatch/tick").await.1, "00:05");

    assert_eq!(server.request("POST", "/stopwatch/reset").await.1, "false");
    assert_eq!(server.request("GET", "/stopwatch").await.1, "00:00");
    assert_eq!(server.request("POST", "/stopwatch/tick").await.1, "00:00");

    server.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_status_route_reports_json() {
    let server = TestServer::start(&[0]).await;

    let (status, body) = server.request("GET", "/status").await;
    assert_eq!(status, 200);

    let json: serde_json::Value = serde_json::from_str(&body).unwrap();
    assert_eq!(json["camera"], 0);
    assert_eq!(json["device"]["state"], "active");
    assert_eq!(json["recording"], serde_json::Value::Null);
    assert_eq!(json["stopwatch"]["display"], "00:00");

    server.shutdown().await;
}
