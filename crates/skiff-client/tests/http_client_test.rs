//! HTTP Client Integration Tests
//!
//! These tests verify the pooled HTTP client's ability to:
//! - Make calls against a real skiff HTTP server
//! - Bound concurrent connections and queue callers beyond the bound
//! - Fail with a pool timeout when no connection frees up in time
//! - Report non-200 responses and read timeouts
//!
//! All test URLs use `127.0.0.1` with an ephemeral port.

use std::convert::Infallible;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use http_body_util::Full;
use hyper::body::{Bytes, Incoming};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use serde::{Deserialize, Serialize};
use skiff_client::{HttpClient, HttpClientConfig};
use skiff_common::protocol::{CallError, Method, NoException, SkiffError};
use skiff_server::{make_http_app, HttpServer, Processor};
use tokio::net::TcpListener;

// ============================================================================
// Test Service
// ============================================================================

#[derive(Debug, Serialize, Deserialize)]
struct NapArgs {
    ms: u64,
}

/// Sleeps for `ms` and returns how many naps were in progress on entry.
struct Nap;

impl Method for Nap {
    const NAME: &'static str = "nap";
    const ARG_FIELDS: &'static [&'static str] = &["ms"];
    type Args = NapArgs;
    type Success = usize;
    type Exception = NoException;
}

struct Notify;

impl Method for Notify {
    const NAME: &'static str = "notify";
    const ARG_FIELDS: &'static [&'static str] = &["ms"];
    const ONEWAY: bool = true;
    const VOID: bool = true;
    type Args = NapArgs;
    type Success = ();
    type Exception = NoException;
}

#[derive(Default)]
struct Sleeper {
    in_progress: AtomicUsize,
    peak: AtomicUsize,
}

async fn start_sleeper() -> (String, Arc<Sleeper>) {
    let sleeper = Arc::new(Sleeper::default());
    let processor = Processor::builder(Arc::clone(&sleeper))
        .register::<Nap, _>(|sleeper, args| {
            let now = sleeper.in_progress.fetch_add(1, Ordering::SeqCst) + 1;
            sleeper.peak.fetch_max(now, Ordering::SeqCst);
            std::thread::sleep(Duration::from_millis(args.ms));
            sleeper.in_progress.fetch_sub(1, Ordering::SeqCst);
            Ok(now)
        })
        .register::<Notify, _>(|_, _| Ok(()))
        .build();

    let server = HttpServer::bind("127.0.0.1:0", make_http_app(Arc::new(processor)))
        .await
        .unwrap();
    let url = format!("http://{}/", server.local_addr().unwrap());
    tokio::spawn(server.serve());
    (url, sleeper)
}

/// Answers every request with `status` and `body`, whatever was sent.
async fn start_fixed(status: StatusCode, body: &'static [u8]) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("http://{}/", listener.local_addr().unwrap());

    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            tokio::spawn(async move {
                let service = service_fn(move |_req: Request<Incoming>| async move {
                    let response = Response::builder()
                        .status(status)
                        .body(Full::new(Bytes::from_static(body)))
                        .unwrap();
                    Ok::<_, Infallible>(response)
                });
                let _ = http1::Builder::new()
                    .serve_connection(TokioIo::new(stream), service)
                    .await;
            });
        }
    });

    url
}

// ============================================================================
// Tests
// ============================================================================

#[tokio::test]
async fn test_call_round_trip() {
    let (url, _) = start_sleeper().await;
    let client = HttpClient::new(&url).unwrap();

    assert_eq!(client.call::<Nap>(&NapArgs { ms: 0 }).await.unwrap(), 1);

    client.close().await;
}

#[tokio::test]
async fn test_callers_beyond_max_size_wait_for_a_connection() {
    let (url, sleeper) = start_sleeper().await;
    let config = HttpClientConfig::new()
        .with_max_size(2)
        .with_read_timeout(Duration::from_secs(5));
    let client = Arc::new(HttpClient::with_config(&url, config).unwrap());

    let calls: Vec<_> = (0..6)
        .map(|_| {
            let client = Arc::clone(&client);
            tokio::spawn(async move { client.call::<Nap>(&NapArgs { ms: 100 }).await })
        })
        .collect();
    for call in calls {
        call.await.unwrap().unwrap();
    }

    assert!(sleeper.peak.load(Ordering::SeqCst) <= 2);
    assert_eq!(client.pool().available(), 2);
}

#[tokio::test]
async fn test_pool_timeout_when_all_connections_busy() {
    let (url, _) = start_sleeper().await;
    let config = HttpClientConfig::new()
        .with_max_size(1)
        .with_read_timeout(Duration::from_secs(5))
        .with_pool_timeout(Duration::from_millis(100));
    let client = Arc::new(HttpClient::with_config(&url, config).unwrap());

    let busy = {
        let client = Arc::clone(&client);
        tokio::spawn(async move { client.call::<Nap>(&NapArgs { ms: 500 }).await })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;

    let err = client.call::<Nap>(&NapArgs { ms: 0 }).await.unwrap_err();
    assert!(matches!(err, CallError::Rpc(SkiffError::PoolTimeout(100))));

    busy.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_read_timeout() {
    let (url, _) = start_sleeper().await;
    let config = HttpClientConfig::new().with_read_timeout(Duration::from_millis(100));
    let client = HttpClient::with_config(&url, config).unwrap();

    let started = Instant::now();
    let err = client.call::<Nap>(&NapArgs { ms: 1000 }).await.unwrap_err();

    assert!(matches!(err, CallError::Rpc(SkiffError::Timeout(100))));
    assert!(started.elapsed() < Duration::from_millis(900));
}

#[tokio::test]
async fn test_non_200_status_is_an_error() {
    let url = start_fixed(StatusCode::SERVICE_UNAVAILABLE, b"try later").await;
    let client = HttpClient::new(&url).unwrap();

    let err = client.call::<Nap>(&NapArgs { ms: 0 }).await.unwrap_err();

    assert!(matches!(err, CallError::Rpc(SkiffError::HttpStatus(503))));
}

#[tokio::test]
async fn test_oneway_ignores_response_body() {
    let url = start_fixed(StatusCode::OK, b"not a skiff message").await;
    let client = HttpClient::new(&url).unwrap();

    client.call::<Notify>(&NapArgs { ms: 0 }).await.unwrap();

    // A two-way call on the same garbage body fails to decode
    assert!(client.call::<Nap>(&NapArgs { ms: 0 }).await.is_err());
}

#[tokio::test]
async fn test_connection_refused() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("http://{}/", listener.local_addr().unwrap());
    drop(listener);

    let client = HttpClient::new(&url).unwrap();
    let err = client.call::<Nap>(&NapArgs { ms: 0 }).await.unwrap_err();

    assert!(matches!(err, CallError::Rpc(SkiffError::Connection(_))));
}

#[test]
fn test_rejects_non_http_urls() {
    for url in ["ftp://127.0.0.1:21/", "127.0.0.1:8080", "tcp://127.0.0.1:6000"] {
        assert!(matches!(HttpClient::new(url), Err(SkiffError::InvalidUrl(_))));
    }
}
