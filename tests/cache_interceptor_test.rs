mod common;

use common::{client, get, MockNet, Reply, BASE_URL};
use netpipe::base::status;
use netpipe::cache::CacheInterceptor;
use netpipe::{Client, Headers, NetError, Request};
use std::io::Write;
use tempfile::TempDir;

fn cached_client(net: &MockNet, dir: &TempDir) -> Client {
    client(net).cache(dir.path(), 1 << 20).build().unwrap()
}

fn with_max_age(path: &str, max_age: &str) -> Request {
    Request::builder()
        .path(path)
        .header("X-Max-Age", max_age)
        .build()
        .unwrap()
}

async fn fetch_text(client: &Client, request: Request) -> (i32, String) {
    let response = client.execute(request).await.unwrap();
    let code = response.code();
    let text = match response.body() {
        Some(_) => response.text().await.unwrap(),
        None => String::new(),
    };
    (code, text)
}

fn stable_key(client: &Client, request: &Request) -> String {
    CacheInterceptor::new(client.cache().unwrap().clone())
        .base_url(BASE_URL)
        .stable_key(request)
        .unwrap()
}

/// Persist an entry the way the cache stage lays it out.
fn seed(client: &Client, request: &Request, saved_ms: i64, body: &str) {
    let cache = client.cache().unwrap().clone();
    let key = stable_key(client, request);
    let mut headers = Headers::new();
    headers.insert("Content-Type", "text/plain").unwrap();
    headers.insert("X-Cache-Date", &saved_ms.to_string()).unwrap();

    let body_entry = cache.entry(&format!("{}_body", key)).unwrap();
    body_entry
        .open_writer()
        .unwrap()
        .unwrap()
        .write_all(body.as_bytes())
        .unwrap();
    let header_entry = cache.entry(&format!("{}_header", key)).unwrap();
    header_entry
        .open_writer()
        .unwrap()
        .unwrap()
        .write_all(headers.to_multiline().as_bytes())
        .unwrap();
}

#[tokio::test]
async fn test_fresh_entry_is_served_without_network() {
    let dir = TempDir::new().unwrap();
    let net = MockNet::new();
    net.reply(Reply::ok("first"));
    let client = cached_client(&net, &dir);

    assert_eq!(
        fetch_text(&client, with_max_age("news", "60")).await,
        (200, "first".to_string())
    );
    net.reply(Reply::ok("second"));
    assert_eq!(
        fetch_text(&client, with_max_age("news", "60")).await,
        (200, "first".to_string())
    );
    assert_eq!(net.connects(), 1);
}

#[tokio::test]
async fn test_forever_ignores_age() {
    let dir = TempDir::new().unwrap();
    let net = MockNet::new();
    let client = cached_client(&net, &dir);
    let request = with_max_age("archive", "-1");
    seed(&client, &request, 0, "ancient");

    assert_eq!(
        fetch_text(&client, request).await,
        (200, "ancient".to_string())
    );
    assert_eq!(net.connects(), 0);

    // A bounded max age treats the same entry as stale.
    assert_eq!(
        fetch_text(&client, with_max_age("archive", "60")).await,
        (200, "hello".to_string())
    );
    assert_eq!(net.connects(), 1);
}

#[tokio::test]
async fn test_no_cache_always_hits_network() {
    let dir = TempDir::new().unwrap();
    let net = MockNet::new();
    let client = cached_client(&net, &dir);

    fetch_text(&client, get("feed")).await;
    fetch_text(&client, get("feed")).await;
    fetch_text(&client, with_max_age("feed", "0")).await;
    assert_eq!(net.connects(), 3);
}

#[tokio::test]
async fn test_network_failure_falls_back() {
    let dir = TempDir::new().unwrap();
    let net = MockNet::new();
    net.reply(Reply::ok("saved"));
    let client = cached_client(&net, &dir);
    fetch_text(&client, get("profile")).await;

    net.reply(Reply::fail(NetError::ConnectionTimedOut));
    assert_eq!(
        fetch_text(&client, get("profile")).await,
        (200, "saved".to_string())
    );

    let response = client.execute(get("unknown")).await.unwrap();
    assert_eq!(response.code(), status::CONNECT_ERROR);
    assert_eq!(response.message(), status::CONNECT_ERROR_MSG);
    assert!(response.body().is_none());
}

#[tokio::test]
async fn test_error_status_falls_back() {
    let dir = TempDir::new().unwrap();
    let net = MockNet::new();
    let client = cached_client(&net, &dir);
    fetch_text(&client, get("page")).await;

    net.reply(Reply::status(500, "Internal Server Error"));
    assert_eq!(
        fetch_text(&client, get("page")).await,
        (200, "hello".to_string())
    );
    let (code, _) = fetch_text(&client, get("other")).await;
    assert_eq!(code, status::CONNECT_ERROR);
}

#[tokio::test]
async fn test_force_cached_never_connects() {
    let dir = TempDir::new().unwrap();
    let net = MockNet::new();
    {
        let warm = cached_client(&net, &dir);
        fetch_text(&warm, get("offline")).await;
    }
    assert_eq!(net.connects(), 1);

    let client = client(&net)
        .cache(dir.path(), 1 << 20)
        .force_cached(true)
        .build()
        .unwrap();
    assert_eq!(
        fetch_text(&client, get("offline")).await,
        (200, "hello".to_string())
    );
    let (code, _) = fetch_text(&client, get("never-seen")).await;
    assert_eq!(code, status::CONNECT_ERROR);
    assert_eq!(net.connects(), 1);
}

#[tokio::test]
async fn test_body_methods_bypass_cache() {
    let dir = TempDir::new().unwrap();
    let net = MockNet::new();
    let client = cached_client(&net, &dir);

    let post = || {
        Request::builder()
            .post()
            .path("submit")
            .add("k", "v")
            .header("X-Max-Age", "-1")
            .build()
            .unwrap()
    };
    fetch_text(&client, post()).await;
    fetch_text(&client, post()).await;
    assert_eq!(net.connects(), 2);
    assert!(client.cache().unwrap().is_empty());

    net.reply(Reply::status(503, "Service Unavailable"));
    let (code, _) = fetch_text(&client, post()).await;
    assert_eq!(code, 503);
}

#[tokio::test]
async fn test_ignored_query_names_share_entry() {
    let dir = TempDir::new().unwrap();
    let net = MockNet::new();
    let client = client(&net)
        .cache(dir.path(), 1 << 20)
        .ignored_query_names(["ts"])
        .build()
        .unwrap();

    let request = |ts: &str| {
        Request::builder()
            .path("search")
            .add("q", "rust")
            .add("ts", ts)
            .header("X-Max-Age", "60")
            .build()
            .unwrap()
    };
    fetch_text(&client, request("1")).await;
    fetch_text(&client, request("2")).await;
    assert_eq!(net.connects(), 1);
}

#[tokio::test]
async fn test_content_length_matches_stored_body() {
    let dir = TempDir::new().unwrap();
    let net = MockNet::new();
    net.reply(Reply::ok("twelve bytes").header("Content-Length", "999"));
    let client = cached_client(&net, &dir);

    let response = client.execute(get("sized")).await.unwrap();
    assert_eq!(response.headers().content_length(), Some(12));
    assert!(!response.headers().contains("X-Cache-Date"));

    let cached = client
        .execute(with_max_age("sized", "60"))
        .await
        .unwrap();
    assert_eq!(cached.headers().content_length(), Some(12));
    assert!(cached.headers().contains("X-Cache-Date"));
    assert_eq!(cached.text().await.unwrap(), "twelve bytes");
}

#[tokio::test]
async fn test_busy_header_keeps_cached_pair() {
    let dir = TempDir::new().unwrap();
    let net = MockNet::new();
    let client = cached_client(&net, &dir);
    let cache = client.cache().unwrap().clone();
    let key = stable_key(&client, &get("doc"));

    net.reply(Reply::ok("hello"));
    fetch_text(&client, get("doc")).await;

    // A reader on the header defers the next header commit.
    let header = cache.entry(&format!("{}_header", key)).unwrap();
    let reader = header.open_reader().unwrap().unwrap();
    net.reply(Reply::ok("world"));
    fetch_text(&client, get("doc")).await;

    // The header is still pending, so this write is dropped as a whole.
    net.reply(Reply::ok("third"));
    assert_eq!(
        fetch_text(&client, get("doc")).await,
        (200, "third".to_string())
    );
    drop(reader);

    assert_eq!(
        fetch_text(&client, with_max_age("doc", "-1")).await,
        (200, "world".to_string())
    );
    assert!(!cache.directory().join(format!("{}_body.tmp", key)).exists());
}

#[tokio::test]
async fn test_unreadable_entry_is_dropped() {
    let dir = TempDir::new().unwrap();
    let net = MockNet::new();
    let client = cached_client(&net, &dir);
    let cache = client.cache().unwrap().clone();
    let key = stable_key(&client, &get("report"));

    net.reply(Reply::ok("cached"));
    fetch_text(&client, get("report")).await;

    // Reading a directory fails with an I/O error.
    let body_file = cache.directory().join(format!("{}_body", key));
    std::fs::remove_file(&body_file).unwrap();
    std::fs::create_dir(&body_file).unwrap();

    net.reply(Reply::fail(NetError::ConnectionAborted));
    let response = client.execute(with_max_age("report", "-1")).await.unwrap();
    assert_eq!(response.code(), status::CONNECT_ERROR);
    assert!(!cache.directory().join(format!("{}_header", key)).exists());
    assert_eq!(cache.entry(&format!("{}_body", key)).unwrap().len(), 0);

    net.reply(Reply::ok("fresh"));
    assert_eq!(
        fetch_text(&client, with_max_age("report", "-1")).await,
        (200, "fresh".to_string())
    );
    assert_eq!(net.connects(), 3);
}
