//! Network-backed integration tests for the HTTP cache (§4.8),
//! exercising the conditional-revalidation contract against a real
//! HTTP server via `wiremock`.

use neuroforge::httpcache::{CancelToken, HttpCache};
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[tokio::test(flavor = "multi_thread")]
async fn fresh_fetch_downloads_and_caches_the_body() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/file.bin"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_bytes(b"payload-v1".to_vec())
                .insert_header("ETag", "\"v1\""),
        )
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let cache = HttpCache::new(dir.path()).unwrap();
    let cancel = CancelToken::new();
    let url = format!("{}/file.bin", server.uri());

    let fetched = cache.get(&url, false, None, &cancel, None).unwrap();
    assert!(!fetched.from_cache);
    assert_eq!(std::fs::read(&fetched.path).unwrap(), b"payload-v1");
}

#[tokio::test(flavor = "multi_thread")]
async fn unchanged_resource_revalidates_with_304_and_keeps_cached_body() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/file.bin"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_bytes(b"payload-v1".to_vec())
                .insert_header("ETag", "\"v1\""),
        )
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/file.bin"))
        .and(header("If-None-Match", "\"v1\""))
        .respond_with(ResponseTemplate::new(304))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let cache = HttpCache::new(dir.path()).unwrap();
    let cancel = CancelToken::new();
    let url = format!("{}/file.bin", server.uri());

    let first = cache.get(&url, false, None, &cancel, None).unwrap();
    assert!(!first.from_cache);

    let second = cache.get(&url, false, None, &cancel, None).unwrap();
    assert!(second.from_cache);
    assert_eq!(std::fs::read(&second.path).unwrap(), b"payload-v1");
}

#[tokio::test(flavor = "multi_thread")]
async fn changed_resource_revalidates_with_a_fresh_body() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/file.bin"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_bytes(b"payload-v1".to_vec())
                .insert_header("ETag", "\"v1\""),
        )
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/file.bin"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_bytes(b"payload-v2".to_vec())
                .insert_header("ETag", "\"v2\""),
        )
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let cache = HttpCache::new(dir.path()).unwrap();
    let cancel = CancelToken::new();
    let url = format!("{}/file.bin", server.uri());

    let first = cache.get(&url, false, None, &cancel, None).unwrap();
    assert_eq!(std::fs::read(&first.path).unwrap(), b"payload-v1");

    let second = cache.get(&url, false, None, &cancel, None).unwrap();
    assert!(!second.from_cache);
    assert_eq!(std::fs::read(&second.path).unwrap(), b"payload-v2");
}

/// A `file`/`files` entry's per-source `retry` (§3 `FileSource`) overrides
/// the cache's default attempt count; `expect(1)` fails the test if the
/// cache retries past the single attempt requested here.
#[tokio::test(flavor = "multi_thread")]
async fn per_source_retry_override_bounds_attempt_count() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/always-down.bin"))
        .respond_with(ResponseTemplate::new(503))
        .expect(1)
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let cache = HttpCache::new(dir.path()).unwrap();
    let cancel = CancelToken::new();
    let url = format!("{}/always-down.bin", server.uri());

    let err = cache.get(&url, false, Some(1), &cancel, None).unwrap_err();
    assert!(err.to_string().contains("503"));
}
