//! Integration tests for HttpFetcher with the DSSE verifier.

mod common;

use std::sync::Arc;
use std::time::Duration;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use chrono::Duration as ChronoDuration;
use common::{cache_config, t0, Publisher};
use dcc_cache::{
    sign_hash_statement, CacheError, DsseSignatureVerifier, HttpFetcher, RemoteFetcher,
    SignedHashStatement, TrustFailure,
};
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, ResponseTemplate};

fn fetcher(publisher: &Publisher) -> HttpFetcher {
    let config = cache_config(&publisher.endpoint("trustlist"), "trustlist");
    HttpFetcher::new(&config, Duration::from_secs(5), Arc::new(DsseSignatureVerifier))
        .expect("failed to create fetcher")
}

async fn serve_signature(publisher: &Publisher, body: Vec<u8>) {
    Mock::given(method("GET"))
        .and(path("/trustlist/sig"))
        .and(header("accept", "application/octet-stream"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(body))
        .mount(&publisher.server)
        .await;
}

#[tokio::test]
async fn test_fetch_verified_hash() {
    let publisher = Publisher::start().await;
    serve_signature(&publisher, publisher.signature(b"content-hash")).await;

    let hash = fetcher(&publisher)
        .fetch_verified_hash(t0())
        .await
        .expect("verification failed");
    assert_eq!(hash, b"content-hash");
}

#[tokio::test]
async fn test_expired_signature() {
    let publisher = Publisher::start().await;
    serve_signature(&publisher, publisher.signature(b"content-hash")).await;

    let err = fetcher(&publisher)
        .fetch_verified_hash(t0() + ChronoDuration::days(31))
        .await
        .unwrap_err();
    assert_eq!(err.trust_failure(), Some(TrustFailure::SignatureExpired));
}

#[tokio::test]
async fn test_signature_not_yet_valid() {
    let publisher = Publisher::start().await;
    let statement = SignedHashStatement {
        content_hash: BASE64.encode(b"content-hash"),
        issued_at: t0() + ChronoDuration::hours(1),
        expires_at: t0() + ChronoDuration::days(1),
    };
    serve_signature(&publisher, sign_hash_statement(&publisher.key, &statement).unwrap()).await;

    let err = fetcher(&publisher).fetch_verified_hash(t0()).await.unwrap_err();
    assert_eq!(err.trust_failure(), Some(TrustFailure::SignatureNotYetValid));
}

#[tokio::test]
async fn test_tampered_signature() {
    let publisher = Publisher::start().await;
    let mut envelope: serde_json::Value =
        serde_json::from_slice(&publisher.signature(b"content-hash")).unwrap();
    let forged = serde_json::json!({
        "content_hash": BASE64.encode(b"other"),
        "issued_at": t0() - ChronoDuration::hours(1),
        "expires_at": t0() + ChronoDuration::days(1),
    });
    envelope["payload"] = BASE64.encode(forged.to_string()).into();
    serve_signature(&publisher, serde_json::to_vec(&envelope).unwrap()).await;

    let err = fetcher(&publisher).fetch_verified_hash(t0()).await.unwrap_err();
    assert!(err.is_trust_service_error());
    assert_eq!(err.trust_failure(), Some(TrustFailure::UntrustedSigner));
}

#[tokio::test]
async fn test_garbage_signature_is_malformed() {
    let publisher = Publisher::start().await;
    serve_signature(&publisher, b"<html>maintenance</html>".to_vec()).await;

    let err = fetcher(&publisher).fetch_verified_hash(t0()).await.unwrap_err();
    assert_eq!(err.trust_failure(), Some(TrustFailure::Malformed));
}

#[tokio::test]
async fn test_non_200_statuses() {
    for status in [204u16, 304, 404, 500, 503] {
        let publisher = Publisher::start().await;
        publisher.fail_with(status).await;

        let err = fetcher(&publisher).fetch_payload().await.unwrap_err();
        assert!(
            matches!(err, CacheError::TrustService { kind: TrustFailure::Status(code), .. } if code == status),
            "status {}: {:?}",
            status,
            err
        );
    }
}

#[tokio::test]
async fn test_fetch_payload_returns_raw_bytes() {
    let publisher = Publisher::start().await;
    Mock::given(method("GET"))
        .and(path("/trustlist/bin"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![0xa1, 0x00, 0x01]))
        .expect(1)
        .mount(&publisher.server)
        .await;

    let body = fetcher(&publisher).fetch_payload().await.unwrap();
    assert_eq!(body, vec![0xa1, 0x00, 0x01]);
}
