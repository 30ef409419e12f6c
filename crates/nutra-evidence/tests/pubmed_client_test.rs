//! Integration tests for the PubMed client.
//!
//! These tests run against a wiremock server, verifying the esearch
//! request shape and the count parsing without touching NCBI.

use nutra_core::{Error, LiteratureAuthority};
use nutra_evidence::PubMedClient;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn client_for(server: &MockServer) -> PubMedClient {
    // High rps so the limiter never stalls the test
    PubMedClient::with_config(server.uri(), None, 100)
}

#[tokio::test]
async fn test_evidence_count_builds_esearch_request() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/esearch.fcgi"))
        .and(query_param("db", "pubmed"))
        .and(query_param("retmode", "json"))
        .and(query_param("retmax", "0"))
        .and(query_param(
            "term",
            "\"ashwagandha\"[Title/Abstract] AND (supplement OR supplementation)",
        ))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "esearchresult": {"count": "1542", "retmax": "0", "idlist": []}
        })))
        .expect(1)
        .mount(&mock_server)
        .await;

    let client = client_for(&mock_server);

    let count = client.evidence_count("ashwagandha").await.unwrap();
    assert_eq!(count, 1542);
}

#[tokio::test]
async fn test_evidence_count_zero_is_ok() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/esearch.fcgi"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "esearchresult": {"count": "0"}
        })))
        .expect(1)
        .mount(&mock_server)
        .await;

    let client = client_for(&mock_server);

    // Zero evidence is a definitive business answer, not an error
    let count = client.evidence_count("xyzzy placebo").await.unwrap();
    assert_eq!(count, 0);
}

#[tokio::test]
async fn test_api_key_is_sent_when_configured() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/esearch.fcgi"))
        .and(query_param("api_key", "test-key"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "esearchresult": {"count": "7"}
        })))
        .expect(1)
        .mount(&mock_server)
        .await;

    let client = PubMedClient::with_config(mock_server.uri(), Some("test-key".to_string()), 100);

    let count = client.evidence_count("zinc").await.unwrap();
    assert_eq!(count, 7);
}

#[tokio::test]
async fn test_server_error_is_transient() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/esearch.fcgi"))
        .respond_with(ResponseTemplate::new(502).set_body_string("bad gateway"))
        .expect(1)
        .mount(&mock_server)
        .await;

    let client = client_for(&mock_server);

    let err = client
        .evidence_count("ashwagandha")
        .await
        .expect_err("server error should surface");
    assert!(matches!(err, Error::Request(_)));
    assert!(err.is_transient(), "Transport failures should be retryable");
}

#[tokio::test]
async fn test_malformed_count_is_error() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/esearch.fcgi"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "esearchresult": {"count": "not-a-number"}
        })))
        .expect(1)
        .mount(&mock_server)
        .await;

    let client = client_for(&mock_server);

    let err = client
        .evidence_count("ashwagandha")
        .await
        .expect_err("malformed count should surface");
    assert!(matches!(err, Error::Request(_)));
}

#[tokio::test]
async fn test_missing_esearchresult_is_error() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/esearch.fcgi"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "error": "invalid query"
        })))
        .expect(1)
        .mount(&mock_server)
        .await;

    let client = client_for(&mock_server);

    let result = client.evidence_count("ashwagandha").await;
    assert!(result.is_err());
}
