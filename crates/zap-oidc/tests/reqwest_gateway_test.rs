//! The reqwest gateway against a local HTTP server.

use serde_json::json;
use wiremock::matchers::{body_string, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};
use zap_oidc::http::post_form;
use zap_oidc::{HttpError, HttpGateway, HttpGatewayConfig, ReqwestGateway};

#[tokio::test]
async fn test_get_returns_json() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/jwks"))
        .and(header("Accept", "application/json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"keys": []})))
        .mount(&server)
        .await;

    let gateway = ReqwestGateway::with_defaults().unwrap();
    let value = gateway
        .get(&format!("{}/jwks", server.uri()), &[])
        .await
        .unwrap();
    assert_eq!(value, json!({"keys": []}));
}

#[tokio::test]
async fn test_post_form_sends_body_and_content_type() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/token"))
        .and(header("Content-Type", "application/x-www-form-urlencoded"))
        .and(body_string("grant_type=refresh_token&refresh_token=rt"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"access_token": "at"})))
        .expect(1)
        .mount(&server)
        .await;

    let gateway = ReqwestGateway::with_defaults().unwrap();
    let value = post_form(
        &gateway,
        &format!("{}/token", server.uri()),
        "grant_type=refresh_token&refresh_token=rt".to_string(),
    )
    .await
    .unwrap();
    assert_eq!(value["access_token"], "at");
}

#[tokio::test]
async fn test_error_status_with_json_body_is_returned() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(
            ResponseTemplate::new(400).set_body_json(json!({"error": "invalid_grant"})),
        )
        .mount(&server)
        .await;

    let gateway = ReqwestGateway::with_defaults().unwrap();
    let value = post_form(&gateway, &format!("{}/token", server.uri()), String::new())
        .await
        .unwrap();
    assert_eq!(value["error"], "invalid_grant");
}

#[tokio::test]
async fn test_error_status_without_json_body() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(503).set_body_string("unavailable"))
        .mount(&server)
        .await;

    let gateway = ReqwestGateway::with_defaults().unwrap();
    let err = gateway.get(&server.uri(), &[]).await.unwrap_err();
    assert!(matches!(err, HttpError::Network(ref msg) if msg.contains("503")));
}

#[tokio::test]
async fn test_success_without_json_body() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html></html>"))
        .mount(&server)
        .await;

    let gateway = ReqwestGateway::with_defaults().unwrap();
    let err = gateway.get(&server.uri(), &[]).await.unwrap_err();
    assert!(matches!(err, HttpError::Parse(_)));
}

#[tokio::test]
async fn test_response_size_limit() {
    let server = MockServer::start().await;
    let large = json!({"padding": "x".repeat(2048)});
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_json(large))
        .mount(&server)
        .await;

    let gateway =
        ReqwestGateway::new(HttpGatewayConfig::new().with_max_response_size(1024)).unwrap();
    let err = gateway.get(&server.uri(), &[]).await.unwrap_err();
    assert!(matches!(err, HttpError::ResponseTooLarge { max_size: 1024 }));
}

#[tokio::test]
async fn test_connection_refused() {
    let gateway = ReqwestGateway::with_defaults().unwrap();
    let err = gateway
        .get("http://127.0.0.1:9/unreachable", &[])
        .await
        .unwrap_err();
    assert!(matches!(err, HttpError::Network(_)));
}
