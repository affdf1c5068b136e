use anyhow::Result;
use planning_center::api::{ApiError, AuthManager, CredentialProvider, Credentials};
use planning_center::{ClientConfig, PlanningCenterClient};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::{body_string_contains, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use super::support::{init_logging, test_client};

fn oauth_manager(server: &MockServer) -> Result<AuthManager> {
    let credentials = Credentials::oauth_client("cid", "csecret", Some(format!("{}/oauth/token", server.uri())))?;
    Ok(AuthManager::new(credentials, reqwest::Client::new()))
}

#[tokio::test]
async fn test_personal_access_token_header() -> Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/people/v2/me"))
        .and(header("authorization", "Basic YXBwOnNlY3JldA=="))
        .and(header("accept", "application/json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"data": {"type": "Person", "id": "1"}})))
        .expect(1)
        .mount(&server)
        .await;

    let client = test_client(&server)?;
    let me: serde_json::Value = client.get("people/v2/me").await?;
    assert_eq!(me["id"], "1");
    Ok(())
}

#[tokio::test]
async fn test_oauth_refresh_is_single_flight() -> Result<()> {
    init_logging();
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/oauth/token"))
        .and(body_string_contains("grant_type=client_credentials"))
        .and(body_string_contains("client_id=cid"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"access_token": "tok-1", "token_type": "Bearer", "expires_in": 7200}))
                .set_delay(Duration::from_millis(100)),
        )
        .expect(1)
        .mount(&server)
        .await;

    let manager = Arc::new(oauth_manager(&server)?);
    let mut handles = Vec::new();
    for _ in 0..10 {
        let manager = manager.clone();
        handles.push(tokio::spawn(async move { manager.auth_header().await }));
    }

    for handle in handles {
        assert_eq!(handle.await??, "Bearer tok-1");
    }
    // Cached afterwards
    assert_eq!(manager.auth_header().await?, "Bearer tok-1");
    server.verify().await;
    Ok(())
}

#[tokio::test]
async fn test_provider_token_type_is_kept() -> Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/oauth/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"access_token": "abc", "token_type": "Token"})))
        .mount(&server)
        .await;

    let manager = oauth_manager(&server)?;
    assert_eq!(manager.auth_header().await?, "Token abc");
    Ok(())
}

#[tokio::test]
async fn test_missing_access_token() -> Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/oauth/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"token_type": "Bearer", "expires_in": 3600})))
        .mount(&server)
        .await;

    let manager = oauth_manager(&server)?;
    match manager.auth_header().await {
        Err(ApiError::Authentication { message }) => assert!(message.contains("missing access_token")),
        other => panic!("expected an authentication error, got {:?}", other),
    }
    Ok(())
}

#[tokio::test]
async fn test_rejected_token_request() -> Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/oauth/token"))
        .respond_with(ResponseTemplate::new(401).set_body_string("invalid_client"))
        .mount(&server)
        .await;

    let manager = oauth_manager(&server)?;
    match manager.auth_header().await {
        Err(ApiError::Authentication { message }) => assert!(message.contains("invalid_client")),
        other => panic!("expected an authentication error, got {:?}", other),
    }
    Ok(())
}

#[tokio::test]
async fn test_unauthorized_response_drops_cached_token() -> Result<()> {
    init_logging();
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/oauth/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"access_token": "tok", "expires_in": 7200})))
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/people/v2/me"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({"errors": [{"title": "Unauthorized"}]})))
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/people/v2/me"))
        .and(header("authorization", "Bearer tok"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"data": {"type": "Person", "id": "1"}})))
        .expect(1)
        .mount(&server)
        .await;

    let mut config = ClientConfig::default();
    config.base_url = server.uri();
    config.auth.client_id = Some("cid".to_string());
    config.auth.client_secret = Some("csecret".to_string());
    config.auth.token_url = Some(format!("{}/oauth/token", server.uri()));
    let client = PlanningCenterClient::new(config)?;

    let first = client.get_json("people/v2/me").await;
    assert!(matches!(first, Err(ApiError::Authentication { .. })));

    client.get_json("people/v2/me").await?;
    server.verify().await;
    Ok(())
}
