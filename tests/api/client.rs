use anyhow::Result;
use planning_center::PlanningCenterClient;
use planning_center::api::ApiError;
use planning_center::api::constants::USER_AGENT;
use serde_json::{Value, json};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{body_partial_json, header, header_exists, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use super::support::{test_client, test_config};

#[tokio::test]
async fn test_server_errors_are_retried() -> Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/people/v2/people"))
        .respond_with(ResponseTemplate::new(500))
        .up_to_n_times(2)
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/people/v2/people"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"data": []})))
        .expect(1)
        .mount(&server)
        .await;

    let client = test_client(&server)?;
    let body = client.get_json("people/v2/people").await?;
    assert_eq!(body, json!({"data": []}));
    server.verify().await;
    Ok(())
}

#[tokio::test]
async fn test_last_error_surfaces_unchanged() -> Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(502).set_body_json(json!({"errors": [{"detail": "bad gateway"}]})))
        .expect(3)
        .mount(&server)
        .await;

    let client = test_client(&server)?;
    match client.get_json("people/v2/people").await {
        Err(ApiError::Server { status, message }) => {
            assert_eq!(status, 502);
            assert_eq!(message, "bad gateway");
        }
        other => panic!("expected a server error, got {:?}", other),
    }
    Ok(())
}

#[tokio::test]
async fn test_not_found_is_not_retried() -> Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(404))
        .expect(2)
        .mount(&server)
        .await;

    let client = test_client(&server)?;
    let result = client.get::<Value>("people/v2/people/404").await;
    assert!(result.as_ref().is_err_and(ApiError::is_not_found));
    assert!(client.get_optional::<Value>("people/v2/people/404").await.is_ok());
    Ok(())
}

#[tokio::test]
async fn test_rate_limited_reports_retry_after() -> Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/with-header"))
        .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "120"))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/without-header"))
        .respond_with(ResponseTemplate::new(429))
        .expect(1)
        .mount(&server)
        .await;

    let client = test_client(&server)?;
    let err = client.get_json("with-header").await.unwrap_err();
    assert_eq!(err.retry_after(), Some(Duration::from_secs(120)));
    let err = client.get_json("without-header").await.unwrap_err();
    assert_eq!(err.retry_after(), Some(Duration::from_secs(60)));
    Ok(())
}

#[tokio::test]
async fn test_validation_details() -> Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/people/v2/people"))
        .respond_with(ResponseTemplate::new(422).set_body_json(json!({
            "errors": [{
                "status": "422",
                "title": "Unprocessable Entity",
                "detail": "First name can't be blank",
                "source": {"pointer": "/data/attributes/first_name"}
            }]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = test_client(&server)?;
    let body = planning_center::api::ResourceBody::new("Person").attributes(&json!({"first_name": ""}))?;
    let err = client.create::<Value>("people/v2/people", &body).await.unwrap_err();

    assert_eq!(err.status(), Some(422));
    assert_eq!(err.details().len(), 1);
    assert_eq!(
        err.details()[0].source.as_ref().and_then(|s| s.pointer.as_deref()),
        Some("/data/attributes/first_name")
    );
    assert!(err.to_string().contains("First name can't be blank"));
    Ok(())
}

#[tokio::test]
async fn test_malformed_success_body() -> Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>not json</html>"))
        .expect(1)
        .mount(&server)
        .await;

    let client = test_client(&server)?;
    match client.get_json("people/v2/people").await {
        Err(ApiError::General { status, .. }) => assert_eq!(status, Some(200)),
        other => panic!("expected a general error, got {:?}", other),
    }
    Ok(())
}

#[tokio::test]
async fn test_request_headers_and_bodies() -> Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("PATCH"))
        .and(path("/people/v2/people/7"))
        .and(header("content-type", "application/json"))
        .and(header("user-agent", USER_AGENT))
        .and(header_exists("x-correlation-id"))
        .and(body_partial_json(json!({"data": {"type": "Person", "id": "7", "attributes": {"last_name": "Lovelace"}}})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"data": {"type": "Person", "id": "7"}})))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .and(path("/people/v2/people/7"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let client = test_client(&server)?;
    let body = planning_center::api::ResourceBody::new("Person")
        .id("7")
        .attributes(&json!({"last_name": "Lovelace"}))?;
    let updated: Value = client.update("people/v2/people/7", &body).await?;
    assert_eq!(updated["id"], "7");
    client.delete("people/v2/people/7").await?;
    Ok(())
}

#[tokio::test]
async fn test_cancel_during_backoff() -> Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(503))
        .expect(1)
        .mount(&server)
        .await;

    let mut config = test_config(&server);
    config.retry.base_delay_ms = 10_000;
    let token = CancellationToken::new();
    let client = PlanningCenterClient::new(config)?.with_cancellation(token.clone());

    let canceller = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        token.cancel();
    });

    let started = std::time::Instant::now();
    let result = client.get_json("people/v2/people").await;
    canceller.await?;

    assert!(matches!(result, Err(ApiError::Cancelled)));
    assert!(started.elapsed() < Duration::from_secs(5));
    Ok(())
}

#[tokio::test]
async fn test_deadline_exceeded() -> Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"data": []}))
                .set_delay(Duration::from_secs(2)),
        )
        .mount(&server)
        .await;

    let client = test_client(&server)?.with_deadline(Duration::from_millis(100));
    let result = client.get_json("people/v2/people").await;
    assert!(matches!(result, Err(ApiError::DeadlineExceeded(_))));
    Ok(())
}
