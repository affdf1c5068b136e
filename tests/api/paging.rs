use anyhow::Result;
use futures::StreamExt;
use planning_center::api::{ApiError, PagedResult};
use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use super::support::{person, test_client};

const PEOPLE: &str = "/people/v2/people";

fn page_body(server: &MockServer, ids: &[u32], offset: u32, next: Option<u32>) -> Value {
    let link = |offset: u32| format!("{}{}?per_page=2&offset={}", server.uri(), PEOPLE, offset);
    let mut links = json!({"self": link(offset)});
    if let Some(next) = next {
        links["next"] = json!(link(next));
    }
    if offset > 0 {
        links["prev"] = json!(link(offset - 2));
    }
    json!({
        "data": ids.iter().map(|id| person(*id, &format!("person-{}", id))).collect::<Vec<_>>(),
        "meta": {"total_count": 5, "count": ids.len(), "per_page": 2, "offset": offset},
        "links": links
    })
}

/// Three pages of {2, 2, 1} people; later pages are matched on their offset
async fn mount_people(server: &MockServer) {
    for (ids, offset, next) in [(&[3u32, 4][..], 2, Some(4)), (&[5][..], 4, None)] {
        Mock::given(method("GET"))
            .and(path(PEOPLE))
            .and(query_param("offset", offset.to_string()))
            .respond_with(ResponseTemplate::new(200).set_body_json(page_body(server, ids, offset, next)))
            .expect(1)
            .named(format!("people offset {}", offset))
            .mount(server)
            .await;
    }
    Mock::given(method("GET"))
        .and(path(PEOPLE))
        .respond_with(ResponseTemplate::new(200).set_body_json(page_body(server, &[1, 2], 0, Some(2))))
        .expect(1)
        .named("people first page")
        .mount(server)
        .await;
}

fn ids(items: &[Value]) -> Vec<&str> {
    items.iter().filter_map(|item| item["id"].as_str()).collect()
}

#[tokio::test]
async fn test_get_all_remaining_in_page_order() -> Result<()> {
    let server = MockServer::start().await;
    mount_people(&server).await;

    let client = test_client(&server)?;
    let people: Vec<Value> = client.query("people/v2/people").per_page(2).all(&client).await?;

    assert_eq!(ids(&people), vec!["1", "2", "3", "4", "5"]);
    server.verify().await;
    Ok(())
}

#[tokio::test]
async fn test_page_navigation() -> Result<()> {
    let server = MockServer::start().await;
    mount_people(&server).await;

    let client = test_client(&server)?;
    let first: PagedResult<Value> = client.query("people/v2/people").per_page(2).execute(&client).await?;
    assert_eq!(first.total_count(), Some(5));
    assert!(!first.has_previous());
    assert!(matches!(first.previous_page().await, Err(ApiError::InvalidOperation(_))));

    let second = first.next_page().await?;
    assert_eq!(ids(&second.items), vec!["3", "4"]);
    assert!(second.has_previous());
    assert_eq!(second.meta.as_ref().and_then(|m| m.current_page()), Some(2));

    let last = second.next_page().await?;
    assert_eq!(ids(&last.items), vec!["5"]);
    assert!(!last.has_next());
    assert!(matches!(last.next_page().await, Err(ApiError::InvalidOperation(_))));
    assert!(last.next_page_or_none().await?.is_none());
    Ok(())
}

#[tokio::test]
async fn test_lazy_pages_resume_after_cancellation() -> Result<()> {
    let server = MockServer::start().await;
    mount_people(&server).await;

    let client = test_client(&server)?;
    let first: PagedResult<Value> = client.query("people/v2/people").per_page(2).execute(&client).await?;

    let token = CancellationToken::new();
    let mut pages = first.into_pages().with_cancellation(token.clone());
    let mut seen = Vec::new();

    // The buffered first page is handed out without touching the network
    while seen.len() < 2 {
        seen.extend(pages.next().await?);
    }

    token.cancel();
    assert!(matches!(pages.next().await, Err(ApiError::Cancelled)));
    assert!(!pages.is_exhausted());

    pages.set_cancellation(CancellationToken::new());
    while let Some(item) = pages.next().await? {
        seen.push(item);
    }

    assert_eq!(ids(&seen), vec!["1", "2", "3", "4", "5"]);
    assert!(pages.is_exhausted());
    // Each page was requested exactly once
    server.verify().await;
    Ok(())
}

#[tokio::test]
async fn test_stream_ends_after_error() -> Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(PEOPLE))
        .and(query_param("offset", "2"))
        .respond_with(ResponseTemplate::new(403))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(PEOPLE))
        .respond_with(ResponseTemplate::new(200).set_body_json(page_body(&server, &[1, 2], 0, Some(2))))
        .mount(&server)
        .await;

    let client = test_client(&server)?;
    let first: PagedResult<Value> = client.query("people/v2/people").execute(&client).await?;
    let results: Vec<_> = first.into_stream().collect().await;

    assert_eq!(results.len(), 3);
    assert!(results[0].is_ok() && results[1].is_ok());
    assert!(matches!(results[2], Err(ApiError::Authorization { .. })));
    Ok(())
}

#[tokio::test]
async fn test_empty_page() -> Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(PEOPLE))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"data": [], "meta": {"total_count": 0}})))
        .expect(1)
        .mount(&server)
        .await;

    let client = test_client(&server)?;
    let page: PagedResult<Value> = client.query("people/v2/people").execute(&client).await?;
    assert!(page.is_empty());
    assert!(!page.has_next());
    assert!(page.get_all_remaining().await?.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_self_referencing_next_link_stops_the_walk() -> Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(PEOPLE))
        .and(query_param("offset", "2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(page_body(&server, &[3, 4], 2, Some(2))))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(PEOPLE))
        .respond_with(ResponseTemplate::new(200).set_body_json(page_body(&server, &[1, 2], 0, Some(2))))
        .expect(1)
        .mount(&server)
        .await;

    let client = test_client(&server)?;
    let result = client.query("people/v2/people").per_page(2).all::<Value>(&client).await;

    assert!(matches!(result, Err(ApiError::InvalidOperation(_))));
    server.verify().await;
    Ok(())
}
