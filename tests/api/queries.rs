use anyhow::Result;
use planning_center::api::query::{CountComparison, Filter, OrderBy, QueryDescription};
use planning_center::api::PagedResult;
use serde_json::{Value, json};
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use super::support::{person, test_client};

async fn mount_empty_people(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/people/v2/people"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"data": []})))
        .mount(server)
        .await;
}

async fn last_query(server: &MockServer) -> Option<String> {
    let requests = server.received_requests().await?;
    requests.last()?.url.query().map(str::to_string)
}

#[tokio::test]
async fn test_encoded_query_reaches_the_server() -> Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/people/v2/people"))
        .and(query_param("where[last_name]", "O'Brien & Sons"))
        .and(query_param("where[membership][in][]", "Member"))
        .and(query_param("include", "households.members,emails"))
        .and(query_param("order", "last_name,created_at desc"))
        .and(query_param("per_page", "25"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"data": [person(1, "Ada")]})))
        .expect(1)
        .mount(&server)
        .await;

    let client = test_client(&server)?;
    let page: PagedResult<Value> = client
        .query("people/v2/people")
        .filter(Filter::eq("last_name", "O'Brien & Sons"))
        .filter(Filter::is_in("membership", ["Member"]))
        .include("households.members")
        .include("emails")
        .include("households.members")
        .orderby(OrderBy::asc("last_name"))
        .orderby(OrderBy::desc("created_at"))
        .per_page(25)
        .execute(&client)
        .await?;

    assert_eq!(page.len(), 1);
    Ok(())
}

#[tokio::test]
async fn test_query_round_trips_through_the_wire() -> Result<()> {
    let server = MockServer::start().await;
    mount_empty_people(&server).await;

    let builder = planning_center::QueryBuilder::new("people/v2/people")
        .filter(Filter::or(vec![
            Filter::and(vec![Filter::eq("status", "active"), Filter::gt("age", 17)]),
            Filter::is_null("deceased_at"),
        ]))
        .filter(Filter::between("birthdate", "1990-01-01", "1999-12-31"))
        .filter(Filter::is_in("campus", ["north", "east"]))
        .filter(Filter::is_in("campus", ["north"]))
        .filter(Filter::eq("custom[field]", "x"))
        .filter(Filter::where_has("emails", vec![Filter::eq("address", "*@gmail.com")]))
        .filter(Filter::has_count("households", CountComparison::Between(1, 2)))
        .filter(Filter::doesnt_have("background_checks"))
        .include("households.members")
        .orderby(OrderBy::desc("updated_at"))
        .page(3, 25)?
        .param("search_name", "ada lovelace");
    let expected = builder.clone().build().describe();

    let client = test_client(&server)?;
    builder.execute::<Value>(&client).await?;

    let query = last_query(&server).await.unwrap_or_default();
    assert_eq!(QueryDescription::from_query_string(&query)?, expected);
    Ok(())
}

#[tokio::test]
async fn test_page_helper_offset() -> Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/people/v2/people"))
        .and(query_param("offset", "50"))
        .and(query_param("per_page", "25"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"data": []})))
        .expect(1)
        .mount(&server)
        .await;

    let client = test_client(&server)?;
    client.query("people/v2/people").page(3, 25)?.execute::<Value>(&client).await?;
    Ok(())
}

#[tokio::test]
async fn test_invalid_page_never_reaches_the_server() -> Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"data": []})))
        .expect(0)
        .mount(&server)
        .await;

    let client = test_client(&server)?;
    assert!(client.query("people/v2/people").page(0, 25).is_err());
    assert!(client.query("people/v2/people").page(1, 0).is_err());
    Ok(())
}

#[tokio::test]
async fn test_first_requests_a_single_item() -> Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/people/v2/people"))
        .and(query_param("per_page", "1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"data": [person(4, "Grace")]})))
        .expect(1)
        .mount(&server)
        .await;

    let client = test_client(&server)?;
    let first: Option<Value> = client
        .query("people/v2/people")
        .orderby(OrderBy::asc("first_name"))
        .first(&client)
        .await?;
    assert_eq!(first.map(|p| p["id"].clone()), Some(json!("4")));
    Ok(())
}
