use anyhow::Result;
use planning_center::api::query::{Field, Filter, by};
use planning_center::api::{Aggregator, Comparison, Resource};
use serde::Deserialize;
use serde_json::{Value, json};
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use super::support::test_client;

const DONATIONS: &str = "/giving/v2/donations";

#[derive(Debug, Clone, Deserialize)]
struct Donation {
    amount_cents: i64,
    payment_method: String,
}

type DonationResource = Resource<Donation>;

const AMOUNT: Field<DonationResource, i64> = Field::new("amount_cents", |d| d.attributes.amount_cents);
const PAYMENT_METHOD: Field<DonationResource, String> =
    Field::new("payment_method", |d| d.attributes.payment_method.clone());

fn donation(id: u32, amount_cents: i64, payment_method: &str) -> Value {
    json!({
        "type": "Donation",
        "id": id.to_string(),
        "attributes": {"amount_cents": amount_cents, "payment_method": payment_method}
    })
}

/// Two pages: [5000 card, 2500 cash] then [5000 card]
async fn mount_donations(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path(DONATIONS))
        .and(query_param("offset", "2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [donation(3, 5000, "card")],
            "meta": {"total_count": 3, "per_page": 2, "offset": 2},
            "links": {}
        })))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path(DONATIONS))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [donation(1, 5000, "card"), donation(2, 2500, "cash")],
            "meta": {"total_count": 3, "per_page": 2, "offset": 0},
            "links": {"next": format!("{}{}?per_page=2&offset=2", server.uri(), DONATIONS)}
        })))
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_remote_count_uses_total_count() -> Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(DONATIONS))
        .and(query_param("per_page", "1"))
        .and(query_param("where[payment_method]", "card"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [donation(1, 5000, "card")],
            "meta": {"total_count": 42}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = test_client(&server)?;
    let count = client
        .query("giving/v2/donations")
        .filter(PAYMENT_METHOD.eq("card".to_string()))
        .count(&client)
        .await?;
    assert_eq!(count, 42);
    Ok(())
}

#[tokio::test]
async fn test_remote_aggregates_span_all_pages() -> Result<()> {
    let server = MockServer::start().await;
    mount_donations(&server).await;
    let client = test_client(&server)?;
    let query = client.query("giving/v2/donations").per_page(2);

    let by_name = query.clone().sum::<Value, _>(&client, "amount_cents").await?;
    let by_field = query.clone().sum(&client, AMOUNT).await?;
    let by_closure = query
        .clone()
        .sum(&client, by(|d: &DonationResource| d.attributes.amount_cents))
        .await?;
    assert_eq!(by_name, 12500.0);
    assert_eq!(by_name, by_field);
    assert_eq!(by_name, by_closure);

    assert_eq!(query.clone().sum_distinct(&client, AMOUNT).await?, 7500.0);
    assert_eq!(query.clone().count_distinct(&client, PAYMENT_METHOD).await?, 2);
    assert_eq!(query.clone().max(&client, AMOUNT).await?, 5000);
    assert_eq!(query.clone().min(&client, AMOUNT).await?, 2500);
    let average = query.clone().average::<Value, _>(&client, "amount_cents").await?;
    assert!((average - 12500.0 / 3.0).abs() < 1e-9);
    Ok(())
}

#[tokio::test]
async fn test_remote_group_by_having() -> Result<()> {
    let server = MockServer::start().await;
    mount_donations(&server).await;
    let client = test_client(&server)?;

    let repeated: Vec<(String, usize)> = client
        .query("giving/v2/donations")
        .per_page(2)
        .aggregate(&client, |agg: Aggregator<'_, DonationResource>| {
            agg.group_by(PAYMENT_METHOD)
                .having_count(Comparison::GreaterThan, 1)
                .into_groups()
                .into_iter()
                .map(|group| (group.key.clone().unwrap_or_default(), group.count()))
                .collect()
        })
        .await?;

    assert_eq!(repeated, vec![("card".to_string(), 2)]);
    Ok(())
}

#[tokio::test]
async fn test_scoped_aggregate_over_empty_subset() -> Result<()> {
    let server = MockServer::start().await;
    mount_donations(&server).await;
    let client = test_client(&server)?;

    let (count, sum, average) = client
        .query("giving/v2/donations")
        .per_page(2)
        .aggregate(&client, |agg: Aggregator<'_, Value>| {
            let cheques = agg.matching(Filter::eq("payment_method", "cheque"));
            (cheques.count(), cheques.sum("amount_cents"), cheques.average("amount_cents"))
        })
        .await?;

    assert_eq!((count, sum, average), (0, 0.0, 0.0));
    Ok(())
}
