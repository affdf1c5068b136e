use anyhow::Result;
use planning_center::api::{ApiError, PagedResult, RequestMapper, Resource, ResponseMapper};
use serde::{Deserialize, Serialize};
use serde_json::json;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use super::support::test_client;

#[derive(Debug, Deserialize)]
struct PersonDto {
    first_name: String,
    last_name: String,
}

#[derive(Debug, Serialize)]
struct NewPersonDto {
    first_name: String,
    last_name: String,
}

#[derive(Debug, PartialEq)]
struct Person {
    id: u64,
    full_name: String,
}

struct NewPerson {
    full_name: String,
}

struct PersonMapper;

impl ResponseMapper for PersonMapper {
    type Dto = Resource<PersonDto>;
    type Model = Person;

    fn to_model(&self, dto: Self::Dto) -> Result<Person, ApiError> {
        let id = dto
            .id
            .parse()
            .map_err(|_| ApiError::InvalidOperation(format!("non-numeric person id '{}'", dto.id)))?;
        Ok(Person {
            id,
            full_name: format!("{} {}", dto.attributes.first_name, dto.attributes.last_name),
        })
    }
}

impl RequestMapper for PersonMapper {
    type Request = NewPerson;
    type Dto = NewPersonDto;

    fn to_dto(&self, request: &NewPerson) -> Result<NewPersonDto, ApiError> {
        let (first_name, last_name) = request
            .full_name
            .split_once(' ')
            .ok_or_else(|| ApiError::InvalidOperation("full name needs a first and last name".to_string()))?;
        Ok(NewPersonDto {
            first_name: first_name.to_string(),
            last_name: last_name.to_string(),
        })
    }
}

fn person_json(id: &str) -> serde_json::Value {
    json!({"type": "Person", "id": id, "attributes": {"first_name": "Ada", "last_name": "Lovelace"}})
}

#[tokio::test]
async fn test_get_mapped() -> Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/people/v2/people/1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"data": person_json("1")})))
        .mount(&server)
        .await;

    let client = test_client(&server)?;
    let person = client.get_mapped("people/v2/people/1", &PersonMapper).await?;
    assert_eq!(
        person,
        Person {
            id: 1,
            full_name: "Ada Lovelace".to_string()
        }
    );
    Ok(())
}

#[tokio::test]
async fn test_map_page_items() -> Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/people/v2/people"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [person_json("1"), person_json("x")],
            "meta": {"total_count": 2}
        })))
        .mount(&server)
        .await;

    let client = test_client(&server)?;
    let page: PagedResult<Resource<PersonDto>> = client.query("people/v2/people").execute(&client).await?;
    assert!(matches!(page.map_items(&PersonMapper), Err(ApiError::InvalidOperation(_))));
    Ok(())
}

#[tokio::test]
async fn test_create_mapped() -> Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/people/v2/people"))
        .and(body_partial_json(json!({
            "data": {"type": "Person", "attributes": {"first_name": "Ada", "last_name": "Lovelace"}}
        })))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({"data": person_json("12")})))
        .expect(1)
        .mount(&server)
        .await;

    let client = test_client(&server)?;
    let request = NewPerson {
        full_name: "Ada Lovelace".to_string(),
    };
    let created = client
        .create_mapped("people/v2/people", "Person", &PersonMapper, &request, &PersonMapper)
        .await?;
    assert_eq!(created.id, 12);
    Ok(())
}
