use crate::core::models::Payload;
use crate::core::settings::ApiSettings;
use crate::transit::{decode, queries, FetchAdapter, FetchError, FetchRequest};
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, CACHE_CONTROL, CONTENT_TYPE, PRAGMA};
use std::time::Duration;

const SUBSCRIPTION_KEY_HEADER: &str = "digitransit-subscription-key";

/// GraphQL client for the Digitransit routing API.
pub struct DigitransitClient {
    client: reqwest::Client,
    api_url: String,
    feed: String,
}

impl DigitransitClient {
    pub fn new(settings: &ApiSettings) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/graphql"));
        headers.insert(
            CACHE_CONTROL,
            HeaderValue::from_static("max-age=0, no-cache, no-store, must-revalidate"),
        );
        headers.insert(PRAGMA, HeaderValue::from_static("no-cache"));
        if let Some(key) = &settings.key {
            let value = HeaderValue::from_str(key).context("Invalid characters in api.key")?;
            headers.insert(SUBSCRIPTION_KEY_HEADER, value);
        }

        let client = reqwest::Client::builder()
            .user_agent(concat!("publika/", env!("CARGO_PKG_VERSION")))
            .default_headers(headers)
            .timeout(Duration::from_secs(settings.timeout_secs))
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            api_url: settings.url.clone(),
            feed: settings.feed.clone(),
        })
    }
}

#[async_trait]
impl FetchAdapter for DigitransitClient {
    async fn fetch(&self, request: &FetchRequest) -> Result<Payload, FetchError> {
        let body = queries::build(request, &self.feed);
        tracing::trace!(query = %body, "Sending GraphQL query");

        let response = self.client.post(&self.api_url).body(body).send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(FetchError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let text = response.text().await?;
        decode::decode(request, &text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transit::FailureKind;
    use serde_json::json;
    use wiremock::matchers::{body_string_contains, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn settings(server: &MockServer, key: Option<&str>) -> ApiSettings {
        ApiSettings {
            url: format!("{}/graphql", server.uri()),
            key: key.map(str::to_string),
            feed: "HSL".to_string(),
            timeout_secs: 5,
        }
    }

    fn station_request() -> FetchRequest {
        FetchRequest::BikeStation {
            id: "070".to_string(),
        }
    }

    #[tokio::test]
    async fn test_posts_graphql_with_subscription_key() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/graphql"))
            .and(header("content-type", "application/graphql"))
            .and(header(SUBSCRIPTION_KEY_HEADER, "secret"))
            .and(body_string_contains(r#"bikeRentalStation(id: "070")"#))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": { "bikeRentalStation": {
                    "stationId": "070",
                    "name": "Kamppi (M)",
                    "bikesAvailable": 7,
                    "spacesAvailable": 17
                } }
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = DigitransitClient::new(&settings(&server, Some("secret"))).unwrap();
        let payload = client.fetch(&station_request()).await.unwrap();

        let Payload::Station(station) = payload else {
            panic!("expected station");
        };
        assert_eq!(station.bikes_available, 7);
    }

    #[tokio::test]
    async fn test_http_error_is_transport_failure() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503).set_body_string("maintenance"))
            .expect(1)
            .mount(&server)
            .await;

        let client = DigitransitClient::new(&settings(&server, None)).unwrap();
        let err = client.fetch(&station_request()).await.unwrap_err();

        assert_eq!(err.kind(), FailureKind::Transport);
        assert_eq!(err.to_string(), "API returned status 503: maintenance");
    }

    #[tokio::test]
    async fn test_missing_entity_is_data_absent() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({ "data": { "bikeRentalStation": null } })),
            )
            .mount(&server)
            .await;

        let client = DigitransitClient::new(&settings(&server, None)).unwrap();
        let err = client.fetch(&station_request()).await.unwrap_err();

        assert_eq!(err.kind(), FailureKind::DataAbsent);
    }

    #[tokio::test]
    async fn test_unreachable_server_is_transport_failure() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let settings = ApiSettings {
            url: format!("http://127.0.0.1:{port}/graphql"),
            key: None,
            feed: "HSL".to_string(),
            timeout_secs: 5,
        };
        let client = DigitransitClient::new(&settings).unwrap();
        let err = client.fetch(&station_request()).await.unwrap_err();
        assert!(matches!(err, FetchError::Transport(_)));
    }
}
