use crate::config::{CredentialEndpoint, HttpMethod};
use crate::domain::credential::{EphemeralCredentialRequest, extract_credential};
use crate::domain::ports::CredentialBackend;
use crate::error::{BridgeError, Result};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Client, Url};
use serde_json::{Map, Value};
use tracing::debug;

/// Fetches ephemeral keys from the application's credential-issuing endpoint.
///
/// One request per call, no caching, no retry. The timeout is enforced by the
/// credential supplier, not here.
#[derive(Debug, Clone)]
pub struct HttpCredentialBackend {
    client: Client,
    url: Url,
    method: HttpMethod,
    headers: HeaderMap,
    payload: Map<String, Value>,
    api_version_field: String,
}

impl HttpCredentialBackend {
    pub fn new(endpoint: CredentialEndpoint) -> Result<Self> {
        Self::with_client(endpoint, Client::new())
    }

    pub fn with_client(endpoint: CredentialEndpoint, client: Client) -> Result<Self> {
        endpoint.validate()?;
        let url = Url::parse(&endpoint.url)
            .map_err(|e| BridgeError::Config(format!("invalid credential url: {e}")))?;

        let mut headers = HeaderMap::new();
        for (name, value) in &endpoint.headers {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| BridgeError::Config(format!("invalid header name `{name}`: {e}")))?;
            let value = HeaderValue::from_str(value)
                .map_err(|e| BridgeError::Config(format!("invalid value for header `{name}`: {e}")))?;
            headers.insert(name, value);
        }

        Ok(Self {
            client,
            url,
            method: endpoint.method,
            headers,
            payload: endpoint.payload,
            api_version_field: endpoint.api_version_field,
        })
    }

    fn fields(&self, api_version: &str) -> Map<String, Value> {
        let mut fields = self.payload.clone();
        fields.insert(
            self.api_version_field.clone(),
            Value::String(api_version.to_string()),
        );
        fields
    }
}

#[async_trait]
impl CredentialBackend for HttpCredentialBackend {
    async fn fetch_credential(&self, request: &EphemeralCredentialRequest) -> Result<Value> {
        let fields = self.fields(&request.api_version);
        let builder = match self.method {
            HttpMethod::Get => {
                let query: Vec<(String, String)> = fields
                    .into_iter()
                    .map(|(k, v)| match v {
                        Value::String(s) => (k, s),
                        other => (k, other.to_string()),
                    })
                    .collect();
                self.client.get(self.url.clone()).query(&query)
            }
            HttpMethod::Post => self.client.post(self.url.clone()).json(&fields),
        };

        debug!(request_id = %request.id, method = %self.method, url = %self.url, "calling credential endpoint");
        let response = builder
            .headers(self.headers.clone())
            .send()
            .await
            .map_err(|e| BridgeError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| String::from("Unknown Error"));
            return Err(BridgeError::Network(format!(
                "credential endpoint returned {status}: {body}"
            )));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| BridgeError::MalformedResponse(e.to_string()))?;
        extract_credential(body)
    }
}
