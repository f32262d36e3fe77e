#![cfg(feature = "reqwest")]

use crate::config::ClientConfig;
use crate::ndjson;
use crate::requester::{ApiRequest, Body, LineStream, Method, RequestError, Requester};
use log::{debug, info};
use reqwest::header::{ACCEPT, CONTENT_TYPE};

/// [`Requester`] on top of reqwest.
#[derive(Debug, Clone)]
pub struct Request {
    client: reqwest::Client,
    config: ClientConfig,
}

impl Request {
    pub fn new(api_key: String) -> Self {
        Self::with_config(ClientConfig::new(api_key))
    }

    pub fn with_config(config: ClientConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
        }
    }

    pub fn from_env() -> Self {
        Self::with_config(ClientConfig::from_env())
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    fn build(&self, request: &ApiRequest) -> reqwest::RequestBuilder {
        let url = self.config.url(&request.path);
        let mut builder = match request.method {
            Method::Get => self.client.get(url),
            Method::Post => self.client.post(url),
        };

        if let Some(token) = &self.config.token {
            builder = builder.bearer_auth(token);
        }
        builder = builder.header(ACCEPT, request.accept.mime());
        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }

        match &request.body {
            Body::Empty => builder,
            Body::Form(fields) => builder.form(fields),
            Body::Text(text) => builder.header(CONTENT_TYPE, "text/plain").body(text.clone()),
        }
    }

    async fn execute(&self, request: &ApiRequest) -> Result<reqwest::Response, RequestError> {
        debug!("{:?} {}", request.method, request.path);
        let response = self
            .build(request)
            .send()
            .await
            .map_err(RequestError::transport)?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        info!("{} failed with status {}", request.path, status);
        Err(RequestError::Status {
            status: status.as_u16(),
            message: error_message(&body)
                .or_else(|| status.canonical_reason().map(str::to_string))
                .unwrap_or_else(|| body.clone()),
        })
    }
}

/// Lichess reports failures as `{"error": "..."}`.
fn error_message(body: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    match value.get("error")? {
        serde_json::Value::String(message) => Some(message.clone()),
        other => Some(other.to_string()),
    }
}

impl Requester for Request {
    async fn send(&self, request: ApiRequest) -> Result<String, RequestError> {
        let response = self.execute(&request).await?;
        response.text().await.map_err(RequestError::transport)
    }

    async fn stream(&self, request: ApiRequest) -> Result<LineStream, RequestError> {
        let response = self.execute(&request).await?;
        Ok(ndjson::lines(response.bytes_stream()))
    }
}
