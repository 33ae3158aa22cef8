//! Resource API transport

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Method};
use tokenlink_core::ports::ResourceTransport;
use tokenlink_core::OAuthResult;
use tokenlink_domain::{ApiRequest, ApiResponse, HttpMethod};
use tracing::{debug, instrument};

use super::client::HttpClientBuilder;
use crate::errors::InfraError;

/// Sends [`ApiRequest`]s with reqwest. Every HTTP status is returned as a
/// response; only transport failures are errors.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    /// # Errors
    /// Returns `OAuthError::Config` if the HTTP client cannot be built.
    pub fn new(timeout: Duration) -> OAuthResult<Self> {
        Ok(Self::with_client(HttpClientBuilder::new().timeout(timeout).build()?))
    }

    pub fn with_client(client: Client) -> Self {
        Self { client }
    }
}

fn method(method: HttpMethod) -> Method {
    match method {
        HttpMethod::Get => Method::GET,
        HttpMethod::Post => Method::POST,
        HttpMethod::Put => Method::PUT,
        HttpMethod::Patch => Method::PATCH,
        HttpMethod::Delete => Method::DELETE,
    }
}

#[async_trait]
impl ResourceTransport for ReqwestTransport {
    #[instrument(skip_all, fields(method = request.method.as_str()))]
    async fn send(&self, request: &ApiRequest, bearer: &str) -> OAuthResult<ApiResponse> {
        let mut builder = self.client.request(method(request.method), &request.url);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder.bearer_auth(bearer).send().await.map_err(InfraError::from)?;
        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value.to_str().ok().map(|v| (name.as_str().to_string(), v.to_string()))
            })
            .collect();
        let body = response.bytes().await.map_err(InfraError::from)?.to_vec();
        debug!(status, bytes = body.len(), "Resource response received");

        Ok(ApiResponse { status, headers, body })
    }
}
