// Copyright 2026 Google LLC
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     https://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! A provider backed by the instance metadata endpoint.
//!
//! EC2-compatible clouds expose a link-local HTTP endpoint, reachable only
//! from the instance, that answers identity and placement queries. This
//! provider reads the [instance identity document] from it.
//!
//! The provider first requests a session token (IMDSv2) and attaches the token
//! to the document request. Endpoints that do not support session tokens are
//! queried without one.
//!
//! Example usage:
//!
//! ```
//! # use csi_instance_metadata::provider::imds::Builder;
//! # use std::time::Duration;
//! let provider = Builder::default()
//!     .with_timeout(Duration::from_millis(500))
//!     .build();
//! ```
//!
//! [instance identity document]: https://docs.aws.amazon.com/AWSEC2/latest/UserGuide/instance-identity-documents.html

use super::{IdentityDocument, MetadataProvider};
use crate::Result;
use crate::errors;
use crate::identity::InstanceIdentity;
use http::StatusCode;
use reqwest::{Client as ReqwestClient, RequestBuilder};
use std::time::Duration;

pub(crate) const DEFAULT_ENDPOINT: &str = "http://169.254.169.254";
pub(crate) const ENDPOINT_ENV_VAR: &str = "AWS_EC2_METADATA_SERVICE_ENDPOINT";
pub(crate) const TOKEN_PATH: &str = "/latest/api/token";
pub(crate) const DOCUMENT_PATH: &str = "/latest/dynamic/instance-identity/document";
pub(crate) const TOKEN_TTL_HEADER: &str = "x-aws-ec2-metadata-token-ttl-seconds";
pub(crate) const TOKEN_HEADER: &str = "x-aws-ec2-metadata-token";

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(1);
const DEFAULT_TOKEN_TTL: Duration = Duration::from_secs(21600);

/// Creates [ImdsProvider] instances.
#[derive(Debug, Default)]
pub struct Builder {
    endpoint: Option<String>,
    timeout: Option<Duration>,
    token_ttl: Option<Duration>,
}

impl Builder {
    /// Sets the endpoint for this provider.
    ///
    /// If not set, the provider uses `http://169.254.169.254`. The
    /// `AWS_EC2_METADATA_SERVICE_ENDPOINT` environment variable takes
    /// precedence over both.
    pub fn with_endpoint<S: Into<String>>(mut self, endpoint: S) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    /// Sets the deadline for each request to the metadata endpoint.
    ///
    /// Defaults to one second. The endpoint is local to the instance, a slow
    /// answer usually means it is not there.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Sets the lifetime requested for session tokens.
    ///
    /// Defaults to six hours. The endpoint rejects values above that.
    pub fn with_token_ttl(mut self, ttl: Duration) -> Self {
        self.token_ttl = Some(ttl);
        self
    }

    /// Returns an [ImdsProvider] with the configured settings.
    pub fn build(self) -> ImdsProvider {
        let (endpoint, is_default_endpoint) = resolve_endpoint(self.endpoint);
        ImdsProvider {
            endpoint: endpoint.trim_end_matches('/').to_string(),
            is_default_endpoint,
            timeout: self.timeout.unwrap_or(DEFAULT_TIMEOUT),
            token_ttl: self.token_ttl.unwrap_or(DEFAULT_TOKEN_TTL),
            inner: ReqwestClient::new(),
        }
    }
}

/// Determines the endpoint and whether it was overridden.
fn resolve_endpoint(endpoint_override: Option<String>) -> (String, bool) {
    match (std::env::var(ENDPOINT_ENV_VAR), endpoint_override) {
        (Ok(endpoint), _) if !endpoint.is_empty() => (endpoint, false),
        (_, Some(endpoint)) => (endpoint, false),
        _ => (DEFAULT_ENDPOINT.to_string(), true),
    }
}

/// A [MetadataProvider] that queries the instance metadata endpoint.
#[derive(Clone, Debug)]
pub struct ImdsProvider {
    endpoint: String,
    /// True if the endpoint was NOT overridden by env var or builder.
    is_default_endpoint: bool,
    timeout: Duration,
    token_ttl: Duration,
    inner: ReqwestClient,
}

impl ImdsProvider {
    /// Returns a builder for the provider.
    pub fn builder() -> Builder {
        Builder::default()
    }

    /// The endpoint queried by this provider.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn request(&self, method: reqwest::Method, path: &str) -> RequestBuilder {
        let url = format!("{}{}", self.endpoint, path);
        self.inner.request(method, url).timeout(self.timeout)
    }

    /// Requests a session token.
    ///
    /// Returns `None` if the endpoint does not support session tokens.
    async fn session_token(&self) -> Result<Option<String>> {
        let error_message = "failed to fetch session token";
        let response = self
            .request(reqwest::Method::PUT, TOKEN_PATH)
            .header(TOKEN_TTL_HEADER, self.token_ttl.as_secs().to_string())
            .send()
            .await
            .map_err(|e| errors::from_http_error(e, error_message))?;

        let status = response.status();
        if matches!(
            status,
            StatusCode::FORBIDDEN | StatusCode::NOT_FOUND | StatusCode::METHOD_NOT_ALLOWED
        ) {
            tracing::debug!(
                endpoint = %self.endpoint,
                status = status.as_u16(),
                "session tokens not supported, continuing without a token"
            );
            return Ok(None);
        }
        let response = check_response_status(response, error_message).await?;
        let token = response
            .text()
            .await
            .map_err(|e| errors::from_http_error(e, error_message))?;
        Ok(Some(token))
    }

    async fn identity_document(&self, token: Option<String>) -> Result<IdentityDocument> {
        let error_message = "failed to fetch instance identity document";
        let request = self.request(reqwest::Method::GET, DOCUMENT_PATH);
        let request = token
            .into_iter()
            .fold(request, |r, t| r.header(TOKEN_HEADER, t));

        let response = request
            .send()
            .await
            .map_err(|e| errors::from_http_error(e, error_message))?;
        let response = check_response_status(response, error_message).await?;

        // Decoding errors are not transient. Typically they indicate a badly
        // configured endpoint, or DNS redirecting the request to a random
        // server.
        response
            .json::<IdentityDocument>()
            .await
            .map_err(|e| errors::from_http_error(e, error_message))
    }
}

async fn check_response_status(
    response: reqwest::Response,
    error_message: &str,
) -> Result<reqwest::Response> {
    if !response.status().is_success() {
        let err = errors::from_http_response(response, error_message).await;
        Err(err)
    } else {
        Ok(response)
    }
}

#[async_trait::async_trait]
impl MetadataProvider for ImdsProvider {
    async fn fetch_identity(&self) -> Result<InstanceIdentity> {
        tracing::debug!(
            endpoint = %self.endpoint,
            default_endpoint = self.is_default_endpoint,
            "querying instance metadata endpoint"
        );
        let token = self.session_token().await?;
        self.identity_document(token).await?.into_identity()
    }
}
