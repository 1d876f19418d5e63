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

//! Tries several metadata sources in order.
//!
//! Deployments without a metadata endpoint configure the identity through
//! the environment or a mounted file. [ProviderChain::default_chain] checks
//! those first and falls back to the endpoint.

use super::MetadataProvider;
use super::env::EnvProvider;
use super::file::FileProvider;
use super::imds::ImdsProvider;
use crate::Result;
use crate::errors::MetadataUnavailable;
use crate::identity::InstanceIdentity;

/// Disables the metadata endpoint in the default chain when set to `true`.
pub const IMDS_DISABLED_ENV_VAR: &str = "AWS_EC2_METADATA_DISABLED";

/// A [MetadataProvider] that tries a list of providers in order.
///
/// The first successful answer wins. If every provider fails the chain
/// returns an error with the cause of the last failure, and a message that
/// lists every failure.
#[derive(Debug, Default)]
pub struct ProviderChain {
    providers: Vec<Box<dyn MetadataProvider>>,
}

impl ProviderChain {
    /// Creates an empty chain.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a provider to the chain.
    pub fn with<P>(mut self, provider: P) -> Self
    where
        P: MetadataProvider + 'static,
    {
        self.providers.push(Box::new(provider));
        self
    }

    /// Builds the chain used by most deployments.
    ///
    /// In order:
    /// * [EnvProvider], if `CSI_INSTANCE_ID` is set.
    /// * [FileProvider], if `CSI_METADATA_FILE` is set.
    /// * [ImdsProvider], unless `AWS_EC2_METADATA_DISABLED` is `true`.
    pub fn default_chain() -> Self {
        let mut chain = Self::new();
        let env = EnvProvider::new();
        if env.is_configured() {
            chain = chain.with(env);
        }
        if let Some(file) = FileProvider::from_env() {
            chain = chain.with(file);
        }
        if !imds_disabled() {
            chain = chain.with(ImdsProvider::builder().build());
        }
        chain
    }

    /// The number of providers in the chain.
    pub fn len(&self) -> usize {
        self.providers.len()
    }

    /// Returns `true` if the chain has no providers.
    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }
}

fn imds_disabled() -> bool {
    std::env::var(IMDS_DISABLED_ENV_VAR).is_ok_and(|v| v.eq_ignore_ascii_case("true"))
}

#[async_trait::async_trait]
impl MetadataProvider for ProviderChain {
    async fn fetch_identity(&self) -> Result<InstanceIdentity> {
        let mut failures = Vec::new();
        let mut last = None;
        for (index, provider) in self.providers.iter().enumerate() {
            match provider.fetch_identity().await {
                Ok(identity) => return Ok(identity),
                Err(e) => {
                    tracing::debug!(index, ?provider, "metadata provider failed: {e}");
                    failures.push(format!("[{index}] {e}"));
                    last = Some(e);
                }
            }
        }
        match last {
            None => Err(MetadataUnavailable::malformed(
                "no metadata providers are configured",
            )),
            // The cause and the transient flag come from the last provider,
            // the message lists every failure in order.
            Some(e) => Err(e.with_source(format!(
                "all {} metadata providers failed: {}",
                failures.len(),
                failures.join("; ")
            ))),
        }
    }
}
