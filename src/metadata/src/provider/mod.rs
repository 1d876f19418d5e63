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

//! Metadata sources.
//!
//! A [MetadataProvider] queries one concrete source for the instance
//! identity. Providers are stateless per call and never retry, the
//! [Resolver][crate::service::Resolver] owns the retry policy.
//!
//! The crate includes providers for the link-local instance metadata endpoint
//! ([imds::ImdsProvider]), for environment variables ([env::EnvProvider]),
//! and for a mounted JSON file ([file::FileProvider]). A [ProviderChain]
//! tries several providers in order.

pub mod chain;
pub mod env;
pub mod file;
pub mod imds;

pub use chain::ProviderChain;

use crate::Result;
use crate::identity::InstanceIdentity;
use std::sync::Arc;

/// Queries one metadata source for the instance identity.
///
/// Implementations report every failure as a
/// [MetadataUnavailable][crate::errors::MetadataUnavailable] error with the
/// underlying cause attached.
#[async_trait::async_trait]
pub trait MetadataProvider: std::fmt::Debug + Send + Sync {
    /// Fetches the identity of the running instance.
    async fn fetch_identity(&self) -> Result<InstanceIdentity>;
}

#[async_trait::async_trait]
impl<T> MetadataProvider for Arc<T>
where
    T: MetadataProvider + ?Sized,
{
    async fn fetch_identity(&self) -> Result<InstanceIdentity> {
        self.as_ref().fetch_identity().await
    }
}

#[async_trait::async_trait]
impl<T> MetadataProvider for Box<T>
where
    T: MetadataProvider + ?Sized,
{
    async fn fetch_identity(&self) -> Result<InstanceIdentity> {
        self.as_ref().fetch_identity().await
    }
}

/// The identity fields as they appear in JSON documents.
///
/// Both the instance identity document and the fallback file use this
/// format. Unknown fields are ignored. Missing fields are reported when the
/// document is converted to an [InstanceIdentity].
#[derive(Clone, Debug, Default, PartialEq, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct IdentityDocument {
    #[serde(default)]
    pub(crate) instance_id: String,
    #[serde(default)]
    pub(crate) instance_type: String,
    #[serde(default)]
    pub(crate) availability_zone: String,
    #[serde(default)]
    pub(crate) region: Option<String>,
}

impl IdentityDocument {
    /// Converts the document, deriving the region if the document has none.
    pub(crate) fn into_identity(self) -> Result<InstanceIdentity> {
        match self.region.filter(|r| !r.is_empty()) {
            Some(region) => InstanceIdentity::new(
                self.instance_id,
                self.instance_type,
                self.availability_zone,
                region,
            ),
            None => InstanceIdentity::with_derived_region(
                self.instance_id,
                self.instance_type,
                self.availability_zone,
            ),
        }
    }
}
