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

//! A provider backed by environment variables.
//!
//! Useful on bare-metal or non-cloud deployments, where no metadata endpoint
//! exists. With the default prefix the provider reads:
//!
//! * `CSI_INSTANCE_ID`
//! * `CSI_INSTANCE_TYPE`
//! * `CSI_AVAILABILITY_ZONE`
//! * `CSI_REGION`, optional. If unset the region is derived from the zone.

use super::MetadataProvider;
use crate::Result;
use crate::errors::MetadataUnavailable;
use crate::identity::InstanceIdentity;

pub(crate) const DEFAULT_PREFIX: &str = "CSI_";

/// A [MetadataProvider] that reads the identity from environment variables.
#[derive(Clone, Debug)]
pub struct EnvProvider {
    prefix: String,
}

impl Default for EnvProvider {
    fn default() -> Self {
        Self::with_prefix(DEFAULT_PREFIX)
    }
}

impl EnvProvider {
    /// Creates a provider reading `CSI_*` variables.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a provider reading variables that start with `prefix`.
    pub fn with_prefix<S: Into<String>>(prefix: S) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    /// Returns `true` if the instance id variable is set.
    ///
    /// [ProviderChain::default_chain][super::ProviderChain::default_chain]
    /// uses this to decide whether the environment is a metadata source.
    pub fn is_configured(&self) -> bool {
        std::env::var_os(self.name("INSTANCE_ID")).is_some()
    }

    fn name(&self, suffix: &str) -> String {
        format!("{}{suffix}", self.prefix)
    }

    fn required(&self, suffix: &str) -> Result<String> {
        let name = self.name(suffix);
        std::env::var(&name).map_err(|e| {
            MetadataUnavailable::malformed(format!("cannot read environment variable {name}: {e}"))
        })
    }
}

#[async_trait::async_trait]
impl MetadataProvider for EnvProvider {
    async fn fetch_identity(&self) -> Result<InstanceIdentity> {
        let instance_id = self.required("INSTANCE_ID")?;
        let instance_type = self.required("INSTANCE_TYPE")?;
        let availability_zone = self.required("AVAILABILITY_ZONE")?;
        match std::env::var(self.name("REGION")) {
            Ok(region) if !region.is_empty() => {
                InstanceIdentity::new(instance_id, instance_type, availability_zone, region)
            }
            _ => InstanceIdentity::with_derived_region(
                instance_id,
                instance_type,
                availability_zone,
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scoped_env::ScopedEnv;
    use serial_test::serial;

    type TestResult = anyhow::Result<()>;

    #[tokio::test]
    #[serial]
    async fn all_variables() -> TestResult {
        let _id = ScopedEnv::set("CSI_INSTANCE_ID", "i-0123");
        let _type = ScopedEnv::set("CSI_INSTANCE_TYPE", "m5.large");
        let _zone = ScopedEnv::set("CSI_AVAILABILITY_ZONE", "us-east-1a");
        let _region = ScopedEnv::set("CSI_REGION", "us-east-1");

        let provider = EnvProvider::new();
        assert!(provider.is_configured());
        let got = provider.fetch_identity().await?;
        assert_eq!(
            got,
            InstanceIdentity::new("i-0123", "m5.large", "us-east-1a", "us-east-1")?
        );
        Ok(())
    }

    #[tokio::test]
    #[serial]
    async fn derived_region() -> TestResult {
        let _id = ScopedEnv::set("TEST_ONLY_INSTANCE_ID", "i-0123");
        let _type = ScopedEnv::set("TEST_ONLY_INSTANCE_TYPE", "m5.large");
        let _zone = ScopedEnv::set("TEST_ONLY_AVAILABILITY_ZONE", "ap-south-1b");
        let _region = ScopedEnv::remove("TEST_ONLY_REGION");

        let got = EnvProvider::with_prefix("TEST_ONLY_")
            .fetch_identity()
            .await?;
        assert_eq!(got.region(), "ap-south-1");
        Ok(())
    }

    #[tokio::test]
    #[serial]
    async fn missing_variable() {
        let _id = ScopedEnv::set("TEST_ONLY_INSTANCE_ID", "i-0123");
        let _type = ScopedEnv::remove("TEST_ONLY_INSTANCE_TYPE");

        let err = EnvProvider::with_prefix("TEST_ONLY_")
            .fetch_identity()
            .await
            .unwrap_err();
        assert!(err.is_malformed(), "{err:?}");
        assert!(!err.is_transient(), "{err:?}");
        assert!(err.to_string().contains("TEST_ONLY_INSTANCE_TYPE"), "{err}");
    }

    #[test]
    #[serial]
    fn not_configured() {
        let _id = ScopedEnv::remove("TEST_ONLY_INSTANCE_ID");
        assert!(!EnvProvider::with_prefix("TEST_ONLY_").is_configured());
    }
}
