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

//! A provider backed by a mounted JSON file.
//!
//! The file uses the same field names as the instance identity document:
//!
//! ```json
//! {
//!   "instanceId": "i-0123",
//!   "instanceType": "m5.large",
//!   "availabilityZone": "us-east-1a",
//!   "region": "us-east-1"
//! }
//! ```
//!
//! The `region` field is optional, if missing it is derived from the zone.

use super::{IdentityDocument, MetadataProvider};
use crate::Result;
use crate::errors::MetadataUnavailable;
use crate::identity::InstanceIdentity;
use std::path::{Path, PathBuf};

/// Names the file used by
/// [ProviderChain::default_chain][super::ProviderChain::default_chain].
pub const FILE_ENV_VAR: &str = "CSI_METADATA_FILE";

/// A [MetadataProvider] that reads the identity from a JSON file.
#[derive(Clone, Debug)]
pub struct FileProvider {
    path: PathBuf,
}

impl FileProvider {
    /// Creates a provider reading `path`.
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self { path: path.into() }
    }

    /// Creates a provider for the file named by `CSI_METADATA_FILE`, if set.
    pub fn from_env() -> Option<Self> {
        std::env::var_os(FILE_ENV_VAR)
            .filter(|p| !p.is_empty())
            .map(Self::new)
    }

    /// The file read by this provider.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait::async_trait]
impl MetadataProvider for FileProvider {
    async fn fetch_identity(&self) -> Result<InstanceIdentity> {
        tracing::debug!(path = %self.path.display(), "reading instance metadata file");
        // The file may be mounted after the process starts, read errors are
        // reported as transient.
        let contents = tokio::fs::read_to_string(&self.path).await.map_err(|e| {
            MetadataUnavailable::transport(format!(
                "cannot read metadata file {}: {e}",
                self.path.display()
            ))
        })?;
        let document = serde_json::from_str::<IdentityDocument>(&contents).map_err(|e| {
            MetadataUnavailable::malformed(format!(
                "cannot parse metadata file {}: {e}",
                self.path.display()
            ))
        })?;
        document.into_identity()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scoped_env::ScopedEnv;
    use serde_json::json;
    use serial_test::{parallel, serial};
    use std::io::Write;
    use tempfile::NamedTempFile;

    type TestResult = anyhow::Result<()>;

    fn write_file(contents: &str) -> anyhow::Result<NamedTempFile> {
        let mut file = NamedTempFile::new()?;
        file.write_all(contents.as_bytes())?;
        file.flush()?;
        Ok(file)
    }

    #[tokio::test]
    #[parallel]
    async fn read_file() -> TestResult {
        let contents = json!({
            "instanceId": "i-0123",
            "instanceType": "m5.large",
            "availabilityZone": "us-east-1a",
            "region": "us-east-1",
        });
        let file = write_file(&contents.to_string())?;

        let got = FileProvider::new(file.path()).fetch_identity().await?;
        assert_eq!(
            got,
            InstanceIdentity::new("i-0123", "m5.large", "us-east-1a", "us-east-1")?
        );
        Ok(())
    }

    #[tokio::test]
    #[parallel]
    async fn derived_region() -> TestResult {
        let contents = json!({
            "instanceId": "node-17",
            "instanceType": "bare-metal",
            "availabilityZone": "us-west-2c",
        });
        let file = write_file(&contents.to_string())?;

        let got = FileProvider::new(file.path()).fetch_identity().await?;
        assert_eq!(got.region(), "us-west-2");
        Ok(())
    }

    #[tokio::test]
    #[parallel]
    async fn missing_file() -> TestResult {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("does-not-exist.json");

        let err = FileProvider::new(&path).fetch_identity().await.unwrap_err();
        assert!(err.is_transport(), "{err:?}");
        assert!(err.is_transient(), "{err:?}");
        assert!(err.to_string().contains("does-not-exist.json"), "{err}");
        Ok(())
    }

    #[tokio::test]
    #[parallel]
    async fn bad_json() -> TestResult {
        let file = write_file("instanceId: i-0123")?;

        let err = FileProvider::new(file.path())
            .fetch_identity()
            .await
            .unwrap_err();
        assert!(err.is_malformed(), "{err:?}");
        assert!(err.to_string().contains("cannot parse"), "{err}");
        Ok(())
    }

    #[test]
    #[serial]
    fn from_env() {
        let _e = ScopedEnv::set(FILE_ENV_VAR, "/etc/csi/identity.json");
        let got = FileProvider::from_env();
        assert_eq!(
            got.as_ref().map(|p| p.path()),
            Some(Path::new("/etc/csi/identity.json"))
        );

        let _e = ScopedEnv::remove(FILE_ENV_VAR);
        assert!(FileProvider::from_env().is_none());
    }
}
